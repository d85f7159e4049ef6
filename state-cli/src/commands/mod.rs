//! CLI command implementations.

pub mod clear_timestamps;
pub mod init;
pub mod rename;
pub mod set_control;
pub mod show;
