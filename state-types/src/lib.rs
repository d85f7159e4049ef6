//! # state-types
//!
//! Value types for 0k-Sync client state.
//!
//! This crate provides the leaf types shared by the state crates:
//! - [`Fetched`] - A cached value paired with its server timestamp
//! - [`ControlRecord`], [`KeyRecord`], [`EngineConfiguration`] - Cached documents
//! - [`KeyBundle`] - Symmetric key material (zeroized on drop)
//! - [`KeyLabel`], [`ClientGuid`] - Opaque identifiers
//! - [`RecordError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod control;
mod engines;
mod error;
mod fetched;
mod ids;
mod keys;

pub use control::{ControlRecord, EngineMeta};
pub use engines::EngineConfiguration;
pub use error::RecordError;
pub use fetched::{Fetched, Timestamp};
pub use ids::{ClientGuid, KeyLabel};
pub use keys::{KeyBundle, KeyRecord, KEY_SIZE};
