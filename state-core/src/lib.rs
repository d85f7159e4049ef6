//! # state-core
//!
//! Pure logic for 0k-Sync client state (no disk or network I/O).
//!
//! This crate holds the state a sync client carries between sessions as
//! immutable snapshots, and persists them across two abstract backends.
//!
//! ## Design Philosophy
//!
//! - A [`Scratchpad`] is never mutated. Changes are staged on a
//!   [`ScratchpadBuilder`] and produce a new snapshot.
//! - Persistence is explicit ([`Scratchpad::checkpoint`]) and versioned
//!   ([`codec`]). Secrets go only to the [`SecureStore`]; everything else
//!   goes to the [`PlainStore`].
//! - Restoration never fails. Damaged state is dropped and reported through
//!   a [`DiagnosticSink`].
//!
//! Concrete on-disk stores live in `state-store`. The in-memory stores here
//! back the tests and embedders that manage storage themselves.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod codec;
pub mod diagnostics;
pub mod engines;
pub mod scratchpad;
pub mod store;
pub mod target;

pub use builder::ScratchpadBuilder;
pub use codec::{persist, restore, PersistError, LAYOUT_VERSION};
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, Severity, TracingSink};
pub use engines::{
    AdoptServerChoices, EngineDivergence, EnginePolicy, EngineResolution, PreferLocalChoices,
};
pub use scratchpad::{Scratchpad, CRYPTO_COLLECTION, DEFAULT_CLIENT_NAME, META_COLLECTION};
pub use store::{
    Accessibility, MemoryPlainStore, MemorySecureStore, PlainStore, PrefValue, SecureStore,
    StoreError,
};
pub use target::PersistenceTarget;

// Value types, re-exported so dependents need only this crate.
pub use zerok_state_types as types;
