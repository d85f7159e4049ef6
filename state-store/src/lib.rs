//! # state-store
//!
//! On-disk backends for 0k-Sync client state.
//!
//! - [`PrefsFile`] - JSON preferences file ([`PlainStore`])
//! - [`SealedSecretStore`] - XChaCha20-Poly1305 sealed secrets file ([`SecureStore`])
//! - [`kdf`] - Argon2id passphrase derivation of the store key and sync key material
//!
//! Both files are rewritten atomically and restricted to the owner on Unix.
//!
//! [`PlainStore`]: zerok_state_core::PlainStore
//! [`SecureStore`]: zerok_state_core::SecureStore

#![warn(missing_docs)]
#![warn(clippy::all)]

mod atomic;
pub mod kdf;
mod prefs;
mod sealed;

pub use kdf::{Argon2Params, KdfError, RootSecret, SALT_SIZE};
pub use prefs::PrefsFile;
pub use sealed::{SealedSecretStore, StoreKey};

use std::path::Path;
use std::sync::Arc;

use zerok_state_core::{Accessibility, PersistenceTarget, StoreError};

/// Open both store files and bundle them as a [`PersistenceTarget`].
pub fn open_target(
    prefs_path: &Path,
    secrets_path: &Path,
    root: &RootSecret,
    accessibility: Accessibility,
) -> Result<PersistenceTarget, StoreError> {
    let plain = PrefsFile::open(prefs_path)?;
    let secure = SealedSecretStore::open(secrets_path, root.store_key())?;
    Ok(PersistenceTarget::new(Arc::new(plain), Arc::new(secure)).with_accessibility(accessibility))
}
