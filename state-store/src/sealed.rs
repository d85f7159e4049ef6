//! Encrypted secrets file implementing [`SecureStore`].
//!
//! Each secret is sealed independently with XChaCha20-Poly1305 under a
//! [`StoreKey`], using a fresh random 192-bit nonce per write. The label is
//! bound in as associated data, so a ciphertext copied under another label
//! fails to open.
//!
//! File format (JSON):
//!
//! ```json
//! {
//!   "keys.3Fq9x_LkP2aa": {
//!     "accessibility": "after_first_unlock",
//!     "nonce": "<48 hex chars>",
//!     "ciphertext": "<hex>"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use zerok_state_core::{Accessibility, SecureStore, StoreError};

use crate::atomic;

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const STORE_KEY_SIZE: usize = 32;

/// Key sealing the secrets file.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; STORE_KEY_SIZE]);

impl StoreKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; STORE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a random key (for testing).
    pub fn random() -> Self {
        let mut bytes = [0u8; STORE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8; STORE_KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305, StoreError> {
        XChaCha20Poly1305::new_from_slice(&self.0).map_err(|e| StoreError::Crypto(e.to_string()))
    }
}

// Don't leak secret in debug output
impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreKey([REDACTED])")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedEntry {
    accessibility: Accessibility,
    nonce: String,
    ciphertext: String,
}

impl SealedEntry {
    fn seal(
        key: &StoreKey,
        label: &str,
        secret: &str,
        accessibility: Accessibility,
    ) -> Result<Self, StoreError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(|e| StoreError::Crypto(e.to_string()))?;

        let ciphertext = key
            .cipher()?
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: secret.as_bytes(),
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| StoreError::Crypto("encryption failed".into()))?;

        Ok(Self {
            accessibility,
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    fn open(&self, key: &StoreKey, label: &str) -> Result<Zeroizing<String>, StoreError> {
        let nonce = hex::decode(&self.nonce).map_err(|e| StoreError::Crypto(e.to_string()))?;
        if nonce.len() != NONCE_SIZE {
            return Err(StoreError::Crypto(format!(
                "invalid nonce length: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            )));
        }
        let ciphertext =
            hex::decode(&self.ciphertext).map_err(|e| StoreError::Crypto(e.to_string()))?;

        let plaintext = Zeroizing::new(
            key.cipher()?
                .decrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: &ciphertext,
                        aad: label.as_bytes(),
                    },
                )
                .map_err(|_| StoreError::Crypto("decryption failed: authentication error".into()))?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|e| StoreError::Crypto(e.to_string()))?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

/// A secure store persisted as a file of individually sealed secrets.
pub struct SealedSecretStore {
    path: PathBuf,
    key: StoreKey,
    entries: Mutex<BTreeMap<String, SealedEntry>>,
}

impl SealedSecretStore {
    /// Open the secrets file at `path`. A missing file is an empty store.
    ///
    /// Entries are not decrypted until read, so a wrong key surfaces as
    /// [`StoreError::Crypto`] from [`SecureStore::secret`].
    pub fn open(path: impl Into<PathBuf>, key: StoreKey) -> Result<Self, StoreError> {
        let path = path.into();
        let entries: BTreeMap<String, SealedEntry> = match atomic::read_file(&path)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => BTreeMap::new(),
        };
        tracing::debug!(path = %path.display(), secrets = entries.len(), "opened secrets file");
        Ok(Self {
            path,
            key,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Labels currently holding a secret, sorted.
    pub fn labels(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// The accessibility a secret was stored with.
    pub fn accessibility(&self, label: &str) -> Option<Accessibility> {
        self.lock().get(label).map(|entry| entry.accessibility)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SealedEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(
        &self,
        entries: &mut BTreeMap<String, SealedEntry>,
        staged: BTreeMap<String, SealedEntry>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&staged)?;
        atomic::write_file(&self.path, &bytes)?;
        *entries = staged;
        Ok(())
    }
}

impl std::fmt::Debug for SealedSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSecretStore")
            .field("path", &self.path)
            .field("labels", &self.labels())
            .finish()
    }
}

impl SecureStore for SealedSecretStore {
    fn secret(&self, label: &str) -> Result<Option<Zeroizing<String>>, StoreError> {
        let entries = self.lock();
        entries
            .get(label)
            .map(|entry| entry.open(&self.key, label))
            .transpose()
    }

    fn set_secret(
        &self,
        label: &str,
        secret: &str,
        accessibility: Accessibility,
    ) -> Result<(), StoreError> {
        let entry = SealedEntry::seal(&self.key, label, secret, accessibility)?;
        let mut entries = self.lock();
        let mut staged = entries.clone();
        staged.insert(label.to_string(), entry);
        self.commit(&mut entries, staged)
    }

    fn remove_secret(&self, label: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        if !entries.contains_key(label) {
            return Ok(false);
        }
        let mut staged = entries.clone();
        staged.remove(label);
        self.commit(&mut entries, staged)?;
        Ok(true)
    }
}
