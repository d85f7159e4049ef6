//! Passphrase key derivation.
//!
//! A passphrase and a per-installation salt go through device-adaptive
//! Argon2id to produce a [`RootSecret`]. Everything else is derived from the
//! root secret with HKDF-SHA256 under distinct info strings:
//! - [`RootSecret::store_key`] seals the secrets file
//! - [`RootSecret::sync_key_bundle`] is the snapshot's in-memory key material
//! - [`RootSecret::passphrase_check`] is stored to reject a wrong passphrase

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use zerok_state_types::{KeyBundle, KEY_SIZE};

use crate::sealed::StoreKey;

/// Salt size for Argon2id (128 bits).
pub const SALT_SIZE: usize = 16;

/// Minimum salt size accepted by Argon2.
const MIN_SALT_SIZE: usize = 8;

const HKDF_SALT: &[u8] = b"0k-sync-state-v1";

/// Key derivation errors.
#[derive(Debug, Error)]
pub enum KdfError {
    /// Argon2 rejected the parameters.
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),

    /// The salt is too short.
    #[error("salt too short: need at least {min} bytes, got {actual}")]
    SaltTooShort {
        /// Minimum length.
        min: usize,
        /// Actual length.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// Argon2id parameters for device-adaptive key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    memory_mib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Argon2Params {
    /// Create parameters based on available RAM in MB.
    ///
    /// Scaling:
    /// - < 2000 MB: 12 MiB, 3 iterations (low-end mobile)
    /// - < 4000 MB: 19 MiB, 2 iterations (mid-range mobile)
    /// - < 8000 MB: 46 MiB, 1 iteration (high-end mobile)
    /// - >= 8000 MB: 64 MiB, 3 iterations (desktop)
    pub fn for_ram_mb(ram_mb: u64) -> Self {
        let (memory_mib, iterations, parallelism) = match ram_mb {
            0..=1999 => (12, 3, 1),
            2000..=3999 => (19, 2, 1),
            4000..=7999 => (46, 1, 1),
            _ => (64, 3, 4),
        };
        Self {
            memory_mib,
            iterations,
            parallelism,
        }
    }

    /// Get memory in MiB.
    pub fn memory_mib(&self) -> u32 {
        self.memory_mib
    }

    /// Get iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Get lane count.
    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn to_argon2_params(self) -> Result<Params, KdfError> {
        Params::new(
            self.memory_mib * 1024, // MiB to KiB
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| KdfError::InvalidParams(e.to_string()))
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::for_ram_mb(detect_available_ram_mb())
    }
}

/// Detect total RAM in megabytes.
pub fn detect_available_ram_mb() -> u64 {
    use sysinfo::System;
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory() / (1024 * 1024)
}

/// Generate a random salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt).expect("getrandom failed");
    salt
}

/// The root secret derived from a passphrase.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret([u8; KEY_SIZE]);

impl RootSecret {
    /// Derive from a passphrase and salt using Argon2id.
    pub fn derive(passphrase: &str, salt: &[u8], params: Argon2Params) -> Result<Self, KdfError> {
        if salt.len() < MIN_SALT_SIZE {
            return Err(KdfError::SaltTooShort {
                min: MIN_SALT_SIZE,
                actual: salt.len(),
            });
        }

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2_params()?);
        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut output)
            .map_err(|e| KdfError::Derivation(e.to_string()))?;
        Ok(Self(output))
    }

    /// Wrap raw bytes (for testing).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Key sealing the secrets file.
    pub fn store_key(&self) -> StoreKey {
        StoreKey::from_bytes(self.expand(b"secret-store"))
    }

    /// Key material for sync snapshots.
    pub fn sync_key_bundle(&self) -> KeyBundle {
        KeyBundle::from_keys(
            self.expand(b"sync-encryption"),
            self.expand(b"sync-hmac"),
        )
    }

    /// Value that can be stored in the clear to recognize this secret later.
    ///
    /// Independent of the other subkeys, so storing it reveals none of them.
    pub fn passphrase_check(&self) -> [u8; KEY_SIZE] {
        self.expand(b"passphrase-check")
    }

    fn expand(&self, info: &[u8]) -> [u8; KEY_SIZE] {
        let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), &self.0);
        let mut out = [0u8; KEY_SIZE];
        hkdf.expand(info, &mut out)
            .expect("HKDF expand should not fail with valid lengths");
        out
    }
}

// Don't leak secret in debug output
impl std::fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Argon2Params {
        Argon2Params::for_ram_mb(0)
    }

    #[test]
    fn params_scale_with_ram() {
        assert_eq!(Argon2Params::for_ram_mb(1024).memory_mib(), 12);
        assert_eq!(Argon2Params::for_ram_mb(3000).memory_mib(), 19);
        assert_eq!(Argon2Params::for_ram_mb(6000).iterations(), 1);
        assert_eq!(Argon2Params::for_ram_mb(16_000).memory_mib(), 64);
        assert_eq!(Argon2Params::for_ram_mb(16_000).parallelism(), 4);
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let a = RootSecret::derive("correct horse", &salt, fast()).unwrap();
        let b = RootSecret::derive("correct horse", &salt, fast()).unwrap();
        assert_eq!(a.sync_key_bundle(), b.sync_key_bundle());
    }

    #[test]
    fn salt_and_passphrase_both_matter() {
        let base = RootSecret::derive("correct horse", &[1u8; SALT_SIZE], fast()).unwrap();
        let other_salt = RootSecret::derive("correct horse", &[2u8; SALT_SIZE], fast()).unwrap();
        let other_pass = RootSecret::derive("battery staple", &[1u8; SALT_SIZE], fast()).unwrap();

        assert_ne!(base.sync_key_bundle(), other_salt.sync_key_bundle());
        assert_ne!(base.sync_key_bundle(), other_pass.sync_key_bundle());
    }

    #[test]
    fn passphrase_check_tells_passphrases_apart() {
        let salt = [3u8; SALT_SIZE];
        let right = RootSecret::derive("correct horse", &salt, fast()).unwrap();
        let again = RootSecret::derive("correct horse", &salt, fast()).unwrap();
        let wrong = RootSecret::derive("correct horsf", &salt, fast()).unwrap();

        assert_eq!(right.passphrase_check(), again.passphrase_check());
        assert_ne!(right.passphrase_check(), wrong.passphrase_check());
    }

    #[test]
    fn short_salt_is_rejected() {
        assert!(matches!(
            RootSecret::derive("pw", b"short", fast()),
            Err(KdfError::SaltTooShort { actual: 5, .. })
        ));
    }

    #[test]
    fn subkeys_are_separated() {
        let root = RootSecret::from_bytes([0xAB; KEY_SIZE]);
        let bundle = root.sync_key_bundle();
        assert_ne!(bundle.encryption_key(), bundle.hmac_key());

        let store_key = root.store_key();
        assert_ne!(store_key.as_bytes(), bundle.encryption_key());
        assert_ne!(store_key.as_bytes(), bundle.hmac_key());
        let check = root.passphrase_check();
        assert_ne!(&check, store_key.as_bytes());
        assert_ne!(&check, bundle.encryption_key());
        assert_ne!(&check, bundle.hmac_key());
        assert_eq!(format!("{:?}", root), "RootSecret([REDACTED])");
    }

    #[test]
    fn generated_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
