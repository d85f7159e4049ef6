//! Storage capabilities consumed by the persistence codec.
//!
//! Client state is split across two independently-owned backends:
//! - [`PlainStore`] - a general key/value preference store (never holds secrets)
//! - [`SecureStore`] - a credential store holding secrets addressed by label
//!
//! Both traits take `&self` so a single store can be shared behind an `Arc`
//! by every snapshot that checkpoints to it. Implementations use interior
//! mutability.
//!
//! Reads from the plain store are infallible: a missing key and a key holding
//! a value of another type both read as `None`. Writes report failures so a
//! checkpoint is never silently lost.

mod memory;

pub use memory::{MemoryPlainStore, MemorySecureStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::Zeroizing;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the write.
    #[error("write rejected for {key}: {reason}")]
    WriteRejected {
        /// Key or label being written.
        key: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store contents could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sealing or unsealing a secret failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The secure store is not currently accessible.
    #[error("secure store is locked")]
    Locked,
}

/// A value held by a plain store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned 64-bit integer (timestamps).
    UnsignedLong(u64),
    /// UTF-8 string.
    String(String),
    /// Mapping of name to timestamp.
    TimestampMap(BTreeMap<String, u64>),
}

impl PrefValue {
    /// Get the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a signed integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an unsigned long, if it is one.
    pub fn as_unsigned_long(&self) -> Option<u64> {
        match self {
            Self::UnsignedLong(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a timestamp map, if it is one.
    pub fn as_timestamp_map(&self) -> Option<&BTreeMap<String, u64>> {
        match self {
            Self::TimestampMap(m) => Some(m),
            _ => None,
        }
    }
}

/// General-purpose key/value preference storage.
pub trait PlainStore: Send + Sync {
    /// Read a raw value.
    fn value(&self, key: &str) -> Option<PrefValue>;

    /// Write a raw value, replacing any previous value under `key`.
    fn set_value(&self, key: &str, value: PrefValue) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Read a string.
    fn string(&self, key: &str) -> Option<String> {
        self.value(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Read a signed integer.
    fn int(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(|v| v.as_int())
    }

    /// Read an unsigned long.
    fn unsigned_long(&self, key: &str) -> Option<u64> {
        self.value(key).and_then(|v| v.as_unsigned_long())
    }

    /// Read a timestamp map.
    fn timestamp_map(&self, key: &str) -> Option<BTreeMap<String, u64>> {
        match self.value(key) {
            Some(PrefValue::TimestampMap(m)) => Some(m),
            _ => None,
        }
    }

    /// Write a string.
    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_value(key, PrefValue::String(value.to_owned()))
    }

    /// Write a signed integer.
    fn set_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set_value(key, PrefValue::Int(value))
    }

    /// Write an unsigned long.
    fn set_unsigned_long(&self, key: &str, value: u64) -> Result<(), StoreError> {
        self.set_value(key, PrefValue::UnsignedLong(value))
    }

    /// Write a timestamp map, replacing (not merging) any previous map.
    fn set_timestamp_map(&self, key: &str, value: &BTreeMap<String, u64>) -> Result<(), StoreError> {
        self.set_value(key, PrefValue::TimestampMap(value.clone()))
    }
}

/// When a secret may be read back, mirroring platform keychain classes.
///
/// Enforcement belongs to the platform store; implementations without such a
/// notion record the value and ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable once the device has been unlocked after boot.
    #[default]
    AfterFirstUnlock,
    /// Readable only while the device is unlocked.
    WhenUnlocked,
    /// As `AfterFirstUnlock`, never migrated to another device.
    AfterFirstUnlockThisDeviceOnly,
    /// As `WhenUnlocked`, never migrated to another device.
    WhenUnlockedThisDeviceOnly,
}

/// Secret storage addressed by string labels.
pub trait SecureStore: Send + Sync {
    /// Read a secret. Returns `Ok(None)` if no secret exists under `label`.
    fn secret(&self, label: &str) -> Result<Option<Zeroizing<String>>, StoreError>;

    /// Write a secret, replacing any previous secret under `label`.
    fn set_secret(
        &self,
        label: &str,
        secret: &str,
        accessibility: Accessibility,
    ) -> Result<(), StoreError>;

    /// Remove a secret. Returns whether a secret was present; removing a
    /// missing secret succeeds with `false`.
    fn remove_secret(&self, label: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads_ignore_other_types() {
        let store = MemoryPlainStore::new();
        store.set_string("name", "laptop").unwrap();
        store.set_unsigned_long("ts", 42).unwrap();

        assert_eq!(store.string("name").as_deref(), Some("laptop"));
        assert_eq!(store.unsigned_long("name"), None);
        assert_eq!(store.int("ts"), None);
        assert_eq!(store.unsigned_long("ts"), Some(42));
        assert_eq!(store.string("missing"), None);
    }

    #[test]
    fn timestamp_map_is_replaced_not_merged() {
        let store = MemoryPlainStore::new();
        let first = BTreeMap::from([("meta".to_string(), 1), ("crypto".to_string(), 2)]);
        let second = BTreeMap::from([("tabs".to_string(), 3)]);

        store.set_timestamp_map("lastFetched", &first).unwrap();
        store.set_timestamp_map("lastFetched", &second).unwrap();

        assert_eq!(store.timestamp_map("lastFetched"), Some(second));
    }

    #[test]
    fn pref_value_serializes_tagged() {
        let json = serde_json::to_string(&PrefValue::UnsignedLong(7)).unwrap();
        assert_eq!(json, r#"{"type":"unsigned_long","value":7}"#);

        let back: PrefValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PrefValue::UnsignedLong(7));
    }

    #[test]
    fn default_accessibility_is_after_first_unlock() {
        assert_eq!(Accessibility::default(), Accessibility::AfterFirstUnlock);
    }
}
