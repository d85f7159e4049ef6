//! Key material and the cached key record.
//!
//! A [`KeyBundle`] is a pair of 256-bit keys (encryption + HMAC). It is used
//! both for the in-memory key material that unlocks a session and for the
//! per-collection keys carried by the decrypted [`KeyRecord`].
//!
//! # Security Notes
//!
//! - Key bytes are zeroized on drop
//! - `Debug` output never includes key bytes
//! - A key record payload contains secrets and only ever goes to the secure store

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::RecordError;

/// Key size for each half of a bundle (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// A symmetric key bundle: an encryption key and an HMAC key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBundle {
    encryption_key: [u8; KEY_SIZE],
    hmac_key: [u8; KEY_SIZE],
}

impl KeyBundle {
    /// Create a bundle from raw keys.
    pub fn from_keys(encryption_key: [u8; KEY_SIZE], hmac_key: [u8; KEY_SIZE]) -> Self {
        Self {
            encryption_key,
            hmac_key,
        }
    }

    /// Create a random bundle.
    pub fn random() -> Self {
        let mut bundle = Self {
            encryption_key: [0u8; KEY_SIZE],
            hmac_key: [0u8; KEY_SIZE],
        };
        getrandom::getrandom(&mut bundle.encryption_key).expect("getrandom failed");
        getrandom::getrandom(&mut bundle.hmac_key).expect("getrandom failed");
        bundle
    }

    /// Get the encryption key.
    pub fn encryption_key(&self) -> &[u8; KEY_SIZE] {
        &self.encryption_key
    }

    /// Get the HMAC key.
    pub fn hmac_key(&self) -> &[u8; KEY_SIZE] {
        &self.hmac_key
    }

    /// Decode a `[encryption, hmac]` pair of standard base64 strings.
    pub fn from_base64_pair(pair: &[String; 2]) -> Result<Self, RecordError> {
        Ok(Self {
            encryption_key: decode_key(&pair[0])?,
            hmac_key: decode_key(&pair[1])?,
        })
    }

    /// Encode as a `[encryption, hmac]` pair of standard base64 strings.
    pub fn to_base64_pair(&self) -> [String; 2] {
        [
            STANDARD.encode(self.encryption_key),
            STANDARD.encode(self.hmac_key),
        ]
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KeyBundle {{ encryption_key: [REDACTED], hmac_key: [REDACTED] }}"
        )
    }
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_SIZE], RecordError> {
    let bytes = Zeroizing::new(STANDARD.decode(encoded)?);
    if bytes.len() != KEY_SIZE {
        return Err(RecordError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Wire shape of a key record payload.
#[derive(Serialize, Deserialize)]
struct KeysPayload {
    default: [String; 2],
    #[serde(default)]
    collections: BTreeMap<String, [String; 2]>,
}

/// The decrypted key document: a default bundle plus per-collection overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    default: KeyBundle,
    collections: BTreeMap<String, KeyBundle>,
}

impl KeyRecord {
    /// Create a key record with only a default bundle.
    pub fn new(default: KeyBundle) -> Self {
        Self {
            default,
            collections: BTreeMap::new(),
        }
    }

    /// Add a collection-specific bundle (builder style).
    pub fn with_collection(mut self, collection: impl Into<String>, bundle: KeyBundle) -> Self {
        self.collections.insert(collection.into(), bundle);
        self
    }

    /// The default bundle.
    pub fn default_bundle(&self) -> &KeyBundle {
        &self.default
    }

    /// Collection-specific bundles.
    pub fn collections(&self) -> &BTreeMap<String, KeyBundle> {
        &self.collections
    }

    /// The bundle to use for a collection, falling back to the default.
    pub fn bundle_for(&self, collection: &str) -> &KeyBundle {
        self.collections.get(collection).unwrap_or(&self.default)
    }

    /// Parse and validate a key record payload.
    ///
    /// Fails if the JSON is malformed or any key is not 32 bytes of base64.
    pub fn from_payload(payload: &str) -> Result<Self, RecordError> {
        let parsed: KeysPayload = serde_json::from_str(payload)?;
        let default = KeyBundle::from_base64_pair(&parsed.default)?;
        let collections = parsed
            .collections
            .iter()
            .map(|(name, pair)| Ok((name.clone(), KeyBundle::from_base64_pair(pair)?)))
            .collect::<Result<BTreeMap<_, _>, RecordError>>()?;
        Ok(Self {
            default,
            collections,
        })
    }

    /// Serialize to a payload. The result holds secrets and is zeroized on drop.
    pub fn to_payload(&self) -> Result<Zeroizing<String>, RecordError> {
        let payload = KeysPayload {
            default: self.default.to_base64_pair(),
            collections: self
                .collections
                .iter()
                .map(|(name, bundle)| (name.clone(), bundle.to_base64_pair()))
                .collect(),
        };
        Ok(Zeroizing::new(serde_json::to_string(&payload)?))
    }
}
