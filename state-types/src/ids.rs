//! Opaque identifiers for client state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Random bytes behind a generated identifier (9 bytes = 12 base64 chars).
const GENERATED_ID_BYTES: usize = 9;

fn generate_id() -> String {
    let mut bytes = [0u8; GENERATED_ID_BYTES];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Indirection label for key material held in the secure store.
///
/// The plain store only ever holds this label; the secret itself lives in the
/// secure store under [`KeyLabel::secure_store_label`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyLabel(String);

impl KeyLabel {
    /// Prefix of every secure-store entry addressed by a key label.
    pub const SECURE_STORE_PREFIX: &'static str = "keys.";

    /// Generate a fresh random label.
    pub fn generate() -> Self {
        Self(generate_id())
    }

    /// Wrap an existing label (for example one read back from storage).
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Get the label string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The secure-store address for this label: `"keys." + label`.
    pub fn secure_store_label(&self) -> String {
        format!("{}{}", Self::SECURE_STORE_PREFIX, self.0)
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyLabel({})", self.0)
    }
}

/// Stable identifier for this client in the clients collection.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientGuid(String);

impl ClientGuid {
    /// Generate a fresh random GUID.
    pub fn generate() -> Self {
        Self(generate_id())
    }

    /// Wrap an existing GUID.
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// Get the GUID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClientGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientGuid({})", self.0)
    }
}
