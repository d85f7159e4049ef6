//! The cached top-level control record.
//!
//! The control record describes the server-side collection layout and the
//! sync epoch (`syncID`). When the epoch changes, every cached timestamp and
//! key record on the client is stale.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::RecordError;

/// Per-engine declaration inside a control record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMeta {
    /// Engine storage format version.
    pub version: u32,
    /// Engine-level sync epoch.
    #[serde(rename = "syncID")]
    pub sync_id: String,
}

impl EngineMeta {
    /// Create an engine declaration.
    pub fn new(version: u32, sync_id: impl Into<String>) -> Self {
        Self {
            version,
            sync_id: sync_id.into(),
        }
    }
}

/// The top-level sync control document.
///
/// Only structural parsing is performed here. Whether a storage version is
/// acceptable is decided by the sync state machine, not this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Global sync epoch.
    #[serde(rename = "syncID")]
    pub sync_id: String,
    /// Server storage format version.
    #[serde(rename = "storageVersion")]
    pub storage_version: u32,
    /// Engines declared as enabled, by name.
    #[serde(default)]
    pub engines: BTreeMap<String, EngineMeta>,
    /// Engines explicitly declined by the user.
    #[serde(default)]
    pub declined: BTreeSet<String>,
}

impl ControlRecord {
    /// Create a control record with no engines.
    pub fn new(sync_id: impl Into<String>, storage_version: u32) -> Self {
        Self {
            sync_id: sync_id.into(),
            storage_version,
            engines: BTreeMap::new(),
            declined: BTreeSet::new(),
        }
    }

    /// Add an engine declaration (builder style).
    pub fn with_engine(mut self, name: impl Into<String>, meta: EngineMeta) -> Self {
        self.engines.insert(name.into(), meta);
        self
    }

    /// Add a declined engine (builder style).
    pub fn with_declined(mut self, name: impl Into<String>) -> Self {
        self.declined.insert(name.into());
        self
    }

    /// Parse a control record from its JSON payload.
    pub fn from_payload(payload: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Serialize this record to its JSON payload.
    pub fn to_payload(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Names of the engines this record declares.
    pub fn declared_engines(&self) -> BTreeSet<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    /// Check whether an engine is declined.
    pub fn is_declined(&self, name: &str) -> bool {
        self.declined.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "syncID": "abcdefghijkl",
        "storageVersion": 5,
        "engines": {
            "bookmarks": {"version": 2, "syncID": "bbbbbbbbbbbb"},
            "history": {"version": 1, "syncID": "hhhhhhhhhhhh"}
        },
        "declined": ["passwords"]
    }"#;

    #[test]
    fn parses_wire_field_names() {
        let record = ControlRecord::from_payload(PAYLOAD).unwrap();
        assert_eq!(record.sync_id, "abcdefghijkl");
        assert_eq!(record.storage_version, 5);
        assert_eq!(
            record.engines.get("bookmarks"),
            Some(&EngineMeta::new(2, "bbbbbbbbbbbb"))
        );
        assert!(record.is_declined("passwords"));
        assert!(!record.is_declined("history"));
    }

    #[test]
    fn engines_and_declined_are_optional() {
        let record =
            ControlRecord::from_payload(r#"{"syncID": "x", "storageVersion": 5}"#).unwrap();
        assert!(record.engines.is_empty());
        assert!(record.declined.is_empty());
    }

    #[test]
    fn payload_survives_reserialization() {
        let record = ControlRecord::from_payload(PAYLOAD).unwrap();
        let again = ControlRecord::from_payload(&record.to_payload().unwrap()).unwrap();
        assert_eq!(record, again);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(ControlRecord::from_payload("{not json").is_err());
        assert!(ControlRecord::from_payload(r#"{"syncID": 7}"#).is_err());
    }

    #[test]
    fn declared_engines_lists_names() {
        let record = ControlRecord::new("s", 5)
            .with_engine("tabs", EngineMeta::new(1, "t"))
            .with_engine("forms", EngineMeta::new(1, "f"))
            .with_declined("addons");

        let declared: Vec<&str> = record.declared_engines().into_iter().collect();
        assert_eq!(declared, vec!["forms", "tabs"]);
    }
}
