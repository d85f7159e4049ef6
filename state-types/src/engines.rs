//! Local enablement state for sync engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{ControlRecord, RecordError};

/// Which data categories the user has enabled or declined on this client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfiguration {
    /// Engines enabled locally.
    #[serde(default)]
    pub enabled: BTreeSet<String>,
    /// Engines declined locally.
    #[serde(default)]
    pub declined: BTreeSet<String>,
}

impl EngineConfiguration {
    /// Create a configuration from enabled and declined engine names.
    pub fn new<E, D>(enabled: E, declined: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            declined: declined.into_iter().map(Into::into).collect(),
        }
    }

    /// Mirror the declarations of a control record.
    pub fn from_control_record(record: &ControlRecord) -> Self {
        Self {
            enabled: record.engines.keys().cloned().collect(),
            declined: record.declined.clone(),
        }
    }

    /// Parse from a JSON payload.
    pub fn from_payload(payload: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Serialize to a JSON payload.
    pub fn to_payload(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }
}
