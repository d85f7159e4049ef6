//! Staging area for deriving a new [`Scratchpad`].
//!
//! A builder owns copies of every snapshot field. Setters edit those copies
//! (and any derived fields) and return `&mut Self` for chaining; nothing is
//! visible to anyone else until [`ScratchpadBuilder::build`]. Builders never
//! perform I/O.
//!
//! A builder is meant for a single evolve, edit, build sequence. Exclusive
//! `&mut` access already rules out concurrent edits.

use std::collections::BTreeMap;
use zerok_state_types::{
    ClientGuid, ControlRecord, EngineConfiguration, Fetched, KeyBundle, KeyLabel, KeyRecord,
    Timestamp,
};

use crate::scratchpad::{Scratchpad, CRYPTO_COLLECTION, DEFAULT_CLIENT_NAME, META_COLLECTION};
use crate::target::PersistenceTarget;

/// Mutable staging copy of a [`Scratchpad`].
#[derive(Debug, Clone)]
pub struct ScratchpadBuilder {
    key_material: KeyBundle,
    key_label: KeyLabel,
    retired_key_labels: Vec<KeyLabel>,
    control_record: Option<Fetched<ControlRecord>>,
    key_record: Option<Fetched<KeyRecord>>,
    key_record_unreadable: bool,
    collection_timestamps: BTreeMap<String, Timestamp>,
    engine_configuration: Option<EngineConfiguration>,
    client_guid: ClientGuid,
    client_name: String,
    client_record_last_upload: Timestamp,
    target: PersistenceTarget,
}

impl ScratchpadBuilder {
    /// Builder for a brand new snapshot.
    pub(crate) fn fresh(key_material: KeyBundle, target: PersistenceTarget) -> Self {
        Self {
            key_material,
            key_label: KeyLabel::generate(),
            retired_key_labels: Vec::new(),
            control_record: None,
            key_record: None,
            key_record_unreadable: false,
            collection_timestamps: BTreeMap::new(),
            engine_configuration: None,
            client_guid: ClientGuid::generate(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_record_last_upload: 0,
            target,
        }
    }

    /// Builder pre-populated with a snapshot's fields.
    pub(crate) fn from_scratchpad(scratchpad: &Scratchpad) -> Self {
        Self {
            key_material: scratchpad.key_material.clone(),
            key_label: scratchpad.key_label.clone(),
            retired_key_labels: scratchpad.retired_key_labels.clone(),
            control_record: scratchpad.control_record.clone(),
            key_record: scratchpad.key_record.clone(),
            key_record_unreadable: scratchpad.key_record_unreadable,
            collection_timestamps: scratchpad.collection_timestamps.clone(),
            engine_configuration: scratchpad.engine_configuration.clone(),
            client_guid: scratchpad.client_guid.clone(),
            client_name: scratchpad.client_name.clone(),
            client_record_last_upload: scratchpad.client_record_last_upload,
            target: scratchpad.target.clone(),
        }
    }

    /// Set the cached control record.
    ///
    /// A present record also sets the `"meta"` fetch timestamp to the record's
    /// timestamp. Clearing the record leaves timestamps alone.
    pub fn set_control_record(
        &mut self,
        control_record: Option<Fetched<ControlRecord>>,
    ) -> &mut Self {
        if let Some(fetched) = &control_record {
            self.collection_timestamps
                .insert(META_COLLECTION.to_string(), fetched.timestamp);
        }
        self.control_record = control_record;
        self
    }

    /// Set the cached key record.
    ///
    /// A present record also sets the `"crypto"` fetch timestamp to the
    /// record's timestamp. Clearing the record leaves timestamps alone.
    pub fn set_key_record(&mut self, key_record: Option<Fetched<KeyRecord>>) -> &mut Self {
        if let Some(fetched) = &key_record {
            self.collection_timestamps
                .insert(CRYPTO_COLLECTION.to_string(), fetched.timestamp);
        }
        self.key_record = key_record;
        self.key_record_unreadable = false;
        self
    }

    /// Record when a collection was last fetched.
    pub fn set_collection_timestamp(
        &mut self,
        collection: impl Into<String>,
        timestamp: Timestamp,
    ) -> &mut Self {
        self.collection_timestamps
            .insert(collection.into(), timestamp);
        self
    }

    /// Replace every collection fetch timestamp with an empty mapping.
    pub fn clear_fetch_timestamps(&mut self) -> &mut Self {
        self.collection_timestamps = BTreeMap::new();
        self
    }

    /// Record when the client record was last uploaded.
    pub fn set_client_record_last_upload(&mut self, timestamp: Timestamp) -> &mut Self {
        self.client_record_last_upload = timestamp;
        self
    }

    /// Mark the client record as never uploaded.
    pub fn clear_client_upload_timestamp(&mut self) -> &mut Self {
        self.client_record_last_upload = 0;
        self
    }

    /// Set the client display name.
    pub fn set_client_name(&mut self, client_name: impl Into<String>) -> &mut Self {
        self.client_name = client_name.into();
        self
    }

    /// Set local engine enablement.
    pub fn set_engine_configuration(
        &mut self,
        engine_configuration: Option<EngineConfiguration>,
    ) -> &mut Self {
        self.engine_configuration = engine_configuration;
        self
    }

    /// Replace the in-memory key material.
    ///
    /// This is the only way to change key material. It always issues a fresh
    /// key label, retires the current one (its secure-store secret is removed
    /// on the next persist) and drops the cached key record, which was
    /// decrypted with the old material.
    pub fn replace_key_material(&mut self, key_material: KeyBundle) -> &mut Self {
        let retired = std::mem::replace(&mut self.key_label, KeyLabel::generate());
        if !self.retired_key_labels.contains(&retired) {
            self.retired_key_labels.push(retired);
        }
        self.key_material = key_material;
        self.key_record = None;
        self.key_record_unreadable = false;
        self
    }

    /// Drop the retired key labels.
    ///
    /// Call this once a checkpoint has removed their secrets; a later
    /// checkpoint will no longer try to remove them.
    pub fn forget_retired_labels(&mut self) -> &mut Self {
        self.retired_key_labels.clear();
        self
    }

    /// Checkpoint to a different pair of stores.
    pub fn set_target(&mut self, target: PersistenceTarget) -> &mut Self {
        self.target = target;
        self
    }

    /// Adopt a key label read back from storage.
    pub(crate) fn set_key_label(&mut self, key_label: KeyLabel) -> &mut Self {
        self.key_label = key_label;
        self
    }

    /// Record that a key record is persisted but its secret could not be read.
    pub(crate) fn mark_key_record_unreadable(&mut self) -> &mut Self {
        self.key_record = None;
        self.key_record_unreadable = true;
        self
    }

    /// Adopt a client GUID read back from storage.
    pub(crate) fn set_client_guid(&mut self, client_guid: ClientGuid) -> &mut Self {
        self.client_guid = client_guid;
        self
    }

    /// Staged collection fetch timestamps.
    pub fn collection_timestamps(&self) -> &BTreeMap<String, Timestamp> {
        &self.collection_timestamps
    }

    /// Staged control record.
    pub fn control_record(&self) -> Option<&Fetched<ControlRecord>> {
        self.control_record.as_ref()
    }

    /// Staged key record.
    pub fn key_record(&self) -> Option<&Fetched<KeyRecord>> {
        self.key_record.as_ref()
    }

    /// Staged key label.
    pub fn key_label(&self) -> &KeyLabel {
        &self.key_label
    }

    /// Produce a new snapshot from the staged fields.
    ///
    /// The builder stays usable. Each call copies the staged fields, so
    /// snapshots built earlier never observe later edits.
    pub fn build(&self) -> Scratchpad {
        Scratchpad {
            key_material: self.key_material.clone(),
            key_label: self.key_label.clone(),
            retired_key_labels: self.retired_key_labels.clone(),
            control_record: self.control_record.clone(),
            key_record: self.key_record.clone(),
            key_record_unreadable: self.key_record_unreadable,
            collection_timestamps: self.collection_timestamps.clone(),
            engine_configuration: self.engine_configuration.clone(),
            client_guid: self.client_guid.clone(),
            client_name: self.client_name.clone(),
            client_record_last_upload: self.client_record_last_upload,
            target: self.target.clone(),
        }
    }
}
