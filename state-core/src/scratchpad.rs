//! Immutable snapshots of client sync state.
//!
//! A [`Scratchpad`] holds everything a sync client needs to remember between
//! sessions: cached control and key records, per-collection fetch
//! timestamps, the key label that addresses secret material in the secure
//! store, and client identity.
//!
//! Snapshots are never mutated. Every change goes through
//! [`Scratchpad::evolve`], edits on the returned builder, and
//! [`ScratchpadBuilder::build`], which yields a new snapshot. Holders of the
//! old snapshot are unaffected, so two snapshots can be compared to decide
//! which one to keep.
//!
//! Persistence is explicit: [`Scratchpad::checkpoint`] writes to the
//! snapshot's [`PersistenceTarget`]. Dropping a snapshot writes nothing.

use std::collections::BTreeMap;
use zerok_state_types::{
    ClientGuid, ControlRecord, EngineConfiguration, Fetched, KeyBundle, KeyLabel, KeyRecord,
    Timestamp,
};

use crate::builder::ScratchpadBuilder;
use crate::codec::{self, PersistError};
use crate::target::PersistenceTarget;

/// Client name used until the user picks one.
pub const DEFAULT_CLIENT_NAME: &str = "0k-sync client";

/// Collection whose timestamp tracks the cached control record.
pub const META_COLLECTION: &str = "meta";

/// Collection whose timestamp tracks the cached key record.
pub const CRYPTO_COLLECTION: &str = "crypto";

/// An immutable snapshot of client sync state.
#[derive(Debug, Clone)]
pub struct Scratchpad {
    pub(crate) key_material: KeyBundle,
    pub(crate) key_label: KeyLabel,
    pub(crate) retired_key_labels: Vec<KeyLabel>,
    pub(crate) control_record: Option<Fetched<ControlRecord>>,
    pub(crate) key_record: Option<Fetched<KeyRecord>>,
    pub(crate) key_record_unreadable: bool,
    pub(crate) collection_timestamps: BTreeMap<String, Timestamp>,
    pub(crate) engine_configuration: Option<EngineConfiguration>,
    pub(crate) client_guid: ClientGuid,
    pub(crate) client_name: String,
    pub(crate) client_record_last_upload: Timestamp,
    pub(crate) target: PersistenceTarget,
}

impl Scratchpad {
    /// Create a fresh snapshot: no cached records, zeroed timestamps, a newly
    /// generated key label and client GUID, and the default client name.
    pub fn fresh(key_material: KeyBundle, target: PersistenceTarget) -> Self {
        ScratchpadBuilder::fresh(key_material, target).build()
    }

    /// Create a fresh snapshot with a specific client name.
    pub fn fresh_named(
        key_material: KeyBundle,
        target: PersistenceTarget,
        client_name: impl Into<String>,
    ) -> Self {
        ScratchpadBuilder::fresh(key_material, target)
            .set_client_name(client_name)
            .build()
    }

    /// Restore from `target`, or start fresh if nothing readable is persisted.
    pub fn restore_or_fresh(key_material: KeyBundle, target: PersistenceTarget) -> Self {
        match codec::restore(&target, key_material.clone()) {
            Some(scratchpad) => scratchpad,
            None => Self::fresh(key_material, target),
        }
    }

    /// Start staging changes. The snapshot itself is untouched.
    pub fn evolve(&self) -> ScratchpadBuilder {
        ScratchpadBuilder::from_scratchpad(self)
    }

    /// A copy of this snapshot with a different cached control record.
    pub fn with_control_record(&self, control_record: Option<Fetched<ControlRecord>>) -> Self {
        self.evolve().set_control_record(control_record).build()
    }

    /// A copy of this snapshot with a different cached key record.
    pub fn with_key_record(&self, key_record: Option<Fetched<KeyRecord>>) -> Self {
        self.evolve().set_key_record(key_record).build()
    }

    /// Start over after the server's sync epoch changed incompatibly.
    ///
    /// Caches `control_record`, drops the key record, every collection fetch
    /// timestamp and the client upload timestamp. The resulting timestamps
    /// hold only `"meta"`, set from `control_record`.
    ///
    /// The key label is kept. The secure-store secret under it is removed by
    /// the next [`checkpoint`](Self::checkpoint), because the snapshot no
    /// longer has a key record.
    pub fn reset_for_fresh_start(&self, control_record: Fetched<ControlRecord>) -> Self {
        self.evolve()
            .set_key_record(None)
            .clear_fetch_timestamps()
            .clear_client_upload_timestamp()
            .set_control_record(Some(control_record))
            .build()
    }

    /// Persist this snapshot to its target and return it for chaining.
    ///
    /// On error the persisted state is indeterminate; calling `checkpoint`
    /// again is safe because every write overwrites.
    pub fn checkpoint(&self) -> Result<&Self, PersistError> {
        codec::persist(self, &self.target)?;
        Ok(self)
    }

    /// Persist this snapshot, then return a copy without retired key labels.
    ///
    /// Their secrets are gone once the checkpoint succeeds, so the returned
    /// snapshot stops carrying them.
    pub fn checkpoint_and_prune(&self) -> Result<Self, PersistError> {
        codec::persist(self, &self.target)?;
        if self.retired_key_labels.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.evolve().forget_retired_labels().build())
    }

    /// In-memory key material. Never persisted.
    pub fn key_material(&self) -> &KeyBundle {
        &self.key_material
    }

    /// Label addressing the key record secret in the secure store.
    pub fn key_label(&self) -> &KeyLabel {
        &self.key_label
    }

    /// Labels replaced by key material rotation whose secrets are still to be
    /// removed from the secure store.
    pub fn retired_key_labels(&self) -> &[KeyLabel] {
        &self.retired_key_labels
    }

    /// Cached control record.
    pub fn control_record(&self) -> Option<&Fetched<ControlRecord>> {
        self.control_record.as_ref()
    }

    /// Cached key record.
    pub fn key_record(&self) -> Option<&Fetched<KeyRecord>> {
        self.key_record.as_ref()
    }

    /// Whether a key record is persisted but its secret could not be read
    /// (locked store, wrong store key).
    ///
    /// While set, checkpoints leave the persisted key record alone instead of
    /// removing it. Setting a key record or replacing key material clears it.
    pub fn key_record_unreadable(&self) -> bool {
        self.key_record_unreadable
    }

    /// Last-fetched timestamp per collection.
    pub fn collection_timestamps(&self) -> &BTreeMap<String, Timestamp> {
        &self.collection_timestamps
    }

    /// Last-fetched timestamp of one collection.
    pub fn collection_timestamp(&self, collection: &str) -> Option<Timestamp> {
        self.collection_timestamps.get(collection).copied()
    }

    /// Local engine enablement.
    pub fn engine_configuration(&self) -> Option<&EngineConfiguration> {
        self.engine_configuration.as_ref()
    }

    /// Stable identifier for this client.
    pub fn client_guid(&self) -> &ClientGuid {
        &self.client_guid
    }

    /// Display name for this client.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// When the client record was last uploaded (0 = never).
    pub fn client_record_last_upload(&self) -> Timestamp {
        self.client_record_last_upload
    }

    /// Where this snapshot checkpoints to.
    pub fn target(&self) -> &PersistenceTarget {
        &self.target
    }
}

impl PartialEq for Scratchpad {
    fn eq(&self, other: &Self) -> bool {
        self.key_material == other.key_material
            && self.key_label == other.key_label
            && self.retired_key_labels == other.retired_key_labels
            && self.control_record == other.control_record
            && self.key_record == other.key_record
            && self.key_record_unreadable == other.key_record_unreadable
            && self.collection_timestamps == other.collection_timestamps
            && self.engine_configuration == other.engine_configuration
            && self.client_guid == other.client_guid
            && self.client_name == other.client_name
            && self.client_record_last_upload == other.client_record_last_upload
            && self.target.is_same(&other.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryPlainStore, MemorySecureStore};
    use std::sync::Arc;
    use zerok_state_types::EngineMeta;

    fn target() -> PersistenceTarget {
        PersistenceTarget::new(
            Arc::new(MemoryPlainStore::new()),
            Arc::new(MemorySecureStore::new()),
        )
    }

    fn control(sync_id: &str, ts: Timestamp) -> Fetched<ControlRecord> {
        Fetched::new(
            ControlRecord::new(sync_id, 5).with_engine("tabs", EngineMeta::new(1, "t")),
            ts,
        )
    }

    fn keys(ts: Timestamp) -> Fetched<KeyRecord> {
        Fetched::new(KeyRecord::new(KeyBundle::random()), ts)
    }

    #[test]
    fn fresh_snapshot_is_empty() {
        let scratchpad = Scratchpad::fresh(KeyBundle::random(), target());

        assert!(scratchpad.control_record().is_none());
        assert!(scratchpad.key_record().is_none());
        assert!(scratchpad.collection_timestamps().is_empty());
        assert!(scratchpad.engine_configuration().is_none());
        assert_eq!(scratchpad.client_name(), DEFAULT_CLIENT_NAME);
        assert_eq!(scratchpad.client_record_last_upload(), 0);
        assert!(scratchpad.retired_key_labels().is_empty());
    }

    #[test]
    fn fresh_snapshots_get_distinct_labels() {
        let material = KeyBundle::random();
        let a = Scratchpad::fresh(material.clone(), target());
        let b = Scratchpad::fresh(material, target());
        assert_ne!(a.key_label(), b.key_label());
        assert_ne!(a.client_guid(), b.client_guid());
    }

    #[test]
    fn fresh_named_sets_client_name() {
        let scratchpad = Scratchpad::fresh_named(KeyBundle::random(), target(), "Work laptop");
        assert_eq!(scratchpad.client_name(), "Work laptop");
    }

    #[test]
    fn evolve_without_edits_is_equal() {
        let scratchpad = Scratchpad::fresh(KeyBundle::random(), target())
            .with_control_record(Some(control("a", 100)))
            .with_key_record(Some(keys(200)));

        assert_eq!(scratchpad.evolve().build(), scratchpad);
    }

    #[test]
    fn with_control_record_leaves_original_untouched() {
        let original = Scratchpad::fresh(KeyBundle::random(), target());
        let updated = original.with_control_record(Some(control("a", 100)));

        assert!(original.control_record().is_none());
        assert!(original.collection_timestamps().is_empty());
        assert_eq!(updated.control_record(), Some(&control("a", 100)));
        assert_eq!(updated.collection_timestamp(META_COLLECTION), Some(100));
    }

    #[test]
    fn with_key_record_syncs_crypto_timestamp() {
        let scratchpad =
            Scratchpad::fresh(KeyBundle::random(), target()).with_key_record(Some(keys(300)));
        assert_eq!(scratchpad.collection_timestamp(CRYPTO_COLLECTION), Some(300));
    }

    #[test]
    fn clearing_control_record_keeps_meta_timestamp() {
        let scratchpad = Scratchpad::fresh(KeyBundle::random(), target())
            .with_control_record(Some(control("a", 100)))
            .with_control_record(None);

        assert!(scratchpad.control_record().is_none());
        assert_eq!(scratchpad.collection_timestamp(META_COLLECTION), Some(100));
    }

    #[test]
    fn fresh_start_resets_everything_but_the_label() {
        let before = Scratchpad::fresh(KeyBundle::random(), target())
            .evolve()
            .set_control_record(Some(control("old", 100)))
            .set_key_record(Some(keys(200)))
            .set_collection_timestamp("bookmarks", 150)
            .set_client_record_last_upload(175)
            .build();

        let fresh = control("new", 500);
        let after = before.reset_for_fresh_start(fresh.clone());

        assert_eq!(after.control_record(), Some(&fresh));
        assert!(after.key_record().is_none());
        assert_eq!(
            after.collection_timestamps(),
            &BTreeMap::from([(META_COLLECTION.to_string(), 500)])
        );
        assert_eq!(after.client_record_last_upload(), 0);
        assert_eq!(after.key_label(), before.key_label());
        assert_eq!(after.client_guid(), before.client_guid());
    }

    #[test]
    fn equality_includes_target_identity() {
        let material = KeyBundle::random();
        let scratchpad = Scratchpad::fresh(material, target());
        let elsewhere = ScratchpadBuilder::from_scratchpad(&scratchpad)
            .set_target(target())
            .build();

        assert_ne!(scratchpad, elsewhere);
        assert_eq!(scratchpad, scratchpad.clone());
    }

    #[test]
    fn snapshots_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Scratchpad>();
    }

    #[test]
    fn checkpoint_and_prune_drops_retired_labels() {
        let secure = MemorySecureStore::new();
        let target = PersistenceTarget::new(
            Arc::new(MemoryPlainStore::new()),
            Arc::new(secure.clone()),
        );
        let mut current = Scratchpad::fresh(KeyBundle::random(), target)
            .with_key_record(Some(keys(100)))
            .checkpoint_and_prune()
            .unwrap();

        for ts in [200, 300, 400] {
            let rotated = current
                .evolve()
                .replace_key_material(KeyBundle::random())
                .set_key_record(Some(keys(ts)))
                .build();
            assert_eq!(rotated.retired_key_labels().len(), 1);
            current = rotated.checkpoint_and_prune().unwrap();
            assert!(current.retired_key_labels().is_empty());
        }

        assert_eq!(
            secure.labels(),
            vec![current.key_label().secure_store_label()]
        );
    }
}
