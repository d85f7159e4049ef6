//! Versioned persistence of snapshots across the plain and secure stores.
//!
//! Layout version 1 uses these plain-store keys:
//!
//! | Key | Type | Meaning |
//! |---|---|---|
//! | `_v` | int | layout version |
//! | `global` | string | control record payload |
//! | `globalTS` | unsigned long | control record timestamp |
//! | `keyLabel` | string | label of the key record secret |
//! | `keysTS` | unsigned long | key record timestamp |
//! | `lastFetched` | timestamp map | per-collection fetch timestamps |
//! | `clientGUID` | string | client identifier |
//! | `clientName` | string | client display name |
//! | `clientLastUpload` | unsigned long | client record upload timestamp |
//! | `engineConfiguration` | string | local engine enablement payload |
//!
//! The key record payload lives only in the secure store, under
//! `"keys." + keyLabel`. Key material is never written anywhere.
//!
//! Restoration never fails: malformed or incomplete records are reported as
//! diagnostics and treated as absent, and an unknown layout version reads as
//! "nothing persisted". Persistence reports every write failure.

use thiserror::Error;
use zerok_state_types::{
    ClientGuid, ControlRecord, EngineConfiguration, Fetched, KeyBundle, KeyLabel, KeyRecord,
    RecordError,
};

use crate::builder::ScratchpadBuilder;
use crate::diagnostics::Diagnostic;
use crate::scratchpad::Scratchpad;
use crate::store::StoreError;
use crate::target::PersistenceTarget;

/// Layout version written by [`persist`].
pub const LAYOUT_VERSION: i64 = 1;

/// Plain-store keys.
pub mod keys {
    /// Layout version.
    pub const VERSION: &str = "_v";
    /// Control record payload.
    pub const GLOBAL: &str = "global";
    /// Control record timestamp.
    pub const GLOBAL_TS: &str = "globalTS";
    /// Key record label.
    pub const KEY_LABEL: &str = "keyLabel";
    /// Key record timestamp.
    pub const KEYS_TS: &str = "keysTS";
    /// Collection fetch timestamps.
    pub const LAST_FETCHED: &str = "lastFetched";
    /// Client GUID.
    pub const CLIENT_GUID: &str = "clientGUID";
    /// Client display name.
    pub const CLIENT_NAME: &str = "clientName";
    /// Client record upload timestamp.
    pub const CLIENT_LAST_UPLOAD: &str = "clientLastUpload";
    /// Engine configuration payload.
    pub const ENGINE_CONFIGURATION: &str = "engineConfiguration";
}

/// Errors from [`persist`].
#[derive(Debug, Error)]
pub enum PersistError {
    /// A plain-store write or removal failed.
    #[error("plain store write failed for {key}: {source}")]
    PlainStore {
        /// The key being written.
        key: &'static str,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A secure-store write or removal failed.
    #[error("secure store write failed for {label}: {source}")]
    SecureStore {
        /// The secure-store label being written.
        label: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A record could not be encoded. Nothing was written.
    #[error("failed to encode {field}: {source}")]
    Encode {
        /// The field being encoded.
        field: &'static str,
        /// Underlying encoding failure.
        #[source]
        source: RecordError,
    },
}

impl PersistError {
    /// Whether retrying the same persist can succeed.
    ///
    /// Store failures may be transient. An encoding failure will recur.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Encode { .. })
    }
}

/// Name of the key record secret in companion diagnostics.
const SECURE_KEY_RECORD: &str = "secure-store key record";

/// Outcome of reading the key record.
enum KeyRecordRead {
    Present(Fetched<KeyRecord>),
    Absent,
    /// The secure store refused the read. The record may still be intact.
    Unreadable,
}

/// Reads one layout version into a builder.
type Reader = fn(&PersistenceTarget, KeyBundle) -> Scratchpad;

/// Known layout versions. Add a version by adding an entry.
const READERS: &[(i64, Reader)] = &[(1, read_v1)];

fn reader_for(version: i64) -> Option<Reader> {
    READERS
        .iter()
        .find(|(known, _)| *known == version)
        .map(|(_, reader)| *reader)
}

/// Restore a snapshot from `target`.
///
/// Returns `None` when no layout version is persisted or the version is
/// unknown. The returned snapshot checkpoints back to `target`.
pub fn restore(target: &PersistenceTarget, key_material: KeyBundle) -> Option<Scratchpad> {
    let Some(version) = target.plain().int(keys::VERSION) else {
        target.emit(Diagnostic::NoPersistedState);
        return None;
    };

    let Some(reader) = reader_for(version) else {
        target.emit(Diagnostic::UnsupportedVersion { version });
        return None;
    };

    let scratchpad = reader(target, key_material);
    target.emit(Diagnostic::Restored {
        version,
        control_record: scratchpad.control_record().is_some(),
        key_record: scratchpad.key_record().is_some(),
    });
    Some(scratchpad)
}

fn read_v1(target: &PersistenceTarget, key_material: KeyBundle) -> Scratchpad {
    let plain = target.plain();
    let mut builder = ScratchpadBuilder::fresh(key_material, target.clone());

    // Timestamps first, so the record setters below overwrite their entries.
    if let Some(last_fetched) = plain.timestamp_map(keys::LAST_FETCHED) {
        for (collection, timestamp) in last_fetched {
            builder.set_collection_timestamp(collection, timestamp);
        }
    }

    builder.set_control_record(read_control_record(target));

    match plain.string(keys::KEY_LABEL) {
        Some(label) => {
            let label = KeyLabel::new(label);
            match read_key_record(target, &label) {
                KeyRecordRead::Present(record) => {
                    builder.set_key_record(Some(record));
                }
                KeyRecordRead::Absent => {}
                KeyRecordRead::Unreadable => {
                    builder.mark_key_record_unreadable();
                }
            }
            builder.set_key_label(label);
        }
        None => {
            if plain.unsigned_long(keys::KEYS_TS).is_some() {
                target.emit(Diagnostic::MissingCompanion {
                    field: keys::KEYS_TS,
                    companion: keys::KEY_LABEL,
                });
            }
        }
    }

    match plain.string(keys::CLIENT_GUID) {
        Some(guid) => {
            builder.set_client_guid(ClientGuid::new(guid));
        }
        None => target.emit(Diagnostic::ClientGuidRegenerated),
    }

    if let Some(name) = plain.string(keys::CLIENT_NAME) {
        builder.set_client_name(name);
    }

    builder
        .set_client_record_last_upload(plain.unsigned_long(keys::CLIENT_LAST_UPLOAD).unwrap_or(0))
        .set_engine_configuration(read_engine_configuration(target))
        .build()
}

fn read_control_record(target: &PersistenceTarget) -> Option<Fetched<ControlRecord>> {
    let plain = target.plain();
    match (
        plain.string(keys::GLOBAL),
        plain.unsigned_long(keys::GLOBAL_TS),
    ) {
        (Some(payload), Some(timestamp)) => match ControlRecord::from_payload(&payload) {
            Ok(record) => Some(Fetched::new(record, timestamp)),
            Err(e) => {
                target.emit(Diagnostic::MalformedControlRecord {
                    reason: e.to_string(),
                });
                None
            }
        },
        (Some(_), None) => {
            target.emit(Diagnostic::MissingCompanion {
                field: keys::GLOBAL,
                companion: keys::GLOBAL_TS,
            });
            None
        }
        (None, Some(_)) => {
            target.emit(Diagnostic::MissingCompanion {
                field: keys::GLOBAL_TS,
                companion: keys::GLOBAL,
            });
            None
        }
        (None, None) => None,
    }
}

fn read_key_record(target: &PersistenceTarget, label: &KeyLabel) -> KeyRecordRead {
    let timestamp = target.plain().unsigned_long(keys::KEYS_TS);

    let secret = match target.secure().secret(&label.secure_store_label()) {
        Ok(secret) => secret,
        Err(e) => {
            target.emit(Diagnostic::SecretUnavailable {
                label: label.to_string(),
                reason: e.to_string(),
            });
            return KeyRecordRead::Unreadable;
        }
    };

    match (secret, timestamp) {
        (Some(secret), Some(timestamp)) => match KeyRecord::from_payload(&secret) {
            Ok(record) => KeyRecordRead::Present(Fetched::new(record, timestamp)),
            Err(e) => {
                target.emit(Diagnostic::MalformedKeyRecord {
                    label: label.to_string(),
                    reason: e.to_string(),
                });
                KeyRecordRead::Absent
            }
        },
        (None, Some(_)) => {
            target.emit(Diagnostic::MissingCompanion {
                field: keys::KEYS_TS,
                companion: SECURE_KEY_RECORD,
            });
            KeyRecordRead::Absent
        }
        (Some(_), None) => {
            target.emit(Diagnostic::MissingCompanion {
                field: SECURE_KEY_RECORD,
                companion: keys::KEYS_TS,
            });
            KeyRecordRead::Absent
        }
        (None, None) => KeyRecordRead::Absent,
    }
}

fn read_engine_configuration(target: &PersistenceTarget) -> Option<EngineConfiguration> {
    let payload = target.plain().string(keys::ENGINE_CONFIGURATION)?;
    match EngineConfiguration::from_payload(&payload) {
        Ok(configuration) => Some(configuration),
        Err(e) => {
            target.emit(Diagnostic::MalformedEngineConfiguration {
                reason: e.to_string(),
            });
            None
        }
    }
}

fn plain_err(key: &'static str) -> impl FnOnce(StoreError) -> PersistError {
    move |source| PersistError::PlainStore { key, source }
}

fn secure_err(label: &str) -> impl FnOnce(StoreError) -> PersistError {
    let label = label.to_string();
    move |source| PersistError::SecureStore { label, source }
}

/// Persist `scratchpad` into `target` using the current layout version.
///
/// Write order:
/// 1. Encode every payload (an encoding failure writes nothing).
/// 2. Write the key record secret, before any plain-store reference to it.
/// 3. Write plain-store fields, removing those whose value is absent.
/// 4. Remove the secret under the current label if there is no key record,
///    then the secrets of retired labels.
/// 5. Write the layout version last.
///
/// A snapshot whose key record could not be read at restore
/// ([`Scratchpad::key_record_unreadable`]) leaves `keysTS` and the secret
/// as they are.
///
/// A failure stops at the failing write. Every step overwrites, so calling
/// `persist` again with the same snapshot is safe.
pub fn persist(scratchpad: &Scratchpad, target: &PersistenceTarget) -> Result<(), PersistError> {
    let plain = target.plain();
    let secure = target.secure();
    let secret_label = scratchpad.key_label().secure_store_label();

    let control_payload = scratchpad
        .control_record()
        .map(|fetched| {
            fetched
                .value
                .to_payload()
                .map(|payload| (payload, fetched.timestamp))
        })
        .transpose()
        .map_err(|source| PersistError::Encode {
            field: keys::GLOBAL,
            source,
        })?;
    let key_payload = scratchpad
        .key_record()
        .map(|fetched| {
            fetched
                .value
                .to_payload()
                .map(|payload| (payload, fetched.timestamp))
        })
        .transpose()
        .map_err(|source| PersistError::Encode {
            field: keys::KEYS_TS,
            source,
        })?;
    let engine_payload = scratchpad
        .engine_configuration()
        .map(EngineConfiguration::to_payload)
        .transpose()
        .map_err(|source| PersistError::Encode {
            field: keys::ENGINE_CONFIGURATION,
            source,
        })?;

    if let Some((payload, _)) = &key_payload {
        secure
            .set_secret(&secret_label, payload, target.accessibility())
            .map_err(secure_err(&secret_label))?;
    }

    match &control_payload {
        Some((payload, timestamp)) => {
            plain
                .set_string(keys::GLOBAL, payload)
                .map_err(plain_err(keys::GLOBAL))?;
            plain
                .set_unsigned_long(keys::GLOBAL_TS, *timestamp)
                .map_err(plain_err(keys::GLOBAL_TS))?;
        }
        None => {
            plain.remove(keys::GLOBAL).map_err(plain_err(keys::GLOBAL))?;
            plain
                .remove(keys::GLOBAL_TS)
                .map_err(plain_err(keys::GLOBAL_TS))?;
        }
    }

    let drop_key_record = key_payload.is_none() && !scratchpad.key_record_unreadable();

    plain
        .set_string(keys::KEY_LABEL, scratchpad.key_label().as_str())
        .map_err(plain_err(keys::KEY_LABEL))?;
    match &key_payload {
        Some((_, timestamp)) => plain
            .set_unsigned_long(keys::KEYS_TS, *timestamp)
            .map_err(plain_err(keys::KEYS_TS))?,
        None if drop_key_record => plain
            .remove(keys::KEYS_TS)
            .map_err(plain_err(keys::KEYS_TS))?,
        None => {}
    }

    plain
        .set_string(keys::CLIENT_GUID, scratchpad.client_guid().as_str())
        .map_err(plain_err(keys::CLIENT_GUID))?;
    plain
        .set_string(keys::CLIENT_NAME, scratchpad.client_name())
        .map_err(plain_err(keys::CLIENT_NAME))?;
    plain
        .set_unsigned_long(
            keys::CLIENT_LAST_UPLOAD,
            scratchpad.client_record_last_upload(),
        )
        .map_err(plain_err(keys::CLIENT_LAST_UPLOAD))?;
    plain
        .set_timestamp_map(keys::LAST_FETCHED, scratchpad.collection_timestamps())
        .map_err(plain_err(keys::LAST_FETCHED))?;
    match &engine_payload {
        Some(payload) => plain
            .set_string(keys::ENGINE_CONFIGURATION, payload)
            .map_err(plain_err(keys::ENGINE_CONFIGURATION))?,
        None => plain
            .remove(keys::ENGINE_CONFIGURATION)
            .map_err(plain_err(keys::ENGINE_CONFIGURATION))?,
    }

    if drop_key_record {
        secure
            .remove_secret(&secret_label)
            .map_err(secure_err(&secret_label))?;
    }

    for retired in scratchpad.retired_key_labels() {
        let label = retired.secure_store_label();
        if secure.remove_secret(&label).map_err(secure_err(&label))? {
            target.emit(Diagnostic::StaleSecretRemoved {
                label: retired.to_string(),
            });
        }
    }

    plain
        .set_int(keys::VERSION, LAYOUT_VERSION)
        .map_err(plain_err(keys::VERSION))?;

    target.emit(Diagnostic::Persisted {
        version: LAYOUT_VERSION,
    });
    Ok(())
}
