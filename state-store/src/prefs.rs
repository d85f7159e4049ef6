//! JSON preferences file implementing [`PlainStore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zerok_state_core::{PlainStore, PrefValue, StoreError};

use crate::atomic;

/// A plain store persisted as a single JSON object.
///
/// The whole file is loaded on [`open`](Self::open) and rewritten on every
/// write. A write that fails to reach disk leaves the in-memory view
/// unchanged.
#[derive(Debug)]
pub struct PrefsFile {
    path: PathBuf,
    values: Mutex<BTreeMap<String, PrefValue>>,
}

impl PrefsFile {
    /// Open the preferences file at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match atomic::read_file(&path)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => BTreeMap::new(),
        };
        tracing::debug!(path = %path.display(), keys = values.len(), "opened preferences file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PrefValue>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(
        &self,
        values: &mut BTreeMap<String, PrefValue>,
        staged: BTreeMap<String, PrefValue>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&staged)?;
        atomic::write_file(&self.path, &bytes)?;
        *values = staged;
        Ok(())
    }
}

impl PlainStore for PrefsFile {
    fn value(&self, key: &str) -> Option<PrefValue> {
        self.lock().get(key).cloned()
    }

    fn set_value(&self, key: &str, value: PrefValue) -> Result<(), StoreError> {
        let mut values = self.lock();
        if values.get(key) == Some(&value) {
            return Ok(());
        }
        let mut staged = values.clone();
        staged.insert(key.to_string(), value);
        self.commit(&mut values, staged)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut staged = values.clone();
        staged.remove(key);
        self.commit(&mut values, staged)
    }
}
