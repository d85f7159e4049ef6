//! In-memory stores for testing and embedding.
//!
//! Clones share the same underlying map, so a test can keep a handle to a
//! store it has handed to a snapshot and inspect what was written.

use super::{Accessibility, PlainStore, PrefValue, SecureStore, StoreError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroizing;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write-failure injection shared by both memory stores.
#[derive(Debug, Default)]
struct FailurePlan {
    fail_next_write: Option<String>,
    failing_keys: HashSet<String>,
}

impl FailurePlan {
    fn check(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(reason) = self.fail_next_write.take() {
            return Err(StoreError::WriteRejected {
                key: key.to_string(),
                reason,
            });
        }
        if self.failing_keys.contains(key) {
            return Err(StoreError::WriteRejected {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory plain store.
#[derive(Debug, Default, Clone)]
pub struct MemoryPlainStore {
    inner: Arc<Mutex<MemoryPlainInner>>,
}

#[derive(Debug, Default)]
struct MemoryPlainInner {
    values: BTreeMap<String, PrefValue>,
    failures: FailurePlan,
    writes: usize,
}

impl MemoryPlainStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored value.
    pub fn values(&self) -> BTreeMap<String, PrefValue> {
        lock(&self.inner).values.clone()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        lock(&self.inner).values.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).values.is_empty()
    }

    /// Number of successful writes and removals so far.
    pub fn write_count(&self) -> usize {
        lock(&self.inner).writes
    }

    /// Cause the next write or removal to fail with the given reason.
    pub fn fail_next_write(&self, reason: &str) {
        lock(&self.inner).failures.fail_next_write = Some(reason.to_string());
    }

    /// Cause every write or removal of `key` to fail until cleared.
    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.inner).failures.failing_keys.insert(key.to_string());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        lock(&self.inner).failures = FailurePlan::default();
    }
}

impl PlainStore for MemoryPlainStore {
    fn value(&self, key: &str) -> Option<PrefValue> {
        lock(&self.inner).values.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: PrefValue) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.failures.check(key)?;
        inner.values.insert(key.to_string(), value);
        inner.writes += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.failures.check(key)?;
        inner.values.remove(key);
        inner.writes += 1;
        Ok(())
    }
}

/// In-memory secure store.
#[derive(Debug, Default, Clone)]
pub struct MemorySecureStore {
    inner: Arc<Mutex<MemorySecureInner>>,
}

#[derive(Default)]
struct MemorySecureInner {
    secrets: HashMap<String, (Zeroizing<String>, Accessibility)>,
    failures: FailurePlan,
    locked: bool,
}

// Labels only, never secret values
impl std::fmt::Debug for MemorySecureInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecureInner")
            .field("labels", &self.secrets.keys().collect::<Vec<_>>())
            .field("failures", &self.failures)
            .field("locked", &self.locked)
            .finish()
    }
}

impl MemorySecureStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels currently holding a secret, sorted.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = lock(&self.inner).secrets.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Check whether a secret exists under `label`.
    pub fn contains(&self, label: &str) -> bool {
        lock(&self.inner).secrets.contains_key(label)
    }

    /// The accessibility a secret was stored with.
    pub fn accessibility(&self, label: &str) -> Option<Accessibility> {
        lock(&self.inner).secrets.get(label).map(|(_, a)| *a)
    }

    /// Number of secrets stored.
    pub fn len(&self) -> usize {
        lock(&self.inner).secrets.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).secrets.is_empty()
    }

    /// Make every read fail with [`StoreError::Locked`] until unlocked.
    pub fn set_locked(&self, locked: bool) {
        lock(&self.inner).locked = locked;
    }

    /// Cause the next write or removal to fail with the given reason.
    pub fn fail_next_write(&self, reason: &str) {
        lock(&self.inner).failures.fail_next_write = Some(reason.to_string());
    }

    /// Cause every write or removal of `label` to fail until cleared.
    pub fn fail_writes_to(&self, label: &str) {
        lock(&self.inner)
            .failures
            .failing_keys
            .insert(label.to_string());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        lock(&self.inner).failures = FailurePlan::default();
    }
}

impl SecureStore for MemorySecureStore {
    fn secret(&self, label: &str) -> Result<Option<Zeroizing<String>>, StoreError> {
        let inner = lock(&self.inner);
        if inner.locked {
            return Err(StoreError::Locked);
        }
        Ok(inner.secrets.get(label).map(|(secret, _)| secret.clone()))
    }

    fn set_secret(
        &self,
        label: &str,
        secret: &str,
        accessibility: Accessibility,
    ) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.failures.check(label)?;
        inner.secrets.insert(
            label.to_string(),
            (Zeroizing::new(secret.to_string()), accessibility),
        );
        Ok(())
    }

    fn remove_secret(&self, label: &str) -> Result<bool, StoreError> {
        let mut inner = lock(&self.inner);
        inner.failures.check(label)?;
        Ok(inner.secrets.remove(label).is_some())
    }
}
