//! Where a snapshot checkpoints to.

use std::sync::Arc;

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::store::{Accessibility, PlainStore, SecureStore};

/// The pair of stores a snapshot persists into, plus where diagnostics go.
///
/// Cloning a target is cheap and yields a handle to the same stores.
#[derive(Clone)]
pub struct PersistenceTarget {
    plain: Arc<dyn PlainStore>,
    secure: Arc<dyn SecureStore>,
    diagnostics: Arc<dyn DiagnosticSink>,
    accessibility: Accessibility,
}

impl PersistenceTarget {
    /// Create a target that logs diagnostics through `tracing` and stores
    /// secrets as [`Accessibility::AfterFirstUnlock`].
    pub fn new(plain: Arc<dyn PlainStore>, secure: Arc<dyn SecureStore>) -> Self {
        Self {
            plain,
            secure,
            diagnostics: Arc::new(TracingSink),
            accessibility: Accessibility::default(),
        }
    }

    /// Send diagnostics to `sink` instead.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Store secrets with a different accessibility.
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// The plain store.
    pub fn plain(&self) -> &dyn PlainStore {
        self.plain.as_ref()
    }

    /// The secure store.
    pub fn secure(&self) -> &dyn SecureStore {
        self.secure.as_ref()
    }

    /// Accessibility used for secrets written through this target.
    pub fn accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// Emit a diagnostic.
    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.emit(diagnostic);
    }

    /// Check whether two targets address the same stores.
    pub fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.plain, &other.plain) && Arc::ptr_eq(&self.secure, &other.secure)
    }
}

impl std::fmt::Debug for PersistenceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceTarget")
            .field("plain", &Arc::as_ptr(&self.plain))
            .field("secure", &Arc::as_ptr(&self.secure))
            .field("accessibility", &self.accessibility)
            .finish()
    }
}
