//! Structured diagnostics for restoration and persistence.
//!
//! The codec never logs directly. It emits [`Diagnostic`] events into a
//! [`DiagnosticSink`], and the embedding application decides where they go.
//! [`TracingSink`] forwards them to `tracing`; [`RecordingSink`] keeps them in
//! memory so callers (and tests) can inspect exactly what happened.

use std::sync::Mutex;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Routine detail.
    Debug,
    /// Normal lifecycle milestone.
    Info,
    /// Recovered anomaly; state was treated as absent.
    Warn,
    /// Persisted state is inconsistent.
    Error,
}

/// Events emitted by the persistence codec and snapshot operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The plain store holds no layout version tag.
    NoPersistedState,
    /// The layout version tag is not one this build can read.
    UnsupportedVersion {
        /// The version found.
        version: i64,
    },
    /// The cached control record failed to parse and was dropped.
    MalformedControlRecord {
        /// Parse failure.
        reason: String,
    },
    /// The cached key record failed validation and was dropped.
    MalformedKeyRecord {
        /// Key label the secret was read under.
        label: String,
        /// Validation failure.
        reason: String,
    },
    /// The cached engine configuration failed to parse and was dropped.
    MalformedEngineConfiguration {
        /// Parse failure.
        reason: String,
    },
    /// A persisted field exists without its required companion.
    MissingCompanion {
        /// The field that was found.
        field: &'static str,
        /// The companion that was missing.
        companion: &'static str,
    },
    /// The secure store could not be read.
    SecretUnavailable {
        /// Key label the secret was requested under.
        label: String,
        /// Store failure.
        reason: String,
    },
    /// No client GUID was persisted, so a new one was generated.
    ClientGuidRegenerated,
    /// A snapshot was restored.
    Restored {
        /// Layout version read.
        version: i64,
        /// Whether a control record was restored.
        control_record: bool,
        /// Whether a key record was restored.
        key_record: bool,
    },
    /// A snapshot was persisted.
    Persisted {
        /// Layout version written.
        version: i64,
    },
    /// The secure-store entry of a retired key label was removed.
    StaleSecretRemoved {
        /// The retired key label.
        label: String,
    },
    /// The engines declared by the control record changed.
    EngineChoicesDiverged {
        /// Engines newly declared.
        enabled: Vec<String>,
        /// Engines no longer declared.
        disabled: Vec<String>,
        /// Engines newly declined.
        declined: Vec<String>,
        /// Engines no longer declined.
        undeclined: Vec<String>,
    },
}

impl Diagnostic {
    /// The severity of this event.
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoPersistedState | Self::StaleSecretRemoved { .. } => Severity::Debug,
            Self::Restored { .. }
            | Self::Persisted { .. }
            | Self::ClientGuidRegenerated
            | Self::EngineChoicesDiverged { .. } => Severity::Info,
            Self::UnsupportedVersion { .. }
            | Self::MalformedControlRecord { .. }
            | Self::MalformedKeyRecord { .. }
            | Self::MalformedEngineConfiguration { .. }
            | Self::SecretUnavailable { .. } => Severity::Warn,
            Self::MissingCompanion { .. } => Severity::Error,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPersistedState => write!(f, "no persisted state found"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported persisted layout version {}", version)
            }
            Self::MalformedControlRecord { reason } => {
                write!(f, "malformed cached control record, ignoring: {}", reason)
            }
            Self::MalformedKeyRecord { label, reason } => write!(
                f,
                "invalid key record under label {}, discarding: {}",
                label, reason
            ),
            Self::MalformedEngineConfiguration { reason } => write!(
                f,
                "malformed engine configuration, ignoring: {}",
                reason
            ),
            Self::MissingCompanion { field, companion } => {
                write!(f, "found {} but not {}", field, companion)
            }
            Self::SecretUnavailable { label, reason } => {
                write!(f, "secure store unavailable for label {}: {}", label, reason)
            }
            Self::ClientGuidRegenerated => write!(f, "no client GUID persisted, generated a new one"),
            Self::Restored {
                version,
                control_record,
                key_record,
            } => write!(
                f,
                "restored v{} state (control record: {}, key record: {})",
                version, control_record, key_record
            ),
            Self::Persisted { version } => write!(f, "persisted v{} state", version),
            Self::StaleSecretRemoved { label } => {
                write!(f, "removed secret for retired key label {}", label)
            }
            Self::EngineChoicesDiverged {
                enabled,
                disabled,
                declined,
                undeclined,
            } => write!(
                f,
                "engine choices changed (enabled: {:?}, disabled: {:?}, declined: {:?}, undeclined: {:?})",
                enabled, disabled, declined, undeclined
            ),
        }
    }
}

/// Receives diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Handle one diagnostic.
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Debug => tracing::debug!(target: "zerok_state", "{}", diagnostic),
            Severity::Info => tracing::info!(target: "zerok_state", "{}", diagnostic),
            Severity::Warn => tracing::warn!(target: "zerok_state", "{}", diagnostic),
            Severity::Error => tracing::error!(target: "zerok_state", "{}", diagnostic),
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every diagnostic recorded so far, oldest first.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Check whether any recorded diagnostic matches `predicate`.
    pub fn contains(&self, predicate: impl Fn(&Diagnostic) -> bool) -> bool {
        self.events().iter().any(predicate)
    }

    /// Remove and return every recorded diagnostic.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing::Dispatch;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl std::io::Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for TestWriter {
        type Writer = TestWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn anomalies_are_warnings_or_errors() {
        let missing = Diagnostic::MissingCompanion {
            field: "global",
            companion: "globalTS",
        };
        assert_eq!(missing.severity(), Severity::Error);

        let malformed = Diagnostic::MalformedControlRecord {
            reason: "eof".into(),
        };
        assert_eq!(malformed.severity(), Severity::Warn);
        assert!(Diagnostic::NoPersistedState.severity() < Severity::Info);
    }

    #[test]
    fn ignored_state_outranks_routine_backfill() {
        let unsupported = Diagnostic::UnsupportedVersion { version: 999 };
        assert_eq!(unsupported.severity(), Severity::Warn);
        assert_eq!(Diagnostic::ClientGuidRegenerated.severity(), Severity::Info);
        assert!(unsupported.severity() > Diagnostic::ClientGuidRegenerated.severity());
    }

    #[test]
    fn display_names_the_missing_companion() {
        let diagnostic = Diagnostic::MissingCompanion {
            field: "keysTS",
            companion: "secret",
        };
        assert_eq!(diagnostic.to_string(), "found keysTS but not secret");
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(Diagnostic::NoPersistedState);
        sink.emit(Diagnostic::Persisted { version: 1 });

        assert_eq!(
            sink.events(),
            vec![
                Diagnostic::NoPersistedState,
                Diagnostic::Persisted { version: 1 }
            ]
        );
        assert!(sink.contains(|d| matches!(d, Diagnostic::Persisted { .. })));

        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn tracing_sink_logs_at_severity() {
        let writer = TestWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let dispatch = Dispatch::new(subscriber);
        tracing::dispatcher::with_default(&dispatch, || {
            TracingSink.emit(Diagnostic::MalformedControlRecord {
                reason: "expected value".into(),
            });
            TracingSink.emit(Diagnostic::Persisted { version: 1 });
        });

        let logs = String::from_utf8(writer.buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("malformed cached control record"));
        assert!(logs.contains("WARN"));
        assert!(!logs.contains("persisted v1 state"));
    }
}
