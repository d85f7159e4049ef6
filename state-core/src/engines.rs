//! Engine-choice reconciliation.
//!
//! When a newer control record arrives, the engines it declares (and
//! declines) may differ from the previously cached one. This module detects
//! that divergence and, if asked, lets an [`EnginePolicy`] decide what the
//! client should do about it: update local enablement, push a revised
//! control record upstream, or both.

use std::collections::BTreeSet;
use zerok_state_types::{ControlRecord, EngineConfiguration};

use crate::diagnostics::Diagnostic;
use crate::scratchpad::Scratchpad;

/// Differences in engine declarations between two control records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineDivergence {
    /// Engines declared now but not before.
    pub enabled: BTreeSet<String>,
    /// Engines declared before but not now.
    pub disabled: BTreeSet<String>,
    /// Engines declined now but not before.
    pub declined: BTreeSet<String>,
    /// Engines declined before but not now.
    pub undeclined: BTreeSet<String>,
}

impl EngineDivergence {
    /// Compare `current` against `previous`.
    ///
    /// With no previous record every declaration in `current` counts as new.
    pub fn between(previous: Option<&ControlRecord>, current: &ControlRecord) -> Self {
        let empty = ControlRecord::new("", 0);
        let previous = previous.unwrap_or(&empty);

        let was_declared = previous.declared_engines();
        let is_declared = current.declared_engines();

        Self {
            enabled: is_declared
                .difference(&was_declared)
                .map(|name| name.to_string())
                .collect(),
            disabled: was_declared
                .difference(&is_declared)
                .map(|name| name.to_string())
                .collect(),
            declined: current
                .declined
                .difference(&previous.declined)
                .cloned()
                .collect(),
            undeclined: previous
                .declined
                .difference(&current.declined)
                .cloned()
                .collect(),
        }
    }

    /// Check whether the declarations are identical.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
            && self.disabled.is_empty()
            && self.declined.is_empty()
            && self.undeclined.is_empty()
    }

    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::EngineChoicesDiverged {
            enabled: self.enabled.iter().cloned().collect(),
            disabled: self.disabled.iter().cloned().collect(),
            declined: self.declined.iter().cloned().collect(),
            undeclined: self.undeclined.iter().cloned().collect(),
        }
    }
}

/// What a policy decided to do about divergent engine choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResolution {
    /// New local engine configuration, or `None` to keep the current one.
    pub engine_configuration: Option<EngineConfiguration>,
    /// Control record to upload, or `None` if the server is already right.
    pub upload: Option<ControlRecord>,
}

/// Decides how to respond to divergent engine choices.
pub trait EnginePolicy {
    /// Resolve a divergence between the cached control record and `current`.
    fn resolve(
        &self,
        scratchpad: &Scratchpad,
        divergence: &EngineDivergence,
        current: &ControlRecord,
    ) -> EngineResolution;
}

/// Mirror the server's declarations into the local configuration.
///
/// Never uploads anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdoptServerChoices;

impl EnginePolicy for AdoptServerChoices {
    fn resolve(
        &self,
        _scratchpad: &Scratchpad,
        _divergence: &EngineDivergence,
        current: &ControlRecord,
    ) -> EngineResolution {
        EngineResolution {
            engine_configuration: Some(EngineConfiguration::from_control_record(current)),
            upload: None,
        }
    }
}

/// Push locally declined engines to the server.
///
/// Engines the local configuration declines are removed from the server's
/// declarations and added to its declined set. Without a local configuration
/// nothing changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreferLocalChoices;

impl EnginePolicy for PreferLocalChoices {
    fn resolve(
        &self,
        scratchpad: &Scratchpad,
        _divergence: &EngineDivergence,
        current: &ControlRecord,
    ) -> EngineResolution {
        let Some(local) = scratchpad.engine_configuration() else {
            return EngineResolution::default();
        };

        let mut revised = current.clone();
        for name in &local.declined {
            revised.engines.remove(name);
            revised.declined.insert(name.clone());
        }
        for name in &local.enabled {
            revised.declined.remove(name);
        }

        EngineResolution {
            engine_configuration: None,
            upload: (revised != *current).then_some(revised),
        }
    }
}

impl Scratchpad {
    /// Compare the cached control record's engine declarations with
    /// `previous`.
    ///
    /// Divergence is reported as a diagnostic. No resolution is applied: the
    /// snapshot is returned unchanged with nothing to upload.
    pub fn reconcile_engine_choices(
        &self,
        previous: Option<&ControlRecord>,
    ) -> (Scratchpad, Option<ControlRecord>) {
        if let Some(divergence) = self.engine_divergence(previous) {
            self.target.emit(divergence.to_diagnostic());
        }
        (self.clone(), None)
    }

    /// As [`reconcile_engine_choices`](Self::reconcile_engine_choices), then
    /// let `policy` resolve any divergence.
    pub fn reconcile_engine_choices_with(
        &self,
        previous: Option<&ControlRecord>,
        policy: &dyn EnginePolicy,
    ) -> (Scratchpad, Option<ControlRecord>) {
        let (Some(divergence), Some(current)) =
            (self.engine_divergence(previous), self.control_record())
        else {
            return (self.clone(), None);
        };
        self.target.emit(divergence.to_diagnostic());

        let resolution = policy.resolve(self, &divergence, &current.value);
        let scratchpad = match resolution.engine_configuration {
            Some(configuration) => self
                .evolve()
                .set_engine_configuration(Some(configuration))
                .build(),
            None => self.clone(),
        };
        (scratchpad, resolution.upload)
    }

    fn engine_divergence(&self, previous: Option<&ControlRecord>) -> Option<EngineDivergence> {
        let current = self.control_record()?;
        let divergence = EngineDivergence::between(previous, &current.value);
        (!divergence.is_empty()).then_some(divergence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::store::{MemoryPlainStore, MemorySecureStore};
    use crate::target::PersistenceTarget;
    use std::sync::Arc;
    use zerok_state_types::{EngineMeta, Fetched, KeyBundle};

    fn record(engines: &[&str], declined: &[&str]) -> ControlRecord {
        let mut record = ControlRecord::new("epoch", 5);
        for name in engines {
            record = record.with_engine(*name, EngineMeta::new(1, *name));
        }
        for name in declined {
            record = record.with_declined(*name);
        }
        record
    }

    fn scratchpad_with(current: ControlRecord) -> (Scratchpad, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let target = PersistenceTarget::new(
            Arc::new(MemoryPlainStore::new()),
            Arc::new(MemorySecureStore::new()),
        )
        .with_diagnostics(sink.clone());
        let scratchpad = Scratchpad::fresh(KeyBundle::random(), target)
            .with_control_record(Some(Fetched::new(current, 100)));
        (scratchpad, sink)
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn divergence_lists_each_direction() {
        let previous = record(&["bookmarks", "history"], &["passwords"]);
        let current = record(&["bookmarks", "tabs"], &["history"]);

        let divergence = EngineDivergence::between(Some(&previous), &current);
        assert_eq!(divergence.enabled, names(&["tabs"]));
        assert_eq!(divergence.disabled, names(&["history"]));
        assert_eq!(divergence.declined, names(&["history"]));
        assert_eq!(divergence.undeclined, names(&["passwords"]));
    }

    #[test]
    fn identical_declarations_do_not_diverge() {
        let a = record(&["bookmarks"], &["tabs"]);
        let b = ControlRecord {
            sync_id: "another-epoch".into(),
            ..a.clone()
        };
        assert!(EngineDivergence::between(Some(&a), &b).is_empty());
    }

    #[test]
    fn no_previous_record_counts_everything_as_new() {
        let divergence = EngineDivergence::between(None, &record(&["tabs"], &["forms"]));
        assert_eq!(divergence.enabled, names(&["tabs"]));
        assert_eq!(divergence.declined, names(&["forms"]));
    }

    #[test]
    fn reconcile_without_policy_returns_inputs() {
        let (scratchpad, sink) = scratchpad_with(record(&["tabs"], &[]));
        let (after, upload) = scratchpad.reconcile_engine_choices(Some(&record(&["history"], &[])));

        assert_eq!(after, scratchpad);
        assert!(upload.is_none());
        assert!(sink.contains(|d| matches!(d, Diagnostic::EngineChoicesDiverged { .. })));
    }

    #[test]
    fn reconcile_is_silent_without_divergence() {
        let current = record(&["tabs"], &[]);
        let (scratchpad, sink) = scratchpad_with(current.clone());
        let (after, upload) = scratchpad.reconcile_engine_choices(Some(&current));

        assert_eq!(after, scratchpad);
        assert!(upload.is_none());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn reconcile_without_control_record_is_a_no_op() {
        let sink = Arc::new(RecordingSink::new());
        let target = PersistenceTarget::new(
            Arc::new(MemoryPlainStore::new()),
            Arc::new(MemorySecureStore::new()),
        )
        .with_diagnostics(sink.clone());
        let scratchpad = Scratchpad::fresh(KeyBundle::random(), target);

        let (after, upload) =
            scratchpad.reconcile_engine_choices_with(Some(&record(&["tabs"], &[])), &AdoptServerChoices);
        assert_eq!(after, scratchpad);
        assert!(upload.is_none());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn adopt_server_choices_updates_local_configuration() {
        let (scratchpad, _) = scratchpad_with(record(&["bookmarks", "tabs"], &["passwords"]));
        let (after, upload) = scratchpad
            .reconcile_engine_choices_with(Some(&record(&["bookmarks"], &[])), &AdoptServerChoices);

        assert!(upload.is_none());
        assert_eq!(
            after.engine_configuration(),
            Some(&EngineConfiguration::new(["bookmarks", "tabs"], ["passwords"]))
        );
        assert!(scratchpad.engine_configuration().is_none());
    }

    #[test]
    fn prefer_local_choices_uploads_local_declines() {
        let (scratchpad, _) = scratchpad_with(record(&["bookmarks", "tabs"], &[]));
        let scratchpad = scratchpad
            .evolve()
            .set_engine_configuration(Some(EngineConfiguration::new(["bookmarks"], ["tabs"])))
            .build();

        let (after, upload) = scratchpad
            .reconcile_engine_choices_with(Some(&record(&["bookmarks"], &[])), &PreferLocalChoices);

        assert_eq!(after, scratchpad);
        let upload = upload.expect("revised control record");
        assert_eq!(upload.declared_engines(), BTreeSet::from(["bookmarks"]));
        assert!(upload.is_declined("tabs"));
        assert_eq!(upload.sync_id, "epoch");
    }

    #[test]
    fn prefer_local_choices_without_configuration_uploads_nothing() {
        let (scratchpad, _) = scratchpad_with(record(&["tabs"], &[]));
        let (_, upload) =
            scratchpad.reconcile_engine_choices_with(None, &PreferLocalChoices);
        assert!(upload.is_none());
    }
}
