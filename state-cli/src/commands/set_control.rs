//! Cache a fetched control record.

use anyhow::{Context, Result};
use std::path::Path;

use zerok_state_core::AdoptServerChoices;
use zerok_state_types::{ControlRecord, Fetched, Timestamp};

use crate::config::{Config, Identity};
use crate::session::Session;

/// Options for the set-control command.
#[derive(Debug, Clone)]
pub struct SetControlOptions<'a> {
    /// JSON file holding the control record payload.
    pub file: &'a Path,
    /// Server timestamp the record was fetched at.
    pub timestamp: Timestamp,
    /// Treat the record as a new sync epoch.
    pub fresh_start: bool,
    /// Mirror the record's engine choices into the local configuration.
    pub adopt_engines: bool,
}

/// Run the set-control command.
pub fn run(
    data_dir: &Path,
    config: &Config,
    passphrase: &str,
    options: &SetControlOptions<'_>,
) -> Result<()> {
    let payload = std::fs::read_to_string(options.file)
        .with_context(|| format!("Failed to read {}", options.file.display()))?;
    let record = ControlRecord::from_payload(&payload)
        .with_context(|| format!("Invalid control record in {}", options.file.display()))?;
    let sync_id = record.sync_id.clone();
    let fetched = Fetched::new(record, options.timestamp);

    let identity = Identity::load(data_dir)?;
    let session = Session::open(data_dir, config, &identity, passphrase)?;
    let scratchpad = session.restore()?;

    let updated = if options.fresh_start {
        scratchpad.reset_for_fresh_start(fetched)
    } else {
        let previous = scratchpad.control_record().map(|f| f.value.clone());
        let cached = scratchpad.with_control_record(Some(fetched));
        let (reconciled, upload) = if options.adopt_engines {
            cached.reconcile_engine_choices_with(previous.as_ref(), &AdoptServerChoices)
        } else {
            cached.reconcile_engine_choices(previous.as_ref())
        };
        if upload.is_some() {
            tracing::info!("engine resolution produced a control record to upload");
        }
        reconciled
    };

    updated
        .checkpoint()
        .context("Failed to persist control record")?;

    println!("Cached control record {} (fetched {})", sync_id, options.timestamp);
    if options.fresh_start {
        println!("Fresh start: cached keys and timestamps were discarded.");
    }
    Ok(())
}
