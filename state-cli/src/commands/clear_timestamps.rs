//! Forget every fetch and upload timestamp, forcing a full resync.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{Config, Identity};
use crate::session::Session;

/// Run the clear-timestamps command.
pub fn run(data_dir: &Path, config: &Config, passphrase: &str) -> Result<()> {
    let identity = Identity::load(data_dir)?;
    let session = Session::open(data_dir, config, &identity, passphrase)?;
    let scratchpad = session.restore()?;
    let cleared = scratchpad.collection_timestamps().len();

    scratchpad
        .evolve()
        .clear_fetch_timestamps()
        .clear_client_upload_timestamp()
        .build()
        .checkpoint()
        .context("Failed to persist cleared timestamps")?;

    println!("Cleared {} collection timestamp(s).", cleared);
    Ok(())
}
