//! Change the client display name.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{Config, Identity};
use crate::session::Session;

/// Run the rename command.
pub fn run(data_dir: &Path, config: &Config, passphrase: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Client name must not be empty");
    }

    let identity = Identity::load(data_dir)?;
    let session = Session::open(data_dir, config, &identity, passphrase)?;
    let scratchpad = session.restore()?;
    let previous = scratchpad.client_name().to_string();

    scratchpad
        .evolve()
        .set_client_name(name)
        .build()
        .checkpoint()
        .context("Failed to persist renamed client")?;

    println!("Renamed client: {} -> {}", previous, name);
    Ok(())
}
