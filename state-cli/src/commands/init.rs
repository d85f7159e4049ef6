//! Initialize client identity and persist a fresh snapshot.

use anyhow::{Context, Result};
use std::path::Path;

use zerok_state_core::Scratchpad;

use crate::config::{Config, Identity, IDENTITY_FILE};
use crate::session::Session;

/// Run the init command.
pub fn run(data_dir: &Path, config: &Config, passphrase: &str, name: Option<&str>) -> Result<()> {
    if Identity::exists(data_dir) {
        anyhow::bail!(
            "Client already initialized. Delete {} to reinitialize.",
            data_dir.join(IDENTITY_FILE).display()
        );
    }

    let mut identity = Identity::generate();
    let session = Session::create(data_dir, config, &mut identity, passphrase)?;
    let name = name.unwrap_or(config.client.default_name.as_str());

    let scratchpad = Scratchpad::fresh_named(session.key_material, session.target, name);
    scratchpad
        .checkpoint()
        .context("Failed to persist initial state")?;
    // Identity last, so a failed checkpoint can simply be retried.
    identity.save(data_dir)?;

    println!("Client initialized successfully!");
    println!();
    println!("  Client GUID: {}", scratchpad.client_guid());
    println!("  Name:        {}", scratchpad.client_name());
    println!("  Data dir:    {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Cache a control record: state-cli set-control --file meta.json --timestamp <ms>");
    println!("  2. Inspect state:          state-cli show");

    Ok(())
}
