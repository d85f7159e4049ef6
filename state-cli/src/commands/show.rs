//! Show persisted state.

use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use zerok_state_core::Scratchpad;

use crate::config::{Config, Identity};
use crate::session::Session;

/// Run the show command.
pub fn run(data_dir: &Path, config: &Config, passphrase: &str) -> Result<()> {
    let identity = Identity::load(data_dir)?;
    let session = Session::open(data_dir, config, &identity, passphrase)?;
    let scratchpad = session.restore()?;

    print!("{}", render(&scratchpad));
    Ok(())
}

/// Human-readable summary of a snapshot. Never includes key bytes.
pub fn render(scratchpad: &Scratchpad) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== state-cli show ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Client:");
    let _ = writeln!(out, "  GUID:        {}", scratchpad.client_guid());
    let _ = writeln!(out, "  Name:        {}", scratchpad.client_name());
    let _ = writeln!(
        out,
        "  Last upload: {}",
        format_timestamp(scratchpad.client_record_last_upload())
    );
    let _ = writeln!(out, "  Key label:   {}", scratchpad.key_label());
    let _ = writeln!(out);

    match scratchpad.control_record() {
        Some(fetched) => {
            let record = &fetched.value;
            let _ = writeln!(out, "Control record (fetched {}):", fetched.timestamp);
            let _ = writeln!(out, "  Sync ID:         {}", record.sync_id);
            let _ = writeln!(out, "  Storage version: {}", record.storage_version);
            for (name, meta) in &record.engines {
                let _ = writeln!(out, "  Engine {} v{} ({})", name, meta.version, meta.sync_id);
            }
            for name in &record.declined {
                let _ = writeln!(out, "  Declined {}", name);
            }
        }
        None => {
            let _ = writeln!(out, "Control record: NONE");
        }
    }

    match scratchpad.key_record() {
        Some(fetched) => {
            let _ = writeln!(
                out,
                "Key record (fetched {}): default + {} collection bundle(s)",
                fetched.timestamp,
                fetched.value.collections().len()
            );
        }
        None => {
            let _ = writeln!(out, "Key record: NONE");
        }
    }

    if let Some(engines) = scratchpad.engine_configuration() {
        let _ = writeln!(
            out,
            "Engines: enabled {:?}, declined {:?}",
            engines.enabled, engines.declined
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Collections:");
    if scratchpad.collection_timestamps().is_empty() {
        let _ = writeln!(out, "  (none fetched)");
    }
    for (name, ts) in scratchpad.collection_timestamps() {
        let _ = writeln!(out, "  {:<12} {}", name, ts);
    }
    out
}

fn format_timestamp(ts: u64) -> String {
    if ts == 0 {
        "never".to_string()
    } else {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{fast_config, PASSPHRASE};
    use std::sync::Arc;
    use zerok_state_core::{MemoryPlainStore, MemorySecureStore, PersistenceTarget};
    use zerok_state_types::{ControlRecord, EngineMeta, Fetched, KeyBundle, KeyRecord};

    fn scratchpad() -> Scratchpad {
        let target = PersistenceTarget::new(
            Arc::new(MemoryPlainStore::new()),
            Arc::new(MemorySecureStore::new()),
        );
        Scratchpad::fresh_named(KeyBundle::random(), target, "Desk")
    }

    #[test]
    fn render_fresh_state() {
        let out = render(&scratchpad());
        assert!(out.contains("Name:        Desk"));
        assert!(out.contains("Last upload: never"));
        assert!(out.contains("Control record: NONE"));
        assert!(out.contains("Key record: NONE"));
        assert!(out.contains("(none fetched)"));
    }

    #[test]
    fn render_populated_state_hides_keys() {
        let bundle = KeyBundle::random();
        let scratchpad = scratchpad()
            .evolve()
            .set_control_record(Some(Fetched::new(
                ControlRecord::new("epoch-1", 5)
                    .with_engine("tabs", EngineMeta::new(1, "tabs-id"))
                    .with_declined("passwords"),
                100,
            )))
            .set_key_record(Some(Fetched::new(KeyRecord::new(bundle.clone()), 200)))
            .build();

        let out = render(&scratchpad);
        assert!(out.contains("Sync ID:         epoch-1"));
        assert!(out.contains("Engine tabs v1 (tabs-id)"));
        assert!(out.contains("Declined passwords"));
        assert!(out.contains("Key record (fetched 200)"));
        assert!(out.contains("meta"));
        for encoded in bundle.to_base64_pair() {
            assert!(!out.contains(&encoded));
        }
    }

    #[test]
    fn show_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), &fast_config(), PASSPHRASE).unwrap_err();
        assert!(err.to_string().contains("state-cli init"));
    }
}
