//! Opening the persisted stores for a command.

use anyhow::{Context, Result};
use std::path::Path;

use zerok_state_core::{codec, PersistenceTarget, Scratchpad};
use zerok_state_store::{open_target, Argon2Params, RootSecret};
use zerok_state_types::KeyBundle;

use crate::config::{Config, Identity};

/// Minimum passphrase length in characters.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// Stores and key material for one command invocation.
pub struct Session {
    /// Where snapshots checkpoint to.
    pub target: PersistenceTarget,
    /// Passphrase-derived sync key material.
    pub key_material: KeyBundle,
}

impl Session {
    /// Derive keys from `passphrase`, check them against `identity` and open
    /// both store files.
    ///
    /// A wrong passphrase is rejected before either store is opened.
    pub fn open(
        data_dir: &Path,
        config: &Config,
        identity: &Identity,
        passphrase: &str,
    ) -> Result<Self> {
        let root = derive_root(config, identity, passphrase)?;
        identity.verify_passphrase(&root)?;
        Self::with_root(data_dir, config, &root)
    }

    /// Derive keys for a new identity and record its passphrase check.
    pub fn create(
        data_dir: &Path,
        config: &Config,
        identity: &mut Identity,
        passphrase: &str,
    ) -> Result<Self> {
        let root = derive_root(config, identity, passphrase)?;
        identity.set_passphrase_check(&root);
        Self::with_root(data_dir, config, &root)
    }

    fn with_root(data_dir: &Path, config: &Config, root: &RootSecret) -> Result<Self> {
        let target = open_target(
            &config.prefs_path(data_dir),
            &config.secrets_path(data_dir),
            root,
            config.storage.accessibility,
        )
        .context("Failed to open state files")?;

        Ok(Self {
            target,
            key_material: root.sync_key_bundle(),
        })
    }

    /// Restore the persisted snapshot.
    pub fn restore(&self) -> Result<Scratchpad> {
        codec::restore(&self.target, self.key_material.clone())
            .context("No readable state persisted. Run 'state-cli init' first.")
    }
}

fn derive_root(config: &Config, identity: &Identity, passphrase: &str) -> Result<RootSecret> {
    let params = match config.security.argon2_ram_mb {
        Some(ram_mb) => Argon2Params::for_ram_mb(ram_mb),
        None => Argon2Params::default(),
    };
    tracing::debug!(
        memory_mib = params.memory_mib(),
        iterations = params.iterations(),
        "deriving keys"
    );

    RootSecret::derive(passphrase, &identity.salt()?, params)
        .context("Failed to derive keys from passphrase")
}

/// Use the given passphrase, or prompt for one without echo.
pub fn resolve_passphrase(passphrase: Option<&str>) -> Result<String> {
    let passphrase = match passphrase {
        Some(p) => p.to_string(),
        None => rpassword::prompt_password("Enter passphrase: ")
            .context("Failed to read passphrase")?,
    };

    let trimmed = passphrase.trim().to_string();
    if trimmed.chars().count() < MIN_PASSPHRASE_LEN {
        anyhow::bail!(
            "Passphrase must be at least {} characters",
            MIN_PASSPHRASE_LEN
        );
    }
    Ok(trimmed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) const PASSPHRASE: &str = "correct horse battery";

    /// Config with cheap Argon2id parameters.
    pub(crate) fn fast_config() -> Config {
        let mut config = Config::default();
        config.security.argon2_ram_mb = Some(0);
        config
    }

    pub(crate) fn open(data_dir: &Path) -> Session {
        let identity = Identity::load(data_dir).unwrap();
        Session::open(data_dir, &fast_config(), &identity, PASSPHRASE).unwrap()
    }

    #[test]
    fn short_passphrase_is_rejected() {
        assert!(resolve_passphrase(Some("short")).is_err());
        assert!(resolve_passphrase(Some("   padded   ")).is_err());
    }

    #[test]
    fn passphrase_is_trimmed() {
        assert_eq!(
            resolve_passphrase(Some("  correct horse  ")).unwrap(),
            "correct horse"
        );
    }

    #[test]
    fn relative_store_files_live_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut identity = Identity::generate();
        let session =
            Session::create(dir.path(), &fast_config(), &mut identity, PASSPHRASE).unwrap();
        identity.save(dir.path()).unwrap();
        Scratchpad::fresh(session.key_material.clone(), session.target.clone())
            .checkpoint()
            .unwrap();

        let expected: PathBuf = dir.path().join("prefs.json");
        assert!(expected.exists());
        assert!(session.restore().is_ok());
    }

    #[test]
    fn restore_without_state_explains_next_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut identity = Identity::generate();
        let session =
            Session::create(dir.path(), &fast_config(), &mut identity, PASSPHRASE).unwrap();

        let err = session.restore().unwrap_err();
        assert!(err.to_string().contains("state-cli init"));
    }

    #[test]
    fn wrong_passphrase_is_rejected_before_opening_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut identity = Identity::generate();
        Session::create(dir.path(), &fast_config(), &mut identity, PASSPHRASE).unwrap();

        let err = Session::open(dir.path(), &fast_config(), &identity, "incorrect horse battery")
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Wrong passphrase");
        assert!(Session::open(dir.path(), &fast_config(), &identity, PASSPHRASE).is_ok());
    }
}
