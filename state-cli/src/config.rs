//! Configuration and identity files for state-cli.
//!
//! Configuration is loaded from a TOML file (default: `state.toml` in the
//! data directory). Every field has a default, so a missing file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use zerok_state_core::{Accessibility, DEFAULT_CLIENT_NAME};
use zerok_state_store::RootSecret;

/// Name of the configuration file looked up in the data directory.
pub const CONFIG_FILE: &str = "state.toml";

/// Name of the identity file in the data directory.
pub const IDENTITY_FILE: &str = "identity.json";

/// Root configuration for state-cli.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store file locations and secret accessibility.
    pub storage: StorageConfig,
    /// Client defaults.
    pub client: ClientConfig,
    /// Key derivation settings.
    pub security: SecurityConfig,
    /// Log filtering.
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Preferences file, relative to the data directory unless absolute.
    pub prefs_file: PathBuf,
    /// Sealed secrets file, relative to the data directory unless absolute.
    pub secrets_file: PathBuf,
    /// Accessibility recorded for stored secrets.
    pub accessibility: Accessibility,
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name given to a client initialized without `--name`.
    pub default_name: String,
}

/// Key derivation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// RAM figure (MB) used to pick Argon2id parameters instead of probing
    /// the machine.
    pub argon2_ram_mb: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefs_file: PathBuf::from("prefs.json"),
            secrets_file: PathBuf::from("secrets.json"),
            accessibility: Accessibility::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load the explicit `path`, or `state.toml` from `data_dir` if present.
    pub fn load(path: Option<&Path>, data_dir: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = data_dir.join(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Resolved preferences file path.
    pub fn prefs_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.prefs_file)
    }

    /// Resolved secrets file path.
    pub fn secrets_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.secrets_file)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Per-installation identity stored locally.
///
/// Holds the Argon2id salt and a check value derived from the passphrase.
/// The passphrase itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Hex-encoded Argon2id salt.
    pub salt_hex: String,
    /// Hex-encoded passphrase check value.
    #[serde(default)]
    pub passphrase_check_hex: Option<String>,
    /// When the identity was created (Unix seconds).
    pub created_at: u64,
}

impl Identity {
    /// Create an identity with a fresh random salt.
    pub fn generate() -> Self {
        Self {
            salt_hex: hex::encode(zerok_state_store::kdf::generate_salt()),
            passphrase_check_hex: None,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Decoded salt bytes.
    pub fn salt(&self) -> Result<Vec<u8>> {
        hex::decode(&self.salt_hex).context("Invalid salt in identity file")
    }

    /// Remember `root` so later sessions can recognize the passphrase.
    pub fn set_passphrase_check(&mut self, root: &RootSecret) {
        self.passphrase_check_hex = Some(hex::encode(root.passphrase_check()));
    }

    /// Fail unless `root` was derived from the passphrase given at init.
    pub fn verify_passphrase(&self, root: &RootSecret) -> Result<()> {
        let Some(expected) = &self.passphrase_check_hex else {
            anyhow::bail!("Identity file has no passphrase check. Run 'state-cli init' again.");
        };
        let expected = hex::decode(expected).context("Invalid passphrase check in identity file")?;
        if expected != root.passphrase_check() {
            anyhow::bail!("Wrong passphrase");
        }
        Ok(())
    }

    /// Load the identity from a directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = std::fs::read_to_string(&path)
            .context("Client not initialized. Run 'state-cli init' first.")?;
        serde_json::from_str(&contents).context("Invalid identity file")
    }

    /// Save the identity to a directory.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents).context("Failed to save identity")?;
        set_file_permissions_0600(&path)?;
        Ok(())
    }

    /// Check if an identity exists.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(IDENTITY_FILE).exists()
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.storage.prefs_file, PathBuf::from("prefs.json"));
        assert_eq!(config.storage.secrets_file, PathBuf::from("secrets.json"));
        assert_eq!(config.storage.accessibility, Accessibility::AfterFirstUnlock);
        assert_eq!(config.client.default_name, DEFAULT_CLIENT_NAME);
        assert!(config.security.argon2_ram_mb.is_none());
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[storage]
prefs_file = "state/prefs.json"
accessibility = "when_unlocked_this_device_only"

[client]
default_name = "Kitchen iPad"

[security]
argon2_ram_mb = 1024

[logging]
filter = "zerok_state=debug"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.prefs_file, PathBuf::from("state/prefs.json"));
        assert_eq!(config.storage.secrets_file, PathBuf::from("secrets.json"));
        assert_eq!(
            config.storage.accessibility,
            Accessibility::WhenUnlockedThisDeviceOnly
        );
        assert_eq!(config.client.default_name, "Kitchen iPad");
        assert_eq!(config.security.argon2_ram_mb, Some(1024));
        assert_eq!(config.logging.filter, "zerok_state=debug");
    }

    #[test]
    fn missing_default_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn default_file_in_data_dir_is_used() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[client]\ndefault_name = \"Desk\"\n").unwrap();

        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.client.default_name, "Desk");
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[storage\nprefs_file = 3").unwrap();

        let err = Config::load(Some(&path), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn store_paths_resolve_against_data_dir() {
        let config = Config::default();
        let data_dir = Path::new("/var/lib/state");
        assert_eq!(
            config.prefs_path(data_dir),
            PathBuf::from("/var/lib/state/prefs.json")
        );

        let mut absolute = Config::default();
        absolute.storage.secrets_file = PathBuf::from("/secure/secrets.json");
        assert_eq!(
            absolute.secrets_path(data_dir),
            PathBuf::from("/secure/secrets.json")
        );
    }

    #[test]
    fn identity_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        assert!(!Identity::exists(dir.path()));

        let identity = Identity::generate();
        identity.save(dir.path()).unwrap();
        assert!(Identity::exists(dir.path()));

        let loaded = Identity::load(dir.path()).unwrap();
        assert_eq!(loaded.salt().unwrap().len(), zerok_state_store::SALT_SIZE);
        assert_eq!(loaded.salt_hex, identity.salt_hex);
    }

    #[test]
    fn passphrase_check_rejects_other_secrets() {
        let mut identity = Identity::generate();
        let right = RootSecret::from_bytes([1u8; 32]);
        let wrong = RootSecret::from_bytes([2u8; 32]);

        assert!(identity.verify_passphrase(&right).is_err());

        identity.set_passphrase_check(&right);
        assert!(identity.verify_passphrase(&right).is_ok());
        let err = identity.verify_passphrase(&wrong).unwrap_err();
        assert_eq!(err.to_string(), "Wrong passphrase");
    }
}
