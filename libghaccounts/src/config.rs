//! Configuration management for gh-accounts

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::CredentialConfig;
use crate::error::{ConfigError, Result};
use crate::identity::GithubClientConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub legacy: LegacyConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

/// Where the single-account settings of older versions live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    #[serde(default = "default_legacy_settings_file")]
    pub settings_file: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            settings_file: default_legacy_settings_file(),
        }
    }
}

fn default_legacy_settings_file() -> String {
    "~/.config/gh-accounts/github.toml".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> String {
    "~/.local/share/gh-accounts/accounts.toml".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Overrides the default `gh-accounts/<version>` user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl GithubConfig {
    pub fn client_config(&self) -> GithubClientConfig {
        let defaults = GithubClientConfig::default();
        GithubClientConfig {
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults. The master password is picked up
    /// from `GH_ACCOUNTS_MASTER_PASSWORD` when set.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.credentials.load_master_password_from_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.github.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "github.timeout_secs must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Legacy settings file with `~` expanded
    pub fn legacy_settings_path(&self) -> PathBuf {
        expand(&self.legacy.settings_file)
    }

    /// Account state file with `~` expanded
    pub fn accounts_state_path(&self) -> PathBuf {
        expand(&self.accounts.state_file)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path (XDG config dir unless overridden)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GH_ACCOUNTS_CONFIG") {
        return Ok(expand(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::NoConfigDir)?;

    Ok(config_dir.join("gh-accounts").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StorageBackend;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.legacy.settings_file, "~/.config/gh-accounts/github.toml");
        assert_eq!(
            config.accounts.state_file,
            "~/.local/share/gh-accounts/accounts.toml"
        );
        assert_eq!(config.credentials.storage, StorageBackend::Keyring);
        assert_eq!(config.github.timeout_secs, 30);
        assert!(!config.accounts_state_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[accounts]
state_file = "/tmp/accounts.toml"

[credentials]
storage = "encrypted"
path = "/tmp/creds"

[github]
user_agent = "test-agent"
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.accounts_state_path(), PathBuf::from("/tmp/accounts.toml"));
        assert_eq!(config.legacy.settings_file, "~/.config/gh-accounts/github.toml");
        assert_eq!(config.credentials.storage, StorageBackend::Encrypted);

        let client = config.github.client_config();
        assert_eq!(client.user_agent, "test-agent");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[github\ntimeout_secs = ").unwrap();

        let result = Config::load_from_path(&path);
        assert!(matches!(
            result,
            Err(crate::error::GhAccountsError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[github]\ntimeout_secs = 0\n").unwrap();

        let result = Config::load_from_path(&path);
        assert!(matches!(
            result,
            Err(crate::error::GhAccountsError::Config(ConfigError::InvalidValue(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[legacy]\nsettings_file = \"/tmp/legacy.toml\"\n").unwrap();

        std::env::set_var("GH_ACCOUNTS_CONFIG", &path);
        std::env::set_var("GH_ACCOUNTS_MASTER_PASSWORD", "correct horse battery");
        let config = Config::load();
        std::env::remove_var("GH_ACCOUNTS_CONFIG");
        std::env::remove_var("GH_ACCOUNTS_MASTER_PASSWORD");

        let config = config.unwrap();
        assert_eq!(config.legacy_settings_path(), PathBuf::from("/tmp/legacy.toml"));
        assert_eq!(
            config.credentials.master_password.as_deref(),
            Some("correct horse battery")
        );
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("GH_ACCOUNTS_CONFIG", temp_dir.path().join("absent.toml"));
        let config = Config::load();
        std::env::remove_var("GH_ACCOUNTS_CONFIG");

        assert_eq!(config.unwrap().github.timeout_secs, 30);
    }
}
