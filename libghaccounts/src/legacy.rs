//! Legacy single-account settings
//!
//! Before multi-account support, one installation stored exactly one GitHub
//! identity: a host, an optional login, an auth mode and a secret kept in the
//! protected store under [`LEGACY_PASSWORD_KEY`]. This module reads that data
//! as one snapshot, classifies it, and erases it once it has been migrated.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::credentials::SecretStore;
use crate::error::{LegacyError, Result};
use crate::server::ServerPath;

/// Fixed protected-store key of the legacy password or token
pub const LEGACY_PASSWORD_KEY: &str = "GITHUB_SETTINGS_PASSWORD_KEY";

/// How the legacy account authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Authentication was never configured
    #[default]
    None,
    /// Login + password (no longer accepted by GitHub)
    Basic,
    /// Personal access token
    Token,
}

/// The three plain legacy fields, read together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAuthSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,

    #[serde(default, rename = "auth_type")]
    pub auth_mode: AuthMode,
}

/// Storage of the legacy plain fields
pub trait LegacySettings: Send + Sync {
    /// Read host, login and auth mode in one consistent read
    fn read(&self) -> Result<LegacyAuthSettings>;

    /// Remove host, login and auth mode. Idempotent.
    fn clear_auth(&self) -> Result<()>;
}

/// Immutable snapshot of the legacy single-account store
pub struct LegacyCredential {
    pub host: Option<String>,
    pub login: Option<String>,
    pub auth_mode: AuthMode,
    secret: Option<SecretString>,
}

impl LegacyCredential {
    pub fn new(settings: LegacyAuthSettings, secret: Option<String>) -> Self {
        Self {
            host: settings.host,
            login: settings.login,
            auth_mode: settings.auth_mode,
            secret: secret.map(SecretString::from),
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.expose_secret())
    }

    /// Whether any of the four fields carries information
    pub fn has_any_info(&self) -> bool {
        self.host.is_some()
            || self.login.is_some()
            || self.auth_mode != AuthMode::None
            || self.secret.is_some()
    }

    /// Either password-based with a login, or token-based
    pub fn has_legacy_account(&self) -> bool {
        match self.auth_mode {
            AuthMode::Basic => self.login.is_some(),
            AuthMode::Token => true,
            AuthMode::None => false,
        }
    }

    /// Configured host, or github.com when none was set
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or(crate::server::DEFAULT_HOST)
    }

    /// Normalized server of the legacy account, `None` if the host does not parse
    pub fn effective_server(&self) -> Option<ServerPath> {
        match ServerPath::from_host(self.host.as_deref()) {
            Ok(server) => Some(server),
            Err(e) => {
                tracing::debug!("Legacy host is not a valid server address: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for LegacyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyCredential")
            .field("host", &self.host)
            .field("login", &self.login)
            .field("auth_mode", &self.auth_mode)
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

/// Reader and cleaner over the legacy fields plus the legacy secret
#[derive(Clone)]
pub struct LegacyStore {
    settings: Arc<dyn LegacySettings>,
    secrets: Arc<dyn SecretStore>,
}

impl LegacyStore {
    pub fn new(settings: Arc<dyn LegacySettings>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { settings, secrets }
    }

    /// Read all four legacy fields as one snapshot
    pub fn read_snapshot(&self) -> Result<LegacyCredential> {
        let settings = self.settings.read()?;
        let secret = self.secrets.get_secret(LEGACY_PASSWORD_KEY)?;
        Ok(LegacyCredential::new(settings, secret))
    }

    /// Erase the legacy fields and the legacy secret
    pub fn clear(&self) -> Result<()> {
        self.settings.clear_auth()?;
        self.secrets.set_secret(LEGACY_PASSWORD_KEY, None)?;
        tracing::debug!("Cleared legacy auth settings and secret");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct LegacyFile {
    #[serde(default)]
    auth: LegacyAuthSettings,
}

/// Legacy settings kept in the `[auth]` table of a TOML file
///
/// A missing file reads as empty settings. Clearing only touches the three
/// auth keys; any other content of the file is preserved.
pub struct TomlLegacySettings {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlLegacySettings {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Write the legacy fields, replacing any existing `[auth]` table
    pub fn write(&self, settings: &LegacyAuthSettings) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut table = self.read_table()?.unwrap_or_default();
        let auth = toml::Value::try_from(settings)
            .map_err(|e| LegacyError::Write(format!("Failed to serialize settings: {}", e)))?;
        table.insert("auth".to_string(), auth);

        self.write_table(&table)
    }

    fn read_table(&self) -> Result<Option<toml::Table>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(LegacyError::Read)?;
        let table = content.parse::<toml::Table>().map_err(LegacyError::Parse)?;
        Ok(Some(table))
    }

    fn write_table(&self, table: &toml::Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LegacyError::Write(format!("Failed to create directory: {}", e)))?;
        }

        let content = toml::to_string_pretty(table)
            .map_err(|e| LegacyError::Write(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| LegacyError::Write(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}

impl LegacySettings for TomlLegacySettings {
    fn read(&self) -> Result<LegacyAuthSettings> {
        if !self.path.exists() {
            return Ok(LegacyAuthSettings::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(LegacyError::Read)?;
        let file: LegacyFile = toml::from_str(&content).map_err(LegacyError::Parse)?;
        Ok(file.auth)
    }

    fn clear_auth(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut table) = self.read_table()? else {
            return Ok(());
        };

        let mut emptied = false;
        if let Some(toml::Value::Table(auth)) = table.get_mut("auth") {
            auth.remove("host");
            auth.remove("login");
            auth.remove("auth_type");
            emptied = auth.is_empty();
        }
        if emptied {
            table.remove("auth");
        }

        self.write_table(&table)
    }
}
