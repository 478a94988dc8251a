//! Protected secret storage
//!
//! Secrets (the legacy password/token and every account token) are opaque
//! strings looked up by key. Three backends implement [`SecretStore`]:
//! - `KeyringStore`: OS-native secure storage (primary)
//! - `EncryptedFileStore`: age-encrypted files protected by a master password (fallback)
//! - `MemorySecretStore` (in [`crate::memory`]): in-process, for tests and embedding
//!
//! `CredentialManager` is the facade that picks a backend from configuration.
//!
//! # Example
//!
//! ```no_run
//! use libghaccounts::credentials::{CredentialConfig, CredentialManager, SecretStore};
//!
//! # fn example() -> libghaccounts::error::Result<()> {
//! let manager = CredentialManager::new(CredentialConfig::default())?;
//!
//! manager.set_secret("account.42", Some("ghp_example"))?;
//! assert_eq!(manager.get_secret("account.42")?.as_deref(), Some("ghp_example"));
//!
//! // Setting `None` erases the secret
//! manager.set_secret("account.42", None)?;
//! # Ok(())
//! # }
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{CredentialError, GhAccountsError, Result};

/// Keyring service name shared by every secret this crate stores
pub const SERVICE_NAME: &str = "gh-accounts";

/// Opaque get/set-by-key secret storage
///
/// Both operations are atomic per key. Setting `None` erases the key and is
/// not an error when the key is already absent.
pub trait SecretStore: Send + Sync {
    /// Look up a secret, `None` if nothing is stored under `key`
    fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, or erase the key when `value` is `None`
    fn set_secret(&self, key: &str, value: Option<&str>) -> Result<()>;

    /// Backend identifier used in logs (e.g. "keyring", "encrypted_file")
    fn backend_name(&self) -> &str;
}

/// Reject keys that could escape the storage namespace
///
/// Keys become file names for the encrypted backend, so only
/// alphanumerics, `-`, `_` and `.` are accepted, and never `..`.
pub fn validate_secret_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GhAccountsError::InvalidInput(
            "Secret key cannot be empty".to_string(),
        ));
    }

    if key.contains("..")
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(GhAccountsError::InvalidInput(format!(
            "Invalid secret key '{}'. Must be alphanumeric with '-', '_' or '.' only",
            key
        )));
    }

    Ok(())
}

/// OS-native keyring storage backend
///
/// - **macOS**: Keychain
/// - **Windows**: Credential Manager
/// - **Linux**: Secret Service (GNOME Keyring/KWallet) via D-Bus
///
/// Entries are stored under the configured service name with the secret key
/// as the keyring user.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Create a new KeyringStore
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::KeyringUnavailable` if the OS keyring
    /// cannot be accessed (e.g., headless Linux without Secret Service).
    pub fn new(service: &str) -> Result<Self> {
        keyring::Entry::new(service, "availability_check").map_err(|e| {
            CredentialError::KeyringUnavailable(format!("OS keyring not accessible: {}", e))
        })?;

        Ok(Self {
            service: service.to_string(),
        })
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        validate_secret_key(key)?;
        keyring::Entry::new(&self.service, key)
            .map_err(|e| CredentialError::KeyringUnavailable(e.to_string()).into())
    }
}

impl SecretStore for KeyringStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret {}.{} from OS keyring", self.service, key);
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn set_secret(&self, key: &str, value: Option<&str>) -> Result<()> {
        let entry = self.entry(key)?;

        match value {
            Some(value) => {
                entry
                    .set_password(value)
                    .map_err(|e| CredentialError::Keyring(e.to_string()))?;
                tracing::debug!("Stored secret {}.{} in OS keyring", self.service, key);
            }
            None => match entry.delete_password() {
                Ok(_) => {
                    tracing::debug!("Deleted secret {}.{} from OS keyring", self.service, key)
                }
                Err(keyring::Error::NoEntry) => {
                    tracing::debug!("Secret {}.{} not found (already deleted)", self.service, key)
                }
                Err(e) => return Err(CredentialError::Keyring(e.to_string()).into()),
            },
        }

        Ok(())
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// Validate that a path is not a symlink
///
/// # Errors
///
/// Returns `CredentialError::Io` if the path is a symlink or its metadata
/// cannot be read.
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CredentialError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read metadata for '{}': {}", path.display(), e),
        ))
    })?;

    if metadata.is_symlink() {
        return Err(CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Credential file '{}' is a symbolic link. Credential files must be regular files.",
                path.display()
            ),
        ))
        .into());
    }

    Ok(())
}

/// Encrypted file storage backend
///
/// One `age` passphrase-encrypted file per secret:
/// `{base_path}/{service}.{key}.age`, permissions 600 on Unix.
pub struct EncryptedFileStore {
    base_path: PathBuf,
    service: String,
    master_password: Arc<RwLock<Option<SecretString>>>,
}

impl EncryptedFileStore {
    pub fn new(base_path: PathBuf, service: &str) -> Self {
        Self {
            base_path,
            service: service.to_string(),
            master_password: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the master password for encryption/decryption
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::WeakPassword` if the password is less than 8 characters.
    pub fn set_master_password(&self, password: String) -> Result<()> {
        if password.len() < 8 {
            return Err(CredentialError::WeakPassword.into());
        }

        *self
            .master_password
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(SecretString::from(password));
        tracing::debug!("Master password set for encrypted file store");
        Ok(())
    }

    fn passphrase(&self) -> Result<age::secrecy::Secret<String>> {
        let guard = self
            .master_password
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let password = guard.as_ref().ok_or(CredentialError::MasterPasswordNotSet)?;
        Ok(age::secrecy::Secret::new(
            password.expose_secret().to_string(),
        ))
    }

    fn encrypt(&self, data: &str) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(self.passphrase()?);

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        writer
            .write_all(data.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(encrypted)
    }

    fn decrypt(&self, data: &[u8]) -> Result<String> {
        let passphrase = self.passphrase()?;

        let decryptor = match age::Decryptor::new(data) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => {
                return Err(CredentialError::Encryption(
                    "Invalid encryption format (expected passphrase)".to_string(),
                )
                .into())
            }
            Err(e) => return Err(CredentialError::Encryption(e.to_string()).into()),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor.decrypt(&passphrase, None).map_err(|e| {
            if e.to_string().contains("decryption") || e.to_string().contains("MAC") {
                CredentialError::DecryptionFailed
            } else {
                CredentialError::Encryption(e.to_string())
            }
        })?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(String::from_utf8(decrypted)
            .map_err(|e| CredentialError::Encryption(format!("Invalid UTF-8: {}", e)))?)
    }

    fn file_path(&self, key: &str) -> Result<PathBuf> {
        validate_secret_key(key)?;
        Ok(self.base_path.join(format!("{}.{}.age", self.service, key)))
    }
}

impl SecretStore for EncryptedFileStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let file_path = self.file_path(key)?;

        if !file_path.exists() {
            return Ok(None);
        }

        validate_not_symlink(&file_path)?;

        let encrypted = std::fs::read(&file_path).map_err(CredentialError::Io)?;
        let decrypted = self.decrypt(&encrypted)?;

        tracing::debug!("Retrieved encrypted secret {} from {:?}", key, file_path);
        Ok(Some(decrypted))
    }

    fn set_secret(&self, key: &str, value: Option<&str>) -> Result<()> {
        let file_path = self.file_path(key)?;

        let Some(value) = value else {
            if file_path.exists() {
                std::fs::remove_file(&file_path).map_err(CredentialError::Io)?;
                tracing::debug!("Deleted encrypted secret {} at {:?}", key, file_path);
            } else {
                tracing::debug!("Secret {} not found (already deleted)", key);
            }
            return Ok(());
        };

        let encrypted = self.encrypt(value)?;

        std::fs::create_dir_all(&self.base_path).map_err(CredentialError::Io)?;
        std::fs::write(&file_path, encrypted).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&file_path, perms).map_err(CredentialError::Io)?;
        }

        tracing::debug!("Stored encrypted secret {} at {:?}", key, file_path);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "encrypted_file"
    }
}

/// Storage backend type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS-native keyring (macOS Keychain, Windows Credential Manager, Linux Secret Service)
    #[default]
    Keyring,
    /// Encrypted files with master password
    Encrypted,
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory for encrypted file storage (keyring doesn't use files)
    #[serde(default = "default_credential_path")]
    pub path: String,

    /// Master password for encrypted storage (not serialized)
    #[serde(skip)]
    pub master_password: Option<String>,
}

fn default_credential_path() -> String {
    "~/.config/gh-accounts/credentials".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Keyring,
            path: default_credential_path(),
            master_password: None,
        }
    }
}

impl CredentialConfig {
    /// Load master password from `GH_ACCOUNTS_MASTER_PASSWORD` if set
    pub fn load_master_password_from_env(&mut self) {
        if let Ok(password) = std::env::var("GH_ACCOUNTS_MASTER_PASSWORD") {
            if !password.is_empty() {
                self.master_password = Some(password);
                tracing::debug!(
                    "Loaded master password from GH_ACCOUNTS_MASTER_PASSWORD environment variable"
                );
            }
        }
    }

    /// Expand `~` in the credential path
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Credential manager facade
///
/// Builds a priority list of backends:
/// 1. KeyringStore (if configured and available)
/// 2. EncryptedFileStore (if configured, or as fallback when the keyring is unavailable)
///
/// Reads try every backend in order, writes go to the first one, erasures hit all of them.
pub struct CredentialManager {
    stores: Vec<Box<dyn SecretStore>>,
    config: CredentialConfig,
}

impl CredentialManager {
    /// Create a new CredentialManager
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NoStoreAvailable` if no backend could be set up.
    pub fn new(config: CredentialConfig) -> Result<Self> {
        let mut stores: Vec<Box<dyn SecretStore>> = vec![];

        if config.storage == StorageBackend::Keyring {
            match KeyringStore::new(SERVICE_NAME) {
                Ok(store) => {
                    tracing::info!("Using OS keyring for credential storage");
                    stores.push(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "OS keyring unavailable: {}. Falling back to encrypted files.",
                        e
                    );
                }
            }
        }

        if config.storage == StorageBackend::Encrypted || stores.is_empty() {
            let encrypted_store = EncryptedFileStore::new(config.expand_path(), SERVICE_NAME);

            match Self::resolve_master_password(&config) {
                Some(password) => {
                    encrypted_store.set_master_password(password)?;
                    tracing::info!("Using encrypted file storage for credentials");
                    stores.push(Box::new(encrypted_store));
                }
                None => {
                    tracing::error!(
                        "Master password not set and no TTY available. No secure storage available."
                    );
                }
            }
        }

        if stores.is_empty() {
            return Err(CredentialError::NoStoreAvailable.into());
        }

        Ok(Self { stores, config })
    }

    /// Build a manager over explicit backends, highest priority first
    pub fn with_stores(stores: Vec<Box<dyn SecretStore>>, config: CredentialConfig) -> Result<Self> {
        if stores.is_empty() {
            return Err(CredentialError::NoStoreAvailable.into());
        }
        Ok(Self { stores, config })
    }

    fn resolve_master_password(config: &CredentialConfig) -> Option<String> {
        if let Some(password) = &config.master_password {
            return Some(password.clone());
        }

        if !atty::is(atty::Stream::Stdin) {
            return None;
        }

        match rpassword::prompt_password("Enter master password for credential encryption: ") {
            Ok(password) if !password.is_empty() => Some(password),
            Ok(_) => {
                tracing::error!("Empty master password provided");
                None
            }
            Err(e) => {
                tracing::error!("Failed to prompt for master password: {}", e);
                None
            }
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Names of the configured backends, highest priority first
    pub fn backends(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.backend_name()).collect()
    }

    pub fn primary_backend(&self) -> Option<&str> {
        self.stores.first().map(|s| s.backend_name())
    }
}

impl SecretStore for CredentialManager {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        for store in &self.stores {
            if let Some(value) = store.get_secret(key)? {
                tracing::debug!("Retrieved secret {} from {} backend", key, store.backend_name());
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    fn set_secret(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(_) => {
                let store = self.stores.first().ok_or(CredentialError::NoStoreAvailable)?;
                store.set_secret(key, value)?;
                tracing::debug!("Stored secret {} using {} backend", key, store.backend_name());
            }
            None => {
                for store in &self.stores {
                    store.set_secret(key, None)?;
                }
                tracing::debug!("Erased secret {} from all backends", key);
            }
        }

        Ok(())
    }

    fn backend_name(&self) -> &str {
        self.primary_backend().unwrap_or("none")
    }
}
