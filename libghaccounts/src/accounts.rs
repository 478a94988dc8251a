//! Multi-account store
//!
//! Accounts (login + server) are persisted to `accounts.toml`; their tokens
//! live in the protected [`SecretStore`] keyed by account id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::credentials::SecretStore;
use crate::error::{AccountError, Result};
use crate::server::ServerPath;

/// Opaque account identifier, fresh for every new account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Key of this account's token in the secret store
    pub fn secret_key(&self) -> String {
        format!("account.{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A GitHub identity on a specific server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub login: String,
    pub server: ServerPath,
}

impl Account {
    /// New account with a fresh id
    pub fn create(login: &str, server: ServerPath) -> Self {
        Self {
            id: AccountId::generate(),
            login: login.to_string(),
            server,
        }
    }

    pub fn is_same_identity(&self, login: &str, server: &ServerPath) -> bool {
        self.login.eq_ignore_ascii_case(login) && &self.server == server
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.login, self.server)
    }
}

/// The multi-account store
pub trait AccountStore: Send + Sync {
    /// All registered accounts
    fn accounts(&self) -> Result<Vec<Account>>;

    /// Add `account` and bind `token` to it as one step
    ///
    /// Readers of the store never observe the account without its token.
    fn add_account(&self, account: Account, token: &str) -> Result<()>;

    /// Replace the token of an existing account
    fn set_account_token(&self, id: &AccountId, token: &str) -> Result<()>;
}

/// Validate a login as reported by GitHub or typed by the user
///
/// Rules:
/// - Cannot be empty
/// - Maximum 39 characters
/// - Alphanumeric characters, hyphens and underscores only
pub fn validate_login(login: &str) -> Result<()> {
    if login.is_empty() {
        return Err(AccountError::InvalidLogin("Login cannot be empty".to_string()).into());
    }

    if login.chars().count() > 39 {
        return Err(AccountError::InvalidLogin(format!(
            "Login too long: {} characters (max 39)",
            login.chars().count()
        ))
        .into());
    }

    if !login
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AccountError::InvalidLogin(format!(
            "Invalid login '{}'. Must be alphanumeric with hyphens/underscores only",
            login
        ))
        .into());
    }

    Ok(())
}

/// Account state persisted to TOML
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountState {
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// File-backed account store
///
/// Thread-safe via `Arc<RwLock<AccountState>>`. Writers hold the lock while
/// binding the token and persisting, so a concurrent reader sees either no
/// account or an account with its token.
#[derive(Clone)]
pub struct AccountManager {
    state_file: PathBuf,
    state: Arc<RwLock<AccountState>>,
    secrets: Arc<dyn SecretStore>,
}

impl AccountManager {
    /// Create an AccountManager over `state_file`, loading existing state
    pub fn with_path(state_file: PathBuf, secrets: Arc<dyn SecretStore>) -> Result<Self> {
        let manager = Self {
            state_file,
            state: Arc::new(RwLock::new(AccountState::default())),
            secrets,
        };

        manager.load()?;

        Ok(manager)
    }

    /// Token bound to an account, if any
    pub fn token(&self, id: &AccountId) -> Result<Option<String>> {
        self.secrets.get_secret(&id.secret_key())
    }

    /// Persist state to disk
    ///
    /// Creates parent directories if needed. Sets file permissions to 644 on Unix.
    fn save(&self, state: &AccountState) -> Result<()> {
        if let Some(parent) = self.state_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AccountError::StateFile(format!("Failed to create directory: {}", e)))?;
        }

        let toml_content = toml::to_string_pretty(state)
            .map_err(|e| AccountError::StateFile(format!("Failed to serialize state: {}", e)))?;

        std::fs::write(&self.state_file, toml_content)
            .map_err(|e| AccountError::StateFile(format!("Failed to write state file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o644);
            std::fs::set_permissions(&self.state_file, permissions)
                .map_err(|e| AccountError::StateFile(format!("Failed to set permissions: {}", e)))?;
        }

        Ok(())
    }

    /// Load state from disk
    ///
    /// A missing file means no accounts. A corrupted file is an error: saving
    /// over it would drop every account it lists.
    fn load(&self) -> Result<()> {
        if !self.state_file.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.state_file)
            .map_err(|e| AccountError::StateFile(format!("Failed to read state file: {}", e)))?;

        let loaded_state = toml::from_str::<AccountState>(&content).map_err(|e| {
            AccountError::StateFile(format!(
                "Corrupted state file {}: {}",
                self.state_file.display(),
                e
            ))
        })?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = loaded_state;

        Ok(())
    }
}

impl AccountStore for AccountManager {
    fn accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.accounts.clone())
    }

    fn add_account(&self, account: Account, token: &str) -> Result<()> {
        validate_login(&account.login)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state
            .accounts
            .iter()
            .any(|a| a.id == account.id || a.is_same_identity(&account.login, &account.server))
        {
            return Err(
                AccountError::Duplicate(account.login.clone(), account.server.to_string()).into(),
            );
        }

        let key = account.id.secret_key();
        self.secrets.set_secret(&key, Some(token))?;

        state.accounts.push(account);
        if let Err(e) = self.save(&state) {
            if let Some(rolled_back) = state.accounts.pop() {
                tracing::warn!("Failed to persist account {}, rolling back: {}", rolled_back, e);
            }
            if let Err(cleanup) = self.secrets.set_secret(&key, None) {
                tracing::warn!("Failed to erase token after rollback: {}", cleanup);
            }
            return Err(e);
        }

        if let Some(added) = state.accounts.last() {
            tracing::debug!("Registered account {}", added);
        }
        Ok(())
    }

    fn set_account_token(&self, id: &AccountId, token: &str) -> Result<()> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        if !state.accounts.iter().any(|a| &a.id == id) {
            return Err(AccountError::NotFound(id.to_string()).into());
        }

        self.secrets.set_secret(&id.secret_key(), Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySecretStore;
    use std::thread;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> (AccountManager, Arc<MemorySecretStore>) {
        let secrets = Arc::new(MemorySecretStore::new());
        let manager =
            AccountManager::with_path(temp_dir.path().join("accounts.toml"), secrets.clone())
                .unwrap();
        (manager, secrets)
    }

    #[test]
    fn test_validate_login() {
        assert!(validate_login("alice").is_ok());
        assert!(validate_login("bob-smith").is_ok());
        assert!(validate_login("ci_bot_2").is_ok());

        assert!(validate_login("").is_err());
        assert!(validate_login(&"a".repeat(40)).is_err());
        assert!(validate_login("has space").is_err());
        assert!(validate_login("a@b").is_err());
    }

    #[test]
    fn test_add_account_binds_token() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, secrets) = manager(&temp_dir);

        let account = Account::create("alice", ServerPath::default_server());
        let id = account.id;
        manager.add_account(account, "tok123").unwrap();

        let accounts = manager.accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].login, "alice");
        assert_eq!(accounts[0].server.to_string(), "github.com");
        assert_eq!(manager.token(&id).unwrap().as_deref(), Some("tok123"));
        assert_eq!(
            secrets.get_secret(&id.secret_key()).unwrap().as_deref(),
            Some("tok123")
        );
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager(&temp_dir);

        manager
            .add_account(Account::create("alice", ServerPath::default_server()), "a")
            .unwrap();
        let result =
            manager.add_account(Account::create("ALICE", ServerPath::default_server()), "b");

        match result {
            Err(crate::error::GhAccountsError::Account(AccountError::Duplicate(login, server))) => {
                assert_eq!(login, "ALICE");
                assert_eq!(server, "github.com");
            }
            other => panic!("Expected Duplicate error, got {:?}", other),
        }

        // Same login on another server is a different identity
        let enterprise: ServerPath = "ghe.corp".parse().unwrap();
        manager
            .add_account(Account::create("alice", enterprise), "c")
            .unwrap();
        assert_eq!(manager.accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_login_rejected_without_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, secrets) = manager(&temp_dir);

        let account = Account::create("not valid", ServerPath::default_server());
        let key = account.id.secret_key();
        assert!(manager.add_account(account, "tok").is_err());

        assert!(manager.accounts().unwrap().is_empty());
        assert_eq!(secrets.get_secret(&key).unwrap(), None);
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the state file should be makes the write fail
        let state_file = temp_dir.path().join("accounts.toml");
        std::fs::create_dir_all(&state_file).unwrap();

        let secrets = Arc::new(MemorySecretStore::new());
        let manager = AccountManager {
            state_file,
            state: Arc::new(RwLock::new(AccountState::default())),
            secrets: secrets.clone(),
        };

        let account = Account::create("alice", ServerPath::default_server());
        let key = account.id.secret_key();
        assert!(manager.add_account(account, "tok").is_err());

        assert!(manager.accounts().unwrap().is_empty());
        assert_eq!(secrets.get_secret(&key).unwrap(), None);
    }

    #[test]
    fn test_set_account_token() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager(&temp_dir);

        let account = Account::create("alice", ServerPath::default_server());
        let id = account.id;
        manager.add_account(account, "old").unwrap();

        manager.set_account_token(&id, "new").unwrap();
        assert_eq!(manager.token(&id).unwrap().as_deref(), Some("new"));

        let unknown = AccountId::generate();
        assert!(manager.set_account_token(&unknown, "x").is_err());
    }

    #[test]
    fn test_state_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let state_file = temp_dir.path().join("accounts.toml");
        let secrets = Arc::new(MemorySecretStore::new());

        let account = Account::create("alice", "https://ghe.corp".parse().unwrap());
        {
            let manager = AccountManager::with_path(state_file.clone(), secrets.clone()).unwrap();
            manager.add_account(account.clone(), "tok").unwrap();
        }

        let manager = AccountManager::with_path(state_file, secrets).unwrap();
        assert_eq!(manager.accounts().unwrap(), vec![account]);
    }

    #[test]
    fn test_missing_state_file_graceful() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager(&temp_dir);
        assert!(manager.accounts().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_state_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let state_file = temp_dir.path().join("accounts.toml");
        std::fs::write(&state_file, "invalid toml {{{").unwrap();

        let result = AccountManager::with_path(state_file.clone(), Arc::new(MemorySecretStore::new()));

        assert!(matches!(
            result,
            Err(crate::error::GhAccountsError::Account(AccountError::StateFile(_)))
        ));
        assert_eq!(std::fs::read_to_string(&state_file).unwrap(), "invalid toml {{{");
    }

    #[test]
    #[cfg(unix)]
    fn test_state_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager(&temp_dir);
        manager
            .add_account(Account::create("alice", ServerPath::default_server()), "tok")
            .unwrap();

        let metadata = std::fs::metadata(temp_dir.path().join("accounts.toml")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_thread_safety() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager(&temp_dir);
        let manager = Arc::new(manager);

        let mut handles = vec![];
        for i in 0..10 {
            let manager_clone = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                let login = format!("user-{}", i);
                let account = Account::create(&login, ServerPath::default_server());
                let id = account.id;
                manager_clone.add_account(account, &login).unwrap();
                id
            }));
        }

        let ids: Vec<AccountId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(manager.accounts().unwrap().len(), 10);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(
                manager.token(id).unwrap(),
                Some(format!("user-{}", i))
            );
        }
    }

    #[test]
    fn test_account_display() {
        let account = Account::create("alice", "ghe.corp:8080".parse().unwrap());
        assert_eq!(account.to_string(), "alice@ghe.corp:8080");
    }
}
