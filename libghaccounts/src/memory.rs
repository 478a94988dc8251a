//! In-process collaborators
//!
//! Memory-backed stores plus scripted resolver, prompt and progress
//! implementations. Used by the test suites, and usable by embedders that keep
//! state elsewhere. Every type is cheap to clone and clones share state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::accounts::{validate_login, Account, AccountId, AccountStore};
use crate::credentials::{validate_secret_key, SecretStore};
use crate::error::{AccountError, LegacyError, Result, ValidationError};
use crate::identity::IdentityResolver;
use crate::legacy::{LegacyAuthSettings, LegacySettings};
use crate::progress::{Cancellation, ProgressIndicator};
use crate::reauth::{ConfirmedLogin, LoginPrompt, LoginRequest};
use crate::server::ServerPath;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Secret store held in memory
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    secrets: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_secret` calls so far
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    pub fn len(&self) -> usize {
        lock(&self.secrets).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.secrets).is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        validate_secret_key(key)?;
        Ok(lock(&self.secrets).get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: Option<&str>) -> Result<()> {
        validate_secret_key(key)?;
        *lock(&self.writes) += 1;

        let mut secrets = lock(&self.secrets);
        match value {
            Some(value) => {
                secrets.insert(key.to_string(), value.to_string());
            }
            None => {
                secrets.remove(key);
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Legacy settings held in memory
#[derive(Clone, Default)]
pub struct MemoryLegacySettings {
    settings: Arc<Mutex<LegacyAuthSettings>>,
    clears: Arc<Mutex<usize>>,
    fail_reads: Arc<Mutex<bool>>,
}

impl MemoryLegacySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(settings: LegacyAuthSettings) -> Self {
        let store = Self::default();
        *lock(&store.settings) = settings;
        store
    }

    pub fn current(&self) -> LegacyAuthSettings {
        lock(&self.settings).clone()
    }

    /// Number of `clear_auth` calls so far
    pub fn clear_count(&self) -> usize {
        *lock(&self.clears)
    }

    /// Make subsequent reads fail
    pub fn fail_reads(&self, fail: bool) {
        *lock(&self.fail_reads) = fail;
    }
}

impl LegacySettings for MemoryLegacySettings {
    fn read(&self) -> Result<LegacyAuthSettings> {
        if *lock(&self.fail_reads) {
            return Err(LegacyError::Read(std::io::Error::new(
                std::io::ErrorKind::Other,
                "settings unavailable",
            ))
            .into());
        }
        Ok(self.current())
    }

    fn clear_auth(&self) -> Result<()> {
        *lock(&self.clears) += 1;
        *lock(&self.settings) = LegacyAuthSettings::default();
        Ok(())
    }
}

/// Account store held in memory; tokens are kept next to the accounts
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    entries: Arc<Mutex<Vec<(Account, String)>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an account
    pub fn with_account(self, login: &str, server: ServerPath, token: &str) -> Self {
        lock(&self.entries).push((Account::create(login, server), token.to_string()));
        self
    }

    /// Token bound to the account with `login`
    pub fn token_for(&self, login: &str) -> Option<String> {
        lock(&self.entries)
            .iter()
            .find(|(account, _)| account.login == login)
            .map(|(_, token)| token.clone())
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    fn check_writable(&self) -> Result<()> {
        if *lock(&self.fail_writes) {
            return Err(AccountError::StateFile("account store is read-only".to_string()).into());
        }
        Ok(())
    }
}

impl AccountStore for MemoryAccountStore {
    fn accounts(&self) -> Result<Vec<Account>> {
        Ok(lock(&self.entries)
            .iter()
            .map(|(account, _)| account.clone())
            .collect())
    }

    fn add_account(&self, account: Account, token: &str) -> Result<()> {
        self.check_writable()?;
        validate_login(&account.login)?;

        let mut entries = lock(&self.entries);
        if entries
            .iter()
            .any(|(a, _)| a.is_same_identity(&account.login, &account.server))
        {
            return Err(AccountError::Duplicate(account.login, account.server.to_string()).into());
        }
        entries.push((account, token.to_string()));
        Ok(())
    }

    fn set_account_token(&self, id: &AccountId, token: &str) -> Result<()> {
        self.check_writable()?;

        let mut entries = lock(&self.entries);
        let entry = entries
            .iter_mut()
            .find(|(account, _)| &account.id == id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;
        entry.1 = token.to_string();
        Ok(())
    }
}

/// Identity resolver answering from a fixed table
///
/// Unknown (server, token) pairs fail with an authentication error.
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    logins: Arc<Mutex<HashMap<(String, String), String>>>,
    failure: Option<ValidationError>,
    delay: Duration,
    calls: Arc<Mutex<usize>>,
    completed: Arc<Mutex<usize>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that fails every lookup with `error`
    pub fn failing(error: ValidationError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Resolve `token` on `server` to `login`
    pub fn with_login(self, server: &str, token: &str, login: &str) -> Self {
        lock(&self.logins).insert((server.to_string(), token.to_string()), login.to_string());
        self
    }

    /// Wait `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Lookups started
    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }

    /// Lookups that ran to completion
    pub fn completed_count(&self) -> usize {
        *lock(&self.completed)
    }
}

#[async_trait]
impl IdentityResolver for ScriptedResolver {
    async fn resolve_identity(
        &self,
        server: &ServerPath,
        secret: &str,
    ) -> std::result::Result<String, ValidationError> {
        *lock(&self.calls) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *lock(&self.completed) += 1;

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        lock(&self.logins)
            .get(&(server.to_string(), secret.to_string()))
            .cloned()
            .ok_or_else(|| ValidationError::Authentication("Bad credentials".to_string()))
    }
}

/// Login prompt that answers every request the same way and records requests
#[derive(Clone)]
pub struct ScriptedPrompt {
    response: Option<ConfirmedLogin>,
    requests: Arc<Mutex<Vec<LoginRequest>>>,
}

impl ScriptedPrompt {
    /// Prompt where the user always cancels
    pub fn cancel() -> Self {
        Self {
            response: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompt where the user always confirms the given values
    pub fn confirm(login: &str, server: ServerPath, token: &str) -> Self {
        Self {
            response: Some(ConfirmedLogin {
                login: login.to_string(),
                server,
                token: token.to_string(),
            }),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<LoginRequest> {
        lock(&self.requests).clone()
    }
}

impl LoginPrompt for ScriptedPrompt {
    fn prompt(&self, request: &LoginRequest) -> Option<ConfirmedLogin> {
        lock(&self.requests).push(request.clone());
        self.response.clone()
    }
}

#[derive(Clone, Copy)]
enum CancelMode {
    Never,
    OnBegin,
    After(Duration),
}

/// Progress indicator that records titles and can simulate a user cancel
#[derive(Clone)]
pub struct ScriptedProgress {
    mode: CancelMode,
    titles: Arc<Mutex<Vec<String>>>,
    ends: Arc<Mutex<usize>>,
}

impl ScriptedProgress {
    /// Never cancels
    pub fn new() -> Self {
        Self::with_mode(CancelMode::Never)
    }

    /// Cancels as soon as it is shown
    pub fn cancel_on_begin() -> Self {
        Self::with_mode(CancelMode::OnBegin)
    }

    /// Cancels `delay` after it is shown
    pub fn cancel_after(delay: Duration) -> Self {
        Self::with_mode(CancelMode::After(delay))
    }

    fn with_mode(mode: CancelMode) -> Self {
        Self {
            mode,
            titles: Arc::new(Mutex::new(Vec::new())),
            ends: Arc::new(Mutex::new(0)),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        lock(&self.titles).clone()
    }

    pub fn end_count(&self) -> usize {
        *lock(&self.ends)
    }
}

impl Default for ScriptedProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressIndicator for ScriptedProgress {
    fn begin(&self, title: &str, cancellation: &Cancellation) {
        lock(&self.titles).push(title.to_string());

        match self.mode {
            CancelMode::Never => {}
            CancelMode::OnBegin => cancellation.cancel(),
            CancelMode::After(delay) => {
                let cancellation = cancellation.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    cancellation.cancel();
                });
            }
        }
    }

    fn end(&self) {
        *lock(&self.ends) += 1;
    }
}
