//! Legacy account migration
//!
//! Moves the single legacy GitHub credential into the multi-account store:
//!
//! 1. Read the legacy snapshot. If it is entirely empty there is nothing to do.
//! 2. If any account is already registered, skip migration but still clear the
//!    legacy data; it is residue at that point.
//! 3. Token auth: resolve the token's login remotely and register the account
//!    under that login. If that fails, fall back to the login form with the
//!    failure shown inline.
//! 4. Basic auth: passwords are no longer accepted, so go straight to the
//!    login form with an explanation.
//! 5. Unless the user cancelled the login form, clear the legacy data.

use std::sync::Arc;
use tokio::runtime::Handle;

use crate::accounts::{Account, AccountStore};
use crate::error::{GhAccountsError, Result, ValidationError};
use crate::legacy::{AuthMode, LegacyCredential, LegacyStore};
use crate::progress::ProgressIndicator;
use crate::reauth::{prompt_for_credentials, LoginPrompt, LoginRequest};
use crate::server::ServerPath;
use crate::validator::TokenValidator;

/// User-facing collaborators a migration may need
pub struct Interaction<'a> {
    pub progress: &'a dyn ProgressIndicator,
    pub prompt: &'a dyn LoginPrompt,
}

/// What a migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Account registered from the legacy data, if any
    pub account: Option<Account>,
    /// Whether legacy data was erased
    pub legacy_cleared: bool,
    /// Whether the user cancelled the login form
    pub cancelled: bool,
}

impl MigrationOutcome {
    /// `true` when migration completed or was not needed
    pub fn completed(&self) -> bool {
        !self.cancelled
    }
}

enum Step {
    Registered(Account),
    NothingToMigrate,
    Cancelled,
}

/// One-time migration of the legacy credential into the account store
pub struct AccountsMigration {
    legacy: LegacyStore,
    accounts: Arc<dyn AccountStore>,
    validator: TokenValidator,
}

impl AccountsMigration {
    pub fn new(
        legacy: LegacyStore,
        accounts: Arc<dyn AccountStore>,
        validator: TokenValidator,
    ) -> Self {
        Self {
            legacy,
            accounts,
            validator,
        }
    }

    /// Whether a migratable legacy account exists
    ///
    /// Safe for status polling: read failures count as "no".
    pub fn has_legacy_account(&self) -> bool {
        match self.legacy.read_snapshot() {
            Ok(legacy) => legacy.has_legacy_account(),
            Err(e) => {
                tracing::debug!("Could not read legacy auth: {}", e);
                false
            }
        }
    }

    /// Server of the legacy account, if there is one
    pub fn old_server(&self) -> Option<ServerPath> {
        match self.legacy.read_snapshot() {
            Ok(legacy) if legacy.has_legacy_account() => legacy.effective_server(),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Could not read legacy auth: {}", e);
                None
            }
        }
    }

    /// Run the migration; `false` means the user cancelled
    ///
    /// Blocks the calling thread. Must not be called from inside the async
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy data cannot be read or cleared, or if
    /// the new account cannot be stored.
    pub fn migrate(&self, interaction: &Interaction<'_>) -> Result<bool> {
        Ok(self.run(interaction)?.completed())
    }

    /// Run the migration and report what it did
    pub fn run(&self, interaction: &Interaction<'_>) -> Result<MigrationOutcome> {
        if Handle::try_current().is_ok() {
            return Err(GhAccountsError::WrongThread);
        }

        tracing::debug!("Migrating legacy auth");
        let legacy = self.legacy.read_snapshot()?;
        tracing::debug!("Legacy auth data: {:?}", legacy);

        if !legacy.has_any_info() {
            return Ok(MigrationOutcome::default());
        }

        let mut outcome = MigrationOutcome::default();

        let existing = self.accounts.accounts()?;
        if existing.is_empty() {
            match self.migrate_credential(&legacy, interaction)? {
                Step::Registered(account) => outcome.account = Some(account),
                Step::Cancelled => outcome.cancelled = true,
                Step::NothingToMigrate => {}
            }
        } else {
            tracing::debug!(
                "{} account(s) already registered, discarding legacy auth",
                existing.len()
            );
        }

        if !outcome.cancelled {
            self.legacy.clear()?;
            outcome.legacy_cleared = true;
        }

        Ok(outcome)
    }

    fn migrate_credential(
        &self,
        legacy: &LegacyCredential,
        interaction: &Interaction<'_>,
    ) -> Result<Step> {
        let host = legacy.host_or_default();

        match legacy.auth_mode {
            AuthMode::Token => {
                let Some(secret) = legacy.secret() else {
                    tracing::debug!("Token auth without a stored token, nothing to migrate");
                    return Ok(Step::NothingToMigrate);
                };
                tracing::debug!("Migrating token auth");

                match self.resolve(host, secret, interaction.progress) {
                    Ok((login, server)) => {
                        let account = Account::create(&login, server);
                        self.register(&account, secret)?;
                        Ok(Step::Registered(account))
                    }
                    Err(e) => {
                        tracing::debug!("Failed to migrate legacy token, asking the user: {}", e);
                        let request = LoginRequest::after_failed_validation(host, secret, &e);
                        self.register_from_prompt(interaction.prompt, &request)
                    }
                }
            }
            AuthMode::Basic => {
                tracing::debug!("Migrating basic auth");

                let request =
                    LoginRequest::for_password_account(host, legacy.login.as_deref(), legacy.secret());
                self.register_from_prompt(interaction.prompt, &request)
            }
            AuthMode::None => Ok(Step::NothingToMigrate),
        }
    }

    fn resolve(
        &self,
        host: &str,
        secret: &str,
        progress: &dyn ProgressIndicator,
    ) -> std::result::Result<(String, ServerPath), ValidationError> {
        let server = ServerPath::from_host(Some(host)).map_err(|e| {
            tracing::debug!("{}", e);
            ValidationError::InvalidServer(host.to_string())
        })?;
        let login = self.validator.validate(&server, secret, progress)?;
        Ok((login, server))
    }

    fn register_from_prompt(
        &self,
        prompt: &dyn LoginPrompt,
        request: &LoginRequest,
    ) -> Result<Step> {
        let Some(confirmed) = prompt_for_credentials(prompt, request) else {
            return Ok(Step::Cancelled);
        };

        let account = Account::create(&confirmed.login, confirmed.server);
        self.register(&account, &confirmed.token)?;
        Ok(Step::Registered(account))
    }

    fn register(&self, account: &Account, token: &str) -> Result<()> {
        self.accounts.add_account(account.clone(), token)?;
        tracing::info!("Registered account {}", account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SecretStore;
    use crate::legacy::{LegacyAuthSettings, LEGACY_PASSWORD_KEY};
    use crate::memory::{
        MemoryAccountStore, MemoryLegacySettings, MemorySecretStore, ScriptedProgress,
        ScriptedPrompt, ScriptedResolver,
    };
    use crate::reauth::PASSWORD_NOT_SUPPORTED_MESSAGE;

    struct Fixture {
        runtime: tokio::runtime::Runtime,
        settings: Arc<MemoryLegacySettings>,
        secrets: Arc<MemorySecretStore>,
        accounts: Arc<MemoryAccountStore>,
        resolver: Arc<ScriptedResolver>,
    }

    impl Fixture {
        fn new(settings: LegacyAuthSettings, secret: Option<&str>, resolver: ScriptedResolver) -> Self {
            let secrets = Arc::new(MemorySecretStore::new());
            secrets.set_secret(LEGACY_PASSWORD_KEY, secret).unwrap();
            Self {
                runtime: tokio::runtime::Runtime::new().unwrap(),
                settings: Arc::new(MemoryLegacySettings::with(settings)),
                secrets,
                accounts: Arc::new(MemoryAccountStore::new()),
                resolver: Arc::new(resolver),
            }
        }

        fn migration(&self) -> AccountsMigration {
            AccountsMigration::new(
                LegacyStore::new(self.settings.clone(), self.secrets.clone()),
                self.accounts.clone(),
                TokenValidator::new(self.resolver.clone(), self.runtime.handle().clone()),
            )
        }
    }

    fn settings(host: Option<&str>, login: Option<&str>, auth_mode: AuthMode) -> LegacyAuthSettings {
        LegacyAuthSettings {
            host: host.map(str::to_string),
            login: login.map(str::to_string),
            auth_mode,
        }
    }

    #[test]
    fn test_rejects_calls_from_inside_runtime() {
        let fixture = Fixture::new(
            settings(None, None, AuthMode::Token),
            Some("tok123"),
            ScriptedResolver::new(),
        );
        let migration = fixture.migration();
        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();

        let result = fixture.runtime.block_on(async {
            migration.migrate(&Interaction {
                progress: &progress,
                prompt: &prompt,
            })
        });

        assert!(matches!(result, Err(GhAccountsError::WrongThread)));
        assert_eq!(fixture.settings.clear_count(), 0);
    }

    #[test]
    fn test_detection_swallows_read_failures() {
        let fixture = Fixture::new(
            settings(None, None, AuthMode::Token),
            Some("tok123"),
            ScriptedResolver::new(),
        );
        fixture.settings.fail_reads(true);
        let migration = fixture.migration();

        assert!(!migration.has_legacy_account());
        assert_eq!(migration.old_server(), None);

        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();
        let result = migration.migrate(&Interaction {
            progress: &progress,
            prompt: &prompt,
        });
        assert!(matches!(result, Err(GhAccountsError::Legacy(_))));
    }

    #[test]
    fn test_old_server() {
        let fixture = Fixture::new(
            settings(Some("GHE.corp:8443"), None, AuthMode::Token),
            None,
            ScriptedResolver::new(),
        );
        let server = fixture.migration().old_server().unwrap();
        assert_eq!(server.to_string(), "ghe.corp:8443");

        let fixture = Fixture::new(settings(None, None, AuthMode::Token), None, ScriptedResolver::new());
        assert!(fixture.migration().old_server().unwrap().is_default());

        let fixture = Fixture::new(settings(None, None, AuthMode::Basic), None, ScriptedResolver::new());
        assert_eq!(fixture.migration().old_server(), None);
    }

    #[test]
    fn test_old_server_with_non_ascii_host() {
        let fixture = Fixture::new(
            settings(Some("aéééé"), None, AuthMode::Token),
            Some("tok123"),
            ScriptedResolver::new(),
        );
        let migration = fixture.migration();

        assert!(migration.has_legacy_account());
        assert_eq!(migration.old_server().unwrap().host(), "aéééé");
    }

    #[test]
    fn test_basic_without_login_still_prompts() {
        let fixture = Fixture::new(settings(None, None, AuthMode::Basic), Some("pw"), ScriptedResolver::new());
        let migration = fixture.migration();
        assert!(!migration.has_legacy_account());

        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();
        let completed = migration
            .migrate(&Interaction {
                progress: &progress,
                prompt: &prompt,
            })
            .unwrap();

        assert!(!completed);
        let requests = prompt.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].login, None);
        assert_eq!(requests[0].token.as_deref(), Some("pw"));
        assert_eq!(requests[0].message.as_deref(), Some(PASSWORD_NOT_SUPPORTED_MESSAGE));
        assert_eq!(fixture.settings.clear_count(), 0);
        assert_eq!(
            fixture.secrets.get_secret(LEGACY_PASSWORD_KEY).unwrap().as_deref(),
            Some("pw")
        );
    }

    #[test]
    fn test_token_without_secret_only_clears() {
        let fixture = Fixture::new(settings(None, None, AuthMode::Token), None, ScriptedResolver::new());
        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();

        let outcome = fixture
            .migration()
            .run(&Interaction {
                progress: &progress,
                prompt: &prompt,
            })
            .unwrap();

        assert!(outcome.completed());
        assert!(outcome.legacy_cleared);
        assert_eq!(outcome.account, None);
        assert_eq!(fixture.resolver.call_count(), 0);
        assert!(prompt.requests().is_empty());
        assert_eq!(fixture.settings.clear_count(), 1);
    }

    #[test]
    fn test_invalid_host_falls_back_to_prompt() {
        let fixture = Fixture::new(
            settings(Some("http://:99999"), None, AuthMode::Token),
            Some("tok123"),
            ScriptedResolver::new(),
        );
        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();

        let completed = fixture
            .migration()
            .migrate(&Interaction {
                progress: &progress,
                prompt: &prompt,
            })
            .unwrap();

        assert!(!completed);
        assert_eq!(fixture.resolver.call_count(), 0);

        let requests = prompt.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server, "http://:99999");
        assert!(requests[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Invalid server address: http://:99999"));
    }

    #[test]
    fn test_residue_without_auth_mode_is_cleared() {
        let fixture = Fixture::new(
            settings(Some("github.com"), None, AuthMode::None),
            None,
            ScriptedResolver::new(),
        );
        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();

        let outcome = fixture
            .migration()
            .run(&Interaction {
                progress: &progress,
                prompt: &prompt,
            })
            .unwrap();

        assert!(outcome.legacy_cleared);
        assert_eq!(fixture.settings.current(), LegacyAuthSettings::default());
        assert!(prompt.requests().is_empty());
    }

    #[test]
    fn test_store_write_failure_propagates() {
        let fixture = Fixture::new(
            settings(None, None, AuthMode::Token),
            Some("tok123"),
            ScriptedResolver::new().with_login("github.com", "tok123", "alice"),
        );
        fixture.accounts.fail_writes(true);
        let prompt = ScriptedPrompt::cancel();
        let progress = ScriptedProgress::new();

        let result = fixture.migration().migrate(&Interaction {
            progress: &progress,
            prompt: &prompt,
        });

        assert!(matches!(result, Err(GhAccountsError::Account(_))));
        assert_eq!(fixture.settings.clear_count(), 0);
        assert_eq!(
            fixture.secrets.get_secret(LEGACY_PASSWORD_KEY).unwrap().as_deref(),
            Some("tok123")
        );
    }
}
