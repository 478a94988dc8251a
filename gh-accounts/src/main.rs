//! gh-accounts - GitHub account management
//!
//! Moves the single GitHub login of older installations into the account
//! list and shows what is registered.

mod terminal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::runtime::Runtime;

use libghaccounts::accounts::{AccountManager, AccountStore};
use libghaccounts::config::Config;
use libghaccounts::credentials::{CredentialManager, SecretStore};
use libghaccounts::error::GhAccountsError;
use libghaccounts::identity::GithubIdentityResolver;
use libghaccounts::legacy::{LegacyStore, TomlLegacySettings};
use libghaccounts::logging::{LogFormat, LoggingConfig};
use libghaccounts::migration::{AccountsMigration, Interaction};
use libghaccounts::validator::TokenValidator;

use terminal::{TerminalLoginPrompt, TerminalProgress};

#[derive(Parser)]
#[command(name = "gh-accounts")]
#[command(about = "Manage GitHub accounts and migrate legacy credentials", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a legacy single-account login is waiting to be migrated
    Status,

    /// Move the legacy login into the account list
    Migrate,

    /// List registered accounts
    List,
}

fn parse_log_format(s: &str) -> std::result::Result<LogFormat, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    // Migration blocks on the runtime from this thread, so main must not
    // itself run inside it.
    let code = match Runtime::new()
        .context("Failed to start async runtime")
        .and_then(|runtime| run_command(&runtime, cli.command))
    {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<GhAccountsError>()
                .map(GhAccountsError::exit_code)
                .unwrap_or(1)
        }
    };

    std::process::exit(code);
}

fn run_command(runtime: &Runtime, command: Commands) -> Result<i32> {
    let app = App::open(runtime)?;

    match command {
        Commands::Status => app.status(),
        Commands::Migrate => app.migrate(runtime),
        Commands::List => app.list(),
    }
}

struct App {
    migration: AccountsMigration,
    accounts: Arc<AccountManager>,
    validator: TokenValidator,
}

impl App {
    fn open(runtime: &Runtime) -> Result<Self> {
        let config = Config::load()?;
        tracing::debug!("Loaded configuration: {:?}", config.github);

        let secrets: Arc<dyn SecretStore> =
            Arc::new(CredentialManager::new(config.credentials.clone())?);

        let legacy = LegacyStore::new(
            Arc::new(TomlLegacySettings::new(config.legacy_settings_path())),
            secrets.clone(),
        );
        let accounts = Arc::new(AccountManager::with_path(
            config.accounts_state_path(),
            secrets,
        )?);

        let resolver = Arc::new(GithubIdentityResolver::new(config.github.client_config())?);
        let validator = TokenValidator::new(resolver, runtime.handle().clone());

        Ok(Self {
            migration: AccountsMigration::new(legacy, accounts.clone(), validator.clone()),
            accounts,
            validator,
        })
    }

    fn status(&self) -> Result<i32> {
        match self.migration.old_server() {
            Some(server) => {
                println!("Legacy account found on {}", server);
                println!("Run 'gh-accounts migrate' to add it to the account list.");
            }
            None if self.migration.has_legacy_account() => {
                println!("Legacy account found, but its server address is invalid");
                println!("Run 'gh-accounts migrate' to log in again.");
            }
            None => println!("✓ No legacy account to migrate"),
        }

        let count = self.accounts.accounts()?.len();
        println!("{} account(s) registered", count);
        Ok(0)
    }

    fn migrate(&self, runtime: &Runtime) -> Result<i32> {
        let progress = Arc::new(TerminalProgress::new(runtime.handle().clone()));
        let prompt = TerminalLoginPrompt::new(self.validator.clone(), progress.clone());

        let outcome = self.migration.run(&Interaction {
            progress: progress.as_ref(),
            prompt: &prompt,
        })?;

        if outcome.cancelled {
            eprintln!("Migration cancelled");
            return Ok(1);
        }

        match (&outcome.account, outcome.legacy_cleared) {
            (Some(account), _) => println!("✓ Migrated legacy account to {}", account),
            (None, true) => println!("✓ Removed leftover legacy credentials"),
            (None, false) => println!("✓ Nothing to migrate"),
        }
        Ok(0)
    }

    fn list(&self) -> Result<i32> {
        let accounts = self.accounts.accounts()?;
        if accounts.is_empty() {
            println!("No accounts registered");
            return Ok(0);
        }

        for account in accounts {
            println!("{}", account);
        }
        Ok(0)
    }
}
