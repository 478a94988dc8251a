//! gh-accounts - GitHub multi-account credentials
//!
//! This library moves the single GitHub credential of older installations
//! (host, login, auth mode and a protected secret) into a store of named
//! accounts, validating stored tokens against the GitHub API and falling back
//! to an interactive login when that is not possible.

pub mod accounts;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod legacy;
pub mod logging;
pub mod memory;
pub mod migration;
pub mod progress;
pub mod reauth;
pub mod server;
pub mod validator;

// Re-export commonly used types
pub use accounts::{Account, AccountId, AccountManager, AccountStore};
pub use config::Config;
pub use credentials::{CredentialConfig, CredentialManager, SecretStore, StorageBackend};
pub use error::{GhAccountsError, Result};
pub use identity::{GithubIdentityResolver, IdentityResolver};
pub use legacy::{AuthMode, LegacyCredential, LegacyStore, TomlLegacySettings};
pub use migration::{AccountsMigration, Interaction, MigrationOutcome};
pub use progress::{Cancellation, ProgressIndicator};
pub use reauth::{ConfirmedLogin, LoginPrompt, LoginRequest};
pub use server::ServerPath;
pub use validator::TokenValidator;
