//! Error types for gh-accounts

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GhAccountsError>;

#[derive(Error, Debug)]
pub enum GhAccountsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Legacy settings error: {0}")]
    Legacy(#[from] LegacyError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Migration must be started from the interactive thread, not from inside an async runtime")]
    WrongThread,
}

impl GhAccountsError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GhAccountsError::InvalidInput(_) => 3,
            GhAccountsError::Validation(ValidationError::Authentication(_)) => 2,
            GhAccountsError::Validation(_) => 1,
            GhAccountsError::Config(_) => 1,
            GhAccountsError::Credential(_) => 1,
            GhAccountsError::Account(_) => 1,
            GhAccountsError::Legacy(_) => 1,
            GhAccountsError::WrongThread => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Cannot determine the user config directory; set GH_ACCOUNTS_CONFIG")]
    NoConfigDir,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("OS keyring unavailable: {0}")]
    KeyringUnavailable(String),

    #[error("Keyring operation failed: {0}")]
    Keyring(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption failed: wrong master password or corrupted file")]
    DecryptionFailed,

    #[error("Master password not set")]
    MasterPasswordNotSet,

    #[error("Master password too weak (minimum 8 characters)")]
    WeakPassword,

    #[error("No secure credential storage available")]
    NoStoreAvailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Account state file error: {0}")]
    StateFile(String),

    #[error("Account '{0}' on '{1}' is already registered")]
    Duplicate(String, String),

    #[error("Account '{0}' not found")]
    NotFound(String),

    #[error("Invalid login: {0}")]
    InvalidLogin(String),
}

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("Failed to read legacy settings: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse legacy settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write legacy settings: {0}")]
    Write(String),
}

/// Failure of a remote identity lookup
///
/// Carried back to the login prompt as the inline error message, so every
/// variant renders a message a user can act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid server address: {0}")]
    InvalidServer(String),

    #[error("Operation cancelled by user")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = GhAccountsError::InvalidInput("empty token".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error: GhAccountsError =
            ValidationError::Authentication("Bad credentials".to_string()).into();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let network: GhAccountsError = ValidationError::Network("timeout".to_string()).into();
        assert_eq!(network.exit_code(), 1);

        let cancelled: GhAccountsError = ValidationError::Cancelled.into();
        assert_eq!(cancelled.exit_code(), 1);

        let account: GhAccountsError = AccountError::StateFile("disk full".to_string()).into();
        assert_eq!(account.exit_code(), 1);

        assert_eq!(GhAccountsError::WrongThread.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_validation() {
        let error: GhAccountsError =
            ValidationError::Authentication("Bad credentials".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Validation failed: Authentication failed: Bad credentials"
        );
    }

    #[test]
    fn test_cancelled_message() {
        assert_eq!(
            ValidationError::Cancelled.to_string(),
            "Operation cancelled by user"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error: GhAccountsError = ConfigError::NoConfigDir.into();
        assert_eq!(
            error.to_string(),
            "Configuration error: Cannot determine the user config directory; set GH_ACCOUNTS_CONFIG"
        );
    }

    #[test]
    fn test_duplicate_account_formatting() {
        let error = AccountError::Duplicate("alice".to_string(), "github.com".to_string());
        assert_eq!(
            error.to_string(),
            "Account 'alice' on 'github.com' is already registered"
        );
    }

    #[test]
    fn test_legacy_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: GhAccountsError = LegacyError::Read(io_error).into();

        match error {
            GhAccountsError::Legacy(LegacyError::Read(_)) => {}
            _ => panic!("Expected GhAccountsError::Legacy"),
        }
    }

    #[test]
    fn test_validation_error_clone() {
        let original = ValidationError::Network("Connection refused".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
