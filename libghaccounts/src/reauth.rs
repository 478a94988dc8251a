//! Interactive re-authentication
//!
//! When a legacy credential cannot be migrated silently, the user is shown a
//! login form pre-filled with whatever the legacy store knew. Rendering the
//! form is up to the [`LoginPrompt`] implementation; this module decides what
//! goes into it.

use std::fmt;

use crate::error::ValidationError;
use crate::server::ServerPath;

/// Shown when the legacy account used a password
pub const PASSWORD_NOT_SUPPORTED_MESSAGE: &str = "Password authentication is no longer supported for GitHub.\n\
     Personal access token can be acquired instead.";

/// Pre-filled contents of the login form
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Server address as the legacy store had it; the form does not let the
    /// user change it
    pub server: String,
    pub login: Option<String>,
    /// Starting token value (the legacy token or password)
    pub token: Option<String>,
    /// Inline error from a failed silent validation
    pub error: Option<String>,
    /// Explanation shown above the form
    pub message: Option<String>,
}

impl LoginRequest {
    /// Form shown after a stored token failed validation
    pub fn after_failed_validation(server: &str, token: &str, error: &ValidationError) -> Self {
        Self {
            server: server.to_string(),
            login: None,
            token: Some(token.to_string()),
            error: Some(error.to_string()),
            message: None,
        }
    }

    /// Form shown for a password-based legacy account
    pub fn for_password_account(server: &str, login: Option<&str>, password: Option<&str>) -> Self {
        Self {
            server: server.to_string(),
            login: login.map(str::to_string),
            token: password.map(str::to_string),
            error: None,
            message: Some(PASSWORD_NOT_SUPPORTED_MESSAGE.to_string()),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("server", &self.server)
            .field("login", &self.login)
            .field("has_token", &self.token.is_some())
            .field("error", &self.error)
            .field("message", &self.message)
            .finish()
    }
}

/// Values the user confirmed in the login form
#[derive(Clone, PartialEq, Eq)]
pub struct ConfirmedLogin {
    pub login: String,
    pub server: ServerPath,
    pub token: String,
}

impl fmt::Debug for ConfirmedLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmedLogin")
            .field("login", &self.login)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// The modal login form
///
/// A confirmed result is trusted as-is: implementations are expected to have
/// applied their own acceptance checks before returning it.
pub trait LoginPrompt: Send + Sync {
    /// Show the form; `None` means the user cancelled
    fn prompt(&self, request: &LoginRequest) -> Option<ConfirmedLogin>;
}

/// Show `request` and report the outcome
pub fn prompt_for_credentials(
    prompt: &dyn LoginPrompt,
    request: &LoginRequest,
) -> Option<ConfirmedLogin> {
    tracing::debug!("Requesting credentials for {}", request.server);

    let confirmed = prompt.prompt(request);
    match &confirmed {
        Some(login) => tracing::debug!("User confirmed {}@{}", login.login, login.server),
        None => tracing::debug!("User cancelled the login form"),
    }
    confirmed
}
