//! Remote identity lookup ("who am I")
//!
//! Given a server and a candidate token, ask the server which login the
//! token belongs to. The login returned here is authoritative: it is the name
//! an account gets registered under after a successful silent migration.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ValidationError;
use crate::server::ServerPath;

/// Resolves the login a secret authenticates as
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up the current user on `server` authenticated with `secret`
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` on authentication, transport or response failures.
    async fn resolve_identity(
        &self,
        server: &ServerPath,
        secret: &str,
    ) -> std::result::Result<String, ValidationError>;
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    login: String,
}

/// Settings for [`GithubIdentityResolver`]
#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("gh-accounts/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Identity lookup against the GitHub REST API (`GET /user`)
pub struct GithubIdentityResolver {
    client: reqwest::Client,
    user_agent: String,
}

impl GithubIdentityResolver {
    pub fn new(config: GithubClientConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ValidationError::Network(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            user_agent: config.user_agent,
        })
    }
}

#[async_trait]
impl IdentityResolver for GithubIdentityResolver {
    async fn resolve_identity(
        &self,
        server: &ServerPath,
        secret: &str,
    ) -> std::result::Result<String, ValidationError> {
        let url = format!("{}/user", server.api_url());
        tracing::debug!("Resolving identity at {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {}", secret))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, server))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status.as_u16(), server));
        }

        let user: CurrentUser = response.json().await.map_err(|e| {
            ValidationError::UnexpectedResponse(format!(
                "GitHub identity lookup on {} returned an unreadable user: {}. \
                 Suggestion: Check that the server is a GitHub or GitHub Enterprise instance.",
                server, e
            ))
        })?;

        if user.login.is_empty() {
            return Err(ValidationError::UnexpectedResponse(format!(
                "GitHub identity lookup on {} returned an empty login",
                server
            )));
        }

        tracing::debug!("Token on {} belongs to {}", server, user.login);
        Ok(user.login)
    }
}

/// Map a non-success HTTP status of the identity lookup to a `ValidationError`
fn map_status(status: u16, server: &ServerPath) -> ValidationError {
    match status {
        401 => ValidationError::Authentication(format!(
            "GitHub rejected the token for {} (HTTP 401). \
             Suggestion: Create a new personal access token and enter it here.",
            server
        )),
        403 => ValidationError::Authentication(format!(
            "GitHub refused access for {} (HTTP 403). \
             Suggestion: Check the token's scopes, or wait if the rate limit was exceeded.",
            server
        )),
        404 => ValidationError::UnexpectedResponse(format!(
            "No GitHub API found at {} (HTTP 404). \
             Suggestion: Check that the server address is correct.",
            server.api_url()
        )),
        500..=599 => ValidationError::Network(format!(
            "GitHub server error for {} (HTTP {}). \
             Suggestion: The server may be experiencing issues. Try again later.",
            server, status
        )),
        _ => ValidationError::Network(format!(
            "GitHub HTTP error for {} (HTTP {})",
            server, status
        )),
    }
}

fn map_transport_error(error: &reqwest::Error, server: &ServerPath) -> ValidationError {
    if error.is_timeout() {
        ValidationError::Network(format!(
            "Timed out contacting {}. Suggestion: Check your network connection.",
            server
        ))
    } else if error.is_builder() {
        ValidationError::InvalidServer(format!("{}: {}", server, error))
    } else {
        ValidationError::Network(format!(
            "Failed to contact {}: {}. \
             Suggestion: Check your network connection and the server address.",
            server, error
        ))
    }
}
