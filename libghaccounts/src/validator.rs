//! Blocking token validation under progress

use std::sync::Arc;
use tokio::runtime::Handle;

use crate::error::ValidationError;
use crate::identity::IdentityResolver;
use crate::progress::{run_with_progress, Interrupted, ProgressIndicator};
use crate::server::ServerPath;

/// Progress title shown while a token is being checked
pub const VALIDATION_TITLE: &str = "Accessing GitHub";

/// Resolves the login behind a token while the caller waits on a progress indicator
///
/// The lookup runs as a task on `runtime`; the calling thread blocks until it
/// finishes or the user cancels. A cancelled lookup is reported as
/// [`ValidationError::Cancelled`] and its result, should it still arrive, is dropped.
#[derive(Clone)]
pub struct TokenValidator {
    resolver: Arc<dyn IdentityResolver>,
    runtime: Handle,
}

impl TokenValidator {
    pub fn new(resolver: Arc<dyn IdentityResolver>, runtime: Handle) -> Self {
        Self { resolver, runtime }
    }

    /// Return the login that `secret` authenticates as on `server`
    pub fn validate(
        &self,
        server: &ServerPath,
        secret: &str,
        progress: &dyn ProgressIndicator,
    ) -> Result<String, ValidationError> {
        let resolver = self.resolver.clone();
        let target = server.clone();
        let secret = secret.to_string();

        let lookup = async move { resolver.resolve_identity(&target, &secret).await };

        match run_with_progress(&self.runtime, progress, VALIDATION_TITLE, lookup) {
            Ok(result) => result,
            Err(Interrupted::Cancelled) => Err(ValidationError::Cancelled),
            Err(Interrupted::WrongThread) => Err(ValidationError::UnexpectedResponse(
                "Identity lookup was started from inside the async runtime".to_string(),
            )),
            Err(Interrupted::Failed(reason)) => Err(ValidationError::UnexpectedResponse(format!(
                "Identity lookup on {} did not finish: {}",
                server, reason
            ))),
        }
    }
}
