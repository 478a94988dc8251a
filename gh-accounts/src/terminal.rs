//! Terminal progress indicator and login prompt

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;

use libghaccounts::error::ValidationError;
use libghaccounts::progress::{Cancellation, ProgressIndicator};
use libghaccounts::reauth::{ConfirmedLogin, LoginPrompt, LoginRequest};
use libghaccounts::server::ServerPath;
use libghaccounts::validator::TokenValidator;

/// Progress line on stderr; Ctrl-C cancels the running operation
///
/// The Ctrl-C listener is installed on first use. From then on a Ctrl-C while
/// input is being read marks the read as interrupted, so the terminal state
/// set up by the reader is restored when it returns. A Ctrl-C with nothing
/// running exits the process with status 130.
pub struct TerminalProgress {
    runtime: Handle,
    current: Arc<Mutex<Option<Cancellation>>>,
    reading: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
    listening: Mutex<bool>,
}

impl TerminalProgress {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            current: Arc::new(Mutex::new(None)),
            reading: Arc::new(AtomicBool::new(false)),
            interrupted: Arc::new(AtomicBool::new(false)),
            listening: Mutex::new(false),
        }
    }

    /// Run a blocking terminal read; `Ok(None)` if Ctrl-C was pressed meanwhile
    pub fn read_input<F>(&self, read: F) -> io::Result<Option<String>>
    where
        F: FnOnce() -> io::Result<String>,
    {
        self.ensure_listener();
        self.interrupted.store(false, Ordering::SeqCst);
        self.reading.store(true, Ordering::SeqCst);
        let result = read();
        self.reading.store(false, Ordering::SeqCst);

        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        result.map(Some)
    }

    fn ensure_listener(&self) {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        if *listening {
            return;
        }
        *listening = true;

        let current = self.current.clone();
        let reading = self.reading.clone();
        let interrupted = self.interrupted.clone();
        self.runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let running = current
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(cancellation) = running {
                    cancellation.cancel();
                } else if reading.load(Ordering::SeqCst) {
                    interrupted.store(true, Ordering::SeqCst);
                    eprint!("\n(interrupted, press Enter) ");
                    let _ = io::stderr().flush();
                } else {
                    eprintln!();
                    std::process::exit(130);
                }
            }
        });
    }
}

impl ProgressIndicator for TerminalProgress {
    fn begin(&self, title: &str, cancellation: &Cancellation) {
        self.ensure_listener();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancellation.clone());

        eprint!("{}... (Ctrl-C to cancel) ", title);
        let _ = io::stderr().flush();
    }

    fn end(&self) {
        let cancelled = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map_or(true, |c| c.is_cancelled());

        eprintln!("{}", if cancelled { "cancelled" } else { "done" });
    }
}

/// Token prompt on the terminal
///
/// Entered tokens are checked against GitHub before they are accepted; the
/// login GitHub reports becomes the account name. An empty token cancels.
pub struct TerminalLoginPrompt {
    validator: TokenValidator,
    progress: Arc<TerminalProgress>,
}

impl TerminalLoginPrompt {
    pub fn new(validator: TokenValidator, progress: Arc<TerminalProgress>) -> Self {
        Self {
            validator,
            progress,
        }
    }

    /// Hidden token entry; `None` on empty input, Ctrl-C or a read failure
    fn read_token(&self) -> Option<String> {
        let read = self.progress.read_input(|| {
            rpassword::prompt_password("Personal access token (empty to cancel): ")
        });
        match read {
            Ok(Some(token)) => Some(token.trim().to_string()).filter(|t| !t.is_empty()),
            Ok(None) => None,
            Err(e) => {
                eprintln!("✗ Failed to read token: {}", e);
                None
            }
        }
    }

    /// Ask whether to check the stored token again
    fn confirm_retry(&self) -> bool {
        eprint!("Retry the stored token? [y/N] ");
        let _ = io::stderr().flush();

        let read = self.progress.read_input(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line)
        });
        matches!(read, Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y"))
    }
}

impl LoginPrompt for TerminalLoginPrompt {
    fn prompt(&self, request: &LoginRequest) -> Option<ConfirmedLogin> {
        if !atty::is(atty::Stream::Stdin) {
            eprintln!("Cannot ask for a GitHub token: stdin is not a terminal");
            return None;
        }

        let server: ServerPath = match request.server.parse() {
            Ok(server) => server,
            Err(e) => {
                eprintln!("✗ {}", e);
                return None;
            }
        };

        eprintln!();
        if let Some(message) = &request.message {
            eprintln!("{}", message);
            eprintln!();
        }
        eprintln!("Log in to {}", server);
        if let Some(login) = &request.login {
            eprintln!("Previous login: {}", login);
        }

        let mut error = request.error.clone();
        let mut stored = retryable_token(request);
        loop {
            if let Some(message) = error.take() {
                eprintln!("✗ {}", message);
            }

            let token = match stored.take() {
                Some(token) if self.confirm_retry() => token,
                _ => self.read_token()?,
            };

            match self.validator.validate(&server, &token, self.progress.as_ref()) {
                Ok(login) => {
                    return Some(ConfirmedLogin {
                        login,
                        server,
                        token,
                    })
                }
                Err(ValidationError::Cancelled) => {
                    error = Some("Token check cancelled".to_string());
                }
                Err(e) => error = Some(e.to_string()),
            }
        }
    }
}

/// Stored token worth offering again: only one that failed a lookup, which may
/// have been a transient failure. A legacy password is never a valid token.
fn retryable_token(request: &LoginRequest) -> Option<String> {
    request.token.clone().filter(|_| request.error.is_some())
}
