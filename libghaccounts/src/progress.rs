//! Modal progress over a background task
//!
//! The interactive thread blocks while a future runs on the tokio runtime.
//! The progress indicator shown meanwhile holds a [`Cancellation`]; when the
//! user cancels, the blocked caller returns immediately, the task is aborted,
//! and whatever it would have produced is dropped.

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Cancellation signal shared between a progress indicator and the waiting caller
#[derive(Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns after a cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// User-visible indicator shown while the interactive thread waits
pub trait ProgressIndicator: Send + Sync {
    /// Show the indicator; `cancellation` is triggered when the user cancels
    fn begin(&self, title: &str, cancellation: &Cancellation);

    /// Hide the indicator
    fn end(&self);
}

/// Indicator that shows nothing and never cancels
pub struct NoProgress;

impl ProgressIndicator for NoProgress {
    fn begin(&self, title: &str, _cancellation: &Cancellation) {
        tracing::debug!("{}...", title);
    }

    fn end(&self) {}
}

/// Why a task run under progress produced no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    /// The user cancelled the progress indicator
    Cancelled,
    /// The caller is itself running inside the async runtime
    WrongThread,
    /// The task panicked or was torn down by the runtime
    Failed(String),
}

/// Run `task` on the runtime behind `handle`, blocking the caller until it
/// finishes or `progress` is cancelled
///
/// Must be called from a thread outside the runtime. A cancellation that
/// races with completion wins: the late result is discarded.
pub fn run_with_progress<T, F>(
    handle: &Handle,
    progress: &dyn ProgressIndicator,
    title: &str,
    task: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if Handle::try_current().is_ok() {
        return Err(Interrupted::WrongThread);
    }

    let cancellation = Cancellation::new();
    progress.begin(title, &cancellation);

    let join = handle.spawn(task);
    let abort = join.abort_handle();

    let outcome = handle.block_on(async {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => None,
            joined = join => Some(joined),
        }
    });

    progress.end();

    match outcome {
        None => {
            abort.abort();
            tracing::debug!("{} cancelled by user", title);
            Err(Interrupted::Cancelled)
        }
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(Interrupted::Failed(e.to_string())),
    }
}
