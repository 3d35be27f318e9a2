//! Error types shared by the loader and the orchestrator
//!
//! Leaf fetches and the loader speak `anyhow::Error`. The types here are the
//! ones callers need to recognise: a page that exhausted its retries, a run
//! that was cancelled, and the composite error a failed run returns.

use thiserror::Error;
use tokio::sync::mpsc;

/// Failure of one logical resource listing
#[derive(Debug, Error)]
pub enum FetchError {
    /// A page kept failing after every allowed retry
    #[error("fetching {label} in batch {batch} failed after {attempts} attempts")]
    Batch {
        label: String,
        batch: u32,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The run's cancellation token fired
    #[error("cancelled")]
    Cancelled,
}

/// Every failure observed during one aggregation run
#[derive(Debug, Error)]
#[error("multiple errors: [{}]", join_errors(.errors))]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
}

impl AggregateError {
    pub fn new(errors: Vec<anyhow::Error>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

fn join_errors(errors: &[anyhow::Error]) -> String {
    errors
        .iter()
        .map(|err| format!("{err:#}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fold the errors of a run into the single error it reports.
///
/// A lone failure is surfaced as-is so the common case reads without an
/// extra layer of nesting.
pub fn collapse(mut errors: Vec<anyhow::Error>) -> Option<anyhow::Error> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(AggregateError::new(errors).into()),
    }
}

/// True when the error, or anything in its chain, is a cancellation
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<FetchError>(),
            Some(FetchError::Cancelled)
        )
    })
}

/// Sending half of a run's error channel. Cloned into every task.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<anyhow::Error>,
}

impl ErrorSink {
    /// Report a failure. Never blocks; a closed channel means the run is
    /// already over and the error is only logged.
    pub fn report(&self, err: anyhow::Error) {
        tracing::debug!("task failed: {:#}", err);
        if let Err(mpsc::error::SendError(err)) = self.tx.send(err) {
            tracing::warn!("error reported after the run finished: {:#}", err);
        }
    }
}

/// Create a run's error channel
pub fn error_channel() -> (ErrorSink, mpsc::UnboundedReceiver<anyhow::Error>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ErrorSink { tx }, rx)
}
