//! Bounded Executor
//!
//! Launches units of work on the tokio runtime under an optional ceiling on
//! how many run at once. Every launch hands back a [`Completion`] that
//! resolves when that unit finishes, and [`Executor::done`] resolves once
//! nothing launched through the executor is still outstanding.
//!
//! The executor never fails. Work reports its own failures through whatever
//! side channel it was given (see [`crate::error::ErrorSink`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{oneshot, watch, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Resolves once the launched unit of work has finished.
///
/// Cloneable, so several dependents can wait on the same parent. It also
/// resolves when the work was abandoned because the run was cancelled while
/// it was queued, or when the work panicked.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<BoxFuture<'static, ()>>,
}

impl Completion {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self {
            inner: rx.map(|_| ()).boxed().shared(),
        }
    }

    /// Whether the work has already finished
    pub fn is_finished(&self) -> bool {
        self.inner.peek().is_some()
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct Inner {
    permits: Option<Arc<Semaphore>>,
    pending: watch::Sender<usize>,
    launched: AtomicU64,
    max_parallel: usize,
}

/// Launches work with an optional concurrency ceiling.
///
/// Cheap to clone; clones share the same permit pool and pending count, which
/// is how running work launches follow-up work into the same run.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Executor {
    /// Create an executor running at most `max_parallel` units at once.
    /// Zero means unbounded.
    pub fn new(max_parallel: usize) -> Self {
        let permits = (max_parallel > 0).then(|| Arc::new(Semaphore::new(max_parallel)));
        let (pending, _) = watch::channel(0usize);
        tracing::trace!("Created executor with max parallelism of {}", max_parallel);
        Self {
            inner: Arc::new(Inner {
                permits,
                pending,
                launched: AtomicU64::new(0),
                max_parallel,
            }),
        }
    }

    /// An executor with no concurrency ceiling
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Ceiling this executor was built with, zero when unbounded
    pub fn max_parallel(&self) -> usize {
        self.inner.max_parallel
    }

    /// Number of launched units that have not finished yet
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Launch `work`. When the executor is bounded the work first waits for a
    /// permit; if `cancel` fires during that wait the work is dropped without
    /// running and the returned [`Completion`] still resolves.
    pub fn launch<F>(&self, cancel: &CancellationToken, work: F) -> Completion
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.launched.fetch_add(1, Ordering::Relaxed);

        // Counted before spawning so a parent that launches children can
        // never let the count touch zero in between.
        self.inner.pending.send_modify(|pending| *pending += 1);

        let finish = Finish {
            inner: Arc::clone(&self.inner),
            done: Some(tx),
        };
        let permits = self.inner.permits.clone();
        let cancel = cancel.clone();
        let queued_at = Instant::now();
        tracing::trace!("Executor queued task #{}", id);

        tokio::spawn(async move {
            let _permit = match permits {
                Some(permits) => {
                    let acquired = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = permits.acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = acquired else {
                        tracing::trace!("Executor dropped task #{} before it ran", id);
                        // Work goes first so nothing it owns outlives the signal
                        drop(work);
                        drop(finish);
                        return;
                    };
                    Some(permit)
                }
                None => None,
            };

            let running_at = Instant::now();
            tracing::trace!(
                "Executor running task #{} (waited {:?} in queue)",
                id,
                running_at - queued_at
            );

            work.await;

            tracing::trace!(
                "Executor finished task #{} (executed in {:?})",
                id,
                running_at.elapsed()
            );
            drop(finish);
        });

        Completion::new(rx)
    }

    /// Resolves once no launched work is outstanding. Resolves immediately
    /// when nothing was ever launched.
    pub fn done(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut pending = self.inner.pending.subscribe();
        async move {
            // The sender lives as long as any executor clone; losing it means
            // nothing can be outstanding anymore.
            let _ = pending.wait_for(|count| *count == 0).await;
        }
    }

    /// Wait for all launched work, or for `cancel`, whichever comes first
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = self.done() => Ok(()),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("max_parallel", &self.inner.max_parallel)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Signals a unit's completion and releases its pending slot on drop, which
/// also covers the panic path.
struct Finish {
    inner: Arc<Inner>,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for Finish {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        self.inner.pending.send_modify(|pending| *pending -= 1);
    }
}
