//! Borrow context: routing key, deadline and cancellation.
//!
//! # Responsibilities
//! - Carry the routing key that selects a per-target pool
//! - Bound how long a borrow may wait (deadline)
//! - Allow the caller to abort a blocked borrow (cancel signal)
//!
//! # Design Decisions
//! - Cheap to clone; the factory receives its own copy
//! - Cancellation is a `watch` channel so any number of waiters observe it
//! - A derived context listens to its own signal and every ancestor's
//! - `done()` is a plain future, so waiting on it never spawns a task

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::PoolError;

/// Key used when the caller never attached one.
pub const DEFAULT_KEY: &str = "default";

/// Context handed to `ResourcePool::get` and to object factories.
#[derive(Debug, Clone, Default)]
pub struct Context {
    key: Option<Arc<str>>,
    deadline: Option<Instant>,
    /// Ancestors' signals first, this context's own last.
    cancel: Vec<watch::Receiver<bool>>,
}

/// Cancels every context derived from `Context::with_cancel`.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context with no key, no deadline and no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// Attach the routing key.
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The routing key, or `DEFAULT_KEY` when none was attached.
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_KEY)
    }

    /// Limit the context to `timeout` from now. An earlier deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Limit the context to `deadline`. An earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Derive a cancellable context.
    ///
    /// The new handle cancels only the derived context; canceling a parent
    /// still ends it.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel.push(rx);
        (self, CancelHandle { tx })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn is_canceled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// Non-blocking check: the reason this context ended, if it has.
    pub fn err(&self) -> Option<PoolError> {
        if self.is_canceled() {
            return Some(PoolError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(PoolError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes.
    /// Never resolves for a background context.
    pub async fn done(&self) -> PoolError {
        let canceled = async {
            if self.cancel.is_empty() {
                return future::pending::<()>().await;
            }
            let signals = self.cancel.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    // The sender went away without canceling: never fires.
                    if rx.wait_for(|canceled| *canceled).await.is_err() {
                        future::pending::<()>().await;
                    }
                })
            });
            select_all(signals).await;
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = canceled => PoolError::Canceled,
            _ = expired => PoolError::DeadlineExceeded,
        }
    }
}
