//! Per-operation deadline and cancellation.
//!
//! Every store operation takes an [`OpContext`]. Running an operation through
//! [`OpContext::run`] races it against the deadline and the cancellation
//! token; when either wins, the operation future is dropped. Dropping an
//! in-flight database transaction rolls it back, so a canceled operation
//! leaves no partial state behind.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};

/// Caller-supplied deadline and cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OpContext {
    /// A context with no deadline that is never canceled unless the token is.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every operation running under this context (and its clones).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail fast if the context is already canceled or past its deadline.
    pub fn check(&self, operation: &str) -> StoreResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StoreError::DeadlineExceeded {
                    operation: operation.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run `fut` under this context.
    ///
    /// Returns `Canceled` or `DeadlineExceeded` if the context ends first; in
    /// that case `fut` is dropped without being polled again.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check(operation)?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| StoreError::DeadlineExceeded {
                        operation: operation.to_string(),
                    })?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Canceled),
            result = bounded => result,
        }
    }
}
