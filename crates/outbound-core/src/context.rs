//! Caller deadline and cancellation.
//!
//! A [`CallContext`] travels with every outbound request. It carries an
//! optional deadline and a cancellation token; each suspension point in the
//! stack (transport I/O, backoff sleeps, body reads) races its work against
//! [`CallContext::done`] so that a caller who gives up is never kept waiting.
//!
//! Deadlines only ever shrink: [`CallContext::child_with_timeout`] keeps the
//! parent's deadline when it is earlier than the requested one.
//!
//! ```rust
//! use outbound_core::{CallContext, CancelReason};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let ctx = CallContext::with_timeout(Duration::from_millis(10));
//! let outcome = ctx.run(tokio::time::sleep(Duration::from_secs(1))).await;
//! assert_eq!(outcome, Err(CancelReason::DeadlineExceeded));
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call stopped before the dependency produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelReason {
    /// The caller cancelled the call explicitly.
    #[error("cancelled by caller")]
    Cancelled,
    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancellation signal inherited from the caller.
///
/// Cloning is cheap and clones share the same cancellation token, so
/// cancelling any clone cancels them all. Use [`CallContext::child`] to
/// derive a context that can be cancelled independently of its parent.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    /// A context with no deadline that is only done when cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Derives a context that is cancelled with its parent but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// Derives a child context whose deadline is the earlier of the parent's
    /// deadline and `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < requested => parent,
            _ => requested,
        };
        Self {
            deadline: Some(deadline),
            token: self.token.child_token(),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the reason this context is done, or `Ok(())` if the caller is
    /// still waiting. Cancellation wins over an expired deadline.
    pub fn check(&self) -> Result<(), CancelReason> {
        if self.token.is_cancelled() {
            return Err(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CancelReason::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Returns `true` once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Drives `fut` to completion unless the context finishes first, in which
    /// case `fut` is dropped and the reason is returned.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, CancelReason>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

/// Requests that carry the caller's [`CallContext`].
///
/// The retry layer reads the context before every attempt and while sleeping
/// between attempts.
pub trait HasCallContext {
    /// The context of the call this request belongs to.
    fn call_context(&self) -> &CallContext;
}

impl HasCallContext for CallContext {
    fn call_context(&self) -> &CallContext {
        self
    }
}
