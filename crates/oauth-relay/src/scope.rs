//! Caller-imposed deadlines and cancellation.
//!
//! The bridge sets no timeouts of its own. A caller that wants one attaches
//! a [`CallerContext`] to the request extensions; every call the bridge
//! makes to a provider then runs under [`guarded`]. An abandoned call is
//! not compensated: whatever the provider did before the deadline stands.

use std::future::{Future, pending};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::AuthResult;
use crate::error::AuthError;

/// Deadline and cancellation signal for one request.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl CallerContext {
    /// Creates a context with no deadline and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now. A timeout too large to
    /// represent leaves the context without a deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Cancels guarded calls once the channel holds `true`.
    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if cancellation has been signalled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns `true` if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|at| at <= Instant::now())
    }
}

/// Runs `fut` under the caller's deadline and cancellation signal.
///
/// Without a context the future simply runs to completion.
///
/// # Errors
///
/// [`AuthError::Canceled`] or [`AuthError::Timeout`] if the call is cut
/// short, otherwise the future's own result.
pub async fn guarded<F, T>(ctx: Option<&CallerContext>, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    let Some(ctx) = ctx else {
        return fut.await;
    };

    if ctx.is_canceled() {
        return Err(AuthError::Canceled);
    }
    if ctx.is_expired() {
        return Err(AuthError::Timeout);
    }

    let mut cancel = ctx.cancel.clone();
    tokio::select! {
        biased;

        () = canceled(cancel.as_mut()) => Err(AuthError::Canceled),
        () = expired(ctx.deadline) => Err(AuthError::Timeout),
        result = fut => result,
    }
}

async fn canceled(rx: Option<&mut watch::Receiver<bool>>) {
    if let Some(rx) = rx {
        let closed = rx.wait_for(|canceled| *canceled).await.is_err();
        if !closed {
            return;
        }
    }
    // No signal, or the sender went away without cancelling.
    pending::<()>().await;
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending::<()>().await,
    }
}
