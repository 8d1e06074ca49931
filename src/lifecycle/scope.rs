//! Cancellation scopes.
//!
//! # Responsibilities
//! - Model the parent/child cancellation tree every blocking operation takes
//! - Bound a scope by a deadline (a child never outlives its parent's deadline)
//! - Report the terminal error once a scope is done
//!
//! # Design Decisions
//! - Built on `tokio_util::sync::CancellationToken`; deadlines are checked
//!   against tokio's clock so paused-time tests drive them
//! - No watcher task per scope: waiters race `done()` against their own work

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope or one of its ancestors was cancelled explicitly.
    #[error("scope cancelled")]
    Cancelled,
    /// The scope's deadline elapsed.
    #[error("scope deadline exceeded")]
    DeadlineExceeded,
}

/// A node in the cancellation tree.
///
/// Cloning a scope yields another handle to the same node; use [`Scope::child`]
/// to derive a node that can be cancelled independently.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// Create a root scope with no deadline.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child cancelled together with this scope.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child that also expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::trace!("scope cancelled");
        }
        self.token.cancel();
    }

    /// The instant this scope expires, if bounded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The terminal error, if the scope is done.
    ///
    /// An elapsed deadline wins over cancellation.
    pub fn err(&self) -> Option<ScopeError> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(ScopeError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ScopeError::Cancelled);
        }
        None
    }

    /// Whether the scope is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the scope is done and return why.
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => ScopeError::DeadlineExceeded,
                _ = self.token.cancelled() => ScopeError::Cancelled,
            },
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// First error among `scopes`, checked in order.
pub fn first_err(scopes: &[&Scope]) -> Option<ScopeError> {
    scopes.iter().find_map(|scope| scope.err())
}

/// Wait until any of `scopes` is done. Pends forever on an empty slice.
pub async fn first_done(scopes: &[&Scope]) -> ScopeError {
    let mut waits: Vec<Pin<Box<dyn Future<Output = ScopeError> + Send + '_>>> = scopes
        .iter()
        .map(|scope| Box::pin(scope.done()) as Pin<Box<dyn Future<Output = ScopeError> + Send + '_>>)
        .collect();

    std::future::poll_fn(|cx| {
        for wait in waits.iter_mut() {
            if let Poll::Ready(err) = wait.as_mut().poll(cx) {
                return Poll::Ready(err);
            }
        }
        Poll::Pending
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent_cancellation() {
        let parent = Scope::new();
        let child = parent.child();
        assert_eq!(child.err(), None);

        parent.cancel();
        assert_eq!(child.err(), Some(ScopeError::Cancelled));
    }

    #[test]
    fn cancelling_child_leaves_parent_alive() {
        let parent = Scope::new();
        let child = parent.child();
        child.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let scope = Scope::new().with_timeout(Duration::from_millis(50));
        assert_eq!(scope.err(), None);
        assert_eq!(scope.done().await, ScopeError::DeadlineExceeded);
        assert_eq!(scope.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earlier_parent_deadline() {
        let parent = Scope::new().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.done().await, ScopeError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn first_done_reports_the_scope_that_fired() {
        let idle = Scope::new();
        let cancelled = Scope::new();
        cancelled.cancel();

        assert_eq!(first_done(&[&idle, &cancelled]).await, ScopeError::Cancelled);
        assert_eq!(first_err(&[&idle, &cancelled]), Some(ScopeError::Cancelled));
        assert_eq!(first_err(&[&idle]), None);
    }
}
