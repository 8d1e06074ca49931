//! Error taxonomy for emulated network operations.
//!
//! End-of-stream is not an error: it is reported through
//! [`ReadOutcome::eof`](crate::net::ReadOutcome).

use std::io;

use crate::lifecycle::ScopeError;

pub type NetResult<T> = Result<T, NetError>;

/// Errors surfaced by pipes, connections, listeners and the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// The listener has been or is being closed.
    #[error("fakenet: listener is closing")]
    ListenerClosing,

    /// The write direction of this pipe half has been closed.
    #[error("fakenet: pipe is closed")]
    PipeClosed,

    /// The governing scope was cancelled.
    #[error("fakenet: operation cancelled")]
    Cancelled,

    /// A per-call deadline elapsed.
    #[error("fakenet: deadline exceeded")]
    DeadlineExceeded,

    /// Dial target is not registered on the network.
    #[error("fakenet: host {0:?} doesn't exist")]
    UnknownHost(String),
}

impl NetError {
    /// True when a deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::DeadlineExceeded)
    }

    /// True for errors caused by a close on this or the owning side.
    pub fn is_closed(&self) -> bool {
        matches!(self, NetError::ListenerClosing | NetError::PipeClosed)
    }
}

impl From<ScopeError> for NetError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Cancelled => NetError::Cancelled,
            ScopeError::DeadlineExceeded => NetError::DeadlineExceeded,
        }
    }
}

impl From<NetError> for io::Error {
    fn from(err: NetError) -> Self {
        let kind = match &err {
            NetError::ListenerClosing => io::ErrorKind::NotConnected,
            NetError::PipeClosed => io::ErrorKind::BrokenPipe,
            NetError::Cancelled => io::ErrorKind::ConnectionAborted,
            NetError::DeadlineExceeded => io::ErrorKind::TimedOut,
            NetError::UnknownHost(_) => io::ErrorKind::NotFound,
        };
        io::Error::new(kind, err)
    }
}
