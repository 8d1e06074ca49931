//! Duplex byte pipe.
//!
//! # Responsibilities
//! - Wire two halves so bytes written on one are read on the other
//! - Copy payloads on write so callers may reuse their buffers immediately
//! - Carry over the tail of a payload that did not fit the reader's buffer
//! - Report end-of-stream on the read that drains the last buffered byte
//!
//! # Design Decisions
//! - Each direction is a zero-capacity [`Handoff`]: a write completes only once
//!   the peer has taken the payload
//! - Writers and readers of one half take separate locks
//! - Every blocking step races the background scope and the call scope

use bytes::Bytes;

use crate::lifecycle::scope::{first_done, first_err};
use crate::lifecycle::Scope;
use crate::net::error::{NetError, NetResult};
use crate::net::handoff::{Handoff, Refused};
use crate::observability::metrics;
use std::sync::Arc;

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    /// Bytes copied into the caller's buffer.
    pub n: usize,
    /// No further bytes will arrive on this direction.
    pub eof: bool,
}

impl ReadOutcome {
    fn end() -> Self {
        Self { n: 0, eof: true }
    }
}

/// One endpoint's view of a duplex pipe.
#[derive(Debug)]
pub struct Pipe {
    bg: Scope,
    outbound: Arc<Handoff<Bytes>>,
    inbound: Arc<Handoff<Bytes>>,
    carry: tokio::sync::Mutex<Bytes>,
}

/// Create a connected pair of pipe halves governed by `scope`.
pub fn duplex(scope: &Scope) -> (Pipe, Pipe) {
    let forward = Arc::new(Handoff::new());
    let backward = Arc::new(Handoff::new());
    let a = Pipe::new(scope, forward.clone(), backward.clone());
    let b = Pipe::new(scope, backward, forward);
    (a, b)
}

impl Pipe {
    fn new(scope: &Scope, outbound: Arc<Handoff<Bytes>>, inbound: Arc<Handoff<Bytes>>) -> Self {
        Self {
            bg: scope.clone(),
            outbound,
            inbound,
            carry: tokio::sync::Mutex::new(Bytes::new()),
        }
    }

    /// Write under the background scope only.
    pub async fn write(&self, buf: &[u8]) -> NetResult<usize> {
        self.write_with(&self.bg, buf).await
    }

    /// Read under the background scope only.
    pub async fn read(&self, buf: &mut [u8]) -> NetResult<ReadOutcome> {
        self.read_with(&self.bg, buf).await
    }

    /// Hand `buf` to the peer, waiting until it is taken or `ctx` fires.
    ///
    /// On error nothing was transferred.
    pub async fn write_with(&self, ctx: &Scope, buf: &[u8]) -> NetResult<usize> {
        let scopes = [&self.bg, ctx];
        if let Some(err) = first_err(&scopes) {
            return Err(err.into());
        }
        if self.outbound.is_closed() {
            return Err(NetError::PipeClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let payload = Bytes::copy_from_slice(buf);
        match self.outbound.offer(payload, &scopes).await {
            Ok(()) => {
                metrics::record_bytes(buf.len());
                Ok(buf.len())
            }
            Err(Refused::Closed(_)) => Err(NetError::PipeClosed),
            Err(Refused::Cancelled(err, _)) => Err(err.into()),
        }
    }

    /// Read into `buf`, waiting for the peer or for `ctx` to fire.
    pub async fn read_with(&self, ctx: &Scope, buf: &mut [u8]) -> NetResult<ReadOutcome> {
        let scopes = [&self.bg, ctx];
        let mut carry = tokio::select! {
            biased;
            err = first_done(&scopes) => return Err(err.into()),
            carry = self.carry.lock() => carry,
        };
        if let Some(err) = first_err(&scopes) {
            return Err(err.into());
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::default());
        }

        if carry.is_empty() {
            match self.inbound.take(&scopes).await? {
                Some(payload) => *carry = payload,
                None => return Ok(ReadOutcome::end()),
            }
        }

        let n = carry.len().min(buf.len());
        buf[..n].copy_from_slice(&carry.split_to(n));
        let eof = carry.is_empty() && self.inbound.is_drained();
        Ok(ReadOutcome { n, eof })
    }

    /// Close the write direction. Only the first call has an effect.
    ///
    /// Returns `true` for the call that closed it.
    pub fn close(&self) -> bool {
        self.outbound.close()
    }

    /// Whether this half's write direction is closed.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
