//! Emulated stream connections and their lifecycle tracking.
//!
//! # Responsibilities
//! - Wrap one pipe half with local/remote addresses and deadlines
//! - Generate unique pair IDs for tracing and tracking
//! - Run the owner's teardown hook when either side closes
//! - Expose tokio `AsyncRead`/`AsyncWrite` so protocol stacks run unmodified

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

use crate::lifecycle::{Scope, ScopeError};
use crate::net::addr::Addr;
use crate::net::error::{NetError, NetResult};
use crate::net::pipe::{duplex, Pipe, ReadOutcome};
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier shared by both sides of a connection pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next process-wide ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side of the pair a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Returned by dial.
    Client,
    /// Returned by accept.
    Server,
}

/// Hook run on every close, keyed by pair.
pub(crate) type Teardown = Arc<dyn Fn(ConnectionId) + Send + Sync>;

#[derive(Debug, Default, Clone, Copy)]
struct Deadlines {
    read: Option<Instant>,
    write: Option<Instant>,
}

struct Shared {
    id: ConnectionId,
    role: Role,
    local: Addr,
    remote: Addr,
    bg: Scope,
    pipe: Pipe,
    deadlines: Mutex<Deadlines>,
    teardown: Teardown,
}

impl Shared {
    async fn read(&self, buf: &mut [u8]) -> NetResult<ReadOutcome> {
        let deadline = self.deadlines.lock().read;
        let result = match deadline {
            Some(deadline) => {
                let ctx = self.bg.with_deadline(deadline);
                self.pipe.read_with(&ctx, buf).await
            }
            None => self.pipe.read(buf).await,
        };
        self.torn_down(result)
    }

    async fn write(&self, buf: &[u8]) -> NetResult<usize> {
        let deadline = self.deadlines.lock().write;
        let result = match deadline {
            Some(deadline) => {
                let ctx = self.bg.with_deadline(deadline);
                self.pipe.write_with(&ctx, buf).await
            }
            None => self.pipe.write(buf).await,
        };
        self.torn_down(result)
    }

    /// A cancelled background scope means the owning listener is gone.
    fn torn_down<T>(&self, result: NetResult<T>) -> NetResult<T> {
        match result {
            Err(NetError::Cancelled) if self.bg.err() == Some(ScopeError::Cancelled) => {
                Err(NetError::ListenerClosing)
            }
            other => other,
        }
    }

    fn close(&self) {
        (self.teardown)(self.id);
        if self.pipe.close() {
            tracing::trace!(connection_id = %self.id, role = ?self.role, "Connection closed");
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Per-handle state for the poll-based I/O traits.
#[derive(Default)]
struct PollState {
    read: Option<BoxFuture<NetResult<(Bytes, bool)>>>,
    /// A payload already reported as written, not yet taken by the peer.
    in_flight: Option<BoxFuture<NetResult<usize>>>,
    /// Failure of an in-flight payload, reported by the next write or flush.
    failed: Option<NetError>,
    /// Bytes read by the last future that did not fit the caller's buffer.
    leftover: Bytes,
    eof: bool,
}

impl PollState {
    /// Drive the in-flight payload without reporting its outcome.
    fn drive_in_flight(&mut self, cx: &mut Context<'_>) {
        if let Some(write) = self.in_flight.as_mut() {
            if let Poll::Ready(result) = write.as_mut().poll(cx) {
                self.in_flight = None;
                if let Err(err) = result {
                    self.failed = Some(err);
                }
            }
        }
    }

    /// Wait until the in-flight payload has been taken by the peer.
    fn poll_in_flight(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.drive_in_flight(cx);
        if self.in_flight.is_some() {
            return Poll::Pending;
        }
        match self.failed.take() {
            Some(err) => Poll::Ready(Err(err.into())),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// One side of an emulated stream connection.
///
/// Clones share the underlying stream, so one clone can read while another
/// writes. Poll-based I/O state is per handle.
pub struct Connection {
    shared: Arc<Shared>,
    /// Only reached through `&mut self`; the lock keeps `Connection: Sync`.
    poll: Mutex<PollState>,
}

impl Connection {
    /// Build a connected client/server pair backed by a fresh duplex pipe.
    pub(crate) fn pair(
        bg: &Scope,
        server_addr: Addr,
        client_addr: Addr,
        teardown: Teardown,
    ) -> (Connection, Connection) {
        let id = ConnectionId::new();
        let (client_pipe, server_pipe) = duplex(bg);

        let client = Shared {
            id,
            role: Role::Client,
            local: client_addr.clone(),
            remote: server_addr.clone(),
            bg: bg.clone(),
            pipe: client_pipe,
            deadlines: Mutex::new(Deadlines::default()),
            teardown: teardown.clone(),
        };
        let server = Shared {
            id,
            role: Role::Server,
            local: server_addr,
            remote: client_addr,
            bg: bg.clone(),
            pipe: server_pipe,
            deadlines: Mutex::new(Deadlines::default()),
            teardown,
        };
        (Connection::from_shared(client), Connection::from_shared(server))
    }

    fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
            poll: Mutex::new(PollState::default()),
        }
    }

    /// ID shared with the peer side.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Whether this side was dialed or accepted.
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Address of this side.
    pub fn local_addr(&self) -> &Addr {
        &self.shared.local
    }

    /// Address of the peer side.
    pub fn remote_addr(&self) -> &Addr {
        &self.shared.remote
    }

    /// Read into `buf`, honouring the read deadline current at call time.
    pub async fn read(&self, buf: &mut [u8]) -> NetResult<ReadOutcome> {
        self.shared.read(buf).await
    }

    /// Write `buf`, honouring the write deadline current at call time.
    pub async fn write(&self, buf: &[u8]) -> NetResult<usize> {
        self.shared.write(buf).await
    }

    /// Close this side's write direction and release it from its listener.
    ///
    /// Safe to call any number of times from either side. The peer keeps
    /// reading buffered bytes, then observes end-of-stream.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Bound future reads; `None` clears the bound.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.shared.deadlines.lock().read = deadline;
    }

    /// Bound future writes; `None` clears the bound.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.shared.deadlines.lock().write = deadline;
    }

    /// Set both deadlines at once.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        let mut deadlines = self.shared.deadlines.lock();
        deadlines.read = deadline;
        deadlines.write = deadline;
    }

    /// Current read deadline.
    pub fn read_deadline(&self) -> Option<Instant> {
        self.shared.deadlines.lock().read
    }

    /// Current write deadline.
    pub fn write_deadline(&self) -> Option<Instant> {
        self.shared.deadlines.lock().write
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            poll: Mutex::new(PollState::default()),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("local", &self.shared.local)
            .field("remote", &self.shared.remote)
            .finish_non_exhaustive()
    }
}

async fn read_owned(shared: Arc<Shared>, len: usize) -> NetResult<(Bytes, bool)> {
    let mut chunk = vec![0u8; len];
    let outcome = shared.read(&mut chunk).await?;
    chunk.truncate(outcome.n);
    Ok((Bytes::from(chunk), outcome.eof))
}

async fn write_owned(shared: Arc<Shared>, payload: Bytes) -> NetResult<usize> {
    shared.write(&payload).await
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = this.poll.get_mut();
        poll.drive_in_flight(cx);

        if !poll.leftover.is_empty() {
            let n = poll.leftover.len().min(buf.remaining());
            buf.put_slice(&poll.leftover.split_to(n));
            return Poll::Ready(Ok(()));
        }
        // an untouched buffer signals end-of-stream
        if poll.eof || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let shared = Arc::clone(&this.shared);
        let len = buf.remaining();
        let read = poll
            .read
            .get_or_insert_with(|| Box::pin(read_owned(shared, len)));
        let result = ready!(read.as_mut().poll(cx));
        poll.read = None;

        let (mut chunk, eof) = result?;
        poll.eof = eof;
        let n = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk.split_to(n));
        poll.leftover = chunk;
        Poll::Ready(Ok(()))
    }
}

/// Writes behave like a socket with room for one payload: `poll_write`
/// succeeds once the payload is offered to the peer, and the next write,
/// flush or shutdown waits until the peer has taken it.
impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = this.poll.get_mut();
        ready!(poll.poll_in_flight(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let shared = Arc::clone(&this.shared);
        let mut write: BoxFuture<NetResult<usize>> =
            Box::pin(write_owned(shared, Bytes::copy_from_slice(buf)));
        match write.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready(result.map_err(io::Error::from)),
            Poll::Pending => {
                poll.in_flight = Some(write);
                Poll::Ready(Ok(buf.len()))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().poll.get_mut().poll_in_flight(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let flushed = ready!(this.poll.get_mut().poll_in_flight(cx));
        this.close();
        Poll::Ready(flushed)
    }
}

/// Tracks live connection pairs so their owner can tear them down in bulk.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    pairs: Mutex<HashMap<ConnectionId, [Connection; 2]>>,
}

impl ConnectionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a client/server pair.
    pub fn track(&self, client: &Connection, server: &Connection) {
        debug_assert_eq!(client.id(), server.id());
        self.pairs
            .lock()
            .insert(client.id(), [client.clone(), server.clone()]);
        metrics::record_connection_opened();
    }

    /// Stop tracking a pair. Returns `true` if it was tracked.
    pub fn untrack(&self, id: ConnectionId) -> bool {
        let removed = self.pairs.lock().remove(&id).is_some();
        if removed {
            metrics::record_connection_closed();
        }
        removed
    }

    /// Remove and return every tracked connection.
    pub fn drain(&self) -> Vec<Connection> {
        let pairs = std::mem::take(&mut *self.pairs.lock());
        for _ in 0..pairs.len() {
            metrics::record_connection_closed();
        }
        pairs.into_values().flatten().collect()
    }

    /// Number of tracked connections (two per pair).
    pub fn active_count(&self) -> usize {
        self.pairs.lock().len() * 2
    }
}
