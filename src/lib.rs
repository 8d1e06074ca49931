//! In-memory network emulator.
//!
//! Listeners, dialers and stream connections that never touch the OS
//! network stack. Connections implement tokio's `AsyncRead`/`AsyncWrite`, so
//! protocol stacks such as hyper run over them unmodified.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::NetConfig;
pub use lifecycle::{Scope, ScopeError};
pub use net::{
    duplex, listener, Addr, Connection, ConnectionId, Dialer, Listener, NetError, NetResult,
    Network, Pipe, ReadOutcome, Role,
};
