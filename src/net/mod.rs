//! Emulated network subsystem.
//!
//! # Data Flow
//! ```text
//! Network::listen
//!     → network.rs (unique address, registry entry)
//!     → listener.rs (accept manufactures a connection pair)
//!     → handoff.rs (rendezvous: client side to exactly one dialer)
//!     → connection.rs (addresses, deadlines, teardown hook)
//!     → pipe.rs (duplex byte stream between the two sides)
//!
//! Listener States:
//!     Open → Closed (explicit close, drop, or scope cancellation)
//! ```
//!
//! # Design Decisions
//! - Every blocking operation takes a [`Scope`](crate::lifecycle::Scope)
//!   and races it directly; no watcher tasks are spawned
//! - End-of-stream is a read outcome, never an error
//! - Closing a listener closes every connection it accepted

pub mod addr;
pub mod connection;
pub mod error;
mod handoff;
pub mod listener;
pub mod network;
pub mod pipe;

pub use addr::Addr;
pub use connection::{Connection, ConnectionId, Role};
pub use error::{NetError, NetResult};
pub use listener::Listener;
pub use network::{listener, Dialer, Network};
pub use pipe::{duplex, Pipe, ReadOutcome};
