//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Scope::new (root)
//!     → child / with_deadline / with_timeout
//!     → handed to listen, dial, duplex and every blocking call
//!     → cancel or deadline → waiters unblock with ScopeError
//! ```
//!
//! # Design Decisions
//! - Cancellation flows parent to child only
//! - A child deadline is clamped to its parent's

pub mod scope;

pub use scope::{Scope, ScopeError};
