//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipes, connections, listeners, network:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges via the metrics facade)
//! ```

pub mod logging;
pub mod metrics;
