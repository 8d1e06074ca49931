//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NetConfig (validated, immutable)
//!     → handed to Network::with_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a network is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AddressConfig, NetConfig, ObservabilityConfig};
pub use validation::ValidationError;
