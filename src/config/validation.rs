//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (host length, port)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NetConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::NetConfig;

/// Shortest host part that still makes collisions negligible.
pub const MIN_HOST_LEN: usize = 8;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("address.host_len must be at least {min}, got {actual}")]
    HostTooShort { min: usize, actual: usize },

    #[error("address.port must be non-zero")]
    ZeroPort,

    #[error("address.network_name must not be empty")]
    EmptyNetworkName,

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &NetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.address.host_len < MIN_HOST_LEN {
        errors.push(ValidationError::HostTooShort {
            min: MIN_HOST_LEN,
            actual: config.address.host_len,
        });
    }
    if config.address.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.address.network_name.trim().is_empty() {
        errors.push(ValidationError::EmptyNetworkName);
    }
    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
