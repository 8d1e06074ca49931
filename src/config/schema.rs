//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.
//! Every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for an emulated network.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct NetConfig {
    /// Address generation settings.
    pub address: AddressConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Generated address shape: `<host_len random letters>:<port>`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AddressConfig {
    /// Length of the random host part.
    pub host_len: usize,

    /// Port suffix appended to every generated host.
    pub port: u16,

    /// Value reported as the address' network name.
    pub network_name: String,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            host_len: 64,
            port: 80,
            network_name: "fakenetwork".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
