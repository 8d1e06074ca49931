//! Emulated endpoint addresses.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::config::AddressConfig;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Opaque `host:port` token identifying one endpoint on an emulated network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Addr {
    network: Arc<str>,
    addr: Arc<str>,
}

impl Addr {
    /// Wrap an existing address string.
    pub fn new(network: impl Into<Arc<str>>, addr: impl Into<Arc<str>>) -> Self {
        Self {
            network: network.into(),
            addr: addr.into(),
        }
    }

    /// Generate a fresh random address shaped by `config`.
    pub fn generate(config: &AddressConfig) -> Self {
        let host = random_host(config.host_len);
        Self::new(
            config.network_name.as_str(),
            format!("{}:{}", host, config.port),
        )
    }

    /// Name of the network this address belongs to.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The `host:port` text dialers use.
    pub fn as_str(&self) -> &str {
        &self.addr
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

fn random_host(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_shape_follows_config() {
        let config = AddressConfig::default();
        let addr = Addr::generate(&config);

        let (host, port) = addr.as_str().rsplit_once(':').unwrap();
        assert_eq!(host.len(), 64);
        assert!(host.bytes().all(|b| b.is_ascii_lowercase()));
        assert_eq!(port, "80");
        assert_eq!(addr.network(), "fakenetwork");
        assert_eq!(addr.to_string(), addr.as_str());
    }

    #[test]
    fn generated_addresses_differ() {
        let config = AddressConfig::default();
        assert_ne!(Addr::generate(&config), Addr::generate(&config));
    }
}
