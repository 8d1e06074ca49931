//! Emulated network registry.
//!
//! # Responsibilities
//! - Hand out fresh unique addresses to listeners
//! - Route dials to the listener registered at an address
//! - Forget listeners once they close
//!
//! # Design Decisions
//! - The registry is an owned, cloneable handle; independent networks never
//!   see each other's listeners
//! - Listeners hold only a weak reference back, so dropping every `Network`
//!   handle does not keep closed listeners alive

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::NetConfig;
use crate::lifecycle::Scope;
use crate::net::addr::Addr;
use crate::net::connection::Connection;
use crate::net::error::{NetError, NetResult};
use crate::net::listener::{Listener, ListenerShared};
use crate::observability::metrics;

#[derive(Debug)]
pub(crate) struct Registry {
    config: NetConfig,
    listeners: DashMap<String, Arc<ListenerShared>>,
}

impl Registry {
    pub(crate) fn unregister(&self, addr: &Addr) {
        self.listeners.remove(addr.as_str());
    }

    /// Resolve `addr` to a live listener, pruning one whose scope is done.
    fn lookup(&self, addr: &str) -> Option<Arc<ListenerShared>> {
        let listener = self.listeners.get(addr).map(|entry| entry.value().clone())?;
        if listener.is_done() {
            tracing::debug!(address = addr, "Pruning listener with a finished scope");
            listener.close();
            return None;
        }
        Some(listener)
    }
}

/// An in-memory network of listeners addressable by dialers.
#[derive(Debug, Clone)]
pub struct Network {
    registry: Arc<Registry>,
}

impl Network {
    /// Create an empty network with default address settings.
    pub fn new() -> Self {
        Self::with_config(NetConfig::default())
    }

    /// Create an empty network shaped by `config`.
    pub fn with_config(config: NetConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                config,
                listeners: DashMap::new(),
            }),
        }
    }

    /// Settings this network was built with.
    pub fn config(&self) -> &NetConfig {
        &self.registry.config
    }

    /// Open a listener at a fresh address.
    ///
    /// The listener lives until it is closed or dropped, or until `scope` is
    /// cancelled.
    pub fn listen(&self, scope: &Scope) -> Listener {
        let address_config = &self.registry.config.address;
        loop {
            let addr = Addr::generate(address_config);
            match self.registry.listeners.entry(addr.as_str().to_string()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    tracing::debug!(address = %addr, network = addr.network(), "Listener opened");
                    let shared = Arc::new(ListenerShared::new(
                        addr,
                        scope.child(),
                        address_config.clone(),
                        Arc::downgrade(&self.registry),
                    ));
                    slot.insert(shared.clone());
                    return Listener::new(shared);
                }
            }
        }
    }

    /// Connect to the listener at `addr`.
    ///
    /// Fails immediately with [`NetError::UnknownHost`] if nothing listens
    /// there. Otherwise waits until the listener accepts, `scope` is done,
    /// or the listener closes.
    pub async fn dial(&self, scope: &Scope, addr: &str) -> NetResult<Connection> {
        let Some(listener) = self.registry.lookup(addr) else {
            tracing::debug!(address = addr, "Dial to unknown host");
            metrics::record_dial_failure("unknown_host");
            return Err(NetError::UnknownHost(addr.to_string()));
        };
        if let Some(err) = scope.err() {
            metrics::record_dial_failure("cancelled");
            return Err(err.into());
        }

        match listener.connect(scope).await {
            Ok(conn) => {
                tracing::debug!(address = addr, connection_id = %conn.id(), "Dial connected");
                Ok(conn)
            }
            Err(err) => {
                let reason = match err {
                    NetError::ListenerClosing => "listener_closing",
                    _ => "cancelled",
                };
                tracing::debug!(address = addr, error = %err, "Dial failed");
                metrics::record_dial_failure(reason);
                Err(err)
            }
        }
    }

    /// Listeners currently registered, including any not yet pruned.
    pub fn listener_count(&self) -> usize {
        self.registry.listeners.len()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

/// Dials the one listener it was created with.
#[derive(Debug, Clone)]
pub struct Dialer {
    network: Network,
    addr: Addr,
    scope: Scope,
}

impl Dialer {
    /// Address of the listener this dialer targets.
    pub fn addr(&self) -> &Addr {
        &self.addr
    }

    /// Connect to the listener under the scope the dialer was created with.
    pub async fn dial(&self) -> NetResult<Connection> {
        self.network.dial(&self.scope, self.addr.as_str()).await
    }
}

/// A listener on a private network plus a dialer wired to it.
pub fn listener(scope: &Scope) -> (Listener, Dialer) {
    let network = Network::new();
    let listener = network.listen(scope);
    let dialer = Dialer {
        addr: listener.addr().clone(),
        scope: scope.clone(),
        network,
    };
    (listener, dialer)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::AddressConfig;

    #[test]
    fn listen_registers_unique_addresses() {
        let network = Network::new();
        let scope = Scope::new();

        let a = network.listen(&scope);
        let b = network.listen(&scope);
        assert_ne!(a.addr(), b.addr());
        assert_eq!(network.listener_count(), 2);

        a.close();
        assert_eq!(network.listener_count(), 1);
        drop(b);
        assert_eq!(network.listener_count(), 0);
    }

    #[test]
    fn config_shapes_addresses() {
        let network = Network::with_config(NetConfig {
            address: AddressConfig {
                host_len: 12,
                port: 8080,
                network_name: "testnet".to_string(),
            },
            ..NetConfig::default()
        });
        let listener = network.listen(&Scope::new());

        assert_eq!(listener.addr().as_str().len(), 12 + ":8080".len());
        assert!(listener.addr().as_str().ends_with(":8080"));
        assert_eq!(listener.addr().network(), "testnet");
    }

    #[tokio::test]
    async fn dial_unknown_host_fails_immediately() {
        let network = Network::new();
        let err = network.dial(&Scope::new(), "nowhere:80").await.unwrap_err();
        assert_eq!(err, NetError::UnknownHost("nowhere:80".to_string()));
    }

    #[tokio::test]
    async fn networks_are_isolated() {
        let scope = Scope::new();
        let first = Network::new();
        let second = Network::new();
        let listener = first.listen(&scope);

        let err = second.dial(&scope, listener.addr().as_str()).await.unwrap_err();
        assert!(matches!(err, NetError::UnknownHost(_)));
    }

    #[tokio::test]
    async fn dial_prunes_listener_with_cancelled_scope() {
        let network = Network::new();
        let parent = Scope::new();
        let listener = network.listen(&parent);
        let addr = listener.addr().to_string();

        parent.cancel();
        let err = network.dial(&Scope::new(), &addr).await.unwrap_err();
        assert_eq!(err, NetError::UnknownHost(addr));
        assert_eq!(network.listener_count(), 0);
    }

    #[tokio::test]
    async fn dial_with_done_scope_fails_without_waiting() {
        let network = Network::new();
        let listener = network.listen(&Scope::new());
        let scope = Scope::new();
        scope.cancel();

        let err = network.dial(&scope, listener.addr().as_str()).await.unwrap_err();
        assert_eq!(err, NetError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dial_times_out_without_accept() {
        let network = Network::new();
        let listener = network.listen(&Scope::new());
        let scope = Scope::new().with_timeout(Duration::from_secs(1));

        let err = network.dial(&scope, listener.addr().as_str()).await.unwrap_err();
        assert_eq!(err, NetError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn listener_close_unblocks_pending_dial() {
        let network = Network::new();
        let listener = network.listen(&Scope::new());
        let dial = {
            let network = network.clone();
            let addr = listener.addr().to_string();
            tokio::spawn(async move { network.dial(&Scope::new(), &addr).await })
        };
        tokio::task::yield_now().await;

        listener.close();
        assert_eq!(dial.await.unwrap().unwrap_err(), NetError::ListenerClosing);
    }

    #[tokio::test]
    async fn helper_dialer_reaches_its_listener() {
        let scope = Scope::new();
        let (listener, dialer) = listener(&scope);

        let client = tokio::spawn(async move { dialer.dial().await });
        let server = listener.accept().await.unwrap();
        let client = client.await.unwrap().unwrap();

        assert_eq!(client.remote_addr(), listener.addr());
        assert_eq!(server.remote_addr(), client.local_addr());
    }
}
