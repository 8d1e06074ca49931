//! Emulated listener.
//!
//! # Responsibilities
//! - Manufacture a connected pair for every accept
//! - Hand the client side to exactly one dialer through a rendezvous
//! - Track every pair it spawned and close them all on shutdown
//!
//! # Design Decisions
//! - The listener scope is a child of the caller's scope; cancelling either
//!   ends every pair, because pipe operations select on it directly
//! - The tracking set is taken out of its lock before connections are closed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::config::AddressConfig;
use crate::lifecycle::Scope;
use crate::net::addr::Addr;
use crate::net::connection::{Connection, ConnectionTracker, Teardown};
use crate::net::error::{NetError, NetResult};
use crate::net::handoff::Handoff;
use crate::net::network::Registry;
use crate::observability::metrics;

#[derive(Debug)]
pub(crate) struct ListenerShared {
    addr: Addr,
    scope: Scope,
    address_config: AddressConfig,
    handoff: Handoff<Connection>,
    tracker: Arc<ConnectionTracker>,
    registry: Weak<Registry>,
    closed: AtomicBool,
}

impl ListenerShared {
    pub(crate) fn new(
        addr: Addr,
        scope: Scope,
        address_config: AddressConfig,
        registry: Weak<Registry>,
    ) -> Self {
        metrics::record_listener_opened();
        Self {
            addr,
            scope,
            address_config,
            handoff: Handoff::new(),
            tracker: Arc::new(ConnectionTracker::new()),
            registry,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.scope.is_done()
    }

    fn spawn_pair(&self) -> (Connection, Connection) {
        let tracker = Arc::downgrade(&self.tracker);
        let teardown: Teardown = Arc::new(move |id| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.untrack(id);
            }
        });
        let (client, server) = Connection::pair(
            &self.scope,
            self.addr.clone(),
            Addr::generate(&self.address_config),
            teardown,
        );
        self.tracker.track(&client, &server);
        (client, server)
    }

    async fn accept(&self) -> NetResult<Connection> {
        if self.scope.is_done() {
            return Err(NetError::ListenerClosing);
        }

        let (client, server) = self.spawn_pair();
        match self.handoff.offer(client, &[&self.scope]).await {
            Ok(()) => {
                tracing::debug!(
                    address = %self.addr,
                    connection_id = %server.id(),
                    peer_addr = %server.remote_addr(),
                    "Connection accepted"
                );
                Ok(server)
            }
            Err(refused) => {
                refused.into_inner().close();
                server.close();
                Err(NetError::ListenerClosing)
            }
        }
    }

    /// Wait for a pending accept and take its client side.
    pub(crate) async fn connect(&self, scope: &Scope) -> NetResult<Connection> {
        match self.handoff.take(&[scope, &self.scope]).await {
            Ok(Some(client)) => Ok(client),
            Ok(None) => Err(NetError::ListenerClosing),
            Err(_) => Err(scope
                .err()
                .map(NetError::from)
                .unwrap_or(NetError::ListenerClosing)),
        }
    }

    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scope.cancel();
        self.handoff.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.addr);
        }

        let connections = self.tracker.drain();
        tracing::debug!(
            address = %self.addr,
            connections = connections.len(),
            "Listener closed"
        );
        for connection in &connections {
            connection.close();
        }
        metrics::record_listener_closed();
    }
}

/// Accepts emulated connections at one address.
///
/// Dropping the listener closes it, which closes every connection it
/// accepted.
#[derive(Debug)]
pub struct Listener {
    shared: Arc<ListenerShared>,
}

impl Listener {
    pub(crate) fn new(shared: Arc<ListenerShared>) -> Self {
        Self { shared }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<ListenerShared> {
        &self.shared
    }

    /// The address dialers connect to.
    pub fn addr(&self) -> &Addr {
        &self.shared.addr
    }

    /// Wait for a dialer and return the server side of the new connection.
    ///
    /// Fails with [`NetError::ListenerClosing`] once the listener is closed
    /// or its scope is cancelled.
    pub async fn accept(&self) -> NetResult<Connection> {
        self.shared.accept().await
    }

    /// Stop accepting, unregister the address and close every tracked
    /// connection. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether the listener was closed or its scope ended.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.shared.is_done()
    }

    /// Live connections spawned by this listener (two per accepted pair).
    pub fn connection_count(&self) -> usize {
        self.shared.tracker.active_count()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shared.close();
    }
}
