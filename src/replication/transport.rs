// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport seam for replication links.
//!
//! The engine only needs a bidirectional message pipe; framing, codec and
//! real networking live behind [`ReplicationTransport`]. The in-memory
//! implementation in [`memory`] pairs connections through a shared hub and
//! backs the tests and demos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::protocol::{ReplicationError, ReplicationMessage};

/// A peer's connectable address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One established replication link.
#[async_trait]
pub trait ReplicationConnection: Send {
    async fn send(&mut self, message: ReplicationMessage) -> Result<(), ReplicationError>;
    async fn recv(&mut self) -> Result<ReplicationMessage, ReplicationError>;
}

/// Connects replication links to peers.
#[async_trait]
pub trait ReplicationTransport: Send + Sync {
    async fn connect(
        &self,
        peer: &PeerAddress,
    ) -> Result<Box<dyn ReplicationConnection>, ReplicationError>;
}

pub mod memory {
    //! In-process transport: connections are paired through a shared hub.

    use std::sync::Arc;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use tokio::sync::mpsc;

    use super::{PeerAddress, ReplicationConnection, ReplicationTransport};
    use crate::replication::protocol::{ReplicationError, ReplicationMessage};

    /// One end of a paired duplex link.
    pub struct MemoryConnection {
        tx: mpsc::UnboundedSender<ReplicationMessage>,
        rx: mpsc::UnboundedReceiver<ReplicationMessage>,
    }

    impl MemoryConnection {
        /// A connected pair of ends.
        #[must_use]
        pub fn pair() -> (MemoryConnection, MemoryConnection) {
            let (a_tx, a_rx) = mpsc::unbounded_channel();
            let (b_tx, b_rx) = mpsc::unbounded_channel();
            (
                MemoryConnection { tx: a_tx, rx: b_rx },
                MemoryConnection { tx: b_tx, rx: a_rx },
            )
        }
    }

    #[async_trait]
    impl ReplicationConnection for MemoryConnection {
        async fn send(&mut self, message: ReplicationMessage) -> Result<(), ReplicationError> {
            self.tx
                .send(message)
                .map_err(|_| ReplicationError::ConnectionClosed)
        }

        async fn recv(&mut self) -> Result<ReplicationMessage, ReplicationError> {
            self.rx
                .recv()
                .await
                .ok_or(ReplicationError::ConnectionClosed)
        }
    }

    /// Shared rendezvous: listeners register an address, connectors get the
    /// other end of a fresh pair delivered to the listener.
    #[derive(Default)]
    pub struct MemoryHub {
        listeners: DashMap<PeerAddress, mpsc::UnboundedSender<MemoryConnection>>,
    }

    impl MemoryHub {
        #[must_use]
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register `address` and receive inbound connections on the
        /// returned channel. Re-listening on an address replaces the old
        /// listener.
        pub fn listen(&self, address: PeerAddress) -> mpsc::UnboundedReceiver<MemoryConnection> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.listeners.insert(address, tx);
            rx
        }

        /// Drop the listener for `address`; later connects are refused.
        pub fn unlisten(&self, address: &PeerAddress) {
            self.listeners.remove(address);
        }
    }

    /// [`ReplicationTransport`] connecting through a [`MemoryHub`].
    pub struct MemoryTransport {
        hub: Arc<MemoryHub>,
    }

    impl MemoryTransport {
        #[must_use]
        pub fn new(hub: Arc<MemoryHub>) -> Self {
            Self { hub }
        }
    }

    #[async_trait]
    impl ReplicationTransport for MemoryTransport {
        async fn connect(
            &self,
            peer: &PeerAddress,
        ) -> Result<Box<dyn ReplicationConnection>, ReplicationError> {
            let listener = self
                .hub
                .listeners
                .get(peer)
                .map(|l| l.value().clone())
                .ok_or_else(|| {
                    ReplicationError::Transport(format!("no listener at {peer}"))
                })?;
            let (local, remote) = MemoryConnection::pair();
            listener
                .send(remote)
                .map_err(|_| ReplicationError::Transport(format!("listener at {peer} gone")))?;
            Ok(Box::new(local))
        }
    }

}
