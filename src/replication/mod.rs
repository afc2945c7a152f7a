// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cluster replication.
//!
//! Keeps registry copies across peers convergent: every locally-sourced
//! change is forwarded to every peer, where it re-enters that peer's
//! registry tagged `Replicated`. The [`ReplicationService`] owns one sender
//! pipeline per peer and follows a [`resolver`] stream for membership;
//! [`receiver::ReplicationAcceptor`] is the other end of the link.
//!
//! Service states: `Idle → Connected → Closed`. Adding a peer already in
//! the set is a no-op, removing one cancels its pipeline, closing the
//! service unsubscribes every pipeline and the address resolver.

pub mod pipeline;
pub mod protocol;
pub mod receiver;
pub mod resolver;
pub mod transport;

pub use pipeline::PipelineExit;
pub use protocol::{
    ReplicationClientHello, ReplicationError, ReplicationMessage, ReplicationServerHello,
};
pub use receiver::ReplicationAcceptor;
pub use resolver::{
    PeerAddressProvider, PeerListLoader, PeerUpdate, PollingPeerProvider, ResolverError,
    StaticPeerProvider,
};
pub use transport::{PeerAddress, ReplicationConnection, ReplicationTransport};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::RegistryConfig;
use crate::metrics;
use crate::model::{Origin, Source};
use crate::registry::ServiceRegistry;

use pipeline::run_peer_pipeline;

/// Distinguishes reconnects of the same node within one process lifetime.
static SOURCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_replication_source(node_name: &str) -> Source {
    let n = SOURCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    Source::new(Origin::Replicated, node_name, format!("{node_name}/{n}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Idle,
    Connected,
    Closed,
}

struct PeerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Propagates locally-sourced changes to every cluster peer.
pub struct ReplicationService {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn ReplicationTransport>,
    self_source: Source,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    state: Mutex<ServiceState>,
    peers: Mutex<HashMap<PeerAddress, PeerHandle>>,
    resolver_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationService {
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn ReplicationTransport>,
        node_name: &str,
        config: &RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport,
            self_source: next_replication_source(node_name),
            reconnect_delay: Duration::from_millis(config.replication_reconnect_delay_ms),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            state: Mutex::new(ServiceState::Idle),
            peers: Mutex::new(HashMap::new()),
            resolver_task: Mutex::new(None),
        })
    }

    /// The source this node announces on outbound links.
    #[must_use]
    pub fn self_source(&self) -> &Source {
        &self.self_source
    }

    /// Begin following `provider` for cluster membership. Idempotent while
    /// connected; fails once the service was closed.
    pub fn start(
        self: &Arc<Self>,
        provider: &dyn PeerAddressProvider,
    ) -> Result<(), ReplicationError> {
        {
            let mut state = self.state.lock();
            match *state {
                ServiceState::Idle => *state = ServiceState::Connected,
                ServiceState::Connected => {
                    info!("replication service already started; ignoring subsequent start");
                    return Ok(());
                }
                ServiceState::Closed => return Err(ReplicationError::ServiceClosed),
            }
        }
        info!("starting replication service");
        metrics::record_state_transition("replication", "connected");

        let mut stream = provider.subscribe();
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(item) = stream.recv().await {
                let Some(service) = weak.upgrade() else { return };
                match item {
                    Ok(PeerUpdate::Add(address)) => service.add_peer(address),
                    Ok(PeerUpdate::Remove(address)) => service.remove_peer(&address),
                    Err(err) => {
                        error!(%err, "peer resolver stream error; cluster membership will no longer be updated");
                        return;
                    }
                }
            }
            debug!("peer resolver stream completed; cluster membership will no longer be updated");
        });
        *self.resolver_task.lock() = Some(task);
        Ok(())
    }

    /// Open a replication pipeline to `address`. A peer already present is
    /// a no-op; a closed service refuses.
    pub fn add_peer(self: &Arc<Self>, address: PeerAddress) {
        if *self.state.lock() == ServiceState::Closed {
            info!(%address, "not adding peer: service is closed");
            return;
        }
        let mut peers = self.peers.lock();
        if peers.contains_key(&address) {
            return;
        }
        info!(%address, "adding replication pipeline");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = {
            let registry = self.registry.clone();
            let transport = self.transport.clone();
            let self_source = self.self_source.clone();
            let reconnect_delay = self.reconnect_delay;
            let heartbeat_interval = self.heartbeat_interval;
            let address = address.clone();
            tokio::spawn(async move {
                let exit = run_peer_pipeline(
                    registry,
                    self_source,
                    transport,
                    address.clone(),
                    reconnect_delay,
                    heartbeat_interval,
                    shutdown_rx,
                )
                .await;
                if matches!(exit, PipelineExit::LoopDetected | PipelineExit::Failed) {
                    if let Some(service) = weak.upgrade() {
                        service.remove_peer(&address);
                    }
                }
            })
        };

        peers.insert(
            address,
            PeerHandle {
                shutdown: shutdown_tx,
                task,
            },
        );
        metrics::set_replication_peers(peers.len());
    }

    /// Cancel and forget the pipeline to `address`, including an in-flight
    /// handshake or retry timer.
    pub fn remove_peer(&self, address: &PeerAddress) {
        let removed = self.peers.lock().remove(address);
        if let Some(handle) = removed {
            info!(%address, "removing replication peer");
            let _ = handle.shutdown.send(true);
            handle.task.abort();
            metrics::set_replication_peers(self.peers.lock().len());
        }
    }

    /// Peers with an active (or retrying) pipeline.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.state.lock() == ServiceState::Closed
    }

    /// Stop following the resolver and cancel every peer pipeline.
    /// Idempotent.
    pub fn close(&self) {
        let prev = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ServiceState::Closed)
        };
        if prev != ServiceState::Connected {
            return;
        }
        info!("closing replication service");
        metrics::record_state_transition("replication", "closed");

        if let Some(task) = self.resolver_task.lock().take() {
            task.abort();
        }
        let drained: Vec<(PeerAddress, PeerHandle)> = self.peers.lock().drain().collect();
        for (address, handle) in drained {
            info!(%address, "unsubscribing replication pipeline");
            let _ = handle.shutdown.send(true);
            handle.task.abort();
        }
        metrics::set_replication_peers(0);
    }
}

impl Drop for ReplicationService {
    fn drop(&mut self) {
        // Arc'd tasks hold only weak refs, so drop-time close is safe.
        self.close();
    }
}
