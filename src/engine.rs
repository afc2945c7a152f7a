// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine coordinator.
//!
//! [`RegistryEngine`] ties the pieces together for one node: the
//! [`ServiceRegistry`], the outbound [`ReplicationService`], and an
//! [`ReplicationAcceptor`] for inbound links. Process wiring (transport
//! listeners, exporters, CLI) stays with the embedding application.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::config::RegistryConfig;
use crate::metrics;
use crate::model::Source;
use crate::registry::ServiceRegistry;
use crate::replication::{
    PeerAddressProvider, ReplicationAcceptor, ReplicationError, ReplicationService,
    ReplicationTransport,
};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, replication not yet started
    Created,
    /// Serving and (if configured) replicating
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// One node's registry plus its replication wiring.
pub struct RegistryEngine {
    config: RegistryConfig,
    node_name: String,
    /// Identity announced on replication links (config override or node name).
    announced_name: String,
    registry: Arc<ServiceRegistry>,
    replication: Arc<ReplicationService>,
    state: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,
}

impl RegistryEngine {
    /// Build an engine for `node_name` replicating over `transport`.
    #[must_use]
    pub fn new(
        node_name: impl Into<String>,
        config: RegistryConfig,
        transport: Arc<dyn ReplicationTransport>,
    ) -> Self {
        let node_name = node_name.into();
        let announced = config
            .replication_source_name
            .clone()
            .unwrap_or_else(|| node_name.clone());
        let registry = Arc::new(ServiceRegistry::new());
        let replication =
            ReplicationService::new(registry.clone(), transport, &announced, &config);
        let (state, state_rx) = watch::channel(EngineState::Created);
        Self {
            config,
            node_name,
            announced_name: announced,
            registry,
            replication,
            state,
            state_rx,
        }
    }

    /// The node's registry; registrations and reads go here.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The outbound replication service.
    #[must_use]
    pub fn replication(&self) -> &Arc<ReplicationService> {
        &self.replication
    }

    /// An acceptor for inbound replication links; the embedding transport
    /// listener calls [`ReplicationAcceptor::serve`] per connection.
    #[must_use]
    pub fn acceptor(&self) -> ReplicationAcceptor {
        ReplicationAcceptor::new(
            self.registry.clone(),
            Source::local(self.announced_name.clone()),
            Duration::from_millis(self.config.liveness_deadline_ms()),
        )
    }

    /// Start replicating to the peers `provider` resolves.
    pub fn start(&self, provider: &dyn PeerAddressProvider) -> Result<(), ReplicationError> {
        self.replication.start(provider)?;
        let _ = self.state.send(EngineState::Running);
        metrics::record_state_transition("engine", "running");
        info!(node = %self.node_name, "registry engine running");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Tear down replication first, then complete every subscriber stream.
    pub fn shutdown(&self) {
        let _ = self.state.send(EngineState::ShuttingDown);
        metrics::record_state_transition("engine", "shutting_down");
        info!(node = %self.node_name, "shutting down registry engine");
        self.replication.close();
        self.registry.shutdown();
    }
}
