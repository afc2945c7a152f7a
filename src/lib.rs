// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Registry Engine
//!
//! A multi-source service registry with interest subscriptions and peer
//! replication. Instances advertise liveness and location; a cluster of
//! nodes reconciles advertisements arriving from independent origins
//! (direct registration, peer replication, bootstrap import) into one
//! coherent view and pushes that view to subscribers as an ordered stream
//! of incremental changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Input Feeds                           │
//! │  registration (LOCAL) · replication (REPLICATED) ·          │
//! │  bootstrap import (BOOTSTRAP)                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ (InstanceInfo, Source)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ServiceRegistry                         │
//! │  • id → MultiSourcedDataHolder reconciliation               │
//! │  • priority: Local > Replicated > Bootstrap > Interested    │
//! │  • emits compacted ChangeNotifications                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ SourcedNotification
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Interest Index Layer                        │
//! │  • one Index per (interest, source scope)                   │
//! │  • snapshot + live merge, loss-free and duplicate-free      │
//! │  • composite unions share one relay                         │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               │
//!                ▼                               ▼
//!   subscriber channels                 ReplicationService
//!   (InterestNotification-              (LOCAL-scoped feed to every
//!    Multiplexer per channel)            peer, handshake + heartbeat,
//!                                        fixed-delay reconnect)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use registry_engine::{
//!     InstanceInfo, Interest, RegistryConfig, RegistryEngine, Source, Status,
//! };
//! use registry_engine::replication::transport::memory::{MemoryHub, MemoryTransport};
//! use registry_engine::replication::StaticPeerProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = MemoryHub::new();
//!     let engine = RegistryEngine::new(
//!         "node-a",
//!         RegistryConfig::default(),
//!         Arc::new(MemoryTransport::new(hub.clone())),
//!     );
//!     engine.start(&StaticPeerProvider::new(vec![])).unwrap();
//!
//!     // Register an instance.
//!     let info = InstanceInfo::builder("backend-1")
//!         .app("backend")
//!         .status(Status::Up)
//!         .build();
//!     engine.registry().update(info, Source::local("node-a"));
//!
//!     // Subscribe: compacted snapshot, sentinel, then live changes.
//!     let mut sub = engine
//!         .registry()
//!         .for_interest(Interest::for_application("backend"))
//!         .unwrap();
//!     while let Some(notification) = sub.recv().await {
//!         println!("{:?}", notification.kind());
//!     }
//!
//!     engine.shutdown();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`model`]: instance records, sources, notifications, interests
//! - [`registry`]: per-id reconciliation and the top-level store
//! - [`index`]: pausable relays, compacted init state, per-interest indexes
//! - [`channel`]: per-subscriber interest multiplexer
//! - [`replication`]: peer pipelines, handshake protocol, resolvers
//! - [`resilience`]: retry policies
//! - [`engine`]: lifecycle coordinator

pub mod channel;
pub mod config;
pub mod engine;
pub mod index;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod replication;
pub mod resilience;

pub use channel::{ChannelError, InterestNotificationMultiplexer};
pub use config::RegistryConfig;
pub use engine::{EngineState, RegistryEngine};
pub use index::{
    IndexRegistry, InitStateHolder, InterestSubscription, PausableRelay, RelayMode,
    SubscribeError,
};
pub use model::{
    ChangeNotification, DataCenterInfo, Delta, FieldName, InstanceInfo, InstanceInfoBuilder,
    Interest, InterestMatcher, MultipleInterests, NotificationKind, Operator, Origin,
    ServicePort, Source, SourceMatcher, SourcedNotification, Status,
};
pub use registry::{MultiSourcedDataHolder, MultiSourcedDataStore, RegistryState, ServiceRegistry};
pub use replication::{
    PeerAddress, ReplicationAcceptor, ReplicationError, ReplicationService,
};
pub use resilience::RetryConfig;
