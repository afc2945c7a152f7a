// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The multi-sourced registry.
//!
//! [`ServiceRegistry`] is the top-level store: registration, replication and
//! bootstrap inputs enter here tagged with a [`Source`], are reconciled per
//! instance id by a [`MultiSourcedDataHolder`], and the resulting
//! notifications fan out through the interest indexes to every subscriber.
//!
//! # Concurrency
//!
//! Mutations (update / remove / evict) and index creation are serialized
//! through one short critical section so that a subscription's initial
//! snapshot can never tear against an in-flight change — the loss-free
//! ordering guarantee of the index layer depends on it. The critical
//! section never awaits. Reads (`get`, `size`, `for_snapshot`) bypass it.

pub mod holder;
pub mod store;

pub use holder::MultiSourcedDataHolder;
pub use store::MultiSourcedDataStore;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::index::{IndexRegistry, InterestSubscription, SubscribeError};
use crate::metrics;
use crate::model::{
    ChangeNotification, InstanceInfo, Interest, InterestMatcher, MultipleInterests, Source,
    SourceMatcher, SourcedNotification,
};

/// Registry lifecycle, observable through [`ServiceRegistry::state_receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Active,
    Shutdown,
}

impl std::fmt::Display for RegistryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// The reconciling store plus its interest dispatch.
pub struct ServiceRegistry {
    store: MultiSourcedDataStore,
    indexes: IndexRegistry,
    /// Serializes mutations and index creation; see module docs.
    dispatch: Mutex<()>,
    state: watch::Sender<RegistryState>,
    state_rx: watch::Receiver<RegistryState>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (state, state_rx) = watch::channel(RegistryState::Active);
        Self {
            store: MultiSourcedDataStore::new(),
            indexes: IndexRegistry::new(),
            dispatch: Mutex::new(()),
            state,
            state_rx,
        }
    }

    /// Apply one `(record, source)` update and fan out the resulting
    /// notifications. Returns what became externally visible (empty when a
    /// losing source changed).
    pub fn update(&self, data: InstanceInfo, source: Source) -> Vec<ChangeNotification> {
        let _dispatch = self.dispatch.lock();
        if !self.is_active() {
            warn!(id = %data.id, "update dropped: registry is shut down");
            return Vec::new();
        }
        let notifications = self.store.update(data, source);
        self.publish(&notifications);
        strip(notifications)
    }

    /// Remove `source`'s copy of `id`. Absence is not an error.
    pub fn remove(&self, id: &str, source: &Source) -> Vec<ChangeNotification> {
        let _dispatch = self.dispatch.lock();
        if !self.is_active() {
            warn!(id, "remove dropped: registry is shut down");
            return Vec::new();
        }
        let notifications = self.store.remove(id, source);
        self.publish(&notifications);
        strip(notifications)
    }

    /// Purge every per-source entry matching `matcher` across all holders,
    /// returning the number of entries removed. Holders left with a
    /// non-matching source survive (emitting `Modify` where the winner
    /// changed); holders left empty are deleted.
    pub fn evict_all(&self, matcher: &SourceMatcher) -> usize {
        let _dispatch = self.dispatch.lock();
        if !self.is_active() {
            return 0;
        }
        let mut evicted = 0;
        for holder in self.store.values() {
            for source in holder.matching_sources(matcher) {
                let notifications = self.store.remove(holder.id(), &source);
                self.publish(&notifications);
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "evicted matching source entries");
            metrics::record_eviction(evicted);
        }
        evicted
    }

    fn publish(&self, notifications: &[SourcedNotification]) {
        for sourced in notifications {
            self.indexes.publish(sourced);
            let app = sourced
                .notification
                .data()
                .and_then(|d| d.app.as_deref())
                .unwrap_or("unknown");
            metrics::record_notification(app, sourced.notification.kind());
        }
        if !notifications.is_empty() {
            metrics::set_registry_size(self.store.size());
        }
    }

    /// Effective record for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<InstanceInfo> {
        self.store.get(id).and_then(|h| h.effective())
    }

    /// Holder for `id`, exposing per-source copies.
    #[must_use]
    pub fn holder(&self, id: &str) -> Option<std::sync::Arc<MultiSourcedDataHolder>> {
        self.store.get(id)
    }

    /// Number of registered instance ids.
    #[must_use]
    pub fn size(&self) -> usize {
        self.store.size()
    }

    /// Ordered change stream for one atomic interest: the compacted current
    /// state, a buffer sentinel, then live changes until shutdown or drop.
    pub fn for_interest(
        &self,
        interest: Interest,
    ) -> Result<InterestSubscription, SubscribeError> {
        self.for_interest_scoped(interest, SourceMatcher::Any)
    }

    /// Like [`for_interest`](Self::for_interest), restricted to changes
    /// whose effective record is owned by a source `scope` accepts — the
    /// replication feed uses a `Local` scope.
    pub fn for_interest_scoped(
        &self,
        interest: Interest,
        scope: SourceMatcher,
    ) -> Result<InterestSubscription, SubscribeError> {
        let _dispatch = self.dispatch.lock();
        let seed = self.effective_records();
        self.indexes.for_interest(interest, scope, &seed)
    }

    /// Ordered change stream for a union of atomic interests; a record
    /// matching several components is delivered once per change.
    pub fn for_interests(
        &self,
        interests: &MultipleInterests,
    ) -> Result<InterestSubscription, SubscribeError> {
        let _dispatch = self.dispatch.lock();
        let seed = self.effective_records();
        self.indexes
            .for_composite(interests, SourceMatcher::Any, &seed)
    }

    /// Point-in-time read: the effective records matching `interest`, no
    /// deletes, no live tail.
    pub fn for_snapshot(
        &self,
        interest: Interest,
    ) -> Result<Vec<InstanceInfo>, SubscribeError> {
        let matcher = InterestMatcher::new(interest)?;
        Ok(self
            .effective_records()
            .into_iter()
            .filter(|(_, record)| matcher.matches(record))
            .map(|(_, record)| record)
            .collect())
    }

    fn effective_records(&self) -> Vec<(Source, InstanceInfo)> {
        self.store
            .values()
            .into_iter()
            .filter_map(|holder| holder.effective_entry())
            .collect()
    }

    #[must_use]
    pub fn state(&self) -> RegistryState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<RegistryState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == RegistryState::Active
    }

    /// Complete every subscriber stream, clear the store and refuse further
    /// work. Idempotent.
    pub fn shutdown(&self) {
        let _dispatch = self.dispatch.lock();
        if !self.is_active() {
            return;
        }
        debug!("shutting down registry");
        self.indexes.shutdown();
        self.store.clear();
        let _ = self.state.send(RegistryState::Shutdown);
        metrics::record_state_transition("registry", "shutdown");
        metrics::set_registry_size(0);
    }
}

fn strip(notifications: Vec<SourcedNotification>) -> Vec<ChangeNotification> {
    notifications
        .into_iter()
        .map(SourcedNotification::into_notification)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationKind, Origin, Status};

    fn info(id: &str, app: &str, status: Status) -> InstanceInfo {
        InstanceInfo::builder(id)
            .app(app)
            .vip_address(format!("{app}.vip"))
            .status(status)
            .build()
    }

    fn local() -> Source {
        Source::local("node-a")
    }

    fn peer() -> Source {
        Source::replicated("node-b", "1")
    }

    #[tokio::test]
    async fn test_update_reaches_interested_subscriber() {
        let registry = ServiceRegistry::new();
        let mut sub = registry
            .for_interest(Interest::for_application("backend"))
            .unwrap();
        assert!(!sub.recv().await.unwrap().is_data());

        registry.update(info("i1", "backend", Status::Up), local());
        registry.update(info("i2", "frontend", Status::Up), local());

        let n = sub.recv().await.unwrap();
        assert_eq!(n.kind(), NotificationKind::Add);
        assert_eq!(n.data().unwrap().id, "i1");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_subscriber_snapshot_then_live() {
        let registry = ServiceRegistry::new();
        registry.update(info("i1", "backend", Status::Up), local());

        let mut sub = registry.for_interest(Interest::for_full_registry()).unwrap();
        registry.update(info("i2", "backend", Status::Up), local());

        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "i1");
        assert!(!sub.recv().await.unwrap().is_data());
        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "i2");
    }

    #[tokio::test]
    async fn test_scoped_stream_sees_only_local_origin() {
        let registry = ServiceRegistry::new();
        let mut sub = registry
            .for_interest_scoped(
                Interest::for_full_registry(),
                SourceMatcher::ForOrigin(Origin::Local),
            )
            .unwrap();
        assert!(!sub.recv().await.unwrap().is_data());

        registry.update(info("r1", "backend", Status::Up), peer());
        registry.update(info("l1", "backend", Status::Up), local());

        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "l1");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_for_snapshot_is_point_in_time() {
        let registry = ServiceRegistry::new();
        registry.update(info("i1", "backend", Status::Up), local());
        registry.update(info("i2", "frontend", Status::Up), local());

        let records = registry
            .for_snapshot(Interest::for_application("backend"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "i1");

        registry.update(info("i3", "backend", Status::Up), local());
        // The earlier snapshot is unaffected.
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_all_counts_and_notifies() {
        let registry = ServiceRegistry::new();
        // i1 only from the peer; i2 from both peer and local.
        registry.update(info("i1", "backend", Status::Up), peer());
        registry.update(info("i2", "backend", Status::Up), local());
        registry.update(info("i2", "backend", Status::Down), peer());

        let mut sub = registry.for_interest(Interest::for_full_registry()).unwrap();
        while let Some(n) = sub.try_recv() {
            assert_ne!(n.kind(), NotificationKind::Delete);
        }

        let evicted = registry.evict_all(&SourceMatcher::ForOriginAndName(
            Origin::Replicated,
            "node-b".into(),
        ));
        assert_eq!(evicted, 2);
        assert_eq!(registry.size(), 1);
        assert!(registry.get("i1").is_none());
        assert_eq!(registry.get("i2").unwrap().status, Status::Up);

        // i1 disappears with a Delete; i2 keeps its local copy, and since
        // the peer copy never won, nothing is emitted for it.
        let n = sub.recv().await.unwrap();
        assert_eq!(n.kind(), NotificationKind::Delete);
        assert_eq!(n.data().unwrap().id, "i1");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_completes_streams_and_rejects_mutations() {
        let registry = ServiceRegistry::new();
        registry.update(info("i1", "backend", Status::Up), local());
        let mut sub = registry.for_interest(Interest::for_full_registry()).unwrap();

        registry.shutdown();
        assert_eq!(registry.state(), RegistryState::Shutdown);
        assert_eq!(registry.size(), 0);

        // Stream drains whatever was queued, then completes.
        while sub.recv().await.is_some() {}

        assert!(registry
            .update(info("i2", "backend", Status::Up), local())
            .is_empty());
        assert!(matches!(
            registry.for_interest(Interest::for_full_registry()),
            Err(SubscribeError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_composite_through_registry() {
        let registry = ServiceRegistry::new();
        registry.update(info("i1", "backend", Status::Up), local());

        let union = MultipleInterests::new([
            Interest::for_application("backend"),
            Interest::for_vip("backend.vip"),
        ]);
        let mut sub = registry.for_interests(&union).unwrap();

        // i1 matches both components but appears once in the snapshot.
        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "i1");
        assert!(!sub.recv().await.unwrap().is_data());

        registry.update(info("i1", "backend", Status::Down), local());
        let n = sub.recv().await.unwrap();
        assert_eq!(n.kind(), NotificationKind::Modify);
        assert!(sub.try_recv().is_none());
    }
}
