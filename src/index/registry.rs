// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Interest → index cache and composite subscription assembly.
//!
//! One [`Index`] exists per (atomic interest, source scope) pair; repeated
//! subscriptions for an equal interest share it instead of re-subscribing
//! upstream. Composite interests are flattened, one index obtained per
//! component, and all components feed a single shared relay so that a record
//! matching several components is evaluated once per change and delivered
//! once (overlap duplicates are adjacent and squashed at the subscriber
//! edge).
//!
//! All index creation and publishing goes through the registry's lock: a
//! snapshot captured during subscription can never tear against a concurrent
//! publish.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::metrics;
use crate::model::{
    ChangeNotification, InstanceInfo, Interest, InterestMatcher, MultipleInterests, Source,
    SourceMatcher, SourcedNotification,
};

use super::{Index, InterestSubscription, PausableRelay, SubscribeError, SubscriptionGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    interest: Interest,
    scope: SourceMatcher,
}

#[derive(Default)]
struct Indexes {
    by_key: HashMap<IndexKey, Arc<Index>>,
    shutdown: bool,
}

/// Caches indexes by interest and fans the registry's change feed into them.
#[derive(Default)]
pub struct IndexRegistry {
    state: Mutex<Indexes>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one atomic interest, creating (and seeding) its index on
    /// first use.
    ///
    /// `seed` supplies the current registry records for a newly created
    /// index; it is not consulted on a cache hit.
    pub fn for_interest(
        &self,
        interest: Interest,
        scope: SourceMatcher,
        seed: &[(Source, InstanceInfo)],
    ) -> Result<InterestSubscription, SubscribeError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(SubscribeError::Shutdown);
        }
        let index = Self::obtain(&mut state, interest, scope, seed)?;
        let subscription = index.subscribe();
        metrics::record_subscription(index.interest().kind_label());
        Ok(subscription)
    }

    /// Subscribe to a union of atomic interests through one shared relay.
    pub fn for_composite(
        &self,
        interests: &MultipleInterests,
        scope: SourceMatcher,
        seed: &[(Source, InstanceInfo)],
    ) -> Result<InterestSubscription, SubscribeError> {
        if interests.is_empty() {
            return Err(SubscribeError::EmptyComposite);
        }

        let mut state = self.state.lock();
        if state.shutdown {
            return Err(SubscribeError::Shutdown);
        }

        let mut indexes = Vec::with_capacity(interests.len());
        for interest in interests.flatten() {
            indexes.push(Self::obtain(
                &mut state,
                interest.clone(),
                scope.clone(),
                seed,
            )?);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Arc::new(PausableRelay::new(tx.clone()));

        // Union snapshot: each component's compacted state, first occurrence
        // of an id wins (all components were seeded from the same registry
        // state, so overlapping entries are identical).
        let mut seen = std::collections::HashSet::new();
        let mut union_snapshot = Vec::new();
        let mut guards: Vec<SubscriptionGuard> = Vec::with_capacity(indexes.len());
        for index in &indexes {
            for notification in index.init_state().compacted() {
                if let Some(data) = notification.data() {
                    if seen.insert(data.id.clone()) {
                        union_snapshot.push(notification);
                    }
                }
            }
            if let Some(guard) = index.attach_relay(relay.clone()) {
                guards.push(guard);
            }
        }
        drop(state);

        for notification in union_snapshot {
            if tx.send(notification).is_err() {
                break;
            }
        }
        let _ = tx.send(ChangeNotification::BufferSentinel);
        relay.resume();

        metrics::record_subscription("composite");
        Ok(InterestSubscription::composite(rx, guards))
    }

    fn obtain(
        state: &mut Indexes,
        interest: Interest,
        scope: SourceMatcher,
        seed: &[(Source, InstanceInfo)],
    ) -> Result<Arc<Index>, SubscribeError> {
        let key = IndexKey {
            interest: interest.clone(),
            scope: scope.clone(),
        };
        if let Some(index) = state.by_key.get(&key) {
            return Ok(index.clone());
        }
        let matcher = InterestMatcher::new(interest)?;
        let index = Arc::new(Index::new(matcher, scope));
        index.seed(seed.iter());
        debug!(
            interest = index.interest().kind_label(),
            seeded = index.init_state().len(),
            "created index"
        );
        state.by_key.insert(key, index.clone());
        Ok(index)
    }

    /// Fan one notification into every cached index.
    pub fn publish(&self, sourced: &SourcedNotification) {
        let state = self.state.lock();
        for index in state.by_key.values() {
            index.publish(sourced);
        }
    }

    /// Number of cached indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().by_key.is_empty()
    }

    /// Complete every index stream and clear the cache. Subscriptions
    /// created afterwards fail with [`SubscribeError::Shutdown`].
    pub fn shutdown(&self) {
        let indexes: Vec<Arc<Index>> = {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.by_key.drain().map(|(_, index)| index).collect()
        };
        for index in &indexes {
            index.complete();
        }
        info!(completed = indexes.len(), "index registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationKind, Origin, Source, Status};

    fn info(id: &str, app: &str) -> InstanceInfo {
        InstanceInfo::builder(id).app(app).status(Status::Up).build()
    }

    fn local(n: ChangeNotification) -> SourcedNotification {
        SourcedNotification::new(Source::new(Origin::Local, "node", "node"), n)
    }

    #[tokio::test]
    async fn test_equal_interest_shares_index() {
        let registry = IndexRegistry::new();
        let _a = registry
            .for_interest(Interest::for_application("x"), SourceMatcher::Any, &[])
            .unwrap();
        let _b = registry
            .for_interest(Interest::for_application("x"), SourceMatcher::Any, &[])
            .unwrap();
        assert_eq!(registry.len(), 1);

        let _c = registry
            .for_interest(Interest::for_application("y"), SourceMatcher::Any, &[])
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_applies_only_to_new_index() {
        let registry = IndexRegistry::new();
        let source = Source::new(Origin::Local, "node", "node");
        let mut sub = registry
            .for_interest(
                Interest::for_application("backend"),
                SourceMatcher::Any,
                &[
                    (source.clone(), info("a", "backend")),
                    (source, info("b", "frontend")),
                ],
            )
            .unwrap();

        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "a");
        assert!(!sub.recv().await.unwrap().is_data());
    }

    #[tokio::test]
    async fn test_composite_union_delivers_once() {
        let registry = IndexRegistry::new();
        let union = MultipleInterests::new([
            Interest::for_application("backend"),
            Interest::for_vip("backend.vip"),
        ]);
        let mut sub = registry
            .for_composite(&union, SourceMatcher::Any, &[])
            .unwrap();
        assert!(!sub.recv().await.unwrap().is_data());

        // Matches both components; must be delivered exactly once.
        let both = InstanceInfo::builder("a")
            .app("backend")
            .vip_address("backend.vip")
            .status(Status::Up)
            .build();
        registry.publish(&local(ChangeNotification::Add(both.clone())));
        registry.publish(&local(ChangeNotification::Delete(both)));
        registry.publish(&local(ChangeNotification::Add(info("b", "backend"))));

        assert_eq!(sub.recv().await.unwrap().kind(), NotificationKind::Add);
        assert_eq!(sub.recv().await.unwrap().kind(), NotificationKind::Delete);
        let last = sub.recv().await.unwrap();
        assert_eq!(last.data().unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_composite_snapshot_overlap_dedup() {
        let both = InstanceInfo::builder("a")
            .app("backend")
            .vip_address("backend.vip")
            .status(Status::Up)
            .build();
        let registry = IndexRegistry::new();
        let union = MultipleInterests::new([
            Interest::for_application("backend"),
            Interest::for_vip("backend.vip"),
        ]);
        let seeded = (Source::new(Origin::Local, "node", "node"), both);
        let mut sub = registry
            .for_composite(&union, SourceMatcher::Any, std::slice::from_ref(&seeded))
            .unwrap();

        assert_eq!(sub.recv().await.unwrap().data().unwrap().id, "a");
        assert!(!sub.recv().await.unwrap().is_data());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_empty_composite_rejected() {
        let registry = IndexRegistry::new();
        let result = registry.for_composite(
            &MultipleInterests::default(),
            SourceMatcher::Any,
            &[],
        );
        assert!(matches!(result, Err(SubscribeError::EmptyComposite)));
    }

    #[tokio::test]
    async fn test_shutdown_completes_streams_and_rejects_new() {
        let registry = IndexRegistry::new();
        let mut sub = registry
            .for_interest(Interest::for_full_registry(), SourceMatcher::Any, &[])
            .unwrap();

        registry.shutdown();
        while let Some(n) = sub.recv().await {
            assert!(!n.is_data());
        }
        assert!(registry.is_empty());

        let late = registry.for_interest(Interest::for_full_registry(), SourceMatcher::Any, &[]);
        assert!(matches!(late, Err(SubscribeError::Shutdown)));
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_subscription() {
        let registry = IndexRegistry::new();
        let result = registry.for_interest(
            Interest::Application {
                pattern: "([bad".into(),
                operator: crate::model::Operator::Like,
            },
            SourceMatcher::Any,
            &[],
        );
        assert!(matches!(result, Err(SubscribeError::InvalidPattern(_))));
    }
}
