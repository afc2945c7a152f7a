// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The id → holder map.
//!
//! Entry point for source-scoped update/remove: holders are created lazily
//! on the first update for an unseen id and purged as soon as their source
//! set empties. Reads are safe under concurrent writers; the map takes no
//! exclusive lock, only each holder serializes its own mutations.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::{InstanceInfo, Source, SourcedNotification};

use super::holder::MultiSourcedDataHolder;

/// Concurrent store of [`MultiSourcedDataHolder`]s keyed by instance id.
#[derive(Debug, Default)]
pub struct MultiSourcedDataStore {
    holders: DashMap<String, Arc<MultiSourcedDataHolder>>,
}

impl MultiSourcedDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `data` to its holder, creating one for an unseen id.
    pub fn update(&self, data: InstanceInfo, source: Source) -> Vec<SourcedNotification> {
        let holder = self
            .holders
            .entry(data.id.clone())
            .or_insert_with(|| Arc::new(MultiSourcedDataHolder::new(data.id.clone())))
            .clone();
        holder.update(source, data)
    }

    /// Remove `source`'s copy of `id`; an absent id implies nothing.
    ///
    /// The holder is purged from the map once its source set is empty.
    pub fn remove(&self, id: &str, source: &Source) -> Vec<SourcedNotification> {
        let Some(holder) = self.holders.get(id).map(|h| h.clone()) else {
            return Vec::new();
        };
        let notifications = holder.remove(source);
        if holder.is_empty() {
            self.holders.remove_if(id, |_, h| h.is_empty());
        }
        notifications
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<MultiSourcedDataHolder>> {
        self.holders.get(id).map(|h| h.clone())
    }

    /// All live holders, in no particular order.
    #[must_use]
    pub fn values(&self) -> Vec<Arc<MultiSourcedDataHolder>> {
        self.holders.iter().map(|h| h.value().clone()).collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.holders.len()
    }

    /// Drop every holder.
    pub fn clear(&self) {
        self.holders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeNotification, NotificationKind, Status};

    fn info(id: &str, status: Status) -> InstanceInfo {
        InstanceInfo::builder(id).app("app").status(status).build()
    }

    fn local() -> Source {
        Source::local("node-a")
    }

    fn replicated() -> Source {
        Source::replicated("node-b", "1")
    }

    #[test]
    fn test_update_creates_holder_lazily() {
        let store = MultiSourcedDataStore::new();
        assert_eq!(store.size(), 0);

        let out = store.update(info("i", Status::Up), local());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].notification.kind(), NotificationKind::Add);
        assert_eq!(store.size(), 1);
        assert!(store.get("i").is_some());
    }

    #[test]
    fn test_remove_absent_id_is_empty_not_error() {
        let store = MultiSourcedDataStore::new();
        assert!(store.remove("ghost", &local()).is_empty());
    }

    #[test]
    fn test_empty_holder_is_purged() {
        let store = MultiSourcedDataStore::new();
        store.update(info("i", Status::Up), local());

        store.remove("i", &local());
        assert_eq!(store.size(), 0);
        assert!(store.get("i").is_none());
    }

    #[test]
    fn test_holder_survives_partial_removal() {
        let store = MultiSourcedDataStore::new();
        store.update(info("i", Status::Up), local());
        store.update(info("i", Status::Down), replicated());

        store.remove("i", &local());
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("i").unwrap().source_count(), 1);
    }

    #[test]
    fn test_registration_lifecycle_scenario() {
        // Empty store -> update(I1, LOCAL) -> [Add(I1)], size 1.
        let store = MultiSourcedDataStore::new();
        let i1 = info("i", Status::Up);
        let out = store.update(i1.clone(), local());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].notification, ChangeNotification::Add(i1));
        assert_eq!(store.size(), 1);

        // Same id from a lower-priority source: no visible change, both
        // sources retained.
        let i1_replica = info("i", Status::Down);
        let out = store.update(i1_replica.clone(), replicated());
        assert!(out.is_empty());
        assert_eq!(store.get("i").unwrap().source_count(), 2);

        // Dropping LOCAL exposes the replica copy.
        let out = store.remove("i", &local());
        assert_eq!(out.len(), 1);
        match &out[0].notification {
            ChangeNotification::Modify { data, .. } => assert_eq!(data, &i1_replica),
            other => panic!("expected modify, got {:?}", other.kind()),
        }
        assert_eq!(store.size(), 1);

        // Dropping the last source deletes the instance.
        let out = store.remove("i", &replicated());
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].notification,
            ChangeNotification::Delete(i1_replica)
        );
        assert_eq!(store.size(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_distinct_ids() {
        let store = Arc::new(MultiSourcedDataStore::new());
        let mut handles = Vec::new();
        for batch in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store.update(
                        info(&format!("i-{batch}-{i}"), Status::Up),
                        Source::local(format!("node-{batch}")),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.size(), 200);
    }
}
