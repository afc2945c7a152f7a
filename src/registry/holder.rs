// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-instance multi-source reconciliation.
//!
//! A [`MultiSourcedDataHolder`] owns every source's last-known copy of one
//! logical instance and derives the single *effective* record the rest of
//! the system sees. The effective copy is the one from the
//! highest-priority origin (`Local > Replicated > Bootstrap > Interested`);
//! within a tier the most recent write wins.
//!
//! Every mutation returns the externally visible notifications it implies —
//! possibly none when a losing source changed, a `Modify` when the winner's
//! record moved, a `Delete` only when the last source is gone and the
//! instance logically disappears.
//!
//! Mutations on one holder are serialized by its internal lock; holders for
//! different ids are fully independent.

use parking_lot::Mutex;

use crate::model::{
    ChangeNotification, InstanceInfo, Source, SourceMatcher, SourcedNotification,
};

#[derive(Debug)]
struct Entry {
    source: Source,
    data: InstanceInfo,
    /// Write stamp from the holder's counter; breaks priority ties in favor
    /// of the most recent write.
    seq: u64,
}

#[derive(Debug, Default)]
struct HolderState {
    entries: Vec<Entry>,
    effective: Option<(Source, InstanceInfo)>,
    next_seq: u64,
}

impl HolderState {
    fn winner(&self) -> Option<&Entry> {
        self.entries
            .iter()
            .min_by_key(|e| (e.source.origin.priority(), std::cmp::Reverse(e.seq)))
    }
}

/// Reconciles concurrent per-source views of one instance id.
#[derive(Debug)]
pub struct MultiSourcedDataHolder {
    id: String,
    state: Mutex<HolderState>,
}

impl MultiSourcedDataHolder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(HolderState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record `data` under `source` and return the implied notifications.
    pub fn update(&self, source: Source, data: InstanceInfo) -> Vec<SourcedNotification> {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;

        if let Some(entry) = state.entries.iter_mut().find(|e| e.source == source) {
            entry.data = data;
            entry.seq = seq;
        } else {
            state.entries.push(Entry { source, data, seq });
        }

        Self::settle(&mut state)
    }

    /// Forget `source`'s copy and return the implied notifications.
    ///
    /// Removing a source that was never recorded implies nothing.
    pub fn remove(&self, source: &Source) -> Vec<SourcedNotification> {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.source != *source);
        if state.entries.len() == before {
            return Vec::new();
        }
        Self::settle(&mut state)
    }

    /// Recompute the effective record and derive the external notification.
    fn settle(state: &mut HolderState) -> Vec<SourcedNotification> {
        let winner = state
            .winner()
            .map(|e| (e.source.clone(), e.data.clone()));

        let notifications = match (&state.effective, &winner) {
            (None, None) => Vec::new(),
            (None, Some((source, data))) => vec![SourcedNotification::new(
                source.clone(),
                ChangeNotification::Add(data.clone()),
            )],
            (Some((source, data)), None) => vec![SourcedNotification::new(
                source.clone(),
                ChangeNotification::Delete(data.clone()),
            )],
            (Some((_, old)), Some((source, new))) => {
                if old == new {
                    Vec::new()
                } else {
                    vec![SourcedNotification::new(
                        source.clone(),
                        ChangeNotification::Modify {
                            data: new.clone(),
                            deltas: InstanceInfo::diff(old, new),
                        },
                    )]
                }
            }
        };

        state.effective = winner;
        notifications
    }

    /// The current reconciled record, if any source remains.
    #[must_use]
    pub fn effective(&self) -> Option<InstanceInfo> {
        self.state.lock().effective.as_ref().map(|(_, d)| d.clone())
    }

    /// The effective record together with the source that owns it, read
    /// under one lock.
    #[must_use]
    pub fn effective_entry(&self) -> Option<(Source, InstanceInfo)> {
        self.state.lock().effective.clone()
    }

    /// The source owning the effective record.
    #[must_use]
    pub fn effective_source(&self) -> Option<Source> {
        self.state.lock().effective.as_ref().map(|(s, _)| s.clone())
    }

    /// `source`'s own copy, regardless of who wins.
    #[must_use]
    pub fn get(&self, source: &Source) -> Option<InstanceInfo> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|e| e.source == *source)
            .map(|e| e.data.clone())
    }

    /// Sources currently holding a copy that `matcher` accepts.
    #[must_use]
    pub fn matching_sources(&self, matcher: &SourceMatcher) -> Vec<Source> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| matcher.matches(&e.source))
            .map(|e| e.source.clone())
            .collect()
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True once every source is gone; the store purges empty holders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
