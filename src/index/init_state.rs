// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Compacted initial state for an index.
//!
//! The holder receives every notification its index receives and keeps only
//! what a brand-new subscriber needs to reconstruct current state: one
//! `Add` with the latest record per live instance, in first-seen order. A
//! `Delete` cancels the entry outright; an `Add` after a `Delete` starts a
//! fresh one. `Modify` is folded into the stored `Add` so the replayed
//! snapshot is self-contained.
//!
//! Termination empties the holder for good: a terminated index replays
//! nothing, and the live stream is the one that tells subscribers the story
//! is over.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::model::ChangeNotification;

#[derive(Debug, Default)]
struct InitState {
    entries: IndexMap<String, ChangeNotification>,
    done: bool,
}

/// Mutable accumulator producing the compacted snapshot replayed to each
/// new subscriber.
#[derive(Debug, Default)]
pub struct InitStateHolder {
    state: Mutex<InitState>,
}

impl InitStateHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `notification` into the compacted state.
    ///
    /// Structural markers are not part of reconstructable state and are
    /// skipped.
    pub fn add_notification(&self, notification: &ChangeNotification) {
        let mut state = self.state.lock();
        if state.done {
            return;
        }
        match notification {
            ChangeNotification::Add(data) | ChangeNotification::Modify { data, .. } => {
                state
                    .entries
                    .insert(data.id.clone(), ChangeNotification::Add(data.clone()));
            }
            ChangeNotification::Delete(data) => {
                // shift_remove keeps first-seen order for the survivors.
                state.entries.shift_remove(&data.id);
            }
            ChangeNotification::BufferSentinel => {}
        }
    }

    /// The compacted `Add` notifications, in first-seen order.
    #[must_use]
    pub fn compacted(&self) -> Vec<ChangeNotification> {
        let state = self.state.lock();
        if state.done {
            return Vec::new();
        }
        state.entries.values().cloned().collect()
    }

    /// The replayable snapshot: compacted adds closed by one
    /// [`ChangeNotification::BufferSentinel`]. Empty after termination.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChangeNotification> {
        let state = self.state.lock();
        if state.done {
            return Vec::new();
        }
        let mut out: Vec<ChangeNotification> = state.entries.values().cloned().collect();
        out.push(ChangeNotification::BufferSentinel);
        out
    }

    /// Mark the upstream as finished and drop accumulated state.
    pub fn terminate(&self) {
        let mut state = self.state.lock();
        state.done = true;
        state.entries.clear();
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
