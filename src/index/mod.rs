// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-interest indexes: ordered merge of snapshot and live updates.
//!
//! An [`Index`] is the delivery engine for one atomic interest. It receives
//! the registry's full change feed, keeps only notifications its interest
//! (and source scope) accepts, folds them into an [`InitStateHolder`], and
//! fans them out to per-subscriber [`PausableRelay`]s.
//!
//! A new subscription observes, in order: every compacted snapshot
//! notification, one buffer sentinel, then every live notification in
//! arrival order — nothing skipped, nothing duplicated. The guarantee holds
//! because snapshot capture and relay registration happen in one critical
//! section shared with publishing, and the relay buffers everything that
//! arrives while the snapshot replays.
//!
//! ```text
//! subscribe ──► [snapshot capture + relay attach]   (locked with publish)
//!                    │
//!                    ▼
//!            replay snapshot ──► resume relay ──► pass-through
//!                                   (drains buffered live updates FIFO)
//! ```

pub mod init_state;
pub mod registry;
pub mod relay;

pub use init_state::InitStateHolder;
pub use registry::IndexRegistry;
pub use relay::{PausableRelay, RelayMode};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::{
    ChangeNotification, InstanceInfo, Interest, InterestMatcher, InvalidPatternError, Source,
    SourceMatcher, SourcedNotification,
};

/// Why a subscription could not be created.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("registry is shut down")]
    Shutdown,
    #[error(transparent)]
    InvalidPattern(#[from] InvalidPatternError),
    #[error("empty composite interest")]
    EmptyComposite,
}

#[derive(Debug, Default)]
struct IndexState {
    relays: Vec<(u64, Arc<PausableRelay>)>,
    done: bool,
}

/// The per-interest merge of an initial-state source and the live feed.
pub struct Index {
    matcher: InterestMatcher,
    scope: SourceMatcher,
    init: InitStateHolder,
    state: Mutex<IndexState>,
    next_relay_id: AtomicU64,
}

impl Index {
    pub fn new(matcher: InterestMatcher, scope: SourceMatcher) -> Self {
        Self {
            matcher,
            scope,
            init: InitStateHolder::new(),
            state: Mutex::new(IndexState::default()),
            next_relay_id: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn interest(&self) -> &Interest {
        self.matcher.interest()
    }

    /// Pre-load the initial state from a registry snapshot of effective
    /// `(source, record)` entries. Entries the interest predicate or source
    /// scope rejects are skipped; existing subscribers (there are none at
    /// creation time) are not notified.
    pub fn seed<'a>(&self, records: impl IntoIterator<Item = &'a (Source, InstanceInfo)>) {
        let _guard = self.state.lock();
        for (source, record) in records {
            if self.matcher.matches(record) && self.scope.matches(source) {
                self.init
                    .add_notification(&ChangeNotification::Add(record.clone()));
            }
        }
    }

    /// Feed one notification from the shared upstream.
    ///
    /// Data notifications pass only if the interest predicate and source
    /// scope accept them; structural markers always pass.
    pub fn publish(&self, sourced: &SourcedNotification) {
        if let Some(data) = sourced.notification.data() {
            if !self.matcher.matches(data) || !self.scope.matches(&sourced.source) {
                return;
            }
        }
        let mut state = self.state.lock();
        if state.done {
            return;
        }
        // Init state first: a subscriber arriving next must find this
        // notification in the snapshot, not lose it.
        self.init.add_notification(&sourced.notification);
        state
            .relays
            .retain(|(_, relay)| relay.send(sourced.notification.clone()));
    }

    /// Attach a subscriber channel: capture the snapshot and register a
    /// paused relay atomically, replay, then resume.
    pub fn subscribe(self: &Arc<Self>) -> InterestSubscription {
        let (rx, guard) = self.subscribe_raw();
        InterestSubscription {
            rx,
            dedup: None,
            _guards: vec![guard],
        }
    }

    pub(crate) fn subscribe_raw(
        self: &Arc<Self>,
    ) -> (mpsc::UnboundedReceiver<ChangeNotification>, SubscriptionGuard) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Arc::new(PausableRelay::new(tx.clone()));
        let relay_id = self.next_relay_id.fetch_add(1, Ordering::Relaxed);

        let snapshot = {
            let mut state = self.state.lock();
            if state.done {
                // Completed index: drop the only senders so the stream ends
                // immediately.
                return (
                    rx,
                    SubscriptionGuard {
                        index: self.clone(),
                        relay_id,
                    },
                );
            }
            let snapshot = self.init.snapshot();
            state.relays.push((relay_id, relay.clone()));
            snapshot
        };

        for notification in snapshot {
            if tx.send(notification).is_err() {
                break;
            }
        }
        relay.resume();

        (
            rx,
            SubscriptionGuard {
                index: self.clone(),
                relay_id,
            },
        )
    }

    /// Attach an externally owned relay (composite subscriptions share one
    /// relay across component indexes). The caller is responsible for
    /// snapshot replay and resume, and for serializing this call against
    /// [`publish`](Self::publish).
    pub(crate) fn attach_relay(
        self: &Arc<Self>,
        relay: Arc<PausableRelay>,
    ) -> Option<SubscriptionGuard> {
        let mut state = self.state.lock();
        if state.done {
            return None;
        }
        let relay_id = self.next_relay_id.fetch_add(1, Ordering::Relaxed);
        state.relays.push((relay_id, relay));
        Some(SubscriptionGuard {
            index: self.clone(),
            relay_id,
        })
    }

    pub(crate) fn remove_relay(&self, relay_id: u64) {
        let mut state = self.state.lock();
        state.relays.retain(|(id, _)| *id != relay_id);
    }

    /// Complete every subscriber stream and drop accumulated state.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.done = true;
        state.relays.clear();
        self.init.terminate();
        debug!(interest = %self.matcher.interest().kind_label(), "index completed");
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().relays.len()
    }

    #[must_use]
    pub fn init_state(&self) -> &InitStateHolder {
        &self.init
    }
}

/// Releases the relay registration when a subscription is dropped.
pub(crate) struct SubscriptionGuard {
    index: Arc<Index>,
    relay_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.index.remove_relay(self.relay_id);
    }
}

/// A live notification stream for one interest (or interest union).
///
/// The stream ends (`recv` returns `None`) only when the owning index
/// completes or the subscription is dropped. Dropping the subscription
/// synchronously releases its relay.
pub struct InterestSubscription {
    rx: mpsc::UnboundedReceiver<ChangeNotification>,
    /// Composite subscriptions de-duplicate across overlapping components:
    /// last delivered notification per instance id.
    dedup: Option<HashMap<String, ChangeNotification>>,
    _guards: Vec<SubscriptionGuard>,
}

impl InterestSubscription {
    /// Next notification, or `None` once the stream has completed.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        loop {
            let notification = self.rx.recv().await?;
            if self.deliverable(&notification) {
                return Some(notification);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ChangeNotification> {
        loop {
            let notification = self.rx.try_recv().ok()?;
            if self.deliverable(&notification) {
                return Some(notification);
            }
        }
    }

    fn deliverable(&mut self, notification: &ChangeNotification) -> bool {
        let Some(seen) = self.dedup.as_mut() else {
            return true;
        };
        let Some(data) = notification.data() else {
            return true;
        };
        match notification {
            ChangeNotification::Delete(_) => seen.remove(&data.id).is_some(),
            _ => {
                if seen.get(&data.id) == Some(notification) {
                    return false;
                }
                seen.insert(data.id.clone(), notification.clone());
                true
            }
        }
    }

    pub(crate) fn composite(
        rx: mpsc::UnboundedReceiver<ChangeNotification>,
        guards: Vec<SubscriptionGuard>,
    ) -> Self {
        Self {
            rx,
            dedup: Some(HashMap::new()),
            _guards: guards,
        }
    }
}
