// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-channel interest multiplexer.
//!
//! A subscriber channel holds one [`InterestNotificationMultiplexer`] and
//! upgrades its interest set through it. [`update`] computes the symmetric
//! difference against the currently active atomic interests: dropped
//! interests have their breaker closed (ending that component stream
//! without touching the rest), new interests get a registry subscription
//! forwarded into the shared aggregate.
//!
//! The aggregate stream never completes on its own — component streams may
//! come and go across upgrades, but only [`unregister`] ends the channel's
//! view. The multiplexer is channel-scoped and single-threaded from its
//! owner's perspective; it is not meant to be driven from multiple threads.
//!
//! [`update`]: InterestNotificationMultiplexer::update
//! [`unregister`]: InterestNotificationMultiplexer::unregister

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::index::SubscribeError;
use crate::model::{ChangeNotification, Interest, MultipleInterests};
use crate::registry::ServiceRegistry;

use super::breaker::BreakerSwitch;

/// Channel-level protocol errors; local synchronous rejections, never fatal
/// to the process.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel already unregistered")]
    Closed,
    #[error("notification stream already claimed")]
    StreamAlreadyClaimed,
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
}

struct ActiveInterest {
    breaker: BreakerSwitch,
    _forwarder: JoinHandle<()>,
}

/// Multiplexes a mutable set of interest subscriptions into one aggregate
/// notification stream.
pub struct InterestNotificationMultiplexer {
    registry: Arc<ServiceRegistry>,
    active: HashMap<Interest, ActiveInterest>,
    aggregate_tx: Option<mpsc::UnboundedSender<ChangeNotification>>,
    aggregate_rx: Option<mpsc::UnboundedReceiver<ChangeNotification>>,
}

impl InterestNotificationMultiplexer {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            active: HashMap::new(),
            aggregate_tx: Some(tx),
            aggregate_rx: Some(rx),
        }
    }

    /// Swap the observed interest set atomically from this channel's point
    /// of view: interests no longer wanted are closed, newly wanted ones are
    /// subscribed, unchanged ones keep their stream untouched.
    pub fn update(&mut self, interests: &MultipleInterests) -> Result<(), ChannelError> {
        let Some(aggregate_tx) = self.aggregate_tx.clone() else {
            return Err(ChannelError::Closed);
        };

        let to_remove: Vec<Interest> = self
            .active
            .keys()
            .filter(|current| !interests.contains(current))
            .cloned()
            .collect();
        for interest in to_remove {
            if let Some(active) = self.active.remove(&interest) {
                debug!(interest = interest.kind_label(), "closing dropped interest");
                active.breaker.close();
            }
        }

        for interest in interests.flatten() {
            if self.active.contains_key(interest) {
                continue;
            }
            let mut subscription = self.registry.for_interest(interest.clone())?;
            let breaker = BreakerSwitch::new();
            let mut closed = breaker.watch();
            let tx = aggregate_tx.clone();
            let forwarder = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = closed.changed() => {
                            if changed.is_err() || *closed.borrow() {
                                break;
                            }
                        }
                        notification = subscription.recv() => {
                            match notification {
                                Some(n) => {
                                    if tx.send(n).is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                }
            });
            self.active.insert(
                interest.clone(),
                ActiveInterest {
                    breaker,
                    _forwarder: forwarder,
                },
            );
        }
        Ok(())
    }

    /// Claim the aggregate stream. The channel subscribes exactly once,
    /// before registering any interest; a second claim is a protocol error.
    pub fn change_notifications(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<ChangeNotification>, ChannelError> {
        if self.aggregate_tx.is_none() {
            return Err(ChannelError::Closed);
        }
        self.aggregate_rx
            .take()
            .ok_or(ChannelError::StreamAlreadyClaimed)
    }

    /// Currently active atomic interests.
    #[must_use]
    pub fn active_interests(&self) -> Vec<Interest> {
        self.active.keys().cloned().collect()
    }

    /// Close every breaker, clear state, and complete the aggregate stream.
    /// The only path to termination.
    pub fn unregister(&mut self) {
        for (_, active) in self.active.drain() {
            active.breaker.close();
        }
        self.aggregate_tx = None;
    }
}

impl Drop for InterestNotificationMultiplexer {
    fn drop(&mut self) {
        self.unregister();
    }
}
