// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pausable ordered relay.
//!
//! The relay sits between a live notification feed and one subscriber
//! channel. It is created paused: notifications are buffered in arrival
//! order while the subscriber replays its initial snapshot. [`resume`]
//! drains the buffer into the channel and switches to pass-through.
//!
//! The whole state machine lives behind one mutex, so a drain in progress
//! and a concurrent live send share a critical section; a send can never
//! slip past buffered notifications or be delivered twice.
//!
//! [`resume`]: PausableRelay::resume

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::ChangeNotification;

/// Delivery mode of a [`PausableRelay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Holding live notifications while the snapshot replays.
    Buffering,
    /// Flushing the buffer on resume.
    Draining,
    /// Forwarding directly to the subscriber channel.
    PassThrough,
}

#[derive(Debug)]
struct RelayState {
    mode: RelayMode,
    buffer: VecDeque<ChangeNotification>,
    /// Set once the subscriber channel is gone; further sends are dropped.
    disconnected: bool,
}

/// Buffers notifications while paused, releases them in arrival order on
/// resume.
#[derive(Debug)]
pub struct PausableRelay {
    tx: mpsc::UnboundedSender<ChangeNotification>,
    state: Mutex<RelayState>,
}

impl PausableRelay {
    /// A new relay in [`RelayMode::Buffering`], feeding `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ChangeNotification>) -> Self {
        Self {
            tx,
            state: Mutex::new(RelayState {
                mode: RelayMode::Buffering,
                buffer: VecDeque::new(),
                disconnected: false,
            }),
        }
    }

    #[must_use]
    pub fn mode(&self) -> RelayMode {
        self.state.lock().mode
    }

    /// Buffered notification count (zero once pass-through).
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Forward or buffer `notification`.
    ///
    /// Returns `false` once the subscriber side is gone; the caller should
    /// drop the relay.
    pub fn send(&self, notification: ChangeNotification) -> bool {
        let mut state = self.state.lock();
        if state.disconnected {
            return false;
        }
        match state.mode {
            RelayMode::Buffering | RelayMode::Draining => {
                state.buffer.push_back(notification);
                true
            }
            RelayMode::PassThrough => {
                if self.tx.send(notification).is_err() {
                    state.disconnected = true;
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Drain the buffer in FIFO order, then switch to pass-through.
    ///
    /// Idempotent; resuming an already pass-through relay is a no-op.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.mode == RelayMode::PassThrough || state.disconnected {
            return;
        }
        state.mode = RelayMode::Draining;
        while let Some(notification) = state.buffer.pop_front() {
            if self.tx.send(notification).is_err() {
                state.disconnected = true;
                state.buffer.clear();
                break;
            }
        }
        state.mode = RelayMode::PassThrough;
    }
}
