// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Switchable stream breaker.
//!
//! A [`BreakerSwitch`] lets one component stream inside a merged aggregate
//! be closed independently, without terminating the aggregate. The
//! forwarding task watches the switch and stops pumping when it flips.

use tokio::sync::watch;

/// One-shot close switch observed by a forwarding task.
#[derive(Debug)]
pub struct BreakerSwitch {
    tx: watch::Sender<bool>,
}

impl Default for BreakerSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerSwitch {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for the forwarding task's `select!` arm.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip the switch; observers stop forwarding. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}
