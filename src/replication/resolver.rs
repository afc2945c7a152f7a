// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Peer address resolution.
//!
//! The replication service follows a stream of [`PeerUpdate`]s rather than
//! a fixed list, so cluster membership can change at runtime. Providers:
//!
//! - [`StaticPeerProvider`] announces a fixed set once and stays quiet.
//! - [`PollingPeerProvider`] reloads through a [`PeerListLoader`] on a fixed
//!   period and diffs consecutive results into adds/removes.
//!
//! Load failures follow the resource-loader rule: a failure *before the
//! first successful load* is terminal (the configuration is broken, there is
//! nothing to fall back to); a failure after a success is logged and the
//! next scheduled reload proceeds with the last known membership in place.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::resilience::{retry, RetryConfig};

use super::transport::PeerAddress;

/// Cluster membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerUpdate {
    Add(PeerAddress),
    Remove(PeerAddress),
}

/// Peer resolution failures.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// One reload attempt failed; recoverable once a first load succeeded.
    #[error("peer list load failed: {0}")]
    Load(String),

    /// Resolution failed before anything was ever resolved; delivered
    /// in-band as the stream's terminal item.
    #[error("peer resolution failed before first success: {0}")]
    Terminal(String),
}

/// Stream of membership updates; ends after a terminal error or when the
/// provider is dropped.
pub type PeerUpdateStream = mpsc::UnboundedReceiver<Result<PeerUpdate, ResolverError>>;

/// Source of cluster membership updates.
pub trait PeerAddressProvider: Send + Sync {
    fn subscribe(&self) -> PeerUpdateStream;
}

/// Loads the full peer list; wrapped by [`PollingPeerProvider`].
#[async_trait]
pub trait PeerListLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<PeerAddress>, ResolverError>;
}

/// A fixed peer set, announced once per subscription.
///
/// The stream stays open for the provider's lifetime, so the replication
/// service keeps listening (and a later provider swap is a drop + resubscribe).
pub struct StaticPeerProvider {
    peers: Vec<PeerAddress>,
    open: Mutex<Vec<mpsc::UnboundedSender<Result<PeerUpdate, ResolverError>>>>,
}

impl StaticPeerProvider {
    #[must_use]
    pub fn new(peers: Vec<PeerAddress>) -> Self {
        Self {
            peers,
            open: Mutex::new(Vec::new()),
        }
    }
}

impl PeerAddressProvider for StaticPeerProvider {
    fn subscribe(&self) -> PeerUpdateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        for peer in &self.peers {
            let _ = tx.send(Ok(PeerUpdate::Add(peer.clone())));
        }
        self.open.lock().push(tx);
        rx
    }
}

/// Periodically reloads membership through a [`PeerListLoader`].
pub struct PollingPeerProvider {
    loader: Arc<dyn PeerListLoader>,
    refresh: Duration,
}

impl PollingPeerProvider {
    pub fn new(loader: Arc<dyn PeerListLoader>, refresh: Duration) -> Self {
        Self { loader, refresh }
    }
}

impl PeerAddressProvider for PollingPeerProvider {
    fn subscribe(&self) -> PeerUpdateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let loader = self.loader.clone();
        let refresh = self.refresh;

        tokio::spawn(async move {
            let mut known: BTreeSet<PeerAddress> = BTreeSet::new();
            let mut had_success = false;

            loop {
                let loaded = retry("peer_list_load", &RetryConfig::resolver(), || {
                    let loader = loader.clone();
                    async move { loader.load().await }
                })
                .await;

                match loaded {
                    Ok(list) => {
                        had_success = true;
                        let next: BTreeSet<PeerAddress> = list.into_iter().collect();
                        for removed in known.difference(&next) {
                            let _ = tx.send(Ok(PeerUpdate::Remove(removed.clone())));
                        }
                        for added in next.difference(&known) {
                            let _ = tx.send(Ok(PeerUpdate::Add(added.clone())));
                        }
                        known = next;
                    }
                    Err(err) if !had_success => {
                        error!(%err, "peer resolution failed before first success");
                        let _ = tx.send(Err(ResolverError::Terminal(err.to_string())));
                        return;
                    }
                    Err(err) => {
                        warn!(%err, "peer list reload failed; keeping last known membership");
                    }
                }

                tokio::time::sleep(refresh).await;
                if tx.is_closed() {
                    debug!("peer update stream dropped; stopping resolver");
                    return;
                }
            }
        });

        rx
    }
}
