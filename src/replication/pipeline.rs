// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sender-side replication pipeline.
//!
//! One pipeline runs per peer, as an ordered sequence of stages:
//! connect → handshake → loop detection → streaming. A transport failure in
//! any stage tears the attempt down and reconnects after a fixed delay; a
//! detected replication loop ends the pipeline for good (the service then
//! drops the peer), and cancellation through the shutdown watch wins over
//! everything.
//!
//! While streaming, the pipeline forwards the registry's local-origin
//! full-registry feed and interleaves heartbeats on a fixed period so a
//! silently dead link is noticed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::metrics;
use crate::model::{Interest, Origin, SourceMatcher};
use crate::model::Source;
use crate::registry::ServiceRegistry;

use super::protocol::{
    ReplicationClientHello, ReplicationError, ReplicationMessage,
};
use super::transport::{PeerAddress, ReplicationTransport};

/// Why a peer pipeline stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// The peer declared our own identity; it must leave the peer set.
    LoopDetected,
    /// A non-retryable protocol violation.
    Failed,
    /// Cancelled through the shutdown watch.
    Cancelled,
    /// The registry feed completed (engine shutdown).
    Completed,
}

enum AttemptEnd {
    Cancelled,
    StreamEnded,
}

/// Drive the pipeline for one peer until it exits.
pub async fn run_peer_pipeline(
    registry: Arc<ServiceRegistry>,
    self_source: Source,
    transport: Arc<dyn ReplicationTransport>,
    peer: PeerAddress,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> PipelineExit {
    loop {
        let attempt = run_attempt(
            &registry,
            &self_source,
            transport.as_ref(),
            &peer,
            heartbeat_interval,
            &mut shutdown,
        )
        .await;

        match attempt {
            Ok(AttemptEnd::Cancelled) => return PipelineExit::Cancelled,
            Ok(AttemptEnd::StreamEnded) => {
                info!(%peer, "local feed completed; replication pipeline done");
                return PipelineExit::Completed;
            }
            Err(err @ ReplicationError::Loop { .. }) => {
                warn!(%peer, %err, "removing peer from replication pool");
                metrics::record_replication_event("loop_rejected");
                return PipelineExit::LoopDetected;
            }
            Err(err) if err.is_retryable() => {
                warn!(%peer, %err, delay = ?reconnect_delay, "replication link lost; reconnecting");
                metrics::record_replication_event("retry");
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return PipelineExit::Cancelled;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(%peer, %err, "replication pipeline failed and will not be retried");
                return PipelineExit::Failed;
            }
        }
    }
}

async fn run_attempt(
    registry: &Arc<ServiceRegistry>,
    self_source: &Source,
    transport: &dyn ReplicationTransport,
    peer: &PeerAddress,
    heartbeat_interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<AttemptEnd, ReplicationError> {
    if *shutdown.borrow() {
        return Ok(AttemptEnd::Cancelled);
    }

    let mut connection = transport.connect(peer).await?;

    // Handshake: announce ourselves, then vet the peer's declared identity.
    connection
        .send(ReplicationMessage::ClientHello(ReplicationClientHello {
            source: self_source.clone(),
            registry_size: registry.size(),
        }))
        .await?;

    let reply = connection.recv().await?;
    let server_source = match reply {
        ReplicationMessage::ServerHello(hello) => hello.source,
        other => {
            return Err(ReplicationError::UnexpectedMessage {
                phase: "handshake",
                got: other.label(),
            })
        }
    };
    if server_source.name == self_source.name {
        return Err(ReplicationError::Loop {
            peer: server_source.name,
        });
    }

    info!(%peer, peer_identity = %server_source, "replication link established");
    metrics::record_replication_event("connected");

    // Stream everything this node is authoritative for. Each (re)connect
    // starts from a fresh snapshot; the receiving holder absorbs unchanged
    // records silently, so replays converge instead of flapping.
    let mut subscription = match registry
        .for_interest_scoped(Interest::for_full_registry(), SourceMatcher::ForOrigin(Origin::Local))
    {
        Ok(subscription) => subscription,
        Err(_) => return Ok(AttemptEnd::StreamEnded),
    };

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(AttemptEnd::Cancelled);
                }
            }
            _ = heartbeat.tick() => {
                connection.send(ReplicationMessage::Heartbeat).await?;
                metrics::record_replication_event("heartbeat");
            }
            notification = subscription.recv() => {
                match notification {
                    Some(n) => connection.send(ReplicationMessage::Change(n)).await?,
                    None => return Ok(AttemptEnd::StreamEnded),
                }
            }
        }
    }
}
