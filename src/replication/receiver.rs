// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Receiver side of a replication link.
//!
//! The acceptor answers the sender's hello with this node's identity,
//! rejects self-replication, then applies every incoming change to the
//! registry tagged as replicated data from that peer. Heartbeats double as
//! a liveness deadline: a link that goes quiet is declared dead, and either
//! way the peer's entries are evicted when the link ends, so a vanished
//! peer cannot leave ghosts behind.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::model::{ChangeNotification, Origin, Source, SourceMatcher};
use crate::registry::ServiceRegistry;

use super::protocol::{
    ReplicationError, ReplicationMessage, ReplicationServerHello,
};
use super::transport::ReplicationConnection;

/// Serves inbound replication links against the local registry.
pub struct ReplicationAcceptor {
    registry: Arc<ServiceRegistry>,
    self_source: Source,
    /// Deadline for hearing *anything* from the sender; derived from the
    /// heartbeat interval and missed allowance.
    liveness_deadline: Duration,
}

impl ReplicationAcceptor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        self_source: Source,
        liveness_deadline: Duration,
    ) -> Self {
        Self {
            registry,
            self_source,
            liveness_deadline,
        }
    }

    /// Drive one inbound connection to completion.
    ///
    /// Returns `Ok(())` on a clean peer disconnect; in every case the
    /// peer's replicated entries are evicted once the link is gone.
    pub async fn serve(
        &self,
        mut connection: Box<dyn ReplicationConnection>,
    ) -> Result<(), ReplicationError> {
        let hello = match self.recv_within_deadline(&mut connection).await? {
            ReplicationMessage::ClientHello(hello) => hello,
            other => {
                return Err(ReplicationError::UnexpectedMessage {
                    phase: "handshake",
                    got: other.label(),
                })
            }
        };

        if hello.source.name == self.self_source.name {
            warn!(peer = %hello.source, "rejecting replication link from ourselves");
            metrics::record_replication_event("loop_rejected");
            return Err(ReplicationError::Loop {
                peer: hello.source.name,
            });
        }

        connection
            .send(ReplicationMessage::ServerHello(ReplicationServerHello {
                source: self.self_source.clone(),
            }))
            .await?;
        info!(
            peer = %hello.source,
            peer_registry_size = hello.registry_size,
            "accepted replication link"
        );
        metrics::record_replication_event("accepted");

        let peer_source = Source::new(
            Origin::Replicated,
            hello.source.name.clone(),
            hello.source.id.clone(),
        );

        let outcome = self.stream(&mut connection, &peer_source).await;

        // The link is gone, cleanly or not: drop everything the peer
        // sourced so a dead peer's instances do not linger.
        let evicted = self.registry.evict_all(&SourceMatcher::ForOriginAndName(
            Origin::Replicated,
            peer_source.name.clone(),
        ));
        info!(peer = %peer_source, evicted, "replication link ended");
        metrics::record_replication_event("disconnected");

        match outcome {
            Err(ReplicationError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn stream(
        &self,
        connection: &mut Box<dyn ReplicationConnection>,
        peer_source: &Source,
    ) -> Result<(), ReplicationError> {
        loop {
            match self.recv_within_deadline(connection).await? {
                ReplicationMessage::Heartbeat => {
                    metrics::record_replication_event("heartbeat_received");
                }
                ReplicationMessage::Change(change) => match change {
                    ChangeNotification::Add(data)
                    | ChangeNotification::Modify { data, .. } => {
                        self.registry.update(data, peer_source.clone());
                    }
                    ChangeNotification::Delete(data) => {
                        self.registry.remove(&data.id, peer_source);
                    }
                    ChangeNotification::BufferSentinel => {
                        debug!(peer = %peer_source, "snapshot segment complete");
                    }
                },
                other => {
                    warn!(peer = %peer_source, got = other.label(), "unexpected message mid-stream");
                    return Err(ReplicationError::UnexpectedMessage {
                        phase: "streaming",
                        got: other.label(),
                    });
                }
            }
        }
    }

    async fn recv_within_deadline(
        &self,
        connection: &mut Box<dyn ReplicationConnection>,
    ) -> Result<ReplicationMessage, ReplicationError> {
        match timeout(self.liveness_deadline, connection.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ReplicationError::HeartbeatMissed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceInfo, Status};
    use crate::replication::protocol::ReplicationClientHello;
    use crate::replication::transport::memory::MemoryConnection;

    fn info(id: &str, status: Status) -> InstanceInfo {
        InstanceInfo::builder(id).app("app").status(status).build()
    }

    fn acceptor(registry: &Arc<ServiceRegistry>, deadline: Duration) -> ReplicationAcceptor {
        ReplicationAcceptor::new(registry.clone(), Source::local("node-b"), deadline)
    }

    async fn handshake(sender: &mut MemoryConnection, name: &str) {
        sender
            .send(ReplicationMessage::ClientHello(ReplicationClientHello {
                source: Source::new(Origin::Replicated, name, format!("{name}/0")),
                registry_size: 0,
            }))
            .await
            .unwrap();
        match sender.recv().await.unwrap() {
            ReplicationMessage::ServerHello(hello) => {
                assert_eq!(hello.source.name, "node-b");
            }
            other => panic!("expected server hello, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_applies_changes_and_evicts_on_disconnect() {
        let registry = Arc::new(ServiceRegistry::new());
        let (mut sender, receiver_end) = MemoryConnection::pair();
        let acceptor = acceptor(&registry, Duration::from_secs(5));
        let serving =
            tokio::spawn(async move { acceptor.serve(Box::new(receiver_end)).await });

        handshake(&mut sender, "node-a").await;
        sender
            .send(ReplicationMessage::Change(ChangeNotification::Add(info(
                "i1",
                Status::Up,
            ))))
            .await
            .unwrap();
        sender
            .send(ReplicationMessage::Change(ChangeNotification::Modify {
                data: info("i1", Status::Down),
                deltas: vec![],
            }))
            .await
            .unwrap();

        // Wait until the update lands.
        while registry.get("i1").map(|i| i.status) != Some(Status::Down) {
            tokio::task::yield_now().await;
        }

        drop(sender);
        serving.await.unwrap().unwrap();
        // Disconnect evicted the replicated entry.
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_applied() {
        let registry = Arc::new(ServiceRegistry::new());
        let (mut sender, receiver_end) = MemoryConnection::pair();
        let acceptor = acceptor(&registry, Duration::from_secs(5));
        let serving =
            tokio::spawn(async move { acceptor.serve(Box::new(receiver_end)).await });

        handshake(&mut sender, "node-a").await;
        let record = info("i1", Status::Up);
        sender
            .send(ReplicationMessage::Change(ChangeNotification::Add(
                record.clone(),
            )))
            .await
            .unwrap();
        sender
            .send(ReplicationMessage::Change(ChangeNotification::Delete(
                record,
            )))
            .await
            .unwrap();

        while registry.size() != 0 {
            tokio::task::yield_now().await;
        }

        drop(sender);
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejects_own_identity() {
        let registry = Arc::new(ServiceRegistry::new());
        let (mut sender, receiver_end) = MemoryConnection::pair();
        let acceptor = acceptor(&registry, Duration::from_secs(5));
        let serving =
            tokio::spawn(async move { acceptor.serve(Box::new(receiver_end)).await });

        sender
            .send(ReplicationMessage::ClientHello(ReplicationClientHello {
                // Same node name as the acceptor: a loop through an alias.
                source: Source::new(Origin::Replicated, "node-b", "node-b/0"),
                registry_size: 0,
            }))
            .await
            .unwrap();

        let result = serving.await.unwrap();
        assert!(matches!(result, Err(ReplicationError::Loop { .. })));
    }

    #[tokio::test]
    async fn test_quiet_link_is_declared_dead_and_evicted() {
        let registry = Arc::new(ServiceRegistry::new());
        let (mut sender, receiver_end) = MemoryConnection::pair();
        let acceptor = acceptor(&registry, Duration::from_millis(50));
        let serving =
            tokio::spawn(async move { acceptor.serve(Box::new(receiver_end)).await });

        handshake(&mut sender, "node-a").await;
        sender
            .send(ReplicationMessage::Change(ChangeNotification::Add(info(
                "i1",
                Status::Up,
            ))))
            .await
            .unwrap();

        // Keep the connection open but silent past the deadline.
        let result = serving.await.unwrap();
        assert!(matches!(result, Err(ReplicationError::HeartbeatMissed)));
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_hello_mid_stream_is_a_hard_error() {
        let registry = Arc::new(ServiceRegistry::new());
        let (mut sender, receiver_end) = MemoryConnection::pair();
        let acceptor = acceptor(&registry, Duration::from_secs(5));
        let serving =
            tokio::spawn(async move { acceptor.serve(Box::new(receiver_end)).await });

        handshake(&mut sender, "node-a").await;
        sender
            .send(ReplicationMessage::ServerHello(ReplicationServerHello {
                source: Source::local("node-a"),
            }))
            .await
            .unwrap();

        let result = serving.await.unwrap();
        assert!(matches!(
            result,
            Err(ReplicationError::UnexpectedMessage { phase: "streaming", .. })
        ));
    }
}
