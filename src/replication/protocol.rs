// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication wire protocol.
//!
//! A replication link is established by a hello exchange: the sender
//! announces its replication [`Source`] and current registry size, the
//! receiver answers with its own source. After the handshake the sender
//! streams local-origin change notifications, interleaving heartbeats so a
//! silently dead connection is noticed on both ends.
//!
//! The types here are codec-ready (`serde` derives); the actual wire format
//! lives with the transport implementation, outside this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChangeNotification, Source};

/// Sender's opening announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationClientHello {
    /// The replication source the sender will be known as on the receiver.
    pub source: Source,
    /// Registry size at connect time, for receiver-side sanity logging.
    pub registry_size: usize,
}

/// Receiver's handshake answer, carrying its own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationServerHello {
    pub source: Source,
}

/// Everything that travels over a replication link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    ClientHello(ReplicationClientHello),
    ServerHello(ReplicationServerHello),
    Heartbeat,
    Change(ChangeNotification),
}

impl ReplicationMessage {
    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ReplicationMessage::ClientHello(_) => "client_hello",
            ReplicationMessage::ServerHello(_) => "server_hello",
            ReplicationMessage::Heartbeat => "heartbeat",
            ReplicationMessage::Change(_) => "change",
        }
    }
}

/// Replication link failures.
///
/// Only [`Transport`](ReplicationError::Transport) is retried; a detected
/// loop removes the peer for good, and protocol violations are hard errors
/// for the attempt.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The peer turned out to be ourselves (directly or via an alias);
    /// retrying can never succeed and would mask a misconfiguration.
    #[error("replication loop: peer '{peer}' declares our own identity")]
    Loop { peer: String },

    /// Connection-level failure; retried after the configured delay.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer closed the link.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The peer answered the handshake with the wrong message class.
    #[error("unexpected {got} during {phase}")]
    UnexpectedMessage {
        phase: &'static str,
        got: &'static str,
    },

    /// No heartbeat or data within the deadline; the link is dead.
    #[error("heartbeat deadline missed")]
    HeartbeatMissed,

    /// The service refused the operation in its current state.
    #[error("replication service already closed")]
    ServiceClosed,
}

impl ReplicationError {
    /// Whether the per-peer pipeline should reconnect after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReplicationError::Transport(_)
                | ReplicationError::ConnectionClosed
                | ReplicationError::HeartbeatMissed
        )
    }
}
