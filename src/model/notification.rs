// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change notifications.
//!
//! A [`ChangeNotification`] is the unit every subscriber consumes: an
//! instance was added, modified (with the field deltas), or deleted.
//! [`ChangeNotification::BufferSentinel`] is a structural marker carrying no
//! data; it closes a batched segment so a consumer can tell a completed
//! snapshot from one still in flight.
//!
//! Internally the registry fans out [`SourcedNotification`]s, which pair the
//! notification with the [`Source`] that owns the effective record; the
//! source is stripped at the subscriber edge and only consulted for
//! source-scoped feeds (replication streams local-origin data only).

use serde::{Deserialize, Serialize};

use super::instance::{Delta, InstanceInfo};
use super::source::Source;

/// Discriminant of a [`ChangeNotification`], for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Add,
    Modify,
    Delete,
    BufferSentinel,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Add => write!(f, "add"),
            NotificationKind::Modify => write!(f, "modify"),
            NotificationKind::Delete => write!(f, "delete"),
            NotificationKind::BufferSentinel => write!(f, "buffer_sentinel"),
        }
    }
}

/// One incremental change to the registry view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeNotification {
    /// The instance became visible (or newly effective).
    Add(InstanceInfo),
    /// The effective record changed; `deltas` is the field-level difference
    /// from the previously notified record (a wire compaction aid, not
    /// guaranteed exhaustive).
    Modify {
        data: InstanceInfo,
        deltas: Vec<Delta>,
    },
    /// The instance is gone from the notified view.
    Delete(InstanceInfo),
    /// End-of-segment marker; carries no data.
    BufferSentinel,
}

impl ChangeNotification {
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            ChangeNotification::Add(_) => NotificationKind::Add,
            ChangeNotification::Modify { .. } => NotificationKind::Modify,
            ChangeNotification::Delete(_) => NotificationKind::Delete,
            ChangeNotification::BufferSentinel => NotificationKind::BufferSentinel,
        }
    }

    /// The carried record, if this is a data notification.
    #[must_use]
    pub fn data(&self) -> Option<&InstanceInfo> {
        match self {
            ChangeNotification::Add(data)
            | ChangeNotification::Modify { data, .. }
            | ChangeNotification::Delete(data) => Some(data),
            ChangeNotification::BufferSentinel => None,
        }
    }

    /// True for `Add`/`Modify`/`Delete`, false for structural markers.
    #[must_use]
    pub fn is_data(&self) -> bool {
        !matches!(self, ChangeNotification::BufferSentinel)
    }
}

/// A notification tagged with the source that owns the effective record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedNotification {
    pub source: Source,
    pub notification: ChangeNotification,
}

impl SourcedNotification {
    pub fn new(source: Source, notification: ChangeNotification) -> Self {
        Self {
            source,
            notification,
        }
    }

    /// Drop the source tag.
    #[must_use]
    pub fn into_notification(self) -> ChangeNotification {
        self.notification
    }
}
