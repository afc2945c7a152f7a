// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Update provenance.
//!
//! Every mutation entering the registry is tagged with a [`Source`]: who
//! produced it (a locally registered client, a cluster peer, a bootstrap
//! import, or an interest subscription acting as a feed). Holders keep one
//! copy per source and reconcile them by origin priority.

use serde::{Deserialize, Serialize};

/// Where an update came from.
///
/// Priority order (highest first): `Local > Replicated > Bootstrap >
/// Interested`. Within a tier, the most recent write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    /// Registered directly with this node.
    Local,
    /// Received from a cluster peer over the replication protocol.
    Replicated,
    /// Imported from a backup/bootstrap snapshot at startup.
    Bootstrap,
    /// Fed from an interest subscription (read-path mirror).
    Interested,
}

impl Origin {
    /// Reconciliation rank; lower wins.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Origin::Local => 0,
            Origin::Replicated => 1,
            Origin::Bootstrap => 2,
            Origin::Interested => 3,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Local => write!(f, "LOCAL"),
            Origin::Replicated => write!(f, "REPLICATED"),
            Origin::Bootstrap => write!(f, "BOOTSTRAP"),
            Origin::Interested => write!(f, "INTERESTED"),
        }
    }
}

/// Identity of an update producer.
///
/// Two sources are the same producer iff origin, name and id all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub origin: Origin,
    /// Human-meaningful producer name (e.g. the peer's instance id).
    pub name: String,
    /// Unique producer id, distinguishing reconnects of the same peer.
    pub id: String,
}

impl Source {
    pub fn new(origin: Origin, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            origin,
            name: name.into(),
            id: id.into(),
        }
    }

    /// A local source named after this node.
    pub fn local(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = name.clone();
        Self::new(Origin::Local, name, id)
    }

    /// A replicated source for a given peer.
    pub fn replicated(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(Origin::Replicated, name, id)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.origin, self.name, self.id)
    }
}

/// Predicate over [`Source`], used to scope reads and eviction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceMatcher {
    /// Matches every source.
    Any,
    /// Matches on origin alone.
    ForOrigin(Origin),
    /// Matches origin + name (any id), e.g. "everything from peer X".
    ForOriginAndName(Origin, String),
    /// Matches one exact source.
    Exact(Source),
}

impl SourceMatcher {
    #[must_use]
    pub fn matches(&self, source: &Source) -> bool {
        match self {
            SourceMatcher::Any => true,
            SourceMatcher::ForOrigin(origin) => source.origin == *origin,
            SourceMatcher::ForOriginAndName(origin, name) => {
                source.origin == *origin && source.name == *name
            }
            SourceMatcher::Exact(exact) => source == exact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_priority_order() {
        assert!(Origin::Local.priority() < Origin::Replicated.priority());
        assert!(Origin::Replicated.priority() < Origin::Bootstrap.priority());
        assert!(Origin::Bootstrap.priority() < Origin::Interested.priority());
    }

    #[test]
    fn test_source_equality_over_all_fields() {
        let a = Source::new(Origin::Local, "node-a", "1");
        let b = Source::new(Origin::Local, "node-a", "1");
        let c = Source::new(Origin::Local, "node-a", "2");
        let d = Source::new(Origin::Replicated, "node-a", "1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_matcher_for_origin() {
        let matcher = SourceMatcher::ForOrigin(Origin::Local);
        assert!(matcher.matches(&Source::local("node-a")));
        assert!(!matcher.matches(&Source::replicated("node-b", "7")));
    }

    #[test]
    fn test_matcher_for_origin_and_name() {
        let matcher = SourceMatcher::ForOriginAndName(Origin::Replicated, "node-b".into());
        assert!(matcher.matches(&Source::replicated("node-b", "7")));
        assert!(matcher.matches(&Source::replicated("node-b", "8")));
        assert!(!matcher.matches(&Source::replicated("node-c", "7")));
    }

    #[test]
    fn test_matcher_exact() {
        let source = Source::replicated("node-b", "7");
        let matcher = SourceMatcher::Exact(source.clone());
        assert!(matcher.matches(&source));
        assert!(!matcher.matches(&Source::replicated("node-b", "8")));
    }
}
