// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Interests: predicates selecting the registry subset a subscriber wants.
//!
//! An atomic [`Interest`] matches on one record attribute (id, application,
//! VIP address) with an equals or pattern operator, or matches everything
//! (`FullRegistry`). [`MultipleInterests`] is a flat union of atomic
//! interests; it cannot nest, so flattening is structural and composites
//! never reach the index layer directly.
//!
//! `Like` patterns are anchored regular expressions, compiled once per
//! [`InterestMatcher`]; a malformed pattern is rejected when the
//! subscription is created, not silently never-matching.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::instance::InstanceInfo;

/// Pattern operator for attribute interests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    Like,
}

/// An atomic interest: one predicate over [`InstanceInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interest {
    /// Matches every record.
    FullRegistry,
    /// Matches on the instance id.
    Instance { pattern: String, operator: Operator },
    /// Matches on the application name.
    Application { pattern: String, operator: Operator },
    /// Matches on the VIP address.
    VipAddress { pattern: String, operator: Operator },
    /// Matches on the secure VIP address.
    SecureVipAddress { pattern: String, operator: Operator },
}

impl Interest {
    pub fn for_full_registry() -> Self {
        Interest::FullRegistry
    }

    pub fn for_instance(id: impl Into<String>) -> Self {
        Interest::Instance {
            pattern: id.into(),
            operator: Operator::Equals,
        }
    }

    pub fn for_application(app: impl Into<String>) -> Self {
        Interest::Application {
            pattern: app.into(),
            operator: Operator::Equals,
        }
    }

    pub fn for_application_like(pattern: impl Into<String>) -> Self {
        Interest::Application {
            pattern: pattern.into(),
            operator: Operator::Like,
        }
    }

    pub fn for_vip(vip: impl Into<String>) -> Self {
        Interest::VipAddress {
            pattern: vip.into(),
            operator: Operator::Equals,
        }
    }

    pub fn for_secure_vip(vip: impl Into<String>) -> Self {
        Interest::SecureVipAddress {
            pattern: vip.into(),
            operator: Operator::Equals,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Interest::FullRegistry => "full_registry",
            Interest::Instance { .. } => "instance",
            Interest::Application { .. } => "application",
            Interest::VipAddress { .. } => "vip",
            Interest::SecureVipAddress { .. } => "secure_vip",
        }
    }
}

/// A malformed `Like` pattern, surfaced when a subscription is created.
#[derive(Debug, Error)]
#[error("invalid interest pattern '{pattern}': {reason}")]
pub struct InvalidPatternError {
    pub pattern: String,
    pub reason: String,
}

/// An [`Interest`] with its `Like` pattern compiled, ready for the dispatch
/// hot path.
#[derive(Debug, Clone)]
pub struct InterestMatcher {
    interest: Interest,
    pattern: Option<Regex>,
}

impl InterestMatcher {
    pub fn new(interest: Interest) -> Result<Self, InvalidPatternError> {
        let pattern = match &interest {
            Interest::FullRegistry => None,
            Interest::Instance { pattern, operator }
            | Interest::Application { pattern, operator }
            | Interest::VipAddress { pattern, operator }
            | Interest::SecureVipAddress { pattern, operator } => match operator {
                Operator::Equals => None,
                Operator::Like => Some(compile_anchored(pattern)?),
            },
        };
        Ok(Self { interest, pattern })
    }

    #[must_use]
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    #[must_use]
    pub fn matches(&self, info: &InstanceInfo) -> bool {
        let (pattern, operator, value) = match &self.interest {
            Interest::FullRegistry => return true,
            Interest::Instance { pattern, operator } => {
                (pattern, operator, Some(info.id.as_str()))
            }
            Interest::Application { pattern, operator } => {
                (pattern, operator, info.app.as_deref())
            }
            Interest::VipAddress { pattern, operator } => {
                (pattern, operator, info.vip_address.as_deref())
            }
            Interest::SecureVipAddress { pattern, operator } => {
                (pattern, operator, info.secure_vip_address.as_deref())
            }
        };
        let Some(value) = value else {
            return false;
        };
        match operator {
            Operator::Equals => value == pattern.as_str(),
            // Compiled in new(); pattern is always present for Like.
            Operator::Like => self
                .pattern
                .as_ref()
                .map(|re| re.is_match(value))
                .unwrap_or(false),
        }
    }
}

fn compile_anchored(pattern: &str) -> Result<Regex, InvalidPatternError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| InvalidPatternError {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// A flat union of atomic interests.
///
/// Construction flattens and de-duplicates; the union matches a record iff
/// any component does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MultipleInterests {
    interests: BTreeSet<Interest>,
}

impl MultipleInterests {
    pub fn new(interests: impl IntoIterator<Item = Interest>) -> Self {
        Self {
            interests: interests.into_iter().collect(),
        }
    }

    /// The atomic components.
    pub fn flatten(&self) -> impl Iterator<Item = &Interest> {
        self.interests.iter()
    }

    #[must_use]
    pub fn contains(&self, interest: &Interest) -> bool {
        self.interests.contains(interest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }
}

impl From<Interest> for MultipleInterests {
    fn from(interest: Interest) -> Self {
        Self::new([interest])
    }
}
