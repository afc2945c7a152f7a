//! Configuration for the registry engine.
//!
//! # Example
//!
//! ```
//! use registry_engine::RegistryConfig;
//!
//! // Minimal config (uses defaults)
//! let config = RegistryConfig::default();
//! assert_eq!(config.heartbeat_interval_ms, 30_000);
//!
//! // Full config
//! let config = RegistryConfig {
//!     replication_reconnect_delay_ms: 1_000,
//!     heartbeat_interval_ms: 10_000,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the registry engine.
///
/// All fields have sensible defaults; a single-node deployment can run on
/// `RegistryConfig::default()` unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Fixed delay between replication reconnect attempts (ms)
    #[serde(default = "default_replication_reconnect_delay_ms")]
    pub replication_reconnect_delay_ms: u64,

    /// Heartbeat period on a replication link (ms)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Heartbeats the receiver may miss before declaring a link dead
    #[serde(default = "default_heartbeat_missed_allowance")]
    pub heartbeat_missed_allowance: u32,

    /// Period between peer-list reloads for polling resolvers (ms)
    #[serde(default = "default_resolver_refresh_ms")]
    pub resolver_refresh_ms: u64,

    /// Override for the source name announced to peers (defaults to the
    /// node name passed at engine construction)
    #[serde(default)]
    pub replication_source_name: Option<String>,
}

fn default_replication_reconnect_delay_ms() -> u64 { 5_000 }
fn default_heartbeat_interval_ms() -> u64 { 30_000 }
fn default_heartbeat_missed_allowance() -> u32 { 3 }
fn default_resolver_refresh_ms() -> u64 { 30_000 }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            replication_reconnect_delay_ms: default_replication_reconnect_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_missed_allowance: default_heartbeat_missed_allowance(),
            resolver_refresh_ms: default_resolver_refresh_ms(),
            replication_source_name: None,
        }
    }
}

impl RegistryConfig {
    /// Deadline for hearing anything from a replication peer before the
    /// link is treated as dead.
    #[must_use]
    pub fn liveness_deadline_ms(&self) -> u64 {
        self.heartbeat_interval_ms * u64::from(self.heartbeat_missed_allowance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.replication_reconnect_delay_ms, 5_000);
        assert_eq!(config.heartbeat_missed_allowance, 3);
        assert_eq!(config.liveness_deadline_ms(), 90_000);
        assert!(config.replication_source_name.is_none());
    }
}
