// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the registry engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the embedding
//! process chooses the exporter (Prometheus, OTEL, ...) and with no recorder
//! installed every call is a no-op.
//!
//! # Metric Naming Convention
//! - `registry_engine_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `app`: application name carried by the notification
//! - `kind`: add, modify, delete, buffer_sentinel
//! - `interest`: full_registry, instance, application, vip, secure_vip, composite
//! - `event`: replication lifecycle events

use metrics::{counter, gauge};

use crate::model::NotificationKind;

/// Record one change notification fanned out to the index layer.
pub fn record_notification(app: &str, kind: NotificationKind) {
    counter!(
        "registry_engine_notifications_total",
        "app" => app.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a new interest subscription.
pub fn record_subscription(interest: &str) {
    counter!(
        "registry_engine_subscriptions_total",
        "interest" => interest.to_string()
    )
    .increment(1);
}

/// Set the current number of registered instance ids.
pub fn set_registry_size(size: usize) {
    gauge!("registry_engine_registry_size").set(size as f64);
}

/// Record evicted (instance, source) entries.
pub fn record_eviction(count: usize) {
    counter!("registry_engine_evictions_total").increment(count as u64);
}

/// Record a component state transition.
pub fn record_state_transition(component: &str, state: &str) {
    counter!(
        "registry_engine_state_transitions_total",
        "component" => component.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record a replication lifecycle event (connected, loop_rejected, retry,
/// heartbeat, disconnected).
pub fn record_replication_event(event: &str) {
    counter!(
        "registry_engine_replication_events_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Set the number of active replication peers.
pub fn set_replication_peers(count: usize) {
    gauge!("registry_engine_replication_peers").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API compiles and doesn't panic; with no recorder
    // installed every call is a no-op.

    #[test]
    fn test_counters() {
        record_notification("backend", NotificationKind::Add);
        record_notification("backend", NotificationKind::Delete);
        record_subscription("application");
        record_eviction(3);
        record_state_transition("registry", "shutdown");
        record_replication_event("connected");
    }

    #[test]
    fn test_gauges() {
        set_registry_size(42);
        set_replication_peers(2);
    }
}
