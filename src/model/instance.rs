// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The registered instance record.
//!
//! [`InstanceInfo`] is the immutable value that flows through the registry.
//! Derived copies are produced through [`InstanceInfoBuilder`]; incremental
//! wire updates are expressed as [`Delta`]s, one enum variant per mutable
//! field, applied to a builder to reconstruct the next copy. The instance
//! `id` is stable and never delta-mutable.
//!
//! # Example
//!
//! ```
//! use registry_engine::model::{InstanceInfo, Status};
//!
//! let info = InstanceInfo::builder("backend-1")
//!     .app("backend")
//!     .vip_address("backend.vip")
//!     .status(Status::Up)
//!     .build();
//!
//! let down = info.to_builder().status(Status::Down).build();
//! let deltas = InstanceInfo::diff(&info, &down);
//! assert_eq!(deltas.len(), 1);
//! assert_eq!(info.apply_deltas(&deltas), down);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Instance lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    Starting,
    Up,
    Down,
    OutOfService,
    #[default]
    Unknown,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Starting => write!(f, "STARTING"),
            Status::Up => write!(f, "UP"),
            Status::Down => write!(f, "DOWN"),
            Status::OutOfService => write!(f, "OUT_OF_SERVICE"),
            Status::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A named service port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,
    pub secure: bool,
}

impl ServicePort {
    pub fn new(port: u16, secure: bool) -> Self {
        Self {
            name: None,
            port,
            secure,
        }
    }

    pub fn named(name: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            name: Some(name.into()),
            port,
            secure,
        }
    }
}

/// Datacenter placement descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataCenterInfo {
    pub name: String,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// Resolvable addresses, public first.
    pub addresses: Vec<String>,
}

impl DataCenterInfo {
    pub fn basic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            zone: None,
            addresses: Vec::new(),
        }
    }
}

/// The registered record: identity, placement, routing and health surface
/// of one service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Stable instance id; the registry key.
    pub id: String,
    pub app_group: Option<String>,
    pub app: Option<String>,
    pub asg: Option<String>,
    pub vip_address: Option<String>,
    pub secure_vip_address: Option<String>,
    pub ports: BTreeSet<ServicePort>,
    pub status: Status,
    pub home_page_url: Option<String>,
    pub status_page_url: Option<String>,
    pub health_check_urls: BTreeSet<String>,
    pub metadata: BTreeMap<String, String>,
    pub data_center_info: Option<DataCenterInfo>,
}

impl InstanceInfo {
    /// Start building a record for `id`.
    pub fn builder(id: impl Into<String>) -> InstanceInfoBuilder {
        InstanceInfoBuilder::new(id)
    }

    /// A builder pre-populated with this record, for derived copies.
    #[must_use]
    pub fn to_builder(&self) -> InstanceInfoBuilder {
        InstanceInfoBuilder {
            info: self.clone(),
        }
    }

    /// Field-level difference `old -> new`, one [`Delta`] per changed field.
    ///
    /// Used for wire compaction of `Modify` notifications; the id is assumed
    /// equal and is not diffed.
    #[must_use]
    pub fn diff(old: &InstanceInfo, new: &InstanceInfo) -> Vec<Delta> {
        let mut deltas = Vec::new();
        if old.app_group != new.app_group {
            deltas.push(Delta::AppGroup(new.app_group.clone()));
        }
        if old.app != new.app {
            deltas.push(Delta::App(new.app.clone()));
        }
        if old.asg != new.asg {
            deltas.push(Delta::Asg(new.asg.clone()));
        }
        if old.vip_address != new.vip_address {
            deltas.push(Delta::VipAddress(new.vip_address.clone()));
        }
        if old.secure_vip_address != new.secure_vip_address {
            deltas.push(Delta::SecureVipAddress(new.secure_vip_address.clone()));
        }
        if old.ports != new.ports {
            deltas.push(Delta::Ports(new.ports.clone()));
        }
        if old.status != new.status {
            deltas.push(Delta::Status(new.status));
        }
        if old.home_page_url != new.home_page_url {
            deltas.push(Delta::HomePageUrl(new.home_page_url.clone()));
        }
        if old.status_page_url != new.status_page_url {
            deltas.push(Delta::StatusPageUrl(new.status_page_url.clone()));
        }
        if old.health_check_urls != new.health_check_urls {
            deltas.push(Delta::HealthCheckUrls(new.health_check_urls.clone()));
        }
        if old.metadata != new.metadata {
            deltas.push(Delta::Metadata(new.metadata.clone()));
        }
        if old.data_center_info != new.data_center_info {
            deltas.push(Delta::DataCenterInfo(new.data_center_info.clone()));
        }
        deltas
    }

    /// Reconstruct the record that results from applying `deltas` to `self`.
    #[must_use]
    pub fn apply_deltas(&self, deltas: &[Delta]) -> InstanceInfo {
        let mut builder = self.to_builder();
        for delta in deltas {
            builder = delta.apply(builder);
        }
        builder.build()
    }
}

/// Builder for [`InstanceInfo`] derived copies.
#[derive(Debug, Clone)]
pub struct InstanceInfoBuilder {
    info: InstanceInfo,
}

impl InstanceInfoBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            info: InstanceInfo {
                id: id.into(),
                app_group: None,
                app: None,
                asg: None,
                vip_address: None,
                secure_vip_address: None,
                ports: BTreeSet::new(),
                status: Status::Unknown,
                home_page_url: None,
                status_page_url: None,
                health_check_urls: BTreeSet::new(),
                metadata: BTreeMap::new(),
                data_center_info: None,
            },
        }
    }

    pub fn app_group(mut self, app_group: impl Into<String>) -> Self {
        self.info.app_group = Some(app_group.into());
        self
    }

    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.info.app = Some(app.into());
        self
    }

    pub fn asg(mut self, asg: impl Into<String>) -> Self {
        self.info.asg = Some(asg.into());
        self
    }

    pub fn vip_address(mut self, vip: impl Into<String>) -> Self {
        self.info.vip_address = Some(vip.into());
        self
    }

    pub fn secure_vip_address(mut self, vip: impl Into<String>) -> Self {
        self.info.secure_vip_address = Some(vip.into());
        self
    }

    pub fn port(mut self, port: ServicePort) -> Self {
        self.info.ports.insert(port);
        self
    }

    pub fn ports(mut self, ports: BTreeSet<ServicePort>) -> Self {
        self.info.ports = ports;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.info.status = status;
        self
    }

    pub fn home_page_url(mut self, url: impl Into<String>) -> Self {
        self.info.home_page_url = Some(url.into());
        self
    }

    pub fn status_page_url(mut self, url: impl Into<String>) -> Self {
        self.info.status_page_url = Some(url.into());
        self
    }

    pub fn health_check_url(mut self, url: impl Into<String>) -> Self {
        self.info.health_check_urls.insert(url.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.metadata.insert(key.into(), value.into());
        self
    }

    pub fn data_center_info(mut self, dc: DataCenterInfo) -> Self {
        self.info.data_center_info = Some(dc);
        self
    }

    #[must_use]
    pub fn build(self) -> InstanceInfo {
        self.info
    }
}

/// Names of the delta-mutable [`InstanceInfo`] fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldName {
    AppGroup,
    App,
    Asg,
    VipAddress,
    SecureVipAddress,
    Ports,
    Status,
    HomePageUrl,
    StatusPageUrl,
    HealthCheckUrls,
    Metadata,
    DataCenterInfo,
}

/// A named-field mutation.
///
/// The variant set is the static accessor table for [`InstanceInfo`]: each
/// variant knows which field it names and how to write it into a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta {
    AppGroup(Option<String>),
    App(Option<String>),
    Asg(Option<String>),
    VipAddress(Option<String>),
    SecureVipAddress(Option<String>),
    Ports(BTreeSet<ServicePort>),
    Status(Status),
    HomePageUrl(Option<String>),
    StatusPageUrl(Option<String>),
    HealthCheckUrls(BTreeSet<String>),
    Metadata(BTreeMap<String, String>),
    DataCenterInfo(Option<DataCenterInfo>),
}

impl Delta {
    /// The field this delta mutates.
    #[must_use]
    pub fn field(&self) -> FieldName {
        match self {
            Delta::AppGroup(_) => FieldName::AppGroup,
            Delta::App(_) => FieldName::App,
            Delta::Asg(_) => FieldName::Asg,
            Delta::VipAddress(_) => FieldName::VipAddress,
            Delta::SecureVipAddress(_) => FieldName::SecureVipAddress,
            Delta::Ports(_) => FieldName::Ports,
            Delta::Status(_) => FieldName::Status,
            Delta::HomePageUrl(_) => FieldName::HomePageUrl,
            Delta::StatusPageUrl(_) => FieldName::StatusPageUrl,
            Delta::HealthCheckUrls(_) => FieldName::HealthCheckUrls,
            Delta::Metadata(_) => FieldName::Metadata,
            Delta::DataCenterInfo(_) => FieldName::DataCenterInfo,
        }
    }

    /// Write this delta's value into `builder`.
    #[must_use]
    pub fn apply(&self, mut builder: InstanceInfoBuilder) -> InstanceInfoBuilder {
        match self {
            Delta::AppGroup(v) => builder.info.app_group = v.clone(),
            Delta::App(v) => builder.info.app = v.clone(),
            Delta::Asg(v) => builder.info.asg = v.clone(),
            Delta::VipAddress(v) => builder.info.vip_address = v.clone(),
            Delta::SecureVipAddress(v) => builder.info.secure_vip_address = v.clone(),
            Delta::Ports(v) => builder.info.ports = v.clone(),
            Delta::Status(v) => builder.info.status = *v,
            Delta::HomePageUrl(v) => builder.info.home_page_url = v.clone(),
            Delta::StatusPageUrl(v) => builder.info.status_page_url = v.clone(),
            Delta::HealthCheckUrls(v) => builder.info.health_check_urls = v.clone(),
            Delta::Metadata(v) => builder.info.metadata = v.clone(),
            Delta::DataCenterInfo(v) => builder.info.data_center_info = v.clone(),
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> InstanceInfo {
        InstanceInfo::builder("instance-1")
            .app("backend")
            .app_group("backend-group")
            .vip_address("backend.vip")
            .port(ServicePort::new(7001, false))
            .status(Status::Up)
            .metadata("rack", "r12")
            .build()
    }

    #[test]
    fn test_builder_round_trip() {
        let info = base();
        assert_eq!(info.id, "instance-1");
        assert_eq!(info.app.as_deref(), Some("backend"));
        assert_eq!(info.status, Status::Up);
        assert_eq!(info.metadata.get("rack").map(String::as_str), Some("r12"));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let info = base();
        assert!(InstanceInfo::diff(&info, &info.clone()).is_empty());
    }

    #[test]
    fn test_diff_single_field() {
        let info = base();
        let down = info.to_builder().status(Status::Down).build();

        let deltas = InstanceInfo::diff(&info, &down);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field(), FieldName::Status);
        assert_eq!(deltas[0], Delta::Status(Status::Down));
    }

    #[test]
    fn test_diff_multiple_fields() {
        let info = base();
        let changed = info
            .to_builder()
            .status(Status::OutOfService)
            .vip_address("backend-canary.vip")
            .metadata("rack", "r13")
            .build();

        let deltas = InstanceInfo::diff(&info, &changed);
        let fields: Vec<FieldName> = deltas.iter().map(Delta::field).collect();
        assert!(fields.contains(&FieldName::Status));
        assert!(fields.contains(&FieldName::VipAddress));
        assert!(fields.contains(&FieldName::Metadata));
        assert_eq!(deltas.len(), 3);
    }

    #[test]
    fn test_apply_deltas_reconstructs() {
        let info = base();
        let changed = info
            .to_builder()
            .status(Status::Down)
            .asg("backend-v002")
            .build();

        let deltas = InstanceInfo::diff(&info, &changed);
        assert_eq!(info.apply_deltas(&deltas), changed);
    }

    #[test]
    fn test_apply_delta_clears_optional_field() {
        let info = base();
        let delta = Delta::VipAddress(None);
        let applied = info.apply_deltas(std::slice::from_ref(&delta));
        assert_eq!(applied.vip_address, None);
    }

    #[test]
    fn test_id_is_never_diffed() {
        let a = base();
        let mut b = base();
        b.id = "other".to_string();
        // Deliberate: diff assumes same id and reports no delta for it.
        assert!(InstanceInfo::diff(&a, &b).is_empty());
    }
}
