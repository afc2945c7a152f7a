// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data model: instance records, update sources, change notifications and
//! subscriber interests.

pub mod instance;
pub mod interest;
pub mod notification;
pub mod source;

pub use instance::{
    DataCenterInfo, Delta, FieldName, InstanceInfo, InstanceInfoBuilder, ServicePort, Status,
};
pub use interest::{
    Interest, InterestMatcher, InvalidPatternError, MultipleInterests, Operator,
};
pub use notification::{ChangeNotification, NotificationKind, SourcedNotification};
pub use source::{Origin, Source, SourceMatcher};
