// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber-channel plumbing: switchable breakers and the per-channel
//! interest multiplexer.

pub mod breaker;
pub mod multiplexer;

pub use breaker::BreakerSwitch;
pub use multiplexer::{ChannelError, InterestNotificationMultiplexer};
