// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model routing for the InKnowing dialogue runtime.
//!
//! Descriptors, per-descriptor health tracking, ordered selection with
//! failover, rate-limited invocation, and cost metering.

pub mod descriptor;
pub mod health;
pub mod router;

pub use descriptor::{ModelDescriptor, PoolRole, ProviderKind, Scenario};
pub use health::{HealthState, HealthTracker};
pub use router::{Invocation, ModelRouter};
