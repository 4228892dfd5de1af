// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! L2 forwarding: MAC learning/aging, VLAN membership/tagging, and spanning-tree port gating.

use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["l2"]);

pub mod mac_table;
pub mod stp;
pub mod vlan_engine;

/// Opaque port identifier as seen by the L2 engines. Decoupled from `driver::PortId` so this
/// crate has no dependency on the driver/port abstraction; callers convert at the boundary.
pub type PortId = u16;

/// Seconds since an arbitrary monotonic epoch, supplied externally by the scheduler's tick.
pub type Timestamp = u64;

pub use mac_table::{MacEntry, MacEntryType, MacTable, MacTableConfig, MacTableError};
pub use stp::{BridgeId, PortState, StpEngine, StpError};
pub use vlan_engine::{TagAction, VlanEngine, VlanError, VlanInfo};
