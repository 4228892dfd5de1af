// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! L3 resolution and forwarding state: the ARP neighbor cache and the routing table.

use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["routing"]);

pub mod arp;
pub mod fib;

/// Opaque port identifier, decoupled from `driver::PortId` the way `l2::PortId` is.
pub type PortId = u16;

/// Seconds since an arbitrary monotonic epoch, supplied externally by the scheduler's tick.
pub type Timestamp = u64;

pub use arp::{ArpAction, ArpCache, ArpCacheError, ArpEntry, ArpLookup, ArpState};
pub use fib::{
    HwSyncEvent, Route, RouteKey, RouteType, RoutingTable, RoutingTableError, RoutingTableStats,
};
