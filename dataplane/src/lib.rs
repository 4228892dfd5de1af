// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! The simulated switch's dataplane: a boot-time-configured [`SwitchCore`] wiring the port
//! table, the packet pipeline, and the L2/L3 forwarding engines into one runnable switch.

use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["dataplane"]);

pub mod config;
pub mod ip_processor;
pub mod l2_stage;
pub mod l3_stage;
pub mod switch_core;

pub use config::{BoardType, BspConfig};
pub use ip_processor::{IpDropReason, IpOutcome, IpProcessor, IpProcessorStats};
pub use l2_stage::L2Stage;
pub use l3_stage::L3Stage;
pub use switch_core::SwitchCore;
