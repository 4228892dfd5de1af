// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Port/driver abstraction: the `Driver` trait, concrete simulator drivers, and `PortTable`.

use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["driver"]);

pub mod driver;
pub mod port;
pub mod table;

pub use driver::{Capabilities, Driver, DriverError, DriverKind, DriverStats, LoopbackDriver, SimulatorDriver};
pub use port::{Duplex, PortConfig, PortId, PortStats, PortStatus};
pub use table::{PortError, PortTable};
