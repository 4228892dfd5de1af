// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crate to control tracing dynamically at runtime

pub mod control;
pub mod targets;

pub use tracing_subscriber::filter::LevelFilter;

// re-exports
pub use control::TracingControl;
pub use control::get_trace_ctl;
