// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Synchronization primitives used by every singleton table in the core.
//!
//! Each of `MacTable`, `VlanEngine`, `StpEngine`, `ArpCache`, `RoutingTable`
//! and `PortTable` wraps its state in [`Mutex`] from this module rather than
//! from `std::sync` or `parking_lot` directly, so the lock implementation is
//! swapped in exactly one place.

#![deny(unsafe_code, missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use std::sync::Arc;
