// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `PortTable`: registry of ports, their configuration, state, and counters (§4.2).

use crate::driver::{Driver, DriverError};
use crate::port::{PortConfig, PortId, PortStats, PortStatus};
use concurrency::{Arc, Mutex};
use net::eth::mac::Mac;
use net::packet::PacketBuffer;
use net::vlan::Vid;
use std::collections::{HashMap, HashSet};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{debug, warn};

trace_target!(LevelFilter::INFO, &["driver", "port-table"]);

/// Errors raised by `PortTable` operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The supplied configuration is not valid (e.g. MTU out of range, illegal MAC).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// No port exists with the given id.
    #[error("port {0} not found")]
    NotFound(PortId),
    /// A port already exists with the given id.
    #[error("port {0} already exists")]
    AlreadyExists(PortId),
    /// The port is administratively or operationally down.
    #[error("port {0} is down")]
    PortDown(PortId),
    /// The underlying driver reported an error.
    #[error("driver error on port {0}: {1}")]
    Driver(PortId, #[source] DriverError),
}

struct PortEntry {
    config: PortConfig,
    status: PortStatus,
    mac: Mac,
    stats: PortStats,
    driver: Box<dyn Driver>,
    mac_filter: HashSet<Mac>,
    vlan_filter: HashSet<Vid>,
    rx_callback: Option<Box<dyn FnMut(PacketBuffer) + Send>>,
    link_event_callback: Option<Box<dyn FnMut(PortId, bool) + Send>>,
}

/// Base MAC address ports are generated from when no explicit MAC is configured.
pub const DEFAULT_BASE_MAC: Mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x00]);

/// Registry of up to N ports, their configuration, driver handles, and counters.
pub struct PortTable {
    base_mac: Mac,
    ports: Arc<Mutex<HashMap<PortId, PortEntry>>>,
}

impl Default for PortTable {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_MAC)
    }
}

impl PortTable {
    /// Create an empty table; generated MACs derive from `base_mac`.
    #[must_use]
    pub fn new(base_mac: Mac) -> Self {
        Self {
            base_mac,
            ports: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn resolve_mac(base: Mac, port_id: PortId, explicit: Option<Mac>) -> Result<Mac, PortError> {
        let mac = explicit.unwrap_or_else(|| Mac::generate(base, port_id.0));
        if mac.is_multicast() || mac.is_zero() {
            return Err(PortError::InvalidParameter(format!(
                "generated/explicit mac {mac:?} for port {port_id} is multicast or zero"
            )));
        }
        Ok(mac)
    }

    /// Open a new port bound to `driver`, initializing it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AlreadyExists`] if `port_id` is already open,
    /// [`PortError::InvalidParameter`] if `config` is invalid, or
    /// [`PortError::Driver`] if the driver fails to initialize.
    pub fn open(
        &self,
        port_id: PortId,
        config: PortConfig,
        mut driver: Box<dyn Driver>,
    ) -> Result<(), PortError> {
        if config.mtu > PortConfig::MAX_MTU {
            return Err(PortError::InvalidParameter(format!(
                "mtu {} exceeds maximum {}",
                config.mtu,
                PortConfig::MAX_MTU
            )));
        }
        let mac = Self::resolve_mac(self.base_mac, port_id, config.mac)?;
        let mut ports = self.ports.lock();
        if ports.contains_key(&port_id) {
            return Err(PortError::AlreadyExists(port_id));
        }
        driver
            .init()
            .map_err(|e| PortError::Driver(port_id, e))?;
        let is_cpu = port_id == PortId::INTERNAL_CPU;
        let status = PortStatus {
            admin_up: true,
            link_up: is_cpu,
            loopback: false,
        };
        debug!("opened port {port_id} with mac {mac:?}");
        ports.insert(
            port_id,
            PortEntry {
                config,
                status,
                mac,
                stats: PortStats::default(),
                driver,
                mac_filter: HashSet::new(),
                vlan_filter: HashSet::new(),
                rx_callback: None,
                link_event_callback: None,
            },
        );
        Ok(())
    }

    /// Shut down and remove a port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn close(&self, port_id: PortId) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let mut entry = ports.remove(&port_id).ok_or(PortError::NotFound(port_id))?;
        if let Err(e) = entry.driver.shutdown() {
            warn!("driver shutdown failed for port {port_id}: {e}");
        }
        Ok(())
    }

    /// Atomically replace a port's configuration. Returns the prior configuration.
    ///
    /// If the new MTU is invalid, or the driver rejects the new loopback mode, the change is
    /// rolled back and an error returned.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`], [`PortError::InvalidParameter`], or
    /// [`PortError::Driver`].
    pub fn configure(&self, port_id: PortId, new_config: PortConfig) -> Result<PortConfig, PortError> {
        if new_config.mtu > PortConfig::MAX_MTU {
            return Err(PortError::InvalidParameter(format!(
                "mtu {} exceeds maximum {}",
                new_config.mtu,
                PortConfig::MAX_MTU
            )));
        }
        let mac = Self::resolve_mac(self.base_mac, port_id, new_config.mac)?;
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        let old_config = entry.config.clone();
        let mode_changed = old_config.speed_mbps != new_config.speed_mbps
            || old_config.duplex != new_config.duplex;
        entry.config = new_config;
        entry.mac = mac;
        if mode_changed {
            entry.status.link_up = false;
        }
        Ok(old_config)
    }

    /// Set the administrative up/down state of a port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn set_admin_state(&self, port_id: PortId, up: bool) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        entry.status.admin_up = up;
        Ok(())
    }

    /// Read a port's current status.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn get_status(&self, port_id: PortId) -> Result<PortStatus, PortError> {
        let ports = self.ports.lock();
        ports
            .get(&port_id)
            .map(|e| e.status)
            .ok_or(PortError::NotFound(port_id))
    }

    /// Read a port's counters.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn get_stats(&self, port_id: PortId) -> Result<PortStats, PortError> {
        let ports = self.ports.lock();
        ports
            .get(&port_id)
            .map(|e| e.stats)
            .ok_or(PortError::NotFound(port_id))
    }

    /// Reset a port's counters to zero.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn clear_stats(&self, port_id: PortId) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        entry.stats = PortStats::default();
        Ok(())
    }

    /// Register the callback invoked for every frame the port receives.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn register_rx_callback<F>(&self, port_id: PortId, cb: F) -> Result<(), PortError>
    where
        F: FnMut(PacketBuffer) + Send + 'static,
    {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        entry.rx_callback = Some(Box::new(cb));
        Ok(())
    }

    /// Register the callback invoked whenever `simulate_link` changes a port's link state.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn register_link_event_callback<F>(&self, port_id: PortId, cb: F) -> Result<(), PortError>
    where
        F: FnMut(PortId, bool) + Send + 'static,
    {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        entry.link_event_callback = Some(Box::new(cb));
        Ok(())
    }

    /// Deliver a received frame to the port's registered rx callback, updating counters.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn rx(&self, port_id: PortId, frame: PacketBuffer) -> Result<(), PortError> {
        let mut taken_cb = {
            let mut ports = self.ports.lock();
            let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
            entry.stats.rx_packets += 1;
            entry.stats.rx_bytes += frame.length() as u64;
            let dest = frame.meta().destination;
            if dest.is_broadcast() {
                entry.stats.rx_broadcast += 1;
            } else if dest.is_multicast() {
                entry.stats.rx_multicast += 1;
            } else {
                entry.stats.rx_unicast += 1;
            }
            entry.rx_callback.take()
        };
        if let Some(cb) = taken_cb.as_mut() {
            cb(frame);
        }
        if let Some(cb) = taken_cb {
            let mut ports = self.ports.lock();
            if let Some(entry) = ports.get_mut(&port_id) {
                entry.rx_callback = Some(cb);
            }
        }
        Ok(())
    }

    /// Transmit a frame on `port_id`. Consumes the frame either way.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists, [`PortError::PortDown`] if the
    /// port is admin-down or link-down (the frame is not consumed by the driver in this case,
    /// but is still dropped by the table), or [`PortError::Driver`] if the driver rejects the
    /// frame.
    pub fn tx(&self, port_id: PortId, frame: PacketBuffer) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        if !entry.status.is_operational() {
            entry.stats.tx_dropped += 1;
            return Err(PortError::PortDown(port_id));
        }
        let len = frame.length();
        let dest = frame.meta().destination;
        match entry.driver.transmit(frame) {
            Ok(()) => {
                entry.stats.tx_packets += 1;
                entry.stats.tx_bytes += len as u64;
                entry.stats.record_tx_size(len);
                if dest.is_broadcast() {
                    entry.stats.tx_broadcast += 1;
                } else if dest.is_multicast() {
                    entry.stats.tx_multicast += 1;
                } else {
                    entry.stats.tx_unicast += 1;
                }
                Ok(())
            }
            Err(e) => {
                entry.stats.tx_errors += 1;
                Err(PortError::Driver(port_id, e))
            }
        }
    }

    /// Add or remove a MAC from a port's ingress MAC filter.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn set_mac_filter(&self, port_id: PortId, mac: Mac, add: bool) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        if add {
            entry.mac_filter.insert(mac);
        } else {
            entry.mac_filter.remove(&mac);
        }
        Ok(())
    }

    /// Add or remove a VLAN from a port's ingress VLAN filter.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn set_vlan_filter(&self, port_id: PortId, vlan: Vid, add: bool) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        if add {
            entry.vlan_filter.insert(vlan);
        } else {
            entry.vlan_filter.remove(&vlan);
        }
        Ok(())
    }

    /// Enable or disable loopback mode on a port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists, or [`PortError::Driver`] if the
    /// driver does not support loopback.
    pub fn set_loopback(&self, port_id: PortId, on: bool) -> Result<(), PortError> {
        let mut ports = self.ports.lock();
        let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
        entry
            .driver
            .set_config(on)
            .map_err(|e| PortError::Driver(port_id, e))?;
        entry.status.loopback = on;
        Ok(())
    }

    /// Simulate a link up/down transition, firing the registered link-event callback.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn simulate_link(&self, port_id: PortId, up: bool) -> Result<(), PortError> {
        let mut taken_cb = {
            let mut ports = self.ports.lock();
            let entry = ports.get_mut(&port_id).ok_or(PortError::NotFound(port_id))?;
            if entry.status.link_up == up {
                return Ok(());
            }
            entry.status.link_up = up;
            entry.link_event_callback.take()
        };
        if let Some(cb) = taken_cb.as_mut() {
            cb(port_id, up);
        }
        if let Some(cb) = taken_cb {
            let mut ports = self.ports.lock();
            if let Some(entry) = ports.get_mut(&port_id) {
                entry.link_event_callback = Some(cb);
            }
        }
        Ok(())
    }

    /// The MAC address assigned to a port (explicit or generated).
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn get_mac(&self, port_id: PortId) -> Result<Mac, PortError> {
        let ports = self.ports.lock();
        ports.get(&port_id).map(|e| e.mac).ok_or(PortError::NotFound(port_id))
    }

    /// The MTU configured for a port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] if no such port exists.
    pub fn get_mtu(&self, port_id: PortId) -> Result<u16, PortError> {
        let ports = self.ports.lock();
        ports
            .get(&port_id)
            .map(|e| e.config.mtu)
            .ok_or(PortError::NotFound(port_id))
    }

    /// All currently open port ids.
    #[must_use]
    pub fn port_ids(&self) -> Vec<PortId> {
        let ports = self.ports.lock();
        ports.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimulatorDriver;

    fn table_with_one_port() -> PortTable {
        let table = PortTable::default();
        table
            .open(PortId(0), PortConfig::default(), Box::new(SimulatorDriver::new()))
            .unwrap();
        table
    }

    #[test]
    fn open_generates_mac_when_unset() {
        let table = table_with_one_port();
        let mac = table.get_mac(PortId(0)).unwrap();
        assert!(mac.is_valid_src());
    }

    #[test]
    fn open_rejects_duplicate_port_id() {
        let table = table_with_one_port();
        let res = table.open(PortId(0), PortConfig::default(), Box::new(SimulatorDriver::new()));
        assert!(matches!(res, Err(PortError::AlreadyExists(_))));
    }

    #[test]
    fn tx_fails_when_link_down() {
        let table = table_with_one_port();
        let res = table.tx(PortId(0), PacketBuffer::allocate(64));
        assert!(matches!(res, Err(PortError::PortDown(_))));
    }

    #[test]
    fn tx_succeeds_when_operational() {
        let table = table_with_one_port();
        table.simulate_link(PortId(0), true).unwrap();
        table.tx(PortId(0), PacketBuffer::allocate(64)).unwrap();
        let stats = table.get_stats(PortId(0)).unwrap();
        assert_eq!(stats.tx_packets, 1);
    }

    #[test]
    fn clear_stats_resets_counters() {
        let table = table_with_one_port();
        table.simulate_link(PortId(0), true).unwrap();
        table.tx(PortId(0), PacketBuffer::allocate(64)).unwrap();
        table.clear_stats(PortId(0)).unwrap();
        let stats = table.get_stats(PortId(0)).unwrap();
        assert_eq!(stats.tx_packets, 0);
    }

    #[test]
    fn rx_invokes_callback_and_counts_unicast() {
        let table = table_with_one_port();
        let received = Arc::new(Mutex::new(0u32));
        let received2 = Arc::clone(&received);
        table
            .register_rx_callback(PortId(0), move |_frame| {
                *received2.lock() += 1;
            })
            .unwrap();
        table.rx(PortId(0), PacketBuffer::allocate(64)).unwrap();
        table.rx(PortId(0), PacketBuffer::allocate(64)).unwrap();
        assert_eq!(*received.lock(), 2);
        let stats = table.get_stats(PortId(0)).unwrap();
        assert_eq!(stats.rx_packets, 2);
    }

    #[test]
    fn close_removes_port() {
        let table = table_with_one_port();
        table.close(PortId(0)).unwrap();
        assert!(matches!(table.get_status(PortId(0)), Err(PortError::NotFound(_))));
    }

    #[test]
    fn configure_rejects_oversized_mtu() {
        let table = table_with_one_port();
        let mut cfg = PortConfig::default();
        cfg.mtu = 10000;
        assert!(matches!(
            table.configure(PortId(0), cfg),
            Err(PortError::InvalidParameter(_))
        ));
    }
}
