// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `BspConfig`: the opaque boot-time configuration record the external BSP layer hands to
//! [`crate::SwitchCore::boot`] (§6 "Persisted state").

use net::eth::mac::Mac;
use std::net::Ipv4Addr;

/// Board/product identifier. The simulator only distinguishes "simulated" from everything
/// else; a real BSP layer would enumerate actual hardware SKUs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardType {
    /// A fully virtual switch with no underlying hardware.
    Simulated,
    /// A board whose ports are backed by loopback drivers, for self-test.
    Loopback,
}

/// Boot-time configuration for a [`crate::SwitchCore`], supplied by the external BSP layer.
///
/// Every field has a spec-mandated default (§6), so a config can be built with
/// [`BspConfig::default`] and selectively overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BspConfig {
    /// Board identity.
    pub board_type: BoardType,
    /// Number of front-panel ports to create at boot (excludes the always-present CPU port).
    pub port_count: u16,
    /// Default MTU assigned to each port at boot.
    pub default_mtu: u16,
    /// Base MAC address used to derive each port's MAC via `Mac::generate`.
    pub base_mac: Mac,
    /// Seconds of MAC-table inactivity before a dynamic entry ages out. `0` disables aging.
    pub mac_aging_time: u64,
    /// Seconds before a reachable ARP entry transitions to stale.
    pub arp_timeout: u64,
    /// Hint for the initial capacity of the routing table's hash maps.
    pub routing_table_capacity: usize,
    /// Whether MAC learning is enabled on ports by default.
    pub learning_enabled_default: bool,
    /// STP bridge priority assigned to this switch.
    pub bridge_priority: u16,
    /// The switch's own routed-interface IPv4 address. §4.9 models one router-wide L3
    /// identity rather than per-port addresses, since [`driver::PortConfig`] carries no IP
    /// field; this is the address `IpProcessor` answers ARP for and treats as "local".
    pub router_ipv4: Ipv4Addr,
}

impl Default for BspConfig {
    fn default() -> Self {
        Self {
            board_type: BoardType::Simulated,
            port_count: 32,
            default_mtu: 1500,
            base_mac: Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x00]),
            mac_aging_time: l2::mac_table::DEFAULT_AGING_TIME,
            arp_timeout: routing::arp::DEFAULT_TIMEOUT,
            routing_table_capacity: 4096,
            learning_enabled_default: true,
            bridge_priority: 32768,
            router_ipv4: Ipv4Addr::new(10, 0, 0, 1),
        }
    }
}
