// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port identity, configuration, status, and per-port counters.

use net::eth::mac::Mac;

/// A 16-bit port identifier, with three reserved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u16);

impl PortId {
    /// The all-ports flood target.
    pub const BROADCAST: PortId = PortId(0xFFFF);
    /// The CPU port: always present, always up, always full-duplex.
    pub const INTERNAL_CPU: PortId = PortId(0xFFFE);
    /// Sentinel for "no port".
    pub const INVALID: PortId = PortId(0xFFFD);

    /// Returns true if this is one of the three reserved ids.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, PortId::BROADCAST | PortId::INTERNAL_CPU | PortId::INVALID)
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Link duplex mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplex {
    /// Half-duplex link.
    Half,
    /// Full-duplex link.
    #[default]
    Full,
}

/// Per-port configuration, atomically replaced by `PortTable::configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Maximum transmission unit, default 1500, max 9600 (jumbo ceiling).
    pub mtu: u16,
    /// Explicit MAC address; if `None`, one is generated from the base MAC + port id.
    pub mac: Option<Mac>,
    /// Default VLAN applied to untagged ingress frames.
    pub pvid: u16,
    /// Negotiated link speed in Mbps.
    pub speed_mbps: u32,
    /// Negotiated duplex.
    pub duplex: Duplex,
    /// Whether the port honors received PAUSE frames.
    pub flow_control_rx: bool,
    /// Whether the port may emit PAUSE frames.
    pub flow_control_tx: bool,
    /// Whether MAC learning is enabled for frames ingressing this port.
    pub learning_enabled: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            mac: None,
            pvid: 1,
            speed_mbps: 1000,
            duplex: Duplex::Full,
            flow_control_rx: false,
            flow_control_tx: false,
            learning_enabled: true,
        }
    }
}

impl PortConfig {
    /// The maximum legal MTU (jumbo ceiling).
    pub const MAX_MTU: u16 = 9600;
}

/// Point-in-time link/admin state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStatus {
    /// Administrative up/down state, set by `set_admin_state`.
    pub admin_up: bool,
    /// Operational link-up state, set by `simulate_link`.
    pub link_up: bool,
    /// Whether the port is in loopback mode.
    pub loopback: bool,
}

impl PortStatus {
    /// A port is usable for tx/rx only when both admin and link state are up.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        self.admin_up && self.link_up
    }
}

/// Transmit-size histogram buckets, per §4.2: `<64, 64, 65-127, 128-255, 256-511, 512-1023,
/// 1024-1518, >=1519`.
pub const TX_SIZE_BUCKETS: usize = 8;

fn tx_bucket_index(len: usize) -> usize {
    match len {
        0..64 => 0,
        64 => 1,
        65..128 => 2,
        128..256 => 3,
        256..512 => 4,
        512..1024 => 5,
        1024..1519 => 6,
        _ => 7,
    }
}

/// 64-bit per-port counters. Reset only by explicit `clear_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStats {
    /// Frames received.
    pub rx_packets: u64,
    /// Frames transmitted.
    pub tx_packets: u64,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Receive errors (malformed frames, filter failures, etc).
    pub rx_errors: u64,
    /// Transmit errors (driver failures).
    pub tx_errors: u64,
    /// Frames dropped on ingress.
    pub rx_dropped: u64,
    /// Frames dropped on egress.
    pub tx_dropped: u64,
    /// Unicast frames received.
    pub rx_unicast: u64,
    /// Multicast frames received.
    pub rx_multicast: u64,
    /// Broadcast frames received.
    pub rx_broadcast: u64,
    /// Unicast frames transmitted.
    pub tx_unicast: u64,
    /// Multicast frames transmitted.
    pub tx_multicast: u64,
    /// Broadcast frames transmitted.
    pub tx_broadcast: u64,
    /// Frames with a bad FCS.
    pub rx_crc_errors: u64,
    /// Frames with an alignment error.
    pub rx_alignment_errors: u64,
    /// Frames larger than the configured MTU allows.
    pub rx_oversized: u64,
    /// Frames shorter than the 60-byte minimum.
    pub rx_undersized: u64,
    /// PAUSE frames received.
    pub rx_pause: u64,
    /// PAUSE frames transmitted.
    pub tx_pause: u64,
    /// Transmit-size histogram.
    pub tx_size_buckets: [u64; TX_SIZE_BUCKETS],
}

impl PortStats {
    /// Record one transmitted frame of `len` bytes into the size histogram.
    pub fn record_tx_size(&mut self, len: usize) {
        self.tx_size_buckets[tx_bucket_index(len)] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_identified() {
        assert!(PortId::BROADCAST.is_reserved());
        assert!(PortId::INTERNAL_CPU.is_reserved());
        assert!(PortId::INVALID.is_reserved());
        assert!(!PortId(0).is_reserved());
    }

    #[test]
    fn tx_bucket_boundaries() {
        assert_eq!(tx_bucket_index(0), 0);
        assert_eq!(tx_bucket_index(63), 0);
        assert_eq!(tx_bucket_index(64), 1);
        assert_eq!(tx_bucket_index(65), 2);
        assert_eq!(tx_bucket_index(127), 2);
        assert_eq!(tx_bucket_index(1518), 6);
        assert_eq!(tx_bucket_index(1519), 7);
        assert_eq!(tx_bucket_index(9216), 7);
    }

    #[test]
    fn record_tx_size_increments_correct_bucket() {
        let mut stats = PortStats::default();
        stats.record_tx_size(64);
        stats.record_tx_size(64);
        stats.record_tx_size(2000);
        assert_eq!(stats.tx_size_buckets[1], 2);
        assert_eq!(stats.tx_size_buckets[7], 1);
    }
}
