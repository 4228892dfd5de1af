// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `StpEngine`: 802.1D spanning tree port-state gating, BPDU processing, and timers (§4.6).
//!
//! BPDU layout follows the offsets given in the governing specification: protocol id at
//! 17-18, version at 19, type at 20, flags at 21, root id at 22-29, root path cost at
//! 30-33, bridge id at 34-41, port id at 42-43, message age at 44-45, max age at 46-47,
//! hello time at 48-49, forward delay at 50-51. A config BPDU is therefore 52 bytes and a
//! TCN BPDU, truncated right after the type byte, is 21 bytes with type 0x80.

use crate::PortId;
use concurrency::{Arc, Mutex};
use net::eth::mac::Mac;
use std::collections::HashMap;
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{debug, info};

trace_target!(LevelFilter::INFO, &["l2", "stp"]);

const TYPE_OFFSET: usize = 20;
const CONFIG_BPDU_LEN: usize = 52;
const TCN_BPDU_LEN: usize = 21;
const BPDU_TYPE_CONFIG: u8 = 0x00;
const BPDU_TYPE_TCN: u8 = 0x80;

/// Default hello interval, in seconds.
pub const DEFAULT_HELLO_TIME: u64 = 2;
/// Default max age, in seconds.
pub const DEFAULT_MAX_AGE: u64 = 20;
/// Default forward delay, in seconds.
pub const DEFAULT_FORWARD_DELAY: u64 = 15;

/// STP port state, per §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Administratively or link-down disabled; never forwards or learns.
    Disabled,
    /// Discarding; neither learns nor forwards.
    Blocking,
    /// Transitional state on the way to learning; does not yet learn or forward.
    Listening,
    /// Learns source MACs but does not yet forward.
    Learning,
    /// Fully operational: learns and forwards.
    Forwarding,
}

/// Bridge identifier: priority (lower is better) followed by the bridge's MAC, compared
/// lexicographically in that order, matching 802.1D's 8-byte bridge id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BridgeId {
    /// Configurable bridge priority; lower wins root election.
    pub priority: u16,
    /// The bridge's own MAC, used as a tiebreaker.
    pub mac: Mac,
}

impl BridgeId {
    fn parse(buf: &[u8; 8]) -> Self {
        let priority = u16::from_be_bytes([buf[0], buf[1]]);
        let mac = Mac([buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]]);
        Self { priority, mac }
    }

    fn write(self, buf: &mut [u8; 8]) {
        let [p0, p1] = self.priority.to_be_bytes();
        buf[0] = p0;
        buf[1] = p1;
        buf[2..8].copy_from_slice(&self.mac.0);
    }
}

/// A parsed config BPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigBpdu {
    /// Topology-change and topology-change-ack flags (bits 0 and 7).
    pub flags: u8,
    /// The root bridge as seen by the sender.
    pub root_id: BridgeId,
    /// The sender's cost to reach the root.
    pub root_path_cost: u32,
    /// The sender's own bridge id.
    pub bridge_id: BridgeId,
    /// The sender's port id on the link this BPDU arrived over.
    pub port_id: u16,
    /// Age of the root information, in 1/256 s units as on the wire... here, whole seconds.
    pub message_age: u16,
    /// Max age advertised by the root.
    pub max_age: u16,
    /// Hello time advertised by the root.
    pub hello_time: u16,
    /// Forward delay advertised by the root.
    pub forward_delay: u16,
}

impl ConfigBpdu {
    /// Serialize to a 52-byte config BPDU, zero-filling bytes before the protocol id field.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CONFIG_BPDU_LEN];
        buf[TYPE_OFFSET] = BPDU_TYPE_CONFIG;
        buf[21] = self.flags;
        let mut root_buf = [0u8; 8];
        self.root_id.write(&mut root_buf);
        buf[22..30].copy_from_slice(&root_buf);
        buf[30..34].copy_from_slice(&self.root_path_cost.to_be_bytes());
        let mut bridge_buf = [0u8; 8];
        self.bridge_id.write(&mut bridge_buf);
        buf[34..42].copy_from_slice(&bridge_buf);
        buf[42..44].copy_from_slice(&self.port_id.to_be_bytes());
        buf[44..46].copy_from_slice(&self.message_age.to_be_bytes());
        buf[46..48].copy_from_slice(&self.max_age.to_be_bytes());
        buf[48..50].copy_from_slice(&self.hello_time.to_be_bytes());
        buf[50..52].copy_from_slice(&self.forward_delay.to_be_bytes());
        buf
    }
}

/// A parsed BPDU: either a config BPDU carrying root/timer information, or a topology
/// change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bpdu {
    /// Config BPDU.
    Config(ConfigBpdu),
    /// Topology change notification.
    Tcn,
}

/// Errors raised by `StpEngine` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StpError {
    /// The buffer was too short to contain even a TCN BPDU.
    #[error("bpdu buffer too short: need at least {TCN_BPDU_LEN} bytes, got {0}")]
    TooShort(usize),
    /// The type byte did not match a known BPDU type.
    #[error("unrecognized bpdu type byte {0:#04x}")]
    UnknownType(u8),
    /// The referenced port is not known to this engine.
    #[error("port {0} is not registered with the stp engine")]
    UnknownPort(PortId),
}

impl Bpdu {
    /// Parse a BPDU out of its on-wire bytes per the offsets documented on this module.
    ///
    /// # Errors
    ///
    /// Returns [`StpError::TooShort`] if `buf` is shorter than a TCN BPDU, or
    /// [`StpError::UnknownType`] if the type byte is neither the config nor TCN value.
    pub fn parse(buf: &[u8]) -> Result<Self, StpError> {
        if buf.len() < TCN_BPDU_LEN {
            return Err(StpError::TooShort(buf.len()));
        }
        match buf[TYPE_OFFSET] {
            BPDU_TYPE_TCN => Ok(Bpdu::Tcn),
            BPDU_TYPE_CONFIG => {
                if buf.len() < CONFIG_BPDU_LEN {
                    return Err(StpError::TooShort(buf.len()));
                }
                let mut root_buf = [0u8; 8];
                root_buf.copy_from_slice(&buf[22..30]);
                let mut bridge_buf = [0u8; 8];
                bridge_buf.copy_from_slice(&buf[34..42]);
                Ok(Bpdu::Config(ConfigBpdu {
                    flags: buf[21],
                    root_id: BridgeId::parse(&root_buf),
                    root_path_cost: u32::from_be_bytes(buf[30..34].try_into().unwrap_or_default()),
                    bridge_id: BridgeId::parse(&bridge_buf),
                    port_id: u16::from_be_bytes([buf[42], buf[43]]),
                    message_age: u16::from_be_bytes([buf[44], buf[45]]),
                    max_age: u16::from_be_bytes([buf[46], buf[47]]),
                    hello_time: u16::from_be_bytes([buf[48], buf[49]]),
                    forward_delay: u16::from_be_bytes([buf[50], buf[51]]),
                }))
            }
            other => Err(StpError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Clone)]
struct PortInfo {
    state: PortState,
    path_cost: u32,
    admin_enabled: bool,
    link_up: bool,
    deadline: Option<u64>,
    message_age_deadline: Option<u64>,
}

impl PortInfo {
    fn new(path_cost: u32) -> Self {
        Self {
            state: PortState::Blocking,
            path_cost,
            admin_enabled: true,
            link_up: true,
            deadline: None,
            message_age_deadline: None,
        }
    }

    fn effective_state(&self) -> PortState {
        if !self.admin_enabled || !self.link_up {
            PortState::Disabled
        } else {
            self.state
        }
    }
}

struct Inner {
    bridge_id: BridgeId,
    root_id: BridgeId,
    root_path_cost: u32,
    root_port: Option<PortId>,
    ports: HashMap<PortId, PortInfo>,
    enabled: bool,
    hello_time: u64,
    max_age: u64,
    forward_delay: u64,
    topology_change: bool,
    topology_change_until: Option<u64>,
    last_hello_sent: u64,
    last_tcn_sent: u64,
}

impl Inner {
    fn is_root(&self) -> bool {
        self.root_port.is_none()
    }

    /// Reconfigure every port's state after a root-affecting event: the root port (if any)
    /// and every other enabled port move to listening; disabled ports are left alone.
    fn reconfigure(&mut self, now: u64) {
        for info in self.ports.values_mut() {
            if !info.admin_enabled || !info.link_up {
                info.state = PortState::Disabled;
                continue;
            }
            info.state = PortState::Listening;
            info.deadline = Some(now + self.forward_delay);
        }
    }

    fn become_root(&mut self, now: u64) {
        self.root_id = self.bridge_id;
        self.root_path_cost = 0;
        self.root_port = None;
        self.reconfigure(now);
    }
}

/// Per-bridge spanning tree state machine.
pub struct StpEngine {
    inner: Arc<Mutex<Inner>>,
}

impl StpEngine {
    /// Create a new engine, initially considering itself the root bridge.
    #[must_use]
    pub fn new(bridge_mac: Mac, priority: u16) -> Self {
        let bridge_id = BridgeId { priority, mac: bridge_mac };
        Self {
            inner: Arc::new(Mutex::new(Inner {
                bridge_id,
                root_id: bridge_id,
                root_path_cost: 0,
                root_port: None,
                ports: HashMap::new(),
                enabled: true,
                hello_time: DEFAULT_HELLO_TIME,
                max_age: DEFAULT_MAX_AGE,
                forward_delay: DEFAULT_FORWARD_DELAY,
                topology_change: false,
                topology_change_until: None,
                last_hello_sent: 0,
                last_tcn_sent: 0,
            })),
        }
    }

    /// Globally enable or disable STP. While disabled, `stp_can_forward` always returns true.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
    }

    /// Register a port with the given path cost, starting in `Blocking`.
    pub fn add_port(&self, port: PortId, path_cost: u32) {
        let mut inner = self.inner.lock();
        inner.ports.insert(port, PortInfo::new(path_cost));
    }

    /// Remove a port. If it was the root port, this bridge reverts to considering itself root.
    pub fn remove_port(&self, port: PortId, now: u64) {
        let mut inner = self.inner.lock();
        inner.ports.remove(&port);
        if inner.root_port == Some(port) {
            inner.become_root(now);
        }
    }

    /// Reflect a link-state change on `port`, disabling or re-blocking it as appropriate.
    ///
    /// # Errors
    ///
    /// Returns [`StpError::UnknownPort`] if `port` was never registered.
    pub fn set_link_state(&self, port: PortId, up: bool, now: u64) -> Result<(), StpError> {
        let mut inner = self.inner.lock();
        let was_root_port = inner.root_port == Some(port);
        let info = inner.ports.get_mut(&port).ok_or(StpError::UnknownPort(port))?;
        info.link_up = up;
        if up {
            info.state = PortState::Blocking;
        } else {
            info.state = PortState::Disabled;
        }
        if was_root_port && !up {
            inner.become_root(now);
        }
        Ok(())
    }

    /// Administratively enable or disable `port`.
    ///
    /// # Errors
    ///
    /// Returns [`StpError::UnknownPort`] if `port` was never registered.
    pub fn set_admin_state(&self, port: PortId, enabled: bool, now: u64) -> Result<(), StpError> {
        let mut inner = self.inner.lock();
        let was_root_port = inner.root_port == Some(port);
        let info = inner.ports.get_mut(&port).ok_or(StpError::UnknownPort(port))?;
        info.admin_enabled = enabled;
        if !enabled {
            info.state = PortState::Disabled;
        } else if info.link_up {
            info.state = PortState::Blocking;
        }
        if was_root_port && !enabled {
            inner.become_root(now);
        }
        Ok(())
    }

    /// Change this bridge's priority. If the new priority makes it the root, it becomes root
    /// immediately and reconfigures (§4.6).
    pub fn set_priority(&self, priority: u16, now: u64) {
        let mut inner = self.inner.lock();
        inner.bridge_id.priority = priority;
        let candidate = inner.bridge_id;
        if candidate < inner.root_id {
            inner.become_root(now);
        }
    }

    /// Current state of `port`, accounting for the STP-globally-disabled override.
    #[must_use]
    pub fn port_state(&self, port: PortId) -> Option<PortState> {
        let inner = self.inner.lock();
        if !inner.enabled {
            return inner.ports.contains_key(&port).then_some(PortState::Forwarding);
        }
        inner.ports.get(&port).map(PortInfo::effective_state)
    }

    /// True iff `port` may currently forward data frames: `Forwarding` state, or STP globally
    /// disabled.
    #[must_use]
    pub fn stp_can_forward(&self, port: PortId) -> bool {
        let inner = self.inner.lock();
        if !inner.enabled {
            return true;
        }
        inner
            .ports
            .get(&port)
            .is_some_and(|p| p.effective_state() == PortState::Forwarding)
    }

    /// True iff `port` may currently learn source MACs: `Learning` or `Forwarding` state, or
    /// STP globally disabled.
    #[must_use]
    pub fn stp_can_learn(&self, port: PortId) -> bool {
        let inner = self.inner.lock();
        if !inner.enabled {
            return true;
        }
        inner.ports.get(&port).is_some_and(|p| {
            matches!(p.effective_state(), PortState::Learning | PortState::Forwarding)
        })
    }

    /// This bridge's current notion of the root bridge id.
    #[must_use]
    pub fn root_id(&self) -> BridgeId {
        self.inner.lock().root_id
    }

    /// This bridge's own id.
    #[must_use]
    pub fn bridge_id(&self) -> BridgeId {
        self.inner.lock().bridge_id
    }

    /// The port through which the root is reached, if this bridge is not itself the root.
    #[must_use]
    pub fn root_port(&self) -> Option<PortId> {
        self.inner.lock().root_port
    }

    /// Process a BPDU received on `ingress_port` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StpError::UnknownPort`] if `ingress_port` was never registered via
    /// [`Self::add_port`].
    pub fn receive_bpdu(&self, ingress_port: PortId, buf: &[u8], now: u64) -> Result<(), StpError> {
        let bpdu = Bpdu::parse(buf)?;
        let mut inner = self.inner.lock();
        if !inner.ports.contains_key(&ingress_port) {
            return Err(StpError::UnknownPort(ingress_port));
        }
        match bpdu {
            Bpdu::Config(config) => {
                let candidate_cost = config.root_path_cost
                    + inner.ports.get(&ingress_port).map_or(0, |p| p.path_cost);
                let candidate = (config.root_id, candidate_cost, config.bridge_id, config.port_id);
                let current = (
                    inner.root_id,
                    inner.root_path_cost,
                    inner.bridge_id,
                    u16::from(ingress_port),
                );
                if candidate < current {
                    info!("accepting superior bpdu from port {ingress_port}: new root {:?}", config.root_id);
                    inner.root_id = config.root_id;
                    inner.root_path_cost = candidate_cost;
                    inner.root_port = Some(ingress_port);
                    inner.hello_time = u64::from(config.hello_time).max(1);
                    inner.max_age = u64::from(config.max_age).max(1);
                    inner.forward_delay = u64::from(config.forward_delay).max(1);
                    inner.reconfigure(now);
                }
                if let Some(info) = inner.ports.get_mut(&ingress_port) {
                    info.message_age_deadline = Some(now + inner.max_age);
                }
            }
            Bpdu::Tcn => {
                debug!("topology change notification received on port {ingress_port}");
                let until = now + 2 * inner.forward_delay;
                inner.topology_change = true;
                inner.topology_change_until = Some(until);
            }
        }
        Ok(())
    }

    /// Drive timers forward to `now`: message-age expiry, forward-delay progression, hello and
    /// TCN retransmission. Returns BPDUs to transmit as `(egress_port, bytes)` pairs.
    pub fn tick(&self, now: u64) -> Vec<(PortId, Vec<u8>)> {
        let mut inner = self.inner.lock();
        let mut to_send = Vec::new();

        if let Some(root_port) = inner.root_port {
            let expired = inner
                .ports
                .get(&root_port)
                .and_then(|p| p.message_age_deadline)
                .is_some_and(|deadline| now >= deadline);
            if expired {
                info!("root information aged out on port {root_port}, reclaiming root");
                inner.become_root(now);
            }
        }

        let port_ids: Vec<PortId> = inner.ports.keys().copied().collect();
        for port_id in port_ids {
            let Some(info) = inner.ports.get_mut(&port_id) else { continue };
            let Some(deadline) = info.deadline else { continue };
            if now < deadline {
                continue;
            }
            match info.state {
                PortState::Listening => {
                    info.state = PortState::Learning;
                    info.deadline = Some(now + inner.forward_delay);
                }
                PortState::Learning => {
                    info.state = PortState::Forwarding;
                    info.deadline = None;
                }
                _ => {}
            }
        }

        if inner.is_root() && now >= inner.last_hello_sent + inner.hello_time {
            inner.last_hello_sent = now;
            let bridge_id = inner.bridge_id;
            let root_id = inner.root_id;
            let root_path_cost = inner.root_path_cost;
            let hello_time = inner.hello_time;
            let max_age = inner.max_age;
            let forward_delay = inner.forward_delay;
            for (port_id, info) in &inner.ports {
                if !info.admin_enabled || !info.link_up {
                    continue;
                }
                let bpdu = ConfigBpdu {
                    flags: 0,
                    root_id,
                    root_path_cost,
                    bridge_id,
                    port_id: u16::from(*port_id),
                    message_age: 0,
                    max_age: u16::try_from(max_age).unwrap_or(u16::MAX),
                    hello_time: u16::try_from(hello_time).unwrap_or(u16::MAX),
                    forward_delay: u16::try_from(forward_delay).unwrap_or(u16::MAX),
                };
                to_send.push((*port_id, bpdu.write()));
            }
        }

        if let Some(until) = inner.topology_change_until {
            if now >= until {
                inner.topology_change = false;
                inner.topology_change_until = None;
            } else if let Some(root_port) = inner.root_port {
                if now >= inner.last_tcn_sent + 1 {
                    inner.last_tcn_sent = now;
                    let mut tcn = vec![0u8; TCN_BPDU_LEN];
                    tcn[TYPE_OFFSET] = BPDU_TYPE_TCN;
                    to_send.push((root_port, tcn));
                }
            }
        }

        to_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    fn remote_config_bpdu(root: BridgeId, bridge: BridgeId, cost: u32, port_id: u16) -> Vec<u8> {
        ConfigBpdu {
            flags: 0,
            root_id: root,
            root_path_cost: cost,
            bridge_id: bridge,
            port_id,
            message_age: 0,
            max_age: 20,
            hello_time: 2,
            forward_delay: 15,
        }
        .write()
    }

    #[test]
    fn new_engine_considers_itself_root() {
        let engine = StpEngine::new(mac(1), 32768);
        assert_eq!(engine.root_id(), engine.bridge_id());
        assert!(engine.root_port().is_none());
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(matches!(Bpdu::parse(&[0u8; 5]), Err(StpError::TooShort(5))));
    }

    #[test]
    fn parse_recognizes_tcn() {
        let mut buf = vec![0u8; TCN_BPDU_LEN];
        buf[TYPE_OFFSET] = 0x80;
        assert_eq!(Bpdu::parse(&buf).unwrap(), Bpdu::Tcn);
    }

    #[test]
    fn config_bpdu_round_trips_through_bytes() {
        let bpdu = ConfigBpdu {
            flags: 0,
            root_id: BridgeId { priority: 100, mac: mac(1) },
            root_path_cost: 4,
            bridge_id: BridgeId { priority: 200, mac: mac(2) },
            port_id: 3,
            message_age: 1,
            max_age: 20,
            hello_time: 2,
            forward_delay: 15,
        };
        let bytes = bpdu.write();
        assert_eq!(bytes.len(), CONFIG_BPDU_LEN);
        let parsed = Bpdu::parse(&bytes).unwrap();
        assert_eq!(parsed, Bpdu::Config(bpdu));
    }

    #[test]
    fn superior_bpdu_updates_root_and_reconfigures() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let superior_root = BridgeId { priority: 10, mac: mac(1) };
        let bytes = remote_config_bpdu(superior_root, superior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        assert_eq!(engine.root_id(), superior_root);
        assert_eq!(engine.root_port(), Some(1));
        assert_eq!(engine.port_state(1), Some(PortState::Listening));
    }

    #[test]
    fn inferior_bpdu_is_ignored() {
        let engine = StpEngine::new(mac(1), 10);
        engine.add_port(1, 4);
        let inferior_root = BridgeId { priority: 99, mac: mac(9) };
        let bytes = remote_config_bpdu(inferior_root, inferior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        assert_eq!(engine.root_id(), engine.bridge_id());
        assert!(engine.root_port().is_none());
    }

    #[test]
    fn port_progresses_listening_learning_forwarding_over_ticks() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let superior_root = BridgeId { priority: 10, mac: mac(1) };
        let bytes = remote_config_bpdu(superior_root, superior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        assert_eq!(engine.port_state(1), Some(PortState::Listening));
        engine.tick(15);
        assert_eq!(engine.port_state(1), Some(PortState::Learning));
        engine.tick(30);
        assert_eq!(engine.port_state(1), Some(PortState::Forwarding));
    }

    #[test]
    fn stp_can_forward_only_in_forwarding_state() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        assert!(!engine.stp_can_forward(1));
    }

    #[test]
    fn stp_disabled_globally_always_forwards() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        engine.set_enabled(false);
        assert!(engine.stp_can_forward(1));
    }

    #[test]
    fn link_down_disables_port_and_reclaims_root() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let superior_root = BridgeId { priority: 10, mac: mac(1) };
        let bytes = remote_config_bpdu(superior_root, superior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        engine.set_link_state(1, false, 1).unwrap();
        assert_eq!(engine.port_state(1), Some(PortState::Disabled));
        assert!(engine.root_port().is_none());
    }

    #[test]
    fn priority_change_to_lower_value_claims_root() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let superior_root = BridgeId { priority: 10, mac: mac(1) };
        let bytes = remote_config_bpdu(superior_root, superior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        engine.set_priority(1, 5);
        assert_eq!(engine.root_id(), engine.bridge_id());
        assert!(engine.root_port().is_none());
    }

    #[test]
    fn root_bridge_emits_hello_on_tick() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let sent = engine.tick(0);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1);
    }

    #[test]
    fn tcn_sets_topology_change_flag() {
        let engine = StpEngine::new(mac(9), 32768);
        engine.add_port(1, 4);
        let superior_root = BridgeId { priority: 10, mac: mac(1) };
        let bytes = remote_config_bpdu(superior_root, superior_root, 0, 1);
        engine.receive_bpdu(1, &bytes, 0).unwrap();
        let mut tcn = vec![0u8; TCN_BPDU_LEN];
        tcn[TYPE_OFFSET] = 0x80;
        engine.receive_bpdu(1, &tcn, 1).unwrap();
        let sent = engine.tick(2);
        assert!(sent.iter().any(|(port, _)| *port == 1));
    }

    #[test]
    fn unknown_port_errors() {
        let engine = StpEngine::new(mac(9), 32768);
        let bytes = vec![0u8; TCN_BPDU_LEN];
        let mut bytes = bytes;
        bytes[TYPE_OFFSET] = 0x80;
        assert!(matches!(
            engine.receive_bpdu(5, &bytes, 0),
            Err(StpError::UnknownPort(5))
        ));
    }
}
