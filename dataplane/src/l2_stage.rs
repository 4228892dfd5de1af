// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `L2Stage`: the bridging processor (§4.1, §4.4, §4.5, §4.6) that MAC-learns, applies VLAN
//! admission/tagging, gates on spanning-tree port state, and floods or forwards frames to
//! their egress port(s).
//!
//! Grounded on the teacher's `packet_processor` stage shape (one `Processor` per concern,
//! mutate-then-forward), generalized here to drive [`l2::MacTable`], [`l2::VlanEngine`], and
//! [`l2::StpEngine`] instead of the teacher's VPC/overlay bridging.

use concurrency::Arc;
use driver::{PortId as DriverPortId, PortTable};
use etherparse::EtherType;
use l2::{MacTable, StpEngine, TagAction, VlanEngine};
use net::eth::Eth;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::packet::{Direction, PacketBuffer};
use net::vlan::{Pcp, Vid, Vlan};
use pipeline::{Processor, ProcessorAction};
use std::sync::atomic::{AtomicU64, Ordering};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{debug, trace, warn};

use crate::switch_core::BPDU_DESTINATION;

trace_target!(LevelFilter::INFO, &["dataplane", "l2-stage"]);

/// Bridges one ingress frame: learns, VLAN-classifies, STP-gates, then floods or forwards.
///
/// Only frames with [`Direction::Rx`] are inspected; anything else (frames a later stage
/// injected, or already consumed) passes through untouched.
pub struct L2Stage {
    mac_table: Arc<MacTable>,
    vlan_engine: Arc<VlanEngine>,
    stp_engine: Arc<StpEngine>,
    port_table: Arc<PortTable>,
    clock: Arc<AtomicU64>,
}

impl L2Stage {
    /// Build a new stage over the switch's shared L2 engines.
    #[must_use]
    pub fn new(
        mac_table: Arc<MacTable>,
        vlan_engine: Arc<VlanEngine>,
        stp_engine: Arc<StpEngine>,
        port_table: Arc<PortTable>,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            mac_table,
            vlan_engine,
            stp_engine,
            port_table,
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Re-frame `payload` for transmission on `egress`, applying `tag_action`.
    fn build_egress_frame(
        &self,
        source: Mac,
        destination: Mac,
        vid: Vid,
        pcp: Pcp,
        inner_ether_type: EtherType,
        tag_action: TagAction,
        payload: &[u8],
    ) -> Option<PacketBuffer> {
        let mut out = PacketBuffer::allocate(14 + 4 + payload.len());
        let header_ether_type = match tag_action {
            TagAction::Tag => EtherType::VLAN_TAGGED_FRAME,
            TagAction::Untag => inner_ether_type,
        };
        let eth = Eth::new(source, destination, header_ether_type).ok()?;
        let mut buf = [0u8; 14];
        eth.write(&mut buf).ok()?;
        out.append(&buf).ok()?;
        if matches!(tag_action, TagAction::Tag) {
            let tag = Vlan::new(vid, inner_ether_type);
            let mut vbuf = [0u8; 4];
            tag.write(&mut vbuf).ok()?;
            out.append(&vbuf).ok()?;
        }
        out.append(payload).ok()?;
        let meta = out.meta_mut();
        meta.direction = Direction::Internal;
        meta.source = source;
        meta.destination = destination;
        meta.vlan = vid.as_u16();
        meta.pcp = pcp;
        meta.tagged = matches!(tag_action, TagAction::Tag);
        Some(out)
    }

    fn send_to(
        &self,
        egress: u16,
        source: Mac,
        destination: Mac,
        vid: Vid,
        pcp: Pcp,
        inner_ether_type: EtherType,
        payload: &[u8],
    ) {
        let egress_driver = DriverPortId(egress);
        let tag_action = match self.vlan_engine.process_egress(egress, vid) {
            Ok(action) => action,
            Err(e) => {
                trace!("port {egress} not a member of vlan {vid}: {e}");
                return;
            }
        };
        let Some(frame) =
            self.build_egress_frame(source, destination, vid, pcp, inner_ether_type, tag_action, payload)
        else {
            warn!("failed to build egress frame for port {egress}");
            return;
        };
        if let Err(e) = self.port_table.tx(egress_driver, frame) {
            trace!("egress to port {egress} failed: {e}");
        }
    }

    fn flood(
        &self,
        ingress: u16,
        source: Mac,
        destination: Mac,
        vid: Vid,
        pcp: Pcp,
        inner_ether_type: EtherType,
        payload: &[u8],
    ) {
        for member in self.vlan_engine.members(vid) {
            if member == ingress {
                continue;
            }
            if !self.stp_engine.stp_can_forward(member) {
                continue;
            }
            self.send_to(member, source, destination, vid, pcp, inner_ether_type, payload);
        }
    }
}

impl Processor for L2Stage {
    fn name(&self) -> &str {
        "l2-stage"
    }

    fn process(&mut self, frame: &mut PacketBuffer) -> ProcessorAction {
        if frame.meta().direction != Direction::Rx {
            return ProcessorAction::Forward;
        }
        let Some(ingress_port) = frame.meta().ingress_port else {
            warn!("rx frame carries no ingress port; dropping");
            return ProcessorAction::Drop;
        };
        #[allow(clippy::cast_possible_truncation)]
        let ingress = ingress_port as u16;

        let data = frame.data();
        let (eth, consumed) = match Eth::parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!("port {ingress}: malformed ethernet header: {e}");
                return ProcessorAction::Drop;
            }
        };
        let offset = consumed.get();

        if eth.destination() == BPDU_DESTINATION {
            if let Err(e) = self.stp_engine.receive_bpdu(ingress, &data[offset..], self.now()) {
                trace!("port {ingress}: malformed bpdu: {e}");
            }
            return ProcessorAction::Consume;
        }

        let mut offset = offset;
        let (vid, pcp, inner_ether_type, tagged) = if eth.ether_type() == EtherType::VLAN_TAGGED_FRAME {
            let Ok((tag, tag_len)) = Vlan::parse(&data[offset..]) else {
                trace!("port {ingress}: malformed vlan tag");
                return ProcessorAction::Drop;
            };
            let Ok(vid) = tag.vid() else {
                trace!("port {ingress}: invalid vlan id on tag");
                return ProcessorAction::Drop;
            };
            if let Err(e) = self.vlan_engine.process_ingress(ingress, Some(vid)) {
                trace!("port {ingress}: vlan admission denied for tagged frame: {e}");
                return ProcessorAction::Drop;
            }
            offset += tag_len.get();
            (vid, tag.pcp(), tag.ether_type(), true)
        } else {
            let vid = match self.vlan_engine.process_ingress(ingress, None) {
                Ok(vid) => vid,
                Err(e) => {
                    trace!("port {ingress}: vlan admission denied for untagged frame: {e}");
                    return ProcessorAction::Drop;
                }
            };
            (vid, Pcp(0), eth.ether_type(), false)
        };

        let source = eth.source();
        let destination = eth.destination();
        let payload = &frame.data()[offset..];
        let payload_len = payload.len();

        {
            let meta = frame.meta_mut();
            meta.source = source;
            meta.destination = destination;
            meta.vlan = vid.as_u16();
            meta.pcp = pcp;
            meta.tagged = tagged;
            if let Ok(eth_type) = EthType::new(inner_ether_type.0) {
                meta.ether_type = eth_type;
            }
        }

        if self.stp_engine.stp_can_learn(ingress) {
            if let Err(e) = self.mac_table.learn(source, vid.as_u16(), ingress, self.now()) {
                trace!("port {ingress}: mac learning failed: {e}");
            }
        }

        if !self.stp_engine.stp_can_forward(ingress) {
            trace!("port {ingress}: stp state forbids forwarding; dropping");
            return ProcessorAction::Drop;
        }

        let own_mac = self.port_table.get_mac(DriverPortId(ingress)).ok();
        if own_mac == Some(destination) {
            debug!("port {ingress}: frame destined to own mac, passing to l3 stage");
            return ProcessorAction::Forward;
        }

        let payload_owned = frame.data()[offset..offset + payload_len].to_vec();
        if destination.is_broadcast() || destination.is_multicast() {
            self.flood(ingress, source, destination, vid, pcp, inner_ether_type, &payload_owned);
            return ProcessorAction::Consume;
        }

        match self.mac_table.lookup(destination, vid.as_u16()) {
            Ok(egress) if egress == ingress => ProcessorAction::Drop,
            Ok(egress) => {
                if self.stp_engine.stp_can_forward(egress) {
                    self.send_to(egress, source, destination, vid, pcp, inner_ether_type, &payload_owned);
                }
                ProcessorAction::Consume
            }
            Err(_) => {
                self.flood(ingress, source, destination, vid, pcp, inner_ether_type, &payload_owned);
                ProcessorAction::Consume
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driver::{PortConfig, SimulatorDriver};

    const VID: u16 = 1;

    fn stage() -> (L2Stage, Arc<MacTable>, Arc<VlanEngine>, Arc<StpEngine>, Arc<PortTable>) {
        let mac_table = Arc::new(MacTable::new(l2::MacTableConfig::default()));
        let vlan_engine = Arc::new(VlanEngine::new());
        let vid = Vid::new(VID).unwrap();
        vlan_engine.create_vlan(vid, "default").unwrap();
        let stp_engine = Arc::new(StpEngine::new(Mac([0x02, 0, 0, 0, 0, 0xFF]), 0x8000));
        stp_engine.set_enabled(false);
        let port_table = Arc::new(PortTable::new(Mac([0x02, 0, 0, 0, 0, 0])));
        for port in [1u16, 2u16] {
            port_table.open(DriverPortId(port), PortConfig::default(), Box::new(SimulatorDriver::new())).unwrap();
            port_table.simulate_link(DriverPortId(port), true).unwrap();
            vlan_engine.add_port(port, vid, TagAction::Untag).unwrap();
            stp_engine.add_port(port, 1);
        }
        let clock = Arc::new(AtomicU64::new(0));
        let stage = L2Stage::new(
            Arc::clone(&mac_table),
            Arc::clone(&vlan_engine),
            Arc::clone(&stp_engine),
            Arc::clone(&port_table),
            clock,
        );
        (stage, mac_table, vlan_engine, stp_engine, port_table)
    }

    fn build_frame(source: Mac, destination: Mac, ether_type: EtherType, ingress: u16, payload: &[u8]) -> PacketBuffer {
        let eth = Eth::new(source, destination, ether_type).unwrap();
        let mut frame = PacketBuffer::allocate(14 + payload.len());
        let mut buf = [0u8; 14];
        eth.write(&mut buf).unwrap();
        frame.append(&buf).unwrap();
        frame.append(payload).unwrap();
        let meta = frame.meta_mut();
        meta.direction = Direction::Rx;
        meta.ingress_port = Some(u32::from(ingress));
        frame
    }

    #[test]
    fn unknown_unicast_destination_floods() {
        let (mut stage, mac_table, ..) = stage();
        let src = Mac([0x02, 0, 0, 0, 0, 1]);
        let dst = Mac([0x02, 0, 0, 0, 0, 2]);
        let mut frame = build_frame(src, dst, EtherType::IPV4, 1, b"hello");
        let action = stage.process(&mut frame);
        assert_eq!(action, ProcessorAction::Consume);
        assert_eq!(mac_table.lookup(src, VID), Ok(1));
    }

    #[test]
    fn learned_destination_forwards_directly() {
        let (mut stage, ..) = stage();
        let port2_mac = Mac([0x02, 0, 0, 0, 0, 2]);
        let mut learn_frame = build_frame(port2_mac, Mac::BROADCAST, EtherType::IPV4, 2, b"hi");
        stage.process(&mut learn_frame);

        let src = Mac([0x02, 0, 0, 0, 0, 1]);
        let mut frame = build_frame(src, port2_mac, EtherType::IPV4, 1, b"hello");
        let action = stage.process(&mut frame);
        assert_eq!(action, ProcessorAction::Consume);
    }

    #[test]
    fn frame_to_own_mac_forwards_to_l3_stage() {
        let (mut stage, _mac_table, _vlan, _stp, port_table) = stage();
        let own_mac = port_table.get_mac(DriverPortId(1)).unwrap();
        let src = Mac([0x02, 0, 0, 0, 0, 9]);
        let mut frame = build_frame(src, own_mac, EtherType::IPV4, 1, b"hello");
        let action = stage.process(&mut frame);
        assert_eq!(action, ProcessorAction::Forward);
    }

    #[test]
    fn blocked_port_drops_instead_of_learning() {
        let (mut stage, mac_table, _vlan, stp, _ports) = stage();
        stp.set_enabled(true);
        // Port never had its link state brought up, so it stays in `Blocking`.
        let src = Mac([0x02, 0, 0, 0, 0, 1]);
        let dst = Mac([0x02, 0, 0, 0, 0, 2]);
        let mut frame = build_frame(src, dst, EtherType::IPV4, 1, b"hello");
        let action = stage.process(&mut frame);
        assert_eq!(action, ProcessorAction::Drop);
        assert!(mac_table.lookup(src, VID).is_err());
    }

    #[test]
    fn bpdu_frame_is_consumed_not_bridged() {
        let (mut stage, mac_table, ..) = stage();
        let src = Mac([0x02, 0, 0, 0, 0, 1]);
        let mut frame = build_frame(src, BPDU_DESTINATION, EtherType(0), 1, &[0u8; 4]);
        let action = stage.process(&mut frame);
        assert_eq!(action, ProcessorAction::Consume);
        assert!(mac_table.lookup(src, VID).is_err());
    }
}
