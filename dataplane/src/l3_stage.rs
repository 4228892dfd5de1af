// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `L3Stage`: the routing processor that receives frames [`crate::l2_stage::L2Stage`] forwarded
//! because they were destined to the switch's own MAC, dispatches ARP frames to the
//! [`ArpCache`], and drives [`IpProcessor`] for everything else.
//!
//! Grounded on the teacher's `packet_processor` stage shape, generalized here to own the
//! routed identity (§4.9's one router-wide L3 address) instead of the teacher's VPC overlay
//! forwarding.

use concurrency::Arc;
use driver::{PortId as DriverPortId, PortTable};
use net::eth::Eth;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::packet::{Direction, PacketBuffer};
use net::vlan::Vlan;
use pipeline::{Processor, ProcessorAction};
use routing::{ArpAction, ArpCache};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{trace, warn};

use crate::ip_processor::{IpOutcome, IpProcessor};

trace_target!(LevelFilter::INFO, &["dataplane", "l3-stage"]);

/// Routes frames destined to the switch's own MAC: ARP request/reply handling plus the full
/// §4.9 IP forwarding pipeline.
pub struct L3Stage {
    arp_cache: Arc<ArpCache>,
    ip_processor: Arc<IpProcessor>,
    port_table: Arc<PortTable>,
    local_ip: Ipv4Addr,
    local_mac: Mac,
    clock: Arc<AtomicU64>,
}

impl L3Stage {
    /// Build a new stage over the switch's shared L3 engines.
    #[must_use]
    pub fn new(
        arp_cache: Arc<ArpCache>,
        ip_processor: Arc<IpProcessor>,
        port_table: Arc<PortTable>,
        local_ip: Ipv4Addr,
        local_mac: Mac,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            arp_cache,
            ip_processor,
            port_table,
            local_ip,
            local_mac,
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Strip the ethernet header (and any VLAN tag) from `data`, returning the payload and its
    /// ethertype. `L2Stage` already validated admission; this stage only needs the offset.
    fn strip_l2<'a>(&self, data: &'a [u8]) -> Option<(EthType, u16, &'a [u8])> {
        let (eth, consumed) = Eth::parse(data).ok()?;
        let mut offset = consumed.get();
        let ether_type = if eth.ether_type() == etherparse::EtherType::VLAN_TAGGED_FRAME {
            let (tag, tag_len) = Vlan::parse(&data[offset..]).ok()?;
            offset += tag_len.get();
            tag.ether_type()
        } else {
            eth.ether_type()
        };
        let eth_type = EthType::new(ether_type.0).ok()?;
        Some((eth_type, eth_type.to_u16(), &data[offset..]))
    }

    fn send_arp_action(&self, action: ArpAction) {
        let (packet, egress_port) = match action {
            ArpAction::SendRequest { target_ip, egress_port } => {
                (net::arp::ArpPacket::new_request(self.local_mac, self.local_ip, target_ip), egress_port)
            }
            ArpAction::SendReply { target_mac, target_ip, egress_port } => (
                net::arp::ArpPacket::new_reply(self.local_mac, self.local_ip, target_mac, target_ip),
                egress_port,
            ),
        };
        let Some(frame) = self.build_arp_frame(&packet) else {
            warn!("l3-stage: failed to build arp frame");
            return;
        };
        if let Err(e) = self.port_table.tx(DriverPortId(egress_port), frame) {
            trace!("l3-stage: arp tx on port {egress_port} failed: {e}");
        }
    }

    fn build_arp_frame(&self, packet: &net::arp::ArpPacket) -> Option<PacketBuffer> {
        let destination = match packet.operation {
            net::arp::ArpOp::Request => Mac::BROADCAST,
            net::arp::ArpOp::Reply => packet.target_mac,
        };
        let eth = Eth::new(self.local_mac, destination, etherparse::EtherType::ARP).ok()?;
        let mut frame = PacketBuffer::allocate(14 + net::arp::ArpPacket::WIRE_LEN);
        let mut eth_buf = [0u8; 14];
        eth.write(&mut eth_buf).ok()?;
        frame.append(&eth_buf).ok()?;
        let mut arp_buf = [0u8; net::arp::ArpPacket::WIRE_LEN];
        packet.write(&mut arp_buf);
        frame.append(&arp_buf).ok()?;
        let meta = frame.meta_mut();
        meta.direction = Direction::Internal;
        meta.source = self.local_mac;
        meta.destination = destination;
        meta.ether_type = EthType::ARP;
        Some(frame)
    }

    fn dispatch_pending(&self, drained: Vec<PacketBuffer>) {
        for queued in drained {
            let now = self.now();
            match self.ip_processor.resume_pending_v4(queued.data(), self.local_mac, now) {
                IpOutcome::Forwarded(frames) => {
                    for frame in frames {
                        let Some(egress) = frame.meta().egress_port else { continue };
                        #[allow(clippy::cast_possible_truncation)]
                        let egress_driver = DriverPortId(egress as u16);
                        if let Err(e) = self.port_table.tx(egress_driver, frame) {
                            trace!("l3-stage: resumed tx failed: {e}");
                        }
                    }
                }
                IpOutcome::Dropped(reason) => {
                    trace!("l3-stage: resumed datagram dropped: {reason:?}");
                }
                IpOutcome::Pending | IpOutcome::Delivered { .. } => {}
            }
        }
    }
}

impl Processor for L3Stage {
    fn name(&self) -> &str {
        "l3-stage"
    }

    fn process(&mut self, frame: &mut PacketBuffer) -> ProcessorAction {
        let Some(ingress_port) = frame.meta().ingress_port else {
            warn!("l3-stage: frame carries no ingress port; dropping");
            return ProcessorAction::Drop;
        };
        #[allow(clippy::cast_possible_truncation)]
        let ingress = ingress_port as u16;

        let Some((eth_type, _, payload)) = self.strip_l2(frame.data()) else {
            trace!("l3-stage: failed to re-derive l2 payload on port {ingress}");
            return ProcessorAction::Drop;
        };

        if eth_type == EthType::ARP {
            let now = self.now();
            match self.arp_cache.handle_frame(payload, ingress, now) {
                Ok((drained, action)) => {
                    self.dispatch_pending(drained);
                    if let Some(action) = action {
                        self.send_arp_action(action);
                    }
                }
                Err(e) => trace!("l3-stage: malformed arp frame on port {ingress}: {e}"),
            }
            return ProcessorAction::Consume;
        }

        if eth_type != EthType::IPV4 && eth_type != EthType::IPV6 {
            trace!("l3-stage: unhandled ethertype {:#06x} on port {ingress}", eth_type.to_u16());
            return ProcessorAction::Drop;
        }

        let now = self.now();
        let outcome = if eth_type == EthType::IPV4 {
            self.ip_processor.process_ipv4(payload, ingress, self.local_ip, self.local_mac, now)
        } else {
            self.ip_processor.process_ipv6(payload, ingress, self.local_mac, now)
        };

        match outcome {
            IpOutcome::Forwarded(frames) => {
                for egress_frame in frames {
                    let Some(egress) = egress_frame.meta().egress_port else { continue };
                    #[allow(clippy::cast_possible_truncation)]
                    let egress_driver = DriverPortId(egress as u16);
                    if let Err(e) = self.port_table.tx(egress_driver, egress_frame) {
                        trace!("l3-stage: forward tx failed: {e}");
                    }
                }
                ProcessorAction::Consume
            }
            IpOutcome::Delivered { protocol } => {
                trace!("l3-stage: datagram delivered locally on port {ingress}, protocol {protocol:?}");
                ProcessorAction::Consume
            }
            IpOutcome::Pending => ProcessorAction::Consume,
            IpOutcome::Dropped(reason) => {
                trace!("l3-stage: datagram dropped on port {ingress}: {reason:?}");
                ProcessorAction::Drop
            }
        }
    }
}
