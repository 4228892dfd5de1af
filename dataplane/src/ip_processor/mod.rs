// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `IpProcessor`: the L3 forwarding pipeline (§4.9) — IPv4/IPv6 validation, TTL/hop-limit
//! decrement, local-delivery/route-lookup split, ARP resolution with a pending-frame queue,
//! egress fragmentation, IPv6 extension-header walking, and per-family reassembly.
//!
//! Grounded in the shape (not the VRF/overlay content) of the teacher's
//! `packet_processor/ipforward.rs`: one stateful processor owning the tables it drives,
//! dispatching on IP version, rewriting the Ethernet header at the very end.

pub mod reassembly;

use concurrency::{Arc, Mutex};
use driver::{PortId as DriverPortId, PortTable};
use etherparse::IpNumber;
use net::eth::Eth;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::ipv4::Ipv4;
use net::ipv6::Ipv6;
use net::packet::PacketBuffer;
use reassembly::{FragmentOutcome, ReassemblyKey, ReassemblyTable};
use routing::{ArpAction, ArpCache, ArpLookup, PortId, RoutingTable, Timestamp};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::{debug, trace, warn};

trace_target!(LevelFilter::INFO, &["dataplane", "ip-processor"]);

/// IPv6 extension header type numbers this processor recognizes and skips over (RFC 8200 §4.1).
mod ext {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const DESTINATION_OPTIONS: u8 = 60;
}

/// Why a frame was dropped by [`IpProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpDropReason {
    /// Header failed structural or checksum validation.
    InvalidHeader,
    /// TTL/hop-limit reached zero in transit.
    TtlExceeded,
    /// No route matched the destination.
    NoRoute,
    /// ARP resolution for the next hop failed after exhausting retries.
    ArpFailed,
    /// The frame exceeded the egress MTU and carried the don't-fragment bit.
    FragmentationNeeded,
    /// An IPv6 extension header type this processor does not understand.
    UnsupportedExtensionHeader,
    /// A fragment's offset would exceed the reassembly table's tracking window.
    TooManyFragments,
    /// The reassembly entry for this datagram timed out before completing.
    ReassemblyTimeout,
}

/// What the caller (`L3Stage`) should do with a frame after [`IpProcessor::process_ipv4`] or
/// [`IpProcessor::process_ipv6`] runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpOutcome {
    /// The datagram (now fully reassembled, if it arrived fragmented) was destined to this
    /// switch's own routed identity; `protocol` names the next-layer handler it would be
    /// dispatched to (none is implemented; this core stops at this boundary, per Non-goals).
    Delivered {
        /// Next-layer protocol number from the IP header.
        protocol: IpNumber,
    },
    /// One or more fully rewritten frames are ready for immediate transmission.
    Forwarded(Vec<PacketBuffer>),
    /// The next hop is unresolved; the frame has been queued on the ARP entry pending list
    /// (or silently dropped if that queue was already full, per §4.9 step 6).
    Pending,
    /// The frame was dropped; `reason` explains why.
    Dropped(IpDropReason),
}

/// Point-in-time counters for [`IpProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpProcessorStats {
    /// Frames delivered to the local routed identity.
    pub delivered: u64,
    /// Frames successfully forwarded out an egress port.
    pub forwarded: u64,
    /// Frames dropped for exceeding TTL/hop-limit.
    pub ttl_exceeded: u64,
    /// Frames dropped for matching no route.
    pub no_route: u64,
    /// Frames queued pending ARP resolution.
    pub arp_pending: u64,
    /// Frames dropped after ARP resolution failed.
    pub arp_failed: u64,
    /// Frames dropped for needing fragmentation with DF set.
    pub fragmentation_needed: u64,
    /// Datagrams this processor split into multiple egress fragments.
    pub fragmented: u64,
    /// Datagrams successfully reassembled from fragments.
    pub reassembled: u64,
    /// Reassembly entries reaped after timing out.
    pub reassembly_timeouts: u64,
    /// Frames dropped for failing header validation.
    pub invalid_header: u64,
}

/// The L3 forwarding pipeline: owns the reassembly tables and drives the shared
/// [`ArpCache`]/[`RoutingTable`]/[`PortTable`] to validate, route, resolve, and (re)fragment
/// IP traffic.
pub struct IpProcessor {
    arp_cache: Arc<ArpCache>,
    routing_table: Arc<RoutingTable>,
    port_table: Arc<PortTable>,
    reassembly_v4: Mutex<ReassemblyTable>,
    reassembly_v6: Mutex<ReassemblyTable>,
    stats: Mutex<IpProcessorStats>,
}

impl IpProcessor {
    /// Build a processor over the switch's shared L3 tables.
    #[must_use]
    pub fn new(arp_cache: Arc<ArpCache>, routing_table: Arc<RoutingTable>, port_table: Arc<PortTable>) -> Self {
        Self {
            arp_cache,
            routing_table,
            port_table,
            reassembly_v4: Mutex::new(ReassemblyTable::new()),
            reassembly_v6: Mutex::new(ReassemblyTable::new()),
            stats: Mutex::new(IpProcessorStats::default()),
        }
    }

    /// A snapshot of current counters.
    #[must_use]
    pub fn stats(&self) -> IpProcessorStats {
        *self.stats.lock()
    }

    /// Reap timed-out reassembly entries in both families.
    pub fn expire_reassembly(&self, now: Timestamp) {
        let now = std::time::Duration::from_secs(now);
        let v4 = self.reassembly_v4.lock().expire(now);
        let v6 = self.reassembly_v6.lock().expire(now);
        let reaped = v4 + v6;
        if reaped > 0 {
            self.stats.lock().reassembly_timeouts += reaped as u64;
            warn!("ip-processor: reaped {reaped} stale reassembly entries");
        }
    }

    /// Build a fresh IP datagram carrying `payload`, per §4.9 "Header construction".
    #[must_use]
    pub fn create_packet(
        &self,
        src: IpAddr,
        dst: IpAddr,
        protocol: IpNumber,
        ttl: u8,
        payload: &[u8],
        is_ipv6: bool,
    ) -> Option<PacketBuffer> {
        match (is_ipv6, src, dst) {
            (false, IpAddr::V4(src), IpAddr::V4(dst)) => {
                let mut header = Ipv4::new(src, dst, protocol, ttl).ok()?;
                header.set_payload_len(u16::try_from(payload.len()).ok()?).ok()?;
                header.update_checksum();
                let mut buf = PacketBuffer::allocate(header.header_len() + payload.len());
                let mut raw = vec![0u8; header.header_len()];
                header.write(&mut raw).ok()?;
                buf.append(&raw).ok()?;
                buf.append(payload).ok()?;
                Some(buf)
            }
            (true, IpAddr::V6(src), IpAddr::V6(dst)) => {
                let mut header = Ipv6::new(src, dst, protocol, ttl).ok()?;
                header.set_payload_length(u16::try_from(payload.len()).ok()?);
                let mut buf = PacketBuffer::allocate(Ipv6::LEN + payload.len());
                let mut raw = vec![0u8; Ipv6::LEN];
                header.write(&mut raw).ok()?;
                buf.append(&raw).ok()?;
                buf.append(payload).ok()?;
                Some(buf)
            }
            _ => None,
        }
    }

    /// Run the §4.9 IPv4 path over the datagram at `data` (an IPv4 header followed by its
    /// payload, with no ethernet/vlan framing), arrived on `ingress_port`.
    pub fn process_ipv4(&self, data: &[u8], ingress_port: PortId, local_ip: Ipv4Addr, local_mac: Mac, now: Timestamp) -> IpOutcome {
        let (mut header, consumed) = match Ipv4::parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!("ip-processor: invalid ipv4 header: {e}");
                self.stats.lock().invalid_header += 1;
                return IpOutcome::Dropped(IpDropReason::InvalidHeader);
            }
        };
        if !header.checksum_valid() {
            trace!("ip-processor: ipv4 checksum mismatch");
            self.stats.lock().invalid_header += 1;
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        let total_len = usize::from(header.total_len());
        if total_len > data.len() {
            trace!("ip-processor: ipv4 total_length {total_len} exceeds available {}", data.len());
            self.stats.lock().invalid_header += 1;
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        let payload = &data[consumed.get()..total_len];

        if header.decrement_ttl().is_err() || header.ttl() == 0 {
            debug!("ip-processor: ipv4 ttl exceeded from {:?}", header.source());
            self.stats.lock().ttl_exceeded += 1;
            return IpOutcome::Dropped(IpDropReason::TtlExceeded);
        }
        header.update_checksum();

        let destination = header.destination();
        let fragmented = header.fragment_offset() != 0 || header.more_fragments();

        if destination == local_ip {
            if fragmented {
                return self.reassemble_v4(&header, payload, now);
            }
            self.stats.lock().delivered += 1;
            return IpOutcome::Delivered { protocol: header.protocol() };
        }

        trace!("ip-processor: routing datagram from port {ingress_port} to {destination}");
        self.route_and_resolve_v4(&header, payload, local_mac, now)
    }

    /// Re-drive routing/ARP resolution for a datagram previously queued on
    /// [`ArpCache::enqueue_pending`], now that its next hop has (presumably) resolved.
    pub fn resume_pending_v4(&self, data: &[u8], local_mac: Mac, now: Timestamp) -> IpOutcome {
        let Ok((header, consumed)) = Ipv4::parse(data) else {
            self.stats.lock().invalid_header += 1;
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        };
        let payload = &data[consumed.get()..];
        self.route_and_resolve_v4(&header, payload, local_mac, now)
    }

    fn reassemble_v4(&self, header: &Ipv4, payload: &[u8], now: Timestamp) -> IpOutcome {
        let key = ReassemblyKey::v4(
            IpAddr::V4(header.source().inner()),
            IpAddr::V4(header.destination()),
            header.identification(),
            header.protocol(),
        );
        let outcome = self.reassembly_v4.lock().insert(
            key,
            header.fragment_offset(),
            header.more_fragments(),
            payload,
            std::time::Duration::from_secs(now),
        );
        match outcome {
            FragmentOutcome::Incomplete => IpOutcome::Pending,
            FragmentOutcome::Complete(_) => {
                self.stats.lock().reassembled += 1;
                IpOutcome::Delivered { protocol: header.protocol() }
            }
            FragmentOutcome::TooManyFragments => {
                self.stats.lock().invalid_header += 1;
                IpOutcome::Dropped(IpDropReason::TooManyFragments)
            }
        }
    }

    fn route_and_resolve_v4(&self, header: &Ipv4, payload: &[u8], local_mac: Mac, now: Timestamp) -> IpOutcome {
        let Some(route) = self.routing_table.lookup_v4(header.destination()) else {
            debug!("ip-processor: no route to {:?}", header.destination());
            self.stats.lock().no_route += 1;
            return IpOutcome::Dropped(IpDropReason::NoRoute);
        };
        let next_hop = match route.gateway {
            Some(IpAddr::V4(gw)) => gw,
            _ => header.destination(),
        };
        let egress_port = route.egress_port;
        let (lookup, action) = self.arp_cache.lookup(next_hop, egress_port, now);
        if let Some(ArpAction::SendRequest { .. }) = action {
            trace!("ip-processor: arp miss for {next_hop}, request sent");
        }
        let resolved_mac = match lookup {
            ArpLookup::Resolved(mac) => mac,
            ArpLookup::Pending => {
                self.stats.lock().arp_pending += 1;
                if let Some(queued) = self.queue_whole_datagram(header, payload) {
                    if let Err(e) = self.arp_cache.enqueue_pending(next_hop, queued) {
                        trace!("ip-processor: failed to queue pending frame for {next_hop}: {e}");
                    }
                }
                return IpOutcome::Pending;
            }
            ArpLookup::Failed => {
                self.stats.lock().arp_failed += 1;
                return IpOutcome::Dropped(IpDropReason::ArpFailed);
            }
        };

        let Ok(mtu) = self.port_table.get_mtu(DriverPortId(egress_port)) else {
            self.stats.lock().no_route += 1;
            return IpOutcome::Dropped(IpDropReason::NoRoute);
        };
        let egress_mac = self.port_table.get_mac(DriverPortId(egress_port)).unwrap_or(local_mac);

        let total_len = header.header_len() + payload.len();
        if total_len <= usize::from(mtu) {
            match self.build_egress_v4(header, payload, egress_mac, resolved_mac, egress_port) {
                Some(frame) => {
                    self.stats.lock().forwarded += 1;
                    IpOutcome::Forwarded(vec![frame])
                }
                None => IpOutcome::Dropped(IpDropReason::InvalidHeader),
            }
        } else if header.dont_fragment() {
            debug!("ip-processor: fragmentation needed but df set for {:?}", header.destination());
            self.stats.lock().fragmentation_needed += 1;
            IpOutcome::Dropped(IpDropReason::FragmentationNeeded)
        } else {
            match self.fragment_v4(header, payload, usize::from(mtu), egress_mac, resolved_mac, egress_port) {
                Some(frames) => {
                    let mut stats = self.stats.lock();
                    stats.forwarded += 1;
                    stats.fragmented += 1;
                    IpOutcome::Forwarded(frames)
                }
                None => IpOutcome::Dropped(IpDropReason::InvalidHeader),
            }
        }
    }

    /// Re-serialize `header`/`payload` as a plain IPv4 datagram (no ethernet framing), to be
    /// parked on the ARP entry's pending queue until the next hop resolves.
    fn queue_whole_datagram(&self, header: &Ipv4, payload: &[u8]) -> Option<PacketBuffer> {
        let mut buf = PacketBuffer::allocate(header.header_len() + payload.len());
        let mut raw = vec![0u8; header.header_len()];
        header.write(&mut raw).ok()?;
        buf.append(&raw).ok()?;
        buf.append(payload).ok()?;
        Some(buf)
    }

    fn build_egress_v4(
        &self,
        header: &Ipv4,
        payload: &[u8],
        egress_mac: Mac,
        dest_mac: Mac,
        egress_port: PortId,
    ) -> Option<PacketBuffer> {
        let eth = Eth::new(egress_mac, dest_mac, etherparse::EtherType::IPV4).ok()?;
        let mut frame = PacketBuffer::allocate(14 + header.header_len() + payload.len());
        let mut eth_buf = [0u8; 14];
        eth.write(&mut eth_buf).ok()?;
        frame.append(&eth_buf).ok()?;
        let mut ip_buf = vec![0u8; header.header_len()];
        header.write(&mut ip_buf).ok()?;
        frame.append(&ip_buf).ok()?;
        frame.append(payload).ok()?;
        let meta = frame.meta_mut();
        meta.direction = net::packet::Direction::Internal;
        meta.source = egress_mac;
        meta.destination = dest_mac;
        meta.ether_type = EthType::IPV4;
        meta.egress_port = Some(u32::from(egress_port));
        Some(frame)
    }

    /// Split `payload` behind `header` into MTU-sized fragments at 8-byte boundaries (§4.9
    /// step 7), each with its own rewritten Ethernet header and recomputed checksum.
    fn fragment_v4(
        &self,
        header: &Ipv4,
        payload: &[u8],
        mtu: usize,
        egress_mac: Mac,
        dest_mac: Mac,
        egress_port: PortId,
    ) -> Option<Vec<PacketBuffer>> {
        let header_len = header.header_len();
        let max_payload_per_fragment = (mtu.saturating_sub(header_len)) / 8 * 8;
        if max_payload_per_fragment == 0 {
            return None;
        }
        let mut frames = Vec::new();
        let mut offset = 0usize;
        while offset < payload.len() {
            let remaining = payload.len() - offset;
            let chunk_len = remaining.min(max_payload_per_fragment);
            let more = offset + chunk_len < payload.len();
            let mut fragment_header = header.clone();
            fragment_header.set_more_fragments(more);
            fragment_header.set_dont_fragment(false);
            let offset_units = u16::try_from(offset / 8).ok()?;
            fragment_header.set_fragment_offset(offset_units);
            fragment_header.set_payload_len(u16::try_from(chunk_len).ok()?).ok()?;
            fragment_header.update_checksum();
            let chunk = &payload[offset..offset + chunk_len];
            frames.push(self.build_egress_v4(&fragment_header, chunk, egress_mac, dest_mac, egress_port)?);
            offset += chunk_len;
        }
        Some(frames)
    }

    /// Run the §4.9 IPv6 path over the datagram at `data` (an IPv6 header followed by any
    /// extension headers, then payload), arrived on `ingress_port`. This simulator models no
    /// local IPv6 routed identity, so IPv6 traffic is always routed, never locally delivered.
    pub fn process_ipv6(&self, data: &[u8], ingress_port: PortId, local_mac: Mac, now: Timestamp) -> IpOutcome {
        let (mut header, consumed) = match Ipv6::parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!("ip-processor: invalid ipv6 header: {e}");
                self.stats.lock().invalid_header += 1;
                return IpOutcome::Dropped(IpDropReason::InvalidHeader);
            }
        };
        if header.decrement_hop_limit().is_err() || header.hop_limit() == 0 {
            debug!("ip-processor: ipv6 hop limit exceeded from {:?}", header.source());
            self.stats.lock().ttl_exceeded += 1;
            return IpOutcome::Dropped(IpDropReason::TtlExceeded);
        }

        let mut cursor = consumed.get();
        let mut next_header = header.next_header().0;
        let mut fragment: Option<(u16, bool, u32)> = None;
        loop {
            match next_header {
                ext::HOP_BY_HOP | ext::ROUTING | ext::DESTINATION_OPTIONS => {
                    if data.len() < cursor + 2 {
                        self.stats.lock().invalid_header += 1;
                        return IpOutcome::Dropped(IpDropReason::InvalidHeader);
                    }
                    let ext_next = data[cursor];
                    let hdr_ext_len = usize::from(data[cursor + 1]);
                    let ext_total = (hdr_ext_len + 1) * 8;
                    if data.len() < cursor + ext_total {
                        self.stats.lock().invalid_header += 1;
                        return IpOutcome::Dropped(IpDropReason::InvalidHeader);
                    }
                    cursor += ext_total;
                    next_header = ext_next;
                }
                ext::FRAGMENT => {
                    if data.len() < cursor + 8 {
                        self.stats.lock().invalid_header += 1;
                        return IpOutcome::Dropped(IpDropReason::InvalidHeader);
                    }
                    let ext_next = data[cursor];
                    let offset_and_flags = u16::from_be_bytes([data[cursor + 2], data[cursor + 3]]);
                    let offset_units = offset_and_flags >> 3;
                    let more = (offset_and_flags & 1) != 0;
                    let ident = u32::from_be_bytes([
                        data[cursor + 4],
                        data[cursor + 5],
                        data[cursor + 6],
                        data[cursor + 7],
                    ]);
                    fragment = Some((offset_units, more, ident));
                    cursor += 8;
                    next_header = ext_next;
                }
                _ => break,
            }
        }
        header.set_next_header(IpNumber(next_header));
        let payload = &data[cursor..];

        let destination = header.destination();
        if let Some((offset_units, more, ident)) = fragment {
            let key = ReassemblyKey::v6(
                IpAddr::V6(header.source().inner()),
                IpAddr::V6(destination),
                ident,
                header.next_header(),
            );
            let outcome = self.reassembly_v6.lock().insert(
                key,
                offset_units,
                more,
                payload,
                std::time::Duration::from_secs(now),
            );
            return match outcome {
                FragmentOutcome::Incomplete => IpOutcome::Pending,
                FragmentOutcome::Complete(_) => {
                    self.stats.lock().reassembled += 1;
                    IpOutcome::Delivered { protocol: header.next_header() }
                }
                FragmentOutcome::TooManyFragments => {
                    self.stats.lock().invalid_header += 1;
                    IpOutcome::Dropped(IpDropReason::TooManyFragments)
                }
            };
        }

        self.route_and_resolve_v6(&header, payload, ingress_port, local_mac, now)
    }

    fn route_and_resolve_v6(
        &self,
        header: &Ipv6,
        payload: &[u8],
        _ingress_port: PortId,
        local_mac: Mac,
        now: Timestamp,
    ) -> IpOutcome {
        let Some(route) = self.routing_table.lookup_v6(header.destination()) else {
            self.stats.lock().no_route += 1;
            return IpOutcome::Dropped(IpDropReason::NoRoute);
        };
        let next_hop_v4 = match route.gateway {
            // The simulator's ARP cache is IPv4-only; an IPv6 next hop resolves via the
            // directly connected link instead (no NDP state machine in scope, per Non-goals).
            Some(IpAddr::V4(gw)) => Some(gw),
            _ => None,
        };
        let egress_port = route.egress_port;
        let egress_mac = self.port_table.get_mac(DriverPortId(egress_port)).unwrap_or(local_mac);

        let resolved_mac = if let Some(gw) = next_hop_v4 {
            let (lookup, _) = self.arp_cache.lookup(gw, egress_port, now);
            match lookup {
                ArpLookup::Resolved(mac) => mac,
                ArpLookup::Pending => {
                    self.stats.lock().arp_pending += 1;
                    return IpOutcome::Pending;
                }
                ArpLookup::Failed => {
                    self.stats.lock().arp_failed += 1;
                    return IpOutcome::Dropped(IpDropReason::ArpFailed);
                }
            }
        } else {
            Mac::BROADCAST
        };

        let eth = match Eth::new(egress_mac, resolved_mac, etherparse::EtherType::IPV6) {
            Ok(eth) => eth,
            Err(_) => return IpOutcome::Dropped(IpDropReason::InvalidHeader),
        };
        let mut frame = PacketBuffer::allocate(14 + Ipv6::LEN + payload.len());
        let mut eth_buf = [0u8; 14];
        if eth.write(&mut eth_buf).is_err() {
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        if frame.append(&eth_buf).is_err() {
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        let mut ip_buf = [0u8; Ipv6::LEN];
        if header.write(&mut ip_buf).is_err() {
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        if frame.append(&ip_buf).is_err() || frame.append(payload).is_err() {
            return IpOutcome::Dropped(IpDropReason::InvalidHeader);
        }
        let meta = frame.meta_mut();
        meta.direction = net::packet::Direction::Internal;
        meta.source = egress_mac;
        meta.destination = resolved_mac;
        meta.ether_type = EthType::IPV6;
        meta.egress_port = Some(u32::from(egress_port));
        self.stats.lock().forwarded += 1;
        IpOutcome::Forwarded(vec![frame])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::eth::mac::Mac;
    use routing::RoutingTable;
    use routing::fib::{Route, RouteType};
    use std::net::Ipv4Addr;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    fn processor() -> (IpProcessor, Arc<ArpCache>, Arc<RoutingTable>, Arc<PortTable>) {
        let arp = Arc::new(ArpCache::new(Ipv4Addr::new(10, 0, 0, 1), mac(0xAA)));
        let routing = Arc::new(RoutingTable::new());
        let ports = Arc::new(PortTable::new(mac(0)));
        ports
            .open(driver::PortId(1), driver::PortConfig::default(), Box::new(driver::SimulatorDriver::new()))
            .unwrap();
        ports.simulate_link(driver::PortId(1), true).unwrap();
        let processor = IpProcessor::new(Arc::clone(&arp), Arc::clone(&routing), Arc::clone(&ports));
        (processor, arp, routing, ports)
    }

    fn build_v4(dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
        let mut header = Ipv4::new(Ipv4Addr::new(10, 0, 0, 9), dst, IpNumber::UDP, 64).unwrap();
        header.set_payload_len(u16::try_from(payload.len()).unwrap()).unwrap();
        header.update_checksum();
        let mut buf = vec![0u8; header.header_len()];
        header.write(&mut buf).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn local_destination_is_delivered() {
        let (processor, ..) = processor();
        let data = build_v4(Ipv4Addr::new(10, 0, 0, 1), b"hello");
        let outcome = processor.process_ipv4(&data, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        assert_eq!(outcome, IpOutcome::Delivered { protocol: IpNumber::UDP });
    }

    #[test]
    fn no_route_is_dropped() {
        let (processor, ..) = processor();
        let data = build_v4(Ipv4Addr::new(192, 168, 1, 1), b"hello");
        let outcome = processor.process_ipv4(&data, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        assert_eq!(outcome, IpOutcome::Dropped(IpDropReason::NoRoute));
    }

    #[test]
    fn unresolved_next_hop_is_pending() {
        let (processor, _arp, routing, _ports) = processor();
        routing
            .add_v4(
                "192.168.1.0/24".parse().unwrap(),
                Route {
                    egress_port: 1,
                    interface_name: "eth1".into(),
                    route_type: RouteType::Static,
                    distance: 1,
                    metric: 1,
                    gateway: None,
                    active: true,
                    timestamp: 0,
                },
            )
            .unwrap();
        let data = build_v4(Ipv4Addr::new(192, 168, 1, 1), b"hello");
        let outcome = processor.process_ipv4(&data, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        assert_eq!(outcome, IpOutcome::Pending);
    }

    #[test]
    fn resolved_next_hop_is_forwarded() {
        let (processor, arp, routing, _ports) = processor();
        routing
            .add_v4(
                "192.168.1.0/24".parse().unwrap(),
                Route {
                    egress_port: 1,
                    interface_name: "eth1".into(),
                    route_type: RouteType::Static,
                    distance: 1,
                    metric: 1,
                    gateway: None,
                    active: true,
                    timestamp: 0,
                },
            )
            .unwrap();
        arp.add_static(Ipv4Addr::new(192, 168, 1, 1), mac(0xBB), 1, 0);
        let data = build_v4(Ipv4Addr::new(192, 168, 1, 1), b"hello");
        let outcome = processor.process_ipv4(&data, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        match outcome {
            IpOutcome::Forwarded(frames) => {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].meta().destination, mac(0xBB));
            }
            other => panic!("expected forwarded, got {other:?}"),
        }
    }

    #[test]
    fn ttl_exhaustion_drops() {
        let (processor, ..) = processor();
        let mut header = Ipv4::new(Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(192, 168, 1, 1), IpNumber::UDP, 1).unwrap();
        header.set_payload_len(0).unwrap();
        header.update_checksum();
        let mut buf = vec![0u8; header.header_len()];
        header.write(&mut buf).unwrap();
        let outcome = processor.process_ipv4(&buf, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        assert_eq!(outcome, IpOutcome::Dropped(IpDropReason::TtlExceeded));
    }

    #[test]
    fn large_datagram_fragments_at_mtu() {
        let (processor, arp, routing, ports) = processor();
        ports.configure(driver::PortId(1), driver::PortConfig { mtu: 576, ..driver::PortConfig::default() }).unwrap();
        routing
            .add_v4(
                "192.168.1.0/24".parse().unwrap(),
                Route {
                    egress_port: 1,
                    interface_name: "eth1".into(),
                    route_type: RouteType::Static,
                    distance: 1,
                    metric: 1,
                    gateway: None,
                    active: true,
                    timestamp: 0,
                },
            )
            .unwrap();
        arp.add_static(Ipv4Addr::new(192, 168, 1, 1), mac(0xBB), 1, 0);
        let payload = vec![0xAB; 1400];
        let data = build_v4(Ipv4Addr::new(192, 168, 1, 1), &payload);
        let outcome = processor.process_ipv4(&data, 1, Ipv4Addr::new(10, 0, 0, 1), mac(0xAA), 0);
        match outcome {
            IpOutcome::Forwarded(frames) => assert!(frames.len() > 1),
            other => panic!("expected fragmented forward, got {other:?}"),
        }
    }

    #[test]
    fn create_packet_round_trips_through_parse() {
        let (processor, ..) = processor();
        let buf = processor
            .create_packet(
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                IpNumber::ICMP,
                64,
                b"ping",
                false,
            )
            .unwrap();
        let (header, consumed) = Ipv4::parse(buf.data()).unwrap();
        assert_eq!(header.destination(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(&buf.data()[consumed.get()..], b"ping");
    }
}
