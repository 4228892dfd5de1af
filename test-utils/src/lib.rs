// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Shared frame-building helpers for the rest of the workspace's `#[cfg(test)]` modules:
//! constructing a valid Ethernet+IPv4/IPv6/ARP frame by hand in every test that needs one is
//! repetitive and error-prone, so the constructors live here once.

use etherparse::IpNumber;
use net::arp::ArpPacket;
use net::eth::Eth;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::ipv4::Ipv4;
use net::ipv6::Ipv6;
use net::packet::PacketBuffer;
use net::vlan::{Vid, Vlan};
use std::net::{Ipv4Addr, Ipv6Addr};

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// Build a bare Ethernet II frame (no VLAN tag) carrying `payload`, with
/// [`net::packet::FrameMeta`] left at its defaults.
///
/// # Panics
///
/// Panics if `ether_type` cannot be written, which only happens on a `PacketBuffer` allocation
/// bug in this helper itself.
#[must_use]
pub fn build_eth_frame(source: Mac, destination: Mac, ether_type: EthType, payload: &[u8]) -> PacketBuffer {
    let eth = Eth::new(source, destination, etherparse::EtherType(ether_type.to_u16())).expect("valid ethernet header");
    let mut frame = PacketBuffer::allocate(ETH_HEADER_LEN + payload.len());
    let mut header = [0u8; ETH_HEADER_LEN];
    eth.write(&mut header).expect("14-byte buffer fits an ethernet header");
    frame.append(&header).expect("allocated capacity covers the header");
    frame.append(payload).expect("allocated capacity covers the payload");
    frame
}

/// Build an 802.1Q-tagged Ethernet frame carrying `payload`.
///
/// # Panics
///
/// Panics on the same internal-allocation conditions as [`build_eth_frame`].
#[must_use]
pub fn build_tagged_eth_frame(source: Mac, destination: Mac, vid: Vid, ether_type: EthType, payload: &[u8]) -> PacketBuffer {
    let eth = Eth::new(source, destination, etherparse::EtherType::VLAN_TAGGED_FRAME).expect("valid ethernet header");
    let tag = Vlan::new(vid, etherparse::EtherType(ether_type.to_u16()));
    let mut frame = PacketBuffer::allocate(ETH_HEADER_LEN + VLAN_TAG_LEN + payload.len());
    let mut header = [0u8; ETH_HEADER_LEN];
    eth.write(&mut header).expect("14-byte buffer fits an ethernet header");
    frame.append(&header).expect("allocated capacity covers the header");
    let mut tag_buf = [0u8; VLAN_TAG_LEN];
    tag.write(&mut tag_buf).expect("4-byte buffer fits a vlan tag");
    frame.append(&tag_buf).expect("allocated capacity covers the tag");
    frame.append(payload).expect("allocated capacity covers the payload");
    frame
}

/// Build a raw IPv4 datagram (no Ethernet framing): a valid header over `payload`, checksum
/// computed, `ttl` as given.
///
/// # Panics
///
/// Panics if `payload` is too large to fit a 16-bit IPv4 payload-length field, or if the
/// resulting header fails to write into its own freshly sized buffer.
#[must_use]
pub fn build_ipv4_packet(source: Ipv4Addr, destination: Ipv4Addr, protocol: IpNumber, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let mut header = Ipv4::new(source, destination, protocol, ttl).expect("valid ipv4 header");
    header
        .set_payload_len(u16::try_from(payload.len()).expect("payload fits in 16 bits"))
        .expect("payload length fits the header's length field");
    header.update_checksum();
    let mut buf = vec![0u8; header.header_len()];
    header.write(&mut buf).expect("buffer sized to the header's own length");
    buf.extend_from_slice(payload);
    buf
}

/// Build a raw IPv6 datagram (no Ethernet framing) over `payload`.
///
/// # Panics
///
/// Panics if the header fails to write into its own freshly sized buffer.
#[must_use]
pub fn build_ipv6_packet(source: Ipv6Addr, destination: Ipv6Addr, next_header: IpNumber, hop_limit: u8, payload: &[u8]) -> Vec<u8> {
    let mut header = Ipv6::new(source, destination, next_header, hop_limit).expect("valid ipv6 header");
    header
        .set_payload_length(u16::try_from(payload.len()).expect("payload fits in 16 bits"))
        .expect("payload length fits the header's length field");
    let mut buf = vec![0u8; Ipv6::LEN];
    header.write(&mut buf).expect("buffer sized to the header's own length");
    buf.extend_from_slice(payload);
    buf
}

/// Build a full Ethernet+ARP request frame.
#[must_use]
pub fn build_arp_request_frame(sender_mac: Mac, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> PacketBuffer {
    let packet = ArpPacket::new_request(sender_mac, sender_ip, target_ip);
    let mut wire = [0u8; ArpPacket::WIRE_LEN];
    packet.write(&mut wire);
    build_eth_frame(sender_mac, Mac::BROADCAST, EthType::ARP, &wire)
}

/// Build a full Ethernet+ARP reply frame.
#[must_use]
pub fn build_arp_reply_frame(sender_mac: Mac, sender_ip: Ipv4Addr, target_mac: Mac, target_ip: Ipv4Addr) -> PacketBuffer {
    let packet = ArpPacket::new_reply(sender_mac, sender_ip, target_mac, target_ip);
    let mut wire = [0u8; ArpPacket::WIRE_LEN];
    packet.write(&mut wire);
    build_eth_frame(sender_mac, target_mac, EthType::ARP, &wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_frame_round_trips_through_parse() {
        let source = Mac([0x02, 0, 0, 0, 0, 1]);
        let destination = Mac([0x02, 0, 0, 0, 0, 2]);
        let frame = build_eth_frame(source, destination, EthType::IPV4, b"payload");
        let (eth, consumed) = Eth::parse(frame.data()).unwrap();
        assert_eq!(eth.source(), source);
        assert_eq!(eth.destination(), destination);
        assert_eq!(&frame.data()[consumed.get()..], b"payload");
    }

    #[test]
    fn ipv4_packet_has_valid_checksum() {
        let buf = build_ipv4_packet(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), IpNumber::UDP, 64, b"hi");
        let (header, _) = Ipv4::parse(&buf).unwrap();
        assert!(header.checksum_valid());
    }

    #[test]
    fn arp_request_frame_carries_target_ip() {
        let sender = Mac([0x02, 0, 0, 0, 0, 1]);
        let frame = build_arp_request_frame(sender, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        let (eth, consumed) = Eth::parse(frame.data()).unwrap();
        assert_eq!(eth.destination(), Mac::BROADCAST);
        let parsed = ArpPacket::parse(&frame.data()[consumed.get()..]).unwrap();
        assert_eq!(parsed.target_ip, Ipv4Addr::new(10, 0, 0, 2));
    }
}
