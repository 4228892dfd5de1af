// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [`ArpPacket`]: the RFC 826 wire format for Ethernet/IPv4 address resolution.

use crate::eth::mac::Mac;
use std::net::Ipv4Addr;

/// ARP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    /// "Who has `target_ip`? Tell `sender_ip`."
    Request = 1,
    /// "`target_ip` is at `sender_mac`."
    Reply = 2,
}

/// Errors which can occur while parsing an [`ArpPacket`] from a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArpParseError {
    /// The buffer was shorter than the fixed 28-byte ARP-over-Ethernet payload.
    #[error("buffer too short to contain an ARP packet: need {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to parse an ARP packet.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// The hardware type field was not `1` (Ethernet).
    #[error("unsupported hardware type: {0}")]
    UnsupportedHwType(u16),
    /// The protocol type field was not `0x0800` (IPv4).
    #[error("unsupported protocol type: {0:#06x}")]
    UnsupportedProtoType(u16),
    /// The hardware address length field was not `6`.
    #[error("unsupported hardware address length: {0}")]
    UnsupportedHwLen(u8),
    /// The protocol address length field was not `4`.
    #[error("unsupported protocol address length: {0}")]
    UnsupportedProtoLen(u8),
    /// The operation field was neither `1` (request) nor `2` (reply).
    #[error("unsupported ARP operation: {0}")]
    UnsupportedOp(u16),
}

/// An ARP packet, exactly as specified by RFC 826 for Ethernet/IPv4: `hw_type=1`,
/// `proto_type=0x0800`, `hw_len=6`, `proto_len=4`. Always 28 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Request or reply.
    pub operation: ArpOp,
    /// MAC address of the sender.
    pub sender_mac: Mac,
    /// IPv4 address of the sender.
    pub sender_ip: Ipv4Addr,
    /// MAC address of the intended target. All-zero for a request (the value being resolved).
    pub target_mac: Mac,
    /// IPv4 address of the intended target.
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Hardware type for Ethernet, per RFC 826.
    pub const HW_TYPE_ETHERNET: u16 = 1;
    /// Protocol type for IPv4, matching the IPv4 ethertype.
    pub const PROTO_TYPE_IPV4: u16 = 0x0800;
    /// Length, in bytes, of an Ethernet hardware address.
    pub const HW_LEN: u8 = 6;
    /// Length, in bytes, of an IPv4 protocol address.
    pub const PROTO_LEN: u8 = 4;
    /// Total length, in bytes, of the wire representation of this packet.
    pub const WIRE_LEN: usize = 28;

    /// Build a request asking "who has `target_ip`?", sent from `sender_mac`/`sender_ip`.
    #[must_use]
    pub fn new_request(sender_mac: Mac, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: Mac::ZERO,
            target_ip,
        }
    }

    /// Build a reply asserting "`sender_ip` is at `sender_mac`", addressed back to the
    /// original requester (`target_mac`/`target_ip`).
    #[must_use]
    pub fn new_reply(
        sender_mac: Mac,
        sender_ip: Ipv4Addr,
        target_mac: Mac,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Parse an [`ArpPacket`] from `buf`, validating every fixed field per RFC 826.
    ///
    /// # Errors
    ///
    /// Returns [`ArpParseError`] if `buf` is too short, or if any fixed field does not match
    /// the Ethernet/IPv4 values this implementation supports.
    pub fn parse(buf: &[u8]) -> Result<Self, ArpParseError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(ArpParseError::TooShort {
                expected: Self::WIRE_LEN,
                actual: buf.len(),
            });
        }
        let hw_type = u16::from_be_bytes([buf[0], buf[1]]);
        if hw_type != Self::HW_TYPE_ETHERNET {
            return Err(ArpParseError::UnsupportedHwType(hw_type));
        }
        let proto_type = u16::from_be_bytes([buf[2], buf[3]]);
        if proto_type != Self::PROTO_TYPE_IPV4 {
            return Err(ArpParseError::UnsupportedProtoType(proto_type));
        }
        let hw_len = buf[4];
        if hw_len != Self::HW_LEN {
            return Err(ArpParseError::UnsupportedHwLen(hw_len));
        }
        let proto_len = buf[5];
        if proto_len != Self::PROTO_LEN {
            return Err(ArpParseError::UnsupportedProtoLen(proto_len));
        }
        let op = u16::from_be_bytes([buf[6], buf[7]]);
        let operation = match op {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            other => return Err(ArpParseError::UnsupportedOp(other)),
        };
        let sender_mac = Mac([buf[8], buf[9], buf[10], buf[11], buf[12], buf[13]]);
        let sender_ip = Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]);
        let target_mac = Mac([buf[18], buf[19], buf[20], buf[21], buf[22], buf[23]]);
        let target_ip = Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]);
        Ok(Self {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    /// Serialize this packet into the front of `buf`, which must be at least
    /// [`ArpPacket::WIRE_LEN`] bytes long.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`ArpPacket::WIRE_LEN`].
    pub fn write(&self, buf: &mut [u8]) {
        assert!(buf.len() >= Self::WIRE_LEN, "buffer too short for ARP packet");
        buf[0..2].copy_from_slice(&Self::HW_TYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&Self::PROTO_TYPE_IPV4.to_be_bytes());
        buf[4] = Self::HW_LEN;
        buf[5] = Self::PROTO_LEN;
        let op: u16 = match self.operation {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
        };
        buf[6..8].copy_from_slice(&op.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn request_round_trips() {
        let req = ArpPacket::new_request(mac(1), Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        req.write(&mut buf);
        let parsed = ArpPacket::parse(&buf).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(parsed.operation, ArpOp::Request);
        assert_eq!(parsed.target_mac, Mac::ZERO);
    }

    #[test]
    fn reply_round_trips() {
        let reply = ArpPacket::new_reply(
            mac(2),
            Ipv4Addr::new(10, 0, 0, 2),
            mac(1),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        reply.write(&mut buf);
        let parsed = ArpPacket::parse(&buf).unwrap();
        assert_eq!(parsed, reply);
        assert_eq!(parsed.operation, ArpOp::Reply);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(matches!(
            ArpPacket::parse(&buf),
            Err(ArpParseError::TooShort { expected: 28, actual: 10 })
        ));
    }

    #[test]
    fn parse_rejects_wrong_hw_type() {
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        ArpPacket::new_request(mac(1), Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED).write(&mut buf);
        buf[1] = 6; // corrupt hw_type to 6 (IEEE 802 Networks)
        assert!(matches!(
            ArpPacket::parse(&buf),
            Err(ArpParseError::UnsupportedHwType(6))
        ));
    }

    #[test]
    fn parse_rejects_wrong_proto_type() {
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        ArpPacket::new_request(mac(1), Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED).write(&mut buf);
        buf[2..4].copy_from_slice(&0x86ddu16.to_be_bytes());
        assert!(matches!(
            ArpPacket::parse(&buf),
            Err(ArpParseError::UnsupportedProtoType(0x86dd))
        ));
    }

    #[test]
    fn parse_rejects_bad_op() {
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        ArpPacket::new_request(mac(1), Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED).write(&mut buf);
        buf[6..8].copy_from_slice(&3u16.to_be_bytes());
        assert!(matches!(
            ArpPacket::parse(&buf),
            Err(ArpParseError::UnsupportedOp(3))
        ));
    }
}
