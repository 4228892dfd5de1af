// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ipv4 header type and manipulation

pub use crate::ipv4::addr::{MulticastAddrError, UnicastIpv4Addr};
pub use crate::ipv4::prefix::Contains;
use crate::ipv4::dscp::Dscp;
use etherparse::{IpEcn, IpNumber, Ipv4Header};
use std::net::Ipv4Addr;
use std::num::NonZero;

pub mod addr;
pub mod dscp;
pub mod prefix;

/// An IPv4 header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ipv4 {
    pub(crate) header: Ipv4Header,
}

/// Error which is triggered when decrementing the TTL which is already zero.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("ttl is already zero")]
pub struct TtlAlreadyZero;

/// Error which is triggered during construction or parsing of an [`Ipv4`] header.
#[derive(thiserror::Error, Debug)]
pub enum Ipv4Error {
    /// The source address is invalid because it is multicast.
    #[error(transparent)]
    InvalidSourceAddr(MulticastAddrError),
    /// Error triggered when etherparse fails to parse the header.
    #[error(transparent)]
    Invalid(etherparse::err::ipv4::HeaderSliceError),
}

impl Ipv4 {
    /// The minimum length of an IPv4 header (i.e., a header with no options)
    pub const MIN_LEN: usize = 20;
    /// The maximum length of an IPv4 header (i.e., a header with full options)
    pub const MAX_LEN: usize = 60;

    /// Create a new IPv4 header.
    ///
    /// # Errors
    ///
    /// Returns [`Ipv4Error::InvalidSourceAddr`] if `source` is a multicast address.
    pub fn new(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: IpNumber,
        ttl: u8,
    ) -> Result<Self, Ipv4Error> {
        UnicastIpv4Addr::new(source).map_err(Ipv4Error::InvalidSourceAddr)?;
        let mut header = Ipv4Header::default();
        header.source = source.octets();
        header.destination = destination.octets();
        header.protocol = protocol;
        header.time_to_live = ttl;
        Ok(Self { header })
    }

    /// Get the source ip address of the header
    #[must_use]
    pub fn source(&self) -> UnicastIpv4Addr {
        UnicastIpv4Addr::new(Ipv4Addr::from(self.header.source)).unwrap_or_else(|_| unreachable!())
    }

    /// Get the destination ip address of the header
    #[must_use]
    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.destination)
    }

    /// Get the next layer protocol which follows this header.
    #[must_use]
    pub fn protocol(&self) -> IpNumber {
        self.header.protocol
    }

    /// Length of the header in bytes (options are not supported by this implementation).
    #[must_use]
    pub fn header_len(&self) -> usize {
        self.header.header_len()
    }

    /// Value of total length ip header field
    #[must_use]
    pub fn total_len(&self) -> u16 {
        self.header.total_len
    }

    /// The number of routing hops the packet is allowed to take.
    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.header.time_to_live
    }

    /// Get the header's [differentiated services code point].
    ///
    /// [differentiated services code point]: https://en.wikipedia.org/wiki/Differentiated_services
    #[must_use]
    pub fn dscp(&self) -> Dscp {
        Dscp::from(self.header.dscp)
    }

    /// Get the header's [explicit congestion notification]
    ///
    /// [explicit congestion notification]: https://en.wikipedia.org/wiki/Explicit_Congestion_Notification
    #[must_use]
    pub fn ecn(&self) -> IpEcn {
        self.header.ecn
    }

    /// Returns true if the "don't fragment" bit is set in this header.
    #[must_use]
    pub fn dont_fragment(&self) -> bool {
        self.header.dont_fragment
    }

    /// Returns true if the "more-fragments" bit is set in this header.
    #[must_use]
    pub fn more_fragments(&self) -> bool {
        self.header.more_fragments
    }

    /// In case this message contains parts of a fragmented packet, the fragment offset is the
    /// offset of payload the current message relative to the original payload of the message.
    #[must_use]
    pub fn fragment_offset(&self) -> u16 {
        self.header.fragment_offset.value()
    }

    /// Return the headers "identification".
    /// See [IP fragmentation]
    ///
    /// [IP fragmentation]: https://en.wikipedia.org/wiki/IP_fragmentation
    #[must_use]
    pub fn identification(&self) -> u16 {
        self.header.identification
    }

    /// Set the source ip of the header.
    pub fn set_source(&mut self, source: UnicastIpv4Addr) -> &mut Self {
        self.header.source = source.inner().octets();
        self
    }

    /// Set the destination ip address for this header.
    pub fn set_destination(&mut self, dest: Ipv4Addr) -> &mut Self {
        self.header.destination = dest.octets();
        self
    }

    /// Set the header's time to live
    /// (i.e., the maximum number of routing hops it can traverse without being dropped).
    pub fn set_ttl(&mut self, ttl: u8) -> &mut Self {
        self.header.time_to_live = ttl;
        self
    }

    /// Attempt to decrement the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`TtlAlreadyZero`] if the ttl is already at zero. This outcome indicates the
    /// packet must be dropped (and, in a real router, an ICMP time-exceeded generated).
    pub fn decrement_ttl(&mut self) -> Result<(), TtlAlreadyZero> {
        if self.header.time_to_live == 0 {
            return Err(TtlAlreadyZero);
        }
        self.header.time_to_live -= 1;
        Ok(())
    }

    /// Set the header's [differentiated services code point].
    ///
    /// [differentiated services code point]: https://en.wikipedia.org/wiki/Differentiated_services
    pub fn set_dscp(&mut self, dscp: Dscp) -> &mut Self {
        self.header.dscp = dscp.into();
        self
    }

    /// Set the next layer protocol.
    pub fn set_protocol(&mut self, protocol: IpNumber) -> &mut Self {
        self.header.protocol = protocol;
        self
    }

    /// Set the "don't fragment" bit.
    pub fn set_dont_fragment(&mut self, dont_fragment: bool) -> &mut Self {
        self.header.dont_fragment = dont_fragment;
        self
    }

    /// Set the "more fragments" bit.
    pub fn set_more_fragments(&mut self, more_fragments: bool) -> &mut Self {
        self.header.more_fragments = more_fragments;
        self
    }

    /// Set the fragment offset, in 8-byte units.
    ///
    /// # Panics
    ///
    /// Panics if `offset` exceeds the 13-bit fragment-offset field's range (8191); callers
    /// computing offsets from a bounded fragmentation loop never reach this value.
    pub fn set_fragment_offset(&mut self, offset: u16) -> &mut Self {
        self.header.fragment_offset = offset.try_into().unwrap_or_else(|_| {
            unreachable!("fragment offset {offset} exceeds the 13-bit field")
        });
        self
    }

    /// Set the identification field used to associate fragments of one original datagram.
    pub fn set_identification(&mut self, identification: u16) -> &mut Self {
        self.header.identification = identification;
        self
    }

    /// Set the length _of the payload_ of the ipv4 packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is too large to represent in the 16-bit total-length field.
    pub fn set_payload_len(&mut self, payload_len: u16) -> Result<(), etherparse::err::ValueTooBigError<usize>> {
        self.header.set_payload_len(payload_len as usize)
    }

    /// Recompute and set the header checksum from the current header contents.
    pub fn update_checksum(&mut self) {
        self.header.header_checksum = self.header.calc_header_checksum();
    }

    /// Verify that the header's checksum field matches the checksum computed over its contents.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.header.header_checksum == self.header.calc_header_checksum()
    }

    /// Parse an [`Ipv4`] header from the front of `buf`.
    ///
    /// Returns the parsed header and the number of bytes consumed. IP options, if present, are
    /// skipped but not retained.
    ///
    /// # Errors
    ///
    /// Returns [`Ipv4Error::Invalid`] if etherparse rejects the buffer, or
    /// [`Ipv4Error::InvalidSourceAddr`] if the source address is a multicast address.
    pub fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), Ipv4Error> {
        let (header, rest) =
            Ipv4Header::from_slice(buf).map_err(Ipv4Error::Invalid)?;
        UnicastIpv4Addr::new(Ipv4Addr::from(header.source))
            .map_err(Ipv4Error::InvalidSourceAddr)?;
        let consumed = buf.len() - rest.len();
        let consumed = NonZero::new(consumed).unwrap_or_else(|| unreachable!());
        Ok((Self { header }, consumed))
    }

    /// Serialize this [`Ipv4`] header into the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` is too short to hold the serialized header.
    pub fn write(&self, buf: &mut [u8]) -> Result<NonZero<usize>, etherparse::err::ipv4::HeaderWriteError> {
        let len = self.header_len();
        self.header.write_to_slice(&mut buf[..len])?;
        Ok(NonZero::new(len).unwrap_or_else(|| unreachable!()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample() -> Ipv4 {
        Ipv4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            IpNumber::UDP,
            64,
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_multicast_source() {
        assert!(matches!(
            Ipv4::new(
                Ipv4Addr::new(224, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                IpNumber::UDP,
                64
            ),
            Err(Ipv4Error::InvalidSourceAddr(_))
        ));
    }

    #[test]
    fn round_trips_through_parse_and_write() {
        let mut header = sample();
        header.update_checksum();
        let mut buf = [0u8; Ipv4::MIN_LEN];
        let written = header.write(&mut buf).unwrap();
        assert_eq!(written.get(), Ipv4::MIN_LEN);

        let (parsed, consumed) = Ipv4::parse(&buf).unwrap();
        assert_eq!(consumed.get(), Ipv4::MIN_LEN);
        assert_eq!(parsed.source().inner(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(parsed.destination(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(parsed.protocol(), IpNumber::UDP);
        assert_eq!(parsed.ttl(), 64);
        assert!(parsed.checksum_valid());
    }

    #[test]
    fn decrement_ttl_errors_at_zero() {
        let mut header = sample();
        header.set_ttl(0);
        assert_eq!(header.decrement_ttl(), Err(TtlAlreadyZero));
    }

    #[test]
    fn decrement_ttl_reduces_by_one() {
        let mut header = sample();
        header.set_ttl(5);
        header.decrement_ttl().unwrap();
        assert_eq!(header.ttl(), 4);
    }

    #[test]
    fn fragmentation_fields_round_trip() {
        let mut header = sample();
        header.set_dont_fragment(false);
        header.set_more_fragments(true);
        header.set_fragment_offset(185);
        header.set_identification(0x1234);
        header.update_checksum();
        let mut buf = [0u8; Ipv4::MIN_LEN];
        header.write(&mut buf).unwrap();
        let (parsed, _) = Ipv4::parse(&buf).unwrap();
        assert!(!parsed.dont_fragment());
        assert!(parsed.more_fragments());
        assert_eq!(parsed.fragment_offset(), 185);
        assert_eq!(parsed.identification(), 0x1234);
    }

    #[test]
    fn checksum_validation_detects_corruption() {
        let mut header = sample();
        header.update_checksum();
        let mut buf = [0u8; Ipv4::MIN_LEN];
        header.write(&mut buf).unwrap();
        buf[8] ^= 0xff; // corrupt TTL byte after serialization
        let (parsed, _) = Ipv4::parse(&buf).unwrap();
        assert!(!parsed.checksum_valid());
    }
}
