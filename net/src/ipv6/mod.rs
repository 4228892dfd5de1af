// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ipv6 header type and manipulation

pub use crate::ipv6::addr::{MulticastAddrError, UnicastIpv6Addr};
use etherparse::{IpNumber, Ipv6Header};
use std::net::Ipv6Addr;
use std::num::NonZero;

pub mod addr;
pub mod prefix;

/// An IPv6 header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ipv6 {
    pub(crate) header: Ipv6Header,
}

/// An error which occurs if you attempt to decrement the hop limit of an [`Ipv6`] header when the
/// hop limit is already zero.
#[repr(transparent)]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("hop limit already zero")]
pub struct HopLimitAlreadyZero;

/// Error which is triggered during construction or parsing of an [`Ipv6`] object.
#[derive(thiserror::Error, Debug)]
pub enum Ipv6Error {
    /// source-address is invalid because it is a multicast address
    #[error(transparent)]
    InvalidSourceAddr(MulticastAddrError),
    /// error triggered when etherparse fails to parse the header
    #[error(transparent)]
    Invalid(etherparse::err::ipv6::HeaderSliceError),
}

impl Ipv6 {
    /// The length (in bytes) of an [`Ipv6`] header (fixed; IPv6 has no header options).
    pub const LEN: usize = Ipv6Header::LEN;

    /// Create a new [`Ipv6`] header
    ///
    /// # Errors
    ///
    /// Returns [`Ipv6Error::InvalidSourceAddr`] if `source` is a multicast address.
    pub fn new(
        source: Ipv6Addr,
        destination: Ipv6Addr,
        next_header: IpNumber,
        hop_limit: u8,
    ) -> Result<Self, Ipv6Error> {
        UnicastIpv6Addr::new(source).map_err(Ipv6Error::InvalidSourceAddr)?;
        let mut header = Ipv6Header::default();
        header.source = source.octets();
        header.destination = destination.octets();
        header.next_header = next_header;
        header.hop_limit = hop_limit;
        Ok(Self { header })
    }

    /// Get the source [`Ipv6Addr`] for this header
    #[must_use]
    pub fn source(&self) -> UnicastIpv6Addr {
        UnicastIpv6Addr::new(Ipv6Addr::from(self.header.source)).unwrap_or_else(|_| unreachable!())
    }

    /// Get the destination [`Ipv6Addr`] for this header
    #[must_use]
    pub fn destination(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.header.destination)
    }

    /// Get the [`IpNumber`] type of the next header.
    #[must_use]
    pub fn next_header(&self) -> IpNumber {
        self.header.next_header
    }

    /// Get the hop limit for this header (analogous to [`crate::ipv4::Ipv4::ttl`])
    #[must_use]
    pub fn hop_limit(&self) -> u8 {
        self.header.hop_limit
    }

    /// Get the [traffic class] for this header
    ///
    /// [traffic class]: https://datatracker.ietf.org/doc/html/rfc8200#section-7
    #[must_use]
    pub fn traffic_class(&self) -> u8 {
        self.header.traffic_class
    }

    /// Get this header's [flow label].
    ///
    /// [flow label]: https://datatracker.ietf.org/doc/html/rfc6437
    #[must_use]
    pub fn flow_label(&self) -> u32 {
        self.header.flow_label.value()
    }

    /// Get the payload length field of this header.
    #[must_use]
    pub fn payload_length(&self) -> u16 {
        self.header.payload_length
    }

    /// Set the source ip address of this header
    pub fn set_source(&mut self, source: UnicastIpv6Addr) -> &mut Self {
        self.header.source = source.inner().octets();
        self
    }

    /// Set the destination ip address of this header
    pub fn set_destination(&mut self, destination: Ipv6Addr) -> &mut Self {
        self.header.destination = destination.octets();
        self
    }

    /// Set the payload length.
    ///
    /// # Panics
    ///
    /// Panics if `length` exceeds the maximum representable payload length (`u16::MAX`);
    /// etherparse's own setter only fails on that condition, which cannot occur here.
    pub fn set_payload_length(&mut self, length: u16) -> &mut Self {
        self.header
            .set_payload_length(length as usize)
            .unwrap_or_else(|_| unreachable!());
        self
    }

    /// Set the hop limit for this header (analogous to [`crate::ipv4::Ipv4::set_ttl`])
    pub fn set_hop_limit(&mut self, hop_limit: u8) -> &mut Self {
        self.header.hop_limit = hop_limit;
        self
    }

    /// Attempt to decrement the hop limit.
    ///
    /// # Errors
    ///
    /// Returns [`HopLimitAlreadyZero`] if the hop limit is already zero.
    pub fn decrement_hop_limit(&mut self) -> Result<(), HopLimitAlreadyZero> {
        if self.header.hop_limit == 0 {
            return Err(HopLimitAlreadyZero);
        }
        self.header.hop_limit -= 1;
        Ok(())
    }

    /// Set the [traffic class] for this header
    ///
    /// [traffic class]: https://datatracker.ietf.org/doc/html/rfc8200#section-7
    pub fn set_traffic_class(&mut self, traffic_class: u8) -> &mut Self {
        self.header.traffic_class = traffic_class;
        self
    }

    /// Set the next header [`IpNumber`]
    pub fn set_next_header(&mut self, next_header: IpNumber) -> &mut Self {
        self.header.next_header = next_header;
        self
    }

    /// Parse an [`Ipv6`] header from the front of `buf`. IPv6 extension headers, if present,
    /// are skipped but not retained.
    ///
    /// # Errors
    ///
    /// Returns [`Ipv6Error::Invalid`] if etherparse rejects the buffer, or
    /// [`Ipv6Error::InvalidSourceAddr`] if the source address is multicast.
    pub fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), Ipv6Error> {
        let (header, rest) = Ipv6Header::from_slice(buf).map_err(Ipv6Error::Invalid)?;
        UnicastIpv6Addr::new(Ipv6Addr::from(header.source))
            .map_err(Ipv6Error::InvalidSourceAddr)?;
        let consumed = buf.len() - rest.len();
        let consumed = NonZero::new(consumed).unwrap_or_else(|| unreachable!());
        Ok((Self { header }, consumed))
    }

    /// Serialize this [`Ipv6`] header into the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` is too short to hold the serialized header.
    pub fn write(&self, buf: &mut [u8]) -> Result<NonZero<usize>, etherparse::err::ipv6::HeaderWriteError> {
        self.header.write_to_slice(&mut buf[..Self::LEN])?;
        Ok(NonZero::new(Self::LEN).unwrap_or_else(|| unreachable!()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv6Addr;

    fn sample() -> Ipv6 {
        Ipv6::new(
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
            IpNumber::UDP,
            64,
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_multicast_source() {
        assert!(matches!(
            Ipv6::new(
                Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1),
                Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
                IpNumber::UDP,
                64
            ),
            Err(Ipv6Error::InvalidSourceAddr(_))
        ));
    }

    #[test]
    fn round_trips_through_parse_and_write() {
        let header = sample();
        let mut buf = [0u8; Ipv6::LEN];
        let written = header.write(&mut buf).unwrap();
        assert_eq!(written.get(), Ipv6::LEN);

        let (parsed, consumed) = Ipv6::parse(&buf).unwrap();
        assert_eq!(consumed.get(), Ipv6::LEN);
        assert_eq!(
            parsed.source().inner(),
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)
        );
        assert_eq!(
            parsed.destination(),
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2)
        );
        assert_eq!(parsed.next_header(), IpNumber::UDP);
        assert_eq!(parsed.hop_limit(), 64);
    }

    #[test]
    fn decrement_hop_limit_errors_at_zero() {
        let mut header = sample();
        header.set_hop_limit(0);
        assert_eq!(header.decrement_hop_limit(), Err(HopLimitAlreadyZero));
    }

    #[test]
    fn decrement_hop_limit_reduces_by_one() {
        let mut header = sample();
        header.set_hop_limit(5);
        header.decrement_hop_limit().unwrap();
        assert_eq!(header.hop_limit(), 4);
    }
}
