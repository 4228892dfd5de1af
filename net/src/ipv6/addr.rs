// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv6 address subclasses

use std::fmt::{Debug, Display, Formatter};
use std::net::{IpAddr, Ipv6Addr};

/// A type representing the set of unicast ipv6 addresses.
#[non_exhaustive]
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnicastIpv6Addr(Ipv6Addr);

/// Error returned when attempting to construct a [`UnicastIpv6Addr`] from a multicast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is a multicast address and cannot be used as a unicast address")]
pub struct MulticastAddrError(pub Ipv6Addr);

impl Debug for UnicastIpv6Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for UnicastIpv6Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UnicastIpv6Addr {
    /// Returns the supplied [`Ipv6Addr`] as a [`UnicastIpv6Addr`]
    /// after confirming that it is in fact unicast.
    ///
    /// # Errors
    ///
    /// Returns [`MulticastAddrError`] if the supplied address is multicast.
    pub fn new(addr: Ipv6Addr) -> Result<UnicastIpv6Addr, MulticastAddrError> {
        if addr.is_multicast() {
            Err(MulticastAddrError(addr))
        } else {
            Ok(UnicastIpv6Addr(addr))
        }
    }

    /// Return the inner (unqualified) [`Ipv6Addr`]
    #[must_use]
    pub const fn inner(self) -> Ipv6Addr {
        self.0
    }
}

impl From<UnicastIpv6Addr> for Ipv6Addr {
    fn from(value: UnicastIpv6Addr) -> Self {
        value.inner()
    }
}

impl TryFrom<IpAddr> for UnicastIpv6Addr {
    type Error = IpAddr;
    fn try_from(value: IpAddr) -> Result<Self, Self::Error> {
        match value {
            IpAddr::V6(addr) => Ok(UnicastIpv6Addr(addr)),
            IpAddr::V4(_) => Err(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unicast_address() {
        let addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        assert_eq!(UnicastIpv6Addr::new(addr).unwrap().inner(), addr);
    }

    #[test]
    fn rejects_multicast_address() {
        let addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
        assert_eq!(UnicastIpv6Addr::new(addr), Err(MulticastAddrError(addr)));
    }

    #[test]
    fn try_from_ip_addr_rejects_v4() {
        let v4 = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(UnicastIpv6Addr::try_from(v4), Err(v4));
    }
}
