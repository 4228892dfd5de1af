//! IPv4 address type

use std::net::Ipv4Addr;

/// A validated unicast IPv4 address.
///
/// Wraps [`Ipv4Addr`] and guarantees the address is not multicast. This is the type used for
/// the source address field of an [`Ipv4`](crate::ipv4::Ipv4) header, which per RFC 791 may
/// never be a multicast address.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnicastIpv4Addr(Ipv4Addr);

/// Error returned when attempting to construct a [`UnicastIpv4Addr`] from a multicast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is a multicast address and cannot be used as a unicast address")]
pub struct MulticastAddrError(pub Ipv4Addr);

impl UnicastIpv4Addr {
    /// Validate and wrap `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`MulticastAddrError`] if `addr` is a multicast address.
    pub fn new(addr: Ipv4Addr) -> Result<Self, MulticastAddrError> {
        if addr.is_multicast() {
            return Err(MulticastAddrError(addr));
        }
        Ok(Self(addr))
    }

    /// Get the wrapped [`Ipv4Addr`].
    #[must_use]
    pub fn inner(self) -> Ipv4Addr {
        self.0
    }
}

impl From<UnicastIpv4Addr> for Ipv4Addr {
    fn from(value: UnicastIpv4Addr) -> Self {
        value.0
    }
}

impl AsRef<Ipv4Addr> for UnicastIpv4Addr {
    fn as_ref(&self) -> &Ipv4Addr {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unicast_address() {
        let addr = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(UnicastIpv4Addr::new(addr).unwrap().inner(), addr);
    }

    #[test]
    fn rejects_multicast_address() {
        let addr = Ipv4Addr::new(224, 0, 0, 1);
        assert_eq!(UnicastIpv4Addr::new(addr), Err(MulticastAddrError(addr)));
    }
}
