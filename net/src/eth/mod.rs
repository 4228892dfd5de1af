//! Ethernet types

pub mod ethtype;
pub mod mac;

use crate::eth::mac::{DestinationMacAddressError, EthError, Mac, SourceMacAddressError};
use etherparse::{EtherType, Ethernet2Header};
use std::num::NonZero;

/// Errors produced while parsing an [`Eth`] header out of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EthParseError {
    /// The supplied slice was shorter than a full 14-byte ethernet header.
    #[error("buffer too short to contain an ethernet header: need {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to parse an ethernet header.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// Errors produced while serializing an [`Eth`] header into a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EthWriteError {
    /// The supplied slice was too short to hold the serialized header.
    #[error("buffer too short to hold an ethernet header: need {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to serialize an ethernet header.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// An ethernet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eth {
    inner: Ethernet2Header,
}

impl Eth {
    /// Create a new [Eth] header.
    ///
    /// # Errors
    ///
    /// This function will return an error if the specified source or dest [Mac] are invalid.
    pub fn new(source: Mac, destination: Mac, ether_type: EtherType) -> Result<Eth, EthError> {
        let mut header = Eth {
            inner: Ethernet2Header {
                source: source.0,
                destination: destination.0,
                ether_type,
            },
        };
        header.set_source(source).map_err(EthError::InvalidSource)?;
        header
            .set_destination(destination)
            .map_err(EthError::InvalidDestination)?;
        Ok(header)
    }

    /// Get the source [Mac] of the header.
    pub fn source(&self) -> Mac {
        Mac(self.inner.source)
    }

    /// Get the destination [Mac] of the header.
    pub fn destination(&self) -> Mac {
        Mac(self.inner.destination)
    }

    /// Get the ethertype of the header.
    #[must_use]
    pub fn ether_type(&self) -> EtherType {
        self.inner.ether_type
    }

    /// Set the source [Mac] of the ethernet header.
    ///
    /// # Errors
    ///
    /// Will refuse to set an invalid source [`Mac`] (e.g., multicast or zero).
    pub fn set_source(&mut self, source: Mac) -> Result<&mut Eth, SourceMacAddressError> {
        if source.is_zero() {
            return Err(SourceMacAddressError::ZeroSource);
        }
        if source.is_multicast() {
            return Err(SourceMacAddressError::MulticastSource);
        }
        Ok(self.set_source_unchecked(source))
    }

    /// Set the destination [Mac] of the ethernet header.
    ///
    /// # Errors
    ///
    /// Will refuse to set zero as the dest [Mac].
    pub fn set_destination(
        &mut self,
        destination: Mac,
    ) -> Result<&mut Eth, DestinationMacAddressError> {
        if !destination.is_valid_dst() {
            return Err(DestinationMacAddressError::ZeroDestination);
        }
        Ok(self.set_destination_unchecked(destination))
    }

    /// Set the source [Mac] of the header.
    ///
    /// # Safety
    ///
    /// This method does not check that the [Mac] is a valid source [Mac].
    pub fn set_source_unchecked(&mut self, source: Mac) -> &mut Eth {
        debug_assert!(source.is_valid_src());
        self.inner.source = source.0;
        self
    }

    /// Set the destination [Mac] of the header.
    ///
    /// # Safety
    ///
    /// This method does not check that the [Mac] is a valid dest [Mac].
    pub fn set_destination_unchecked(&mut self, destination: Mac) -> &mut Eth {
        debug_assert!(destination.is_valid_dst());
        self.inner.destination = destination.0;
        self
    }

    /// Set the ethertype of the header.
    pub fn set_ether_type(&mut self, ether_type: EtherType) -> &mut Eth {
        self.inner.ether_type = ether_type;
        self
    }

    /// The number of bytes a serialized ethernet header occupies (always 14).
    #[must_use]
    pub fn size(&self) -> NonZero<usize> {
        NonZero::new(self.inner.header_len()).unwrap_or_else(|| unreachable!())
    }

    /// Parse an [`Eth`] header from the front of `buf`.
    ///
    /// Returns the parsed header and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`EthParseError::TooShort`] if `buf` is shorter than a full header (14 bytes).
    pub fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), EthParseError> {
        let (inner, rest) = Ethernet2Header::from_slice(buf).map_err(|e| EthParseError::TooShort {
            expected: e.required_len,
            actual: buf.len(),
        })?;
        let consumed = buf.len() - rest.len();
        let consumed = NonZero::new(consumed).unwrap_or_else(|| unreachable!());
        Ok((Self { inner }, consumed))
    }

    /// Serialize this [`Eth`] header into the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`EthWriteError::TooShort`] if `buf` cannot hold a full header (14 bytes).
    pub fn write(&self, buf: &mut [u8]) -> Result<NonZero<usize>, EthWriteError> {
        let len = buf.len();
        let unused = self
            .inner
            .write_to_slice(buf)
            .map_err(|e| EthWriteError::TooShort {
                expected: e.required_len,
                actual: len,
            })?;
        let consumed = NonZero::new(len - unused.len()).unwrap_or_else(|| unreachable!());
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn round_trips_through_parse_and_write() {
        let eth = Eth::new(mac(1), mac(2), EtherType::IPV4).unwrap();
        let mut buf = [0u8; 14];
        let written = eth.write(&mut buf).unwrap();
        assert_eq!(written.get(), 14);

        let (parsed, consumed) = Eth::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 14);
        assert_eq!(parsed.source(), mac(1));
        assert_eq!(parsed.destination(), mac(2));
        assert_eq!(parsed.ether_type(), EtherType::IPV4);
    }

    #[test]
    fn new_rejects_zero_source() {
        assert!(matches!(
            Eth::new(Mac::ZERO, mac(2), EtherType::IPV4),
            Err(EthError::InvalidSource(SourceMacAddressError::ZeroSource))
        ));
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(matches!(
            Eth::parse(&buf),
            Err(EthParseError::TooShort { expected: 14, actual: 10 })
        ));
    }

    #[test]
    fn write_rejects_short_buffer() {
        let eth = Eth::new(mac(1), mac(2), EtherType::IPV6).unwrap();
        let mut buf = [0u8; 10];
        assert!(matches!(
            eth.write(&mut buf),
            Err(EthWriteError::TooShort { expected: 14, actual: 10 })
        ));
    }
}
