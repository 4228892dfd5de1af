// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN validation and manipulation.

use core::num::NonZero;
use etherparse::{EtherType, SingleVlanHeader, VlanId, VlanPcp};

/// Errors produced while parsing a [`Vlan`] header out of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VlanParseError {
    /// The supplied slice was shorter than the 4 bytes a VLAN tag occupies.
    #[error("buffer too short to contain a VLAN tag: need {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to parse a VLAN tag.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// Errors produced while serializing a [`Vlan`] header into a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VlanWriteError {
    /// The supplied slice was too short to hold the serialized header.
    #[error("buffer too short to hold a VLAN tag: need {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to serialize a VLAN tag.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// A VLAN Identifier.
///
/// This type is marked `#[repr(transparent)]` to ensure that it has the same memory layout
/// as a [`NonZero<u16>`].
/// This means that [`Option<Vid>`] should always have the same size and alignment as
/// [`Option<NonZero<u16>>`], and thus the same size and alignment as `u16`.
/// The memory / compute overhead of using this type as opposed to a `u16` is then strictly
/// limited to the price of checking that the represented value is in fact a legal [`Vid`]
/// (which we should generally be doing anyway).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
// SAFETY: only use of unsafe is unrelated to deserialize logic
#[allow(clippy::unsafe_derive_deserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct Vid(NonZero<u16>);

/// A Priority Code Point.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Pcp(pub u8);

/// Errors which can occur when converting a `u16` to a validated [`Vid`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub enum InvalidVid {
    /// 0 is a reserved [`Vid`] which basically means "the native vlan."
    /// 0 is not a legal [`Vid`] for Hedgehog's purposes.
    #[error("Zero is a reserved Vid")]
    Zero,
    /// 4095 is a reserved [`Vid`] per the spec.
    #[error("4095 is a reserved Vid")]
    Reserved,
    /// The value is too large to be a legal [`Vid`] (12-bit max).
    #[error("{0} is too large to be a legal Vid ({MAX} is max legal value)", MAX = Vid::MAX)]
    TooLarge(u16),
}

impl InvalidVid {
    /// The raw `u16` value of the reserved (4095) [`Vid`]
    pub const RESERVED: u16 = 4095;
    /// The raw `u16` value of the first truly nonsensical [`Vid`] (4096)
    pub const TOO_LARGE: u16 = Self::RESERVED + 1;
}

impl Vid {
    /// The minimum legal [`Vid`] value (1).
    #[allow(unsafe_code)] // safe due to const eval
    pub const MIN: Vid = Vid(unsafe { NonZero::new_unchecked(1) });

    /// The maximum legal [`Vid`] value (2^12 - 2).
    #[allow(unsafe_code)] // safe due to const eval
    pub const MAX: Vid = Vid(unsafe { NonZero::new_unchecked(4094) });

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 0, 4095 (reserved), or greater than [`Vid::MAX`].
    #[tracing::instrument(level = "trace")]
    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vid) {
            None => Err(InvalidVid::Zero),
            Some(val) if val.get() == InvalidVid::RESERVED => Err(InvalidVid::Reserved),
            Some(val) if val.get() > InvalidVid::RESERVED => Err(InvalidVid::TooLarge(val.get())),
            Some(val) => Ok(Vid(val)),
        }
    }

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Safety
    ///
    /// It is undefined behavior to pass in vid = 0 or vid >= 4094.
    #[allow(unsafe_code)] // safety requirements documented
    #[must_use]
    pub unsafe fn new_unchecked(vid: u16) -> Self {
        Vid(unsafe { NonZero::new_unchecked(vid) })
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0.get()
    }

    /// Check the contract of the `Vid::new` function.
    ///
    /// # Panics
    ///
    /// 1. Never panics if `Vid::new` is written correctly.
    /// 2. Always panics if `Vid::new` violates expected invariants.
    #[cfg(any(test, feature = "contract"))]
    pub fn check_new_contract(raw: u16) {
        match Vid::new(raw) {
            Ok(vid) => {
                assert_eq!(vid.as_u16(), raw);
                assert!(vid >= Vid::MIN);
                assert!(vid <= Vid::MAX);
                assert!(vid.as_u16() >= Vid::MIN.as_u16());
                assert!(vid.as_u16() <= Vid::MAX.as_u16());
            }
            Err(InvalidVid::Zero) => assert_eq!(raw, 0),
            Err(InvalidVid::Reserved) => assert_eq!(raw, InvalidVid::RESERVED),
            Err(InvalidVid::TooLarge(x)) => {
                assert_eq!(x, raw);
                assert!(raw >= InvalidVid::TOO_LARGE);
            }
        }
    }
}

impl AsRef<NonZero<u16>> for Vid {
    fn as_ref(&self) -> &NonZero<u16> {
        &self.0
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.as_u16()
    }
}

impl TryFrom<u16> for Vid {
    type Error = InvalidVid;

    fn try_from(vid: u16) -> Result<Vid, Self::Error> {
        Vid::new(vid)
    }
}

impl core::fmt::Display for Vid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A VLAN header.
///
/// This may represent 802.1Q or 802.1AD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vlan {
    inner: SingleVlanHeader,
}

impl Vlan {
    /// Create a new [Vlan] header.
    #[must_use]
    pub fn new(vid: Vid, ether_type: EtherType) -> Vlan {
        Vlan {
            inner: SingleVlanHeader {
                pcp: VlanPcp::ZERO,
                drop_eligible_indicator: false,
                #[allow(unsafe_code)] // SAFETY: overlapping check between libraries.
                vlan_id: unsafe { VlanId::new_unchecked(vid.as_u16()) },
                ether_type,
            },
        }
    }

    /// Get the [`Vid`] found in the parsed header.
    ///
    /// # Errors
    ///
    /// The parsed header may not include a valid [`Vid`], and in that case an `InvalidVid` error
    /// will be returned.
    pub fn vid(&self) -> Result<Vid, InvalidVid> {
        Vid::new(self.inner.vlan_id.value())
    }

    /// Get the vlan id without ensuring it is a valid [`Vid`].
    ///
    /// # Safety
    ///
    /// This function does not ensure that the [`Vid`] is greater than zero or less than 4095.
    /// Avoid using this method on untrusted data.
    #[must_use]
    #[allow(unsafe_code)] // explicitly unsafe
    pub unsafe fn vid_unchecked(&self) -> Vid {
        Vid::new_unchecked(self.inner.vlan_id.value())
    }

    /// Get the priority code point carried by this tag.
    #[must_use]
    pub fn pcp(&self) -> Pcp {
        Pcp(self.inner.pcp.value())
    }

    /// Get the ethertype of the payload following this tag.
    #[must_use]
    pub fn ether_type(&self) -> EtherType {
        self.inner.ether_type
    }

    /// The number of bytes a serialized VLAN tag occupies (always 4).
    #[must_use]
    pub fn size(&self) -> NonZero<usize> {
        NonZero::new(self.inner.header_len()).unwrap_or_else(|| unreachable!())
    }

    /// Parse a [`Vlan`] tag from the front of `buf`.
    ///
    /// Returns the parsed header and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`VlanParseError::TooShort`] if `buf` is shorter than a VLAN tag (4 bytes).
    pub fn parse(buf: &[u8]) -> Result<(Self, NonZero<usize>), VlanParseError> {
        let (inner, rest) = SingleVlanHeader::from_slice(buf).map_err(|e| VlanParseError::TooShort {
            expected: e.required_len,
            actual: buf.len(),
        })?;
        let consumed = buf.len() - rest.len();
        let consumed = NonZero::new(consumed).unwrap_or_else(|| unreachable!());
        Ok((Self { inner }, consumed))
    }

    /// Serialize this [`Vlan`] tag into the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`VlanWriteError::TooShort`] if `buf` cannot hold a full VLAN tag (4 bytes).
    pub fn write(&self, buf: &mut [u8]) -> Result<NonZero<usize>, VlanWriteError> {
        let needed = self.size().get();
        if buf.len() < needed {
            return Err(VlanWriteError::TooShort {
                expected: needed,
                actual: buf.len(),
            });
        }
        buf[..needed].copy_from_slice(&self.inner.to_bytes());
        Ok(self.size())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;

    #[test]
    fn vid_min_is_valid() {
        let vid = Vid::MIN;
        assert_eq!(vid.as_u16(), 1);
        assert_eq!(vid, Vid::new(1).unwrap());
    }

    #[test]
    fn vid_max_is_valid() {
        let vid = Vid::MAX;
        assert_eq!(vid.as_u16(), 4094);
        assert_eq!(vid, Vid::new(4094).unwrap());
    }

    #[test]
    #[allow(unsafe_code)]
    fn unsafe_vid_versions_work() {
        let vid = unsafe { Vid::new_unchecked(1) };
        assert_eq!(vid.as_u16(), 1);
        assert_eq!(vid, Vid::new(1).unwrap());
    }

    #[test]
    fn vid_zero_is_invalid() {
        match Vid::new(0) {
            Err(InvalidVid::Zero) => {}
            e => panic!(
                "Vid::new(0) should have failed with InvalidVid::Zero, but instead returned {e:?}",
            ),
        }
    }

    #[test]
    fn vid_too_large_is_invalid() {
        match Vid::new(InvalidVid::TOO_LARGE) {
            Err(InvalidVid::TooLarge(x)) => {
                assert_eq!(x, InvalidVid::TOO_LARGE);
            }
            e => panic!(
                "Vid::new(InvalidVid::TOO_LARGE) should have failed with InvalidVid::TooLarge, but instead returned {e:?}",
            ),
        }
    }

    #[test]
    fn vid_reserved_is_invalid() {
        match Vid::new(InvalidVid::RESERVED) {
            Err(InvalidVid::Reserved) => {}
            e => panic!(
                "Vid::new(InvalidVid::RESERVED) should have failed with InvalidVid::Reserved, but instead returned {e:?}",
            ),
        }
    }

    #[test]
    fn vlan_round_trips_through_parse_and_write() {
        let vid = Vid::new(100).unwrap();
        let tag = Vlan::new(vid, EtherType::IPV4);
        let mut buf = [0u8; 4];
        let written = tag.write(&mut buf).unwrap();
        assert_eq!(written.get(), 4);

        let (parsed, consumed) = Vlan::parse(&buf).unwrap();
        assert_eq!(consumed.get(), 4);
        assert_eq!(parsed.vid().unwrap(), vid);
        assert_eq!(parsed.ether_type(), EtherType::IPV4);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let buf = [0u8; 2];
        assert!(matches!(
            Vlan::parse(&buf),
            Err(VlanParseError::TooShort { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn write_rejects_short_buffer() {
        let tag = Vlan::new(Vid::new(1).unwrap(), EtherType::IPV6);
        let mut buf = [0u8; 2];
        assert!(matches!(
            tag.write(&mut buf),
            Err(VlanWriteError::TooShort { expected: 4, actual: 2 })
        ));
    }
}
