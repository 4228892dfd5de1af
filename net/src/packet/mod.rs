// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [`PacketBuffer`]: a concrete, owning byte buffer for a single frame plus its metadata.

use crate::eth::ethtype::EthType;
use crate::eth::mac::Mac;
use crate::vlan::Pcp;
use std::time::Duration;

/// The largest frame this buffer can ever hold (the jumbo-frame ceiling).
pub const MAX_CAPACITY: usize = 9216;

/// The direction a frame is travelling relative to the switch core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Received from a port.
    Rx,
    /// Queued for transmission on a port.
    Tx,
    /// Injected by the switch core itself (not from any port).
    Internal,
    /// No direction has been assigned yet.
    #[default]
    Invalid,
}

/// Per-frame metadata carried alongside the raw bytes of a [`PacketBuffer`].
///
/// The engine re-derives this metadata from the frame's headers on ingress and then treats it
/// as ground truth for every downstream switching decision, even if it later disagrees with the
/// (unmodified) header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    /// Port the frame arrived on, or was most recently queued for. `None` means unassigned.
    pub ingress_port: Option<u32>,
    /// Port the frame is destined for (set by forwarding decisions). `None` means unassigned.
    pub egress_port: Option<u32>,
    /// Direction of travel.
    pub direction: Direction,
    /// VLAN id; `0` denotes an untagged frame.
    pub vlan: u16,
    /// 802.1p priority (0-7).
    pub pcp: Pcp,
    /// Source MAC, as observed (or set) for this frame.
    pub source: Mac,
    /// Destination MAC, as observed (or set) for this frame.
    pub destination: Mac,
    /// Ethertype of the frame's payload.
    pub ether_type: EthType,
    /// Whether the frame currently carries an 802.1Q tag.
    pub tagged: bool,
    /// Set by a processor to mark the frame for drop without removing it from the pipeline.
    pub drop: bool,
    /// Monotonic timestamp recorded at allocation (time since an arbitrary, buffer-local epoch).
    pub timestamp: Duration,
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self {
            ingress_port: None,
            egress_port: None,
            direction: Direction::Invalid,
            vlan: 0,
            pcp: Pcp(0),
            source: Mac::ZERO,
            destination: Mac::ZERO,
            ether_type: EthType::IPV4,
            tagged: false,
            drop: false,
            timestamp: Duration::ZERO,
        }
    }
}

/// Error returned when an operation would read or write outside the buffer's current `length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The requested offset/length falls (at least partially) outside the valid data region.
    #[error("out of bounds: offset={offset}, len={len}, buffer length={length}")]
    OutOfBounds {
        /// Offset of the attempted access.
        offset: usize,
        /// Length of the attempted access.
        len: usize,
        /// Current length of the buffer's valid data.
        length: usize,
    },
    /// The requested operation would grow the buffer beyond its allocated capacity.
    #[error("capacity exceeded: requested total {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// Total length that would result from the operation.
        requested: usize,
        /// The buffer's fixed capacity.
        capacity: usize,
    },
}

/// A concrete, owning packet buffer: a byte buffer of fixed `capacity`, a current `length`
/// (`length <= capacity` always holds), and its [`FrameMeta`].
///
/// This is the single canonical buffer type used throughout the switch core; there is no
/// separate "size" field and no generic trait family standing in for it, per the convention
/// that each concept gets exactly one name and one concrete representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    bytes: Vec<u8>,
    length: usize,
    meta: FrameMeta,
}

impl PacketBuffer {
    /// Allocate a new, empty buffer with the given `capacity` (clamped to [`MAX_CAPACITY`]).
    #[must_use]
    pub fn allocate(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        Self {
            bytes: vec![0u8; capacity],
            length: 0,
            meta: FrameMeta::default(),
        }
    }

    /// The buffer's fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The buffer's current valid data length in bytes. Always `<= capacity()`.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Read-only view of this frame's metadata.
    #[must_use]
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Mutable view of this frame's metadata.
    pub fn meta_mut(&mut self) -> &mut FrameMeta {
        &mut self.meta
    }

    /// The valid data region of the buffer, i.e. `bytes[..length]`.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.length]
    }

    /// Grow or shrink the valid data length, growing the backing allocation first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if `new_len` exceeds [`MAX_CAPACITY`].
    pub fn resize(&mut self, new_len: usize) -> Result<(), BufferError> {
        if new_len > MAX_CAPACITY {
            return Err(BufferError::CapacityExceeded {
                requested: new_len,
                capacity: MAX_CAPACITY,
            });
        }
        if new_len > self.bytes.len() {
            self.bytes.resize(new_len, 0);
        }
        self.length = new_len;
        Ok(())
    }

    /// Append `bytes` to the end of the valid data region, growing the backing allocation if
    /// there is room within capacity but not within the current allocation.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if `length + bytes.len()` would exceed
    /// `capacity()`.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let requested = self.length + bytes.len();
        if requested > self.bytes.len() {
            return Err(BufferError::CapacityExceeded {
                requested,
                capacity: self.bytes.len(),
            });
        }
        self.bytes[self.length..requested].copy_from_slice(bytes);
        self.length = requested;
        Ok(())
    }

    /// Read `n` bytes starting at `offset` from the valid data region.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `offset + n > length()`.
    pub fn peek(&self, offset: usize, n: usize) -> Result<&[u8], BufferError> {
        let end = offset + n;
        if end > self.length {
            return Err(BufferError::OutOfBounds {
                offset,
                len: n,
                length: self.length,
            });
        }
        Ok(&self.bytes[offset..end])
    }

    /// Overwrite `bytes.len()` bytes starting at `offset`, without extending the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `offset + bytes.len() > length()`. Use
    /// [`PacketBuffer::append`] to grow the buffer instead.
    pub fn update(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        let end = offset + bytes.len();
        if end > self.length {
            return Err(BufferError::OutOfBounds {
                offset,
                len: bytes.len(),
                length: self.length,
            });
        }
        self.bytes[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Clear the buffer's data and metadata, preserving its capacity.
    ///
    /// Resets `length` to 0, `direction` to [`Direction::Invalid`], `vlan` to 0, and all other
    /// metadata to its default.
    pub fn reset(&mut self) {
        self.length = 0;
        self.meta = FrameMeta::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_clamps_to_max_capacity() {
        let buf = PacketBuffer::allocate(MAX_CAPACITY + 1000);
        assert_eq!(buf.capacity(), MAX_CAPACITY);
    }

    #[test]
    fn append_and_peek_round_trip() {
        let mut buf = PacketBuffer::allocate(64);
        buf.append(b"hello").unwrap();
        assert_eq!(buf.length(), 5);
        assert_eq!(buf.peek(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn append_rejects_over_capacity() {
        let mut buf = PacketBuffer::allocate(4);
        assert!(matches!(
            buf.append(b"hello"),
            Err(BufferError::CapacityExceeded {
                requested: 5,
                capacity: 4
            })
        ));
        assert_eq!(buf.length(), 0);
    }

    #[test]
    fn peek_rejects_out_of_bounds() {
        let mut buf = PacketBuffer::allocate(16);
        buf.append(b"abc").unwrap();
        assert!(matches!(
            buf.peek(1, 10),
            Err(BufferError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn update_overwrites_in_place_without_growing() {
        let mut buf = PacketBuffer::allocate(16);
        buf.append(b"abcde").unwrap();
        buf.update(1, b"XY").unwrap();
        assert_eq!(buf.peek(0, 5).unwrap(), b"aXYde");
        assert_eq!(buf.length(), 5);
    }

    #[test]
    fn update_past_length_is_rejected() {
        let mut buf = PacketBuffer::allocate(16);
        buf.append(b"ab").unwrap();
        assert!(matches!(
            buf.update(1, b"XYZ"),
            Err(BufferError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn reset_clears_data_and_metadata_but_not_capacity() {
        let mut buf = PacketBuffer::allocate(32);
        buf.append(b"payload").unwrap();
        buf.meta_mut().vlan = 100;
        buf.meta_mut().direction = Direction::Rx;
        buf.reset();
        assert_eq!(buf.length(), 0);
        assert_eq!(buf.capacity(), 32);
        assert_eq!(buf.meta().vlan, 0);
        assert_eq!(buf.meta().direction, Direction::Invalid);
    }

    #[test]
    fn resize_grows_backing_allocation() {
        let mut buf = PacketBuffer::allocate(4);
        buf.resize(10).unwrap();
        assert_eq!(buf.length(), 10);
        assert!(buf.capacity() >= 10);
    }
}
