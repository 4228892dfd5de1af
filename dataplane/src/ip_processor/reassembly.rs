// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-family fragment reassembly table (§4.9 "Reassembly"): keyed by (src, dst,
//! identification[, protocol for v4]), bitmap-tracked, 30s timeout, last-writer-wins overlap.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use etherparse::IpNumber;

/// Maximum number of 8-byte-aligned fragments a single datagram may be split into.
pub const MAX_FRAGMENTS: usize = 64;
/// Seconds a partially reassembled datagram is held before being discarded.
pub const REASSEMBLY_TIMEOUT_SECS: u64 = 30;

/// Identifies one in-flight reassembly across address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReassemblyKey {
    source: IpAddr,
    destination: IpAddr,
    identification: u32,
    protocol: IpNumber,
}

impl ReassemblyKey {
    /// Build a key for an IPv4 fragment. `identification` is the 16-bit IPv4 id field.
    #[must_use]
    pub fn v4(source: IpAddr, destination: IpAddr, identification: u16, protocol: IpNumber) -> Self {
        Self {
            source,
            destination,
            identification: u32::from(identification),
            protocol,
        }
    }

    /// Build a key for an IPv6 fragment. `identification` is the 32-bit Fragment-header id.
    #[must_use]
    pub fn v6(source: IpAddr, destination: IpAddr, identification: u32, protocol: IpNumber) -> Self {
        Self {
            source,
            destination,
            identification,
            protocol,
        }
    }
}

struct Entry {
    total_len: Option<usize>,
    buffer: Vec<u8>,
    received: [bool; MAX_FRAGMENTS],
    fragment_len: usize,
    created_at: Duration,
    last_touched: Duration,
}

/// Outcome of feeding one fragment into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// More fragments are still outstanding.
    Incomplete,
    /// The final fragment arrived; the full reassembled payload is returned.
    Complete(Vec<u8>),
    /// The fragment offset would exceed [`MAX_FRAGMENTS`] 8-byte units of tracking.
    TooManyFragments,
}

/// A reassembly table for one address family.
#[derive(Default)]
pub struct ReassemblyTable {
    entries: HashMap<ReassemblyKey, Entry>,
}

impl ReassemblyTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment (`offset_units` in 8-byte units, `more_fragments` the MF bit) of
    /// `payload` at `now` into the entry identified by `key`.
    pub fn insert(
        &mut self,
        key: ReassemblyKey,
        offset_units: u16,
        more_fragments: bool,
        payload: &[u8],
        now: Duration,
    ) -> FragmentOutcome {
        let fragment_index = usize::from(offset_units);
        if fragment_index >= MAX_FRAGMENTS {
            return FragmentOutcome::TooManyFragments;
        }
        let byte_offset = usize::from(offset_units) * 8;
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            total_len: None,
            buffer: Vec::new(),
            received: [false; MAX_FRAGMENTS],
            fragment_len: 0,
            created_at: now,
            last_touched: now,
        });
        entry.last_touched = now;

        let end = byte_offset + payload.len();
        if end > entry.buffer.len() {
            entry.buffer.resize(end, 0);
        }
        // Last-writer-wins: later-arriving fragments overwrite any overlap unconditionally.
        entry.buffer[byte_offset..end].copy_from_slice(payload);
        entry.received[fragment_index] = true;
        if !more_fragments {
            entry.total_len = Some(end);
        }

        let Some(total_len) = entry.total_len else {
            return FragmentOutcome::Incomplete;
        };
        let full_units = total_len.div_ceil(8);
        let all_received = (0..full_units).all(|i| entry.received[i]);
        if !all_received {
            return FragmentOutcome::Incomplete;
        }
        let reassembled = std::mem::take(&mut entry.buffer);
        self.entries.remove(&key);
        FragmentOutcome::Complete(reassembled)
    }

    /// Drop entries idle for at least [`REASSEMBLY_TIMEOUT_SECS`], returning how many were
    /// reaped so the caller can bump a drop counter.
    pub fn expire(&mut self, now: Duration) -> usize {
        let timeout = Duration::from_secs(REASSEMBLY_TIMEOUT_SECS);
        let before = self.entries.len();
        self.entries.retain(|_, entry| now.saturating_sub(entry.last_touched) < timeout);
        before - self.entries.len()
    }

    /// Number of in-flight reassemblies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no reassembly is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key() -> ReassemblyKey {
        ReassemblyKey::v4(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            0x1234,
            IpNumber::UDP,
        )
    }

    #[test]
    fn two_fragments_reassemble_in_order() {
        let mut table = ReassemblyTable::new();
        let now = Duration::ZERO;
        let first = table.insert(key(), 0, true, &[1, 2, 3, 4, 5, 6, 7, 8], now);
        assert_eq!(first, FragmentOutcome::Incomplete);
        let second = table.insert(key(), 1, false, &[9, 10], now);
        assert_eq!(second, FragmentOutcome::Complete(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
    }

    #[test]
    fn out_of_order_fragments_still_reassemble() {
        let mut table = ReassemblyTable::new();
        let now = Duration::ZERO;
        table.insert(key(), 1, false, &[9, 10], now);
        let outcome = table.insert(key(), 0, true, &[1, 2, 3, 4, 5, 6, 7, 8], now);
        assert_eq!(outcome, FragmentOutcome::Complete(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
    }

    #[test]
    fn overlapping_fragment_uses_last_writer() {
        let mut table = ReassemblyTable::new();
        let now = Duration::ZERO;
        table.insert(key(), 0, true, &[1, 1, 1, 1, 1, 1, 1, 1], now);
        let outcome = table.insert(key(), 0, false, &[9, 9], now);
        match outcome {
            FragmentOutcome::Complete(buf) => assert_eq!(&buf[..2], &[9, 9]),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn fragment_index_beyond_max_is_rejected() {
        let mut table = ReassemblyTable::new();
        let outcome = table.insert(key(), MAX_FRAGMENTS as u16, false, &[1, 2], Duration::ZERO);
        assert_eq!(outcome, FragmentOutcome::TooManyFragments);
    }

    #[test]
    fn stale_entries_expire_after_timeout() {
        let mut table = ReassemblyTable::new();
        table.insert(key(), 0, true, &[1, 2, 3, 4, 5, 6, 7, 8], Duration::ZERO);
        assert_eq!(table.expire(Duration::from_secs(29)), 0);
        assert_eq!(table.expire(Duration::from_secs(30)), 1);
        assert!(table.is_empty());
    }
}
