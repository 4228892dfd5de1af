// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `ArpCache`: the IPv4 neighbor cache (§4.7), generalizing the teacher's `AdjacencyTable`
//! (a flat `HashMap<(IfIndex, IpAddr), Adjacency>`) into the full request/reply/retry state
//! machine and a bounded pending-frame queue per unresolved destination.

use crate::{PortId, Timestamp};
use ahash::RandomState;
use concurrency::{Arc, Mutex};
use net::arp::{ArpOp, ArpPacket, ArpParseError};
use net::eth::mac::Mac;
use net::packet::PacketBuffer;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use tracing::{debug, trace, warn};

/// Total number of neighbor slots. Exceeding this recycles the oldest non-static entry.
pub const MAX_ENTRIES: usize = 1024;
/// Default seconds a reachable entry stays usable before it is marked stale.
pub const DEFAULT_TIMEOUT: Timestamp = 1200;
/// Seconds between retransmissions of an ARP request for an unresolved address.
pub const RETRY_INTERVAL: Timestamp = 1;
/// Number of retries attempted before an incomplete entry is marked failed.
pub const MAX_RETRIES: u8 = 3;
/// Frames queued per unresolved entry before further frames are dropped.
pub const MAX_PENDING: usize = 16;

/// Lifecycle state of a neighbor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    /// Resolution in flight; no usable MAC yet.
    Incomplete,
    /// Resolved and fresh.
    Reachable,
    /// Resolved but past `timeout`; still forwardable while a refresh request is retried.
    Stale,
    /// Resolution exhausted its retries.
    Failed,
}

/// A single neighbor cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    /// The IPv4 address this entry resolves.
    pub ip: Ipv4Addr,
    /// The resolved MAC, or `Mac::ZERO` while `state == Incomplete`.
    pub mac: Mac,
    /// Egress port this neighbor is reachable through.
    pub port: PortId,
    /// Current lifecycle state.
    pub state: ArpState,
    /// Tick at which this entry was first created.
    pub created_at: Timestamp,
    /// Tick of the last state-relevant update (resolution, refresh, retry).
    pub updated_at: Timestamp,
    /// Number of ARP requests sent so far while `Incomplete`.
    pub retry_count: u8,
    /// Administratively configured; immune to aging and recycling.
    pub is_static: bool,
}

/// Outcome of a neighbor lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpLookup {
    /// A usable MAC is known (the entry is reachable or stale).
    Resolved(Mac),
    /// Resolution is in flight; the caller should queue the frame and retry later.
    Pending,
    /// Resolution exhausted its retries; the caller should drop the frame.
    Failed,
}

/// Errors returned by [`ArpCache`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArpCacheError {
    /// No entry exists for this address (there is nothing pending to enqueue against).
    #[error("no ARP entry for {0}")]
    NoSuchEntry(Ipv4Addr),
    /// The parsed ARP packet failed RFC 826 validation.
    #[error("invalid ARP packet: {0}")]
    InvalidPacket(#[from] ArpParseError),
}

/// An action the caller must take as a result of driving the cache: send a request or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpAction {
    /// Broadcast an ARP request for `target_ip` out `egress_port`.
    SendRequest { target_ip: Ipv4Addr, egress_port: PortId },
    /// Unicast an ARP reply to `target_mac`/`target_ip` out `egress_port`.
    SendReply { target_mac: Mac, target_ip: Ipv4Addr, egress_port: PortId },
}

type ResolvedCallback = Box<dyn FnMut(Ipv4Addr, Mac, PortId) + Send>;

struct Inner {
    entries: HashMap<Ipv4Addr, ArpEntry, RandomState>,
    pending: HashMap<Ipv4Addr, VecDeque<PacketBuffer>, RandomState>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            entries: HashMap::with_capacity_and_hasher(MAX_ENTRIES, RandomState::with_seed(0)),
            pending: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }
}

/// The IPv4 neighbor cache: ARP request/reply handling, aging, and a bounded
/// pending-frame queue per unresolved destination.
pub struct ArpCache {
    local_ip: Ipv4Addr,
    local_mac: Mac,
    timeout: Timestamp,
    inner: Arc<Mutex<Inner>>,
    resolved: Arc<Mutex<Option<ResolvedCallback>>>,
}

impl ArpCache {
    /// Create an empty cache for the interface identified by `local_ip`/`local_mac`.
    #[must_use]
    pub fn new(local_ip: Ipv4Addr, local_mac: Mac) -> Self {
        Self {
            local_ip,
            local_mac,
            timeout: DEFAULT_TIMEOUT,
            inner: Arc::new(Mutex::new(Inner::default())),
            resolved: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a callback fired whenever an entry becomes reachable, so the L2 MAC table
    /// can be informed. Fired outside the cache's lock.
    pub fn register_resolved_callback<F>(&self, callback: F)
    where
        F: FnMut(Ipv4Addr, Mac, PortId) + Send + 'static,
    {
        *self.resolved.lock() = Some(Box::new(callback));
    }

    fn fire_resolved(&self, ip: Ipv4Addr, mac: Mac, port: PortId) {
        if let Some(callback) = self.resolved.lock().as_mut() {
            callback(ip, mac, port);
        }
    }

    /// The IPv4 address this cache answers ARP requests for.
    #[must_use]
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// The MAC address used as sender hardware address on ARP requests/replies.
    #[must_use]
    pub fn local_mac(&self) -> Mac {
        self.local_mac
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Resolve `ip` for forwarding out `egress_port`.
    ///
    /// Returns the usable MAC if reachable/stale, `Pending` while resolution is in flight
    /// (allocating a fresh incomplete entry and asking the caller to send a request if none
    /// was already outstanding), or `Failed` once retries are exhausted.
    pub fn lookup(&self, ip: Ipv4Addr, egress_port: PortId, now: Timestamp) -> (ArpLookup, Option<ArpAction>) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&ip) {
            match entry.state {
                ArpState::Reachable => (ArpLookup::Resolved(entry.mac), None),
                ArpState::Stale => {
                    // Still usable for forwarding, but needs reconfirming; throttle the
                    // refresh request the same way an incomplete entry throttles retries.
                    let action = if now.saturating_sub(entry.updated_at) >= RETRY_INTERVAL {
                        entry.updated_at = now;
                        Some(ArpAction::SendRequest { target_ip: ip, egress_port })
                    } else {
                        None
                    };
                    (ArpLookup::Resolved(entry.mac), action)
                }
                ArpState::Incomplete => {
                    if now.saturating_sub(entry.updated_at) >= RETRY_INTERVAL {
                        entry.updated_at = now;
                        entry.retry_count += 1;
                        (
                            ArpLookup::Pending,
                            Some(ArpAction::SendRequest { target_ip: ip, egress_port }),
                        )
                    } else {
                        (ArpLookup::Pending, None)
                    }
                }
                ArpState::Failed => (ArpLookup::Failed, None),
            }
        } else {
            Self::evict_if_full(&mut inner);
            inner.entries.insert(
                ip,
                ArpEntry {
                    ip,
                    mac: Mac::ZERO,
                    port: egress_port,
                    state: ArpState::Incomplete,
                    created_at: now,
                    updated_at: now,
                    retry_count: 1,
                    is_static: false,
                },
            );
            debug!(%ip, port = egress_port, "arp: new incomplete entry");
            (
                ArpLookup::Pending,
                Some(ArpAction::SendRequest { target_ip: ip, egress_port }),
            )
        }
    }

    fn evict_if_full(inner: &mut Inner) {
        if inner.entries.len() < MAX_ENTRIES {
            return;
        }
        let victim = inner
            .entries
            .values()
            .filter(|e| !e.is_static)
            .min_by_key(|e| e.updated_at)
            .map(|e| e.ip);
        if let Some(ip) = victim {
            inner.entries.remove(&ip);
            inner.pending.remove(&ip);
            warn!(%ip, "arp: cache full, recycled oldest entry");
        }
    }

    /// Insert or refresh `ip` as reachable at `mac`/`port`. Returns any frames that had been
    /// queued awaiting this resolution, which the caller should retransmit, and fires the
    /// resolved callback outside the lock.
    pub fn add(&self, ip: Ipv4Addr, mac: Mac, port: PortId, now: Timestamp) -> Vec<PacketBuffer> {
        let drained = {
            let mut inner = self.inner.lock();
            if !inner.entries.contains_key(&ip) {
                Self::evict_if_full(&mut inner);
            }
            let created_at = inner.entries.get(&ip).map_or(now, |e| e.created_at);
            inner.entries.insert(
                ip,
                ArpEntry {
                    ip,
                    mac,
                    port,
                    state: ArpState::Reachable,
                    created_at,
                    updated_at: now,
                    retry_count: 0,
                    is_static: false,
                },
            );
            inner.pending.remove(&ip).unwrap_or_default()
        };
        self.fire_resolved(ip, mac, port);
        drained.into()
    }

    /// Install a permanent, administratively configured entry. Immune to aging and recycling.
    pub fn add_static(&self, ip: Ipv4Addr, mac: Mac, port: PortId, now: Timestamp) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            ip,
            ArpEntry {
                ip,
                mac,
                port,
                state: ArpState::Reachable,
                created_at: now,
                updated_at: now,
                retry_count: 0,
                is_static: true,
            },
        );
    }

    /// Queue `frame` for retransmission once `ip` resolves. Silently drops the frame once the
    /// per-entry queue is at [`MAX_PENDING`], per §4.9.
    ///
    /// # Errors
    ///
    /// Returns [`ArpCacheError::NoSuchEntry`] if no entry (of any state) exists for `ip`.
    pub fn enqueue_pending(&self, ip: Ipv4Addr, frame: PacketBuffer) -> Result<(), ArpCacheError> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&ip) {
            return Err(ArpCacheError::NoSuchEntry(ip));
        }
        let queue = inner.pending.entry(ip).or_default();
        if queue.len() >= MAX_PENDING {
            trace!(%ip, "arp: pending queue full, dropping frame");
        } else {
            queue.push_back(frame);
        }
        Ok(())
    }

    /// Parse and process an inbound ARP frame: learn the sender unconditionally, and return an
    /// action if this cache must reply to a request targeting its own address.
    ///
    /// # Errors
    ///
    /// Returns [`ArpCacheError::InvalidPacket`] if `buf` fails RFC 826 validation.
    pub fn handle_frame(
        &self,
        buf: &[u8],
        ingress_port: PortId,
        now: Timestamp,
    ) -> Result<(Vec<PacketBuffer>, Option<ArpAction>), ArpCacheError> {
        let packet = ArpPacket::parse(buf)?;
        let drained = self.add(packet.sender_ip, packet.sender_mac, ingress_port, now);
        let action = match packet.operation {
            ArpOp::Request if packet.target_ip == self.local_ip => Some(ArpAction::SendReply {
                target_mac: packet.sender_mac,
                target_ip: packet.sender_ip,
                egress_port: ingress_port,
            }),
            _ => None,
        };
        Ok((drained, action))
    }

    /// Drive aging: reachable entries past `timeout` become stale; stale entries past a second
    /// `timeout` window are evicted; incomplete entries past their retry budget become failed.
    pub fn age(&self, now: Timestamp) {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();
        for entry in inner.entries.values_mut() {
            if entry.is_static {
                continue;
            }
            match entry.state {
                ArpState::Reachable if now.saturating_sub(entry.updated_at) >= self.timeout => {
                    entry.state = ArpState::Stale;
                }
                ArpState::Stale if now.saturating_sub(entry.updated_at) >= self.timeout * 2 => {
                    expired.push(entry.ip);
                }
                ArpState::Incomplete
                    if entry.retry_count >= MAX_RETRIES
                        && now.saturating_sub(entry.updated_at) >= RETRY_INTERVAL =>
                {
                    entry.state = ArpState::Failed;
                }
                _ => {}
            }
        }
        for ip in expired {
            inner.entries.remove(&ip);
            inner.pending.remove(&ip);
        }
    }

    /// Look up an entry without mutating state, for diagnostics.
    #[must_use]
    pub fn get(&self, ip: Ipv4Addr) -> Option<ArpEntry> {
        self.inner.lock().entries.get(&ip).cloned()
    }

    /// Remove an entry outright, e.g. when its egress port goes down.
    pub fn remove(&self, ip: Ipv4Addr) {
        let mut inner = self.inner.lock();
        inner.entries.remove(&ip);
        inner.pending.remove(&ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> Mac {
        Mac([0x02, 0, 0, 0, 0, last])
    }

    fn cache() -> ArpCache {
        ArpCache::new(Ipv4Addr::new(10, 0, 0, 1), mac(0xAA))
    }

    #[test]
    fn miss_allocates_incomplete_and_requests() {
        let cache = cache();
        let (result, action) = cache.lookup(Ipv4Addr::new(10, 0, 0, 2), 1, 0);
        assert_eq!(result, ArpLookup::Pending);
        assert_eq!(
            action,
            Some(ArpAction::SendRequest { target_ip: Ipv4Addr::new(10, 0, 0, 2), egress_port: 1 })
        );
    }

    #[test]
    fn repeated_lookup_within_retry_interval_does_not_resend() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let (_, first) = cache.lookup(ip, 1, 0);
        assert!(first.is_some());
        let (result, second) = cache.lookup(ip, 1, 0);
        assert_eq!(result, ArpLookup::Pending);
        assert_eq!(second, None);
    }

    #[test]
    fn lookup_resends_after_retry_interval_elapses() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.lookup(ip, 1, 0);
        let (result, action) = cache.lookup(ip, 1, RETRY_INTERVAL);
        assert_eq!(result, ArpLookup::Pending);
        assert!(action.is_some());
    }

    #[test]
    fn add_resolves_and_fires_callback() {
        let cache = cache();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        cache.register_resolved_callback(move |ip, mac, port| {
            events_clone.lock().push((ip, mac, port));
        });
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.add(ip, mac(1), 3, 0);
        assert_eq!(cache.get(ip).unwrap().state, ArpState::Reachable);
        assert_eq!(events.lock().as_slice(), &[(ip, mac(1), 3)]);
    }

    #[test]
    fn pending_frames_drain_on_resolution() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.lookup(ip, 1, 0);
        cache.enqueue_pending(ip, PacketBuffer::allocate(64)).unwrap();
        cache.enqueue_pending(ip, PacketBuffer::allocate(64)).unwrap();
        let drained = cache.add(ip, mac(1), 1, 0);
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn pending_queue_caps_at_max_and_drops_overflow() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.lookup(ip, 1, 0);
        for _ in 0..MAX_PENDING + 5 {
            cache.enqueue_pending(ip, PacketBuffer::allocate(64)).unwrap();
        }
        let drained = cache.add(ip, mac(1), 1, 0);
        assert_eq!(drained.len(), MAX_PENDING);
    }

    #[test]
    fn enqueue_without_entry_errors() {
        let cache = cache();
        assert!(matches!(
            cache.enqueue_pending(Ipv4Addr::new(10, 0, 0, 9), PacketBuffer::allocate(64)),
            Err(ArpCacheError::NoSuchEntry(_))
        ));
    }

    #[test]
    fn incomplete_becomes_failed_after_max_retries() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mut now = 0;
        for _ in 0..=MAX_RETRIES {
            cache.lookup(ip, 1, now);
            now += RETRY_INTERVAL;
        }
        cache.age(now);
        let (result, _) = cache.lookup(ip, 1, now);
        assert_eq!(result, ArpLookup::Failed);
    }

    #[test]
    fn reachable_ages_to_stale_then_is_evicted() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.add(ip, mac(1), 1, 0);
        cache.age(DEFAULT_TIMEOUT);
        assert_eq!(cache.get(ip).unwrap().state, ArpState::Stale);
        cache.age(DEFAULT_TIMEOUT * 3);
        assert!(cache.get(ip).is_none());
    }

    #[test]
    fn stale_lookup_returns_resolved_and_requests_refresh() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.add(ip, mac(1), 1, 0);
        cache.age(DEFAULT_TIMEOUT);
        assert_eq!(cache.get(ip).unwrap().state, ArpState::Stale);

        let (result, action) = cache.lookup(ip, 1, DEFAULT_TIMEOUT);
        assert_eq!(result, ArpLookup::Resolved(mac(1)));
        assert_eq!(
            action,
            Some(ArpAction::SendRequest { target_ip: ip, egress_port: 1 })
        );
    }

    #[test]
    fn static_entry_is_immune_to_aging() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.add_static(ip, mac(1), 1, 0);
        cache.age(DEFAULT_TIMEOUT * 100);
        assert_eq!(cache.get(ip).unwrap().state, ArpState::Reachable);
    }

    #[test]
    fn static_entry_is_never_recycled() {
        let cache = cache();
        let static_ip = Ipv4Addr::new(10, 0, 0, 1);
        cache.add_static(static_ip, mac(0xFF), 1, 0);
        for i in 0..MAX_ENTRIES {
            #[allow(clippy::cast_possible_truncation)]
            let ip = Ipv4Addr::from(0x0A00_0000u32 + i as u32 + 100);
            cache.add(ip, mac(2), 1, i as Timestamp);
        }
        assert!(cache.get(static_ip).is_some());
    }

    #[test]
    fn handle_frame_request_to_local_ip_yields_reply() {
        let cache = cache();
        let sender_mac = mac(1);
        let sender_ip = Ipv4Addr::new(10, 0, 0, 2);
        let req = ArpPacket::new_request(sender_mac, sender_ip, Ipv4Addr::new(10, 0, 0, 1));
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        req.write(&mut buf);
        let (_, action) = cache.handle_frame(&buf, 1, 0).unwrap();
        assert_eq!(
            action,
            Some(ArpAction::SendReply { target_mac: sender_mac, target_ip: sender_ip, egress_port: 1 })
        );
        assert_eq!(cache.get(sender_ip).unwrap().state, ArpState::Reachable);
    }

    #[test]
    fn handle_frame_request_to_other_ip_yields_no_reply() {
        let cache = cache();
        let req = ArpPacket::new_request(mac(1), Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 9));
        let mut buf = [0u8; ArpPacket::WIRE_LEN];
        req.write(&mut buf);
        let (_, action) = cache.handle_frame(&buf, 1, 0).unwrap();
        assert_eq!(action, None);
    }

    #[test]
    fn handle_frame_rejects_malformed_packet() {
        let cache = cache();
        let buf = [0u8; 10];
        assert!(matches!(cache.handle_frame(&buf, 1, 0), Err(ArpCacheError::InvalidPacket(_))));
    }

    #[test]
    fn remove_clears_entry_and_pending() {
        let cache = cache();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.lookup(ip, 1, 0);
        cache.enqueue_pending(ip, PacketBuffer::allocate(64)).unwrap();
        cache.remove(ip);
        assert!(cache.get(ip).is_none());
        assert!(matches!(
            cache.enqueue_pending(ip, PacketBuffer::allocate(64)),
            Err(ArpCacheError::NoSuchEntry(_))
        ));
    }
}
