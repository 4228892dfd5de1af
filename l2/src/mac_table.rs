// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `MacTable`: hash table of `(Mac, Vlan) -> Port` with learning, aging, and move detection (§4.4).

use crate::{PortId, Timestamp};
use concurrency::{Arc, Mutex};
use net::eth::mac::Mac;
use std::collections::HashMap;
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::debug;

trace_target!(LevelFilter::INFO, &["l2", "mac-table"]);

/// Default aging time, in seconds. `0` disables aging.
pub const DEFAULT_AGING_TIME: Timestamp = 300;

/// How a learned MAC entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacEntryType {
    /// Learned from traffic; subject to aging and eviction.
    Dynamic,
    /// Administratively installed; never ages, immune to eviction.
    Static,
    /// CPU-destined management entry.
    Management,
}

/// One row of the table, keyed by `(mac, vlan)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacEntry {
    /// Station MAC address.
    pub mac: Mac,
    /// VLAN the station was learned on.
    pub vlan: u16,
    /// Port the station is reachable through.
    pub port: PortId,
    /// How this entry was created.
    pub entry_type: MacEntryType,
    /// Last time traffic refreshed this entry.
    pub last_seen: Timestamp,
    /// Number of times this entry has been matched by `learn`.
    pub hit_count: u64,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Errors raised by `MacTable` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MacTableError {
    /// No entry exists for the given `(mac, vlan)`.
    #[error("no mac table entry for {mac:?} on vlan {vlan}")]
    NotFound {
        /// The MAC that was looked up.
        mac: Mac,
        /// The VLAN that was looked up.
        vlan: u16,
    },
    /// The table is full and contains no dynamic entry that may be evicted.
    #[error("mac table is full and contains no evictable dynamic entry")]
    ResourceExhausted,
    /// `lookup` was called with a broadcast or multicast destination; the caller must flood.
    #[error("{0:?} is a broadcast/multicast address; flood instead of looking up")]
    NotUnicast(Mac),
}

/// Configuration for a `MacTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacTableConfig {
    /// Maximum number of entries the table will hold.
    pub max_entries: usize,
    /// Seconds of inactivity before a dynamic entry is aged out. `0` disables aging.
    pub aging_time: Timestamp,
}

impl Default for MacTableConfig {
    fn default() -> Self {
        Self {
            max_entries: 16384,
            aging_time: DEFAULT_AGING_TIME,
        }
    }
}

type Key = (Mac, u16);

#[derive(Default)]
struct Inner {
    entries: HashMap<Key, MacEntry>,
    disabled_learning_ports: std::collections::HashSet<PortId>,
    move_count: u64,
}

type Callback = Box<dyn FnMut(&MacEntry, bool) + Send>;

/// Learning/aging MAC address table, singleton per switch. The entry table is guarded by one
/// lock; the event callback lives behind a separate lock so it is always invoked after the
/// table lock has been released (§4.4: "callbacks are fired outside the lock").
pub struct MacTable {
    config: MacTableConfig,
    inner: Arc<Mutex<Inner>>,
    callback: Arc<Mutex<Option<Callback>>>,
}

impl MacTable {
    /// Create a new, empty table.
    #[must_use]
    pub fn new(config: MacTableConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the callback fired on every add/update/delete, outside the table lock.
    pub fn register_callback<F>(&self, cb: F)
    where
        F: FnMut(&MacEntry, bool) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(cb));
    }

    fn fire_all(&self, events: Vec<(MacEntry, bool)>) {
        if events.is_empty() {
            return;
        }
        let mut callback = self.callback.lock();
        if let Some(cb) = callback.as_mut() {
            for (entry, added) in &events {
                cb(entry, *added);
            }
        }
    }

    /// Enable or disable learning for a given ingress port.
    pub fn set_port_learning(&self, port: PortId, enabled: bool) {
        let mut inner = self.inner.lock();
        if enabled {
            inner.disabled_learning_ports.remove(&port);
        } else {
            inner.disabled_learning_ports.insert(port);
        }
    }

    /// Number of installed move events (a known MAC reappearing on a different port).
    #[must_use]
    pub fn move_count(&self) -> u64 {
        self.inner.lock().move_count
    }

    /// Learn `source_mac` on `vlan` arriving at `ingress_port`, inserting, refreshing, or
    /// relocating the entry as required by §4.4. A no-op (returning a synthetic unmodified
    /// entry) when learning is disabled for `ingress_port`.
    ///
    /// # Errors
    ///
    /// Returns [`MacTableError::ResourceExhausted`] if the table is full and no dynamic entry
    /// can be evicted.
    pub fn learn(
        &self,
        source_mac: Mac,
        vlan: u16,
        ingress_port: PortId,
        now: Timestamp,
    ) -> Result<MacEntry, MacTableError> {
        let mut event = None;
        let result = {
            let mut inner = self.inner.lock();
            if inner.disabled_learning_ports.contains(&ingress_port) {
                return Ok(MacEntry {
                    mac: source_mac,
                    vlan,
                    port: ingress_port,
                    entry_type: MacEntryType::Dynamic,
                    last_seen: now,
                    hit_count: 0,
                    created_at: now,
                });
            }
            let key = (source_mac, vlan);

            if let Some(existing) = inner.entries.get(&key).copied() {
                if existing.entry_type == MacEntryType::Static {
                    return Ok(existing);
                }
                let mut updated = existing;
                if existing.port != ingress_port {
                    inner.move_count += 1;
                    debug!(
                        "mac {source_mac:?}/{vlan} moved from port {} to {ingress_port}",
                        existing.port
                    );
                    updated.port = ingress_port;
                }
                updated.last_seen = now;
                updated.hit_count += 1;
                inner.entries.insert(key, updated);
                event = Some((updated, false));
                Ok(updated)
            } else {
                if inner.entries.len() >= self.config.max_entries {
                    let victim = inner
                        .entries
                        .iter()
                        .filter(|(_, e)| e.entry_type == MacEntryType::Dynamic)
                        .min_by_key(|(_, e)| e.last_seen)
                        .map(|(k, _)| *k);
                    match victim {
                        Some(k) => {
                            inner.entries.remove(&k);
                        }
                        None => return Err(MacTableError::ResourceExhausted),
                    }
                }
                let entry = MacEntry {
                    mac: source_mac,
                    vlan,
                    port: ingress_port,
                    entry_type: MacEntryType::Dynamic,
                    last_seen: now,
                    hit_count: 1,
                    created_at: now,
                };
                inner.entries.insert(key, entry);
                event = Some((entry, true));
                Ok(entry)
            }
        };
        if let Some(event) = event {
            self.fire_all(vec![event]);
        }
        result
    }

    /// Install a static entry, immune to aging and learning-driven moves.
    ///
    /// # Errors
    ///
    /// Returns [`MacTableError::ResourceExhausted`] if the table is full and no dynamic entry
    /// can be evicted to make room.
    pub fn add_static(&self, mac: Mac, vlan: u16, port: PortId, now: Timestamp) -> Result<(), MacTableError> {
        let entry = {
            let mut inner = self.inner.lock();
            let key = (mac, vlan);
            if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
                let victim = inner
                    .entries
                    .iter()
                    .filter(|(_, e)| e.entry_type == MacEntryType::Dynamic)
                    .min_by_key(|(_, e)| e.last_seen)
                    .map(|(k, _)| *k);
                match victim {
                    Some(k) => {
                        inner.entries.remove(&k);
                    }
                    None => return Err(MacTableError::ResourceExhausted),
                }
            }
            let entry = MacEntry {
                mac,
                vlan,
                port,
                entry_type: MacEntryType::Static,
                last_seen: now,
                hit_count: 0,
                created_at: now,
            };
            inner.entries.insert(key, entry);
            entry
        };
        self.fire_all(vec![(entry, true)]);
        Ok(())
    }

    /// Look up the egress port for `dest_mac` on `vlan`.
    ///
    /// # Errors
    ///
    /// Returns [`MacTableError::NotUnicast`] if `dest_mac` is broadcast/multicast (the caller
    /// should flood instead), or [`MacTableError::NotFound`] on a unicast miss.
    pub fn lookup(&self, dest_mac: Mac, vlan: u16) -> Result<PortId, MacTableError> {
        if dest_mac.is_multicast() || dest_mac.is_broadcast() {
            return Err(MacTableError::NotUnicast(dest_mac));
        }
        let inner = self.inner.lock();
        inner
            .entries
            .get(&(dest_mac, vlan))
            .map(|e| e.port)
            .ok_or(MacTableError::NotFound { mac: dest_mac, vlan })
    }

    /// Delete dynamic entries whose `last_seen` is at least `aging_time` behind `now`.
    /// A no-op when the configured aging time is `0`.
    pub fn aging(&self, now: Timestamp) {
        if self.config.aging_time == 0 {
            return;
        }
        let events = {
            let mut inner = self.inner.lock();
            let aging_time = self.config.aging_time;
            let expired: Vec<Key> = inner
                .entries
                .iter()
                .filter(|(_, e)| {
                    e.entry_type == MacEntryType::Dynamic && now.saturating_sub(e.last_seen) >= aging_time
                })
                .map(|(k, _)| *k)
                .collect();
            expired
                .into_iter()
                .filter_map(|key| inner.entries.remove(&key))
                .map(|entry| (entry, false))
                .collect::<Vec<_>>()
        };
        self.fire_all(events);
    }

    /// Remove entries matching the given filters. `None` means "don't filter on this dimension".
    pub fn flush(&self, vlan: Option<u16>, port: Option<PortId>, include_static: bool) {
        let events = {
            let mut inner = self.inner.lock();
            let doomed: Vec<Key> = inner
                .entries
                .iter()
                .filter(|(_, e)| {
                    vlan.is_none_or(|v| e.vlan == v)
                        && port.is_none_or(|p| e.port == p)
                        && (include_static || e.entry_type != MacEntryType::Static)
                })
                .map(|(k, _)| *k)
                .collect();
            doomed
                .into_iter()
                .filter_map(|key| inner.entries.remove(&key))
                .map(|entry| (entry, false))
                .collect::<Vec<_>>()
        };
        self.fire_all(events);
    }

    /// Total number of entries currently installed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
