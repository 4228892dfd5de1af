// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `RoutingTable`: the dual hash/trie FIB (§4.8), generalizing `RouteOrigin`/`Route` from
//! the teacher's `rib/vrf.rs` and the hash-keyed `Fib` from `rib/fibtable.rs` into a
//! family-split exact-match-plus-longest-prefix-match design built on the `lpm` crate.

use crate::{PortId, Timestamp};
use ahash::RandomState;
use concurrency::{Arc, Mutex};
use lpm::{Ipv4Lpm, Ipv6Lpm};
use net::ipv4::prefix::Ipv4Prefix;
use net::ipv6::prefix::Ipv6Prefix;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// How a route was learned, and the admin-distance family it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    /// Directly attached subnet.
    Connected,
    /// Administratively configured.
    Static,
    /// Routing Information Protocol.
    Rip,
    /// Open Shortest Path First.
    Ospf,
    /// External BGP.
    EBgp,
    /// Internal BGP.
    IBgp,
}

impl RouteType {
    /// The conventional administrative distance for this route type (§3).
    #[must_use]
    pub fn default_distance(self) -> u8 {
        match self {
            RouteType::Connected => 0,
            RouteType::Static => 1,
            RouteType::EBgp => 20,
            RouteType::Ospf => 110,
            RouteType::Rip => 120,
            RouteType::IBgp => 200,
        }
    }
}

/// A single routing table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Egress port this route forwards through.
    pub egress_port: PortId,
    /// Name of the egress interface, for diagnostics.
    pub interface_name: String,
    /// How this route was learned.
    pub route_type: RouteType,
    /// Administrative distance; lower wins against a competing route to the same destination.
    pub distance: u8,
    /// Routing-protocol metric; lower wins between routes of equal distance.
    pub metric: u32,
    /// Next hop, absent for directly connected routes.
    pub gateway: Option<IpAddr>,
    /// Whether this route is currently installed and usable.
    pub active: bool,
    /// Tick at which this route was installed.
    pub timestamp: Timestamp,
}

/// Identifies a route by destination, independent of address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKey {
    /// An IPv4 destination prefix.
    V4(Ipv4Prefix),
    /// An IPv6 destination prefix.
    V6(Ipv6Prefix),
}

/// A hardware-sync notification fired on every successful mutation, so simulated TCAMs
/// stay aligned with the software FIB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwSyncEvent {
    /// A new route was installed at a previously empty destination.
    Add(RouteKey, Route),
    /// An existing route was replaced by one with a better distance/metric.
    Modify(RouteKey, Route),
    /// A route was removed.
    Delete(RouteKey),
}

/// Errors returned by [`RoutingTable`] mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoutingTableError {
    /// An existing route to the same destination has a distance/metric the new route cannot
    /// beat; installation is rejected.
    #[error("duplicate route, existing entry has equal or better distance/metric")]
    Duplicate,
}

/// Point-in-time counters for a [`RoutingTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingTableStats {
    /// Routes currently installed for IPv4.
    pub active_v4: usize,
    /// Routes currently installed for IPv6.
    pub active_v6: usize,
    /// Total successful `add` calls.
    pub adds: u64,
    /// Total successful `delete` calls.
    pub deletes: u64,
    /// Total `lookup` calls.
    pub lookups: u64,
    /// Total `lookup` calls that found a route.
    pub lookup_hits: u64,
}

/// All candidates known for one destination, best first. The front entry is the one
/// currently installed in the LPM trie; the rest are shadow candidates kept so that
/// deleting the active route can promote the next-best one instead of leaving the
/// destination unrouted.
type Candidates<P> = HashMap<P, Vec<Route>, RandomState>;

struct Inner {
    v4_candidates: Candidates<Ipv4Prefix>,
    v4_trie: Ipv4Lpm<Route>,
    v6_candidates: Candidates<Ipv6Prefix>,
    v6_trie: Ipv6Lpm<Route>,
    stats: RoutingTableStats,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            v4_candidates: HashMap::with_hasher(RandomState::with_seed(0)),
            v4_trie: Ipv4Lpm::new(),
            v6_candidates: HashMap::with_hasher(RandomState::with_seed(0)),
            v6_trie: Ipv6Lpm::new(),
            stats: RoutingTableStats::default(),
        }
    }
}

type SyncCallback = Box<dyn FnMut(HwSyncEvent) + Send>;

/// The switch's software FIB: exact-match plus longest-prefix-match per address family.
pub struct RoutingTable {
    inner: Arc<Mutex<Inner>>,
    sync_enabled: Arc<Mutex<bool>>,
    sync_callback: Arc<Mutex<Option<SyncCallback>>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Create an empty routing table with hardware sync enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            sync_enabled: Arc::new(Mutex::new(true)),
            sync_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the callback invoked on every add/modify/delete, fired outside the table's lock.
    pub fn register_sync_callback<F>(&self, callback: F)
    where
        F: FnMut(HwSyncEvent) + Send + 'static,
    {
        *self.sync_callback.lock() = Some(Box::new(callback));
    }

    /// Globally enable or disable hardware-sync notifications.
    pub fn set_sync_enabled(&self, enabled: bool) {
        *self.sync_enabled.lock() = enabled;
    }

    fn fire_sync(&self, event: HwSyncEvent) {
        if !*self.sync_enabled.lock() {
            return;
        }
        if let Some(callback) = self.sync_callback.lock().as_mut() {
            callback(event);
        }
    }

    /// Install `route` as a candidate for `prefix`. Candidates for the same prefix are kept
    /// sorted by (distance, metric) with ties broken toward the most recently installed route
    /// (§3's tie-break rule); the best candidate becomes the active, trie-installed route. A
    /// route that loses is still retained as a shadow candidate, so a later
    /// [`RoutingTable::delete_v4`] of the active route can promote it instead of leaving the
    /// destination unrouted.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingTableError::Duplicate`] if an existing candidate beats `route`; `route`
    /// is still stored, just not made active.
    pub fn add_v4(&self, prefix: Ipv4Prefix, mut route: Route) -> Result<(), RoutingTableError> {
        let (became_active, key, event) = {
            let mut inner = self.inner.lock();
            let candidates = inner.v4_candidates.entry(prefix).or_default();
            let was_empty = candidates.is_empty();
            let previous_best = candidates.first().cloned();
            let became_active = previous_best.as_ref().is_none_or(|best| candidate_order(&route, best) != std::cmp::Ordering::Greater);
            route.active = became_active;
            candidates.insert(0, route.clone());
            candidates.sort_by(candidate_order);
            if became_active {
                for (i, candidate) in candidates.iter_mut().enumerate() {
                    candidate.active = i == 0;
                }
            }
            let key = RouteKey::V4(prefix);
            let event = became_active
                .then(|| if was_empty { HwSyncEvent::Add(key, route.clone()) } else { HwSyncEvent::Modify(key, route.clone()) });
            if became_active {
                inner.v4_trie.insert(prefix, route);
            }
            inner.stats.adds += 1;
            inner.stats.active_v4 = inner.v4_candidates.len();
            (became_active, key, event)
        };
        if let Some(event) = event {
            debug!(?key, "routing: v4 route installed");
            self.fire_sync(event);
        }
        if became_active { Ok(()) } else { Err(RoutingTableError::Duplicate) }
    }

    /// Install `route` as a candidate for an IPv6 `prefix`. See [`RoutingTable::add_v4`] for the
    /// tie-break and shadow-candidate rules.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingTableError::Duplicate`] if an existing candidate beats `route`; `route`
    /// is still stored, just not made active.
    pub fn add_v6(&self, prefix: Ipv6Prefix, mut route: Route) -> Result<(), RoutingTableError> {
        let (became_active, key, event) = {
            let mut inner = self.inner.lock();
            let candidates = inner.v6_candidates.entry(prefix).or_default();
            let was_empty = candidates.is_empty();
            let previous_best = candidates.first().cloned();
            let became_active = previous_best.as_ref().is_none_or(|best| candidate_order(&route, best) != std::cmp::Ordering::Greater);
            route.active = became_active;
            candidates.insert(0, route.clone());
            candidates.sort_by(candidate_order);
            if became_active {
                for (i, candidate) in candidates.iter_mut().enumerate() {
                    candidate.active = i == 0;
                }
            }
            let key = RouteKey::V6(prefix);
            let event = became_active
                .then(|| if was_empty { HwSyncEvent::Add(key, route.clone()) } else { HwSyncEvent::Modify(key, route.clone()) });
            if became_active {
                inner.v6_trie.insert(prefix, route);
            }
            inner.stats.adds += 1;
            inner.stats.active_v6 = inner.v6_candidates.len();
            (became_active, key, event)
        };
        if let Some(event) = event {
            debug!(?key, "routing: v6 route installed");
            self.fire_sync(event);
        }
        if became_active { Ok(()) } else { Err(RoutingTableError::Duplicate) }
    }

    /// Remove the active IPv4 route at `prefix`, if any, promoting the next-best shadow
    /// candidate (if one exists) to take its place in the trie.
    pub fn delete_v4(&self, prefix: Ipv4Prefix) -> Option<Route> {
        let (removed, event) = {
            let mut inner = self.inner.lock();
            let candidates = inner.v4_candidates.get_mut(&prefix)?;
            if candidates.is_empty() {
                return None;
            }
            let removed = candidates.remove(0);
            let event = if let Some(next) = candidates.first_mut() {
                next.active = true;
                let next = next.clone();
                inner.v4_trie.insert(prefix, next.clone());
                HwSyncEvent::Modify(RouteKey::V4(prefix), next)
            } else {
                inner.v4_candidates.remove(&prefix);
                inner.v4_trie.remove(&prefix);
                HwSyncEvent::Delete(RouteKey::V4(prefix))
            };
            inner.stats.deletes += 1;
            inner.stats.active_v4 = inner.v4_candidates.len();
            (removed, event)
        };
        self.fire_sync(event);
        Some(removed)
    }

    /// Remove the active IPv6 route at `prefix`, if any, promoting the next-best shadow
    /// candidate (if one exists) to take its place in the trie.
    pub fn delete_v6(&self, prefix: Ipv6Prefix) -> Option<Route> {
        let (removed, event) = {
            let mut inner = self.inner.lock();
            let candidates = inner.v6_candidates.get_mut(&prefix)?;
            if candidates.is_empty() {
                return None;
            }
            let removed = candidates.remove(0);
            let event = if let Some(next) = candidates.first_mut() {
                next.active = true;
                let next = next.clone();
                inner.v6_trie.insert(prefix, next.clone());
                HwSyncEvent::Modify(RouteKey::V6(prefix), next)
            } else {
                inner.v6_candidates.remove(&prefix);
                inner.v6_trie.remove(&prefix);
                HwSyncEvent::Delete(RouteKey::V6(prefix))
            };
            inner.stats.deletes += 1;
            inner.stats.active_v6 = inner.v6_candidates.len();
            (removed, event)
        };
        self.fire_sync(event);
        Some(removed)
    }

    /// Longest-prefix-match lookup for an IPv4 destination.
    #[must_use]
    pub fn lookup_v4(&self, dest: Ipv4Addr) -> Option<Route> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;
        let hit = inner.v4_trie.longest_match(dest).map(|(_, route)| route.clone());
        if hit.is_some() {
            inner.stats.lookup_hits += 1;
        }
        hit
    }

    /// Longest-prefix-match lookup for an IPv6 destination.
    #[must_use]
    pub fn lookup_v6(&self, dest: Ipv6Addr) -> Option<Route> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;
        let hit = inner.v6_trie.longest_match(dest).map(|(_, route)| route.clone());
        if hit.is_some() {
            inner.stats.lookup_hits += 1;
        }
        hit
    }

    /// Exact-match lookup for the active IPv4 route at `prefix`, bypassing LPM.
    #[must_use]
    pub fn get_exact_v4(&self, prefix: Ipv4Prefix) -> Option<Route> {
        self.inner.lock().v4_candidates.get(&prefix).and_then(|c| c.first().cloned())
    }

    /// Exact-match lookup for the active IPv6 route at `prefix`, bypassing LPM.
    #[must_use]
    pub fn get_exact_v6(&self, prefix: Ipv6Prefix) -> Option<Route> {
        self.inner.lock().v6_candidates.get(&prefix).and_then(|c| c.first().cloned())
    }

    /// A snapshot of current counters.
    #[must_use]
    pub fn stats(&self) -> RoutingTableStats {
        self.inner.lock().stats
    }
}

/// Orders candidates for the same destination best-first: lower distance wins outright, then
/// lower metric. Stable sort plus inserting new candidates at index 0 before sorting means a
/// true (distance, metric) tie resolves in favor of the most recently installed route, per §3's
/// tie-break rule.
fn candidate_order(a: &Route, b: &Route) -> std::cmp::Ordering {
    a.distance.cmp(&b.distance).then(a.metric.cmp(&b.metric))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    fn route(route_type: RouteType, metric: u32, timestamp: Timestamp) -> Route {
        Route {
            egress_port: 1,
            interface_name: "eth0".to_string(),
            distance: route_type.default_distance(),
            route_type,
            metric,
            gateway: None,
            active: true,
            timestamp,
        }
    }

    #[test]
    fn add_then_lookup_finds_longest_match() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        table.add_v4(v4("10.1.0.0/16"), route(RouteType::Static, 1, 1)).unwrap();
        let hit = table.lookup_v4(Ipv4Addr::new(10, 1, 2, 3)).unwrap();
        assert_eq!(hit.timestamp, 1);
    }

    #[test]
    fn lookup_miss_returns_none() {
        let table = RoutingTable::new();
        assert!(table.lookup_v4(Ipv4Addr::new(192, 168, 0, 1)).is_none());
    }

    #[test]
    fn lower_distance_wins_over_existing() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 1, 0)).unwrap();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 1)).unwrap();
        assert_eq!(table.get_exact_v4(v4("10.0.0.0/8")).unwrap().route_type, RouteType::Static);
    }

    #[test]
    fn worse_distance_is_rejected() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        let result = table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 1, 1));
        assert!(matches!(result, Err(RoutingTableError::Duplicate)));
        assert_eq!(table.get_exact_v4(v4("10.0.0.0/8")).unwrap().route_type, RouteType::Static);
    }

    #[test]
    fn equal_distance_lower_metric_wins() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 20, 0)).unwrap();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 5, 1)).unwrap();
        assert_eq!(table.get_exact_v4(v4("10.0.0.0/8")).unwrap().metric, 5);
    }

    #[test]
    fn equal_distance_and_metric_replaces_with_most_recent() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 10, 0)).unwrap();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Ospf, 10, 1)).unwrap();
        assert_eq!(table.get_exact_v4(v4("10.0.0.0/8")).unwrap().timestamp, 1);
    }

    #[test]
    fn delete_removes_from_both_structures() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        assert!(table.delete_v4(v4("10.0.0.0/8")).is_some());
        assert!(table.get_exact_v4(v4("10.0.0.0/8")).is_none());
        assert!(table.lookup_v4(Ipv4Addr::new(10, 1, 1, 1)).is_none());
    }

    #[test]
    fn stats_track_adds_deletes_and_lookups() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        table.lookup_v4(Ipv4Addr::new(10, 1, 1, 1));
        table.lookup_v4(Ipv4Addr::new(192, 168, 0, 1));
        table.delete_v4(v4("10.0.0.0/8"));
        let stats = table.stats();
        assert_eq!(stats.adds, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.lookup_hits, 1);
        assert_eq!(stats.active_v4, 0);
    }

    #[test]
    fn deleting_active_route_promotes_shadow_candidate() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        let result = table.add_v4(v4("10.0.0.0/8"), route(RouteType::Rip, 1, 1));
        assert!(matches!(result, Err(RoutingTableError::Duplicate)));

        table.delete_v4(v4("10.0.0.0/8"));

        let promoted = table.lookup_v4(Ipv4Addr::new(10, 1, 1, 1)).unwrap();
        assert_eq!(promoted.route_type, RouteType::Rip);
        assert_eq!(table.get_exact_v4(v4("10.0.0.0/8")).unwrap().route_type, RouteType::Rip);
    }

    #[test]
    fn deleting_only_candidate_leaves_destination_unrouted() {
        let table = RoutingTable::new();
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        table.delete_v4(v4("10.0.0.0/8"));
        assert!(table.get_exact_v4(v4("10.0.0.0/8")).is_none());
        assert!(table.lookup_v4(Ipv4Addr::new(10, 1, 1, 1)).is_none());
    }

    #[test]
    fn sync_callback_fires_on_add_and_delete() {
        let table = RoutingTable::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        table.register_sync_callback(move |event| events_clone.lock().push(event));
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        table.delete_v4(v4("10.0.0.0/8"));
        let fired = events.lock();
        assert_eq!(fired.len(), 2);
        assert!(matches!(fired[0], HwSyncEvent::Add(..)));
        assert!(matches!(fired[1], HwSyncEvent::Delete(..)));
    }

    #[test]
    fn sync_callback_silenced_when_disabled() {
        let table = RoutingTable::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        table.register_sync_callback(move |event| events_clone.lock().push(event));
        table.set_sync_enabled(false);
        table.add_v4(v4("10.0.0.0/8"), route(RouteType::Static, 1, 0)).unwrap();
        assert!(events.lock().is_empty());
    }
}
