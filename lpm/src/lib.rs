// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! Longest-prefix-match tries for IPv4 and IPv6, backing `RoutingTable`'s FIB lookups.
//!
//! Built on `prefix_trie::PrefixMap`, which both `net::ipv4::prefix::Ipv4Prefix` and
//! `net::ipv6::prefix::Ipv6Prefix` already implement the `Prefix` trait for.

use net::ipv4::prefix::Ipv4Prefix;
use net::ipv6::prefix::Ipv6Prefix;
use prefix_trie::PrefixMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["lpm"]);

/// A longest-prefix-match trie over IPv4 prefixes.
#[derive(Default)]
pub struct Ipv4Lpm<V> {
    trie: PrefixMap<Ipv4Prefix, V>,
}

impl<V> Ipv4Lpm<V> {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self { trie: PrefixMap::new() }
    }

    /// Insert or replace the value stored at `prefix`, returning the previous value if any.
    pub fn insert(&mut self, prefix: Ipv4Prefix, value: V) -> Option<V> {
        self.trie.insert(prefix, value)
    }

    /// Remove the exact-match entry at `prefix`, returning its value if present.
    pub fn remove(&mut self, prefix: &Ipv4Prefix) -> Option<V> {
        self.trie.remove(prefix)
    }

    /// Exact-match lookup: the value stored at exactly `prefix`, if any.
    #[must_use]
    pub fn get_exact(&self, prefix: &Ipv4Prefix) -> Option<&V> {
        self.trie.get(prefix)
    }

    /// Longest-prefix-match lookup for a single address.
    #[must_use]
    pub fn longest_match(&self, addr: Ipv4Addr) -> Option<(Ipv4Prefix, &V)> {
        let host = Ipv4Prefix::from(addr);
        self.trie.get_lpm(&host).map(|(p, v)| (*p, v))
    }

    /// Number of prefixes currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.len()
    }

    /// True if the trie holds no prefixes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

/// A longest-prefix-match trie over IPv6 prefixes.
#[derive(Default)]
pub struct Ipv6Lpm<V> {
    trie: PrefixMap<Ipv6Prefix, V>,
}

impl<V> Ipv6Lpm<V> {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self { trie: PrefixMap::new() }
    }

    /// Insert or replace the value stored at `prefix`, returning the previous value if any.
    pub fn insert(&mut self, prefix: Ipv6Prefix, value: V) -> Option<V> {
        self.trie.insert(prefix, value)
    }

    /// Remove the exact-match entry at `prefix`, returning its value if present.
    pub fn remove(&mut self, prefix: &Ipv6Prefix) -> Option<V> {
        self.trie.remove(prefix)
    }

    /// Exact-match lookup: the value stored at exactly `prefix`, if any.
    #[must_use]
    pub fn get_exact(&self, prefix: &Ipv6Prefix) -> Option<&V> {
        self.trie.get(prefix)
    }

    /// Longest-prefix-match lookup for a single address.
    #[must_use]
    pub fn longest_match(&self, addr: Ipv6Addr) -> Option<(Ipv6Prefix, &V)> {
        let host = Ipv6Prefix::from(addr);
        self.trie.get_lpm(&host).map(|(p, v)| (*p, v))
    }

    /// Number of prefixes currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.len()
    }

    /// True if the trie holds no prefixes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}
