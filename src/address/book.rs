// Copyright 2023 litep2p developers
// Copyright 2026 reachnet developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Per-peer address book with TTL eviction.

use super::{
    priority::{AddressStats, AddressType},
    Address,
};
use crate::PeerId;

use indexmap::IndexMap;
use parking_lot::RwLock;

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

/// Logging target for the file.
const LOG_TARGET: &str = "address::book";

/// GC grace period layered on top of an entry's own TTL.
const GC_GRACE: Duration = Duration::from_secs(5);

/// Per-peer address cap; lowest-priority entries are dropped silently when exceeded.
const MAX_ADDRESSES_PER_PEER: usize = 64;

#[derive(Debug, Clone)]
pub struct AddressEntry {
    pub address: Address,
    pub added_at: Instant,
    pub ttl: Duration,
    pub sources: HashSet<&'static str>,
    pub address_type: AddressType,
    pub stats: AddressStats,
}

impl AddressEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.added_at) > self.ttl
    }

    fn is_expired_with_grace(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.added_at) > self.ttl + GC_GRACE
    }
}

#[derive(Default)]
struct PeerAddresses {
    entries: IndexMap<String, AddressEntry>,
}

/// Per-peer set of addresses with TTL and GC.
///
/// Writers take exclusive access; readers get a consistent snapshot (never a
/// torn state), matching the linearizability requirement in the concurrency
/// model.
pub struct AddressBook {
    local_peer: PeerId,
    peers: Arc<RwLock<IndexMap<PeerId, PeerAddresses>>>,
}

impl AddressBook {
    pub fn new(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            peers: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Add addresses for `peer`. Re-adding an address already present (by
    /// canonical string) refreshes `added_at`, extends `ttl` if the new one
    /// is larger, and merges `source` into the entry's source set.
    ///
    /// A no-op under the local peer id.
    pub fn add(&self, peer: PeerId, addrs: Vec<Address>, ttl: Duration, source: &'static str) {
        if peer == self.local_peer || peer.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut peers = self.peers.write();
        let bucket = peers.entry(peer).or_default();

        for address in addrs {
            let key = address.string();
            match bucket.entries.get_mut(&key) {
                Some(existing) => {
                    existing.added_at = now;
                    if ttl > existing.ttl {
                        existing.ttl = ttl;
                    }
                    existing.sources.insert(source);
                }
                None => {
                    let address_type = classify(&address);
                    bucket.entries.insert(
                        key,
                        AddressEntry {
                            address,
                            added_at: now,
                            ttl,
                            sources: HashSet::from([source]),
                            address_type,
                            stats: AddressStats::default(),
                        },
                    );
                }
            }
        }

        enforce_cap(bucket);

        tracing::trace!(target: LOG_TARGET, ?peer, count = bucket.entries.len(), "address book updated");
    }

    /// Replace all addresses for `peer`.
    pub fn set(&self, peer: PeerId, addrs: Vec<Address>, ttl: Duration, source: &'static str) {
        if peer == self.local_peer || peer.is_empty() {
            return;
        }

        self.clear(peer);
        self.add(peer, addrs, ttl, source);
    }

    /// Non-expired addresses for `peer`, oldest-source-order preserved within
    /// a source; cross-source order is unspecified.
    pub fn get(&self, peer: &PeerId) -> Vec<Address> {
        let now = Instant::now();
        let peers = self.peers.read();
        match peers.get(peer) {
            Some(bucket) => bucket
                .entries
                .values()
                .filter(|e| !e.is_expired(now))
                .map(|e| e.address.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Full entries (with stats) for `peer`, for priority scoring callers.
    pub fn entries(&self, peer: &PeerId) -> Vec<AddressEntry> {
        let now = Instant::now();
        let peers = self.peers.read();
        match peers.get(peer) {
            Some(bucket) => {
                bucket.entries.values().filter(|e| !e.is_expired(now)).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Extend the TTL of a specific address. No-op if the address or peer is
    /// unknown.
    pub fn update_ttl(&self, peer: &PeerId, address: &Address, new_ttl: Duration) {
        let mut peers = self.peers.write();
        if let Some(bucket) = peers.get_mut(peer) {
            if let Some(entry) = bucket.entries.get_mut(&address.string()) {
                entry.ttl = new_ttl;
            }
        }
    }

    pub fn record_success(&self, peer: &PeerId, address: &Address, rtt: Duration) {
        let mut peers = self.peers.write();
        if let Some(bucket) = peers.get_mut(peer) {
            if let Some(entry) = bucket.entries.get_mut(&address.string()) {
                entry.stats.record_success(rtt, Instant::now());
            }
        }
    }

    pub fn record_fail(&self, peer: &PeerId, address: &Address) {
        let mut peers = self.peers.write();
        if let Some(bucket) = peers.get_mut(peer) {
            if let Some(entry) = bucket.entries.get_mut(&address.string()) {
                entry.stats.record_fail(Instant::now());
            }
        }
    }

    pub fn clear(&self, peer: PeerId) {
        self.peers.write().shift_remove(&peer);
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.read().keys().copied().collect()
    }

    /// Evict entries whose `now - added_at > ttl` (plus a small grace
    /// window observable only transiently between ticks).
    pub fn gc(&self) {
        let now = Instant::now();
        let mut peers = self.peers.write();
        let mut empty_peers = Vec::new();

        for (peer, bucket) in peers.iter_mut() {
            bucket.entries.retain(|_, entry| !entry.is_expired_with_grace(now));
            if bucket.entries.is_empty() {
                empty_peers.push(*peer);
            }
        }

        for peer in empty_peers {
            peers.shift_remove(&peer);
        }
    }
}

fn enforce_cap(bucket: &mut PeerAddresses) {
    if bucket.entries.len() <= MAX_ADDRESSES_PER_PEER {
        return;
    }

    let mut scored: Vec<(String, i64)> = bucket
        .entries
        .iter()
        .map(|(key, entry)| {
            (
                key.clone(),
                super::priority::score(entry.address_type, crate::address::priority::AddressState::Unknown, &entry.stats),
            )
        })
        .collect();
    scored.sort_by_key(|(_, score)| *score);

    let overflow = bucket.entries.len() - MAX_ADDRESSES_PER_PEER;
    for (key, _) in scored.into_iter().take(overflow) {
        bucket.entries.shift_remove(&key);
    }
}

fn classify(address: &Address) -> AddressType {
    if address.is_relay() {
        AddressType::Relay
    } else if address.is_public() {
        AddressType::Public
    } else {
        AddressType::Lan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn never_stores_under_self() {
        let me = PeerId::random();
        let book = AddressBook::new(me);
        book.add(
            me,
            vec![Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap()],
            Duration::from_secs(60),
            "test",
        );
        assert!(book.get(&me).is_empty());
    }

    #[test]
    fn add_then_gc_after_ttl_clears_peer() {
        let book = AddressBook::new(PeerId::random());
        let peer = PeerId::random();
        book.add(
            peer,
            vec![Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap()],
            Duration::from_millis(10),
            "test",
        );
        assert_eq!(book.get(&peer).len(), 1);

        sleep(Duration::from_millis(30));
        book.gc();
        assert!(book.get(&peer).is_empty());
    }

    #[test]
    fn readd_refreshes_and_extends_ttl() {
        let book = AddressBook::new(PeerId::random());
        let peer = PeerId::random();
        let addr = Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap();

        book.add(peer, vec![addr.clone()], Duration::from_secs(1), "a");
        book.add(peer, vec![addr.clone()], Duration::from_secs(60), "b");

        let entries = book.entries(&peer);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ttl, Duration::from_secs(60));
        assert!(entries[0].sources.contains("a"));
        assert!(entries[0].sources.contains("b"));
    }

    #[test]
    fn cap_drops_lowest_priority() {
        let book = AddressBook::new(PeerId::random());
        let peer = PeerId::random();

        for i in 0..(MAX_ADDRESSES_PER_PEER + 5) {
            let addr = Address::parse(&format!("/ip4/10.0.0.{}/tcp/4001", i % 255)).unwrap();
            book.add(peer, vec![addr], Duration::from_secs(600), "test");
        }

        assert!(book.entries(&peer).len() <= MAX_ADDRESSES_PER_PEER);
    }
}
