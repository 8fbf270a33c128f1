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

//! Witness-based reachability coordinator.
//!
//! Tracks which of our own addresses other peers have actually managed to
//! dial, so we only ever advertise addresses that are known-good rather than
//! merely locally plausible.

use crate::{address::Address, config::ReachabilityConfig, PeerId};

use parking_lot::RwLock;

use std::{
    collections::HashMap,
    net::IpAddr,
    time::{Duration, Instant},
};

const LOG_TARGET: &str = "reachability";

/// How confident we are that a candidate address is actually reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
struct Witness {
    peer: PeerId,
    prefix: String,
    seen_at: Instant,
}

#[derive(Debug, Clone)]
struct Candidate {
    source: &'static str,
    priority: i64,
    witnesses: Vec<Witness>,
    last_expired_at: Option<Instant>,
}

impl Candidate {
    fn new(source: &'static str, priority: i64) -> Self {
        Self {
            source,
            priority,
            witnesses: Vec::new(),
            last_expired_at: None,
        }
    }

    fn prune_witnesses(&mut self, expiry: Duration, now: Instant) {
        self.witnesses.retain(|w| now.saturating_duration_since(w.seen_at) <= expiry);
    }

    fn distinct_prefixes(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for w in &self.witnesses {
            seen.insert(w.prefix.clone());
        }
        seen.len()
    }
}

/// Canonical witness-verified view of our own reachability.
pub struct ReachabilityCoordinator {
    config: ReachabilityConfig,
    candidates: RwLock<HashMap<String, (Address, Candidate)>>,
    verified: RwLock<HashMap<String, (Address, Candidate)>>,
    relay_addrs: RwLock<HashMap<String, Address>>,
}

impl ReachabilityCoordinator {
    pub fn new(config: ReachabilityConfig) -> Self {
        Self {
            config,
            candidates: RwLock::new(HashMap::new()),
            verified: RwLock::new(HashMap::new()),
            relay_addrs: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert a directly-reachable candidate. Does not, by itself, advertise it.
    pub fn on_direct_candidate(&self, addr: Address, source: &'static str, priority: i64) {
        let key = addr.string();
        let mut candidates = self.candidates.write();
        candidates
            .entry(key)
            .and_modify(|(_, c)| c.priority = c.priority.max(priority))
            .or_insert_with(|| (addr.clone(), Candidate::new(source, priority)));
    }

    /// Move a candidate straight into the verified set (e.g. an explicit
    /// external confirmation rather than a witness threshold).
    pub fn on_direct_verified(&self, addr: Address, source: &'static str, priority: i64) {
        let key = addr.string();
        let candidate = self
            .candidates
            .write()
            .remove(&key)
            .map(|(_, c)| c)
            .unwrap_or_else(|| Candidate::new(source, priority));

        self.verified.write().insert(key, (addr, candidate));
    }

    /// An address that was verified has stopped being reachable; demote it
    /// back out of both maps entirely (it must be rediscovered as a fresh
    /// candidate).
    pub fn on_direct_expired(&self, addr: &Address) {
        let key = addr.string();
        let mut verified = self.verified.write();
        if let Some((_, mut candidate)) = verified.remove(&key) {
            candidate.last_expired_at = Some(Instant::now());
            self.candidates.write().insert(key, (addr.clone(), candidate));
        } else {
            self.candidates.write().remove(&key);
        }
    }

    /// A remote peer reported seeing an inbound connection from `addr`.
    /// Distinct witness IP prefixes accumulate until `min_witnesses` is hit,
    /// at which point the candidate is promoted.
    pub fn on_inbound_witness(&self, addr: Address, witness_peer: PeerId, witness_ip: IpAddr) {
        let key = addr.string();
        let now = Instant::now();
        let prefix = ip_prefix(witness_ip);

        let mut candidates = self.candidates.write();
        let entry = candidates.entry(key.clone()).or_insert_with(|| (addr.clone(), Candidate::new("witness", 0)));
        entry.1.prune_witnesses(self.config.witness_report_expiry, now);

        let in_protection_window = entry
            .1
            .last_expired_at
            .map(|t| now.saturating_duration_since(t) < self.config.disconnect_protection)
            .unwrap_or(false);

        entry.1.witnesses.push(Witness {
            peer: witness_peer,
            prefix,
            seen_at: now,
        });

        if in_protection_window {
            tracing::debug!(target: LOG_TARGET, %addr, "witness recorded during disconnect-protection window, no promotion");
            return;
        }

        if entry.1.distinct_prefixes() >= self.config.min_witnesses {
            let (address, candidate) = candidates.remove(&key).expect("just inserted above");
            drop(candidates);
            self.verified.write().insert(key, (address, candidate));
        }
    }

    /// We dialed out and connected to `peer` at `dialed_addr`. This proves
    /// the remote is reachable from us, not the converse, so it is recorded
    /// for diagnostics only and never promotes a candidate.
    pub fn on_outbound_connected(&self, _conn_id: u64, _dialed_addr: &Address) {
        tracing::trace!(target: LOG_TARGET, "outbound connection recorded, no promotion");
    }

    pub fn on_relay_reserved(&self, addrs: Vec<Address>) {
        let mut relays = self.relay_addrs.write();
        for addr in addrs {
            relays.insert(addr.string(), addr);
        }
    }

    pub fn on_relay_lost(&self, addr: &Address) {
        self.relay_addrs.write().remove(&addr.string());
    }

    /// Verified-only addresses (the canonical "we know this works" source).
    pub fn verified_direct_addresses(&self) -> Vec<Address> {
        self.verified.read().values().map(|(addr, _)| addr.clone()).collect()
    }

    /// Verified direct addresses, then relay addresses. Never falls back to
    /// raw listen addresses: a coordinator is always the authority once wired.
    pub fn advertised_addresses(&self) -> Vec<Address> {
        let mut out = self.verified_direct_addresses();
        out.extend(self.relay_addrs.read().values().cloned());
        out
    }

    /// Full-form `/.../p2p/<selfId>` candidates tagged by confidence, for
    /// bootstrapping peers who have never seen us before.
    pub fn bootstrap_candidates(&self, self_id: PeerId) -> Vec<(Address, Confidence)> {
        let mut out = Vec::new();

        for (addr, _) in self.verified.read().values() {
            out.push((addr.with_peer_id(self_id), Confidence::High));
        }

        for (addr, candidate) in self.candidates.read().values() {
            let confidence = if candidate.witnesses.is_empty() {
                Confidence::Low
            } else {
                Confidence::Medium
            };
            out.push((addr.with_peer_id(self_id), confidence));
        }

        out
    }

    /// Drop witness entries older than `witness_report_expiry` across every
    /// tracked candidate. Intended to run on a periodic timer.
    pub fn prune_expired_witnesses(&self) {
        let now = Instant::now();
        for (_, candidate) in self.candidates.write().values_mut() {
            candidate.prune_witnesses(self.config.witness_report_expiry, now);
        }
    }
}

/// IPv4 → `/24`, IPv6 → `/64`. Two witnesses behind the same NAT share a
/// prefix and so do not count as independent confirmation.
fn ip_prefix(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2])
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            format!("{:x}:{:x}:{:x}:{:x}::/64", segments[0], segments[1], segments[2], segments[3])
        }
    }
}
