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

//! Discovery façade: a fan-out/merge/dedup layer in front of
//! any number of concrete discovery engines (DHT, mDNS, bootstrap,
//! rendezvous, ...), plus the join-state machine tracking how connected to
//! the overlay this node currently is.

pub mod join;

use crate::{address::Address, config::DiscoveryConfig, error::Error, PeerId};

use self::join::{JoinState, JoinStateMachine};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

const LOG_TARGET: &str = "discovery";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct FindPeersOpts {
    pub limit: usize,
}

impl Default for FindPeersOpts {
    fn default() -> Self {
        Self { limit: 32 }
    }
}

/// A concrete discovery engine plugged into the façade. Every method has a
/// permissive default so an engine only implements what it actually supports.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn name(&self) -> &'static str;

    /// Push every peer this engine can find for `namespace` onto `tx`, up to
    /// `opts.limit`; return when exhausted. The façade owns deduplication.
    async fn find_peers(&self, namespace: &str, opts: FindPeersOpts, tx: mpsc::Sender<PeerInfo>);

    /// Advertise under `namespace` for `ttl`; return the TTL actually granted.
    async fn advertise(&self, _namespace: &str, ttl: Duration) -> crate::Result<Duration> {
        Ok(ttl)
    }

    /// Direct single-peer lookup, if this engine supports one more cheaply
    /// than a generic `find_peers` scan.
    async fn find_peer(&self, _peer: PeerId) -> Option<PeerInfo> {
        None
    }

    async fn start(&self) {}

    async fn stop(&self) {}
}

/// An optional externally-injected address book consulted before falling
/// back to the network.
#[async_trait]
pub trait Peerstore: Send + Sync {
    async fn lookup(&self, peer: PeerId) -> Option<PeerInfo>;
}

/// Lets the façade check currently open connections without depending on the
/// dial/accept engine directly.
pub trait ConnectionLookup: Send + Sync {
    fn remote_addr(&self, peer: PeerId) -> Option<Address>;
}

struct CacheEntry {
    info: PeerInfo,
    inserted_at: Instant,
}

/// Bounded, TTL'd peer cache: insertion-ordered, oldest evicted first once
/// over capacity (mirrors the address book's simple FIFO-under-cap shape).
struct PeerCache {
    entries: indexmap::IndexMap<PeerId, CacheEntry>,
    capacity: usize,
    ttl: Duration,
}

impl PeerCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self { entries: indexmap::IndexMap::new(), capacity, ttl }
    }

    fn get(&self, peer: &PeerId) -> Option<PeerInfo> {
        self.entries.get(peer).filter(|e| e.inserted_at.elapsed() <= self.ttl).map(|e| e.info.clone())
    }

    fn insert(&mut self, info: PeerInfo) {
        self.entries.insert(info.peer, CacheEntry { info, inserted_at: Instant::now() });
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }
}

/// Fan-out/merge/dedup façade over any number of [`Discovery`] engines.
pub struct DiscoveryFacade {
    config: DiscoveryConfig,
    sub_discoveries: Vec<Arc<dyn Discovery>>,
    peerstore: Option<Arc<dyn Peerstore>>,
    connections: Option<Arc<dyn ConnectionLookup>>,
    cache: Mutex<PeerCache>,
    join: Arc<JoinStateMachine>,
    in_flight: Mutex<HashSet<PeerId>>,
    depth: AtomicUsize,
}

impl DiscoveryFacade {
    pub fn new(config: DiscoveryConfig) -> Self {
        let cache = Mutex::new(PeerCache::new(config.peer_cache_capacity, config.peer_cache_ttl));
        Self {
            config,
            sub_discoveries: Vec::new(),
            peerstore: None,
            connections: None,
            cache,
            join: Arc::new(JoinStateMachine::new()),
            in_flight: Mutex::new(HashSet::new()),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn add_discovery(&mut self, discovery: Arc<dyn Discovery>) {
        self.sub_discoveries.push(discovery);
    }

    pub fn set_peerstore(&mut self, peerstore: Arc<dyn Peerstore>) {
        self.peerstore = Some(peerstore);
    }

    pub fn set_connection_lookup(&mut self, connections: Arc<dyn ConnectionLookup>) {
        self.connections = Some(connections);
    }

    pub fn join_state_machine(&self) -> Arc<JoinStateMachine> {
        self.join.clone()
    }

    pub async fn start(&self) {
        self.join.start();
        for discovery in &self.sub_discoveries {
            discovery.start().await;
        }
    }

    fn normalize_namespace(namespace: &str) -> String {
        namespace.trim().trim_start_matches("realm/").to_string()
    }

    /// Fan out `namespace` to every sub-discovery, deduping by peer id and
    /// stopping at `opts.limit`.
    pub async fn find_peers(&self, namespace: &str, opts: FindPeersOpts) -> crate::Result<Vec<PeerInfo>> {
        if !self.join.state().is_ready() {
            return Err(Error::NotStarted);
        }

        let namespace = Self::normalize_namespace(namespace);
        let (tx, mut rx) = mpsc::channel(opts.limit.max(1) * 4);

        for discovery in self.sub_discoveries.clone() {
            let namespace = namespace.clone();
            let tx = tx.clone();
            tokio::spawn(async move { discovery.find_peers(&namespace, opts, tx).await });
        }
        drop(tx);

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        while out.len() < opts.limit {
            match rx.recv().await {
                Some(info) => {
                    if seen.insert(info.peer) {
                        self.cache.lock().insert(info.clone());
                        out.push(info);
                    }
                }
                None => break,
            }
        }

        Ok(out)
    }

    /// Fan out an advertisement to every sub-discovery, bounded by
    /// `advertise_timeout`; returns the maximum TTL any source granted.
    pub async fn advertise(&self, namespace: &str, ttl: Duration) -> crate::Result<Duration> {
        let namespace = Self::normalize_namespace(namespace);
        let mut max_ttl = Duration::ZERO;

        let results = futures::future::join_all(self.sub_discoveries.iter().map(|discovery| {
            let namespace = namespace.clone();
            async move { tokio::time::timeout(self.config.advertise_timeout, discovery.advertise(&namespace, ttl)).await }
        }))
        .await;

        for result in results {
            if let Ok(Ok(granted)) = result {
                max_ttl = max_ttl.max(granted);
            }
        }

        Ok(max_ttl)
    }

    /// Four-tier lookup: local cache, external peerstore, open connections,
    /// then the network, guarded against recursive/overdeep lookups.
    pub async fn find_peer(&self, peer: PeerId) -> crate::Result<Option<PeerInfo>> {
        if let Some(info) = self.cache.lock().get(&peer) {
            return Ok(Some(info));
        }

        if let Some(peerstore) = &self.peerstore {
            if let Some(info) = peerstore.lookup(peer).await {
                self.cache.lock().insert(info.clone());
                return Ok(Some(info));
            }
        }

        if let Some(connections) = &self.connections {
            if let Some(addr) = connections.remote_addr(peer) {
                let info = PeerInfo { peer, addresses: vec![addr] };
                self.cache.lock().insert(info.clone());
                return Ok(Some(info));
            }
        }

        self.with_recursion_guard(peer, || self.find_peer_over_network(peer)).await
    }

    async fn with_recursion_guard<F, Fut>(&self, peer: PeerId, f: F) -> crate::Result<Option<PeerInfo>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Option<PeerInfo>>,
    {
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains(&peer) {
                return Err(Error::RecursiveDiscovery);
            }
            if self.depth.load(Ordering::SeqCst) >= self.config.max_recursion_depth {
                return Err(Error::RecursiveDiscovery);
            }
            in_flight.insert(peer);
        }
        self.depth.fetch_add(1, Ordering::SeqCst);

        let result = f().await;

        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.lock().remove(&peer);

        if let Some(info) = &result {
            self.cache.lock().insert(info.clone());
        }
        Ok(result)
    }

    async fn find_peer_over_network(&self, peer: PeerId) -> Option<PeerInfo> {
        for discovery in &self.sub_discoveries {
            if let Some(info) = discovery.find_peer(peer).await {
                tracing::debug!(target: LOG_TARGET, %peer, source = discovery.name(), "peer found over network");
                return Some(info);
            }
        }
        None
    }

    pub fn state(&self) -> JoinState {
        self.join.state()
    }
}
