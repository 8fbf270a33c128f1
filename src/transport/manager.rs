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

//! Endpoint dial/accept engine: concurrent-dial
//! deduplication, ranked dial attempts, and the inbound accept loop.

use crate::{
    address::{book::AddressBook, Address},
    config::EndpointConfig,
    connection::{Connection, ConnectionId, Direction},
    error::Error,
    gater::{ConnectionGater, ConnectionManager},
    muxer::MuxerFactory,
    reachability::ReachabilityCoordinator,
    security::Security,
    PeerId,
};

use super::{rank_addresses, RawConnection, TransportRegistry};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

const LOG_TARGET: &str = "transport::manager";

type DialOutcome = Result<Arc<Connection>, Arc<Error>>;

/// A single active dial attempt, shared by every concurrent caller asking
/// to connect to the same peer.
struct DialFuture {
    receiver: watch::Receiver<Option<DialOutcome>>,
}

/// Token-bucket rate limiter for the inbound accept path, refilled
/// proportionally to elapsed time under a single lock.
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
    per_sec: f64,
    burst: f64,
}

struct RateLimiterState {
    tokens: f64,
    last_refill: Instant,
    rejected_count: u64,
}

impl RateLimiter {
    pub fn new(per_sec: u32, burst: u32) -> Self {
        Self {
            state: Mutex::new(RateLimiterState {
                tokens: burst as f64,
                last_refill: Instant::now(),
                rejected_count: 0,
            }),
            per_sec: per_sec as f64,
            burst: burst as f64,
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.per_sec).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            state.rejected_count += 1;
            false
        }
    }

    pub fn rejected_count(&self) -> u64 {
        self.state.lock().rejected_count
    }
}

/// External collaborators the engine consults on every dial/accept.
pub struct EndpointDeps {
    pub registry: Arc<TransportRegistry>,
    pub security: Arc<dyn Security>,
    pub muxer_factory: Arc<dyn MuxerFactory>,
    pub gater: Arc<dyn ConnectionGater>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub reachability: Arc<ReachabilityCoordinator>,
    pub book: Arc<AddressBook>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeerState {
    Connected,
    Dialing,
    Disconnected,
}

/// Owns the connection table and in-flight dial map; the entry point for
/// `connect(peer)` and the inbound accept loop.
pub struct Endpoint {
    local_peer: PeerId,
    config: EndpointConfig,
    deps: EndpointDeps,
    connections: RwLock<HashMap<PeerId, Arc<Connection>>>,
    dials: Mutex<HashMap<PeerId, DialFuture>>,
    next_connection_id: AtomicU64,
    rate_limiter: RateLimiter,
}

impl Endpoint {
    pub fn new(local_peer: PeerId, config: EndpointConfig, deps: EndpointDeps) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);
        Self {
            local_peer,
            config,
            deps,
            connections: RwLock::new(HashMap::new()),
            dials: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            rate_limiter,
        }
    }

    pub fn peer_state(&self, peer: &PeerId) -> PeerState {
        if self.connections.read().contains_key(peer) {
            PeerState::Connected
        } else if self.dials.lock().contains_key(peer) {
            PeerState::Dialing
        } else {
            PeerState::Disconnected
        }
    }

    /// Connect to `peer`, deduplicating concurrent callers onto a single
    /// in-flight attempt.
    pub async fn connect(&self, peer: PeerId, discovered: Vec<Address>) -> crate::Result<Arc<Connection>> {
        if peer == self.local_peer {
            return Err(Error::SelfConnect);
        }

        if let Some(conn) = self.connections.read().get(&peer) {
            return Ok(conn.clone());
        }

        let mut dials = self.dials.lock();
        if let Some(existing) = dials.get(&peer) {
            let mut receiver = existing.receiver.clone();
            drop(dials);
            return self.wait_for_dial(&mut receiver).await;
        }

        let (tx, rx) = watch::channel(None);
        dials.insert(peer, DialFuture { receiver: rx });
        drop(dials);

        let result = self.run_dial(peer, discovered).await;
        let outcome: DialOutcome = result.as_ref().map(Arc::clone).map_err(|e| Arc::new(clone_error(e)));
        let _ = tx.send(Some(outcome));
        self.dials.lock().remove(&peer);

        result
    }

    async fn wait_for_dial(&self, receiver: &mut watch::Receiver<Option<DialOutcome>>) -> crate::Result<Arc<Connection>> {
        loop {
            if let Some(result) = receiver.borrow().clone() {
                return result.map_err(|e| clone_error(&e));
            }
            if receiver.changed().await.is_err() {
                return Err(Error::ChannelClosed);
            }
        }
    }

    /// Address acquisition: address book, discovery-sourced addresses
    /// (passed in by the caller), and known relay circuits, merged and
    /// deduped by canonical string; newly discovered direct addresses are
    /// saved back into the address book.
    fn acquire_addresses(&self, peer: PeerId, discovered: Vec<Address>) -> Vec<Address> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        for addr in self.deps.book.get(&peer) {
            if seen.insert(addr.string()) {
                merged.push(addr);
            }
        }

        for addr in discovered {
            if seen.insert(addr.string()) {
                if !addr.is_relay() {
                    self.deps.book.add(peer, vec![addr.clone()], Duration::from_secs(600), "discovery");
                }
                merged.push(addr);
            }
        }

        rank_addresses(merged)
    }

    async fn run_dial(&self, peer: PeerId, discovered: Vec<Address>) -> crate::Result<Arc<Connection>> {
        let addresses = self.acquire_addresses(peer, discovered);
        let mut last_error = Error::NoAddresses(peer);

        for address in addresses {
            match self.try_dial_one(peer, &address).await {
                Ok(conn) => {
                    self.connections.write().insert(peer, conn.clone());
                    self.deps.connection_manager.notify_connected(peer, false);
                    self.deps.reachability.on_outbound_connected(conn.id(), &address);
                    return Ok(conn);
                }
                Err(err) => {
                    tracing::debug!(target: LOG_TARGET, %peer, %address, %err, "dial attempt failed, trying next address");
                    self.deps.book.record_fail(&peer, &address);
                    last_error = err;
                }
            }
        }

        Err(Error::AllDialsFailed { last: Box::new(last_error) })
    }

    async fn try_dial_one(&self, peer: PeerId, address: &Address) -> crate::Result<Arc<Connection>> {
        let transport = self.deps.registry.select(address).ok_or_else(|| Error::TransportNotSupported(address.as_multiaddr().clone()))?;

        if !self.deps.gater.intercept_peer_dial(peer) {
            return Err(Error::ConnectionRefused);
        }
        if !self.deps.connection_manager.allow(peer, false) {
            return Err(Error::ConnectionRefused);
        }

        let started = Instant::now();
        let raw = transport.dial(address).await?;

        let (secure, remote_identity) = if transport.is_proxy() {
            self.deps.security.secure_outbound(raw, peer).await?
        } else if self.deps.security.already_secure(raw.as_ref()) {
            (raw, peer)
        } else {
            self.deps.security.secure_outbound(raw, peer).await?
        };

        if remote_identity != peer {
            return Err(Error::IdentityMismatch { expected: peer, remote: remote_identity });
        }

        let muxer = self.deps.muxer_factory.new_muxer(secure, false).await?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let leaf = transport.protocols().first().copied().unwrap_or("unknown");

        self.deps.book.record_success(&peer, address, started.elapsed());

        Ok(Arc::new(Connection::new(id, peer, address.clone(), Direction::Outbound, leaf, Arc::from(muxer))))
    }

    /// Handle one inbound raw connection off a listener: rate limit, gater
    /// checks, secure upgrade, admission, muxer, registration.
    pub async fn accept_inbound(
        &self,
        raw: Box<RawConnection>,
        remote_addr: Address,
        transport_name: &'static str,
    ) -> crate::Result<ConnectionId> {
        if !self.rate_limiter.try_acquire() {
            return Err(Error::RateLimited);
        }

        if !self.deps.gater.intercept_accept(&remote_addr) {
            return Err(Error::ConnectionRefused);
        }

        if self.deps.security.already_secure(raw.as_ref()) {
            return Err(Error::ConnectionRefused);
        }
        let (secure, remote_id) = self.deps.security.secure_inbound(raw).await?;

        if !self.deps.gater.intercept_secured(true, remote_id) {
            return Err(Error::ConnectionRefused);
        }
        if !self.deps.connection_manager.allow(remote_id, true) {
            return Err(Error::ConnectionRefused);
        }
        if self.connections.read().len() >= self.config.max_connections {
            return Err(Error::ResourceExhausted);
        }

        if let Some(existing) = self.connections.read().get(&remote_id) {
            // Keep the existing open connection, drop the new one: prevents
            // in-flight streams from being severed on concurrent dials.
            return Ok(existing.id());
        }

        let muxer = self.deps.muxer_factory.new_muxer(secure, true).await?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(id, remote_id, remote_addr, Direction::Inbound, transport_name, Arc::from(muxer)));

        self.connections.write().entry(remote_id).or_insert_with(|| conn.clone());
        self.deps.connection_manager.notify_connected(remote_id, true);
        Ok(id)
    }

    pub fn connection(&self, peer: &PeerId) -> Option<Arc<Connection>> {
        self.connections.read().get(peer).cloned()
    }

    pub async fn disconnect(&self, peer: &PeerId) {
        let conn = self.connections.write().remove(peer);
        if let Some(conn) = conn {
            conn.close().await;
            self.deps.connection_manager.notify_disconnected(*peer);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// `(inbound, outbound)` counts over the current connection table, for
    /// diagnostic snapshots.
    pub fn connection_counts(&self) -> (usize, usize) {
        let connections = self.connections.read();
        let inbound = connections.values().filter(|c| c.direction() == Direction::Inbound).count();
        let outbound = connections.values().filter(|c| c.direction() == Direction::Outbound).count();
        (inbound, outbound)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// `Error` has no `Clone` impl (its `Io`/`AddressError` sources aren't
/// cleanly cloneable); reconstruct an equivalent value for the handful of
/// variants a shared dial outcome can actually carry.
fn clone_error(err: &Error) -> Error {
    match err {
        Error::SelfConnect => Error::SelfConnect,
        Error::NoAddresses(peer) => Error::NoAddresses(*peer),
        Error::IdentityMismatch { expected, remote } => Error::IdentityMismatch { expected: *expected, remote: *remote },
        Error::AllDialsFailed { last } => Error::AllDialsFailed { last: Box::new(clone_error(last)) },
        Error::ConnectionRefused => Error::ConnectionRefused,
        Error::ConnectionTimeout => Error::ConnectionTimeout,
        Error::ConnectionClosed => Error::ConnectionClosed,
        Error::ChannelClosed => Error::ChannelClosed,
        Error::RateLimited => Error::RateLimited,
        Error::ResourceExhausted => Error::ResourceExhausted,
        Error::TransportNotSupported(addr) => Error::TransportNotSupported(addr.clone()),
        Error::DuplicateTransport => Error::DuplicateTransport,
        _ => Error::ConnectionRefused,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gater::PermissiveGater,
        muxer::testing::SingleStreamMuxerFactory,
        security::testing::TrustingSecurity,
    };

    fn deps() -> EndpointDeps {
        EndpointDeps {
            registry: Arc::new(TransportRegistry::new()),
            security: Arc::new(TrustingSecurity),
            muxer_factory: Arc::new(SingleStreamMuxerFactory),
            gater: Arc::new(PermissiveGater),
            connection_manager: Arc::new(PermissiveGater),
            reachability: Arc::new(ReachabilityCoordinator::new(Default::default())),
            book: Arc::new(AddressBook::new(PeerId::random())),
        }
    }

    #[tokio::test]
    async fn self_dial_is_rejected() {
        let local = PeerId::random();
        let endpoint = Endpoint::new(local, EndpointConfig::default(), deps());

        let err = endpoint.connect(local, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::SelfConnect));
    }

    #[tokio::test]
    async fn dial_with_no_addresses_fails() {
        let endpoint = Endpoint::new(PeerId::random(), EndpointConfig::default(), deps());
        let err = endpoint.connect(PeerId::random(), vec![]).await.unwrap_err();
        assert!(matches!(err, Error::AllDialsFailed { .. }));
    }

    #[test]
    fn rate_limiter_exhausts_then_refills() {
        let limiter = RateLimiter::new(1000, 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.rejected_count(), 1);
    }

    #[tokio::test]
    async fn unknown_transport_address_is_skipped() {
        let endpoint = Endpoint::new(PeerId::random(), EndpointConfig::default(), deps());
        let peer = PeerId::random();
        let addr = Address::parse("/ip4/127.0.0.1/tcp/65000").unwrap();

        let err = endpoint.connect(peer, vec![addr]).await.unwrap_err();
        assert!(matches!(err, Error::AllDialsFailed { .. }));
    }

    #[tokio::test]
    async fn connection_counts_split_by_direction() {
        use crate::transport::tcp::TcpTransport;

        let mut registry = TransportRegistry::new();
        let tcp = TcpTransport::new();
        let listen_addr = Address::parse("/ip4/127.0.0.1/tcp/0").unwrap();
        let listener = tcp.listen(&listen_addr).await.unwrap();
        let bound_port = listener.local_addr().unwrap().port();
        registry.add(Arc::new(tcp)).unwrap();

        let mut endpoint_deps = deps();
        endpoint_deps.registry = Arc::new(registry);
        let endpoint = Endpoint::new(PeerId::random(), EndpointConfig::default(), endpoint_deps);

        let remote_peer = PeerId::random();
        let dial_addr = Address::parse(&format!("/ip4/127.0.0.1/tcp/{bound_port}")).unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        endpoint.connect(remote_peer, vec![dial_addr]).await.unwrap();
        accept.await.unwrap();

        assert_eq!(endpoint.connection_counts(), (0, 1));
    }

    #[tokio::test]
    async fn peer_state_reflects_connection_table() {
        let endpoint = Endpoint::new(PeerId::random(), EndpointConfig::default(), deps());
        let peer = PeerId::random();
        assert_eq!(endpoint.peer_state(&peer), PeerState::Disconnected);
    }

    #[tokio::test]
    async fn dial_and_accept_over_a_real_tcp_listener_converge_on_the_same_peer() {
        use crate::transport::tcp::TcpTransport;

        let mut registry = TransportRegistry::new();
        let tcp = TcpTransport::new();
        let listen_addr = Address::parse("/ip4/127.0.0.1/tcp/0").unwrap();
        let listener = tcp.listen(&listen_addr).await.unwrap();
        let bound_port = listener.local_addr().unwrap().port();
        registry.add(Arc::new(tcp)).unwrap();

        let mut endpoint_deps = deps();
        endpoint_deps.registry = Arc::new(registry);
        let dialer_peer = PeerId::random();
        let endpoint = Endpoint::new(dialer_peer, EndpointConfig::default(), endpoint_deps);

        let remote_peer = PeerId::random();
        let dial_addr = Address::parse(&format!("/ip4/127.0.0.1/tcp/{bound_port}")).unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let conn = endpoint.connect(remote_peer, vec![dial_addr]).await.unwrap();
        assert_eq!(conn.remote_peer(), remote_peer);
        assert_eq!(conn.direction(), Direction::Outbound);

        accept.await.unwrap();
    }
}
