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

//! Address-manager daemon: runs an immediate external-address
//! probe plus a periodic refresher, feeding whatever it finds into the
//! reachability coordinator as unverified candidates.

use crate::{address::Address, config::AddressManagerConfig, executor::Executor, reachability::ReachabilityCoordinator};

use async_trait::async_trait;
use multiaddr::{Multiaddr, Protocol};
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use parking_lot::RwLock;

use std::{net::IpAddr, sync::Arc, time::Duration};

const LOG_TARGET: &str = "address_manager";

const PROBE_LEASE: Duration = Duration::from_secs(30);
const STABLE_LEASE: Duration = Duration::from_secs(3600);

/// External STUN probe, injected so the daemon never hardcodes a STUN
/// implementation.
#[async_trait]
pub trait StunClient: Send + Sync {
    async fn public_ip(&self) -> crate::Result<IpAddr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone)]
pub struct PortMapping {
    pub external_ip: Option<IpAddr>,
    pub external_port: u16,
    pub internal_port: u16,
    pub protocol: MapProtocol,
}

/// External UPnP/NAT-PMP port mapper. IPv4 only, per the daemon's scope.
#[async_trait]
pub trait PortMapper: Send + Sync {
    async fn map(&self, internal_port: u16, protocol: MapProtocol, lease: Duration) -> crate::Result<PortMapping>;

    async fn renew(&self, mapping: &PortMapping, lease: Duration) -> crate::Result<PortMapping>;

    async fn unmap(&self, mapping: &PortMapping) -> crate::Result<()>;
}

type Candidate = (Address, &'static str, i64);

pub struct AddressManager {
    config: AddressManagerConfig,
    listen_addrs: RwLock<Vec<Address>>,
    reachability: Option<Arc<ReachabilityCoordinator>>,
    legacy_advertised: RwLock<Vec<Address>>,
    stun: Option<Arc<dyn StunClient>>,
    port_mapper: Option<Arc<dyn PortMapper>>,
    executor: Arc<dyn Executor>,
}

impl AddressManager {
    pub fn new(config: AddressManagerConfig, reachability: Option<Arc<ReachabilityCoordinator>>) -> Self {
        Self {
            config,
            listen_addrs: RwLock::new(Vec::new()),
            reachability,
            legacy_advertised: RwLock::new(Vec::new()),
            stun: None,
            port_mapper: None,
            executor: crate::executor::default_executor(),
        }
    }

    pub fn set_stun_client(&mut self, stun: Arc<dyn StunClient>) {
        self.stun = Some(stun);
    }

    pub fn set_port_mapper(&mut self, mapper: Arc<dyn PortMapper>) {
        self.port_mapper = Some(mapper);
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    pub fn set_listen_addrs(&self, addrs: Vec<Address>) {
        *self.listen_addrs.write() = addrs;
    }

    pub fn listen_addrs(&self) -> Vec<Address> {
        self.listen_addrs.read().clone()
    }

    /// Verified-and-relay addresses from the coordinator, or the daemon's own
    /// legacy-mode publish list when no coordinator is wired.
    pub fn advertised_addrs(&self) -> Vec<Address> {
        match &self.reachability {
            Some(coordinator) => coordinator.advertised_addresses(),
            None => self.legacy_advertised.read().clone(),
        }
    }

    pub fn local_interface_addrs(&self) -> Vec<IpAddr> {
        collect_public_interface_ips()
    }

    /// Spawns the immediate probe and the periodic refresher. Call once.
    pub fn start(self: &Arc<Self>) {
        let immediate = self.clone();
        self.executor.run_with_name(
            "address-manager-probe",
            Box::pin(async move {
                immediate.probe_once().await;
            }),
        );

        let periodic = self.clone();
        self.executor.run_with_name(
            "address-manager-refresh",
            Box::pin(async move {
                let mut ticker = tokio::time::interval(periodic.config.refresh_interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    periodic.probe_once().await;
                }
            }),
        );
    }

    /// Run one discovery pass across every candidate source and feed the
    /// results to the reachability coordinator (or the legacy fallback).
    pub async fn probe_once(&self) {
        let mut candidates = self.user_configured_candidates();
        candidates.extend(self.local_interface_candidates());
        candidates.extend(self.stun_candidates().await);
        candidates.extend(self.port_map_candidates().await);

        tracing::debug!(target: LOG_TARGET, count = candidates.len(), "external-address probe complete");
        self.publish(candidates);
    }

    fn publish(&self, candidates: Vec<Candidate>) {
        match &self.reachability {
            Some(coordinator) => {
                for (addr, source, priority) in candidates {
                    coordinator.on_direct_candidate(addr, source, priority);
                }
            }
            None => {
                let mut legacy = self.legacy_advertised.write();
                for (addr, _, _) in candidates {
                    if !legacy.contains(&addr) {
                        legacy.push(addr);
                    }
                }
            }
        }
    }

    fn user_configured_candidates(&self) -> Vec<Candidate> {
        self.config
            .user_configured
            .iter()
            .filter_map(|raw| Address::parse(raw).ok())
            .map(|addr| (addr, "user-configured", 90))
            .collect()
    }

    fn local_interface_candidates(&self) -> Vec<Candidate> {
        let templates = self.listen_addrs.read().clone();
        let mut out = Vec::new();
        for ip in collect_public_interface_ips() {
            for template in &templates {
                if let Some(addr) = replace_host(template, ip) {
                    out.push((addr, "local-interface", 50));
                }
            }
        }
        out
    }

    async fn stun_candidates(&self) -> Vec<Candidate> {
        let Some(stun) = &self.stun else {
            return Vec::new();
        };

        let public_ip = match tokio::time::timeout(self.config.stun_timeout, stun.public_ip()).await {
            Ok(Ok(ip)) if ip_is_public(ip) => ip,
            Ok(Ok(ip)) => {
                tracing::debug!(target: LOG_TARGET, %ip, "stun reported a non-public address, discarding");
                return Vec::new();
            }
            _ => return Vec::new(),
        };

        // The STUN-reported port is an ephemeral probe socket; candidates
        // pair the reported host with each real listener port instead.
        let templates = self.listen_addrs.read().clone();
        templates.iter().filter_map(|t| replace_host(t, public_ip)).map(|addr| (addr, "stun-public-ip", 30)).collect()
    }

    async fn port_map_candidates(&self) -> Vec<Candidate> {
        let Some(mapper) = &self.port_mapper else {
            return Vec::new();
        };

        let templates = self.listen_addrs.read().clone();
        let deadline = tokio::time::Instant::now() + self.config.discovery_budget;

        let mut established = Vec::new();
        let mut candidates = Vec::new();

        for template in &templates {
            let Some((port, protocol)) = port_and_protocol(template) else {
                continue;
            };

            let Some(remaining) = time_left(deadline) else {
                tracing::debug!(target: LOG_TARGET, "port-map discovery budget exhausted");
                break;
            };

            let probe = match tokio::time::timeout(remaining, mapper.map(port, protocol, PROBE_LEASE)).await {
                Ok(Ok(mapping)) => mapping,
                _ => {
                    rollback(mapper.as_ref(), &established).await;
                    return Vec::new();
                }
            };

            let Some(remaining) = time_left(deadline) else {
                rollback(mapper.as_ref(), &established).await;
                let _ = mapper.unmap(&probe).await;
                break;
            };

            let stable = match tokio::time::timeout(remaining, mapper.renew(&probe, STABLE_LEASE)).await {
                Ok(Ok(mapping)) => mapping,
                _ => {
                    rollback(mapper.as_ref(), &established).await;
                    let _ = mapper.unmap(&probe).await;
                    return Vec::new();
                }
            };

            if let Some(ip) = stable.external_ip.filter(|ip| ip_is_public(*ip)) {
                if let Some(addr) = replace_host_and_port(template, ip, stable.external_port) {
                    candidates.push((addr, "upnp-nat-pmp", 60));
                }
            }

            established.push(stable);
        }

        candidates
    }
}

async fn rollback(mapper: &dyn PortMapper, mappings: &[PortMapping]) {
    for mapping in mappings {
        if mapper.unmap(mapping).await.is_err() {
            tracing::warn!(target: LOG_TARGET, port = mapping.external_port, "failed to roll back port mapping");
        }
    }
}

fn time_left(deadline: tokio::time::Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
    if remaining.is_zero() {
        None
    } else {
        Some(remaining)
    }
}

fn port_and_protocol(template: &Address) -> Option<(u16, MapProtocol)> {
    template.as_multiaddr().iter().find_map(|p| match p {
        Protocol::Udp(port) => Some((port, MapProtocol::Udp)),
        Protocol::Tcp(port) => Some((port, MapProtocol::Tcp)),
        _ => None,
    })
}

/// Rebuild `template` with its leaf host swapped to `ip`, keeping every other
/// protocol component (port, `quic-v1`, ...) unchanged.
fn replace_host(template: &Address, ip: IpAddr) -> Option<Address> {
    let mut protocols: Vec<Protocol> = template.as_multiaddr().iter().collect();
    if protocols.is_empty() || !matches!(protocols[0], Protocol::Ip4(_) | Protocol::Ip6(_)) {
        return None;
    }
    protocols[0] = ip_protocol(ip);
    let multiaddr: Multiaddr = protocols.into_iter().collect();
    Address::from_multiaddr(multiaddr).ok()
}

/// Like [`replace_host`] but also swaps the `tcp`/`udp` port, for NAT
/// mappings that land on a different external port than the internal one.
fn replace_host_and_port(template: &Address, ip: IpAddr, port: u16) -> Option<Address> {
    let mut protocols: Vec<Protocol> = template.as_multiaddr().iter().collect();
    if protocols.is_empty() || !matches!(protocols[0], Protocol::Ip4(_) | Protocol::Ip6(_)) {
        return None;
    }
    protocols[0] = ip_protocol(ip);
    for protocol in protocols.iter_mut() {
        match protocol {
            Protocol::Udp(p) => *p = port,
            Protocol::Tcp(p) => *p = port,
            _ => {}
        }
    }
    let multiaddr: Multiaddr = protocols.into_iter().collect();
    Address::from_multiaddr(multiaddr).ok()
}

fn ip_protocol(ip: IpAddr) -> Protocol<'static> {
    match ip {
        IpAddr::V4(v4) => Protocol::Ip4(v4),
        IpAddr::V6(v6) => Protocol::Ip6(v6),
    }
}

fn ip_is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_private() && !v4.is_link_local(),
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let is_private_or_link_local = (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80;
            !v6.is_loopback() && !is_private_or_link_local
        }
    }
}

fn collect_public_interface_ips() -> Vec<IpAddr> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(error) => {
            tracing::debug!(target: LOG_TARGET, %error, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .flat_map(|iface| iface.addr)
        .map(|addr| match addr {
            Addr::V4(v4) => IpAddr::V4(v4.ip),
            Addr::V6(v6) => IpAddr::V6(v6.ip),
        })
        .filter(|ip| ip_is_public(*ip))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReachabilityConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn udp_template() -> Address {
        Address::parse("/ip4/0.0.0.0/udp/4003/quic-v1").unwrap()
    }

    #[test]
    fn replace_host_keeps_port_and_trailing_protocols() {
        let public: IpAddr = "101.37.245.124".parse().unwrap();
        let addr = replace_host(&udp_template(), public).unwrap();
        assert_eq!(addr, Address::parse("/ip4/101.37.245.124/udp/4003/quic-v1").unwrap());
    }

    #[test]
    fn replace_host_and_port_swaps_both() {
        let public: IpAddr = "101.37.245.124".parse().unwrap();
        let addr = replace_host_and_port(&udp_template(), public, 51000).unwrap();
        assert_eq!(addr, Address::parse("/ip4/101.37.245.124/udp/51000/quic-v1").unwrap());
    }

    struct StubStun(IpAddr);

    #[async_trait]
    impl StunClient for StubStun {
        async fn public_ip(&self) -> crate::Result<IpAddr> {
            Ok(self.0)
        }
    }

    fn manager_with(reachability: Option<Arc<ReachabilityCoordinator>>) -> AddressManager {
        let mut manager = AddressManager::new(AddressManagerConfig::default(), reachability);
        manager.set_listen_addrs(vec![udp_template()]);
        manager
    }

    #[tokio::test]
    async fn stun_public_ip_produces_a_candidate_at_the_listener_port() {
        let coordinator = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        let mut manager = manager_with(Some(coordinator.clone()));
        manager.set_stun_client(Arc::new(StubStun("101.37.245.124".parse().unwrap())));

        manager.probe_once().await;

        let candidates = coordinator.bootstrap_candidates(crate::PeerId::random());
        assert!(candidates.iter().any(|(addr, _)| addr.without_peer_id() == Address::parse("/ip4/101.37.245.124/udp/4003/quic-v1").unwrap()));
    }

    #[tokio::test]
    async fn stun_private_ip_produces_no_candidate() {
        let coordinator = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        let mut manager = manager_with(Some(coordinator.clone()));
        manager.set_stun_client(Arc::new(StubStun("192.168.1.100".parse().unwrap())));

        manager.probe_once().await;

        assert!(coordinator.bootstrap_candidates(crate::PeerId::random()).is_empty());
    }

    #[tokio::test]
    async fn no_coordinator_falls_back_to_legacy_publish() {
        let manager = manager_with(None);
        manager.publish(vec![(Address::parse("/ip4/9.9.9.9/udp/1/quic-v1").unwrap(), "test", 1)]);
        assert_eq!(manager.advertised_addrs().len(), 1);
    }

    struct FailingMapper {
        map_calls: AtomicUsize,
        unmap_calls: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl PortMapper for FailingMapper {
        async fn map(&self, internal_port: u16, protocol: MapProtocol, _lease: Duration) -> crate::Result<PortMapping> {
            let call = self.map_calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(PortMapping {
                    external_ip: Some("203.0.113.9".parse().unwrap()),
                    external_port: 5000 + internal_port,
                    internal_port,
                    protocol,
                })
            } else {
                Err(crate::Error::ResourceExhausted)
            }
        }

        async fn renew(&self, mapping: &PortMapping, _lease: Duration) -> crate::Result<PortMapping> {
            Ok(mapping.clone())
        }

        async fn unmap(&self, mapping: &PortMapping) -> crate::Result<()> {
            self.unmap_calls.lock().await.push(mapping.external_port);
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_port_mapping_produces_a_candidate_at_the_external_port() {
        let coordinator = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        let mut manager = manager_with(Some(coordinator.clone()));
        manager.set_port_mapper(Arc::new(FailingMapper {
            map_calls: AtomicUsize::new(0),
            unmap_calls: Mutex::new(Vec::new()),
        }));

        manager.probe_once().await;

        let candidates = coordinator.bootstrap_candidates(crate::PeerId::random());
        assert!(candidates.iter().any(|(addr, _)| addr.without_peer_id() == Address::parse("/ip4/203.0.113.9/udp/5003/quic-v1").unwrap()));
    }
}
