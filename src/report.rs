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

//! A point-in-time snapshot of node reachability state, serializable for a
//! status endpoint or CLI diagnostic command.

use crate::{
    address_manager::AddressManager, discovery::DiscoveryFacade, reachability::ReachabilityCoordinator,
    transport::manager::Endpoint, PeerId,
};

use serde::Serialize;

/// Coarse classification of how this node sits behind NAT, inferred from
/// what the reachability coordinator has managed to verify and what the
/// address manager has managed to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    /// A listen address is itself witness-verified: no NAT in the way, or a
    /// prior static port-forward already covers it.
    Open,
    /// No listen address verified directly, but an external candidate (STUN
    /// or UPnP/NAT-PMP) is known; consistent with a cone NAT.
    ConeOrMapped,
    /// An external IP is known (via STUN) but nothing advertised has ever
    /// been verified; consistent with a symmetric NAT remapping per
    /// destination.
    LikelySymmetric,
    /// Not enough information yet (no probe has completed).
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub local_peer: String,
    pub inbound_connections: usize,
    pub outbound_connections: usize,
    pub listen_addresses: Vec<String>,
    pub advertised_addresses: Vec<String>,
    pub verified_addresses: Vec<String>,
    pub relay_enabled: bool,
    pub nat_type: NatType,
    pub join_state: Option<String>,
}

impl DiagnosticReport {
    /// Assemble a snapshot from the live subsystems. `discovery` is `None`
    /// when the embedder hasn't wired a discovery façade (join state then
    /// reports as `None` rather than a placeholder variant).
    pub fn generate(
        local_peer: PeerId,
        endpoint: &Endpoint,
        address_manager: &AddressManager,
        reachability: &ReachabilityCoordinator,
        discovery: Option<&DiscoveryFacade>,
    ) -> Self {
        let (inbound, outbound) = endpoint.connection_counts();

        let listen_addresses: Vec<String> = address_manager.listen_addrs().iter().map(|a| a.string()).collect();
        let advertised_addresses: Vec<String> = address_manager.advertised_addrs().iter().map(|a| a.string()).collect();
        let verified: Vec<_> = reachability.verified_direct_addresses();
        let verified_addresses: Vec<String> = verified.iter().map(|a| a.string()).collect();

        let relay_enabled = address_manager.advertised_addrs().iter().any(|a| a.is_relay());

        let nat_type = classify_nat(&listen_addresses, &advertised_addresses, &verified_addresses);

        Self {
            local_peer: local_peer.to_base58(),
            inbound_connections: inbound,
            outbound_connections: outbound,
            listen_addresses,
            advertised_addresses,
            verified_addresses,
            relay_enabled,
            nat_type,
            join_state: discovery.map(|d| format!("{:?}", d.state())),
        }
    }
}

fn classify_nat(listen: &[String], advertised: &[String], verified: &[String]) -> NatType {
    if verified.iter().any(|v| listen.contains(v)) {
        return NatType::Open;
    }

    if !advertised.is_empty() {
        return NatType::ConeOrMapped;
    }

    if verified.is_empty() && !listen.is_empty() {
        return NatType::LikelySymmetric;
    }

    NatType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::Address,
        config::{AddressManagerConfig, EndpointConfig, ReachabilityConfig},
        gater::PermissiveGater,
        muxer::testing::SingleStreamMuxerFactory,
        security::testing::TrustingSecurity,
        transport::{manager::EndpointDeps, TransportRegistry},
        address::book::AddressBook,
    };
    use std::sync::Arc;

    fn endpoint() -> Endpoint {
        let deps = EndpointDeps {
            registry: Arc::new(TransportRegistry::new()),
            security: Arc::new(TrustingSecurity),
            muxer_factory: Arc::new(SingleStreamMuxerFactory),
            gater: Arc::new(PermissiveGater),
            connection_manager: Arc::new(PermissiveGater),
            reachability: Arc::new(ReachabilityCoordinator::new(Default::default())),
            book: Arc::new(AddressBook::new(PeerId::random())),
        };
        Endpoint::new(PeerId::random(), EndpointConfig::default(), deps)
    }

    #[test]
    fn no_data_yet_reports_unknown_nat() {
        let report = DiagnosticReport::generate(
            PeerId::random(),
            &endpoint(),
            &AddressManager::new(AddressManagerConfig::default(), None),
            &ReachabilityCoordinator::new(ReachabilityConfig::default()),
            None,
        );

        assert_eq!(report.nat_type, NatType::Unknown);
        assert!(!report.relay_enabled);
        assert_eq!(report.join_state, None);
    }

    #[test]
    fn listen_address_verified_reports_open_nat() {
        let addr = Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap();
        let reachability = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        reachability.on_direct_verified(addr.clone(), "test", 10);

        let manager = AddressManager::new(AddressManagerConfig::default(), Some(reachability.clone()));
        manager.set_listen_addrs(vec![addr]);

        let report = DiagnosticReport::generate(PeerId::random(), &endpoint(), &manager, &reachability, None);
        assert_eq!(report.nat_type, NatType::Open);
    }

    #[test]
    fn verified_address_outside_listen_set_reports_cone_or_mapped() {
        let listen = Address::parse("/ip4/0.0.0.0/udp/4009/quic-v1").unwrap();
        let external = Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap();

        let reachability = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        reachability.on_direct_verified(external, "test", 10);

        let manager = AddressManager::new(AddressManagerConfig::default(), Some(reachability.clone()));
        manager.set_listen_addrs(vec![listen]);

        let report = DiagnosticReport::generate(PeerId::random(), &endpoint(), &manager, &reachability, None);
        assert_eq!(report.nat_type, NatType::ConeOrMapped);
    }
}
