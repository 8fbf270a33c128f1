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

//! Canonical address model.
//!
//! [`Address`] wraps a [`Multiaddr`] and only ever accepts the canonical
//! form: `/proto/value/...`. `host:port` strings must be converted to
//! canonical form at the CLI boundary, never inside this crate.

pub mod book;
pub mod priority;
pub mod record;

use crate::{error::AddressError, PeerId};

use multiaddr::{Multiaddr, Protocol};

use std::fmt;

/// A canonical, order-significant multiaddress.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address(Multiaddr);

impl Address {
    /// Parse a canonical multiaddress. Fails with
    /// [`AddressError::InvalidAddress`] if `s` doesn't start with `/`, with
    /// [`AddressError::UnsupportedProtocol`] for unknown components, and
    /// with [`AddressError::MalformedMultiaddr`] for structural errors.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if !s.starts_with('/') {
            return Err(AddressError::InvalidAddress);
        }

        let multiaddr: Multiaddr = s.parse().map_err(|_| AddressError::MalformedMultiaddr)?;

        for protocol in multiaddr.iter() {
            if !is_recognized_protocol(&protocol) {
                return Err(AddressError::UnsupportedProtocol);
            }
        }

        Ok(Self(multiaddr))
    }

    pub fn from_multiaddr(multiaddr: Multiaddr) -> Result<Self, AddressError> {
        Self::parse(&multiaddr.to_string())
    }

    /// The network token this address resolves to, e.g. `"quic-v1"`, `"tcp"`.
    pub fn network(&self) -> &'static str {
        let mut saw_relay = false;
        let mut last_transport = "unknown";

        for protocol in self.0.iter() {
            match protocol {
                Protocol::P2pCircuit => saw_relay = true,
                Protocol::QuicV1 => last_transport = "quic-v1",
                Protocol::Tcp(_) => last_transport = "tcp",
                Protocol::Udp(_) => {}
                _ => {}
            }
        }

        if saw_relay {
            "p2p-circuit"
        } else {
            last_transport
        }
    }

    pub fn string(&self) -> String {
        self.0.to_string()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn as_multiaddr(&self) -> &Multiaddr {
        &self.0
    }

    pub fn into_multiaddr(self) -> Multiaddr {
        self.0
    }

    /// Append a `/p2p/<peer>` suffix, replacing any existing one.
    pub fn with_peer_id(&self, peer: PeerId) -> Self {
        let stripped = self.without_peer_id();
        let mut multiaddr = stripped.0;
        multiaddr.push(Protocol::P2p(peer.to_multihash()));
        Self(multiaddr)
    }

    /// Strip a trailing `/p2p/<peer>`, if present.
    pub fn without_peer_id(&self) -> Self {
        let components: Multiaddr =
            self.0.iter().filter(|p| !matches!(p, Protocol::P2p(_))).collect();
        Self(components)
    }

    /// Extract the embedded `/p2p/<peer>` id, if present.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.0.iter().find_map(|p| match p {
            Protocol::P2p(hash) => PeerId::from_multihash(hash).ok(),
            _ => None,
        })
    }

    /// Build a relay (circuit) address to `dest`: `<self>/p2p-circuit/p2p/<dest>`.
    /// `self` must already end in `/p2p/<relayId>`.
    pub fn build_relay(&self, dest: PeerId) -> Result<Self, AddressError> {
        if self.peer_id().is_none() {
            return Err(AddressError::PeerIdMissing);
        }

        let mut multiaddr = self.0.clone();
        multiaddr.push(Protocol::P2pCircuit);
        multiaddr.push(Protocol::P2p(dest.to_multihash()));
        Ok(Self(multiaddr))
    }

    /// `true` if the address contains a `/p2p-circuit/` separator.
    pub fn is_relay(&self) -> bool {
        self.0.iter().any(|p| matches!(p, Protocol::P2pCircuit))
    }

    /// `true` if the leaf host is a loopback address.
    pub fn is_loopback(&self) -> bool {
        self.0.iter().any(|p| match p {
            Protocol::Ip4(ip) => ip.is_loopback(),
            Protocol::Ip6(ip) => ip.is_loopback(),
            _ => false,
        })
    }

    /// `true` if the leaf host is an RFC1918 / link-local / unique-local
    /// private range. DNS-named hosts are never considered private (the
    /// model never performs DNS lookups).
    pub fn is_private(&self) -> bool {
        self.0.iter().any(|p| match p {
            Protocol::Ip4(ip) => ip.is_private() || ip.is_link_local(),
            Protocol::Ip6(ip) => {
                let segments = ip.segments();
                // fc00::/7 unique local, fe80::/10 link local.
                (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
            }
            _ => false,
        })
    }

    /// `true` if the leaf host is routable on the public Internet.
    pub fn is_public(&self) -> bool {
        !self.is_loopback() && !self.is_private() && self.has_ip_host()
    }

    fn has_ip_host(&self) -> bool {
        self.0.iter().any(|p| matches!(p, Protocol::Ip4(_) | Protocol::Ip6(_)))
    }

    /// Decompose a relay address into `(relay_peer, destination_peer, relay_base)`.
    /// `relay_base` is the prefix up to and including the relay's `/p2p/<id>`.
    pub fn relay_parts(&self) -> Result<(PeerId, PeerId, Address), AddressError> {
        if !self.is_relay() {
            return Err(AddressError::NotARelayAddress);
        }

        let components: Vec<Protocol> = self.0.iter().collect();
        let split = components
            .iter()
            .position(|p| matches!(p, Protocol::P2pCircuit))
            .ok_or(AddressError::NotARelayAddress)?;

        let left: Multiaddr = components[..split].iter().cloned().collect();
        let right: Multiaddr = components[split + 1..].iter().cloned().collect();

        let relay_base = Address(left);
        let relay_peer = relay_base.peer_id().ok_or(AddressError::PeerIdMissing)?;
        let dest_peer = right
            .iter()
            .find_map(|p| match p {
                Protocol::P2p(hash) => PeerId::from_multihash(hash).ok(),
                _ => None,
            })
            .ok_or(AddressError::PeerIdMissing)?;

        Ok((relay_peer, dest_peer, relay_base))
    }

    /// The relay's own address (left of `/p2p-circuit/`), including its peer id.
    pub fn relay_base(&self) -> Result<Address, AddressError> {
        self.relay_parts().map(|(_, _, base)| base)
    }
}

fn is_recognized_protocol(protocol: &Protocol<'_>) -> bool {
    matches!(
        protocol,
        Protocol::Ip4(_)
            | Protocol::Ip6(_)
            | Protocol::Dns(_)
            | Protocol::Dns4(_)
            | Protocol::Dns6(_)
            | Protocol::Udp(_)
            | Protocol::Tcp(_)
            | Protocol::QuicV1
            | Protocol::P2pCircuit
            | Protocol::P2p(_)
    )
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_host_port_form() {
        assert!(matches!(
            Address::parse("192.168.1.1:8000"),
            Err(AddressError::InvalidAddress)
        ));
    }

    #[test]
    fn accepts_canonical_quic() {
        let addr = Address::parse("/ip4/192.168.1.1/udp/8000/quic-v1").unwrap();
        assert_eq!(addr.network(), "quic-v1");
    }

    #[test]
    fn canonical_round_trip() {
        let inputs = [
            "/ip4/203.0.113.9/udp/4009/quic-v1",
            "/ip6/::1/tcp/4001",
            "/dns4/example.com/tcp/4001",
        ];

        for input in inputs {
            let addr = Address::parse(input).unwrap();
            assert_eq!(Address::parse(&addr.string()).unwrap(), addr);
            assert_eq!(Address::from_multiaddr(addr.as_multiaddr().clone()).unwrap(), addr);
        }
    }

    #[test]
    fn with_and_without_peer_id() {
        let peer = PeerId::random();
        let addr = Address::parse("/ip4/127.0.0.1/tcp/4001").unwrap();
        let with_peer = addr.with_peer_id(peer);

        assert_eq!(with_peer.peer_id(), Some(peer));
        assert_eq!(with_peer.without_peer_id(), addr);
    }

    #[test]
    fn build_relay_requires_peer_id() {
        let relay = Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap();
        assert!(relay.build_relay(PeerId::random()).is_err());

        let relay = relay.with_peer_id(PeerId::random());
        let dest = PeerId::random();
        let circuit = relay.build_relay(dest).unwrap();

        assert!(circuit.is_relay());
        let (relay_peer, dest_peer, base) = circuit.relay_parts().unwrap();
        assert_eq!(relay_peer, relay.peer_id().unwrap());
        assert_eq!(dest_peer, dest);
        assert_eq!(base, relay);
    }

    #[test]
    fn classification_predicates() {
        assert!(Address::parse("/ip4/127.0.0.1/tcp/4001").unwrap().is_loopback());
        assert!(Address::parse("/ip4/192.168.1.1/tcp/4001").unwrap().is_private());
        assert!(Address::parse("/ip4/8.8.8.8/tcp/4001").unwrap().is_public());
        assert!(!Address::parse("/ip4/8.8.8.8/tcp/4001").unwrap().is_private());
        assert!(!Address::parse("/dns4/example.com/tcp/4001").unwrap().is_public());
    }

    #[test]
    fn relay_structure_invariant() {
        let relay_peer = PeerId::random();
        let dest_peer = PeerId::random();
        let relay = Address::parse("/ip4/9.9.9.9/udp/4001/quic-v1")
            .unwrap()
            .with_peer_id(relay_peer);
        let circuit = relay.build_relay(dest_peer).unwrap();

        // Exactly one `/p2p-circuit/` separator.
        let circuit_count =
            circuit.as_multiaddr().iter().filter(|p| matches!(p, Protocol::P2pCircuit)).count();
        assert_eq!(circuit_count, 1);
    }
}
