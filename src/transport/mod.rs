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

//! Transport registry and address ranker, plus the
//! [`Transport`] contract every concrete transport implements.

pub mod manager;
pub mod tcp;

use crate::{address::Address, error::Error, PeerId};

use async_trait::async_trait;

use std::{collections::HashMap, sync::Arc};

/// A full-duplex async byte stream. Used, under different names, at every
/// stage of the connection pipeline: raw (pre-security), secure
/// (post-handshake, pre-mux), and individual multiplexed streams.
pub trait AsyncByteStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin> AsyncByteStream for T {}

/// A raw, unsecured byte stream returned by `Transport::dial`/listeners,
/// before the security and multiplexing layers are applied. The core treats
/// security and multiplexing as external collaborators; see
/// [`crate::security`].
pub type RawConnection = dyn AsyncByteStream;

/// A pluggable transport. `protocols()` advertises the address tokens it
/// claims (e.g. `["tcp"]`, `["quic-v1"]`, `["p2p-circuit"]`); the registry
/// refuses to register a transport whose protocol overlaps one already
/// claimed.
#[async_trait]
pub trait Transport: Send + Sync {
    fn protocols(&self) -> &[&'static str];

    /// `true` if this transport is structurally able to dial `address`
    /// (protocol match plus any transport-specific constraints).
    fn can_dial(&self, address: &Address) -> bool;

    async fn dial(&self, address: &Address) -> crate::Result<Box<RawConnection>>;

    /// `true` for transports (e.g. relay/circuit) that must always run the
    /// security handshake even when the raw connection looks already secure,
    /// because the intermediate hop is untrusted.
    fn is_proxy(&self) -> bool {
        false
    }
}

/// Maps address protocol tokens to the transport that handles them.
#[derive(Default)]
pub struct TransportRegistry {
    by_protocol: HashMap<&'static str, Arc<dyn Transport>>,
    order: Vec<Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transport`. Fails with [`Error::DuplicateTransport`] if any
    /// of its declared protocols is already claimed.
    pub fn add(&mut self, transport: Arc<dyn Transport>) -> crate::Result<()> {
        for protocol in transport.protocols() {
            if self.by_protocol.contains_key(protocol) {
                return Err(Error::DuplicateTransport);
            }
        }

        for protocol in transport.protocols() {
            self.by_protocol.insert(protocol, transport.clone());
        }
        self.order.push(transport);
        Ok(())
    }

    /// Selection rule for address `a`:
    /// 1. If `a` is a relay address, return the `p2p-circuit` transport.
    /// 2. Else, if the leaf transport token has a claiming, dialable transport, return it.
    /// 3. Else return the first registered transport whose `can_dial(a)` is true.
    pub fn select(&self, address: &Address) -> Option<Arc<dyn Transport>> {
        if address.is_relay() {
            return self.by_protocol.get("p2p-circuit").cloned();
        }

        if let Some(transport) = self.by_protocol.get(address.network()) {
            if transport.can_dial(address) {
                return Some(transport.clone());
            }
        }

        self.order.iter().find(|t| t.can_dial(address)).cloned()
    }
}

/// Partition `addrs` into direct-first, relay-last, preserving the relative
/// order within each partition (a stable rank, not a score-based sort).
pub fn rank_addresses(addrs: Vec<Address>) -> Vec<Address> {
    let (mut direct, mut relay): (Vec<Address>, Vec<Address>) = (Vec::new(), Vec::new());
    for addr in addrs {
        if addr.is_relay() {
            relay.push(addr);
        } else {
            direct.push(addr);
        }
    }
    direct.extend(relay);
    direct
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTransport {
        protocols: Vec<&'static str>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn protocols(&self) -> &[&'static str] {
            &self.protocols
        }

        fn can_dial(&self, _address: &Address) -> bool {
            true
        }

        async fn dial(&self, _address: &Address) -> crate::Result<Box<RawConnection>> {
            Err(Error::TransportNotSupported(Address::parse("/ip4/0.0.0.0/tcp/0").unwrap().into_multiaddr()))
        }
    }

    #[test]
    fn registering_overlapping_protocol_fails() {
        let mut registry = TransportRegistry::new();
        registry.add(Arc::new(FakeTransport { protocols: vec!["tcp"] })).unwrap();
        let err = registry.add(Arc::new(FakeTransport { protocols: vec!["tcp"] }));
        assert!(matches!(err, Err(Error::DuplicateTransport)));
    }

    #[test]
    fn relay_address_selects_circuit_transport() {
        let mut registry = TransportRegistry::new();
        registry.add(Arc::new(FakeTransport { protocols: vec!["p2p-circuit"] })).unwrap();
        registry.add(Arc::new(FakeTransport { protocols: vec!["tcp"] })).unwrap();

        let relay_peer = PeerId::random();
        let dest = PeerId::random();
        let relay = Address::parse("/ip4/1.2.3.4/tcp/1")
            .unwrap()
            .with_peer_id(relay_peer)
            .build_relay(dest)
            .unwrap();

        let selected = registry.select(&relay).unwrap();
        assert_eq!(selected.protocols(), &["p2p-circuit"]);
    }

    #[test]
    fn direct_address_selects_matching_leaf_transport() {
        let mut registry = TransportRegistry::new();
        registry.add(Arc::new(FakeTransport { protocols: vec!["tcp"] })).unwrap();

        let addr = Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap();
        assert_eq!(registry.select(&addr).unwrap().protocols(), &["tcp"]);
    }

    #[test]
    fn no_matching_transport_returns_none() {
        let registry = TransportRegistry::new();
        let addr = Address::parse("/ip4/1.2.3.4/tcp/4001").unwrap();
        assert!(registry.select(&addr).is_none());
    }

    #[test]
    fn ranker_moves_relay_addresses_after_direct_preserving_order() {
        let a = Address::parse("/ip4/1.0.0.1/tcp/1").unwrap();
        let b = Address::parse("/ip4/1.0.0.2/tcp/1").unwrap();
        let relay_peer = PeerId::random();
        let relay = Address::parse("/ip4/9.9.9.9/tcp/9").unwrap().with_peer_id(relay_peer).build_relay(PeerId::random()).unwrap();

        let ranked = rank_addresses(vec![relay.clone(), a.clone(), b.clone()]);
        assert_eq!(ranked, vec![a, b, relay]);
    }
}
