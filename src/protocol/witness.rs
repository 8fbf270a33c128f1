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

//! Witness-report protocol: tells a connected peer what remote address and
//! IP we observed their inbound connection arrive from, feeding the
//! reachability coordinator's witness-based promotion.

use crate::{address::Address, reachability::ReachabilityCoordinator, PeerId};

use bytes::{Buf, BufMut, BytesMut};
use futures::stream::FuturesUnordered;

use std::{net::IpAddr, sync::Arc};

pub const PROTOCOL_NAME: &str = "/reachnet/witness/1.0";

const LOG_TARGET: &str = "protocol::witness";

/// One witness report: "I (`from`) saw an inbound connection claiming to
/// originate from `observed_addr`/`observed_ip`".
#[derive(Debug, Clone)]
pub struct WitnessEvent {
    pub from: PeerId,
    pub observed_addr: Address,
    pub observed_ip: IpAddr,
}

impl WitnessEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(self.from.as_bytes());
        let addr_bytes = self.observed_addr.string().into_bytes();
        buf.put_u16(addr_bytes.len() as u16);
        buf.put_slice(&addr_bytes);
        buf.to_vec()
    }

    pub fn decode(from: PeerId, observed_ip: IpAddr, body: &[u8]) -> crate::Result<Self> {
        let mut buf: &[u8] = body;

        if buf.remaining() < 32 {
            return Err(crate::Error::ProtocolNegotiation);
        }
        buf.advance(32);

        if buf.remaining() < 2 {
            return Err(crate::Error::ProtocolNegotiation);
        }
        let addr_len = buf.get_u16() as usize;

        if buf.remaining() < addr_len {
            return Err(crate::Error::ProtocolNegotiation);
        }
        let text = String::from_utf8_lossy(&buf.copy_to_bytes(addr_len)).into_owned();
        let observed_addr = Address::parse(&text).map_err(crate::Error::AddressError)?;
        Ok(Self { from, observed_addr, observed_ip })
    }
}

/// Runs the witness exchange for every connection that opens the protocol:
/// on each inbound report, feeds [`ReachabilityCoordinator::on_inbound_witness`].
/// Mirrors the connection-keyed event-loop shape used by other per-connection
/// protocol handlers: pending futures are driven from a single
/// `FuturesUnordered`, new connections register their future as they arrive.
pub struct WitnessProtocol {
    coordinator: Arc<ReachabilityCoordinator>,
    pending: FuturesUnordered<std::pin::Pin<Box<dyn futures::Future<Output = Option<WitnessEvent>> + Send>>>,
}

impl WitnessProtocol {
    pub fn new(coordinator: Arc<ReachabilityCoordinator>) -> Self {
        Self {
            coordinator,
            pending: FuturesUnordered::new(),
        }
    }

    /// Record one inbound witness report immediately, without going through
    /// the pending-futures loop (used by the synchronous test harness and by
    /// the dial engine when it decodes a report inline).
    pub fn on_witness_event(&self, event: WitnessEvent) {
        tracing::trace!(target: LOG_TARGET, witness = %event.from, addr = %event.observed_addr, "witness report received");
        self.coordinator.on_inbound_witness(event.observed_addr, event.from, event.observed_ip);
    }

    /// Drive the pending-futures loop once; returns when no future resolves
    /// immediately. Callers typically `tokio::select!` this alongside other
    /// per-connection event sources.
    pub async fn next_event(&mut self) -> Option<WitnessEvent> {
        use futures::StreamExt;
        loop {
            match self.pending.next().await {
                Some(Some(event)) => return Some(event),
                Some(None) => continue,
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReachabilityConfig;

    #[test]
    fn witness_event_round_trips_through_wire_encoding() {
        let addr = Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap();
        let event = WitnessEvent {
            from: PeerId::random(),
            observed_addr: addr.clone(),
            observed_ip: "1.2.3.4".parse().unwrap(),
        };

        let encoded = event.encode();
        let decoded = WitnessEvent::decode(event.from, event.observed_ip, &encoded).unwrap();
        assert_eq!(decoded.observed_addr, addr);
    }

    #[test]
    fn on_witness_event_feeds_coordinator() {
        let coordinator = Arc::new(ReachabilityCoordinator::new(ReachabilityConfig::default()));
        let protocol = WitnessProtocol::new(coordinator.clone());
        let addr = Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap();

        coordinator.on_direct_candidate(addr.clone(), "test", 10);
        protocol.on_witness_event(WitnessEvent {
            from: PeerId::random(),
            observed_addr: addr.clone(),
            observed_ip: "1.2.3.4".parse().unwrap(),
        });
        protocol.on_witness_event(WitnessEvent {
            from: PeerId::random(),
            observed_addr: addr.clone(),
            observed_ip: "5.6.7.8".parse().unwrap(),
        });

        assert_eq!(coordinator.verified_direct_addresses(), vec![addr]);
    }
}
