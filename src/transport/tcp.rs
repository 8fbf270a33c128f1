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

//! TCP transport: the reference concrete [`Transport`](super::Transport)
//! implementation. Security and multiplexing are applied by the dial/accept
//! engine afterwards; this transport only establishes the raw byte stream.

use super::{RawConnection, Transport};
use crate::{address::Address, error::Error};

use async_trait::async_trait;
use multiaddr::Protocol;
use tokio::net::{TcpListener, TcpStream};

use std::net::SocketAddr;

const LOG_TARGET: &str = "transport::tcp";

pub struct TcpTransport {
    protocols: [&'static str; 1],
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self { protocols: ["tcp"] }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn listen(&self, addr: &Address) -> crate::Result<TcpListener> {
        let socket_addr = get_socket_address(addr)?;
        TcpListener::bind(socket_addr).await.map_err(Error::Io)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn protocols(&self) -> &[&'static str] {
        &self.protocols
    }

    fn can_dial(&self, address: &Address) -> bool {
        get_socket_address(address).is_ok()
    }

    async fn dial(&self, address: &Address) -> crate::Result<Box<RawConnection>> {
        let socket_addr = get_socket_address(address)?;
        tracing::trace!(target: LOG_TARGET, %address, "dialing");

        let stream = TcpStream::connect(socket_addr).await.map_err(Error::Io)?;
        stream.set_nodelay(true).ok();
        Ok(Box::new(stream))
    }
}

/// Extract a dialable [`SocketAddr`] from a canonical address: a leading
/// `Ip4`/`Ip6` host, a `Tcp` port, and an optional trailing `/p2p/<id>`.
/// DNS-named hosts are not resolvable here; the caller resolves them first
/// via the discovery/dial engine's own resolver.
fn get_socket_address(address: &Address) -> crate::Result<SocketAddr> {
    let mut iter = address.as_multiaddr().iter();

    let ip = match iter.next() {
        Some(Protocol::Ip4(ip)) => std::net::IpAddr::V4(ip),
        Some(Protocol::Ip6(ip)) => std::net::IpAddr::V6(ip),
        _ => return Err(Error::TransportNotSupported(address.as_multiaddr().clone())),
    };

    let port = match iter.next() {
        Some(Protocol::Tcp(port)) => port,
        _ => return Err(Error::TransportNotSupported(address.as_multiaddr().clone())),
    };

    match iter.next() {
        None | Some(Protocol::P2p(_)) => {}
        _ => return Err(Error::TransportNotSupported(address.as_multiaddr().clone())),
    }

    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_tcp_address() {
        let addr = Address::parse("/ip4/127.0.0.1/tcp/4001").unwrap();
        assert_eq!(get_socket_address(&addr).unwrap(), "127.0.0.1:4001".parse().unwrap());
    }

    #[test]
    fn parses_tcp_address_with_trailing_peer_id() {
        let addr = Address::parse("/ip4/127.0.0.1/tcp/4001").unwrap().with_peer_id(crate::PeerId::random());
        assert!(get_socket_address(&addr).is_ok());
    }

    #[test]
    fn rejects_quic_address() {
        let addr = Address::parse("/ip4/127.0.0.1/udp/4001/quic-v1").unwrap();
        assert!(get_socket_address(&addr).is_err());
    }

    #[tokio::test]
    async fn dial_to_a_local_listener_succeeds() {
        let transport = TcpTransport::new();
        let listen_addr = Address::parse("/ip4/127.0.0.1/tcp/0").unwrap();
        let listener = transport.listen(&listen_addr).await.unwrap();
        let bound_port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await });

        let dial_addr = Address::parse(&format!("/ip4/127.0.0.1/tcp/{bound_port}")).unwrap();
        transport.dial(&dial_addr).await.unwrap();

        accept.await.unwrap().unwrap();
    }
}
