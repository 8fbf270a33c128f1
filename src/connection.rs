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

//! The connection object: what a peer dial/accept resolves
//! into once security and multiplexing are applied.

use crate::{address::Address, error::Error, muxer::Muxer, PeerId};

use parking_lot::RwLock;

use std::{
    any::Any,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

const LOG_TARGET: &str = "connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Securing,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub streams_opened: u64,
    pub streams_accepted: u64,
    pub opened_at: Option<Instant>,
}

/// Opaque realm-auth context. Filled in by an external realm-auth protocol;
/// non-system protocols are only admitted on connections carrying a valid,
/// non-expired context.
#[derive(Clone)]
pub struct RealmContext {
    pub realm_id: String,
    pub expires_at: Option<Instant>,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl RealmContext {
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

pub type ConnectionId = u64;

/// Close-event kinds dispatched to registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    Failed,
}

type CloseCallback = Arc<dyn Fn(ConnectionId, ConnectionEvent) + Send + Sync>;

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_peer", &self.remote_peer)
            .field("remote_addr", &self.remote_addr)
            .field("direction", &self.direction)
            .field("transport_name", &self.transport_name)
            .finish()
    }
}

/// A secured, multiplexed connection to a remote peer.
pub struct Connection {
    id: ConnectionId,
    remote_peer: PeerId,
    remote_addr: Address,
    direction: Direction,
    transport_name: &'static str,
    muxer: Arc<dyn Muxer>,
    state: RwLock<ConnectionState>,
    stats: RwLock<ConnectionStats>,
    realm_context: RwLock<Option<RealmContext>>,
    callbacks: RwLock<Vec<CloseCallback>>,
    stream_counter: AtomicU64,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        remote_peer: PeerId,
        remote_addr: Address,
        direction: Direction,
        transport_name: &'static str,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        Self {
            id,
            remote_peer,
            remote_addr,
            direction,
            transport_name,
            muxer,
            state: RwLock::new(ConnectionState::Connected),
            stats: RwLock::new(ConnectionStats {
                opened_at: Some(Instant::now()),
                ..Default::default()
            }),
            realm_context: RwLock::new(None),
            callbacks: RwLock::new(Vec::new()),
            stream_counter: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_peer(&self) -> PeerId {
        self.remote_peer
    }

    pub fn remote_addr(&self) -> &Address {
        &self.remote_addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport_name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// `true` if the remote address routes through a circuit relay hop.
    pub fn is_relayed(&self) -> bool {
        self.remote_addr.is_relay()
    }

    /// The relay's peer id, if this connection arrived over a circuit.
    pub fn relay_peer_id(&self) -> Option<PeerId> {
        self.remote_addr.relay_parts().ok().map(|(relay, _, _)| relay)
    }

    pub fn realm_context(&self) -> Option<RealmContext> {
        self.realm_context.read().clone()
    }

    pub fn set_realm_context(&self, context: RealmContext) {
        *self.realm_context.write() = Some(context);
    }

    /// `true` if a non-system protocol may run on this connection: requires
    /// a realm context that is both present and not expired.
    pub fn admits_non_system_protocols(&self) -> bool {
        self.realm_context.read().as_ref().map(|ctx| ctx.is_valid()).unwrap_or(false)
    }

    pub fn register_close_callback(&self, callback: impl Fn(ConnectionId, ConnectionEvent) + Send + Sync + 'static) {
        self.callbacks.write().push(Arc::new(callback));
    }

    pub async fn open_stream(&self) -> crate::Result<Box<crate::security::SecureConnection>> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::ConnectionClosed);
        }
        let stream = self.muxer.open_stream().await?;
        self.stream_counter.fetch_add(1, Ordering::Relaxed);
        self.stats.write().streams_opened += 1;
        Ok(stream)
    }

    pub async fn accept_stream(&self) -> crate::Result<Box<crate::security::SecureConnection>> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::ConnectionClosed);
        }
        let stream = self.muxer.accept_stream().await?;
        self.stats.write().streams_accepted += 1;
        Ok(stream)
    }

    /// Idempotent close: draining pending streams, releasing the muxer, then
    /// dispatching a close event to every registered callback asynchronously
    /// so a slow callback never back-pressures the closing path.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed || *state == ConnectionState::Closing {
                return;
            }
            *state = ConnectionState::Closing;
        }

        self.muxer.close().await;
        *self.state.write() = ConnectionState::Closed;
        self.realm_context.write().take();

        self.dispatch(ConnectionEvent::Closed);
    }

    /// Runs after the muxer is released and the state lock dropped, so a
    /// slow observer callback never blocks another caller racing to close
    /// the same connection.
    fn dispatch(&self, event: ConnectionEvent) {
        let id = self.id;
        for callback in self.callbacks.read().iter() {
            tracing::trace!(target: LOG_TARGET, connection = id, ?event, "dispatching close event");
            callback(id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxer::testing::{SingleStreamMuxer, SingleStreamMuxerFactory};
    use crate::muxer::MuxerFactory;
    use std::sync::atomic::AtomicBool;

    fn dummy_connection() -> Connection {
        let (a, _b) = tokio::io::duplex(4096);
        let muxer: Arc<dyn Muxer> = Arc::new(SingleStreamMuxer::new(Box::new(a)));
        Connection::new(1, PeerId::random(), Address::parse("/ip4/1.2.3.4/tcp/1").unwrap(), Direction::Outbound, "tcp", muxer)
    }

    #[test]
    fn fresh_connection_is_connected() {
        let conn = dummy_connection();
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let conn = dummy_connection();
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn close_dispatches_to_registered_callbacks() {
        let conn = dummy_connection();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        conn.register_close_callback(move |_, event| {
            if event == ConnectionEvent::Closed {
                fired_clone.store(true, Ordering::SeqCst);
            }
        });

        conn.close().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn relay_address_reports_relay_peer() {
        let relay_peer = PeerId::random();
        let dest = PeerId::random();
        let addr = Address::parse("/ip4/1.2.3.4/tcp/1").unwrap().with_peer_id(relay_peer).build_relay(dest).unwrap();

        let muxer: Arc<dyn Muxer> = Arc::new(SingleStreamMuxer::new(Box::new(tokio::io::duplex(1).0)));
        let conn = Connection::new(2, dest, addr, Direction::Outbound, "tcp", muxer);

        assert!(conn.is_relayed());
        assert_eq!(conn.relay_peer_id(), Some(relay_peer));
    }

    #[test]
    fn missing_realm_context_blocks_non_system_protocols() {
        let conn = dummy_connection();
        assert!(!conn.admits_non_system_protocols());
    }

    #[test]
    fn expired_realm_context_blocks_non_system_protocols() {
        let conn = dummy_connection();
        conn.set_realm_context(RealmContext {
            realm_id: "example".into(),
            expires_at: Some(Instant::now() - std::time::Duration::from_secs(1)),
            payload: Arc::new(()),
        });
        assert!(!conn.admits_non_system_protocols());
    }

    #[test]
    fn valid_realm_context_admits_non_system_protocols() {
        let conn = dummy_connection();
        conn.set_realm_context(RealmContext {
            realm_id: "example".into(),
            expires_at: None,
            payload: Arc::new(()),
        });
        assert!(conn.admits_non_system_protocols());
    }

    #[tokio::test]
    async fn muxer_factory_produces_single_stream_muxer() {
        let (a, _b) = tokio::io::duplex(4096);
        let factory = SingleStreamMuxerFactory;
        let muxer = factory.new_muxer(Box::new(a), false).await.unwrap();
        muxer.open_stream().await.unwrap();
        assert!(muxer.open_stream().await.is_err());
    }
}
