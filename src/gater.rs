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

//! External collaborators consulted by the dial/accept engine: a connection
//! gater (policy veto) and a connection manager (admission + lifecycle
//! notification). Both are injected; the engine never hardcodes policy.

use crate::{address::Address, PeerId};

/// Vetoes connection attempts at specific decision points. The default
/// implementation permits everything.
pub trait ConnectionGater: Send + Sync {
    fn intercept_peer_dial(&self, _peer: PeerId) -> bool {
        true
    }

    fn intercept_accept(&self, _remote_addr: &Address) -> bool {
        true
    }

    fn intercept_secured(&self, _inbound: bool, _remote: PeerId) -> bool {
        true
    }
}

/// Final admission check and lifecycle notification sink.
pub trait ConnectionManager: Send + Sync {
    fn allow(&self, _peer: PeerId, _inbound: bool) -> bool {
        true
    }

    fn notify_connected(&self, _peer: PeerId, _inbound: bool) {}

    fn notify_disconnected(&self, _peer: PeerId) {}
}

/// Gater/manager that permits every peer; the default wiring when no policy
/// is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveGater;

impl ConnectionGater for PermissiveGater {}
impl ConnectionManager for PermissiveGater {}

#[cfg(test)]
mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub Gater {}

        impl ConnectionGater for Gater {
            fn intercept_peer_dial(&self, peer: PeerId) -> bool;
            fn intercept_accept(&self, remote_addr: &Address) -> bool;
            fn intercept_secured(&self, inbound: bool, remote: PeerId) -> bool;
        }
    }

    mock! {
        pub Manager {}

        impl ConnectionManager for Manager {
            fn allow(&self, peer: PeerId, inbound: bool) -> bool;
            fn notify_connected(&self, peer: PeerId, inbound: bool);
            fn notify_disconnected(&self, peer: PeerId);
        }
    }

    #[test]
    fn rejecting_gater_blocks_dial() {
        let mut gater = MockGater::new();
        gater.expect_intercept_peer_dial().return_const(false);
        assert!(!gater.intercept_peer_dial(PeerId::random()));
    }

    #[test]
    fn permissive_gater_allows_everything() {
        let gater = PermissiveGater;
        assert!(gater.intercept_peer_dial(PeerId::random()));
        assert!(gater.intercept_accept(&crate::address::Address::parse("/ip4/1.2.3.4/tcp/1").unwrap()));
        assert!(gater.intercept_secured(true, PeerId::random()));
    }
}
