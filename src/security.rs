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

//! The secure-channel and multiplexing layers are external collaborators:
//! the dial/accept engine only needs `secure_outbound`/`secure_inbound` and
//! a way to open/accept streams on the result. Concrete handshake and
//! multiplexing protocols (noise, yamux, QUIC's integrated TLS, ...) are
//! supplied by the embedder, not by this crate.

use crate::{transport::RawConnection, PeerId};

use async_trait::async_trait;

/// A secured, but not yet multiplexed, byte stream plus the remote identity
/// the handshake proved. Same underlying stream abstraction as
/// [`RawConnection`]; the distinct name marks pipeline stage, not a
/// different trait.
pub type SecureConnection = RawConnection;

#[async_trait]
pub trait Security: Send + Sync {
    /// Upgrade an outbound raw connection, asserting the remote identity is
    /// `expected_peer`. Implementations that cannot make that assertion
    /// (e.g. because the handshake doesn't bind identity) must still return
    /// the identity they observed so the caller can compare it itself.
    async fn secure_outbound(
        &self,
        raw: Box<RawConnection>,
        expected_peer: PeerId,
    ) -> crate::Result<(Box<SecureConnection>, PeerId)>;

    async fn secure_inbound(&self, raw: Box<RawConnection>) -> crate::Result<(Box<SecureConnection>, PeerId)>;

    /// A connection this transport produced is already authenticated (e.g.
    /// QUIC's integrated TLS) and does not need a further handshake, unless
    /// it arrived via a proxy hop (see [`crate::transport::Transport::is_proxy`]).
    fn already_secure(&self, _raw: &RawConnection) -> bool {
        false
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! A security stub for tests and examples: it performs no handshake and
    //! simply trusts the peer id the caller asserts. Never wire this into a
    //! production configuration.
    use super::*;

    pub struct TrustingSecurity;

    #[async_trait]
    impl Security for TrustingSecurity {
        async fn secure_outbound(
            &self,
            raw: Box<RawConnection>,
            expected_peer: PeerId,
        ) -> crate::Result<(Box<SecureConnection>, PeerId)> {
            Ok((raw, expected_peer))
        }

        async fn secure_inbound(&self, raw: Box<RawConnection>) -> crate::Result<(Box<SecureConnection>, PeerId)> {
            Ok((raw, PeerId::random()))
        }
    }
}
