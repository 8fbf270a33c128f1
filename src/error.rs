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

//! Crate-wide error type.

use crate::PeerId;
use multiaddr::Multiaddr;

/// Address parsing/classification errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address does not start with `/`")]
    InvalidAddress,

    #[error("unsupported protocol in address")]
    UnsupportedProtocol,

    #[error("malformed multiaddr")]
    MalformedMultiaddr,

    #[error("address is missing a trailing `/p2p/<peerId>`")]
    PeerIdMissing,

    #[error("address is not a relay (circuit) address")]
    NotARelayAddress,
}

/// Crate-wide error type.
///
/// Variants are named after the error *kind* a caller needs to react to, not
/// after internal type names, so callers can match on the condition rather
/// than the implementation detail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid address: {0}")]
    AddressError(#[from] AddressError),

    #[error("tried to dial self")]
    SelfConnect,

    #[error("no addresses available for peer {0:?}")]
    NoAddresses(PeerId),

    #[error("remote identity {remote:?} did not match expected peer {expected:?}")]
    IdentityMismatch { expected: PeerId, remote: PeerId },

    #[error("all dial attempts failed")]
    AllDialsFailed {
        #[source]
        last: Box<Error>,
    },

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection attempt timed out")]
    ConnectionTimeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("stream closed")]
    StreamClosed,

    #[error("stream reset")]
    StreamReset,

    #[error("stream limit reached")]
    StreamLimit,

    #[error("protocol {0} is not supported by the remote peer")]
    ProtocolNotSupported(String),

    #[error("protocol negotiation failed")]
    ProtocolNegotiation,

    #[error("invalid signature on address record")]
    InvalidSignature,

    #[error("address record has expired")]
    ExpiredRecord,

    #[error("address record sequence did not strictly advance")]
    StaleSequence,

    #[error("address record carries no addresses")]
    EmptyAddresses,

    #[error("bootstrap failed")]
    BootstrapFailed,

    #[error("discovery recursion depth exceeded")]
    RecursiveDiscovery,

    #[error("rate limited")]
    RateLimited,

    #[error("resource exhausted")]
    ResourceExhausted,

    #[error("component not started")]
    NotStarted,

    #[error("already closed")]
    AlreadyClosed,

    #[error("shutting down")]
    ShuttingDown,

    #[error("peer {0:?} is already connected")]
    AlreadyConnected(PeerId),

    #[error("transport does not support address {0}")]
    TransportNotSupported(Multiaddr),

    #[error("transport already registered for one of its declared protocols")]
    DuplicateTransport,

    #[error("dns resolution failed for {0}")]
    DnsResolutionFailed(Multiaddr),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel closed")]
    ChannelClosed,

    #[error("operation cancelled")]
    Cancelled,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
