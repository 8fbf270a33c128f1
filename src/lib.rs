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

//! `reachnet` is a peer-to-peer connection and reachability core: it keeps a
//! per-peer address book, dials and accepts connections over pluggable
//! transports, and tracks - via witness reports from other peers - which of
//! its own addresses are actually reachable rather than merely locally
//! plausible.
//!
//! The pieces compose roughly in dial order:
//!
//! - [`address`] is the canonical address model, the per-peer address book,
//!   and address priority scoring.
//! - [`reachability`] turns witness reports into a verified set of
//!   advertisable addresses.
//! - [`address_manager`] discovers this node's own external addresses
//!   (local interfaces, STUN, UPnP/NAT-PMP) and feeds them to
//!   [`reachability`] as unverified candidates.
//! - [`protocol::addr_mgmt`] and [`protocol::witness`] are the wire
//!   protocols peers use to exchange address records and witness reports.
//! - [`transport`] registers pluggable transports and ranks candidate
//!   addresses; [`transport::manager`] is the dial/accept engine built on
//!   top, deduplicating concurrent dials and rate-limiting inbound accepts.
//! - [`security`] and [`muxer`] are the handshake and multiplexing layers,
//!   treated as external collaborators the embedder supplies.
//! - [`connection`] is what a dial or accept resolves into.
//! - [`discovery`] is a fan-out façade over any number of peer-discovery
//!   engines, plus the join-state machine tracking overlay membership.
//! - [`gater`] lets an embedder veto or observe connection lifecycle events.
//! - [`report`] assembles a diagnostic snapshot across all of the above.
//!
//! [`config`] holds the per-subsystem configuration types; [`error`] is the
//! crate-wide error type; [`crypto`] and [`peer_id`] underpin identity.

pub mod address;
pub mod address_manager;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod gater;
pub mod muxer;
pub mod peer_id;
pub mod protocol;
pub mod reachability;
pub mod report;
pub mod security;
pub mod transport;

pub use error::{Error, Result};
pub use peer_id::PeerId;
