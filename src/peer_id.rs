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

//! Fixed-width peer identifier: a 32-byte hash of the peer's public key.

use crate::{crypto::PublicKey, error::AddressError};

use multihash::{Code, Multihash, MultihashDigest};
use rand::RngCore;
use sha2::{Digest, Sha256};

use std::fmt;

/// Multicodec identity prefix used when embedding a [`PeerId`] in a multihash.
const IDENTITY_MULTIHASH_CODE: u64 = 0x00;

/// A 32-byte opaque hash of a peer's public key.
///
/// Equality is byte-equality. [`PeerId::empty`] is the sentinel used for "no
/// peer" (e.g. the address book refuses to store addresses under it).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Derive a [`PeerId`] from a public key: `sha256(public_key_bytes)`.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.to_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// The all-zero sentinel peer id, used to mean "no peer" / "unset".
    pub const fn empty() -> Self {
        Self([0u8; 32])
    }

    /// `true` if this is the [`PeerId::empty`] sentinel.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Generate a random peer id. Intended for tests and throwaway fixtures;
    /// a real peer id is always derived from a public key.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a [`PeerId`] out of a [`Multihash`] (the `/p2p/<id>` component).
    pub fn from_multihash(hash: Multihash) -> Result<Self, AddressError> {
        if hash.code() != IDENTITY_MULTIHASH_CODE || hash.digest().len() != 32 {
            return Err(AddressError::MalformedMultiaddr);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.digest());
        Ok(Self(bytes))
    }

    /// Encode as an identity [`Multihash`] suitable for a `/p2p/<id>` component.
    pub fn to_multihash(&self) -> Multihash {
        Code::Identity.digest(&self.0)
    }

    /// Canonical base58 text form, e.g. for log lines and the wire protocol.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse the canonical base58 text form.
    pub fn from_base58(s: &str) -> Result<Self, AddressError> {
        let bytes = bs58::decode(s).into_vec().map_err(|_| AddressError::MalformedMultiaddr)?;
        if bytes.len() != 32 {
            return Err(AddressError::MalformedMultiaddr);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Truncated form for log lines: first 6 and last 6 base58 characters.
    pub fn to_short_string(&self) -> String {
        let full = self.to_base58();
        if full.len() <= 16 {
            return full;
        }
        format!("{}..{}", &full[..8], &full[full.len() - 6..])
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_short_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl From<[u8; 32]> for PeerId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519::Keypair;

    #[test]
    fn empty_is_all_zero() {
        assert!(PeerId::empty().is_empty());
        assert!(!PeerId::random().is_empty());
    }

    #[test]
    fn base58_round_trips() {
        let peer = PeerId::from_public_key(&PublicKey::Ed25519(Keypair::generate().public()));
        let text = peer.to_base58();
        assert_eq!(PeerId::from_base58(&text).unwrap(), peer);
    }

    #[test]
    fn multihash_round_trips() {
        let peer = PeerId::random();
        let hash = peer.to_multihash();
        assert_eq!(PeerId::from_multihash(hash).unwrap(), peer);
    }

    #[test]
    fn deterministic_from_same_key() {
        let keypair = Keypair::generate();
        let key = PublicKey::Ed25519(keypair.public());
        assert_eq!(PeerId::from_public_key(&key), PeerId::from_public_key(&key));
    }
}
