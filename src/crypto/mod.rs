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

//! Cryptographic identity.
//!
//! The connection core treats identity as an external collaborator: it only
//! needs `sign(bytes) -> sig`, `verify(bytes, sig) -> bool`, and a stable
//! `node_id(public_key)` function. [`ed25519`] is the reference
//! implementation used by tests and the default configuration; callers may
//! substitute their own [`Identity`] implementation.

pub mod ed25519;

use crate::PeerId;

/// A public key, tagged by algorithm so [`PeerId::from_public_key`] and wire
/// encodings can dispatch on it. Only Ed25519 is implemented; the variant
/// exists so the wire format (`key_type` byte in the address-management
/// protocol) has somewhere to grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(ed25519::PublicKey),
}

impl PublicKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn from_bytes(key_type: u8, bytes: &[u8]) -> crate::Result<Self> {
        match key_type {
            0 => Ok(PublicKey::Ed25519(ed25519::PublicKey::from_bytes(bytes)?)),
            _ => Err(crate::Error::InvalidSignature),
        }
    }

    pub fn key_type(&self) -> u8 {
        match self {
            PublicKey::Ed25519(_) => 0,
        }
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            PublicKey::Ed25519(key) => key.verify(message, signature),
        }
    }
}

/// The identity contract the core depends on. `Sign` and `Verify` never fail
/// with I/O-style errors in this model: a bad signature simply verifies to
/// `false`.
pub trait Identity {
    fn id(&self) -> PeerId;
    fn public_key(&self) -> PublicKey;
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

impl Identity for ed25519::Keypair {
    fn id(&self) -> PeerId {
        PeerId::from_public_key(&PublicKey::Ed25519(self.public()))
    }

    fn public_key(&self) -> PublicKey {
        PublicKey::Ed25519(self.public())
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.sign(message)
    }
}

/// Derive the peer id a public key would produce. Used by the
/// address-management protocol to check `node_id(key) == record.peer_id`.
pub fn node_id(key: &PublicKey) -> PeerId {
    PeerId::from_public_key(key)
}
