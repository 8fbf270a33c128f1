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

//! Ed25519 keypair: the reference [`Identity`](super::Identity) implementation.

use ed25519_dalek::{Keypair as DalekKeypair, PublicKey as DalekPublicKey, Signature, Signer, Verifier};
use rand_core05::OsRng;
use zeroize::Zeroize;

use crate::error::Error;

/// An Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(DalekPublicKey);

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", bs58::encode(self.0.as_bytes()).into_string())
    }
}

impl PublicKey {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        DalekPublicKey::from_bytes(bytes).map(PublicKey).map_err(|_| Error::InvalidSignature)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_bytes(signature) else {
            return false;
        };
        self.0.verify(message, &sig).is_ok()
    }
}

/// An Ed25519 keypair. The secret half is zeroed on drop.
pub struct Keypair {
    inner: DalekKeypair,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        Self {
            inner: DalekKeypair::generate(&mut csprng),
        }
    }

    /// Reconstruct a keypair from its 64-byte `secret || public` encoding.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        DalekKeypair::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|_| Error::InvalidSignature)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.inner.public)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).to_bytes().to_vec()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        let mut secret_bytes = self.inner.secret.to_bytes();
        secret_bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = Keypair::generate();
        let message = b"reachable at /ip4/203.0.113.9/udp/4009/quic-v1";
        let signature = keypair.sign(message);

        assert!(keypair.public().verify(message, &signature));
    }

    #[test]
    fn mutated_signature_fails() {
        let keypair = Keypair::generate();
        let message = b"some bytes";
        let mut signature = keypair.sign(message);
        signature[0] ^= 0xff;

        assert!(!keypair.public().verify(message, &signature));
    }

    #[test]
    fn mutated_message_fails() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"original");

        assert!(!keypair.public().verify(b"tampered!", &signature));
    }

    #[test]
    fn wrong_key_fails() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let signature = keypair.sign(b"message");

        assert!(!other.public().verify(b"message", &signature));
    }
}
