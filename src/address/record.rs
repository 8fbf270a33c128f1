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

//! Signed address record: the canonical envelope a peer publishes for its
//! own reachable addresses.

use super::Address;
use crate::{
    crypto::{node_id, Identity, PublicKey},
    error::{AddressError, Error},
    PeerId,
};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A peer's self-published, signed set of addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    peer: PeerId,
    realm_id: String,
    sequence: u64,
    addresses: Vec<Address>,
    timestamp_ns: u64,
    ttl: Duration,
    signature: Option<Vec<u8>>,
}

impl AddressRecord {
    /// Create an unsigned record. `sequence` is initialized from wall-clock
    /// nanoseconds so independently-created records for the same peer don't
    /// collide on sequence number.
    pub fn new(peer: PeerId, addrs: Vec<Address>, ttl: Duration) -> Self {
        let now_ns = now_ns();
        Self {
            peer,
            realm_id: String::new(),
            sequence: now_ns,
            addresses: addrs,
            timestamp_ns: now_ns,
            ttl,
            signature: None,
        }
    }

    pub fn with_realm(mut self, realm_id: impl Into<String>) -> Self {
        self.realm_id = realm_id.into();
        self
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn realm_id(&self) -> &str {
        &self.realm_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Byte encoding the signature covers:
    /// `peer_id(32) || u16 realm_id len || realm_id bytes || be-u64 sequence
    /// || be-u32 address count || per-address (be-u32 len || utf8 bytes) ||
    /// be-u64 timestamp_ns || be-u64 ttl_ns`.
    fn signing_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.peer.as_bytes());

        let realm_bytes = self.realm_id.as_bytes();
        buf.extend_from_slice(&(realm_bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(realm_bytes);

        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&(self.addresses.len() as u32).to_be_bytes());

        for address in &self.addresses {
            let bytes = address.string().into_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(&bytes);
        }

        buf.extend_from_slice(&self.timestamp_ns.to_be_bytes());
        buf.extend_from_slice(&(self.ttl.as_nanos() as u64).to_be_bytes());
        buf
    }

    /// Sign the record with `identity`, whose [`crate::PeerId`] must equal
    /// `self.peer`.
    pub fn sign(&mut self, identity: &impl Identity) -> crate::Result<()> {
        if identity.id() != self.peer {
            return Err(Error::IdentityMismatch {
                expected: self.peer,
                remote: identity.id(),
            });
        }

        let payload = self.signing_payload();
        self.signature = Some(identity.sign(&payload));
        Ok(())
    }

    /// Verify the signature against `public_key`, and that `public_key`
    /// actually derives `self.peer`.
    pub fn verify(&self, public_key: &PublicKey) -> crate::Result<()> {
        if self.addresses.is_empty() {
            return Err(Error::EmptyAddresses);
        }

        if node_id(public_key) != self.peer {
            return Err(Error::IdentityMismatch {
                expected: self.peer,
                remote: node_id(public_key),
            });
        }

        let signature = self.signature.as_ref().ok_or(Error::InvalidSignature)?;
        let payload = self.signing_payload();

        if !public_key.verify(&payload, signature) {
            return Err(Error::InvalidSignature);
        }

        Ok(())
    }

    /// Bump the sequence to the current wall-clock nanosecond count (never
    /// going backwards) and clear the now-stale signature.
    pub fn increment_sequence(&mut self) {
        let candidate = now_ns();
        self.sequence = std::cmp::max(self.sequence + 1, candidate);
        self.timestamp_ns = now_ns();
        self.signature = None;
    }

    /// `true` if `now - timestamp > ttl`, using wall-clock time.
    pub fn is_expired(&self) -> bool {
        let now = now_ns();
        let age_ns = now.saturating_sub(self.timestamp_ns);
        age_ns > self.ttl.as_nanos() as u64
    }

    /// `true` if `self` should replace `other` in an address book:
    /// strictly greater sequence, or equal sequence with a strictly newer
    /// timestamp.
    pub fn is_newer_than(&self, other: &AddressRecord) -> bool {
        match self.sequence.cmp(&other.sequence) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.timestamp_ns > other.timestamp_ns,
        }
    }

    /// Validate structural invariants that don't require a public key:
    /// non-empty addresses and a non-expired TTL window.
    pub fn validate_unsigned(&self) -> crate::Result<()> {
        if self.addresses.is_empty() {
            return Err(Error::EmptyAddresses);
        }
        if self.is_expired() {
            return Err(Error::ExpiredRecord);
        }
        Ok(())
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// Surface AddressError so callers constructing records from raw addresses
// can propagate parse failures without reaching into `crate::error` again.
pub type ParseError = AddressError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519::Keypair;

    fn sample_addrs() -> Vec<Address> {
        vec![Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap()]
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let keypair = Keypair::generate();
        let mut record = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));

        record.sign(&keypair).unwrap();
        record.verify(&keypair.public_key()).unwrap();
    }

    #[test]
    fn verify_fails_without_signature() {
        let keypair = Keypair::generate();
        let record = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));

        assert!(matches!(record.verify(&keypair.public_key()), Err(Error::InvalidSignature)));
    }

    #[test]
    fn verify_fails_for_wrong_signer() {
        let owner = Keypair::generate();
        let impostor = Keypair::generate();
        let mut record = AddressRecord::new(owner.id(), sample_addrs(), Duration::from_secs(60));

        record.sign(&owner).unwrap();
        // Re-point signature verification at a key that does not derive the
        // record's claimed peer id.
        let err = record.verify(&impostor.public_key()).unwrap_err();
        assert!(matches!(err, Error::IdentityMismatch { .. }));
    }

    #[test]
    fn tampered_address_invalidates_signature() {
        let keypair = Keypair::generate();
        let mut record = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));
        record.sign(&keypair).unwrap();

        record.addresses.push(Address::parse("/ip4/1.2.3.4/tcp/1").unwrap());
        assert!(matches!(record.verify(&keypair.public_key()), Err(Error::InvalidSignature)));
    }

    #[test]
    fn increment_sequence_clears_signature_and_advances() {
        let keypair = Keypair::generate();
        let mut record = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));
        record.sign(&keypair).unwrap();

        let prev_sequence = record.sequence();
        record.increment_sequence();

        assert!(!record.is_signed());
        assert!(record.sequence() > prev_sequence);
    }

    #[test]
    fn newer_than_prefers_higher_sequence() {
        let keypair = Keypair::generate();
        let older = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));
        let mut newer = older.clone();
        newer.sequence = older.sequence + 1;

        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
    }

    #[test]
    fn newer_than_breaks_ties_with_timestamp() {
        let keypair = Keypair::generate();
        let base = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_secs(60));
        let mut later_timestamp = base.clone();
        later_timestamp.timestamp_ns = base.timestamp_ns + 1;

        assert!(later_timestamp.is_newer_than(&base));
    }

    #[test]
    fn empty_addresses_rejected() {
        let keypair = Keypair::generate();
        let record = AddressRecord::new(keypair.id(), Vec::new(), Duration::from_secs(60));
        assert!(matches!(record.validate_unsigned(), Err(Error::EmptyAddresses)));
    }

    #[test]
    fn expired_record_rejected() {
        let keypair = Keypair::generate();
        let mut record = AddressRecord::new(keypair.id(), sample_addrs(), Duration::from_nanos(1));
        record.timestamp_ns = 1;
        assert!(matches!(record.validate_unsigned(), Err(Error::ExpiredRecord)));
    }
}
