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

//! Address-management wire protocol: `refresh_notify`,
//! `query_req`, `query_resp` over a length-prefixed framing on a single
//! stream, identified as `/reachnet/addr-mgmt/1.0`.

use crate::{
    address::{book::AddressBook, Address},
    crypto::{node_id, PublicKey},
    error::Error,
    PeerId,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio_util::codec::{Decoder, Encoder, Framed};

use std::{collections::HashMap, sync::Arc, time::Duration};

pub const PROTOCOL_NAME: &str = "/reachnet/addr-mgmt/1.0";

const LOG_TARGET: &str = "protocol::addr_mgmt";

/// Hard cap on a framed message body.
pub const MAX_BODY_LEN: u32 = 64 * 1024;

/// Hard cap on addresses carried in a single `refresh_notify`.
const MAX_ADDRS_PER_NOTIFY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    RefreshNotify,
    QueryReq,
    QueryResp,
}

impl MessageType {
    fn tag(self) -> u8 {
        match self {
            MessageType::RefreshNotify => 0x01,
            MessageType::QueryReq => 0x02,
            MessageType::QueryResp => 0x03,
        }
    }

    fn from_tag(tag: u8) -> crate::Result<Self> {
        match tag {
            0x01 => Ok(MessageType::RefreshNotify),
            0x02 => Ok(MessageType::QueryReq),
            0x03 => Ok(MessageType::QueryResp),
            _ => Err(Error::ProtocolNegotiation),
        }
    }
}

/// A decoded `refresh_notify` body, optionally carrying the signer's key and
/// a trailing signature.
#[derive(Debug, Clone)]
pub struct RefreshNotify {
    pub peer: PeerId,
    pub realm_id: String,
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub addresses: Vec<Address>,
    pub key: Option<PublicKey>,
    pub signature: Option<Vec<u8>>,
}

impl RefreshNotify {
    /// The bytes the signature (when present) covers: everything up to but
    /// excluding the trailing `key_type; key length; key; signature` tail.
    fn signed_prefix(&self) -> BytesMut {
        encode_signed_prefix(&self.peer, &self.realm_id, self.sequence, self.timestamp_ns, &self.addresses)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.signed_prefix();

        if let Some(key) = &self.key {
            let key_bytes = key.to_bytes();
            buf.put_u8(key.key_type());
            buf.put_u16(key_bytes.len() as u16);
            buf.put_slice(&key_bytes);
        }

        if let Some(sig) = &self.signature {
            buf.put_slice(sig);
        }

        buf.to_vec()
    }

    pub fn decode(body: &[u8]) -> crate::Result<Self> {
        let mut buf: &[u8] = body;

        let peer_bytes = checked_copy_to_bytes(&mut buf, 32)?;
        let peer = PeerId::from(<[u8; 32]>::try_from(peer_bytes.as_ref()).map_err(|_| Error::ProtocolNegotiation)?);

        let realm_len = checked_get_u16(&mut buf)? as usize;
        let realm_id = String::from_utf8_lossy(&checked_copy_to_bytes(&mut buf, realm_len)?).into_owned();

        let sequence = checked_get_u64(&mut buf)?;
        let timestamp_ns = checked_get_u64(&mut buf)?;

        let addr_count = checked_get_u16(&mut buf)? as usize;
        if addr_count > MAX_ADDRS_PER_NOTIFY {
            return Err(Error::ProtocolNegotiation);
        }

        let mut addresses = Vec::with_capacity(addr_count);
        for _ in 0..addr_count {
            let len = checked_get_u16(&mut buf)? as usize;
            let text = String::from_utf8_lossy(&checked_copy_to_bytes(&mut buf, len)?).into_owned();
            let address = Address::parse(&text).map_err(Error::AddressError)?;
            addresses.push(address);
        }

        let (key, signature) = if buf.has_remaining() {
            let key_type = checked_get_u8(&mut buf)?;
            let key_len = checked_get_u16(&mut buf)? as usize;
            let key_bytes = checked_copy_to_bytes(&mut buf, key_len)?.to_vec();
            let key = PublicKey::from_bytes(key_type, &key_bytes)?;
            let signature = buf.copy_to_bytes(buf.remaining()).to_vec();
            (Some(key), if signature.is_empty() { None } else { Some(signature) })
        } else {
            (None, None)
        };

        Ok(Self {
            peer,
            realm_id,
            sequence,
            timestamp_ns,
            addresses,
            key,
            signature,
        })
    }
}

fn encode_signed_prefix(
    peer: &PeerId,
    realm_id: &str,
    sequence: u64,
    timestamp_ns: u64,
    addresses: &[Address],
) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(peer.as_bytes());

    let realm_bytes = realm_id.as_bytes();
    buf.put_u16(realm_bytes.len() as u16);
    buf.put_slice(realm_bytes);

    buf.put_u64(sequence);
    buf.put_u64(timestamp_ns);

    buf.put_u16(addresses.len() as u16);
    for address in addresses {
        let bytes = address.string().into_bytes();
        buf.put_u16(bytes.len() as u16);
        buf.put_slice(&bytes);
    }

    buf
}

/// Bounds-checked `bytes::Buf` reads: the library's `get_*`/`copy_to_bytes`
/// panic on a short buffer, which a message straight off the wire can always
/// trigger, so every read here is guarded by a `remaining()` check first.
fn checked_get_u8(buf: &mut &[u8]) -> crate::Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::ProtocolNegotiation);
    }
    Ok(buf.get_u8())
}

fn checked_get_u16(buf: &mut &[u8]) -> crate::Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::ProtocolNegotiation);
    }
    Ok(buf.get_u16())
}

fn checked_get_u64(buf: &mut &[u8]) -> crate::Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::ProtocolNegotiation);
    }
    Ok(buf.get_u64())
}

fn checked_copy_to_bytes(buf: &mut &[u8], n: usize) -> crate::Result<Bytes> {
    if buf.remaining() < n {
        return Err(Error::ProtocolNegotiation);
    }
    Ok(buf.copy_to_bytes(n))
}

#[derive(Debug, Clone)]
pub struct QueryReq {
    pub peer: PeerId,
}

impl QueryReq {
    pub fn encode(&self) -> Vec<u8> {
        self.peer.as_bytes().to_vec()
    }

    pub fn decode(body: &[u8]) -> crate::Result<Self> {
        let mut buf: &[u8] = body;
        let peer_bytes = checked_copy_to_bytes(&mut buf, 32)?;
        let peer = PeerId::from(<[u8; 32]>::try_from(peer_bytes.as_ref()).map_err(|_| Error::ProtocolNegotiation)?);
        Ok(Self { peer })
    }
}

#[derive(Debug, Clone)]
pub struct QueryResp {
    pub record: Option<(PeerId, u64, Vec<Address>)>,
}

impl QueryResp {
    pub fn encode(&self) -> Vec<u8> {
        let Some((peer, sequence, addresses)) = &self.record else {
            return Vec::new();
        };

        let mut buf = BytesMut::new();
        buf.put_slice(peer.as_bytes());
        buf.put_u64(*sequence);
        buf.put_u16(addresses.len() as u16);
        for address in addresses {
            let bytes = address.string().into_bytes();
            buf.put_u16(bytes.len() as u16);
            buf.put_slice(&bytes);
        }
        buf.to_vec()
    }

    pub fn decode(body: &[u8]) -> crate::Result<Self> {
        if body.is_empty() {
            return Ok(Self { record: None });
        }

        let mut buf: &[u8] = body;
        let peer_bytes = checked_copy_to_bytes(&mut buf, 32)?;
        let peer = PeerId::from(<[u8; 32]>::try_from(peer_bytes.as_ref()).map_err(|_| Error::ProtocolNegotiation)?);
        let sequence = checked_get_u64(&mut buf)?;
        let count = checked_get_u16(&mut buf)? as usize;

        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            let len = checked_get_u16(&mut buf)? as usize;
            let text = String::from_utf8_lossy(&checked_copy_to_bytes(&mut buf, len)?).into_owned();
            addresses.push(Address::parse(&text).map_err(Error::AddressError)?);
        }

        Ok(Self { record: Some((peer, sequence, addresses)) })
    }
}

/// Frame codec for the `addr-mgmt` stream: a 1-byte type tag, a 4-byte
/// big-endian body length capped at [`MAX_BODY_LEN`], then the body.
#[derive(Debug)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = (MessageType, Bytes);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 5 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if len > MAX_BODY_LEN {
            return Err(Error::ProtocolNegotiation);
        }

        let frame_len = 5 + len as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let message_type = MessageType::from_tag(src[0])?;
        src.advance(5);
        let body = src.split_to(len as usize).freeze();
        Ok(Some((message_type, body)))
    }
}

impl Encoder<(MessageType, Bytes)> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, (message_type, body): (MessageType, Bytes), dst: &mut BytesMut) -> Result<(), Self::Error> {
        if body.len() as u32 > MAX_BODY_LEN {
            return Err(Error::ProtocolNegotiation);
        }

        dst.reserve(5 + body.len());
        dst.put_u8(message_type.tag());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

/// Read one framed message off `framed`. A length over [`MAX_BODY_LEN`] is a
/// protocol violation; the caller should reset the stream rather than keep
/// reading.
pub async fn read_message<S>(framed: &mut Framed<S, MessageCodec>) -> crate::Result<(MessageType, Vec<u8>)>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(Ok((message_type, body))) => Ok((message_type, body.to_vec())),
        Some(Err(err)) => Err(err),
        None => Err(Error::ConnectionClosed),
    }
}

/// Write one framed message to `framed`.
pub async fn write_message<S>(framed: &mut Framed<S, MessageCodec>, message_type: MessageType, body: &[u8]) -> crate::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    if body.len() as u32 > MAX_BODY_LEN {
        return Err(Error::ProtocolNegotiation);
    }

    framed.send((message_type, Bytes::copy_from_slice(body))).await
}

/// Cached records this node has accepted for other peers, serving
/// `query_req` from memory only (no recursive lookup).
#[derive(Default)]
pub struct RecordCache {
    records: HashMap<PeerId, (u64, Vec<Address>, std::time::Instant, Duration)>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self, peer: &PeerId) -> QueryResp {
        match self.records.get(peer) {
            Some((sequence, addrs, _, _)) => QueryResp {
                record: Some((*peer, *sequence, addrs.clone())),
            },
            None => QueryResp { record: None },
        }
    }

    fn insert(&mut self, peer: PeerId, sequence: u64, addrs: Vec<Address>, ttl: Duration) {
        self.records.insert(peer, (sequence, addrs, std::time::Instant::now(), ttl));
    }

    /// Evict cached records whose TTL has elapsed. Intended to run on
    /// `CleanupInterval`.
    pub fn evict_stale(&mut self) {
        let now = std::time::Instant::now();
        self.records.retain(|_, (_, _, inserted_at, ttl)| now.saturating_duration_since(*inserted_at) <= *ttl);
    }
}

/// Handles incoming `refresh_notify` / `query_req` messages, applying the
/// signature-verification and sequence-advance rules and feeding accepted
/// addresses into the shared address book.
pub struct AddrMgmtHandler {
    book: Arc<AddressBook>,
    cache: parking_lot::Mutex<RecordCache>,
    require_signature: bool,
}

impl AddrMgmtHandler {
    pub fn new(book: Arc<AddressBook>, require_signature: bool) -> Self {
        Self {
            book,
            cache: parking_lot::Mutex::new(RecordCache::new()),
            require_signature,
        }
    }

    /// Dispatch one decoded, framed message. Rejections are silent at the
    /// wire layer; callers only see a log line, never a propagated error,
    /// matching the "drop and log" handler rule.
    pub fn handle(&self, message_type: MessageType, body: &[u8]) -> Option<Vec<u8>> {
        match message_type {
            MessageType::RefreshNotify => {
                if let Err(err) = self.handle_refresh_notify(body) {
                    tracing::warn!(target: LOG_TARGET, %err, "dropping refresh_notify");
                }
                None
            }
            MessageType::QueryReq => match QueryReq::decode(body) {
                Ok(req) => Some(self.cache.lock().query(&req.peer).encode()),
                Err(err) => {
                    tracing::warn!(target: LOG_TARGET, %err, "dropping malformed query_req");
                    None
                }
            },
            MessageType::QueryResp => {
                tracing::warn!(target: LOG_TARGET, "unexpected query_resp on handler side");
                None
            }
        }
    }

    fn handle_refresh_notify(&self, body: &[u8]) -> crate::Result<()> {
        let notify = RefreshNotify::decode(body)?;

        let key = match &notify.key {
            Some(key) => key,
            None if self.require_signature => return Err(Error::InvalidSignature),
            None => {
                self.accept(&notify);
                return Ok(());
            }
        };

        if node_id(key) != notify.peer {
            return Err(Error::IdentityMismatch { expected: notify.peer, remote: node_id(key) });
        }

        let signature = notify.signature.as_ref().ok_or(Error::InvalidSignature)?;
        if !key.verify(&notify.signed_prefix(), signature) {
            return Err(Error::InvalidSignature);
        }

        self.accept(&notify);
        Ok(())
    }

    fn accept(&self, notify: &RefreshNotify) {
        let mut cache = self.cache.lock();
        let prior_sequence = cache.records.get(&notify.peer).map(|(seq, ..)| *seq);

        if let Some(prior) = prior_sequence {
            if notify.sequence <= prior {
                tracing::debug!(target: LOG_TARGET, peer = %notify.peer, "stale sequence, dropping");
                return;
            }
        }

        let ttl = Duration::from_secs(300);
        cache.insert(notify.peer, notify.sequence, notify.addresses.clone(), ttl);
        drop(cache);

        self.book.add(notify.peer, notify.addresses.clone(), ttl, "addr_mgmt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{ed25519::Keypair, Identity};

    fn sample_addrs() -> Vec<Address> {
        vec![Address::parse("/ip4/203.0.113.9/udp/4009/quic-v1").unwrap()]
    }

    fn signed_notify(keypair: &Keypair, sequence: u64, addrs: Vec<Address>) -> RefreshNotify {
        let mut notify = RefreshNotify {
            peer: keypair.id(),
            realm_id: String::new(),
            sequence,
            timestamp_ns: sequence,
            addresses: addrs,
            key: Some(keypair.public_key()),
            signature: None,
        };
        let payload = notify.signed_prefix();
        notify.signature = Some(keypair.sign(&payload));
        notify
    }

    #[test]
    fn refresh_notify_round_trips_through_wire_encoding() {
        let keypair = Keypair::generate();
        let notify = signed_notify(&keypair, 1, sample_addrs());

        let encoded = notify.encode();
        let decoded = RefreshNotify::decode(&encoded).unwrap();

        assert_eq!(decoded.peer, notify.peer);
        assert_eq!(decoded.sequence, notify.sequence);
        assert_eq!(decoded.addresses, notify.addresses);
    }

    #[test]
    fn handler_accepts_valid_signed_notify() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book.clone(), true);

        let keypair = Keypair::generate();
        let notify = signed_notify(&keypair, 1, sample_addrs());
        handler.handle(MessageType::RefreshNotify, &notify.encode());

        assert_eq!(book.get(&keypair.id()), sample_addrs());
    }

    #[test]
    fn handler_rejects_replayed_lower_sequence() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book.clone(), true);
        let keypair = Keypair::generate();

        let newer_addr = Address::parse("/ip4/1.2.3.4/tcp/1").unwrap();
        let older_addr = Address::parse("/ip4/9.9.9.9/tcp/9").unwrap();

        handler.handle(MessageType::RefreshNotify, &signed_notify(&keypair, 5, vec![newer_addr.clone()]).encode());
        handler.handle(MessageType::RefreshNotify, &signed_notify(&keypair, 4, vec![older_addr]).encode());

        assert_eq!(book.get(&keypair.id()), vec![newer_addr]);
    }

    #[test]
    fn handler_requires_signature_in_production_posture() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book.clone(), true);
        let keypair = Keypair::generate();

        let mut notify = signed_notify(&keypair, 1, sample_addrs());
        notify.key = None;
        notify.signature = None;

        handler.handle(MessageType::RefreshNotify, &notify.encode());
        assert!(book.get(&keypair.id()).is_empty());
    }

    #[test]
    fn handler_accepts_unsigned_in_debug_posture() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book.clone(), false);
        let keypair = Keypair::generate();

        let mut notify = signed_notify(&keypair, 1, sample_addrs());
        notify.key = None;
        notify.signature = None;

        handler.handle(MessageType::RefreshNotify, &notify.encode());
        assert_eq!(book.get(&keypair.id()), sample_addrs());
    }

    #[test]
    fn query_req_resp_round_trip() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book, true);
        let keypair = Keypair::generate();

        handler.handle(MessageType::RefreshNotify, &signed_notify(&keypair, 1, sample_addrs()).encode());

        let req = QueryReq { peer: keypair.id() };
        let resp_bytes = handler.handle(MessageType::QueryReq, &req.encode()).unwrap();
        let resp = QueryResp::decode(&resp_bytes).unwrap();

        let (peer, sequence, addrs) = resp.record.unwrap();
        assert_eq!(peer, keypair.id());
        assert_eq!(sequence, 1);
        assert_eq!(addrs, sample_addrs());
    }

    #[test]
    fn query_req_for_unknown_peer_returns_empty() {
        let book = Arc::new(AddressBook::new(PeerId::random()));
        let handler = AddrMgmtHandler::new(book, true);

        let req = QueryReq { peer: PeerId::random() };
        let resp_bytes = handler.handle(MessageType::QueryReq, &req.encode()).unwrap();
        assert!(QueryResp::decode(&resp_bytes).unwrap().record.is_none());
    }

    #[tokio::test]
    async fn framed_message_round_trips_over_a_stream() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MessageCodec);
        let mut server = Framed::new(server, MessageCodec);

        let body = QueryReq { peer: PeerId::random() }.encode();
        write_message(&mut client, MessageType::QueryReq, &body).await.unwrap();

        let (message_type, read_body) = read_message(&mut server).await.unwrap();
        assert_eq!(message_type, MessageType::QueryReq);
        assert_eq!(read_body, body);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_reading() {
        let (client, server) = tokio::io::duplex(4096);
        let mut server = Framed::new(server, MessageCodec);

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut client = client;
            let _ = client.write_all(&[MessageType::QueryReq.tag()]).await;
            let _ = client.write_all(&(MAX_BODY_LEN + 1).to_be_bytes()).await;
        });

        assert!(matches!(read_message(&mut server).await, Err(Error::ProtocolNegotiation)));
    }

    #[test]
    fn message_type_tags_round_trip() {
        for ty in [MessageType::RefreshNotify, MessageType::QueryReq, MessageType::QueryResp] {
            assert_eq!(MessageType::from_tag(ty.tag()).unwrap(), ty);
        }
    }
}
