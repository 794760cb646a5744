//! Peer Exchange (BEP-11).
//!
//! Every PEX round the coordinator diffs the currently connected addresses
//! against the previously announced set and gossips the delta as a
//! `ut_pex` extension message. Addresses travel in compact form: 6 bytes
//! per IPv4 peer, 18 per IPv6, port big-endian, under the `added`/
//! `dropped` keys (`added6`/`dropped6` for IPv6).

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::bencode::{decode, encode, Value};
use crate::peer::ExtensionError;

/// Address delta between two PEX rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PexMessage {
    pub added: Vec<SocketAddr>,
    pub added6: Vec<SocketAddr>,
    pub dropped: Vec<SocketAddr>,
    pub dropped6: Vec<SocketAddr>,
}

impl PexMessage {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.added6.is_empty()
            && self.dropped.is_empty()
            && self.dropped6.is_empty()
    }

    /// All addresses announced as added, both families.
    pub fn added_addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.added.iter().chain(self.added6.iter()).copied()
    }

    /// Encodes the delta as a bencoded `ut_pex` payload.
    pub fn to_payload(&self) -> Bytes {
        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"added"), compact_v4(&self.added));
        dict.insert(Bytes::from_static(b"added6"), compact_v6(&self.added6));
        dict.insert(Bytes::from_static(b"dropped"), compact_v4(&self.dropped));
        dict.insert(Bytes::from_static(b"dropped6"), compact_v6(&self.dropped6));
        encode(&Value::Dict(dict))
    }

    /// Parses a received `ut_pex` payload. Missing keys are treated as
    /// empty lists; truncated trailing records are ignored.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ExtensionError> {
        let value = decode(payload)?;
        if value.as_dict().is_none() {
            return Err(ExtensionError::Malformed);
        }

        let list_v4 = |key: &[u8]| {
            value
                .get(key)
                .and_then(Value::as_bytes)
                .map(|raw| parse_compact_v4(raw))
                .unwrap_or_default()
        };
        let list_v6 = |key: &[u8]| {
            value
                .get(key)
                .and_then(Value::as_bytes)
                .map(|raw| parse_compact_v6(raw))
                .unwrap_or_default()
        };

        Ok(Self {
            added: list_v4(b"added"),
            added6: list_v6(b"added6"),
            dropped: list_v4(b"dropped"),
            dropped6: list_v6(b"dropped6"),
        })
    }
}

fn compact_v4(addrs: &[SocketAddr]) -> Value {
    let mut buf = BytesMut::with_capacity(addrs.len() * 6);
    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            buf.put_slice(&v4.ip().octets());
            buf.put_u16(v4.port());
        }
    }
    Value::Bytes(buf.freeze())
}

fn compact_v6(addrs: &[SocketAddr]) -> Value {
    let mut buf = BytesMut::with_capacity(addrs.len() * 18);
    for addr in addrs {
        if let SocketAddr::V6(v6) = addr {
            buf.put_slice(&v6.ip().octets());
            buf.put_u16(v6.port());
        }
    }
    Value::Bytes(buf.freeze())
}

fn parse_compact_v4(raw: &[u8]) -> Vec<SocketAddr> {
    raw.chunks_exact(6)
        .map(|rec| {
            let ip = Ipv4Addr::new(rec[0], rec[1], rec[2], rec[3]);
            let port = u16::from_be_bytes([rec[4], rec[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}

fn parse_compact_v6(raw: &[u8]) -> Vec<SocketAddr> {
    raw.chunks_exact(18)
        .map(|rec| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&rec[..16]);
            let port = u16::from_be_bytes([rec[16], rec[17]]);
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port)
        })
        .collect()
}

/// Tracks what the last PEX round announced.
///
/// After every [`PexState::diff`], `last_announced` equals the connected
/// set that was passed in, whether or not a message was produced.
#[derive(Debug, Default)]
pub struct PexState {
    last_announced: HashSet<SocketAddr>,
}

impl PexState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the delta against the previous round and records `current`
    /// as announced. Returns `None` when nothing changed.
    pub fn diff(&mut self, current: &HashSet<SocketAddr>) -> Option<PexMessage> {
        let mut message = PexMessage::default();
        for addr in current.difference(&self.last_announced) {
            match addr {
                SocketAddr::V4(_) => message.added.push(*addr),
                SocketAddr::V6(_) => message.added6.push(*addr),
            }
        }
        for addr in self.last_announced.difference(current) {
            match addr {
                SocketAddr::V4(_) => message.dropped.push(*addr),
                SocketAddr::V6(_) => message.dropped6.push(*addr),
            }
        }

        self.last_announced = current.clone();

        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }

    pub fn last_announced(&self) -> &HashSet<SocketAddr> {
        &self.last_announced
    }
}
