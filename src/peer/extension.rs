//! Extension protocol handshake (BEP-10).
//!
//! Only the fields this crate consumes are modeled: the `m` extension map
//! (to learn whether the remote speaks `ut_pex`), the client string, the
//! remote's request-queue depth, and `yourip`: the remote's view of our
//! external address, used to filter self-advertisements out of PEX.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use thiserror::Error;

use crate::bencode::{decode, encode, BencodeError, Value};

/// Extension name for Peer Exchange (BEP-11).
pub const UT_PEX: &str = "ut_pex";

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// Payload decoded but is not the expected shape.
    #[error("malformed extension payload")]
    Malformed,
}

/// The extended handshake dictionary.
#[derive(Debug, Clone, Default)]
pub struct ExtensionHandshake {
    /// Extension name to message id, from the `m` dict. An id of zero
    /// means the extension was disabled and is not recorded.
    pub extensions: BTreeMap<String, u8>,
    /// Remote client name/version.
    pub client: Option<String>,
    /// Our external IP as the remote sees it.
    pub yourip: Option<IpAddr>,
    /// How many outstanding requests the remote will queue for us.
    pub reqq: Option<i64>,
}

impl ExtensionHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    pub fn encode(&self) -> Bytes {
        let mut m = BTreeMap::new();
        for (name, id) in &self.extensions {
            m.insert(
                Bytes::copy_from_slice(name.as_bytes()),
                Value::Integer(i64::from(*id)),
            );
        }

        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"m"), Value::Dict(m));
        if let Some(ref client) = self.client {
            dict.insert(Bytes::from_static(b"v"), Value::string(client));
        }
        if let Some(ip) = self.yourip {
            let raw = match ip {
                IpAddr::V4(v4) => Bytes::copy_from_slice(&v4.octets()),
                IpAddr::V6(v6) => Bytes::copy_from_slice(&v6.octets()),
            };
            dict.insert(Bytes::from_static(b"yourip"), Value::Bytes(raw));
        }
        if let Some(reqq) = self.reqq {
            dict.insert(Bytes::from_static(b"reqq"), Value::Integer(reqq));
        }

        encode(&Value::Dict(dict))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ExtensionError> {
        let value = decode(payload)?;
        let dict = value.as_dict().ok_or(ExtensionError::Malformed)?;

        let mut handshake = Self::new();

        if let Some(m) = dict.get(b"m".as_slice()).and_then(Value::as_dict) {
            for (key, val) in m {
                let name = std::str::from_utf8(key).ok();
                let id = val.as_integer();
                if let (Some(name), Some(id)) = (name, id) {
                    if (1..=255).contains(&id) {
                        handshake.extensions.insert(name.to_string(), id as u8);
                    }
                }
            }
        }

        handshake.client = dict
            .get(b"v".as_slice())
            .and_then(Value::as_str)
            .map(String::from);
        handshake.yourip = dict
            .get(b"yourip".as_slice())
            .and_then(Value::as_bytes)
            .and_then(|raw| parse_yourip(raw));
        handshake.reqq = dict.get(b"reqq".as_slice()).and_then(Value::as_integer);

        Ok(handshake)
    }
}

/// `yourip` is a raw 4-byte IPv4 or 16-byte IPv6 address; anything else is
/// ignored.
fn parse_yourip(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
