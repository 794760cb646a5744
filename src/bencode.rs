//! Bencode encoding/decoding (BEP-3).
//!
//! Only the extension protocol needs bencode here, so this is a compact
//! value model rather than a full serde integration: integers, byte
//! strings, lists, and dictionaries with canonical (sorted) key order.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

const MAX_DEPTH: usize = 32;

/// Errors produced while decoding bencode data.
#[derive(Debug, Error)]
pub enum BencodeError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the top-level value.
    #[error("trailing data after value")]
    TrailingData,

    /// Malformed integer (empty, leading zeros, or not a number).
    #[error("invalid integer")]
    InvalidInteger,

    /// Malformed byte-string length prefix.
    #[error("invalid string length")]
    InvalidLength,

    /// A byte that cannot start a bencode value.
    #[error("unexpected byte {0:#04x}")]
    UnexpectedByte(u8),

    /// Nesting deeper than the decoder allows.
    #[error("nesting too deep")]
    NestingTooDeep,
}

/// A bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// Creates a byte-string value from a UTF-8 string.
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` when this is not a dict or the key is absent.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }
}

/// Encodes a value into its bencode byte representation.
pub fn encode(value: &Value) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.freeze()
}

fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::Bytes(b) => {
            buf.put_slice(b.len().to_string().as_bytes());
            buf.put_u8(b':');
            buf.put_slice(b);
        }
        Value::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        Value::Dict(entries) => {
            buf.put_u8(b'd');
            for (key, val) in entries {
                buf.put_slice(key.len().to_string().as_bytes());
                buf.put_u8(b':');
                buf.put_slice(key);
                encode_into(val, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

/// Decodes exactly one bencode value from `data`.
///
/// # Errors
///
/// Fails on truncated input, syntax errors, nesting beyond 32 levels, or
/// bytes left over after the value.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.value(0)?;
    if parser.pos != data.len() {
        return Err(BencodeError::TrailingData);
    }
    Ok(value)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof)
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep);
        }
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            other => Err(BencodeError::UnexpectedByte(other)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.pos += 1;
        let digits = self.take_until(b'e')?;
        let s = std::str::from_utf8(digits).map_err(|_| BencodeError::InvalidInteger)?;
        if s.is_empty() || s == "-" || s.starts_with("-0") || (s.len() > 1 && s.starts_with('0')) {
            return Err(BencodeError::InvalidInteger);
        }
        let n = s.parse().map_err(|_| BencodeError::InvalidInteger)?;
        Ok(Value::Integer(n))
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let digits = self.take_until(b':')?;
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidLength)?;
        if self.pos + len > self.data.len() {
            return Err(BencodeError::UnexpectedEof);
        }
        let bytes = Bytes::copy_from_slice(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.pos += 1;
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut entries = BTreeMap::new();
        while self.peek()? != b'e' {
            match self.peek()? {
                b'0'..=b'9' => {}
                other => return Err(BencodeError::UnexpectedByte(other)),
            }
            let key = self.byte_string()?;
            let val = self.value(depth + 1)?;
            entries.insert(key, val);
        }
        self.pos += 1;
        Ok(Value::Dict(entries))
    }

    /// Consumes bytes up to (and past) the terminator, returning the span.
    fn take_until(&mut self, terminator: u8) -> Result<&[u8], BencodeError> {
        let start = self.pos;
        while self.peek()? != terminator {
            self.pos += 1;
        }
        let span = &self.data[start..self.pos];
        self.pos += 1;
        Ok(span)
    }
}
