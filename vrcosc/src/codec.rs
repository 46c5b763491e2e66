//! vrcosc/src/codec.rs
//!
//! OSC 1.0 wire codec, restricted to the argument types VRChat speaks.
//!
//! A message is laid out as:
//!
//! ```text
//! [address\0 pad4] [,tags\0 pad4] [payload for each tag, in tag order]
//! ```
//!
//! `i` and `f` carry 4 big-endian bytes, `s` is a NUL-terminated UTF-8 string
//! padded to a 4-byte boundary, and `T`/`F` carry no payload at all.
//! Bundles (`#bundle\0`, an 8-byte time tag, then size-prefixed elements) are
//! understood so that VRChat's batched output can be unpacked; their time tags
//! are carried but never scheduled.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::message::OscMessage;
use crate::value::OscValue;

/// Longest address accepted on either side of the wire, excluding its terminator.
pub const MAX_ADDRESS_LEN: usize = 1024;

/// Bundles nested deeper than this are rejected rather than recursed into.
pub const MAX_BUNDLE_DEPTH: usize = 8;

/// The OSC time tag meaning "immediately".
pub const TIME_TAG_IMMEDIATE: u64 = 1;

const BUNDLE_MAGIC: &[u8; 8] = b"#bundle\0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("string is not NUL-terminated within the packet")]
    UnterminatedString,

    #[error("address exceeds {MAX_ADDRESS_LEN} bytes")]
    AddressTooLong,

    #[error("invalid OSC address '{0}'")]
    InvalidAddress(String),

    #[error("type tag string is missing or does not start with ','")]
    MissingTypeTags,

    #[error("unsupported type tag '{0}'")]
    UnknownTypeTag(char),

    #[error("truncated payload: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{0} unexpected bytes after the last argument")]
    TrailingBytes(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("string contains an embedded NUL byte")]
    EmbeddedNul,

    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("bundles nested deeper than {MAX_BUNDLE_DEPTH} levels")]
    BundleTooDeep,
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle { time_tag: u64, content: Vec<OscPacket> },
}

impl OscPacket {
    /// Flattens the packet into its messages, in wire order.
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(self, out: &mut Vec<OscMessage>) {
        match self {
            OscPacket::Message(msg) => out.push(msg),
            OscPacket::Bundle { content, .. } => {
                for inner in content {
                    inner.collect_into(out);
                }
            }
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> Self {
        OscPacket::Message(msg)
    }
}

/// Size of a string on the wire: its bytes, the terminator, then padding to 4.
pub fn padded_string_len(len: usize) -> usize {
    (len + 1 + 3) & !3
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Big-endian OSC writer, the encoding half of the codec.
struct OscWriter {
    buf: Vec<u8>,
}

impl OscWriter {
    fn new() -> Self {
        Self { buf: Vec::with_capacity(64) }
    }

    fn write_i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        BigEndian::write_i32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn write_f32(&mut self, v: f32) {
        let mut b = [0u8; 4];
        BigEndian::write_f32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn write_u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        BigEndian::write_u64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn write_string(&mut self, s: &str) -> Result<(), FormatError> {
        if s.as_bytes().contains(&0) {
            return Err(FormatError::EmbeddedNul);
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.resize(start + padded_string_len(s.len()), 0);
        Ok(())
    }

    fn write_message(&mut self, msg: &OscMessage) -> Result<(), FormatError> {
        validate_address(msg.address())?;
        self.write_string(msg.address())?;

        let mut tags = String::with_capacity(msg.len() + 1);
        tags.push(',');
        tags.extend(msg.arguments().iter().map(OscValue::type_tag));
        self.write_string(&tags)?;

        for arg in msg.arguments() {
            match arg {
                OscValue::Int(v) => self.write_i32(*v),
                OscValue::Float(v) => self.write_f32(*v),
                OscValue::String(s) => self.write_string(s)?,
                OscValue::Bool(_) => {}
            }
        }
        Ok(())
    }

    fn write_packet(&mut self, packet: &OscPacket, depth: usize) -> Result<(), FormatError> {
        match packet {
            OscPacket::Message(msg) => self.write_message(msg),
            OscPacket::Bundle { time_tag, content } => {
                if depth >= MAX_BUNDLE_DEPTH {
                    return Err(FormatError::BundleTooDeep);
                }
                self.buf.extend_from_slice(BUNDLE_MAGIC);
                self.write_u64(*time_tag);
                for element in content {
                    let mut inner = OscWriter::new();
                    inner.write_packet(element, depth + 1)?;
                    let size = i32::try_from(inner.buf.len()).map_err(|_| {
                        FormatError::MalformedBundle("element larger than i32::MAX".into())
                    })?;
                    self.write_i32(size);
                    self.buf.extend_from_slice(&inner.buf);
                }
                Ok(())
            }
        }
    }
}

/// Encodes a single message into one datagram payload.
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>, FormatError> {
    let mut writer = OscWriter::new();
    writer.write_message(msg)?;
    Ok(writer.buf)
}

/// Encodes a message or bundle into one datagram payload.
pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>, FormatError> {
    let mut writer = OscWriter::new();
    writer.write_packet(packet, 0)?;
    Ok(writer.buf)
}

pub(crate) fn validate_address(address: &str) -> Result<(), FormatError> {
    if address.len() > MAX_ADDRESS_LEN {
        return Err(FormatError::AddressTooLong);
    }
    if !address.starts_with('/') {
        return Err(FormatError::InvalidAddress(address.to_string()));
    }
    if address.as_bytes().contains(&0) {
        return Err(FormatError::EmbeddedNul);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Big-endian OSC reader over one datagram, the decoding half of the codec.
struct OscReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OscReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], FormatError> {
        let available = self.remaining();
        if needed > available {
            return Err(FormatError::Truncated { needed, available });
        }
        let out = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    fn read_u64(&mut self) -> Result<u64, FormatError> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    /// Reads a padded string whose terminator must appear within `limit` bytes.
    fn read_string(&mut self, limit: Option<usize>) -> Result<String, FormatError> {
        let rest = &self.data[self.pos..];
        let window = match limit {
            Some(max) => &rest[..rest.len().min(max + 1)],
            None => rest,
        };
        let len = match window.iter().position(|b| *b == 0) {
            Some(len) => len,
            None if limit.is_some_and(|max| rest.len() > max) => {
                return Err(FormatError::AddressTooLong);
            }
            None => return Err(FormatError::UnterminatedString),
        };
        let raw = self.take(padded_string_len(len))?;
        std::str::from_utf8(&raw[..len])
            .map(str::to_owned)
            .map_err(|_| FormatError::InvalidUtf8)
    }

    fn read_message(&mut self) -> Result<OscMessage, FormatError> {
        let address = self.read_string(Some(MAX_ADDRESS_LEN))?;
        if !address.starts_with('/') {
            return Err(FormatError::InvalidAddress(address));
        }

        if self.remaining() == 0 {
            return Err(FormatError::MissingTypeTags);
        }
        let tags = self.read_string(None)?;
        let Some(tags) = tags.strip_prefix(',') else {
            return Err(FormatError::MissingTypeTags);
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let value = match tag {
                'i' => OscValue::Int(self.read_i32()?),
                'f' => OscValue::Float(self.read_f32()?),
                's' => OscValue::String(self.read_string(None)?),
                'T' => OscValue::Bool(true),
                'F' => OscValue::Bool(false),
                other => return Err(FormatError::UnknownTypeTag(other)),
            };
            args.push(value);
        }

        if self.remaining() != 0 {
            return Err(FormatError::TrailingBytes(self.remaining()));
        }
        Ok(OscMessage::from_wire(address, args))
    }

    fn read_bundle(&mut self, depth: usize) -> Result<OscPacket, FormatError> {
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(FormatError::BundleTooDeep);
        }
        self.take(BUNDLE_MAGIC.len())?;
        let time_tag = self.read_u64()?;

        let mut content = Vec::new();
        while self.remaining() > 0 {
            let size = self.read_i32()?;
            if size <= 0 || size % 4 != 0 {
                return Err(FormatError::MalformedBundle(format!("invalid element size {size}")));
            }
            let element = self.take(size as usize)?;
            content.push(decode_at_depth(element, depth + 1)?);
        }
        Ok(OscPacket::Bundle { time_tag, content })
    }
}

fn decode_at_depth(data: &[u8], depth: usize) -> Result<OscPacket, FormatError> {
    let mut reader = OscReader::new(data);
    if data.starts_with(BUNDLE_MAGIC) {
        reader.read_bundle(depth)
    } else {
        reader.read_message().map(OscPacket::Message)
    }
}

/// Decodes one datagram, which may be a message or a bundle.
///
/// Any malformation rejects the whole datagram: nothing is partially decoded.
pub fn decode_packet(data: &[u8]) -> Result<OscPacket, FormatError> {
    decode_at_depth(data, 0)
}

/// Decodes one datagram that must be a single message.
pub fn decode_message(data: &[u8]) -> Result<OscMessage, FormatError> {
    OscReader::new(data).read_message()
}
