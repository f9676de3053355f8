use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::flags::Flags;

/// Envelope: length (4) + family (2) + flags (2) + sequence (4) +
/// source endpoint (4) + command (1) + reserved (1) + version (2) = 20 bytes.
pub const HEADER_SIZE: usize = 20;

/// Attribute header: length (2) + key (2) = 4 bytes.
pub const ATTR_HEADER_SIZE: usize = 4;

/// Attributes start on 4-byte boundaries.
pub const ATTR_ALIGN: usize = 4;

/// Default maximum message size: 64 KiB.
pub const DEFAULT_MAX_MESSAGE: usize = 64 * 1024;

const fn align(len: usize) -> usize {
    (len + ATTR_ALIGN - 1) & !(ATTR_ALIGN - 1)
}

/// One attribute as it appears on the wire: a key and uninterpreted bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub key: u16,
    pub value: Bytes,
}

impl RawAttribute {
    /// Create a new attribute.
    pub fn new(key: u16, value: impl Into<Bytes>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Encoded size including header and padding.
    pub fn wire_size(&self) -> usize {
        align(ATTR_HEADER_SIZE + self.value.len())
    }
}

/// A message envelope with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Runtime-assigned id of the family this message belongs to.
    pub family_id: u16,
    /// Command within the family. `0` is reserved.
    pub command: u8,
    /// Family version of the sender.
    pub version: u16,
    /// Correlates replies with the request that triggered them.
    pub sequence: u32,
    /// Port id of the sending endpoint.
    pub source_endpoint: u32,
    pub flags: Flags,
    /// Attributes in wire order.
    pub attributes: Vec<RawAttribute>,
}

impl Message {
    /// Create an empty message with reply flags and zeroed correlation fields.
    pub fn new(family_id: u16, command: u8) -> Self {
        Self {
            family_id,
            command,
            version: 0,
            sequence: 0,
            source_endpoint: 0,
            flags: Flags::reply(),
            attributes: Vec::new(),
        }
    }

    /// The end-of-stream marker answering `request`.
    pub fn done_for(request: &Message) -> Self {
        Self {
            family_id: request.family_id,
            command: request.command,
            version: request.version,
            sequence: request.sequence,
            source_endpoint: 0,
            flags: Flags::done(),
            attributes: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_source(mut self, source_endpoint: u32) -> Self {
        self.source_endpoint = source_endpoint;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Append an attribute.
    pub fn push_attribute(&mut self, attribute: RawAttribute) {
        self.attributes.push(attribute);
    }

    /// First attribute with `key`, if any.
    pub fn attribute(&self, key: u16) -> Option<&RawAttribute> {
        self.attributes.iter().find(|attr| attr.key == key)
    }

    /// Whether this is an end-of-stream marker.
    pub fn is_done(&self) -> bool {
        self.flags.done
    }

    /// The total wire size of this message.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE
            + self
                .attributes
                .iter()
                .map(RawAttribute::wire_size)
                .sum::<usize>()
    }
}

/// Encode a message into the wire format.
///
/// Wire format (little-endian):
/// ```text
/// ┌──────────┬──────────┬─────────┬──────────┬──────────┬─────┬──────┬─────────┬────────────┐
/// │ Len (4B) │ Fam (2B) │ Flg(2B) │ Seq (4B) │ Port(4B) │ Cmd │ Rsvd │ Ver(2B) │ Attributes │
/// └──────────┴──────────┴─────────┴──────────┴──────────┴─────┴──────┴─────────┴────────────┘
///
/// Attribute:
/// ┌──────────┬──────────┬───────────┬─────────────────┐
/// │ Len (2B) │ Key (2B) │ Value     │ Pad to 4 bytes  │
/// └──────────┴──────────┴───────────┴─────────────────┘
/// ```
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    if msg.command == 0 {
        return Err(FrameError::UnspecifiedCommand);
    }
    if msg.flags.done && !msg.attributes.is_empty() {
        return Err(FrameError::DoneWithAttributes);
    }
    if let Some(attr) = msg
        .attributes
        .iter()
        .find(|attr| ATTR_HEADER_SIZE + attr.value.len() > u16::MAX as usize)
    {
        return Err(FrameError::AttributeTooLarge {
            key: attr.key,
            size: attr.value.len(),
        });
    }

    let total = msg.wire_size();
    if total > u32::MAX as usize {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(total);
    dst.put_u32_le(total as u32);
    dst.put_u16_le(msg.family_id);
    dst.put_u16_le(msg.flags.bits());
    dst.put_u32_le(msg.sequence);
    dst.put_u32_le(msg.source_endpoint);
    dst.put_u8(msg.command);
    dst.put_u8(0);
    dst.put_u16_le(msg.version);

    for attr in &msg.attributes {
        let len = ATTR_HEADER_SIZE + attr.value.len();
        dst.put_u16_le(len as u16);
        dst.put_u16_le(attr.key);
        dst.put_slice(&attr.value);
        dst.put_bytes(0, align(len) - len);
    }

    Ok(())
}

/// Decode one message from a complete datagram.
///
/// Attribute values are zero-copy slices of a single owned buffer.
pub fn decode_message(src: &[u8]) -> Result<Message> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: src.len(),
        });
    }

    let mut header = &src[..HEADER_SIZE];
    let declared = header.get_u32_le() as usize;
    if declared != src.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: src.len(),
        });
    }

    let family_id = header.get_u16_le();
    let flag_bits = header.get_u16_le();
    let flags = Flags::from_bits(flag_bits).ok_or(FrameError::UnknownFlags(flag_bits))?;
    let sequence = header.get_u32_le();
    let source_endpoint = header.get_u32_le();
    let command = header.get_u8();
    let _reserved = header.get_u8();
    let version = header.get_u16_le();

    let data = Bytes::copy_from_slice(src);
    let mut attributes = Vec::new();
    let mut offset = HEADER_SIZE;

    while offset < src.len() {
        let remaining = src.len() - offset;
        if remaining < ATTR_HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: ATTR_HEADER_SIZE,
                available: remaining,
            });
        }

        let mut attr_header = &src[offset..offset + ATTR_HEADER_SIZE];
        let len = attr_header.get_u16_le() as usize;
        let key = attr_header.get_u16_le();
        if len < ATTR_HEADER_SIZE || len > remaining {
            return Err(FrameError::InvalidAttributeLength {
                key,
                len,
                remaining,
            });
        }

        attributes.push(RawAttribute {
            key,
            value: data.slice(offset + ATTR_HEADER_SIZE..offset + len),
        });
        // The final attribute may omit its padding.
        offset += align(len).min(remaining);
    }

    if flags.done && !attributes.is_empty() {
        return Err(FrameError::DoneWithAttributes);
    }

    Ok(Message {
        family_id,
        command,
        version,
        sequence,
        source_endpoint,
        flags,
        attributes,
    })
}

/// Configuration for message I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes. Default: 64 KiB.
    pub max_message_size: usize,
    /// Receive timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Send timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
