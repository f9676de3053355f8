//! Attribute codec: typed values to and from raw TLV payloads, checked
//! against the owning family's policy table.

use bytes::{BufMut, Bytes, BytesMut};
use famlink_frame::RawAttribute;
use tracing::trace;

use crate::error::{Result, SchemaError};
use crate::policy::{AttributeKind, AttributePolicy, PolicyTable};

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Text without its terminator.
    String(String),
    Binary(Bytes),
}

impl AttrValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::String(_) => AttributeKind::String,
            Self::Binary(_) => AttributeKind::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            Self::String(_) => None,
        }
    }

    /// Length on the wire, including the string terminator.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(text) => text.len() + 1,
            Self::Binary(bytes) => bytes.len(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for AttrValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(text) => f.write_str(text),
            Self::Binary(bytes) => {
                for byte in bytes.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered attribute set of one message.
///
/// Lookups return the first occurrence of a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(u16, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style push.
    pub fn with(mut self, key: impl Into<u16>, value: impl Into<AttrValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<u16>, value: impl Into<AttrValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: impl Into<u16>) -> Option<&AttrValue> {
        let key = key.into();
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, key: impl Into<u16>) -> bool {
        self.get(key).is_some()
    }

    pub fn str(&self, key: impl Into<u16>) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn binary(&self, key: impl Into<u16>) -> Option<&Bytes> {
        self.get(key).and_then(AttrValue::as_bytes)
    }

    pub fn require(&self, key: impl Into<u16>) -> Result<&AttrValue> {
        let key = key.into();
        self.get(key).ok_or(SchemaError::MissingAttribute(key))
    }

    pub fn require_str(&self, key: impl Into<u16>) -> Result<&str> {
        let key = key.into();
        self.require(key)?.as_str().ok_or_else(|| SchemaError::PolicyViolation {
            key,
            reason: "expected a string value".into(),
        })
    }

    pub fn require_binary(&self, key: impl Into<u16>) -> Result<&Bytes> {
        let key = key.into();
        self.require(key)?
            .as_bytes()
            .ok_or_else(|| SchemaError::PolicyViolation {
                key,
                reason: "expected a binary value".into(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &AttrValue)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u16, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (u16, AttrValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Encode one value under `policy`.
///
/// Strings gain a single NUL terminator, counted against `max_length`.
pub fn encode_attribute(
    key: u16,
    value: &AttrValue,
    policy: &AttributePolicy,
) -> Result<RawAttribute> {
    if value.kind() != policy.kind {
        return Err(SchemaError::PolicyViolation {
            key,
            reason: format!("expected {} value, got {}", policy.kind, value.kind()),
        });
    }

    let len = value.encoded_len();
    if len > policy.max_length {
        return Err(SchemaError::PolicyViolation {
            key,
            reason: format!("encoded length {len} exceeds max {}", policy.max_length),
        });
    }

    let raw = match value {
        AttrValue::String(text) => {
            if text.as_bytes().contains(&0) {
                return Err(SchemaError::PolicyViolation {
                    key,
                    reason: "string contains an interior NUL".into(),
                });
            }
            let mut buf = BytesMut::with_capacity(len);
            buf.put_slice(text.as_bytes());
            buf.put_u8(0);
            RawAttribute::new(key, buf.freeze())
        }
        AttrValue::Binary(bytes) => RawAttribute::new(key, bytes.clone()),
    };
    Ok(raw)
}

/// Encode a whole attribute set. Keys absent from `policy` are rejected.
pub fn encode_attributes(attrs: &Attributes, policy: &PolicyTable) -> Result<Vec<RawAttribute>> {
    attrs
        .iter()
        .map(|(key, value)| {
            let entry = policy.get(key).ok_or(SchemaError::UnknownAttribute(key))?;
            encode_attribute(key, value, entry)
        })
        .collect()
}

/// Decode one raw attribute against the family's policy table.
pub fn decode_attribute(raw: &RawAttribute, policy: &PolicyTable) -> Result<AttrValue> {
    let key = raw.key;
    let entry = policy.get(key).ok_or(SchemaError::UnknownAttribute(key))?;

    let len = raw.value.len();
    if len > entry.max_length {
        return Err(SchemaError::LengthExceeded {
            key,
            len,
            max: entry.max_length,
        });
    }

    match entry.kind {
        AttributeKind::Binary => Ok(AttrValue::Binary(raw.value.clone())),
        AttributeKind::String => {
            let end = raw
                .value
                .iter()
                .position(|byte| *byte == 0)
                .ok_or(SchemaError::NotNullTerminated(key))?;
            let text = std::str::from_utf8(&raw.value[..end])
                .map_err(|_| SchemaError::InvalidUtf8(key))?;
            Ok(AttrValue::String(text.to_owned()))
        }
    }
}

/// Decode every attribute of a message, failing on the first violation.
pub fn decode_attributes(raws: &[RawAttribute], policy: &PolicyTable) -> Result<Attributes> {
    let attrs = raws
        .iter()
        .map(|raw| decode_attribute(raw, policy).map(|value| (raw.key, value)))
        .collect::<Result<Attributes>>()?;
    trace!(count = attrs.len(), "decoded attributes");
    Ok(attrs)
}
