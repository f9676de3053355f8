//! Fixed-layout structured payload carried in a single binary attribute.
//!
//! ```text
//! offset  size  field
//! 0       4     pid        u32, little-endian
//! 4       8     timestamp  u64, little-endian
//! 12      32    name       NUL-terminated, NUL-padded
//! 44      4     ipv4       network byte order
//! 48      16    ipv6       network byte order
//! ```
//!
//! The encoded bytes are authoritative; [`Display`](std::fmt::Display) output
//! is for people.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;

/// Encoded size of a [`StructuredPayload`].
pub const PAYLOAD_SIZE: usize = 64;

/// Size of the name field, terminator included.
pub const NAME_FIELD_LEN: usize = 32;

const PID_OFFSET: usize = 0;
const TIMESTAMP_OFFSET: usize = 4;
const NAME_OFFSET: usize = 12;
const IPV4_OFFSET: usize = 44;
const IPV6_OFFSET: usize = 48;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("cannot parse address: {0}")]
    AddressParse(String),

    #[error("name field is not NUL-terminated")]
    NameNotTerminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredPayload {
    pub pid: u32,
    pub timestamp: u64,
    name: String,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
}

impl StructuredPayload {
    /// Build a payload. `name` is cut at its first NUL and then to at most
    /// 31 bytes, on a char boundary.
    pub fn new(pid: u32, timestamp: u64, name: &str, ipv4: Ipv4Addr, ipv6: Ipv6Addr) -> Self {
        Self {
            pid,
            timestamp,
            name: fit_name(name),
            ipv4,
            ipv6,
        }
    }

    /// Build a payload from textual addresses.
    pub fn from_text(
        pid: u32,
        timestamp: u64,
        name: &str,
        ipv4: &str,
        ipv6: &str,
    ) -> Result<Self, PayloadError> {
        let ipv4: Ipv4Addr = ipv4
            .parse()
            .map_err(|_| PayloadError::AddressParse(format!("not an IPv4 address: {ipv4:?}")))?;
        let ipv6: Ipv6Addr = ipv6
            .parse()
            .map_err(|_| PayloadError::AddressParse(format!("not an IPv6 address: {ipv6:?}")))?;
        Ok(Self::new(pid, timestamp, name, ipv4, ipv6))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encode(&self) -> [u8; PAYLOAD_SIZE] {
        let mut buf = [0u8; PAYLOAD_SIZE];
        buf[PID_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&self.pid.to_le_bytes());
        buf[TIMESTAMP_OFFSET..NAME_OFFSET].copy_from_slice(&self.timestamp.to_le_bytes());
        let name = self.name.as_bytes();
        buf[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);
        buf[IPV4_OFFSET..IPV6_OFFSET].copy_from_slice(&self.ipv4.octets());
        buf[IPV6_OFFSET..PAYLOAD_SIZE].copy_from_slice(&self.ipv6.octets());
        buf
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.encode())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        let buf: &[u8; PAYLOAD_SIZE] =
            bytes
                .try_into()
                .map_err(|_| PayloadError::SizeMismatch {
                    expected: PAYLOAD_SIZE,
                    actual: bytes.len(),
                })?;

        let name_field = &buf[NAME_OFFSET..IPV4_OFFSET];
        let end = name_field
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(PayloadError::NameNotTerminated)?;

        Ok(Self {
            pid: u32::from_le_bytes(field(buf, PID_OFFSET)),
            timestamp: u64::from_le_bytes(field(buf, TIMESTAMP_OFFSET)),
            name: String::from_utf8_lossy(&name_field[..end]).into_owned(),
            ipv4: Ipv4Addr::from(field::<4>(buf, IPV4_OFFSET)),
            ipv6: Ipv6Addr::from(field::<16>(buf, IPV6_OFFSET)),
        })
    }
}

impl std::fmt::Display for StructuredPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.pid, self.timestamp, self.name, self.ipv4, self.ipv6
        )
    }
}

fn field<const N: usize>(buf: &[u8; PAYLOAD_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn fit_name(name: &str) -> String {
    let name = name.split('\0').next().unwrap_or_default();
    let mut end = name.len().min(NAME_FIELD_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPV4: &str = "123.45.67.89";
    const IPV6: &str = "abcd:ef01:2345:6789:0123:4567:89ab:cdef";

    fn sample() -> StructuredPayload {
        StructuredPayload::from_text(123, 1_700_000_000_123, "my_prog_name", IPV4, IPV6).unwrap()
    }

    #[test]
    fn fidelity() {
        let payload = sample();
        let encoded = payload.encode();
        let decoded = StructuredPayload::decode(&encoded).unwrap();

        assert_eq!(decoded.pid, 123);
        assert_eq!(decoded.timestamp, 1_700_000_000_123);
        assert_eq!(decoded.name(), "my_prog_name");
        assert_eq!(decoded.ipv4.octets(), payload.ipv4.octets());
        assert_eq!(decoded.ipv6.octets(), payload.ipv6.octets());
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn layout_offsets() {
        let encoded = sample().encode();
        assert_eq!(&encoded[0..4], &123u32.to_le_bytes());
        assert_eq!(&encoded[4..12], &1_700_000_000_123u64.to_le_bytes());
        assert_eq!(&encoded[12..24], b"my_prog_name");
        assert!(encoded[24..44].iter().all(|byte| *byte == 0));
        assert_eq!(&encoded[44..48], &[123, 45, 67, 89]);
        assert_eq!(&encoded[48..50], &[0xab, 0xcd]);
        assert_eq!(&encoded[62..64], &[0xcd, 0xef]);
    }

    #[test]
    fn size_mismatch() {
        for len in [0, 63, 65] {
            assert_eq!(
                StructuredPayload::decode(&vec![0u8; len]),
                Err(PayloadError::SizeMismatch {
                    expected: PAYLOAD_SIZE,
                    actual: len,
                })
            );
        }
    }

    #[test]
    fn unterminated_name_rejected() {
        let mut encoded = sample().encode();
        encoded[NAME_OFFSET..IPV4_OFFSET].fill(b'x');
        assert_eq!(
            StructuredPayload::decode(&encoded),
            Err(PayloadError::NameNotTerminated)
        );
    }

    #[test]
    fn bad_addresses_rejected() {
        assert!(matches!(
            StructuredPayload::from_text(1, 1, "n", "300.1.1.1", IPV6),
            Err(PayloadError::AddressParse(_))
        ));
        assert!(matches!(
            StructuredPayload::from_text(1, 1, "n", IPV4, IPV4),
            Err(PayloadError::AddressParse(_))
        ));
    }

    #[test]
    fn long_names_truncated_on_char_boundary() {
        let ascii = "a".repeat(40);
        let payload =
            StructuredPayload::new(1, 1, &ascii, Ipv4Addr::LOCALHOST, Ipv6Addr::LOCALHOST);
        assert_eq!(payload.name().len(), 31);

        let wide = "é".repeat(20);
        let payload = StructuredPayload::new(1, 1, &wide, Ipv4Addr::LOCALHOST, Ipv6Addr::LOCALHOST);
        assert_eq!(payload.name().len(), 30);
        let decoded = StructuredPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded.name(), payload.name());
    }

    #[test]
    fn display_form() {
        assert_eq!(
            sample().to_string(),
            "[123 1700000000123 my_prog_name 123.45.67.89 abcd:ef01:2345:6789:123:4567:89ab:cdef]"
        );
    }
}
