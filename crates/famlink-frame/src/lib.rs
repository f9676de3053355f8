//! Message envelope and attribute framing for famlink.
//!
//! Every datagram on the bus carries exactly one message:
//! - A 20-byte envelope (length, family id, flags, sequence, source
//!   endpoint, command, family version)
//! - Zero or more type-length-value attributes, each padded to 4 bytes
//!
//! This layer knows nothing about families or policies; it only moves
//! well-formed envelopes and raw attribute bytes.

pub mod codec;
pub mod error;
pub mod flags;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, encode_message, FrameConfig, Message, RawAttribute, ATTR_ALIGN,
    ATTR_HEADER_SIZE, DEFAULT_MAX_MESSAGE, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use flags::{Flags, FLAG_DONE, FLAG_MULTIPART, FLAG_REQUEST};
pub use reader::MessageReader;
pub use writer::MessageWriter;
