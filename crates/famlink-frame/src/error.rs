/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer ends before a complete header.
    #[error("truncated message (need {needed} bytes, have {available})")]
    Truncated { needed: usize, available: usize },

    /// The envelope length disagrees with the datagram size.
    #[error("length mismatch (header says {declared} bytes, datagram has {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// An attribute header declares a length outside the message.
    #[error("invalid attribute length {len} for key {key} ({remaining} bytes remain)")]
    InvalidAttributeLength {
        key: u16,
        len: usize,
        remaining: usize,
    },

    /// The flags field carries bits this protocol does not define.
    #[error("unknown flag bits 0x{0:04x}")]
    UnknownFlags(u16),

    /// An end-of-stream marker carried attributes.
    #[error("done marker must not carry attributes")]
    DoneWithAttributes,

    /// Command 0 is reserved and never sent.
    #[error("command 0 is reserved")]
    UnspecifiedCommand,

    /// A single attribute value does not fit the 16-bit length field.
    #[error("attribute {key} too large ({size} bytes)")]
    AttributeTooLarge { key: u16, size: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An I/O error occurred while sending or receiving.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end of the bus is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
