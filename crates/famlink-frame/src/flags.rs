//! Envelope flag bits.
//!
//! Bits outside [`KNOWN_FLAGS`] are rejected at decode time.

/// The message is a request from a client.
pub const FLAG_REQUEST: u16 = 0x0001;

/// The message is one data part of a multi-part reply.
pub const FLAG_MULTIPART: u16 = 0x0002;

/// The message terminates a multi-part reply. Carries no attributes.
pub const FLAG_DONE: u16 = 0x0004;

/// All flag bits this protocol defines.
pub const KNOWN_FLAGS: u16 = FLAG_REQUEST | FLAG_MULTIPART | FLAG_DONE;

/// Decoded envelope flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    pub request: bool,
    pub multipart: bool,
    pub done: bool,
}

impl Flags {
    /// Flags of a client request.
    pub const fn request() -> Self {
        Self {
            request: true,
            multipart: false,
            done: false,
        }
    }

    /// Flags of a single reply.
    pub const fn reply() -> Self {
        Self {
            request: false,
            multipart: false,
            done: false,
        }
    }

    /// Flags of one data part in a multi-part reply.
    pub const fn multipart() -> Self {
        Self {
            request: false,
            multipart: true,
            done: false,
        }
    }

    /// Flags of the end-of-stream marker.
    pub const fn done() -> Self {
        Self {
            request: false,
            multipart: true,
            done: true,
        }
    }

    /// Wire representation.
    pub const fn bits(self) -> u16 {
        let mut bits = 0;
        if self.request {
            bits |= FLAG_REQUEST;
        }
        if self.multipart {
            bits |= FLAG_MULTIPART;
        }
        if self.done {
            bits |= FLAG_DONE;
        }
        bits
    }

    /// Parse wire flags. Returns `None` if any undefined bit is set.
    pub const fn from_bits(bits: u16) -> Option<Self> {
        if bits & !KNOWN_FLAGS != 0 {
            return None;
        }
        Some(Self {
            request: bits & FLAG_REQUEST != 0,
            multipart: bits & FLAG_MULTIPART != 0,
            done: bits & FLAG_DONE != 0,
        })
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::with_capacity(3);
        if self.request {
            names.push("REQUEST");
        }
        if self.multipart {
            names.push("MULTI");
        }
        if self.done {
            names.push("DONE");
        }
        if names.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
