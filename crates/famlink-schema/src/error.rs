/// Errors raised by the family registry and the attribute codec.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No family is registered under this name or id.
    #[error("unknown family: {0}")]
    UnknownFamily(String),

    /// The command is reserved or not declared by the family.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// The attribute key is absent from the family's policy table.
    #[error("unknown attribute {0}")]
    UnknownAttribute(u16),

    /// A required attribute is absent from the message.
    #[error("missing attribute {0}")]
    MissingAttribute(u16),

    /// A received attribute is longer than its policy allows.
    #[error("attribute {key} length {len} exceeds max {max}")]
    LengthExceeded { key: u16, len: usize, max: usize },

    /// A received string attribute has no terminator within its bound.
    #[error("string attribute {0} is not null-terminated")]
    NotNullTerminated(u16),

    /// A received string attribute is not valid UTF-8.
    #[error("string attribute {0} is not valid UTF-8")]
    InvalidUtf8(u16),

    /// A value cannot be encoded under the attribute's policy.
    #[error("policy violation on attribute {key}: {reason}")]
    PolicyViolation { key: u16, reason: String },

    /// A family declaration is malformed.
    #[error("invalid family declaration: {0}")]
    InvalidFamily(String),

    /// A family declaration file could not be loaded.
    #[error("failed to load family declaration: {0}")]
    LoadFailed(String),

    /// A family declaration is not valid JSON.
    #[error("family declaration is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
