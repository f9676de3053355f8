use std::time::Duration;

/// Errors that can occur while dispatching requests or running a client call.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] famlink_transport::TransportError),

    /// Message framing error.
    #[error("frame error: {0}")]
    Frame(#[from] famlink_frame::FrameError),

    /// Attribute or family policy error.
    #[error("schema error: {0}")]
    Schema(#[from] famlink_schema::SchemaError),

    /// No family with this name or id is served.
    #[error("unknown family: {0}")]
    UnknownFamily(String),

    /// No handler is registered for the command.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// A request lacks an attribute its handler requires.
    #[error("command {command} requires attribute {key}")]
    MissingAttribute { command: u8, key: u16 },

    /// A message without the request flag reached the dispatcher.
    #[error("message is not a request")]
    NotARequest,

    /// A handler broke the reply protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A reply failed validation under the family policy.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// No reply arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service endpoint went away.
    #[error("service disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
