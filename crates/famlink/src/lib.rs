//! Family-based request/reply messaging over a local datagram bus.
//!
//! A service hosts named families. Clients resolve a family by name, then
//! exchange attribute-encoded requests and replies with it; the service
//! checks every attribute against the family policy before a handler runs.
//!
//! # Crate Structure
//!
//! - [`transport`]: Datagram bus over Unix domain sockets
//! - [`frame`]: Message envelope and attribute framing
//! - [`schema`]: Family registry, attribute policies and codec
//! - [`peer`]: Dispatcher, service loop and request/reply client
//! - [`demo`]: The demo family: hello, ping-pong, streamed pongs, structured payload

/// Re-export transport types.
pub mod transport {
    pub use famlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use famlink_frame::*;
}

/// Re-export schema types.
pub mod schema {
    pub use famlink_schema::*;
}

/// Re-export peer types.
pub mod peer {
    pub use famlink_peer::*;
}

pub mod demo;
