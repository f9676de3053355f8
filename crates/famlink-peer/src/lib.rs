//! Request dispatch and the request/reply client for famlink.
//!
//! The service side routes each request to a handler chosen by command,
//! after its attributes pass the family policy. Handlers answer through a
//! [`Responder`], either once or as a multipart stream closed by a single
//! end-of-stream marker. The client side sends one request and runs a
//! receive loop until the reply, or the end of the stream, arrives.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod resolve;
pub mod responder;
pub mod service;

pub use client::{endpoint_path, next_port_id, Client, ClientConfig, Reply, ReplyMode};
pub use dispatch::{Dispatch, Dispatcher, Request};
pub use error::{PeerError, Result};
pub use resolve::{
    control_dispatcher, control_family, resolve_family, ControlAttr, ControlCommand,
    ResolvedFamily, CONTROL_FAMILY_ID, CONTROL_FAMILY_NAME, CONTROL_VERSION,
};
pub use responder::Responder;
pub use service::{Service, ServiceConfig};
