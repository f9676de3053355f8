//! Datagram message bus for famlink.
//!
//! The bus carries one message per datagram between a service socket bound
//! at a well-known path and client endpoints bound at per-client paths:
//! - [`BusSocket`]: the service side (`recv_from` / `send_to`)
//! - [`BusEndpoint`]: a client endpoint connected to one service
//!
//! This is the lowest layer of famlink. Everything else builds on the
//! [`Datagram`] trait provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

#[cfg(all(unix, feature = "async"))]
pub mod async_uds;

pub use error::{Result, TransportError};
pub use traits::{BusAddr, Datagram};

#[cfg(unix)]
pub use uds::{BusEndpoint, BusSocket};

#[cfg(all(unix, feature = "async"))]
pub use async_uds::AsyncBusSocket;
