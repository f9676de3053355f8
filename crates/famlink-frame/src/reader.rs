use std::io::ErrorKind;

use famlink_transport::Datagram;

use crate::codec::{decode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};

/// Reads complete messages from any [`Datagram`] endpoint.
///
/// One datagram is one message; callers always get whole messages.
pub struct MessageReader<T> {
    inner: T,
    buf: Vec<u8>,
    config: FrameConfig,
}

impl<T: Datagram> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        let config = FrameConfig::default();
        Self {
            buf: vec![0u8; config.max_message_size + 1],
            inner,
            config,
        }
    }

    /// Create a new message reader and apply the receive timeout from `config`.
    pub fn with_config(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_recv_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self {
            buf: vec![0u8; config.max_message_size + 1],
            inner,
            config,
        })
    }

    /// Receive the next complete message (blocking).
    ///
    /// A receive timeout surfaces as `FrameError::Io` with kind `WouldBlock`
    /// or `TimedOut`.
    pub fn read_message(&mut self) -> Result<Message> {
        let received = loop {
            match self.inner.recv_datagram(&mut self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_to_frame_error(err)),
            }
        };

        if received > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: received,
                max: self.config.max_message_size,
            });
        }

        decode_message(&self.buf[..received])
    }

    /// Update the receive timeout for subsequent reads.
    pub fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner
            .set_recv_timeout(timeout)
            .map_err(transport_to_frame_error)?;
        self.config.read_timeout = timeout;
        Ok(())
    }

    /// Borrow the underlying endpoint.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner endpoint.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

pub(crate) fn io_to_frame_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::NotConnected => {
            FrameError::ConnectionClosed
        }
        _ => FrameError::Io(err),
    }
}

pub(crate) fn transport_to_frame_error(err: famlink_transport::TransportError) -> FrameError {
    match err {
        famlink_transport::TransportError::Io(io) => FrameError::Io(io),
        famlink_transport::TransportError::Bind { source, .. }
        | famlink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
