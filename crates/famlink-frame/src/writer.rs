use std::io::ErrorKind;

use bytes::BytesMut;
use famlink_transport::Datagram;

use crate::codec::{encode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};
use crate::reader::{io_to_frame_error, transport_to_frame_error};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Writes complete messages to any [`Datagram`] endpoint.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Datagram> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config: FrameConfig::default(),
        }
    }

    /// Create a new message writer and apply the send timeout from `config`.
    pub fn with_config(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_send_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        })
    }

    /// Encode and send one message as a single datagram (blocking).
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        let size = msg.wire_size();
        if size > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        encode_message(msg, &mut self.buf)?;

        loop {
            match self.inner.send_datagram(&self.buf) {
                Ok(n) if n == self.buf.len() => return Ok(()),
                Ok(n) => {
                    return Err(FrameError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        format!("short datagram send ({n} of {} bytes)", self.buf.len()),
                    )))
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_to_frame_error(err)),
            }
        }
    }

    /// Borrow the underlying endpoint.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner endpoint.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::os::unix::net::UnixDatagram;
    use std::time::Duration;

    use super::*;
    use crate::codec::{decode_message, RawAttribute, HEADER_SIZE};
    use crate::reader::MessageReader;

    #[test]
    fn write_single_message() {
        let (left, right) = UnixDatagram::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let mut msg = Message::new(0x11, 1).with_sequence(5);
        msg.push_attribute(RawAttribute::new(1, &b"hi\0"[..]));
        writer.write_message(&msg).unwrap();

        let mut buf = [0u8; 128];
        let n = right.recv(&mut buf).unwrap();
        assert_eq!(decode_message(&buf[..n]).unwrap(), msg);
    }

    #[test]
    fn writer_reader_roundtrip_over_pair() {
        let (left, right) = UnixDatagram::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        for seq in 0..16u32 {
            writer
                .write_message(&Message::new(0x20, 2).with_sequence(seq))
                .unwrap();
        }
        for seq in 0..16u32 {
            assert_eq!(reader.read_message().unwrap().sequence, seq);
        }
    }

    #[test]
    fn message_too_large_rejected() {
        let cfg = FrameConfig {
            max_message_size: HEADER_SIZE,
            ..FrameConfig::default()
        };
        let (left, _right) = UnixDatagram::pair().unwrap();
        let mut writer = MessageWriter::with_config(left, cfg).unwrap();

        let mut msg = Message::new(0x11, 1);
        msg.push_attribute(RawAttribute::new(1, &b"x"[..]));
        let err = writer.write_message(&msg).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
    }

    #[test]
    fn encode_errors_propagate() {
        let (left, _right) = UnixDatagram::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let err = writer.write_message(&Message::new(0x11, 0)).unwrap_err();
        assert!(matches!(err, FrameError::UnspecifiedCommand));
    }

    #[test]
    fn handles_interrupted_send() {
        let endpoint = RecordingEndpoint::default();
        let mut writer = MessageWriter::new(endpoint);
        writer.write_message(&Message::new(0x11, 3)).unwrap();

        let endpoint = writer.into_inner();
        assert!(endpoint.interrupted.get());
        assert_eq!(endpoint.sent.borrow().len(), 1);
    }

    #[test]
    fn short_send_is_an_error() {
        let mut writer = MessageWriter::new(ShortEndpoint);
        let err = writer.write_message(&Message::new(0x11, 3)).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }

    #[derive(Default)]
    struct RecordingEndpoint {
        interrupted: Cell<bool>,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl Datagram for RecordingEndpoint {
        fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted.replace(true) {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }

        fn recv_datagram(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn set_recv_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }

        fn set_send_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }
    }

    struct ShortEndpoint;

    impl Datagram for ShortEndpoint {
        fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len() / 2)
        }

        fn recv_datagram(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn set_recv_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }

        fn set_send_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }
    }
}
