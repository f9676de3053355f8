use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use famlink_frame::{Flags, FrameConfig, FrameError, Message, MessageReader, MessageWriter};
use famlink_schema::{encode_attributes, validate_message, Attributes, Family};
use famlink_transport::Datagram;
#[cfg(unix)]
use famlink_transport::BusEndpoint;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::resolve::{resolve_family, ResolvedFamily};

static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

/// Client behavior configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for the family resolution answer.
    pub resolve_timeout: Duration,
    /// Receive timeout for replies. `None` blocks until a reply arrives.
    pub recv_timeout: Option<Duration>,
    /// Directory holding the client endpoint socket.
    pub socket_dir: PathBuf,
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(5),
            recv_timeout: None,
            socket_dir: std::env::temp_dir(),
            frame: FrameConfig::default(),
        }
    }
}

/// What a receive loop waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Exactly one reply.
    Single,
    /// Data parts until the end-of-stream marker.
    Multipart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingReply,
    AwaitingMore,
    Done,
}

/// One decoded reply handed to the receive callback.
#[derive(Debug, Clone)]
pub struct Reply {
    pub command: u8,
    pub sequence: u32,
    pub flags: Flags,
    pub attributes: Attributes,
}

/// Request/reply engine for one family.
///
/// Single-threaded: send a request, then run [`receive_loop`](Self::receive_loop)
/// for it before sending the next one.
pub struct Client<E> {
    reader: MessageReader<Arc<E>>,
    writer: MessageWriter<Arc<E>>,
    family: Arc<Family>,
    family_id: u16,
    port_id: u32,
    next_sequence: u32,
    outstanding: Option<u32>,
    recv_timeout: Option<Duration>,
}

#[cfg(unix)]
impl Client<BusEndpoint> {
    /// Open an endpoint to the service at `service_path` and resolve `family`.
    pub fn connect(
        service_path: impl AsRef<Path>,
        family: Arc<Family>,
        config: ClientConfig,
    ) -> Result<Self> {
        let port_id = next_port_id();
        let local = endpoint_path(&config.socket_dir, port_id);
        let endpoint = BusEndpoint::connect(&local, service_path.as_ref())?;
        Self::with_endpoint(endpoint, family, port_id, config)
    }
}

impl<E: Datagram> Client<E> {
    /// Build a client over an already connected endpoint and resolve `family`.
    pub fn with_endpoint(
        endpoint: E,
        family: Arc<Family>,
        port_id: u32,
        config: ClientConfig,
    ) -> Result<Self> {
        let endpoint = Arc::new(endpoint);
        let frame = FrameConfig {
            read_timeout: Some(config.resolve_timeout),
            ..config.frame
        };
        let mut reader = MessageReader::with_config(Arc::clone(&endpoint), frame.clone())?;
        let mut writer = MessageWriter::with_config(endpoint, frame)?;

        let mut next_sequence = initial_sequence();
        let resolved = resolve_family(
            &mut reader,
            &mut writer,
            family.name(),
            port_id,
            next_sequence,
        )
        .map_err(|err| map_receive_error(err, Some(config.resolve_timeout)))?;
        next_sequence = next_sequence.wrapping_add(1);
        check_version(&family, &resolved);
        reader.set_read_timeout(config.recv_timeout)?;

        info!(
            family = family.name(),
            id = resolved.id,
            port = port_id,
            "client ready"
        );
        Ok(Self {
            reader,
            writer,
            family,
            family_id: resolved.id,
            port_id,
            next_sequence,
            outstanding: None,
            recv_timeout: config.recv_timeout,
        })
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    /// Id the service assigned to this client's family.
    pub fn family_id(&self) -> u16 {
        self.family_id
    }

    pub fn port_id(&self) -> u32 {
        self.port_id
    }

    /// Sequence number the next request will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Encode and send a request. Returns its sequence number.
    pub fn send_request(&mut self, command: impl Into<u8>, attrs: &Attributes) -> Result<u32> {
        let command = command.into();
        if !self.family.accepts(command) {
            return Err(PeerError::UnknownCommand(command));
        }

        let sequence = self.next_sequence;
        self.next_sequence = sequence.wrapping_add(1);

        let mut msg = Message::new(self.family_id, command)
            .with_version(self.family.version())
            .with_sequence(sequence)
            .with_source(self.port_id)
            .with_flags(Flags::request());
        msg.attributes = encode_attributes(attrs, self.family.policy())?;
        self.writer
            .write_message(&msg)
            .map_err(|err| map_receive_error(err.into(), None))?;

        debug!(command, seq = sequence, "request sent");
        self.outstanding = Some(sequence);
        Ok(sequence)
    }

    /// Receive replies to the outstanding request, calling `on_message` for
    /// each data message. Returns how many were delivered.
    ///
    /// In [`ReplyMode::Multipart`] only the end-of-stream marker ends the
    /// loop; there is no assumed maximum.
    pub fn receive_loop<F>(&mut self, mode: ReplyMode, mut on_message: F) -> Result<usize>
    where
        F: FnMut(&Reply) -> Result<()>,
    {
        let sequence = self.outstanding.ok_or_else(|| {
            PeerError::ProtocolViolation("no outstanding request to receive for".into())
        })?;

        let mut state = match mode {
            ReplyMode::Single => LoopState::AwaitingReply,
            ReplyMode::Multipart => LoopState::AwaitingMore,
        };
        let mut delivered = 0usize;

        while state != LoopState::Done {
            let msg = self
                .reader
                .read_message()
                .map_err(|err| map_reply_error(err, self.recv_timeout))?;

            if msg.sequence != sequence {
                warn!(
                    expected = sequence,
                    got = msg.sequence,
                    "ignoring reply for another request"
                );
                continue;
            }
            if msg.family_id != self.family_id {
                return Err(PeerError::MalformedReply(format!(
                    "reply for family {:#06x}, expected {:#06x}",
                    msg.family_id, self.family_id
                )));
            }
            if msg.flags.request {
                return Err(PeerError::MalformedReply(
                    "request flag set on a reply".into(),
                ));
            }

            state = match (state, msg.is_done()) {
                (LoopState::AwaitingMore, true) => LoopState::Done,
                (_, true) => {
                    return Err(PeerError::MalformedReply(
                        "end-of-stream marker for a single reply".into(),
                    ))
                }
                (LoopState::AwaitingMore, false) if !msg.flags.multipart => {
                    return Err(PeerError::MalformedReply(
                        "single reply inside a multipart stream".into(),
                    ))
                }
                (current, false) => {
                    let attributes = validate_message(&self.family, &msg)
                        .map_err(|err| PeerError::MalformedReply(err.to_string()))?;
                    let reply = Reply {
                        command: msg.command,
                        sequence: msg.sequence,
                        flags: msg.flags,
                        attributes,
                    };
                    on_message(&reply)?;
                    delivered += 1;
                    match current {
                        LoopState::AwaitingReply => LoopState::Done,
                        other => other,
                    }
                }
            };
        }

        debug!(seq = sequence, delivered, "receive loop finished");
        self.outstanding = None;
        Ok(delivered)
    }

    /// Send a request and run its receive loop.
    pub fn request<F>(
        &mut self,
        command: impl Into<u8>,
        attrs: &Attributes,
        mode: ReplyMode,
        on_message: F,
    ) -> Result<usize>
    where
        F: FnMut(&Reply) -> Result<()>,
    {
        self.send_request(command, attrs)?;
        self.receive_loop(mode, on_message)
    }
}

/// Port id unique to this client instance within the process.
pub fn next_port_id() -> u32 {
    let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    std::process::id().wrapping_add(instance << 22)
}

/// Path of the client endpoint socket for `port_id`.
pub fn endpoint_path(dir: &Path, port_id: u32) -> PathBuf {
    dir.join(format!("famlink-{port_id}.sock"))
}

fn initial_sequence() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(1)
}

fn check_version(family: &Family, resolved: &ResolvedFamily) {
    if resolved.version != u32::from(family.version()) {
        warn!(
            family = family.name(),
            local = family.version(),
            remote = resolved.version,
            "family version differs from service"
        );
    }
}

/// Read failures stay transport errors; anything that did not decode is a
/// malformed reply.
fn map_reply_error(err: FrameError, timeout: Option<Duration>) -> PeerError {
    match err {
        FrameError::Io(_) | FrameError::ConnectionClosed => map_receive_error(err.into(), timeout),
        other => PeerError::MalformedReply(other.to_string()),
    }
}

fn map_receive_error(err: PeerError, timeout: Option<Duration>) -> PeerError {
    match err {
        PeerError::Frame(FrameError::Io(io))
            if matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            match timeout {
                Some(timeout) => PeerError::Timeout(timeout),
                None => PeerError::Frame(FrameError::Io(io)),
            }
        }
        PeerError::Frame(FrameError::ConnectionClosed) => {
            PeerError::Disconnected("service endpoint is gone".into())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use bytes::BytesMut;
    use famlink_frame::{decode_message, encode_message, RawAttribute};
    use famlink_schema::{AttributePolicy, SchemaError};

    use super::*;
    use crate::resolve::{control_family, ControlAttr, ControlCommand, CONTROL_FAMILY_ID};

    const TEXT: u16 = 1;

    fn family() -> Arc<Family> {
        Arc::new(
            Family::builder("cli")
                .version(2)
                .command(1u8)
                .command(2u8)
                .attribute(TEXT, AttributePolicy::string(16))
                .build()
                .unwrap(),
        )
    }

    /// Scripted endpoint: answers resolution itself, then replays queued
    /// replies stamped with the last request's sequence.
    #[derive(Default)]
    struct Scripted {
        sent: Mutex<Vec<Message>>,
        queued: Mutex<VecDeque<Message>>,
        replies: Mutex<Vec<Message>>,
    }

    impl Scripted {
        fn with_replies(replies: Vec<Message>) -> Self {
            Self {
                replies: Mutex::new(replies),
                ..Self::default()
            }
        }
    }

    impl Datagram for Scripted {
        fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
            let msg = decode_message(buf).unwrap();
            let mut queued = self.queued.lock().unwrap();
            if msg.family_id == CONTROL_FAMILY_ID {
                let control = control_family().unwrap();
                let mut reply = Message::new(CONTROL_FAMILY_ID, ControlCommand::NewFamily.into())
                    .with_sequence(msg.sequence);
                reply.attributes = encode_attributes(
                    &Attributes::new()
                        .with(ControlAttr::FamilyId, 0x21u16.to_le_bytes().to_vec())
                        .with(ControlAttr::Version, 2u32.to_le_bytes().to_vec()),
                    control.policy(),
                )
                .unwrap();
                queued.push_back(reply);
            } else {
                for reply in self.replies.lock().unwrap().drain(..) {
                    let stamped = if reply.sequence == u32::MAX {
                        reply.with_sequence(msg.sequence.wrapping_add(1000))
                    } else {
                        reply.with_sequence(msg.sequence)
                    };
                    queued.push_back(stamped);
                }
            }
            self.sent.lock().unwrap().push(msg);
            Ok(buf.len())
        }

        fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(msg) = self.queued.lock().unwrap().pop_front() else {
                return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
            };
            let mut wire = BytesMut::new();
            encode_message(&msg, &mut wire).unwrap();
            buf[..wire.len()].copy_from_slice(&wire);
            Ok(wire.len())
        }

        fn set_recv_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }

        fn set_send_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }
    }

    /// Resolves like [`Scripted`], then answers every request with raw bytes.
    struct Junk {
        inner: Scripted,
        reply: Vec<u8>,
        pending: Mutex<VecDeque<Vec<u8>>>,
    }

    impl Junk {
        fn new(reply: &[u8]) -> Self {
            Self {
                inner: Scripted::default(),
                reply: reply.to_vec(),
                pending: Mutex::new(VecDeque::new()),
            }
        }
    }

    impl Datagram for Junk {
        fn send_datagram(&self, buf: &[u8]) -> std::io::Result<usize> {
            if decode_message(buf).unwrap().family_id == CONTROL_FAMILY_ID {
                return self.inner.send_datagram(buf);
            }
            self.pending.lock().unwrap().push_back(self.reply.clone());
            Ok(buf.len())
        }

        fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.pending.lock().unwrap().pop_front() {
                Some(raw) => {
                    buf[..raw.len()].copy_from_slice(&raw);
                    Ok(raw.len())
                }
                None => self.inner.recv_datagram(buf),
            }
        }

        fn set_recv_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }

        fn set_send_timeout(&self, _timeout: Option<Duration>) -> famlink_transport::Result<()> {
            Ok(())
        }
    }

    fn text_reply(flags: Flags, text: &str) -> Message {
        let mut msg = Message::new(0x21, 2).with_flags(flags);
        msg.push_attribute(RawAttribute::new(TEXT, format!("{text}\0").into_bytes()));
        msg
    }

    fn done() -> Message {
        Message::new(0x21, 2).with_flags(Flags::done())
    }

    fn client(replies: Vec<Message>) -> Client<Scripted> {
        let config = ClientConfig {
            recv_timeout: Some(Duration::from_millis(5)),
            ..ClientConfig::default()
        };
        Client::with_endpoint(Scripted::with_replies(replies), family(), 7, config).unwrap()
    }

    #[test]
    fn resolves_family_on_construction() {
        let client = client(Vec::new());
        assert_eq!(client.family_id(), 0x21);
        assert_eq!(client.port_id(), 7);
    }

    #[test]
    fn request_is_stamped() {
        let mut client = client(Vec::new());
        let seq = client
            .send_request(1u8, &Attributes::new().with(TEXT, "hi"))
            .unwrap();

        let endpoint = client.writer.get_ref();
        let sent = endpoint.sent.lock().unwrap();
        let request = sent.last().unwrap();
        assert_eq!(request.family_id, 0x21);
        assert_eq!(request.sequence, seq);
        assert_eq!(request.source_endpoint, 7);
        assert_eq!(request.version, 2);
        assert!(request.flags.request);
        assert_eq!(&request.attributes[0].value[..], b"hi\0");
    }

    #[test]
    fn sequences_increase() {
        let mut client = client(Vec::new());
        let first = client.send_request(1u8, &Attributes::new()).unwrap();
        let second = client.send_request(1u8, &Attributes::new()).unwrap();
        assert_eq!(second, first.wrapping_add(1));
    }

    #[test]
    fn undeclared_command_not_sent() {
        let mut client = client(Vec::new());
        assert!(matches!(
            client.send_request(5u8, &Attributes::new()),
            Err(PeerError::UnknownCommand(5))
        ));
        assert!(matches!(
            client.send_request(1u8, &Attributes::new().with(TEXT, "x".repeat(20))),
            Err(PeerError::Schema(SchemaError::PolicyViolation { .. }))
        ));
    }

    #[test]
    fn single_reply_delivered_once() {
        let mut client = client(vec![text_reply(Flags::reply(), "pong")]);
        let mut seen = Vec::new();
        let delivered = client
            .request(2u8, &Attributes::new(), ReplyMode::Single, |reply| {
                seen.push(reply.attributes.str(TEXT).unwrap_or_default().to_owned());
                Ok(())
            })
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(seen, vec!["pong"]);
    }

    #[test]
    fn multipart_runs_until_done() {
        for extra in 0..=10usize {
            let mut replies: Vec<Message> = (0..=extra)
                .map(|i| text_reply(Flags::multipart(), &format!("p{i}")))
                .collect();
            replies.push(done());

            let mut client = client(replies);
            let delivered = client
                .request(2u8, &Attributes::new(), ReplyMode::Multipart, |_| Ok(()))
                .unwrap();
            assert_eq!(delivered, extra + 1);
        }
    }

    #[test]
    fn multipart_without_done_does_not_succeed() {
        let mut client = client(vec![text_reply(Flags::multipart(), "p")]);
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Multipart, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
    }

    #[test]
    fn foreign_sequence_is_ignored() {
        let stray = text_reply(Flags::reply(), "stray").with_sequence(u32::MAX);
        let mut client = client(vec![stray, text_reply(Flags::reply(), "mine")]);
        let mut seen = Vec::new();
        client
            .request(2u8, &Attributes::new(), ReplyMode::Single, |reply| {
                seen.push(reply.attributes.str(TEXT).unwrap_or_default().to_owned());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["mine"]);
    }

    #[test]
    fn policy_failure_is_malformed_reply() {
        let mut bad = Message::new(0x21, 2);
        bad.push_attribute(RawAttribute::new(TEXT, &b"unterminated"[..]));
        let mut client = client(vec![bad]);
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Single, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, PeerError::MalformedReply(_)));
    }

    #[test]
    fn done_in_single_mode_is_malformed() {
        let mut client = client(vec![done()]);
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Single, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, PeerError::MalformedReply(_)));
    }

    #[test]
    fn undecodable_reply_is_malformed() {
        let mut header_only = BytesMut::new();
        encode_message(&Message::new(0x21, 2), &mut header_only).unwrap();
        header_only[6] = 0x80;

        for raw in [vec![1u8, 2, 3], header_only.to_vec()] {
            let config = ClientConfig {
                recv_timeout: Some(Duration::from_millis(5)),
                ..ClientConfig::default()
            };
            let mut client = Client::with_endpoint(Junk::new(&raw), family(), 7, config).unwrap();
            let err = client
                .request(2u8, &Attributes::new(), ReplyMode::Single, |_| Ok(()))
                .unwrap_err();
            assert!(matches!(err, PeerError::MalformedReply(_)), "{err:?}");
        }
    }

    #[test]
    fn silent_service_is_still_a_timeout() {
        let mut client = client(Vec::new());
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Single, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)));
    }

    #[test]
    fn plain_reply_inside_stream_is_malformed() {
        let mut client = client(vec![
            text_reply(Flags::multipart(), "a"),
            text_reply(Flags::reply(), "b"),
            done(),
        ]);
        let mut seen = 0;
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Multipart, |_| {
                seen += 1;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, PeerError::MalformedReply(_)));
        assert_eq!(seen, 1);
    }

    #[test]
    fn callback_error_aborts() {
        let mut client = client(vec![
            text_reply(Flags::multipart(), "a"),
            text_reply(Flags::multipart(), "b"),
            done(),
        ]);
        let mut calls = 0;
        let err = client
            .request(2u8, &Attributes::new(), ReplyMode::Multipart, |_| {
                calls += 1;
                Err(PeerError::ProtocolViolation("enough".into()))
            })
            .unwrap_err();
        assert!(matches!(err, PeerError::ProtocolViolation(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn receive_without_request_is_rejected() {
        let mut client = client(Vec::new());
        assert!(matches!(
            client.receive_loop(ReplyMode::Single, |_| Ok(())),
            Err(PeerError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn port_ids_differ_per_instance() {
        let first = next_port_id();
        let second = next_port_id();
        assert_ne!(first, second);
        assert_eq!(
            endpoint_path(Path::new("/tmp"), 42),
            PathBuf::from("/tmp/famlink-42.sock")
        );
    }
}
