use famlink_frame::{Flags, Message};
use famlink_schema::{encode_attributes, Attributes, Family};

use crate::error::{PeerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Silent,
    Single,
    Stream,
}

/// Collects the replies a handler emits for one request.
///
/// A handler either answers once with [`reply`](Self::reply) or streams
/// with [`part`](Self::part). A stream is closed by exactly one
/// end-of-stream marker, appended when the handler returns successfully.
/// Every message carries the request's sequence number.
#[derive(Debug)]
pub struct Responder<'a> {
    family_id: u16,
    family: &'a Family,
    command: u8,
    sequence: u32,
    mode: Mode,
    messages: Vec<Message>,
}

impl<'a> Responder<'a> {
    pub(crate) fn new(family_id: u16, family: &'a Family, request: &Message) -> Self {
        Self {
            family_id,
            family,
            command: request.command,
            sequence: request.sequence,
            mode: Mode::Silent,
            messages: Vec::new(),
        }
    }

    /// Send a single reply.
    pub fn reply(&mut self, attrs: &Attributes) -> Result<()> {
        match self.mode {
            Mode::Silent => {}
            Mode::Single => {
                return Err(PeerError::ProtocolViolation(
                    "a single reply was already sent".into(),
                ))
            }
            Mode::Stream => {
                return Err(PeerError::ProtocolViolation(
                    "single reply after multipart parts".into(),
                ))
            }
        }
        let msg = self.build(Flags::reply(), attrs)?;
        self.messages.push(msg);
        self.mode = Mode::Single;
        Ok(())
    }

    /// Send one data part of a multipart reply.
    pub fn part(&mut self, attrs: &Attributes) -> Result<()> {
        if self.mode == Mode::Single {
            return Err(PeerError::ProtocolViolation(
                "multipart part after a single reply".into(),
            ));
        }
        let msg = self.build(Flags::multipart(), attrs)?;
        self.messages.push(msg);
        self.mode = Mode::Stream;
        Ok(())
    }

    /// Answer with a different command of the same family from now on.
    pub fn set_command(&mut self, command: impl Into<u8>) -> Result<()> {
        let command = command.into();
        if !self.family.accepts(command) {
            return Err(PeerError::UnknownCommand(command));
        }
        self.command = command;
        Ok(())
    }

    /// Sequence number of the request being answered.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Number of messages emitted so far, excluding the end-of-stream marker.
    pub fn emitted(&self) -> usize {
        self.messages.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.mode == Mode::Stream
    }

    /// Outbound messages, closing an open stream.
    pub(crate) fn finish(mut self) -> Vec<Message> {
        if self.mode == Mode::Stream {
            let done = self.header(Flags::done());
            self.messages.push(done);
        }
        self.messages
    }

    fn header(&self, flags: Flags) -> Message {
        Message::new(self.family_id, self.command)
            .with_version(self.family.version())
            .with_sequence(self.sequence)
            .with_source(0)
            .with_flags(flags)
    }

    fn build(&self, flags: Flags, attrs: &Attributes) -> Result<Message> {
        let mut msg = self.header(flags);
        msg.attributes = encode_attributes(attrs, self.family.policy())?;
        Ok(msg)
    }
}
