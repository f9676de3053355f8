//! Name → id resolution through the built-in control family.
//!
//! A client sends `GetFamily { FamilyName }` to the control family; the
//! service answers `NewFamily { FamilyId, FamilyName, Version, MaxAttr }`,
//! or `NewFamily { FamilyName }` alone when nothing by that name is served.
//! A family that is registered but has no dispatcher counts as not served.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use famlink_frame::{Flags, Message, MessageReader, MessageWriter};
use famlink_schema::{
    encode_attributes, validate_message, AttributePolicy, Attributes, Family, FamilyRegistry,
};
use famlink_transport::Datagram;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::{PeerError, Result};

/// Fixed id of the control family.
pub const CONTROL_FAMILY_ID: u16 = 0x10;

pub const CONTROL_FAMILY_NAME: &str = "famlink_ctrl";

pub const CONTROL_VERSION: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ControlCommand {
    NewFamily = 1,
    GetFamily = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ControlAttr {
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    MaxAttr = 4,
}

/// What the service reported for a family name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFamily {
    pub id: u16,
    pub version: u32,
    pub max_attribute_index: u32,
}

/// Declaration of the control family.
pub fn control_family() -> Result<Family> {
    Family::builder(CONTROL_FAMILY_NAME)
        .version(CONTROL_VERSION)
        .max_attribute_index(ControlAttr::MaxAttr.into())
        .command(ControlCommand::NewFamily)
        .command(ControlCommand::GetFamily)
        .attribute(ControlAttr::FamilyId, AttributePolicy::binary(2))
        .attribute(ControlAttr::FamilyName, AttributePolicy::string(16))
        .attribute(ControlAttr::Version, AttributePolicy::binary(4))
        .attribute(ControlAttr::MaxAttr, AttributePolicy::binary(4))
        .build()
        .map_err(Into::into)
}

/// Service-side dispatcher answering `GetFamily` for the family ids in
/// `served`, described from `registry`.
pub fn control_dispatcher(
    registry: Arc<FamilyRegistry>,
    served: BTreeSet<u16>,
) -> Result<Dispatcher<ControlCommand>> {
    let mut dispatcher = Dispatcher::new(CONTROL_FAMILY_ID, Arc::new(control_family()?));
    dispatcher.route(
        ControlCommand::GetFamily,
        &[ControlAttr::FamilyName],
        move |req, resp| {
            let name = req.attributes.require_str(ControlAttr::FamilyName)?;
            resp.set_command(ControlCommand::NewFamily)?;

            let mut attrs = Attributes::new();
            match registry.resolve(name) {
                Ok(id) if served.contains(&id) => {
                    let family = registry.family(name)?;
                    attrs.push(ControlAttr::FamilyId, id.to_le_bytes().to_vec());
                    attrs.push(ControlAttr::FamilyName, name);
                    attrs.push(
                        ControlAttr::Version,
                        u32::from(family.version()).to_le_bytes().to_vec(),
                    );
                    attrs.push(
                        ControlAttr::MaxAttr,
                        u32::from(family.max_attribute_index()).to_le_bytes().to_vec(),
                    );
                    debug!(family = name, id, "resolved family");
                }
                Ok(id) => {
                    warn!(family = name, id, "resolve request for a family nobody serves");
                    attrs.push(ControlAttr::FamilyName, name);
                }
                Err(_) => {
                    warn!(family = name, "resolve request for unknown family");
                    attrs.push(ControlAttr::FamilyName, name);
                }
            }
            resp.reply(&attrs)
        },
    )?;
    Ok(dispatcher)
}

/// Ask the service for the id of `name` and wait for the answer.
///
/// Uses whatever receive timeout `reader` currently has.
pub fn resolve_family<E: Datagram>(
    reader: &mut MessageReader<E>,
    writer: &mut MessageWriter<E>,
    name: &str,
    port_id: u32,
    sequence: u32,
) -> Result<ResolvedFamily> {
    let control = control_family()?;

    let mut request = Message::new(CONTROL_FAMILY_ID, ControlCommand::GetFamily.into())
        .with_version(CONTROL_VERSION)
        .with_sequence(sequence)
        .with_source(port_id)
        .with_flags(Flags::request());
    request.attributes = encode_attributes(
        &Attributes::new().with(ControlAttr::FamilyName, name),
        control.policy(),
    )?;
    writer.write_message(&request)?;

    loop {
        let reply = reader.read_message()?;
        if reply.family_id != CONTROL_FAMILY_ID || reply.sequence != sequence {
            debug!(
                family_id = reply.family_id,
                seq = reply.sequence,
                "ignoring message while resolving"
            );
            continue;
        }
        if reply.command != u8::from(ControlCommand::NewFamily) {
            return Err(PeerError::MalformedReply(format!(
                "unexpected control command {}",
                reply.command
            )));
        }

        let attrs = validate_message(&control, &reply)
            .map_err(|err| PeerError::MalformedReply(err.to_string()))?;
        let Some(id) = attrs.binary(ControlAttr::FamilyId) else {
            return Err(PeerError::UnknownFamily(name.to_owned()));
        };
        return Ok(ResolvedFamily {
            id: read_u16(id)?,
            version: attrs
                .binary(ControlAttr::Version)
                .map(read_u32)
                .transpose()?
                .unwrap_or(0),
            max_attribute_index: attrs
                .binary(ControlAttr::MaxAttr)
                .map(read_u32)
                .transpose()?
                .unwrap_or(0),
        });
    }
}

fn read_u16(bytes: &Bytes) -> Result<u16> {
    let raw: [u8; 2] = bytes[..]
        .try_into()
        .map_err(|_| PeerError::MalformedReply(format!("expected 2 bytes, got {}", bytes.len())))?;
    Ok(u16::from_le_bytes(raw))
}

fn read_u32(bytes: &Bytes) -> Result<u32> {
    let raw: [u8; 4] = bytes[..]
        .try_into()
        .map_err(|_| PeerError::MalformedReply(format!("expected 4 bytes, got {}", bytes.len())))?;
    Ok(u32::from_le_bytes(raw))
}
