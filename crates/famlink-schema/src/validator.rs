use famlink_frame::Message;

use crate::attr::{decode_attributes, Attributes};
use crate::error::{Result, SchemaError};
use crate::family::Family;

/// Check a message's command against `family` and decode its attributes.
///
/// The family id itself is the caller's concern; this only looks at the
/// command and the attribute payloads.
pub fn validate_message(family: &Family, msg: &Message) -> Result<Attributes> {
    if !family.accepts(msg.command) {
        return Err(SchemaError::UnknownCommand(msg.command));
    }
    decode_attributes(&msg.attributes, family.policy())
}
