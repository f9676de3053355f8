//! The demo family.
//!
//! | Command          | Request attribute   | Reply                                   |
//! |------------------|---------------------|-----------------------------------------|
//! | `Hello`          | `HelloMsg`          | none                                    |
//! | `PingPong`       | `PingPongMsg`       | one `PingPongMsg`                       |
//! | `PingPongRandom` | `PingPongRandomMsg` | 1..=11 `PingPongRandomMsg` parts + done |
//! | `Struct`         | `StructMsg`         | one `StructMsg` carrying a payload      |

pub mod handlers;
pub mod ops;
pub mod payload;

use famlink_peer::ReplyMode;
use famlink_schema::{AttributePolicy, Family, RegistryBuilder, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub use handlers::{build_dispatcher, CountSource, FixedCount, RandomCount, MAX_EXTRA_PARTS};
pub use payload::{PayloadError, StructuredPayload, PAYLOAD_SIZE};

pub const DEMO_FAMILY_NAME: &str = "famlink_demo";

pub const DEMO_VERSION: u16 = 1;

/// Bound on text attributes, terminator included.
pub const MAX_TEXT_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DemoCommand {
    Hello = 1,
    PingPong = 2,
    PingPongRandom = 3,
    Struct = 4,
}

impl DemoCommand {
    pub const ALL: [DemoCommand; 4] = [
        DemoCommand::Hello,
        DemoCommand::PingPong,
        DemoCommand::PingPongRandom,
        DemoCommand::Struct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DemoCommand::Hello => "hello",
            DemoCommand::PingPong => "pingpong",
            DemoCommand::PingPongRandom => "pingpong-random",
            DemoCommand::Struct => "struct",
        }
    }

    /// How the service answers, or `None` when it does not.
    pub fn reply_mode(self) -> Option<ReplyMode> {
        match self {
            DemoCommand::Hello => None,
            DemoCommand::PingPong | DemoCommand::Struct => Some(ReplyMode::Single),
            DemoCommand::PingPongRandom => Some(ReplyMode::Multipart),
        }
    }

    /// The attribute a request of this command must carry.
    pub fn attribute(self) -> DemoAttr {
        match self {
            DemoCommand::Hello => DemoAttr::HelloMsg,
            DemoCommand::PingPong => DemoAttr::PingPongMsg,
            DemoCommand::PingPongRandom => DemoAttr::PingPongRandomMsg,
            DemoCommand::Struct => DemoAttr::StructMsg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum DemoAttr {
    HelloMsg = 1,
    PingPongMsg = 2,
    PingPongRandomMsg = 3,
    StructMsg = 4,
}

/// Declaration of the demo family.
pub fn demo_family() -> Result<Family> {
    let mut builder = Family::builder(DEMO_FAMILY_NAME)
        .version(DEMO_VERSION)
        .max_attribute_index(DemoAttr::StructMsg.into());
    for command in DemoCommand::ALL {
        builder = builder.command(command);
    }
    builder
        .attribute(DemoAttr::HelloMsg, AttributePolicy::string(MAX_TEXT_LEN))
        .attribute(DemoAttr::PingPongMsg, AttributePolicy::string(MAX_TEXT_LEN))
        .attribute(
            DemoAttr::PingPongRandomMsg,
            AttributePolicy::string(MAX_TEXT_LEN),
        )
        .attribute(DemoAttr::StructMsg, AttributePolicy::binary(PAYLOAD_SIZE))
        .build()
}

/// Register the demo family and return its id.
pub fn register_demo(builder: &mut RegistryBuilder) -> Result<u16> {
    builder.register(demo_family()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_matches_catalogue() {
        let family = demo_family().unwrap();
        assert_eq!(family.name(), DEMO_FAMILY_NAME);
        assert_eq!(family.version(), 1);
        assert_eq!(family.max_attribute_index(), 4);
        for command in DemoCommand::ALL {
            assert!(family.accepts(command.into()));
            assert!(family.policy().contains(command.attribute().into()));
        }
        assert_eq!(
            family.policy().get(DemoAttr::StructMsg.into()),
            Some(&AttributePolicy::binary(PAYLOAD_SIZE))
        );
    }

    #[test]
    fn out_of_range_identifiers_do_not_convert() {
        assert!(DemoCommand::try_from(0u8).is_err());
        assert!(DemoCommand::try_from(5u8).is_err());
        assert!(DemoAttr::try_from(0u16).is_err());
        assert_eq!(DemoAttr::try_from(4u16).unwrap(), DemoAttr::StructMsg);
    }

    #[test]
    fn reply_modes() {
        assert_eq!(DemoCommand::Hello.reply_mode(), None);
        assert_eq!(DemoCommand::PingPong.reply_mode(), Some(ReplyMode::Single));
        assert_eq!(
            DemoCommand::PingPongRandom.reply_mode(),
            Some(ReplyMode::Multipart)
        );
    }

    #[test]
    fn registers_from_first_user_id() {
        let mut builder = RegistryBuilder::new();
        assert_eq!(register_demo(&mut builder).unwrap(), 0x11);
    }
}
