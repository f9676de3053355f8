//! Family, command and attribute policy registry for famlink.
//!
//! A family is a named protocol namespace: the commands it accepts and, for
//! every attribute key, the kind and maximum length of the value. Incoming
//! attributes are checked against the policy at decode time, so handlers
//! never see a value the policy does not allow.

pub mod attr;
pub mod config;
pub mod error;
pub mod family;
pub mod policy;
pub mod registry;
pub mod validator;

pub use attr::{
    decode_attribute, decode_attributes, encode_attribute, encode_attributes, AttrValue,
    Attributes,
};
pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use family::{AttributeDecl, Family, FamilyBuilder, FamilyDecl, MAX_FAMILY_NAME_LEN};
pub use policy::{AttributeKind, AttributePolicy, PolicyTable};
pub use registry::{FamilyRegistry, RegistryBuilder};
pub use validator::validate_message;
