use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::policy::{AttributeKind, AttributePolicy, PolicyTable};

/// Longest family name in bytes. Names travel as NUL-terminated strings of
/// at most 16 bytes.
pub const MAX_FAMILY_NAME_LEN: usize = 15;

/// Largest attribute value the envelope can carry (u16 length minus header).
const MAX_ATTRIBUTE_VALUE: usize = u16::MAX as usize - 4;

/// A named protocol namespace: accepted commands and per-attribute policy.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    name: String,
    version: u16,
    max_attribute_index: u16,
    commands: BTreeSet<u8>,
    policy: PolicyTable,
}

impl Family {
    /// Start declaring a family called `name`.
    pub fn builder(name: impl Into<String>) -> FamilyBuilder {
        FamilyBuilder::new(name)
    }

    /// Parse a JSON family declaration.
    pub fn from_json(json: &str) -> Result<Self> {
        let decl: FamilyDecl = serde_json::from_str(json)?;
        decl.into_family()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn max_attribute_index(&self) -> u16 {
        self.max_attribute_index
    }

    pub fn commands(&self) -> &BTreeSet<u8> {
        &self.commands
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Whether `command` is declared. Command 0 never is.
    pub fn accepts(&self, command: u8) -> bool {
        self.commands.contains(&command)
    }

    /// Serializable form of this family.
    pub fn to_decl(&self) -> FamilyDecl {
        FamilyDecl {
            name: self.name.clone(),
            version: self.version,
            max_attribute_index: Some(self.max_attribute_index),
            commands: self.commands.iter().copied().collect(),
            attributes: self
                .policy
                .iter()
                .map(|(key, policy)| AttributeDecl {
                    key,
                    kind: policy.kind,
                    max_length: policy.max_length,
                })
                .collect(),
        }
    }
}

/// Incremental family declaration. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct FamilyBuilder {
    name: String,
    version: u16,
    max_attribute_index: Option<u16>,
    commands: Vec<u8>,
    attributes: Vec<(u16, AttributePolicy)>,
}

impl FamilyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            max_attribute_index: None,
            commands: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// Highest attribute key the family may use. Defaults to the highest
    /// declared key.
    pub fn max_attribute_index(mut self, index: u16) -> Self {
        self.max_attribute_index = Some(index);
        self
    }

    pub fn command(mut self, command: impl Into<u8>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<u16>, policy: AttributePolicy) -> Self {
        self.attributes.push((key.into(), policy));
        self
    }

    pub fn build(self) -> Result<Family> {
        validate_name(&self.name)?;

        let mut commands = BTreeSet::new();
        for command in self.commands {
            if command == 0 {
                return Err(invalid(&self.name, "command 0 is reserved"));
            }
            if !commands.insert(command) {
                return Err(invalid(
                    &self.name,
                    &format!("command {command} declared twice"),
                ));
            }
        }

        let mut policy = PolicyTable::new();
        for (key, entry) in self.attributes {
            if key == 0 {
                return Err(invalid(&self.name, "attribute key 0 is reserved"));
            }
            if entry.kind == AttributeKind::String && entry.max_length == 0 {
                return Err(invalid(
                    &self.name,
                    &format!("string attribute {key} has no room for its terminator"),
                ));
            }
            if entry.max_length > MAX_ATTRIBUTE_VALUE {
                return Err(invalid(
                    &self.name,
                    &format!(
                        "attribute {key} max length {} exceeds {MAX_ATTRIBUTE_VALUE}",
                        entry.max_length
                    ),
                ));
            }
            if policy.insert(key, entry).is_some() {
                return Err(invalid(&self.name, &format!("attribute {key} declared twice")));
            }
        }

        let highest = policy.max_key().unwrap_or(0);
        let max_attribute_index = self.max_attribute_index.unwrap_or(highest);
        if highest > max_attribute_index {
            return Err(invalid(
                &self.name,
                &format!("attribute {highest} exceeds max attribute index {max_attribute_index}"),
            ));
        }

        Ok(Family {
            name: self.name,
            version: self.version,
            max_attribute_index,
            commands,
            policy,
        })
    }
}

/// JSON shape of a family declaration.
///
/// ```json
/// {
///   "name": "famlink_demo",
///   "version": 1,
///   "max_attribute_index": 4,
///   "commands": [1, 2, 3, 4],
///   "attributes": [{ "key": 1, "kind": "string", "max_length": 32 }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyDecl {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attribute_index: Option<u16>,
    pub commands: Vec<u8>,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeDecl {
    pub key: u16,
    pub kind: AttributeKind,
    pub max_length: usize,
}

impl FamilyDecl {
    pub fn into_family(self) -> Result<Family> {
        let mut builder = FamilyBuilder::new(self.name).version(self.version);
        if let Some(index) = self.max_attribute_index {
            builder = builder.max_attribute_index(index);
        }
        for command in self.commands {
            builder = builder.command(command);
        }
        for attr in self.attributes {
            builder = builder.attribute(
                attr.key,
                AttributePolicy {
                    kind: attr.kind,
                    max_length: attr.max_length,
                },
            );
        }
        builder.build()
    }
}

fn default_version() -> u16 {
    1
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SchemaError::InvalidFamily("family name is empty".into()));
    }
    if name.len() > MAX_FAMILY_NAME_LEN {
        return Err(invalid(
            name,
            &format!("name longer than {MAX_FAMILY_NAME_LEN} bytes"),
        ));
    }
    if name.contains('\0') {
        return Err(SchemaError::InvalidFamily(
            "family name contains NUL".into(),
        ));
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidFamily(format!("{name}: {reason}"))
}
