use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How an attribute value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// UTF-8 text carried with a single NUL terminator.
    String,
    /// Opaque bytes.
    Binary,
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Declared kind and maximum encoded length of one attribute key.
///
/// For strings `max_length` counts the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePolicy {
    pub kind: AttributeKind,
    pub max_length: usize,
}

impl AttributePolicy {
    pub const fn string(max_length: usize) -> Self {
        Self {
            kind: AttributeKind::String,
            max_length,
        }
    }

    pub const fn binary(max_length: usize) -> Self {
        Self {
            kind: AttributeKind::Binary,
            max_length,
        }
    }
}

/// Attribute key → policy for one family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<u16, AttributePolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the policy for `key`.
    pub fn insert(&mut self, key: u16, policy: AttributePolicy) -> Option<AttributePolicy> {
        self.entries.insert(key, policy)
    }

    pub fn get(&self, key: u16) -> Option<&AttributePolicy> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: u16) -> bool {
        self.entries.contains_key(&key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &AttributePolicy)> {
        self.entries.iter().map(|(key, policy)| (*key, policy))
    }

    /// Highest declared key, if any.
    pub fn max_key(&self) -> Option<u16> {
        self.entries.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
