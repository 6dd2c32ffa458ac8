//! Key type tags for indexed attributes.

use serde::{Deserialize, Serialize};

/// Datatype of an attribute an index is built over.
///
/// The tag is persisted in the index meta page, so the discriminants are
/// part of the on-disk format. Only `Integer` is implemented end-to-end;
/// the other tags round-trip through the meta page but are rejected at
/// index construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeyType {
    /// 32-bit signed integer key.
    Integer = 0,
    /// 64-bit floating point key.
    Double = 1,
    /// Variable-length string key.
    Text = 2,
}

impl KeyType {
    /// Returns the on-disk tag value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decodes an on-disk tag value.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyType::Integer),
            1 => Some(KeyType::Double),
            2 => Some(KeyType::Text),
            _ => None,
        }
    }

    /// Returns the fixed byte size of a key of this type, or None for
    /// variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            KeyType::Integer => Some(4),
            KeyType::Double => Some(8),
            KeyType::Text => None,
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyType::Integer => "INTEGER",
            KeyType::Double => "DOUBLE",
            KeyType::Text => "TEXT",
        };
        write!(f, "{}", name)
    }
}
