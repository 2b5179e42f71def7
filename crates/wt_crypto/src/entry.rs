//! Plaintext and encrypted record shapes.
//!
//! An `Entry` is one record of a wallet profile: either a general item or a key
//! entry (`EntryKind::Kms`). Both share the same persisted layout; the kind keeps
//! their category namespaces apart.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Stored cryptographic key material.
    Kms,
    /// General wallet record.
    Item,
}

impl EntryKind {
    /// Column value used by the storage backends.
    pub fn code(self) -> i16 {
        match self {
            EntryKind::Kms => 1,
            EntryKind::Item => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, CryptoError> {
        match code {
            1 => Ok(EntryKind::Kms),
            2 => Ok(EntryKind::Item),
            other => Err(CryptoError::MalformedRecord(format!("unknown entry kind {other}"))),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Kms => f.write_str("key entry"),
            EntryKind::Item => f.write_str("item"),
        }
    }
}

/// How a tag value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    /// Value encrypted with the searchable scheme (equality lookups only).
    Encrypted,
    /// Value kept in the clear (equality and range lookups).
    Plaintext,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Zeroize, ZeroizeOnDrop)]
pub struct EntryTag {
    #[zeroize(skip)]
    pub kind: TagKind,
    pub name: String,
    pub value: String,
}

impl EntryTag {
    pub fn encrypted(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { kind: TagKind::Encrypted, name: name.into(), value: value.into() }
    }

    pub fn plaintext(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { kind: TagKind::Plaintext, name: name.into(), value: value.into() }
    }
}

impl fmt::Debug for EntryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryTag")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Decrypted record. Lives only in process memory; zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Entry {
    #[zeroize(skip)]
    pub kind: EntryKind,
    pub category: String,
    pub name: String,
    pub value: Vec<u8>,
    pub tags: Vec<EntryTag>,
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(
        kind: EntryKind,
        category: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Vec<u8>>,
        tags: Vec<EntryTag>,
    ) -> Self {
        Self {
            kind,
            category: category.into(),
            name: name.into(),
            value: value.into(),
            tags,
            expiry: None,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Encrypted tag row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedTag {
    pub kind: TagKind,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// Encrypted record as persisted by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEntry {
    pub kind: EntryKind,
    pub category: Vec<u8>,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub tags: Vec<EncryptedTag>,
    pub expiry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_roundtrip() {
        for kind in [EntryKind::Kms, EntryKind::Item] {
            assert_eq!(EntryKind::from_code(kind.code() as i64).unwrap(), kind);
        }
        assert!(EntryKind::from_code(9).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let entry = Entry::new(
            EntryKind::Item,
            "credential",
            "cred-1",
            b"super-secret".to_vec(),
            vec![EntryTag::encrypted("schema", "hidden-tag-value")],
        );
        let text = format!("{entry:?}");
        assert!(text.contains("cred-1"));
        assert!(!text.contains("super-secret"));
        assert!(!text.contains("hidden-tag-value"));
    }
}
