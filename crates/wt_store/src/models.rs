//! Database row models and the handles passed across the session contract.

use chrono::{DateTime, Utc};
use wt_crypto::{EncryptedEntry, EncryptedTag, EntryKind, TagKind};

use crate::error::StoreError;

/// An opened source profile: its row id plus the wrapped key envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileHandle {
    pub id: i64,
    pub name: String,
    pub key_method: String,
    pub wrapped_key: Vec<u8>,
}

/// Identifying columns of one stored record, still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLocator {
    pub id: i64,
    pub kind: EntryKind,
    pub category: Vec<u8>,
    pub name: Vec<u8>,
}

/// A full encrypted record with its backend row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: i64,
    pub entry: EncryptedEntry,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub name: String,
    pub key_method: Option<String>,
    pub profile_key: Option<Vec<u8>>,
}

impl TryFrom<ProfileRow> for ProfileHandle {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        match (row.key_method, row.profile_key) {
            (Some(key_method), Some(wrapped_key)) => Ok(ProfileHandle {
                id: row.id,
                name: row.name,
                key_method,
                wrapped_key,
            }),
            _ => Err(StoreError::MissingProfileKey(row.name)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocatorRow {
    pub id: i64,
    pub kind: i64,
    pub category: Vec<u8>,
    pub name: Vec<u8>,
}

impl TryFrom<LocatorRow> for EntryLocator {
    type Error = StoreError;

    fn try_from(row: LocatorRow) -> Result<Self, Self::Error> {
        Ok(EntryLocator {
            id: row.id,
            kind: EntryKind::from_code(row.kind)?,
            category: row.category,
            name: row.name,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub kind: i64,
    pub category: Vec<u8>,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRow {
    pub item_id: i64,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub plaintext: bool,
}

impl From<TagRow> for EncryptedTag {
    fn from(row: TagRow) -> Self {
        EncryptedTag {
            kind: if row.plaintext { TagKind::Plaintext } else { TagKind::Encrypted },
            name: row.name,
            value: row.value,
        }
    }
}

/// Join one page of item rows with their tag rows, keeping item order.
pub(crate) fn assemble_page(items: Vec<ItemRow>, tags: Vec<TagRow>) -> Result<Vec<StoredEntry>, StoreError> {
    let mut by_item: std::collections::HashMap<i64, Vec<EncryptedTag>> = std::collections::HashMap::new();
    for tag in tags {
        by_item.entry(tag.item_id).or_default().push(tag.into());
    }
    items
        .into_iter()
        .map(|row| {
            Ok(StoredEntry {
                id: row.id,
                entry: EncryptedEntry {
                    kind: EntryKind::from_code(row.kind)?,
                    category: row.category,
                    name: row.name,
                    value: row.value,
                    tags: by_item.remove(&row.id).unwrap_or_default(),
                    expiry: row.expiry,
                },
            })
        })
        .collect()
}
