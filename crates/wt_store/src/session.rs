//! Uniform storage-session contract over the physical backends.
//!
//! Source side: `list_profiles`, `open_profile`, `scan_entries`, `fetch_entries`.
//! `sorted_index` and `fetch_all_sorted` build the deterministic
//! `(category, name)` read order on top of `scan_entries` and `fetch_entries`.
//! Destination side: `create_profile` hands out a `ProfileWriter`, which stages
//! records until `commit`. Dropping a writer without committing discards it.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;
use wt_crypto::{EncryptedEntry, EntryKind, KeyContext, KeyEnvelope};
use zeroize::Zeroizing;

use crate::error::StoreError;
use crate::models::{EntryLocator, ProfileHandle, StoredEntry};
use crate::postgres::PostgresSession;
use crate::sqlite::SqliteSession;
use crate::uri::StoreUri;

/// Number of records fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Largest page a single `fetch_entries` call may request. Keeps the SQLite
/// `IN (...)` list under its bind-parameter limit.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing store, opened read-only.
    Source,
    /// Store that receives new profiles; created and migrated as needed.
    Destination,
}

#[async_trait]
pub trait StorageSession: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn list_profiles(&self) -> Result<Vec<String>, StoreError>;

    async fn open_profile(&self, name: &str) -> Result<ProfileHandle, StoreError>;

    /// Allocate a new, uncommitted profile. Fails with `DestinationExists` if
    /// a profile of that name is already present (or being created).
    async fn create_profile(&self, name: &str) -> Result<Box<dyn ProfileWriter>, StoreError>;

    /// Identifying columns of every record of `kind`, in storage order.
    fn scan_entries<'a>(
        &'a self,
        profile: &'a ProfileHandle,
        kind: EntryKind,
    ) -> BoxStream<'a, Result<EntryLocator, StoreError>>;

    /// Full records for `ids`, in the order of `ids`. Unknown ids are skipped.
    async fn fetch_entries(
        &self,
        profile: &ProfileHandle,
        ids: &[i64],
    ) -> Result<Vec<StoredEntry>, StoreError>;

    async fn close(&self);
}

/// Destination-side handle of a profile that is being populated.
#[async_trait]
pub trait ProfileWriter: Send {
    fn profile_name(&self) -> &str;

    /// Persist the wrapped store key of the new profile. Required before `commit`.
    async fn store_profile_key(&mut self, envelope: &KeyEnvelope) -> Result<(), StoreError>;

    async fn insert_entry(&mut self, entry: &EncryptedEntry) -> Result<(), StoreError>;

    async fn insert_item(&mut self, entry: &EncryptedEntry) -> Result<(), StoreError> {
        debug_assert_eq!(entry.kind, EntryKind::Item);
        self.insert_entry(entry).await
    }

    async fn insert_key_entry(&mut self, entry: &EncryptedEntry) -> Result<(), StoreError> {
        debug_assert_eq!(entry.kind, EntryKind::Kms);
        self.insert_entry(entry).await
    }

    /// Make the profile visible to readers.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Drop everything written so far.
    async fn discard(self: Box<Self>) -> Result<(), StoreError>;
}

/// Connect to the store behind `uri`.
pub async fn connect(uri: &StoreUri, mode: OpenMode) -> Result<Box<dyn StorageSession>, StoreError> {
    debug!(uri = %uri, ?mode, "connecting to store");
    match uri {
        StoreUri::Sqlite { path } => Ok(Box::new(SqliteSession::open(path, mode).await?)),
        StoreUri::Postgres { url } => Ok(Box::new(PostgresSession::open(url, mode).await?)),
    }
}

/// Opens sessions for orchestrators. Lets tests substitute backends.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &StoreUri, mode: OpenMode) -> Result<Box<dyn StorageSession>, StoreError>;
}

/// The production connector: scheme decides the adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backends;

#[async_trait]
impl Connector for Backends {
    async fn connect(&self, uri: &StoreUri, mode: OpenMode) -> Result<Box<dyn StorageSession>, StoreError> {
        connect(uri, mode).await
    }
}

/// A record located by the index pass, with its identity decrypted.
pub struct SortedLocator {
    pub id: i64,
    pub category: Zeroizing<String>,
    pub name: Zeroizing<String>,
}

/// Index pass: every record of `kind` ordered by `(category, name, id)`.
///
/// Only the identifying columns are decrypted, so ordering over encrypted
/// columns costs one scan and no full-record reads.
pub async fn sorted_index(
    session: &dyn StorageSession,
    profile: &ProfileHandle,
    kind: EntryKind,
    key: &KeyContext,
) -> Result<Vec<SortedLocator>, StoreError> {
    let mut locators = session.scan_entries(profile, kind);
    let mut index = Vec::new();
    while let Some(locator) = locators.try_next().await? {
        let (category, name) = key.decrypt_identity(&locator.category, &locator.name)?;
        index.push(SortedLocator { id: locator.id, category, name });
    }
    index.sort_by(|a, b| {
        (a.category.as_str(), a.name.as_str(), a.id).cmp(&(b.category.as_str(), b.name.as_str(), b.id))
    });
    Ok(index)
}

/// Full records for `ids`, one page at a time, in the order of `ids`.
///
/// Fails with `Changed` if a page comes back short, i.e. a record vanished
/// after it was indexed.
pub fn fetch_pages<'a>(
    session: &'a dyn StorageSession,
    profile: &'a ProfileHandle,
    ids: Vec<i64>,
    page_size: usize,
) -> BoxStream<'a, Result<Vec<StoredEntry>, StoreError>> {
    let pages: Vec<Vec<i64>> = ids.chunks(page_size.clamp(1, MAX_PAGE_SIZE)).map(<[i64]>::to_vec).collect();
    stream::iter(pages)
        .then(move |chunk| async move {
            let page = session.fetch_entries(profile, &chunk).await?;
            if page.len() != chunk.len() {
                return Err(StoreError::Changed {
                    profile: profile.name.clone(),
                    expected: chunk.len(),
                    found: page.len(),
                });
            }
            Ok(page)
        })
        .boxed()
}

/// Every record of `kind` ordered by category then name, fetched lazily
/// page by page after the index pass.
pub fn fetch_all_sorted<'a>(
    session: &'a dyn StorageSession,
    profile: &'a ProfileHandle,
    kind: EntryKind,
    key: &'a KeyContext,
    page_size: usize,
) -> BoxStream<'a, Result<StoredEntry, StoreError>> {
    stream::once(sorted_index(session, profile, kind, key))
        .map_ok(move |index| {
            let ids = index.iter().map(|locator| locator.id).collect();
            fetch_pages(session, profile, ids, page_size)
        })
        .try_flatten()
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
        .try_flatten()
        .boxed()
}

pub fn fetch_all_items<'a>(
    session: &'a dyn StorageSession,
    profile: &'a ProfileHandle,
    key: &'a KeyContext,
) -> BoxStream<'a, Result<StoredEntry, StoreError>> {
    fetch_all_sorted(session, profile, EntryKind::Item, key, DEFAULT_PAGE_SIZE)
}

pub fn fetch_all_key_entries<'a>(
    session: &'a dyn StorageSession,
    profile: &'a ProfileHandle,
    key: &'a KeyContext,
) -> BoxStream<'a, Result<StoredEntry, StoreError>> {
    fetch_all_sorted(session, profile, EntryKind::Kms, key, DEFAULT_PAGE_SIZE)
}
