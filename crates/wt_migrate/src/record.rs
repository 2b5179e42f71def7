//! Record Migrator: moves every record of one profile into a destination
//! writer, re-encrypted under the destination key.
//!
//! Per kind (items first, then key entries) it consumes the ordered read of
//! `wt_store::session` in two passes:
//!
//! 1. Index pass (`sorted_index`). Decrypts only category and name and sorts
//!    by `(category, name, id)`. Destination insertion order is therefore
//!    independent of source storage order.
//! 2. Transfer pass. A producer drains `fetch_pages` in index order and
//!    hands the pages over a bounded channel; the consumer decrypts one
//!    record at a time, checks it against its index slot, re-encrypts it and
//!    inserts it. Source reads and destination writes overlap, and at most
//!    `PIPELINE_DEPTH` pages are buffered.

use futures::TryStreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wt_crypto::{EntryKind, KeyContext};
use wt_store::{fetch_pages, sorted_index, ProfileHandle, ProfileWriter, SortedLocator, StorageSession, StoredEntry};

use crate::error::StageError;

/// Pages in flight between the source reader and the destination writer.
const PIPELINE_DEPTH: usize = 2;

/// Records copied into a destination profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub items: u64,
    pub key_entries: u64,
}

impl MigrationCounts {
    pub fn total(&self) -> u64 {
        self.items + self.key_entries
    }
}

pub struct RecordMigrator<'a> {
    source: &'a dyn StorageSession,
    profile: &'a ProfileHandle,
    source_key: &'a KeyContext,
    dest_key: &'a KeyContext,
    page_size: usize,
}

impl<'a> RecordMigrator<'a> {
    pub fn new(
        source: &'a dyn StorageSession,
        profile: &'a ProfileHandle,
        source_key: &'a KeyContext,
        dest_key: &'a KeyContext,
        page_size: usize,
    ) -> Self {
        Self { source, profile, source_key, dest_key, page_size: page_size.max(1) }
    }

    /// Copy all items, then all key entries. Stops at the first failure;
    /// the caller owns discarding `writer`.
    pub async fn migrate(&self, writer: &mut dyn ProfileWriter) -> Result<MigrationCounts, StageError> {
        let items = self.migrate_kind(EntryKind::Item, writer).await?;
        let key_entries = self.migrate_kind(EntryKind::Kms, writer).await?;
        let counts = MigrationCounts { items, key_entries };
        info!(
            profile = %self.profile.name,
            items = counts.items,
            key_entries = counts.key_entries,
            "records migrated"
        );
        Ok(counts)
    }

    async fn migrate_kind(&self, kind: EntryKind, writer: &mut dyn ProfileWriter) -> Result<u64, StageError> {
        let index = sorted_index(self.source, self.profile, kind, self.source_key).await?;
        debug!(profile = %self.profile.name, %kind, records = index.len(), "index pass complete");
        if index.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = index.iter().map(|slot| slot.id).collect();
        let (tx, mut rx) = mpsc::channel::<Vec<StoredEntry>>(PIPELINE_DEPTH);
        let profile = self.profile;
        let mut pages = fetch_pages(self.source, profile, ids, self.page_size);

        let producer = async move {
            let mut page_no = 0usize;
            while let Some(page) = pages.try_next().await? {
                debug!(profile = %profile.name, %kind, page = page_no, records = page.len(), "fetched page");
                if tx.send(page).await.is_err() {
                    // Consumer has stopped; its error is the one reported.
                    break;
                }
                page_no += 1;
            }
            Ok::<_, StageError>(())
        };

        let consumer = async {
            let mut migrated = 0usize;
            while let Some(page) = rx.recv().await {
                for stored in page {
                    let slot = index.get(migrated).ok_or_else(|| {
                        StageError::Integrity(format!("{kind}: more records fetched than indexed"))
                    })?;
                    self.transfer(kind, slot, &stored, writer).await?;
                    migrated += 1;
                }
            }
            Ok::<_, StageError>(migrated)
        };

        let ((), migrated) = tokio::try_join!(producer, consumer)?;
        if migrated != index.len() {
            return Err(StageError::Integrity(format!(
                "{kind}: indexed {} records but migrated {migrated}",
                index.len()
            )));
        }
        Ok(migrated as u64)
    }

    async fn transfer(
        &self,
        kind: EntryKind,
        slot: &SortedLocator,
        stored: &StoredEntry,
        writer: &mut dyn ProfileWriter,
    ) -> Result<(), StageError> {
        if stored.id != slot.id {
            return Err(StageError::Integrity(format!(
                "{kind}: expected record {} but source returned {}",
                slot.id, stored.id
            )));
        }
        let entry = self.source_key.decrypt_entry(&stored.entry)?;
        if entry.kind != kind || entry.category != *slot.category || entry.name != *slot.name {
            return Err(StageError::Integrity(format!(
                "{kind}: record {} changed between index and transfer",
                stored.id
            )));
        }
        let encrypted = self.dest_key.encrypt_entry(&entry)?;
        match kind {
            EntryKind::Item => writer.insert_item(&encrypted).await?,
            EntryKind::Kms => writer.insert_key_entry(&encrypted).await?,
        }
        Ok(())
    }
}
