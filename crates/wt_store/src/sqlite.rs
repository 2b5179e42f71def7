//! Single-tenant adapter: one SQLite file holds exactly one profile.
//!
//! A new destination store is built in a staging file next to the target
//! (`<file>.staging-<uuid>`) inside one transaction. `commit` publishes it with
//! a hard link, which fails instead of clobbering a file that appeared in the
//! meantime; `discard` and `Drop` remove the staging file. Readers never see a
//! half-written store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wt_crypto::{EncryptedEntry, EntryKind, KeyEnvelope, TagKind};

use crate::error::StoreError;
use crate::models::{
    assemble_page, EntryLocator, ItemRow, LocatorRow, ProfileHandle, ProfileRow, StoredEntry, TagRow,
};
use crate::session::{OpenMode, ProfileWriter, StorageSession};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

pub const SCHEMA_VERSION: &str = "1";

pub struct SqliteSession {
    path: PathBuf,
    mode: OpenMode,
    /// `None` for a destination whose file does not exist yet.
    pool: Option<SqlitePool>,
}

impl SqliteSession {
    /// Open the store at `path`.
    ///
    /// Source stores must exist and are opened read-only. A destination path may
    /// be missing; the file is only created by `create_profile`.
    pub async fn open(path: &Path, mode: OpenMode) -> Result<Self, StoreError> {
        let pool = match mode {
            OpenMode::Source => Some(Self::connect_read_only(path).await?),
            OpenMode::Destination if path.exists() => Some(Self::connect_read_only(path).await?),
            OpenMode::Destination => None,
        };
        Ok(Self { path: path.to_path_buf(), mode, pool })
    }

    async fn connect_read_only(path: &Path) -> Result<SqlitePool, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);
        SqlitePool::connect_with(opts)
            .await
            .map_err(|source| StoreError::Connection {
                uri: format!("sqlite://{}", path.display()),
                source,
            })
    }

    fn staging_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wallet.db".to_string());
        self.path
            .with_file_name(format!("{file_name}.staging-{}", Uuid::new_v4().simple()))
    }

    fn pool_for(&self, profile: &str) -> Result<&SqlitePool, StoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| StoreError::ProfileNotFound(profile.to_string()))
    }
}

#[async_trait]
impl StorageSession for SqliteSession {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list_profiles(&self) -> Result<Vec<String>, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM profiles ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(names)
    }

    async fn open_profile(&self, name: &str) -> Result<ProfileHandle, StoreError> {
        let pool = self.pool_for(name)?;
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, name, key_method, profile_key FROM profiles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;
        row.ok_or_else(|| StoreError::ProfileNotFound(name.to_string()))?
            .try_into()
    }

    async fn create_profile(&self, name: &str) -> Result<Box<dyn ProfileWriter>, StoreError> {
        if self.mode != OpenMode::Destination {
            return Err(StoreError::ReadOnly(format!("sqlite://{}", self.path.display())));
        }
        // One file, one profile: an existing file is always a collision.
        if self.path.exists() {
            return Err(StoreError::DestinationExists(name.to_string()));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging_path = self.staging_path();
        // Journal mode is fixed at connection time; sqlx runs each migration
        // inside a transaction, where SQLite refuses to change it.
        let opts = SqliteConnectOptions::new()
            .filename(&staging_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|source| StoreError::Connection {
                uri: format!("sqlite://{}", staging_path.display()),
                source,
            })?;

        let mut writer = SqliteProfileWriter {
            name: name.to_string(),
            profile_id: 0,
            final_path: self.path.clone(),
            staging_path,
            pool,
            tx: None,
            has_key: false,
            finished: false,
        };

        MIGRATOR
            .run(&writer.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let mut tx = writer.pool.begin().await?;
        sqlx::query("INSERT INTO config (name, value) VALUES ('version', ?), ('default_profile', ?)")
            .bind(SCHEMA_VERSION)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        writer.profile_id = sqlx::query("INSERT INTO profiles (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::on_profile_insert(e, name))?
            .last_insert_rowid();
        writer.tx = Some(tx);

        debug!(profile = name, staging = %writer.staging_path.display(), "staged sqlite profile");
        Ok(Box::new(writer))
    }

    fn scan_entries<'a>(
        &'a self,
        profile: &'a ProfileHandle,
        kind: EntryKind,
    ) -> BoxStream<'a, Result<EntryLocator, StoreError>> {
        let pool = match self.pool_for(&profile.name) {
            Ok(pool) => pool,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };
        sqlx::query_as::<_, LocatorRow>(
            "SELECT id, kind, category, name FROM items WHERE profile_id = ? AND kind = ? ORDER BY id",
        )
        .bind(profile.id)
        .bind(kind.code() as i64)
        .fetch(pool)
        .map_err(StoreError::from)
        .and_then(|row| future::ready(EntryLocator::try_from(row)))
        .boxed()
    }

    async fn fetch_entries(
        &self,
        profile: &ProfileHandle,
        ids: &[i64],
    ) -> Result<Vec<StoredEntry>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool_for(&profile.name)?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, kind, category, name, value, expiry FROM items WHERE profile_id = ",
        );
        qb.push_bind(profile.id);
        qb.push(" AND id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");
        let mut items: Vec<ItemRow> = qb.build_query_as().fetch_all(pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT item_id, name, value, plaintext FROM items_tags WHERE item_id IN (",
        );
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(") ORDER BY item_id, id");
        let tags: Vec<TagRow> = qb.build_query_as().fetch_all(pool).await?;

        order_by_ids(&mut items, ids);
        assemble_page(items, tags)
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn journal_path(db: &Path) -> PathBuf {
    let mut name = db.as_os_str().to_owned();
    name.push("-journal");
    PathBuf::from(name)
}

pub(crate) fn order_by_ids(items: &mut [ItemRow], ids: &[i64]) {
    let position: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    items.sort_by_key(|row| position.get(&row.id).copied().unwrap_or(usize::MAX));
}

pub struct SqliteProfileWriter {
    name: String,
    profile_id: i64,
    final_path: PathBuf,
    staging_path: PathBuf,
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    has_key: bool,
    finished: bool,
}

impl SqliteProfileWriter {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::ReadOnly(format!("profile '{}' is closed", self.name)))
    }

    async fn remove_staging(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.staging_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ProfileWriter for SqliteProfileWriter {
    fn profile_name(&self) -> &str {
        &self.name
    }

    async fn store_profile_key(&mut self, envelope: &KeyEnvelope) -> Result<(), StoreError> {
        let profile_id = self.profile_id;
        let tx = self.tx()?;
        sqlx::query("UPDATE profiles SET key_method = ?, profile_key = ? WHERE id = ?")
            .bind(envelope.key_method.as_str())
            .bind(envelope.wrapped_key.as_slice())
            .bind(profile_id)
            .execute(&mut **tx)
            .await?;
        self.has_key = true;
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &EncryptedEntry) -> Result<(), StoreError> {
        let profile_id = self.profile_id;
        let name = self.name.clone();
        let tx = self.tx()?;

        let item_id = sqlx::query(
            "INSERT INTO items (profile_id, kind, category, name, value, expiry) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(profile_id)
        .bind(entry.kind.code() as i64)
        .bind(entry.category.as_slice())
        .bind(entry.name.as_slice())
        .bind(entry.value.as_slice())
        .bind(entry.expiry)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::on_insert(e, &name, entry.kind))?
        .last_insert_rowid();

        for tag in &entry.tags {
            sqlx::query("INSERT INTO items_tags (item_id, name, value, plaintext) VALUES (?, ?, ?, ?)")
                .bind(item_id)
                .bind(tag.name.as_slice())
                .bind(tag.value.as_slice())
                .bind(tag.kind == TagKind::Plaintext)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if !self.has_key {
            return Err(StoreError::MissingProfileKey(self.name.clone()));
        }
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        self.pool.close().await;

        // hard_link refuses to overwrite, unlike rename.
        match tokio::fs::hard_link(&self.staging_path, &self.final_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::DestinationExists(self.name.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        self.remove_staging().await?;
        self.finished = true;
        info!(profile = %self.name, path = %self.final_path.display(), "committed sqlite profile");
        Ok(())
    }

    async fn discard(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        self.pool.close().await;
        self.remove_staging().await?;
        self.finished = true;
        debug!(profile = %self.name, "discarded staged sqlite profile");
        Ok(())
    }
}

impl Drop for SqliteProfileWriter {
    fn drop(&mut self) {
        if !self.finished {
            warn!(profile = %self.name, "sqlite profile dropped before commit; removing staging file");
            let _ = std::fs::remove_file(&self.staging_path);
            let _ = std::fs::remove_file(journal_path(&self.staging_path));
        }
    }
}
