//! Multi-tenant adapter: one Postgres database holds many profiles, kept apart
//! by the `profile_id` column shared by the item and tag tables.
//!
//! A new profile lives inside one transaction from `create_profile` until
//! `commit`. The `UNIQUE(name)` constraint on `profiles` makes the name check
//! atomic: a concurrent creator of the same name blocks on the index and then
//! fails with a unique violation, reported as `DestinationExists`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use url::Url;
use wt_crypto::{EncryptedEntry, EntryKind, KeyEnvelope, TagKind};

use crate::error::StoreError;
use crate::models::{
    assemble_page, EntryLocator, ItemRow, LocatorRow, ProfileHandle, ProfileRow, StoredEntry, TagRow,
};
use crate::session::{OpenMode, ProfileWriter, StorageSession};
use crate::sqlite::order_by_ids;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

const SCHEMA_VERSION: &str = "1";

pub struct PostgresSession {
    display_uri: String,
    mode: OpenMode,
    pool: PgPool,
}

impl PostgresSession {
    pub async fn open(url: &Url, mode: OpenMode) -> Result<Self, StoreError> {
        let mut display = url.clone();
        if display.password().is_some() {
            let _ = display.set_password(Some("***"));
        }
        let display_uri = display.to_string();

        let opts = PgConnectOptions::from_str(url.as_str())
            .map_err(|e| StoreError::InvalidUri(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(opts)
            .await
            .map_err(|source| StoreError::Connection { uri: display_uri.clone(), source })?;

        if mode == OpenMode::Destination {
            MIGRATOR
                .run(&pool)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
            sqlx::query("INSERT INTO config (name, value) VALUES ('version', $1) ON CONFLICT (name) DO NOTHING")
                .bind(SCHEMA_VERSION)
                .execute(&pool)
                .await?;
        }

        Ok(Self { display_uri, mode, pool })
    }
}

#[async_trait]
impl StorageSession for PostgresSession {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn list_profiles(&self) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM profiles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn open_profile(&self, name: &str) -> Result<ProfileHandle, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, name, key_method, profile_key FROM profiles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::ProfileNotFound(name.to_string()))?
            .try_into()
    }

    async fn create_profile(&self, name: &str) -> Result<Box<dyn ProfileWriter>, StoreError> {
        if self.mode != OpenMode::Destination {
            return Err(StoreError::ReadOnly(self.display_uri.clone()));
        }
        let mut tx = self.pool.begin().await?;
        let profile_id: i64 = sqlx::query_scalar(
            "INSERT INTO profiles (name, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::on_profile_insert(e, name))?;

        debug!(profile = name, profile_id, "allocated postgres profile");
        Ok(Box::new(PostgresProfileWriter {
            name: name.to_string(),
            profile_id,
            tx: Some(tx),
            has_key: false,
        }))
    }

    fn scan_entries<'a>(
        &'a self,
        profile: &'a ProfileHandle,
        kind: EntryKind,
    ) -> BoxStream<'a, Result<EntryLocator, StoreError>> {
        sqlx::query_as::<_, LocatorRow>(
            "SELECT id, kind, category, name FROM items WHERE profile_id = $1 AND kind = $2 ORDER BY id",
        )
        .bind(profile.id)
        .bind(kind.code() as i64)
        .fetch(&self.pool)
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
        let mut items: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, kind, category, name, value, expiry FROM items WHERE profile_id = $1 AND id = ANY($2)",
        )
        .bind(profile.id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let tags: Vec<TagRow> = sqlx::query_as(
            "SELECT item_id, name, value, plaintext FROM items_tags WHERE item_id = ANY($1) ORDER BY item_id, id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        order_by_ids(&mut items, ids);
        assemble_page(items, tags)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct PostgresProfileWriter {
    name: String,
    profile_id: i64,
    /// Dropping the transaction rolls the profile back.
    tx: Option<Transaction<'static, Postgres>>,
    has_key: bool,
}

impl PostgresProfileWriter {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::ReadOnly(format!("profile '{}' is closed", self.name)))
    }
}

#[async_trait]
impl ProfileWriter for PostgresProfileWriter {
    fn profile_name(&self) -> &str {
        &self.name
    }

    async fn store_profile_key(&mut self, envelope: &KeyEnvelope) -> Result<(), StoreError> {
        let profile_id = self.profile_id;
        let tx = self.tx()?;
        sqlx::query("UPDATE profiles SET key_method = $1, profile_key = $2 WHERE id = $3")
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

        let item_id: i64 = sqlx::query_scalar(
            "INSERT INTO items (profile_id, kind, category, name, value, expiry) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(profile_id)
        .bind(entry.kind.code() as i64)
        .bind(entry.category.as_slice())
        .bind(entry.name.as_slice())
        .bind(entry.value.as_slice())
        .bind(entry.expiry)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::on_insert(e, &name, entry.kind))?;

        for tag in &entry.tags {
            sqlx::query("INSERT INTO items_tags (item_id, name, value, plaintext) VALUES ($1, $2, $3, $4)")
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
        info!(profile = %self.name, profile_id = self.profile_id, "committed postgres profile");
        Ok(())
    }

    async fn discard(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        debug!(profile = %self.name, "rolled back postgres profile");
        Ok(())
    }
}
