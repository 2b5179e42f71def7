//! Fixtures shared by the migration tests: seeded database-per-wallet SQLite
//! stores and helpers to read a migrated profile back.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use wt_crypto::{CryptoError, EncryptedEntry, Entry, EntryKind, EntryTag, KdfLevel, KeyContext};
use wt_migrate::{MigrationConfig, Strategy};
use wt_store::{connect, fetch_pages, OpenMode, StorageSession, StoreUri};

pub const KDF: KdfLevel = KdfLevel::Interactive;

pub fn sqlite_uri(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

/// Store file of `wallet` under a database-per-wallet root.
pub fn wallet_path(root: &Path, wallet: &str) -> PathBuf {
    root.join(wallet).join("sqlite.db")
}

/// Create a single-profile SQLite store at `path` holding `entries`.
pub async fn seed_store(path: &Path, profile: &str, key: &str, entries: &[Entry]) {
    let (ctx, _) = seed_with(path, profile, key, |ctx| {
        entries.iter().map(|e| ctx.encrypt_entry(e).unwrap()).collect()
    })
    .await;
    drop(ctx);
}

/// Like `seed_store`, but the caller produces the encrypted rows, which
/// lets a test plant records the profile key cannot open.
pub async fn seed_with<F>(path: &Path, profile: &str, key: &str, rows: F) -> (KeyContext, usize)
where
    F: FnOnce(&KeyContext) -> Vec<EncryptedEntry>,
{
    let uri = StoreUri::Sqlite { path: path.to_path_buf() };
    let session = connect(&uri, OpenMode::Destination).await.unwrap();
    let mut writer = session.create_profile(profile).await.unwrap();
    let (ctx, envelope) = KeyContext::generate(key, KDF).unwrap();
    writer.store_profile_key(&envelope).await.unwrap();
    let rows = rows(&ctx);
    for row in &rows {
        writer.insert_entry(row).await.unwrap();
    }
    writer.commit().await.unwrap();
    session.close().await;
    (ctx, rows.len())
}

pub async fn seed_wallet(root: &Path, wallet: &str, key: &str, entries: &[Entry]) -> PathBuf {
    let path = wallet_path(root, wallet);
    seed_store(&path, wallet, key, entries).await;
    path
}

/// Every record of `profile`, items first, in destination storage order.
pub async fn read_profile(
    session: &dyn StorageSession,
    profile: &str,
    key: &str,
) -> Result<Vec<Entry>, CryptoError> {
    let handle = session.open_profile(profile).await.unwrap();
    let ctx = KeyContext::unlock(key, &handle.key_method, &handle.wrapped_key)?;
    let mut out = Vec::new();
    for kind in [EntryKind::Item, EntryKind::Kms] {
        let ids: Vec<i64> = session
            .scan_entries(&handle, kind)
            .map_ok(|locator| locator.id)
            .try_collect()
            .await
            .unwrap();
        let pages: Vec<_> = fetch_pages(session, &handle, ids, 2).try_collect().await.unwrap();
        for s in pages.into_iter().flatten() {
            out.push(ctx.decrypt_entry(&s.entry)?);
        }
    }
    Ok(out)
}

pub async fn read_sqlite_profile(path: &Path, profile: &str, key: &str) -> Result<Vec<Entry>, CryptoError> {
    let session = connect(&StoreUri::Sqlite { path: path.to_path_buf() }, OpenMode::Source)
        .await
        .unwrap();
    let entries = read_profile(session.as_ref(), profile, key).await;
    session.close().await;
    entries
}

/// Wallet `w1` of the reference scenario: two items, one of them tagged.
pub fn w1_entries() -> Vec<Entry> {
    vec![
        Entry::new(EntryKind::Item, "a", "x", b"v1".to_vec(), vec![EntryTag::encrypted("t", "1")]),
        Entry::new(EntryKind::Item, "b", "y", b"v2".to_vec(), vec![]),
    ]
}

/// Wallet `w2`: a key entry with a plaintext tag and an expiring item.
pub fn w2_entries() -> Vec<Entry> {
    let mut credential = Entry::new(
        EntryKind::Item,
        "credential",
        "cred-1",
        br#"{"schema":"degree"}"#.to_vec(),
        vec![EntryTag::plaintext("~state", "issued"), EntryTag::encrypted("schema_id", "degree:1.0")],
    );
    credential.expiry = Some(Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap());
    vec![
        credential,
        Entry::new(
            EntryKind::Kms,
            "ed25519",
            "did:sov:w2",
            vec![7u8; 32],
            vec![EntryTag::plaintext("~verkey", "w2verkey")],
        ),
    ]
}

/// `count` items named so that storage order and sorted order differ.
pub fn scrambled_items(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let n = (i * 7 + 3) % count;
            Entry::new(EntryKind::Item, format!("cat{}", n % 3), format!("name{n:03}"), vec![n as u8], vec![])
        })
        .collect()
}

pub fn export_config(source: &Path, dest: &Path, wallet: &str, key: &str) -> MigrationConfig {
    let mut cfg = MigrationConfig::new(Strategy::Export, &sqlite_uri(source), &sqlite_uri(dest))
        .unwrap()
        .with_wallet(wallet, key);
    cfg.kdf_level = KDF;
    cfg.page_size = 2;
    cfg
}

pub fn convert_config(root: &Path, wallets: &[(&str, &str)]) -> MigrationConfig {
    let mut cfg = MigrationConfig::new(Strategy::MultiWalletConvert, &sqlite_uri(root), "postgres://localhost/mt")
        .unwrap();
    for (name, key) in wallets {
        cfg = cfg.with_wallet(*name, *key);
    }
    cfg.kdf_level = KDF;
    cfg.page_size = 2;
    cfg
}
