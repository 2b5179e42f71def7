//! Ordered reads over a SQLite wallet whose storage order is scrambled.

use futures::{StreamExt, TryStreamExt};
use tempfile::tempdir;
use wt_crypto::{Entry, EntryKind, EntryTag, KdfLevel, KeyContext};
use wt_store::{
    connect, fetch_all_items, fetch_all_key_entries, fetch_pages, sorted_index, OpenMode, StoreError, StoreUri,
};

/// Key entries inserted in an order unrelated to `(category, name)`.
fn scrambled_key_entries() -> Vec<Entry> {
    [(5, "ed25519"), (1, "x25519"), (4, "ed25519"), (0, "bls12381g2"), (3, "x25519"), (2, "ed25519")]
        .into_iter()
        .map(|(n, alg)| {
            Entry::new(EntryKind::Kms, alg, format!("key{n}"), format!("secret{n}").into_bytes(), vec![
                EntryTag::plaintext("~alg", alg),
            ])
        })
        .collect()
}

async fn seed(uri: &StoreUri, entries: &[Entry]) -> KeyContext {
    let session = connect(uri, OpenMode::Destination).await.unwrap();
    let (ctx, envelope) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();
    let mut writer = session.create_profile("w1").await.unwrap();
    assert_eq!(writer.profile_name(), "w1");
    writer.store_profile_key(&envelope).await.unwrap();
    for entry in entries {
        writer.insert_entry(&ctx.encrypt_entry(entry).unwrap()).await.unwrap();
    }
    writer.commit().await.unwrap();
    session.close().await;
    ctx
}

fn sqlite_uri(path: &std::path::Path) -> StoreUri {
    format!("sqlite://{}", path.display()).parse().unwrap()
}

#[tokio::test]
async fn key_entry_stream_is_ordered_by_category_then_name() {
    let dir = tempdir().unwrap();
    let uri = sqlite_uri(&dir.path().join("w1.db"));
    let mut entries = scrambled_key_entries();
    entries.push(Entry::new(EntryKind::Item, "a", "item", b"v".to_vec(), vec![]));
    let ctx = seed(&uri, &entries).await;

    let source = connect(&uri, OpenMode::Source).await.unwrap();
    let handle = source.open_profile("w1").await.unwrap();

    let storage_order: Vec<i64> = source
        .scan_entries(&handle, EntryKind::Kms)
        .map_ok(|locator| locator.id)
        .try_collect()
        .await
        .unwrap();
    let stored: Vec<_> = fetch_all_key_entries(source.as_ref(), &handle, &ctx).try_collect().await.unwrap();
    let read_order: Vec<i64> = stored.iter().map(|s| s.id).collect();
    assert_ne!(read_order, storage_order);

    let names: Vec<(String, String)> = stored
        .iter()
        .map(|s| {
            let entry = ctx.decrypt_entry(&s.entry).unwrap();
            assert_eq!(entry.kind, EntryKind::Kms);
            (entry.category.clone(), entry.name.clone())
        })
        .collect();
    let mut expected: Vec<(String, String)> =
        scrambled_key_entries().into_iter().map(|e| (e.category.clone(), e.name.clone())).collect();
    expected.sort();
    assert_eq!(names, expected);

    let items: Vec<_> = fetch_all_items(source.as_ref(), &handle, &ctx).try_collect().await.unwrap();
    assert_eq!(items.len(), 1);

    source.close().await;
}

#[tokio::test]
async fn ordered_stream_needs_the_profile_key() {
    let dir = tempdir().unwrap();
    let uri = sqlite_uri(&dir.path().join("w1.db"));
    seed(&uri, &scrambled_key_entries()).await;
    let (other, _) = KeyContext::generate("k1", KdfLevel::Interactive).unwrap();

    let source = connect(&uri, OpenMode::Source).await.unwrap();
    let handle = source.open_profile("w1").await.unwrap();
    let err = fetch_all_key_entries(source.as_ref(), &handle, &other)
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Crypto(_)));
    source.close().await;
}

#[tokio::test]
async fn short_page_is_reported_as_a_change() {
    let dir = tempdir().unwrap();
    let uri = sqlite_uri(&dir.path().join("w1.db"));
    let ctx = seed(&uri, &scrambled_key_entries()).await;

    let source = connect(&uri, OpenMode::Source).await.unwrap();
    let handle = source.open_profile("w1").await.unwrap();
    let mut ids: Vec<i64> = sorted_index(source.as_ref(), &handle, EntryKind::Kms, &ctx)
        .await
        .unwrap()
        .iter()
        .map(|locator| locator.id)
        .collect();
    ids.push(i64::MAX);

    let pages: Vec<Result<Vec<_>, StoreError>> = fetch_pages(source.as_ref(), &handle, ids, 4).collect().await;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].as_ref().unwrap().len(), 4);
    assert!(matches!(pages[1], Err(StoreError::Changed { expected: 3, found: 2, .. })));
    source.close().await;
}
