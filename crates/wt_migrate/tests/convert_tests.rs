//! Multi-wallet conversion: SQLite database-per-wallet sources into the
//! in-memory multi-tenant store (`testing` feature of wt_store).

mod common;

use common::*;
use tempfile::tempdir;
use wt_crypto::CryptoError;
use wt_migrate::{CollisionPolicy, MigrateError, MultiWalletConverter, Stage, WalletOutcome};
use wt_store::memory::{MemoryConnector, MemoryStore};
use wt_store::StorageSession;

const W1: &str = "multitenant_sub_wallet_w1";
const W2: &str = "multitenant_sub_wallet_w2";

#[tokio::test]
async fn reference_scenario_converts_both_wallets() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &w2_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1"), ("w2", "k2")]);
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(store.list_profiles().await.unwrap(), vec![W1.to_string(), W2.to_string()]);
    assert_eq!(read_profile(&store, W1, "k1").await.unwrap(), w1_entries());
    assert_eq!(read_profile(&store, W2, "k2").await.unwrap(), w2_entries());

    // Each sub-wallet opens only with its own wallet's passphrase.
    assert!(matches!(read_profile(&store, W1, "k2").await, Err(CryptoError::Authentication)));
    assert!(matches!(read_profile(&store, W2, "k1").await, Err(CryptoError::Authentication)));
}

#[tokio::test]
async fn custom_sub_wallet_base() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let mut cfg = convert_config(dir.path(), &[("w1", "k1")]);
    cfg.sub_wallet_base = "tenant".into();
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.wallet("w1").unwrap().profile, "tenant_w1");
    assert_eq!(store.entry_count("tenant_w1"), Some(2));
}

#[tokio::test]
async fn failed_insert_leaves_no_partial_profile() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &scrambled_items(5)).await;

    let store = MemoryStore::new();
    store.fail_after_inserts(3);
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1")]);
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    match &report.wallet("w1").unwrap().outcome {
        WalletOutcome::Failed { stage, cause, retryable, .. } => {
            assert_eq!(*stage, Stage::Migrate);
            assert_eq!(*cause, "storage");
            assert!(retryable);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(store.entry_count(W1), None);
    assert!(store.list_profiles().await.unwrap().is_empty());
}

#[tokio::test]
async fn rerun_after_failure_completes_and_keeps_committed_wallets() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &scrambled_items(6)).await;

    let store = MemoryStore::new();
    // w1 needs two inserts; w2 fails on its fourth.
    store.fail_after_inserts(5);
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1"), ("w2", "k2")]);

    let first = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();
    assert!(first.wallet("w1").unwrap().is_done());
    assert_eq!(first.wallet("w2").unwrap().cause(), Some("storage"));
    assert_eq!(store.entry_count(W2), None);

    store.clear_fault();
    let second = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();
    assert_eq!(second.wallet("w1").unwrap().cause(), Some("destination_exists"));
    assert!(second.wallet("w2").unwrap().is_done());

    assert_eq!(read_profile(&store, W1, "k1").await.unwrap(), w1_entries());
    assert_eq!(store.entry_count(W2), Some(6));

    // A third run changes nothing.
    let third = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();
    assert_eq!(third.failures().count(), 2);
    assert_eq!(store.entry_count(W1), Some(2));
    assert_eq!(store.entry_count(W2), Some(6));
}

#[tokio::test]
async fn collision_continues_with_remaining_wallets_by_default() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &w2_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1"), ("w1", "k1"), ("w2", "k2")]);
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(report.wallets[0].is_done());
    assert!(matches!(
        report.wallets[1].outcome,
        WalletOutcome::Failed { stage: Stage::CreateDest, cause: "destination_exists", .. }
    ));
    assert!(report.wallets[2].is_done());
    assert_eq!(read_profile(&store, W1, "k1").await.unwrap(), w1_entries());
}

#[tokio::test]
async fn abort_policy_stops_at_first_collision() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &w2_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let mut cfg = convert_config(dir.path(), &[("w1", "k1"), ("w1", "k1"), ("w2", "k2")]);
    cfg.on_collision = CollisionPolicy::Abort;
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(report.wallets[0].is_done());
    assert_eq!(report.wallets[1].cause(), Some("destination_exists"));
    assert_eq!(report.wallets[2].outcome, WalletOutcome::Skipped);
    assert_eq!(store.list_profiles().await.unwrap(), vec![W1.to_string()]);
}

#[tokio::test]
async fn abort_policy_ignores_failures_other_than_collisions() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &w2_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let mut cfg = convert_config(dir.path(), &[("w1", "wrong"), ("ghost", "k1"), ("w2", "k2")]);
    cfg.on_collision = CollisionPolicy::Abort;
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert_eq!(report.wallets[0].cause(), Some("authentication"));
    assert_eq!(report.wallets[1].cause(), Some("connection"));
    assert!(report.wallets[2].is_done());
    assert_eq!(store.list_profiles().await.unwrap(), vec![W2.to_string()]);
}

#[tokio::test]
async fn wrong_passphrase_only_fails_that_wallet() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    seed_wallet(dir.path(), "w2", "k2", &w2_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k2"), ("w2", "k2")]);
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(matches!(
        report.wallet("w1").unwrap().outcome,
        WalletOutcome::Failed { stage: Stage::UnwrapSourceKey, cause: "authentication", .. }
    ));
    assert!(report.wallet("w2").unwrap().is_done());
    assert_eq!(store.entry_count(W1), None);
    assert!(matches!(report.into_result(), Err(MigrateError::Incomplete { failed: 1, total: 2 })));
}

#[tokio::test]
async fn missing_wallet_store_is_reported() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("ghost", "k1"), ("w1", "k1")]);
    let report = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap();

    assert!(matches!(
        report.wallet("ghost").unwrap().outcome,
        WalletOutcome::Failed { stage: Stage::OpenSource, cause: "connection", .. }
    ));
    assert!(report.wallet("w1").unwrap().is_done());
}

#[tokio::test]
async fn sub_wallets_are_written_in_sorted_order() {
    let dir = tempdir().unwrap();
    let items = scrambled_items(10);
    seed_wallet(dir.path(), "w1", "k1", &items).await;

    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1")]);
    assert!(MultiWalletConverter::new(&cfg, &connector).run().await.unwrap().is_success());

    let copied = read_profile(&store, W1, "k1").await.unwrap();
    let mut expected = items.clone();
    expected.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
    assert_eq!(copied, expected);
}

#[tokio::test]
async fn invalid_configuration_touches_nothing() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());

    let cfg = convert_config(dir.path(), &[]);
    let err = MultiWalletConverter::new(&cfg, &connector).run().await.unwrap_err();
    assert!(matches!(err, MigrateError::Config(_)));

    let cfg = convert_config(dir.path(), &[("w1", "")]);
    assert!(MultiWalletConverter::new(&cfg, &connector).run().await.is_err());
    assert!(store.list_profiles().await.unwrap().is_empty());
}

#[tokio::test]
async fn run_dispatches_on_strategy() {
    let dir = tempdir().unwrap();
    seed_wallet(dir.path(), "w1", "k1", &w1_entries()).await;
    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    let cfg = convert_config(dir.path(), &[("w1", "k1")]);

    let report = wt_migrate::run(&cfg, &connector).await.unwrap();
    assert!(report.is_success());
    assert_eq!(store.entry_count(W1), Some(2));
}
