//! wt_store: storage sessions over encrypted wallet stores
//!
//! # Topologies
//! - SQLite (`sqlite://`): database-per-wallet, one file holds one profile.
//! - Postgres (`postgres://`): multi-tenant, one database holds many profiles
//!   keyed by name.
//!
//! Both adapters persist the same logical schema (`migrations/`), store only
//! ciphertext produced by `wt_crypto`, and expose the `StorageSession` /
//! `ProfileWriter` contract so migration logic never branches on backend.
//!
//! # Migration
//! SQLx migrations are applied to destination stores only; source stores are
//! opened read-only.

pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod models;
pub mod postgres;
pub mod session;
pub mod sqlite;
pub mod uri;

pub use error::StoreError;
pub use models::{EntryLocator, ProfileHandle, StoredEntry};
pub use session::{
    connect, fetch_all_items, fetch_all_key_entries, fetch_all_sorted, fetch_pages, sorted_index,
    Backends, Connector, OpenMode, ProfileWriter, SortedLocator, StorageSession, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use uri::StoreUri;
