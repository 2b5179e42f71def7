//! In-memory multi-tenant store for tests (`testing` feature).
//!
//! Mirrors the Postgres adapter's semantics: many named profiles, staged
//! writers that become visible only on commit, names reserved while a writer
//! is open. `fail_after_inserts` injects a backend failure mid-migration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use wt_crypto::{EncryptedEntry, EntryKind, KeyEnvelope};

use crate::error::StoreError;
use crate::models::{EntryLocator, ProfileHandle, StoredEntry};
use crate::session::{connect, Connector, OpenMode, ProfileWriter, StorageSession};
use crate::uri::StoreUri;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    profiles: BTreeMap<String, MemoryProfile>,
    reserved: HashSet<String>,
    fail_after: Option<usize>,
    inserts: usize,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

struct MemoryProfile {
    id: i64,
    key_method: String,
    wrapped_key: Vec<u8>,
    entries: Vec<StoredEntry>,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert after the next `n` fail with an I/O error.
    pub fn fail_after_inserts(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_after = Some(n);
        state.inserts = 0;
    }

    pub fn clear_fault(&self) {
        self.state.lock().fail_after = None;
    }

    /// Number of committed records (all kinds) in `profile`, if it exists.
    pub fn entry_count(&self, profile: &str) -> Option<usize> {
        self.state.lock().profiles.get(profile).map(|p| p.entries.len())
    }
}

#[async_trait]
impl StorageSession for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list_profiles(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock();
        let mut profiles: Vec<(i64, String)> =
            state.profiles.iter().map(|(name, p)| (p.id, name.clone())).collect();
        profiles.sort();
        Ok(profiles.into_iter().map(|(_, name)| name).collect())
    }

    async fn open_profile(&self, name: &str) -> Result<ProfileHandle, StoreError> {
        let state = self.state.lock();
        let profile = state
            .profiles
            .get(name)
            .ok_or_else(|| StoreError::ProfileNotFound(name.to_string()))?;
        Ok(ProfileHandle {
            id: profile.id,
            name: name.to_string(),
            key_method: profile.key_method.clone(),
            wrapped_key: profile.wrapped_key.clone(),
        })
    }

    async fn create_profile(&self, name: &str) -> Result<Box<dyn ProfileWriter>, StoreError> {
        let mut state = self.state.lock();
        if state.profiles.contains_key(name) || !state.reserved.insert(name.to_string()) {
            return Err(StoreError::DestinationExists(name.to_string()));
        }
        let profile_id = state.allocate_id();
        Ok(Box::new(MemoryProfileWriter {
            store: self.clone(),
            name: name.to_string(),
            profile_id,
            envelope: None,
            staged: Vec::new(),
            finished: false,
        }))
    }

    fn scan_entries<'a>(
        &'a self,
        profile: &'a ProfileHandle,
        kind: EntryKind,
    ) -> BoxStream<'a, Result<EntryLocator, StoreError>> {
        let state = self.state.lock();
        let locators: Vec<Result<EntryLocator, StoreError>> = match state.profiles.get(&profile.name) {
            Some(p) => p
                .entries
                .iter()
                .filter(|s| s.entry.kind == kind)
                .map(|s| {
                    Ok(EntryLocator {
                        id: s.id,
                        kind,
                        category: s.entry.category.clone(),
                        name: s.entry.name.clone(),
                    })
                })
                .collect(),
            None => vec![Err(StoreError::ProfileNotFound(profile.name.clone()))],
        };
        stream::iter(locators).boxed()
    }

    async fn fetch_entries(
        &self,
        profile: &ProfileHandle,
        ids: &[i64],
    ) -> Result<Vec<StoredEntry>, StoreError> {
        let state = self.state.lock();
        let p = state
            .profiles
            .get(&profile.name)
            .ok_or_else(|| StoreError::ProfileNotFound(profile.name.clone()))?;
        let by_id: HashMap<i64, &StoredEntry> = p.entries.iter().map(|s| (s.id, s)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id).map(|s| (*s).clone())).collect())
    }

    async fn close(&self) {}
}

struct MemoryProfileWriter {
    store: MemoryStore,
    name: String,
    profile_id: i64,
    envelope: Option<KeyEnvelope>,
    staged: Vec<StoredEntry>,
    finished: bool,
}

#[async_trait]
impl ProfileWriter for MemoryProfileWriter {
    fn profile_name(&self) -> &str {
        &self.name
    }

    async fn store_profile_key(&mut self, envelope: &KeyEnvelope) -> Result<(), StoreError> {
        self.envelope = Some(envelope.clone());
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &EncryptedEntry) -> Result<(), StoreError> {
        let id = {
            let mut state = self.store.state.lock();
            if let Some(limit) = state.fail_after {
                if state.inserts >= limit {
                    return Err(StoreError::Io(std::io::Error::other("injected insert failure")));
                }
            }
            state.inserts += 1;
            state.allocate_id()
        };
        let duplicate = self.staged.iter().any(|s| {
            s.entry.kind == entry.kind && s.entry.category == entry.category && s.entry.name == entry.name
        });
        if duplicate {
            return Err(StoreError::Duplicate { profile: self.name.clone(), kind: entry.kind });
        }
        self.staged.push(StoredEntry { id, entry: entry.clone() });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let envelope = self
            .envelope
            .take()
            .ok_or_else(|| StoreError::MissingProfileKey(self.name.clone()))?;
        let mut state = self.store.state.lock();
        state.reserved.remove(&self.name);
        state.profiles.insert(
            self.name.clone(),
            MemoryProfile {
                id: self.profile_id,
                key_method: envelope.key_method,
                wrapped_key: envelope.wrapped_key,
                entries: std::mem::take(&mut self.staged),
            },
        );
        drop(state);
        self.finished = true;
        Ok(())
    }

    async fn discard(mut self: Box<Self>) -> Result<(), StoreError> {
        self.store.state.lock().reserved.remove(&self.name);
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryProfileWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.store.state.lock().reserved.remove(&self.name);
        }
    }
}

/// Connector that routes destination sessions (and any registered source URIs)
/// to in-memory stores; other sources go to the real backends.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    destination: MemoryStore,
    sources: HashMap<String, MemoryStore>,
}

impl MemoryConnector {
    pub fn new(destination: MemoryStore) -> Self {
        Self { destination, sources: HashMap::new() }
    }

    pub fn with_source(mut self, uri: &StoreUri, store: MemoryStore) -> Self {
        self.sources.insert(uri.to_string(), store);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: &StoreUri, mode: OpenMode) -> Result<Box<dyn StorageSession>, StoreError> {
        match mode {
            OpenMode::Destination => Ok(Box::new(self.destination.clone())),
            OpenMode::Source => match self.sources.get(&uri.to_string()) {
                Some(store) => Ok(Box::new(store.clone())),
                None => connect(uri, mode).await,
            },
        }
    }
}
