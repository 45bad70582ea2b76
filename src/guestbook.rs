// Profile Gate - Guestbook Store
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Append-only record of every caller who introduced themselves.
// Durable store is LMDB; the in-memory store backs tests and --ephemeral.
//
// Database: guestbook
// Storage: LIVE/GUESTBOOK/ (or config guestbook_path)
// Key: zero-padded created_at nanos + "-" + id, so key order is time order.

use chrono::{DateTime, Utc};
use heed::types::*;
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

const MAX_DB_SIZE: usize = 20 * 1024 * 1024; // 20MB

/// Disambiguates entries created in the same nanosecond
static ENTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("guestbook backend error: {0}")]
    Backend(#[from] heed::Error),
    #[error("guestbook entry encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("guestbook io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("guestbook task failed: {0}")]
    Task(String),
    #[error("guestbook unavailable: {0}")]
    Unavailable(String),
}

/// Caller-supplied fields, trimmed. Empty optionals collapse to None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSubmission {
    pub name: String,
    pub message: String,
    pub agent_id: Option<String>,
    pub contact: Option<String>,
}

impl MessageSubmission {
    pub fn new(name: &str, message: &str, agent_id: Option<&str>, contact: Option<&str>) -> Self {
        fn optional(v: Option<&str>) -> Option<String> {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        Self {
            name: name.trim().to_string(),
            message: message.trim().to_string(),
            agent_id: optional(agent_id),
            contact: optional(contact),
        }
    }
}

/// One stored guestbook record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestbookEntry {
    pub id: String,
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Salted hash of the caller's network origin, never the raw address
    pub origin_hash: String,
}

/// Listing view: everything but the origin hash
#[derive(Debug, Clone, Serialize)]
pub struct PublicEntry {
    pub id: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn hash_origin(salt: &str, origin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(origin.as_bytes());
    hex::encode(hasher.finalize())
}

impl GuestbookEntry {
    pub fn new(submission: MessageSubmission, origin: &str, salt: &str) -> Self {
        let created_at = Utc::now();
        let seq = ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            id: entry_id(created_nanos(&created_at), seq),
            name: submission.name,
            message: submission.message,
            agent_id: submission.agent_id,
            contact: submission.contact,
            created_at,
            origin_hash: hash_origin(salt, origin),
        }
    }

    /// LMDB key: sorts chronologically
    pub fn storage_key(&self) -> String {
        format!("{:020}-{}", created_nanos(&self.created_at), self.id)
    }

    pub fn public(&self) -> PublicEntry {
        PublicEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            message: self.message.clone(),
            agent_id: self.agent_id.clone(),
            contact: self.contact.clone(),
            created_at: self.created_at,
        }
    }
}

/// Sequence is zero-padded so same-nanosecond ids still sort in creation order
fn entry_id(nanos: i64, seq: u64) -> String {
    format!("gb-{}-{:020}", nanos, seq)
}

fn created_nanos(at: &DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or_default().max(0)
}

/// Append-only guestbook backend. Blocking; async callers go through
/// [`append_entry`] and [`list_entries`].
pub trait GuestbookStore: Send + Sync {
    fn append(&self, entry: &GuestbookEntry) -> Result<(), StoreError>;

    /// All entries, newest first
    fn list(&self) -> Result<Vec<GuestbookEntry>, StoreError>;
}

// ============================================================================
// LMDB STORE
// ============================================================================

/// LMDB-backed guestbook
pub struct LmdbGuestbook {
    env: Env,
    /// storage key → JSON entry
    entries: Database<Str, Str>,
}

impl LmdbGuestbook {
    /// Open or create guestbook LMDB at given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAX_DB_SIZE)
                .max_dbs(2)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let entries = env.create_database(&mut wtxn, Some("guestbook"))?;
        wtxn.commit()?;

        log::info!("GUESTBOOK LMDB opened at {:?}", path);
        Ok(Self { env, entries })
    }

    /// Entry count
    pub fn count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.entries.len(&rtxn)?)
    }
}

impl GuestbookStore for LmdbGuestbook {
    fn append(&self, entry: &GuestbookEntry) -> Result<(), StoreError> {
        let json = serde_json::to_string(entry)?;
        let mut wtxn = self.env.write_txn()?;
        self.entries.put(&mut wtxn, &entry.storage_key(), &json)?;
        wtxn.commit()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<GuestbookEntry>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for result in self.entries.rev_iter(&rtxn)? {
            let (_key, value) = result?;
            out.push(serde_json::from_str(value)?);
        }
        Ok(out)
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryGuestbook {
    entries: Mutex<Vec<GuestbookEntry>>,
}

impl MemoryGuestbook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuestbookStore for MemoryGuestbook {
    fn append(&self, entry: &GuestbookEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    /// Ordered by storage key, like LMDB. Appends can land out of time order.
    fn list(&self) -> Result<Vec<GuestbookEntry>, StoreError> {
        let mut out = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        out.sort_by_cached_key(|e| std::cmp::Reverse(e.storage_key()));
        Ok(out)
    }
}

// ============================================================================
// ASYNC HELPERS
// ============================================================================

/// Append on the blocking pool
pub async fn append_entry(
    store: Arc<dyn GuestbookStore>,
    entry: GuestbookEntry,
) -> Result<GuestbookEntry, StoreError> {
    tokio::task::spawn_blocking(move || store.append(&entry).map(|()| entry))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// List on the blocking pool
pub async fn list_entries(store: Arc<dyn GuestbookStore>) -> Result<Vec<GuestbookEntry>, StoreError> {
    tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(name: &str) -> GuestbookEntry {
        GuestbookEntry::new(MessageSubmission::new(name, "hello", None, None), "203.0.113.9", "salt")
    }

    #[test]
    fn submission_trims_and_drops_empty_optionals() {
        let s = MessageSubmission::new("  Ada ", " hi there\n", Some("   "), Some(" ada@example.com "));
        assert_eq!(s.name, "Ada");
        assert_eq!(s.message, "hi there");
        assert_eq!(s.agent_id, None);
        assert_eq!(s.contact.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn origin_is_hashed_with_salt() {
        let e = entry("Ada");
        assert_eq!(e.origin_hash, hash_origin("salt", "203.0.113.9"));
        assert_ne!(e.origin_hash, hash_origin("other", "203.0.113.9"));
        assert!(!e.origin_hash.contains("203.0.113.9"));
        assert_eq!(e.origin_hash.len(), 64);
    }

    #[test]
    fn ids_are_unique() {
        let a = entry("a");
        let b = entry("b");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("gb-"));
    }

    #[test]
    fn public_view_omits_origin_hash() {
        let json = serde_json::to_value(entry("Ada").public()).unwrap();
        assert!(json.get("origin_hash").is_none());
        assert_eq!(json["name"], "Ada");
        assert!(json.get("agent_id").is_none());
    }

    #[test]
    fn memory_store_lists_newest_first() {
        let store = MemoryGuestbook::new();
        store.append(&entry("first")).unwrap();
        store.append(&entry("second")).unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn memory_store_orders_by_creation_time_not_append_order() {
        let newer = entry("newer");
        let mut older = entry("older");
        older.created_at = newer.created_at - chrono::Duration::seconds(5);

        let store = MemoryGuestbook::new();
        store.append(&newer).unwrap();
        store.append(&older).unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[test]
    fn same_nanosecond_entries_sort_by_sequence() {
        assert!(entry_id(5, 9) < entry_id(5, 10));

        let mut ninth = entry("ninth");
        let mut tenth = entry("tenth");
        tenth.created_at = ninth.created_at;
        ninth.id = entry_id(created_nanos(&ninth.created_at), 9);
        tenth.id = entry_id(created_nanos(&tenth.created_at), 10);
        assert!(ninth.storage_key() < tenth.storage_key());

        let dir = tempdir().unwrap();
        let store = LmdbGuestbook::open(dir.path()).unwrap();
        store.append(&tenth).unwrap();
        store.append(&ninth).unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["tenth", "ninth"]);
    }

    #[test]
    fn lmdb_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let first = entry("first");
        let second = entry("second");
        {
            let store = LmdbGuestbook::open(dir.path()).unwrap();
            store.append(&first).unwrap();
            store.append(&second).unwrap();
            assert_eq!(store.count().unwrap(), 2);
        }

        let store = LmdbGuestbook::open(dir.path()).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
        assert!(listed.contains(&first));
        assert!(listed.contains(&second));
    }

    #[tokio::test]
    async fn async_helpers_round_trip_through_blocking_pool() {
        let store: Arc<dyn GuestbookStore> = Arc::new(MemoryGuestbook::new());
        let stored = append_entry(Arc::clone(&store), entry("Ada")).await.unwrap();
        let listed = list_entries(store).await.unwrap();
        assert_eq!(listed, vec![stored]);
    }
}
