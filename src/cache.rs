use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::DashboardError;

pub const DEFAULT_NAMESPACE: &str = "vespa_dashboard_cache_";
pub const DEFAULT_MEMORY_TTL_MINUTES: i64 = 10;
pub const DEFAULT_PERSISTENT_TTL_MINUTES: i64 = 30;
const RECENT_KEY: &str = "vespa_dashboard_recent_establishments";
const RECENT_LIMIT: usize = 5;
const INFLIGHT_POLL_MS: u64 = 100;
const INFLIGHT_MAX_POLLS: u32 = 50;

/// Persistent storage for cache entries, keyed by namespaced string. Every
/// operation may fail independently; the store recovers from all of them.
pub trait PersistentTier: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, DashboardError>;
    fn store(&self, key: &str, raw: &str) -> Result<(), DashboardError>;
    fn remove(&self, key: &str) -> Result<(), DashboardError>;
    fn keys(&self) -> Result<Vec<String>, DashboardError>;
}

/// File-backed persistent tier: one JSON file per key inside a cache
/// directory.
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> FileTier {
        FileTier { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl PersistentTier for FileTier {
    fn load(&self, key: &str) -> Result<Option<String>, DashboardError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|err| DashboardError::StorageUnavailable(err.to_string()))
    }

    fn store(&self, key: &str, raw: &str) -> Result<(), DashboardError> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| DashboardError::StorageUnavailable(err.to_string()))?;
        fs::write(self.path_for(key), raw)
            .map_err(|err| DashboardError::StorageUnavailable(err.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), DashboardError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).map_err(|err| DashboardError::StorageUnavailable(err.to_string()))
    }

    fn keys(&self) -> Result<Vec<String>, DashboardError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| DashboardError::StorageUnavailable(err.to_string()))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|err| DashboardError::StorageUnavailable(err.to_string()))?;
            let name = entry.file_name();
            if let Some(stem) = name.to_string_lossy().strip_suffix(".json") {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    data: Value,
    timestamp: DateTime<Utc>,
}

#[derive(Clone)]
struct MemoryEntry {
    value: Value,
    written_at: DateTime<Utc>,
}

/// Two-tier cache: an in-memory map fresh for a short window and a persistent
/// tier fresh for a longer one. A persistent hit is promoted into memory.
/// Writes update both tiers; persistent failures degrade silently to
/// memory-only caching. The handle is cheap to clone and shared.
#[derive(Clone)]
pub struct CacheStore {
    memory: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    persistent: Option<Arc<dyn PersistentTier>>,
    namespace: String,
    memory_ttl: Duration,
    persistent_ttl: Duration,
    is_loading: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl CacheStore {
    pub fn new(namespace: &str, persistent: Option<Arc<dyn PersistentTier>>) -> CacheStore {
        CacheStore {
            memory: Arc::new(RwLock::new(HashMap::new())),
            persistent,
            namespace: namespace.to_string(),
            memory_ttl: Duration::minutes(DEFAULT_MEMORY_TTL_MINUTES),
            persistent_ttl: Duration::minutes(DEFAULT_PERSISTENT_TTL_MINUTES),
            is_loading: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_ttls(mut self, memory_ttl: Duration, persistent_ttl: Duration) -> CacheStore {
        self.memory_ttl = memory_ttl;
        self.persistent_ttl = persistent_ttl;
        self
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(key) {
                if now - entry.written_at < self.memory_ttl {
                    return Some(entry.value.clone());
                }
            }
        }

        let tier = self.persistent.as_ref()?;
        let raw = match tier.load(&self.full_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("persistent tier read failed for {key}: {err}");
                return None;
            }
        };

        let entry: StoredEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("discarding corrupted cache entry {key}: {err}");
                return None;
            }
        };

        if now - entry.timestamp >= self.persistent_ttl {
            return None;
        }

        // Promote, stamped at promotion time so reads inside the memory TTL
        // stay off the persistent tier.
        let mut memory = self.memory.write().await;
        memory.insert(
            key.to_string(),
            MemoryEntry {
                value: entry.data.clone(),
                written_at: now,
            },
        );
        Some(entry.data)
    }

    pub async fn set(&self, key: &str, value: Value) {
        self.set_at(key, value, Utc::now()).await;
    }

    pub async fn set_at(&self, key: &str, value: Value, now: DateTime<Utc>) {
        {
            let mut memory = self.memory.write().await;
            memory.insert(
                key.to_string(),
                MemoryEntry {
                    value: value.clone(),
                    written_at: now,
                },
            );
        }

        let Some(tier) = self.persistent.as_ref() else {
            return;
        };
        let entry = StoredEntry {
            data: value,
            timestamp: now,
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = tier.store(&self.full_key(key), &raw) {
                    warn!("persistent tier write failed for {key}: {err}");
                }
            }
            Err(err) => warn!("failed to serialize cache entry {key}: {err}"),
        }
    }

    /// Drops every memory entry and every persistent key under this store's
    /// namespace, and advances the generation so in-flight fetches started
    /// before the clear skip their cache writes.
    pub async fn clear(&self) {
        self.memory.write().await.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);

        let Some(tier) = self.persistent.as_ref() else {
            return;
        };
        match tier.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|key| key.starts_with(&self.namespace)) {
                    if let Err(err) = tier.remove(key) {
                        warn!("failed to remove cache entry {key}: {err}");
                    }
                }
            }
            Err(err) => warn!("persistent tier clear failed: {err}"),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    pub fn begin_fetch(&self) {
        self.is_loading.store(true, Ordering::SeqCst);
    }

    pub fn finish_fetch(&self) {
        self.is_loading.store(false, Ordering::SeqCst);
    }

    /// Polls for an outstanding fetch to finish so the caller can re-check
    /// the cache instead of issuing a duplicate request. Advisory only: two
    /// callers racing the flag may both fetch, which is accepted. Returns
    /// false when the poll window runs out; the caller then fetches anyway.
    pub async fn wait_for_inflight(&self) -> bool {
        if !self.is_loading() {
            return true;
        }
        for _ in 0..INFLIGHT_MAX_POLLS {
            tokio::time::sleep(std::time::Duration::from_millis(INFLIGHT_POLL_MS)).await;
            if !self.is_loading() {
                return true;
            }
        }
        debug!(
            "in-flight fetch still pending after {}ms; proceeding",
            u64::from(INFLIGHT_MAX_POLLS) * INFLIGHT_POLL_MS
        );
        false
    }

    /// Records an establishment visit in the persistent recently-viewed list:
    /// most recent first, deduplicated, bounded to the last five. The list
    /// lives outside the cache namespace so `clear()` leaves it alone.
    pub fn push_recent_establishment(&self, id: &str) {
        let Some(tier) = self.persistent.as_ref() else {
            return;
        };
        let mut recents = self.recent_establishments();
        recents.retain(|existing| existing != id);
        recents.insert(0, id.to_string());
        recents.truncate(RECENT_LIMIT);

        match serde_json::to_string(&recents) {
            Ok(raw) => {
                if let Err(err) = tier.store(RECENT_KEY, &raw) {
                    warn!("failed to persist recently viewed establishments: {err}");
                }
            }
            Err(err) => warn!("failed to serialize recently viewed establishments: {err}"),
        }
    }

    pub fn recent_establishments(&self) -> Vec<String> {
        let Some(tier) = self.persistent.as_ref() else {
            return Vec::new();
        };
        let raw = match tier.load(RECENT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("failed to read recently viewed establishments: {err}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("discarding corrupted recently viewed list: {err}");
            Vec::new()
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}
