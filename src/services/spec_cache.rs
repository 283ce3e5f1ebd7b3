use crate::constants::cache as cache_constants;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A previously fetched specification document, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: Value,
    /// Fetch time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub etag: Option<String>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp < ttl_ms
    }
}

#[derive(Default)]
struct CacheStats {
    hits: u64,
    misses: u64,
    writes: u64,
    errors: u64,
}

/// File-backed store of fetched specifications, one JSON file per source URL.
///
/// Reads never fail: a missing, unreadable, corrupt or expired entry is a miss.
/// There is no locking, so concurrent writers for the same URL race and the
/// last rename wins.
#[derive(Clone)]
pub struct SpecCache {
    logger: Logger,
    cache_dir: PathBuf,
    ttl_ms: i64,
    stats: Arc<Mutex<CacheStats>>,
}

impl SpecCache {
    pub fn new(logger: Logger, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            logger: logger.child("cache"),
            cache_dir: cache_dir.into(),
            ttl_ms: cache_constants::TTL_MS,
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn key_for(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn entry_path(&self, source: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", Self::key_for(source)))
    }

    pub async fn get(&self, source: &str) -> Option<CacheEntry> {
        let path = self.entry_path(source);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    self.bump(|stats| stats.errors += 1);
                    self.logger.warn(
                        "Cache read failed",
                        Some(&serde_json::json!({"path": path, "error": err.to_string()})),
                    );
                }
                self.bump(|stats| stats.misses += 1);
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                self.bump(|stats| stats.errors += 1);
                self.bump(|stats| stats.misses += 1);
                self.logger.warn(
                    "Ignoring corrupt cache entry",
                    Some(&serde_json::json!({"path": path, "error": err.to_string()})),
                );
                return None;
            }
        };
        let now = chrono::Utc::now().timestamp_millis();
        if !entry.is_fresh(now, self.ttl_ms) {
            self.bump(|stats| stats.misses += 1);
            self.logger.debug(
                "Cache entry expired",
                Some(&serde_json::json!({"source": source, "age_ms": now - entry.timestamp})),
            );
            return None;
        }
        self.bump(|stats| stats.hits += 1);
        Some(entry)
    }

    pub async fn put(
        &self,
        source: &str,
        content: &Value,
        etag: Option<&str>,
    ) -> Result<CacheEntry, ToolError> {
        let entry = CacheEntry {
            content: content.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            etag: etag.map(str::to_string),
        };
        let serialized = serde_json::to_string(&entry).map_err(|err| {
            ToolError::internal(format!("Failed to serialize cache entry: {}", err))
        })?;
        let path = self.entry_path(source);
        if let Err(err) = atomic_write_text_file(&path, &serialized).await {
            self.bump(|stats| stats.errors += 1);
            return Err(ToolError::internal(format!(
                "Failed to write cache entry {}: {}",
                path.display(),
                err
            )));
        }
        self.bump(|stats| stats.writes += 1);
        Ok(entry)
    }

    pub fn stats(&self) -> Value {
        let stats = self.stats.lock().unwrap_or_else(|err| err.into_inner());
        serde_json::json!({
            "dir": self.cache_dir,
            "ttl_ms": self.ttl_ms,
            "hits": stats.hits,
            "misses": stats.misses,
            "writes": stats.writes,
            "errors": stats.errors,
        })
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}
