use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::Result;
use crate::stats::{CachedSessionStats, SessionKey};

/// Bump whenever `CachedSessionStats` changes shape. A mismatch discards
/// the whole document and forces a full rescan.
pub const STATS_CACHE_VERSION: u32 = 3;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCache {
    #[serde(default)]
    pub sessions: BTreeMap<SessionKey, CachedSessionStats>,
}

/// The persisted root document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatsCache {
    pub version: u32,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderCache>,
}

impl Default for GlobalStatsCache {
    fn default() -> Self {
        Self {
            version: STATS_CACHE_VERSION,
            last_updated: 0,
            providers: BTreeMap::new(),
        }
    }
}

impl GlobalStatsCache {
    pub fn provider_mut(&mut self, id: &str) -> &mut ProviderCache {
        self.providers.entry(id.to_string()).or_default()
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderCache> {
        self.providers.get(id)
    }
}

/// Loads and persists the versioned cache document.
#[derive(Debug, Clone)]
pub struct StatsCacheStore {
    cache_path: PathBuf,
}

impl StatsCacheStore {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Previously saved cache, or a fresh one when the file is missing,
    /// unreadable, corrupt or written by another schema version.
    pub fn load(&self) -> GlobalStatsCache {
        let data = match fs::read(&self.cache_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No stats cache at {}", self.cache_path.display());
                return GlobalStatsCache::default();
            }
            Err(e) => {
                warn!("Failed to read stats cache {}: {}", self.cache_path.display(), e);
                return GlobalStatsCache::default();
            }
        };

        let cached: GlobalStatsCache = match serde_json::from_slice(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Discarding corrupt stats cache {}: {}", self.cache_path.display(), e);
                return GlobalStatsCache::default();
            }
        };

        if cached.version != STATS_CACHE_VERSION {
            info!(
                "Stats cache version {} != {}, rebuilding",
                cached.version, STATS_CACHE_VERSION
            );
            return GlobalStatsCache::default();
        }
        cached
    }

    /// Write the whole document through a temp file and rename it into place.
    pub fn save(&self, cache: &mut GlobalStatsCache) -> Result<()> {
        cache.version = STATS_CACHE_VERSION;
        cache.last_updated = chrono::Utc::now().timestamp_millis();

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(&*cache)?;
        let tmp_path = self.cache_path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        if let Err(e) = fs::rename(&tmp_path, &self.cache_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Like `save`, but a failure is only logged.
    pub fn save_or_log(&self, cache: &mut GlobalStatsCache) {
        if let Err(e) = self.save(cache) {
            warn!("Failed to save stats cache {}: {}", self.cache_path.display(), e);
        }
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.cache_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> GlobalStatsCache {
        let mut cache = GlobalStatsCache::default();
        cache.provider_mut("codex").sessions.insert(
            "2025/01/02/s1".into(),
            CachedSessionStats {
                message_count: 4,
                input_tokens: 10,
                file_mtime_millis: 1_700_000_000_000,
                ..Default::default()
            },
        );
        cache
    }

    #[test]
    fn test_missing_file_yields_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("none.json"));
        let cache = store.load();
        assert_eq!(cache.version, STATS_CACHE_VERSION);
        assert!(cache.providers.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("nested/deeper/cache.json"));
        let mut cache = populated();
        store.save(&mut cache).unwrap();
        assert!(cache.last_updated > 0);

        let loaded = store.load();
        assert_eq!(loaded, cache);
        assert!(!dir.path().join("nested/deeper/cache.json.tmp").exists());
    }

    #[test]
    fn test_document_shape() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("cache.json"));
        store.save(&mut populated()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], STATS_CACHE_VERSION);
        assert!(raw["lastUpdated"].is_i64());
        let entry = &raw["providers"]["codex"]["sessions"]["2025/01/02/s1"];
        assert_eq!(entry["messageCount"], 4);
        assert_eq!(entry["fileMtimeMillis"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_older_version_is_discarded_entirely() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("cache.json"));
        let mut stale = populated();
        stale.version = STATS_CACHE_VERSION - 1;
        fs::write(store.path(), serde_json::to_vec(&stale).unwrap()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.version, STATS_CACHE_VERSION);
        assert!(loaded.providers.is_empty());
    }

    #[test]
    fn test_corrupt_file_yields_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("cache.json"));
        fs::write(store.path(), b"{\"version\": 3, \"providers\": [").unwrap();
        assert_eq!(store.load(), GlobalStatsCache::default());
    }

    #[test]
    fn test_unwritable_path_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // Parent "directory" is a regular file
        let store = StatsCacheStore::new(blocker.join("cache.json"));
        assert!(store.save(&mut populated()).is_err());
        store.save_or_log(&mut populated());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = StatsCacheStore::new(dir.path().join("cache.json"));
        store.clear().unwrap();
        store.save(&mut populated()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }
}
