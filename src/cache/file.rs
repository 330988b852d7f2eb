//! File-based last-known-good snapshot cache with atomic writes.
//!
//! Stores the most recent catalog snapshot under
//! `dirs::data_dir()/<namespace>/flash-sales.json`, so a storefront that
//! starts while the Sales API is down still has stale-but-valid data.
//! Uses temp file + rename for atomic writes.

use crate::sale::catalog::CatalogSnapshot;
use crate::FlashSaleError;
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "flash-sales.json";

/// File-based snapshot cache.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    /// Directory for cache files.
    cache_dir: PathBuf,
}

impl SnapshotCache {
    /// Create a cache under the platform data directory.
    pub fn new(namespace: &str) -> Result<Self, FlashSaleError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| FlashSaleError::CacheIO("Could not find data directory".to_string()))?;

        Self::with_path(base_dir.join(namespace))
    }

    /// Create a cache at a specific directory.
    pub fn with_path(cache_dir: PathBuf) -> Result<Self, FlashSaleError> {
        fs::create_dir_all(&cache_dir)
            .map_err(|e| FlashSaleError::CacheIO(format!("Failed to create cache dir: {}", e)))?;
        Ok(Self { cache_dir })
    }

    /// Directory this cache writes to.
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn snapshot_path(&self) -> PathBuf {
        self.cache_dir.join(SNAPSHOT_FILE)
    }

    /// Save a snapshot atomically.
    pub fn save(&self, snapshot: &CatalogSnapshot) -> Result<(), FlashSaleError> {
        let target_path = self.snapshot_path();
        let temp_path = target_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| FlashSaleError::CacheIO(format!("Failed to serialize snapshot: {}", e)))?;

        fs::write(&temp_path, &json)
            .map_err(|e| FlashSaleError::CacheIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .map_err(|e| FlashSaleError::CacheIO(format!("Failed to rename cache file: {}", e)))?;

        Ok(())
    }

    /// Load the cached snapshot, if there is one.
    pub fn load(&self) -> Result<Option<CatalogSnapshot>, FlashSaleError> {
        let path = self.snapshot_path();

        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| FlashSaleError::CacheIO(format!("Failed to read cache file: {}", e)))?;

        let snapshot = serde_json::from_str(&json).map_err(|e| {
            FlashSaleError::CacheIO(format!("Failed to deserialize snapshot: {}", e))
        })?;

        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sale::models::fixtures::{entry, sale};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample() -> CatalogSnapshot {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut s = sale("fs-1", now);
        s.products.push(entry("p1", 100_000, 80_000));
        CatalogSnapshot::from_lists(vec![s], Vec::new(), now)
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();

        let snapshot = sample();
        cache.save(&snapshot).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();
        cache.save(&sample()).unwrap();

        let names: Vec<_> = fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![SNAPSHOT_FILE.to_string()]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();
        fs::write(temp_dir.path().join(SNAPSHOT_FILE), "{ not json").unwrap();

        assert!(matches!(cache.load(), Err(FlashSaleError::CacheIO(_))));
    }
}
