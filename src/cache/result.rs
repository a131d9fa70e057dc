//! Keyed result cache

use super::CacheConfig;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Index key for `func_name` called with `args`
pub fn cache_key<A: Serialize + ?Sized>(func_name: &str, args: &A) -> Result<String> {
    Ok(serde_json::to_string(&json!({ "func": func_name, "args": args }))?)
}

/// Disk-backed memoisation
///
/// Concurrent writers are not coordinated: two processes computing the same
/// key both write, and the last index written wins.
#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    index: BTreeMap<String, PathBuf>,
}

impl ResultCache {
    /// Open the cache, reading its index if one exists
    pub fn open(config: CacheConfig) -> Result<Self> {
        let index_path = config.index_path();
        let index = if index_path.is_file() {
            serde_json::from_str(&fs::read_to_string(&index_path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { config, index })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Return the stored result of `func_name(args)`, computing and storing
    /// it when absent or when `reset` is set
    pub fn cached<A, T, F>(&mut self, func_name: &str, args: &A, reset: bool, compute: F) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let key = cache_key(func_name, args)?;
        self.cached_with_key(&key, reset, compute)
    }

    /// Same as [`ResultCache::cached`] with an explicit key
    pub fn cached_with_key<T, F>(&mut self, key: &str, reset: bool, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        debug!("Cache key: {}", key);
        let data_dir = self.config.data_dir();
        let path = self
            .index
            .entry(key.to_string())
            .or_insert_with(|| data_dir.join(uuid::Uuid::new_v4().simple().to_string()))
            .clone();

        if reset && path.exists() {
            info!("Deleting any pre-existing cache");
            fs::remove_file(&path)?;
        }

        if path.is_file() {
            return Ok(serde_json::from_str(&fs::read_to_string(&path)?)?);
        }

        let result = compute()?;
        fs::create_dir_all(&data_dir)?;
        fs::write(&path, serde_json::to_string(&result)?)?;
        self.save_index()?;
        Ok(result)
    }

    fn save_index(&self) -> Result<()> {
        fs::create_dir_all(&self.config.cache_dir)?;
        fs::write(self.config.index_path(), serde_json::to_string_pretty(&self.index)?)?;
        Ok(())
    }
}
