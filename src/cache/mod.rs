//! On-disk memoisation of expensive results
//!
//! Results are stored as JSON files under `<cache_dir>/data`, indexed by a key
//! built from the function name and its serialised arguments. The index lives
//! in `<cache_dir>/index.json`. Entries are trusted as long as they exist;
//! there is no invalidation besides `reset` and [`delete_cache`].

mod result;

pub use result::{cache_key, ResultCache};

use crate::config::CacheSettings;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the cache directory
pub const CACHE_DIR_ENV: &str = "MYAUTOML_CACHE_DIR";

/// Location of the result cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(&settings.dir)
    }

    /// Directory from `MYAUTOML_CACHE_DIR`, or `cache/myautoml` with a warning
    pub fn from_env() -> Self {
        match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) => {
                debug!("Setting cache dir: {}", Path::new(&dir).display());
                Self::new(dir)
            }
            None => {
                let dir = Path::new("cache").join("myautoml");
                warn!("No cache dir specified, using default: {}", dir.display());
                Self::new(dir)
            }
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join("index.json")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.cache_dir.join("data")
    }
}

/// Remove the cache directory and everything in it
pub fn delete_cache(config: &CacheConfig) -> Result<()> {
    warn!("Deleting cache: {}", config.cache_dir.display());
    if config.cache_dir.exists() {
        std::fs::remove_dir_all(&config.cache_dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = CacheConfig::new("/tmp/c");
        assert_eq!(config.index_path(), PathBuf::from("/tmp/c/index.json"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/c/data"));
    }

    #[test]
    fn test_delete_missing_cache_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path().join("never-created"));
        assert!(delete_cache(&config).is_ok());
    }
}
