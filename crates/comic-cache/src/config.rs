//! Cache configuration and on-disk layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Comic numbers the service permanently reports as missing.
const DEFAULT_MISSING_COMICS: &[i64] = &[404];

/// Settings for the comic cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory of the cache generation.
    pub cache_dir: PathBuf,

    /// Comic numbers that never exist. Lookups for these short-circuit to a
    /// "not found" placeholder without touching the store or the network.
    pub missing_comics: Vec<i64>,

    /// How many fetches a backfill makes between progress refreshes.
    pub backfill_progress_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_dir(),
            missing_comics: DEFAULT_MISSING_COMICS.to_vec(),
            backfill_progress_every: 25,
        }
    }
}

impl CacheConfig {
    /// Create a config rooted at `cache_dir` with default settings.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Get the default cache directory.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("comic")
    }

    /// Whether `number` is known to be permanently missing.
    pub fn is_missing(&self, number: i64) -> bool {
        self.missing_comics.contains(&number)
    }

    /// Paths of the cache generation under `cache_dir`.
    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.cache_dir)
    }
}

/// Paths making up one cache generation.
///
/// The version marker, the store and the image directory are replaced
/// together; a stale one invalidates the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub root: PathBuf,
    pub version_file: PathBuf,
    pub store_file: PathBuf,
    pub image_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            version_file: root.join("version"),
            store_file: root.join("comics.sqlite"),
            image_dir: root.join("images"),
        }
    }

    /// Create the root and image directories if they don't exist.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.image_dir)
    }
}
