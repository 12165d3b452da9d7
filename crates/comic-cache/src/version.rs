//! Cache version guard.
//!
//! A cache generation written by an incompatible build is never read: on
//! startup a mismatched generation is moved aside to `*.bak` paths and a
//! fresh one takes its place. The version file is written only on clean
//! shutdown, so after a crash the next launch checks again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::CacheLayout;

/// On-disk format version this build reads and writes.
pub const CACHE_VERSION: u32 = 2;

/// SQLite sidecar files that travel with the store file.
const STORE_SIDECARS: &[&str] = &["-wal", "-shm"];

/// Read the version recorded in `path`. Missing or unparsable files read as 0.
pub fn read_version(path: &Path) -> u32 {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().parse().unwrap_or_else(|_| {
            warn!(path = %path.display(), "unparsable cache version, treating as 0");
            0
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cache version, treating as 0");
            0
        }
    }
}

/// Backup path for `path`: the same name with `.bak` appended.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Checks and records the version of one cache generation.
#[derive(Debug, Clone)]
pub struct VersionGuard {
    layout: CacheLayout,
    current: u32,
}

impl VersionGuard {
    /// Guard `layout` against [`CACHE_VERSION`].
    pub fn new(layout: CacheLayout) -> Self {
        Self::with_version(layout, CACHE_VERSION)
    }

    /// Guard `layout` against an explicit version.
    pub fn with_version(layout: CacheLayout, current: u32) -> Self {
        Self { layout, current }
    }

    /// The version this guard expects.
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Retire the existing generation if it was written by another version.
    ///
    /// Must run before the store is opened. Renames are best-effort: a failed
    /// rename is logged and the fresh store is created regardless. Returns
    /// whether a mismatch was found.
    pub fn prepare(&self) -> bool {
        let found = read_version(&self.layout.version_file);
        if found == self.current {
            debug!(version = found, "cache version matches");
            return false;
        }

        info!(
            found,
            expected = self.current,
            "cache version mismatch, retiring old cache"
        );

        let store = &self.layout.store_file;
        retire(store, &backup_path(store));
        for suffix in STORE_SIDECARS {
            let mut sidecar = store.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            retire(&sidecar, &backup_path(&sidecar));
        }

        let images = &self.layout.image_dir;
        let images_backup = backup_path(images);
        if images.exists() && images_backup.exists() {
            if let Err(e) = fs::remove_dir_all(&images_backup) {
                warn!(path = %images_backup.display(), error = %e, "failed to remove stale image backup");
            }
        }
        retire(images, &images_backup);

        true
    }

    /// Record the current version. Call only on clean shutdown.
    pub fn commit(&self) -> io::Result<()> {
        fs::write(&self.layout.version_file, self.current.to_string())?;
        debug!(version = self.current, "cache version recorded");
        Ok(())
    }
}

/// Move `from` to `to` if it exists, logging failures.
fn retire(from: &Path, to: &Path) {
    if !from.exists() {
        return;
    }
    match fs::rename(from, to) {
        Ok(()) => info!(from = %from.display(), to = %to.display(), "moved old cache aside"),
        Err(e) => warn!(from = %from.display(), error = %e, "failed to move old cache aside"),
    }
}
