//! On-disk image cache.
//!
//! One file per comic, named by its decimal number. Presence is a plain
//! filesystem check and is independent of the metadata store.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{CacheError, Stat};

/// Directory of downloaded comic images.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the image for `number` lives. The file may not exist.
    pub fn path(&self, number: i64) -> PathBuf {
        self.dir.join(number.to_string())
    }

    /// Whether an image for `number` has been downloaded.
    pub fn contains(&self, number: i64) -> bool {
        self.path(number).is_file()
    }

    /// Count downloaded images and find the highest number.
    ///
    /// Files whose names aren't comic numbers are ignored.
    pub fn stat(&self) -> Result<Stat, CacheError> {
        let mut stat = Stat::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stat),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(number) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                stat.record(number);
            }
        }

        Ok(stat)
    }

    /// Write the image for `number` from a byte stream, replacing any
    /// existing file.
    ///
    /// A failed stream leaves a partial file behind; the next download
    /// overwrites it.
    pub async fn write_stream<S, E>(&self, number: i64, mut stream: S) -> Result<u64, CacheError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        CacheError: From<E>,
    {
        let path = self.path(number);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        debug!(number, bytes = written, path = %path.display(), "image written");
        Ok(written)
    }
}
