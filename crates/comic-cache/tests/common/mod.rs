//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use comic_cache::{
    CacheConfig, ComicCache, ComicRecord, ComicSource, IndexError, SearchIndex, Stat,
    ViewRefresher,
};
use comic_client::{ByteStream, ClientError};
use futures_util::stream;
use parking_lot::Mutex;

pub fn comic(number: i64) -> ComicRecord {
    ComicRecord {
        number,
        title: format!("Comic {}", number),
        safe_title: format!("Comic {}", number),
        image_url: format!("https://imgs.example.com/comics/{}.png", number),
        alt: format!("Alt text {}", number),
        year: "2015".to_string(),
        month: "6".to_string(),
        day: "1".to_string(),
        ..ComicRecord::default()
    }
}

/// In-memory comic service that counts requests.
#[derive(Default)]
pub struct FakeSource {
    comics: Mutex<HashMap<i64, ComicRecord>>,
    newest: Mutex<Option<i64>>,
    offline: AtomicBool,
    pub fetches: AtomicUsize,
    pub newest_fetches: AtomicUsize,
    pub image_fetches: AtomicUsize,
}

impl FakeSource {
    /// A service publishing comics `1..=newest`.
    pub fn with_comics(newest: i64) -> Arc<Self> {
        let source = Self::default();
        for n in 1..=newest {
            source.publish(comic(n));
        }
        Arc::new(source)
    }

    pub fn publish(&self, comic: ComicRecord) {
        let mut newest = self.newest.lock();
        if newest.is_none_or(|n| comic.number > n) {
            *newest = Some(comic.number);
        }
        self.comics.lock().insert(comic.number, comic);
    }

    /// Serve `comic` when asked for `number`, as a misbehaving service would.
    pub fn publish_under(&self, number: i64, comic: ComicRecord) {
        self.comics.lock().insert(number, comic);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn newest_fetches(&self) -> usize {
        self.newest_fetches.load(Ordering::SeqCst)
    }

    pub fn image_fetches(&self) -> usize {
        self.image_fetches.load(Ordering::SeqCst)
    }

    fn unavailable(url: &str) -> ClientError {
        ClientError::Status {
            status: 503,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ComicSource for FakeSource {
    async fn fetch(&self, number: i64) -> Result<ComicRecord, ClientError> {
        let url = format!("fake://{}/info.0.json", number);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::unavailable(&url));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.comics
            .lock()
            .get(&number)
            .cloned()
            .ok_or(ClientError::NotFound { url })
    }

    async fn fetch_newest(&self) -> Result<ComicRecord, ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::unavailable("fake://info.0.json"));
        }
        self.newest_fetches.fetch_add(1, Ordering::SeqCst);
        let newest = *self.newest.lock();
        newest
            .and_then(|n| self.comics.lock().get(&n).cloned())
            .ok_or(ClientError::NotFound {
                url: "fake://info.0.json".to_string(),
            })
    }

    async fn fetch_image(&self, url: &str) -> Result<ByteStream, ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::unavailable(url));
        }
        self.image_fetches.fetch_add(1, Ordering::SeqCst);
        let body = Bytes::from(format!("image bytes for {}", url));
        Ok(Box::pin(stream::iter(vec![Ok(body)])))
    }
}

/// Search index that records what it was given and can be told to fail.
#[derive(Default)]
pub struct RecordingIndex {
    pub indexed: Mutex<Vec<i64>>,
    pub fail: AtomicBool,
}

impl SearchIndex for RecordingIndex {
    fn index(&self, comic: &ComicRecord) -> Result<(), IndexError> {
        self.indexed.lock().push(comic.number);
        if self.fail.load(Ordering::SeqCst) {
            return Err("index is read-only".into());
        }
        Ok(())
    }
}

/// View refresher that counts progress callbacks.
#[derive(Default)]
pub struct RecordingRefresher {
    pub metadata_refreshes: AtomicUsize,
    pub image_refreshes: AtomicUsize,
    pub metadata_stats: Mutex<Vec<Stat>>,
    pub image_stats: Mutex<Vec<Stat>>,
}

impl ViewRefresher for RecordingRefresher {
    fn refresh_metadata(&self) {
        self.metadata_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_metadata_with(&self, stat: Stat) {
        self.metadata_stats.lock().push(stat);
    }

    fn refresh_images(&self) {
        self.image_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_images_with(&self, stat: Stat) {
        self.image_stats.lock().push(stat);
    }
}

/// Open a cache in a fresh temp directory.
pub fn open_cache(
    source: Arc<FakeSource>,
    index: Arc<RecordingIndex>,
) -> (tempfile::TempDir, Arc<ComicCache>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(temp_dir.path());
    let cache = ComicCache::builder(config, source)
        .index(index)
        .open()
        .unwrap();
    (temp_dir, cache)
}
