//! The comic cache handle and its fetch-and-populate pipeline.
//!
//! Lookups resolve in layers: cache, then network, then stale cache, then a
//! placeholder record. They never fail outright; the error that forced a
//! fallback rides along in the returned [`Lookup`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use comic_client::ClientError;
use futures_util::TryStreamExt;
use tracing::{debug, info, trace, warn};

use crate::newest::{NewestComicActor, NewestComicHandle};
use crate::{
    CacheConfig, CacheError, ComicRecord, ComicSource, ImageCache, MetadataStore, NoopIndex,
    SearchIndex, Stat, VersionGuard,
};

const NOT_FOUND_TITLE: &str = "Comic Not Found";
const CORRUPT_TITLE: &str = "Cached Comic Is Invalid";
const UNAVAILABLE_TITLE: &str = "Couldn't Get Comic";
const OFFLINE_TITLE: &str = "Connect to the Internet to Download Comics";

/// A renderable comic plus the error, if any, that degraded it.
///
/// `comic` is always usable. `error` tells the caller whether to offer a
/// retry or show an offline indicator.
#[derive(Debug)]
pub struct Lookup {
    pub comic: ComicRecord,
    pub error: Option<CacheError>,
}

impl Lookup {
    pub fn ok(comic: ComicRecord) -> Self {
        Self { comic, error: None }
    }

    pub fn degraded(comic: ComicRecord, error: CacheError) -> Self {
        Self {
            comic,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the comic service could not be reached.
    pub fn is_offline(&self) -> bool {
        self.error.as_ref().is_some_and(CacheError::is_offline)
    }

    /// Drop the fallback record and keep only the error, if any.
    pub fn into_result(self) -> Result<ComicRecord, CacheError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.comic),
        }
    }
}

/// Builder for [`ComicCache`].
pub struct ComicCacheBuilder {
    config: CacheConfig,
    source: Arc<dyn ComicSource>,
    index: Arc<dyn SearchIndex>,
    guard: Option<VersionGuard>,
}

impl ComicCacheBuilder {
    /// Push newly fetched comics into `index`.
    pub fn index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = index;
        self
    }

    /// Check the cache generation against a specific version.
    pub fn version(mut self, version: u32) -> Self {
        self.guard = Some(VersionGuard::with_version(self.config.layout(), version));
        self
    }

    /// Open the cache.
    ///
    /// Retires an incompatible cache generation, opens the store and starts
    /// the newest-comic actor. Must be called within a Tokio runtime.
    pub fn open(self) -> Result<Arc<ComicCache>, CacheError> {
        let layout = self.config.layout();
        let guard = self
            .guard
            .unwrap_or_else(|| VersionGuard::new(layout.clone()));

        if guard.prepare() {
            info!(version = guard.current(), "starting a fresh cache generation");
        }
        layout.create_dirs()?;

        let store = MetadataStore::open(&layout.store_file)?;
        let images = ImageCache::new(&layout.image_dir);
        let newest = NewestComicActor::spawn();

        info!(dir = %layout.root.display(), "comic cache opened");

        Ok(Arc::new(ComicCache {
            config: self.config,
            guard,
            store,
            images,
            newest,
            source: self.source,
            index: self.index,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Handle to an open comic cache.
///
/// Created once at startup and shared by reference. Owns the store, the
/// image directory and the newest-comic actor for its whole lifetime.
pub struct ComicCache {
    config: CacheConfig,
    guard: VersionGuard,
    store: MetadataStore,
    images: ImageCache,
    newest: NewestComicHandle,
    source: Arc<dyn ComicSource>,
    index: Arc<dyn SearchIndex>,
    closed: AtomicBool,
}

impl ComicCache {
    /// Start building a cache that fetches misses from `source`.
    pub fn builder(config: CacheConfig, source: Arc<dyn ComicSource>) -> ComicCacheBuilder {
        ComicCacheBuilder {
            config,
            source,
            index: Arc::new(NoopIndex),
            guard: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    // =========================================================================
    // Comic metadata
    // =========================================================================

    /// Get the metadata of comic `number`.
    pub async fn comic_info(&self, number: i64) -> Lookup {
        if self.config.is_missing(number) {
            debug!(number, "comic is permanently missing");
            return Lookup::degraded(
                ComicRecord::placeholder(number, NOT_FOUND_TITLE),
                CacheError::NotFound(number),
            );
        }

        match self.store.get_comic(number) {
            Ok(Some(comic)) => {
                trace!(number, "cache hit");
                return Lookup::ok(comic);
            }
            Ok(None) => debug!(number, "cache miss"),
            Err(e @ CacheError::Corrupt { .. }) => {
                warn!(number, error = %e, "cached comic is corrupt");
                return Lookup::degraded(ComicRecord::placeholder(number, CORRUPT_TITLE), e);
            }
            Err(e) => warn!(number, error = %e, "cache read failed, fetching from network"),
        }

        self.fetch_and_populate(number).await
    }

    /// Fetch comic `number` from the network, store it, then index it.
    ///
    /// The store write commits before indexing, so an index failure leaves
    /// the comic cached.
    async fn fetch_and_populate(&self, number: i64) -> Lookup {
        let comic = match self.source.fetch(number).await {
            Ok(comic) => comic,
            Err(e) => {
                let err = CacheError::from_client(number, e);
                let title = if err.is_not_found() {
                    NOT_FOUND_TITLE
                } else {
                    UNAVAILABLE_TITLE
                };
                warn!(number, error = %err, "failed to fetch comic");
                return Lookup::degraded(ComicRecord::placeholder(number, title), err);
            }
        };

        if comic.number != number {
            warn!(
                requested = number,
                received = comic.number,
                "comic service returned a different comic"
            );
            let err = CacheError::RemoteUnavailable(ClientError::InvalidResponse(format!(
                "requested comic {} but received {}",
                number, comic.number
            )));
            return Lookup::degraded(ComicRecord::placeholder(number, UNAVAILABLE_TITLE), err);
        }

        if let Err(e) = self.store.put_comic(&comic) {
            warn!(number, error = %e, "failed to cache comic");
            return Lookup::degraded(comic, e);
        }
        debug!(number, "comic cached");

        if let Err(source) = self.index.index(&comic) {
            warn!(number, error = %source, "failed to index comic");
            return Lookup::degraded(comic, CacheError::Index { number, source });
        }

        Lookup::ok(comic)
    }

    /// Whether metadata for `number` is cached.
    pub fn has_comic_info(&self, number: i64) -> bool {
        self.store.contains_comic(number).unwrap_or_else(|e| {
            warn!(number, error = %e, "failed to check cached comic");
            false
        })
    }

    /// Count cached metadata entries.
    pub fn stat_metadata(&self) -> Result<Stat, CacheError> {
        self.store.stat()
    }

    // =========================================================================
    // Newest comic
    // =========================================================================

    /// Get the newest comic, fetching it if none is known this session.
    ///
    /// Offline, this falls back to the highest-numbered cached comic and
    /// reports [`CacheError::RemoteUnavailable`].
    pub async fn newest_comic_info(&self) -> Lookup {
        match self.newest.get().await {
            Ok(Some(comic)) => Lookup::ok(comic),
            Ok(None) => self.fetch_newest().await,
            Err(e) => Lookup {
                comic: self.cached_newest().comic,
                error: Some(e),
            },
        }
    }

    /// Forget the known newest comic and fetch it again.
    pub async fn newest_comic_info_force_refresh(&self) -> Lookup {
        if let Err(e) = self.newest.reset().await {
            return Lookup {
                comic: self.cached_newest().comic,
                error: Some(e),
            };
        }
        self.newest_comic_info().await
    }

    /// Get the newest comic without waiting on the network.
    ///
    /// If the newest comic is already known, it is returned and `callback`
    /// runs right away with the same value. Otherwise the highest cached comic
    /// is returned immediately while a background task fetches the real one.
    /// Once the actor holds the result (or, offline, the cached fallback),
    /// `callback` runs with the value the actor then holds. `callback` runs
    /// exactly once either way.
    ///
    /// Concurrent calls each start their own fetch; the last one to reach the
    /// actor wins.
    pub async fn newest_comic_info_async<F>(self: &Arc<Self>, callback: F) -> Lookup
    where
        F: FnOnce(Lookup) + Send + 'static,
    {
        match self.newest.get().await {
            Ok(Some(comic)) => {
                callback(Lookup::ok(comic.clone()));
                return Lookup::ok(comic);
            }
            Ok(None) => {}
            Err(e) => {
                let comic = self.cached_newest().comic;
                callback(Lookup::degraded(comic.clone(), CacheError::Closed));
                return Lookup::degraded(comic, e);
            }
        }

        let fallback = self.store.newest_comic();
        let offered = fallback.as_ref().ok().cloned().flatten();
        let immediate = Self::newest_from_store(fallback);

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let (comic, error) = match cache.source.fetch_newest().await {
                Ok(comic) => (Some(comic), None),
                Err(e) => {
                    warn!(error = %e, "failed to fetch newest comic, using cached fallback");
                    (offered, Some(CacheError::RemoteUnavailable(e)))
                }
            };

            // A placeholder never becomes the current value
            let held = match comic {
                Some(comic) => cache
                    .newest
                    .replace(comic.clone())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(comic),
                None => ComicRecord::placeholder(0, OFFLINE_TITLE),
            };
            let current = cache.newest.get().await.ok().flatten().unwrap_or(held);

            callback(Lookup {
                comic: current,
                error,
            });
        });

        immediate
    }

    async fn fetch_newest(&self) -> Lookup {
        match self.source.fetch_newest().await {
            Ok(comic) => {
                debug!(number = comic.number, "fetched newest comic");
                match self.newest.replace(comic.clone()).await {
                    Ok(held) => Lookup::ok(held.unwrap_or(comic)),
                    Err(e) => Lookup::degraded(comic, e),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch newest comic, falling back to cache");
                Lookup::degraded(
                    self.cached_newest().comic,
                    CacheError::RemoteUnavailable(e),
                )
            }
        }
    }

    /// The highest-numbered cached comic, or a placeholder if none.
    fn cached_newest(&self) -> Lookup {
        Self::newest_from_store(self.store.newest_comic())
    }

    fn newest_from_store(scan: Result<Option<ComicRecord>, CacheError>) -> Lookup {
        match scan {
            Ok(Some(comic)) => Lookup::ok(comic),
            Ok(None) => Lookup::degraded(
                ComicRecord::placeholder(0, OFFLINE_TITLE),
                CacheError::Miss(0),
            ),
            Err(e) => {
                warn!(error = %e, "failed to scan cache for newest comic");
                Lookup::degraded(ComicRecord::placeholder(0, OFFLINE_TITLE), e)
            }
        }
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Where the image for `number` is (or would be) stored.
    pub fn comic_image_path(&self, number: i64) -> PathBuf {
        self.images.path(number)
    }

    /// Whether the image for `number` has been downloaded.
    pub fn has_comic_image(&self, number: i64) -> bool {
        self.images.contains(number)
    }

    /// Download the image of comic `number` into the image cache.
    pub async fn download_comic_image(&self, number: i64) -> Result<(), CacheError> {
        let lookup = self.comic_info(number).await;
        if !lookup.comic.has_image() {
            return Err(lookup.error.unwrap_or(CacheError::Miss(number)));
        }

        let stream = self
            .source
            .fetch_image(&lookup.comic.image_url)
            .await
            .map_err(CacheError::RemoteUnavailable)?;

        self.images
            .write_stream(number, stream.map_err(CacheError::RemoteUnavailable))
            .await?;

        Ok(())
    }

    /// Count downloaded images.
    pub fn stat_images(&self) -> Result<Stat, CacheError> {
        self.images.stat()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the actor, close the store and record the cache version.
    ///
    /// Calling this more than once is harmless. The version is only written
    /// if the store closed cleanly.
    pub async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.newest.shutdown().await;
        self.store.close()?;
        self.guard.commit()?;

        info!("comic cache closed");
        Ok(())
    }
}
