//! Local cache for the comic viewer.
//!
//! This crate memoizes comic metadata and images fetched from the comic
//! service so the viewer keeps working offline:
//! - Persist metadata in a transactional SQLite store
//! - Keep downloaded images in a flat directory keyed by comic number
//! - Track the newest comic through a single-owner actor
//! - Retire incompatible on-disk caches on upgrade
//! - Backfill every missing comic in the background
//!
//! Every lookup returns a renderable [`ComicRecord`]; failures travel
//! alongside it as advisory [`CacheError`]s.

pub mod backfill;
mod cache;
pub mod codec;
mod config;
mod error;
pub mod hooks;
pub mod images;
pub mod newest;
pub mod source;
pub mod store;
pub mod version;

pub use backfill::{Backfill, BackfillReport};
pub use cache::{ComicCache, ComicCacheBuilder, Lookup};
pub use config::{CacheConfig, CacheLayout};
pub use error::CacheError;
pub use hooks::{IndexError, NoopIndex, NoopRefresher, SearchIndex, ViewRefresher};
pub use images::ImageCache;
pub use newest::{NewestComicActor, NewestComicHandle};
pub use source::ComicSource;
pub use store::{MetadataStore, Partition, Stat};
pub use version::{CACHE_VERSION, VersionGuard};

pub use comic_client::ComicRecord;
