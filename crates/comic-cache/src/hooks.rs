//! Collaborators the cache pushes into.
//!
//! Both traits come with a null object so the cache can run without a
//! search index or an open window.

use crate::{ComicRecord, Stat};

/// Error returned by a [`SearchIndex`].
pub type IndexError = Box<dyn std::error::Error + Send + Sync>;

/// Full-text index fed with every comic fetched from the network.
pub trait SearchIndex: Send + Sync {
    /// Add or replace `comic` in the index.
    fn index(&self, comic: &ComicRecord) -> Result<(), IndexError>;
}

/// Index that accepts everything and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndex;

impl SearchIndex for NoopIndex {
    fn index(&self, _comic: &ComicRecord) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Progress sink for bulk downloads.
///
/// Implementations must silently do nothing when the view they would update
/// is gone. Every method defaults to a no-op.
pub trait ViewRefresher: Send + Sync {
    /// Recount cached metadata and show the result.
    fn refresh_metadata(&self) {}

    /// Show an already computed metadata count.
    fn refresh_metadata_with(&self, _stat: Stat) {}

    /// Recount cached images and show the result.
    fn refresh_images(&self) {}

    /// Show an already computed image count.
    fn refresh_images_with(&self, _stat: Stat) {}
}

/// Refresher used when no view is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefresher;

impl ViewRefresher for NoopRefresher {}
