//! Error types for the comic cache.

use comic_client::ClientError;
use thiserror::Error;

use crate::codec::KeyError;
use crate::hooks::IndexError;

/// Errors that can occur in cache operations.
///
/// Most of these are advisory: lookups still hand back a usable record, and
/// the error only tells the caller whether to offer a retry or show that the
/// viewer is offline.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The comic is not in the local store. Expected; triggers a fetch.
    #[error("comic {0} is not cached")]
    Miss(i64),

    /// The local store could not be opened or accessed.
    #[error("local store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A stored entry could not be decoded.
    #[error("cached entry for comic {number} is corrupt: {source}")]
    Corrupt {
        number: i64,
        #[source]
        source: serde_json::Error,
    },

    /// A stored key could not be decoded.
    #[error("cached key is corrupt: {0}")]
    CorruptKey(#[from] KeyError),

    /// A write was attempted inside a read transaction.
    #[error("cannot write in a read-only transaction")]
    ReadOnly,

    /// The cache has been closed.
    #[error("cache is closed")]
    Closed,

    /// The comic service could not be reached or answered with an error.
    #[error("comic service unavailable: {0}")]
    RemoteUnavailable(#[source] ClientError),

    /// The comic service says this comic does not exist.
    #[error("comic {0} does not exist")]
    NotFound(i64),

    /// The search index rejected a freshly cached record.
    #[error("failed to index comic {number}: {source}")]
    Index {
        number: i64,
        #[source]
        source: IndexError,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Classify a service error for comic `number`.
    pub fn from_client(number: i64, err: ClientError) -> Self {
        if err.is_not_found() {
            CacheError::NotFound(number)
        } else {
            CacheError::RemoteUnavailable(err)
        }
    }

    /// Whether the viewer should present itself as offline.
    pub fn is_offline(&self) -> bool {
        matches!(self, CacheError::RemoteUnavailable(_))
    }

    /// Whether the comic is known not to exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Whether the failure is in local storage rather than the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CacheError::Store(_)
                | CacheError::Corrupt { .. }
                | CacheError::CorruptKey(_)
                | CacheError::ReadOnly
                | CacheError::Closed
                | CacheError::Io(_)
        )
    }
}
