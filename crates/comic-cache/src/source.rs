//! The remote comic service as seen by the cache.

use async_trait::async_trait;
use comic_client::{ByteStream, ClientError, ComicClient};

use crate::ComicRecord;

/// Where comics come from when they aren't cached.
#[async_trait]
pub trait ComicSource: Send + Sync {
    /// Fetch the metadata of comic `number`.
    async fn fetch(&self, number: i64) -> Result<ComicRecord, ClientError>;

    /// Fetch the metadata of the newest comic.
    async fn fetch_newest(&self) -> Result<ComicRecord, ClientError>;

    /// Start downloading the image at `url`.
    async fn fetch_image(&self, url: &str) -> Result<ByteStream, ClientError>;
}

#[async_trait]
impl ComicSource for ComicClient {
    async fn fetch(&self, number: i64) -> Result<ComicRecord, ClientError> {
        ComicClient::fetch(self, number).await
    }

    async fn fetch_newest(&self) -> Result<ComicRecord, ClientError> {
        ComicClient::fetch_newest(self).await
    }

    async fn fetch_image(&self, url: &str) -> Result<ByteStream, ClientError> {
        ComicClient::fetch_image(self, url).await
    }
}
