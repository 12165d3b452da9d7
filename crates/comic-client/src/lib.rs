//! Client for the daily comic service.
//!
//! This crate knows how to talk to the remote service and what a comic
//! looks like on the wire. It does no caching; see `comic-cache` for that.
//!
//! ## Features
//!
//! - **Record**: the [`ComicRecord`] metadata document and its date helpers
//! - **HTTP Client**: fetch a comic by number, the newest comic, or an image body

mod client;
mod error;
mod record;

pub use client::{ByteStream, ClientConfig, ComicClient, DEFAULT_SERVICE_URL};
pub use error::ClientError;
pub use record::ComicRecord;
