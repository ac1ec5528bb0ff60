//! Persistent caching.
//!
//! - [`CacheStore`]: SQLite-backed `(namespace, key) -> (value, etag)` map
//! - [`ImageStore`]: content-addressed tree of result images

mod images;
mod store;

pub use images::ImageStore;
pub use store::CacheStore;

/// Database file name under the work directory.
pub const CACHE_FILENAME: &str = "cache.sqlite";
