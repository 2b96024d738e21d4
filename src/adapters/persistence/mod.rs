//! Persistence Adapters - File-backed Cache
//!
//! Implements the `CacheStore` port with a single JSON document
//! replaced atomically (tmp file, then rename) on every export.
//! No database dependency.

pub mod cache_file;

pub use cache_file::CacheFile;
