//! Repository Port - Cache Blob Persistence Interface
//!
//! The cache is a single JSON document replaced wholesale on every
//! export. The port deals in raw bytes; encoding lives in the use case.

use async_trait::async_trait;

use crate::domain::error::CacheError;

/// Trait for whole-file cache persistence.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
  /// Read the whole cache blob. `Ok(None)` means no cache exists yet.
  async fn read(&self) -> Result<Option<Vec<u8>>, CacheError>;

  /// Replace the whole cache blob. Readers never observe a partial write.
  async fn write(&self, bytes: &[u8]) -> Result<(), CacheError>;

  /// Human-readable location for logs.
  fn location(&self) -> String;
}
