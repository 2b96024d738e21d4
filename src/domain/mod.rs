//! Domain layer - snapshots, state generations and the rules around them.
//!
//! Pure logic: no network or file I/O here (hexagonal architecture inner
//! ring). The retry executor is the only async piece; it sleeps between
//! attempts but performs no I/O of its own.

pub mod error;
pub mod retry;
pub mod schedule;
pub mod snapshot;
pub mod state;
pub mod telemetry;
pub mod validity;

// Re-export core types for convenience
pub use error::{CacheError, Classify, ErrorClass, FeedError, QueryError, StateError, ValidationError};
pub use retry::{RetryError, RetryPolicy};
pub use snapshot::{AssetSymbol, AssetTick, Generation, Generations, PairKey, Signature, Snapshot};
pub use state::{MergeSummary, Reconciliation, SharedState, StateStore};
pub use telemetry::{FeedState, Telemetry};
pub use validity::{AgeLimit, ConsolidatedReport, ValidityReport, ValidityTable};
