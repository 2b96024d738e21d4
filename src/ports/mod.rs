//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `TickerSource`: Upstream market-data ticker capability
//! - `CacheStore`: Whole-file cache blob persistence
//! - `Notifier`: Push channel towards subscribers
//! - `Clock`: Wall-clock time
//! - `RelayMetrics`: Counters and timings for the use cases

pub mod broadcast;
pub mod clock;
pub mod market_feed;
pub mod metrics;
pub mod repository;
