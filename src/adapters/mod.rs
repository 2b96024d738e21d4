//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, file I/O, HTTP server). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Query surface and push channel (axum)
//! - `feeds`: Upstream ticker sources (Binance REST, simulated)
//! - `metrics`: Prometheus metrics export
//! - `persistence`: Atomic JSON cache file

pub mod api;
pub mod feeds;
pub mod metrics;
pub mod persistence;
