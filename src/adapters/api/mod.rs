//! Query and Push API Adapter
//!
//! Exposes the reconciled state to clients over HTTP and WebSocket.
//! The gateway owns the push channel and the query handlers; the
//! server maps them onto axum routes next to the health checks and
//! the metrics endpoint.
//!
//! Sub-modules:
//! - `gateway`: push fan-out and query handlers
//! - `server`: axum routes and graceful shutdown
//! - `types`: response envelope and payload types

pub mod gateway;
pub mod server;
pub mod types;

pub use gateway::Gateway;
pub use server::ApiServer;
