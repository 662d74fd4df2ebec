//! Media Service
//!
//! Video ingestion for NexusHub: accepts uploads, transcodes them to HLS with a
//! thumbnail, publishes the artifacts to object storage and relays progress to
//! connected clients.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
