//! Vidrec library crate
//!
//! Hybrid video recommendations (collaborative + content-based) and click-through
//! metrics. Re-exports core modules for integration tests and embedding callers.

pub mod config;
pub mod error;
pub mod metrics;
pub mod recommendation;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{MetricsStore, MetricsSummary};
pub use recommendation::*;
