//! Polaris Common Library
//!
//! Shared code for the Polaris proposal tooling including:
//! - Observing proposal and instrument payload models
//! - Service traits and the REST client behind them
//! - Error types and handling
//! - Configuration management
//! - Metrics and tracing setup

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use auth::Credential;
pub use client::{DocumentStore, InstrumentBridge, PolarisClient, ProposalService};
pub use config::AppConfig;
pub use errors::{AppError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default REST API root of the proposal tool
pub const DEFAULT_API_BASE: &str = "http://localhost:8084/pst/api";
