//! FRA analysis service
//!
//! Uploaded frequency response analysis files are validated, classified by
//! an external model, enriched by parallel follow-up requests and turned
//! into a paginated report. A fleet view and per-transformer communication
//! log sit alongside the analysis pipeline.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod fleet;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod report;

pub use config::Config;
pub use error::{Error, Result};
