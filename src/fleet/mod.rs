//! Fleet records, remote table storage, local fleet cache and the
//! communication log

pub mod cache;
pub mod comm_log;
pub mod context;
pub mod models;
pub mod store;

use thiserror::Error;

pub use cache::{FleetCache, FleetFilter, FleetSummary};
pub use comm_log::CommunicationLog;
pub use context::{Operator, OperatorContext};
pub use models::{
    CommunicationLogEntry, Coordinates, EscalationStatus, LogThread, NewLogEntry, Role,
    Transformer, TransformerStatus,
};
pub use store::{InMemoryStore, RemoteStore, RestStore};

/// Storage and communication-log errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage returned an error: {0}")]
    Upstream(String),

    #[error("Unexpected storage payload: {0}")]
    Decode(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}
