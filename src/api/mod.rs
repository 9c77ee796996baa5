//! HTTP surface over the analysis pipeline, reports, fleet and
//! communication log

pub mod handlers;
pub mod routes;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;
use crate::fleet::StoreError;
use crate::llm::ModelError;
use crate::report::ReportError;

pub use handlers::AppState;
pub use routes::build_router;

/// Machine-readable error codes
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const SCHEMA_ERROR: &str = "SCHEMA_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// Repeating the action may succeed
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

pub(crate) fn validation_error(message: impl Into<String>) -> ApiFailure {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(error_codes::VALIDATION_ERROR, message)),
    )
}

fn model_failure(e: &ModelError) -> (StatusCode, &'static str) {
    match e {
        ModelError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, error_codes::TIMEOUT),
        ModelError::Schema(_) => (StatusCode::BAD_GATEWAY, error_codes::SCHEMA_ERROR),
        ModelError::Request(_) | ModelError::Upstream(_) => {
            (StatusCode::BAD_GATEWAY, error_codes::UPSTREAM_ERROR)
        }
        ModelError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR),
    }
}

pub(crate) fn analysis_failure(e: AnalysisError) -> ApiFailure {
    let (status, code) = match &e {
        AnalysisError::MissingFile
        | AnalysisError::MissingSelection(_)
        | AnalysisError::UnsupportedFileType(_)
        | AnalysisError::InvalidInput(_)
        | AnalysisError::NotRequested(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
        AnalysisError::NoClassification
        | AnalysisError::AnalysisInProgress
        | AnalysisError::Cancelled
        | AnalysisError::StaleSession(_)
        | AnalysisError::EnrichmentInFlight(_) => (StatusCode::CONFLICT, error_codes::CONFLICT),
        AnalysisError::Model(model) => model_failure(model),
    };

    (
        status,
        Json(ApiError::new(code, e.to_string()).retryable(e.is_retryable())),
    )
}

pub(crate) fn store_failure(e: StoreError) -> ApiFailure {
    let (status, code, retryable) = match &e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, false),
        StoreError::Forbidden(_) => (StatusCode::FORBIDDEN, error_codes::FORBIDDEN, false),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, error_codes::CONFLICT, false),
        StoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, false),
        StoreError::Request(_) | StoreError::Upstream(_) => {
            (StatusCode::BAD_GATEWAY, error_codes::UPSTREAM_ERROR, true)
        }
        StoreError::Decode(_) => (StatusCode::BAD_GATEWAY, error_codes::SCHEMA_ERROR, true),
        StoreError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR, true),
    };

    (status, Json(ApiError::new(code, e.to_string()).retryable(retryable)))
}

pub(crate) fn report_failure(e: ReportError) -> ApiFailure {
    let (status, code, retryable) = match &e {
        ReportError::Busy => (StatusCode::CONFLICT, error_codes::CONFLICT, true),
        ReportError::NoClassification => (StatusCode::CONFLICT, error_codes::CONFLICT, false),
        ReportError::Layout(_) | ReportError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR, true)
        }
    };

    (status, Json(ApiError::new(code, e.to_string()).retryable(retryable)))
}
