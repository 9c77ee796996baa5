//! Analysis orchestration
//!
//! An upload passes the [`validator`], is classified once by the external
//! model, then fans out into independent enrichment requests whose results
//! accumulate in a session-scoped [`Aggregator`].

pub mod aggregator;
pub mod assistant;
pub mod classifier;
pub mod compass;
pub mod enrichment;
pub mod factors;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod supervisor;
pub mod validator;

use thiserror::Error;

use crate::llm::ModelError;

pub use aggregator::Aggregator;
pub use assistant::{Assistant, ChatReply};
pub use classifier::Classifier;
pub use compass::CompassMode;
pub use enrichment::Enricher;
pub use factors::FactorSumPolicy;
pub use models::{
    AnalysisContext, AnalysisSessionId, ClassificationResult, Criticality, EnrichmentKind,
    EnrichmentOutputs, EnrichmentPayload, FaultLabel,
};
pub use pipeline::{AnalysisPipeline, PipelinePhase, PipelineSnapshot, StartedAnalysis};
pub use supervisor::{EnrichmentStatus, EnrichmentSupervisor, FanOut};
pub use validator::{is_supported, validate_file_name, AnalysisRequest, FileKind, RequestMeta};

/// Analysis errors
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("No file was provided")]
    MissingFile,

    #[error("No {0} was selected")]
    MissingSelection(String),

    #[error("Unsupported file type: {0} (accepted: csv, xml, bin, dat, txt)")]
    UnsupportedFileType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No classification result for the current session")]
    NoClassification,

    #[error("An analysis is already being classified")]
    AnalysisInProgress,

    #[error("Analysis was reset before classification finished")]
    Cancelled,

    #[error("Result belongs to session {0}, which is no longer active")]
    StaleSession(AnalysisSessionId),

    #[error("Enrichment '{0}' was not requested for this session")]
    NotRequested(EnrichmentKind),

    #[error("Enrichment '{0}' is still in flight")]
    EnrichmentInFlight(EnrichmentKind),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl AnalysisError {
    /// Whether repeating the user action can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_retryable(),
            Self::AnalysisInProgress | Self::EnrichmentInFlight(_) | Self::Cancelled => true,
            _ => false,
        }
    }

    /// Input rejected before any external call
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingFile
                | Self::MissingSelection(_)
                | Self::UnsupportedFileType(_)
                | Self::InvalidInput(_)
        )
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::MissingSelection(_) => "missing_selection",
            Self::UnsupportedFileType(_) => "unsupported_type",
            Self::InvalidInput(_) => "invalid_input",
            Self::NoClassification => "no_classification",
            Self::AnalysisInProgress => "in_progress",
            Self::Cancelled => "cancelled",
            Self::StaleSession(_) => "stale_session",
            Self::NotRequested(_) => "not_requested",
            Self::EnrichmentInFlight(_) => "in_flight",
            Self::Model(_) => "model",
        }
    }
}
