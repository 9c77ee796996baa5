//! Downloadable analysis reports
//!
//! A [`ReportDocument`] is built from the classification and whatever
//! enrichment results exist, rendered to a styled HTML snapshot, then laid
//! out on fixed A4 pages by the [`Paginator`].

pub mod document;
pub mod generator;
pub mod paginate;

use thiserror::Error;

pub use document::{Block, ReportDocument, ReportHeader, Section, SectionKind, NOT_GENERATED};
pub use generator::{report_file_name, GenerationState, RenderedReport, ReportArtifact, ReportGenerator};
pub use paginate::{Line, LineStyle, Page, PageFormat, Paginator};

/// Report generation errors
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("Page layout failed: {0}")]
    Layout(String),

    #[error("Failed to write report: {0}")]
    Io(String),

    #[error("A report is already being generated")]
    Busy,

    #[error("No classification to report on")]
    NoClassification,
}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
