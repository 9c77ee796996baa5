//! Report generation with retryable state

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use crate::analysis::{AnalysisContext, EnrichmentOutputs};
use crate::config::ReportConfig;
use crate::metrics::METRICS;

use super::document::{ReportDocument, SectionKind};
use super::paginate::{PageFormat, Paginator};
use super::ReportError;

pub const CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Generation lifecycle, independent of analysis state
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum GenerationState {
    #[default]
    Idle,
    Generating,
    Ready { path: PathBuf },
    Failed { message: String },
}

/// Paginated report held in memory
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub html: String,
    pub page_count: usize,
    pub sections: Vec<SectionKind>,
    pub complete: bool,
}

/// Report written to disk
#[derive(Debug, Clone, Serialize)]
pub struct ReportArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub content_type: &'static str,
    pub size_bytes: usize,
    pub page_count: usize,
    pub sections: Vec<SectionKind>,
    /// Every requested enrichment had resolved
    pub complete: bool,
}

/// `<Product>-Report-<assetId>-<YYYY-MM-DD>.html`
pub fn report_file_name(product: &str, asset_id: &str, date: NaiveDate) -> String {
    let sanitized: String = asset_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let asset = if sanitized.is_empty() { "asset".to_string() } else { sanitized };

    format!("{}-Report-{}-{}.html", product, asset, date.format("%Y-%m-%d"))
}

/// Marks an abandoned generation as failed so it can be retried
struct GeneratingGuard<'a> {
    state: &'a Mutex<GenerationState>,
    armed: bool,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            warn!("Report generation interrupted");
            *state = GenerationState::Failed {
                message: "Report generation was interrupted".to_string(),
            };
        }
    }
}

pub struct ReportGenerator {
    config: ReportConfig,
    paginator: Paginator,
    state: Mutex<GenerationState>,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Result<Self, ReportError> {
        let paginator = Paginator::new(PageFormat::a4(&config))?;
        Ok(Self {
            config,
            paginator,
            state: Mutex::new(GenerationState::Idle),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GenerationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> GenerationState {
        self.lock().clone()
    }

    /// Build, lay out and render without touching the filesystem
    pub fn render(
        &self,
        context: &AnalysisContext,
        outputs: &EnrichmentOutputs,
        generated_at: DateTime<Utc>,
    ) -> RenderedReport {
        let doc = ReportDocument::build(&self.config.product_name, context, outputs, generated_at);
        let pages = self.paginator.layout(&doc);
        let html = self.paginator.render_html(&doc, &pages);

        RenderedReport {
            file_name: report_file_name(
                &self.config.product_name,
                &context.asset_id,
                generated_at.date_naive(),
            ),
            html,
            page_count: pages.len(),
            sections: doc.section_kinds(),
            complete: outputs.is_complete(context.criticality),
        }
    }

    /// Render and write the report into the output directory
    ///
    /// A failure is recorded in the generation state and can be retried.
    pub async fn generate(
        &self,
        context: &AnalysisContext,
        outputs: &EnrichmentOutputs,
        generated_at: DateTime<Utc>,
    ) -> Result<ReportArtifact, ReportError> {
        {
            let mut state = self.lock();
            if *state == GenerationState::Generating {
                return Err(ReportError::Busy);
            }
            *state = GenerationState::Generating;
        }
        let mut guard = GeneratingGuard {
            state: &self.state,
            armed: true,
        };

        let rendered = self.render(context, outputs, generated_at);
        let result = write_atomic(&self.config.output_dir, &rendered.file_name, rendered.html.as_bytes()).await;

        METRICS.record_report(result.is_ok());

        let mut state = self.lock();
        guard.armed = false;
        match result {
            Ok(path) => {
                info!(
                    asset_id = %context.asset_id,
                    pages = rendered.page_count,
                    path = %path.display(),
                    "Report generated"
                );
                *state = GenerationState::Ready { path: path.clone() };
                Ok(ReportArtifact {
                    file_name: rendered.file_name,
                    path,
                    content_type: CONTENT_TYPE,
                    size_bytes: rendered.html.len(),
                    page_count: rendered.page_count,
                    sections: rendered.sections,
                    complete: rendered.complete,
                })
            }
            Err(e) => {
                error!(asset_id = %context.asset_id, "Report generation failed: {}", e);
                *state = GenerationState::Failed {
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }
}

async fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ReportError> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(file_name);
    let tmp = dir.join(format!(".{}.tmp", file_name));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::{ClassificationResult, FaultLabel};
    use crate::analysis::Criticality;
    use chrono::TimeZone;

    fn context() -> AnalysisContext {
        AnalysisContext {
            asset_id: "North Yard/T-3".to_string(),
            criticality: Criticality::High,
            classification: ClassificationResult {
                fault_label: FaultLabel::CoreGroundingFault,
                confidence: 0.9,
                data_summary: "Low-frequency anomaly".to_string(),
            },
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_file_name_is_deterministic_and_sanitized() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();
        assert_eq!(
            report_file_name("FRAInsight", "North Yard/T-3", date),
            "FRAInsight-Report-North_Yard_T-3-2024-11-02.html"
        );
        assert_eq!(
            report_file_name("FRAInsight", "", date),
            "FRAInsight-Report-asset-2024-11-02.html"
        );
    }

    #[tokio::test]
    async fn test_generate_writes_file_and_tracks_state() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: dir.path().join("reports"),
            ..ReportConfig::default()
        })
        .unwrap();
        assert_eq!(generator.state(), GenerationState::Idle);

        let artifact = generator
            .generate(&context(), &EnrichmentOutputs::default(), at())
            .await
            .unwrap();

        assert!(artifact.path.exists());
        assert!(!artifact.complete);
        assert_eq!(artifact.sections.len(), 8);
        let html = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(html.contains("Not generated"));
        assert_eq!(
            generator.state(),
            GenerationState::Ready {
                path: artifact.path.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut generator = ReportGenerator::new(ReportConfig {
            output_dir: blocker.clone(),
            ..ReportConfig::default()
        })
        .unwrap();

        let result = generator
            .generate(&context(), &EnrichmentOutputs::default(), at())
            .await;
        assert!(matches!(result, Err(ReportError::Io(_))));
        assert!(matches!(generator.state(), GenerationState::Failed { .. }));

        generator.config.output_dir = dir.path().join("ok");
        let retry = generator
            .generate(&context(), &EnrichmentOutputs::default(), at())
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_busy_while_generating() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: dir.path().to_path_buf(),
            ..ReportConfig::default()
        })
        .unwrap();

        *generator.lock() = GenerationState::Generating;
        let result = generator
            .generate(&context(), &EnrichmentOutputs::default(), at())
            .await;
        assert!(matches!(result, Err(ReportError::Busy)));
        assert_eq!(generator.state(), GenerationState::Generating);
    }

    #[tokio::test]
    async fn test_dropped_generation_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: dir.path().join("reports"),
            ..ReportConfig::default()
        })
        .unwrap();

        // The file write yields on its first poll, so the zero timeout drops it
        let _ = tokio::time::timeout(
            std::time::Duration::ZERO,
            generator.generate(&context(), &EnrichmentOutputs::default(), at()),
        )
        .await;
        assert_ne!(generator.state(), GenerationState::Generating);

        let retry = generator
            .generate(&context(), &EnrichmentOutputs::default(), at())
            .await;
        assert!(retry.is_ok());
        assert!(matches!(generator.state(), GenerationState::Ready { .. }));
    }
}
