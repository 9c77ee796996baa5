//! Analysis session orchestration

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::llm::ModelClient;
use crate::metrics::METRICS;

use super::aggregator::Aggregator;
use super::classifier::Classifier;
use super::enrichment::Enricher;
use super::models::{
    AnalysisContext, AnalysisSessionId, ClassificationResult, Criticality, EnrichmentKind,
    EnrichmentOutputs,
};
use super::supervisor::{EnrichmentSupervisor, FanOut, StatusMap};
use super::validator::{AnalysisRequest, RequestMeta};
use super::AnalysisError;

/// Where the pipeline currently is
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Idle,
    Classifying,
    Enriching,
    Settled,
}

/// Returned as soon as classification lands, before enrichments resolve
#[derive(Debug, Clone, Serialize)]
pub struct StartedAnalysis {
    pub session_id: AnalysisSessionId,
    pub classification: ClassificationResult,
}

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub session_id: Option<AnalysisSessionId>,
    pub phase: PipelinePhase,
    pub request: Option<RequestMeta>,
    pub classification: Option<ClassificationResult>,
    pub statuses: StatusMap,
    pub outputs: EnrichmentOutputs,
    pub last_error: Option<String>,
}

struct ActiveSession {
    request: RequestMeta,
    fan_out: FanOut,
}

#[derive(Default)]
struct PipelineState {
    classifying: bool,
    generation: u64,
    active: Option<ActiveSession>,
    last_error: Option<String>,
}

impl PipelineState {
    fn phase(&self) -> PipelinePhase {
        if self.classifying {
            PipelinePhase::Classifying
        } else {
            match &self.active {
                None => PipelinePhase::Idle,
                Some(active) if active.fan_out.is_settled() => PipelinePhase::Settled,
                Some(_) => PipelinePhase::Enriching,
            }
        }
    }
}

/// Clears the classifying flag if `start` is dropped mid-classification
struct ClassifyingGuard<'a> {
    state: &'a Mutex<PipelineState>,
    generation: u64,
    armed: bool,
}

impl ClassifyingGuard<'_> {
    /// Caller holds the state lock and takes over clearing the flag
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClassifyingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation == self.generation {
            state.classifying = false;
            debug!(generation = self.generation, "Classification abandoned");
        }
    }
}

/// Validator, classifier, fan-out and aggregator for one operator view
pub struct AnalysisPipeline {
    classifier: Classifier,
    supervisor: EnrichmentSupervisor,
    aggregator: Arc<Aggregator>,
    state: Mutex<PipelineState>,
}

impl AnalysisPipeline {
    pub fn new(client: Arc<dyn ModelClient>, config: &AnalysisConfig) -> Self {
        let aggregator = Arc::new(Aggregator::new());
        let enricher = Arc::new(Enricher::new(
            Arc::clone(&client),
            config.factor_sum_policy,
            config.compass_mode,
        ));

        Self {
            classifier: Classifier::new(client),
            supervisor: EnrichmentSupervisor::new(enricher, Arc::clone(&aggregator)),
            aggregator,
            state: Mutex::new(PipelineState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, classify and launch enrichment for an upload
    ///
    /// Rejected input makes no external call and leaves the phase as it was.
    /// A failed classification keeps the previous session intact.
    pub async fn start(
        &self,
        file_name: &str,
        bytes: &[u8],
        asset_id: &str,
        criticality: Criticality,
    ) -> Result<StartedAnalysis, AnalysisError> {
        let request = match AnalysisRequest::new(file_name, bytes, asset_id, criticality) {
            Ok(request) => request,
            Err(e) => {
                METRICS.record_rejected_upload(e.reason());
                warn!(file_name, "Upload rejected: {}", e);
                self.lock().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let generation = {
            let mut state = self.lock();
            if state.classifying {
                return Err(AnalysisError::AnalysisInProgress);
            }
            state.classifying = true;
            state.generation
        };
        let mut guard = ClassifyingGuard {
            state: &self.state,
            generation,
            armed: true,
        };

        info!(
            asset_id = request.asset_id(),
            file_name = request.file_name(),
            criticality = %criticality,
            "Starting analysis"
        );

        let result = self.classifier.classify(&request).await;

        let mut state = self.lock();
        guard.disarm();
        if state.generation != generation {
            return Err(AnalysisError::Cancelled);
        }
        state.classifying = false;

        let classification = match result {
            Ok(classification) => classification,
            Err(e) => {
                state.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        if let Some(previous) = state.active.take() {
            previous.fan_out.cancel();
        }

        let session_id = AnalysisSessionId::new();
        self.aggregator.begin(session_id);

        let context = AnalysisContext {
            asset_id: request.asset_id().to_string(),
            criticality,
            classification: classification.clone(),
        };
        let fan_out = self.supervisor.launch(
            session_id,
            context,
            &EnrichmentKind::for_criticality(criticality),
        );

        state.active = Some(ActiveSession {
            request: request.meta(),
            fan_out,
        });
        state.last_error = None;

        Ok(StartedAnalysis {
            session_id,
            classification,
        })
    }

    /// Manually re-run one enrichment kind for the current session
    pub fn retry_enrichment(&self, kind: EnrichmentKind) -> Result<(), AnalysisError> {
        let state = self.lock();
        let active = state.active.as_ref().ok_or(AnalysisError::NoClassification)?;
        active.fan_out.retry(kind)
    }

    /// Cancel everything and return to idle
    pub fn reset(&self) {
        let mut state = self.lock();
        if let Some(active) = state.active.take() {
            active.fan_out.cancel();
            info!(session_id = %active.fan_out.session(), "Analysis reset");
        }
        state.generation += 1;
        state.classifying = false;
        state.last_error = None;
        self.aggregator.clear();
    }

    /// Resolves when the current session's enrichments have all settled
    pub async fn wait_settled(&self) -> Option<StatusMap> {
        let fan_out = self.lock().active.as_ref().map(|a| a.fan_out.clone())?;
        Some(fan_out.wait_settled().await)
    }

    pub fn context(&self) -> Option<AnalysisContext> {
        self.lock()
            .active
            .as_ref()
            .map(|a| a.fan_out.context().clone())
    }

    /// Classification and enrichment outputs of the same session
    pub fn report_input(&self) -> Option<(AnalysisContext, EnrichmentOutputs)> {
        let state = self.lock();
        let active = state.active.as_ref()?;
        Some((active.fan_out.context().clone(), self.aggregator.snapshot()))
    }

    pub fn phase(&self) -> PipelinePhase {
        self.lock().phase()
    }

    pub fn state(&self) -> PipelineSnapshot {
        let state = self.lock();
        let phase = state.phase();

        match &state.active {
            Some(active) => PipelineSnapshot {
                session_id: Some(active.fan_out.session()),
                phase,
                request: Some(active.request.clone()),
                classification: Some(active.fan_out.context().classification.clone()),
                statuses: active.fan_out.statuses(),
                outputs: self.aggregator.snapshot(),
                last_error: state.last_error.clone(),
            },
            None => PipelineSnapshot {
                session_id: None,
                phase,
                request: None,
                classification: None,
                statuses: StatusMap::new(),
                outputs: EnrichmentOutputs::default(),
                last_error: state.last_error.clone(),
            },
        }
    }

    /// Cancel in-flight work on process shutdown
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}
