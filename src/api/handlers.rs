//! Request handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::analysis::{
    AnalysisError, AnalysisPipeline, Assistant, ChatReply, Criticality, EnrichmentKind,
    PipelineSnapshot, StartedAnalysis,
};
use crate::fleet::{
    CommunicationLog, CommunicationLogEntry, FleetCache, FleetFilter, FleetSummary, LogThread,
    Operator, OperatorContext, RemoteStore, Role, StoreError, Transformer, TransformerStatus,
};
use crate::metrics::METRICS;
use crate::report::{GenerationState, ReportArtifact, ReportError, ReportGenerator};

use super::{analysis_failure, report_failure, store_failure, validation_error, ApiFailure};

pub const OPERATOR_ROLE_HEADER: &str = "x-operator-role";
pub const OPERATOR_NAME_HEADER: &str = "x-operator-name";

type ApiResult<T> = Result<Json<T>, ApiFailure>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub assistant: Assistant,
    pub reports: Arc<ReportGenerator>,
    pub comm_log: CommunicationLog,
    pub store: Arc<dyn RemoteStore>,
    pub fleet: Arc<RwLock<FleetCache>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<AnalysisPipeline>,
        assistant: Assistant,
        reports: Arc<ReportGenerator>,
        store: Arc<dyn RemoteStore>,
        fleet: Arc<RwLock<FleetCache>>,
    ) -> Self {
        Self {
            pipeline,
            assistant,
            reports,
            comm_log: CommunicationLog::new(Arc::clone(&store)),
            store,
            fleet,
        }
    }

    /// Build the per-request operator context from the identity headers
    fn operator_context(&self, headers: &HeaderMap) -> Result<OperatorContext, ApiFailure> {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let role: Role = header_value(OPERATOR_ROLE_HEADER)
            .ok_or_else(|| validation_error("missing X-Operator-Role header"))?
            .parse()
            .map_err(validation_error)?;
        let name = header_value(OPERATOR_NAME_HEADER)
            .ok_or_else(|| validation_error("missing X-Operator-Name header"))?;

        let operator = Operator::new(name, role).map_err(store_failure)?;
        Ok(OperatorContext::new(operator, Arc::clone(&self.fleet)))
    }
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartAnalysisRequest {
    pub file_name: String,
    /// Uploaded file as text
    pub file_content: String,
    #[serde(default)]
    pub asset_id: String,
    pub criticality: Option<Criticality>,
}

pub async fn start_analysis(
    State(state): State<AppState>,
    Json(payload): Json<StartAnalysisRequest>,
) -> ApiResult<StartedAnalysis> {
    let criticality = payload
        .criticality
        .ok_or_else(|| analysis_failure(AnalysisError::MissingSelection("criticality".to_string())))?;

    state
        .pipeline
        .start(
            &payload.file_name,
            payload.file_content.as_bytes(),
            &payload.asset_id,
            criticality,
        )
        .await
        .map(Json)
        .map_err(analysis_failure)
}

pub async fn get_analysis(State(state): State<AppState>) -> Json<PipelineSnapshot> {
    Json(state.pipeline.state())
}

pub async fn reset_analysis(State(state): State<AppState>) -> Json<PipelineSnapshot> {
    state.pipeline.reset();
    Json(state.pipeline.state())
}

pub async fn retry_enrichment(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<(StatusCode, Json<PipelineSnapshot>), ApiFailure> {
    let kind: EnrichmentKind = kind.parse().map_err(validation_error)?;
    state
        .pipeline
        .retry_enrichment(kind)
        .map_err(analysis_failure)?;
    Ok((StatusCode::ACCEPTED, Json(state.pipeline.state())))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// Wait for every requested enrichment to settle first
    #[serde(default)]
    pub wait: bool,
}

pub async fn generate_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ReportArtifact> {
    if query.wait {
        state.pipeline.wait_settled().await;
    }

    let (context, outputs) = state
        .pipeline
        .report_input()
        .ok_or_else(|| report_failure(ReportError::NoClassification))?;

    state
        .reports
        .generate(&context, &outputs, Utc::now())
        .await
        .map(Json)
        .map_err(report_failure)
}

pub async fn download_report(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiFailure> {
    let (context, outputs) = state
        .pipeline
        .report_input()
        .ok_or_else(|| report_failure(ReportError::NoClassification))?;
    let rendered = state.reports.render(&context, &outputs, Utc::now());

    Ok((
        [
            (header::CONTENT_TYPE, crate::report::generator::CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.file_name),
            ),
        ],
        rendered.html,
    ))
}

pub async fn report_status(State(state): State<AppState>) -> Json<GenerationState> {
    Json(state.reports.state())
}

#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    pub question: String,
    /// Ground the answer on the current analysis
    #[serde(default = "default_true")]
    pub use_analysis: bool,
}

fn default_true() -> bool {
    true
}

pub async fn ask_assistant(
    State(state): State<AppState>,
    Json(payload): Json<AssistantRequest>,
) -> ApiResult<ChatReply> {
    let context = payload
        .use_analysis
        .then(|| state.pipeline.context())
        .flatten();

    state
        .assistant
        .ask(&payload.question, context.as_ref())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Assistant request failed: {}", e);
            analysis_failure(e)
        })
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct FleetResponse {
    pub summary: FleetSummary,
    pub transformers: Vec<Transformer>,
}

pub async fn list_fleet(
    State(state): State<AppState>,
    Query(filter): Query<FleetFilter>,
) -> Json<FleetResponse> {
    let fleet = state.fleet.read().await;
    Json(FleetResponse {
        summary: fleet.summary(),
        transformers: fleet.list(&filter),
    })
}

pub async fn get_transformer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Transformer> {
    state
        .store
        .get_transformer(&id)
        .await
        .map(Json)
        .map_err(store_failure)
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TransformerStatus,
}

/// Update remote status and mirror it into the local cache
pub async fn update_transformer_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<Transformer> {
    let context = state.operator_context(&headers)?;
    if !context.role().can_update_status() {
        return Err(store_failure(StoreError::Forbidden(format!(
            "{} cannot change transformer status",
            context.role()
        ))));
    }

    let updated = state
        .store
        .update_transformer_status(&id, payload.status)
        .await
        .map_err(store_failure)?;

    context
        .fleet()
        .write()
        .await
        .upsert(updated.clone())
        .await
        .map_err(store_failure)?;

    info!(
        transformer_id = %id,
        status = ?payload.status,
        operator = %context.operator().name,
        "Transformer status updated"
    );
    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// Communication log
// ---------------------------------------------------------------------------

pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<LogThread>> {
    state
        .comm_log
        .thread(&id)
        .await
        .map(Json)
        .map_err(store_failure)
}

#[derive(Debug, Deserialize)]
pub struct NewNoteRequest {
    pub content: String,
    /// Reply to this entry instead of starting a thread
    pub parent_id: Option<Uuid>,
}

pub async fn post_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<NewNoteRequest>,
) -> Result<(StatusCode, Json<CommunicationLogEntry>), ApiFailure> {
    let context = state.operator_context(&headers)?;
    let operator = context.operator();

    let entry = match payload.parent_id {
        Some(parent_id) => {
            state
                .comm_log
                .reply(operator, &id, parent_id, &payload.content)
                .await
        }
        None => state.comm_log.post_note(operator, &id, &payload.content).await,
    }
    .map_err(store_failure)?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn escalate_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<CommunicationLogEntry> {
    let context = state.operator_context(&headers)?;
    state
        .comm_log
        .escalate(context.operator(), entry_id)
        .await
        .map(Json)
        .map_err(store_failure)
}

pub async fn resolve_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<CommunicationLogEntry> {
    let context = state.operator_context(&headers)?;
    state
        .comm_log
        .resolve(context.operator(), entry_id)
        .await
        .map(Json)
        .map_err(store_failure)
}

/// End an operator session and persist the fleet cache
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiFailure> {
    let context = state.operator_context(&headers)?;
    context.logout().await.map_err(store_failure)?;
    Ok(StatusCode::NO_CONTENT)
}
