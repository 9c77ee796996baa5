//! Router configuration

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

use super::handlers::{self, AppState};

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Analysis
        .route(
            "/api/v1/analysis",
            post(handlers::start_analysis).get(handlers::get_analysis),
        )
        .route("/api/v1/analysis/reset", post(handlers::reset_analysis))
        .route(
            "/api/v1/analysis/enrichments/:kind/retry",
            post(handlers::retry_enrichment),
        )
        .route(
            "/api/v1/analysis/report",
            post(handlers::generate_report).get(handlers::download_report),
        )
        .route("/api/v1/analysis/report/status", get(handlers::report_status))
        .route("/api/v1/assistant", post(handlers::ask_assistant))
        // Fleet and communication log
        .route("/api/v1/fleet", get(handlers::list_fleet))
        .route("/api/v1/transformers/:id", get(handlers::get_transformer))
        .route(
            "/api/v1/transformers/:id/status",
            post(handlers::update_transformer_status),
        )
        .route(
            "/api/v1/transformers/:id/log",
            get(handlers::get_log).post(handlers::post_log),
        )
        .route("/api/v1/log/:entry_id/escalate", post(handlers::escalate_entry))
        .route("/api/v1/log/:entry_id/resolve", post(handlers::resolve_entry))
        .route("/api/v1/session/logout", post(handlers::logout))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisPipeline, Assistant};
    use crate::config::{AnalysisConfig, ReportConfig};
    use crate::fleet::{FleetCache, InMemoryStore, RemoteStore};
    use crate::llm::{ModelClient, ModelError, Prompt};
    use crate::report::ReportGenerator;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for CountingClient {
        async fn complete_json(&self, prompt: &Prompt) -> Result<Value, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match prompt.operation {
                "classify" => Ok(json!({
                    "faultClassification": "Winding Deformation",
                    "confidenceScore": 0.85,
                    "rawFraDataSummary": "Resonance shift near 12 kHz"
                })),
                "assistant" => Ok(json!({"answer": "Check clamping pressure."})),
                _ => Err(ModelError::Upstream("unavailable".to_string())),
            }
        }
    }

    struct Harness {
        router: Router,
        client: Arc<CountingClient>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::default());
        let model: Arc<dyn ModelClient> = client.clone();

        let pipeline = Arc::new(AnalysisPipeline::new(Arc::clone(&model), &AnalysisConfig::default()));
        let reports = Arc::new(
            ReportGenerator::new(ReportConfig {
                output_dir: dir.path().join("reports"),
                ..ReportConfig::default()
            })
            .unwrap(),
        );
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new());
        let fleet = Arc::new(RwLock::new(
            FleetCache::load(dir.path().join("fleet.json")).await.unwrap(),
        ));

        let state = AppState::new(pipeline, Assistant::new(model), reports, store, fleet);
        Harness {
            router: build_router(state, &ServerConfig::default()),
            client,
            _dir: dir,
        }
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let response = h
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_rejected_without_model_call() {
        let h = harness().await;
        let response = h
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis",
                json!({
                    "file_name": "sample.exe",
                    "file_content": "MZ",
                    "asset_id": "TX-1",
                    "criticality": "High"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);

        let snapshot = h
            .router
            .oneshot(Request::builder().uri("/api/v1/analysis").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(snapshot).await["phase"], "idle");
    }

    #[tokio::test]
    async fn test_missing_criticality_is_validation_error() {
        let h = harness().await;
        let response = h
            .router
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis",
                json!({"file_name": "sample.csv", "file_content": "1,2", "asset_id": "TX-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_analysis_returns_classification() {
        let h = harness().await;
        let response = h
            .router
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis",
                json!({
                    "file_name": "sample.csv",
                    "file_content": "freq,mag\n20,-40.1",
                    "asset_id": "TX-1",
                    "criticality": "High"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["classification"]["faultClassification"], "Winding Deformation");
    }

    #[tokio::test]
    async fn test_report_without_classification_conflicts() {
        let h = harness().await;
        let response = h
            .router
            .oneshot(json_request("POST", "/api/v1/analysis/report", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_log_mutations_require_operator_headers() {
        let h = harness().await;
        let response = h
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/transformers/TX-1/log",
                json!({"content": "Humming noise"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/transformers/TX-1/log")
            .header("content-type", "application/json")
            .header("x-operator-role", "technician")
            .header("x-operator-name", "Ravi")
            .body(Body::from(json!({"content": "Humming noise"}).to_string()))
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let entry_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let resolve = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/log/{}/resolve", entry_id))
            .header("x-operator-role", "Technician")
            .header("x-operator-name", "Ravi")
            .body(Body::empty())
            .unwrap();
        let response = h.router.oneshot(resolve).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_enrichment_kind_rejected() {
        let h = harness().await;
        let response = h
            .router
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/enrichments/horoscope/retry",
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_report_after_analysis() {
        let h = harness().await;
        let started = h
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis",
                json!({
                    "file_name": "sample.csv",
                    "file_content": "freq,mag\n20,-40.1",
                    "asset_id": "TX-1",
                    "criticality": "Medium"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(started.status(), StatusCode::OK);

        let response = h
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/analysis/report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(disposition.contains("FRAInsight-Report-TX-1-"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Winding Deformation"));
    }
}
