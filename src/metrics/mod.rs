//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Pipeline metrics
    pub uploads_rejected: CounterVec,
    pub classification_requests: CounterVec,
    pub enrichment_requests: CounterVec,
    pub stale_results_discarded: CounterVec,

    // Model metrics
    pub model_call_duration: HistogramVec,

    // Report metrics
    pub report_generations: CounterVec,

    // Fleet metrics
    pub log_mutations: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploads_rejected = register_counter_vec_with_registry!(
            Opts::new("fra_uploads_rejected_total", "Uploads rejected before classification"),
            &["reason"],
            registry
        )?;

        let classification_requests = register_counter_vec_with_registry!(
            Opts::new("fra_classification_requests_total", "Classification requests"),
            &["status"],
            registry
        )?;

        let enrichment_requests = register_counter_vec_with_registry!(
            Opts::new("fra_enrichment_requests_total", "Enrichment requests by kind"),
            &["kind", "status"],
            registry
        )?;

        let stale_results_discarded = register_counter_vec_with_registry!(
            Opts::new(
                "fra_stale_results_discarded_total",
                "Enrichment results dropped because their session ended"
            ),
            &["kind"],
            registry
        )?;

        let model_call_duration = register_histogram_vec_with_registry!(
            "fra_model_call_duration_seconds",
            "External model call duration in seconds",
            &["operation"],
            registry
        )?;

        let report_generations = register_counter_vec_with_registry!(
            Opts::new("fra_report_generations_total", "Report generation attempts"),
            &["status"],
            registry
        )?;

        let log_mutations = register_counter_vec_with_registry!(
            Opts::new("fra_log_mutations_total", "Communication log mutations"),
            &["operation", "status"],
            registry
        )?;

        Ok(Self {
            registry,
            uploads_rejected,
            classification_requests,
            enrichment_requests,
            stale_results_discarded,
            model_call_duration,
            report_generations,
            log_mutations,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_rejected_upload(&self, reason: &str) {
        self.uploads_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_classification(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.classification_requests.with_label_values(&[status]).inc();
    }

    pub fn record_enrichment(&self, kind: &str, status: &str) {
        self.enrichment_requests.with_label_values(&[kind, status]).inc();
    }

    pub fn record_stale_discard(&self, kind: &str) {
        self.stale_results_discarded.with_label_values(&[kind]).inc();
    }

    pub fn record_report(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.report_generations.with_label_values(&[status]).inc();
    }

    pub fn record_log_mutation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.log_mutations.with_label_values(&[operation, status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}
