//! Enrichment fan-out supervisor
//!
//! Each launch spawns one task per enrichment kind, tagged with the session
//! it belongs to and a child of that session's cancellation token. Per-kind
//! status is published on a watch channel so observers can render each
//! kind's loading state independently of its siblings.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::METRICS;

use super::aggregator::Aggregator;
use super::enrichment::Enricher;
use super::models::{AnalysisContext, AnalysisSessionId, Criticality, EnrichmentKind};
use super::AnalysisError;

/// Lifecycle of one enrichment request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Loading,
    Ready,
    Failed(String),
    Discarded,
}

impl EnrichmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_) | Self::Discarded)
    }
}

pub type StatusMap = BTreeMap<EnrichmentKind, EnrichmentStatus>;

/// Spawns fan-outs and owns the root cancellation token
pub struct EnrichmentSupervisor {
    enricher: Arc<Enricher>,
    aggregator: Arc<Aggregator>,
    root: CancellationToken,
}

impl EnrichmentSupervisor {
    pub fn new(enricher: Arc<Enricher>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            enricher,
            aggregator,
            root: CancellationToken::new(),
        }
    }

    /// Start one request per kind for a classified session
    ///
    /// Expert rules are dropped from `kinds` unless criticality is High.
    pub fn launch(
        &self,
        session: AnalysisSessionId,
        context: AnalysisContext,
        kinds: &[EnrichmentKind],
    ) -> FanOut {
        let kinds: Vec<EnrichmentKind> = kinds
            .iter()
            .copied()
            .filter(|kind| {
                *kind != EnrichmentKind::Rules || context.criticality == Criticality::High
            })
            .collect();

        let initial: StatusMap = kinds
            .iter()
            .map(|kind| (*kind, EnrichmentStatus::Pending))
            .collect();
        let (status, _) = watch::channel(initial);

        info!(
            session_id = %session,
            kinds = kinds.len(),
            fault = %context.classification.fault_label,
            "Launching enrichment fan-out"
        );

        let fan_out = FanOut {
            session,
            context: Arc::new(context),
            kinds: Arc::new(kinds),
            token: self.root.child_token(),
            status: Arc::new(status),
            enricher: Arc::clone(&self.enricher),
            aggregator: Arc::clone(&self.aggregator),
        };

        for kind in fan_out.kinds.iter() {
            fan_out.spawn_kind(*kind);
        }

        fan_out
    }

    /// Cancel every fan-out ever launched
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

/// Handle to the enrichment requests of one session
#[derive(Clone)]
pub struct FanOut {
    session: AnalysisSessionId,
    context: Arc<AnalysisContext>,
    kinds: Arc<Vec<EnrichmentKind>>,
    token: CancellationToken,
    status: Arc<watch::Sender<StatusMap>>,
    enricher: Arc<Enricher>,
    aggregator: Arc<Aggregator>,
}

impl FanOut {
    pub fn session(&self) -> AnalysisSessionId {
        self.session
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub fn kinds(&self) -> &[EnrichmentKind] {
        &self.kinds
    }

    pub fn statuses(&self) -> StatusMap {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.status.subscribe()
    }

    pub fn is_settled(&self) -> bool {
        self.status.borrow().values().all(EnrichmentStatus::is_terminal)
    }

    /// Resolves once every kind has a terminal status
    pub async fn wait_settled(&self) -> StatusMap {
        let mut rx = self.status.subscribe();
        let settled = match rx.wait_for(|map| map.values().all(EnrichmentStatus::is_terminal)).await {
            Ok(map) => map.clone(),
            Err(_) => self.statuses(),
        };
        settled
    }

    /// Abandon in-flight requests; they settle as discarded
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!(session_id = %self.session, "Cancelling enrichment fan-out");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Re-run one kind whose previous request has settled
    pub fn retry(&self, kind: EnrichmentKind) -> Result<(), AnalysisError> {
        if !self.kinds.contains(&kind) {
            return Err(AnalysisError::NotRequested(kind));
        }
        if self.token.is_cancelled() {
            return Err(AnalysisError::StaleSession(self.session));
        }

        let accepted = self.status.send_if_modified(|map| {
            let settled = map.get(&kind).map_or(true, EnrichmentStatus::is_terminal);
            if settled {
                map.insert(kind, EnrichmentStatus::Pending);
            }
            settled
        });
        if !accepted {
            return Err(AnalysisError::EnrichmentInFlight(kind));
        }

        info!(session_id = %self.session, kind = %kind, "Retrying enrichment");
        self.spawn_kind(kind);
        Ok(())
    }

    fn set_status(&self, kind: EnrichmentKind, status: EnrichmentStatus) {
        self.status.send_modify(|map| {
            map.insert(kind, status);
        });
    }

    fn spawn_kind(&self, kind: EnrichmentKind) {
        let token = self.token.child_token();
        let fan_out = self.clone();
        tokio::spawn(async move { fan_out.run_kind(kind, token).await });
    }

    async fn run_kind(&self, kind: EnrichmentKind, token: CancellationToken) {
        if token.is_cancelled() {
            self.settle_discarded(kind);
            return;
        }
        self.set_status(kind, EnrichmentStatus::Loading);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.enricher.enrich(kind, &self.context) => Some(result),
        };

        match outcome {
            None => self.settle_discarded(kind),
            Some(Ok(payload)) => match self.aggregator.record(self.session, payload) {
                Ok(()) => {
                    METRICS.record_enrichment(kind.as_str(), "ready");
                    debug!(session_id = %self.session, kind = %kind, "Enrichment ready");
                    self.set_status(kind, EnrichmentStatus::Ready);
                }
                Err(_) => self.settle_discarded(kind),
            },
            Some(Err(e)) => {
                METRICS.record_enrichment(kind.as_str(), "failed");
                error!(session_id = %self.session, kind = %kind, "Enrichment failed: {}", e);
                self.set_status(kind, EnrichmentStatus::Failed(e.to_string()));
            }
        }
    }

    fn settle_discarded(&self, kind: EnrichmentKind) {
        METRICS.record_enrichment(kind.as_str(), "discarded");
        debug!(session_id = %self.session, kind = %kind, "Enrichment discarded");
        self.set_status(kind, EnrichmentStatus::Discarded);
    }
}
