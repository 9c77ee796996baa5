//! Session-scoped accumulator for enrichment results

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::metrics::METRICS;

use super::models::{AnalysisSessionId, EnrichmentKind, EnrichmentOutputs, EnrichmentPayload};
use super::AnalysisError;

#[derive(Default)]
struct AggregatorState {
    session: Option<AnalysisSessionId>,
    entries: BTreeMap<EnrichmentKind, EnrichmentPayload>,
}

/// Write-many, read-on-demand store for one analysis session
///
/// Writes are last-write-wins per kind and only accepted for the active
/// session. Starting a session discards everything recorded before.
#[derive(Default)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopt a new session, dropping all entries
    pub fn begin(&self, session: AnalysisSessionId) {
        let mut state = self.lock();
        state.session = Some(session);
        state.entries.clear();
        debug!(session_id = %session, "Aggregator session started");
    }

    /// Forget the active session
    pub fn clear(&self) {
        let mut state = self.lock();
        state.session = None;
        state.entries.clear();
    }

    pub fn session(&self) -> Option<AnalysisSessionId> {
        self.lock().session
    }

    pub fn record(
        &self,
        session: AnalysisSessionId,
        payload: EnrichmentPayload,
    ) -> Result<(), AnalysisError> {
        let kind = payload.kind();
        let mut state = self.lock();

        if state.session != Some(session) {
            drop(state);
            METRICS.record_stale_discard(kind.as_str());
            warn!(session_id = %session, kind = %kind, "Discarding result from inactive session");
            return Err(AnalysisError::StaleSession(session));
        }

        state.entries.insert(kind, payload);
        Ok(())
    }

    pub fn snapshot(&self) -> EnrichmentOutputs {
        EnrichmentOutputs::from_entries(self.lock().entries.clone())
    }
}
