//! Per-kind enrichment requests

use std::sync::Arc;
use tracing::debug;

use crate::llm::{decode_structured, ModelClient, ModelError};

use super::compass::{self, CompassMode};
use super::factors::{self, FactorSumPolicy};
use super::models::{
    AnalysisContext, CompassReading, CompassSource, CostEstimate, EnrichmentKind,
    EnrichmentPayload, Explanation, FactorBreakdown, Insights, RuleSet,
};
use super::prompts;
use super::AnalysisError;

/// Produces one validated payload per enrichment kind
#[derive(Clone)]
pub struct Enricher {
    client: Arc<dyn ModelClient>,
    factor_policy: FactorSumPolicy,
    compass_mode: CompassMode,
}

impl Enricher {
    pub fn new(
        client: Arc<dyn ModelClient>,
        factor_policy: FactorSumPolicy,
        compass_mode: CompassMode,
    ) -> Self {
        Self {
            client,
            factor_policy,
            compass_mode,
        }
    }

    pub async fn enrich(
        &self,
        kind: EnrichmentKind,
        ctx: &AnalysisContext,
    ) -> Result<EnrichmentPayload, AnalysisError> {
        if kind == EnrichmentKind::CompassAngle && self.compass_mode == CompassMode::Lookup {
            debug!(fault = %ctx.classification.fault_label, "Compass angle from local lookup");
            return Ok(EnrichmentPayload::CompassAngle(compass::lookup_reading(
                ctx.classification.fault_label,
            )));
        }

        let value = self
            .client
            .complete_json(&prompts::enrichment(kind, ctx))
            .await?;

        let payload = match kind {
            EnrichmentKind::Explanation => {
                EnrichmentPayload::Explanation(decode_structured::<Explanation>(value)?)
            }
            EnrichmentKind::Insights => {
                EnrichmentPayload::Insights(decode_structured::<Insights>(value)?)
            }
            EnrichmentKind::Factors => {
                let breakdown = decode_structured::<FactorBreakdown>(value)?;
                let breakdown = factors::apply_policy(self.factor_policy, breakdown)
                    .map_err(ModelError::Schema)?;
                EnrichmentPayload::Factors(breakdown)
            }
            EnrichmentKind::CompassAngle => {
                let mut reading = decode_structured::<CompassReading>(value)?;
                reading.source = CompassSource::Model;
                EnrichmentPayload::CompassAngle(reading)
            }
            EnrichmentKind::Rules => EnrichmentPayload::Rules(decode_structured::<RuleSet>(value)?),
            EnrichmentKind::Costs => {
                EnrichmentPayload::Costs(decode_structured::<CostEstimate>(value)?)
            }
        };

        Ok(payload)
    }
}
