//! Classification requester

use std::sync::Arc;
use tracing::{error, info};

use crate::llm::{decode_structured, ModelClient};
use crate::metrics::METRICS;

use super::models::ClassificationResult;
use super::prompts;
use super::validator::AnalysisRequest;
use super::AnalysisError;

/// Sends a validated upload to the external model for classification
#[derive(Clone)]
pub struct Classifier {
    client: Arc<dyn ModelClient>,
}

impl Classifier {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// One outbound request, no retry. Any failure leaves nothing behind.
    pub async fn classify(
        &self,
        request: &AnalysisRequest,
    ) -> Result<ClassificationResult, AnalysisError> {
        let prompt = prompts::classification(request);

        let result = async {
            let value = self.client.complete_json(&prompt).await?;
            decode_structured::<ClassificationResult>(value)
        }
        .await;

        METRICS.record_classification(result.is_ok());

        match result {
            Ok(classification) => {
                info!(
                    asset_id = request.asset_id(),
                    fault = %classification.fault_label,
                    confidence = classification.confidence,
                    "Classification received"
                );
                Ok(classification)
            }
            Err(e) => {
                error!(asset_id = request.asset_id(), "Classification failed: {}", e);
                Err(e.into())
            }
        }
    }
}
