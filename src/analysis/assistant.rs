//! Operator assistant chat

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::llm::{decode_structured, ModelClient, Validate};

use super::models::AnalysisContext;
use super::prompts;
use super::AnalysisError;

/// Longest question accepted
pub const MAX_QUESTION_CHARS: usize = 4_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub answer: String,
}

impl Validate for ChatReply {
    fn validate(&self) -> Result<(), String> {
        if self.answer.trim().is_empty() {
            return Err("answer is empty".to_string());
        }
        Ok(())
    }
}

/// Question answering grounded on the current analysis when there is one
#[derive(Clone)]
pub struct Assistant {
    client: Arc<dyn ModelClient>,
}

impl Assistant {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub async fn ask(
        &self,
        question: &str,
        context: Option<&AnalysisContext>,
    ) -> Result<ChatReply, AnalysisError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnalysisError::InvalidInput("question is empty".to_string()));
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(AnalysisError::InvalidInput(format!(
                "question longer than {} characters",
                MAX_QUESTION_CHARS
            )));
        }

        debug!(grounded = context.is_some(), "Assistant question");
        let value = self
            .client
            .complete_json(&prompts::assistant(question, context))
            .await?;
        Ok(decode_structured::<ChatReply>(value)?)
    }
}
