//! OpenAI-compatible chat completions client

use super::{parse_json_content, ModelClient, ModelError, Prompt};
use crate::config::LlmConfig;
use crate::metrics::METRICS;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error};

/// Chat model client
///
/// Each call is a single request: failures surface to the caller, who
/// decides whether the user retries.
pub struct ChatModelClient {
    http: Client,
    config: LlmConfig,
}

impl ChatModelClient {
    /// Create a new chat model client
    pub fn new(config: LlmConfig) -> Result<Self, ModelError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, prompt: &Prompt) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }

    async fn send(&self, prompt: &Prompt) -> Result<Value, ModelError> {
        let request = self.build_request(prompt);

        debug!(operation = prompt.operation, model = %self.config.model, "Sending model request");

        let mut req = self.http.post(&self.config.api_url).json(&request);

        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(e.to_string())
            } else {
                ModelError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(operation = prompt.operation, "Model API error {}: {}", status, body);
            return Err(ModelError::Upstream(format!("Status {}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Schema(format!("Failed to parse response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Schema("No choices in response".to_string()))?;

        parse_json_content(&content)
    }
}

#[async_trait]
impl ModelClient for ChatModelClient {
    async fn complete_json(&self, prompt: &Prompt) -> Result<Value, ModelError> {
        let start = Instant::now();
        let result = self.send(prompt).await;

        METRICS
            .model_call_duration
            .with_label_values(&[prompt.operation])
            .observe(start.elapsed().as_secs_f64());

        result
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
