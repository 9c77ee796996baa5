//! External model interface
//!
//! Every AI-backed step of the pipeline goes through [`ModelClient`]: a
//! prompt goes out, a JSON object comes back. Typed decoding with
//! [`decode_structured`] is strict: a response that does not match the
//! expected schema is a hard failure, never coerced.

pub mod client;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use client::ChatModelClient;

/// A rendered prompt for one model call
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Operation label used for logging and metrics ("classify", "factors", ...)
    pub operation: &'static str,
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(operation: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            operation,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Model call errors
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Response does not match the expected schema: {0}")]
    Schema(String),

    #[error("Model client misconfigured: {0}")]
    Config(String),
}

impl ModelError {
    /// Whether the user can meaningfully retry the action that failed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Model client abstraction
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a prompt and return the JSON object the model answered with
    async fn complete_json(&self, prompt: &Prompt) -> Result<Value, ModelError>;
}

/// Post-deserialization checks a response schema applies to itself
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Decode a model response into a strict schema and validate it
pub fn decode_structured<T>(value: Value) -> Result<T, ModelError>
where
    T: DeserializeOwned + Validate,
{
    let decoded: T =
        serde_json::from_value(value).map_err(|e| ModelError::Schema(e.to_string()))?;
    decoded.validate().map_err(ModelError::Schema)?;
    Ok(decoded)
}

/// Extract the JSON object from a model's text content
///
/// Models occasionally wrap the object in a fenced code block even when
/// asked not to; the fence is stripped. Anything that is not a single JSON
/// object is a schema violation.
pub fn parse_json_content(content: &str) -> Result<Value, ModelError> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    };

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ModelError::Schema(format!("content is not valid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(ModelError::Schema(
            "expected a JSON object at the top level".to_string(),
        ));
    }

    Ok(value)
}
