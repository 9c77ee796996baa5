//! Service configuration
//!
//! Values resolve in this order: serde defaults, an optional TOML file,
//! `FRA_`-prefixed environment variables (`FRA_LLM__MODEL=...`), then the
//! flat variables read by [`Config::from_env`]. A `.env` file is loaded
//! first when present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::analysis::{CompassMode, FactorSumPolicy};
use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub analysis: AnalysisConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for request bodies (uploaded FRA files travel inline)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8081 }
fn default_max_body_bytes() -> usize { 10 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// External model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key (read from env LLM_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Request timeout in milliseconds
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_api_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout_ms() -> u64 { 60_000 }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.2 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key: None,
            timeout_ms: default_llm_timeout_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Analysis pipeline behaviour
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub factor_sum_policy: FactorSumPolicy,

    #[serde(default)]
    pub compass_mode: CompassMode,
}

/// Report rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Directory generated reports are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Product name used in report headers and filenames
    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default = "default_margin_mm")]
    pub margin_mm: f32,

    #[serde(default = "default_font_size_pt")]
    pub font_size_pt: f32,

    /// Line height as a multiple of the font size
    #[serde(default = "default_line_height")]
    pub line_height: f32,
}

fn default_output_dir() -> PathBuf { PathBuf::from("reports") }
fn default_product_name() -> String { "FRAInsight".to_string() }
fn default_margin_mm() -> f32 { 15.0 }
fn default_font_size_pt() -> f32 { 10.0 }
fn default_line_height() -> f32 { 1.4 }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            product_name: default_product_name(),
            margin_mm: default_margin_mm(),
            font_size_pt: default_font_size_pt(),
            line_height: default_line_height(),
        }
    }
}

/// Remote table storage and local fleet cache
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the table API; the in-memory store is used when unset
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_storage_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_fleet_cache_path")]
    pub fleet_cache_path: PathBuf,
}

fn default_storage_timeout_ms() -> u64 { 10_000 }
fn default_fleet_cache_path() -> PathBuf { PathBuf::from("data/fleet.json") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: default_storage_timeout_ms(),
            fleet_cache_path: default_fleet_cache_path(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config = Self::from_sources(path)?.from_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults, optional file and `FRA_` variables only
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FRA")
                .prefix_separator("_")
                .separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Apply the flat environment overrides
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_API_URL") {
            self.llm.api_url = val;
        }

        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.llm.model = val;
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::new(val));
        }

        if let Ok(val) = std::env::var("LLM_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.llm.timeout_ms = timeout;
            }
        }

        if let Ok(val) = std::env::var("STORAGE_URL") {
            self.storage.url = Some(val);
        }

        if let Ok(val) = std::env::var("STORAGE_API_KEY") {
            self.storage.api_key = Some(SecretString::new(val));
        }

        if let Ok(val) = std::env::var("FLEET_CACHE_PATH") {
            self.storage.fleet_cache_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("REPORT_OUTPUT_DIR") {
            self.report.output_dir = PathBuf::from(val);
        }

        self
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model cannot be empty".to_string()));
        }

        if self.llm.timeout_ms == 0 {
            return Err(Error::Config("llm.timeout_ms must be positive".to_string()));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(format!(
                "llm.temperature {} outside 0.0..=2.0",
                self.llm.temperature
            )));
        }

        if self.report.product_name.trim().is_empty() {
            return Err(Error::Config("report.product_name cannot be empty".to_string()));
        }

        if self.report.font_size_pt <= 0.0 || self.report.line_height < 1.0 {
            return Err(Error::Config(
                "report.font_size_pt must be positive and report.line_height at least 1.0"
                    .to_string(),
            ));
        }

        // The page must fit at least one line of text once margins are applied
        if self.report.margin_mm < 0.0 || self.report.margin_mm * 2.0 >= 200.0 {
            return Err(Error::Config(format!(
                "report.margin_mm {} leaves no printable area",
                self.report.margin_mm
            )));
        }

        Ok(())
    }
}
