//! Runtime configuration for the generation pipeline and the evaluator.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`CASEGEN_*`)
//! 2. Values from the TOML file passed with `--config`
//! 3. Built-in defaults
//!
//! ```toml
//! output_dir = "output"
//! request_timeout_secs = 600
//!
//! [endpoint]
//! base_url = "https://ark.cn-beijing.volces.com/api/v3"
//! model = "deepseek-r1-250528"
//!
//! [generation]
//! max_concurrent = 10
//! max_retries = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "deepseek-r1-250528";
const DEFAULT_TITLE: &str = "Auto-generated test cases";

const ENV_BASE_URL: &str = "CASEGEN_BASE_URL";
const ENV_API_KEY: &str = "CASEGEN_API_KEY";
const ENV_MODEL: &str = "CASEGEN_MODEL";
const ENV_MAX_CONCURRENT: &str = "CASEGEN_MAX_CONCURRENT";
const ENV_MAX_RETRIES: &str = "CASEGEN_MAX_RETRIES";
const ENV_OUTPUT_DIR: &str = "CASEGEN_OUTPUT_DIR";

/// OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.9,
            max_tokens: 16_384,
        }
    }
}

/// Per-point case generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Capacity of the shared concurrency gate.
    pub max_concurrent: usize,
    /// Attempts per requirement point, including the first.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_retries: 2,
            retry_delay_ms: 1_000,
        }
    }
}

impl GenerationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    /// Characters of source text sent to the model when no heading fits.
    pub prefix_chars: usize,
    /// Used when title extraction fails.
    pub default_title: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            prefix_chars: 1_500,
            default_title: DEFAULT_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub max_retries: u32,
    /// Linear back-off unit: attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1_000,
        }
    }
}

impl EvaluationConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasegenConfig {
    pub endpoint: EndpointConfig,
    pub sampling: SamplingConfig,
    /// Per-call HTTP deadline.
    pub request_timeout_secs: u64,
    pub generation: GenerationConfig,
    pub title: TitleConfig,
    pub evaluation: EvaluationConfig,
    pub output_dir: PathBuf,
}

impl Default for CasegenConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            sampling: SamplingConfig::default(),
            request_timeout_secs: 600,
            generation: GenerationConfig::default(),
            title: TitleConfig::default(),
            evaluation: EvaluationConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl CasegenConfig {
    /// Load defaults, then the optional TOML file, then environment overrides,
    /// and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config
            .apply_overrides(|key| std::env::var(key).ok())
            .context("Invalid CASEGEN_* environment override")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `CASEGEN_*` overrides from `lookup`, which returns the value of a
    /// variable when it is set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_BASE_URL) {
            self.endpoint.base_url = v;
        }
        if let Some(v) = lookup(ENV_API_KEY) {
            self.endpoint.api_key = v;
        }
        if let Some(v) = lookup(ENV_MODEL) {
            self.endpoint.model = v;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENT) {
            self.generation.max_concurrent = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("max_concurrent", format!("`{v}` is not a count")))?;
        }
        if let Some(v) = lookup(ENV_MAX_RETRIES) {
            self.generation.max_retries = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("max_retries", format!("`{v}` is not a count")))?;
        }
        if let Some(v) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint.base_url", "must not be empty"));
        }
        if self.endpoint.model.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint.model", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            return Err(ConfigError::invalid(
                "sampling.temperature",
                format!("{} is outside 0.0..=2.0", self.sampling.temperature),
            ));
        }
        if !(0.0..=1.0).contains(&self.sampling.top_p) {
            return Err(ConfigError::invalid(
                "sampling.top_p",
                format!("{} is outside 0.0..=1.0", self.sampling.top_p),
            ));
        }
        if self.generation.max_concurrent == 0 {
            return Err(ConfigError::invalid("generation.max_concurrent", "must be at least 1"));
        }
        if self.generation.max_retries == 0 {
            return Err(ConfigError::invalid("generation.max_retries", "must be at least 1"));
        }
        if self.evaluation.max_retries == 0 {
            return Err(ConfigError::invalid("evaluation.max_retries", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
