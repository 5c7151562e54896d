//! Configuration models for credence.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file or
//! `CREDENCE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for credence.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider endpoint configuration (generation)
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Grading call configuration (reflection scoring)
    #[serde(default)]
    pub grading: GradingConfig,

    /// Sampling settings
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Scoring thresholds and fusion gates
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Provider endpoint configuration.
///
/// K_i: All endpoints must be OpenAI-compatible (chat completions API).
/// Covers OpenAI, OpenRouter, Gemini-compat, and on-prem (vLLM, Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model ID used for answer generation
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (can also be set via the api_key_env variable)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether the endpoint returns token log-probabilities.
    /// Decided here, at construction, not probed per call.
    #[serde(default = "default_true")]
    pub supports_logprobs: bool,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_api_key_env() -> String {
    "CREDENCE_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            supports_logprobs: true,
        }
    }
}

/// Grading call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Model used for self-grading (defaults to the provider model)
    #[serde(default)]
    pub model: Option<String>,

    /// Temperature for grading calls. Deterministic by default.
    #[serde(default)]
    pub temperature: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
        }
    }
}

/// Sampling configuration for the generation fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of answers sampled per query
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Top-k candidates requested per generation step
    #[serde(default = "default_top_k")]
    pub top_k_logprobs: u32,
}

fn default_n_samples() -> usize {
    5
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_k() -> u32 {
    5
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            n_samples: default_n_samples(),
            temperature: default_temperature(),
            top_k_logprobs: default_top_k(),
        }
    }
}

/// Scoring thresholds.
///
/// The fusion gates are independent policy constants, not derived from
/// one another; each can be tuned without touching the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Similarity above which two answers are judged equivalent
    #[serde(default = "default_consistency_threshold")]
    pub consistency_threshold: f64,

    /// Minimum consistency score for a CONFIDENT verdict
    #[serde(default = "default_consistency_gate")]
    pub consistency_gate: f64,

    /// Minimum reflection score for a CONFIDENT verdict
    #[serde(default = "default_reflection_gate")]
    pub reflection_gate: f64,

    /// Maximum perplexity for a CONFIDENT verdict
    #[serde(default = "default_perplexity_gate")]
    pub perplexity_gate: f64,
}

fn default_consistency_threshold() -> f64 {
    0.85
}

fn default_consistency_gate() -> f64 {
    0.8
}

fn default_reflection_gate() -> f64 {
    0.5
}

fn default_perplexity_gate() -> f64 {
    10.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            consistency_threshold: default_consistency_threshold(),
            consistency_gate: default_consistency_gate(),
            reflection_gate: default_reflection_gate(),
            perplexity_gate: default_perplexity_gate(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Resolve API key from config or environment.
    ///
    /// B_i(api key available) → Result
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        // First check explicit api_key in config
        if let Some(key) = &self.provider.api_key {
            return Ok(expand_env_vars(key));
        }

        // Then check environment variable
        std::env::var(&self.provider.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.provider.api_key_env.clone(),
        })
    }

    /// Model used for grading calls.
    pub fn grading_model(&self) -> &str {
        self.grading.model.as_deref().unwrap_or(&self.provider.model)
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or api_key in config")]
    MissingApiKey { env_var: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.sampling.n_samples, 5);
        assert_eq!(config.sampling.temperature, 0.7);
        assert_eq!(config.sampling.top_k_logprobs, 5);
        assert_eq!(config.scoring.consistency_threshold, 0.85);
        assert_eq!(config.scoring.consistency_gate, 0.8);
        assert_eq!(config.scoring.reflection_gate, 0.5);
        assert_eq!(config.scoring.perplexity_gate, 10.0);
        assert_eq!(config.grading.temperature, 0.0);
        assert!(config.provider.supports_logprobs);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            model = "gpt-4o"
            supports_logprobs = false

            [sampling]
            n_samples = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.model, "gpt-4o");
        assert!(!config.provider.supports_logprobs);
        assert_eq!(config.sampling.n_samples, 3);
        assert_eq!(config.sampling.temperature, 0.7);
        assert_eq!(config.scoring.perplexity_gate, 10.0);
    }

    #[test]
    fn grading_model_falls_back_to_provider_model() {
        let mut config = Config::default();
        assert_eq!(config.grading_model(), config.provider.model);

        config.grading.model = Some("gpt-4o".to_string());
        assert_eq!(config.grading_model(), "gpt-4o");
    }
}
