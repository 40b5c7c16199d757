use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DocgraphError, Result};

/// Per-role LLM selection, mirroring the `agent_llms` override block in the
/// original YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AgentLlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for AgentLlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
        }
    }
}

fn default_provider() -> String {
    "scripted".to_string()
}

fn default_model() -> String {
    "offline".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AgentLlms {
    #[serde(default)]
    pub reader: AgentLlmConfig,
    #[serde(default)]
    pub searcher: AgentLlmConfig,
    #[serde(default)]
    pub writer: AgentLlmConfig,
    #[serde(default)]
    pub verifier: AgentLlmConfig,
}

impl Default for AgentLlms {
    fn default() -> Self {
        Self {
            reader: AgentLlmConfig::default(),
            searcher: AgentLlmConfig::default(),
            writer: AgentLlmConfig::default(),
            verifier: AgentLlmConfig::default(),
        }
    }
}

/// The default LLM backend, used by any agent whose role isn't overridden in
/// `agent_llms`. `credentials` names an environment variable to read an API
/// key from, rather than carrying a secret in the file itself.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    2_048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            credentials: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Bounds on the orchestrator's READ/SEARCH and WRITE/VERIFY loops.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FlowControlConfig {
    #[serde(default = "default_max_reader_search_attempts")]
    pub max_reader_search_attempts: u32,
    #[serde(default = "default_max_verifier_rejections")]
    pub max_verifier_rejections: u32,
    #[serde(default = "default_status_sleep_ms")]
    pub status_sleep_ms: u64,
}

fn default_max_reader_search_attempts() -> u32 {
    4
}

fn default_max_verifier_rejections() -> u32 {
    3
}

fn default_status_sleep_ms() -> u64 {
    3_000
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            max_reader_search_attempts: default_max_reader_search_attempts(),
            max_verifier_rejections: default_max_verifier_rejections(),
            status_sleep_ms: default_status_sleep_ms(),
        }
    }
}

/// Sliding-window rate limit and per-million-token pricing for a single LLM
/// provider. One of these lives in [`DocgraphConfig::rate_limits`] per
/// provider name; the `"default"` entry backs any provider without its own.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_input_tokens_per_minute")]
    pub input_tokens_per_minute: u32,
    #[serde(default = "default_output_tokens_per_minute")]
    pub output_tokens_per_minute: u32,
    #[serde(default = "default_buffer_percentage")]
    pub buffer_percentage: f64,
    /// US dollars per million input tokens; 0 for providers with no metered cost.
    #[serde(default)]
    pub input_price_per_million: f64,
    /// US dollars per million output tokens; 0 for providers with no metered cost.
    #[serde(default)]
    pub output_price_per_million: f64,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_input_tokens_per_minute() -> u32 {
    150_000
}

fn default_output_tokens_per_minute() -> u32 {
    50_000
}

fn default_buffer_percentage() -> f64 {
    0.1
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            input_tokens_per_minute: default_input_tokens_per_minute(),
            output_tokens_per_minute: default_output_tokens_per_minute(),
            buffer_percentage: default_buffer_percentage(),
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
        }
    }
}

fn default_rate_limits() -> HashMap<String, RateLimitConfig> {
    let mut map = HashMap::new();
    map.insert("default".to_string(), RateLimitConfig::default());
    map
}

/// Knobs governing what the Writer is allowed to overwrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DocstringOptions {
    /// When false (the default), a component with an existing non-trivial
    /// docstring is skipped rather than regenerated.
    #[serde(default)]
    pub overwrite_docstrings: bool,
}

fn default_max_input_tokens() -> usize {
    10_000
}

/// Top-level configuration for a documentation run, loaded via the `config` crate
/// from an optional YAML file, then layered with `DOCGRAPH_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DocgraphConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent_llms: AgentLlms,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, RateLimitConfig>,
    #[serde(default)]
    pub docstring_options: DocstringOptions,
    /// Hard context+focal budget, in approximate tokens.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

impl Default for DocgraphConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            agent_llms: AgentLlms::default(),
            flow_control: FlowControlConfig::default(),
            rate_limits: default_rate_limits(),
            docstring_options: DocstringOptions::default(),
            max_input_tokens: default_max_input_tokens(),
        }
    }
}

impl DocgraphConfig {
    /// Loads configuration from `path` if given, falling back to built-in defaults,
    /// then applies `DOCGRAPH__*` environment variable overrides (double-underscore
    /// separated, matching the `config` crate's `Environment` convention).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DocgraphConfig::default())
                .map_err(|e| DocgraphError::Config(e.to_string()))?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOCGRAPH")
                .separator("__")
                .try_parsing(true),
        );

        let settled = builder
            .build()
            .map_err(|e| DocgraphError::Config(e.to_string()))?;

        settled
            .try_deserialize()
            .map_err(|e| DocgraphError::Config(e.to_string()))
    }

    /// Returns the rate limit/pricing entry for `provider_name`, falling back
    /// to the `"default"` entry, and finally to built-in defaults if even that
    /// is absent.
    pub fn rate_limit_for(&self, provider_name: &str) -> RateLimitConfig {
        self.rate_limits
            .get(provider_name)
            .or_else(|| self.rate_limits.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}
