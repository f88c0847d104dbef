//! Configuration for pipeline invocations.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. There is no process-wide client or config object; every
//! component receives its configuration explicitly at construction time.

use crate::error::PipelineError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fusion policy for merging per-sub-query ranked lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPolicy {
    /// Reciprocal rank fusion: score-fuse by rank position across lists.
    ReciprocalRank,
    /// Keep only passages whose locator appears in every list. Falls back to
    /// reciprocal rank fusion when the intersection is empty.
    Consensus,
}

/// Pipeline-level knobs. All values are per-invocation; nothing is global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Passages retrieved per expanded sub-query.
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Passages retrieved per sub-query in the sequential decomposition path.
    #[serde(default = "default_sequential_k")]
    pub sequential_k: usize,
    /// Fused passages kept for context formatting.
    #[serde(default = "default_fused_top_n")]
    pub fused_top_n: usize,
    /// Smoothing constant for reciprocal rank fusion.
    #[serde(default = "default_rrf_k_constant")]
    pub rrf_k_constant: usize,
    /// Default fusion policy. Step-back routed queries always try the
    /// consensus filter first regardless of this setting.
    #[serde(default = "default_fusion_policy")]
    pub fusion_policy: FusionPolicy,
    /// Expand DIRECT-routed queries into three paraphrases before retrieval
    /// instead of retrieving with the original query alone.
    #[serde(default = "default_rewrite_on_direct")]
    pub rewrite_on_direct: bool,
    /// Answer DECOMPOSE-routed queries sub-query by sub-query, then
    /// synthesize, instead of fusing one shared context.
    #[serde(default)]
    pub sequential_decomposition: bool,
    /// Proceed with the sub-queries that retrieved successfully when some
    /// retrieval calls fail. Default is fail-closed: any retrieval failure
    /// aborts the invocation.
    #[serde(default)]
    pub resilient: bool,
}

fn default_retrieval_k() -> usize {
    20
}

fn default_sequential_k() -> usize {
    5
}

fn default_fused_top_n() -> usize {
    3
}

fn default_rrf_k_constant() -> usize {
    60
}

fn default_fusion_policy() -> FusionPolicy {
    FusionPolicy::ReciprocalRank
}

fn default_rewrite_on_direct() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_k: default_retrieval_k(),
            sequential_k: default_sequential_k(),
            fused_top_n: default_fused_top_n(),
            rrf_k_constant: default_rrf_k_constant(),
            fusion_policy: default_fusion_policy(),
            rewrite_on_direct: default_rewrite_on_direct(),
            sequential_decomposition: false,
            resilient: false,
        }
    }
}

/// Configuration for the chat-completions generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model name, e.g. "gpt-4o-mini" or an Ollama model.
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL. Defaults to the OpenAI endpoint; point at a local
    /// server for Ollama/vLLM/LM Studio.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over `api_key_env` when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sampling temperature applied to every generation call unless a
    /// request overrides it.
    #[serde(default)]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            api_key: None,
            temperature: 0.0,
        }
    }
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "hash" (local, default) or "openai".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensions for the local hash embedder.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Environment variable holding the API key for remote providers.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// API base URL for remote providers.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "hash".into()
}

fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimensions: default_dimensions(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Load configuration with layering: defaults -> optional TOML file ->
/// `QUERYLOOM_`-prefixed environment variables (`__` as section separator,
/// e.g. `QUERYLOOM_PIPELINE__RETRIEVAL_K=10`).
pub fn load_config(config_file: Option<&Path>) -> Result<AppConfig, PipelineError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("QUERYLOOM_").split("__"));

    figment
        .extract()
        .map_err(|e| PipelineError::config(e.to_string()))
}
