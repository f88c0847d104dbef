//! Strategy routing: classify an incoming query and select the expansion
//! technique to apply.
//!
//! Two interchangeable implementations satisfy the same [`StrategyRouter`]
//! contract: a deterministic keyword-rule router and an
//! embedding-nearest-neighbor router over a static set of labeled exemplar
//! queries. Both must support [`StrategyTag::Direct`] as the catch-all;
//! misclassification is not detectable downstream.

use crate::embed::{cosine_similarity, Embedder};
use crate::error::PipelineError;
use crate::types::{Query, StrategyTag};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Trait for strategy routers.
#[async_trait]
pub trait StrategyRouter: Send + Sync {
    /// Classify a query into the expansion strategy to apply.
    async fn classify(&self, query: &Query) -> Result<StrategyTag, PipelineError>;
}

/// Deterministic keyword-rule router.
///
/// Rules are checked in fixed priority order; first match wins:
/// comparison terms, definitional openers, causal/process terms, then
/// the DIRECT catch-all.
pub struct RuleRouter {
    comparison: Regex,
    causal: Regex,
}

impl RuleRouter {
    pub fn new() -> Self {
        Self {
            comparison: Regex::new(r"\b(compare|vs|difference)\b")
                .expect("comparison pattern is valid"),
            causal: Regex::new(r"\b(how|why|steps|process)\b").expect("causal pattern is valid"),
        }
    }

    fn route(&self, text: &str) -> StrategyTag {
        let lowered = text.to_lowercase();

        if self.comparison.is_match(&lowered) {
            StrategyTag::Decompose
        } else if lowered.starts_with("what is") || lowered.starts_with("define") {
            StrategyTag::Hyde
        } else if self.causal.is_match(&lowered) {
            StrategyTag::StepBack
        } else {
            StrategyTag::Direct
        }
    }
}

impl Default for RuleRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyRouter for RuleRouter {
    async fn classify(&self, query: &Query) -> Result<StrategyTag, PipelineError> {
        let tag = self.route(&query.text);
        debug!(%tag, query = %query.text, "Rule-routed query");
        Ok(tag)
    }
}

struct Exemplar {
    tag: StrategyTag,
    text: String,
    vector: Vec<f32>,
}

/// Embedding-nearest-neighbor router: assigns the label of the single
/// nearest exemplar query (k=1). The exemplar set is static configuration;
/// there is no training.
pub struct SemanticRouter {
    exemplars: Vec<Exemplar>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticRouter {
    /// Build a router by embedding the given labeled exemplar queries up
    /// front. Fails on an empty exemplar set.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        labeled: Vec<(StrategyTag, String)>,
    ) -> Result<Self, PipelineError> {
        if labeled.is_empty() {
            return Err(PipelineError::invalid_input(
                "semantic router needs at least one exemplar query",
            ));
        }

        let texts: Vec<String> = labeled.iter().map(|(_, t)| t.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let exemplars = labeled
            .into_iter()
            .zip(vectors)
            .map(|((tag, text), vector)| Exemplar { tag, text, vector })
            .collect();

        Ok(Self { exemplars, embedder })
    }

    /// Build a router over the stock exemplar set.
    pub async fn with_default_exemplars(
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, PipelineError> {
        Self::build(embedder, default_exemplars()).await
    }
}

/// Stock exemplar queries per strategy.
pub fn default_exemplars() -> Vec<(StrategyTag, String)> {
    let routes: [(StrategyTag, &[&str]); 4] = [
        (
            StrategyTag::Hyde,
            &["what is a stack?", "define polymorphism", "explain recursion"],
        ),
        (
            StrategyTag::Decompose,
            &["compare python and java", "difference between queue and stack"],
        ),
        (
            StrategyTag::StepBack,
            &["how does memory allocation work", "why use linked lists"],
        ),
        (
            StrategyTag::Direct,
            &["when was Python created", "history of AI"],
        ),
    ];

    routes
        .into_iter()
        .flat_map(|(tag, examples)| examples.iter().map(move |e| (tag, e.to_string())))
        .collect()
}

#[async_trait]
impl StrategyRouter for SemanticRouter {
    async fn classify(&self, query: &Query) -> Result<StrategyTag, PipelineError> {
        let query_vector = self.embedder.embed(&query.text).await?;

        let mut best: Option<(f32, &Exemplar)> = None;
        for exemplar in &self.exemplars {
            let score = cosine_similarity(&query_vector, &exemplar.vector);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, exemplar));
            }
        }

        // Construction guarantees at least one exemplar.
        let (score, nearest) = best.ok_or_else(|| {
            PipelineError::invalid_input("semantic router has no exemplars")
        })?;

        debug!(
            tag = %nearest.tag,
            exemplar = %nearest.text,
            score,
            query = %query.text,
            "Semantically routed query"
        );
        Ok(nearest.tag)
    }
}
