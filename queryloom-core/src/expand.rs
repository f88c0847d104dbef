//! Query expansion: turn one user query into one or more retrieval queries.
//!
//! Four techniques, one [`Expander`] implementation each:
//!
//! - **Rewrite** — three intent-preserving paraphrases, for ambiguity
//!   reduction before retrieval.
//! - **Decompose** — three minimal independent sub-questions whose combined
//!   answers cover the original.
//! - **HyDE** — a single hypothetical 2-3 sentence answer passage, used *as*
//!   the retrieval query: a plausible answer sits semantically closer to
//!   real answer passages than the bare question does.
//! - **StepBack** — a higher-level abstraction of the query's intent, then
//!   three concrete questions grounded in it. Only the questions are
//!   returned; the abstraction is intermediate.
//!
//! Every structured response is validated strictly: a response that does not
//! parse into the declared shape, or that carries the wrong number of
//! questions, is a [`PipelineError::MalformedResponse`], never a silent
//! short batch.

use crate::error::PipelineError;
use crate::generate::{GenerationRequest, Generator, ResponseSchema};
use crate::types::{ExpansionStrategy, Query, SubQuery};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Number of sub-queries the rewrite, decompose, and step-back expanders
/// must produce.
pub const EXPANSION_BATCH_SIZE: usize = 3;

const REWRITE_PROMPT: &str = "You are a helpful AI assistant. \
Take the user query and rewrite it into 3 different questions that preserve its intent. \
Return the output strictly as JSON matching the given schema, nothing else.";

const DECOMPOSE_PROMPT: &str = "You are a query decomposition assistant. \
Break down the user query into the smallest, independent sub-questions \
that together can fully answer the query. \
Return the output strictly as JSON matching the given schema, nothing else.";

const HYDE_PROMPT: &str = "You are a helpful assistant. \
Generate a concise passage (2-3 sentences) that could hypothetically answer the user query, \
as if it came from a textbook or reference guide. \
Do not say you don't know. Just generate the most plausible answer passage.";

const STEP_BACK_PROMPT: &str = "You are a helpful AI assistant. \
Your task is to first create a \"step-back\" abstraction of the user's query, \
i.e., a higher-level reformulation that captures its core intent without the surface details. \
Then, based on that abstraction, generate 3 different rewritten versions of the original query. \
Each rewrite should be natural, distinct, and faithful to the meaning. \
Return the output strictly as JSON matching the given schema, nothing else.";

/// Trait for query expanders.
#[async_trait]
pub trait Expander: Send + Sync {
    /// The technique this expander applies.
    fn strategy(&self) -> ExpansionStrategy;

    /// Expand a query into between one and three sub-queries.
    async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, PipelineError>;
}

/// Construct the expander for a strategy.
pub fn expander_for(
    strategy: ExpansionStrategy,
    generator: Arc<dyn Generator>,
) -> Box<dyn Expander> {
    match strategy {
        ExpansionStrategy::Rewrite => Box::new(RewriteExpander::new(generator)),
        ExpansionStrategy::Decompose => Box::new(DecomposeExpander::new(generator)),
        ExpansionStrategy::Hyde => Box::new(HydeExpander::new(generator)),
        ExpansionStrategy::StepBack => Box::new(StepBackExpander::new(generator)),
    }
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StepBackResponse {
    step_back: String,
    questions: Vec<String>,
}

fn questions_schema() -> ResponseSchema {
    ResponseSchema {
        name: "rewrites_schema".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": EXPANSION_BATCH_SIZE,
                    "maxItems": EXPANSION_BATCH_SIZE,
                }
            },
            "required": ["questions"],
            "additionalProperties": false,
        }),
    }
}

fn step_back_schema() -> ResponseSchema {
    ResponseSchema {
        name: "step_back_schema".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "step_back": {"type": "string"},
                "questions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": EXPANSION_BATCH_SIZE,
                    "maxItems": EXPANSION_BATCH_SIZE,
                }
            },
            "required": ["step_back", "questions"],
            "additionalProperties": false,
        }),
    }
}

/// Validate question cardinality; a short or long batch is a structural
/// failure, not a silent truncation.
fn check_batch(
    questions: Vec<String>,
    what: &'static str,
) -> Result<Vec<String>, PipelineError> {
    if questions.len() != EXPANSION_BATCH_SIZE {
        return Err(PipelineError::malformed(
            what,
            format!(
                "expected exactly {EXPANSION_BATCH_SIZE} questions, got {}",
                questions.len()
            ),
        ));
    }
    Ok(questions)
}

fn to_sub_queries(questions: Vec<String>, origin: ExpansionStrategy) -> Vec<SubQuery> {
    questions
        .into_iter()
        .enumerate()
        .map(|(index, text)| SubQuery::new(text, origin, index))
        .collect()
}

/// Produces exactly three intent-preserving paraphrases.
pub struct RewriteExpander {
    generator: Arc<dyn Generator>,
}

impl RewriteExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Expander for RewriteExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Rewrite
    }

    async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, PipelineError> {
        let request = GenerationRequest::new(REWRITE_PROMPT)
            .with_user(&query.text)
            .with_schema(questions_schema());
        let raw = self.generator.generate(&request).await?;

        let parsed: QuestionsResponse = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::malformed("rewrite", e.to_string()))?;
        let questions = check_batch(parsed.questions, "rewrite")?;

        debug!(query = %query.text, ?questions, "Rewrote query");
        Ok(to_sub_queries(questions, ExpansionStrategy::Rewrite))
    }
}

/// Splits a compound query into exactly three independent sub-questions.
pub struct DecomposeExpander {
    generator: Arc<dyn Generator>,
}

impl DecomposeExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Expander for DecomposeExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Decompose
    }

    async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, PipelineError> {
        let request = GenerationRequest::new(DECOMPOSE_PROMPT)
            .with_user(&query.text)
            .with_schema(questions_schema());
        let raw = self.generator.generate(&request).await?;

        let parsed: QuestionsResponse = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::malformed("decompose", e.to_string()))?;
        let questions = check_batch(parsed.questions, "decompose")?;

        debug!(query = %query.text, ?questions, "Decomposed query");
        Ok(to_sub_queries(questions, ExpansionStrategy::Decompose))
    }
}

/// Produces a single hypothetical answer passage to retrieve with.
pub struct HydeExpander {
    generator: Arc<dyn Generator>,
}

impl HydeExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Expander for HydeExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Hyde
    }

    async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, PipelineError> {
        let request = GenerationRequest::new(HYDE_PROMPT).with_user(&query.text);
        let passage = self.generator.generate(&request).await?;

        let passage = passage.trim().to_string();
        if passage.is_empty() {
            return Err(PipelineError::malformed(
                "hyde",
                "hypothetical passage is empty",
            ));
        }

        debug!(query = %query.text, %passage, "Generated hypothetical passage");
        Ok(vec![SubQuery::new(passage, ExpansionStrategy::Hyde, 0)])
    }
}

/// Abstracts the query, then produces three concrete questions grounded in
/// the abstraction.
pub struct StepBackExpander {
    generator: Arc<dyn Generator>,
}

impl StepBackExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Expander for StepBackExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::StepBack
    }

    async fn expand(&self, query: &Query) -> Result<Vec<SubQuery>, PipelineError> {
        let request = GenerationRequest::new(STEP_BACK_PROMPT)
            .with_user(&query.text)
            .with_schema(step_back_schema());
        let raw = self.generator.generate(&request).await?;

        let parsed: StepBackResponse = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::malformed("step-back", e.to_string()))?;
        let questions = check_batch(parsed.questions, "step-back")?;

        debug!(
            query = %query.text,
            abstraction = %parsed.step_back,
            ?questions,
            "Stepped back and rewrote query"
        );
        Ok(to_sub_queries(questions, ExpansionStrategy::StepBack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedGenerator;

    #[tokio::test]
    async fn test_rewrite_returns_exactly_three() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"questions": ["q1", "q2", "q3"]}"#.into(),
        ]));
        let expander = RewriteExpander::new(generator);

        let subs = expander.expand(&Query::new("what is a queue?")).await.unwrap();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].origin, ExpansionStrategy::Rewrite);
        assert_eq!(subs[2].index, 2);
    }

    #[tokio::test]
    async fn test_rewrite_short_batch_is_structural_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"questions": ["only one"]}"#.into(),
        ]));
        let expander = RewriteExpander::new(generator);

        let result = expander.expand(&Query::new("what is a queue?")).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse { what: "rewrite", .. })
        ));
    }

    #[tokio::test]
    async fn test_rewrite_invalid_json_is_structural_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["not json at all".into()]));
        let expander = RewriteExpander::new(generator);

        let result = expander.expand(&Query::new("what is a queue?")).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_rewrite_mistyped_field_is_structural_failure() {
        // "questions" present but not an array of strings.
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"questions": "q1, q2, q3"}"#.into(),
        ]));
        let expander = RewriteExpander::new(generator);

        let result = expander.expand(&Query::new("what is a queue?")).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_decompose_returns_exactly_three() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"questions": ["a?", "b?", "c?"]}"#.into(),
        ]));
        let expander = DecomposeExpander::new(generator);

        let subs = expander
            .expand(&Query::new("iPhone vs Samsung which is better?"))
            .await
            .unwrap();
        assert_eq!(subs.len(), 3);
        assert!(subs.iter().all(|s| s.origin == ExpansionStrategy::Decompose));
    }

    #[tokio::test]
    async fn test_hyde_returns_single_passage_sub_query() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "A queue is a first-in first-out collection. Elements enter at the tail and leave at the head.".into(),
        ]));
        let expander = HydeExpander::new(generator);

        let subs = expander.expand(&Query::new("what is a queue?")).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].origin, ExpansionStrategy::Hyde);
        assert!(subs[0].text.contains("first-in first-out"));
    }

    #[tokio::test]
    async fn test_hyde_empty_passage_is_structural_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["   ".into()]));
        let expander = HydeExpander::new(generator);

        let result = expander.expand(&Query::new("what is a queue?")).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse { what: "hyde", .. })
        ));
    }

    #[tokio::test]
    async fn test_step_back_returns_questions_not_abstraction() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"step_back": "how do data structures order elements?", "questions": ["x?", "y?", "z?"]}"#.into(),
        ]));
        let expander = StepBackExpander::new(generator);

        let subs = expander
            .expand(&Query::new("how does recursion work?"))
            .await
            .unwrap();
        assert_eq!(subs.len(), 3);
        assert!(subs.iter().all(|s| s.origin == ExpansionStrategy::StepBack));
        // The abstraction itself is not returned.
        assert!(subs.iter().all(|s| !s.text.contains("order elements")));
    }

    #[tokio::test]
    async fn test_step_back_missing_abstraction_is_structural_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"questions": ["x?", "y?", "z?"]}"#.into(),
        ]));
        let expander = StepBackExpander::new(generator);

        let result = expander.expand(&Query::new("how does recursion work?")).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_expander_for_covers_all_strategies() {
        let generator: Arc<dyn Generator> =
            Arc::new(ScriptedGenerator::new(vec![]));
        for strategy in [
            ExpansionStrategy::Rewrite,
            ExpansionStrategy::Decompose,
            ExpansionStrategy::Hyde,
            ExpansionStrategy::StepBack,
        ] {
            let expander = expander_for(strategy, generator.clone());
            assert_eq!(expander.strategy(), strategy);
        }
    }
}
