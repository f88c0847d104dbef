//! Sequential decomposition orchestration: answer each sub-query
//! independently against its own retrieved context, then synthesize one
//! final answer from the sub-answers.
//!
//! This is the alternate control path for DECOMPOSE-routed queries. A
//! per-sub-query response that fails structural parsing becomes an explicit
//! `"Invalid JSON"` fallback record rather than aborting the pipeline; only
//! the final synthesis call is strict.

use crate::context::format_context;
use crate::error::PipelineError;
use crate::generate::{GenerationRequest, Generator};
use crate::retrieve::Retriever;
use crate::types::SubQuery;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fallback answer recorded when a per-sub-query response fails to parse.
pub const INVALID_JSON_ANSWER: &str = "Invalid JSON";

/// One structured per-sub-query answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAnswer {
    pub sub_query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FinalAnswerRecord {
    final_answer: String,
}

/// The full decomposed result: every per-sub-query record plus the final
/// synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposedAnswer {
    pub sub_answers: Vec<SubAnswer>,
    pub final_answer: String,
}

fn sub_answer_prompt(sub_query: &str, context: &str) -> String {
    format!(
        r#"You are an expert assistant. Answer only using the provided Context.

Return strictly JSON:
{{
  "sub_query": "{sub_query}",
  "answer": "short answer from context, or state that the context does not say",
  "sources": ["doc_x references if any"]
}}

Context: {context}"#
    )
}

fn final_synthesis_prompt(sub_answers_json: &str) -> String {
    format!(
        r#"Synthesize a final user-facing answer from the following sub-answers:

{sub_answers_json}

Return strictly JSON:
{{
  "final_answer": "clear, concise synthesis in <=200 words"
}}"#
    )
}

/// Orchestrates the sequential decomposition path.
pub struct SequentialOrchestrator {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    retrieval_k: usize,
}

impl SequentialOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        retrieval_k: usize,
    ) -> Self {
        Self {
            generator,
            retriever,
            retrieval_k,
        }
    }

    /// Answer each sub-query in order, then synthesize the final answer.
    pub async fn run(&self, sub_queries: &[SubQuery]) -> Result<DecomposedAnswer, PipelineError> {
        let mut sub_answers = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            sub_answers.push(self.answer_one(sub_query).await?);
        }

        let final_answer = self.synthesize_final(&sub_answers).await?;
        Ok(DecomposedAnswer {
            sub_answers,
            final_answer,
        })
    }

    async fn answer_one(&self, sub_query: &SubQuery) -> Result<SubAnswer, PipelineError> {
        let list = self
            .retriever
            .search(&sub_query.text, self.retrieval_k)
            .await?;
        let context = format_context(&list.passages);

        let request = GenerationRequest::new(sub_answer_prompt(&sub_query.text, &context));
        let raw = self.generator.generate(&request).await?;

        match serde_json::from_str::<SubAnswer>(raw.trim()) {
            Ok(answer) => {
                debug!(sub_query = %sub_query.text, "Answered sub-query");
                Ok(answer)
            }
            Err(e) => {
                warn!(sub_query = %sub_query.text, error = %e, "Sub-answer failed to parse; recording fallback");
                Ok(SubAnswer {
                    sub_query: sub_query.text.clone(),
                    answer: INVALID_JSON_ANSWER.to_string(),
                    sources: Vec::new(),
                })
            }
        }
    }

    async fn synthesize_final(&self, sub_answers: &[SubAnswer]) -> Result<String, PipelineError> {
        let sub_answers_json = serde_json::to_string_pretty(sub_answers)?;
        let request = GenerationRequest::new(final_synthesis_prompt(&sub_answers_json));
        let raw = self.generator.generate(&request).await?;

        let record: FinalAnswerRecord = serde_json::from_str(raw.trim())
            .map_err(|e| PipelineError::malformed("final synthesis", e.to_string()))?;
        Ok(record.final_answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ranked, FixedRetriever, ScriptedGenerator};
    use crate::types::ExpansionStrategy;

    fn sub_queries() -> Vec<SubQuery> {
        vec![
            SubQuery::new("what is a queue?", ExpansionStrategy::Decompose, 0),
            SubQuery::new("what is a stack?", ExpansionStrategy::Decompose, 1),
        ]
    }

    fn retriever() -> Arc<FixedRetriever> {
        Arc::new(FixedRetriever::returning(ranked(&["page_4", "page_7"])))
    }

    #[tokio::test]
    async fn test_run_answers_each_then_synthesizes() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"sub_query": "what is a queue?", "answer": "FIFO", "sources": ["doc_1"]}"#.into(),
            r#"{"sub_query": "what is a stack?", "answer": "LIFO", "sources": []}"#.into(),
            r#"{"final_answer": "Queues are FIFO; stacks are LIFO."}"#.into(),
        ]));
        let orchestrator = SequentialOrchestrator::new(generator.clone(), retriever(), 5);

        let result = orchestrator.run(&sub_queries()).await.unwrap();
        assert_eq!(result.sub_answers.len(), 2);
        assert_eq!(result.sub_answers[0].answer, "FIFO");
        assert_eq!(result.final_answer, "Queues are FIFO; stacks are LIFO.");
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_unparseable_sub_answer_becomes_fallback_record() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "not json".into(),
            r#"{"sub_query": "what is a stack?", "answer": "LIFO"}"#.into(),
            r#"{"final_answer": "partial synthesis"}"#.into(),
        ]));
        let orchestrator = SequentialOrchestrator::new(generator, retriever(), 5);

        let result = orchestrator.run(&sub_queries()).await.unwrap();
        assert_eq!(result.sub_answers[0].answer, INVALID_JSON_ANSWER);
        assert!(result.sub_answers[0].sources.is_empty());
        // Missing "sources" on the second record defaults to empty.
        assert!(result.sub_answers[1].sources.is_empty());
        assert_eq!(result.final_answer, "partial synthesis");
    }

    #[tokio::test]
    async fn test_unparseable_final_synthesis_is_structural_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            r#"{"sub_query": "what is a queue?", "answer": "FIFO"}"#.into(),
            r#"{"sub_query": "what is a stack?", "answer": "LIFO"}"#.into(),
            "no json here".into(),
        ]));
        let orchestrator = SequentialOrchestrator::new(generator, retriever(), 5);

        let result = orchestrator.run(&sub_queries()).await;
        assert!(matches!(
            result,
            Err(PipelineError::MalformedResponse {
                what: "final synthesis",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_retrieval_failure_propagates() {
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let retriever = Arc::new(FixedRetriever::failing());
        let orchestrator = SequentialOrchestrator::new(generator, retriever, 5);

        let result = orchestrator.run(&sub_queries()).await;
        assert!(matches!(result, Err(PipelineError::Retrieval { .. })));
    }
}
