//! Staged answer synthesis over fused context.
//!
//! A single-threaded state machine drives the generation collaborator with
//! fixed system instructions. Every response must be one JSON record with
//! `{stage, content, sources[], status}`. The machine re-invokes generation
//! while `status` is `continue`, accumulating the conversation, and stops
//! successfully the moment `status` is `final` regardless of the stage
//! label. At most [`MAX_SYNTHESIS_ATTEMPTS`] generation calls are made per
//! invocation; a response that fails structural parsing is discarded and
//! counted against the budget. Exhausting the budget yields an
//! answer-unavailable result, not an error.
//!
//! The synthesizer enforces structure and termination only; grounding is
//! the generation contract's job, which requires a fixed not-found sentinel
//! (`status: final` with [`NOT_FOUND_CONTENT`]) when the context holds no
//! answer.

use crate::error::PipelineError;
use crate::generate::{ChatMessage, GenerationRequest, Generator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum generation attempts per synthesis invocation.
pub const MAX_SYNTHESIS_ATTEMPTS: usize = 3;

/// Fixed sentinel content the generation contract must return when the
/// context contains no answer.
pub const NOT_FOUND_CONTENT: &str =
    "The provided context does not contain an answer to this question.";

/// Stage label carried by one response of the staged protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageLabel {
    Analyse,
    Considerations,
    Validation,
    Result,
    Output,
}

/// Whether the protocol should continue or has produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Continue,
    Final,
}

/// One response record of the staged protocol.
///
/// `sources` is the only optional field; its absence defaults to empty.
/// Any other missing or mistyped field is a structural parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerStage {
    pub stage: StageLabel,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub status: StageStatus,
}

/// How a synthesis invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisResolution {
    /// A `status: final` record was observed.
    Final { content: String, sources: Vec<String> },
    /// The attempt budget was exhausted without a final record.
    Unavailable,
}

/// The result of one synthesis invocation: every stage observed, in order,
/// plus how the protocol terminated.
#[derive(Debug, Clone)]
pub struct StagedAnswer {
    pub stages: Vec<AnswerStage>,
    pub resolution: SynthesisResolution,
    pub attempts: usize,
}

impl StagedAnswer {
    pub fn is_final(&self) -> bool {
        matches!(self.resolution, SynthesisResolution::Final { .. })
    }
}

fn build_system_prompt(context: &str) -> String {
    format!(
        r#"You are an expert AI assistant. Base all answers only on the provided Context.

Return a single JSON object (no extra text) using this schema:
{{
  "stage": "one of: analyse, considerations, validation, result, output",
  "content": "string (concise, user-facing; max 150 words)",
  "sources": ["optional short references to the provided context, e.g. 'doc_3: paragraph 2'"],
  "status": "final" or "continue"
}}

Behavior rules:
- "analyse": 1-2 sentence summary of what the user asked and the relevant context to check.
- "considerations": up to 3 short bullets (each 1 sentence) listing factors considered.
- "validation": one short sentence indicating if the chosen interpretation aligns with the context/sources.
- "result": proper answer summary.
- "output": the final user-facing answer, clear and actionable.
- If more context or clarification is needed, set "status":"continue". Otherwise "status":"final".
- Always return strictly valid JSON (no surrounding explanation text).
- Do not answer on your own, only answer from the context.
- If you don't find the answer in the context, return: {{ "stage": "output", "status": "final", "content": "{NOT_FOUND_CONTENT}" }}

Context: {context}"#
    )
}

/// Drives the staged generation protocol.
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    max_attempts: usize,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            max_attempts: MAX_SYNTHESIS_ATTEMPTS,
        }
    }

    /// Override the attempt bound. Intended for tests; the protocol bound
    /// is [`MAX_SYNTHESIS_ATTEMPTS`].
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run the staged protocol for one query over one formatted context.
    ///
    /// Returns `Ok` with an [`SynthesisResolution::Unavailable`] resolution
    /// when every attempt is spent without observing a final record;
    /// generation transport failures are treated the same as unparseable
    /// responses and consume an attempt.
    pub async fn synthesize(
        &self,
        user_query: &str,
        context: &str,
    ) -> Result<StagedAnswer, PipelineError> {
        let system = build_system_prompt(context);
        let mut conversation = vec![ChatMessage::user(user_query)];
        let mut stages: Vec<AnswerStage> = Vec::new();

        for attempt in 1..=self.max_attempts {
            let request = GenerationRequest {
                system: system.clone(),
                messages: conversation.clone(),
                // Defer sampling to the provider's configured temperature.
                temperature: None,
                response_schema: None,
            };

            let raw = match self.generator.generate(&request).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "Generation attempt failed");
                    continue;
                }
            };

            let stage: AnswerStage = match serde_json::from_str(raw.trim()) {
                Ok(stage) => stage,
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "Discarding unparseable stage response");
                    continue;
                }
            };

            debug!(attempt, stage = ?stage.stage, status = ?stage.status, "Observed stage");
            conversation.push(ChatMessage::assistant(raw.trim()));

            let is_final = stage.status == StageStatus::Final;
            let content = stage.content.clone();
            let sources = stage.sources.clone();
            stages.push(stage);

            if is_final {
                return Ok(StagedAnswer {
                    stages,
                    resolution: SynthesisResolution::Final { content, sources },
                    attempts: attempt,
                });
            }
        }

        warn!(
            max = self.max_attempts,
            "Attempt budget exhausted without a final stage"
        );
        Ok(StagedAnswer {
            stages,
            resolution: SynthesisResolution::Unavailable,
            attempts: self.max_attempts,
        })
    }
}
