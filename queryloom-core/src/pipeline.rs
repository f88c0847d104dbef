//! End-to-end pipeline: route, expand, retrieve, fuse, format, synthesize.
//!
//! Each call to [`Pipeline::run`] is one request-scoped invocation that
//! owns its query, sub-queries, and ranked lists exclusively; nothing is
//! shared across invocations. Per-sub-query retrieval calls are mutually
//! independent and issued concurrently, with results reassembled in
//! sub-query order before fusion.

use crate::config::{FusionPolicy, PipelineConfig};
use crate::consensus::intersect;
use crate::context::format_context;
use crate::error::PipelineError;
use crate::expand::expander_for;
use crate::fusion::fuse;
use crate::generate::Generator;
use crate::retrieve::Retriever;
use crate::router::StrategyRouter;
use crate::sequential::{DecomposedAnswer, SequentialOrchestrator};
use crate::synthesize::{AnswerSynthesizer, StagedAnswer};
use crate::types::{ExpansionStrategy, Passage, Query, RankedList, StrategyTag, SubQuery};
use futures::future;
use std::sync::Arc;
use tracing::{info, warn};

/// The answer body of a pipeline invocation.
#[derive(Debug, Clone)]
pub enum PipelineAnswer {
    /// Staged protocol over one fused context.
    Staged(StagedAnswer),
    /// Per-sub-query answers plus a final synthesis.
    Decomposed(DecomposedAnswer),
}

/// Everything one invocation produced.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub query: Query,
    pub strategy: StrategyTag,
    pub sub_queries: Vec<SubQuery>,
    pub answer: PipelineAnswer,
}

/// The orchestration pipeline. Construct once, invoke per query.
pub struct Pipeline {
    router: Arc<dyn StrategyRouter>,
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    synthesizer: AnswerSynthesizer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        router: Arc<dyn StrategyRouter>,
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> Self {
        let synthesizer = AnswerSynthesizer::new(generator.clone());
        Self {
            router,
            generator,
            retriever,
            synthesizer,
            config,
        }
    }

    /// Route the question and run one full invocation.
    pub async fn run(&self, question: &str) -> Result<PipelineResponse, PipelineError> {
        let query = Query::new(question);
        let strategy = self.router.classify(&query).await?;
        info!(%strategy, query = %query.text, "Routed query");
        self.run_with_strategy(query, strategy).await
    }

    /// Run one invocation with an explicit strategy, bypassing the router.
    pub async fn run_with_strategy(
        &self,
        query: Query,
        strategy: StrategyTag,
    ) -> Result<PipelineResponse, PipelineError> {
        let sub_queries = self.expand(&query, strategy).await?;

        if strategy == StrategyTag::Decompose && self.config.sequential_decomposition {
            let orchestrator = SequentialOrchestrator::new(
                self.generator.clone(),
                self.retriever.clone(),
                self.config.sequential_k,
            );
            let decomposed = orchestrator.run(&sub_queries).await?;
            return Ok(PipelineResponse {
                query,
                strategy,
                sub_queries,
                answer: PipelineAnswer::Decomposed(decomposed),
            });
        }

        // DIRECT without rewriting retrieves with the original query alone.
        let retrieval_texts: Vec<String> = if sub_queries.is_empty() {
            vec![query.text.clone()]
        } else {
            sub_queries.iter().map(|s| s.text.clone()).collect()
        };

        let lists = self.retrieve_all(&retrieval_texts).await?;
        let passages = self.select_passages(strategy, &lists);
        let context = format_context(&passages);

        let staged = self.synthesizer.synthesize(&query.text, &context).await?;
        Ok(PipelineResponse {
            query,
            strategy,
            sub_queries,
            answer: PipelineAnswer::Staged(staged),
        })
    }

    /// Map the routed strategy to its expansion, if any.
    async fn expand(
        &self,
        query: &Query,
        strategy: StrategyTag,
    ) -> Result<Vec<SubQuery>, PipelineError> {
        let expansion = match strategy {
            StrategyTag::Decompose => Some(ExpansionStrategy::Decompose),
            StrategyTag::Hyde => Some(ExpansionStrategy::Hyde),
            StrategyTag::StepBack => Some(ExpansionStrategy::StepBack),
            StrategyTag::Direct => {
                if self.config.rewrite_on_direct {
                    Some(ExpansionStrategy::Rewrite)
                } else {
                    None
                }
            }
        };

        match expansion {
            Some(expansion) => {
                expander_for(expansion, self.generator.clone())
                    .expand(query)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Issue the per-sub-query retrieval calls concurrently; results come
    /// back in sub-query order.
    ///
    /// Fail-closed by default: any retrieval failure aborts the invocation.
    /// In resilient mode failed sub-queries are dropped, and the invocation
    /// errors only when every retrieval failed.
    async fn retrieve_all(&self, texts: &[String]) -> Result<Vec<RankedList>, PipelineError> {
        let searches = texts
            .iter()
            .map(|text| self.retriever.search(text, self.config.retrieval_k));

        if !self.config.resilient {
            return future::try_join_all(searches).await;
        }

        let results = future::join_all(searches).await;
        let mut lists = Vec::new();
        for (text, result) in texts.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    warn!(sub_query = %text, error = %e, "Dropping failed retrieval in resilient mode");
                }
            }
        }
        if lists.is_empty() {
            return Err(PipelineError::retrieval(
                "every sub-query retrieval failed",
            ));
        }
        Ok(lists)
    }

    /// Merge the per-sub-query lists into the passages used as context.
    ///
    /// Step-back routed queries always try the consensus filter first; an
    /// empty intersection is a valid signal, answered by falling back to
    /// rank fusion.
    fn select_passages(&self, strategy: StrategyTag, lists: &[RankedList]) -> Vec<Passage> {
        let policy = if strategy == StrategyTag::StepBack {
            FusionPolicy::Consensus
        } else {
            self.config.fusion_policy
        };

        match policy {
            FusionPolicy::Consensus => {
                let passages = intersect(lists);
                if passages.is_empty() {
                    warn!("Empty consensus across sub-query results; falling back to rank fusion");
                    fuse(lists, self.config.rrf_k_constant).top(self.config.fused_top_n)
                } else {
                    passages
                }
            }
            FusionPolicy::ReciprocalRank => {
                fuse(lists, self.config.rrf_k_constant).top(self.config.fused_top_n)
            }
        }
    }
}
