//! # queryloom-core — multi-query retrieval orchestration
//!
//! Orchestrates retrieval-augmented question answering over a document
//! corpus: a router classifies each query, an expander turns it into one or
//! more retrieval queries, ranked candidate lists come back per sub-query,
//! a fusion step merges them into one consensus ordering, and a staged
//! generation protocol synthesizes a machine-checkable answer from the
//! fused context.
//!
//! The crate is pure orchestration logic invoked by a thin driver. The
//! heavyweight collaborators — generation, embeddings, vector search —
//! are consumed through narrow traits ([`generate::Generator`],
//! [`embed::Embedder`], [`retrieve::Retriever`]); reference
//! implementations (an OpenAI-compatible HTTP client and an in-memory
//! cosine index) make the crate usable end to end without bringing index
//! internals into scope.

pub mod config;
pub mod consensus;
pub mod context;
pub mod embed;
pub mod error;
pub mod expand;
pub mod fusion;
pub mod generate;
pub mod pipeline;
pub mod retrieve;
pub mod router;
pub mod sequential;
pub mod synthesize;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{AppConfig, EmbeddingConfig, FusionPolicy, GenerationConfig, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineAnswer, PipelineResponse};
pub use types::{
    ExpansionStrategy, FusedEntry, FusedRanking, Passage, PassageId, Query, RankedList,
    StrategyTag, SubQuery,
};
