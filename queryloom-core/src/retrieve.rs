//! Retrieval collaborator contract and a reference in-memory index.
//!
//! The pipeline consumes retrieval through the [`Retriever`] trait: given a
//! query string and a bound `k`, return passages already ordered by
//! relevance (rank 0 = best). Vector index internals are out of scope;
//! [`MemoryIndex`] exists so the contracts can be exercised without an
//! external service.

use crate::embed::{cosine_similarity, Embedder};
use crate::error::PipelineError;
use crate::types::{Passage, RankedList};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for retrieval providers.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages ordered by relevance, rank 0 first.
    async fn search(&self, query_text: &str, k: usize) -> Result<RankedList, PipelineError>;
}

struct IndexEntry {
    passage: Passage,
    vector: Vec<f32>,
}

/// In-memory cosine-similarity index over an [`Embedder`].
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Ingest passages, embedding each. Returns the number of passages added.
    pub async fn add(&self, passages: Vec<Passage>) -> Result<usize, PipelineError> {
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let mut entries = self.entries.write().await;
        let added = passages.len();
        for (passage, vector) in passages.into_iter().zip(vectors) {
            entries.push(IndexEntry { passage, vector });
        }
        debug!(added, total = entries.len(), "Ingested passages");
        Ok(added)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Retriever for MemoryIndex {
    async fn search(&self, query_text: &str, k: usize) -> Result<RankedList, PipelineError> {
        let query_vector = self.embedder.embed(query_text).await?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_vector, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let passages = scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| {
                let mut passage = entry.passage.clone();
                passage.relevance_score = score;
                passage
            })
            .collect();

        Ok(RankedList::new(passages))
    }
}
