//! Core data model: queries, sub-queries, passages, and ranked lists.
//!
//! Everything here is request-scoped. A pipeline invocation owns its `Query`,
//! the `SubQuery` batch derived from it, and the `RankedList`s it retrieves;
//! nothing is shared or cached across invocations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// The retrieval strategy selected by a router for an incoming query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyTag {
    /// Compound query: split into independent sub-questions.
    Decompose,
    /// Definitional query: retrieve with a hypothetical answer passage.
    Hyde,
    /// Causal/process query: abstract first, then rewrite.
    StepBack,
    /// Catch-all: no expansion required. Every router must support this.
    Direct,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyTag::Decompose => "DECOMPOSE",
            StrategyTag::Hyde => "HYDE",
            StrategyTag::StepBack => "STEPBACK",
            StrategyTag::Direct => "DIRECT",
        };
        f.write_str(s)
    }
}

/// The expansion technique that produced a batch of sub-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStrategy {
    Rewrite,
    Decompose,
    Hyde,
    StepBack,
}

impl fmt::Display for ExpansionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpansionStrategy::Rewrite => "rewrite",
            ExpansionStrategy::Decompose => "decompose",
            ExpansionStrategy::Hyde => "hyde",
            ExpansionStrategy::StepBack => "stepback",
        };
        f.write_str(s)
    }
}

/// An incoming user query. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
        }
    }
}

/// A derived retrieval query produced by one expander invocation.
///
/// `index` is the position within its batch; sibling ordering matters only
/// for display, not for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
    pub origin: ExpansionStrategy,
    pub index: usize,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, origin: ExpansionStrategy, index: usize) -> Self {
        Self {
            text: text.into(),
            origin,
            index,
        }
    }
}

/// A retrieved unit of text with its source location and retriever-assigned
/// relevance score. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    /// Stable locator within the corpus, e.g. a page or document id.
    pub source_locator: String,
    /// Assigned by the retriever; absent in ingestion files.
    #[serde(default)]
    pub relevance_score: f32,
}

impl Passage {
    pub fn new(
        text: impl Into<String>,
        source_locator: impl Into<String>,
        relevance_score: f32,
    ) -> Self {
        Self {
            text: text.into(),
            source_locator: source_locator.into(),
            relevance_score,
        }
    }

    /// SHA-256 of the passage text, hex-encoded.
    pub fn text_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deduplication identity: two passages with the same locator but
    /// different snippet boundaries are distinct.
    pub fn id(&self) -> PassageId {
        PassageId {
            source_locator: self.source_locator.clone(),
            text_hash: self.text_hash(),
        }
    }
}

/// Passage identity for deduplication: `(source_locator, text_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassageId {
    pub source_locator: String,
    pub text_hash: String,
}

/// An ordered sequence of passages produced by one retrieval call for one
/// sub-query. Index 0 is the most relevant. Rank position is the only signal
/// consumed by rank fusion; raw scores are not compared across lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankedList {
    pub passages: Vec<Passage>,
}

impl RankedList {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// One fused passage with its reciprocal-rank score.
#[derive(Debug, Clone)]
pub struct FusedEntry {
    pub passage: Passage,
    pub score: f64,
}

/// The consensus ordering produced by rank fusion: scored passages sorted
/// descending by fused score, ties broken by first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FusedRanking {
    pub entries: Vec<FusedEntry>,
}

impl FusedRanking {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The top `n` fused passages, in rank order.
    pub fn top(&self, n: usize) -> Vec<Passage> {
        self.entries
            .iter()
            .take(n)
            .map(|e| e.passage.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passage_id_distinguishes_snippet_boundaries() {
        let a = Passage::new("a queue is a FIFO structure", "page_4", 0.9);
        let b = Passage::new("enqueue adds to the tail", "page_4", 0.8);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().source_locator, b.id().source_locator);
    }

    #[test]
    fn test_passage_id_stable_for_identical_content() {
        let a = Passage::new("same text", "page_1", 0.9);
        let b = Passage::new("same text", "page_1", 0.2);
        // Relevance score is not part of identity.
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_strategy_tag_display_roundtrip() {
        for (tag, s) in [
            (StrategyTag::Decompose, "DECOMPOSE"),
            (StrategyTag::Hyde, "HYDE"),
            (StrategyTag::StepBack, "STEPBACK"),
            (StrategyTag::Direct, "DIRECT"),
        ] {
            assert_eq!(tag.to_string(), s);
            let parsed: StrategyTag = serde_json::from_str(&format!("\"{s}\"")).unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn test_fused_ranking_top_truncates() {
        let ranking = FusedRanking {
            entries: vec![
                FusedEntry {
                    passage: Passage::new("a", "p1", 1.0),
                    score: 0.5,
                },
                FusedEntry {
                    passage: Passage::new("b", "p2", 1.0),
                    score: 0.3,
                },
            ],
        };
        let top = ranking.top(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].source_locator, "p1");
        assert_eq!(ranking.top(10).len(), 2);
    }
}
