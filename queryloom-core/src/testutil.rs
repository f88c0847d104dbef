//! Scripted collaborator doubles shared by the unit tests.

use crate::embed::Embedder;
use crate::error::PipelineError;
use crate::generate::{GenerationRequest, Generator};
use crate::retrieve::Retriever;
use crate::types::{Passage, RankedList};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Build a ranked list from locators; each passage's text mentions its
/// locator so representatives are distinguishable.
pub fn ranked(locators: &[&str]) -> RankedList {
    let passages = locators
        .iter()
        .enumerate()
        .map(|(rank, locator)| {
            Passage::new(
                format!("passage from {locator}"),
                *locator,
                1.0 - rank as f32 * 0.1,
            )
        })
        .collect();
    RankedList::new(passages)
}

/// Generator that replays a fixed queue of responses and records every
/// request it receives. An exhausted queue fails like a transport error.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: Mutex<usize>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    /// Total generate calls made, including failed ones.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        *self.calls.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::generation("scripted response queue exhausted"))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Retriever that serves canned lists: per-query overrides first, then the
/// default list. Records every query searched.
pub struct FixedRetriever {
    default: Option<RankedList>,
    by_query: HashMap<String, RankedList>,
    fail_queries: HashSet<String>,
    fail_all: bool,
    searched: Mutex<Vec<String>>,
}

impl FixedRetriever {
    pub fn new() -> Self {
        Self {
            default: None,
            by_query: HashMap::new(),
            fail_queries: HashSet::new(),
            fail_all: false,
            searched: Mutex::new(Vec::new()),
        }
    }

    /// Serve the same list for every query.
    pub fn returning(list: RankedList) -> Self {
        let mut retriever = Self::new();
        retriever.default = Some(list);
        retriever
    }

    /// Fail every search.
    pub fn failing() -> Self {
        let mut retriever = Self::new();
        retriever.fail_all = true;
        retriever
    }

    pub fn with_query(mut self, query: &str, list: RankedList) -> Self {
        self.by_query.insert(query.to_string(), list);
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.fail_queries.insert(query.to_string());
        self
    }

    /// Every query searched, in call order.
    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }
}

impl Default for FixedRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn search(&self, query_text: &str, k: usize) -> Result<RankedList, PipelineError> {
        self.searched.lock().unwrap().push(query_text.to_string());

        if self.fail_all || self.fail_queries.contains(query_text) {
            return Err(PipelineError::retrieval(format!(
                "scripted failure for '{query_text}'"
            )));
        }

        let mut list = self
            .by_query
            .get(query_text)
            .or(self.default.as_ref())
            .cloned()
            .unwrap_or_default();
        list.passages.truncate(k);
        Ok(list)
    }
}

/// Embedder that returns fixed vectors for known texts and a zero vector
/// otherwise.
pub struct KeyedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dims: usize,
}

impl KeyedEmbedder {
    pub fn new(entries: Vec<(String, Vec<f32>)>) -> Self {
        let dims = entries.first().map(|(_, v)| v.len()).unwrap_or(3);
        Self {
            vectors: entries.into_iter().collect(),
            dims,
        }
    }
}

#[async_trait]
impl Embedder for KeyedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "keyed"
    }
}
