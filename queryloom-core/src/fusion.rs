//! Reciprocal rank fusion: merge independently ranked passage lists into
//! one consensus ordering.
//!
//! Relevance scores from different sub-queries are not calibrated against
//! each other, so rank position is the only comparable signal. Each passage
//! scores the sum over all lists it appears in of `1 / (k + rank + 1)`
//! with zero-based ranks; absence from a list contributes nothing.
//!
//! Passages are keyed by `source_locator`, so the same source retrieved for
//! several sub-queries accumulates one combined score. The first-seen
//! passage text is kept as the representative for its locator.

use crate::types::{FusedEntry, FusedRanking, RankedList};
use std::collections::HashMap;

/// Default smoothing constant. Higher values reduce the influence of
/// high-ranking items from any single list.
pub const DEFAULT_K_CONSTANT: usize = 60;

/// Fuse ranked lists into a single consensus ordering.
///
/// Output is sorted descending by fused score; ties keep first-encountered
/// order across the input lists as given. The caller truncates to a top-N
/// before formatting context.
pub fn fuse(lists: &[RankedList], k_constant: usize) -> FusedRanking {
    // Entries stay in first-seen order until the final stable sort, which
    // makes the tie-break policy explicit and testable.
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<FusedEntry> = Vec::new();

    for list in lists {
        for (rank, passage) in list.passages.iter().enumerate() {
            let increment = 1.0 / (k_constant as f64 + rank as f64 + 1.0);
            match order.get(passage.source_locator.as_str()) {
                Some(&idx) => entries[idx].score += increment,
                None => {
                    order.insert(passage.source_locator.as_str(), entries.len());
                    entries.push(FusedEntry {
                        passage: passage.clone(),
                        score: increment,
                    });
                }
            }
        }
    }

    entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    FusedRanking { entries }
}
