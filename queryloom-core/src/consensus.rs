//! Multi-query consensus filter: the fusion alternative that keeps only
//! passages whose source appears in *every* sub-query's result list.
//!
//! An empty intersection is a valid terminal state, not an error: it
//! signals that no source was corroborated by all sub-queries, and the
//! caller decides the fallback (the pipeline falls back to rank fusion).

use crate::types::{Passage, RankedList};
use std::collections::HashSet;

/// Intersect `source_locator` values across all input lists, then return
/// every passage from the union of lists (in list order) whose locator is
/// in that intersection. Returns an empty sequence when the lists share no
/// locator, or when no lists are given.
pub fn intersect(lists: &[RankedList]) -> Vec<Passage> {
    let mut lists_iter = lists.iter();
    let Some(first) = lists_iter.next() else {
        return Vec::new();
    };

    let mut common: HashSet<&str> = first
        .passages
        .iter()
        .map(|p| p.source_locator.as_str())
        .collect();
    for list in lists_iter {
        let locators: HashSet<&str> = list
            .passages
            .iter()
            .map(|p| p.source_locator.as_str())
            .collect();
        common.retain(|locator| locators.contains(locator));
        if common.is_empty() {
            return Vec::new();
        }
    }

    lists
        .iter()
        .flat_map(|list| list.passages.iter())
        .filter(|p| common.contains(p.source_locator.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ranked;

    #[test]
    fn test_intersect_no_common_locator_is_empty() {
        let lists = vec![ranked(&["a", "b"]), ranked(&["c", "d"])];
        assert!(intersect(&lists).is_empty());
    }

    #[test]
    fn test_intersect_identical_lists_returns_all() {
        let lists = vec![ranked(&["a", "b"]), ranked(&["a", "b"])];
        let passages = intersect(&lists);
        // Union of both lists: each passage appears twice.
        assert_eq!(passages.len(), 4);
        assert!(passages.iter().all(|p| p.source_locator == "a" || p.source_locator == "b"));
    }

    #[test]
    fn test_intersect_three_lists_sharing_one_page() {
        let lists = vec![
            ranked(&["page_1", "page_4"]),
            ranked(&["page_4", "page_9"]),
            ranked(&["page_2", "page_4", "page_7"]),
        ];
        let passages = intersect(&lists);
        assert_eq!(passages.len(), 3);
        assert!(passages.iter().all(|p| p.source_locator == "page_4"));
    }

    #[test]
    fn test_intersect_requires_presence_in_all_lists_not_just_pairs() {
        // "x" appears in two of three lists; must be excluded.
        let lists = vec![
            ranked(&["x", "shared"]),
            ranked(&["x", "shared"]),
            ranked(&["shared"]),
        ];
        let passages = intersect(&lists);
        assert!(passages.iter().all(|p| p.source_locator == "shared"));
        assert_eq!(passages.len(), 3);
    }

    #[test]
    fn test_intersect_no_lists_is_empty() {
        assert!(intersect(&[]).is_empty());
    }

    #[test]
    fn test_intersect_single_list_returns_it() {
        let lists = vec![ranked(&["a", "b"])];
        assert_eq!(intersect(&lists).len(), 2);
    }
}
