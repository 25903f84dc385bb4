//! Cascading search engine (spec §4.7-§4.10): exact/prefix trie lookup,
//! fuzzy edit-distance ranking, semantic vector search, and the facade
//! that merges them.

pub mod facade;
pub mod fuzzy;
pub mod semantic;
pub mod trie;

pub use facade::{MethodHint, SearchFacade, SearchIndex};
pub use semantic::Embedder;
pub use trie::TrieIndex;

use serde::{Deserialize, Serialize};

/// Which tier produced a [`SearchResult`] (spec §4.10 "method precedence").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Exact,
    Prefix,
    Fuzzy,
    Semantic,
}

impl SearchMethod {
    /// Lower is stronger; used to break score ties (spec §4.10 step 4).
    pub fn precedence(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::Prefix => 1,
            Self::Fuzzy => 2,
            Self::Semantic => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub word: String,
    pub score: f32,
    pub method: SearchMethod,
    pub frequency: u64,
}

/// Sort results per spec §4.10 step 4: score desc, method precedence,
/// frequency desc, lexicographic asc (P6).
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.method.precedence().cmp(&b.method.precedence()))
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.word.cmp(&b.word))
    });
}

/// Union by normalized word, keeping the highest score and the earliest
/// (strongest) method on a collision (spec §4.10 step 3): a weaker, later
/// tier is never allowed to relabel an existing result's `method`, even
/// when it scores higher.
pub fn merge_results(into: &mut Vec<SearchResult>, additions: Vec<SearchResult>) {
    for addition in additions {
        let key = crate::text::normalize(&addition.word);
        if let Some(existing) = into.iter_mut().find(|r| crate::text::normalize(&r.word) == key) {
            if addition.score > existing.score {
                existing.score = addition.score;
                if addition.method.precedence() <= existing.method.precedence() {
                    existing.method = addition.method;
                }
            } else if addition.score == existing.score && addition.method.precedence() < existing.method.precedence() {
                existing.method = addition.method;
            }
        } else {
            into.push(addition);
        }
    }
}
