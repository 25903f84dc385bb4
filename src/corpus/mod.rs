//! Corpus tree (spec §3 `Corpus`, §4.6): vocabularies linked into a
//! parent/child tree with hash-based change detection, persisted through
//! the version store.

pub mod tree;

pub use tree::{register_cascade_dependents, CorpusTree, CorpusTreeNode};

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// `corpus_type` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusType {
    Language,
    Literature,
    Lexicon,
    Custom,
}

/// A versioned vocabulary node (spec §3 `Corpus`). Persisted as the JSON
/// payload of a `ResourceType::Corpus` version record; the version store
/// itself never interprets these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub corpus_id: String,
    pub corpus_name: String,
    pub corpus_type: CorpusType,
    pub language: String,
    pub vocabulary: Vec<String>,
    pub original_vocabulary: Vec<String>,
    pub vocabulary_hash: String,
    pub parent_corpus_id: Option<String>,
    pub child_corpus_ids: HashSet<String>,
    pub is_master: bool,
    pub word_frequencies: Option<HashMap<String, u64>>,
    pub lemmatized_vocabulary: Option<Vec<String>>,
}

impl Corpus {
    /// A fresh, unsaved corpus. `corpus_id` is assigned by
    /// [`CorpusTree::save_corpus`] if left empty.
    pub fn new(corpus_name: impl Into<String>, corpus_type: CorpusType, language: impl Into<String>) -> Self {
        Self {
            corpus_id: String::new(),
            corpus_name: corpus_name.into(),
            corpus_type,
            language: language.into(),
            vocabulary: Vec::new(),
            original_vocabulary: Vec::new(),
            vocabulary_hash: String::new(),
            parent_corpus_id: None,
            child_corpus_ids: HashSet::new(),
            is_master: false,
            word_frequencies: None,
            lemmatized_vocabulary: None,
        }
    }
}
