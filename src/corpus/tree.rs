//! Corpus tree operations (spec §4.6): save, link, traverse, aggregate,
//! and cascade-delete a tree of [`Corpus`] records built on top of the
//! version store.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::codec;
use crate::error::{FloridifyError, Result};
use crate::registry::ModelRegistry;
use crate::version::{ResourceKey, ResourceType, SaveConfig, VersionStore};

use super::Corpus;

/// A corpus together with its fully materialized descendant subtree, as
/// returned by [`CorpusTree::get_tree`].
#[derive(Debug, Clone)]
pub struct CorpusTreeNode {
    pub corpus: Corpus,
    pub children: Vec<CorpusTreeNode>,
}

pub struct CorpusTree {
    store: Arc<VersionStore>,
}

impl CorpusTree {
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self { store }
    }

    fn key(corpus_id: &str) -> ResourceKey {
        ResourceKey::new(ResourceType::Corpus, corpus_id)
    }

    /// Stable digest of the sorted normalized vocabulary (spec §3
    /// `vocabulary_hash`, GLOSSARY "Vocabulary hash").
    pub fn vocabulary_hash(vocabulary: &[String]) -> String {
        let mut normalized: Vec<String> = vocabulary.iter().map(|t| crate::text::normalize(t)).collect();
        normalized.sort();
        normalized.dedup();
        codec::hash_canonical(&json!(normalized), &[])
    }

    /// `save_corpus(corpus) -> saved` (spec §4.6): assigns an id if new,
    /// recomputes `vocabulary_hash`, persists via the version store.
    pub async fn save_corpus(&self, mut corpus: Corpus) -> Result<Corpus> {
        if corpus.corpus_id.is_empty() {
            corpus.corpus_id = uuid::Uuid::new_v4().to_string();
        }
        if corpus.original_vocabulary.len() != corpus.vocabulary.len() {
            return Err(FloridifyError::invalid_argument(
                "vocabulary and original_vocabulary must have equal length",
            ));
        }
        if let Some(lemmatized) = &corpus.lemmatized_vocabulary {
            if lemmatized.len() != corpus.vocabulary.len() {
                return Err(FloridifyError::invalid_argument(
                    "lemmatized_vocabulary must match vocabulary length",
                ));
            }
        }
        corpus.vocabulary_hash = Self::vocabulary_hash(&corpus.vocabulary);

        let key = Self::key(&corpus.corpus_id);
        let content = serde_json::to_value(&corpus)?;
        let record = self
            .store
            .save(key, content, SaveConfig::default(), json!({}), vec![])
            .await?;
        self.decode_corpus(&record)
    }

    fn decode_corpus(&self, record: &crate::version::VersionRecord) -> Result<Corpus> {
        let value = self.store.decode_content(record)?;
        serde_json::from_value(value).map_err(FloridifyError::from)
    }

    pub async fn get_corpus(&self, corpus_id: &str) -> Result<Option<Corpus>> {
        match self.store.get_latest(&Self::key(corpus_id)).await? {
            Some(record) => Ok(Some(self.decode_corpus(&record)?)),
            None => Ok(None),
        }
    }

    /// Is `maybe_descendant` reachable by descending from `root_id`?
    async fn reaches(&self, root_id: &str, maybe_descendant: &str) -> Result<bool> {
        let mut stack = vec![root_id.to_string()];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == maybe_descendant {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(corpus) = self.get_corpus(&id).await? {
                stack.extend(corpus.child_corpus_ids.iter().cloned());
            }
        }
        Ok(false)
    }

    /// `add_child(parent_id, child_id)` (spec §4.6): mutates both
    /// endpoints, saved as two independent version-store writes (no
    /// cross-chain transaction — §7/§9 reconciliation rule).
    pub async fn add_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        if parent_id == child_id {
            return Err(FloridifyError::cycle_detected(format!(
                "corpus {parent_id} cannot be its own child"
            )));
        }
        // Adding child under parent cycles iff parent is already reachable
        // by descending from child (child is already an ancestor of parent).
        if self.reaches(child_id, parent_id).await? {
            return Err(FloridifyError::cycle_detected(format!(
                "linking {child_id} under {parent_id} would create a cycle"
            )));
        }

        let mut parent = self
            .get_corpus(parent_id)
            .await?
            .ok_or_else(|| FloridifyError::not_found(format!("corpus {parent_id}")))?;
        let mut child = self
            .get_corpus(child_id)
            .await?
            .ok_or_else(|| FloridifyError::not_found(format!("corpus {child_id}")))?;

        parent.child_corpus_ids.insert(child_id.to_string());
        child.parent_corpus_id = Some(parent_id.to_string());

        self.save_corpus(parent).await?;
        self.save_corpus(child).await?;
        Ok(())
    }

    /// `get_tree(root_id) -> tree` (spec §4.6): recursive traversal.
    pub async fn get_tree(&self, root_id: &str) -> Result<CorpusTreeNode> {
        let corpus = self
            .get_corpus(root_id)
            .await?
            .ok_or_else(|| FloridifyError::not_found(format!("corpus {root_id}")))?;

        let mut children = Vec::with_capacity(corpus.child_corpus_ids.len());
        for child_id in &corpus.child_corpus_ids {
            children.push(Box::pin(self.get_tree(child_id)).await?);
        }
        Ok(CorpusTreeNode { corpus, children })
    }

    /// `aggregate_vocabularies(root_id) -> corpus` (spec §4.6, R3): union
    /// of all descendant vocabularies, deduplicated order-preserving by
    /// first occurrence, written back to the root as a new version. Also
    /// aggregates `lemmatized_vocabulary` in lockstep, falling back to the
    /// surface form for a descendant that has none.
    pub async fn aggregate_vocabularies(&self, root_id: &str) -> Result<Corpus> {
        let tree = self.get_tree(root_id).await?;

        let mut seen = HashSet::new();
        let mut vocabulary = Vec::new();
        let mut original_vocabulary = Vec::new();
        let mut lemmatized_vocabulary = Vec::new();
        let mut frequencies = std::collections::HashMap::new();
        let mut any_lemmatized = false;

        for child in &tree.children {
            collect_descendant_vocabulary(
                child,
                &mut seen,
                &mut vocabulary,
                &mut original_vocabulary,
                &mut lemmatized_vocabulary,
                &mut frequencies,
                &mut any_lemmatized,
            );
        }

        let mut root = tree.corpus;
        root.vocabulary = vocabulary;
        root.original_vocabulary = original_vocabulary;
        root.word_frequencies = if frequencies.is_empty() { None } else { Some(frequencies) };
        root.lemmatized_vocabulary = if any_lemmatized { Some(lemmatized_vocabulary) } else { None };
        self.save_corpus(root).await
    }

    /// `delete_corpus(corpus_id, cascade)` (spec §4.6): without cascade,
    /// rejects a corpus with children; with cascade, deletes descendants
    /// and dependent indices first (P7).
    pub async fn delete_corpus(&self, registry: &ModelRegistry, corpus_id: &str, cascade: bool) -> Result<()> {
        let corpus = self
            .get_corpus(corpus_id)
            .await?
            .ok_or_else(|| FloridifyError::not_found(format!("corpus {corpus_id}")))?;

        if !corpus.child_corpus_ids.is_empty() && !cascade {
            return Err(FloridifyError::invalid_argument(format!(
                "corpus {corpus_id} has children; delete with cascade=true"
            )));
        }

        if cascade {
            for child_id in corpus.child_corpus_ids.clone() {
                Box::pin(self.delete_corpus(registry, &child_id, true)).await?;
            }
        }

        self.store.delete_cascade(&Self::key(corpus_id)).await?;

        if let Some(parent_id) = &corpus.parent_corpus_id {
            if let Some(mut parent) = self.get_corpus(parent_id).await? {
                parent.child_corpus_ids.remove(corpus_id);
                self.save_corpus(parent).await?;
            }
        }
        Ok(())
    }
}

fn collect_descendant_vocabulary(
    node: &CorpusTreeNode,
    seen: &mut HashSet<String>,
    vocabulary: &mut Vec<String>,
    original_vocabulary: &mut Vec<String>,
    lemmatized_vocabulary: &mut Vec<String>,
    frequencies: &mut std::collections::HashMap<String, u64>,
    any_lemmatized: &mut bool,
) {
    for (i, term) in node.corpus.vocabulary.iter().enumerate() {
        if seen.insert(term.clone()) {
            vocabulary.push(term.clone());
            let original = node.corpus.original_vocabulary.get(i).cloned().unwrap_or_else(|| term.clone());
            original_vocabulary.push(original);

            let lemma = node.corpus.lemmatized_vocabulary.as_ref().and_then(|l| l.get(i).cloned());
            if lemma.is_some() {
                *any_lemmatized = true;
            }
            lemmatized_vocabulary.push(lemma.unwrap_or_else(|| term.clone()));
        }
        if let Some(freq) = node.corpus.word_frequencies.as_ref().and_then(|m| m.get(term)) {
            *frequencies.entry(term.clone()).or_insert(0) += freq;
        }
    }
    for child in &node.children {
        collect_descendant_vocabulary(
            child,
            seen,
            vocabulary,
            original_vocabulary,
            lemmatized_vocabulary,
            frequencies,
            any_lemmatized,
        );
    }
}

/// Wire up the default cascade: deleting a corpus deletes its
/// `SearchIndex`/`TrieIndex`/`SemanticIndex` records sharing its id
/// (spec §4.6 cascade, P7).
pub fn register_cascade_dependents(registry: &ModelRegistry) {
    registry.register_dependents(ResourceType::Corpus, |id| {
        let id = id.to_string();
        vec![
            ResourceKey::new(ResourceType::Search, id.clone()),
            ResourceKey::new(ResourceType::Trie, id.clone()),
            ResourceKey::new(ResourceType::Semantic, id),
        ]
    });
}
