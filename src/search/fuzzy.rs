//! Fuzzy index (spec §4.8): edit-distance ranking directly over a
//! corpus's vocabulary. No persisted structure is required beyond the
//! corpus itself, so this module exposes a free function rather than a
//! stateful index type.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use unicode_segmentation::UnicodeSegmentation;

use crate::corpus::Corpus;
use crate::text;

use super::{SearchMethod, SearchResult};

/// `1 - edit_distance / max(len(a), len(b))`, taking the max of the
/// diacritic-stripped and diacritic-preserving (lowercase-only) scores
/// (spec §4.8 "Diacritics are handled by scoring both... taking the max").
fn token_score(query_token: &str, candidate: &str) -> f32 {
    let stripped = score_pair(&text::normalize(query_token), &text::normalize(candidate));
    let preserving = score_pair(&query_token.to_lowercase(), &candidate.to_lowercase());
    stripped.max(preserving)
}

fn score_pair(a: &str, b: &str) -> f32 {
    let max_len = a.graphemes(true).count().max(b.graphemes(true).count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (edit_distance(a, b) as f32 / max_len as f32)
}

/// Classic Levenshtein distance over grapheme clusters, so combining
/// diacritics and multi-codepoint characters each count as one edit.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<&str> = a.graphemes(true).collect();
    let b: Vec<&str> = b.graphemes(true).collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// Cheap bigram-overlap prefilter, discarding candidates whose overlap
/// falls below a threshold derived from query length — longer queries
/// tolerate proportionally more edits (spec §4.8 step 1).
fn ngram_overlap(a: &str, b: &str, n: usize) -> f32 {
    let grams_a = ngrams(a, n);
    let grams_b = ngrams(b, n);
    if grams_a.is_empty() || grams_b.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let set_b: HashSet<&str> = grams_b.iter().map(|s| s.as_str()).collect();
    let overlap = grams_a.iter().filter(|g| set_b.contains(g.as_str())).count();
    overlap as f32 / grams_a.len().max(grams_b.len()) as f32
}

fn ngrams(s: &str, n: usize) -> Vec<String> {
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() < n {
        return vec![s.to_string()];
    }
    graphemes.windows(n).map(|w| w.concat()).collect()
}

fn prefilter_threshold(token_len: usize) -> f32 {
    (0.35 - 0.01 * token_len as f32).max(0.05)
}

/// `search(query, max_results, min_score)` (spec §4.8): the full
/// pipeline — prefilter, edit-distance score, tier gate, lemma
/// collapse, multi-token averaging, tie-broken sort.
pub fn search(corpus: &Corpus, query: &str, max_results: usize, min_score: f32) -> Vec<SearchResult> {
    if corpus.vocabulary.is_empty() {
        return Vec::new();
    }
    let tokens = text::normalize_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let normalized_vocab: Vec<String> = corpus.vocabulary.iter().map(|t| text::normalize(t)).collect();
    let normalized_to_original: HashMap<String, String> = normalized_vocab
        .iter()
        .enumerate()
        .map(|(i, normalized)| {
            let original = corpus.original_vocabulary.get(i).cloned().unwrap_or_else(|| normalized.clone());
            (normalized.clone(), original)
        })
        .collect();

    let lemma_of: HashMap<String, String> = match &corpus.lemmatized_vocabulary {
        Some(lemmas) => normalized_vocab
            .iter()
            .zip(lemmas.iter())
            .map(|(term, lemma)| (term.clone(), text::normalize(lemma)))
            .collect(),
        None => HashMap::new(),
    };

    // Scored independently per vocabulary term, so the pool fans out
    // across cores for large vocabularies.
    let scores: HashMap<String, f32> = normalized_vocab
        .par_iter()
        .filter_map(|term| {
            let mut total = 0.0f32;
            for token in &tokens {
                let overlap = ngram_overlap(token, term, 2);
                total += if overlap < prefilter_threshold(token.len()) {
                    0.0
                } else {
                    token_score(token, term)
                };
            }
            let mean_score = total / tokens.len() as f32;

            // Tier gate: "extreme" (<=0.5) is rejected outright regardless of
            // a looser configured `min_score` (spec §4.8 step 3).
            if mean_score <= 0.5 || mean_score < min_score {
                None
            } else {
                Some((term.clone(), mean_score))
            }
        })
        .collect();

    // Collapse by lemma: best-scoring surface form per lemma survives.
    let mut best_by_lemma: HashMap<String, (String, f32)> = HashMap::new();
    for (term, score) in scores {
        let lemma_key = lemma_of.get(&term).cloned().unwrap_or_else(|| term.clone());
        best_by_lemma
            .entry(lemma_key)
            .and_modify(|existing| {
                if score > existing.1 {
                    *existing = (term.clone(), score);
                }
            })
            .or_insert((term, score));
    }

    let mut results: Vec<SearchResult> = best_by_lemma
        .into_values()
        .map(|(term, score)| {
            let word = normalized_to_original.get(&term).cloned().unwrap_or(term.clone());
            let frequency = corpus
                .word_frequencies
                .as_ref()
                .and_then(|m| m.get(&word).or_else(|| m.get(&term)))
                .copied()
                .unwrap_or(0);
            SearchResult {
                word,
                score,
                method: SearchMethod::Fuzzy,
                frequency,
            }
        })
        .collect();

    super::sort_results(&mut results);
    results.truncate(max_results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusType;

    fn corpus_with(terms: &[&str]) -> Corpus {
        let mut corpus = Corpus::new("test", CorpusType::Custom, "en");
        corpus.corpus_id = "c1".into();
        corpus.vocabulary = terms.iter().map(|s| s.to_string()).collect();
        corpus.original_vocabulary = corpus.vocabulary.clone();
        corpus
    }

    #[test]
    fn edit_distance_matches_known_values() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("apple", "apple"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn edit_distance_counts_combining_diacritics_as_one_grapheme() {
        // "e\u{0301}" (e + combining acute) is one grapheme, matching the
        // precomposed "é" at distance 0 rather than 1.
        assert_eq!(edit_distance("cafe\u{0301}", "café"), 0);
    }

    #[test]
    fn single_edit_typo_scores_above_extreme_threshold() {
        let corpus = corpus_with(&["apple", "application", "apply", "banana"]);
        let results = search(&corpus, "aple", 5, 0.5);
        let apple = results.iter().find(|r| r.word == "apple");
        assert!(apple.is_some());
        let score = apple.unwrap().score;
        assert!(score > 0.7 && score < 1.0, "score was {score}");
    }

    #[test]
    fn no_duplicate_words_in_results() {
        let corpus = corpus_with(&["apple", "application", "apply", "banana"]);
        let results = search(&corpus, "aple", 10, 0.0);
        let mut words: Vec<String> = results.iter().map(|r| r.word.clone()).collect();
        let before = words.len();
        words.sort();
        words.dedup();
        assert_eq!(words.len(), before);
    }

    #[test]
    fn empty_vocabulary_returns_no_results() {
        let corpus = corpus_with(&[]);
        assert!(search(&corpus, "anything", 5, 0.0).is_empty());
    }

    #[test]
    fn lemma_collapse_keeps_best_surface_form() {
        let mut corpus = corpus_with(&["run", "running", "ran"]);
        corpus.lemmatized_vocabulary = Some(vec!["run".into(), "run".into(), "run".into()]);
        let results = search(&corpus, "run", 10, 0.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].word, "run");
    }
}
