// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Character n-gram TF-IDF feature extraction
//!
//! N-grams are taken *within word boundaries*: each whitespace-delimited
//! word is padded with one space on each side, and every contiguous
//! character window of length `min_n..=max_n` inside the padded word is a
//! candidate. A word shorter than the window is emitted once, whole.
//!
//! The vocabulary is frozen at fit time: the `max_features` n-grams with the
//! highest document frequency are kept (lexicographic tie-break), each with
//! `idf = ln((1+N)/(1+df)) + 1`. Transform produces count×idf vectors,
//! L2-normalized. Out-of-vocabulary n-grams contribute nothing; a text with
//! no vocabulary hit transforms to the zero vector.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Feature extraction hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Inclusive n-gram length range, values drawn from 1..=3.
    pub ngram_range: (usize, usize),
    /// Vocabulary size cap.
    pub max_features: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 3),
            max_features: 50_000,
        }
    }
}

/// Sparse feature vector: `(dense index, weight)` pairs, sorted by index.
pub type SparseVector = Vec<(u32, f64)>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TermEntry {
    index: u32,
    idf: f64,
}

/// Frozen n-gram → (index, idf) mapping. Built once by [`Vocabulary::fit`],
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    config: VectorizerConfig,
    entries: HashMap<String, TermEntry>,
    n_docs: usize,
}

impl Vocabulary {
    /// Build the vocabulary from a corpus of normalized texts.
    pub fn fit<'a, I>(texts: I, config: VectorizerConfig) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut n_docs = 0usize;

        for text in texts {
            n_docs += 1;
            let mut doc_grams: HashSet<String> = HashSet::new();
            char_wb_ngrams(text, config.ngram_range, |gram| {
                if !doc_grams.contains(gram) {
                    doc_grams.insert(gram.to_string());
                }
            });
            for gram in doc_grams {
                *df.entry(gram).or_insert(0) += 1;
            }
        }

        // Highest document frequency wins; ties resolve lexicographically so
        // the cap is deterministic.
        let mut ranked: Vec<(String, usize)> = df.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(config.max_features);

        // Dense indices follow lexicographic order of the kept grams.
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let entries = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (gram, df))| {
                let idf = ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0;
                (gram, TermEntry { index: i as u32, idf })
            })
            .collect();

        Self { config, entries, n_docs }
    }

    /// Number of features (dense dimensionality).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> VectorizerConfig {
        self.config
    }

    /// Number of documents the vocabulary was fitted on.
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }

    /// Transform a normalized text into an L2-normalized count×idf vector
    /// over the frozen vocabulary. Returns the zero vector when nothing in
    /// the text is in-vocabulary.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut weights: HashMap<u32, (f64, f64)> = HashMap::new();
        char_wb_ngrams(text, self.config.ngram_range, |gram| {
            if let Some(entry) = self.entries.get(gram) {
                let slot = weights.entry(entry.index).or_insert((0.0, entry.idf));
                slot.0 += 1.0;
            }
        });

        let mut vector: SparseVector = weights
            .into_iter()
            .map(|(index, (count, idf))| (index, count * idf))
            .collect();
        vector.sort_by_key(|&(index, _)| index);

        let norm = vector.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut vector {
                *w /= norm;
            }
        }
        vector
    }
}

/// Emit every char-within-word-boundary n-gram of `text`.
///
/// Mirrors the fitted-corpus convention exactly: pad each word with one
/// space per side, slide windows of each length, and emit a word shorter
/// than the window once without repeating it for larger lengths.
fn char_wb_ngrams<F: FnMut(&str)>(text: &str, (min_n, max_n): (usize, usize), mut emit: F) {
    let mut padded: Vec<char> = Vec::new();
    let mut buf = String::new();

    for word in text.split_whitespace() {
        padded.clear();
        padded.push(' ');
        padded.extend(word.chars());
        padded.push(' ');
        let w_len = padded.len();

        for n in min_n..=max_n {
            let mut offset = 0;
            buf.clear();
            buf.extend(padded[0..n.min(w_len)].iter());
            emit(&buf);
            while offset + n < w_len {
                offset += 1;
                buf.clear();
                buf.extend(padded[offset..offset + n].iter());
                emit(&buf);
            }
            if offset == 0 {
                // Word shorter than the window: counted once, and not again
                // for larger n.
                break;
            }
        }
    }
}
