// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Corpus loading and preparation
//!
//! Two input formats:
//! - Article CSV (ISOT layout): header row, `title` and `text` columns, one
//!   file per class, label assigned per file.
//! - LIAR TSV: no header, 14 tab-separated columns; the 6-way truthfulness
//!   label is mapped to binary FAKE/REAL.
//!
//! Rows that cannot be used (unmappable label, empty text after
//! normalization, duplicate `(text, label)`) are dropped and counted, never
//! silently lost.

use crate::error::{DataError, StartupError};
use crate::normalize::normalize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Binary classification label. FAKE is the positive class throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Fake => "FAKE",
            Label::Real => "REAL",
        }
    }

    pub fn is_fake(&self) -> bool {
        matches!(self, Label::Fake)
    }

    /// Map a LIAR 6-way truthfulness label to binary.
    ///
    /// `pants-fire`, `false`, `barely-true` are FAKE; `half-true`,
    /// `mostly-true`, `true` are REAL. Anything else is unmappable.
    pub fn from_liar(original: &str) -> Result<Label, DataError> {
        match original.trim().to_lowercase().as_str() {
            "pants-fire" | "false" | "barely-true" => Ok(Label::Fake),
            "half-true" | "mostly-true" | "true" => Ok(Label::Real),
            other => Err(DataError::UnmappableLabel(other.to_string())),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled text passage with its originating corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub label: Label,
    pub source: String,
}

/// Counts of rows dropped during corpus preparation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DropStats {
    pub unmappable_label: usize,
    pub empty_text: usize,
    pub duplicates: usize,
}

impl DropStats {
    pub fn total(&self) -> usize {
        self.unmappable_label + self.empty_text + self.duplicates
    }

    pub fn record(&mut self, err: &DataError) {
        match err {
            DataError::UnmappableLabel(_) => self.unmappable_label += 1,
            DataError::EmptyText => self.empty_text += 1,
            DataError::Duplicate => self.duplicates += 1,
        }
    }
}

/// A prepared training/evaluation corpus: normalized, deduplicated,
/// with drop accounting.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub drops: DropStats,
}

/// Load an article CSV (ISOT layout) where every row carries `label`.
///
/// Title and body are concatenated for classification, matching how the
/// corpus was assembled upstream.
pub fn load_article_csv(path: &Path, label: Label, source: &str) -> Result<Vec<Document>, StartupError> {
    let file = open_corpus_file(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut documents = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping malformed record {} in {}: {}", idx, path.display(), e);
                continue;
            }
        };

        let title = record.get(0).unwrap_or("");
        let text = record.get(1).unwrap_or("");
        let combined = if title.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", title, text)
        };

        documents.push(Document {
            text: combined,
            label,
            source: source.to_string(),
        });
    }

    tracing::info!("Loaded {} rows from {} ({})", documents.len(), path.display(), source);
    Ok(documents)
}

/// Load one LIAR TSV split. Unmappable labels are counted into `drops`.
pub fn load_liar_tsv(path: &Path, drops: &mut DropStats) -> Result<Vec<Document>, StartupError> {
    let file = open_corpus_file(path)?;
    let reader = BufReader::new(file);

    let mut documents = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Skipping unreadable line {} in {}: {}", idx, path.display(), e);
                continue;
            }
        };
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            tracing::warn!("Skipping malformed line {} in {}: insufficient fields", idx, path.display());
            continue;
        }

        // Columns: id, label, statement, subjects, speaker, ...
        let label = match Label::from_liar(fields[1]) {
            Ok(label) => label,
            Err(e) => {
                drops.record(&e);
                continue;
            }
        };

        documents.push(Document {
            text: fields[2].to_string(),
            label,
            source: "LIAR".to_string(),
        });
    }

    tracing::info!("Loaded {} rows from {} (LIAR)", documents.len(), path.display());
    Ok(documents)
}

/// Load the three standard LIAR splits (`train.tsv`, `test.tsv`,
/// `valid.tsv`) from a directory and concatenate them.
pub fn load_liar_dir(dir: &Path, drops: &mut DropStats) -> Result<Vec<Document>, StartupError> {
    let mut documents = Vec::new();
    for split in ["train.tsv", "test.tsv", "valid.tsv"] {
        documents.extend(load_liar_tsv(&dir.join(split), drops)?);
    }
    Ok(documents)
}

/// Deterministically subsample `documents` down to `n` entries.
pub fn subsample(mut documents: Vec<Document>, n: usize, seed: u64) -> Vec<Document> {
    if documents.len() <= n {
        return documents;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    documents.shuffle(&mut rng);
    documents.truncate(n);
    documents
}

/// Normalize, drop empty texts, deduplicate `(text, label)`, and shuffle
/// deterministically. Drop counts accumulate on top of whatever the loaders
/// already recorded in `drops`.
pub fn build_corpus(raw: Vec<Document>, mut drops: DropStats, seed: u64) -> Corpus {
    let mut seen: HashSet<(String, Label)> = HashSet::new();
    let mut documents = Vec::with_capacity(raw.len());

    for doc in raw {
        let text = normalize(&doc.text);
        if text.is_empty() {
            drops.record(&DataError::EmptyText);
            continue;
        }
        if !seen.insert((text.clone(), doc.label)) {
            drops.record(&DataError::Duplicate);
            continue;
        }
        documents.push(Document {
            text,
            label: doc.label,
            source: doc.source,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    documents.shuffle(&mut rng);

    tracing::info!(
        "Corpus prepared: {} documents ({} dropped: {} unmappable label, {} empty, {} duplicate)",
        documents.len(),
        drops.total(),
        drops.unmappable_label,
        drops.empty_text,
        drops.duplicates
    );

    Corpus { documents, drops }
}

/// Stratified train/test split: class proportions are preserved in both
/// halves, assignment is deterministic for a given seed.
pub fn stratified_split(
    documents: &[Document],
    test_fraction: f64,
    seed: u64,
) -> (Vec<Document>, Vec<Document>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [Label::Fake, Label::Real] {
        let mut indices: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.label == class)
            .map(|(i, _)| i)
            .collect();
        indices.shuffle(&mut rng);

        let n_test = (indices.len() as f64 * test_fraction).round() as usize;
        for (k, idx) in indices.into_iter().enumerate() {
            if k < n_test {
                test.push(documents[idx].clone());
            } else {
                train.push(documents[idx].clone());
            }
        }
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

fn open_corpus_file(path: &Path) -> Result<File, StartupError> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StartupError::CorpusMissing { path: path.to_path_buf() }
        } else {
            StartupError::CorpusUnreadable { path: path.to_path_buf(), source: e }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_liar_label_mapping() {
        assert_eq!(Label::from_liar("pants-fire").unwrap(), Label::Fake);
        assert_eq!(Label::from_liar("false").unwrap(), Label::Fake);
        assert_eq!(Label::from_liar("barely-true").unwrap(), Label::Fake);
        assert_eq!(Label::from_liar("half-true").unwrap(), Label::Real);
        assert_eq!(Label::from_liar("mostly-true").unwrap(), Label::Real);
        assert_eq!(Label::from_liar("TRUE").unwrap(), Label::Real);
        assert!(Label::from_liar("full-flop").is_err());
    }

    #[test]
    fn test_load_liar_tsv_counts_unmappable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "1\tfalse\tThe moon is made of cheese\tscience").unwrap();
        writeln!(f, "2\ttrue\tWater is wet\tscience").unwrap();
        writeln!(f, "3\tbogus-label\tUnusable row\tmisc").unwrap();
        writeln!(f, "4\tshort-line").unwrap();

        let mut drops = DropStats::default();
        let docs = load_liar_tsv(&path, &mut drops).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(drops.unmappable_label, 1);
        assert_eq!(docs[0].label, Label::Fake);
        assert_eq!(docs[1].label, Label::Real);
        assert_eq!(docs[0].source, "LIAR");
    }

    #[test]
    fn test_missing_corpus_file_is_startup_error() {
        let mut drops = DropStats::default();
        let err = load_liar_tsv(Path::new("/nonexistent/train.tsv"), &mut drops).unwrap_err();
        assert!(matches!(err, StartupError::CorpusMissing { .. }));
    }

    #[test]
    fn test_build_corpus_dedups_and_drops_empty() {
        let raw = vec![
            Document { text: "Breaking news today!".into(), label: Label::Fake, source: "A".into() },
            Document { text: "breaking NEWS today".into(), label: Label::Fake, source: "B".into() },
            Document { text: "breaking news today".into(), label: Label::Real, source: "A".into() },
            Document { text: "!!!".into(), label: Label::Real, source: "A".into() },
        ];
        let corpus = build_corpus(raw, DropStats::default(), 42);

        // Same normalized text with a different label is kept.
        assert_eq!(corpus.documents.len(), 2);
        assert_eq!(corpus.drops.duplicates, 1);
        assert_eq!(corpus.drops.empty_text, 1);
        for doc in &corpus.documents {
            assert_eq!(doc.text, "breaking news today");
        }
    }

    #[test]
    fn test_subsample_is_deterministic() {
        let docs: Vec<Document> = (0..100)
            .map(|i| Document {
                text: format!("document number {}", i),
                label: if i % 2 == 0 { Label::Fake } else { Label::Real },
                source: "X".into(),
            })
            .collect();

        let a = subsample(docs.clone(), 10, 7);
        let b = subsample(docs, 10, 7);
        assert_eq!(a.len(), 10);
        let texts_a: Vec<&str> = a.iter().map(|d| d.text.as_str()).collect();
        let texts_b: Vec<&str> = b.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts_a, texts_b);
    }

    #[test]
    fn test_stratified_split_preserves_proportions() {
        let docs: Vec<Document> = (0..100)
            .map(|i| Document {
                text: format!("document number {}", i),
                label: if i < 30 { Label::Fake } else { Label::Real },
                source: "X".into(),
            })
            .collect();

        let (train, test) = stratified_split(&docs, 0.2, 42);
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.len(), 20);

        let test_fake = test.iter().filter(|d| d.label.is_fake()).count();
        let train_fake = train.iter().filter(|d| d.label.is_fake()).count();
        assert_eq!(test_fake, 6);
        assert_eq!(train_fake, 24);
    }
}
