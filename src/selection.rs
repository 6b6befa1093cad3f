// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Cross-validated hyperparameter search
//!
//! Stratified k-fold over the Cartesian product of n-gram range ×
//! max_features × C. Every (tuple, fold) unit is independent: it reads the
//! shared immutable corpus and writes one result, so the units run on an
//! explicit fixed-size worker pool with a join barrier before aggregation.
//! No locks, no shared mutable state.
//!
//! A unit that fails (convergence failure) is recorded at −∞ and excluded
//! from its tuple's mean; the search itself never aborts for one bad unit.
//! Cancellation stops dispatch of remaining units and lets in-flight units
//! finish.

use crate::classifier::{fit, LogisticRegression, TrainConfig};
use crate::corpus::{Document, Label};
use crate::error::TrainError;
use crate::features::{SparseVector, VectorizerConfig, Vocabulary};
use crate::model::{Model, ModelMetadata};
use crate::threshold::f1_at_threshold;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

/// One point in the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub ngram_range: (usize, usize),
    pub max_features: usize,
    pub c: f64,
}

/// The grid to search: Cartesian product of the three axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchGrid {
    pub ngram_ranges: Vec<(usize, usize)>,
    pub max_features: Vec<usize>,
    pub c_values: Vec<f64>,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            ngram_ranges: vec![(1, 1), (1, 2), (1, 3)],
            max_features: vec![5_000, 10_000, 20_000, 50_000],
            c_values: vec![0.1, 1.0, 10.0, 100.0],
        }
    }
}

impl SearchGrid {
    pub fn tuples(&self) -> Vec<HyperParams> {
        let mut tuples = Vec::new();
        for &ngram_range in &self.ngram_ranges {
            for &max_features in &self.max_features {
                for &c in &self.c_values {
                    tuples.push(HyperParams { ngram_range, max_features, c });
                }
            }
        }
        tuples
    }
}

/// Validation metric averaged across folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
    F1,
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub folds: usize,
    pub seed: u64,
    pub metric: Metric,
    /// Worker pool size; defaults to available CPU parallelism.
    pub workers: Option<usize>,
    /// Optimizer settings shared by every unit (C comes from the grid).
    pub train: TrainConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            seed: 42,
            metric: Metric::Accuracy,
            workers: None,
            train: TrainConfig::default(),
        }
    }
}

/// Cross-validation result for one hyperparameter tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleScore {
    pub params: HyperParams,
    /// Mean over successful folds; −∞ when every fold failed.
    pub mean_score: f64,
    /// Per-fold scores; failed folds hold −∞.
    pub fold_scores: Vec<f64>,
    pub failed_folds: usize,
}

/// Winning configuration plus the refitted final model and the full score
/// table.
#[derive(Debug)]
pub struct SearchOutcome {
    pub model: Model,
    pub best: HyperParams,
    pub cv_score: f64,
    pub scores: Vec<TupleScore>,
}

/// Cooperative cancellation for a running search: cancelling stops dispatch
/// of remaining units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stratified fold assignment: per class, indices are shuffled
/// deterministically and dealt round-robin, so every fold preserves the
/// corpus class proportions.
pub fn assign_folds(labels: &[Label], folds: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut assignment = vec![0usize; labels.len()];

    for class in [Label::Fake, Label::Real] {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        indices.shuffle(&mut rng);
        for (k, idx) in indices.into_iter().enumerate() {
            assignment[idx] = k % folds;
        }
    }
    assignment
}

/// Run the grid search and refit the winner on the full training set.
pub fn select(
    documents: &[Document],
    grid: &SearchGrid,
    config: &SearchConfig,
    cancel: &CancelToken,
) -> Result<SearchOutcome, TrainError> {
    if documents.is_empty() {
        return Err(TrainError::EmptyTrainingSet);
    }

    let labels: Vec<Label> = documents.iter().map(|d| d.label).collect();
    let folds = assign_folds(&labels, config.folds, config.seed);
    let tuples = grid.tuples();
    if tuples.is_empty() {
        return Err(TrainError::SearchExhausted);
    }

    // One unit per (tuple, fold) pair.
    let units: Vec<(usize, usize)> = (0..tuples.len())
        .flat_map(|t| (0..config.folds).map(move |f| (t, f)))
        .collect();

    let workers = config
        .workers
        .unwrap_or_else(num_cpus::get)
        .clamp(1, units.len().max(1));

    tracing::info!(
        "Grid search: {} tuples × {} folds = {} units on {} workers",
        tuples.len(),
        config.folds,
        units.len(),
        workers
    );

    let next_unit = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, Result<f64, TrainError>)>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next_unit = &next_unit;
            let units = &units;
            let tuples = &tuples;
            let folds = &folds;
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                let i = next_unit.fetch_add(1, Ordering::Relaxed);
                if i >= units.len() {
                    break;
                }
                let (tuple_idx, fold_idx) = units[i];
                let score = run_unit(documents, folds, fold_idx, &tuples[tuple_idx], config);
                // The receiver outlives the scope; a send failure just means
                // the search is being torn down.
                let _ = tx.send((i, score));
            });
        }
    });
    drop(tx);

    let mut results: Vec<Option<Result<f64, TrainError>>> = (0..units.len()).map(|_| None).collect();
    for (i, score) in rx {
        results[i] = Some(score);
    }

    if cancel.is_cancelled() {
        return Err(TrainError::Cancelled);
    }

    // Join barrier passed: aggregate per tuple.
    let mut scores: Vec<TupleScore> = Vec::with_capacity(tuples.len());
    for (tuple_idx, &params) in tuples.iter().enumerate() {
        let mut fold_scores = Vec::with_capacity(config.folds);
        let mut sum = 0.0;
        let mut ok = 0usize;
        let mut failed = 0usize;

        for fold_idx in 0..config.folds {
            match results[tuple_idx * config.folds + fold_idx]
                .as_ref()
                .expect("all units completed after join")
            {
                Ok(score) => {
                    fold_scores.push(*score);
                    sum += score;
                    ok += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Unit failed (ngram={:?} max_features={} C={} fold={}): {}",
                        params.ngram_range,
                        params.max_features,
                        params.c,
                        fold_idx,
                        e
                    );
                    fold_scores.push(f64::NEG_INFINITY);
                    failed += 1;
                }
            }
        }

        let mean_score = if ok > 0 { sum / ok as f64 } else { f64::NEG_INFINITY };
        tracing::info!(
            "ngram={:?} max_features={} C={}: mean score {:.4} ({} folds ok)",
            params.ngram_range,
            params.max_features,
            params.c,
            mean_score,
            ok
        );
        scores.push(TupleScore { params, mean_score, fold_scores, failed_folds: failed });
    }

    // Highest mean wins; exact ties prefer the simpler configuration
    // (smaller max_features, then smaller C).
    let mut best: Option<&TupleScore> = None;
    for candidate in &scores {
        let replace = match best {
            None => true,
            Some(current) => {
                candidate.mean_score > current.mean_score
                    || (candidate.mean_score == current.mean_score
                        && (candidate.params.max_features < current.params.max_features
                            || (candidate.params.max_features == current.params.max_features
                                && candidate.params.c < current.params.c)))
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    let best = best.expect("non-empty grid");
    let best_params = best.params;
    let cv_score = best.mean_score;
    if cv_score == f64::NEG_INFINITY {
        return Err(TrainError::SearchExhausted);
    }

    tracing::info!(
        "Best configuration: ngram={:?} max_features={} C={} (cv score {:.4})",
        best_params.ngram_range,
        best_params.max_features,
        best_params.c,
        cv_score
    );

    let model = refit(documents, &labels, &best_params, cv_score, config)?;
    Ok(SearchOutcome {
        model,
        best: best_params,
        cv_score,
        scores,
    })
}

/// Fit and score one (tuple, fold) unit.
fn run_unit(
    documents: &[Document],
    folds: &[usize],
    fold_idx: usize,
    params: &HyperParams,
    config: &SearchConfig,
) -> Result<f64, TrainError> {
    let train_indices: Vec<usize> = (0..documents.len()).filter(|&i| folds[i] != fold_idx).collect();
    let val_indices: Vec<usize> = (0..documents.len()).filter(|&i| folds[i] == fold_idx).collect();
    if train_indices.is_empty() || val_indices.is_empty() {
        return Err(TrainError::EmptyTrainingSet);
    }

    let vectorizer = VectorizerConfig { ngram_range: params.ngram_range, max_features: params.max_features };
    let vocabulary = Vocabulary::fit(train_indices.iter().map(|&i| documents[i].text.as_str()), vectorizer);

    let rows: Vec<SparseVector> = train_indices.iter().map(|&i| vocabulary.transform(&documents[i].text)).collect();
    let labels: Vec<Label> = train_indices.iter().map(|&i| documents[i].label).collect();

    let train_config = TrainConfig { c: params.c, ..config.train };
    let classifier = LogisticRegression::train(&rows, &labels, vocabulary.len(), &train_config)?;

    let probabilities: Vec<f64> = val_indices
        .iter()
        .map(|&i| classifier.predict_proba(&vocabulary.transform(&documents[i].text)))
        .collect();
    let truth: Vec<bool> = val_indices.iter().map(|&i| documents[i].label.is_fake()).collect();

    let score = match config.metric {
        Metric::Accuracy => {
            let correct = probabilities
                .iter()
                .zip(truth.iter())
                .filter(|(&p, &t)| (p >= 0.5) == t)
                .count();
            correct as f64 / truth.len() as f64
        }
        Metric::F1 => f1_at_threshold(&probabilities, &truth, 0.5),
    };
    Ok(score)
}

/// Refit the winning configuration on the full training set. Partial
/// convergence here is logged, not fatal; only CV units are disqualified
/// for it.
fn refit(
    documents: &[Document],
    labels: &[Label],
    params: &HyperParams,
    cv_score: f64,
    config: &SearchConfig,
) -> Result<Model, TrainError> {
    let vectorizer = VectorizerConfig { ngram_range: params.ngram_range, max_features: params.max_features };
    let vocabulary = Vocabulary::fit(documents.iter().map(|d| d.text.as_str()), vectorizer);
    let rows: Vec<SparseVector> = documents.iter().map(|d| vocabulary.transform(&d.text)).collect();

    let train_config = TrainConfig { c: params.c, ..config.train };
    let outcome = fit(&rows, labels, vocabulary.len(), &train_config)?;
    if !outcome.converged {
        tracing::warn!(
            "Final refit stopped at {} iterations with gradient norm {:.3e}; keeping weights",
            outcome.iterations,
            outcome.grad_norm
        );
    }

    Ok(Model {
        vocabulary,
        classifier: outcome.model,
        metadata: ModelMetadata {
            ngram_range: params.ngram_range,
            max_features: params.max_features,
            c: params.c,
            threshold: None,
            cv_accuracy: cv_score,
            supports_probability: true,
            trained_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_documents(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| {
                let fake = i % 2 == 0;
                Document {
                    text: if fake {
                        format!("breakingnews shocking miracle cure {}", i)
                    } else {
                        format!("official report confirms policy details {}", i)
                    },
                    label: if fake { Label::Fake } else { Label::Real },
                    source: "synthetic".to_string(),
                }
            })
            .collect()
    }

    fn small_grid() -> SearchGrid {
        SearchGrid {
            ngram_ranges: vec![(1, 2)],
            max_features: vec![2_000],
            c_values: vec![1.0, 10.0],
        }
    }

    #[test]
    fn test_assign_folds_preserves_proportions() {
        let labels: Vec<Label> = (0..100)
            .map(|i| if i < 40 { Label::Fake } else { Label::Real })
            .collect();

        let folds = assign_folds(&labels, 5, 42);
        assert_eq!(folds.len(), 100);
        for fold in 0..5 {
            let fake = labels
                .iter()
                .zip(folds.iter())
                .filter(|(l, &f)| f == fold && l.is_fake())
                .count();
            let real = labels
                .iter()
                .zip(folds.iter())
                .filter(|(l, &f)| f == fold && !l.is_fake())
                .count();
            assert_eq!(fake, 8);
            assert_eq!(real, 14);
        }
    }

    #[test]
    fn test_assign_folds_deterministic() {
        let labels: Vec<Label> = (0..50)
            .map(|i| if i % 3 == 0 { Label::Fake } else { Label::Real })
            .collect();
        assert_eq!(assign_folds(&labels, 4, 7), assign_folds(&labels, 4, 7));
    }

    #[test]
    fn test_select_on_separable_corpus() {
        let documents = synthetic_documents(60);
        let config = SearchConfig { folds: 3, workers: Some(2), ..Default::default() };

        let outcome = select(&documents, &small_grid(), &config, &CancelToken::new())
            .expect("search succeeds on separable corpus");

        assert_eq!(outcome.scores.len(), 2);
        assert!(outcome.cv_score > 0.9, "cv score {}", outcome.cv_score);
        assert!(outcome.model.metadata.supports_probability);
        assert_eq!(outcome.model.metadata.max_features, 2_000);

        // The refit model separates held-in examples.
        let p_fake = outcome.model.proba_fake("breakingnews shocking miracle cure 999");
        let p_real = outcome.model.proba_fake("official report confirms policy details 999");
        assert!(p_fake > 0.5);
        assert!(p_real < 0.5);
    }

    #[test]
    fn test_simplicity_tie_break() {
        // Perfectly separable corpus: several configurations reach identical
        // mean scores and the smaller max_features / smaller C must win.
        let documents = synthetic_documents(40);
        let grid = SearchGrid {
            ngram_ranges: vec![(1, 2)],
            max_features: vec![2_000, 4_000],
            c_values: vec![1.0, 10.0],
        };
        let config = SearchConfig { folds: 2, workers: Some(1), ..Default::default() };

        let outcome = select(&documents, &grid, &config, &CancelToken::new()).unwrap();
        let best_mean = outcome
            .scores
            .iter()
            .map(|s| s.mean_score)
            .fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<_> = outcome.scores.iter().filter(|s| s.mean_score == best_mean).collect();
        if tied.len() > 1 {
            let min_features = tied.iter().map(|s| s.params.max_features).min().unwrap();
            assert_eq!(outcome.best.max_features, min_features);
        }
    }

    #[test]
    fn test_failed_units_do_not_abort_search() {
        let documents = synthetic_documents(40);
        // An impossible tolerance with no iteration budget fails every unit.
        let config = SearchConfig {
            folds: 2,
            workers: Some(2),
            train: TrainConfig { tol: 0.0, max_iter: 0, ..Default::default() },
            ..Default::default()
        };

        let err = select(&documents, &small_grid(), &config, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, TrainError::SearchExhausted));
    }

    #[test]
    fn test_cancelled_search_returns_cancelled() {
        let documents = synthetic_documents(40);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = select(&documents, &small_grid(), &SearchConfig::default(), &cancel).unwrap_err();
        assert!(matches!(err, TrainError::Cancelled));
    }
}
