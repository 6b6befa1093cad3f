// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! End-to-end pipeline test: corpus → grid search → artifact → inference.

use fakenews_detector::corpus::{build_corpus, stratified_split, Document, DropStats, Label};
use fakenews_detector::inference::InferenceService;
use fakenews_detector::model::ModelStore;
use fakenews_detector::selection::{select, CancelToken, SearchConfig, SearchGrid};
use fakenews_detector::threshold::{f1_at_threshold, select_threshold};
use fakenews_detector::ValidationError;

/// A corpus where the token "breakingnews" perfectly marks the FAKE class.
fn separable_corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let fake = i % 2 == 0;
            Document {
                text: if fake {
                    format!("breakingnews shocking revelation number {} spreads online", i)
                } else {
                    format!("city council publishes budget figures for year {}", i)
                },
                label: if fake { Label::Fake } else { Label::Real },
                source: if i % 4 < 2 { "ISOT_FAKE".to_string() } else { "LIAR".to_string() },
            }
        })
        .collect()
}

#[test]
fn train_persist_and_predict() {
    let corpus = build_corpus(separable_corpus(80), DropStats::default(), 42);
    let (train, test) = stratified_split(&corpus.documents, 0.2, 42);

    let grid = SearchGrid {
        ngram_ranges: vec![(1, 2)],
        max_features: vec![5_000],
        c_values: vec![1.0, 10.0],
    };
    let config = SearchConfig { folds: 3, workers: Some(2), ..Default::default() };

    let outcome = select(&train, &grid, &config, &CancelToken::new()).expect("search succeeds");
    let mut model = outcome.model;
    assert!(outcome.cv_score > 0.9, "cv score {}", outcome.cv_score);

    // Tune the operating threshold on the held-out split and verify it
    // does at least as well as the 0.5 default on that split.
    let probabilities: Vec<f64> = test.iter().map(|d| model.proba_fake(&d.text)).collect();
    let truth: Vec<bool> = test.iter().map(|d| d.label.is_fake()).collect();
    let selection = select_threshold(&probabilities, &truth);
    assert!(selection.threshold > 0.0 && selection.threshold <= 1.0);
    assert!(selection.f1 >= f1_at_threshold(&probabilities, &truth, 0.5) - 1e-12);
    model.metadata.threshold = Some(selection.threshold);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fakenews_model.bin");
    ModelStore::save(&model, &path).unwrap();

    // Serving loads the artifact once; the tuned threshold survives the
    // round trip.
    let service = InferenceService::load(&path).unwrap();
    assert!((service.model().decision_threshold() - selection.threshold).abs() < 1e-12);

    // Held-out texts classify correctly at the default operating point.
    let mut untuned = service.model().clone();
    untuned.metadata.threshold = None;
    let untuned = InferenceService::new(untuned);

    let fake = untuned
        .predict("breakingnews shocking revelation number 9999 spreads online")
        .unwrap();
    assert_eq!(fake.label, Label::Fake);
    assert!(fake.confidence.unwrap() >= 0.5);

    let real = untuned
        .predict("city council publishes budget figures for year 9999")
        .unwrap();
    assert_eq!(real.label, Label::Real);
    assert!(real.confidence.unwrap() >= 0.5);
}

#[test]
fn empty_input_fails_with_validation_error_not_panic() {
    let corpus = build_corpus(separable_corpus(40), DropStats::default(), 42);

    let grid = SearchGrid {
        ngram_ranges: vec![(1, 1)],
        max_features: vec![1_000],
        c_values: vec![1.0],
    };
    let config = SearchConfig { folds: 2, workers: Some(1), ..Default::default() };
    let outcome = select(&corpus.documents, &grid, &config, &CancelToken::new()).unwrap();

    let service = InferenceService::new(outcome.model);
    assert_eq!(service.predict("").unwrap_err(), ValidationError);
    assert_eq!(service.predict("   \t\n").unwrap_err(), ValidationError);
}
