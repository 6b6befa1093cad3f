// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Fake-news detection pipeline
//!
//! This crate provides:
//! - Deterministic text normalization and char-n-gram TF-IDF features
//! - L2-regularized logistic regression with cross-validated grid search
//! - Operating-threshold selection and calibration reporting
//! - Evaluation with per-source breakdowns and misclassification analysis
//! - A persisted model artifact and a stateless inference service
//!
//! Binaries: `train-model` (corpus → artifact), `analyze-errors`
//! (artifact + corpus → report and CSV export), `predict` (one-shot
//! classification).

pub mod classifier;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod selection;
pub mod threshold;

pub use classifier::{LogisticRegression, TrainConfig};
pub use corpus::{Corpus, Document, DropStats, Label};
pub use error::{DataError, StartupError, TrainError, ValidationError};
pub use evaluate::{evaluate, ClassificationReport, ConfusionMatrix, EvaluationReport};
pub use features::{SparseVector, VectorizerConfig, Vocabulary};
pub use inference::{InferenceService, Prediction};
pub use model::{Model, ModelMetadata, ModelStore};
pub use normalize::normalize;
pub use selection::{select, CancelToken, HyperParams, SearchConfig, SearchGrid, SearchOutcome};
pub use threshold::{brier_score, calibration_bins, select_threshold, ThresholdSelection};
