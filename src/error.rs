// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for the detection pipeline
//!
//! Four categories with distinct propagation rules:
//! - [`StartupError`]: fatal, aborts process initialization
//! - [`DataError`]: per-row, logged and dropped with a surfaced count
//! - [`ValidationError`]: per-request, returned to the caller
//! - [`TrainError`]: scoped to one training unit or the overall search

use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions at process or pipeline startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("model artifact not found at {path}")]
    ArtifactMissing { path: PathBuf },

    #[error("failed to read model artifact {path}: {source}")]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {path} is corrupt: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("corpus file not found at {path}")]
    CorpusMissing { path: PathBuf },

    #[error("failed to read corpus file {path}: {source}")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a corpus row is dropped during loading.
///
/// Never propagated: each occurrence is counted in
/// [`DropStats`](crate::corpus::DropStats) and logged once per load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("label {0:?} cannot be mapped to FAKE/REAL")]
    UnmappableLabel(String),

    #[error("text field missing or empty after normalization")]
    EmptyText,

    #[error("duplicate (text, label) pair")]
    Duplicate,
}

/// Per-request rejection of unusable input. Non-fatal by contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text is empty after normalization")]
pub struct ValidationError;

/// Failures inside model training and hyperparameter search.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("optimizer did not converge within {iterations} iterations (gradient norm {grad_norm:.3e})")]
    ConvergenceFailure { iterations: usize, grad_norm: f64 },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("no hyperparameter configuration produced a usable model")]
    SearchExhausted,

    #[error("hyperparameter search was cancelled")]
    Cancelled,
}
