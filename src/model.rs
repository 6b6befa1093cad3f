// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Persistent model artifact
//!
//! One immutable unit: frozen vocabulary, classifier weights, and training
//! metadata. Created once at the end of training, persisted with bincode,
//! and loaded read-only for the lifetime of the serving process. Replacing
//! a model means re-training and swapping the artifact file.

use crate::classifier::LogisticRegression;
use crate::error::StartupError;
use crate::features::Vocabulary;
use crate::normalize::normalize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Training provenance and serving configuration carried by the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub ngram_range: (usize, usize),
    pub max_features: usize,
    pub c: f64,
    /// Tuned decision threshold; `None` means the 0.5 default.
    pub threshold: Option<f64>,
    /// Mean cross-validation accuracy of the winning configuration.
    pub cv_accuracy: f64,
    /// Whether the classifier can produce calibrated probabilities.
    /// Decided at training time, never probed at inference time.
    pub supports_probability: bool,
    pub trained_at: DateTime<Utc>,
    pub version: String,
}

/// Immutable trained model: vocabulary + linear classifier + metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub vocabulary: Vocabulary,
    pub classifier: LogisticRegression,
    pub metadata: ModelMetadata,
}

impl Model {
    /// Probability of FAKE for a raw text. Normalization is idempotent, so
    /// already-normalized corpus text passes through unchanged.
    pub fn proba_fake(&self, text: &str) -> f64 {
        let vector = self.vocabulary.transform(&normalize(text));
        self.classifier.predict_proba(&vector)
    }

    /// The operating threshold: tuned value if recorded, 0.5 otherwise.
    pub fn decision_threshold(&self) -> f64 {
        self.metadata.threshold.unwrap_or(0.5)
    }
}

/// Load/save boundary for the model artifact. Serving depends on this
/// interface only; nothing here depends back on serving.
pub struct ModelStore;

impl ModelStore {
    /// Persist the artifact atomically (temp file + rename).
    pub fn save(model: &Model, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = bincode::serialize(model)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        tracing::info!("Model artifact saved to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load the artifact as a single self-contained unit. Absence or
    /// corruption is a fatal startup condition for serving.
    pub fn load(path: &Path) -> Result<Model, StartupError> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StartupError::ArtifactMissing { path: path.to_path_buf() }
            } else {
                StartupError::ArtifactUnreadable { path: path.to_path_buf(), source: e }
            }
        })?;
        bincode::deserialize(&bytes).map_err(|e| StartupError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::VectorizerConfig;

    pub(crate) fn tiny_model() -> Model {
        let texts = ["breakingnews shocking claim", "routine policy report"];
        let config = VectorizerConfig { ngram_range: (1, 2), max_features: 500 };
        let vocabulary = Vocabulary::fit(texts, config);
        let dim = vocabulary.len();
        Model {
            vocabulary,
            classifier: LogisticRegression { weights: vec![0.1; dim], intercept: -0.05 },
            metadata: ModelMetadata {
                ngram_range: config.ngram_range,
                max_features: config.max_features,
                c: 1.0,
                threshold: Some(0.6),
                cv_accuracy: 0.9,
                supports_probability: true,
                trained_at: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let model = tiny_model();
        ModelStore::save(&model, &path).unwrap();
        let loaded = ModelStore::load(&path).unwrap();

        assert_eq!(loaded.classifier.weights, model.classifier.weights);
        assert_eq!(loaded.classifier.intercept, model.classifier.intercept);
        assert_eq!(loaded.metadata.threshold, Some(0.6));
        assert_eq!(loaded.vocabulary.len(), model.vocabulary.len());

        let text = "breakingnews shocking claim";
        assert!((loaded.proba_fake(text) - model.proba_fake(text)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_artifact_is_fatal_startup_error() {
        let err = ModelStore::load(Path::new("/nonexistent/model.bin")).unwrap_err();
        assert!(matches!(err, StartupError::ArtifactMissing { .. }));
    }

    #[test]
    fn test_corrupt_artifact_is_fatal_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"not a model artifact").unwrap();

        let err = ModelStore::load(&path).unwrap_err();
        assert!(matches!(err, StartupError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn test_decision_threshold_defaults_to_half() {
        let mut model = tiny_model();
        assert!((model.decision_threshold() - 0.6).abs() < 1e-12);
        model.metadata.threshold = None;
        assert!((model.decision_threshold() - 0.5).abs() < 1e-12);
    }
}
