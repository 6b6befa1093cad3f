// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Online inference over a persisted model
//!
//! The service owns one immutable [`Model`] loaded at startup; every
//! `predict` call is a pure read, so concurrent callers share the service
//! by reference with no synchronization. A missing or corrupt artifact is
//! fatal at construction; an empty input is a per-request
//! [`ValidationError`], returned to the caller and never a panic.

use crate::corpus::Label;
use crate::error::{StartupError, ValidationError};
use crate::model::{Model, ModelStore};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label plus the probability of the predicted class, rounded to 4 decimal
/// digits. `confidence` is `None` only when the model cannot produce
/// probabilities (decided by the artifact's capability flag, serialized as
/// `"N/A"` at the API boundary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: Option<f64>,
}

/// Stateless prediction service over a read-only model.
pub struct InferenceService {
    model: Model,
}

impl InferenceService {
    /// Load the artifact once; serving cannot start without it.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let model = ModelStore::load(path)?;
        tracing::info!(
            "Model loaded: ngram={:?} max_features={} C={} threshold={:.3} (trained {})",
            model.metadata.ngram_range,
            model.metadata.max_features,
            model.metadata.c,
            model.decision_threshold(),
            model.metadata.trained_at
        );
        Ok(Self { model })
    }

    /// Wrap an already-loaded model (tests, embedded use).
    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Classify one text against the model's stored decision threshold.
    pub fn predict(&self, text: &str) -> Result<Prediction, ValidationError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(ValidationError);
        }

        let proba_fake = self.model.proba_fake(&normalized);
        let label = if proba_fake >= self.model.decision_threshold() {
            Label::Fake
        } else {
            Label::Real
        };

        let confidence = if self.model.metadata.supports_probability {
            let of_predicted = if label.is_fake() { proba_fake } else { 1.0 - proba_fake };
            Some(round4(of_predicted))
        } else {
            None
        };

        Ok(Prediction { label, confidence })
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LogisticRegression, TrainConfig};
    use crate::corpus::Document;
    use crate::features::{VectorizerConfig, Vocabulary};
    use crate::model::ModelMetadata;

    fn trained_service(threshold: Option<f64>) -> InferenceService {
        let documents: Vec<Document> = (0..30)
            .map(|i| {
                let fake = i % 2 == 0;
                Document {
                    text: if fake {
                        format!("breakingnews miracle exposed {}", i)
                    } else {
                        format!("committee published annual figures {}", i)
                    },
                    label: if fake { Label::Fake } else { Label::Real },
                    source: "synthetic".to_string(),
                }
            })
            .collect();

        let config = VectorizerConfig { ngram_range: (1, 2), max_features: 5_000 };
        let vocabulary = Vocabulary::fit(documents.iter().map(|d| d.text.as_str()), config);
        let rows: Vec<_> = documents.iter().map(|d| vocabulary.transform(&d.text)).collect();
        let labels: Vec<Label> = documents.iter().map(|d| d.label).collect();
        let classifier =
            LogisticRegression::train(&rows, &labels, vocabulary.len(), &TrainConfig::default()).unwrap();

        InferenceService::new(Model {
            vocabulary,
            classifier,
            metadata: ModelMetadata {
                ngram_range: config.ngram_range,
                max_features: config.max_features,
                c: 1.0,
                threshold,
                cv_accuracy: 1.0,
                supports_probability: true,
                trained_at: chrono::Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    #[test]
    fn test_predict_labels_and_confidence() {
        let service = trained_service(None);

        let fake = service.predict("BREAKINGNEWS miracle exposed!").unwrap();
        assert_eq!(fake.label, Label::Fake);
        let conf = fake.confidence.unwrap();
        assert!(conf >= 0.5 && conf <= 1.0);

        let real = service.predict("committee published annual figures").unwrap();
        assert_eq!(real.label, Label::Real);
        assert!(real.confidence.unwrap() >= 0.5);
    }

    #[test]
    fn test_empty_input_is_validation_error() {
        let service = trained_service(None);
        assert_eq!(service.predict("").unwrap_err(), ValidationError);
        // Non-empty input that normalizes to nothing fails the same way.
        assert_eq!(service.predict("!!! ??? ...").unwrap_err(), ValidationError);
        assert_eq!(service.predict("http://only-a-url.net").unwrap_err(), ValidationError);
    }

    #[test]
    fn test_confidence_is_rounded_to_four_decimals() {
        let service = trained_service(None);
        let prediction = service.predict("breakingnews miracle exposed").unwrap();
        let conf = prediction.confidence.unwrap();
        assert!((conf * 10_000.0 - (conf * 10_000.0).round()).abs() < 1e-9);
    }

    #[test]
    fn test_stored_threshold_is_honored() {
        // With an extreme stored threshold everything is REAL.
        let service = trained_service(Some(0.999_999));
        let prediction = service.predict("breakingnews miracle exposed").unwrap();
        assert_eq!(prediction.label, Label::Real);
    }

    #[test]
    fn test_no_probability_capability_yields_none() {
        let mut service = trained_service(None);
        service.model.metadata.supports_probability = false;
        let prediction = service.predict("breakingnews miracle exposed").unwrap();
        assert_eq!(prediction.label, Label::Fake);
        assert!(prediction.confidence.is_none());
    }

    #[test]
    fn test_unseen_vocabulary_still_predicts() {
        let service = trained_service(None);
        // Almost everything here is out-of-vocabulary; scoring must not fail.
        let prediction = service.predict("zzzz qqqq").unwrap();
        assert!(prediction.confidence.unwrap() >= 0.0);
    }
}
