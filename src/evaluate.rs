// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation harness: confusion matrices, classification reports, ROC/AUC,
//! per-source breakdowns and ranked misclassification analysis
//!
//! FAKE is the positive class everywhere. "Model confidence" of a prediction
//! is the probability of the *predicted* class: `p` when FAKE was predicted,
//! `1 - p` when REAL was.

use crate::corpus::{Document, Label};
use crate::model::Model;
use crate::threshold::{brier_score, calibration_bins, CalibrationBin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Display length for misclassified-text snippets.
const SNIPPET_LEN: usize = 160;

/// 2×2 confusion matrix; rows = true class, columns = predicted class.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True FAKE predicted FAKE.
    pub tp: usize,
    /// True REAL predicted REAL.
    pub tn: usize,
    /// True REAL predicted FAKE.
    pub fp: usize,
    /// True FAKE predicted REAL.
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[Label], truth: &[Label]) -> Self {
        debug_assert_eq!(predictions.len(), truth.len());
        let mut matrix = Self::default();
        for (pred, actual) in predictions.iter().zip(truth.iter()) {
            match (pred, actual) {
                (Label::Fake, Label::Fake) => matrix.tp += 1,
                (Label::Real, Label::Real) => matrix.tn += 1,
                (Label::Fake, Label::Real) => matrix.fp += 1,
                (Label::Real, Label::Fake) => matrix.fn_ += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.tp + self.tn) as f64 / total as f64
    }
}

/// Precision/recall/F1/support for one class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn class_metrics(tp: usize, fp: usize, fn_: usize) -> ClassMetrics {
    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics { precision, recall, f1, support: tp + fn_ }
}

/// Per-class classification report with overall accuracy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub fake: ClassMetrics,
    pub real: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: ConfusionMatrix) -> Self {
        Self {
            accuracy: cm.accuracy(),
            // REAL metrics come from the matrix with the class roles swapped.
            fake: class_metrics(cm.tp, cm.fp, cm.fn_),
            real: class_metrics(cm.tn, cm.fn_, cm.fp),
            confusion: cm,
        }
    }

    pub fn format(&self) -> String {
        format!(
            r#"Accuracy: {:.4}

Confusion Matrix:
                 Predicted
                 FAKE    REAL
Actual FAKE    {:>6}  {:>6}
       REAL    {:>6}  {:>6}

Per-class metrics:
  FAKE: P={:.4} R={:.4} F1={:.4} (n={})
  REAL: P={:.4} R={:.4} F1={:.4} (n={})
"#,
            self.accuracy,
            self.confusion.tp,
            self.confusion.fn_,
            self.confusion.fp,
            self.confusion.tn,
            self.fake.precision,
            self.fake.recall,
            self.fake.f1,
            self.fake.support,
            self.real.precision,
            self.real.recall,
            self.real.f1,
            self.real.support,
        )
    }
}

/// One ROC operating point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC curve points (descending threshold) and trapezoidal AUC.
///
/// Degenerate single-class inputs return an empty curve with the 0.5
/// random-baseline AUC.
pub fn roc_curve(probabilities: &[f64], labels: &[bool]) -> (Vec<RocPoint>, f64) {
    let n_pos = labels.iter().filter(|&&l| l).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return (Vec::new(), 0.5);
    }

    let mut pairs: Vec<(f64, bool)> = probabilities.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut points = Vec::new();
    let mut auc = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut prev_tpr = 0.0;
    let mut prev_fpr = 0.0;

    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        // Tied scores move together; one operating point per distinct
        // threshold keeps the trapezoid honest.
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let tpr = tp / n_pos;
        let fpr = fp / n_neg;
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        points.push(RocPoint { fpr, tpr });
        prev_tpr = tpr;
        prev_fpr = fpr;
    }

    (points, auc)
}

/// A document the model got wrong, with the evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Misclassification {
    pub text: String,
    pub label: Label,
    pub source: String,
    pub pred: Label,
    pub proba_fake: f64,
    pub model_conf: f64,
}

/// Breakdown for one corpus source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub report: ClassificationReport,
}

/// Everything one evaluation run produces. Built fresh per run, exported,
/// never persisted as a first-class entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub n_documents: usize,
    pub report: ClassificationReport,
    pub brier: f64,
    pub auc: f64,
    pub roc: Vec<RocPoint>,
    pub calibration: Vec<CalibrationBin>,
    pub per_source: Vec<SourceBreakdown>,
    /// All misclassified documents, sorted by model confidence descending.
    pub misclassified: Vec<Misclassification>,
}

impl EvaluationReport {
    /// Top misclassifications where true FAKE was predicted REAL.
    pub fn top_false_negatives(&self, k: usize) -> Vec<&Misclassification> {
        self.misclassified
            .iter()
            .filter(|m| m.label == Label::Fake && m.pred == Label::Real)
            .take(k)
            .collect()
    }

    /// Top misclassifications where true REAL was predicted FAKE.
    pub fn top_false_positives(&self, k: usize) -> Vec<&Misclassification> {
        self.misclassified
            .iter()
            .filter(|m| m.label == Label::Real && m.pred == Label::Fake)
            .take(k)
            .collect()
    }

    /// Human-readable report in the console format the analysis binary
    /// prints.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Evaluation Report (threshold={:.3}, n={})\n",
            self.threshold, self.n_documents
        ));
        out.push_str("=========================================\n\n");
        out.push_str(&self.report.format());
        out.push_str(&format!("\nBrier score: {:.4}\n", self.brier));
        out.push_str(&format!("AUC-ROC:     {:.4}\n", self.auc));

        out.push_str("\nCalibration by probability bin (FAKE):\n");
        out.push_str("  bin_range    count  mean_pred  true_rate\n");
        for bin in &self.calibration {
            let mean = bin.mean_pred.map_or("-".to_string(), |v| format!("{:.4}", v));
            let rate = bin.true_rate.map_or("-".to_string(), |v| format!("{:.4}", v));
            out.push_str(&format!(
                "  {:<11} {:>6}  {:>9}  {:>9}\n",
                bin.range_label(),
                bin.count,
                mean,
                rate
            ));
        }

        for breakdown in &self.per_source {
            out.push_str(&format!(
                "\nSource: {} (n={})\n",
                breakdown.source,
                breakdown.report.confusion.total()
            ));
            out.push_str(&breakdown.report.format());
        }

        out.push_str(&format!("\nMisclassified documents: {}\n", self.misclassified.len()));
        out.push_str("\nTop 5 FALSE NEGATIVES (true FAKE predicted REAL):\n");
        for m in self.top_false_negatives(5) {
            out.push_str(&format!(
                "— src={} | proba_fake={:.3} | conf={:.3}\n  {}\n",
                m.source,
                m.proba_fake,
                m.model_conf,
                snippet(&m.text, SNIPPET_LEN)
            ));
        }
        out.push_str("\nTop 5 FALSE POSITIVES (true REAL predicted FAKE):\n");
        for m in self.top_false_positives(5) {
            out.push_str(&format!(
                "— src={} | proba_fake={:.3} | conf={:.3}\n  {}\n",
                m.source,
                m.proba_fake,
                m.model_conf,
                snippet(&m.text, SNIPPET_LEN)
            ));
        }
        out
    }
}

/// Score `documents` with `model` and build the full report.
///
/// `threshold` overrides the model's stored operating point when given.
pub fn evaluate(model: &Model, documents: &[Document], threshold: Option<f64>) -> EvaluationReport {
    let threshold = threshold.unwrap_or_else(|| model.decision_threshold());

    let probabilities: Vec<f64> = documents.iter().map(|d| model.proba_fake(&d.text)).collect();
    let predictions: Vec<Label> = probabilities
        .iter()
        .map(|&p| if p >= threshold { Label::Fake } else { Label::Real })
        .collect();
    let truth: Vec<Label> = documents.iter().map(|d| d.label).collect();
    let truth_flags: Vec<bool> = truth.iter().map(|l| l.is_fake()).collect();

    let report = ClassificationReport::from_confusion(ConfusionMatrix::from_predictions(&predictions, &truth));
    let (roc, auc) = roc_curve(&probabilities, &truth_flags);

    // Per-source slices, sorted by source name for a stable report.
    let mut by_source: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, doc) in documents.iter().enumerate() {
        by_source.entry(doc.source.as_str()).or_default().push(i);
    }
    let per_source = by_source
        .into_iter()
        .map(|(source, indices)| {
            let preds: Vec<Label> = indices.iter().map(|&i| predictions[i]).collect();
            let actual: Vec<Label> = indices.iter().map(|&i| truth[i]).collect();
            SourceBreakdown {
                source: source.to_string(),
                report: ClassificationReport::from_confusion(ConfusionMatrix::from_predictions(&preds, &actual)),
            }
        })
        .collect();

    let mut misclassified: Vec<Misclassification> = documents
        .iter()
        .enumerate()
        .filter(|(i, d)| predictions[*i] != d.label)
        .map(|(i, d)| {
            let proba_fake = probabilities[i];
            let model_conf = if predictions[i] == Label::Fake { proba_fake } else { 1.0 - proba_fake };
            Misclassification {
                text: d.text.clone(),
                label: d.label,
                source: d.source.clone(),
                pred: predictions[i],
                proba_fake,
                model_conf,
            }
        })
        .collect();
    misclassified.sort_by(|a, b| {
        b.model_conf
            .partial_cmp(&a.model_conf)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    EvaluationReport {
        threshold,
        n_documents: documents.len(),
        report,
        brier: brier_score(&probabilities, &truth_flags),
        auc,
        roc,
        calibration: calibration_bins(&probabilities, &truth_flags),
        per_source,
        misclassified,
    }
}

/// Export the ranked misclassification list as CSV:
/// `text,label,source,pred,proba_fake,model_conf`, confidence descending.
pub fn export_misclassified_csv(report: &EvaluationReport, path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["text", "label", "source", "pred", "proba_fake", "model_conf"])?;
    for m in &report.misclassified {
        writer.write_record([
            m.text.as_str(),
            m.label.as_str(),
            m.source.as_str(),
            m.pred.as_str(),
            &format!("{:.6}", m.proba_fake),
            &format!("{:.6}", m.model_conf),
        ])?;
    }
    writer.flush()?;
    tracing::info!("Misclassification export written to {}", path.display());
    Ok(())
}

/// Single-line display snippet, truncated to `max_chars`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() <= max_chars {
        joined
    } else {
        let truncated: String = joined.chars().take(max_chars).collect();
        format!("{}…", truncated)
    }
}
