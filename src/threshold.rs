// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Operating-threshold selection and calibration reporting
//!
//! The threshold sweep walks every distinct predicted probability in
//! descending order as a candidate cutoff (prediction rule: FAKE when
//! `p >= threshold`) and keeps the first F1 maximum. Calibration quality is
//! reported as the Brier score plus a 10-bin reliability table.

use serde::{Deserialize, Serialize};

const F1_EPSILON: f64 = 1e-12;

/// Chosen operating point for the FAKE class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
}

/// One row of the 10-bin calibration table. An empty bin has count 0 and no
/// defined mean or rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
    pub mean_pred: Option<f64>,
    pub true_rate: Option<f64>,
}

impl CalibrationBin {
    /// Bin interval in the report notation: right-closed, leftmost bin
    /// closed on both ends.
    pub fn range_label(&self) -> String {
        if self.lo == 0.0 {
            format!("[{:.1}, {:.1}]", self.lo, self.hi)
        } else {
            format!("({:.1}, {:.1}]", self.lo, self.hi)
        }
    }
}

/// Pick the threshold maximizing F1 for the positive (FAKE) class.
///
/// Ties keep the first (largest) threshold encountered. Labels are
/// `true` = FAKE. Returns the 0.5 default when `probabilities` is empty.
pub fn select_threshold(probabilities: &[f64], labels: &[bool]) -> ThresholdSelection {
    debug_assert_eq!(probabilities.len(), labels.len());
    let n_pos = labels.iter().filter(|&&l| l).count();
    if probabilities.is_empty() {
        return ThresholdSelection { threshold: 0.5, f1: 0.0, precision: 0.0, recall: 0.0 };
    }

    let mut pairs: Vec<(f64, bool)> = probabilities.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut best = ThresholdSelection { threshold: 0.5, f1: f64::NEG_INFINITY, precision: 0.0, recall: 0.0 };
    let mut tp = 0usize;
    let mut fp = 0usize;

    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        // Everything tied at this probability is predicted FAKE together
        // (inclusive >= rule).
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }

        let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let recall = if n_pos > 0 { tp as f64 / n_pos as f64 } else { 0.0 };
        let f1 = 2.0 * precision * recall / (precision + recall + F1_EPSILON);

        if f1 > best.f1 {
            best = ThresholdSelection { threshold, f1, precision, recall };
        }
    }
    best
}

/// F1 for the FAKE class at a fixed threshold (inclusive >= rule).
pub fn f1_at_threshold(probabilities: &[f64], labels: &[bool], threshold: f64) -> f64 {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&p, &label) in probabilities.iter().zip(labels.iter()) {
        let predicted_fake = p >= threshold;
        match (predicted_fake, label) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    2.0 * precision * recall / (precision + recall + F1_EPSILON)
}

/// Mean squared error between predicted probability and binary truth.
/// Always in `[0, 1]`; 0 is perfect. Empty input scores 0.
pub fn brier_score(probabilities: &[f64], labels: &[bool]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    let sum: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(&p, &label)| {
            let target = if label { 1.0 } else { 0.0 };
            (p - target) * (p - target)
        })
        .sum();
    sum / probabilities.len() as f64
}

/// Partition probabilities into 10 equal-width bins over `[0, 1]`
/// (right-closed; the leftmost bin is closed on both ends) and report
/// count, mean prediction and empirical FAKE rate per bin.
pub fn calibration_bins(probabilities: &[f64], labels: &[bool]) -> Vec<CalibrationBin> {
    let mut counts = [0usize; 10];
    let mut pred_sums = [0.0f64; 10];
    let mut pos_counts = [0usize; 10];

    for (&p, &label) in probabilities.iter().zip(labels.iter()) {
        let bin = bin_index(p);
        counts[bin] += 1;
        pred_sums[bin] += p;
        if label {
            pos_counts[bin] += 1;
        }
    }

    (0..10)
        .map(|i| {
            let count = counts[i];
            CalibrationBin {
                lo: i as f64 / 10.0,
                hi: (i + 1) as f64 / 10.0,
                count,
                mean_pred: (count > 0).then(|| pred_sums[i] / count as f64),
                true_rate: (count > 0).then(|| pos_counts[i] as f64 / count as f64),
            }
        })
        .collect()
}

fn bin_index(p: f64) -> usize {
    // (0.0, 0.1] -> 0 together with exact 0.0; (0.9, 1.0] -> 9.
    if p <= 0.1 {
        0
    } else {
        (((p * 10.0).ceil() as usize).saturating_sub(1)).min(9)
    }
}
