// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! L2-regularized binary logistic regression
//!
//! Minimizes the mean negative log-likelihood plus `1/(2·C·n)·‖w‖²` (the
//! intercept is unregularized) with L-BFGS and a backtracking line search.
//! Fully deterministic: no randomness anywhere in the optimizer, so repeated
//! runs on the same data produce identical weights.

use crate::corpus::Label;
use crate::error::TrainError;
use crate::features::SparseVector;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Optimizer settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Inverse regularization strength; larger C = weaker regularization.
    pub c: f64,
    /// Convergence tolerance on the gradient infinity norm.
    pub tol: f64,
    /// Iteration budget.
    pub max_iter: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { c: 1.0, tol: 1e-4, max_iter: 1000 }
    }
}

/// Trained linear model: probability of FAKE = sigmoid(w·x + b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// Result of an optimization run, converged or not.
#[derive(Debug)]
pub struct FitOutcome {
    pub model: LogisticRegression,
    pub converged: bool,
    pub iterations: usize,
    pub grad_norm: f64,
}

impl LogisticRegression {
    /// Train to convergence. A run that exhausts the iteration budget above
    /// tolerance is an error; use [`fit`] when partial convergence is
    /// acceptable.
    pub fn train(
        rows: &[SparseVector],
        labels: &[Label],
        dim: usize,
        config: &TrainConfig,
    ) -> Result<Self, TrainError> {
        let outcome = fit(rows, labels, dim, config)?;
        if outcome.converged {
            Ok(outcome.model)
        } else {
            Err(TrainError::ConvergenceFailure {
                iterations: outcome.iterations,
                grad_norm: outcome.grad_norm,
            })
        }
    }

    pub fn decision(&self, x: &SparseVector) -> f64 {
        let mut score = self.intercept;
        for &(index, value) in x {
            score += self.weights[index as usize] * value;
        }
        score
    }

    pub fn predict_proba(&self, x: &SparseVector) -> f64 {
        sigmoid(self.decision(x))
    }
}

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

const LBFGS_MEMORY: usize = 10;

/// Run the optimizer and report the outcome even when the budget runs out.
pub fn fit(
    rows: &[SparseVector],
    labels: &[Label],
    dim: usize,
    config: &TrainConfig,
) -> Result<FitOutcome, TrainError> {
    if rows.is_empty() {
        return Err(TrainError::EmptyTrainingSet);
    }
    debug_assert_eq!(rows.len(), labels.len());

    let n = rows.len() as f64;
    let lambda = 1.0 / (config.c * n);
    let targets: Vec<f64> = labels.iter().map(|l| if l.is_fake() { 1.0 } else { 0.0 }).collect();

    // Parameter vector: weights followed by the intercept at index `dim`.
    let mut theta = vec![0.0; dim + 1];
    let loss_grad = |theta: &[f64]| -> (f64, Vec<f64>) {
        let mut loss = 0.0;
        let mut grad = vec![0.0; dim + 1];
        for (row, &target) in rows.iter().zip(targets.iter()) {
            let mut z = theta[dim];
            for &(index, value) in row {
                z += theta[index as usize] * value;
            }
            // ln(1 + e^-m) with m = z for target 1 and -z for target 0,
            // computed in the stable branch.
            let m = if target > 0.5 { z } else { -z };
            loss += if m >= 0.0 { (-m).exp().ln_1p() } else { -m + m.exp().ln_1p() };

            let residual = sigmoid(z) - target;
            for &(index, value) in row {
                grad[index as usize] += residual * value;
            }
            grad[dim] += residual;
        }
        loss /= n;
        for g in grad.iter_mut() {
            *g /= n;
        }
        for i in 0..dim {
            loss += 0.5 * lambda * theta[i] * theta[i];
            grad[i] += lambda * theta[i];
        }
        (loss, grad)
    };

    let (mut f, mut g) = loss_grad(&theta);
    let mut s_hist: VecDeque<Vec<f64>> = VecDeque::new();
    let mut y_hist: VecDeque<Vec<f64>> = VecDeque::new();
    let mut rho_hist: VecDeque<f64> = VecDeque::new();

    let mut iterations = 0;
    let mut converged = inf_norm(&g) <= config.tol;

    while !converged && iterations < config.max_iter {
        iterations += 1;

        let mut direction = two_loop(&g, &s_hist, &y_hist, &rho_hist);
        let mut dg = dot(&direction, &g);
        if dg >= 0.0 {
            // Curvature information went stale; restart from steepest descent.
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            direction = g.iter().map(|v| -v).collect();
            dg = -dot(&g, &g);
        }

        // Backtracking Armijo line search.
        let mut step = if s_hist.is_empty() { 1.0 / inf_norm(&g).max(1.0) } else { 1.0 };
        let mut accepted = false;
        while step > 1e-12 {
            let candidate: Vec<f64> = theta
                .iter()
                .zip(direction.iter())
                .map(|(t, d)| t + step * d)
                .collect();
            let (f_new, g_new) = loss_grad(&candidate);
            if f_new <= f + 1e-4 * step * dg {
                let s: Vec<f64> = candidate.iter().zip(theta.iter()).map(|(a, b)| a - b).collect();
                let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
                let sy = dot(&s, &y);
                if sy > 1e-10 {
                    if s_hist.len() == LBFGS_MEMORY {
                        s_hist.pop_front();
                        y_hist.pop_front();
                        rho_hist.pop_front();
                    }
                    rho_hist.push_back(1.0 / sy);
                    s_hist.push_back(s);
                    y_hist.push_back(y);
                }
                theta = candidate;
                f = f_new;
                g = g_new;
                accepted = true;
                break;
            }
            step *= 0.5;
        }

        if !accepted {
            // Line search collapsed; no further progress is possible.
            break;
        }
        converged = inf_norm(&g) <= config.tol;
    }

    let grad_norm = inf_norm(&g);
    let intercept = theta[dim];
    theta.truncate(dim);

    Ok(FitOutcome {
        model: LogisticRegression { weights: theta, intercept },
        converged,
        iterations,
        grad_norm,
    })
}

fn two_loop(
    g: &[f64],
    s_hist: &VecDeque<Vec<f64>>,
    y_hist: &VecDeque<Vec<f64>>,
    rho_hist: &VecDeque<f64>,
) -> Vec<f64> {
    let mut q: Vec<f64> = g.to_vec();
    let mut alphas = vec![0.0; s_hist.len()];

    for i in (0..s_hist.len()).rev() {
        let alpha = rho_hist[i] * dot(&s_hist[i], &q);
        alphas[i] = alpha;
        for (qv, yv) in q.iter_mut().zip(y_hist[i].iter()) {
            *qv -= alpha * yv;
        }
    }

    if let (Some(s), Some(y)) = (s_hist.back(), y_hist.back()) {
        let gamma = dot(s, y) / dot(y, y).max(1e-300);
        for qv in q.iter_mut() {
            *qv *= gamma;
        }
    }

    for i in 0..s_hist.len() {
        let beta = rho_hist[i] * dot(&y_hist[i], &q);
        for (qv, sv) in q.iter_mut().zip(s_hist[i].iter()) {
            *qv += (alphas[i] - beta) * sv;
        }
    }

    for qv in q.iter_mut() {
        *qv = -*qv;
    }
    q
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}
