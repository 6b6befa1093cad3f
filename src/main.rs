// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training CLI for the fake-news detector
//!
//! Usage:
//!   train-model --fake-csv dataset/fake.csv --real-csv dataset/true.csv --liar-dir dataset/liar
//!   train-model --liar-dir dataset/liar --folds 5 --seed 42 -o fakenews_model.bin

use anyhow::{bail, Context, Result};
use clap::Parser;
use fakenews_detector::corpus::{self, Label};
use fakenews_detector::model::ModelStore;
use fakenews_detector::selection::{select, CancelToken, SearchConfig, SearchGrid};
use fakenews_detector::threshold::select_threshold;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "train-model")]
#[command(about = "Train the FAKE/REAL news classifier")]
#[command(version)]
struct Args {
    /// Article CSV labeled FAKE (ISOT layout, header row)
    #[arg(long)]
    fake_csv: Option<PathBuf>,

    /// Article CSV labeled REAL (ISOT layout, header row)
    #[arg(long)]
    real_csv: Option<PathBuf>,

    /// Directory with LIAR train.tsv / test.tsv / valid.tsv
    #[arg(long)]
    liar_dir: Option<PathBuf>,

    /// Subsample the larger article CSV down to the smaller one
    #[arg(long, default_value_t = true)]
    balance: bool,

    /// Random seed for shuffling, balancing and fold assignment
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Cross-validation folds
    #[arg(long, default_value_t = 5)]
    folds: usize,

    /// Held-out test fraction
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Worker pool size (default: available CPU parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output path for the model artifact
    #[arg(short, long, default_value = "fakenews_model.bin")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Fake News Detector Training");
    tracing::info!("===========================");
    tracing::info!("Seed: {}", args.seed);
    tracing::info!("Folds: {}", args.folds);

    if args.fake_csv.is_some() != args.real_csv.is_some() {
        bail!("--fake-csv and --real-csv must be given together");
    }
    if args.fake_csv.is_none() && args.liar_dir.is_none() {
        bail!("no corpus input: pass --fake-csv/--real-csv and/or --liar-dir");
    }

    // Load raw documents from every configured source.
    let mut raw = Vec::new();
    let mut drops = corpus::DropStats::default();

    if let (Some(fake_path), Some(real_path)) = (&args.fake_csv, &args.real_csv) {
        let mut fake = corpus::load_article_csv(fake_path, Label::Fake, "ISOT_FAKE")?;
        let mut real = corpus::load_article_csv(real_path, Label::Real, "ISOT_REAL")?;
        if args.balance {
            let target = fake.len().min(real.len());
            fake = corpus::subsample(fake, target, args.seed);
            real = corpus::subsample(real, target, args.seed);
            tracing::info!("Balanced article corpus to {} documents per class", target);
        }
        raw.extend(fake);
        raw.extend(real);
    }
    if let Some(liar_dir) = &args.liar_dir {
        raw.extend(corpus::load_liar_dir(liar_dir, &mut drops)?);
    }

    let corpus = corpus::build_corpus(raw, drops, args.seed);
    log_top_tokens(&corpus.documents);

    let (train, test) = corpus::stratified_split(&corpus.documents, args.test_fraction, args.seed);
    tracing::info!("Split: {} train / {} test documents", train.len(), test.len());

    // Grid search on the training split only.
    let config = SearchConfig {
        folds: args.folds,
        seed: args.seed,
        workers: args.workers,
        ..Default::default()
    };
    let outcome = select(&train, &SearchGrid::default(), &config, &CancelToken::new())
        .context("hyperparameter search failed")?;
    let mut model = outcome.model;

    // Held-out accuracy at the default cutoff, then tune the operating
    // threshold on the same split and record it in the artifact.
    let probabilities: Vec<f64> = test.iter().map(|d| model.proba_fake(&d.text)).collect();
    let truth: Vec<bool> = test.iter().map(|d| d.label.is_fake()).collect();
    let correct = probabilities
        .iter()
        .zip(truth.iter())
        .filter(|&(&p, &t)| (p >= 0.5) == t)
        .count();
    let test_accuracy = correct as f64 / test.len().max(1) as f64;

    let selection = select_threshold(&probabilities, &truth);
    model.metadata.threshold = Some(selection.threshold);

    ModelStore::save(&model, &args.output)?;

    println!("\n{}", "=".repeat(70));
    println!("TRAINING SUMMARY");
    println!("{}", "=".repeat(70));
    println!(
        "\nBest configuration: ngram={:?} max_features={} C={}",
        outcome.best.ngram_range, outcome.best.max_features, outcome.best.c
    );
    println!("Cross-validation accuracy: {:.4}", outcome.cv_score);
    println!("Test accuracy (threshold 0.5): {:.4}", test_accuracy);
    println!(
        "Tuned threshold: {:.3} (F1={:.3}, P={:.3}, R={:.3})",
        selection.threshold, selection.f1, selection.precision, selection.recall
    );
    println!("\nScore table:");
    println!("{:-<70}", "");
    println!(
        "{:<10} {:>12} {:>8} {:>12} {:>14}",
        "ngram", "max_features", "C", "mean score", "failed folds"
    );
    println!("{:-<70}", "");
    for score in &outcome.scores {
        println!(
            "{:<10} {:>12} {:>8} {:>12.4} {:>14}",
            format!("{:?}", score.params.ngram_range),
            score.params.max_features,
            score.params.c,
            score.mean_score,
            score.failed_folds
        );
    }
    println!("{:-<70}", "");
    println!("\nModel artifact: {}", args.output.display());
    println!("Training complete!");

    Ok(())
}

/// Log the most frequent tokens per class as a sanity check on the cleaned
/// corpus.
fn log_top_tokens(documents: &[fakenews_detector::Document]) {
    let mut fake_counts: HashMap<&str, usize> = HashMap::new();
    let mut real_counts: HashMap<&str, usize> = HashMap::new();
    for doc in documents {
        let counts = if doc.label.is_fake() { &mut fake_counts } else { &mut real_counts };
        for token in doc.text.split_whitespace() {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let top = |counts: &HashMap<&str, usize>| -> Vec<String> {
        let mut pairs: Vec<(&str, usize)> = counts.iter().map(|(&t, &c)| (t, c)).collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        pairs.into_iter().take(10).map(|(t, c)| format!("{t}:{c}")).collect()
    };

    tracing::info!("Most common FAKE tokens: {}", top(&fake_counts).join(", "));
    tracing::info!("Most common REAL tokens: {}", top(&real_counts).join(", "));
}
