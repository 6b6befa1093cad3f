// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Misclassification and calibration analysis CLI
//!
//! Rebuilds the held-out test split (same seed as training), scores it with
//! a persisted model artifact, prints the full evaluation report and exports
//! the ranked misclassification list as CSV.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fakenews_detector::corpus::{self, Label};
use fakenews_detector::evaluate::{evaluate, export_misclassified_csv};
use fakenews_detector::model::ModelStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "analyze-errors")]
#[command(about = "Analyze misclassifications and calibration of a trained model")]
#[command(version)]
struct Args {
    /// Path to the model artifact
    #[arg(short, long, default_value = "fakenews_model.bin")]
    model: PathBuf,

    /// Article CSV labeled FAKE (ISOT layout, header row)
    #[arg(long)]
    fake_csv: Option<PathBuf>,

    /// Article CSV labeled REAL (ISOT layout, header row)
    #[arg(long)]
    real_csv: Option<PathBuf>,

    /// Directory with LIAR train.tsv / test.tsv / valid.tsv
    #[arg(long)]
    liar_dir: Option<PathBuf>,

    /// Random seed; must match training to reproduce the same test split
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Held-out test fraction; must match training
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Decision threshold override (default: the artifact's tuned value)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Output directory for the CSV export and JSON report
    #[arg(short, long, default_value = "analysis")]
    output: PathBuf,

    /// Output format (json, text, both)
    #[arg(short, long, default_value = "both")]
    format: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Missing artifact is fatal by contract.
    let model = ModelStore::load(&args.model)
        .with_context(|| format!("cannot start analysis without model at {}", args.model.display()))?;
    tracing::info!(
        "Model: ngram={:?} max_features={} C={} threshold={:.3}",
        model.metadata.ngram_range,
        model.metadata.max_features,
        model.metadata.c,
        model.decision_threshold()
    );

    if args.fake_csv.is_some() != args.real_csv.is_some() {
        bail!("--fake-csv and --real-csv must be given together");
    }
    if args.fake_csv.is_none() && args.liar_dir.is_none() {
        bail!("no corpus input: pass --fake-csv/--real-csv and/or --liar-dir");
    }

    let mut raw = Vec::new();
    let mut drops = corpus::DropStats::default();
    if let (Some(fake_path), Some(real_path)) = (&args.fake_csv, &args.real_csv) {
        raw.extend(corpus::load_article_csv(fake_path, Label::Fake, "ISOT_FAKE")?);
        raw.extend(corpus::load_article_csv(real_path, Label::Real, "ISOT_REAL")?);
    }
    if let Some(liar_dir) = &args.liar_dir {
        raw.extend(corpus::load_liar_dir(liar_dir, &mut drops)?);
    }

    let corpus = corpus::build_corpus(raw, drops, args.seed);
    let (_, test) = corpus::stratified_split(&corpus.documents, args.test_fraction, args.seed);
    tracing::info!("Scoring {} held-out documents", test.len());

    let report = evaluate(&model, &test, args.threshold);

    println!("\n{}", report.format());

    std::fs::create_dir_all(&args.output)?;

    let csv_path = args.output.join("misclassified_testset.csv");
    export_misclassified_csv(&report, &csv_path)?;
    println!("Misclassified samples saved to: {}", csv_path.display());

    if args.format == "json" || args.format == "both" {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let json_path = args.output.join(format!("evaluation_{}.json", timestamp));
        std::fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;
        println!("JSON report saved to: {}", json_path.display());
    }

    Ok(())
}
