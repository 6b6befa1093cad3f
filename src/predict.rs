// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! One-shot prediction CLI
//!
//! Usage:
//!   predict --model fakenews_model.bin "Breaking: shocking discovery!"
//!   echo "some statement" | predict --json

use anyhow::{Context, Result};
use clap::Parser;
use fakenews_detector::inference::InferenceService;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "predict")]
#[command(about = "Classify a single text as FAKE or REAL")]
#[command(version)]
struct Args {
    /// Path to the model artifact
    #[arg(short, long, default_value = "fakenews_model.bin")]
    model: PathBuf,

    /// Text to classify; read from stdin when omitted
    text: Option<String>,

    /// Emit the prediction as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let service = InferenceService::load(&args.model)
        .with_context(|| format!("cannot serve predictions without model at {}", args.model.display()))?;

    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
            buffer
        }
    };

    match service.predict(&text) {
        Ok(prediction) => {
            if args.json {
                // The API boundary reports missing probability support as "N/A".
                let confidence = prediction
                    .confidence
                    .map_or_else(|| serde_json::json!("N/A"), |c| serde_json::json!(c));
                println!(
                    "{}",
                    serde_json::json!({
                        "prediction": prediction.label.as_str(),
                        "confidence": confidence,
                    })
                );
            } else {
                match prediction.confidence {
                    Some(confidence) => {
                        println!("{} (confidence {:.4})", prediction.label, confidence)
                    }
                    None => println!("{} (confidence N/A)", prediction.label),
                }
            }
            Ok(())
        }
        Err(e) => {
            // Invalid input is a caller error, not a crash.
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}
