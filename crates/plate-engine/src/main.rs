//! Command-line plate reader
//!
//! Usage:
//!   plate-detect frame.jpg other.png        - Print the plate found in each image
//!   plate-detect --base64 frame.b64         - Inputs hold base64 text (data URLs allowed)
//!   plate-detect --json --policy early-exit frame.jpg

use anyhow::{Context, Result};
use clap::Parser;
use common::plates::ImageInput;
use plate_engine::{EngineConfig, RecognitionPolicy, RecognitionService};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "plate-detect")]
#[command(about = "Read license plates from captured frames", long_about = None)]
struct Cli {
    /// Image files to read
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Variant policy: exhaustive or early-exit
    #[arg(long, value_parser = parse_policy)]
    policy: Option<RecognitionPolicy>,

    /// Treat file contents as base64 text instead of raw image bytes
    #[arg(long)]
    base64: bool,

    /// Print one JSON report per image
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after processing
    #[arg(long)]
    metrics: bool,

    /// Engine configuration file (JSON)
    #[arg(long, env = "PLATE_ENGINE_CONFIG")]
    config: Option<PathBuf>,
}

fn parse_policy(value: &str) -> Result<RecognitionPolicy, String> {
    RecognitionPolicy::parse(value)
        .ok_or_else(|| format!("unknown policy '{}' (expected exhaustive or early-exit)", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = telemetry::init_with_service("plate-detect");

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = EngineConfig::from_json_file(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => EngineConfig::from_env()?,
    };
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    config.validate()?;

    info!(policy = %config.policy, model = %config.reader.recognition_model_path, "Starting plate-detect");
    let service = RecognitionService::from_config(config)?;

    for path in &cli.images {
        let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let input = if cli.base64 {
            ImageInput::base64(String::from_utf8(raw).context("base64 input is not UTF-8 text")?)
        } else {
            ImageInput::bytes(raw)
        };

        if cli.json {
            let report = service.recognize_detailed(input).await;
            let line = match &report {
                Ok(report) => serde_json::json!({
                    "path": path.display().to_string(),
                    "plate": report.best().map(|c| c.plate.clone()),
                    "report": report,
                }),
                Err(e) => serde_json::json!({
                    "path": path.display().to_string(),
                    "plate": null,
                    "error": e.to_string(),
                }),
            };
            println!("{}", line);
        } else {
            match service.detect_plate(input).await {
                Some(plate) => println!("{}: {}", path.display(), plate),
                None => println!("{}: not detected", path.display()),
            }
        }
    }

    if cli.metrics {
        print!("{}", telemetry::metrics::encode_metrics()?);
    }

    Ok(())
}
