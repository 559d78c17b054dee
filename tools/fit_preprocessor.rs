//! Preprocessor Fitting Tool
//!
//! Fits median imputation and standard scaling on a training file and writes
//! the artifact loaded by the prediction service.
//!
//! Usage: fit_preprocessor <training.csv|training.json> <output.json> [target_column]

use anyhow::{bail, Context};
use heart_risk_service::preprocessor::{Dataset, Preprocessor};
use heart_risk_service::types::patient::FEATURE_NAMES;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fit_preprocessor=info".parse()?)
                .add_directive("heart_risk_service=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let (Some(input), Some(output)) = (args.get(1), args.get(2)) else {
        bail!("usage: fit_preprocessor <training.csv|training.json> <output.json> [target_column]");
    };
    let target = args.get(3).map(|s| s.as_str()).unwrap_or("target");

    info!(input = %input, output = %output, target = %target, "Fitting preprocessor");

    let mut data = Dataset::load(input).with_context(|| format!("Failed to read {input}"))?;
    if data.drop_column(target).is_none() {
        warn!(target = %target, "Target column not present, fitting on every column");
    }

    let missing: Vec<&str> = FEATURE_NAMES
        .iter()
        .copied()
        .filter(|name| !data.columns.iter().any(|c| c == name))
        .collect();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Training data lacks service features; the service will refuse to score");
    }

    let mut preprocessor = Preprocessor::new();
    preprocessor
        .fit(&data)
        .context("Failed to fit preprocessor")?;
    preprocessor
        .save(output)
        .with_context(|| format!("Failed to write {output}"))?;

    if let Some(stats) = preprocessor.stats() {
        info!(
            rows = stats.fitted_rows,
            columns = stats.columns.len(),
            "Preprocessor fitted"
        );
        for (((column, median), mean), scale) in stats
            .columns
            .iter()
            .zip(&stats.medians)
            .zip(&stats.means)
            .zip(&stats.scales)
        {
            info!(
                column = %column,
                median = median,
                mean = format!("{mean:.4}"),
                scale = format!("{scale:.4}"),
                "Column statistics"
            );
        }
    }

    Ok(())
}
