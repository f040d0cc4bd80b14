//! Reconcile a closing document from the command line
//!
//! Usage: `reconcile [draft.json]` (reads stdin without a path). Prints the
//! reconciliation and anomaly warnings as JSON. Thresholds come from the
//! file named by `CASH_OFFICE_CONFIG`, or from `CASH_OFFICE_*` variables.

use anyhow::Context;
use cash_office::{evaluate_closing, ClosingDraft, Config};
use std::io::Read;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("CASH_OFFICE_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env()?,
    };

    let input = match std::env::args().nth(1) {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            buffer
        }
    };

    let draft: ClosingDraft = serde_json::from_str(&input).context("parsing closing draft")?;
    let evaluation = evaluate_closing(&draft, &config.anomaly)?;

    for warning in &evaluation.anomalies {
        tracing::warn!(severity = ?warning.severity(), "{}", warning);
    }
    tracing::info!(
        date = %draft.date,
        difference = %evaluation.reconciliation.totals.difference,
        "Closing reconciled"
    );

    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}
