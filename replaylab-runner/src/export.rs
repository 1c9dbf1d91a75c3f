//! Artifact export: JSON and CSV.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape and equity curve for external analysis tools
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! than this build understands are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use replaylab_core::domain::Trade;

use crate::runner::{BacktestResult, EquityPoint, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: ticker, entry_date, entry_price, exit_date, exit_price, amount,
/// pnl, pnl_pct, exit_reason, holding_days, commission_cost, slippage_cost
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "ticker",
        "entry_date",
        "entry_price",
        "exit_date",
        "exit_price",
        "amount",
        "pnl",
        "pnl_pct",
        "exit_reason",
        "holding_days",
        "commission_cost",
        "slippage_cost",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.ticker,
            &t.entry_date.to_string(),
            &format!("{:.6}", t.entry_price),
            &t.exit_date.to_string(),
            &format!("{:.6}", t.exit_price),
            &format!("{:.6}", t.amount),
            &format!("{:.2}", t.pnl),
            &format!("{:.4}", t.pnl_pct),
            t.exit_reason.as_str(),
            &t.holding_days().to_string(),
            &format!("{:.2}", t.commission_cost),
            &format!("{:.2}", t.slippage_cost),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "equity"])?;
    for point in equity_curve {
        wtr.write_record([&point.date.to_string(), &format!("{:.2}", point.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Directory name for a run: strategy name plus the first 12 fingerprint
/// characters, so re-running the same configuration overwrites its bundle.
pub fn artifact_dir_name(result: &BacktestResult) -> String {
    let fp = result.fingerprint.as_str();
    format!("{}_{}", result.strategy.name, &fp[..fp.len().min(12)])
}

/// Save `manifest.json`, `trades.csv` and `equity.csv` under
/// `output_dir/{artifact_dir_name}/`. Returns the run directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(artifact_dir_name(result));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |name: &str, contents: String| -> Result<()> {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))
    };
    write("manifest.json", export_json(result)?)?;
    write("trades.csv", export_trades_csv(&result.trades)?)?;
    write("equity.csv", export_equity_csv(&result.equity_curve)?)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}
