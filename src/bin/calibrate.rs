use anyhow::Result;

use pitch_edge::calibration::{ConfidenceRecord, run_confidence_calibration};
use pitch_edge::cli;
use pitch_edge::config::CalibrationConfig;

fn main() -> Result<()> {
    cli::init();

    let path = cli::input_path("tests/fixtures/calibration_history.json");
    let history: Vec<ConfidenceRecord> = cli::read_json(&path)?;

    let cfg = CalibrationConfig::from_env();
    let report = run_confidence_calibration(&history, &cfg);

    if cli::has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} records, {} outside {:.1}-{:.1}",
        report.total_records, report.skipped, cfg.min_confidence, cfg.max_confidence
    );
    if report.insufficient {
        println!("No bucket has {} or more samples yet.", cfg.min_samples);
        return Ok(());
    }
    println!("  range      wins  losses  pushes  accuracy");
    for b in &report.buckets {
        let accuracy = b
            .accuracy
            .map(|a| format!("{:.1}%", a * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<9} {:>5}  {:>6}  {:>6}  {:>8}",
            b.label(),
            b.wins,
            b.losses,
            b.pushes,
            accuracy
        );
    }
    Ok(())
}
