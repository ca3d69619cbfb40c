use anyhow::{Context, Result};
use env_logger::Builder;
use log::{LevelFilter, info};
use std::fs;

use crate::sim::runner::SimulationReport;
use crate::sim::scenario::Scenario;

mod engine;
mod pvd;
mod random;
mod sim;

fn main() -> Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("pvd_broadcast_sim"), LevelFilter::Debug)
        .init();

    let scenario_path = std::env::args()
        .nth(1)
        .context("usage: pvd-broadcast-sim <scenario.json>")?;

    info!("loading scenario: {}", scenario_path);
    let data = fs::read_to_string(&scenario_path)
        .with_context(|| format!("Failed to read file: {scenario_path}"))?;
    let scenario = serde_json::from_str::<Scenario>(&data).context("Invalid JSON format")?;

    let report = sim::runner::run(&scenario)?;
    print_report(&report);

    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("PVD delivery report");
    println!(
        "  transmitted: {} packets / {} bytes",
        report.tx_packets, report.tx_bytes
    );
    println!("  arrived:     {} packets", report.actual_rx);
    println!();
    println!(
        "  {:>6}  {:>10}  {:>10}  {:>8}",
        "range", "expected", "in-range", "ratio"
    );
    for bucket in &report.buckets {
        let ratio = bucket
            .delivery_ratio()
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>5.0}m  {:>10}  {:>10}  {:>8}",
            bucket.range_m, bucket.expected, bucket.in_range, ratio
        );
    }
}
