//! Summary command: print statistics for a saved run report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use seg_eval::RunReport;

pub fn run(input: PathBuf, detail: bool, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("Loading report from: {}", input.display());
    }
    let json = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let report: RunReport =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", input.display()))?;

    println!(
        "Run of {} samples over {} classes ({})",
        report.samples,
        report.n_class,
        report.timestamp.to_rfc3339()
    );
    println!(
        "Mean IoU (cumulative):      {}",
        format_opt(report.mean_iou)
    );
    println!(
        "Mean IoU (per-sample avg):  {}",
        format_opt(report.sample_mean_iou)
    );

    if let Some(summary) = &report.sample_iou_summary {
        println!();
        println!("Per-sample mean IoU distribution:");
        println!("  Mean: {:.4}, Median: {:.4}", summary.mean, summary.median);
        println!("  Min: {:.4}, Max: {:.4}", summary.min, summary.max);
        println!("  P25: {:.4}, P75: {:.4}", summary.p25, summary.p75);
        println!("  StdDev: {:.4}", summary.std_dev);
    }

    if detail {
        println!();
        println!("{:>8} {:>10} {:>10} {:>10}", "sample", "miou", "run_miou", "run_avg");
        for row in &report.samples_detail {
            println!(
                "{:>8} {:>10} {:>10} {:>10}",
                row.index,
                format_opt(row.mean_iou),
                format_opt(row.running_mean_iou),
                format_opt(row.running_sample_mean_iou)
            );
        }
    }

    Ok(())
}

fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.4}"))
}
