//! Console presentation of comparison results.

use std::io::{self, Write};

use crate::driver::{DatasetOutcome, PairOutcome};
use crate::stats::Summary;

pub fn write_pair<W: Write>(out: &mut W, pair: &PairOutcome) -> io::Result<()> {
    writeln!(out, "\nPair {}:", pair.paths.id)?;
    match &pair.result {
        Ok(report) => {
            writeln!(out, "DTW distance: {:.2}", report.distance)?;
            writeln!(out, "MSE after warping: {:.4}", report.mse)
        }
        Err(e) => writeln!(out, "Failed: {e}"),
    }
}

pub fn write_summary<W: Write>(
    out: &mut W,
    label: &str,
    summary: Option<Summary>,
) -> io::Result<()> {
    match summary {
        Some(summary) => {
            writeln!(out, "\n>> Mean MSE for {label} files: {:.4}", summary.mean)?;
            writeln!(out, ">> Std  MSE for {label} files: {:.4}", summary.std_dev)
        }
        None => writeln!(out, "\n>> No successful comparisons for {label} files"),
    }
}

pub fn write_report<W: Write>(out: &mut W, outcomes: &[DatasetOutcome]) -> io::Result<()> {
    for dataset in outcomes {
        writeln!(out, "\n=== Comparing {} Files ===", dataset.label)?;
        for pair in &dataset.pairs {
            write_pair(out, pair)?;
        }
        write_summary(out, &dataset.label, dataset.summary())?;
    }
    Ok(())
}
