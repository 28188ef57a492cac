//! CLI command implementations.

pub mod arch;
pub mod devices;
pub mod plan;
pub mod select;

use std::path::Path;

use clap::ValueEnum;
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;

use occutune_core::kernel::BlockSizeAssignment;
use occutune_core::occupancy::OptimizationOutcome;

use crate::error::{CliError, CliResult};

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable report.
    Text,
    /// Pretty-printed JSON on stdout.
    Json,
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read a TOML or JSON file, chosen by extension.
pub fn read_structured<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(toml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Err(CliError::InvalidArgument(format!(
            "{}: expected a .toml or .json file",
            path.display()
        ))),
    }
}

/// Print the per-kernel table of an optimization outcome.
pub fn print_outcome(outcome: &OptimizationOutcome) {
    println!(
        "  {:<28} {:>6} {:>10}  {}",
        "Kernel".bright_white().underline(),
        "Block".bright_white().underline(),
        "Occupancy".bright_white().underline(),
        "Small".bright_white().underline()
    );

    for (kernel, record) in &outcome.records {
        let small = if record.small_workload {
            "yes".green()
        } else {
            "no".dimmed()
        };
        println!(
            "  {:<28} {:>6} {:>10}  {}",
            kernel.kernel_name(),
            outcome.block_sizes.get(*kernel).to_string().bright_yellow(),
            record.occupancy,
            small
        );
    }

    println!();
    println!(
        "  {} total occupancy {}, {} small workload kernel(s)",
        "•".dimmed(),
        outcome.total_occupancy().to_string().bright_white(),
        outcome.small_workload_count().to_string().bright_white()
    );
}

/// Print a block size assignment as `--block-sizes` would accept it.
pub fn print_assignment(block_sizes: &BlockSizeAssignment) {
    println!(
        "  {} {}",
        "Block sizes:".bright_white(),
        block_sizes.to_string().bright_cyan()
    );
}
