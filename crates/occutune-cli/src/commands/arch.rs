//! `occutune arch` command - Show architecture allocation constants.

use colored::Colorize;

use occutune_core::arch::{ArchitectureProfile, RegisterAllocation};

use crate::error::CliResult;

use super::{print_json, OutputFormat};

/// Execute the `arch` command.
pub fn execute(major: u32, minor: u32, format: OutputFormat) -> CliResult<()> {
    let profile = ArchitectureProfile::lookup(major, minor);

    if format == OutputFormat::Json {
        return print_json(&profile);
    }

    println!(
        "{} Compute capability {}",
        "→".bright_cyan(),
        format!("{}.{}", major, minor).bright_yellow()
    );
    if !ArchitectureProfile::is_known_major(major) {
        println!(
            "  {} No entry for major version {}, using fallback constants",
            "Warning:".yellow(),
            major
        );
    }

    let registers = match profile.register_allocation {
        RegisterAllocation::PerBlock => "per block",
        RegisterAllocation::PerWarp => "per warp",
    };

    println!(
        "  {} Warp allocation granularity: {}",
        "•".dimmed(),
        profile.warp_alloc_granularity
    );
    println!(
        "  {} Register allocation granularity: {}",
        "•".dimmed(),
        profile.reg_alloc_granularity
    );
    println!(
        "  {} Shared memory allocation granularity: {} bytes",
        "•".dimmed(),
        profile.smem_alloc_granularity
    );
    println!(
        "  {} Max blocks per SM: {}",
        "•".dimmed(),
        profile.max_blocks_per_sm
    );
    println!("  {} Register allocation: {}", "•".dimmed(), registers);

    Ok(())
}
