//! `occutune select` command - Profile a model on the visible devices and pick one.

use std::path::{Path, PathBuf};

use colored::Colorize;

use occutune_core::config::TunerConfig;
use occutune_core::model::ModelTopology;
use occutune_core::selector::{select_device, DeviceSelection};
use occutune_core::workload::DeclaredThreadSizing;
use occutune_cuda::{CudaPlatform, NvccCompiler};

use crate::error::{CliError, CliResult};
use crate::generator::ExternalGenerator;

use super::{print_assignment, print_json, OutputFormat};

/// Loads the tuner configuration and applies command line overrides.
pub fn load_config(
    config: Option<&Path>,
    manual: bool,
    output: Option<PathBuf>,
) -> CliResult<TunerConfig> {
    let mut config = match config {
        Some(path) => TunerConfig::from_file(path)?,
        None => TunerConfig::default(),
    };

    if manual {
        config.auto_choose_device = false;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }

    Ok(config)
}

/// Execute the `select` command.
pub fn execute(
    model: &Path,
    generator: &str,
    config: Option<&Path>,
    manual: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> CliResult<()> {
    let generator = ExternalGenerator::from_command_line(generator)
        .ok_or_else(|| CliError::InvalidArgument("generator command is empty".to_string()))?;
    let config = load_config(config, manual, output)?;
    let topology = ModelTopology::from_path(model)?;
    let compiler = NvccCompiler::new(&config.nvcc);

    if format == OutputFormat::Text {
        println!(
            "{} Selecting device for {}",
            "→".bright_cyan(),
            model.display().to_string().bright_yellow()
        );
        println!(
            "  {} Mode: {}",
            "•".dimmed(),
            if config.auto_choose_device {
                "optimal"
            } else {
                "most memory"
            }
        );
        println!(
            "  {} Compiler: {}",
            "•".dimmed(),
            compiler.nvcc().display()
        );
        println!(
            "  {} Output: {}",
            "•".dimmed(),
            config.output_dir.display()
        );
        println!();
    }

    let selection = select_device(
        &topology,
        &DeclaredThreadSizing,
        &CudaPlatform::new(),
        &generator,
        &compiler,
        &config,
    )?;

    match format {
        OutputFormat::Json => print_json(&selection),
        OutputFormat::Text => {
            print_selection(&selection);
            Ok(())
        }
    }
}

fn print_selection(selection: &DeviceSelection) {
    println!("{}:", "Device Rankings".bright_white().underline());
    for ranking in &selection.rankings {
        let marker = if ranking.device_id == selection.device_id {
            "✓".green()
        } else {
            " ".normal()
        };
        println!(
            "  {} device {}  sm {}  small {}  occupancy {}",
            marker,
            ranking.device_id,
            ranking.version_score,
            ranking.small_workload_count,
            ranking.total_occupancy
        );
    }
    println!();
    println!(
        "{} Selected device {}",
        "✓".green(),
        selection.device_id.to_string().bright_white()
    );
    print_assignment(&selection.block_sizes);
}
