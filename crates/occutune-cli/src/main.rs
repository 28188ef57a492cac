//! occutune CLI - block size optimization and device selection for generated
//! simulation kernels.
//!
//! # Commands
//!
//! - `occutune arch <major> <minor>` - Show the allocation constants of an architecture
//! - `occutune plan <file>` - Optimize block sizes offline from recorded probe data
//! - `occutune select <model>` - Profile the model on every device and pick one
//! - `occutune devices` - List visible CUDA devices
//!
//! # Examples
//!
//! ```bash
//! # Allocation constants of a GTX 1080
//! occutune arch 6 1
//!
//! # Optimize from a plan file without touching a GPU
//! occutune plan plans/gtx1080.toml --format json
//!
//! # Select a device, generating code with an external tool
//! occutune select model.toml --generator "netgen --model model.xml"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod generator;

use commands::{arch, devices, plan, select, OutputFormat};

/// occutune - block size tuning for generated GPU kernels
#[derive(Parser)]
#[command(name = "occutune")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the allocation constants used for a compute capability
    Arch {
        /// Compute capability major version
        major: u32,

        /// Compute capability minor version
        minor: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Optimize block sizes from a plan file (device, model and probe data)
    Plan {
        /// Plan file (.toml or .json)
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Profile a model on the visible devices and select one
    Select {
        /// Model topology file (.toml or .json)
        model: PathBuf,

        /// Generator command; receives --output <dir> and --block-sizes <list>
        #[arg(short, long)]
        generator: String,

        /// Tuner configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the device with the most global memory instead of ranking all devices
        #[arg(long)]
        manual: bool,

        /// Directory for generated sources and binaries
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List visible CUDA devices
    Devices {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Arch {
            major,
            minor,
            format,
        } => arch::execute(major, minor, format),

        Commands::Plan { file, format } => plan::execute(&file, format),

        Commands::Select {
            model,
            generator,
            config,
            manual,
            output,
            format,
        } => select::execute(
            &model,
            &generator,
            config.as_deref(),
            manual,
            output,
            format,
        ),

        Commands::Devices { format } => devices::execute(format),

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "occutune",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
