//! Code generation through an external command.
//!
//! The command is run as
//!
//! ```text
//! <program> <args...> --output <dir> --block-sizes neuron_update=32,...
//! ```
//!
//! and must print the name of each generated module on its own line.

use std::path::Path;
use std::process::Command;

use occutune_core::error::{Result, TuneError};
use occutune_core::kernel::BlockSizeAssignment;
use occutune_core::profiler::SourceGenerator;

/// Runs a user-supplied generator command.
#[derive(Debug, Clone)]
pub struct ExternalGenerator {
    program: String,
    args: Vec<String>,
}

impl ExternalGenerator {
    /// Creates a generator from a program and its leading arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace separated command line.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl SourceGenerator for ExternalGenerator {
    fn generate(&self, block_sizes: &BlockSizeAssignment, output_dir: &Path) -> Result<Vec<String>> {
        tracing::debug!(program = %self.program, %block_sizes, "Running generator");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--output")
            .arg(output_dir)
            .arg("--block-sizes")
            .arg(block_sizes.to_string())
            .output()
            .map_err(|e| TuneError::Generator(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(TuneError::Generator(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let modules: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if modules.is_empty() {
            return Err(TuneError::Generator(format!(
                "{} did not report any modules",
                self.program
            )));
        }

        Ok(modules)
    }
}
