//! Error types for the occutune CLI.

use thiserror::Error;

use occutune_core::TuneError;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Optimization failed.
    #[error(transparent)]
    Tune(#[from] TuneError),

    /// Configuration or input file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(e.to_string())
    }
}
