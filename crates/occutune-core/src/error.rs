//! Error types for block size optimization and device selection.

use thiserror::Error;

/// Result type alias using [`TuneError`].
pub type Result<T> = std::result::Result<T, TuneError>;

/// Errors that abort an optimization run.
///
/// Unsupported architectures and kernels missing from a compiled module are
/// not errors: the former falls back to the newest known constants, the
/// latter excludes the kernel from the run.
#[derive(Error, Debug)]
pub enum TuneError {
    /// No accelerator devices are visible.
    #[error("No CUDA devices found")]
    NoDeviceFound,

    /// The kernel compiler exited with a non-zero status.
    #[error("Build of module '{module}' failed: {status}")]
    BuildFailure {
        /// Generated module that failed to build.
        module: String,
        /// Exit status description reported by the compiler process.
        status: String,
    },

    /// A compiled binary could not be loaded onto the device.
    #[error("Failed to load binary: {0}")]
    LoadFailure(String),

    /// A device driver call failed.
    #[error("Driver error: {0}")]
    Driver(String),

    /// The external source generator failed.
    #[error("Code generation failed: {0}")]
    Generator(String),

    /// The model topology is inconsistent.
    #[error("Invalid model: {0}")]
    Model(String),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TuneError {
    /// Returns true if this error indicates a defect in generated code or
    /// the toolchain rather than in the device.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, TuneError::BuildFailure { .. })
    }
}

impl From<toml::de::Error> for TuneError {
    fn from(e: toml::de::Error) -> Self {
        TuneError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TuneError {
    fn from(e: serde_json::Error) -> Self {
        TuneError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_display() {
        let err = TuneError::BuildFailure {
            module: "neuronUpdate".to_string(),
            status: "exit status: 1".to_string(),
        };
        assert!(err.is_build_failure());
        assert_eq!(
            err.to_string(),
            "Build of module 'neuronUpdate' failed: exit status: 1"
        );
    }

    #[test]
    fn test_toml_error_is_config() {
        let err: TuneError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, TuneError::Config(_)));
    }
}
