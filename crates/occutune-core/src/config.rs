//! Tuner configuration.
//!
//! Configuration can be built in code with [`TunerConfigBuilder`] or read
//! from a TOML file:
//!
//! ```toml
//! auto_choose_device = true
//! output_dir = "build/generated"
//!
//! [nvcc]
//! path = "/usr/local/cuda/bin/nvcc"
//! flags = ["-O3", "--use_fast_math"]
//! target_device_arch = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default directory for generated sources and binaries.
pub const DEFAULT_OUTPUT_DIR: &str = "occutune_build";

/// Settings for the `nvcc` compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NvccConfig {
    /// Compiler executable; looked up in `CUDA_PATH`/`CUDA_HOME`/`PATH` when unset.
    pub path: Option<PathBuf>,
    /// Extra flags passed before the output arguments.
    pub flags: Vec<String>,
    /// Pass `-arch=sm_XY` for the device being profiled.
    pub target_device_arch: bool,
}

impl Default for NvccConfig {
    fn default() -> Self {
        Self {
            path: None,
            flags: vec!["-O3".to_string()],
            target_device_arch: true,
        }
    }
}

/// Configuration of a tuning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Rank every device by occupancy instead of picking the one with the
    /// most global memory.
    pub auto_choose_device: bool,
    /// Directory for generated sources and compiled binaries.
    pub output_dir: PathBuf,
    /// Compiler settings.
    pub nvcc: NvccConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            auto_choose_device: true,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            nvcc: NvccConfig::default(),
        }
    }
}

impl TunerConfig {
    /// Parses a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Builder for [`TunerConfig`].
#[derive(Debug, Default)]
pub struct TunerConfigBuilder {
    config: TunerConfig,
}

impl TunerConfigBuilder {
    /// Creates a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables ranking of all devices.
    #[must_use]
    pub fn with_auto_choose_device(mut self, enabled: bool) -> Self {
        self.config.auto_choose_device = enabled;
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Sets the compiler executable.
    #[must_use]
    pub fn with_nvcc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.nvcc.path = Some(path.into());
        self
    }

    /// Appends a compiler flag.
    #[must_use]
    pub fn with_nvcc_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.nvcc.flags.push(flag.into());
        self
    }

    /// Enables or disables `-arch=sm_XY` targeting.
    #[must_use]
    pub fn with_target_device_arch(mut self, enabled: bool) -> Self {
        self.config.nvcc.target_device_arch = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TunerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunerConfig::default();
        assert!(config.auto_choose_device);
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(config.nvcc.flags, vec!["-O3".to_string()]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TunerConfig::from_toml_str(
            r#"
            auto_choose_device = false

            [nvcc]
            flags = ["-lineinfo"]
            "#,
        )
        .unwrap();
        assert!(!config.auto_choose_device);
        assert_eq!(config.nvcc.flags, vec!["-lineinfo".to_string()]);
        assert!(config.nvcc.target_device_arch);
        assert!(config.nvcc.path.is_none());
    }

    #[test]
    fn test_builder() {
        let config = TunerConfigBuilder::new()
            .with_auto_choose_device(false)
            .with_output_dir("/tmp/gen")
            .with_nvcc_flag("--use_fast_math")
            .with_target_device_arch(false)
            .build();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/gen"));
        assert_eq!(config.nvcc.flags.len(), 2);
        assert!(!config.nvcc.target_device_arch);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occutune.toml");
        std::fs::write(&path, "output_dir = \"gen\"\n").unwrap();
        let config = TunerConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("gen"));
    }
}
