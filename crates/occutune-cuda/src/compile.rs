//! Kernel compilation with `nvcc`.
//!
//! Each generated module `<name>` is read from `<output_dir>/<name>.cc` and
//! compiled to `<output_dir>/<name>.cubin`:
//!
//! ```text
//! nvcc -cubin <flags> [-arch=sm_XY] -o <output_dir>/<name>.cubin <output_dir>/<name>.cc
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use occutune_core::device::DeviceDescriptor;
use occutune_core::error::{Result, TuneError};
use occutune_core::profiler::KernelCompiler;
use occutune_core::NvccConfig;

/// Extension of generated source modules.
pub const SOURCE_EXTENSION: &str = "cc";

/// Extension of compiled binaries.
pub const BINARY_EXTENSION: &str = "cubin";

/// Find the nvcc executable.
///
/// Checks `CUDA_PATH`, `CUDA_HOME`, common install locations and finally `PATH`.
pub fn find_nvcc() -> Option<PathBuf> {
    for var in ["CUDA_PATH", "CUDA_HOME"] {
        if let Ok(root) = env::var(var) {
            let nvcc = PathBuf::from(root).join("bin").join("nvcc");
            if nvcc.exists() {
                return Some(nvcc);
            }
        }
    }

    for path in [
        "/usr/local/cuda/bin/nvcc",
        "/opt/cuda/bin/nvcc",
        "/usr/bin/nvcc",
    ] {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Ok(output) = Command::new("which").arg("nvcc").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }

    None
}

/// Compiles generated modules to cubins by running `nvcc` as a subprocess.
#[derive(Debug, Clone)]
pub struct NvccCompiler {
    nvcc: PathBuf,
    flags: Vec<String>,
    target_device_arch: bool,
}

impl NvccCompiler {
    /// Creates a compiler from configuration.
    ///
    /// Falls back to `nvcc` on `PATH` if no path is configured and none is found.
    pub fn new(config: &NvccConfig) -> Self {
        let nvcc = config
            .path
            .clone()
            .or_else(find_nvcc)
            .unwrap_or_else(|| PathBuf::from("nvcc"));

        Self {
            nvcc,
            flags: config.flags.clone(),
            target_device_arch: config.target_device_arch,
        }
    }

    /// Path of the compiler executable.
    pub fn nvcc(&self) -> &Path {
        &self.nvcc
    }

    /// Source path of `module`.
    pub fn source_path(output_dir: &Path, module: &str) -> PathBuf {
        output_dir.join(format!("{}.{}", module, SOURCE_EXTENSION))
    }

    /// Binary path of `module`.
    pub fn binary_path(output_dir: &Path, module: &str) -> PathBuf {
        output_dir.join(format!("{}.{}", module, BINARY_EXTENSION))
    }

    /// Arguments passed to nvcc for `module`.
    pub fn args(&self, device: &DeviceDescriptor, output_dir: &Path, module: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-cubin".into()];
        args.extend(self.flags.iter().map(OsString::from));
        if self.target_device_arch {
            args.push(format!("-arch={}", device.sm_arch()).into());
        }
        args.push("-o".into());
        args.push(Self::binary_path(output_dir, module).into_os_string());
        args.push(Self::source_path(output_dir, module).into_os_string());
        args
    }
}

impl KernelCompiler for NvccCompiler {
    fn compile(&self, device: &DeviceDescriptor, output_dir: &Path, module: &str) -> Result<PathBuf> {
        let args = self.args(device, output_dir, module);
        tracing::debug!(
            nvcc = %self.nvcc.display(),
            module,
            arch = %device.sm_arch(),
            "Building module"
        );

        let status = Command::new(&self.nvcc).args(&args).status().map_err(|e| {
            TuneError::BuildFailure {
                module: module.to_string(),
                status: format!("failed to execute {}: {}", self.nvcc.display(), e),
            }
        })?;

        if !status.success() {
            return Err(TuneError::BuildFailure {
                module: module.to_string(),
                status: status.to_string(),
            });
        }

        Ok(Self::binary_path(output_dir, module))
    }
}
