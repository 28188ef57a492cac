//! CUDA backends for occutune.
//!
//! - [`NvccCompiler`] builds generated modules into cubins with `nvcc`.
//! - [`CudaPlatform`] enumerates devices, creates contexts, loads cubins and
//!   reads kernel attributes through the CUDA driver API (via cudarc).
//!
//! # Requirements
//!
//! - CUDA Toolkit with `nvcc` on `PATH`, `CUDA_PATH` or `CUDA_HOME`
//! - The `cuda` feature for the driver backend
//!
//! # Example
//!
//! ```ignore
//! use occutune_core::prelude::*;
//! use occutune_cuda::{CudaPlatform, NvccCompiler};
//!
//! let config = TunerConfig::default();
//! let compiler = NvccCompiler::new(&config.nvcc);
//! let selection = select_device(
//!     &model,
//!     &DeclaredThreadSizing,
//!     &CudaPlatform::new(),
//!     &generator,
//!     &compiler,
//!     &config,
//! )?;
//! ```

#![warn(missing_docs)]

pub mod compile;
#[cfg(feature = "cuda")]
mod driver;

pub use compile::{find_nvcc, NvccCompiler};

#[cfg(feature = "cuda")]
pub use driver::{CudaModule, CudaPlatform, CudaSession};

// Placeholder implementations when CUDA is not available
#[cfg(not(feature = "cuda"))]
mod stub {
    use std::path::Path;

    use occutune_core::device::{DeviceDescriptor, DevicePlatform, DeviceSession, LoadedModule};
    use occutune_core::error::{Result, TuneError};
    use occutune_core::kernel::ResourceSample;

    fn unavailable() -> TuneError {
        TuneError::Driver("CUDA feature not enabled".to_string())
    }

    /// Stub CUDA platform when the CUDA feature is disabled.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CudaPlatform;

    impl CudaPlatform {
        /// Creates the platform.
        pub fn new() -> Self {
            Self
        }
    }

    /// Stub session; never constructed.
    pub struct CudaSession;

    /// Stub module; never constructed.
    pub struct CudaModule;

    impl DevicePlatform for CudaPlatform {
        type Session = CudaSession;

        fn device_count(&self) -> Result<usize> {
            Err(unavailable())
        }

        fn properties(&self, _device_id: usize) -> Result<DeviceDescriptor> {
            Err(unavailable())
        }

        fn open(&self, _device_id: usize) -> Result<CudaSession> {
            Err(unavailable())
        }
    }

    impl DeviceSession for CudaSession {
        type Module = CudaModule;

        fn make_current(&self) -> Result<()> {
            Err(unavailable())
        }

        fn load(&self, _binary: &Path) -> Result<CudaModule> {
            Err(unavailable())
        }
    }

    impl LoadedModule for CudaModule {
        fn kernel_resources(&self, _kernel_name: &str) -> Result<Option<ResourceSample>> {
            Err(unavailable())
        }
    }
}

#[cfg(not(feature = "cuda"))]
pub use stub::{CudaModule, CudaPlatform, CudaSession};

/// Check if CUDA is available at runtime.
///
/// Returns false if the CUDA feature is not enabled, the driver library is
/// not installed or no devices are present.
pub fn is_cuda_available() -> bool {
    #[cfg(feature = "cuda")]
    {
        // cudarc panics if CUDA libraries are not found, so we catch that
        std::panic::catch_unwind(|| {
            cudarc::driver::CudaContext::device_count()
                .map(|c| c > 0)
                .unwrap_or(false)
        })
        .unwrap_or(false)
    }
    #[cfg(not(feature = "cuda"))]
    {
        false
    }
}
