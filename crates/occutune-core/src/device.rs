//! Device property snapshots and the device access seams.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kernel::ResourceSample;

/// Immutable snapshot of the device properties the optimizer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device ordinal.
    pub device_id: usize,
    /// Device name.
    #[serde(default)]
    pub name: String,
    /// Compute capability (major, minor).
    pub compute_capability: (u32, u32),
    /// Number of streaming multiprocessors.
    pub multiprocessor_count: u32,
    /// Maximum threads per block.
    pub max_threads_per_block: u32,
    /// Maximum resident threads per multiprocessor.
    pub max_threads_per_multiprocessor: u32,
    /// 32-bit registers available to a block.
    pub registers_per_block: u32,
    /// Shared memory per multiprocessor in bytes.
    pub shared_mem_per_multiprocessor: u64,
    /// Total global memory in bytes.
    pub total_global_memory: u64,
}

impl DeviceDescriptor {
    /// Architecture version score (`major * 10 + minor`).
    #[must_use]
    pub fn version_score(&self) -> u32 {
        self.compute_capability.0 * 10 + self.compute_capability.1
    }

    /// Returns the `sm_XY` architecture name.
    #[must_use]
    pub fn sm_arch(&self) -> String {
        format!(
            "sm_{}{}",
            self.compute_capability.0, self.compute_capability.1
        )
    }
}

/// Enumerates devices and opens device contexts.
pub trait DevicePlatform {
    /// Context type; dropping it releases the device context.
    type Session: DeviceSession;

    /// Number of visible devices.
    fn device_count(&self) -> Result<usize>;

    /// Reads the properties of device `device_id`.
    fn properties(&self, device_id: usize) -> Result<DeviceDescriptor>;

    /// Creates a context on device `device_id`.
    fn open(&self, device_id: usize) -> Result<Self::Session>;
}

/// An exclusively owned device context.
pub trait DeviceSession {
    /// Loaded binary type; dropping it unloads the binary.
    type Module: LoadedModule;

    /// Makes this context current on the calling thread.
    ///
    /// Running the compiler as a subprocess can lose the current context,
    /// so this must be called again before any module or attribute query.
    fn make_current(&self) -> Result<()>;

    /// Loads a compiled binary.
    fn load(&self, binary: &Path) -> Result<Self::Module>;
}

/// A compiled binary loaded into a device context.
pub trait LoadedModule {
    /// Resource usage of entry point `kernel_name`, or `None` if the binary
    /// does not contain it.
    fn kernel_resources(&self, kernel_name: &str) -> Result<Option<ResourceSample>>;
}

/// Picks the device with the most global memory, lowest index on ties.
pub fn device_with_most_memory(devices: &[DeviceDescriptor]) -> Option<&DeviceDescriptor> {
    devices.iter().fold(None, |best, device| match best {
        Some(b) if b.total_global_memory >= device.total_global_memory => Some(b),
        _ => Some(device),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: usize, memory_gb: u64) -> DeviceDescriptor {
        DeviceDescriptor {
            device_id: id,
            name: format!("GPU {}", id),
            compute_capability: (6, 1),
            multiprocessor_count: 20,
            max_threads_per_block: 1024,
            max_threads_per_multiprocessor: 2048,
            registers_per_block: 65536,
            shared_mem_per_multiprocessor: 96 * 1024,
            total_global_memory: memory_gb << 30,
        }
    }

    #[test]
    fn test_most_memory_prefers_first_on_tie() {
        let devices = vec![device(0, 8), device(1, 12), device(2, 12)];
        assert_eq!(device_with_most_memory(&devices).unwrap().device_id, 1);
        assert!(device_with_most_memory(&[]).is_none());
    }

    #[test]
    fn test_sm_arch() {
        let d = device(0, 8);
        assert_eq!(d.sm_arch(), "sm_61");
        assert_eq!(d.version_score(), 61);
    }
}
