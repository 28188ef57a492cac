//! # occutune core
//!
//! Block size optimization and device selection for generated simulation
//! kernels.
//!
//! The kernels of a model are generated and compiled twice, at one and two
//! warps per block, and their register and shared memory usage is read back
//! from the compiled binaries. From those two samples the optimizer estimates
//! occupancy for every block size the device supports and picks, per kernel,
//! either the smallest block size at which the whole workload is resident at
//! once or the one with the highest occupancy.
//!
//! ## Pipeline
//!
//! - [`compute_workload_groups`] - group sizes per kernel from the model
//! - [`KernelProfiler`] - generate, compile and inspect kernels on a device
//! - [`optimize_block_sizes`] - occupancy search per kernel
//! - [`DeviceSelector`] - rank devices and return the winner
//!
//! Code generation, compilation and device access are behind the
//! [`SourceGenerator`], [`KernelCompiler`] and [`DevicePlatform`] traits.
//!
//! ## Example
//!
//! ```ignore
//! use occutune_core::prelude::*;
//!
//! let model = ModelTopology::from_path("model.toml".as_ref())?;
//! let config = TunerConfig::default();
//! let selection = select_device(
//!     &model,
//!     &DeclaredThreadSizing,
//!     &platform,
//!     &generator,
//!     &compiler,
//!     &config,
//! )?;
//! println!("device {}: {}", selection.device_id, selection.block_sizes);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arch;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod model;
pub mod occupancy;
pub mod profiler;
pub mod selector;
pub mod workload;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::arch::{ArchitectureProfile, RegisterAllocation};
    pub use crate::config::{NvccConfig, TunerConfig, TunerConfigBuilder};
    pub use crate::device::{DeviceDescriptor, DevicePlatform, DeviceSession, LoadedModule};
    pub use crate::error::{Result, TuneError};
    pub use crate::kernel::{BlockSizeAssignment, KernelCategory, ResourceSample, WARP_SIZE};
    pub use crate::model::{
        Connectivity, DeclaredThreads, ModelTopology, NeuronPopulation, SynapseProjection,
        WeightStorage,
    };
    pub use crate::occupancy::{optimize_block_sizes, OptimizationOutcome, OptimizationRecord};
    pub use crate::profiler::{
        KernelCompiler, KernelProfiler, ProbePair, ProbeProfile, SourceGenerator,
        PROBE_BLOCK_SIZES,
    };
    pub use crate::selector::{select_device, DeviceRanking, DeviceSelection, DeviceSelector};
    pub use crate::workload::{
        compute_workload_groups, DeclaredThreadSizing, ThreadSizing, WorkloadGroups,
    };
}

pub use arch::ArchitectureProfile;
pub use config::{NvccConfig, TunerConfig, TunerConfigBuilder};
pub use device::{DeviceDescriptor, DevicePlatform, DeviceSession, LoadedModule};
pub use error::{Result, TuneError};
pub use kernel::{BlockSizeAssignment, KernelCategory, ResourceSample, WARP_SIZE};
pub use model::ModelTopology;
pub use occupancy::{optimize_block_sizes, OptimizationOutcome, OptimizationRecord};
pub use profiler::{KernelCompiler, KernelProfiler, ProbePair, ProbeProfile, SourceGenerator};
pub use selector::{select_device, DeviceRanking, DeviceSelection, DeviceSelector};
pub use workload::{compute_workload_groups, DeclaredThreadSizing, ThreadSizing, WorkloadGroups};
