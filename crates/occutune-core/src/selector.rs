//! Device selection.
//!
//! With automatic selection every visible device is profiled and optimized,
//! and devices are ranked by, in order:
//! 1. number of kernels whose whole workload fits on the device at once,
//! 2. total estimated occupancy,
//! 3. compute capability (`major * 10 + minor`),
//! 4. enumeration order.
//!
//! Otherwise the device with the most global memory is used and only that
//! device is optimized.

use serde::Serialize;

use crate::arch::ArchitectureProfile;
use crate::config::TunerConfig;
use crate::device::{device_with_most_memory, DeviceDescriptor, DevicePlatform};
use crate::error::{Result, TuneError};
use crate::kernel::BlockSizeAssignment;
use crate::model::ModelTopology;
use crate::occupancy::{optimize_block_sizes, OptimizationOutcome};
use crate::profiler::{KernelCompiler, KernelProfiler, SourceGenerator};
use crate::workload::{compute_workload_groups, ThreadSizing, WorkloadGroups};

/// Comparison data for one optimized device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRanking {
    /// Device ordinal.
    pub device_id: usize,
    /// `major * 10 + minor`.
    pub version_score: u32,
    /// Sum of per-kernel occupancy.
    pub total_occupancy: u64,
    /// Kernels that hit the small workload case.
    pub small_workload_count: usize,
    /// Optimized block sizes on this device.
    pub block_sizes: BlockSizeAssignment,
}

impl DeviceRanking {
    /// Builds the ranking of `device` from its optimization outcome.
    pub fn from_outcome(device: &DeviceDescriptor, outcome: &OptimizationOutcome) -> Self {
        Self {
            device_id: device.device_id,
            version_score: device.version_score(),
            total_occupancy: outcome.total_occupancy(),
            small_workload_count: outcome.small_workload_count(),
            block_sizes: outcome.block_sizes,
        }
    }

    /// Lexicographic ranking key; larger is better.
    pub fn rank_key(&self) -> (usize, u64, u32) {
        (
            self.small_workload_count,
            self.total_occupancy,
            self.version_score,
        )
    }
}

/// Picks the best ranking; the first one wins exact ties.
pub fn best_ranking(rankings: &[DeviceRanking]) -> Option<&DeviceRanking> {
    rankings.iter().fold(None, |best, ranking| match best {
        Some(b) if b.rank_key() >= ranking.rank_key() => Some(b),
        _ => Some(ranking),
    })
}

/// Result of device selection handed to backend construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSelection {
    /// Chosen device ordinal.
    pub device_id: usize,
    /// Block sizes for the chosen device.
    pub block_sizes: BlockSizeAssignment,
    /// Rankings of every optimized device.
    pub rankings: Vec<DeviceRanking>,
}

/// Optimizes block sizes on the devices of a platform.
pub struct DeviceSelector<'a, P, G, C> {
    platform: &'a P,
    profiler: KernelProfiler<'a, G, C>,
}

impl<'a, P, G, C> DeviceSelector<'a, P, G, C>
where
    P: DevicePlatform,
    G: SourceGenerator,
    C: KernelCompiler,
{
    /// Creates a selector.
    pub fn new(platform: &'a P, profiler: KernelProfiler<'a, G, C>) -> Self {
        Self { platform, profiler }
    }

    /// Profiles and optimizes a single device.
    pub fn optimize_device(
        &self,
        device_id: usize,
        workload: &WorkloadGroups,
    ) -> Result<(DeviceDescriptor, OptimizationOutcome)> {
        let device = self.platform.properties(device_id)?;

        let probes = {
            let session = self.platform.open(device_id)?;
            self.profiler.profile_pair(&device, &session)?
        };

        let (major, minor) = device.compute_capability;
        let arch = ArchitectureProfile::lookup(major, minor);
        let outcome = optimize_block_sizes(&device, &arch, workload, &probes);
        Ok((device, outcome))
    }

    /// Selects a device and its block sizes.
    pub fn select(&self, workload: &WorkloadGroups, auto_choose: bool) -> Result<DeviceSelection> {
        let device_count = self.platform.device_count()?;
        if device_count == 0 {
            return Err(TuneError::NoDeviceFound);
        }

        if auto_choose {
            self.select_optimal(workload, device_count)
        } else {
            self.select_most_memory(workload, device_count)
        }
    }

    fn select_optimal(&self, workload: &WorkloadGroups, device_count: usize) -> Result<DeviceSelection> {
        let mut rankings = Vec::with_capacity(device_count);
        for device_id in 0..device_count {
            let (device, outcome) = self.optimize_device(device_id, workload)?;
            let ranking = DeviceRanking::from_outcome(&device, &outcome);

            tracing::debug!(
                device = device_id,
                total_occupancy = ranking.total_occupancy,
                small_workload_kernels = ranking.small_workload_count,
                sm_version = ranking.version_score,
                "Device optimized"
            );
            rankings.push(ranking);
        }

        let best = best_ranking(&rankings)
            .cloned()
            .ok_or(TuneError::NoDeviceFound)?;

        tracing::info!(
            device = best.device_id,
            total_occupancy = best.total_occupancy,
            small_workload_kernels = best.small_workload_count,
            sm_version = best.version_score,
            "Optimal device selected"
        );

        Ok(DeviceSelection {
            device_id: best.device_id,
            block_sizes: best.block_sizes,
            rankings,
        })
    }

    fn select_most_memory(
        &self,
        workload: &WorkloadGroups,
        device_count: usize,
    ) -> Result<DeviceSelection> {
        let devices = (0..device_count)
            .map(|id| self.platform.properties(id))
            .collect::<Result<Vec<_>>>()?;
        let best = device_with_most_memory(&devices).ok_or(TuneError::NoDeviceFound)?;
        let device_id = best.device_id;

        tracing::info!(
            device = device_id,
            total_global_memory = best.total_global_memory,
            "Using device with most global memory"
        );

        let (device, outcome) = self.optimize_device(device_id, workload)?;
        let ranking = DeviceRanking::from_outcome(&device, &outcome);
        Ok(DeviceSelection {
            device_id,
            block_sizes: outcome.block_sizes,
            rankings: vec![ranking],
        })
    }
}

/// Sizes the model's workload and selects a device for it.
pub fn select_device<P, G, C, T>(
    model: &ModelTopology,
    sizing: &T,
    platform: &P,
    generator: &G,
    compiler: &C,
    config: &TunerConfig,
) -> Result<DeviceSelection>
where
    P: DevicePlatform,
    G: SourceGenerator,
    C: KernelCompiler,
    T: ThreadSizing,
{
    let workload = compute_workload_groups(model, sizing)?;
    let profiler = KernelProfiler::new(generator, compiler, &config.output_dir);
    DeviceSelector::new(platform, profiler).select(&workload, config.auto_choose_device)
}
