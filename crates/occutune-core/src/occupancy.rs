//! Occupancy-driven block size search.
//!
//! For each kernel found by the profiler the search walks block sizes from
//! one warp upwards and estimates how many blocks of that size can be
//! resident on a multiprocessor given the device limits, the architecture's
//! allocation granularities and the kernel's register and shared memory
//! usage.
//!
//! Two outcomes are possible per kernel:
//! - the *small workload* case, where the whole workload already fits on the
//!   device at once; the first (smallest) such block size is taken;
//! - otherwise the block size with the highest estimated occupancy.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::arch::{ArchitectureProfile, RegisterAllocation};
use crate::device::DeviceDescriptor;
use crate::kernel::{BlockSizeAssignment, KernelCategory, ResourceSample, WARP_SIZE};
use crate::profiler::ProbePair;
use crate::workload::{required_blocks, WorkloadGroups};

/// Shared memory per block modelled as `slope * block_threads + intercept`.
///
/// The fit is done in `i128` so any pair of `u64` samples is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMemModel {
    /// Bytes per thread.
    pub slope: i128,
    /// Bytes per block independent of block size.
    pub intercept: i128,
}

impl SharedMemModel {
    /// Fits the model through two `(block_threads, bytes)` samples.
    #[must_use]
    pub fn fit(first: (u32, u64), second: (u32, u64)) -> Self {
        let (b1, s1) = (i128::from(first.0), i128::from(first.1));
        let (b2, s2) = (i128::from(second.0), i128::from(second.1));
        let slope = if b2 == b1 { 0 } else { (s2 - s1) / (b2 - b1) };
        Self {
            slope,
            intercept: s1 - slope * b1,
        }
    }

    /// Estimated bytes for a block of `block_threads`, clamped to `0..=u64::MAX`.
    #[must_use]
    pub fn estimate(&self, block_threads: u32) -> u64 {
        let bytes = self
            .slope
            .saturating_mul(i128::from(block_threads))
            .saturating_add(self.intercept);
        u64::try_from(bytes.max(0)).unwrap_or(u64::MAX)
    }
}

/// Rounds `value` up to a multiple of `granularity`.
#[must_use]
pub fn pad_size(value: u64, granularity: u64) -> u64 {
    if granularity == 0 {
        value
    } else {
        value.div_ceil(granularity).saturating_mul(granularity)
    }
}

/// Estimate for one candidate block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateEstimate {
    /// Threads per block.
    pub block_size: u32,
    /// Shared memory per block, padded to the allocation granularity.
    pub shared_mem_bytes: u64,
    /// Blocks needed to cover every workload group.
    pub required_blocks: u64,
    /// Blocks of this size resident on one multiprocessor.
    pub sm_block_limit: u64,
    /// Resident warps across the device.
    pub occupancy: u64,
}

impl CandidateEstimate {
    /// True if every required block can be resident at once.
    #[must_use]
    pub fn fits_concurrently(&self, multiprocessor_count: u32) -> bool {
        self.required_blocks <= self.sm_block_limit * u64::from(multiprocessor_count)
    }
}

/// Blocks of `block_size` threads that fit on one multiprocessor.
#[must_use]
pub fn sm_block_limit(
    device: &DeviceDescriptor,
    arch: &ArchitectureProfile,
    block_size: u32,
    registers: u32,
    shared_mem_bytes: u64,
) -> u64 {
    let block_warps = u64::from(block_size / WARP_SIZE);

    let mut limit = u64::from(device.max_threads_per_multiprocessor / block_size.max(1));
    limit = limit.min(u64::from(arch.max_blocks_per_sm));

    // Per-warp allocation applies no block-level register correction.
    if arch.register_allocation == RegisterAllocation::PerBlock {
        let padded_warps = pad_size(block_warps, u64::from(arch.warp_alloc_granularity));
        let padded_regs = pad_size(
            padded_warps * u64::from(registers) * u64::from(WARP_SIZE),
            u64::from(arch.reg_alloc_granularity),
        );
        if padded_regs != 0 {
            limit = limit.min(u64::from(device.registers_per_block) / padded_regs);
        }
    }

    if shared_mem_bytes != 0 {
        limit = limit.min(device.shared_mem_per_multiprocessor / shared_mem_bytes);
    }

    limit
}

/// Estimates occupancy of one kernel at `block_size`.
#[must_use]
pub fn estimate_candidate(
    device: &DeviceDescriptor,
    arch: &ArchitectureProfile,
    groups: &[u64],
    registers: u32,
    shared_mem: &SharedMemModel,
    block_size: u32,
) -> CandidateEstimate {
    let shared_mem_bytes = pad_size(shared_mem.estimate(block_size), arch.smem_alloc_granularity);
    let required = required_blocks(groups, block_size);
    let limit = sm_block_limit(device, arch, block_size, registers, shared_mem_bytes);
    let occupancy =
        u64::from(block_size / WARP_SIZE) * limit * u64::from(device.multiprocessor_count);

    CandidateEstimate {
        block_size,
        shared_mem_bytes,
        required_blocks: required,
        sm_block_limit: limit,
        occupancy,
    }
}

/// Best configuration found for one kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OptimizationRecord {
    /// Whole workload fits on the device at the chosen block size.
    pub small_workload: bool,
    /// Estimated occupancy at the chosen block size.
    pub occupancy: u64,
}

/// Block sizes and per-kernel records of one device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OptimizationOutcome {
    /// Chosen block size per kernel; zero for kernels not present.
    pub block_sizes: BlockSizeAssignment,
    /// Records for every kernel present in the compiled model.
    pub records: BTreeMap<KernelCategory, OptimizationRecord>,
}

impl OptimizationOutcome {
    /// Sum of per-kernel occupancy.
    #[must_use]
    pub fn total_occupancy(&self) -> u64 {
        self.records.values().map(|r| r.occupancy).sum()
    }

    /// Number of kernels that hit the small workload case.
    #[must_use]
    pub fn small_workload_count(&self) -> usize {
        self.records.values().filter(|r| r.small_workload).count()
    }
}

/// Searches the block size of one kernel.
///
/// Returns the chosen block size, zero if no candidate had any occupancy.
#[must_use]
pub fn optimize_kernel(
    device: &DeviceDescriptor,
    arch: &ArchitectureProfile,
    groups: &[u64],
    probes: (ResourceSample, ResourceSample),
    probe_block_sizes: (u32, u32),
) -> (u32, OptimizationRecord) {
    // Registers are per-thread, so the first probe is representative.
    let registers = probes.0.registers;
    let shared_mem = SharedMemModel::fit(
        (probe_block_sizes.0, probes.0.shared_mem_bytes),
        (probe_block_sizes.1, probes.1.shared_mem_bytes),
    );

    let mut best_size = 0;
    let mut record = OptimizationRecord::default();

    let max_block_warps = device.max_threads_per_block / WARP_SIZE;
    for block_warps in 1..max_block_warps {
        let block_size = block_warps * WARP_SIZE;
        let candidate = estimate_candidate(device, arch, groups, registers, &shared_mem, block_size);

        tracing::debug!(
            block_size,
            shared_mem_bytes = candidate.shared_mem_bytes,
            required_blocks = candidate.required_blocks,
            sm_block_limit = candidate.sm_block_limit,
            occupancy = candidate.occupancy,
            "Candidate block size"
        );

        if candidate.fits_concurrently(device.multiprocessor_count) {
            best_size = block_size;
            record = OptimizationRecord {
                small_workload: true,
                occupancy: candidate.occupancy,
            };
            tracing::debug!(block_size, "Small model situation detected");
            break;
        } else if candidate.occupancy > record.occupancy {
            best_size = block_size;
            record.occupancy = candidate.occupancy;
        }
    }

    (best_size, record)
}

/// Chooses block sizes for every kernel present in both probe profiles.
#[must_use]
pub fn optimize_block_sizes(
    device: &DeviceDescriptor,
    arch: &ArchitectureProfile,
    workload: &WorkloadGroups,
    probes: &ProbePair,
) -> OptimizationOutcome {
    let mut outcome = OptimizationOutcome::default();
    let probe_block_sizes = (probes.first.block_size, probes.second.block_size);

    for kernel in probes.kernels() {
        let Some(samples) = probes.samples(kernel) else {
            continue;
        };

        let (block_size, record) = optimize_kernel(
            device,
            arch,
            workload.groups(kernel),
            samples,
            probe_block_sizes,
        );

        tracing::info!(
            device = device.device_id,
            kernel = kernel.kernel_name(),
            block_size,
            occupancy = record.occupancy,
            small_workload = record.small_workload,
            "Optimized block size"
        );

        outcome.block_sizes.set(kernel, block_size);
        outcome.records.insert(kernel, record);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ProbeProfile;

    fn pascal(sm_count: u32) -> DeviceDescriptor {
        DeviceDescriptor {
            device_id: 0,
            name: "GTX 1080".to_string(),
            compute_capability: (6, 1),
            multiprocessor_count: sm_count,
            max_threads_per_block: 1024,
            max_threads_per_multiprocessor: 2048,
            registers_per_block: 65536,
            shared_mem_per_multiprocessor: 96 * 1024,
            total_global_memory: 8 << 30,
        }
    }

    fn probes(kernel: KernelCategory, regs: u32, smem: (u64, u64)) -> ProbePair {
        ProbePair::new(
            ProbeProfile::new(32).with_sample(kernel, ResourceSample::new(regs, smem.0)),
            ProbeProfile::new(64).with_sample(kernel, ResourceSample::new(regs, smem.1)),
        )
    }

    #[test]
    fn test_shared_mem_fit() {
        let model = SharedMemModel::fit((32, 256), (64, 512));
        assert_eq!(model.slope, 8);
        assert_eq!(model.intercept, 0);
        assert_eq!(model.estimate(128), 1024);

        let fixed = SharedMemModel::fit((32, 100), (64, 100));
        assert_eq!(fixed.slope, 0);
        assert_eq!(fixed.estimate(1024), 100);
    }

    #[test]
    fn test_shared_mem_fit_saturates() {
        let model = SharedMemModel::fit((32, 0), (64, u64::MAX));
        assert_eq!(model.estimate(32), 0);
        assert_eq!(model.estimate(1024), u64::MAX);
        assert_eq!(pad_size(u64::MAX, 256), u64::MAX);

        let shrinking = SharedMemModel::fit((32, u64::MAX), (64, 0));
        assert_eq!(shrinking.estimate(1024), 0);
    }

    #[test]
    fn test_huge_shared_memory_sample_does_not_overflow() {
        let device = pascal(20);
        let arch = ArchitectureProfile::lookup(6, 1);

        let (size, record) = optimize_kernel(
            &device,
            &arch,
            &[u64::from(u32::MAX)],
            (ResourceSample::new(32, 0), ResourceSample::new(32, 1u64 << 62)),
            (32, 64),
        );

        // Only one warp per block needs no shared memory; larger blocks fit none.
        assert_eq!(size, 32);
        assert!(!record.small_workload);
        assert_eq!(record.occupancy, 32 * 20);
    }

    #[test]
    fn test_pad_size() {
        assert_eq!(pad_size(0, 256), 0);
        assert_eq!(pad_size(1, 256), 256);
        assert_eq!(pad_size(256, 256), 256);
        assert_eq!(pad_size(7, 4), 8);
    }

    #[test]
    fn test_end_to_end_sm61_single_group() {
        let device = pascal(20);
        let arch = ArchitectureProfile::lookup(6, 1);
        let workload = WorkloadGroups::new().with_group(KernelCategory::NeuronUpdate, 1000);
        let probes = probes(KernelCategory::NeuronUpdate, 32, (0, 0));

        let outcome = optimize_block_sizes(&device, &arch, &workload, &probes);

        // 32 threads: 32 blocks needed, min(2048/32, 32) * 20 = 640 resident.
        assert_eq!(outcome.block_sizes.get(KernelCategory::NeuronUpdate), 32);
        let record = outcome.records[&KernelCategory::NeuronUpdate];
        assert!(record.small_workload);
        assert_eq!(record.occupancy, 32 * 20);
        assert_eq!(outcome.block_sizes.get(KernelCategory::Initialize), 0);
        assert_eq!(outcome.small_workload_count(), 1);
    }

    #[test]
    fn test_small_workload_selects_smallest_candidate() {
        let device = pascal(1);
        let arch = ArchitectureProfile::lookup(6, 1);
        // 32 groups of one warp each: exactly one SM's capacity at 32 threads.
        let groups = vec![32; 32];
        let (size, record) = optimize_kernel(
            &device,
            &arch,
            &groups,
            (ResourceSample::new(16, 0), ResourceSample::new(16, 0)),
            (32, 64),
        );
        assert_eq!(size, 32);
        assert!(record.small_workload);
    }

    #[test]
    fn test_large_workload_maximizes_occupancy() {
        let device = pascal(2);
        let arch = ArchitectureProfile::lookup(6, 1);
        let groups = [10_000_000];
        let (size, record) = optimize_kernel(
            &device,
            &arch,
            &groups,
            (ResourceSample::new(32, 0), ResourceSample::new(32, 0)),
            (32, 64),
        );
        // 32 blocks/SM cap hits 2048 threads/SM from 64 threads upwards;
        // 64 is the first block size reaching the maximum of 64 warps/SM.
        assert!(!record.small_workload);
        assert_eq!(size, 64);
        assert_eq!(record.occupancy, 64 * 2);
    }

    #[test]
    fn test_shared_memory_reduces_block_limit() {
        let device = pascal(1);
        let arch = ArchitectureProfile::lookup(6, 1);
        let unconstrained = sm_block_limit(&device, &arch, 256, 32, 0);
        let constrained = sm_block_limit(
            &device,
            &arch,
            256,
            32,
            device.shared_mem_per_multiprocessor + 256,
        );
        assert_eq!(unconstrained, 8);
        assert!(constrained < unconstrained);
        assert_eq!(constrained, 0);
    }

    #[test]
    fn test_per_block_register_limit() {
        let mut device = pascal(1);
        device.compute_capability = (1, 3);
        device.registers_per_block = 16384;
        let arch = ArchitectureProfile::lookup(1, 3);

        // 2 warps padded to 2, 2 * 32 regs * 32 threads = 2048 regs per block.
        assert_eq!(sm_block_limit(&device, &arch, 64, 32, 0), 8);
        // 8 warps: 8192 regs per block, 16384 / 8192 = 2.
        assert_eq!(sm_block_limit(&device, &arch, 256, 32, 0), 2);

        // Per-warp architectures ignore the register budget.
        let pascal_arch = ArchitectureProfile::lookup(6, 1);
        assert_eq!(sm_block_limit(&device, &pascal_arch, 256, 32, 0), 8);
    }

    #[test]
    fn test_absent_kernels_stay_zero() {
        let device = pascal(20);
        let arch = ArchitectureProfile::lookup(6, 1);
        let workload = WorkloadGroups::new()
            .with_group(KernelCategory::NeuronUpdate, 100)
            .with_group(KernelCategory::PresynapticUpdate, 100);
        let probes = probes(KernelCategory::NeuronUpdate, 16, (0, 0));

        let outcome = optimize_block_sizes(&device, &arch, &workload, &probes);
        assert_eq!(outcome.block_sizes.get(KernelCategory::PresynapticUpdate), 0);
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn test_candidates_stop_below_max_threads_per_block() {
        let device = pascal(1);
        let arch = ArchitectureProfile::lookup(6, 1);
        // Occupancy only grows with block size when shared memory is fixed
        // per thread and the workload never fits.
        let (size, record) = optimize_kernel(
            &device,
            &arch,
            &[u64::from(u32::MAX)],
            (ResourceSample::new(8, 32 * 4), ResourceSample::new(8, 64 * 4)),
            (32, 64),
        );
        assert!(!record.small_workload);
        assert!(size < device.max_threads_per_block);
        assert_eq!(size % WARP_SIZE, 0);
    }
}
