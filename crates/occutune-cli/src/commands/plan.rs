//! `occutune plan` command - Optimize block sizes from recorded probe data.
//!
//! A plan file holds everything the optimizer needs without a GPU:
//!
//! ```toml
//! [device]
//! device_id = 0
//! name = "GTX 1080"
//! compute_capability = [6, 1]
//! multiprocessor_count = 20
//! max_threads_per_block = 1024
//! max_threads_per_multiprocessor = 2048
//! registers_per_block = 65536
//! shared_mem_per_multiprocessor = 98304
//! total_global_memory = 8589934592
//!
//! [[model.neuron_populations]]
//! name = "exc"
//! size = 1000
//!
//! [[kernels]]
//! kernel = "neuron_update"
//! registers = 32
//! shared_mem_bytes = [0, 0]
//! ```
//!
//! `shared_mem_bytes` lists the static shared memory measured at each probe
//! block size.

use std::path::Path;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use occutune_core::arch::ArchitectureProfile;
use occutune_core::device::DeviceDescriptor;
use occutune_core::kernel::{KernelCategory, ResourceSample};
use occutune_core::model::ModelTopology;
use occutune_core::occupancy::{optimize_block_sizes, OptimizationOutcome};
use occutune_core::profiler::{ProbePair, ProbeProfile, PROBE_BLOCK_SIZES};
use occutune_core::workload::{compute_workload_groups, DeclaredThreadSizing, WorkloadGroups};

use crate::error::CliResult;

use super::{print_assignment, print_json, print_outcome, read_structured, OutputFormat};

/// Measured resources of one kernel at both probe sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelUsage {
    /// Kernel category.
    pub kernel: KernelCategory,
    /// Registers per thread.
    pub registers: u32,
    /// Static shared memory at the first and second probe block size.
    #[serde(default)]
    pub shared_mem_bytes: [u64; 2],
}

/// Offline optimization input.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    /// Target device.
    pub device: DeviceDescriptor,
    /// Model to size the workload from.
    #[serde(default)]
    pub model: ModelTopology,
    /// Probe block sizes the kernel usage was measured at.
    #[serde(default = "default_probe_block_sizes")]
    pub probe_block_sizes: [u32; 2],
    /// Kernels present in the compiled model.
    #[serde(default)]
    pub kernels: Vec<KernelUsage>,
}

fn default_probe_block_sizes() -> [u32; 2] {
    PROBE_BLOCK_SIZES
}

impl PlanFile {
    /// Builds the probe profiles recorded in the plan.
    pub fn probes(&self) -> ProbePair {
        let [first_size, second_size] = self.probe_block_sizes;
        let mut first = ProbeProfile::new(first_size);
        let mut second = ProbeProfile::new(second_size);

        for usage in &self.kernels {
            first = first.with_sample(
                usage.kernel,
                ResourceSample::new(usage.registers, usage.shared_mem_bytes[0]),
            );
            second = second.with_sample(
                usage.kernel,
                ResourceSample::new(usage.registers, usage.shared_mem_bytes[1]),
            );
        }

        ProbePair::new(first, second)
    }
}

/// Result of an offline optimization.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Target device.
    pub device: DeviceDescriptor,
    /// Constants used for the device.
    pub architecture: ArchitectureProfile,
    /// Workload groups derived from the model.
    pub workload: WorkloadGroups,
    /// Chosen block sizes and per-kernel records.
    pub outcome: OptimizationOutcome,
}

/// Runs the optimizer over a plan.
pub fn run(plan: &PlanFile) -> CliResult<PlanReport> {
    let workload = compute_workload_groups(&plan.model, &DeclaredThreadSizing)?;
    let (major, minor) = plan.device.compute_capability;
    let architecture = ArchitectureProfile::lookup(major, minor);
    let outcome = optimize_block_sizes(&plan.device, &architecture, &workload, &plan.probes());

    Ok(PlanReport {
        device: plan.device.clone(),
        architecture,
        workload,
        outcome,
    })
}

/// Execute the `plan` command.
pub fn execute(file: &Path, format: OutputFormat) -> CliResult<()> {
    let plan: PlanFile = read_structured(file)?;
    let report = run(&plan)?;

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "{} Optimizing for {} ({}, {} SMs)",
        "→".bright_cyan(),
        report.device.name.bright_yellow(),
        report.device.sm_arch(),
        report.device.multiprocessor_count
    );
    println!();
    print_outcome(&report.outcome);
    print_assignment(&report.outcome.block_sizes);

    Ok(())
}
