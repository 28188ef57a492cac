//! Empirical kernel resource profiling.
//!
//! There is no API to ask how much shared memory a generated kernel needs at
//! an arbitrary block size, so the model is generated and compiled twice, at
//! one and two warps, and the resource usage of each compiled kernel is read
//! back from the loaded binaries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::{DeviceDescriptor, DeviceSession, LoadedModule};
use crate::error::Result;
use crate::kernel::{BlockSizeAssignment, KernelCategory, ResourceSample, WARP_SIZE};

/// Block sizes of the two profiling passes.
pub const PROBE_BLOCK_SIZES: [u32; 2] = [WARP_SIZE, WARP_SIZE * 2];

/// Generates kernel sources for a block size assignment.
pub trait SourceGenerator {
    /// Writes source modules into `output_dir` and returns their names.
    fn generate(&self, block_sizes: &BlockSizeAssignment, output_dir: &Path)
        -> Result<Vec<String>>;
}

/// Compiles one generated module into a loadable binary.
pub trait KernelCompiler {
    /// Compiles module `module` in `output_dir` for `device` and returns the
    /// binary path. A non-zero compiler exit is a `BuildFailure`.
    fn compile(&self, device: &DeviceDescriptor, output_dir: &Path, module: &str)
        -> Result<PathBuf>;
}

/// Resource usage of every kernel found at one probe block size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeProfile {
    /// Block size every kernel was generated with.
    pub block_size: u32,
    /// Kernels present in the compiled model.
    pub samples: BTreeMap<KernelCategory, ResourceSample>,
}

impl ProbeProfile {
    /// Creates an empty profile.
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            samples: BTreeMap::new(),
        }
    }

    /// Builder method to record a kernel sample.
    #[must_use]
    pub fn with_sample(mut self, kernel: KernelCategory, sample: ResourceSample) -> Self {
        self.samples.insert(kernel, sample);
        self
    }

    /// Sample for `kernel`, if present.
    pub fn sample(&self, kernel: KernelCategory) -> Option<ResourceSample> {
        self.samples.get(&kernel).copied()
    }
}

/// The two probe profiles of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePair {
    /// Profile at the smaller probe block size.
    pub first: ProbeProfile,
    /// Profile at the larger probe block size.
    pub second: ProbeProfile,
}

impl ProbePair {
    /// Pairs two profiles.
    pub fn new(first: ProbeProfile, second: ProbeProfile) -> Self {
        Self { first, second }
    }

    /// Samples at both probes for `kernel`.
    ///
    /// A kernel must be present in both compilations to be optimized.
    pub fn samples(&self, kernel: KernelCategory) -> Option<(ResourceSample, ResourceSample)> {
        Some((self.first.sample(kernel)?, self.second.sample(kernel)?))
    }

    /// Kernels present in both profiles.
    pub fn kernels(&self) -> impl Iterator<Item = KernelCategory> + '_ {
        self.first
            .samples
            .keys()
            .copied()
            .filter(|k| self.second.samples.contains_key(k))
    }

    /// Kernels found in only one profile, with the block size of the probe
    /// that found them.
    pub fn unmatched(&self) -> Vec<(KernelCategory, u32)> {
        let only_in = |found: &ProbeProfile, other: &ProbeProfile| {
            found
                .samples
                .keys()
                .filter(|k| !other.samples.contains_key(k))
                .map(|&k| (k, found.block_size))
                .collect::<Vec<_>>()
        };

        let mut unmatched = only_in(&self.first, &self.second);
        unmatched.extend(only_in(&self.second, &self.first));
        unmatched
    }
}

/// Generates, compiles and inspects the model's kernels on one device.
pub struct KernelProfiler<'a, G, C> {
    generator: &'a G,
    compiler: &'a C,
    output_dir: &'a Path,
}

impl<'a, G: SourceGenerator, C: KernelCompiler> KernelProfiler<'a, G, C> {
    /// Creates a profiler writing generated code into `output_dir`.
    pub fn new(generator: &'a G, compiler: &'a C, output_dir: &'a Path) -> Self {
        Self {
            generator,
            compiler,
            output_dir,
        }
    }

    /// Profiles every kernel with all block sizes set to `probe_block_size`.
    pub fn profile<S: DeviceSession>(
        &self,
        device: &DeviceDescriptor,
        session: &S,
        probe_block_size: u32,
    ) -> Result<ProbeProfile> {
        tracing::debug!(
            device = device.device_id,
            block_size = probe_block_size,
            "Generating code"
        );

        std::fs::create_dir_all(self.output_dir)?;
        let block_sizes = BlockSizeAssignment::uniform(probe_block_size);
        let modules = self.generator.generate(&block_sizes, self.output_dir)?;

        session.make_current()?;

        let mut profile = ProbeProfile::new(probe_block_size);
        for module_name in &modules {
            let binary = self.compiler.compile(device, self.output_dir, module_name)?;
            let module = session.load(&binary)?;

            for kernel in KernelCategory::ALL {
                let Some(sample) = module.kernel_resources(kernel.kernel_name())? else {
                    continue;
                };

                tracing::debug!(
                    kernel = kernel.kernel_name(),
                    module = %module_name,
                    registers = sample.registers,
                    shared_mem_bytes = sample.shared_mem_bytes,
                    "Kernel found"
                );
                profile.samples.entry(kernel).or_insert(sample);
            }
        }

        Ok(profile)
    }

    /// Runs both probe passes.
    pub fn profile_pair<S: DeviceSession>(
        &self,
        device: &DeviceDescriptor,
        session: &S,
    ) -> Result<ProbePair> {
        let first = self.profile(device, session, PROBE_BLOCK_SIZES[0])?;
        let second = self.profile(device, session, PROBE_BLOCK_SIZES[1])?;

        let pair = ProbePair::new(first, second);
        for (kernel, block_size) in pair.unmatched() {
            tracing::warn!(
                kernel = kernel.kernel_name(),
                block_size,
                "Kernel only present in one probe, skipping"
            );
        }

        Ok(pair)
    }
}
