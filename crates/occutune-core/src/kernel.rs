//! Kernel categories and per-kernel launch configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TuneError;

/// Hardware warp size assumed by the generated kernels.
pub const WARP_SIZE: u32 = 32;

/// A named compiled entry point with a fixed role in the simulation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelCategory {
    /// Neuron state update.
    NeuronUpdate,
    /// Spike propagation from presynaptic neurons.
    PresynapticUpdate,
    /// Postsynaptic learning.
    PostsynapticUpdate,
    /// Continuous synapse dynamics.
    SynapseDynamicsUpdate,
    /// Dense and neuron state initialization.
    Initialize,
    /// Sparse connectivity initialization.
    InitializeSparse,
    /// Per-timestep neuron spike queue reset.
    PreNeuronReset,
    /// Per-timestep synapse reset.
    PreSynapseReset,
}

impl KernelCategory {
    /// Number of kernel categories.
    pub const COUNT: usize = 8;

    /// All categories in launch order.
    pub const ALL: [KernelCategory; Self::COUNT] = [
        KernelCategory::NeuronUpdate,
        KernelCategory::PresynapticUpdate,
        KernelCategory::PostsynapticUpdate,
        KernelCategory::SynapseDynamicsUpdate,
        KernelCategory::Initialize,
        KernelCategory::InitializeSparse,
        KernelCategory::PreNeuronReset,
        KernelCategory::PreSynapseReset,
    ];

    /// Symbol name of the compiled entry point.
    #[must_use]
    pub fn kernel_name(self) -> &'static str {
        match self {
            KernelCategory::NeuronUpdate => "updateNeuronsKernel",
            KernelCategory::PresynapticUpdate => "updatePresynapticKernel",
            KernelCategory::PostsynapticUpdate => "updatePostsynapticKernel",
            KernelCategory::SynapseDynamicsUpdate => "updateSynapseDynamicsKernel",
            KernelCategory::Initialize => "initializeKernel",
            KernelCategory::InitializeSparse => "initializeSparseKernel",
            KernelCategory::PreNeuronReset => "preNeuronResetKernel",
            KernelCategory::PreSynapseReset => "preSynapseResetKernel",
        }
    }

    /// Configuration key used in block size lists.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            KernelCategory::NeuronUpdate => "neuron_update",
            KernelCategory::PresynapticUpdate => "presynaptic_update",
            KernelCategory::PostsynapticUpdate => "postsynaptic_update",
            KernelCategory::SynapseDynamicsUpdate => "synapse_dynamics_update",
            KernelCategory::Initialize => "initialize",
            KernelCategory::InitializeSparse => "initialize_sparse",
            KernelCategory::PreNeuronReset => "pre_neuron_reset",
            KernelCategory::PreSynapseReset => "pre_synapse_reset",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for KernelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

impl FromStr for KernelCategory {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        KernelCategory::ALL
            .into_iter()
            .find(|k| k.key() == s || k.kernel_name() == s)
            .ok_or_else(|| TuneError::Config(format!("Unknown kernel category: {}", s)))
    }
}

/// Register and shared memory usage of one compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Registers per thread.
    pub registers: u32,
    /// Static shared memory per block in bytes.
    pub shared_mem_bytes: u64,
}

impl ResourceSample {
    /// Creates a new sample.
    #[must_use]
    pub fn new(registers: u32, shared_mem_bytes: u64) -> Self {
        Self {
            registers,
            shared_mem_bytes,
        }
    }
}

/// Block size chosen for every kernel category.
///
/// Zero marks a kernel that is unused or was not optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<KernelCategory, u32>",
    from = "BTreeMap<KernelCategory, u32>"
)]
pub struct BlockSizeAssignment {
    sizes: [u32; KernelCategory::COUNT],
}

impl BlockSizeAssignment {
    /// Creates an assignment with every kernel marked unused.
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Creates an assignment using `block_size` for every kernel.
    #[must_use]
    pub fn uniform(block_size: u32) -> Self {
        Self {
            sizes: [block_size; KernelCategory::COUNT],
        }
    }

    /// Block size for `kernel`.
    #[must_use]
    pub fn get(&self, kernel: KernelCategory) -> u32 {
        self.sizes[kernel.index()]
    }

    /// Sets the block size for `kernel`.
    pub fn set(&mut self, kernel: KernelCategory, block_size: u32) {
        self.sizes[kernel.index()] = block_size;
    }

    /// Iterates over every category and its block size.
    pub fn iter(&self) -> impl Iterator<Item = (KernelCategory, u32)> + '_ {
        KernelCategory::ALL.into_iter().map(|k| (k, self.get(k)))
    }

    /// Iterates over categories with a non-zero block size.
    pub fn assigned(&self) -> impl Iterator<Item = (KernelCategory, u32)> + '_ {
        self.iter().filter(|(_, size)| *size != 0)
    }
}

impl From<BlockSizeAssignment> for BTreeMap<KernelCategory, u32> {
    fn from(assignment: BlockSizeAssignment) -> Self {
        assignment.iter().collect()
    }
}

impl From<BTreeMap<KernelCategory, u32>> for BlockSizeAssignment {
    fn from(map: BTreeMap<KernelCategory, u32>) -> Self {
        let mut assignment = Self::zeroed();
        for (kernel, size) in map {
            assignment.set(kernel, size);
        }
        assignment
    }
}

/// Renders as `key=size,key=size,...` over every category.
impl fmt::Display for BlockSizeAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kernel, size) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}={}", kernel.key(), size)?;
        }
        Ok(())
    }
}

impl FromStr for BlockSizeAssignment {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut assignment = Self::zeroed();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                TuneError::Config(format!("Expected 'kernel=size', got '{}'", entry))
            })?;
            let kernel: KernelCategory = key.parse()?;
            let size: u32 = value.trim().parse().map_err(|_| {
                TuneError::Config(format!("Invalid block size for {}: '{}'", key, value))
            })?;
            if size % WARP_SIZE != 0 {
                return Err(TuneError::Config(format!(
                    "Block size {} for {} is not a multiple of the warp size",
                    size, key
                )));
            }
            assignment.set(kernel, size);
        }
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_are_unique() {
        let mut names: Vec<_> = KernelCategory::ALL.iter().map(|k| k.kernel_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), KernelCategory::COUNT);
    }

    #[test]
    fn test_category_from_either_name() {
        assert_eq!(
            "presynaptic_update".parse::<KernelCategory>().unwrap(),
            KernelCategory::PresynapticUpdate
        );
        assert_eq!(
            "initializeSparseKernel".parse::<KernelCategory>().unwrap(),
            KernelCategory::InitializeSparse
        );
        assert!("warpShuffleKernel".parse::<KernelCategory>().is_err());
    }

    #[test]
    fn test_assignment_parse_partial_list() {
        let assignment: BlockSizeAssignment = "neuron_update=64, pre_synapse_reset=32"
            .parse()
            .unwrap();
        assert_eq!(assignment.get(KernelCategory::NeuronUpdate), 64);
        assert_eq!(assignment.get(KernelCategory::PreSynapseReset), 32);
        assert_eq!(assignment.get(KernelCategory::Initialize), 0);
        assert_eq!(assignment.assigned().count(), 2);
    }

    #[test]
    fn test_assignment_rejects_non_warp_multiple() {
        assert!("neuron_update=48".parse::<BlockSizeAssignment>().is_err());
        assert!("neuron_update".parse::<BlockSizeAssignment>().is_err());
    }

    #[test]
    fn test_assignment_display_lists_every_kernel() {
        let rendered = BlockSizeAssignment::uniform(32).to_string();
        assert_eq!(rendered.split(',').count(), KernelCategory::COUNT);
        assert!(rendered.starts_with("neuron_update=32,"));
        let parsed: BlockSizeAssignment = rendered.parse().unwrap();
        assert_eq!(parsed, BlockSizeAssignment::uniform(32));
    }

    #[test]
    fn test_assignment_serializes_as_map() {
        let mut assignment = BlockSizeAssignment::zeroed();
        assignment.set(KernelCategory::NeuronUpdate, 128);
        let json = serde_json::to_value(assignment).unwrap();
        assert_eq!(json["neuron_update"], 128);
        assert_eq!(json["initialize"], 0);
    }
}
