//! Per-kernel workload sizing.
//!
//! Every kernel covers a sequence of independently sized groups (one per
//! neuron population, synapse projection, ...). Each group is padded to a
//! whole number of blocks by the generated code, so the number of blocks a
//! kernel launches is the sum of per-group ceiling divisions rather than
//! the ceiling of the total.
//!
//! The rules here must match the thread dispatch of the code generator.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, TuneError};
use crate::kernel::KernelCategory;
use crate::model::{Connectivity, ModelTopology, NeuronPopulation, SynapseProjection};

/// Thread counts the code generator launches for a synapse projection.
pub trait ThreadSizing {
    /// Threads used by the presynaptic update kernel.
    fn presynaptic_threads(
        &self,
        projection: &SynapseProjection,
        source: &NeuronPopulation,
        target: &NeuronPopulation,
    ) -> u64;

    /// Threads used by the postsynaptic update kernel.
    fn postsynaptic_threads(
        &self,
        projection: &SynapseProjection,
        source: &NeuronPopulation,
        target: &NeuronPopulation,
    ) -> u64;

    /// Threads used by the synapse dynamics kernel.
    fn synapse_dynamics_threads(
        &self,
        projection: &SynapseProjection,
        source: &NeuronPopulation,
        target: &NeuronPopulation,
    ) -> u64;
}

/// Uses the counts declared on each projection.
///
/// Undeclared counts fall back to one thread per postsynaptic neuron for
/// presynaptic updates, one per presynaptic neuron for postsynaptic updates
/// and one per synapse (dense) or per source row (sparse) for dynamics.
///
/// The sparse dynamics fallback is an approximation: the generated code
/// launches one thread per source neuron and row slot (source size times the
/// maximum row length), which the topology does not record. Declare
/// `synapse_dynamics` on sparse projections that have dynamics code.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredThreadSizing;

impl ThreadSizing for DeclaredThreadSizing {
    fn presynaptic_threads(
        &self,
        projection: &SynapseProjection,
        _source: &NeuronPopulation,
        target: &NeuronPopulation,
    ) -> u64 {
        projection
            .threads
            .presynaptic
            .unwrap_or(u64::from(target.size))
    }

    fn postsynaptic_threads(
        &self,
        projection: &SynapseProjection,
        source: &NeuronPopulation,
        _target: &NeuronPopulation,
    ) -> u64 {
        projection
            .threads
            .postsynaptic
            .unwrap_or(u64::from(source.size))
    }

    fn synapse_dynamics_threads(
        &self,
        projection: &SynapseProjection,
        source: &NeuronPopulation,
        target: &NeuronPopulation,
    ) -> u64 {
        projection
            .threads
            .synapse_dynamics
            .unwrap_or_else(|| match projection.connectivity {
                Connectivity::Dense => u64::from(source.size) * u64::from(target.size),
                Connectivity::Sparse => u64::from(source.size),
            })
    }
}

/// Group sizes each kernel must cover.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WorkloadGroups {
    groups: BTreeMap<KernelCategory, Vec<u64>>,
}

impl WorkloadGroups {
    /// Creates an empty workload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group of `size` threads to `kernel`.
    pub fn push(&mut self, kernel: KernelCategory, size: u64) {
        self.groups.entry(kernel).or_default().push(size);
    }

    /// Builder method to append a group.
    #[must_use]
    pub fn with_group(mut self, kernel: KernelCategory, size: u64) -> Self {
        self.push(kernel, size);
        self
    }

    /// Group sizes for `kernel`; empty if the kernel has no work.
    pub fn groups(&self, kernel: KernelCategory) -> &[u64] {
        self.groups.get(&kernel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories that have at least one group.
    pub fn kernels(&self) -> impl Iterator<Item = KernelCategory> + '_ {
        self.groups.keys().copied()
    }
}

/// Sum over groups of `ceil(group / block_size)`.
pub fn required_blocks(groups: &[u64], block_size: u32) -> u64 {
    let block_size = u64::from(block_size.max(1));
    groups
        .iter()
        .fold(0u64, |total, &size| total.saturating_add(size.div_ceil(block_size)))
}

/// Derives the workload of every kernel from the model topology.
pub fn compute_workload_groups(
    model: &ModelTopology,
    sizing: &impl ThreadSizing,
) -> Result<WorkloadGroups> {
    let mut workload = WorkloadGroups::new();

    for population in &model.neuron_populations {
        let size = u64::from(population.size);
        workload.push(KernelCategory::NeuronUpdate, size);

        if population.requires_device_init() {
            workload.push(KernelCategory::Initialize, size);
        }
    }

    for projection in &model.synapse_projections {
        let source = resolve(model, projection, &projection.source)?;
        let target = resolve(model, projection, &projection.target)?;

        workload.push(
            KernelCategory::PresynapticUpdate,
            sizing.presynaptic_threads(projection, source, target),
        );

        if projection.has_postsynaptic_learning() {
            workload.push(
                KernelCategory::PostsynapticUpdate,
                sizing.postsynaptic_threads(projection, source, target),
            );
            workload.push(
                KernelCategory::SynapseDynamicsUpdate,
                sizing.synapse_dynamics_threads(projection, source, target),
            );
        }

        if projection.requires_device_weight_init() {
            match projection.connectivity {
                Connectivity::Sparse => {
                    workload.push(KernelCategory::InitializeSparse, u64::from(source.size))
                }
                Connectivity::Dense => workload.push(
                    KernelCategory::Initialize,
                    u64::from(source.size) * u64::from(target.size),
                ),
            }
        }
    }

    workload.push(
        KernelCategory::PreNeuronReset,
        model.neuron_populations.len() as u64,
    );
    workload.push(
        KernelCategory::PreSynapseReset,
        model.pre_synapse_reset_count() as u64,
    );

    tracing::debug!(
        populations = model.neuron_populations.len(),
        projections = model.synapse_projections.len(),
        "Computed kernel workload groups"
    );

    Ok(workload)
}

fn resolve<'a>(
    model: &'a ModelTopology,
    projection: &SynapseProjection,
    name: &str,
) -> Result<&'a NeuronPopulation> {
    model.population(name).ok_or_else(|| {
        TuneError::Model(format!(
            "Synapse projection '{}' references unknown population '{}'",
            projection.name, name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeclaredThreads, WeightStorage};

    fn two_population_model() -> ModelTopology {
        ModelTopology::new()
            .with_population(NeuronPopulation::new("exc", 800).with_rng())
            .with_population(NeuronPopulation::new("inh", 200))
    }

    #[test]
    fn test_required_blocks_sums_ceilings() {
        assert_eq!(required_blocks(&[1000], 32), 32);
        assert_eq!(required_blocks(&[1, 1, 1], 32), 3);
        assert_eq!(required_blocks(&[33, 64], 32), 4);
        assert_eq!(required_blocks(&[], 32), 0);
    }

    #[test]
    fn test_required_blocks_non_increasing() {
        let groups = [1000, 17, 4096, 1, 255];
        let mut previous = u64::MAX;
        for warps in 1..32 {
            let blocks = required_blocks(&groups, warps * 32);
            assert!(blocks <= previous);
            previous = blocks;
        }
    }

    #[test]
    fn test_neuron_groups() {
        let workload = compute_workload_groups(&two_population_model(), &DeclaredThreadSizing)
            .unwrap();
        assert_eq!(workload.groups(KernelCategory::NeuronUpdate), &[800, 200]);
        assert_eq!(workload.groups(KernelCategory::Initialize), &[800]);
        assert_eq!(workload.groups(KernelCategory::PreNeuronReset), &[2]);
        assert_eq!(workload.groups(KernelCategory::PreSynapseReset), &[0]);
        assert!(workload.groups(KernelCategory::PresynapticUpdate).is_empty());
    }

    #[test]
    fn test_projection_groups() {
        let model = two_population_model()
            .with_projection(
                SynapseProjection::new("ei", "exc", "inh")
                    .with_weight_init()
                    .with_pre_reset()
                    .with_threads(DeclaredThreads {
                        presynaptic: Some(100),
                        ..Default::default()
                    }),
            )
            .with_projection(
                SynapseProjection::new("ie", "inh", "exc")
                    .with_connectivity(Connectivity::Sparse)
                    .with_weight_init()
                    .with_learn_post_code("g += dw;"),
            )
            .with_projection(
                SynapseProjection::new("ii", "inh", "inh")
                    .with_weights(WeightStorage::Global)
                    .with_weight_init(),
            );

        let workload = compute_workload_groups(&model, &DeclaredThreadSizing).unwrap();
        assert_eq!(
            workload.groups(KernelCategory::PresynapticUpdate),
            &[100, 800, 200]
        );
        assert_eq!(workload.groups(KernelCategory::PostsynapticUpdate), &[200]);
        assert_eq!(workload.groups(KernelCategory::SynapseDynamicsUpdate), &[200]);
        assert_eq!(workload.groups(KernelCategory::Initialize), &[800, 800 * 200]);
        assert_eq!(workload.groups(KernelCategory::InitializeSparse), &[200]);
        assert_eq!(workload.groups(KernelCategory::PreSynapseReset), &[1]);
    }

    #[test]
    fn test_large_dense_projection_is_exact() {
        let model = ModelTopology::new()
            .with_population(NeuronPopulation::new("cortex", 70_000))
            .with_projection(
                SynapseProjection::new("recurrent", "cortex", "cortex")
                    .with_weight_init()
                    .with_learn_post_code("g += dw;"),
            );

        let workload = compute_workload_groups(&model, &DeclaredThreadSizing).unwrap();
        let synapses = 70_000u64 * 70_000;
        assert!(synapses > u64::from(u32::MAX));
        assert_eq!(workload.groups(KernelCategory::Initialize), &[synapses]);
        assert_eq!(
            workload.groups(KernelCategory::SynapseDynamicsUpdate),
            &[synapses]
        );
        assert_eq!(
            required_blocks(workload.groups(KernelCategory::Initialize), 32),
            synapses.div_ceil(32)
        );
    }

    #[test]
    fn test_unknown_population_is_model_error() {
        let model = two_population_model()
            .with_projection(SynapseProjection::new("bad", "exc", "missing"));
        let err = compute_workload_groups(&model, &DeclaredThreadSizing).unwrap_err();
        assert!(matches!(err, TuneError::Model(_)));
    }
}
