//! The slice of model topology that drives kernel workload sizing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TuneError};

/// Synaptic connectivity representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Full source × target matrix.
    #[default]
    Dense,
    /// Row-compressed sparse connectivity.
    Sparse,
}

/// Where synaptic weights live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightStorage {
    /// One weight stored per synapse.
    #[default]
    Individual,
    /// One weight shared by the whole projection.
    Global,
}

/// A population of identical neurons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronPopulation {
    /// Unique population name.
    pub name: String,
    /// Number of neurons.
    pub size: u32,
    /// Population needs per-neuron random number generator seeding.
    #[serde(default)]
    pub requires_rng: bool,
    /// Population has variables initialized on the device.
    #[serde(default)]
    pub requires_init_code: bool,
}

impl NeuronPopulation {
    /// Creates a population with no device initialization.
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            requires_rng: false,
            requires_init_code: false,
        }
    }

    /// Builder method to require device-side initialization code.
    #[must_use]
    pub fn with_init_code(mut self) -> Self {
        self.requires_init_code = true;
        self
    }

    /// Builder method to require RNG seeding.
    #[must_use]
    pub fn with_rng(mut self) -> Self {
        self.requires_rng = true;
        self
    }

    /// True if the initialization kernel has work for this population.
    pub fn requires_device_init(&self) -> bool {
        self.requires_rng || self.requires_init_code
    }
}

/// Thread counts declared by the code generator for a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclaredThreads {
    /// Threads launched by the presynaptic update kernel.
    pub presynaptic: Option<u64>,
    /// Threads launched by the postsynaptic update kernel.
    pub postsynaptic: Option<u64>,
    /// Threads launched by the synapse dynamics kernel.
    pub synapse_dynamics: Option<u64>,
}

/// A projection of synapses between two populations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseProjection {
    /// Unique projection name.
    pub name: String,
    /// Name of the source population.
    pub source: String,
    /// Name of the target population.
    pub target: String,
    /// Connectivity representation.
    #[serde(default)]
    pub connectivity: Connectivity,
    /// Weight storage.
    #[serde(default)]
    pub weights: WeightStorage,
    /// Weight update model variables are initialized on the device.
    #[serde(default)]
    pub requires_weight_init: bool,
    /// Postsynaptic learning code of the weight update model.
    #[serde(default)]
    pub learn_post_code: String,
    /// Projection needs a reset before each presynaptic update.
    #[serde(default)]
    pub requires_pre_reset: bool,
    /// Thread counts reported by the code generator.
    #[serde(default)]
    pub threads: DeclaredThreads,
}

impl SynapseProjection {
    /// Creates a dense projection with individual weights and no learning.
    pub fn new(name: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            connectivity: Connectivity::Dense,
            weights: WeightStorage::Individual,
            requires_weight_init: false,
            learn_post_code: String::new(),
            requires_pre_reset: false,
            threads: DeclaredThreads::default(),
        }
    }

    /// Builder method to set connectivity.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Builder method to set weight storage.
    #[must_use]
    pub fn with_weights(mut self, weights: WeightStorage) -> Self {
        self.weights = weights;
        self
    }

    /// Builder method to require device-side weight initialization.
    #[must_use]
    pub fn with_weight_init(mut self) -> Self {
        self.requires_weight_init = true;
        self
    }

    /// Builder method to set postsynaptic learning code.
    #[must_use]
    pub fn with_learn_post_code(mut self, code: impl Into<String>) -> Self {
        self.learn_post_code = code.into();
        self
    }

    /// Builder method to require a pre-update reset.
    #[must_use]
    pub fn with_pre_reset(mut self) -> Self {
        self.requires_pre_reset = true;
        self
    }

    /// Builder method to declare thread counts.
    #[must_use]
    pub fn with_threads(mut self, threads: DeclaredThreads) -> Self {
        self.threads = threads;
        self
    }

    /// True if the weight update model has postsynaptic learning.
    pub fn has_postsynaptic_learning(&self) -> bool {
        !self.learn_post_code.trim().is_empty()
    }

    /// True if per-synapse weights must be initialized on the device.
    pub fn requires_device_weight_init(&self) -> bool {
        self.weights == WeightStorage::Individual && self.requires_weight_init
    }
}

/// Neuron populations and synapse projections of a model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelTopology {
    /// Neuron populations.
    #[serde(default)]
    pub neuron_populations: Vec<NeuronPopulation>,
    /// Synapse projections.
    #[serde(default)]
    pub synapse_projections: Vec<SynapseProjection>,
}

impl ModelTopology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a population.
    #[must_use]
    pub fn with_population(mut self, population: NeuronPopulation) -> Self {
        self.neuron_populations.push(population);
        self
    }

    /// Builder method to add a projection.
    #[must_use]
    pub fn with_projection(mut self, projection: SynapseProjection) -> Self {
        self.synapse_projections.push(projection);
        self
    }

    /// Finds a population by name.
    pub fn population(&self, name: &str) -> Option<&NeuronPopulation> {
        self.neuron_populations.iter().find(|n| n.name == name)
    }

    /// Number of projections that need a reset before the presynaptic update.
    pub fn pre_synapse_reset_count(&self) -> usize {
        self.synapse_projections
            .iter()
            .filter(|s| s.requires_pre_reset)
            .count()
    }

    /// Loads a topology from a `.toml` or `.json` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            other => Err(TuneError::Config(format!(
                "Unsupported model file extension: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_topology_defaults() {
        let model: ModelTopology = toml::from_str(
            r#"
            [[neuron_populations]]
            name = "excitatory"
            size = 800
            requires_rng = true

            [[neuron_populations]]
            name = "inhibitory"
            size = 200

            [[synapse_projections]]
            name = "ee"
            source = "excitatory"
            target = "excitatory"
            connectivity = "sparse"
            learn_post_code = "w += 0.1;"
            "#,
        )
        .unwrap();

        assert_eq!(model.neuron_populations.len(), 2);
        assert!(model.neuron_populations[0].requires_device_init());
        assert!(!model.neuron_populations[1].requires_device_init());

        let ee = &model.synapse_projections[0];
        assert_eq!(ee.connectivity, Connectivity::Sparse);
        assert_eq!(ee.weights, WeightStorage::Individual);
        assert!(ee.has_postsynaptic_learning());
        assert!(!ee.requires_device_weight_init());
    }

    #[test]
    fn test_global_weights_skip_device_init() {
        let projection = SynapseProjection::new("s", "a", "b")
            .with_weights(WeightStorage::Global)
            .with_weight_init();
        assert!(!projection.requires_device_weight_init());
    }

    #[test]
    fn test_from_path_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"neuron_populations": [{"name": "pop", "size": 10}]}"#,
        )
        .unwrap();

        let model = ModelTopology::from_path(&path).unwrap();
        assert_eq!(model.population("pop").map(|p| p.size), Some(10));
        assert!(model.synapse_projections.is_empty());
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            ModelTopology::from_path(&path),
            Err(TuneError::Config(_))
        ));
    }
}
