//! Current source populations

use std::sync::Arc;

use crate::init::VarInit;
use crate::models::CurrentSourceModel;
use crate::neuron_group::NeuronGroupId;
use crate::spec::VarLocation;
use crate::utils;

/// Stable identifier of a current source within a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrentSourceId(pub(crate) usize);

impl CurrentSourceId {
    /// Index into the owning specification's current source table
    pub fn index(self) -> usize {
        self.0
    }
}

/// A current source attached to exactly one neuron population
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub(crate) name: String,
    pub(crate) model: Arc<CurrentSourceModel>,
    pub(crate) target: NeuronGroupId,
    pub(crate) params: Vec<f64>,
    pub(crate) derived_params: Vec<f64>,
    pub(crate) var_initialisers: Vec<VarInit>,
    pub(crate) var_locations: Vec<VarLocation>,
}

impl CurrentSource {
    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model descriptor
    pub fn model(&self) -> &CurrentSourceModel {
        &self.model
    }

    /// The neuron population this source injects into
    pub fn target(&self) -> NeuronGroupId {
        self.target
    }

    /// Parameter values
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Derived parameter values; valid after finalization
    pub fn derived_params(&self) -> &[f64] {
        &self.derived_params
    }

    /// Variable initialisers, one per model variable
    pub fn var_initialisers(&self) -> &[VarInit] {
        &self.var_initialisers
    }

    /// Per-variable storage locations
    pub fn var_locations(&self) -> &[VarLocation] {
        &self.var_locations
    }

    /// Whether injection draws on the simulation-time RNG
    pub fn is_sim_rng_required(&self) -> bool {
        self.model.is_sim_rng_required()
    }

    /// Whether initialising this source's variables draws on the RNG
    pub fn is_init_rng_required(&self) -> bool {
        utils::is_rng_required_any(&self.var_initialisers)
    }

    /// Whether two sources admit the same emitted code with identical
    /// parameter values
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.model.can_be_merged(&other.model)
            && self.params == other.params
            && self.derived_params == other.derived_params
            && self.var_locations == other.var_locations
    }

    /// Whether two sources admit the same emitted initialisation code
    pub fn can_init_be_merged(&self, other: &Self) -> bool {
        self.var_initialisers.len() == other.var_initialisers.len()
            && self
                .var_initialisers
                .iter()
                .zip(&other.var_initialisers)
                .all(|(a, b)| a.can_be_merged(b))
    }

    pub(crate) fn init_derived_params(&mut self, dt: f64) {
        self.derived_params = self
            .model
            .derived_params
            .iter()
            .map(|d| (d.func)(&self.params, dt))
            .collect();
        for init in &mut self.var_initialisers {
            init.init_derived_params(dt);
        }
    }
}
