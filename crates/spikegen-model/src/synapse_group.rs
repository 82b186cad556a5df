//! Synapse populations and matrix storage classes

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecError};
use crate::init::{SparseConnectivityInit, VarInit};
use crate::models::{PostsynapticModel, WeightUpdateModel};
use crate::neuron_group::NeuronGroupId;
use crate::spec::VarLocation;
use crate::utils;

/// Stable identifier of a synapse population within a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynapseGroupId(pub(crate) usize);

impl SynapseGroupId {
    /// Index into the owning specification's synapse group table
    pub fn index(self) -> usize {
        self.0
    }
}

/// Matrix storage class: how connectivity is represented crossed with how
/// weights are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixType {
    /// Full matrix, one weight per synapse
    DenseIndividual,
    /// Full matrix, one weight shared by the whole population
    DenseGlobal,
    /// Ragged row lists, one weight per synapse
    SparseIndividual,
    /// Ragged row lists, one shared weight
    SparseGlobal,
    /// One bit per potential synapse, one shared weight
    BitmaskGlobal,
    /// Connectivity and weights regenerated on the fly each timestep
    ProceduralProcedural,
    /// Connectivity regenerated on the fly, one shared weight
    ProceduralGlobal,
    /// Full matrix whose weights live in a small shared kernel
    Kernel,
}

impl MatrixType {
    /// Whether every pre/post pair is represented
    pub fn is_dense(self) -> bool {
        matches!(
            self,
            MatrixType::DenseIndividual | MatrixType::DenseGlobal | MatrixType::Kernel
        )
    }

    /// Whether connectivity is stored as ragged row lists
    pub fn is_sparse(self) -> bool {
        matches!(self, MatrixType::SparseIndividual | MatrixType::SparseGlobal)
    }

    /// Whether connectivity is stored as a bitmask
    pub fn is_bitmask(self) -> bool {
        matches!(self, MatrixType::BitmaskGlobal)
    }

    /// Whether connectivity is regenerated procedurally at simulation time
    pub fn is_procedural_connectivity(self) -> bool {
        matches!(
            self,
            MatrixType::ProceduralProcedural | MatrixType::ProceduralGlobal
        )
    }

    /// Whether each synapse owns its weight-update variables
    pub fn has_individual_weights(self) -> bool {
        matches!(self, MatrixType::DenseIndividual | MatrixType::SparseIndividual)
    }

    /// Whether weight-update variables are regenerated procedurally
    pub fn has_procedural_weights(self) -> bool {
        matches!(self, MatrixType::ProceduralProcedural)
    }

    /// Whether weight-update variables live in a shared kernel
    pub fn has_kernel_weights(self) -> bool {
        matches!(self, MatrixType::Kernel)
    }

    /// Whether weight-update variables collapse to constants
    pub fn has_global_weights(self) -> bool {
        matches!(
            self,
            MatrixType::DenseGlobal
                | MatrixType::SparseGlobal
                | MatrixType::BitmaskGlobal
                | MatrixType::ProceduralGlobal
        )
    }

    /// Whether each postsynaptic neuron owns its postsynaptic-model variables
    pub fn has_individual_psm(self) -> bool {
        matches!(
            self,
            MatrixType::DenseIndividual
                | MatrixType::SparseIndividual
                | MatrixType::ProceduralProcedural
                | MatrixType::Kernel
        )
    }
}

/// A synapse population connecting two neuron populations
#[derive(Debug, Clone)]
pub struct SynapseGroup {
    pub(crate) name: String,
    pub(crate) src: NeuronGroupId,
    pub(crate) trg: NeuronGroupId,
    pub(crate) matrix_type: MatrixType,
    pub(crate) delay_steps: usize,
    pub(crate) back_prop_delay_steps: usize,
    pub(crate) max_dendritic_delay_timesteps: usize,
    pub(crate) max_connections: usize,
    pub(crate) max_source_connections: usize,
    pub(crate) wu_model: Arc<WeightUpdateModel>,
    pub(crate) wu_params: Vec<f64>,
    pub(crate) wu_derived_params: Vec<f64>,
    pub(crate) wu_var_initialisers: Vec<VarInit>,
    pub(crate) wu_pre_var_initialisers: Vec<VarInit>,
    pub(crate) wu_post_var_initialisers: Vec<VarInit>,
    pub(crate) ps_model: Arc<PostsynapticModel>,
    pub(crate) ps_params: Vec<f64>,
    pub(crate) ps_derived_params: Vec<f64>,
    pub(crate) ps_var_initialisers: Vec<VarInit>,
    pub(crate) connectivity_initialiser: SparseConnectivityInit,
    pub(crate) ps_model_merge_target: String,
    pub(crate) in_syn_location: VarLocation,
    pub(crate) sparse_connectivity_location: VarLocation,
    pub(crate) wu_var_locations: Vec<VarLocation>,
    pub(crate) ps_var_locations: Vec<VarLocation>,
}

impl SynapseGroup {
    /// Population name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source (presynaptic) population
    pub fn src(&self) -> NeuronGroupId {
        self.src
    }

    /// Target (postsynaptic) population
    pub fn trg(&self) -> NeuronGroupId {
        self.trg
    }

    /// Matrix storage class
    pub fn matrix_type(&self) -> MatrixType {
        self.matrix_type
    }

    /// Axonal (source to target) delay in timesteps
    pub fn delay_steps(&self) -> usize {
        self.delay_steps
    }

    /// Back-propagation (target to source) delay in timesteps
    pub fn back_prop_delay_steps(&self) -> usize {
        self.back_prop_delay_steps
    }

    /// Depth of the dendritic delay ring buffer
    pub fn max_dendritic_delay_timesteps(&self) -> usize {
        self.max_dendritic_delay_timesteps
    }

    /// Bound the dendritic delay ring buffer depth
    pub fn set_max_dendritic_delay_timesteps(&mut self, timesteps: usize) {
        self.max_dendritic_delay_timesteps = timesteps.max(1);
    }

    /// Row stride of the synaptic matrix (maximum row length for sparse)
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Override the maximum row length
    pub fn set_max_connections(&mut self, n: usize) {
        self.max_connections = n;
    }

    /// Column stride of the synaptic matrix (maximum column length for sparse)
    pub fn max_source_connections(&self) -> usize {
        self.max_source_connections
    }

    /// The weight update model descriptor
    pub fn wu_model(&self) -> &WeightUpdateModel {
        &self.wu_model
    }

    /// Weight update parameter values
    pub fn wu_params(&self) -> &[f64] {
        &self.wu_params
    }

    /// Weight update derived parameter values; valid after finalization
    pub fn wu_derived_params(&self) -> &[f64] {
        &self.wu_derived_params
    }

    /// Per-synapse variable initialisers
    pub fn wu_var_initialisers(&self) -> &[VarInit] {
        &self.wu_var_initialisers
    }

    /// Presynaptic variable initialisers
    pub fn wu_pre_var_initialisers(&self) -> &[VarInit] {
        &self.wu_pre_var_initialisers
    }

    /// Postsynaptic variable initialisers
    pub fn wu_post_var_initialisers(&self) -> &[VarInit] {
        &self.wu_post_var_initialisers
    }

    /// The postsynaptic model descriptor
    pub fn ps_model(&self) -> &PostsynapticModel {
        &self.ps_model
    }

    /// Postsynaptic model parameter values
    pub fn ps_params(&self) -> &[f64] {
        &self.ps_params
    }

    /// Postsynaptic model derived parameter values; valid after finalization
    pub fn ps_derived_params(&self) -> &[f64] {
        &self.ps_derived_params
    }

    /// Postsynaptic variable initialisers
    pub fn ps_var_initialisers(&self) -> &[VarInit] {
        &self.ps_var_initialisers
    }

    /// The sparse connectivity initialiser
    pub fn connectivity_initialiser(&self) -> &SparseConnectivityInit {
        &self.connectivity_initialiser
    }

    /// Name under which this group's postsynaptic buffers are shared after
    /// fusion; the group's own name when unfused
    pub fn ps_model_target_name(&self) -> &str {
        if self.ps_model_merge_target.is_empty() {
            &self.name
        } else {
            &self.ps_model_merge_target
        }
    }

    /// Whether this group's postsynaptic model was fused with a sibling
    pub fn is_ps_model_fused(&self) -> bool {
        !self.ps_model_merge_target.is_empty()
    }

    /// Whether true spikes of the source population drive this group
    pub fn is_true_spike_required(&self) -> bool {
        !self.wu_model.sim_code.is_empty()
    }

    /// Whether spike-like events of the source population drive this group
    pub fn is_spike_event_required(&self) -> bool {
        !self.wu_model.event_code.is_empty()
            && !self.wu_model.event_threshold_condition_code.is_empty()
    }

    /// Whether postsynaptic input is smoothed through a dendritic delay ring
    pub fn is_dendritic_delay_required(&self) -> bool {
        self.max_dendritic_delay_timesteps > 1
    }

    /// Whether initialising postsynaptic variables draws on the RNG
    pub fn is_ps_init_rng_required(&self) -> bool {
        utils::is_rng_required_any(&self.ps_var_initialisers)
    }

    /// Whether initialising weight-update variables draws on the RNG
    pub fn is_wu_init_rng_required(&self) -> bool {
        utils::is_rng_required_any(&self.wu_var_initialisers)
            || utils::is_rng_required_any(&self.wu_pre_var_initialisers)
            || utils::is_rng_required_any(&self.wu_post_var_initialisers)
    }

    /// Whether building connectivity draws on the RNG
    pub fn is_connectivity_init_rng_required(&self) -> bool {
        self.connectivity_initialiser.snippet().is_rng_required()
    }

    /// Constant weight-update variable values for global-weight matrices
    pub fn wu_const_init_vals(&self) -> Result<Vec<f64>> {
        self.wu_var_initialisers
            .iter()
            .map(|init| {
                init.constant_value().ok_or_else(|| {
                    SpecError::shape_mismatch(format!(
                        "synapse group '{}' has global weights but a non-constant variable initialiser",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Constant postsynaptic variable values for global postsynaptic models
    pub fn ps_const_init_vals(&self) -> Result<Vec<f64>> {
        self.ps_var_initialisers
            .iter()
            .map(|init| {
                init.constant_value().ok_or_else(|| {
                    SpecError::shape_mismatch(format!(
                        "synapse group '{}' has a global postsynaptic model but a non-constant variable initialiser",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Whether two groups' postsynaptic models admit the same emitted code
    /// with identical parameter values
    pub fn can_ps_be_merged(&self, other: &Self) -> bool {
        self.ps_model.can_be_merged(&other.ps_model)
            && self.ps_params == other.ps_params
            && self.ps_derived_params == other.ps_derived_params
            && self.matrix_type.has_individual_psm() == other.matrix_type.has_individual_psm()
            && self.is_dendritic_delay_required() == other.is_dendritic_delay_required()
            && self.max_dendritic_delay_timesteps == other.max_dendritic_delay_timesteps
    }

    /// Whether two groups' postsynaptic models may share one accumulator
    pub fn can_ps_be_linearly_combined(&self, other: &Self) -> bool {
        self.can_ps_be_merged(other)
            && self.ps_model.vars.is_empty()
            && other.ps_model.vars.is_empty()
    }

    pub(crate) fn init_derived_params(&mut self, dt: f64) {
        self.wu_derived_params = self
            .wu_model
            .derived_params
            .iter()
            .map(|d| (d.func)(&self.wu_params, dt))
            .collect();
        self.ps_derived_params = self
            .ps_model
            .derived_params
            .iter()
            .map(|d| (d.func)(&self.ps_params, dt))
            .collect();
        for init in self
            .wu_var_initialisers
            .iter_mut()
            .chain(self.wu_pre_var_initialisers.iter_mut())
            .chain(self.wu_post_var_initialisers.iter_mut())
            .chain(self.ps_var_initialisers.iter_mut())
        {
            init.init_derived_params(dt);
        }
        self.connectivity_initialiser.init_derived_params(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_predicates_partition_classes() {
        assert!(MatrixType::SparseIndividual.is_sparse());
        assert!(MatrixType::SparseIndividual.has_individual_weights());
        assert!(!MatrixType::SparseGlobal.has_individual_weights());
        assert!(MatrixType::BitmaskGlobal.is_bitmask());
        assert!(MatrixType::ProceduralProcedural.has_procedural_weights());
        assert!(MatrixType::Kernel.has_kernel_weights());
        assert!(MatrixType::Kernel.is_dense());
        assert!(!MatrixType::SparseGlobal.has_individual_psm());
    }
}
