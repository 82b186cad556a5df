//! The capability bundle a backend supplies to the emitters
//!
//! The emitters own everything platform-independent: substitution setup,
//! fragment application and write-back boilerplate. The backend owns the
//! kernel skeletons (how merged groups and elements are iterated), spike
//! registration, and the per-element loops used during initialisation.
//! Handlers behave like visitors: each merged group is presented together
//! with a preformed substitution scope.

use spikegen_model::ModelSpec;

use crate::code_stream::CodeStream;
use crate::error::Result;
use crate::merged::{
    ModelSpecMerged, NeuronInitGroupMerged, NeuronUpdateGroupMerged, SynapseGroupMerged,
};
use crate::substitutions::Substitutions;

/// Per-element body invoked inside a backend-emitted loop
pub type VarInitHandler<'h> =
    &'h mut dyn FnMut(&mut CodeStream, &mut Substitutions) -> Result<()>;

/// Backend-supplied callback registering a spike or spike-like event
pub type NeuronSpikeEmitter<'h> =
    &'h dyn Fn(&mut CodeStream, &NeuronUpdateGroupMerged, &Substitutions) -> Result<()>;

/// Platform-independent per-neuron simulation body; receives the backend's
/// true-spike and spike-like-event emitters
pub type NeuronSimHandler<'h> = &'h dyn Fn(
    &mut CodeStream,
    &NeuronUpdateGroupMerged,
    &mut Substitutions,
    NeuronSpikeEmitter,
    NeuronSpikeEmitter,
) -> Result<()>;

/// Platform-independent body applied per merged neuron update group
pub type NeuronUpdateHandler<'h> =
    &'h dyn Fn(&mut CodeStream, &NeuronUpdateGroupMerged, &Substitutions) -> Result<()>;

/// Platform-independent body applied per merged neuron init group
pub type NeuronInitHandler<'h> =
    &'h dyn Fn(&mut CodeStream, &NeuronInitGroupMerged, &Substitutions) -> Result<()>;

/// Platform-independent body applied per merged synapse group
pub type SynapseHandler<'h> =
    &'h dyn Fn(&mut CodeStream, &SynapseGroupMerged, &mut Substitutions) -> Result<()>;

/// A code-generation backend
pub trait Backend {
    /// Emit the neuron-update kernel skeleton, invoking `sim_handler` once
    /// per merged group inside the per-element iteration and passing it the
    /// backend's spike emitters; `wu_var_update_handler` is invoked where
    /// spike-triggered weight-update state must be advanced
    fn gen_neuron_update(
        &self,
        os: &mut CodeStream,
        merged: &ModelSpecMerged,
        sim_handler: NeuronSimHandler,
        wu_var_update_handler: NeuronUpdateHandler,
    ) -> Result<()>;

    /// Emit the synapse-update kernel skeletons. Handlers receive scopes
    /// with `id_pre`, `id_post` and (for individual matrices) `id_syn`
    /// already declared.
    #[allow(clippy::too_many_arguments)]
    fn gen_synapse_update(
        &self,
        os: &mut CodeStream,
        merged: &ModelSpecMerged,
        wum_thresh_handler: SynapseHandler,
        wum_sim_handler: SynapseHandler,
        wum_event_handler: SynapseHandler,
        wum_procedural_connect_handler: SynapseHandler,
        post_learn_handler: SynapseHandler,
        synapse_dynamics_handler: SynapseHandler,
    ) -> Result<()>;

    /// Emit the initialisation kernel skeleton
    #[allow(clippy::too_many_arguments)]
    fn gen_init(
        &self,
        os: &mut CodeStream,
        merged: &ModelSpecMerged,
        neuron_init_handler: NeuronInitHandler,
        dense_init_handler: SynapseHandler,
        sparse_row_connect_handler: SynapseHandler,
        sparse_col_connect_handler: SynapseHandler,
        kernel_init_handler: SynapseHandler,
        sparse_init_handler: SynapseHandler,
    ) -> Result<()>;

    /// Emit code that runs once per merged-group member
    fn gen_pop_variable_init(
        &self,
        os: &mut CodeStream,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()>;

    /// Emit a per-element loop of size `count`, binding `index_name` in the
    /// child scope handed to `handler`
    fn gen_variable_init(
        &self,
        os: &mut CodeStream,
        count: &str,
        index_name: &str,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()>;

    /// Emit a loop over one synaptic row, binding `id_syn` (and `id_post`)
    /// in the child scope; `id_pre` must already be declared in `subs`
    fn gen_synapse_variable_row_init(
        &self,
        os: &mut CodeStream,
        sg: &SynapseGroupMerged,
        spec: &ModelSpec,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()>;

    /// Prefix for device copies of variables in otherwise platform-neutral
    /// code
    fn var_prefix(&self) -> &str {
        ""
    }

    /// Prefix for reaching merged-group fields, e.g. `group->`
    fn merged_group_field_prefix(&self) -> &str {
        "group->"
    }

    /// Qualifier placed before merged-group instance arrays, e.g.
    /// `__device__ __constant__` on device backends
    fn merged_group_array_qualifier(&self) -> &str {
        "static "
    }

    /// Whether emitted code may use C++ namespaces for support code
    fn supports_namespace(&self) -> bool;
}
