//! Neuron populations, their computed requirements and merge relations

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::current_source::CurrentSourceId;
use crate::init::VarInit;
use crate::models::NeuronModel;
use crate::spec::{ModelSpec, VarLocation};
use crate::synapse_group::SynapseGroupId;

/// Stable identifier of a neuron population within a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeuronGroupId(pub(crate) usize);

impl NeuronGroupId {
    /// Index into the owning specification's neuron group table
    pub fn index(self) -> usize {
        self.0
    }
}

/// One entry of a population's merged incoming postsynaptic list: the
/// primary synapse group whose buffers are shared, plus every member fused
/// into it
#[derive(Debug, Clone)]
pub struct MergedInSyn {
    /// Synapse group owning the shared accumulator
    pub primary: SynapseGroupId,
    /// All fused members, primary included
    pub members: Vec<SynapseGroupId>,
}

/// A neuron population
#[derive(Debug, Clone)]
pub struct NeuronGroup {
    pub(crate) name: String,
    pub(crate) num_neurons: usize,
    pub(crate) model: Arc<NeuronModel>,
    pub(crate) params: Vec<f64>,
    pub(crate) derived_params: Vec<f64>,
    pub(crate) var_initialisers: Vec<VarInit>,
    pub(crate) var_locations: Vec<VarLocation>,
    pub(crate) egp_locations: Vec<VarLocation>,
    pub(crate) spike_location: VarLocation,
    pub(crate) spike_event_location: VarLocation,
    pub(crate) spike_time_location: VarLocation,
    pub(crate) num_delay_slots: usize,
    pub(crate) var_queue_required: Vec<bool>,
    pub(crate) in_syn: Vec<SynapseGroupId>,
    pub(crate) out_syn: Vec<SynapseGroupId>,
    pub(crate) current_sources: Vec<CurrentSourceId>,
    pub(crate) merged_in_syn: Vec<MergedInSyn>,
    pub(crate) spike_event_condition: BTreeSet<(String, String)>,
    // Requirement flags, cached by finalization
    pub(crate) spike_time_required: bool,
    pub(crate) prev_spike_time_required: bool,
    pub(crate) spike_event_time_required: bool,
    pub(crate) prev_spike_event_time_required: bool,
    pub(crate) true_spike_required: bool,
    pub(crate) spike_event_required: bool,
    pub(crate) sim_rng_required: bool,
    pub(crate) init_rng_required: bool,
}

impl NeuronGroup {
    /// Population name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of neurons
    pub fn num_neurons(&self) -> usize {
        self.num_neurons
    }

    /// The neuron model descriptor
    pub fn model(&self) -> &NeuronModel {
        &self.model
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

    /// Override the storage location of one variable
    pub fn set_var_location(&mut self, var_name: &str, loc: VarLocation) -> crate::Result<()> {
        let idx = self
            .model
            .var_index(var_name)
            .ok_or_else(|| crate::SpecError::bad_reference(var_name))?;
        self.var_locations[idx] = loc;
        Ok(())
    }

    /// Per-extra-global-parameter storage locations
    pub fn egp_locations(&self) -> &[VarLocation] {
        &self.egp_locations
    }

    /// Storage location of the spike arrays
    pub fn spike_location(&self) -> VarLocation {
        self.spike_location
    }

    /// Storage location of the spike-like-event arrays
    pub fn spike_event_location(&self) -> VarLocation {
        self.spike_event_location
    }

    /// Storage location of the spike-time arrays
    pub fn spike_time_location(&self) -> VarLocation {
        self.spike_time_location
    }

    /// Incoming synapse populations
    pub fn in_syn(&self) -> &[SynapseGroupId] {
        &self.in_syn
    }

    /// Outgoing synapse populations
    pub fn out_syn(&self) -> &[SynapseGroupId] {
        &self.out_syn
    }

    /// Attached current sources
    pub fn current_sources(&self) -> &[CurrentSourceId] {
        &self.current_sources
    }

    /// Incoming synapse populations grouped by shared postsynaptic buffers;
    /// valid after finalization
    pub fn merged_in_syn(&self) -> &[MergedInSyn] {
        &self.merged_in_syn
    }

    /// Spike-like-event conditions contributed by outgoing populations, as
    /// `(condition code, support namespace)` pairs
    pub fn spike_event_condition(&self) -> &BTreeSet<(String, String)> {
        &self.spike_event_condition
    }

    /// Number of delay slots kept for spikes and queued variables
    pub fn num_delay_slots(&self) -> usize {
        self.num_delay_slots
    }

    /// Whether any adjacent synapse population imposes a delay
    pub fn is_delay_required(&self) -> bool {
        self.num_delay_slots > 1
    }

    /// Whether variable `index` must be kept across delay slots
    pub fn is_var_queue_required(&self, index: usize) -> bool {
        self.var_queue_required[index]
    }

    /// The full per-variable queue mask
    pub fn var_queue_required(&self) -> &[bool] {
        &self.var_queue_required
    }

    /// Whether adjacent weight update models read this population's spike times
    pub fn is_spike_time_required(&self) -> bool {
        self.spike_time_required
    }

    /// Whether adjacent weight update models read one-before-last spike times
    pub fn is_prev_spike_time_required(&self) -> bool {
        self.prev_spike_time_required
    }

    /// Whether adjacent weight update models read spike-like-event times
    pub fn is_spike_event_time_required(&self) -> bool {
        self.spike_event_time_required
    }

    /// Whether adjacent weight update models read one-before-last event times
    pub fn is_prev_spike_event_time_required(&self) -> bool {
        self.prev_spike_event_time_required
    }

    /// Whether true spikes must be recorded for this population
    pub fn is_true_spike_required(&self) -> bool {
        self.true_spike_required
    }

    /// Whether spike-like events must be recorded for this population
    pub fn is_spike_event_required(&self) -> bool {
        self.spike_event_required
    }

    /// Whether updating this population draws on the RNG
    pub fn is_sim_rng_required(&self) -> bool {
        self.sim_rng_required
    }

    /// Whether initialising this population draws on the RNG
    pub fn is_init_rng_required(&self) -> bool {
        self.init_rng_required
    }

    /// Grow the delay queue to cover a required delay
    pub(crate) fn check_num_delay_slots(&mut self, required_delay: usize) {
        if required_delay >= self.num_delay_slots {
            self.num_delay_slots = required_delay + 1;
        }
    }

    /// Set queue-required bits for every variable referenced as
    /// `name + suffix` in a code fragment
    pub(crate) fn update_var_queues(&mut self, code: &str, suffix: &str) {
        for (i, v) in self.model.vars.iter().enumerate() {
            if code.contains(&format!("{}{}", v.name, suffix)) {
                self.var_queue_required[i] = true;
            }
        }
    }

    pub(crate) fn add_spike_event_condition(&mut self, code: String, support_namespace: String) {
        self.spike_event_condition.insert((code, support_namespace));
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

    /// Incoming synapse populations whose weight update model declares
    /// postsynaptic variables
    pub fn in_syn_with_post_vars(&self, spec: &ModelSpec) -> Vec<SynapseGroupId> {
        self.in_syn
            .iter()
            .copied()
            .filter(|&id| !spec.synapse_group(id).wu_model().post_vars.is_empty())
            .collect()
    }

    /// Outgoing synapse populations whose weight update model declares
    /// presynaptic variables
    pub fn out_syn_with_pre_vars(&self, spec: &ModelSpec) -> Vec<SynapseGroupId> {
        self.out_syn
            .iter()
            .copied()
            .filter(|&id| !spec.synapse_group(id).wu_model().pre_vars.is_empty())
            .collect()
    }

    /// Update-phase merge relation: whether this population and `other`
    /// admit one emitted update body. Parameter values may differ (a
    /// differing slot is promoted to a per-member field); everything
    /// structural must agree.
    pub fn can_be_merged_with(&self, other: &Self, spec: &ModelSpec) -> bool {
        if !(self.model.can_be_merged(&other.model)
            && self.spike_time_required == other.spike_time_required
            && self.prev_spike_time_required == other.prev_spike_time_required
            && self.spike_event_time_required == other.spike_event_time_required
            && self.prev_spike_event_time_required == other.prev_spike_event_time_required
            && self.true_spike_required == other.true_spike_required
            && self.spike_event_required == other.spike_event_required
            && self.spike_event_condition == other.spike_event_condition
            && self.var_queue_required == other.var_queue_required
            && self.num_delay_slots == other.num_delay_slots
            && self.var_locations == other.var_locations)
        {
            return false;
        }

        // Current source lists must match pairwise, allowing reordering
        if !match_pairwise(&self.current_sources, &other.current_sources, |a, b| {
            spec.current_source(a).can_be_merged(spec.current_source(b))
        }) {
            return false;
        }

        // Merged incoming postsynaptic lists must match pairwise
        match_pairwise_slices(&self.merged_in_syn, &other.merged_in_syn, |a, b| {
            spec.synapse_group(a.primary)
                .can_ps_be_merged(spec.synapse_group(b.primary))
        })
    }

    /// Init-phase merge relation: whether this population and `other` admit
    /// one emitted initialisation body
    pub fn can_init_be_merged_with(&self, other: &Self, spec: &ModelSpec) -> bool {
        if !(self.spike_time_required == other.spike_time_required
            && self.prev_spike_time_required == other.prev_spike_time_required
            && self.spike_event_time_required == other.spike_event_time_required
            && self.prev_spike_event_time_required == other.prev_spike_event_time_required
            && self.true_spike_required == other.true_spike_required
            && self.spike_event_required == other.spike_event_required
            && self.num_delay_slots == other.num_delay_slots
            && self.var_queue_required == other.var_queue_required
            && self.var_locations == other.var_locations)
        {
            return false;
        }

        // Variable initialisers are positional: same count, same snippets,
        // same variable types (parameter values may differ)
        if self.var_initialisers.len() != other.var_initialisers.len()
            || self.model.vars.len() != other.model.vars.len()
        {
            return false;
        }
        if !self
            .model
            .vars
            .iter()
            .zip(&other.model.vars)
            .all(|(a, b)| a.ty == b.ty)
        {
            return false;
        }
        if !self
            .var_initialisers
            .iter()
            .zip(&other.var_initialisers)
            .all(|(a, b)| a.can_be_merged(b))
        {
            return false;
        }

        // Incoming postsynaptic structures must agree entry by entry
        if self.merged_in_syn.len() != other.merged_in_syn.len() {
            return false;
        }
        for (a, b) in self.merged_in_syn.iter().zip(&other.merged_in_syn) {
            let sa = spec.synapse_group(a.primary);
            let sb = spec.synapse_group(b.primary);
            if sa.matrix_type().has_individual_psm() != sb.matrix_type().has_individual_psm()
                || sa.is_dendritic_delay_required() != sb.is_dendritic_delay_required()
                || sa.max_dendritic_delay_timesteps() != sb.max_dendritic_delay_timesteps()
                || sa.ps_var_initialisers().len() != sb.ps_var_initialisers().len()
                || !sa
                    .ps_var_initialisers()
                    .iter()
                    .zip(sb.ps_var_initialisers())
                    .all(|(x, y)| x.can_be_merged(y))
            {
                return false;
            }
        }

        // Weight-update pre/post variables initialised alongside this group
        let self_post = self.in_syn_with_post_vars(spec);
        let other_post = other.in_syn_with_post_vars(spec);
        if !match_init_lists(&self_post, &other_post, spec, false) {
            return false;
        }
        let self_pre = self.out_syn_with_pre_vars(spec);
        let other_pre = other.out_syn_with_pre_vars(spec);
        if !match_init_lists(&self_pre, &other_pre, spec, true) {
            return false;
        }

        // Current source initialisers
        match_pairwise(&self.current_sources, &other.current_sources, |a, b| {
            spec.current_source(a)
                .can_init_be_merged(spec.current_source(b))
        })
    }
}

/// Match two id lists pairwise under a relation, allowing reordering
fn match_pairwise<I: Copy + Eq, F: Fn(I, I) -> bool>(a: &[I], b: &[I], rel: F) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<I> = b.to_vec();
    for &x in a {
        match remaining.iter().position(|&y| rel(x, y)) {
            Some(pos) => {
                remaining.swap_remove(pos);
            }
            None => return false,
        }
    }
    true
}

/// Match two slices of non-Copy entries pairwise, allowing reordering
fn match_pairwise_slices<T, F: Fn(&T, &T) -> bool>(a: &[T], b: &[T], rel: F) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for x in a {
        let mut found = false;
        for (i, y) in b.iter().enumerate() {
            if !used[i] && rel(x, y) {
                used[i] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

/// Compare positional lists of synapse groups whose pre or post variables
/// are initialised with this neuron group
fn match_init_lists(
    a: &[SynapseGroupId],
    b: &[SynapseGroupId],
    spec: &ModelSpec,
    pre_not_post: bool,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).all(|(&x, &y)| {
        let sx = spec.synapse_group(x);
        let sy = spec.synapse_group(y);
        let (ix, iy) = if pre_not_post {
            (sx.wu_pre_var_initialisers(), sy.wu_pre_var_initialisers())
        } else {
            (sx.wu_post_var_initialisers(), sy.wu_post_var_initialisers())
        };
        let delayed_x = if pre_not_post {
            sx.delay_steps() != crate::NO_DELAY
        } else {
            sx.back_prop_delay_steps() != crate::NO_DELAY
        };
        let delayed_y = if pre_not_post {
            sy.delay_steps() != crate::NO_DELAY
        } else {
            sy.back_prop_delay_steps() != crate::NO_DELAY
        };
        delayed_x == delayed_y
            && ix.len() == iy.len()
            && ix.iter().zip(iy).all(|(p, q)| p.can_be_merged(q))
    })
}
