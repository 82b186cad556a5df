//! The model specification container
//!
//! A [`ModelSpec`] is built by user code through the add-population
//! operations, then finalized exactly once before code generation.
//! Finalization evaluates derived parameters, scans code fragments for
//! delay-queue references, propagates delay-slot counts, caches the
//! requirement flags and fuses linearly-combinable postsynaptic models.
//! Finalizing an already-finalized specification recomputes the same
//! derived state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::current_source::{CurrentSource, CurrentSourceId};
use crate::error::{Result, SpecError};
use crate::init::{SparseConnectivityInit, VarInit};
use crate::models::{CurrentSourceModel, NeuronModel, PostsynapticModel, WeightUpdateModel};
use crate::neuron_group::{MergedInSyn, NeuronGroup, NeuronGroupId};
use crate::synapse_group::{MatrixType, SynapseGroup, SynapseGroupId};

/// Floating-point width used for state variables and emitted literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// 32-bit precision; literals carry an `f` suffix
    F32,
    /// 64-bit precision
    F64,
}

impl ScalarType {
    /// The type name used in emitted code
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        }
    }
}

/// Where a variable lives relative to the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarLocation {
    /// Host memory only
    Host,
    /// Device memory only
    Device,
    /// Mirrored on host and device
    HostDevice,
    /// Page-locked host memory mapped into the device
    ZeroCopy,
}

/// Initialisation bundle for a weight update model
#[derive(Debug, Clone)]
pub struct WeightUpdateInit {
    /// The model descriptor
    pub model: Arc<WeightUpdateModel>,
    /// Parameter values
    pub params: Vec<f64>,
    /// Per-synapse variable initialisers
    pub var_initialisers: Vec<VarInit>,
    /// Per-source-neuron variable initialisers
    pub pre_var_initialisers: Vec<VarInit>,
    /// Per-target-neuron variable initialisers
    pub post_var_initialisers: Vec<VarInit>,
}

impl WeightUpdateInit {
    /// Bundle a weight update model with parameter values and per-synapse
    /// variable initialisers
    pub fn new(model: Arc<WeightUpdateModel>, params: Vec<f64>, var_initialisers: Vec<VarInit>) -> Self {
        Self {
            model,
            params,
            var_initialisers,
            pre_var_initialisers: Vec::new(),
            post_var_initialisers: Vec::new(),
        }
    }

    /// Attach presynaptic variable initialisers
    pub fn with_pre_vars(mut self, inits: Vec<VarInit>) -> Self {
        self.pre_var_initialisers = inits;
        self
    }

    /// Attach postsynaptic variable initialisers
    pub fn with_post_vars(mut self, inits: Vec<VarInit>) -> Self {
        self.post_var_initialisers = inits;
        self
    }
}

/// Initialisation bundle for a postsynaptic model
#[derive(Debug, Clone)]
pub struct PostsynapticInit {
    /// The model descriptor
    pub model: Arc<PostsynapticModel>,
    /// Parameter values
    pub params: Vec<f64>,
    /// Per-target-neuron variable initialisers
    pub var_initialisers: Vec<VarInit>,
}

impl PostsynapticInit {
    /// Bundle a postsynaptic model with parameter values and variable
    /// initialisers
    pub fn new(model: Arc<PostsynapticModel>, params: Vec<f64>, var_initialisers: Vec<VarInit>) -> Self {
        Self {
            model,
            params,
            var_initialisers,
        }
    }
}

/// A complete declarative network description
#[derive(Debug)]
pub struct ModelSpec {
    name: String,
    dt: f64,
    precision: ScalarType,
    time_precision: Option<ScalarType>,
    seed: u64,
    default_var_location: VarLocation,
    default_sparse_connectivity_location: VarLocation,
    merge_postsynaptic_models: bool,
    timing: bool,
    optimize_code: bool,
    neuron_groups: Vec<NeuronGroup>,
    synapse_groups: Vec<SynapseGroup>,
    current_sources: Vec<CurrentSource>,
    neuron_names: BTreeMap<String, usize>,
    synapse_names: BTreeMap<String, usize>,
    current_source_names: BTreeMap<String, usize>,
    finalized: bool,
}

impl ModelSpec {
    /// Create an empty specification
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dt: 1.0,
            precision: ScalarType::F32,
            time_precision: None,
            seed: 0,
            default_var_location: VarLocation::HostDevice,
            default_sparse_connectivity_location: VarLocation::HostDevice,
            merge_postsynaptic_models: true,
            timing: false,
            optimize_code: false,
            neuron_groups: Vec::new(),
            synapse_groups: Vec::new(),
            current_sources: Vec::new(),
            neuron_names: BTreeMap::new(),
            synapse_names: BTreeMap::new(),
            current_source_names: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulation timestep
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Set the simulation timestep
    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    /// Scalar precision of state variables and emitted literals
    pub fn precision(&self) -> ScalarType {
        self.precision
    }

    /// Set the scalar precision
    pub fn set_precision(&mut self, precision: ScalarType) {
        self.precision = precision;
    }

    /// Precision of spike-time values; defaults to the scalar precision
    pub fn time_precision(&self) -> ScalarType {
        self.time_precision.unwrap_or(self.precision)
    }

    /// Set the spike-time precision
    pub fn set_time_precision(&mut self, precision: ScalarType) {
        self.time_precision = Some(precision);
    }

    /// RNG seed baked into generated code
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Set the RNG seed
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Default storage location for variables
    pub fn default_var_location(&self) -> VarLocation {
        self.default_var_location
    }

    /// Set the default variable storage location
    pub fn set_default_var_location(&mut self, loc: VarLocation) {
        self.default_var_location = loc;
    }

    /// Default storage location for sparse connectivity
    pub fn default_sparse_connectivity_location(&self) -> VarLocation {
        self.default_sparse_connectivity_location
    }

    /// Set the default sparse connectivity location
    pub fn set_default_sparse_connectivity_location(&mut self, loc: VarLocation) {
        self.default_sparse_connectivity_location = loc;
    }

    /// Whether linearly-combinable postsynaptic models share accumulators
    pub fn merge_postsynaptic_models(&self) -> bool {
        self.merge_postsynaptic_models
    }

    /// Enable or disable postsynaptic model fusion
    pub fn set_merge_postsynaptic_models(&mut self, merge: bool) {
        self.merge_postsynaptic_models = merge;
    }

    /// Whether kernel timers are generated
    pub fn timing(&self) -> bool {
        self.timing
    }

    /// Enable or disable kernel timing
    pub fn set_timing(&mut self, timing: bool) {
        self.timing = timing;
    }

    /// Whether speed-over-accuracy code generation is requested
    pub fn optimize_code(&self) -> bool {
        self.optimize_code
    }

    /// Request speed-over-accuracy code generation
    pub fn set_optimize_code(&mut self, optimize: bool) {
        self.optimize_code = optimize;
    }

    /// Whether [`ModelSpec::finalize`] has run
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// All neuron populations
    pub fn neuron_groups(&self) -> &[NeuronGroup] {
        &self.neuron_groups
    }

    /// All synapse populations
    pub fn synapse_groups(&self) -> &[SynapseGroup] {
        &self.synapse_groups
    }

    /// All current sources
    pub fn current_sources(&self) -> &[CurrentSource] {
        &self.current_sources
    }

    /// Look up a neuron population
    pub fn neuron_group(&self, id: NeuronGroupId) -> &NeuronGroup {
        &self.neuron_groups[id.0]
    }

    /// Mutable handle to a neuron population; only meaningful before
    /// finalization
    pub fn neuron_group_mut(&mut self, id: NeuronGroupId) -> &mut NeuronGroup {
        &mut self.neuron_groups[id.0]
    }

    /// Look up a synapse population
    pub fn synapse_group(&self, id: SynapseGroupId) -> &SynapseGroup {
        &self.synapse_groups[id.0]
    }

    /// Mutable handle to a synapse population; only meaningful before
    /// finalization
    pub fn synapse_group_mut(&mut self, id: SynapseGroupId) -> &mut SynapseGroup {
        &mut self.synapse_groups[id.0]
    }

    /// Look up a current source
    pub fn current_source(&self, id: CurrentSourceId) -> &CurrentSource {
        &self.current_sources[id.0]
    }

    /// Identifiers of all neuron populations, in declaration order
    pub fn neuron_group_ids(&self) -> Vec<NeuronGroupId> {
        (0..self.neuron_groups.len()).map(NeuronGroupId).collect()
    }

    /// Identifiers of all synapse populations, in declaration order
    pub fn synapse_group_ids(&self) -> Vec<SynapseGroupId> {
        (0..self.synapse_groups.len()).map(SynapseGroupId).collect()
    }

    /// Find a neuron population by name
    pub fn find_neuron_group(&self, name: &str) -> Option<NeuronGroupId> {
        self.neuron_names.get(name).copied().map(NeuronGroupId)
    }

    /// Find a synapse population by name
    pub fn find_synapse_group(&self, name: &str) -> Option<SynapseGroupId> {
        self.synapse_names.get(name).copied().map(SynapseGroupId)
    }

    /// Add a neuron population
    pub fn add_neuron_population(
        &mut self,
        name: impl Into<String>,
        num_neurons: usize,
        model: Arc<NeuronModel>,
        params: Vec<f64>,
        var_initialisers: Vec<VarInit>,
    ) -> Result<NeuronGroupId> {
        let name = name.into();
        self.check_mutable()?;
        self.check_name_unused(&name)?;
        if num_neurons == 0 {
            return Err(SpecError::shape_mismatch(format!(
                "population '{}' has zero neurons",
                name
            )));
        }
        check_arity(&name, "parameters", model.param_names.len(), params.len())?;
        check_arity(&name, "variables", model.vars.len(), var_initialisers.len())?;

        let num_vars = model.vars.len();
        let id = NeuronGroupId(self.neuron_groups.len());
        self.neuron_names.insert(name.clone(), id.0);
        self.neuron_groups.push(NeuronGroup {
            name,
            num_neurons,
            model,
            params,
            derived_params: Vec::new(),
            var_initialisers,
            var_locations: vec![self.default_var_location; num_vars],
            egp_locations: Vec::new(),
            spike_location: self.default_var_location,
            spike_event_location: self.default_var_location,
            spike_time_location: self.default_var_location,
            num_delay_slots: 1,
            var_queue_required: vec![false; num_vars],
            in_syn: Vec::new(),
            out_syn: Vec::new(),
            current_sources: Vec::new(),
            merged_in_syn: Vec::new(),
            spike_event_condition: Default::default(),
            spike_time_required: false,
            prev_spike_time_required: false,
            spike_event_time_required: false,
            prev_spike_event_time_required: false,
            true_spike_required: false,
            spike_event_required: false,
            sim_rng_required: false,
            init_rng_required: false,
        });
        let ng = &mut self.neuron_groups[id.0];
        ng.egp_locations = vec![self.default_var_location; ng.model.egps.len()];
        Ok(id)
    }

    /// Add a synapse population connecting two existing neuron populations
    #[allow(clippy::too_many_arguments)]
    pub fn add_synapse_population(
        &mut self,
        name: impl Into<String>,
        matrix_type: MatrixType,
        delay_steps: usize,
        src: &str,
        trg: &str,
        weight_update: WeightUpdateInit,
        postsynaptic: PostsynapticInit,
        connectivity: SparseConnectivityInit,
    ) -> Result<SynapseGroupId> {
        let name = name.into();
        self.check_mutable()?;
        self.check_name_unused(&name)?;
        let src_id = self
            .find_neuron_group(src)
            .ok_or_else(|| SpecError::bad_reference(src))?;
        let trg_id = self
            .find_neuron_group(trg)
            .ok_or_else(|| SpecError::bad_reference(trg))?;

        let wu = &weight_update;
        check_arity(&name, "weight update parameters", wu.model.param_names.len(), wu.params.len())?;
        check_arity(&name, "weight update variables", wu.model.vars.len(), wu.var_initialisers.len())?;
        check_arity(
            &name,
            "presynaptic weight update variables",
            wu.model.pre_vars.len(),
            wu.pre_var_initialisers.len(),
        )?;
        check_arity(
            &name,
            "postsynaptic weight update variables",
            wu.model.post_vars.len(),
            wu.post_var_initialisers.len(),
        )?;
        let ps = &postsynaptic;
        check_arity(&name, "postsynaptic parameters", ps.model.param_names.len(), ps.params.len())?;
        check_arity(&name, "postsynaptic variables", ps.model.vars.len(), ps.var_initialisers.len())?;

        if matrix_type.is_procedural_connectivity()
            && connectivity.snippet().row_build_code.is_empty()
        {
            return Err(SpecError::shape_mismatch(format!(
                "synapse group '{}' uses procedural connectivity but its snippet has no row build code",
                name
            )));
        }
        if matrix_type.has_global_weights() {
            for init in &wu.var_initialisers {
                if init.constant_value().is_none() {
                    return Err(SpecError::shape_mismatch(format!(
                        "synapse group '{}' has global weights but a non-constant variable initialiser",
                        name
                    )));
                }
            }
        }
        if !matrix_type.has_individual_psm() {
            for init in &ps.var_initialisers {
                if init.constant_value().is_none() {
                    return Err(SpecError::shape_mismatch(format!(
                        "synapse group '{}' has a global postsynaptic model but a non-constant variable initialiser",
                        name
                    )));
                }
            }
        }

        let num_src = self.neuron_groups[src_id.0].num_neurons;
        let num_trg = self.neuron_groups[trg_id.0].num_neurons;
        let max_connections = if matrix_type.is_sparse() || matrix_type.is_procedural_connectivity()
        {
            connectivity.max_row_length(num_src, num_trg)
        } else {
            num_trg
        };
        let max_source_connections = if matrix_type.is_sparse() {
            connectivity.max_col_length(num_src, num_trg)
        } else {
            num_src
        };

        let num_wu_vars = wu.model.vars.len();
        let num_ps_vars = ps.model.vars.len();
        let id = SynapseGroupId(self.synapse_groups.len());
        self.synapse_names.insert(name.clone(), id.0);
        let WeightUpdateInit {
            model: wu_model,
            params: wu_params,
            var_initialisers: wu_var_initialisers,
            pre_var_initialisers: wu_pre_var_initialisers,
            post_var_initialisers: wu_post_var_initialisers,
        } = weight_update;
        let PostsynapticInit {
            model: ps_model,
            params: ps_params,
            var_initialisers: ps_var_initialisers,
        } = postsynaptic;
        self.synapse_groups.push(SynapseGroup {
            name,
            src: src_id,
            trg: trg_id,
            matrix_type,
            delay_steps,
            back_prop_delay_steps: crate::NO_DELAY,
            max_dendritic_delay_timesteps: 1,
            max_connections,
            max_source_connections,
            wu_model,
            wu_params,
            wu_derived_params: Vec::new(),
            wu_var_initialisers,
            wu_pre_var_initialisers,
            wu_post_var_initialisers,
            ps_model,
            ps_params,
            ps_derived_params: Vec::new(),
            ps_var_initialisers,
            connectivity_initialiser: connectivity,
            ps_model_merge_target: String::new(),
            in_syn_location: self.default_var_location,
            sparse_connectivity_location: self.default_sparse_connectivity_location,
            wu_var_locations: vec![self.default_var_location; num_wu_vars],
            ps_var_locations: vec![self.default_var_location; num_ps_vars],
        });
        self.neuron_groups[src_id.0].out_syn.push(id);
        self.neuron_groups[trg_id.0].in_syn.push(id);
        Ok(id)
    }

    /// Set the back-propagation delay of an existing synapse population
    pub fn set_back_prop_delay(&mut self, id: SynapseGroupId, steps: usize) -> Result<()> {
        self.check_mutable()?;
        self.synapse_groups[id.0].back_prop_delay_steps = steps;
        Ok(())
    }

    /// Add a current source injecting into an existing population
    pub fn add_current_source(
        &mut self,
        name: impl Into<String>,
        model: Arc<CurrentSourceModel>,
        target: &str,
        params: Vec<f64>,
        var_initialisers: Vec<VarInit>,
    ) -> Result<CurrentSourceId> {
        let name = name.into();
        self.check_mutable()?;
        self.check_name_unused(&name)?;
        let target_id = self
            .find_neuron_group(target)
            .ok_or_else(|| SpecError::bad_reference(target))?;
        check_arity(&name, "parameters", model.param_names.len(), params.len())?;
        check_arity(&name, "variables", model.vars.len(), var_initialisers.len())?;

        let num_vars = model.vars.len();
        let id = CurrentSourceId(self.current_sources.len());
        self.current_source_names.insert(name.clone(), id.0);
        self.current_sources.push(CurrentSource {
            name,
            model,
            target: target_id,
            params,
            derived_params: Vec::new(),
            var_initialisers,
            var_locations: vec![self.default_var_location; num_vars],
        });
        self.neuron_groups[target_id.0].current_sources.push(id);
        Ok(id)
    }

    /// Assign a storage location to a pointer-typed extra global parameter
    /// of a neuron population
    pub fn set_neuron_egp_location(
        &mut self,
        id: NeuronGroupId,
        egp_name: &str,
        loc: VarLocation,
    ) -> Result<()> {
        self.check_mutable()?;
        let ng = &mut self.neuron_groups[id.0];
        let idx = ng
            .model
            .egp_index(egp_name)
            .ok_or_else(|| SpecError::bad_reference(egp_name))?;
        if !ng.model.egps[idx].is_pointer() {
            return Err(SpecError::EgpNotPointer {
                name: egp_name.to_string(),
            });
        }
        ng.egp_locations[idx] = loc;
        Ok(())
    }

    /// Finalize the specification: evaluate derived parameters, scan code
    /// fragments for queued-variable references, propagate delay slots,
    /// cache requirement flags and fuse postsynaptic models. Idempotent.
    pub fn finalize(&mut self) -> Result<()> {
        let dt = self.dt;

        // Reset state derived by a previous finalization
        for ng in &mut self.neuron_groups {
            ng.num_delay_slots = 1;
            ng.var_queue_required = vec![false; ng.model.vars.len()];
            ng.spike_event_condition.clear();
            ng.merged_in_syn.clear();
        }
        for sg in &mut self.synapse_groups {
            sg.ps_model_merge_target.clear();
        }

        // Derived parameters
        for ng in &mut self.neuron_groups {
            ng.init_derived_params(dt);
        }
        for sg in &mut self.synapse_groups {
            sg.init_derived_params(dt);
        }
        for cs in &mut self.current_sources {
            cs.init_derived_params(dt);
        }

        // Queue masks, delay slots and spike-event conditions
        for i in 0..self.synapse_groups.len() {
            let (src, trg, delay, back_prop, fragments, event_cond, support_ns) = {
                let sg = &self.synapse_groups[i];
                let wu = &sg.wu_model;
                let ns = if wu.support_code.is_empty() {
                    String::new()
                } else {
                    format!("{}_weightupdate", sg.name)
                };
                (
                    sg.src,
                    sg.trg,
                    sg.delay_steps,
                    sg.back_prop_delay_steps,
                    wu.sim_fragments().map(str::to_owned),
                    if sg.is_spike_event_required() {
                        Some(wu.event_threshold_condition_code.clone())
                    } else {
                        None
                    },
                    ns,
                )
            };
            for code in &fragments {
                self.neuron_groups[src.0].update_var_queues(code, "_pre");
                self.neuron_groups[trg.0].update_var_queues(code, "_post");
            }
            self.neuron_groups[src.0].check_num_delay_slots(delay);
            self.neuron_groups[trg.0].check_num_delay_slots(back_prop);
            if let Some(cond) = event_cond {
                self.neuron_groups[src.0].add_spike_event_condition(cond, support_ns);
            }
        }

        // Postsynaptic model fusion
        self.merge_incoming_psm();

        // Requirement flags
        for i in 0..self.neuron_groups.len() {
            let flags = self.compute_requirement_flags(i);
            let ng = &mut self.neuron_groups[i];
            ng.spike_time_required = flags.0;
            ng.prev_spike_time_required = flags.1;
            ng.spike_event_time_required = flags.2;
            ng.prev_spike_event_time_required = flags.3;
            ng.true_spike_required = flags.4;
            ng.spike_event_required = flags.5;
            ng.sim_rng_required = flags.6;
            ng.init_rng_required = flags.7;
        }

        self.finalized = true;
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn compute_requirement_flags(&self, i: usize) -> (bool, bool, bool, bool, bool, bool, bool, bool) {
        let ng = &self.neuron_groups[i];
        let in_syn = || ng.in_syn.iter().map(|&id| &self.synapse_groups[id.0]);
        let out_syn = || ng.out_syn.iter().map(|&id| &self.synapse_groups[id.0]);
        let sources = || ng.current_sources.iter().map(|&id| &self.current_sources[id.0]);

        let spike_time = in_syn().any(|sg| sg.wu_model.is_post_spike_time_required)
            || out_syn().any(|sg| sg.wu_model.is_pre_spike_time_required);
        let prev_spike_time = in_syn().any(|sg| sg.wu_model.is_prev_post_spike_time_required)
            || out_syn().any(|sg| sg.wu_model.is_prev_pre_spike_time_required);
        let spike_event_time = out_syn().any(|sg| sg.wu_model.is_pre_spike_event_time_required);
        let prev_spike_event_time =
            out_syn().any(|sg| sg.wu_model.is_prev_pre_spike_event_time_required);
        let true_spike = out_syn().any(|sg| sg.is_true_spike_required())
            || in_syn().any(|sg| !sg.wu_model.learn_post_code.is_empty());
        let spike_event = out_syn().any(|sg| sg.is_spike_event_required());
        // Postsynaptic models and adjacent pre/post weight-update fragments
        // are simulated inside the neuron kernel
        let sim_rng = ng.model.is_sim_rng_required()
            || sources().any(|cs| cs.is_sim_rng_required())
            || in_syn().any(|sg| {
                sg.ps_model.is_sim_rng_required()
                    || crate::utils::is_rng_required(&sg.wu_model.post_spike_code)
                    || crate::utils::is_rng_required(&sg.wu_model.post_dynamics_code)
            })
            || out_syn().any(|sg| {
                crate::utils::is_rng_required(&sg.wu_model.pre_spike_code)
                    || crate::utils::is_rng_required(&sg.wu_model.pre_dynamics_code)
            });
        let init_rng = crate::utils::is_rng_required_any(&ng.var_initialisers)
            || sources().any(|cs| cs.is_init_rng_required())
            || in_syn().any(|sg| {
                sg.is_ps_init_rng_required()
                    || crate::utils::is_rng_required_any(&sg.wu_post_var_initialisers)
            })
            || out_syn().any(|sg| crate::utils::is_rng_required_any(&sg.wu_pre_var_initialisers));

        (
            spike_time,
            prev_spike_time,
            spike_event_time,
            prev_spike_event_time,
            true_spike,
            spike_event,
            sim_rng,
            init_rng,
        )
    }

    fn merge_incoming_psm(&mut self) {
        let merge = self.merge_postsynaptic_models;
        let mut all_merged: Vec<(usize, Vec<MergedInSyn>)> = Vec::new();
        let mut targets: Vec<(usize, String)> = Vec::new();

        for (ng_idx, ng) in self.neuron_groups.iter().enumerate() {
            let mut in_syn: Vec<SynapseGroupId> = ng.in_syn.clone();
            let mut merged: Vec<MergedInSyn> = Vec::new();

            let mut i = 0usize;
            while let Some(a) = in_syn.pop() {
                let mut members = vec![a];

                // A postsynaptic model with state of its own cannot share
                // an accumulator, whatever its initialisers say
                if merge && self.synapse_groups[a.0].ps_model.vars.is_empty() {
                    let merged_name = format!("Merged{}_{}", i, ng.name);
                    let mut j = 0;
                    while j < in_syn.len() {
                        let b = in_syn[j];
                        if self.synapse_groups[a.0]
                            .can_ps_be_linearly_combined(&self.synapse_groups[b.0])
                        {
                            debug!(
                                from = %self.synapse_groups[b.0].name,
                                into = %self.synapse_groups[a.0].name,
                                target = %merged_name,
                                "fusing postsynaptic models"
                            );
                            members.push(b);
                            targets.push((b.0, merged_name.clone()));
                            in_syn.remove(j);
                        } else {
                            debug!(
                                a = %self.synapse_groups[a.0].name,
                                b = %self.synapse_groups[b.0].name,
                                "postsynaptic models not linearly combinable"
                            );
                            j += 1;
                        }
                    }
                    if members.len() > 1 {
                        targets.push((a.0, merged_name));
                    }
                }

                merged.push(MergedInSyn {
                    primary: a,
                    members,
                });
                i += 1;
            }
            all_merged.push((ng_idx, merged));
        }

        for (ng_idx, merged) in all_merged {
            self.neuron_groups[ng_idx].merged_in_syn = merged;
        }
        for (sg_idx, target) in targets {
            self.synapse_groups[sg_idx].ps_model_merge_target = target;
        }
    }

    fn check_mutable(&self) -> Result<()> {
        if self.finalized {
            return Err(SpecError::shape_mismatch(
                "specification is finalized and read-only",
            ));
        }
        Ok(())
    }

    fn check_name_unused(&self, name: &str) -> Result<()> {
        if self.neuron_names.contains_key(name)
            || self.synapse_names.contains_key(name)
            || self.current_source_names.contains_key(name)
        {
            return Err(SpecError::shape_mismatch(format!(
                "population '{}' declared twice",
                name
            )));
        }
        Ok(())
    }
}

fn check_arity(name: &str, what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SpecError::parameter_arity(
            format!("population '{}' {}", name, what),
            expected,
            actual,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{neuron_models, postsynaptic_models, weight_update_models};
    use crate::VarInit;

    fn lif_pop(spec: &mut ModelSpec, name: &str, n: usize) -> NeuronGroupId {
        spec.add_neuron_population(
            name,
            n,
            neuron_models::lif(),
            vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
            vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
        )
        .expect("add lif population")
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut spec = ModelSpec::new("dup");
        lif_pop(&mut spec, "E", 10);
        let err = spec
            .add_neuron_population(
                "E",
                10,
                neuron_models::lif(),
                vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
                vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::ShapeMismatch { .. }));
    }

    #[test]
    fn unknown_target_rejected() {
        let mut spec = ModelSpec::new("bad-ref");
        lif_pop(&mut spec, "E", 10);
        let err = spec
            .add_synapse_population(
                "EI",
                MatrixType::DenseGlobal,
                crate::NO_DELAY,
                "E",
                "I",
                WeightUpdateInit::new(
                    weight_update_models::static_pulse(),
                    vec![],
                    vec![VarInit::constant(0.1)],
                ),
                PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
                SparseConnectivityInit::uninitialised(),
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::BadReference { .. }));
    }

    #[test]
    fn parameter_arity_rejected() {
        let mut spec = ModelSpec::new("arity");
        let err = spec
            .add_neuron_population(
                "E",
                10,
                neuron_models::lif(),
                vec![1.0, 20.0],
                vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
            )
            .unwrap_err();
        assert!(matches!(err, SpecError::ParameterArity { .. }));
    }

    #[test]
    fn delay_slots_propagate_to_source() {
        let mut spec = ModelSpec::new("delay");
        lif_pop(&mut spec, "E", 10);
        lif_pop(&mut spec, "I", 10);
        spec.add_synapse_population(
            "EI",
            MatrixType::DenseGlobal,
            5,
            "E",
            "I",
            WeightUpdateInit::new(
                weight_update_models::static_pulse(),
                vec![],
                vec![VarInit::constant(0.1)],
            ),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
            SparseConnectivityInit::uninitialised(),
        )
        .expect("add synapse population");
        spec.finalize().expect("finalize");

        let e = spec.find_neuron_group("E").unwrap();
        assert_eq!(spec.neuron_group(e).num_delay_slots(), 6);
        assert!(spec.neuron_group(e).is_delay_required());
        let i = spec.find_neuron_group("I").unwrap();
        assert_eq!(spec.neuron_group(i).num_delay_slots(), 1);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut spec = ModelSpec::new("idem");
        lif_pop(&mut spec, "E", 10);
        lif_pop(&mut spec, "I", 10);
        spec.add_synapse_population(
            "EI",
            MatrixType::DenseGlobal,
            2,
            "E",
            "I",
            WeightUpdateInit::new(
                weight_update_models::static_pulse(),
                vec![],
                vec![VarInit::constant(0.1)],
            ),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
            SparseConnectivityInit::uninitialised(),
        )
        .expect("add synapse population");

        spec.finalize().expect("first finalize");
        let slots: Vec<usize> = spec.neuron_groups().iter().map(|n| n.num_delay_slots()).collect();
        let targets: Vec<String> = spec
            .synapse_groups()
            .iter()
            .map(|s| s.ps_model_target_name().to_string())
            .collect();

        spec.finalize().expect("second finalize");
        let slots2: Vec<usize> = spec.neuron_groups().iter().map(|n| n.num_delay_slots()).collect();
        let targets2: Vec<String> = spec
            .synapse_groups()
            .iter()
            .map(|s| s.ps_model_target_name().to_string())
            .collect();
        assert_eq!(slots, slots2);
        assert_eq!(targets, targets2);
    }
}
