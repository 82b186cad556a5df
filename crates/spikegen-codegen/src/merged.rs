//! Merged groups: equivalence classes of populations sharing emitted code
//!
//! The merging engine partitions populations greedily, one partition per
//! emission phase. For each unassigned group a new class is opened with
//! that group as archetype; every remaining group passing the phase's
//! equivalence relation against the archetype joins the class. Within a
//! class each parameter slot is either homogeneous (all members agree
//! bit-for-bit, emitted as a literal) or heterogeneous (emitted as a load
//! from a per-member field); the promotion decision is per slot.

use spikegen_model::{
    ModelSpec, NeuronGroup, NeuronGroupId, ScalarType, SynapseGroup, SynapseGroupId,
};
use tracing::debug;

use crate::error::{CodeGenError, Result};

/// A merged class of neuron populations for the update phase
#[derive(Debug)]
pub struct NeuronUpdateGroupMerged {
    index: usize,
    groups: Vec<NeuronGroupId>,
}

/// A merged class of neuron populations for the initialisation phase
#[derive(Debug)]
pub struct NeuronInitGroupMerged {
    index: usize,
    groups: Vec<NeuronGroupId>,
}

/// Which emission phase a merged synapse class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynapseMergedRole {
    /// Presynaptic spike and spike-like-event processing
    PresynapticUpdate,
    /// Postsynaptic (back-propagated) learning
    PostsynapticUpdate,
    /// Per-timestep synapse dynamics
    SynapseDynamics,
    /// Dense per-synapse variable initialisation
    DenseInit,
    /// Sparse or procedural connectivity building, and kernel variables
    ConnectivityInit,
    /// Per-synapse variable initialisation once sparse connectivity exists
    SparseInit,
}

/// A merged class of synapse populations for one emission phase
#[derive(Debug)]
pub struct SynapseGroupMerged {
    index: usize,
    role: SynapseMergedRole,
    groups: Vec<SynapseGroupId>,
}

fn any_differs<I: Copy, F: Fn(I) -> f64>(groups: &[I], value: F) -> bool {
    let first = value(groups[0]).to_bits();
    groups[1..].iter().any(|&g| value(g).to_bits() != first)
}

impl NeuronUpdateGroupMerged {
    /// Class index, unique within the update partition
    pub fn index(&self) -> usize {
        self.index
    }

    /// Member populations
    pub fn groups(&self) -> &[NeuronGroupId] {
        &self.groups
    }

    /// The canonical member whose code fragments drive emission
    pub fn archetype<'s>(&self, spec: &'s ModelSpec) -> &'s NeuronGroup {
        spec.neuron_group(self.groups[0])
    }

    /// Whether neuron parameter `p` varies across members
    pub fn is_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| spec.neuron_group(g).params()[p])
    }

    /// Whether neuron derived parameter `p` varies across members
    pub fn is_derived_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| spec.neuron_group(g).derived_params()[p])
    }

    /// Whether weight-update parameter `p` of the `i`th outgoing population
    /// with presynaptic variables varies across members
    pub fn is_out_syn_wu_param_heterogeneous(&self, spec: &ModelSpec, i: usize, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).out_syn_with_pre_vars(spec);
            spec.synapse_group(sgs[i]).wu_params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_out_syn_wu_param_heterogeneous`]
    pub fn is_out_syn_wu_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).out_syn_with_pre_vars(spec);
            spec.synapse_group(sgs[i]).wu_derived_params()[p]
        })
    }

    /// Whether weight-update parameter `p` of the `i`th incoming population
    /// with postsynaptic variables varies across members
    pub fn is_in_syn_wu_param_heterogeneous(&self, spec: &ModelSpec, i: usize, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).in_syn_with_post_vars(spec);
            spec.synapse_group(sgs[i]).wu_params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_in_syn_wu_param_heterogeneous`]
    pub fn is_in_syn_wu_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).in_syn_with_post_vars(spec);
            spec.synapse_group(sgs[i]).wu_derived_params()[p]
        })
    }
}

impl NeuronInitGroupMerged {
    /// Class index, unique within the init partition
    pub fn index(&self) -> usize {
        self.index
    }

    /// Member populations
    pub fn groups(&self) -> &[NeuronGroupId] {
        &self.groups
    }

    /// The canonical member whose code fragments drive emission
    pub fn archetype<'s>(&self, spec: &'s ModelSpec) -> &'s NeuronGroup {
        spec.neuron_group(self.groups[0])
    }

    /// Whether parameter `p` of variable `v`'s initialiser varies across
    /// members
    pub fn is_var_init_param_heterogeneous(&self, spec: &ModelSpec, v: usize, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(g).var_initialisers()[v].params()[p]
        })
    }

    /// Derived-parameter flavour of [`Self::is_var_init_param_heterogeneous`]
    pub fn is_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(g).var_initialisers()[v].derived_params()[p]
        })
    }

    /// Whether parameter `p` of postsynaptic variable `v`'s initialiser on
    /// incoming entry `i` varies across members
    pub fn is_psm_var_init_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let primary = spec.neuron_group(g).merged_in_syn()[i].primary;
            spec.synapse_group(primary).ps_var_initialisers()[v].params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_psm_var_init_param_heterogeneous`]
    pub fn is_psm_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let primary = spec.neuron_group(g).merged_in_syn()[i].primary;
            spec.synapse_group(primary).ps_var_initialisers()[v].derived_params()[p]
        })
    }

    /// Whether parameter `p` of postsynaptic weight-update variable `v`'s
    /// initialiser on the `i`th incoming population varies across members
    pub fn is_in_syn_wu_var_init_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).in_syn_with_post_vars(spec);
            spec.synapse_group(sgs[i]).wu_post_var_initialisers()[v].params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_in_syn_wu_var_init_param_heterogeneous`]
    pub fn is_in_syn_wu_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).in_syn_with_post_vars(spec);
            spec.synapse_group(sgs[i]).wu_post_var_initialisers()[v].derived_params()[p]
        })
    }

    /// Whether parameter `p` of presynaptic weight-update variable `v`'s
    /// initialiser on the `i`th outgoing population varies across members
    pub fn is_out_syn_wu_var_init_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).out_syn_with_pre_vars(spec);
            spec.synapse_group(sgs[i]).wu_pre_var_initialisers()[v].params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_out_syn_wu_var_init_param_heterogeneous`]
    pub fn is_out_syn_wu_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let sgs = spec.neuron_group(g).out_syn_with_pre_vars(spec);
            spec.synapse_group(sgs[i]).wu_pre_var_initialisers()[v].derived_params()[p]
        })
    }

    /// Whether parameter `p` of current-source variable `v`'s initialiser on
    /// source `i` varies across members
    pub fn is_current_source_var_init_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let cs = spec.neuron_group(g).current_sources()[i];
            spec.current_source(cs).var_initialisers()[v].params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_current_source_var_init_param_heterogeneous`]
    pub fn is_current_source_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        i: usize,
        v: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            let cs = spec.neuron_group(g).current_sources()[i];
            spec.current_source(cs).var_initialisers()[v].derived_params()[p]
        })
    }
}

impl SynapseGroupMerged {
    /// Class index, unique within its role's partition
    pub fn index(&self) -> usize {
        self.index
    }

    /// Emission phase this class belongs to
    pub fn role(&self) -> SynapseMergedRole {
        self.role
    }

    /// Member populations
    pub fn groups(&self) -> &[SynapseGroupId] {
        &self.groups
    }

    /// The canonical member whose code fragments drive emission
    pub fn archetype<'s>(&self, spec: &'s ModelSpec) -> &'s SynapseGroup {
        spec.synapse_group(self.groups[0])
    }

    /// Whether weight-update parameter `p` varies across members
    pub fn is_wu_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| spec.synapse_group(g).wu_params()[p])
    }

    /// Whether weight-update derived parameter `p` varies across members
    pub fn is_wu_derived_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| spec.synapse_group(g).wu_derived_params()[p])
    }

    /// Whether parameter `p` of weight-update variable `k`'s initialiser
    /// varies across members
    pub fn is_wu_var_init_param_heterogeneous(&self, spec: &ModelSpec, k: usize, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.synapse_group(g).wu_var_initialisers()[k].params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_wu_var_init_param_heterogeneous`]
    pub fn is_wu_var_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        k: usize,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            spec.synapse_group(g).wu_var_initialisers()[k].derived_params()[p]
        })
    }

    /// Whether connectivity-initialiser parameter `p` varies across members
    pub fn is_connectivity_init_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.synapse_group(g).connectivity_initialiser().params()[p]
        })
    }

    /// Derived-parameter flavour of
    /// [`Self::is_connectivity_init_param_heterogeneous`]
    pub fn is_connectivity_init_derived_param_heterogeneous(
        &self,
        spec: &ModelSpec,
        p: usize,
    ) -> bool {
        any_differs(&self.groups, |g| {
            spec.synapse_group(g)
                .connectivity_initialiser()
                .derived_params()[p]
        })
    }

    /// Whether source-population neuron parameter `p` varies across members
    pub fn is_src_neuron_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(spec.synapse_group(g).src()).params()[p]
        })
    }

    /// Whether source-population derived parameter `p` varies across members
    pub fn is_src_neuron_derived_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(spec.synapse_group(g).src()).derived_params()[p]
        })
    }

    /// Whether target-population neuron parameter `p` varies across members
    pub fn is_trg_neuron_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(spec.synapse_group(g).trg()).params()[p]
        })
    }

    /// Whether target-population derived parameter `p` varies across members
    pub fn is_trg_neuron_derived_param_heterogeneous(&self, spec: &ModelSpec, p: usize) -> bool {
        any_differs(&self.groups, |g| {
            spec.neuron_group(spec.synapse_group(g).trg()).derived_params()[p]
        })
    }
}

/// All merged partitions derived from one finalized specification
#[derive(Debug)]
pub struct ModelSpecMerged<'a> {
    spec: &'a ModelSpec,
    neuron_update_groups: Vec<NeuronUpdateGroupMerged>,
    neuron_init_groups: Vec<NeuronInitGroupMerged>,
    presynaptic_update_groups: Vec<SynapseGroupMerged>,
    postsynaptic_update_groups: Vec<SynapseGroupMerged>,
    synapse_dynamics_groups: Vec<SynapseGroupMerged>,
    synapse_dense_init_groups: Vec<SynapseGroupMerged>,
    synapse_connectivity_init_groups: Vec<SynapseGroupMerged>,
    synapse_sparse_init_groups: Vec<SynapseGroupMerged>,
}

impl<'a> ModelSpecMerged<'a> {
    /// Partition a finalized specification into merged groups
    pub fn new(spec: &'a ModelSpec) -> Result<Self> {
        if !spec.is_finalized() {
            return Err(CodeGenError::Spec(spikegen_model::SpecError::shape_mismatch(
                "specification must be finalized before merging",
            )));
        }

        let ng_ids = spec.neuron_group_ids();

        let neuron_update_groups = partition(ng_ids.clone(), |a, b| {
            spec.neuron_group(a)
                .can_be_merged_with(spec.neuron_group(b), spec)
        })
        .into_iter()
        .enumerate()
        .map(|(index, groups)| NeuronUpdateGroupMerged { index, groups })
        .collect::<Vec<_>>();

        let neuron_init_groups = partition(ng_ids, |a, b| {
            spec.neuron_group(a)
                .can_init_be_merged_with(spec.neuron_group(b), spec)
        })
        .into_iter()
        .enumerate()
        .map(|(index, groups)| NeuronInitGroupMerged { index, groups })
        .collect::<Vec<_>>();

        for g in &neuron_update_groups {
            debug!(
                index = g.index,
                members = g.groups.len(),
                archetype = %g.archetype(spec).name(),
                "merged neuron update group"
            );
        }

        let synapse_partition = |role: SynapseMergedRole,
                                 filter: &dyn Fn(&SynapseGroup) -> bool,
                                 rel: &dyn Fn(SynapseGroupId, SynapseGroupId) -> bool|
         -> Vec<SynapseGroupMerged> {
            let ids: Vec<SynapseGroupId> = spec
                .synapse_group_ids()
                .into_iter()
                .filter(|&id| filter(spec.synapse_group(id)))
                .collect();
            partition(ids, rel)
                .into_iter()
                .enumerate()
                .map(|(index, groups)| SynapseGroupMerged {
                    index,
                    role,
                    groups,
                })
                .collect()
        };

        let update_rel =
            |a: SynapseGroupId, b: SynapseGroupId| wu_update_mergeable(spec, a, b);
        let presynaptic_update_groups = synapse_partition(
            SynapseMergedRole::PresynapticUpdate,
            &|sg| sg.is_true_spike_required() || sg.is_spike_event_required(),
            &update_rel,
        );
        let postsynaptic_update_groups = synapse_partition(
            SynapseMergedRole::PostsynapticUpdate,
            &|sg| !sg.wu_model().learn_post_code.is_empty(),
            &update_rel,
        );
        let synapse_dynamics_groups = synapse_partition(
            SynapseMergedRole::SynapseDynamics,
            &|sg| !sg.wu_model().synapse_dynamics_code.is_empty(),
            &update_rel,
        );

        let init_rel = |a: SynapseGroupId, b: SynapseGroupId| wu_init_mergeable(spec, a, b);
        let synapse_dense_init_groups = synapse_partition(
            SynapseMergedRole::DenseInit,
            &|sg| {
                sg.matrix_type().has_individual_weights()
                    && sg.matrix_type().is_dense()
                    && has_non_kernel_init(sg)
            },
            &init_rel,
        );
        let synapse_sparse_init_groups = synapse_partition(
            SynapseMergedRole::SparseInit,
            &|sg| {
                sg.matrix_type().has_individual_weights()
                    && sg.matrix_type().is_sparse()
                    && has_non_kernel_init(sg)
            },
            &init_rel,
        );

        let connectivity_rel =
            |a: SynapseGroupId, b: SynapseGroupId| connectivity_init_mergeable(spec, a, b);
        let synapse_connectivity_init_groups = synapse_partition(
            SynapseMergedRole::ConnectivityInit,
            &|sg| {
                let built = (sg.matrix_type().is_sparse() || sg.matrix_type().is_bitmask())
                    && (!sg.connectivity_initialiser().snippet().row_build_code.is_empty()
                        || !sg.connectivity_initialiser().snippet().col_build_code.is_empty());
                let kernel = sg.matrix_type().has_kernel_weights()
                    && sg
                        .wu_var_initialisers()
                        .iter()
                        .any(|init| init.snippet().requires_kernel());
                built || kernel
            },
            &connectivity_rel,
        );

        Ok(Self {
            spec,
            neuron_update_groups,
            neuron_init_groups,
            presynaptic_update_groups,
            postsynaptic_update_groups,
            synapse_dynamics_groups,
            synapse_dense_init_groups,
            synapse_connectivity_init_groups,
            synapse_sparse_init_groups,
        })
    }

    /// The underlying read-only specification
    pub fn spec(&self) -> &'a ModelSpec {
        self.spec
    }

    /// Scalar precision of emitted literals
    pub fn scalar_type(&self) -> ScalarType {
        self.spec.precision()
    }

    /// Precision of spike-time storage
    pub fn time_type(&self) -> ScalarType {
        self.spec.time_precision()
    }

    /// Merged neuron update classes
    pub fn neuron_update_groups(&self) -> &[NeuronUpdateGroupMerged] {
        &self.neuron_update_groups
    }

    /// Merged neuron initialisation classes
    pub fn neuron_init_groups(&self) -> &[NeuronInitGroupMerged] {
        &self.neuron_init_groups
    }

    /// Merged presynaptic update classes
    pub fn presynaptic_update_groups(&self) -> &[SynapseGroupMerged] {
        &self.presynaptic_update_groups
    }

    /// Merged postsynaptic learning classes
    pub fn postsynaptic_update_groups(&self) -> &[SynapseGroupMerged] {
        &self.postsynaptic_update_groups
    }

    /// Merged synapse dynamics classes
    pub fn synapse_dynamics_groups(&self) -> &[SynapseGroupMerged] {
        &self.synapse_dynamics_groups
    }

    /// Merged dense initialisation classes
    pub fn synapse_dense_init_groups(&self) -> &[SynapseGroupMerged] {
        &self.synapse_dense_init_groups
    }

    /// Merged connectivity-building classes
    pub fn synapse_connectivity_init_groups(&self) -> &[SynapseGroupMerged] {
        &self.synapse_connectivity_init_groups
    }

    /// Merged sparse variable initialisation classes
    pub fn synapse_sparse_init_groups(&self) -> &[SynapseGroupMerged] {
        &self.synapse_sparse_init_groups
    }
}

fn has_non_kernel_init(sg: &SynapseGroup) -> bool {
    sg.wu_var_initialisers()
        .iter()
        .any(|init| !init.snippet().code.is_empty() && !init.snippet().requires_kernel())
}

/// Greedy partition: open a class for the first unassigned group, sweep the
/// remainder for anything mergeable with the class archetype, repeat
fn partition<T: Copy>(ids: Vec<T>, rel: impl Fn(T, T) -> bool) -> Vec<Vec<T>> {
    let mut classes: Vec<Vec<T>> = Vec::new();
    let mut remaining = ids;
    while !remaining.is_empty() {
        let archetype = remaining.remove(0);
        let mut class = vec![archetype];
        remaining.retain(|&g| {
            if rel(archetype, g) {
                class.push(g);
                false
            } else {
                true
            }
        });
        classes.push(class);
    }
    classes
}

/// Update-phase equivalence of synapse populations: identical weight-update
/// model, matrix class and delay structure; endpoint neuron models must
/// themselves be mergeable so that `_pre`/`_post` substitutions agree.
/// Parameter values are promoted per slot and never block merging.
fn wu_update_mergeable(spec: &ModelSpec, a: SynapseGroupId, b: SynapseGroupId) -> bool {
    let a = spec.synapse_group(a);
    let b = spec.synapse_group(b);
    let src_a = spec.neuron_group(a.src());
    let src_b = spec.neuron_group(b.src());
    let trg_a = spec.neuron_group(a.trg());
    let trg_b = spec.neuron_group(b.trg());

    let structural = a.wu_model().can_be_merged(b.wu_model())
        && a.matrix_type() == b.matrix_type()
        && a.delay_steps() == b.delay_steps()
        && a.back_prop_delay_steps() == b.back_prop_delay_steps()
        && a.is_dendritic_delay_required() == b.is_dendritic_delay_required()
        && a.max_dendritic_delay_timesteps() == b.max_dendritic_delay_timesteps()
        && src_a.model().can_be_merged(src_b.model())
        && trg_a.model().can_be_merged(trg_b.model())
        && src_a.is_delay_required() == src_b.is_delay_required()
        && src_a.num_delay_slots() == src_b.num_delay_slots()
        && trg_a.is_delay_required() == trg_b.is_delay_required()
        && trg_a.num_delay_slots() == trg_b.num_delay_slots();
    if !structural {
        return false;
    }
    if a.matrix_type().is_procedural_connectivity()
        && !a
            .connectivity_initialiser()
            .can_be_merged(b.connectivity_initialiser())
    {
        return false;
    }
    if a.matrix_type().has_procedural_weights() {
        return wu_var_inits_mergeable(a, b);
    }
    true
}

/// Init-phase equivalence of synapse populations
fn wu_init_mergeable(spec: &ModelSpec, a: SynapseGroupId, b: SynapseGroupId) -> bool {
    let a = spec.synapse_group(a);
    let b = spec.synapse_group(b);
    a.matrix_type() == b.matrix_type()
        && a.wu_model().vars == b.wu_model().vars
        && wu_var_inits_mergeable(a, b)
}

/// Connectivity-building equivalence of synapse populations
fn connectivity_init_mergeable(spec: &ModelSpec, a: SynapseGroupId, b: SynapseGroupId) -> bool {
    let a = spec.synapse_group(a);
    let b = spec.synapse_group(b);
    if a.matrix_type() != b.matrix_type()
        || !a
            .connectivity_initialiser()
            .can_be_merged(b.connectivity_initialiser())
    {
        return false;
    }
    if a.matrix_type().has_kernel_weights() {
        return a.wu_model().vars == b.wu_model().vars && wu_var_inits_mergeable(a, b);
    }
    true
}

fn wu_var_inits_mergeable(a: &SynapseGroup, b: &SynapseGroup) -> bool {
    a.wu_var_initialisers().len() == b.wu_var_initialisers().len()
        && a.wu_var_initialisers()
            .iter()
            .zip(b.wu_var_initialisers())
            .all(|(x, y)| x.can_be_merged(y))
}
