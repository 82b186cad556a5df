//! Common definitions header: merged-group structs, instance arrays and
//! push helpers
//!
//! The field tables computed here are the contract between the emitters
//! (which reference `group-><field>`) and the runtime (which fills one
//! struct per merged-group member before pushing the array to the device).

use spikegen_model::{ModelSpec, ScalarType, SynapseGroup};

use crate::backend::Backend;
use crate::code_stream::CodeStream;
use crate::error::Result;
use crate::merged::{
    ModelSpecMerged, NeuronInitGroupMerged, NeuronUpdateGroupMerged, SynapseGroupMerged,
    SynapseMergedRole,
};
use crate::precision::scalar_literal;

/// One field of a merged-group struct
#[derive(Debug, Clone)]
pub struct Field {
    /// Field type as emitted
    pub ty: String,
    /// Field name as emitted
    pub name: String,
}

impl Field {
    fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

fn ptr(ty: &str) -> String {
    format!("{}*", ty)
}

/// Fields of a merged neuron update group struct
pub fn neuron_update_group_fields(
    spec: &ModelSpec,
    g: &NeuronUpdateGroupMerged,
) -> Vec<Field> {
    let ng = g.archetype(spec);
    let nm = ng.model();
    let mut fields = vec![Field::new("unsigned int", "numNeurons")];

    for v in &nm.vars {
        fields.push(Field::new(ptr(&v.ty), &v.name));
    }
    fields.push(Field::new("unsigned int*", "spkCnt"));
    fields.push(Field::new("unsigned int*", "spk"));
    if ng.is_spike_event_required() {
        fields.push(Field::new("unsigned int*", "spkCntEvnt"));
        fields.push(Field::new("unsigned int*", "spkEvnt"));
    }
    if ng.is_delay_required() {
        fields.push(Field::new("unsigned int*", "spkQuePtr"));
    }
    if ng.is_spike_time_required() {
        fields.push(Field::new("timepoint*", "sT"));
    }
    if ng.is_prev_spike_time_required() {
        fields.push(Field::new("timepoint*", "prevST"));
    }
    if ng.is_spike_event_time_required() {
        fields.push(Field::new("timepoint*", "seT"));
    }
    if ng.is_prev_spike_event_time_required() {
        fields.push(Field::new("timepoint*", "prevSET"));
    }
    for e in &nm.egps {
        fields.push(Field::new(&e.ty, &e.name));
    }
    for (p, name) in nm.param_names.iter().enumerate() {
        if g.is_param_heterogeneous(spec, p) {
            fields.push(Field::new("scalar", name));
        }
    }
    for (p, d) in nm.derived_params.iter().enumerate() {
        if g.is_derived_param_heterogeneous(spec, p) {
            fields.push(Field::new("scalar", &d.name));
        }
    }

    for (i, m) in ng.merged_in_syn().iter().enumerate() {
        let sg = spec.synapse_group(m.primary);
        fields.push(Field::new("scalar*", format!("inSynInSyn{}", i)));
        if sg.is_dendritic_delay_required() {
            fields.push(Field::new("scalar*", format!("denDelayInSyn{}", i)));
            fields.push(Field::new("unsigned int*", format!("denDelayPtrInSyn{}", i)));
        }
        if sg.matrix_type().has_individual_psm() {
            for v in &sg.ps_model().vars {
                fields.push(Field::new(ptr(&v.ty), format!("{}InSyn{}", v.name, i)));
            }
        }
        for e in &sg.ps_model().egps {
            fields.push(Field::new(&e.ty, format!("{}InSyn{}", e.name, i)));
        }
    }

    for (i, &sg_id) in ng.out_syn_with_pre_vars(spec).iter().enumerate() {
        let sg = spec.synapse_group(sg_id);
        for v in &sg.wu_model().pre_vars {
            fields.push(Field::new(ptr(&v.ty), format!("{}WUPre{}", v.name, i)));
        }
        for (p, name) in sg.wu_model().param_names.iter().enumerate() {
            if g.is_out_syn_wu_param_heterogeneous(spec, i, p) {
                fields.push(Field::new("scalar", format!("{}WUPre{}", name, i)));
            }
        }
        for (p, d) in sg.wu_model().derived_params.iter().enumerate() {
            if g.is_out_syn_wu_derived_param_heterogeneous(spec, i, p) {
                fields.push(Field::new("scalar", format!("{}WUPre{}", d.name, i)));
            }
        }
    }
    for (i, &sg_id) in ng.in_syn_with_post_vars(spec).iter().enumerate() {
        let sg = spec.synapse_group(sg_id);
        for v in &sg.wu_model().post_vars {
            fields.push(Field::new(ptr(&v.ty), format!("{}WUPost{}", v.name, i)));
        }
        for (p, name) in sg.wu_model().param_names.iter().enumerate() {
            if g.is_in_syn_wu_param_heterogeneous(spec, i, p) {
                fields.push(Field::new("scalar", format!("{}WUPost{}", name, i)));
            }
        }
        for (p, d) in sg.wu_model().derived_params.iter().enumerate() {
            if g.is_in_syn_wu_derived_param_heterogeneous(spec, i, p) {
                fields.push(Field::new("scalar", format!("{}WUPost{}", d.name, i)));
            }
        }
    }

    for (i, &cs_id) in ng.current_sources().iter().enumerate() {
        let cs = spec.current_source(cs_id);
        for v in &cs.model().vars {
            fields.push(Field::new(ptr(&v.ty), format!("{}CS{}", v.name, i)));
        }
        for e in &cs.model().egps {
            fields.push(Field::new(&e.ty, format!("{}CS{}", e.name, i)));
        }
    }

    fields
}

/// Fields of a merged neuron initialisation group struct
pub fn neuron_init_group_fields(spec: &ModelSpec, g: &NeuronInitGroupMerged) -> Vec<Field> {
    let ng = g.archetype(spec);
    let nm = ng.model();
    let mut fields = vec![Field::new("unsigned int", "numNeurons")];

    for v in &nm.vars {
        fields.push(Field::new(ptr(&v.ty), &v.name));
    }
    fields.push(Field::new("unsigned int*", "spkCnt"));
    fields.push(Field::new("unsigned int*", "spk"));
    if ng.is_spike_event_required() {
        fields.push(Field::new("unsigned int*", "spkCntEvnt"));
        fields.push(Field::new("unsigned int*", "spkEvnt"));
    }
    if ng.is_delay_required() {
        fields.push(Field::new("unsigned int*", "spkQuePtr"));
    }
    if ng.is_spike_time_required() {
        fields.push(Field::new("timepoint*", "sT"));
    }
    if ng.is_prev_spike_time_required() {
        fields.push(Field::new("timepoint*", "prevST"));
    }
    if ng.is_spike_event_time_required() {
        fields.push(Field::new("timepoint*", "seT"));
    }
    if ng.is_prev_spike_event_time_required() {
        fields.push(Field::new("timepoint*", "prevSET"));
    }

    for (v_idx, v) in nm.vars.iter().enumerate() {
        let init = &ng.var_initialisers()[v_idx];
        for (p, name) in init.snippet().param_names.iter().enumerate() {
            if g.is_var_init_param_heterogeneous(spec, v_idx, p) {
                fields.push(Field::new("scalar", format!("{}{}", name, v.name)));
            }
        }
        for (p, d) in init.snippet().derived_params.iter().enumerate() {
            if g.is_var_init_derived_param_heterogeneous(spec, v_idx, p) {
                fields.push(Field::new("scalar", format!("{}{}", d.name, v.name)));
            }
        }
        for e in &init.snippet().egps {
            fields.push(Field::new(&e.ty, format!("{}{}", e.name, v.name)));
        }
    }

    for (i, m) in ng.merged_in_syn().iter().enumerate() {
        let sg = spec.synapse_group(m.primary);
        fields.push(Field::new("scalar*", format!("inSynInSyn{}", i)));
        if sg.is_dendritic_delay_required() {
            fields.push(Field::new("scalar*", format!("denDelayInSyn{}", i)));
            fields.push(Field::new("unsigned int*", format!("denDelayPtrInSyn{}", i)));
        }
        if sg.matrix_type().has_individual_psm() {
            for (v_idx, v) in sg.ps_model().vars.iter().enumerate() {
                fields.push(Field::new(ptr(&v.ty), format!("{}InSyn{}", v.name, i)));
                let init = &sg.ps_var_initialisers()[v_idx];
                for (p, name) in init.snippet().param_names.iter().enumerate() {
                    if g.is_psm_var_init_param_heterogeneous(spec, i, v_idx, p) {
                        fields.push(Field::new(
                            "scalar",
                            format!("{}{}InSyn{}", name, v.name, i),
                        ));
                    }
                }
                for (p, d) in init.snippet().derived_params.iter().enumerate() {
                    if g.is_psm_var_init_derived_param_heterogeneous(spec, i, v_idx, p) {
                        fields.push(Field::new(
                            "scalar",
                            format!("{}{}InSyn{}", d.name, v.name, i),
                        ));
                    }
                }
                for e in &init.snippet().egps {
                    fields.push(Field::new(&e.ty, format!("{}{}InSyn{}", e.name, v.name, i)));
                }
            }
        }
    }

    for (i, &sg_id) in ng.in_syn_with_post_vars(spec).iter().enumerate() {
        let sg = spec.synapse_group(sg_id);
        for (v_idx, v) in sg.wu_model().post_vars.iter().enumerate() {
            fields.push(Field::new(ptr(&v.ty), format!("{}WUPost{}", v.name, i)));
            let init = &sg.wu_post_var_initialisers()[v_idx];
            for (p, name) in init.snippet().param_names.iter().enumerate() {
                if g.is_in_syn_wu_var_init_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new("scalar", format!("{}{}WUPost{}", name, v.name, i)));
                }
            }
            for (p, d) in init.snippet().derived_params.iter().enumerate() {
                if g.is_in_syn_wu_var_init_derived_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new(
                        "scalar",
                        format!("{}{}WUPost{}", d.name, v.name, i),
                    ));
                }
            }
        }
    }
    for (i, &sg_id) in ng.out_syn_with_pre_vars(spec).iter().enumerate() {
        let sg = spec.synapse_group(sg_id);
        for (v_idx, v) in sg.wu_model().pre_vars.iter().enumerate() {
            fields.push(Field::new(ptr(&v.ty), format!("{}WUPre{}", v.name, i)));
            let init = &sg.wu_pre_var_initialisers()[v_idx];
            for (p, name) in init.snippet().param_names.iter().enumerate() {
                if g.is_out_syn_wu_var_init_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new("scalar", format!("{}{}WUPre{}", name, v.name, i)));
                }
            }
            for (p, d) in init.snippet().derived_params.iter().enumerate() {
                if g.is_out_syn_wu_var_init_derived_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new(
                        "scalar",
                        format!("{}{}WUPre{}", d.name, v.name, i),
                    ));
                }
            }
        }
    }

    for (i, &cs_id) in ng.current_sources().iter().enumerate() {
        let cs = spec.current_source(cs_id);
        for (v_idx, v) in cs.model().vars.iter().enumerate() {
            fields.push(Field::new(ptr(&v.ty), format!("{}CS{}", v.name, i)));
            let init = &cs.var_initialisers()[v_idx];
            for (p, name) in init.snippet().param_names.iter().enumerate() {
                if g.is_current_source_var_init_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new("scalar", format!("{}{}CS{}", name, v.name, i)));
                }
            }
            for (p, d) in init.snippet().derived_params.iter().enumerate() {
                if g.is_current_source_var_init_derived_param_heterogeneous(spec, i, v_idx, p) {
                    fields.push(Field::new("scalar", format!("{}{}CS{}", d.name, v.name, i)));
                }
            }
        }
    }

    fields
}

/// Whether any fragment emitted in the synapse-update module references
/// the placeholder `$(name)`. Pre/post spike and dynamics fragments run in
/// the neuron body against locals and never touch these fields.
fn wu_references(sg: &SynapseGroup, name: &str) -> bool {
    let token = format!("$({})", name);
    let wu = sg.wu_model();
    [
        wu.sim_code.as_str(),
        wu.event_code.as_str(),
        wu.event_threshold_condition_code.as_str(),
        wu.learn_post_code.as_str(),
        wu.synapse_dynamics_code.as_str(),
    ]
    .iter()
    .any(|f| f.contains(&token))
}

/// Fields of a merged synapse group struct for any role
pub fn synapse_group_fields(spec: &ModelSpec, g: &SynapseGroupMerged) -> Vec<Field> {
    let sg = g.archetype(spec);
    let wu = sg.wu_model();
    let src = spec.neuron_group(sg.src());
    let trg = spec.neuron_group(sg.trg());
    let matrix = sg.matrix_type();
    let role = g.role();

    let mut fields = vec![
        Field::new("unsigned int", "numSrcNeurons"),
        Field::new("unsigned int", "numTrgNeurons"),
        Field::new("unsigned int", "rowStride"),
    ];

    let update_role = matches!(
        role,
        SynapseMergedRole::PresynapticUpdate
            | SynapseMergedRole::PostsynapticUpdate
            | SynapseMergedRole::SynapseDynamics
    );

    if matrix.is_sparse() {
        fields.push(Field::new("unsigned int*", "rowLength"));
        fields.push(Field::new("unsigned int*", "ind"));
    }
    if matrix.is_bitmask() {
        fields.push(Field::new("uint32_t*", "gp"));
    }

    match role {
        SynapseMergedRole::DenseInit | SynapseMergedRole::SparseInit => {
            for (k, v) in wu.vars.iter().enumerate() {
                fields.push(Field::new(ptr(&v.ty), &v.name));
                let init = &sg.wu_var_initialisers()[k];
                for (p, name) in init.snippet().param_names.iter().enumerate() {
                    if g.is_wu_var_init_param_heterogeneous(spec, k, p) {
                        fields.push(Field::new("scalar", format!("{}{}", name, v.name)));
                    }
                }
                for (p, d) in init.snippet().derived_params.iter().enumerate() {
                    if g.is_wu_var_init_derived_param_heterogeneous(spec, k, p) {
                        fields.push(Field::new("scalar", format!("{}{}", d.name, v.name)));
                    }
                }
                for e in &init.snippet().egps {
                    fields.push(Field::new(&e.ty, format!("{}{}", e.name, v.name)));
                }
            }
            return fields;
        }
        SynapseMergedRole::ConnectivityInit => {
            let conn = sg.connectivity_initialiser();
            for (p, name) in conn.snippet().param_names.iter().enumerate() {
                if g.is_connectivity_init_param_heterogeneous(spec, p) {
                    fields.push(Field::new("scalar", name));
                }
            }
            for (p, d) in conn.snippet().derived_params.iter().enumerate() {
                if g.is_connectivity_init_derived_param_heterogeneous(spec, p) {
                    fields.push(Field::new("scalar", &d.name));
                }
            }
            for e in &conn.snippet().egps {
                fields.push(Field::new(&e.ty, &e.name));
            }
            if matrix.has_kernel_weights() {
                for (k, v) in wu.vars.iter().enumerate() {
                    fields.push(Field::new(ptr(&v.ty), &v.name));
                    let init = &sg.wu_var_initialisers()[k];
                    for (p, name) in init.snippet().param_names.iter().enumerate() {
                        if g.is_wu_var_init_param_heterogeneous(spec, k, p) {
                            fields.push(Field::new("scalar", format!("{}{}", name, v.name)));
                        }
                    }
                    for (p, d) in init.snippet().derived_params.iter().enumerate() {
                        if g.is_wu_var_init_derived_param_heterogeneous(spec, k, p) {
                            fields.push(Field::new("scalar", format!("{}{}", d.name, v.name)));
                        }
                    }
                }
            }
            return fields;
        }
        _ => {}
    }

    debug_assert!(update_role);

    fields.push(Field::new("scalar*", "inSyn"));
    if sg.is_dendritic_delay_required() {
        fields.push(Field::new("scalar*", "denDelay"));
        fields.push(Field::new("unsigned int*", "denDelayPtr"));
    }

    match role {
        SynapseMergedRole::PresynapticUpdate => {
            fields.push(Field::new("unsigned int*", "srcSpkCnt"));
            fields.push(Field::new("unsigned int*", "srcSpk"));
            if sg.is_spike_event_required() {
                fields.push(Field::new("unsigned int*", "srcSpkCntEvnt"));
                fields.push(Field::new("unsigned int*", "srcSpkEvnt"));
            }
        }
        SynapseMergedRole::PostsynapticUpdate => {
            fields.push(Field::new("unsigned int*", "trgSpkCnt"));
            fields.push(Field::new("unsigned int*", "trgSpk"));
            if matrix.is_sparse() {
                fields.push(Field::new("unsigned int", "colStride"));
                fields.push(Field::new("unsigned int*", "colLength"));
                fields.push(Field::new("unsigned int*", "remap"));
            }
        }
        _ => {}
    }
    if src.is_delay_required() {
        fields.push(Field::new("unsigned int*", "srcSpkQuePtr"));
    }
    if trg.is_delay_required() {
        fields.push(Field::new("unsigned int*", "trgSpkQuePtr"));
    }

    if matrix.has_individual_weights() || matrix.has_kernel_weights() {
        for v in &wu.vars {
            fields.push(Field::new(ptr(&v.ty), &v.name));
        }
    }
    for v in &wu.pre_vars {
        fields.push(Field::new(ptr(&v.ty), &v.name));
    }
    for v in &wu.post_vars {
        fields.push(Field::new(ptr(&v.ty), &v.name));
    }
    for e in &wu.egps {
        fields.push(Field::new(&e.ty, &e.name));
    }
    for (p, name) in wu.param_names.iter().enumerate() {
        if g.is_wu_param_heterogeneous(spec, p) {
            fields.push(Field::new("scalar", name));
        }
    }
    for (p, d) in wu.derived_params.iter().enumerate() {
        if g.is_wu_derived_param_heterogeneous(spec, p) {
            fields.push(Field::new("scalar", &d.name));
        }
    }
    if matrix.has_procedural_weights() {
        for (k, v) in wu.vars.iter().enumerate() {
            let init = &sg.wu_var_initialisers()[k];
            for (p, name) in init.snippet().param_names.iter().enumerate() {
                if g.is_wu_var_init_param_heterogeneous(spec, k, p) {
                    fields.push(Field::new("scalar", format!("{}{}", name, v.name)));
                }
            }
            for (p, d) in init.snippet().derived_params.iter().enumerate() {
                if g.is_wu_var_init_derived_param_heterogeneous(spec, k, p) {
                    fields.push(Field::new("scalar", format!("{}{}", d.name, v.name)));
                }
            }
        }
    }
    if matrix.is_procedural_connectivity() {
        let conn = sg.connectivity_initialiser();
        for (p, name) in conn.snippet().param_names.iter().enumerate() {
            if g.is_connectivity_init_param_heterogeneous(spec, p) {
                fields.push(Field::new("scalar", name));
            }
        }
        for (p, d) in conn.snippet().derived_params.iter().enumerate() {
            if g.is_connectivity_init_derived_param_heterogeneous(spec, p) {
                fields.push(Field::new("scalar", &d.name));
            }
        }
        for e in &conn.snippet().egps {
            fields.push(Field::new(&e.ty, &e.name));
        }
    }

    // Endpoint neuron state reachable from synapse fragments
    if wu.is_pre_spike_time_required {
        fields.push(Field::new("timepoint*", "sTPre"));
    }
    if wu.is_post_spike_time_required {
        fields.push(Field::new("timepoint*", "sTPost"));
    }
    if wu.is_prev_pre_spike_time_required {
        fields.push(Field::new("timepoint*", "prevSTPre"));
    }
    if wu.is_prev_post_spike_time_required {
        fields.push(Field::new("timepoint*", "prevSTPost"));
    }
    if wu.is_pre_spike_event_time_required {
        fields.push(Field::new("timepoint*", "seTPre"));
    }
    if wu.is_prev_pre_spike_event_time_required {
        fields.push(Field::new("timepoint*", "prevSETPre"));
    }
    for v in &src.model().vars {
        if wu_references(sg, &format!("{}_pre", v.name)) {
            fields.push(Field::new(ptr(&v.ty), format!("{}Pre", v.name)));
        }
    }
    for v in &trg.model().vars {
        if wu_references(sg, &format!("{}_post", v.name)) {
            fields.push(Field::new(ptr(&v.ty), format!("{}Post", v.name)));
        }
    }
    for (p, name) in src.model().param_names.iter().enumerate() {
        if wu_references(sg, &format!("{}_pre", name))
            && g.is_src_neuron_param_heterogeneous(spec, p)
        {
            fields.push(Field::new("scalar", format!("{}Pre", name)));
        }
    }
    for (p, d) in src.model().derived_params.iter().enumerate() {
        if wu_references(sg, &format!("{}_pre", d.name))
            && g.is_src_neuron_derived_param_heterogeneous(spec, p)
        {
            fields.push(Field::new("scalar", format!("{}Pre", d.name)));
        }
    }
    for (p, name) in trg.model().param_names.iter().enumerate() {
        if wu_references(sg, &format!("{}_post", name))
            && g.is_trg_neuron_param_heterogeneous(spec, p)
        {
            fields.push(Field::new("scalar", format!("{}Post", name)));
        }
    }
    for (p, d) in trg.model().derived_params.iter().enumerate() {
        if wu_references(sg, &format!("{}_post", d.name))
            && g.is_trg_neuron_derived_param_heterogeneous(spec, p)
        {
            fields.push(Field::new("scalar", format!("{}Post", d.name)));
        }
    }

    fields
}

/// Emit the static instance array and host-side push helper for one merged
/// class; struct types themselves live in the definitions header
pub(crate) fn gen_merged_group_instances(
    os: &mut CodeStream,
    backend: &dyn Backend,
    kind: &str,
    index: usize,
    count: usize,
) {
    os.line(format!(
        "{}Merged{}Group{} merged{}Group{}[{}];",
        backend.merged_group_array_qualifier(),
        kind,
        index,
        kind,
        index,
        count
    ));
    os.line(format!(
        "void pushMerged{}Group{}ToDevice(const Merged{}Group{} *group)",
        kind, index, kind, index
    ));
    os.scope(|os| {
        os.line(format!(
            "memcpy(merged{}Group{}, group, {} * sizeof(Merged{}Group{}));",
            kind, index, count, kind, index
        ));
    });
}

fn gen_struct(os: &mut CodeStream, kind: &str, index: usize, fields: &[Field]) {
    os.line(format!("struct Merged{}Group{}", kind, index));
    os.line("{");
    for f in fields {
        os.line(format!("    {} {};", f.ty, f.name));
    }
    os.line("};");
    os.line(format!(
        "void pushMerged{}Group{}ToDevice(const Merged{}Group{} *group);",
        kind, index, kind, index
    ));
    os.blank();
}

/// Generate the common definitions header
pub fn generate_definitions(merged: &ModelSpecMerged, _backend: &dyn Backend) -> Result<String> {
    let spec = merged.spec();
    let mut os = CodeStream::new();

    os.line("#pragma once");
    os.blank();
    os.line("#include <cmath>");
    os.line("#include <cstdint>");
    os.line("#include <cstring>");
    os.line("#include <random>");
    os.blank();

    os.line(format!("typedef {} scalar;", merged.scalar_type().name()));
    os.line(format!("typedef {} timepoint;", merged.time_type().name()));
    os.line(format!(
        "#define DT {}",
        scalar_literal(spec.dt(), merged.scalar_type())?
    ));
    let time_max = match merged.time_type() {
        ScalarType::F32 => "3.402823466e+38f",
        ScalarType::F64 => "1.7976931348623157e+308",
    };
    os.line(format!("#define TIME_MAX {}", time_max));
    os.line(format!("#define MODEL_SEED {}ull", spec.seed()));
    os.blank();

    os.line("extern std::mt19937 hostRNG;");
    os.line("extern std::uniform_real_distribution<scalar> standardUniformDistribution;");
    os.line("extern std::normal_distribution<scalar> standardNormalDistribution;");
    os.line("extern std::exponential_distribution<scalar> standardExponentialDistribution;");
    os.blank();

    if spec.timing() {
        os.line("extern double initTime;");
        os.line("extern double neuronUpdateTime;");
        os.line("extern double synapseUpdateTime;");
        os.blank();
    }

    os.line("// ------------------------------------------------------------------------");
    os.line("// merged group structures");
    os.line("// ------------------------------------------------------------------------");
    for g in merged.neuron_update_groups() {
        let fields = neuron_update_group_fields(spec, g);
        gen_struct(&mut os, "NeuronUpdate", g.index(), &fields);
    }
    for g in merged.neuron_init_groups() {
        let fields = neuron_init_group_fields(spec, g);
        gen_struct(&mut os, "NeuronInit", g.index(), &fields);
    }
    for g in merged.presynaptic_update_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "PresynapticUpdate", g.index(), &fields);
    }
    for g in merged.postsynaptic_update_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "PostsynapticUpdate", g.index(), &fields);
    }
    for g in merged.synapse_dynamics_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "SynapseDynamics", g.index(), &fields);
    }
    for g in merged.synapse_dense_init_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "SynapseDenseInit", g.index(), &fields);
    }
    for g in merged.synapse_connectivity_init_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "SynapseConnectivityInit", g.index(), &fields);
    }
    for g in merged.synapse_sparse_init_groups() {
        let fields = synapse_group_fields(spec, g);
        gen_struct(&mut os, "SynapseSparseInit", g.index(), &fields);
    }

    os.line("void initialize();");
    os.line("void updateNeurons(timepoint t);");
    os.line("void updateSynapses(timepoint t);");

    Ok(os.into_string())
}
