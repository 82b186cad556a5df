//! Synapse update emission
//!
//! Five platform-independent bodies dispatched through the backend
//! skeleton: spike-like-event threshold, presynaptic spike, presynaptic
//! spike-like event, procedural-connectivity row building, postsynaptic
//! learning and per-timestep synapse dynamics. Each receives a scope with
//! `id_pre`, `id_post` and (for individual matrices) `id_syn` already
//! declared and applies its fragment through the shared substitution
//! pipeline.

use spikegen_model::{ModelSpec, ScalarType, NO_DELAY};

use crate::backend::{Backend, SynapseHandler};
use crate::code_stream::CodeStream;
use crate::definitions::gen_merged_group_instances;
use crate::error::Result;
use crate::merged::{ModelSpecMerged, SynapseGroupMerged};
use crate::precision::ensure_scalar_suffix;
use crate::substitutions::Substitutions;

/// Install substitutions for reading one endpoint's neuron state from
/// inside a synapse fragment
#[allow(clippy::too_many_arguments)]
fn add_neuron_side_substitutions(
    subs: &mut Substitutions,
    spec: &ModelSpec,
    sg_m: &SynapseGroupMerged,
    pre_not_post: bool,
    scalar: ScalarType,
) -> Result<()> {
    let sg = sg_m.archetype(spec);
    let wu = sg.wu_model();
    let (ng, suffix, field_suffix, offset_name, id) = if pre_not_post {
        (
            spec.neuron_group(sg.src()),
            "_pre",
            "Pre",
            "preReadDelayOffset",
            subs.var("id_pre")?.to_string(),
        )
    } else {
        (
            spec.neuron_group(sg.trg()),
            "_post",
            "Post",
            "postReadDelayOffset",
            subs.var("id_post")?.to_string(),
        )
    };
    let delayed_id = if ng.is_delay_required() {
        format!("{} + {}", offset_name, id)
    } else {
        id.clone()
    };

    if pre_not_post {
        if wu.is_pre_spike_time_required {
            subs.add_var_substitution("sT_pre", format!("group->sTPre[{}]", delayed_id));
        }
        if wu.is_prev_pre_spike_time_required {
            subs.add_var_substitution("prev_sT_pre", format!("group->prevSTPre[{}]", delayed_id));
        }
        if wu.is_pre_spike_event_time_required {
            subs.add_var_substitution("seT_pre", format!("group->seTPre[{}]", delayed_id));
        }
        if wu.is_prev_pre_spike_event_time_required {
            subs.add_var_substitution(
                "prev_seT_pre",
                format!("group->prevSETPre[{}]", delayed_id),
            );
        }
    } else {
        if wu.is_post_spike_time_required {
            subs.add_var_substitution("sT_post", format!("group->sTPost[{}]", delayed_id));
        }
        if wu.is_prev_post_spike_time_required {
            subs.add_var_substitution(
                "prev_sT_post",
                format!("group->prevSTPost[{}]", delayed_id),
            );
        }
    }

    for (v_idx, v) in ng.model().vars.iter().enumerate() {
        let index = if ng.is_delay_required() && ng.is_var_queue_required(v_idx) {
            &delayed_id
        } else {
            &id
        };
        subs.add_var_substitution(
            format!("{}{}", v.name, suffix),
            format!("group->{}{}[{}]", v.name, field_suffix, index),
        );
    }
    if pre_not_post {
        subs.add_param_value_substitution_het(
            &ng.model().param_names,
            ng.params(),
            |p| sg_m.is_src_neuron_param_heterogeneous(spec, p),
            suffix,
            "group->",
            field_suffix,
            scalar,
        )?;
        subs.add_derived_param_value_substitution_het(
            &ng.model().derived_params,
            ng.derived_params(),
            |p| sg_m.is_src_neuron_derived_param_heterogeneous(spec, p),
            suffix,
            "group->",
            field_suffix,
            scalar,
        )?;
    } else {
        subs.add_param_value_substitution_het(
            &ng.model().param_names,
            ng.params(),
            |p| sg_m.is_trg_neuron_param_heterogeneous(spec, p),
            suffix,
            "group->",
            field_suffix,
            scalar,
        )?;
        subs.add_derived_param_value_substitution_het(
            &ng.model().derived_params,
            ng.derived_params(),
            |p| sg_m.is_trg_neuron_derived_param_heterogeneous(spec, p),
            suffix,
            "group->",
            field_suffix,
            scalar,
        )?;
    }
    Ok(())
}

/// Shared substitution pipeline for synapse fragments
fn apply_synapse_substitutions(
    os: &mut CodeStream,
    code: &str,
    fragment: &str,
    sg_m: &SynapseGroupMerged,
    base_subs: &Substitutions,
    spec: &ModelSpec,
    scalar: ScalarType,
) -> Result<()> {
    let sg = sg_m.archetype(spec);
    let wu = sg.wu_model();
    let matrix = sg.matrix_type();

    let mut subs = Substitutions::with_parent(base_subs);
    subs.add_param_value_substitution_het(
        &wu.param_names,
        sg.wu_params(),
        |p| sg_m.is_wu_param_heterogeneous(spec, p),
        "",
        "group->",
        "",
        scalar,
    )?;
    subs.add_derived_param_value_substitution_het(
        &wu.derived_params,
        sg.wu_derived_params(),
        |p| sg_m.is_wu_derived_param_heterogeneous(spec, p),
        "",
        "group->",
        "",
        scalar,
    )?;
    subs.add_egp_name_substitution(&wu.egps, "", "group->", "");

    // Pre and postsynaptic weight-update variables, delay-offset when the
    // corresponding queue exists
    let id_pre = subs.var("id_pre")?.to_string();
    let id_post = subs.var("id_post")?.to_string();
    let delayed_pre_idx = if sg.delay_steps() == NO_DELAY {
        id_pre
    } else {
        format!("preReadDelayOffset + {}", id_pre)
    };
    subs.add_var_name_substitution(&wu.pre_vars, "", "group->", &format!("[{}]", delayed_pre_idx));
    let delayed_post_idx = if sg.back_prop_delay_steps() == NO_DELAY {
        id_post
    } else {
        format!("postReadDelayOffset + {}", id_post)
    };
    subs.add_var_name_substitution(
        &wu.post_vars,
        "",
        "group->",
        &format!("[{}]", delayed_post_idx),
    );

    // Weight variables, keyed on the matrix storage class
    if matrix.has_individual_weights() || matrix.has_kernel_weights() {
        let id_syn = subs.var("id_syn")?.to_string();
        subs.add_var_name_substitution(&wu.vars, "", "group->", &format!("[{}]", id_syn));
    } else if matrix.has_procedural_weights() {
        // Generate each weight into a fresh local before the fragment runs
        for (k, v) in wu.vars.iter().enumerate() {
            let var_init = &sg.wu_var_initialisers()[k];
            let mut var_subs = Substitutions::with_parent(&subs);
            var_subs.add_var_substitution("value", format!("l{}", v.name));
            var_subs.add_param_value_substitution_het(
                &var_init.snippet().param_names,
                var_init.params(),
                |p| sg_m.is_wu_var_init_param_heterogeneous(spec, k, p),
                "",
                "group->",
                &v.name,
                scalar,
            )?;
            var_subs.add_derived_param_value_substitution_het(
                &var_init.snippet().derived_params,
                var_init.derived_params(),
                |p| sg_m.is_wu_var_init_derived_param_heterogeneous(spec, k, p),
                "",
                "group->",
                &v.name,
                scalar,
            )?;
            let init_code = var_subs.apply_check_unreplaced(
                &var_init.snippet().code,
                &format!("initVar : {} merged{} ('{}')", v.name, sg_m.index(), sg.name()),
            )?;
            os.line(format!("{} l{};", v.ty, v.name));
            os.scope(|os| {
                os.line(ensure_scalar_suffix(&init_code, scalar));
            });
        }
        subs.add_var_name_substitution(&wu.vars, "", "l", "");
    } else {
        subs.add_var_value_substitution(&wu.vars, &sg.wu_const_init_vals()?, scalar)?;
    }

    // Neuron state on both endpoints
    add_neuron_side_substitutions(&mut subs, spec, sg_m, true, scalar)?;
    add_neuron_side_substitutions(&mut subs, spec, sg_m, false, scalar)?;

    let applied = subs.apply_check_unreplaced(
        code,
        &format!("{} : merged{} ('{}')", fragment, sg_m.index(), sg.name()),
    )?;
    os.line(ensure_scalar_suffix(&applied, scalar));
    Ok(())
}

/// Generate the synapse update module
pub fn generate_synapse_update(
    os: &mut CodeStream,
    merged: &ModelSpecMerged,
    backend: &dyn Backend,
) -> Result<()> {
    let spec = merged.spec();
    let scalar = merged.scalar_type();

    os.line("#include \"definitions.h\"");
    os.blank();
    os.line("// ------------------------------------------------------------------------");
    os.line("// merged synapse group arrays and push functions");
    os.line("// ------------------------------------------------------------------------");
    for g in merged.presynaptic_update_groups() {
        gen_merged_group_instances(os, backend, "PresynapticUpdate", g.index(), g.groups().len());
    }
    for g in merged.postsynaptic_update_groups() {
        gen_merged_group_instances(os, backend, "PostsynapticUpdate", g.index(), g.groups().len());
    }
    for g in merged.synapse_dynamics_groups() {
        gen_merged_group_instances(os, backend, "SynapseDynamics", g.index(), g.groups().len());
    }
    os.blank();

    let thresh_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let sg = sg_m.archetype(spec);
        let wu = sg.wu_model();
        let mut subs = Substitutions::with_parent(&*base_subs);
        subs.add_param_value_substitution_het(
            &wu.param_names,
            sg.wu_params(),
            |p| sg_m.is_wu_param_heterogeneous(spec, p),
            "",
            "group->",
            "",
            scalar,
        )?;
        subs.add_derived_param_value_substitution_het(
            &wu.derived_params,
            sg.wu_derived_params(),
            |p| sg_m.is_wu_derived_param_heterogeneous(spec, p),
            "",
            "group->",
            "",
            scalar,
        )?;
        subs.add_egp_name_substitution(&wu.egps, "", "group->", "");
        add_neuron_side_substitutions(&mut subs, spec, sg_m, true, scalar)?;

        let code = subs.apply_check_unreplaced(
            &wu.event_threshold_condition_code,
            &format!("eventThresholdConditionCode : merged{} ('{}')", sg_m.index(), sg.name()),
        )?;
        os.line(ensure_scalar_suffix(&code, scalar));
        Ok(())
    };

    let sim_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let code = sg_m.archetype(spec).wu_model().sim_code.clone();
        apply_synapse_substitutions(os, &code, "simCode", sg_m, base_subs, spec, scalar)
    };

    let event_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let code = sg_m.archetype(spec).wu_model().event_code.clone();
        apply_synapse_substitutions(os, &code, "eventCode", sg_m, base_subs, spec, scalar)
    };

    let procedural_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let sg = sg_m.archetype(spec);
        let conn = sg.connectivity_initialiser();
        let snippet = conn.snippet();

        base_subs.add_func_substitution("endRow", 0, "break");
        base_subs.add_param_value_substitution_het(
            &snippet.param_names,
            conn.params(),
            |p| sg_m.is_connectivity_init_param_heterogeneous(spec, p),
            "",
            "group->",
            "",
            scalar,
        )?;
        base_subs.add_derived_param_value_substitution_het(
            &snippet.derived_params,
            conn.derived_params(),
            |p| sg_m.is_connectivity_init_derived_param_heterogeneous(spec, p),
            "",
            "group->",
            "",
            scalar,
        )?;
        base_subs.add_egp_name_substitution(&snippet.egps, "", "group->", "");

        // Row building state variables for procedural connectivity
        for sv in &snippet.row_build_state_vars {
            let value = base_subs.apply_check_unreplaced(
                &sv.value,
                &format!("proceduralSparseConnectivity state var : merged{}", sg_m.index()),
            )?;
            os.line(format!(
                "{} {} = {};",
                sv.ty,
                sv.name,
                ensure_scalar_suffix(&value, scalar)
            ));
        }

        os.line("while(true)");
        os.scope(|os| -> Result<()> {
            let mut syn_subs = Substitutions::with_parent(&*base_subs);
            syn_subs.add_state_var_substitution(&snippet.row_build_state_vars);
            let code = syn_subs.apply_check_unreplaced(
                &snippet.row_build_code,
                &format!("proceduralSparseConnectivity : merged{} ('{}')", sg_m.index(), sg.name()),
            )?;
            os.line(ensure_scalar_suffix(&code, scalar));
            Ok(())
        })
    };

    let post_learn_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let sg = sg_m.archetype(spec);
        let wu = sg.wu_model();
        if !wu.support_code.is_empty() && backend.supports_namespace() {
            os.line(format!(
                "using namespace {}_weightupdate_simLearnPost;",
                sg.name()
            ));
        }
        let code = wu.learn_post_code.clone();
        apply_synapse_substitutions(os, &code, "learnPostCode", sg_m, base_subs, spec, scalar)
    };

    let dynamics_handler: SynapseHandler = &|os, sg_m, base_subs| {
        let sg = sg_m.archetype(spec);
        let wu = sg.wu_model();
        if !wu.support_code.is_empty() && backend.supports_namespace() {
            os.line(format!(
                "using namespace {}_weightupdate_synapseDynamics;",
                sg.name()
            ));
        }
        let code = wu.synapse_dynamics_code.clone();
        apply_synapse_substitutions(os, &code, "synapseDynamics", sg_m, base_subs, spec, scalar)
    };

    backend.gen_synapse_update(
        os,
        merged,
        thresh_handler,
        sim_handler,
        event_handler,
        procedural_handler,
        post_learn_handler,
        dynamics_handler,
    )
}
