//! Neuron update emission
//!
//! Produces the per-element update body for every merged neuron update
//! group: load state into locals, apply postsynaptic input and decay,
//! inject current sources, run membrane dynamics, detect spike-like events
//! and true spikes (with auto-refractory rising-edge handling), propagate
//! delayed state on the non-spiking branch and write state back.

use spikegen_model::{ModelSpec, SynapseGroupId, VarAccess, NO_DELAY};

use crate::backend::{Backend, NeuronSimHandler, NeuronUpdateHandler};
use crate::code_stream::CodeStream;
use crate::definitions::gen_merged_group_instances;
use crate::error::Result;
use crate::merged::{ModelSpecMerged, NeuronUpdateGroupMerged};
use crate::precision::{ensure_scalar_suffix, scalar_literal};
use crate::substitutions::Substitutions;

/// Install substitutions for a neuron model's own state: variables as
/// `l`-locals, parameters and derived parameters heterogeneity-aware,
/// extra global parameters as merged-group fields
fn add_neuron_model_substitutions(
    subs: &mut Substitutions,
    spec: &ModelSpec,
    ng: &NeuronUpdateGroupMerged,
    source_suffix: &str,
) -> Result<()> {
    let arche = ng.archetype(spec);
    let nm = arche.model();
    let scalar = spec.precision();
    subs.add_var_name_substitution(&nm.vars, source_suffix, "l", "");
    subs.add_param_value_substitution_het(
        &nm.param_names,
        arche.params(),
        |p| ng.is_param_heterogeneous(spec, p),
        source_suffix,
        "group->",
        "",
        scalar,
    )?;
    subs.add_derived_param_value_substitution_het(
        &nm.derived_params,
        arche.derived_params(),
        |p| ng.is_derived_param_heterogeneous(spec, p),
        source_suffix,
        "group->",
        "",
        scalar,
    )?;
    subs.add_egp_name_substitution(&nm.egps, source_suffix, "group->", "");
    for a in &nm.additional_input_vars {
        subs.add_var_substitution(format!("{}{}", a.name, source_suffix), a.name.clone());
    }
    Ok(())
}

/// Load one adjacent population's pre or postsynaptic weight-update
/// variables into locals, apply a fragment to them and write the locals
/// back. Used both for per-timestep dynamics and for spike-triggered
/// updates; when the model has dynamics code, the spike path reads the
/// current (write) delay slot the dynamics already refreshed.
#[allow(clippy::too_many_arguments)]
fn gen_wu_var_code(
    os: &mut CodeStream,
    spec: &ModelSpec,
    ng: &NeuronUpdateGroupMerged,
    subs: &Substitutions,
    i: usize,
    sg_id: SynapseGroupId,
    pre_not_post: bool,
    code: &str,
    fragment: &str,
    read_write_slot: bool,
) -> Result<()> {
    let arche = ng.archetype(spec);
    let scalar = spec.precision();
    let id = subs.var("id")?.to_string();
    let sg = spec.synapse_group(sg_id);
    let wu = sg.wu_model();
    let (vars, field, delayed) = if pre_not_post {
        (
            &wu.pre_vars,
            format!("WUPre{}", i),
            sg.delay_steps() != NO_DELAY && arche.is_delay_required(),
        )
    } else {
        (
            &wu.post_vars,
            format!("WUPost{}", i),
            sg.back_prop_delay_steps() != NO_DELAY && arche.is_delay_required(),
        )
    };

    os.scope(|os| -> Result<()> {
        let read_offset = if !delayed {
            ""
        } else if read_write_slot {
            "writeDelayOffset + "
        } else {
            "readDelayOffset + "
        };
        for v in vars {
            os.line(format!(
                "{} l{} = group->{}{}[{}{}];",
                v.ty, v.name, v.name, field, read_offset, id
            ));
        }

        let mut wu_subs = Substitutions::with_parent(subs);
        wu_subs.add_param_value_substitution_het(
            &wu.param_names,
            sg.wu_params(),
            |p| {
                if pre_not_post {
                    ng.is_out_syn_wu_param_heterogeneous(spec, i, p)
                } else {
                    ng.is_in_syn_wu_param_heterogeneous(spec, i, p)
                }
            },
            "",
            "group->",
            &field,
            scalar,
        )?;
        wu_subs.add_derived_param_value_substitution_het(
            &wu.derived_params,
            sg.wu_derived_params(),
            |p| {
                if pre_not_post {
                    ng.is_out_syn_wu_derived_param_heterogeneous(spec, i, p)
                } else {
                    ng.is_in_syn_wu_derived_param_heterogeneous(spec, i, p)
                }
            },
            "",
            "group->",
            &field,
            scalar,
        )?;
        wu_subs.add_var_name_substitution(vars, "", "l", "");
        if arche.is_spike_time_required() {
            wu_subs.add_var_substitution(
                if pre_not_post { "sT_pre" } else { "sT_post" },
                "lsT",
            );
        }
        add_neuron_model_substitutions(
            &mut wu_subs,
            spec,
            ng,
            if pre_not_post { "_pre" } else { "_post" },
        )?;

        let applied = wu_subs.apply_check_unreplaced(
            code,
            &format!("{} : merged{} ('{}')", fragment, ng.index(), sg.name()),
        )?;
        os.line(ensure_scalar_suffix(&applied, scalar));

        let write_offset = if delayed { "writeDelayOffset + " } else { "" };
        for v in vars {
            if v.access == VarAccess::ReadWrite || delayed {
                os.line(format!(
                    "group->{}{}[{}{}] = l{};",
                    v.name, field, write_offset, id, v.name
                ));
            }
        }
        Ok(())
    })
}

/// Generate the neuron update module
pub fn generate_neuron_update(
    os: &mut CodeStream,
    merged: &ModelSpecMerged,
    backend: &dyn Backend,
) -> Result<()> {
    let spec = merged.spec();
    let scalar = merged.scalar_type();

    os.line("#include \"definitions.h\"");
    os.blank();
    os.line("// ------------------------------------------------------------------------");
    os.line("// merged neuron update group arrays and push functions");
    os.line("// ------------------------------------------------------------------------");
    for g in merged.neuron_update_groups() {
        gen_merged_group_instances(os, backend, "NeuronUpdate", g.index(), g.groups().len());
    }
    os.blank();

    let sim_handler: NeuronSimHandler = &|os, ng, pop_subs, emit_true_spike, emit_spike_like_event| {
        let arche = ng.archetype(spec);
        let nm = arche.model();
        let id = pop_subs.var("id")?.to_string();
        let delayed = arche.is_delay_required();

        // Copy neuron state into local variables
        for (v_idx, v) in nm.vars.iter().enumerate() {
            let queued = arche.is_var_queue_required(v_idx) && delayed;
            let qualifier = if v.access == VarAccess::ReadOnly {
                "const "
            } else {
                ""
            };
            let offset = if queued { "readDelayOffset + " } else { "" };
            os.line(format!(
                "{}{} l{} = group->{}[{}{}];",
                qualifier, v.ty, v.name, v.name, offset, id
            ));
        }
        let delay_offset = if delayed { "readDelayOffset + " } else { "" };
        if arche.is_spike_time_required() {
            os.line(format!("timepoint lsT = group->sT[{}{}];", delay_offset, id));
        }
        if arche.is_prev_spike_time_required() {
            os.line(format!(
                "timepoint lprevST = group->prevST[{}{}];",
                delay_offset, id
            ));
        }
        os.blank();

        // Declare the synaptic input accumulator when anything feeds it
        let needs_isyn = nm.sim_code.contains("$(Isyn)")
            || arche.merged_in_syn().iter().any(|m| {
                let psm = spec.synapse_group(m.primary).ps_model();
                psm.apply_input_code.contains("$(inSyn)") || psm.decay_code.contains("$(inSyn)")
            })
            || arche.current_sources().iter().any(|&cs| {
                spec.current_source(cs)
                    .model()
                    .injection_code
                    .contains("$(injectCurrent")
            });
        if needs_isyn {
            os.line("scalar Isyn = 0;");
        }

        let mut neuron_subs = Substitutions::with_parent(pop_subs);
        neuron_subs.add_var_substitution("Isyn", "Isyn");
        if arche.is_spike_time_required() {
            neuron_subs.add_var_substitution("sT", "lsT");
        }
        if arche.is_prev_spike_time_required() {
            neuron_subs.add_var_substitution("prev_sT", "lprevST");
        }
        add_neuron_model_substitutions(&mut neuron_subs, spec, ng, "")?;

        // Additional input variables contributed by the neuron model
        for a in &nm.additional_input_vars {
            os.line(format!("{} {} = {};", a.ty, a.name, a.init_value));
        }

        // Merged incoming postsynaptic input
        for (i, m) in arche.merged_in_syn().iter().enumerate() {
            let sg = spec.synapse_group(m.primary);
            let psm = sg.ps_model();
            os.line("// pull inSyn values in a coalesced access");
            os.scope(|os| -> Result<()> {
                os.line(format!("scalar linSyn = group->inSynInSyn{}[{}];", i, id));

                if sg.is_dendritic_delay_required() {
                    let den_idx = format!(
                        "(*group->denDelayPtrInSyn{} * group->numNeurons) + {}",
                        i, id
                    );
                    os.line(format!("linSyn += group->denDelayInSyn{}[{}];", i, den_idx));
                    os.line(format!(
                        "group->denDelayInSyn{}[{}] = {};",
                        i,
                        den_idx,
                        scalar_literal(0.0, scalar)?
                    ));
                }

                if sg.matrix_type().has_individual_psm() {
                    for v in &psm.vars {
                        let qualifier = if v.access == VarAccess::ReadOnly {
                            "const "
                        } else {
                            ""
                        };
                        os.line(format!(
                            "{}{} lps{} = group->{}InSyn{}[{}];",
                            qualifier, v.ty, v.name, v.name, i, id
                        ));
                    }
                }

                let mut in_syn_subs = Substitutions::with_parent(&neuron_subs);
                in_syn_subs.add_var_substitution("inSyn", "linSyn");
                if sg.matrix_type().has_individual_psm() {
                    in_syn_subs.add_var_name_substitution(&psm.vars, "", "lps", "");
                } else {
                    in_syn_subs.add_var_value_substitution(
                        &psm.vars,
                        &sg.ps_const_init_vals()?,
                        scalar,
                    )?;
                }
                in_syn_subs.add_param_value_substitution(
                    &psm.param_names,
                    sg.ps_params(),
                    scalar,
                )?;
                in_syn_subs.add_derived_param_value_substitution(
                    &psm.derived_params,
                    sg.ps_derived_params(),
                    scalar,
                )?;
                in_syn_subs.add_egp_name_substitution(
                    &psm.egps,
                    "",
                    "group->",
                    &format!("InSyn{}", i),
                );

                let ps_code = in_syn_subs.apply_check_unreplaced(
                    &psm.apply_input_code,
                    &format!("applyInputCode : merged{} inSyn{} ('{}')", ng.index(), i, sg.name()),
                )?;
                let pd_code = in_syn_subs.apply_check_unreplaced(
                    &psm.decay_code,
                    &format!("decayCode : merged{} inSyn{} ('{}')", ng.index(), i, sg.name()),
                )?;

                if !psm.support_code.is_empty() && backend.supports_namespace() {
                    os.line(format!("using namespace {}_postsyn;", sg.ps_model_target_name()));
                }
                os.line(ensure_scalar_suffix(&ps_code, scalar));
                os.line(ensure_scalar_suffix(&pd_code, scalar));

                os.line(format!("group->inSynInSyn{}[{}] = linSyn;", i, id));
                for v in &psm.vars {
                    if v.access == VarAccess::ReadWrite {
                        os.line(format!(
                            "group->{}InSyn{}[{}] = lps{};",
                            v.name, i, id, v.name
                        ));
                    }
                }
                Ok(())
            })?;
        }

        // Current sources
        for (i, &cs_id) in arche.current_sources().iter().enumerate() {
            let cs = spec.current_source(cs_id);
            let csm = cs.model();
            os.line(format!("// current source {}", i));
            os.scope(|os| -> Result<()> {
                for v in &csm.vars {
                    os.line(format!(
                        "{} lcs{} = group->{}CS{}[{}];",
                        v.ty, v.name, v.name, i, id
                    ));
                }

                let mut cs_subs = Substitutions::with_parent(&*pop_subs);
                cs_subs.add_func_substitution("injectCurrent", 1, "Isyn += $(0)");
                cs_subs.add_var_name_substitution(&csm.vars, "", "lcs", "");
                cs_subs.add_param_value_substitution(&csm.param_names, cs.params(), scalar)?;
                cs_subs.add_derived_param_value_substitution(
                    &csm.derived_params,
                    cs.derived_params(),
                    scalar,
                )?;
                cs_subs.add_egp_name_substitution(&csm.egps, "", "group->", &format!("CS{}", i));

                let code = cs_subs.apply_check_unreplaced(
                    &csm.injection_code,
                    &format!("injectionCode : merged{} source{} ('{}')", ng.index(), i, cs.name()),
                )?;
                os.line(ensure_scalar_suffix(&code, scalar));

                for v in &csm.vars {
                    if v.access == VarAccess::ReadWrite {
                        os.line(format!(
                            "group->{}CS{}[{}] = lcs{};",
                            v.name, i, id, v.name
                        ));
                    }
                }
                Ok(())
            })?;
        }

        // Per-timestep dynamics of adjacent weight-update state; spike
        // handling later in the body sees the refreshed values
        for (i, &sg_id) in arche.out_syn_with_pre_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            if sg.wu_model().pre_dynamics_code.is_empty() {
                continue;
            }
            os.line(format!("// presynaptic weight update dynamics for {}", sg.name()));
            let code = sg.wu_model().pre_dynamics_code.clone();
            gen_wu_var_code(os, spec, ng, pop_subs, i, sg_id, true, &code, "preDynamicsCode", false)?;
        }
        for (i, &sg_id) in arche.in_syn_with_post_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            if sg.wu_model().post_dynamics_code.is_empty() {
                continue;
            }
            os.line(format!("// postsynaptic weight update dynamics for {}", sg.name()));
            let code = sg.wu_model().post_dynamics_code.clone();
            gen_wu_var_code(os, spec, ng, pop_subs, i, sg_id, false, &code, "postDynamicsCode", false)?;
        }

        if !nm.support_code.is_empty() && backend.supports_namespace() {
            os.line(format!("using namespace {}_neuron;", arche.name()));
        }

        // Threshold condition, cached before the sim code when the model
        // needs rising-edge detection
        let mut th_code = String::new();
        if !nm.threshold_condition_code.is_empty() {
            os.line("// test whether spike condition was fulfilled previously");
            th_code = neuron_subs.apply_check_unreplaced(
                &nm.threshold_condition_code,
                &format!("thresholdConditionCode : merged{}", ng.index()),
            )?;
            th_code = ensure_scalar_suffix(&th_code, scalar);
            if nm.needs_auto_refractory {
                os.line(format!("const bool oldSpike = ({});", th_code));
            }
        }

        os.line("// calculate membrane potential");
        let s_code = neuron_subs
            .apply_check_unreplaced(&nm.sim_code, &format!("simCode : merged{}", ng.index()))?;
        os.line(ensure_scalar_suffix(&s_code, scalar));

        // Spike-like events: union of all outgoing event conditions
        if arche.is_spike_event_required() {
            os.line("bool spikeLikeEvent = false;");
            for (e_code, ns) in arche.spike_event_condition() {
                let mut ev_subs = Substitutions::with_parent(&*pop_subs);
                if arche.is_spike_time_required() {
                    ev_subs.add_var_substitution("sT_pre", "lsT");
                }
                add_neuron_model_substitutions(&mut ev_subs, spec, ng, "_pre")?;
                let e_code = ev_subs.apply_check_unreplaced(
                    e_code,
                    &format!("spikeEventCondition : merged{}", ng.index()),
                )?;
                let e_code = ensure_scalar_suffix(&e_code, scalar);
                os.scope(|os| {
                    if !ns.is_empty() && backend.supports_namespace() {
                        os.line(format!("using namespace {};", ns));
                    }
                    os.line(format!("spikeLikeEvent |= ({});", e_code));
                });
            }
            os.line("// register a spike-like event");
            os.line("if (spikeLikeEvent)");
            os.scope(|os| emit_spike_like_event(os, ng, pop_subs))?;
        }

        // True spikes
        if !th_code.is_empty() {
            os.line("// test for and register a true spike");
            if nm.needs_auto_refractory {
                os.line(format!("if (({}) && !(oldSpike))", th_code));
            } else {
                os.line(format!("if ({})", th_code));
            }
            os.scope(|os| -> Result<()> {
                emit_true_spike(os, ng, pop_subs)?;
                if !nm.reset_code.is_empty() {
                    os.line("// spike reset code");
                    let r_code = neuron_subs.apply_check_unreplaced(
                        &nm.reset_code,
                        &format!("resetCode : merged{}", ng.index()),
                    )?;
                    os.line(ensure_scalar_suffix(&r_code, scalar));
                }
                Ok(())
            })?;

            // Spike-triggered state is only copied between delay slots when
            // a queue exists; groups with dynamics code already refreshed
            // the write slot this timestep
            if delayed {
                let delayed_pre: Vec<usize> = arche
                    .out_syn_with_pre_vars(spec)
                    .iter()
                    .enumerate()
                    .filter(|(_, &sg)| {
                        let sg = spec.synapse_group(sg);
                        sg.delay_steps() != NO_DELAY
                            && sg.wu_model().pre_dynamics_code.is_empty()
                    })
                    .map(|(i, _)| i)
                    .collect();
                let delayed_post: Vec<usize> = arche
                    .in_syn_with_post_vars(spec)
                    .iter()
                    .enumerate()
                    .filter(|(_, &sg)| {
                        let sg = spec.synapse_group(sg);
                        sg.back_prop_delay_steps() != NO_DELAY
                            && sg.wu_model().post_dynamics_code.is_empty()
                    })
                    .map(|(i, _)| i)
                    .collect();

                if arche.is_spike_time_required()
                    || arche.is_prev_spike_time_required()
                    || !delayed_pre.is_empty()
                    || !delayed_post.is_empty()
                {
                    os.line("else");
                    os.scope(|os| {
                        if arche.is_spike_time_required() {
                            os.line(format!("group->sT[writeDelayOffset + {}] = lsT;", id));
                        }
                        if arche.is_prev_spike_time_required() {
                            os.line(format!(
                                "group->prevST[writeDelayOffset + {}] = lprevST;",
                                id
                            ));
                        }
                        let out_pre = arche.out_syn_with_pre_vars(spec);
                        for &i in &delayed_pre {
                            let sg = spec.synapse_group(out_pre[i]);
                            for v in &sg.wu_model().pre_vars {
                                os.line(format!(
                                    "group->{n}WUPre{i}[writeDelayOffset + {id}] = group->{n}WUPre{i}[readDelayOffset + {id}];",
                                    n = v.name,
                                    i = i,
                                    id = id
                                ));
                            }
                        }
                        let in_post = arche.in_syn_with_post_vars(spec);
                        for &i in &delayed_post {
                            let sg = spec.synapse_group(in_post[i]);
                            for v in &sg.wu_model().post_vars {
                                os.line(format!(
                                    "group->{n}WUPost{i}[writeDelayOffset + {id}] = group->{n}WUPost{i}[readDelayOffset + {id}];",
                                    n = v.name,
                                    i = i,
                                    id = id
                                ));
                            }
                        }
                    });
                }
            }
        }

        // Copy mutated or queued state back to global storage
        for (v_idx, v) in nm.vars.iter().enumerate() {
            let queued = arche.is_var_queue_required(v_idx) && delayed;
            if v.access == VarAccess::ReadWrite || queued {
                let offset = if queued { "writeDelayOffset + " } else { "" };
                os.line(format!(
                    "group->{}[{}{}] = l{};",
                    v.name, offset, id, v.name
                ));
            }
        }
        Ok(())
    };

    let wu_var_update_handler: NeuronUpdateHandler = &|os, ng, subs| {
        let arche = ng.archetype(spec);

        for (i, &sg_id) in arche.out_syn_with_pre_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            let wu = sg.wu_model();
            if wu.pre_spike_code.is_empty() {
                continue;
            }
            os.line(format!("// perform presynaptic update required for {}", sg.name()));
            let code = wu.pre_spike_code.clone();
            let has_dynamics = !wu.pre_dynamics_code.is_empty();
            gen_wu_var_code(os, spec, ng, subs, i, sg_id, true, &code, "preSpikeCode", has_dynamics)?;
        }

        for (i, &sg_id) in arche.in_syn_with_post_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            let wu = sg.wu_model();
            if wu.post_spike_code.is_empty() {
                continue;
            }
            os.line(format!("// perform postsynaptic update required for {}", sg.name()));
            let code = wu.post_spike_code.clone();
            let has_dynamics = !wu.post_dynamics_code.is_empty();
            gen_wu_var_code(os, spec, ng, subs, i, sg_id, false, &code, "postSpikeCode", has_dynamics)?;
        }
        Ok(())
    };

    backend.gen_neuron_update(os, merged, sim_handler, wu_var_update_handler)
}
