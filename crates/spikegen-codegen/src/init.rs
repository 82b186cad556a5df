//! Initialisation emission
//!
//! Produces, per merged neuron init group: spike-count and spike-array
//! zeroing (delay-expanded where a queue exists), spike-time sentinel
//! initialisation, queue-pointer reset, then variable initialisation for
//! the neuron model, each merged incoming postsynaptic entry, adjacent
//! weight-update pre/post variables and current sources. Synapse-side
//! groups initialise dense rows, build sparse connectivity through the
//! snippet's row/column build loop, fill kernel-resident variables and
//! finally initialise per-synapse variables over materialised rows.

use spikegen_model::{ModelSpec, ScalarType, Var, VarInit, NO_DELAY};

use crate::backend::{Backend, NeuronInitHandler, SynapseHandler};
use crate::code_stream::CodeStream;
use crate::definitions::gen_merged_group_instances;
use crate::error::Result;
use crate::merged::{ModelSpecMerged, NeuronInitGroupMerged, SynapseGroupMerged};
use crate::precision::{ensure_scalar_suffix, scalar_literal};
use crate::substitutions::Substitutions;

fn gen_init_spike_count(
    os: &mut CodeStream,
    backend: &dyn Backend,
    pop_subs: &Substitutions,
    ng: &NeuronInitGroupMerged,
    spec: &ModelSpec,
    spike_event: bool,
) -> Result<()> {
    let arche = ng.archetype(spec);
    let init_required = if spike_event {
        arche.is_spike_event_required()
    } else {
        true
    };
    if !init_required {
        return Ok(());
    }
    backend.gen_pop_variable_init(os, pop_subs, &mut |os, _subs| {
        let count_name = if spike_event { "spkCntEvnt" } else { "spkCnt" };
        let delay_required = if spike_event {
            arche.is_delay_required()
        } else {
            arche.is_true_spike_required() && arche.is_delay_required()
        };
        if delay_required {
            os.line(format!(
                "for (unsigned int d = 0; d < {}; d++)",
                arche.num_delay_slots()
            ));
            os.scope(|os| {
                os.line(format!("group->{}[d] = 0;", count_name));
            });
        } else {
            os.line(format!("group->{}[0] = 0;", count_name));
        }
        Ok(())
    })
}

fn gen_init_spikes(
    os: &mut CodeStream,
    backend: &dyn Backend,
    pop_subs: &Substitutions,
    ng: &NeuronInitGroupMerged,
    spec: &ModelSpec,
    spike_event: bool,
) -> Result<()> {
    let arche = ng.archetype(spec);
    let init_required = if spike_event {
        arche.is_spike_event_required()
    } else {
        true
    };
    if !init_required {
        return Ok(());
    }
    backend.gen_variable_init(os, "group->numNeurons", "id", pop_subs, &mut |os, var_subs| {
        let spike_name = if spike_event { "spkEvnt" } else { "spk" };
        let delay_required = if spike_event {
            arche.is_delay_required()
        } else {
            arche.is_true_spike_required() && arche.is_delay_required()
        };
        let id = var_subs.var("id")?.to_string();
        if delay_required {
            os.line(format!(
                "for (unsigned int d = 0; d < {}; d++)",
                arche.num_delay_slots()
            ));
            os.scope(|os| {
                os.line(format!(
                    "group->{}[(d * group->numNeurons) + {}] = 0;",
                    spike_name, id
                ));
            });
        } else {
            os.line(format!("group->{}[{}] = 0;", spike_name, id));
        }
        Ok(())
    })
}

fn gen_init_spike_time(
    os: &mut CodeStream,
    backend: &dyn Backend,
    pop_subs: &Substitutions,
    ng: &NeuronInitGroupMerged,
    spec: &ModelSpec,
    var_name: &str,
) -> Result<()> {
    let arche = ng.archetype(spec);
    backend.gen_variable_init(os, "group->numNeurons", "id", pop_subs, &mut |os, var_subs| {
        let id = var_subs.var("id")?.to_string();
        if arche.is_delay_required() {
            os.line(format!(
                "for (unsigned int d = 0; d < {}; d++)",
                arche.num_delay_slots()
            ));
            os.scope(|os| {
                os.line(format!(
                    "group->{}[(d * group->numNeurons) + {}] = -TIME_MAX;",
                    var_name, id
                ));
            });
        } else {
            os.line(format!("group->{}[{}] = -TIME_MAX;", var_name, id));
        }
        Ok(())
    })
}

/// Emit per-element initialisation for one list of variables living on a
/// neuron population (neuron-model, postsynaptic-model, weight-update
/// pre/post or current-source variables), delay-expanding queued variables
/// into every slot
#[allow(clippy::too_many_arguments)]
fn gen_init_neuron_var_code<'a>(
    os: &mut CodeStream,
    backend: &dyn Backend,
    pop_subs: &Substitutions,
    scalar: ScalarType,
    vars: &[Var],
    field_suffix: &str,
    count_member: &str,
    num_delay_slots: usize,
    group_index: usize,
    get_init: &dyn Fn(usize) -> &'a VarInit,
    is_var_queue_required: &dyn Fn(usize) -> bool,
    is_param_het: &dyn Fn(usize, usize) -> bool,
    is_derived_het: &dyn Fn(usize, usize) -> bool,
) -> Result<()> {
    let count = format!("group->{}", count_member);
    for (k, var) in vars.iter().enumerate() {
        let var_init = get_init(k);
        if var_init.snippet().code.is_empty() {
            continue;
        }
        os.scope(|os| -> Result<()> {
            backend.gen_variable_init(os, &count, "id", pop_subs, &mut |os, var_subs| {
                var_subs.add_param_value_substitution_het(
                    &var_init.snippet().param_names,
                    var_init.params(),
                    |p| is_param_het(k, p),
                    "",
                    "group->",
                    &format!("{}{}", var.name, field_suffix),
                    scalar,
                )?;
                var_subs.add_derived_param_value_substitution_het(
                    &var_init.snippet().derived_params,
                    var_init.derived_params(),
                    |p| is_derived_het(k, p),
                    "",
                    "group->",
                    &format!("{}{}", var.name, field_suffix),
                    scalar,
                )?;
                var_subs.add_egp_name_substitution(
                    &var_init.snippet().egps,
                    "",
                    "group->",
                    &format!("{}{}", var.name, field_suffix),
                );

                let id = var_subs.var("id")?.to_string();
                let context = format!("initVar : {} merged{}", var.name, group_index);
                if is_var_queue_required(k) {
                    // Build the value once, then copy into every delay slot
                    os.line(format!("{} initVal;", var.ty));
                    var_subs.add_var_substitution("value", "initVal");
                    let code =
                        var_subs.apply_check_unreplaced(&var_init.snippet().code, &context)?;
                    os.line(ensure_scalar_suffix(&code, scalar));
                    os.line(format!(
                        "for (unsigned int d = 0; d < {}; d++)",
                        num_delay_slots
                    ));
                    os.scope(|os| {
                        os.line(format!(
                            "group->{}{}[(d * {}) + {}] = initVal;",
                            var.name, field_suffix, count, id
                        ));
                    });
                } else {
                    var_subs.add_var_substitution(
                        "value",
                        format!("group->{}{}[{}]", var.name, field_suffix, id),
                    );
                    let code =
                        var_subs.apply_check_unreplaced(&var_init.snippet().code, &context)?;
                    os.line(ensure_scalar_suffix(&code, scalar));
                }
                Ok(())
            })
        })?;
    }
    Ok(())
}

/// Initialise one row of weight-update variables
fn gen_init_wu_var_code(
    os: &mut CodeStream,
    backend: &dyn Backend,
    pop_subs: &Substitutions,
    spec: &ModelSpec,
    scalar: ScalarType,
    sg_m: &SynapseGroupMerged,
) -> Result<()> {
    let sg = sg_m.archetype(spec);
    let vars = &sg.wu_model().vars;
    for (k, var) in vars.iter().enumerate() {
        let var_init = &sg.wu_var_initialisers()[k];
        if var_init.snippet().code.is_empty() || var_init.snippet().requires_kernel() {
            continue;
        }
        os.scope(|os| -> Result<()> {
            backend.gen_synapse_variable_row_init(os, sg_m, spec, pop_subs, &mut |os, var_subs| {
                let id_syn = var_subs.var("id_syn")?.to_string();
                var_subs.add_var_substitution(
                    "value",
                    format!("group->{}[{}]", var.name, id_syn),
                );
                var_subs.add_param_value_substitution_het(
                    &var_init.snippet().param_names,
                    var_init.params(),
                    |p| sg_m.is_wu_var_init_param_heterogeneous(spec, k, p),
                    "",
                    "group->",
                    &var.name,
                    scalar,
                )?;
                var_subs.add_derived_param_value_substitution_het(
                    &var_init.snippet().derived_params,
                    var_init.derived_params(),
                    |p| sg_m.is_wu_var_init_derived_param_heterogeneous(spec, k, p),
                    "",
                    "group->",
                    &var.name,
                    scalar,
                )?;
                var_subs.add_egp_name_substitution(
                    &var_init.snippet().egps,
                    "",
                    "group->",
                    &var.name,
                );

                let code = var_subs.apply_check_unreplaced(
                    &var_init.snippet().code,
                    &format!("initVar : {} merged{}", var.name, sg_m.index()),
                )?;
                os.line(ensure_scalar_suffix(&code, scalar));
                Ok(())
            })
        })?;
    }
    Ok(())
}

/// Declare build-state variables and run the snippet's row or column build
/// code inside an unbounded loop; the code exits through `$(endRow)` /
/// `$(endCol)` or registers entries through `$(addSynapse, j)`
fn gen_init_connectivity(
    os: &mut CodeStream,
    pop_subs: &mut Substitutions,
    sg_m: &SynapseGroupMerged,
    spec: &ModelSpec,
    scalar: ScalarType,
    row_not_col: bool,
) -> Result<()> {
    let sg = sg_m.archetype(spec);
    let conn = sg.connectivity_initialiser();
    let snippet = conn.snippet();

    pop_subs.add_func_substitution(if row_not_col { "endRow" } else { "endCol" }, 0, "break");
    pop_subs.add_param_value_substitution_het(
        &snippet.param_names,
        conn.params(),
        |p| sg_m.is_connectivity_init_param_heterogeneous(spec, p),
        "",
        "group->",
        "",
        scalar,
    )?;
    pop_subs.add_derived_param_value_substitution_het(
        &snippet.derived_params,
        conn.derived_params(),
        |p| sg_m.is_connectivity_init_derived_param_heterogeneous(spec, p),
        "",
        "group->",
        "",
        scalar,
    )?;
    pop_subs.add_egp_name_substitution(&snippet.egps, "", "group->", "");

    os.line("// Build sparse connectivity");
    let state_vars = if row_not_col {
        &snippet.row_build_state_vars
    } else {
        &snippet.col_build_state_vars
    };
    for sv in state_vars {
        let value = pop_subs.apply_check_unreplaced(
            &sv.value,
            &format!("initSparseConnectivity state var : merged{}", sg_m.index()),
        )?;
        os.line(format!(
            "{} {} = {};",
            sv.ty,
            sv.name,
            ensure_scalar_suffix(&value, scalar)
        ));
    }
    pop_subs.add_state_var_substitution(state_vars);

    let build_code = if row_not_col {
        &snippet.row_build_code
    } else {
        &snippet.col_build_code
    };
    let code = pop_subs.apply_check_unreplaced(
        build_code,
        &format!("initSparseConnectivity : merged{}", sg_m.index()),
    )?;
    os.line("while(true)");
    os.scope(|os| {
        os.line(ensure_scalar_suffix(&code, scalar));
    });
    Ok(())
}

/// Generate the initialisation module
pub fn generate_init(
    os: &mut CodeStream,
    merged: &ModelSpecMerged,
    backend: &dyn Backend,
) -> Result<()> {
    let spec = merged.spec();
    let scalar = merged.scalar_type();

    os.line("#include \"definitions.h\"");
    os.blank();
    os.line("// ------------------------------------------------------------------------");
    os.line("// merged init group arrays and push functions");
    os.line("// ------------------------------------------------------------------------");
    for g in merged.neuron_init_groups() {
        gen_merged_group_instances(os, backend, "NeuronInit", g.index(), g.groups().len());
    }
    for g in merged.synapse_dense_init_groups() {
        gen_merged_group_instances(os, backend, "SynapseDenseInit", g.index(), g.groups().len());
    }
    for g in merged.synapse_connectivity_init_groups() {
        gen_merged_group_instances(
            os,
            backend,
            "SynapseConnectivityInit",
            g.index(),
            g.groups().len(),
        );
    }
    for g in merged.synapse_sparse_init_groups() {
        gen_merged_group_instances(os, backend, "SynapseSparseInit", g.index(), g.groups().len());
    }
    os.blank();

    let neuron_init_handler: NeuronInitHandler = &|os, ng, pop_subs| {
        let arche = ng.archetype(spec);
        let nm = arche.model();

        gen_init_spike_count(os, backend, pop_subs, ng, spec, false)?;
        gen_init_spike_count(os, backend, pop_subs, ng, spec, true)?;
        gen_init_spikes(os, backend, pop_subs, ng, spec, false)?;
        gen_init_spikes(os, backend, pop_subs, ng, spec, true)?;

        if arche.is_spike_time_required() {
            gen_init_spike_time(os, backend, pop_subs, ng, spec, "sT")?;
        }
        if arche.is_prev_spike_time_required() {
            gen_init_spike_time(os, backend, pop_subs, ng, spec, "prevST")?;
        }
        if arche.is_spike_event_time_required() {
            gen_init_spike_time(os, backend, pop_subs, ng, spec, "seT")?;
        }
        if arche.is_prev_spike_event_time_required() {
            gen_init_spike_time(os, backend, pop_subs, ng, spec, "prevSET")?;
        }

        if arche.is_delay_required() {
            backend.gen_pop_variable_init(os, pop_subs, &mut |os, _subs| {
                os.line("*group->spkQuePtr = 0;");
                Ok(())
            })?;
        }

        // Neuron model variables
        gen_init_neuron_var_code(
            os,
            backend,
            pop_subs,
            scalar,
            &nm.vars,
            "",
            "numNeurons",
            arche.num_delay_slots(),
            ng.index(),
            &|i| &arche.var_initialisers()[i],
            &|i| arche.is_var_queue_required(i),
            &|v, p| ng.is_var_init_param_heterogeneous(spec, v, p),
            &|v, p| ng.is_var_init_derived_param_heterogeneous(spec, v, p),
        )?;

        // Merged incoming postsynaptic entries
        for (i, m) in arche.merged_in_syn().iter().enumerate() {
            let sg = spec.synapse_group(m.primary);
            os.scope(|os| -> Result<()> {
                backend.gen_variable_init(
                    os,
                    "group->numNeurons",
                    "id",
                    pop_subs,
                    &mut |os, var_subs| {
                        os.line(format!(
                            "group->inSynInSyn{}[{}] = {};",
                            i,
                            var_subs.var("id")?,
                            scalar_literal(0.0, scalar)?
                        ));
                        Ok(())
                    },
                )?;

                if sg.is_dendritic_delay_required() {
                    backend.gen_variable_init(
                        os,
                        "group->numNeurons",
                        "id",
                        pop_subs,
                        &mut |os, var_subs| {
                            let id = var_subs.var("id")?.to_string();
                            os.line(format!(
                                "for (unsigned int d = 0; d < {}; d++)",
                                sg.max_dendritic_delay_timesteps()
                            ));
                            os.scope(|os| -> Result<()> {
                                os.line(format!(
                                    "group->denDelayInSyn{}[(d * group->numNeurons) + {}] = {};",
                                    i,
                                    id,
                                    scalar_literal(0.0, scalar)?
                                ));
                                Ok(())
                            })
                        },
                    )?;
                    backend.gen_pop_variable_init(os, pop_subs, &mut |os, _subs| {
                        os.line(format!("*group->denDelayPtrInSyn{} = 0;", i));
                        Ok(())
                    })?;
                }

                if sg.matrix_type().has_individual_psm() {
                    gen_init_neuron_var_code(
                        os,
                        backend,
                        pop_subs,
                        scalar,
                        &sg.ps_model().vars,
                        &format!("InSyn{}", i),
                        "numNeurons",
                        1,
                        i,
                        &|v| &sg.ps_var_initialisers()[v],
                        &|_| false,
                        &|v, p| ng.is_psm_var_init_param_heterogeneous(spec, i, v, p),
                        &|v, p| ng.is_psm_var_init_derived_param_heterogeneous(spec, i, v, p),
                    )?;
                }
                Ok(())
            })?;
        }

        // Incoming populations with postsynaptic weight-update variables.
        // Slot count comes from this (target) population; whether a queue
        // exists comes from the synapse group's back-propagation delay.
        for (i, &sg_id) in arche.in_syn_with_post_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            gen_init_neuron_var_code(
                os,
                backend,
                pop_subs,
                scalar,
                &sg.wu_model().post_vars,
                &format!("WUPost{}", i),
                "numNeurons",
                arche.num_delay_slots(),
                i,
                &|v| &sg.wu_post_var_initialisers()[v],
                &|_| sg.back_prop_delay_steps() != NO_DELAY,
                &|v, p| ng.is_in_syn_wu_var_init_param_heterogeneous(spec, i, v, p),
                &|v, p| ng.is_in_syn_wu_var_init_derived_param_heterogeneous(spec, i, v, p),
            )?;
        }

        // Outgoing populations with presynaptic weight-update variables
        for (i, &sg_id) in arche.out_syn_with_pre_vars(spec).iter().enumerate() {
            let sg = spec.synapse_group(sg_id);
            gen_init_neuron_var_code(
                os,
                backend,
                pop_subs,
                scalar,
                &sg.wu_model().pre_vars,
                &format!("WUPre{}", i),
                "numNeurons",
                arche.num_delay_slots(),
                i,
                &|v| &sg.wu_pre_var_initialisers()[v],
                &|_| sg.delay_steps() != NO_DELAY,
                &|v, p| ng.is_out_syn_wu_var_init_param_heterogeneous(spec, i, v, p),
                &|v, p| ng.is_out_syn_wu_var_init_derived_param_heterogeneous(spec, i, v, p),
            )?;
        }

        // Current source variables
        os.line("// current source variables");
        for (i, &cs_id) in arche.current_sources().iter().enumerate() {
            let cs = spec.current_source(cs_id);
            gen_init_neuron_var_code(
                os,
                backend,
                pop_subs,
                scalar,
                &cs.model().vars,
                &format!("CS{}", i),
                "numNeurons",
                1,
                i,
                &|v| &cs.var_initialisers()[v],
                &|_| false,
                &|v, p| ng.is_current_source_var_init_param_heterogeneous(spec, i, v, p),
                &|v, p| ng.is_current_source_var_init_derived_param_heterogeneous(spec, i, v, p),
            )?;
        }
        Ok(())
    };

    let dense_init_handler: SynapseHandler = &|os, sg_m, pop_subs| {
        os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
        os.scope(|os| -> Result<()> {
            let mut row_subs = Substitutions::with_parent(&*pop_subs);
            row_subs.add_var_substitution("id_pre", "i");
            gen_init_wu_var_code(os, backend, &row_subs, spec, scalar, sg_m)
        })
    };

    let row_connect_handler: SynapseHandler =
        &|os, sg_m, pop_subs| gen_init_connectivity(os, pop_subs, sg_m, spec, scalar, true);

    let col_connect_handler: SynapseHandler =
        &|os, sg_m, pop_subs| gen_init_connectivity(os, pop_subs, sg_m, spec, scalar, false);

    let kernel_init_handler: SynapseHandler = &|os, sg_m, pop_subs| {
        let sg = sg_m.archetype(spec);
        let id_pre = pop_subs.var("id_pre")?.to_string();
        let id_post = pop_subs.var("id_post")?.to_string();
        os.line(format!(
            "const unsigned int kernelInd = (({}) * group->numTrgNeurons) + ({});",
            id_pre, id_post
        ));
        pop_subs.add_var_substitution("id_kernel", "kernelInd");

        let vars = &sg.wu_model().vars;
        for (k, var) in vars.iter().enumerate() {
            let var_init = &sg.wu_var_initialisers()[k];
            if !var_init.snippet().requires_kernel() {
                continue;
            }
            os.scope(|os| -> Result<()> {
                let mut var_subs = Substitutions::with_parent(&*pop_subs);
                let id_syn = var_subs.var("id_syn")?.to_string();
                var_subs.add_var_substitution(
                    "value",
                    format!("group->{}[{}]", var.name, id_syn),
                );
                var_subs.add_param_value_substitution_het(
                    &var_init.snippet().param_names,
                    var_init.params(),
                    |p| sg_m.is_wu_var_init_param_heterogeneous(spec, k, p),
                    "",
                    "group->",
                    &var.name,
                    scalar,
                )?;
                var_subs.add_derived_param_value_substitution_het(
                    &var_init.snippet().derived_params,
                    var_init.derived_params(),
                    |p| sg_m.is_wu_var_init_derived_param_heterogeneous(spec, k, p),
                    "",
                    "group->",
                    &var.name,
                    scalar,
                )?;
                let code = var_subs.apply_check_unreplaced(
                    &var_init.snippet().code,
                    &format!("initVar : {} merged{}", var.name, sg_m.index()),
                )?;
                os.line(ensure_scalar_suffix(&code, scalar));
                Ok(())
            })?;
        }
        Ok(())
    };

    let sparse_init_handler: SynapseHandler =
        &|os, sg_m, pop_subs| gen_init_wu_var_code(os, backend, pop_subs, spec, scalar, sg_m);

    backend.gen_init(
        os,
        merged,
        neuron_init_handler,
        dense_init_handler,
        row_connect_handler,
        col_connect_handler,
        kernel_init_handler,
        sparse_init_handler,
    )
}
