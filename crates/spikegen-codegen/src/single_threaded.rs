//! Single-threaded reference backend
//!
//! Emits plain C++ loops over merged-group members and elements, with the
//! host RNG standing in for per-thread device RNG streams. This backend
//! exists so emission is executable end-to-end without an accelerator
//! toolchain; device backends supply the same capability bundle with
//! kernel launches in place of loops.

use crate::backend::{
    Backend, NeuronInitHandler, NeuronSimHandler, NeuronSpikeEmitter, NeuronUpdateHandler,
    SynapseHandler, VarInitHandler,
};
use crate::code_stream::CodeStream;
use crate::error::{CodeGenError, Result};
use crate::merged::{ModelSpecMerged, SynapseGroupMerged};
use crate::substitutions::Substitutions;

/// Reference backend targeting one host thread
#[derive(Debug, Default)]
pub struct SingleThreadedBackend;

impl SingleThreadedBackend {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

fn add_host_rng_substitutions(subs: &mut Substitutions) {
    subs.add_var_substitution("rng_uniform", "standardUniformDistribution(hostRNG)");
    subs.add_var_substitution("rng_normal", "standardNormalDistribution(hostRNG)");
    subs.add_var_substitution("rng_exponential", "standardExponentialDistribution(hostRNG)");
}

fn base_subs() -> Substitutions<'static> {
    let mut subs = Substitutions::new();
    subs.add_var_substitution("t", "t");
    add_host_rng_substitutions(&mut subs);
    subs
}

/// Emit the per-group delay-slot and read-offset preamble for synapse
/// kernels
fn gen_synapse_delay_offsets(
    os: &mut CodeStream,
    merged: &ModelSpecMerged,
    g: &SynapseGroupMerged,
) {
    let spec = merged.spec();
    let sg = g.archetype(spec);
    let src = spec.neuron_group(sg.src());
    let trg = spec.neuron_group(sg.trg());
    if src.is_delay_required() {
        let slots = src.num_delay_slots();
        os.line(format!(
            "const unsigned int preDelaySlot = ((*group->srcSpkQuePtr + {}) % {});",
            slots - sg.delay_steps(),
            slots
        ));
        os.line("const unsigned int preReadDelayOffset = preDelaySlot * group->numSrcNeurons;");
    }
    if trg.is_delay_required() {
        let slots = trg.num_delay_slots();
        os.line(format!(
            "const unsigned int postDelaySlot = ((*group->trgSpkQuePtr + {}) % {});",
            slots - sg.back_prop_delay_steps(),
            slots
        ));
        os.line("const unsigned int postReadDelayOffset = postDelaySlot * group->numTrgNeurons;");
    }
}

/// Iterate one synaptic row, binding `id_pre`/`id_post`/`id_syn` and the
/// `addToInSyn` accumulator before invoking `handler`
fn gen_row_body(
    os: &mut CodeStream,
    merged: &ModelSpecMerged,
    g: &SynapseGroupMerged,
    ipre_expr: &str,
    handler: &mut dyn FnMut(&mut CodeStream, &mut Substitutions) -> Result<()>,
) -> Result<()> {
    let sg = g.archetype(merged.spec());
    let matrix = sg.matrix_type();

    if matrix.is_sparse() {
        os.line(format!(
            "for (unsigned int j = 0; j < group->rowLength[{}]; j++)",
            ipre_expr
        ));
        os.scope(|os| -> Result<()> {
            os.line(format!(
                "const unsigned int synAddress = ({} * group->rowStride) + j;",
                ipre_expr
            ));
            os.line("const unsigned int ipost = group->ind[synAddress];");
            let mut subs = base_subs();
            subs.add_var_substitution("id_pre", ipre_expr);
            subs.add_var_substitution("id_post", "ipost");
            subs.add_var_substitution("id_syn", "synAddress");
            subs.add_func_substitution("addToInSyn", 1, "group->inSyn[ipost] += $(0)");
            handler(os, &mut subs)
        })
    } else if matrix.is_bitmask() {
        os.line("for (unsigned int j = 0; j < group->numTrgNeurons; j++)");
        os.scope(|os| -> Result<()> {
            os.line(format!(
                "const unsigned int gid = ({} * group->numTrgNeurons) + j;",
                ipre_expr
            ));
            os.line("if (group->gp[gid / 32] & (0x80000000 >> (gid & 31)))");
            os.scope(|os| -> Result<()> {
                let mut subs = base_subs();
                subs.add_var_substitution("id_pre", ipre_expr);
                subs.add_var_substitution("id_post", "j");
                subs.add_func_substitution("addToInSyn", 1, "group->inSyn[j] += $(0)");
                handler(os, &mut subs)
            })
        })
    } else {
        os.line("for (unsigned int j = 0; j < group->numTrgNeurons; j++)");
        os.scope(|os| -> Result<()> {
            os.line(format!(
                "const unsigned int synAddress = ({} * group->numTrgNeurons) + j;",
                ipre_expr
            ));
            let mut subs = base_subs();
            subs.add_var_substitution("id_pre", ipre_expr);
            subs.add_var_substitution("id_post", "j");
            subs.add_var_substitution("id_syn", "synAddress");
            subs.add_func_substitution("addToInSyn", 1, "group->inSyn[j] += $(0)");
            handler(os, &mut subs)
        })
    }
}

impl Backend for SingleThreadedBackend {
    fn gen_neuron_update(
        &self,
        os: &mut CodeStream,
        merged: &ModelSpecMerged,
        sim_handler: NeuronSimHandler,
        wu_var_update_handler: NeuronUpdateHandler,
    ) -> Result<()> {
        let spec = merged.spec();
        os.line("void updateNeurons(timepoint t)");
        os.scope(|os| -> Result<()> {
            for g in merged.neuron_update_groups() {
                let arche = g.archetype(spec);
                let slots = arche.num_delay_slots();
                let delayed = arche.is_delay_required();

                os.line(format!("// merged neuron update group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "MergedNeuronUpdateGroup{idx} *group = &mergedNeuronUpdateGroup{idx}[g];",
                        idx = g.index()
                    ));
                    if delayed {
                        os.line(format!(
                            "*group->spkQuePtr = (*group->spkQuePtr + 1) % {};",
                            slots
                        ));
                    }
                    if delayed && arche.is_true_spike_required() {
                        os.line("group->spkCnt[*group->spkQuePtr] = 0;");
                    } else {
                        os.line("group->spkCnt[0] = 0;");
                    }
                    if arche.is_spike_event_required() {
                        if delayed {
                            os.line("group->spkCntEvnt[*group->spkQuePtr] = 0;");
                        } else {
                            os.line("group->spkCntEvnt[0] = 0;");
                        }
                    }
                    if delayed {
                        os.line(format!(
                            "const unsigned int readDelayOffset = (((*group->spkQuePtr + {}) % {}) * group->numNeurons);",
                            slots - 1,
                            slots
                        ));
                        os.line(
                            "const unsigned int writeDelayOffset = ((*group->spkQuePtr) * group->numNeurons);",
                        );
                    }

                    os.line("for (unsigned int i = 0; i < group->numNeurons; i++)");
                    os.scope(|os| -> Result<()> {
                        let mut pop_subs = base_subs();
                        pop_subs.add_var_substitution("id", "i");

                        let emit_true_spike: NeuronSpikeEmitter = &|os, ng, subs| {
                            let a = ng.archetype(spec);
                            let id = subs.var("id")?.to_string();
                            if a.is_delay_required() && a.is_true_spike_required() {
                                os.line(format!(
                                    "group->spk[writeDelayOffset + (group->spkCnt[*group->spkQuePtr]++)] = {};",
                                    id
                                ));
                            } else {
                                os.line(format!("group->spk[group->spkCnt[0]++] = {};", id));
                            }
                            let wd = if a.is_delay_required() {
                                "writeDelayOffset + "
                            } else {
                                ""
                            };
                            if a.is_prev_spike_time_required() {
                                os.line(format!("group->prevST[{}{}] = lsT;", wd, id));
                            }
                            if a.is_spike_time_required() {
                                os.line(format!("group->sT[{}{}] = t;", wd, id));
                            }
                            wu_var_update_handler(os, ng, subs)
                        };

                        let emit_spike_like_event: NeuronSpikeEmitter = &|os, ng, subs| {
                            let a = ng.archetype(spec);
                            let id = subs.var("id")?.to_string();
                            if a.is_delay_required() {
                                os.line(format!(
                                    "group->spkEvnt[writeDelayOffset + (group->spkCntEvnt[*group->spkQuePtr]++)] = {};",
                                    id
                                ));
                            } else {
                                os.line(format!("group->spkEvnt[group->spkCntEvnt[0]++] = {};", id));
                            }
                            let wd = if a.is_delay_required() {
                                "writeDelayOffset + "
                            } else {
                                ""
                            };
                            if a.is_prev_spike_event_time_required() {
                                let rd = if a.is_delay_required() {
                                    "readDelayOffset + "
                                } else {
                                    ""
                                };
                                os.line(format!(
                                    "group->prevSET[{}{}] = group->seT[{}{}];",
                                    wd, id, rd, id
                                ));
                            }
                            if a.is_spike_event_time_required() {
                                os.line(format!("group->seT[{}{}] = t;", wd, id));
                            }
                            Ok(())
                        };

                        sim_handler(os, g, &mut pop_subs, emit_true_spike, emit_spike_like_event)
                    })?;

                    // Rotate dendritic delay rings feeding this population
                    for (i, m) in arche.merged_in_syn().iter().enumerate() {
                        let sg = spec.synapse_group(m.primary);
                        if sg.is_dendritic_delay_required() {
                            os.line(format!(
                                "*group->denDelayPtrInSyn{i} = (*group->denDelayPtrInSyn{i} + 1) % {};",
                                sg.max_dendritic_delay_timesteps(),
                                i = i
                            ));
                        }
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })
    }

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
    ) -> Result<()> {
        let spec = merged.spec();
        os.line("void updateSynapses(timepoint t)");
        os.scope(|os| -> Result<()> {
            for g in merged.synapse_dynamics_groups() {
                if g.archetype(spec).matrix_type().is_procedural_connectivity() {
                    return Err(CodeGenError::backend_unsupported(
                        "synapse dynamics over procedural connectivity",
                    ));
                }
                os.line(format!("// merged synapse dynamics group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedSynapseDynamicsGroup{idx} *group = &mergedSynapseDynamicsGroup{idx}[g];",
                        idx = g.index()
                    ));
                    gen_synapse_delay_offsets(os, merged, g);
                    os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
                    os.scope(|os| {
                        gen_row_body(os, merged, g, "i", &mut |os, subs| {
                            synapse_dynamics_handler(os, g, subs)
                        })
                    })
                })?;
            }

            for g in merged.presynaptic_update_groups() {
                let sg = g.archetype(spec);
                let src = spec.neuron_group(sg.src());
                os.line(format!("// merged presynaptic update group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedPresynapticUpdateGroup{idx} *group = &mergedPresynapticUpdateGroup{idx}[g];",
                        idx = g.index()
                    ));
                    gen_synapse_delay_offsets(os, merged, g);

                    let slot = if src.is_delay_required() {
                        "preDelaySlot"
                    } else {
                        "0"
                    };
                    let spike_offset = if src.is_delay_required() {
                        "(preDelaySlot * group->numSrcNeurons) + "
                    } else {
                        ""
                    };

                    // Spike-like events
                    if sg.is_spike_event_required() {
                        if sg.matrix_type().is_procedural_connectivity() {
                            return Err(CodeGenError::backend_unsupported(
                                "spike-like events over procedural connectivity",
                            ));
                        }
                        os.line("// process spike-like events");
                        os.line(format!(
                            "for (unsigned int s = 0; s < group->srcSpkCntEvnt[{}]; s++)",
                            slot
                        ));
                        os.scope(|os| -> Result<()> {
                            os.line(format!(
                                "const unsigned int ipre = group->srcSpkEvnt[{}s];",
                                spike_offset
                            ));
                            gen_row_body(os, merged, g, "ipre", &mut |os, subs| {
                                let mut cond_os = CodeStream::new();
                                wum_thresh_handler(&mut cond_os, g, subs)?;
                                let cond = cond_os.into_string();
                                os.line(format!("if ({})", cond.trim()));
                                os.scope(|os| wum_event_handler(os, g, subs))
                            })
                        })?;
                    }

                    // True spikes
                    if sg.is_true_spike_required() {
                        os.line("// process true spikes");
                        os.line(format!(
                            "for (unsigned int s = 0; s < group->srcSpkCnt[{}]; s++)",
                            slot
                        ));
                        os.scope(|os| -> Result<()> {
                            os.line(format!(
                                "const unsigned int ipre = group->srcSpk[{}s];",
                                spike_offset
                            ));
                            if sg.matrix_type().is_procedural_connectivity() {
                                // Render the per-synapse body once, then hand
                                // it to the row-build code as $(addSynapse)
                                let mut body_os = CodeStream::new();
                                let mut syn_subs = base_subs();
                                syn_subs.add_var_substitution("id_pre", "ipre");
                                syn_subs.add_var_substitution("id_post", "ipost");
                                syn_subs.add_func_substitution(
                                    "addToInSyn",
                                    1,
                                    "group->inSyn[ipost] += $(0)",
                                );
                                wum_sim_handler(&mut body_os, g, &mut syn_subs)?;
                                let template = format!(
                                    "{{\nconst unsigned int ipost = $(0);\n{}}}",
                                    body_os.into_string()
                                );

                                let mut row_subs = base_subs();
                                row_subs.add_var_substitution("id_pre", "ipre");
                                row_subs
                                    .add_var_substitution("num_pre", "group->numSrcNeurons");
                                row_subs
                                    .add_var_substitution("num_post", "group->numTrgNeurons");
                                row_subs.add_func_substitution("addSynapse", 1, template);
                                wum_procedural_connect_handler(os, g, &mut row_subs)?;
                            } else {
                                gen_row_body(os, merged, g, "ipre", &mut |os, subs| {
                                    wum_sim_handler(os, g, subs)
                                })?;
                            }
                            Ok(())
                        })?;
                    }
                    Ok(())
                })?;
            }

            for g in merged.postsynaptic_update_groups() {
                let sg = g.archetype(spec);
                let trg = spec.neuron_group(sg.trg());
                os.line(format!("// merged postsynaptic update group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedPostsynapticUpdateGroup{idx} *group = &mergedPostsynapticUpdateGroup{idx}[g];",
                        idx = g.index()
                    ));
                    gen_synapse_delay_offsets(os, merged, g);

                    let slot = if trg.is_delay_required() {
                        "postDelaySlot"
                    } else {
                        "0"
                    };
                    let spike_offset = if trg.is_delay_required() {
                        "(postDelaySlot * group->numTrgNeurons) + "
                    } else {
                        ""
                    };
                    os.line(format!(
                        "for (unsigned int s = 0; s < group->trgSpkCnt[{}]; s++)",
                        slot
                    ));
                    os.scope(|os| -> Result<()> {
                        os.line(format!(
                            "const unsigned int ipost = group->trgSpk[{}s];",
                            spike_offset
                        ));
                        if sg.matrix_type().is_sparse() {
                            os.line("for (unsigned int j = 0; j < group->colLength[ipost]; j++)");
                            os.scope(|os| -> Result<()> {
                                os.line(
                                    "const unsigned int synAddress = group->remap[(ipost * group->colStride) + j];",
                                );
                                os.line(
                                    "const unsigned int ipre = synAddress / group->rowStride;",
                                );
                                let mut subs = base_subs();
                                subs.add_var_substitution("id_pre", "ipre");
                                subs.add_var_substitution("id_post", "ipost");
                                subs.add_var_substitution("id_syn", "synAddress");
                                post_learn_handler(os, g, &mut subs)
                            })
                        } else {
                            os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
                            os.scope(|os| -> Result<()> {
                                os.line(
                                    "const unsigned int synAddress = (i * group->numTrgNeurons) + ipost;",
                                );
                                let mut subs = base_subs();
                                subs.add_var_substitution("id_pre", "i");
                                subs.add_var_substitution("id_post", "ipost");
                                subs.add_var_substitution("id_syn", "synAddress");
                                post_learn_handler(os, g, &mut subs)
                            })
                        }
                    })
                })?;
            }
            Ok(())
        })
    }

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
    ) -> Result<()> {
        let spec = merged.spec();
        os.line("void initialize()");
        os.scope(|os| -> Result<()> {
            os.line("hostRNG.seed(MODEL_SEED);");
            os.blank();

            for g in merged.neuron_init_groups() {
                os.line(format!("// merged neuron init group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedNeuronInitGroup{idx} *group = &mergedNeuronInitGroup{idx}[g];",
                        idx = g.index()
                    ));
                    let mut pop_subs = Substitutions::new();
                    add_host_rng_substitutions(&mut pop_subs);
                    neuron_init_handler(os, g, &pop_subs)
                })?;
            }

            for g in merged.synapse_dense_init_groups() {
                os.line(format!("// merged dense synapse init group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedSynapseDenseInitGroup{idx} *group = &mergedSynapseDenseInitGroup{idx}[g];",
                        idx = g.index()
                    ));
                    let mut pop_subs = Substitutions::new();
                    add_host_rng_substitutions(&mut pop_subs);
                    dense_init_handler(os, g, &mut pop_subs)
                })?;
            }

            for g in merged.synapse_connectivity_init_groups() {
                let sg = g.archetype(spec);
                let snippet = sg.connectivity_initialiser().snippet();
                os.line(format!("// merged synapse connectivity init group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedSynapseConnectivityInitGroup{idx} *group = &mergedSynapseConnectivityInitGroup{idx}[g];",
                        idx = g.index()
                    ));

                    if sg.matrix_type().is_bitmask() {
                        os.line(
                            "for (unsigned int w = 0; w < (((group->numSrcNeurons * group->numTrgNeurons) + 31) / 32); w++)",
                        );
                        os.scope(|os| {
                            os.line("group->gp[w] = 0;");
                        });
                    }

                    if !snippet.row_build_code.is_empty() {
                        os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
                        os.scope(|os| -> Result<()> {
                            if sg.matrix_type().is_sparse() {
                                os.line("group->rowLength[i] = 0;");
                            }
                            let mut subs = Substitutions::new();
                            add_host_rng_substitutions(&mut subs);
                            subs.add_var_substitution("id_pre", "i");
                            subs.add_var_substitution("num_pre", "group->numSrcNeurons");
                            subs.add_var_substitution("num_post", "group->numTrgNeurons");
                            if sg.matrix_type().is_sparse() {
                                subs.add_func_substitution(
                                    "addSynapse",
                                    1,
                                    "group->ind[(i * group->rowStride) + (group->rowLength[i]++)] = $(0)",
                                );
                            } else {
                                subs.add_func_substitution(
                                    "addSynapse",
                                    1,
                                    "group->gp[((i * group->numTrgNeurons) + ($(0))) / 32] |= (0x80000000 >> (((i * group->numTrgNeurons) + ($(0))) & 31))",
                                );
                            }
                            sparse_row_connect_handler(os, g, &mut subs)
                        })?;
                    } else if !snippet.col_build_code.is_empty() {
                        if !sg.matrix_type().is_sparse() {
                            return Err(CodeGenError::backend_unsupported(
                                "column-wise connectivity building over non-sparse matrices",
                            ));
                        }
                        os.line("for (unsigned int j = 0; j < group->numTrgNeurons; j++)");
                        os.scope(|os| -> Result<()> {
                            let mut subs = Substitutions::new();
                            add_host_rng_substitutions(&mut subs);
                            subs.add_var_substitution("id_post", "j");
                            subs.add_var_substitution("num_pre", "group->numSrcNeurons");
                            subs.add_var_substitution("num_post", "group->numTrgNeurons");
                            subs.add_func_substitution(
                                "addSynapse",
                                1,
                                "group->ind[(($(0)) * group->rowStride) + (group->rowLength[$(0)]++)] = j",
                            );
                            sparse_col_connect_handler(os, g, &mut subs)
                        })?;
                    }

                    if sg.matrix_type().has_kernel_weights() {
                        os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
                        os.scope(|os| -> Result<()> {
                            os.line("for (unsigned int j = 0; j < group->numTrgNeurons; j++)");
                            os.scope(|os| -> Result<()> {
                                let mut subs = Substitutions::new();
                                add_host_rng_substitutions(&mut subs);
                                subs.add_var_substitution("id_pre", "i");
                                subs.add_var_substitution("id_post", "j");
                                subs.add_var_substitution(
                                    "id_syn",
                                    "((i * group->numTrgNeurons) + j)",
                                );
                                kernel_init_handler(os, g, &mut subs)
                            })
                        })?;
                    }
                    Ok(())
                })?;
            }

            for g in merged.synapse_sparse_init_groups() {
                os.line(format!("// merged sparse synapse init group {}", g.index()));
                os.line(format!("for (unsigned int g = 0; g < {}; g++)", g.groups().len()));
                os.scope(|os| -> Result<()> {
                    os.line(format!(
                        "const MergedSynapseSparseInitGroup{idx} *group = &mergedSynapseSparseInitGroup{idx}[g];",
                        idx = g.index()
                    ));
                    os.line("for (unsigned int i = 0; i < group->numSrcNeurons; i++)");
                    os.scope(|os| -> Result<()> {
                        let mut subs = Substitutions::new();
                        add_host_rng_substitutions(&mut subs);
                        subs.add_var_substitution("id_pre", "i");
                        sparse_init_handler(os, g, &mut subs)
                    })
                })?;
            }
            Ok(())
        })
    }

    fn gen_pop_variable_init(
        &self,
        os: &mut CodeStream,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()> {
        let mut var_subs = Substitutions::with_parent(subs);
        handler(os, &mut var_subs)
    }

    fn gen_variable_init(
        &self,
        os: &mut CodeStream,
        count: &str,
        index_name: &str,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()> {
        os.line(format!("for (unsigned int i = 0; i < {}; i++)", count));
        os.scope(|os| {
            let mut var_subs = Substitutions::with_parent(subs);
            var_subs.add_var_substitution(index_name, "i");
            handler(os, &mut var_subs)
        })
    }

    fn gen_synapse_variable_row_init(
        &self,
        os: &mut CodeStream,
        sg: &SynapseGroupMerged,
        spec: &spikegen_model::ModelSpec,
        subs: &Substitutions,
        handler: VarInitHandler,
    ) -> Result<()> {
        let matrix = sg.archetype(spec).matrix_type();
        let id_pre = subs.var("id_pre")?.to_string();
        if matrix.is_sparse() {
            os.line(format!(
                "for (unsigned int j = 0; j < group->rowLength[{}]; j++)",
                id_pre
            ));
            os.scope(|os| {
                let mut var_subs = Substitutions::with_parent(subs);
                var_subs.add_var_substitution(
                    "id_syn",
                    format!("(({} * group->rowStride) + j)", id_pre),
                );
                var_subs.add_var_substitution(
                    "id_post",
                    format!("group->ind[(({} * group->rowStride) + j)]", id_pre),
                );
                var_subs.add_var_substitution("id", "j");
                handler(os, &mut var_subs)
            })
        } else {
            os.line("for (unsigned int j = 0; j < group->numTrgNeurons; j++)");
            os.scope(|os| {
                let mut var_subs = Substitutions::with_parent(subs);
                var_subs.add_var_substitution(
                    "id_syn",
                    format!("(({} * group->numTrgNeurons) + j)", id_pre),
                );
                var_subs.add_var_substitution("id_post", "j");
                var_subs.add_var_substitution("id", "j");
                handler(os, &mut var_subs)
            })
        }
    }

    fn supports_namespace(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_variable_init_runs_handler_once() {
        let backend = SingleThreadedBackend::new();
        let mut os = CodeStream::new();
        let subs = Substitutions::new();
        backend
            .gen_pop_variable_init(&mut os, &subs, &mut |os, _subs| {
                os.line("*group->spkQuePtr = 0;");
                Ok(())
            })
            .unwrap();
        assert_eq!(os.as_str(), "*group->spkQuePtr = 0;\n");
    }

    #[test]
    fn variable_init_binds_index() {
        let backend = SingleThreadedBackend::new();
        let mut os = CodeStream::new();
        let subs = Substitutions::new();
        backend
            .gen_variable_init(&mut os, "group->numNeurons", "id", &subs, &mut |os, subs| {
                os.line(format!("group->spk[{}] = 0;", subs.var("id")?));
                Ok(())
            })
            .unwrap();
        let out = os.as_str();
        assert!(out.contains("for (unsigned int i = 0; i < group->numNeurons; i++)"));
        assert!(out.contains("group->spk[i] = 0;"));
    }
}
