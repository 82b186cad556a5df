//! End-to-end emission scenarios over the reference backend

mod common;

use spikegen_codegen::ModelSpecMerged;
use spikegen_model::library::{connectivity_snippets, postsynaptic_models, weight_update_models};
use spikegen_model::{
    MatrixType, ModelSpec, PostsynapticInit, SparseConnectivityInit, VarInit, WeightUpdateInit,
    NO_DELAY,
};

#[test]
fn lif_singleton_substitutes_vars_and_params() {
    let mut spec = ModelSpec::new("scenario1");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "Pop", 256, 20.0);
    spec.finalize().expect("finalize");

    let merged = ModelSpecMerged::new(&spec).expect("merge");
    assert_eq!(merged.neuron_update_groups().len(), 1);
    assert_eq!(merged.neuron_init_groups().len(), 1);

    let code = common::generate(&spec);
    // $(V) becomes the local alias, $(TauM) the literal in active precision
    assert!(code.neuron_update.contains("scalar lV = group->V[i];"));
    assert!(code.neuron_update.contains("lV += (DT / 20.0f) * ((-70.0f - lV) + 0.0f) + Isyn;"));
    assert!(code.neuron_update.contains("lRefracTime <= 0.0f && lV >= -50.0f"));
    assert!(code.neuron_update.contains("group->V[i] = lV;"));
}

#[test]
fn identical_populations_share_one_merged_group() {
    let mut spec = ModelSpec::new("scenario2");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "A", 256, 20.0);
    common::lif_pop(&mut spec, "B", 512, 20.0);
    spec.finalize().expect("finalize");

    let merged = ModelSpecMerged::new(&spec).expect("merge");
    assert_eq!(merged.neuron_update_groups().len(), 1);
    assert_eq!(merged.neuron_update_groups()[0].groups().len(), 2);

    let code = common::generate(&spec);
    // Population size is reached through the per-member field, never inlined
    assert!(code.neuron_update.contains("i < group->numNeurons"));
    assert!(!code.neuron_update.contains("256"));
    assert!(!code.neuron_update.contains("512"));
}

#[test]
fn differing_parameter_becomes_heterogeneous_field() {
    let mut spec = ModelSpec::new("scenario3");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "A", 256, 20.0);
    common::lif_pop(&mut spec, "B", 256, 10.0);
    spec.finalize().expect("finalize");

    let merged = ModelSpecMerged::new(&spec).expect("merge");
    assert_eq!(merged.neuron_update_groups().len(), 1);
    let g = &merged.neuron_update_groups()[0];
    // Slot 0 (TauM) differs, everything else is homogeneous
    assert!(g.is_param_heterogeneous(&spec, 0));
    for p in 1..6 {
        assert!(!g.is_param_heterogeneous(&spec, p), "param {} should be homogeneous", p);
    }

    let code = common::generate(&spec);
    assert!(code.neuron_update.contains("(DT / group->TauM)"));
    assert!(!code.neuron_update.contains("(DT / 20.0f)"));
    // Homogeneous slots stay literals
    assert!(code.neuron_update.contains("-70.0f"));
    // The heterogeneous slot becomes a struct field
    assert!(code.definitions.contains("scalar TauM;"));
}

#[test]
fn postsynaptic_models_fuse_into_one_accumulator() {
    let build = |merge: bool| {
        let mut spec = ModelSpec::new("scenario4");
        spec.set_dt(0.1);
        spec.set_merge_postsynaptic_models(merge);
        common::lif_pop(&mut spec, "A", 64, 20.0);
        common::lif_pop(&mut spec, "B", 64, 20.0);
        common::lif_pop(&mut spec, "T", 32, 20.0);
        let at = common::static_dense_global(&mut spec, "AT", "A", "T", 0.1);
        let bt = common::static_dense_global(&mut spec, "BT", "B", "T", 0.1);
        spec.finalize().expect("finalize");
        (spec, at, bt)
    };

    let (spec, at, bt) = build(true);
    let t = spec.find_neuron_group("T").unwrap();
    assert_eq!(spec.neuron_group(t).merged_in_syn().len(), 1);
    assert_eq!(spec.synapse_group(at).ps_model_target_name(), "Merged0_T");
    assert_eq!(spec.synapse_group(bt).ps_model_target_name(), "Merged0_T");
    let code = common::generate(&spec);
    assert!(code.neuron_update.contains("inSynInSyn0"));
    assert!(!code.neuron_update.contains("inSynInSyn1"));

    let (spec, at, bt) = build(false);
    let t = spec.find_neuron_group("T").unwrap();
    assert_eq!(spec.neuron_group(t).merged_in_syn().len(), 2);
    assert_eq!(spec.synapse_group(at).ps_model_target_name(), "AT");
    assert_eq!(spec.synapse_group(bt).ps_model_target_name(), "BT");
    let code = common::generate(&spec);
    assert!(code.neuron_update.contains("inSynInSyn0"));
    assert!(code.neuron_update.contains("inSynInSyn1"));
}

#[test]
fn fixed_probability_rows_build_in_one_unbounded_loop() {
    let mut spec = ModelSpec::new("scenario5");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "Pre", 100, 20.0);
    common::lif_pop(&mut spec, "Post", 100, 20.0);
    spec.add_synapse_population(
        "Syn",
        MatrixType::SparseGlobal,
        NO_DELAY,
        "Pre",
        "Post",
        WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            vec![],
            vec![VarInit::constant(0.1)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(connectivity_snippets::fixed_probability(), vec![0.1])
            .expect("connectivity init"),
    )
    .expect("add synapse population");
    spec.finalize().expect("finalize");

    let code = common::generate(&spec);
    assert_eq!(code.init.matches("while(true)").count(), 1);
    assert!(code.init.contains("break;"));
    assert!(!code.init.contains("$(endRow)"));
    // Row building draws on the host RNG through the backend mapping
    assert!(code.init.contains("standardUniformDistribution(hostRNG)"));
    // The synapse registration placeholder expanded to an indices store
    assert!(code.init.contains("group->ind[(i * group->rowStride) + (group->rowLength[i]++)]"));
}

#[test]
fn delayed_spike_times_are_queued_and_written_back() {
    let mut spec = ModelSpec::new("scenario6");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "Pre", 100, 20.0);
    common::lif_pop(&mut spec, "Post", 100, 20.0);
    spec.add_synapse_population(
        "Plastic",
        MatrixType::SparseIndividual,
        5,
        "Pre",
        "Post",
        WeightUpdateInit::new(
            weight_update_models::stdp_additive(),
            vec![20.0, 20.0, 0.01, 0.012, 0.0, 1.0],
            vec![VarInit::constant(0.5)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(connectivity_snippets::fixed_probability(), vec![0.1])
            .expect("connectivity init"),
    )
    .expect("add synapse population");
    spec.finalize().expect("finalize");

    let pre = spec.find_neuron_group("Pre").unwrap();
    assert_eq!(spec.neuron_group(pre).num_delay_slots(), 6);
    assert!(spec.neuron_group(pre).is_spike_time_required());

    let code = common::generate(&spec);
    // Queue pointer zeroed, spike times sentinel-filled across all slots
    assert!(code.init.contains("*group->spkQuePtr = 0;"));
    assert!(code.init.contains("for (unsigned int d = 0; d < 6; d++)"));
    assert!(code.init.contains("group->sT[(d * group->numNeurons) + i] = -TIME_MAX;"));
    // Spike time written at the write offset on both branches
    assert!(code.neuron_update.contains("group->sT[writeDelayOffset + i] = t;"));
    assert!(code.neuron_update.contains("group->sT[writeDelayOffset + i] = lsT;"));
    // Synapse code reads both endpoints' spike times, delay-offset on the
    // delayed side only
    assert!(code.synapse_update.contains("group->sTPost[ipost]"));
    assert!(code.synapse_update.contains("group->sTPre[preReadDelayOffset + ipre]"));
}
