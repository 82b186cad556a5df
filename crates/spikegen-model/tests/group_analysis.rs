//! Requirement queries and finalization analysis

use std::sync::Arc;

use spikegen_model::library::{
    connectivity_snippets, current_source_models, neuron_models, postsynaptic_models,
    var_init_snippets, weight_update_models,
};
use spikegen_model::{
    MatrixType, ModelSpec, NeuronModel, PostsynapticInit, SparseConnectivityInit, SpecError, Var,
    VarInit, WeightUpdateInit, WeightUpdateModel, NO_DELAY,
};

fn lif_pop(spec: &mut ModelSpec, name: &str, n: usize) {
    spec.add_neuron_population(
        name,
        n,
        neuron_models::lif(),
        vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
        vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
    )
    .expect("add population");
}

#[test]
fn queue_mask_tracks_pre_and_post_references() {
    // A weight update model reading the presynaptic membrane potential and
    // the postsynaptic refractory state
    let wu = Arc::new(WeightUpdateModel {
        vars: vec![Var::read_only("g", "scalar")],
        sim_code: "$(addToInSyn, $(g) * $(V_pre));\n".into(),
        synapse_dynamics_code: "if ($(RefracTime_post) > 0.0) { $(addToInSyn, 0.0); }\n".into(),
        ..Default::default()
    });

    let mut spec = ModelSpec::new("queues");
    spec.set_dt(0.1);
    lif_pop(&mut spec, "Src", 10);
    lif_pop(&mut spec, "Trg", 10);
    spec.add_synapse_population(
        "Syn",
        MatrixType::DenseGlobal,
        3,
        "Src",
        "Trg",
        WeightUpdateInit::new(wu, vec![], vec![VarInit::constant(0.1)]),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::uninitialised(),
    )
    .expect("add synapse population");
    spec.finalize().expect("finalize");

    let src = spec.neuron_group(spec.find_neuron_group("Src").unwrap());
    // V is read through `V_pre`; RefracTime is not referenced with `_pre`
    assert!(src.is_var_queue_required(0));
    assert!(!src.is_var_queue_required(1));

    let trg = spec.neuron_group(spec.find_neuron_group("Trg").unwrap());
    assert!(!trg.is_var_queue_required(0));
    assert!(trg.is_var_queue_required(1));
}

#[test]
fn delay_slots_exceed_every_adjacent_delay() {
    let mut spec = ModelSpec::new("monotone");
    spec.set_dt(0.1);
    lif_pop(&mut spec, "A", 10);
    lif_pop(&mut spec, "B", 10);
    for (name, delay) in [("AB1", 3), ("AB2", 7), ("AB3", 1)] {
        spec.add_synapse_population(
            name,
            MatrixType::DenseGlobal,
            delay,
            "A",
            "B",
            WeightUpdateInit::new(
                weight_update_models::static_pulse(),
                vec![],
                vec![VarInit::constant(0.1)],
            ),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
            SparseConnectivityInit::uninitialised(),
        )
        .expect("add synapse population");
    }
    spec.finalize().expect("finalize");

    let a = spec.neuron_group(spec.find_neuron_group("A").unwrap());
    for sg in spec.synapse_groups() {
        assert!(a.num_delay_slots() > sg.delay_steps());
    }
    assert_eq!(a.num_delay_slots(), 8);
}

#[test]
fn rng_requirements_split_by_phase() {
    let mut spec = ModelSpec::new("rng");
    spec.set_dt(0.1);
    spec.add_neuron_population(
        "E",
        10,
        neuron_models::lif(),
        vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
        vec![
            VarInit::new(var_init_snippets::uniform(), vec![-70.0, -50.0]).expect("uniform"),
            VarInit::constant(0.0),
        ],
    )
    .expect("add E");
    lif_pop(&mut spec, "Quiet", 10);
    spec.add_current_source(
        "Noise",
        current_source_models::gaussian_noise(),
        "Quiet",
        vec![0.0, 1.0],
        vec![],
    )
    .expect("add source");
    spec.finalize().expect("finalize");

    let e = spec.neuron_group(spec.find_neuron_group("E").unwrap());
    assert!(e.is_init_rng_required());
    assert!(!e.is_sim_rng_required());

    let quiet = spec.neuron_group(spec.find_neuron_group("Quiet").unwrap());
    assert!(!quiet.is_init_rng_required());
    assert!(quiet.is_sim_rng_required());
}

#[test]
fn spike_time_requirements_follow_weight_update_flags() {
    let mut spec = ModelSpec::new("spike-times");
    spec.set_dt(0.1);
    lif_pop(&mut spec, "Pre", 10);
    lif_pop(&mut spec, "Post", 10);
    spec.add_synapse_population(
        "Plastic",
        MatrixType::SparseIndividual,
        NO_DELAY,
        "Pre",
        "Post",
        WeightUpdateInit::new(
            weight_update_models::stdp_additive(),
            vec![20.0, 20.0, 0.01, 0.012, 0.0, 1.0],
            vec![VarInit::constant(0.5)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(connectivity_snippets::fixed_probability(), vec![0.1])
            .expect("connectivity"),
    )
    .expect("add synapse population");
    spec.finalize().expect("finalize");

    let pre = spec.neuron_group(spec.find_neuron_group("Pre").unwrap());
    let post = spec.neuron_group(spec.find_neuron_group("Post").unwrap());
    assert!(pre.is_spike_time_required());
    assert!(post.is_spike_time_required());
    // Learning on postsynaptic spikes forces true-spike recording on Post
    assert!(post.is_true_spike_required());
    assert!(pre.is_true_spike_required());
}

#[test]
fn fusion_respects_linear_combinability() {
    let mut spec = ModelSpec::new("fusion");
    spec.set_dt(0.1);
    lif_pop(&mut spec, "A", 10);
    lif_pop(&mut spec, "B", 10);
    lif_pop(&mut spec, "T", 10);

    // Same postsynaptic model, different parameters: not combinable
    for (name, src, tau) in [("AT", "A", 5.0), ("BT", "B", 10.0)] {
        spec.add_synapse_population(
            name,
            MatrixType::DenseGlobal,
            NO_DELAY,
            src,
            "T",
            WeightUpdateInit::new(
                weight_update_models::static_pulse(),
                vec![],
                vec![VarInit::constant(0.1)],
            ),
            PostsynapticInit::new(postsynaptic_models::exp_cond(), vec![tau, 0.0], vec![]),
            SparseConnectivityInit::uninitialised(),
        )
        .expect("add synapse population");
    }
    spec.finalize().expect("finalize");

    let t = spec.neuron_group(spec.find_neuron_group("T").unwrap());
    assert_eq!(t.merged_in_syn().len(), 2);
    for sg in spec.synapse_groups() {
        assert!(!sg.is_ps_model_fused());
    }
}

#[test]
fn egp_location_requires_pointer_type() {
    let model = Arc::new(NeuronModel {
        vars: vec![Var::new("V", "scalar")],
        sim_code: "$(V) += $(offset);\n".into(),
        egps: vec![spikegen_model::EgpVar::new("offset", "scalar")],
        ..Default::default()
    });
    let mut spec = ModelSpec::new("egp");
    let ng = spec
        .add_neuron_population("Pop", 10, model, vec![], vec![VarInit::constant(0.0)])
        .expect("add population");
    let err = spec
        .set_neuron_egp_location(ng, "offset", spikegen_model::VarLocation::Device)
        .unwrap_err();
    assert!(matches!(err, SpecError::EgpNotPointer { .. }));
}

#[test]
fn mutation_after_finalize_is_rejected() {
    let mut spec = ModelSpec::new("frozen");
    lif_pop(&mut spec, "A", 10);
    spec.finalize().expect("finalize");
    let err = spec
        .add_neuron_population(
            "B",
            10,
            neuron_models::lif(),
            vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
            vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
        )
        .unwrap_err();
    assert!(matches!(err, SpecError::ShapeMismatch { .. }));
}
