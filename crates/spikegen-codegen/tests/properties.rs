//! Cross-cutting properties of the generation pipeline

mod common;

use std::sync::Arc;

use spikegen_codegen::precision::ensure_scalar_suffix;
use spikegen_codegen::{generate_code, CodeGenError, SingleThreadedBackend, Substitutions};
use spikegen_model::library::{
    connectivity_snippets, current_source_models, neuron_models, postsynaptic_models,
    var_init_snippets, weight_update_models,
};
use spikegen_model::{
    MatrixType, ModelSpec, NeuronModel, PostsynapticInit, ScalarType, SparseConnectivityInit,
    Var, VarInit, WeightUpdateInit, NO_DELAY,
};

/// A specification exercising delays, bitmask and sparse connectivity,
/// individual and global weights, postsynaptic conductances, plasticity,
/// current sources and RNG-dependent initialisation
fn rich_spec() -> ModelSpec {
    let mut spec = ModelSpec::new("rich");
    spec.set_dt(0.1);
    spec.set_seed(1234);

    spec.add_neuron_population(
        "Input",
        100,
        neuron_models::poisson(),
        vec![10.0],
        vec![VarInit::constant(0.0)],
    )
    .expect("add Input");
    spec.add_neuron_population(
        "E",
        200,
        neuron_models::lif(),
        vec![1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0],
        vec![
            VarInit::new(var_init_snippets::uniform(), vec![-70.0, -50.0]).expect("uniform init"),
            VarInit::constant(0.0),
        ],
    )
    .expect("add E");
    spec.add_neuron_population(
        "I",
        50,
        neuron_models::lif(),
        vec![1.0, 10.0, -70.0, -70.0, -50.0, 0.0, 2.0],
        vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
    )
    .expect("add I");

    spec.add_current_source(
        "ENoise",
        current_source_models::gaussian_noise(),
        "E",
        vec![0.0, 0.1],
        vec![],
    )
    .expect("add current source");

    spec.add_synapse_population(
        "InputE",
        MatrixType::BitmaskGlobal,
        2,
        "Input",
        "E",
        WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            vec![],
            vec![VarInit::constant(0.1)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(connectivity_snippets::fixed_probability(), vec![0.1])
            .expect("connectivity"),
    )
    .expect("add InputE");

    spec.add_synapse_population(
        "EI",
        MatrixType::SparseIndividual,
        NO_DELAY,
        "E",
        "I",
        WeightUpdateInit::new(
            weight_update_models::stdp_additive(),
            vec![20.0, 20.0, 0.01, 0.012, 0.0, 1.0],
            vec![VarInit::constant(0.5)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(
            connectivity_snippets::fixed_probability_no_autapse(),
            vec![0.05],
        )
        .expect("connectivity"),
    )
    .expect("add EI");

    spec.add_synapse_population(
        "IE",
        MatrixType::DenseIndividual,
        NO_DELAY,
        "I",
        "E",
        WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            vec![],
            vec![VarInit::new(var_init_snippets::uniform(), vec![-0.2, 0.0]).expect("uniform")],
        ),
        PostsynapticInit::new(
            postsynaptic_models::exp_cond(),
            vec![10.0, -80.0],
            vec![],
        ),
        SparseConnectivityInit::uninitialised(),
    )
    .expect("add IE");

    spec
}

/// Scan for any surviving token of the recognised placeholder grammar
fn assert_placeholder_free(code: &str, what: &str) {
    assert!(
        !code.contains("$("),
        "{} still contains a placeholder near: {}",
        what,
        code.split("$(").nth(1).map(|s| &s[..s.len().min(60)]).unwrap_or("")
    );
}

#[test]
fn placeholder_closure_over_rich_spec() {
    let mut spec = rich_spec();
    spec.finalize().expect("finalize");
    let code = common::generate(&spec);
    for (module, name) in code.modules().iter().zip([
        "definitions",
        "init",
        "neuronUpdate",
        "synapseUpdate",
    ]) {
        assert_placeholder_free(module, name);
    }
}

#[test]
fn finalization_and_generation_are_idempotent() {
    let mut spec = rich_spec();
    spec.finalize().expect("first finalize");
    let first = common::generate(&spec);
    spec.finalize().expect("second finalize");
    let second = common::generate(&spec);
    assert_eq!(first.definitions, second.definitions);
    assert_eq!(first.init, second.init);
    assert_eq!(first.neuron_update, second.neuron_update);
    assert_eq!(first.synapse_update, second.synapse_update);
}

#[test]
fn every_float_literal_carries_the_active_suffix() {
    // The rewriter is idempotent exactly when all literals already carry
    // the right suffix for the active precision
    let mut spec = rich_spec();
    spec.finalize().expect("finalize");
    let code = common::generate(&spec);
    for module in code.modules() {
        assert_eq!(ensure_scalar_suffix(module, ScalarType::F32), module);
    }

    let mut spec = rich_spec();
    spec.set_precision(ScalarType::F64);
    spec.finalize().expect("finalize");
    let code = common::generate(&spec);
    for module in code.modules() {
        assert_eq!(ensure_scalar_suffix(module, ScalarType::F64), module);
    }
    assert!(code.definitions.contains("typedef double scalar;"));
}

#[test]
fn inner_scope_wins_over_outer() {
    let mut outer = Substitutions::new();
    outer.add_var_substitution("value", "outerValue");
    outer.add_var_substitution("id", "i");
    let mut inner = Substitutions::with_parent(&outer);
    inner.add_var_substitution("value", "innerValue");
    let applied = inner.apply("$(value) = $(id);");
    assert_eq!(applied, "innerValue = i;");
}

#[test]
fn unresolved_placeholder_aborts_generation() {
    let mut spec = ModelSpec::new("broken");
    spec.set_dt(0.1);
    let broken = Arc::new(NeuronModel {
        vars: vec![Var::new("V", "scalar")],
        sim_code: "$(V) += $(definitelyNotDeclared);\n".into(),
        ..Default::default()
    });
    spec.add_neuron_population("Pop", 10, broken, vec![], vec![VarInit::constant(0.0)])
        .expect("add population");
    spec.finalize().expect("finalize");

    let err = generate_code(&spec, &SingleThreadedBackend::new()).unwrap_err();
    match err {
        CodeGenError::UnresolvedPlaceholder {
            context,
            placeholder,
        } => {
            assert!(context.contains("simCode"));
            assert_eq!(placeholder, "$(definitelyNotDeclared)");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn artifact_set_written_to_disk() {
    let mut spec = rich_spec();
    spec.finalize().expect("finalize");
    let code = common::generate(&spec);

    let dir = tempfile::tempdir().expect("tempdir");
    code.write_to(dir.path()).expect("write artifacts");
    for name in ["definitions.h", "init.cc", "neuronUpdate.cc", "synapseUpdate.cc"] {
        let path = dir.path().join(name);
        let contents = std::fs::read_to_string(&path).expect("read artifact");
        assert!(!contents.is_empty(), "{} is empty", name);
    }
}

#[test]
fn exponential_trace_stdp_decays_every_timestep_and_bumps_on_spikes() {
    let mut spec = ModelSpec::new("stdp-exp");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "Pre", 50, 20.0);
    common::lif_pop(&mut spec, "Post", 50, 20.0);
    spec.add_synapse_population(
        "Plastic",
        MatrixType::SparseIndividual,
        NO_DELAY,
        "Pre",
        "Post",
        WeightUpdateInit::new(
            weight_update_models::stdp_exponential(),
            vec![20.0, 2.02, 0.01, 0.0, 0.3, 1.0],
            vec![VarInit::constant(0.1)],
        )
        .with_pre_vars(vec![VarInit::constant(0.0)])
        .with_post_vars(vec![VarInit::constant(0.0)]),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::new(connectivity_snippets::fixed_probability(), vec![0.1])
            .expect("connectivity"),
    )
    .expect("add synapse population");
    spec.finalize().expect("finalize");

    let code = common::generate(&spec);
    // Traces live beside their populations and are initialised there
    assert!(code.init.contains("group->preTraceWUPre0[i] = 0.0f;"));
    assert!(code.init.contains("group->postTraceWUPost0[i] = 0.0f;"));
    // Decay runs once per element per timestep, in the neuron body
    assert!(code.neuron_update.contains("scalar lpreTrace = group->preTraceWUPre0[i];"));
    assert!(code.neuron_update.contains("lpreTrace *= 0.99"));
    assert!(code.neuron_update.contains("lpostTrace *= 0.99"));
    // Spike-triggered bumps see the already-decayed state
    assert!(code.neuron_update.contains("lpreTrace += 1.0f;"));
    assert!(code.neuron_update.contains("lpostTrace += 1.0f;"));
    assert!(code.neuron_update.contains("group->preTraceWUPre0[i] = lpreTrace;"));
    // Synapse fragments read the opposite endpoint's trace
    assert!(code.synapse_update.contains("group->postTrace[ipost]"));
    assert!(code.synapse_update.contains("group->preTrace[ipre]"));
    for module in code.modules() {
        assert!(!module.contains("$("), "placeholder survived emission");
    }
}

#[test]
fn heterogeneous_weight_update_params_load_from_fields() {
    let mut spec = ModelSpec::new("wu-het");
    spec.set_dt(0.1);
    common::lif_pop(&mut spec, "A", 64, 20.0);
    common::lif_pop(&mut spec, "B", 64, 20.0);
    common::lif_pop(&mut spec, "T", 64, 20.0);
    for (name, src, a_plus) in [("AT", "A", 0.01), ("BT", "B", 0.02)] {
        spec.add_synapse_population(
            name,
            MatrixType::DenseIndividual,
            NO_DELAY,
            src,
            "T",
            WeightUpdateInit::new(
                weight_update_models::stdp_additive(),
                vec![20.0, 20.0, a_plus, 0.012, 0.0, 1.0],
                vec![VarInit::constant(0.5)],
            ),
            PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
            SparseConnectivityInit::uninitialised(),
        )
        .expect("add synapse population");
    }
    spec.finalize().expect("finalize");

    let merged = spikegen_codegen::ModelSpecMerged::new(&spec).expect("merge");
    assert_eq!(merged.postsynaptic_update_groups().len(), 1);
    let g = &merged.postsynaptic_update_groups()[0];
    // Aplus (slot 2) differs, the rest are homogeneous
    assert!(g.is_wu_param_heterogeneous(&spec, 2));
    assert!(!g.is_wu_param_heterogeneous(&spec, 0));

    let code = common::generate(&spec);
    assert!(code.synapse_update.contains("group->Aplus"));
    assert!(code.definitions.contains("scalar Aplus;"));
}
