//! Shared fixtures for code-generation tests

#![allow(dead_code)]

use std::sync::Arc;

use spikegen_codegen::{generate_code, GeneratedCode, SingleThreadedBackend};
use spikegen_model::library::{postsynaptic_models, weight_update_models};
use spikegen_model::{
    MatrixType, ModelSpec, NeuronGroupId, NeuronModel, PostsynapticInit, SparseConnectivityInit,
    SynapseGroupId, VarInit, Var, WeightUpdateInit, NO_DELAY,
};

/// Forward-Euler leaky integrate-and-fire model whose sim code references
/// its parameters directly
pub fn euler_lif() -> Arc<NeuronModel> {
    Arc::new(NeuronModel {
        param_names: vec![
            "TauM".into(),
            "Vrest".into(),
            "Vreset".into(),
            "Vthresh".into(),
            "Ioffset".into(),
            "TauRefrac".into(),
        ],
        vars: vec![Var::new("V", "scalar"), Var::new("RefracTime", "scalar")],
        sim_code: concat!(
            "if ($(RefracTime) <= 0.0) {\n",
            "  $(V) += (DT / $(TauM)) * (($(Vrest) - $(V)) + $(Ioffset)) + $(Isyn);\n",
            "}\n",
            "else {\n",
            "  $(RefracTime) -= DT;\n",
            "}\n"
        )
        .into(),
        threshold_condition_code: "$(RefracTime) <= 0.0 && $(V) >= $(Vthresh)".into(),
        reset_code: "$(V) = $(Vreset);\n$(RefracTime) = $(TauRefrac);\n".into(),
        needs_auto_refractory: false,
        ..Default::default()
    })
}

/// Add an Euler-LIF population with standard parameters and the given
/// membrane time constant
pub fn lif_pop(spec: &mut ModelSpec, name: &str, n: usize, tau_m: f64) -> NeuronGroupId {
    spec.add_neuron_population(
        name,
        n,
        euler_lif(),
        vec![tau_m, -70.0, -70.0, -50.0, 0.0, 2.0],
        vec![VarInit::constant(-70.0), VarInit::constant(0.0)],
    )
    .expect("add lif population")
}

/// Connect two populations densely with a shared static weight
pub fn static_dense_global(
    spec: &mut ModelSpec,
    name: &str,
    src: &str,
    trg: &str,
    weight: f64,
) -> SynapseGroupId {
    spec.add_synapse_population(
        name,
        MatrixType::DenseGlobal,
        NO_DELAY,
        src,
        trg,
        WeightUpdateInit::new(
            weight_update_models::static_pulse(),
            vec![],
            vec![VarInit::constant(weight)],
        ),
        PostsynapticInit::new(postsynaptic_models::delta_curr(), vec![], vec![]),
        SparseConnectivityInit::uninitialised(),
    )
    .expect("add synapse population")
}

/// Generate code for a finalized spec through the reference backend
pub fn generate(spec: &ModelSpec) -> GeneratedCode {
    generate_code(spec, &SingleThreadedBackend::new()).expect("generate code")
}
