//! Built-in model descriptors and initialiser snippets
//!
//! The small set of standard models most specifications start from. Each
//! constructor returns a fresh `Arc`; descriptor identity for merging is
//! structural, so sharing the `Arc` is a convenience rather than a
//! requirement.

use std::sync::Arc;

use crate::init::{SparseConnectivityInitSnippet, StateVar, VarInitSnippet};
use crate::models::{CurrentSourceModel, NeuronModel, PostsynapticModel, WeightUpdateModel};
use crate::snippet::{DerivedParam, Var};

/// Built-in neuron models
pub mod neuron_models {
    use super::*;

    /// Leaky integrate-and-fire neuron with exponential-Euler integration
    /// and a fixed refractory period
    pub fn lif() -> Arc<NeuronModel> {
        Arc::new(NeuronModel {
            param_names: vec![
                "C".into(),
                "TauM".into(),
                "Vrest".into(),
                "Vreset".into(),
                "Vthresh".into(),
                "Ioffset".into(),
                "TauRefrac".into(),
            ],
            derived_params: vec![
                DerivedParam::new("ExpTC", |pars, dt| (-dt / pars[1]).exp()),
                DerivedParam::new("Rmembrane", |pars, _dt| pars[1] / pars[0]),
            ],
            vars: vec![Var::new("V", "scalar"), Var::new("RefracTime", "scalar")],
            sim_code: concat!(
                "if ($(RefracTime) <= 0.0) {\n",
                "  scalar alpha = (($(Isyn) + $(Ioffset)) * $(Rmembrane));\n",
                "  $(V) = alpha - ($(ExpTC) * (alpha - $(V)));\n",
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

    /// Poisson spike source driven by exponentially-distributed inter-spike
    /// intervals
    pub fn poisson() -> Arc<NeuronModel> {
        Arc::new(NeuronModel {
            param_names: vec!["rate".into()],
            derived_params: vec![DerivedParam::new("isi", |pars, dt| 1000.0 / (pars[0] * dt))],
            vars: vec![Var::new("timeStepToSpike", "scalar")],
            sim_code: concat!(
                "if($(timeStepToSpike) <= 0.0) {\n",
                "  $(timeStepToSpike) += $(isi) * $(rng_exponential);\n",
                "}\n",
                "$(timeStepToSpike) -= 1.0;\n"
            )
            .into(),
            threshold_condition_code: "$(timeStepToSpike) <= 0.0".into(),
            needs_auto_refractory: true,
            ..Default::default()
        })
    }
}

/// Built-in weight update models
pub mod weight_update_models {
    use super::*;

    /// Static synapse: each presynaptic spike deposits the weight
    pub fn static_pulse() -> Arc<WeightUpdateModel> {
        Arc::new(WeightUpdateModel {
            vars: vec![Var::read_only("g", "scalar")],
            sim_code: "$(addToInSyn, $(g));\n".into(),
            ..Default::default()
        })
    }

    /// Additive spike-timing-dependent plasticity keyed on pre and
    /// postsynaptic spike times
    pub fn stdp_additive() -> Arc<WeightUpdateModel> {
        Arc::new(WeightUpdateModel {
            param_names: vec![
                "tauPlus".into(),
                "tauMinus".into(),
                "Aplus".into(),
                "Aminus".into(),
                "Wmin".into(),
                "Wmax".into(),
            ],
            vars: vec![Var::new("g", "scalar")],
            sim_code: concat!(
                "$(addToInSyn, $(g));\n",
                "const scalar dt = $(t) - $(sT_post);\n",
                "if (dt > 0) {\n",
                "  const scalar newWeight = $(g) - ($(Aminus) * exp(-dt / $(tauMinus)));\n",
                "  $(g) = fmax($(Wmin), newWeight);\n",
                "}\n"
            )
            .into(),
            learn_post_code: concat!(
                "const scalar dt = $(t) - $(sT_pre);\n",
                "if (dt > 0) {\n",
                "  const scalar newWeight = $(g) + ($(Aplus) * exp(-dt / $(tauPlus)));\n",
                "  $(g) = fmin($(Wmax), newWeight);\n",
                "}\n"
            )
            .into(),
            is_pre_spike_time_required: true,
            is_post_spike_time_required: true,
            ..Default::default()
        })
    }

    /// Exponential-trace spike-timing-dependent plasticity: per-neuron pre
    /// and postsynaptic traces decay every timestep and are bumped by
    /// spikes; weight changes read the opposite endpoint's trace
    pub fn stdp_exponential() -> Arc<WeightUpdateModel> {
        Arc::new(WeightUpdateModel {
            param_names: vec![
                "tauSTDP".into(),
                "alpha".into(),
                "lambda".into(),
                "Wmin".into(),
                "Wmax".into(),
                "Scale".into(),
            ],
            derived_params: vec![DerivedParam::new("tauSTDPDecay", |pars, dt| {
                (-dt / pars[0]).exp()
            })],
            vars: vec![Var::new("g", "scalar")],
            pre_vars: vec![Var::new("preTrace", "scalar")],
            post_vars: vec![Var::new("postTrace", "scalar")],
            sim_code: concat!(
                "$(addToInSyn, ($(g) * $(Scale)));\n",
                "const scalar newWeight = $(g) - ($(alpha) * $(lambda) * $(g) * exp(-$(postTrace) / DT));\n",
                "$(g) = fmax($(Wmin), newWeight);\n"
            )
            .into(),
            learn_post_code: concat!(
                "const scalar newWeight = $(g) + ($(lambda) * (1.0 - $(g)) * exp(-$(preTrace) / DT));\n",
                "$(g) = fmin($(Wmax), newWeight);\n"
            )
            .into(),
            pre_spike_code: "$(preTrace) += 1.0;\n".into(),
            post_spike_code: "$(postTrace) += 1.0;\n".into(),
            pre_dynamics_code: "$(preTrace) *= $(tauSTDPDecay);\n".into(),
            post_dynamics_code: "$(postTrace) *= $(tauSTDPDecay);\n".into(),
            ..Default::default()
        })
    }
}

/// Built-in postsynaptic models
pub mod postsynaptic_models {
    use super::*;

    /// Delta current: accumulated input is applied in one timestep
    pub fn delta_curr() -> Arc<PostsynapticModel> {
        Arc::new(PostsynapticModel {
            apply_input_code: "$(Isyn) += $(inSyn);\n".into(),
            decay_code: "$(inSyn) = 0;\n".into(),
            ..Default::default()
        })
    }

    /// Exponentially-decaying conductance with a reversal potential
    pub fn exp_cond() -> Arc<PostsynapticModel> {
        Arc::new(PostsynapticModel {
            param_names: vec!["tau".into(), "E".into()],
            derived_params: vec![DerivedParam::new("expDecay", |pars, dt| {
                (-dt / pars[0]).exp()
            })],
            apply_input_code: "$(Isyn) += $(inSyn) * ($(E) - $(V));\n".into(),
            decay_code: "$(inSyn) *= $(expDecay);\n".into(),
            ..Default::default()
        })
    }
}

/// Built-in current source models
pub mod current_source_models {
    use super::*;

    /// Constant direct current
    pub fn dc() -> Arc<CurrentSourceModel> {
        Arc::new(CurrentSourceModel {
            param_names: vec!["amp".into()],
            injection_code: "$(injectCurrent, $(amp));\n".into(),
            ..Default::default()
        })
    }

    /// Gaussian noise current
    pub fn gaussian_noise() -> Arc<CurrentSourceModel> {
        Arc::new(CurrentSourceModel {
            param_names: vec!["mean".into(), "sd".into()],
            injection_code: "$(injectCurrent, $(mean) + ($(rng_normal) * $(sd)));\n".into(),
            ..Default::default()
        })
    }
}

/// Built-in variable initialiser snippets
pub mod var_init_snippets {
    use super::*;

    /// Uniformly-distributed initial value in `[min, max)`
    pub fn uniform() -> Arc<VarInitSnippet> {
        Arc::new(VarInitSnippet {
            param_names: vec!["min".into(), "max".into()],
            derived_params: Vec::new(),
            egps: Vec::new(),
            code: concat!(
                "const scalar scale = $(max) - $(min);\n",
                "$(value) = $(min) + ($(rng_uniform) * scale);\n"
            )
            .into(),
        })
    }

    /// Normally-distributed initial value
    pub fn normal() -> Arc<VarInitSnippet> {
        Arc::new(VarInitSnippet {
            param_names: vec!["mean".into(), "sd".into()],
            derived_params: Vec::new(),
            egps: Vec::new(),
            code: "$(value) = $(mean) + ($(rng_normal) * $(sd));\n".into(),
        })
    }
}

/// Built-in sparse connectivity snippets
pub mod connectivity_snippets {
    use super::*;

    fn fixed_probability_max_row(_num_pre: usize, num_post: usize, pars: &[f64]) -> usize {
        // Mean row length plus a five-sigma margin, clamped to the row
        let p = pars[0];
        let n = num_post as f64;
        let bound = (n * p) + 5.0 * (n * p * (1.0 - p)).sqrt();
        (bound.ceil() as usize).min(num_post)
    }

    /// Bernoulli connectivity: each synapse exists with fixed probability
    pub fn fixed_probability() -> Arc<SparseConnectivityInitSnippet> {
        Arc::new(SparseConnectivityInitSnippet {
            param_names: vec!["prob".into()],
            derived_params: vec![DerivedParam::new("probLogRecip", |pars, _dt| {
                1.0 / (1.0 - pars[0]).ln()
            })],
            egps: Vec::new(),
            row_build_code: concat!(
                "const scalar u = $(rng_uniform);\n",
                "prevJ += (1 + (int)(log(u) * $(probLogRecip)));\n",
                "if(prevJ < $(num_post)) {\n",
                "  $(addSynapse, prevJ);\n",
                "}\n",
                "else {\n",
                "  $(endRow);\n",
                "}\n"
            )
            .into(),
            row_build_state_vars: vec![StateVar::new("prevJ", "int", "-1")],
            col_build_code: String::new(),
            col_build_state_vars: Vec::new(),
            calc_max_row_length: Some(fixed_probability_max_row),
            calc_max_col_length: None,
        })
    }

    /// Bernoulli connectivity skipping self-connections
    pub fn fixed_probability_no_autapse() -> Arc<SparseConnectivityInitSnippet> {
        Arc::new(SparseConnectivityInitSnippet {
            param_names: vec!["prob".into()],
            derived_params: vec![DerivedParam::new("probLogRecip", |pars, _dt| {
                1.0 / (1.0 - pars[0]).ln()
            })],
            egps: Vec::new(),
            row_build_code: concat!(
                "int nextJ;\n",
                "do {\n",
                "  const scalar u = $(rng_uniform);\n",
                "  nextJ = prevJ + (1 + (int)(log(u) * $(probLogRecip)));\n",
                "} while(nextJ == $(id_pre));\n",
                "prevJ = nextJ;\n",
                "if(prevJ < $(num_post)) {\n",
                "  $(addSynapse, prevJ);\n",
                "}\n",
                "else {\n",
                "  $(endRow);\n",
                "}\n"
            )
            .into(),
            row_build_state_vars: vec![StateVar::new("prevJ", "int", "-1")],
            col_build_code: String::new(),
            col_build_state_vars: Vec::new(),
            calc_max_row_length: Some(fixed_probability_max_row),
            calc_max_col_length: None,
        })
    }

    /// Diagonal connectivity between equally-sized populations
    pub fn one_to_one() -> Arc<SparseConnectivityInitSnippet> {
        Arc::new(SparseConnectivityInitSnippet {
            param_names: Vec::new(),
            derived_params: Vec::new(),
            egps: Vec::new(),
            row_build_code: "$(addSynapse, $(id_pre));\n$(endRow);\n".into(),
            row_build_state_vars: Vec::new(),
            col_build_code: String::new(),
            col_build_state_vars: Vec::new(),
            calc_max_row_length: Some(|_pre, _post, _pars| 1),
            calc_max_col_length: Some(|_pre, _post, _pars| 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lif_derived_params_evaluate() {
        let lif = neuron_models::lif();
        let pars = [1.0, 20.0, -70.0, -70.0, -50.0, 0.0, 2.0];
        let exp_tc = (lif.derived_params[0].func)(&pars, 0.1);
        assert!((exp_tc - (-0.1f64 / 20.0).exp()).abs() < 1e-12);
        let rm = (lif.derived_params[1].func)(&pars, 0.1);
        assert!((rm - 20.0).abs() < 1e-12);
    }

    #[test]
    fn fixed_probability_row_bound_clamped() {
        let snippet = connectivity_snippets::fixed_probability();
        let bound = (snippet.calc_max_row_length.unwrap())(100, 100, &[0.99]);
        assert!(bound <= 100);
        assert!(snippet.is_rng_required());
    }

    #[test]
    fn stdp_requires_spike_times() {
        let stdp = weight_update_models::stdp_additive();
        assert!(stdp.is_pre_spike_time_required);
        assert!(stdp.is_post_spike_time_required);
    }

    #[test]
    fn exponential_stdp_decays_traces_not_spike_times() {
        let stdp = weight_update_models::stdp_exponential();
        assert!(!stdp.is_pre_spike_time_required);
        assert!(!stdp.is_post_spike_time_required);
        assert!(!stdp.pre_dynamics_code.is_empty());
        assert!(!stdp.post_dynamics_code.is_empty());
        let decay = (stdp.derived_params[0].func)(&[20.0, 2.02, 0.01, 0.0, 0.3, 1.0], 0.1);
        assert!((decay - (-0.1f64 / 20.0).exp()).abs() < 1e-12);
    }
}
