//! The four model descriptor families
//!
//! Each descriptor is an immutable record bundling a parameter schema,
//! derived-parameter evaluators, a variable schema and one or more named
//! code fragments. Descriptors carry no per-population state; populations
//! reference them through `Arc` and hold their own parameter values.

use crate::snippet::{
    derived_names_match, AdditionalInputVar, DerivedParam, EgpVar, Var,
};
use crate::utils;

/// A neuron model: membrane dynamics, threshold test and post-spike reset
#[derive(Debug, Clone)]
pub struct NeuronModel {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// State variables
    pub vars: Vec<Var>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Additional input variables declared at the top of every update
    pub additional_input_vars: Vec<AdditionalInputVar>,
    /// Membrane dynamics, applied once per timestep
    pub sim_code: String,
    /// Boolean spike condition; empty means the population never spikes
    pub threshold_condition_code: String,
    /// Reset applied after a registered spike
    pub reset_code: String,
    /// Support code made visible to the fragments above
    pub support_code: String,
    /// Whether the threshold is evaluated against its pre-update value so
    /// that only a rising edge registers a spike
    pub needs_auto_refractory: bool,
}

impl Default for NeuronModel {
    fn default() -> Self {
        Self {
            param_names: Vec::new(),
            derived_params: Vec::new(),
            vars: Vec::new(),
            egps: Vec::new(),
            additional_input_vars: Vec::new(),
            sim_code: String::new(),
            threshold_condition_code: String::new(),
            reset_code: String::new(),
            support_code: String::new(),
            needs_auto_refractory: true,
        }
    }
}

impl NeuronModel {
    /// Index of a state variable by name
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    /// Index of an extra global parameter by name
    pub fn egp_index(&self, name: &str) -> Option<usize> {
        self.egps.iter().position(|e| e.name == name)
    }

    /// Whether any simulation-time fragment draws on the RNG
    pub fn is_sim_rng_required(&self) -> bool {
        utils::is_rng_required(&self.sim_code)
            || utils::is_rng_required(&self.threshold_condition_code)
            || utils::is_rng_required(&self.reset_code)
    }

    /// Whether two models admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.sim_code == other.sim_code
            && self.threshold_condition_code == other.threshold_condition_code
            && self.reset_code == other.reset_code
            && self.support_code == other.support_code
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
            && self.vars == other.vars
            && self.egps == other.egps
            && self.additional_input_vars == other.additional_input_vars
            && self.needs_auto_refractory == other.needs_auto_refractory
    }
}

/// A weight update model: what happens on pre/post spikes and, optionally,
/// every timestep on each synapse
#[derive(Debug, Clone, Default)]
pub struct WeightUpdateModel {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// Per-synapse state variables
    pub vars: Vec<Var>,
    /// Per-presynaptic-neuron state variables
    pub pre_vars: Vec<Var>,
    /// Per-postsynaptic-neuron state variables
    pub post_vars: Vec<Var>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Applied for each presynaptic true spike
    pub sim_code: String,
    /// Applied for each presynaptic spike-like event
    pub event_code: String,
    /// Boolean condition defining spike-like events
    pub event_threshold_condition_code: String,
    /// Applied for each postsynaptic spike (back-propagated learning)
    pub learn_post_code: String,
    /// Applied every timestep on every synapse
    pub synapse_dynamics_code: String,
    /// Applied to presynaptic state when the source neuron spikes
    pub pre_spike_code: String,
    /// Applied to postsynaptic state when the target neuron spikes
    pub post_spike_code: String,
    /// Applied to presynaptic state every timestep, before spike handling
    pub pre_dynamics_code: String,
    /// Applied to postsynaptic state every timestep, before spike handling
    pub post_dynamics_code: String,
    /// Support code made visible to the fragments above
    pub support_code: String,
    /// Whether `$(sT_pre)` is read and the source must keep spike times
    pub is_pre_spike_time_required: bool,
    /// Whether `$(sT_post)` is read and the target must keep spike times
    pub is_post_spike_time_required: bool,
    /// Whether `$(prev_sT_pre)` is read
    pub is_prev_pre_spike_time_required: bool,
    /// Whether `$(prev_sT_post)` is read
    pub is_prev_post_spike_time_required: bool,
    /// Whether `$(seT_pre)` is read and the source must keep event times
    pub is_pre_spike_event_time_required: bool,
    /// Whether `$(prev_seT_pre)` is read
    pub is_prev_pre_spike_event_time_required: bool,
}

impl WeightUpdateModel {
    /// All simulation-time code fragments, for queue-mask and RNG scans
    pub fn sim_fragments(&self) -> [&str; 7] {
        [
            &self.sim_code,
            &self.event_code,
            &self.event_threshold_condition_code,
            &self.learn_post_code,
            &self.synapse_dynamics_code,
            &self.pre_dynamics_code,
            &self.post_dynamics_code,
        ]
    }

    /// Whether any simulation-time fragment draws on the RNG
    pub fn is_sim_rng_required(&self) -> bool {
        self.sim_fragments().iter().any(|c| utils::is_rng_required(c))
            || utils::is_rng_required(&self.pre_spike_code)
            || utils::is_rng_required(&self.post_spike_code)
    }

    /// Whether two models admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.sim_code == other.sim_code
            && self.event_code == other.event_code
            && self.event_threshold_condition_code == other.event_threshold_condition_code
            && self.learn_post_code == other.learn_post_code
            && self.synapse_dynamics_code == other.synapse_dynamics_code
            && self.pre_spike_code == other.pre_spike_code
            && self.post_spike_code == other.post_spike_code
            && self.pre_dynamics_code == other.pre_dynamics_code
            && self.post_dynamics_code == other.post_dynamics_code
            && self.support_code == other.support_code
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
            && self.vars == other.vars
            && self.pre_vars == other.pre_vars
            && self.post_vars == other.post_vars
            && self.egps == other.egps
    }
}

/// A postsynaptic model: how accumulated synaptic input becomes a current
#[derive(Debug, Clone, Default)]
pub struct PostsynapticModel {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// Per-postsynaptic-neuron state variables
    pub vars: Vec<Var>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Converts `$(inSyn)` into a contribution to `$(Isyn)`
    pub apply_input_code: String,
    /// Decays `$(inSyn)` after its contribution is applied
    pub decay_code: String,
    /// Support code made visible to the fragments above
    pub support_code: String,
}

impl PostsynapticModel {
    /// Whether applying or decaying input draws on the RNG
    pub fn is_sim_rng_required(&self) -> bool {
        utils::is_rng_required(&self.apply_input_code) || utils::is_rng_required(&self.decay_code)
    }

    /// Whether two models admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.apply_input_code == other.apply_input_code
            && self.decay_code == other.decay_code
            && self.support_code == other.support_code
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
            && self.vars == other.vars
            && self.egps == other.egps
    }
}

/// A current source model: an extra current injected into one population
#[derive(Debug, Clone, Default)]
pub struct CurrentSourceModel {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// Per-element state variables
    pub vars: Vec<Var>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Injection code; contributes via `$(injectCurrent, expr)`
    pub injection_code: String,
}

impl CurrentSourceModel {
    /// Whether injection draws on the RNG
    pub fn is_sim_rng_required(&self) -> bool {
        utils::is_rng_required(&self.injection_code)
    }

    /// Whether two models admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.injection_code == other.injection_code
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
            && self.vars == other.vars
            && self.egps == other.egps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neuron_model_merge_requires_identical_fragments() {
        let a = NeuronModel {
            sim_code: "$(V) += 1.0;".into(),
            vars: vec![Var::new("V", "scalar")],
            ..Default::default()
        };
        let mut b = a.clone();
        assert!(a.can_be_merged(&b));

        b.sim_code = "$(V) += 2.0;".into();
        assert!(!a.can_be_merged(&b));
    }

    #[test]
    fn wu_sim_fragments_cover_all_phases() {
        let wu = WeightUpdateModel {
            sim_code: "a".into(),
            event_code: "b".into(),
            event_threshold_condition_code: "c".into(),
            learn_post_code: "d".into(),
            synapse_dynamics_code: "e".into(),
            pre_dynamics_code: "f".into(),
            post_dynamics_code: "g".into(),
            ..Default::default()
        };
        assert_eq!(wu.sim_fragments(), ["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn wu_merge_requires_identical_dynamics_fragments() {
        let a = WeightUpdateModel {
            pre_vars: vec![Var::new("preTrace", "scalar")],
            pre_dynamics_code: "$(preTrace) *= 0.9;".into(),
            ..Default::default()
        };
        let mut b = a.clone();
        assert!(a.can_be_merged(&b));
        b.pre_dynamics_code = "$(preTrace) *= 0.5;".into();
        assert!(!a.can_be_merged(&b));
    }
}
