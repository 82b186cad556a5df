//! Model descriptors and network specification for the spikegen code generator
//!
//! This crate holds the declarative half of spikegen: immutable snippet and
//! model descriptors (neuron, weight update, postsynaptic, current source,
//! variable and connectivity initialisers), the mutable [`ModelSpec`]
//! container that wires populations together, and the pure requirement
//! queries (delay slots, spike flags, queue masks, RNG needs) that the code
//! generator treats as its source of truth after [`ModelSpec::finalize`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod current_source;
pub mod error;
pub mod init;
pub mod library;
pub mod models;
pub mod neuron_group;
pub mod snippet;
pub mod spec;
pub mod synapse_group;
pub mod utils;

pub use current_source::{CurrentSource, CurrentSourceId};
pub use error::{Result, SpecError};
pub use init::{SparseConnectivityInit, SparseConnectivityInitSnippet, StateVar, VarInit, VarInitSnippet};
pub use models::{CurrentSourceModel, NeuronModel, PostsynapticModel, WeightUpdateModel};
pub use neuron_group::{NeuronGroup, NeuronGroupId};
pub use snippet::{AdditionalInputVar, DerivedParam, DerivedParamFn, EgpVar, Var, VarAccess};
pub use spec::{ModelSpec, PostsynapticInit, ScalarType, VarLocation, WeightUpdateInit};
pub use synapse_group::{MatrixType, SynapseGroup, SynapseGroupId};

/// Sentinel that marks a delay of zero timesteps on a synapse population
pub const NO_DELAY: usize = 0;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn basic_spec_construction() {
        let mut spec = ModelSpec::new("smoke");
        spec.set_dt(0.1);

        let lif = library::neuron_models::lif();
        let n = lif.param_names.len();
        let v = lif.vars.len();

        let params = vec![1.0; n];
        let inits: Vec<VarInit> = (0..v).map(|_| VarInit::constant(0.0)).collect();
        let ng = spec
            .add_neuron_population("pop", 16, Arc::clone(&lif), params, inits)
            .expect("add population");
        spec.finalize().expect("finalize");
        assert_eq!(spec.neuron_group(ng).num_neurons(), 16);
    }
}
