//! Variable and sparse-connectivity initialiser snippets
//!
//! An initialiser pairs an immutable snippet (parameter schema plus code
//! fragment) with concrete parameter values. Derived parameter values are
//! filled in during specification finalization.

use std::sync::Arc;

use crate::error::{Result, SpecError};
use crate::snippet::{derived_names_match, DerivedParam, EgpVar};
use crate::utils;

/// Code fragment used by [`VarInit::constant`]
pub(crate) const CONSTANT_INIT_CODE: &str = "$(value) = $(constant);";

/// A snippet describing how to initialise one variable
#[derive(Debug, Clone, PartialEq)]
pub struct VarInitSnippet {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Initialisation code; writes the computed value through `$(value)`
    pub code: String,
}

impl VarInitSnippet {
    /// Whether the initialisation code draws on the per-element RNG
    pub fn is_rng_required(&self) -> bool {
        utils::is_rng_required(&self.code)
    }

    /// Whether this snippet initialises a kernel-resident variable
    pub fn requires_kernel(&self) -> bool {
        self.code.contains("$(id_kernel)")
    }

    /// Whether two snippets admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.code == other.code
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
            && self.egps == other.egps
    }
}

/// A variable initialiser: snippet plus concrete parameter values
#[derive(Debug, Clone)]
pub struct VarInit {
    snippet: Arc<VarInitSnippet>,
    params: Vec<f64>,
    derived_params: Vec<f64>,
}

impl VarInit {
    /// Create an initialiser from a snippet and parameter values
    pub fn new(snippet: Arc<VarInitSnippet>, params: Vec<f64>) -> Result<Self> {
        if params.len() != snippet.param_names.len() {
            return Err(SpecError::parameter_arity(
                "variable initialiser parameters",
                snippet.param_names.len(),
                params.len(),
            ));
        }
        Ok(Self {
            snippet,
            params,
            derived_params: Vec::new(),
        })
    }

    /// Create a constant-value initialiser
    pub fn constant(value: f64) -> Self {
        Self {
            snippet: Arc::new(VarInitSnippet {
                param_names: vec!["constant".to_string()],
                derived_params: Vec::new(),
                egps: Vec::new(),
                code: CONSTANT_INIT_CODE.to_string(),
            }),
            params: vec![value],
            derived_params: Vec::new(),
        }
    }

    /// The constant value, if this is a constant initialiser
    pub fn constant_value(&self) -> Option<f64> {
        if self.snippet.code == CONSTANT_INIT_CODE && self.params.len() == 1 {
            Some(self.params[0])
        } else {
            None
        }
    }

    /// The underlying snippet
    pub fn snippet(&self) -> &VarInitSnippet {
        &self.snippet
    }

    /// Parameter values
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Derived parameter values; valid after finalization
    pub fn derived_params(&self) -> &[f64] {
        &self.derived_params
    }

    /// Evaluate derived parameters against the simulation timestep
    pub(crate) fn init_derived_params(&mut self, dt: f64) {
        self.derived_params = self
            .snippet
            .derived_params
            .iter()
            .map(|d| (d.func)(&self.params, dt))
            .collect();
    }

    /// Whether two initialisers admit the same emitted code; parameter
    /// equality is not required (differing slots are promoted to fields)
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.snippet.can_be_merged(&other.snippet)
    }
}

/// A state variable declared by connectivity row/column build code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVar {
    /// Variable name
    pub name: String,
    /// Type as written in emitted code
    pub ty: String,
    /// Initial-value expression (may contain placeholders)
    pub value: String,
}

impl StateVar {
    /// Create a build-state variable
    pub fn new(name: impl Into<String>, ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            value: value.into(),
        }
    }
}

/// Evaluator bounding the length of a sparse row or column
pub type CalcMaxLengthFn = fn(usize, usize, &[f64]) -> usize;

/// A snippet describing how to build sparse connectivity
#[derive(Clone)]
pub struct SparseConnectivityInitSnippet {
    /// Parameter names
    pub param_names: Vec<String>,
    /// Derived parameter evaluators
    pub derived_params: Vec<DerivedParam>,
    /// Extra global parameters
    pub egps: Vec<EgpVar>,
    /// Row-wise build code; emits synapses via `$(addSynapse, j)` and
    /// terminates via `$(endRow)`
    pub row_build_code: String,
    /// State variables declared before the row build loop
    pub row_build_state_vars: Vec<StateVar>,
    /// Column-wise build code, terminating via `$(endCol)`
    pub col_build_code: String,
    /// State variables declared before the column build loop
    pub col_build_state_vars: Vec<StateVar>,
    /// Upper bound on row length given population sizes and parameters
    pub calc_max_row_length: Option<CalcMaxLengthFn>,
    /// Upper bound on column length given population sizes and parameters
    pub calc_max_col_length: Option<CalcMaxLengthFn>,
}

impl SparseConnectivityInitSnippet {
    /// An empty snippet for populations with no generated connectivity
    pub fn uninitialised() -> Self {
        Self {
            param_names: Vec::new(),
            derived_params: Vec::new(),
            egps: Vec::new(),
            row_build_code: String::new(),
            row_build_state_vars: Vec::new(),
            col_build_code: String::new(),
            col_build_state_vars: Vec::new(),
            calc_max_row_length: None,
            calc_max_col_length: None,
        }
    }

    /// Whether building connectivity draws on the per-row RNG
    pub fn is_rng_required(&self) -> bool {
        utils::is_rng_required(&self.row_build_code) || utils::is_rng_required(&self.col_build_code)
    }

    /// Whether two snippets admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.row_build_code == other.row_build_code
            && self.col_build_code == other.col_build_code
            && self.row_build_state_vars == other.row_build_state_vars
            && self.col_build_state_vars == other.col_build_state_vars
            && self.param_names == other.param_names
            && derived_names_match(&self.derived_params, &other.derived_params)
    }
}

impl std::fmt::Debug for SparseConnectivityInitSnippet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseConnectivityInitSnippet")
            .field("param_names", &self.param_names)
            .field("row_build_code", &self.row_build_code)
            .field("col_build_code", &self.col_build_code)
            .finish()
    }
}

/// A connectivity initialiser: snippet plus concrete parameter values
#[derive(Debug, Clone)]
pub struct SparseConnectivityInit {
    snippet: Arc<SparseConnectivityInitSnippet>,
    params: Vec<f64>,
    derived_params: Vec<f64>,
}

impl SparseConnectivityInit {
    /// Create an initialiser from a snippet and parameter values
    pub fn new(snippet: Arc<SparseConnectivityInitSnippet>, params: Vec<f64>) -> Result<Self> {
        if params.len() != snippet.param_names.len() {
            return Err(SpecError::parameter_arity(
                "connectivity initialiser parameters",
                snippet.param_names.len(),
                params.len(),
            ));
        }
        Ok(Self {
            snippet,
            params,
            derived_params: Vec::new(),
        })
    }

    /// An initialiser that builds nothing (dense or externally-loaded connectivity)
    pub fn uninitialised() -> Self {
        Self {
            snippet: Arc::new(SparseConnectivityInitSnippet::uninitialised()),
            params: Vec::new(),
            derived_params: Vec::new(),
        }
    }

    /// The underlying snippet
    pub fn snippet(&self) -> &SparseConnectivityInitSnippet {
        &self.snippet
    }

    /// Parameter values
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Derived parameter values; valid after finalization
    pub fn derived_params(&self) -> &[f64] {
        &self.derived_params
    }

    /// Upper bound on row length for the given population sizes
    pub fn max_row_length(&self, num_pre: usize, num_post: usize) -> usize {
        match self.snippet.calc_max_row_length {
            Some(f) => f(num_pre, num_post, &self.params),
            None => num_post,
        }
    }

    /// Upper bound on column length for the given population sizes
    pub fn max_col_length(&self, num_pre: usize, num_post: usize) -> usize {
        match self.snippet.calc_max_col_length {
            Some(f) => f(num_pre, num_post, &self.params),
            None => num_pre,
        }
    }

    /// Evaluate derived parameters against the simulation timestep
    pub(crate) fn init_derived_params(&mut self, dt: f64) {
        self.derived_params = self
            .snippet
            .derived_params
            .iter()
            .map(|d| (d.func)(&self.params, dt))
            .collect();
    }

    /// Whether two initialisers admit the same emitted code
    pub fn can_be_merged(&self, other: &Self) -> bool {
        self.snippet.can_be_merged(&other.snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_init_round_trips_value() {
        let init = VarInit::constant(-70.0);
        assert_eq!(init.constant_value(), Some(-70.0));
        assert!(!init.snippet().is_rng_required());
    }

    #[test]
    fn var_init_arity_checked() {
        let snippet = Arc::new(VarInitSnippet {
            param_names: vec!["min".into(), "max".into()],
            derived_params: Vec::new(),
            egps: Vec::new(),
            code: "$(value) = $(min);".into(),
        });
        let err = VarInit::new(Arc::clone(&snippet), vec![0.0]).unwrap_err();
        assert!(matches!(err, SpecError::ParameterArity { .. }));
        assert!(VarInit::new(snippet, vec![0.0, 1.0]).is_ok());
    }

    #[test]
    fn kernel_requirement_derived_from_code() {
        let snippet = VarInitSnippet {
            param_names: Vec::new(),
            derived_params: Vec::new(),
            egps: Vec::new(),
            code: "$(value) = $(kernel)[$(id_kernel)];".into(),
        };
        assert!(snippet.requires_kernel());
    }
}
