//! Base value objects shared by all snippet and model descriptors
//!
//! Code fragments held by descriptors are opaque strings carrying
//! placeholders of the forms `$(name)`, `$(name, arg0, ..., argN)` and the
//! matchable suffixes `_pre`/`_post`. Nothing in this crate interprets
//! fragment contents beyond substring scans.

use serde::{Deserialize, Serialize};

/// Access mode of a model variable, controlling write-back after an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarAccess {
    /// The variable is only read by user code and never written back
    ReadOnly,
    /// The variable may be mutated and is copied back to global storage
    ReadWrite,
}

/// A state variable declared by a model descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    /// Variable name, referenced from code fragments as `$(name)`
    pub name: String,
    /// Scalar type as it appears in emitted code (e.g. `scalar`, `unsigned int`)
    pub ty: String,
    /// Access mode
    pub access: VarAccess,
}

impl Var {
    /// Create a read-write variable
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            access: VarAccess::ReadWrite,
        }
    }

    /// Create a read-only variable
    pub fn read_only(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            access: VarAccess::ReadOnly,
        }
    }
}

/// An extra global parameter: a named, usually pointer-typed, global shared
/// by every element of a population
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgpVar {
    /// Parameter name
    pub name: String,
    /// Type as written in emitted code (`scalar*`, `unsigned int*`, ...)
    pub ty: String,
}

impl EgpVar {
    /// Create an extra global parameter
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }

    /// Whether the parameter is pointer-typed and therefore has a storage location
    pub fn is_pointer(&self) -> bool {
        self.ty.trim_end().ends_with('*')
    }
}

/// Signature of a derived-parameter evaluator: a pure function of the
/// population parameters and the simulation timestep
pub type DerivedParamFn = fn(&[f64], f64) -> f64;

/// A derived parameter: a named value computed once at finalization
#[derive(Clone)]
pub struct DerivedParam {
    /// Derived parameter name, referenced from code fragments as `$(name)`
    pub name: String,
    /// Evaluator, called as `func(params, dt)`
    pub func: DerivedParamFn,
}

impl DerivedParam {
    /// Create a derived parameter
    pub fn new(name: impl Into<String>, func: DerivedParamFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl std::fmt::Debug for DerivedParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedParam")
            .field("name", &self.name)
            .field("func", &(self.func as usize as *const ()))
            .finish()
    }
}

impl PartialEq for DerivedParam {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && std::ptr::eq(self.func as *const (), other.func as *const ())
    }
}

/// An additional per-element input variable contributed by a neuron model,
/// declared and initialised at the top of every update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInputVar {
    /// Variable name
    pub name: String,
    /// Type as written in emitted code
    pub ty: String,
    /// Initial-value expression
    pub init_value: String,
}

impl AdditionalInputVar {
    /// Create an additional input variable
    pub fn new(
        name: impl Into<String>,
        ty: impl Into<String>,
        init_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            init_value: init_value.into(),
        }
    }
}

/// Compare two derived-parameter schemas by name sequence
pub(crate) fn derived_names_match(a: &[DerivedParam], b: &[DerivedParam]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name == y.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn egp_pointer_detection() {
        assert!(EgpVar::new("spikeTimes", "scalar*").is_pointer());
        assert!(!EgpVar::new("offset", "scalar").is_pointer());
    }

    #[test]
    fn derived_param_equality_is_by_name_and_function() {
        fn f(p: &[f64], _dt: f64) -> f64 {
            p[0]
        }
        let a = DerivedParam::new("ExpTC", f);
        let b = DerivedParam::new("ExpTC", f);
        assert_eq!(a, b);
        let c = DerivedParam::new("Rmembrane", f);
        assert_ne!(a, c);
    }
}
