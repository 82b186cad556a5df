//! Error types for model specification

use thiserror::Error;

/// Result type for specification operations
pub type Result<T> = std::result::Result<T, SpecError>;

/// Errors raised while building or finalizing a model specification
#[derive(Error, Debug)]
pub enum SpecError {
    /// A population or model element was referenced by a name the spec does not know
    #[error("Unknown reference '{name}'")]
    BadReference {
        /// The name that failed to resolve
        name: String,
    },

    /// A parameter or variable list does not match the referenced model schema
    #[error("Parameter arity mismatch for {context}: expected {expected}, got {actual}")]
    ParameterArity {
        /// What was being configured (population name and value kind)
        context: String,
        /// Count required by the model schema
        expected: usize,
        /// Count actually supplied
        actual: usize,
    },

    /// Structurally incompatible configuration (duplicate names, bad matrix/connectivity pairing)
    #[error("Shape mismatch: {reason}")]
    ShapeMismatch {
        /// Why the configuration is inconsistent
        reason: String,
    },

    /// A storage location was assigned to an extra global parameter that is not pointer-typed
    #[error("Extra global parameter '{name}' is not a pointer and has no location")]
    EgpNotPointer {
        /// Offending extra global parameter name
        name: String,
    },
}

impl SpecError {
    /// Create a bad-reference error
    pub fn bad_reference(name: impl Into<String>) -> Self {
        Self::BadReference { name: name.into() }
    }

    /// Create a parameter-arity error
    pub fn parameter_arity(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ParameterArity {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create a shape-mismatch error
    pub fn shape_mismatch(reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SpecError::bad_reference("Missing");
        assert!(err.to_string().contains("Missing"));

        let err = SpecError::parameter_arity("pop 'E' parameters", 6, 4);
        let msg = err.to_string();
        assert!(msg.contains("expected 6") && msg.contains("got 4"));
    }
}
