//! Error types for code generation

use thiserror::Error;

/// Result type for code generation operations
pub type Result<T> = std::result::Result<T, CodeGenError>;

/// Errors raised during merging or emission. All are fatal: generation is
/// deterministic over a finalized specification and no partial output is
/// considered valid.
#[derive(Error, Debug)]
pub enum CodeGenError {
    /// A `$(...)` token survived the terminal substitution check
    #[error("Unresolved placeholder '{placeholder}' in {context}")]
    UnresolvedPlaceholder {
        /// Which fragment of which merged group was being emitted
        context: String,
        /// The surviving placeholder token
        placeholder: String,
    },

    /// A system-provided substitution was looked up but never declared
    #[error("No substitution declared for '{name}'")]
    MissingSubstitution {
        /// The missing substitution name
        name: String,
    },

    /// A literal cannot be represented in the active scalar precision
    #[error("Literal '{literal}' is not representable at the active precision")]
    PrecisionMismatch {
        /// The offending literal
        literal: String,
    },

    /// The backend rejected a matrix class, storage location or kernel
    /// combination
    #[error("Backend does not support {reason}")]
    BackendUnsupported {
        /// What was rejected
        reason: String,
    },

    /// An inconsistency detected in the underlying specification
    #[error(transparent)]
    Spec(#[from] spikegen_model::SpecError),
}

impl CodeGenError {
    /// Create an unresolved-placeholder error
    pub fn unresolved(context: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::UnresolvedPlaceholder {
            context: context.into(),
            placeholder: placeholder.into(),
        }
    }

    /// Create a backend-unsupported error
    pub fn backend_unsupported(reason: impl Into<String>) -> Self {
        Self::BackendUnsupported {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_placeholder_names_fragment_and_token() {
        let err = CodeGenError::unresolved("simCode : merged0 'E'", "$(missing)");
        let msg = err.to_string();
        assert!(msg.contains("$(missing)"));
        assert!(msg.contains("merged0"));
    }
}
