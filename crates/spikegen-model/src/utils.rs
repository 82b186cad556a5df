//! Fragment-scanning helpers shared by the requirement queries

use crate::init::VarInit;

/// Placeholder prefix marking a draw from the per-element RNG, e.g.
/// `$(rng_uniform)` or `$(rng_normal)`
pub const RNG_PLACEHOLDER_PREFIX: &str = "$(rng_";

/// Whether a code fragment draws on the RNG
pub fn is_rng_required(code: &str) -> bool {
    code.contains(RNG_PLACEHOLDER_PREFIX)
}

/// Whether any initialiser in a list draws on the RNG
pub fn is_rng_required_any(inits: &[VarInit]) -> bool {
    inits.iter().any(|i| i.snippet().is_rng_required())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_sentinel_detection() {
        assert!(is_rng_required("$(value) = $(min) + ($(rng_uniform) * scale);"));
        assert!(!is_rng_required("$(value) = $(constant);"));
    }
}
