//! Scoped symbol table driving placeholder substitution
//!
//! A [`Substitutions`] frame maps placeholder names to replacement text and
//! optionally points at a parent frame. Applying a frame substitutes its
//! own function-form placeholders first (their expansions may contain
//! variable placeholders), then its variable placeholders, then delegates
//! to the parent; an inner redefinition therefore shadows an outer one.
//! Lookup through [`Substitutions::var`] is likewise self-then-parent.

use std::collections::BTreeMap;

use spikegen_model::{DerivedParam, EgpVar, ScalarType, StateVar, Var};

use crate::error::{CodeGenError, Result};
use crate::precision::scalar_literal;

/// One scope of the substitution stack
#[derive(Debug, Default)]
pub struct Substitutions<'p> {
    vars: BTreeMap<String, String>,
    funcs: BTreeMap<String, (usize, String)>,
    parent: Option<&'p Substitutions<'p>>,
}

impl<'p> Substitutions<'p> {
    /// Create a root scope
    pub fn new() -> Substitutions<'static> {
        Substitutions::default()
    }

    /// Create a child scope
    pub fn with_parent(parent: &'p Substitutions<'p>) -> Self {
        Self {
            vars: BTreeMap::new(),
            funcs: BTreeMap::new(),
            parent: Some(parent),
        }
    }

    /// Declare `$(name)` to expand to `value`
    pub fn add_var_substitution(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Declare a function-form placeholder `$(name, a0, ..., aN-1)` whose
    /// expansion is `template` with `$(0)` ... `$(N-1)` replaced by the
    /// arguments
    pub fn add_func_substitution(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        template: impl Into<String>,
    ) {
        self.funcs.insert(name.into(), (arity, template.into()));
    }

    /// For each variable declare `$(name + source_suffix)` to expand to
    /// `dest_prefix + name + dest_suffix`
    pub fn add_var_name_substitution(
        &mut self,
        vars: &[Var],
        source_suffix: &str,
        dest_prefix: &str,
        dest_suffix: &str,
    ) {
        for v in vars {
            self.vars.insert(
                format!("{}{}", v.name, source_suffix),
                format!("{}{}{}", dest_prefix, v.name, dest_suffix),
            );
        }
    }

    /// Extra-global-parameter flavour of [`Self::add_var_name_substitution`]
    pub fn add_egp_name_substitution(
        &mut self,
        egps: &[EgpVar],
        source_suffix: &str,
        dest_prefix: &str,
        dest_suffix: &str,
    ) {
        for e in egps {
            self.vars.insert(
                format!("{}{}", e.name, source_suffix),
                format!("{}{}{}", dest_prefix, e.name, dest_suffix),
            );
        }
    }

    /// Declare each connectivity build-state variable under its own name
    pub fn add_state_var_substitution(&mut self, state_vars: &[StateVar]) {
        for s in state_vars {
            self.vars.insert(s.name.clone(), s.name.clone());
        }
    }

    /// Declare each variable as a literal of the active precision
    pub fn add_var_value_substitution(
        &mut self,
        vars: &[Var],
        values: &[f64],
        scalar: ScalarType,
    ) -> Result<()> {
        for (v, value) in vars.iter().zip(values) {
            let literal = scalar_literal(*value, scalar)?;
            self.vars.insert(v.name.clone(), literal);
        }
        Ok(())
    }

    /// Declare each parameter as a literal of the active precision
    pub fn add_param_value_substitution(
        &mut self,
        names: &[String],
        values: &[f64],
        scalar: ScalarType,
    ) -> Result<()> {
        for (n, value) in names.iter().zip(values) {
            let literal = scalar_literal(*value, scalar)?;
            self.vars.insert(n.clone(), literal);
        }
        Ok(())
    }

    /// Heterogeneity-aware parameter substitution: a homogeneous slot is
    /// inlined as a literal, a heterogeneous slot reads
    /// `dest_prefix + name + dest_suffix` from the merged-group field table
    pub fn add_param_value_substitution_het<F: Fn(usize) -> bool>(
        &mut self,
        names: &[String],
        values: &[f64],
        is_heterogeneous: F,
        source_suffix: &str,
        dest_prefix: &str,
        dest_suffix: &str,
        scalar: ScalarType,
    ) -> Result<()> {
        for (k, n) in names.iter().enumerate() {
            let replacement = if is_heterogeneous(k) {
                format!("{}{}{}", dest_prefix, n, dest_suffix)
            } else {
                scalar_literal(values[k], scalar)?
            };
            self.vars
                .insert(format!("{}{}", n, source_suffix), replacement);
        }
        Ok(())
    }

    /// Declare each derived parameter as a literal of the active precision
    pub fn add_derived_param_value_substitution(
        &mut self,
        derived: &[DerivedParam],
        values: &[f64],
        scalar: ScalarType,
    ) -> Result<()> {
        for (d, value) in derived.iter().zip(values) {
            let literal = scalar_literal(*value, scalar)?;
            self.vars.insert(d.name.clone(), literal);
        }
        Ok(())
    }

    /// Heterogeneity-aware derived-parameter substitution
    pub fn add_derived_param_value_substitution_het<F: Fn(usize) -> bool>(
        &mut self,
        derived: &[DerivedParam],
        values: &[f64],
        is_heterogeneous: F,
        source_suffix: &str,
        dest_prefix: &str,
        dest_suffix: &str,
        scalar: ScalarType,
    ) -> Result<()> {
        for (k, d) in derived.iter().enumerate() {
            let replacement = if is_heterogeneous(k) {
                format!("{}{}{}", dest_prefix, d.name, dest_suffix)
            } else {
                scalar_literal(values[k], scalar)?
            };
            self.vars
                .insert(format!("{}{}", d.name, source_suffix), replacement);
        }
        Ok(())
    }

    /// Whether a substitution for `name` is declared in this scope or any
    /// parent
    pub fn has_var_substitution(&self, name: &str) -> bool {
        self.vars.contains_key(name)
            || self.parent.map_or(false, |p| p.has_var_substitution(name))
    }

    /// Look up a substitution, innermost scope first
    pub fn var(&self, name: &str) -> Result<&str> {
        if let Some(v) = self.vars.get(name) {
            return Ok(v);
        }
        match self.parent {
            Some(p) => p.var(name),
            None => Err(CodeGenError::MissingSubstitution {
                name: name.to_string(),
            }),
        }
    }

    /// Apply this scope's substitutions, then the parents', to a fragment.
    /// Placeholders no scope knows are left in place; use
    /// [`Self::apply_check_unreplaced`] where passthrough is not legitimate.
    pub fn apply(&self, code: &str) -> String {
        let mut code = code.to_string();
        for (name, (arity, template)) in &self.funcs {
            code = function_substitute(&code, name, *arity, template);
        }
        for (name, value) in &self.vars {
            code = code.replace(&format!("$({})", name), value);
        }
        match self.parent {
            Some(p) => p.apply(&code),
            None => code,
        }
    }

    /// Apply substitutions and fail if any `$(...)` token survives
    pub fn apply_check_unreplaced(&self, code: &str, context: &str) -> Result<String> {
        let applied = self.apply(code);
        if let Some(placeholder) = find_placeholder(&applied) {
            return Err(CodeGenError::unresolved(context, placeholder));
        }
        Ok(applied)
    }
}

/// Expand every occurrence of the function-form placeholder `$(name, ...)`
/// (or `$(name)` at arity zero). Arguments are split on top-level commas
/// only; commas nested in parentheses or brackets belong to the argument.
fn function_substitute(code: &str, name: &str, arity: usize, template: &str) -> String {
    let needle = format!("$({}", name);
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(pos) = rest.find(&needle) {
        let after = pos + needle.len();
        let tail = &rest[after..];
        let trimmed = tail.trim_start();
        let ws = tail.len() - trimmed.len();

        if arity == 0 {
            if trimmed.starts_with(')') {
                out.push_str(&rest[..pos]);
                out.push_str(template);
                rest = &rest[after + ws + 1..];
            } else {
                out.push_str(&rest[..after]);
                rest = &rest[after..];
            }
            continue;
        }

        if !trimmed.starts_with(',') {
            out.push_str(&rest[..after]);
            rest = &rest[after..];
            continue;
        }
        let args_start = after + ws + 1;
        match parse_args(&rest[args_start..]) {
            Some((args, consumed)) if args.len() == arity => {
                out.push_str(&rest[..pos]);
                let mut expansion = template.to_string();
                for (k, arg) in args.iter().enumerate() {
                    expansion = expansion.replace(&format!("$({})", k), arg.trim());
                }
                out.push_str(&expansion);
                rest = &rest[args_start + consumed..];
            }
            _ => {
                // Wrong arity or unbalanced call: leave for the terminal check
                out.push_str(&rest[..after]);
                rest = &rest[after..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Split the argument list of a function-form placeholder, starting just
/// after the first comma. Returns the arguments and the number of bytes
/// consumed including the closing parenthesis.
fn parse_args(s: &str) -> Option<(Vec<String>, usize)> {
    let mut depth = 0i32;
    let mut args = Vec::new();
    let mut current = String::new();
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                args.push(current);
                return Some((args, i + 1));
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    None
}

/// Find the first surviving `$(...)` token, balancing nested parentheses
fn find_placeholder(code: &str) -> Option<String> {
    let start = code.find("$(")?;
    let mut depth = 0i32;
    for (i, c) in code[start..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(code[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    Some(code[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_substitution_is_exact() {
        let mut subs = Substitutions::new();
        subs.add_var_substitution("V", "lV");
        subs.add_var_substitution("Vthresh", "-50.0f");
        assert_eq!(subs.apply("$(V) >= $(Vthresh)"), "lV >= -50.0f");
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut outer = Substitutions::new();
        outer.add_var_substitution("id", "outerId");
        let mut inner = Substitutions::with_parent(&outer);
        inner.add_var_substitution("id", "innerId");
        assert_eq!(inner.apply("x[$(id)]"), "x[innerId]");
        assert_eq!(inner.var("id").unwrap(), "innerId");
    }

    #[test]
    fn parent_substitutions_still_reachable() {
        let mut outer = Substitutions::new();
        outer.add_var_substitution("id", "i");
        let mut inner = Substitutions::with_parent(&outer);
        inner.add_var_substitution("value", "group->V[i]");
        assert_eq!(inner.apply("$(value) = $(id);"), "group->V[i] = i;");
    }

    #[test]
    fn function_arguments_split_at_top_level_commas_only() {
        let mut subs = Substitutions::new();
        subs.add_func_substitution("addToInSyn", 1, "inSyn += $(0)");
        assert_eq!(
            subs.apply("$(addToInSyn, fmax(a, b) + w[i][j]);"),
            "inSyn += fmax(a, b) + w[i][j];"
        );
    }

    #[test]
    fn zero_arity_function_expands() {
        let mut subs = Substitutions::new();
        subs.add_func_substitution("endRow", 0, "break");
        assert_eq!(subs.apply("$(endRow);"), "break;");
    }

    #[test]
    fn function_arguments_may_contain_placeholders() {
        let mut subs = Substitutions::new();
        subs.add_func_substitution("injectCurrent", 1, "Isyn += $(0)");
        subs.add_var_substitution("amp", "2.0f");
        assert_eq!(subs.apply("$(injectCurrent, $(amp));"), "Isyn += 2.0f;");
    }

    #[test]
    fn longer_function_names_do_not_capture() {
        let mut subs = Substitutions::new();
        subs.add_func_substitution("addToInSyn", 1, "a += $(0)");
        let code = "$(addToInSynDelay, x, d);";
        assert_eq!(subs.apply(code), code);
    }

    #[test]
    fn wrong_arity_left_for_terminal_check() {
        let mut subs = Substitutions::new();
        subs.add_func_substitution("addToInSyn", 1, "a += $(0)");
        let out = subs.apply("$(addToInSyn, x, y);");
        assert!(out.contains("$(addToInSyn"));
        let err = subs
            .apply_check_unreplaced("$(addToInSyn, x, y);", "test fragment")
            .unwrap_err();
        assert!(matches!(err, CodeGenError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn check_unreplaced_reports_token_and_context() {
        let subs = Substitutions::new();
        let err = subs
            .apply_check_unreplaced("x = $(nope) + 1;", "simCode : merged0")
            .unwrap_err();
        match err {
            CodeGenError::UnresolvedPlaceholder {
                context,
                placeholder,
            } => {
                assert_eq!(context, "simCode : merged0");
                assert_eq!(placeholder, "$(nope)");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn heterogeneous_params_read_fields() {
        let mut subs = Substitutions::new();
        subs.add_param_value_substitution_het(
            &["TauM".to_string(), "Vrest".to_string()],
            &[20.0, -70.0],
            |k| k == 0,
            "",
            "group->",
            "",
            ScalarType::F32,
        )
        .unwrap();
        assert_eq!(subs.apply("$(TauM) $(Vrest)"), "group->TauM -70.0f");
    }
}
