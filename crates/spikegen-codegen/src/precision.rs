//! Scalar-precision rendering and rewriting of emitted fragments

use spikegen_model::ScalarType;

use crate::error::{CodeGenError, Result};

/// Render a scalar value as a literal in the active precision. Under `F32`
/// the literal carries an `f` suffix; a value that overflows the precision
/// is a [`CodeGenError::PrecisionMismatch`].
pub fn scalar_literal(value: f64, ty: ScalarType) -> Result<String> {
    if !value.is_finite() {
        return Err(CodeGenError::PrecisionMismatch {
            literal: value.to_string(),
        });
    }
    match ty {
        ScalarType::F64 => Ok(format_float(value)),
        ScalarType::F32 => {
            let narrowed = value as f32;
            if !narrowed.is_finite() {
                return Err(CodeGenError::PrecisionMismatch {
                    literal: value.to_string(),
                });
            }
            let mut s = format!("{}", narrowed);
            if !s.contains('.') && !s.contains('e') && !s.contains('E') {
                s.push_str(".0");
            }
            s.push('f');
            Ok(s)
        }
    }
}

/// Render a value with a guaranteed decimal point or exponent
fn format_float(value: f64) -> String {
    let mut s = format!("{}", value);
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        s.push_str(".0");
    }
    s
}

/// Rewrite every floating literal in a fragment to carry the suffix
/// appropriate to the active precision: append `f` under `F32`, strip a
/// stray `f` under `F64`. Integer and hexadecimal literals pass through.
pub fn ensure_scalar_suffix(code: &str, ty: ScalarType) -> String {
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len() + 16);
    let mut i = 0;
    let mut prev_ident = false;
    while i < bytes.len() {
        let c = bytes[i] as char;

        // Hexadecimal literals pass through untouched
        if !prev_ident
            && c == '0'
            && i + 1 < bytes.len()
            && (bytes[i + 1] == b'x' || bytes[i + 1] == b'X')
        {
            out.push('0');
            out.push(bytes[i + 1] as char);
            i += 2;
            while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                out.push(bytes[i] as char);
                i += 1;
            }
            prev_ident = true;
            continue;
        }

        let starts_number = !prev_ident
            && (c.is_ascii_digit()
                || (c == '.'
                    && i + 1 < bytes.len()
                    && (bytes[i + 1] as char).is_ascii_digit()));
        if starts_number {
            let start = i;
            let mut has_dot = false;
            let mut has_exp = false;
            while i < bytes.len() {
                let d = bytes[i] as char;
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.' && !has_dot && !has_exp {
                    has_dot = true;
                    i += 1;
                } else if (d == 'e' || d == 'E') && !has_exp && i + 1 < bytes.len() {
                    let n = bytes[i + 1] as char;
                    if n.is_ascii_digit() || n == '+' || n == '-' {
                        has_exp = true;
                        i += 2;
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            out.push_str(&code[start..i]);

            let is_float = has_dot || has_exp;
            let has_suffix = i < bytes.len()
                && (bytes[i] == b'f' || bytes[i] == b'F')
                && (i + 1 >= bytes.len() || !is_ident_char(bytes[i + 1] as char));
            if is_float {
                match ty {
                    ScalarType::F32 => {
                        if has_suffix {
                            out.push(bytes[i] as char);
                            i += 1;
                        } else {
                            out.push('f');
                        }
                    }
                    ScalarType::F64 => {
                        if has_suffix {
                            i += 1;
                        }
                    }
                }
            } else if has_suffix {
                out.push(bytes[i] as char);
                i += 1;
            }
            prev_ident = false;
            continue;
        }

        out.push(c);
        prev_ident = is_ident_char(c);
        i += 1;
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_gain_f32_suffix() {
        let out = ensure_scalar_suffix("x = 1.0 + y * 2.5e-3 + 7;", ScalarType::F32);
        assert_eq!(out, "x = 1.0f + y * 2.5e-3f + 7;");
    }

    #[test]
    fn existing_suffix_preserved_under_f32() {
        let out = ensure_scalar_suffix("x = 1.0f;", ScalarType::F32);
        assert_eq!(out, "x = 1.0f;");
    }

    #[test]
    fn suffix_stripped_under_f64() {
        let out = ensure_scalar_suffix("x = 1.0f + 2.0;", ScalarType::F64);
        assert_eq!(out, "x = 1.0 + 2.0;");
    }

    #[test]
    fn identifiers_and_indices_untouched(){
        let out = ensure_scalar_suffix("v2 = spk[0] + x1_y;", ScalarType::F32);
        assert_eq!(out, "v2 = spk[0] + x1_y;");
    }

    #[test]
    fn hex_untouched() {
        let out = ensure_scalar_suffix("mask = 0x80000000 >> j;", ScalarType::F32);
        assert_eq!(out, "mask = 0x80000000 >> j;");
    }

    #[test]
    fn scalar_literal_formats_per_precision() {
        assert_eq!(scalar_literal(20.0, ScalarType::F32).unwrap(), "20.0f");
        assert_eq!(scalar_literal(20.0, ScalarType::F64).unwrap(), "20.0");
        assert_eq!(scalar_literal(0.25, ScalarType::F64).unwrap(), "0.25");
    }

    #[test]
    fn overflowing_literal_is_precision_mismatch() {
        let err = scalar_literal(1.0e200, ScalarType::F32).unwrap_err();
        assert!(matches!(err, CodeGenError::PrecisionMismatch { .. }));
        assert!(scalar_literal(1.0e200, ScalarType::F64).is_ok());
    }
}
