#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use cnx_ast::CheckedOp;
use cnx_ast::{is_signed_type, is_unsigned_type};

use crate::effects::SafeDivOp;

fn c_type(name: &str) -> &'static str {
    match name {
        "u8" => "uint8_t",
        "u16" => "uint16_t",
        "u32" => "uint32_t",
        "u64" => "uint64_t",
        "i8" => "int8_t",
        "i16" => "int16_t",
        "i32" => "int32_t",
        _ => "int64_t",
    }
}

fn type_max(name: &str) -> &'static str {
    match name {
        "u8" => "UINT8_MAX",
        "u16" => "UINT16_MAX",
        "u32" => "UINT32_MAX",
        "u64" => "UINT64_MAX",
        "i8" => "INT8_MAX",
        "i16" => "INT16_MAX",
        "i32" => "INT32_MAX",
        _ => "INT64_MAX",
    }
}

fn type_min(name: &str) -> &'static str {
    match name {
        "i8" => "INT8_MIN",
        "i16" => "INT16_MIN",
        "i32" => "INT32_MIN",
        "i64" => "INT64_MIN",
        _ => "0",
    }
}

/// Next wider unsigned type, for the widening clamp strategy.
fn wider_unsigned(name: &str) -> &'static str {
    match name {
        "u8" => "uint16_t",
        "u16" => "uint32_t",
        _ => "uint64_t",
    }
}

/// One overflow-safe helper. Release builds clamp at the type's limits;
/// debug builds report and abort so the overflow is never silent.
pub fn emit_clamp_helper(op: CheckedOp, ty: &str, debug: bool) -> String {
    if debug {
        return emit_panic_helper(op, ty);
    }
    let cty = c_type(ty);
    let max = type_max(ty);
    let min = type_min(ty);
    let name = format!("cnx_clamp_{}_{ty}", op.name());

    if is_unsigned_type(ty) && ty != "u64" {
        let wide = wider_unsigned(ty);
        return match op {
            CheckedOp::Add | CheckedOp::Mul => format!(
                "static inline {cty} {name}({cty} a, {cty} b) {{\n    {wide} wide;\n    if (__builtin_{opn}_overflow(({wide})a, ({wide})b, &wide) || wide > {max}) {{\n        return {max};\n    }}\n    return ({cty})wide;\n}}\n",
                opn = op.name()
            ),
            CheckedOp::Sub => format!(
                "static inline {cty} {name}({cty} a, {cty} b) {{\n    if (a < b) {{\n        return 0;\n    }}\n    return ({cty})(a - b);\n}}\n"
            ),
        };
    }

    if ty == "u64" {
        return match op {
            CheckedOp::Sub => format!(
                "static inline {cty} {name}({cty} a, {cty} b) {{\n    if (a < b) {{\n        return 0;\n    }}\n    return a - b;\n}}\n"
            ),
            _ => format!(
                "static inline {cty} {name}({cty} a, {cty} b) {{\n    {cty} res;\n    if (__builtin_{opn}_overflow(a, b, &res)) {{\n        return {max};\n    }}\n    return res;\n}}\n",
                opn = op.name()
            ),
        };
    }

    if is_signed_type(ty) && ty != "i64" {
        let c_op = match op {
            CheckedOp::Add => "+",
            CheckedOp::Sub => "-",
            CheckedOp::Mul => "*",
        };
        return format!(
            "static inline {cty} {name}({cty} a, {cty} b) {{\n    int64_t wide = (int64_t)a {c_op} (int64_t)b;\n    if (wide > {max}) {{\n        return {max};\n    }}\n    if (wide < {min}) {{\n        return {min};\n    }}\n    return ({cty})wide;\n}}\n"
        );
    }

    // 64-bit signed: range-checking expressions, no wider native type.
    match op {
        CheckedOp::Add => format!(
            "static inline {cty} {name}({cty} a, {cty} b) {{\n    if (b > 0 && a > {max} - b) {{\n        return {max};\n    }}\n    if (b < 0 && a < {min} - b) {{\n        return {min};\n    }}\n    return a + b;\n}}\n"
        ),
        CheckedOp::Sub => format!(
            "static inline {cty} {name}({cty} a, {cty} b) {{\n    if (b < 0 && a > {max} + b) {{\n        return {max};\n    }}\n    if (b > 0 && a < {min} + b) {{\n        return {min};\n    }}\n    return a - b;\n}}\n"
        ),
        CheckedOp::Mul => format!(
            "static inline {cty} {name}({cty} a, {cty} b) {{\n    {cty} res;\n    if (__builtin_mul_overflow(a, b, &res)) {{\n        return ((a > 0) == (b > 0)) ? {max} : {min};\n    }}\n    return res;\n}}\n"
        ),
    }
}

fn emit_panic_helper(op: CheckedOp, ty: &str) -> String {
    let cty = c_type(ty);
    let name = format!("cnx_clamp_{}_{ty}", op.name());
    let fmt = if is_unsigned_type(ty) {
        ("%llu", "(unsigned long long)")
    } else {
        ("%lld", "(long long)")
    };
    format!(
        "static inline {cty} {name}({cty} a, {cty} b) {{\n    {cty} res;\n    if (__builtin_{opn}_overflow(a, b, &res)) {{\n        fprintf(stderr, \"overflow in {opn}_{ty}({fmt0}, {fmt0})\\n\", {cast}a, {cast}b);\n        abort();\n    }}\n    return res;\n}}\n",
        opn = op.name(),
        fmt0 = fmt.0,
        cast = fmt.1
    )
}

/// Safe-division helper pair member: writes the result (or the default)
/// through the out pointer and reports success.
pub fn emit_safe_div_helper(op: SafeDivOp, ty: &str) -> String {
    let cty = c_type(ty);
    format!(
        "static inline bool cnx_safe_{opn}_{ty}({cty} *out, {cty} num, {cty} div, {cty} dflt) {{\n    if (div == 0) {{\n        *out = dflt;\n        return false;\n    }}\n    *out = num {c_op} div;\n    return true;\n}}\n",
        opn = op.name(),
        c_op = op.c_op()
    )
}

/// Deterministic include block: fixed system set first, then extras and
/// user includes in sorted order.
pub fn emit_includes(
    needs_string: bool,
    needs_limits: bool,
    extra_system: &BTreeSet<String>,
    user: &[String],
) -> String {
    let mut out = String::new();
    out.push_str("#include <stdint.h>\n");
    out.push_str("#include <stdbool.h>\n");
    if needs_string {
        out.push_str("#include <string.h>\n");
    }
    if needs_limits {
        out.push_str("#include <limits.h>\n");
    }
    for inc in extra_system {
        if inc != "<stdint.h>" && inc != "<stdbool.h>" && inc != "<string.h>" && inc != "<limits.h>"
        {
            out.push_str(&format!("#include {inc}\n"));
        }
    }
    for inc in user {
        out.push_str(&format!("#include {inc}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_add_helper_widens_and_clamps() {
        let code = emit_clamp_helper(CheckedOp::Add, "u8", false);
        assert!(code.contains("cnx_clamp_add_u8"));
        assert!(code.contains("uint16_t wide"));
        assert!(code.contains("__builtin_add_overflow"));
        assert!(code.contains("return UINT8_MAX"));
    }

    #[test]
    fn unsigned_sub_helper_clamps_to_zero() {
        let code = emit_clamp_helper(CheckedOp::Sub, "u8", false);
        assert!(code.contains("if (a < b)"));
        assert!(code.contains("return 0"));
    }

    #[test]
    fn signed_narrow_helper_promotes_and_compares_limits() {
        let code = emit_clamp_helper(CheckedOp::Add, "i16", false);
        assert!(code.contains("int64_t wide"));
        assert!(code.contains("INT16_MAX"));
        assert!(code.contains("INT16_MIN"));
    }

    #[test]
    fn signed_64_add_uses_range_checks() {
        let code = emit_clamp_helper(CheckedOp::Add, "i64", false);
        assert!(code.contains("a > INT64_MAX - b"));
        assert!(code.contains("a < INT64_MIN - b"));
    }

    #[test]
    fn debug_helper_panics_instead_of_clamping() {
        let code = emit_clamp_helper(CheckedOp::Add, "u8", true);
        assert!(code.contains("fprintf(stderr"));
        assert!(code.contains("abort()"));
    }

    #[test]
    fn safe_div_helper_writes_default_on_zero() {
        let code = emit_safe_div_helper(SafeDivOp::Div, "u32");
        assert!(code.contains("cnx_safe_div_u32"));
        assert!(code.contains("*out = dflt"));
        assert!(code.contains("return false"));
        assert!(code.contains("num / div"));
    }
}
