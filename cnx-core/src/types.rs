#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use cnx_ast::{
    builtin_bit_width, is_float_type, is_signed_type, is_unsigned_type, Param, TypeRef, VarDecl,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowBehavior {
    /// Saturate at the type's limits via an emitted helper.
    #[default]
    Clamp,
    /// Native C wrap semantics.
    Wrap,
}

/// Everything the code generator needs to know about one in-scope name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    pub bits: u32,
    pub is_array: bool,
    pub dims: Vec<u32>,
    pub is_const: bool,
    pub is_enum: bool,
    pub is_bitmap: bool,
    pub is_struct: bool,
    pub is_atomic: bool,
    pub overflow: OverflowBehavior,
    pub string_capacity: Option<u32>,
    /// Parameter lowered to a pointer; reads and writes deref it.
    pub is_ref_param: bool,
}

impl TypeInfo {
    pub fn scalar(name: impl Into<String>) -> Self {
        let name = name.into();
        let bits = builtin_bit_width(&name).unwrap_or(0);
        Self {
            name,
            bits,
            ..Self::default()
        }
    }

    pub fn of_type_ref(ty: &TypeRef) -> Self {
        let mut info = Self::scalar(&ty.name);
        info.string_capacity = ty.string_capacity;
        info
    }

    pub fn of_decl(decl: &VarDecl) -> Self {
        let mut info = Self::of_type_ref(&decl.ty);
        info.is_const = decl.is_const;
        info.is_atomic = decl.is_atomic;
        info.is_array = !decl.dims.is_empty();
        info.dims = decl.dims.clone();
        if decl.overflow == Some(cnx_ast::Overflow::Wrap) {
            info.overflow = OverflowBehavior::Wrap;
        }
        info
    }

    pub fn of_param(param: &Param) -> Self {
        let mut info = Self::of_type_ref(&param.ty);
        info.is_array = !param.dims.is_empty();
        info.dims = param.dims.clone();
        info
    }

    pub fn is_integer(&self) -> bool {
        is_unsigned_type(&self.name) || is_signed_type(&self.name)
    }

    pub fn is_float(&self) -> bool {
        is_float_type(&self.name)
    }

    pub fn is_signed(&self) -> bool {
        is_signed_type(&self.name)
    }

    pub fn is_unsigned(&self) -> bool {
        is_unsigned_type(&self.name)
    }

    pub fn is_bool(&self) -> bool {
        self.name == "bool"
    }

    pub fn is_string(&self) -> bool {
        self.name == "string"
    }

    /// Small primitives pass by value even when mutated.
    pub fn is_small_primitive(&self) -> bool {
        matches!(self.name.as_str(), "u8" | "u16" | "i8" | "i16" | "bool")
    }
}

/// Identifier types for one emission unit. A scope is pushed when the
/// generator enters a declaration's block and popped on the way out;
/// lookups walk outward.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    scopes: Vec<BTreeMap<String, TypeInfo>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            scopes: vec![BTreeMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, info: TypeInfo) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), info);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeInfo> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Snapshot for control-flow branches; restoring discards branch-local
    /// declarations.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: Self) {
        *self = snapshot;
    }
}

/// What a literal's spelling says about it.
#[derive(Clone, Debug, PartialEq)]
pub struct LiteralInfo {
    /// Type named by the suffix, if any (`42u8` -> `u8`, `1.5f32` -> `f32`).
    pub suffix: Option<String>,
    pub is_float: bool,
    /// Integer value; floats and malformed literals leave this empty.
    pub value: Option<u128>,
}

/// Parse a literal's original spelling. Range validation runs in a wide
/// integer domain so every representable `u64`/`i64` literal is exact.
pub fn literal_info(text: &str) -> LiteralInfo {
    let stripped = text.replace('_', "");

    // Float literals always carry a dot; `0xff32` is hex, not `f32`-suffixed.
    if stripped.contains('.') {
        let suffix = ["f32", "f64"]
            .iter()
            .find(|s| stripped.ends_with(**s))
            .map(|s| s.to_string());
        return LiteralInfo {
            suffix,
            is_float: true,
            value: None,
        };
    }

    let mut suffix = None;
    let mut digits = stripped.as_str();
    for s in ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64"] {
        if let Some(rest) = digits.strip_suffix(s) {
            // Guard against hex digits swallowing the suffix boundary:
            // the remaining text must still be a valid number.
            if !rest.is_empty() {
                suffix = Some(s.to_string());
                digits = rest;
                break;
            }
        }
    }

    let value = if let Some(hex) = digits.strip_prefix("0x") {
        u128::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits.strip_prefix("0b") {
        u128::from_str_radix(bin, 2).ok()
    } else {
        digits.parse::<u128>().ok()
    };

    LiteralInfo {
        suffix,
        is_float: false,
        value,
    }
}

/// The type a literal's suffix names, if any.
pub fn literal_type(text: &str) -> Option<String> {
    literal_info(text).suffix
}

/// Is the literal a zero in any spelling (`0`, `0x0`, `0b0`, suffixed)?
pub fn is_zero_literal(text: &str) -> bool {
    literal_info(text).value == Some(0)
}

pub fn type_limits(name: &str) -> Option<(i128, i128)> {
    match name {
        "u8" => Some((0, u8::MAX as i128)),
        "u16" => Some((0, u16::MAX as i128)),
        "u32" => Some((0, u32::MAX as i128)),
        "u64" => Some((0, u64::MAX as i128)),
        "i8" => Some((i8::MIN as i128, i8::MAX as i128)),
        "i16" => Some((i16::MIN as i128, i16::MAX as i128)),
        "i32" => Some((i32::MIN as i128, i32::MAX as i128)),
        "i64" => Some((i64::MIN as i128, i64::MAX as i128)),
        _ => None,
    }
}

/// Range-check a literal against a target type.
pub fn literal_fits(text: &str, target: &str, negated: bool) -> Result<(), String> {
    let info = literal_info(text);
    if info.is_float {
        if is_float_type(target) {
            return Ok(());
        }
        return Err(format!("float literal '{text}' cannot initialize '{target}'"));
    }
    let Some((lo, hi)) = type_limits(target) else {
        return Ok(());
    };
    let Some(value) = info.value else {
        return Err(format!("invalid integer literal '{text}'"));
    };
    let signed = if negated {
        -(value as i128)
    } else {
        value as i128
    };
    if signed < lo || signed > hi {
        return Err(format!(
            "literal {}{text} out of range for '{target}' ({lo}..={hi})",
            if negated { "-" } else { "" }
        ));
    }
    Ok(())
}

pub fn is_narrowing(src: &TypeInfo, dst: &TypeInfo) -> bool {
    src.is_integer() && dst.is_integer() && dst.bits < src.bits
}

pub fn is_sign_conversion(src: &TypeInfo, dst: &TypeInfo) -> bool {
    (src.is_signed() && dst.is_unsigned()) || (src.is_unsigned() && dst.is_signed())
}

/// Implicit conversions must preserve value and sign. The escape hatch
/// for a deliberate narrowing is an explicit bit slice on the source.
pub fn validate_conversion(src: &TypeInfo, dst: &TypeInfo) -> Result<(), String> {
    if src.name == dst.name {
        return Ok(());
    }
    if is_narrowing(src, dst) {
        return Err(format!(
            "implicit narrowing from '{}' to '{}'; slice the source explicitly: v[0, {}]",
            src.name, dst.name, dst.bits
        ));
    }
    if is_sign_conversion(src, dst) {
        return Err(format!(
            "implicit sign conversion from '{}' to '{}'; slice the source explicitly: v[0, {}]",
            src.name, dst.name, dst.bits
        ));
    }
    if src.is_float() && dst.is_integer() {
        return Err(format!(
            "implicit float-to-integer conversion from '{}' to '{}'",
            src.name, dst.name
        ));
    }
    if src.is_integer() && dst.is_float() && src.bits >= dst.bits {
        return Err(format!(
            "implicit lossy conversion from '{}' to '{}'",
            src.name, dst.name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_suffixes_are_parsed() {
        assert_eq!(literal_type("42u64").as_deref(), Some("u64"));
        assert_eq!(literal_type("0x1Fu8").as_deref(), Some("u8"));
        assert_eq!(literal_type("1.5f32").as_deref(), Some("f32"));
        assert_eq!(literal_type("42"), None);
        // Hex digits that happen to spell a float suffix stay integers.
        assert_eq!(literal_type("0xff32"), None);
        assert_eq!(literal_info("0xff32").value, Some(0xff32));
    }

    #[test]
    fn zero_spellings_are_recognized() {
        for z in ["0", "0x0", "0b0", "0u32", "0x00u8", "0b0000"] {
            assert!(is_zero_literal(z), "{z} should read as zero");
        }
        assert!(!is_zero_literal("0x10"));
    }

    #[test]
    fn literal_range_validation() {
        assert!(literal_fits("255", "u8", false).is_ok());
        assert!(literal_fits("300", "u8", false).is_err());
        assert!(literal_fits("128", "i8", false).is_err());
        assert!(literal_fits("128", "i8", true).is_ok());
        assert!(literal_fits("18446744073709551615", "u64", false).is_ok());
    }

    #[test]
    fn narrowing_and_sign_conversion_are_rejected() {
        let u32t = TypeInfo::scalar("u32");
        let u8t = TypeInfo::scalar("u8");
        let i32t = TypeInfo::scalar("i32");
        assert!(validate_conversion(&u32t, &u8t).is_err());
        assert!(validate_conversion(&u8t, &u32t).is_ok());
        let err = validate_conversion(&u32t, &i32t).expect_err("sign conversion");
        assert!(err.contains("v[0, 32]"));
    }

    #[test]
    fn registry_scopes_shadow_and_pop() {
        let mut reg = TypeRegistry::new();
        reg.declare("x", TypeInfo::scalar("u8"));
        reg.push_scope();
        reg.declare("x", TypeInfo::scalar("u32"));
        assert_eq!(reg.lookup("x").map(|t| t.bits), Some(32));
        reg.pop_scope();
        assert_eq!(reg.lookup("x").map(|t| t.bits), Some(8));
    }
}
