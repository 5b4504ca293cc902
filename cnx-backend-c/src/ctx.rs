#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use cnx_ast::Span;
use cnx_symbols::{CollectedUnit, SymbolKind, SymbolTable};
use cnx_core::{TypeInfo, TypeRegistry};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("codegen error: {message}")]
#[diagnostic(code(cnx::backend_c))]
pub struct GeneratorError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl GeneratorError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Per-unit emission context. Owned by the code generator for one unit
/// and discarded afterward; the symbol table stays read-only.
pub struct EmitCtx<'a> {
    pub table: &'a SymbolTable,
    pub collected: &'a CollectedUnit,
    /// Name of the scope whose member is currently being emitted.
    pub current_scope: Option<String>,
    /// Name of the function currently being emitted.
    pub current_function: Option<String>,
    /// Scope variables demoted to a function-local static, per function.
    pub demoted: BTreeMap<String, String>,
    pub registry: TypeRegistry,
    /// Pre-computed modified-parameter fixpoint: function -> params
    /// written directly or through a callee.
    pub modified_params: BTreeMap<String, BTreeSet<String>>,
    /// C++-compatible emission (cpp_detected was set in the pre-pass).
    pub cpp_mode: bool,
    /// Debug builds get panicking overflow helpers instead of clamping.
    pub debug_mode: bool,
    /// Statements to hoist before the one being generated (materialized
    /// rvalue temps, loop condition temps).
    pub pending_temps: Vec<String>,
    temp_counter: u32,
}

impl<'a> EmitCtx<'a> {
    pub fn new(table: &'a SymbolTable, collected: &'a CollectedUnit) -> Self {
        Self {
            table,
            collected,
            current_scope: None,
            current_function: None,
            demoted: BTreeMap::new(),
            registry: TypeRegistry::new(),
            modified_params: BTreeMap::new(),
            cpp_mode: false,
            debug_mode: false,
            pending_temps: Vec::new(),
            temp_counter: 0,
        }
    }

    pub fn fresh_temp(&mut self) -> String {
        let name = format!("cnx_tmp_{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn take_pending_temps(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_temps)
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeInfo> {
        self.registry.lookup(name)
    }

    /// C spelling of a source type name.
    pub fn c_type(&self, name: &str) -> String {
        match name {
            "u8" => "uint8_t".to_string(),
            "u16" => "uint16_t".to_string(),
            "u32" => "uint32_t".to_string(),
            "u64" => "uint64_t".to_string(),
            "i8" => "int8_t".to_string(),
            "i16" => "int16_t".to_string(),
            "i32" => "int32_t".to_string(),
            "i64" => "int64_t".to_string(),
            "f32" => "float".to_string(),
            "f64" => "double".to_string(),
            "bool" => "bool".to_string(),
            "void" => "void".to_string(),
            other => {
                if self.table.needs_struct_keyword(other) && !self.cpp_mode {
                    format!("struct {other}")
                } else {
                    other.to_string()
                }
            }
        }
    }

    /// Does the emitted parameter for `(function, param)` pass by
    /// pointer? Floats, enums, and small primitives go by value.
    pub fn param_by_ref(&self, ty: &TypeInfo) -> bool {
        if ty.is_float() || ty.is_enum || ty.is_bool() {
            return false;
        }
        if ty.is_small_primitive() {
            return false;
        }
        // Arrays and bounded strings already decay to pointers.
        if ty.is_array || ty.is_string() {
            return false;
        }
        if self.collected.enums.contains_key(&ty.name)
            || self.table.enum_bit_width(&ty.name).is_some()
        {
            return false;
        }
        true
    }

    pub fn param_modified(&self, function: &str, param: &str) -> bool {
        self.modified_params
            .get(function)
            .map(|set| set.contains(param))
            .unwrap_or(false)
    }

    /// Is this name a function of the source unit (scope-qualified names
    /// use `Scope.fn`)?
    pub fn is_unit_function(&self, name: &str) -> bool {
        self.collected
            .symbols
            .iter()
            .any(|s| s.kind == SymbolKind::Function && s.name == name)
    }

    pub fn unit_function(&self, name: &str) -> Option<&cnx_symbols::Symbol> {
        self.collected
            .symbols
            .iter()
            .find(|s| s.kind == SymbolKind::Function && s.name == name)
    }

    /// Declared type of a scope variable.
    pub fn scope_var_type(&self, scope: &str, var: &str) -> Option<TypeInfo> {
        let info = self.collected.scopes.get(scope)?;
        info.variables
            .iter()
            .find(|v| v.name.node == var)
            .map(TypeInfo::of_decl)
    }

    /// Fill in the classification flags a bare type name cannot carry.
    pub fn resolve_type_info(&self, mut info: TypeInfo) -> TypeInfo {
        if let Some(e) = self.collected.enums.get(&info.name) {
            info.is_enum = true;
            info.bits = e.bits.unwrap_or(32);
        } else if let Some(bits) = self.table.enum_bit_width(&info.name) {
            info.is_enum = true;
            info.bits = bits;
        } else if let Some(bm) = self.collected.bitmaps.get(&info.name) {
            info.is_bitmap = true;
            info.bits = cnx_symbols::storage_bits(bm.width);
        } else if self.collected.structs.contains_key(&info.name)
            || self.table.struct_fields(&info.name).is_some()
        {
            info.is_struct = true;
        }
        info
    }

    /// Macro name of a register member; scope-owned registers carry the
    /// scope prefix.
    pub fn register_macro(&self, reg: &str, member: &str) -> String {
        match self.collected.register_scopes.get(reg) {
            Some(scope) => format!("{scope}_{reg}_{member}"),
            None => format!("{reg}_{member}"),
        }
    }
}
