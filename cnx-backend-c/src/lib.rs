#![forbid(unsafe_code)]

mod assign;
mod ctx;
mod decls;
mod effects;
mod expr;
mod helpers;
mod stmt;

pub use assign::{classify, gen_assign, AssignmentContext, AssignmentKind};
pub use ctx::{EmitCtx, GeneratorError};
pub use effects::{Effect, Emitted, SafeDivOp};
pub use expr::{fold_constants, gen_expr, transform_float_literal, transform_int_literal};
pub use helpers::{emit_clamp_helper, emit_safe_div_helper};
pub use stmt::{gen_block, gen_stmt};

use std::collections::{BTreeMap, BTreeSet};

use cnx_ast::{CheckedOp, Item, ScopeDecl, Unit, Visibility};
use cnx_core::TypeInfo;
use cnx_symbols::{CollectedUnit, SymbolTable};

/// Sentinel in the auto-generated banner; discovery skips any input that
/// carries it so emitted headers are never re-ingested.
pub const GENERATED_SENTINEL: &str = "Generated by C-Next Transpiler";

#[derive(Clone, Debug, Default)]
pub struct EmitOptions {
    pub cpp_mode: bool,
    pub debug_mode: bool,
    pub emit_header: bool,
    /// Path stem used for the include guard (`drivers/uart` ->
    /// `CNX_DRIVERS_UART_H`).
    pub unit_stem: String,
}

#[derive(Clone, Debug)]
pub struct CUnit {
    pub code: String,
    pub header: Option<String>,
}

#[derive(Default)]
struct EmitState {
    includes: BTreeSet<String>,
    helpers: BTreeSet<(CheckedOp, String)>,
    safe_divs: BTreeSet<(SafeDivOp, String)>,
    needs_string: bool,
    needs_isr: bool,
}

impl EmitState {
    fn drain(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Include(inc) => {
                    self.includes.insert(inc);
                }
                Effect::Helper { op, ty } => {
                    self.helpers.insert((op, ty));
                }
                Effect::SafeDiv { op, ty } => {
                    self.safe_divs.insert((op, ty));
                }
                Effect::NeedsString => self.needs_string = true,
                Effect::Isr => self.needs_isr = true,
                Effect::RegisterType { .. } | Effect::RegisterLocal { .. } => {}
            }
        }
    }
}

/// Emit one translation unit as C (or C++-compatible C when
/// `cpp_mode`), in the fixed file order: banner, includes, helpers,
/// type definitions, register macros, storage, functions.
pub fn emit_unit(
    table: &SymbolTable,
    collected: &CollectedUnit,
    unit: &Unit,
    options: &EmitOptions,
) -> Result<CUnit, GeneratorError> {
    let mut ctx = EmitCtx::new(table, collected);
    ctx.cpp_mode = options.cpp_mode;
    ctx.debug_mode = options.debug_mode;
    ctx.modified_params = decls::compute_modified_params(unit);

    // Private scope variables with exactly one using function are
    // demoted to that function's static local.
    for (scope_name, info) in &collected.scopes {
        for v in &info.variables {
            if info.public_members.contains(&v.name.node) {
                continue;
            }
            if info.const_inlines.contains_key(&v.name.node) {
                continue;
            }
            if let Some(user) = info.sole_user(&v.name.node) {
                ctx.demoted
                    .insert(format!("{scope_name}.{}", v.name.node), user.to_string());
            }
        }
    }

    // File-level names are visible everywhere in the unit.
    for item in &unit.items {
        if let Item::Var(v) = item {
            let info = ctx.resolve_type_info(TypeInfo::of_decl(v));
            ctx.registry.declare(v.name.node.clone(), info);
        }
    }

    let mut state = EmitState::default();
    let mut user_includes = Vec::new();
    let mut type_defs = String::new();
    let mut registers = String::new();
    let mut storage = String::new();
    let mut functions = String::new();

    // Type definitions first: bitmap typedefs, then enums, then structs,
    // in textual order within each group.
    for name in collected.bitmaps.keys() {
        type_defs.push_str(&decls::emit_bitmap(&ctx, name));
    }
    for item in &unit.items {
        match item {
            Item::Enum(e) => type_defs.push_str(&decls::emit_enum(&ctx, e)),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Enum(e) = &m.decl {
                        type_defs.push_str(&decls::emit_enum(&ctx, e));
                    }
                }
            }
            _ => {}
        }
    }
    for item in &unit.items {
        match item {
            Item::Struct(st) => type_defs.push_str(&decls::emit_struct(&ctx, st)),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Struct(st) = &m.decl {
                        type_defs.push_str(&decls::emit_struct(&ctx, st));
                    }
                }
            }
            _ => {}
        }
    }

    for name in collected.registers.keys() {
        registers.push_str(&decls::emit_register(&ctx, name));
    }

    for item in &unit.items {
        match item {
            Item::Include(inc) => {
                if inc.system {
                    state.includes.insert(format!("<{}>", inc.path));
                } else {
                    let path = rewrite_cnx_include(&inc.path);
                    user_includes.push(format!("\"{path}\""));
                }
            }
            Item::Var(v) => {
                let (code, fx) = decls::emit_global(&mut ctx, v)?;
                state.drain(fx);
                storage.push_str(&code);
                storage.push('\n');
            }
            Item::Scope(s) => {
                let (vars, fx) = decls::emit_scope_variables(&mut ctx, s)?;
                state.drain(fx);
                storage.push_str(&vars);

                let (fns, fx) = decls::emit_scope_functions(&mut ctx, s)?;
                state.drain(fx);
                functions.push_str(&fns);
            }
            Item::Function(f) => {
                let (code, fx) = decls::emit_function(&mut ctx, f, &f.name.node, false)?;
                state.drain(fx);
                functions.push_str(&code);
                functions.push('\n');
            }
            _ => {}
        }
    }

    // Helper block, alphabetical by emitted name.
    let mut helper_block: BTreeMap<String, String> = BTreeMap::new();
    for (op, ty) in &state.helpers {
        let name = format!("cnx_clamp_{}_{ty}", op.name());
        helper_block.insert(name, helpers::emit_clamp_helper(*op, ty, options.debug_mode));
    }
    for (op, ty) in &state.safe_divs {
        let name = format!("cnx_safe_{}_{ty}", op.name());
        helper_block.insert(name, helpers::emit_safe_div_helper(*op, ty));
    }
    if options.debug_mode && !state.helpers.is_empty() {
        state.includes.insert("<stdio.h>".to_string());
        state.includes.insert("<stdlib.h>".to_string());
    }
    // Framework header for the interrupt-mask intrinsics.
    if state.needs_isr {
        user_includes.insert(0, "\"cmsis_compiler.h\"".to_string());
    }

    let mut out = String::new();
    out.push_str(&banner());
    out.push_str(&helpers::emit_includes(
        state.needs_string,
        !state.helpers.is_empty(),
        &state.includes,
        &user_includes,
    ));
    out.push('\n');
    for code in helper_block.values() {
        out.push_str(code);
        out.push('\n');
    }
    if !type_defs.is_empty() {
        out.push_str(&type_defs);
        out.push('\n');
    }
    if !registers.is_empty() {
        out.push_str(&registers);
        out.push('\n');
    }
    if !storage.is_empty() {
        out.push_str(&storage);
        out.push('\n');
    }
    out.push_str(&functions);

    let header = if options.emit_header {
        Some(emit_header(&ctx, unit, &options.unit_stem, &type_defs, &registers))
    } else {
        None
    };

    Ok(CUnit { code: out, header })
}

fn banner() -> String {
    format!("// {GENERATED_SENTINEL}\n// Do not edit; regenerating overwrites this file.\n")
}

pub fn rewrite_cnx_include(path: &str) -> String {
    if let Some(stem) = path.strip_suffix(".cnx") {
        format!("{stem}.h")
    } else if let Some(stem) = path.strip_suffix(".cnext") {
        format!("{stem}.h")
    } else {
        path.to_string()
    }
}

/// Companion header: exported declarations only, include guard derived
/// from the unit path.
fn emit_header(
    ctx: &EmitCtx,
    unit: &Unit,
    stem: &str,
    type_defs: &str,
    registers: &str,
) -> String {
    let guard = include_guard(stem);
    let mut out = String::new();
    out.push_str(&banner());
    out.push_str(&format!("#ifndef {guard}\n#define {guard}\n\n"));
    out.push_str("#include <stdint.h>\n#include <stdbool.h>\n\n");

    if !type_defs.is_empty() {
        out.push_str(type_defs);
        out.push('\n');
    }
    if !registers.is_empty() {
        out.push_str(registers);
        out.push('\n');
    }

    for item in &unit.items {
        match item {
            Item::Function(f) if f.name.node != "main" => {
                out.push_str(&stmt::render_signature(ctx, f, &f.name.node));
                out.push_str(";\n");
            }
            Item::Scope(s) => {
                for m in &s.members {
                    if m.visibility != Visibility::Public {
                        continue;
                    }
                    if let ScopeDecl::Function(f) = &m.decl {
                        let unit_name = format!("{}.{}", s.name.node, f.name.node);
                        out.push_str(&stmt::render_signature(ctx, f, &unit_name));
                        out.push_str(";\n");
                    }
                }
            }
            _ => {}
        }
    }

    out.push_str(&format!("\n#endif /* {guard} */\n"));
    out
}

fn include_guard(stem: &str) -> String {
    let mut guard = String::from("CNX_");
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            guard.push(ch.to_ascii_uppercase());
        } else {
            guard.push('_');
        }
    }
    guard.push_str("_H");
    guard
}
