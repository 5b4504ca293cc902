#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use cnx_ast::{
    EnumDef, Expr, ExprKind, FunctionDef, Item, ScopeDecl, ScopeDef, Stmt, StructDef, Unit,
    VarDecl, Visibility,
};
use cnx_core::{unparen, TypeInfo};
use cnx_symbols::storage_bits;

use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::{Effect, Emitted};
use crate::expr::gen_expr;
use crate::stmt::{check_decl_init, gen_block, render_decl, render_signature};

/// `typedef uint8_t F;` — a bitmap is its backing integer.
pub fn emit_bitmap(ctx: &EmitCtx, name: &str) -> String {
    let bm = &ctx.collected.bitmaps[name];
    format!("typedef uint{}_t {name};\n", storage_bits(bm.width))
}

/// Untyped enums become `typedef enum`; typed enums pin their width with
/// an integer typedef so comparisons keep the declared size.
pub fn emit_enum(ctx: &EmitCtx, def: &EnumDef) -> String {
    let name = &def.name.node;
    let info = &ctx.collected.enums[name];
    let mut out = String::new();

    match info.bits {
        Some(bits) => {
            out.push_str(&format!("typedef uint{bits}_t {name};\n"));
            for (member, value) in &info.members {
                out.push_str(&format!("#define {name}_{member} (({name}){value}u)\n"));
            }
        }
        None => {
            out.push_str("typedef enum {\n");
            for (member, value) in &info.members {
                out.push_str(&format!("    {name}_{member} = {value},\n"));
            }
            out.push_str(&format!("}} {name};\n"));
        }
    }
    out
}

pub fn emit_struct(ctx: &EmitCtx, def: &StructDef) -> String {
    let name = &def.name.node;
    let mut out = format!("typedef struct {{\n");
    for f in &def.fields {
        if f.ty.is_string() {
            let cap = f.ty.string_capacity.unwrap_or(0);
            out.push_str(&format!("    char {}[{}];\n", f.name.node, cap + 1));
            continue;
        }
        let dims: String = f.dims.iter().map(|d| format!("[{d}]")).collect();
        out.push_str(&format!("    {} {}{dims};\n", ctx.c_type(&f.ty.name), f.name.node));
    }
    out.push_str(&format!("}} {name};\n"));
    out
}

/// Volatile pointer macros, one per member, at base + offset with the
/// member's declared width.
pub fn emit_register(ctx: &EmitCtx, name: &str) -> String {
    let reg = &ctx.collected.registers[name];
    let mut out = String::new();
    for m in &reg.members {
        let macro_name = ctx.register_macro(name, &m.name);
        out.push_str(&format!(
            "#define {macro_name} (*(volatile uint{}_t *)(0x{:08X}UL + 0x{:02X}UL))\n",
            m.bits, reg.address, m.offset
        ));
    }
    out
}

/// Scope variables: file-static when private, demoted to a function
/// local when only one function uses them, inlined when a private const
/// literal.
pub fn emit_scope_variables(
    ctx: &mut EmitCtx,
    def: &ScopeDef,
) -> Result<Emitted, GeneratorError> {
    let scope = def.name.node.clone();
    let info = ctx.collected.scopes[&scope].clone();
    let mut out = String::new();
    let mut effects = Vec::new();

    for member in &def.members {
        let ScopeDecl::Var(v) = &member.decl else { continue };
        if info.const_inlines.contains_key(&v.name.node) {
            continue;
        }
        if ctx.demoted.contains_key(&format!("{scope}.{}", v.name.node)) {
            continue;
        }

        let ty = ctx.resolve_type_info(TypeInfo::of_decl(v));
        let init_code = match &v.init {
            Some(init) => {
                check_decl_init(ctx, &ty, init)?;
                let (code, fx) = gen_expr(ctx, init)?;
                effects.extend(fx);
                Some(code)
            }
            None if ty.is_integer() || ty.is_bool() || ty.is_enum || ty.is_bitmap => {
                Some("0".to_string())
            }
            None => None,
        };

        let mut renamed = v.clone();
        renamed.name.node = format!("{scope}_{}", v.name.node);
        let decl = render_decl(ctx, &renamed, &ty, init_code.as_deref(), &mut effects);
        if member.visibility == Visibility::Private {
            out.push_str("static ");
        }
        out.push_str(&decl);
        out.push('\n');
    }

    Ok((out, effects))
}

pub fn emit_scope_functions(
    ctx: &mut EmitCtx,
    def: &ScopeDef,
) -> Result<Emitted, GeneratorError> {
    let scope = def.name.node.clone();
    let mut out = String::new();
    let mut effects = Vec::new();

    for member in &def.members {
        let ScopeDecl::Function(f) = &member.decl else { continue };
        let unit_name = format!("{scope}.{}", f.name.node);
        ctx.current_scope = Some(scope.clone());
        let (code, fx) = emit_function(ctx, f, &unit_name, member.visibility == Visibility::Private)?;
        ctx.current_scope = None;
        out.push_str(&code);
        out.push('\n');
        effects.extend(fx);
    }

    Ok((out, effects))
}

pub fn emit_function(
    ctx: &mut EmitCtx,
    func: &FunctionDef,
    unit_name: &str,
    is_static: bool,
) -> Result<Emitted, GeneratorError> {
    ctx.current_function = Some(func.name.node.clone());
    ctx.registry.push_scope();

    for p in &func.params {
        let mut info = ctx.resolve_type_info(TypeInfo::of_param(p));
        info.is_ref_param =
            !info.is_array && !info.is_string() && ctx.param_by_ref(&info);
        ctx.registry.declare(p.name.node.clone(), info);
    }

    let mut effects = Vec::new();
    let mut out = String::new();

    let sig = if unit_name == "main" {
        "int main(void)".to_string()
    } else {
        render_signature(ctx, func, unit_name)
    };
    if is_static {
        out.push_str("static ");
    }
    out.push_str(&sig);
    out.push_str(" {\n");

    // Scope variables used by this function alone live here as statics.
    if let Some(scope) = ctx.current_scope.clone() {
        let info = ctx.collected.scopes[&scope].clone();
        for v in &info.variables {
            let key = format!("{scope}.{}", v.name.node);
            if ctx.demoted.get(&key).map(String::as_str) != Some(func.name.node.as_str()) {
                continue;
            }
            let ty = ctx.resolve_type_info(TypeInfo::of_decl(v));
            let init_code = match &v.init {
                Some(init) => {
                    let (code, fx) = gen_expr(ctx, init)?;
                    effects.extend(fx);
                    code
                }
                None => "0".to_string(),
            };
            let mut decl = render_decl(ctx, v, &ty, Some(&init_code), &mut effects);
            decl.insert_str(0, "static ");
            out.push_str("    ");
            out.push_str(&decl);
            out.push('\n');
        }
    }

    let (body, fx) = gen_block(ctx, &func.body, 1)?;
    effects.extend(fx);
    out.push_str(&body);
    out.push_str("}\n");

    ctx.registry.pop_scope();
    ctx.current_function = None;
    Ok((out, effects))
}

/// A parameter is modified iff it is written locally or passed to a
/// callee parameter that is modified; iterate to the fixed point.
pub fn compute_modified_params(unit: &Unit) -> BTreeMap<String, BTreeSet<String>> {
    struct FnEntry<'a> {
        unit_name: String,
        func: &'a FunctionDef,
    }

    let mut functions = Vec::new();
    for item in &unit.items {
        match item {
            Item::Function(f) => functions.push(FnEntry {
                unit_name: f.name.node.clone(),
                func: f,
            }),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Function(f) = &m.decl {
                        functions.push(FnEntry {
                            unit_name: format!("{}.{}", s.name.node, f.name.node),
                            func: f,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let params_by_fn: BTreeMap<String, Vec<String>> = functions
        .iter()
        .map(|f| {
            (
                f.unit_name.clone(),
                f.func.params.iter().map(|p| p.name.node.clone()).collect(),
            )
        })
        .collect();

    let mut modified: BTreeMap<String, BTreeSet<String>> = functions
        .iter()
        .map(|f| (f.unit_name.clone(), directly_written_params(f.func)))
        .collect();

    // Propagate through calls until nothing changes. The relation is
    // monotone over a finite set, so this terminates.
    loop {
        let mut changed = false;
        for entry in &functions {
            let scope = entry.unit_name.rsplit_once('.').map(|(s, _)| s.to_string());
            let param_names: BTreeSet<String> = entry
                .func
                .params
                .iter()
                .map(|p| p.name.node.clone())
                .collect();
            let mut additions = Vec::new();

            for_each_call(entry.func, scope.as_deref(), &mut |callee, args| {
                let Some(callee_mods) = modified.get(callee) else { return };
                let Some(callee_params) = params_by_fn.get(callee) else { return };
                for (arg, callee_param) in args.iter().zip(callee_params) {
                    if !callee_mods.contains(callee_param) {
                        continue;
                    }
                    if let ExprKind::Ident(name) = &unparen(arg).kind {
                        if param_names.contains(&name.node) {
                            additions.push(name.node.clone());
                        }
                    }
                }
            });

            let set = modified.entry(entry.unit_name.clone()).or_default();
            for name in additions {
                changed |= set.insert(name);
            }
        }
        if !changed {
            return modified;
        }
    }
}

fn directly_written_params(func: &FunctionDef) -> BTreeSet<String> {
    let params: BTreeSet<String> = func.params.iter().map(|p| p.name.node.clone()).collect();
    let mut written = BTreeSet::new();

    for stmt in &func.body.stmts {
        cnx_core::walk_stmt(stmt, &mut |s| {
            if let Stmt::Assign(a) = s {
                if let Some(root) = target_root(&a.target) {
                    if params.contains(root) {
                        written.insert(root.to_string());
                    }
                }
            }
            // safe_div writes its out argument.
            for e in cnx_core::stmt_exprs(s) {
                cnx_core::walk_expr(e, &mut |sub| {
                    if let ExprKind::Call { callee, args } = &sub.kind {
                        let is_out = matches!(&unparen(callee).kind,
                            ExprKind::Ident(n) if n.node == "safe_div" || n.node == "safe_mod");
                        if is_out {
                            if let Some(ExprKind::Ident(n)) =
                                args.first().map(|a| &unparen(a).kind)
                            {
                                if params.contains(&n.node) {
                                    written.insert(n.node.clone());
                                }
                            }
                        }
                    }
                });
            }
        });
    }

    written
}

fn target_root(target: &Expr) -> Option<&str> {
    match &target.kind {
        ExprKind::Ident(name) => Some(&name.node),
        ExprKind::Member { base, .. } | ExprKind::Index { base, .. } => match &base.kind {
            ExprKind::This(_) | ExprKind::Global(_) => None,
            _ => target_root(base),
        },
        ExprKind::Paren(inner) => target_root(inner),
        _ => None,
    }
}

fn for_each_call<'a>(
    func: &'a FunctionDef,
    scope: Option<&str>,
    f: &mut impl FnMut(&str, &'a [Expr]),
) {
    for stmt in &func.body.stmts {
        cnx_core::walk_stmt(stmt, &mut |s| {
            for e in cnx_core::stmt_exprs(s) {
                cnx_core::walk_expr(e, &mut |sub| {
                    if let ExprKind::Call { callee, args } = &sub.kind {
                        match &unparen(callee).kind {
                            ExprKind::Ident(name) => f(&name.node, args),
                            ExprKind::Member { base, member } => match &unparen(base).kind {
                                ExprKind::This(_) => {
                                    if let Some(scope) = scope {
                                        f(&format!("{scope}.{}", member.node), args);
                                    }
                                }
                                ExprKind::Ident(base_name) => {
                                    f(&format!("{}.{}", base_name.node, member.node), args);
                                }
                                _ => {}
                            },
                            _ => {}
                        }
                    }
                });
            }
        });
    }
}

/// Top-level variable declarations.
pub fn emit_global(ctx: &mut EmitCtx, v: &VarDecl) -> Result<Emitted, GeneratorError> {
    let ty = ctx.resolve_type_info(TypeInfo::of_decl(v));
    let mut effects = Vec::new();
    let init_code = match &v.init {
        Some(init) => {
            check_decl_init(ctx, &ty, init)?;
            let (code, fx) = gen_expr(ctx, init)?;
            effects.extend(fx);
            Some(code)
        }
        None if ty.is_integer() || ty.is_bool() => Some("0".to_string()),
        None => None,
    };
    let code = render_decl(ctx, v, &ty, init_code.as_deref(), &mut effects);
    effects.push(Effect::RegisterType {
        name: v.name.node.clone(),
        info: ty,
    });
    Ok((code, effects))
}

