#![forbid(unsafe_code)]

use cnx_ast::{Block, ElseArm, Expr, ExprKind, IfStmt, Stmt, SwitchStmt, VarDecl};
use cnx_core::{literal_fits, unparen, TypeInfo};

use crate::assign::gen_assign;
use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::{Effect, Emitted};
use crate::expr::{c_function_name, expr_type, gen_expr, transform_int_literal};

fn indent_str(level: usize) -> String {
    "    ".repeat(level)
}

/// Emit a block's statements at the given indent level. Type
/// registrations returned by each statement are applied before the next
/// one runs; every other effect bubbles to the caller.
pub fn gen_block(
    ctx: &mut EmitCtx,
    block: &Block,
    level: usize,
) -> Result<Emitted, GeneratorError> {
    ctx.registry.push_scope();
    let result = gen_stmts(ctx, &block.stmts, level);
    ctx.registry.pop_scope();
    result
}

fn gen_stmts(ctx: &mut EmitCtx, stmts: &[Stmt], level: usize) -> Result<Emitted, GeneratorError> {
    let mut out = String::new();
    let mut effects = Vec::new();
    let pad = indent_str(level);

    for stmt in stmts {
        let (code, fx) = gen_stmt(ctx, stmt, level)?;
        for effect in fx {
            match effect {
                Effect::RegisterType { name, info } => ctx.registry.declare(name, info),
                other => effects.push(other),
            }
        }
        // Materialized rvalue temps go before the statement they serve.
        for temp in ctx.take_pending_temps() {
            out.push_str(&pad);
            out.push_str(&temp);
            out.push('\n');
        }
        for line in code.lines() {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }

    Ok((out, effects))
}

pub fn gen_stmt(ctx: &mut EmitCtx, stmt: &Stmt, level: usize) -> Result<Emitted, GeneratorError> {
    match stmt {
        Stmt::Var(v) => gen_var_decl(ctx, v),
        Stmt::Assign(a) => gen_assign(ctx, a),
        Stmt::Expr(e) => {
            let (code, effects) = gen_expr(ctx, e)?;
            Ok((format!("{code};"), effects))
        }
        Stmt::If(s) => gen_if(ctx, s, level),
        Stmt::While(s) => {
            // Condition temporaries are hoisted before the loop; the
            // condition is then evaluated once. Callers needing
            // per-iteration reevaluation hoist explicitly.
            let (cond, mut effects) = gen_expr(ctx, &s.cond)?;
            let hoisted = ctx.take_pending_temps();
            let (body, fx) = gen_block(ctx, &s.body, level + 1)?;
            effects.extend(fx);
            let mut out = String::new();
            for t in hoisted {
                out.push_str(&t);
                out.push('\n');
            }
            out.push_str(&format!("while ({cond}) {{\n{body}{}}}", indent_str(level)));
            Ok((out, effects))
        }
        Stmt::DoWhile(s) => {
            let cond_ty = expr_type(ctx, &s.cond);
            if cond_ty.map(|t| !t.is_bool()).unwrap_or(false) {
                return Err(GeneratorError::new(
                    "do-while requires a boolean condition",
                    s.cond.span,
                ));
            }
            let (body, mut effects) = gen_block(ctx, &s.body, level + 1)?;
            let (cond, fx) = gen_expr(ctx, &s.cond)?;
            effects.extend(fx);
            let hoisted = ctx.take_pending_temps();
            let mut out = String::new();
            for t in hoisted {
                out.push_str(&t);
                out.push('\n');
            }
            out.push_str(&format!(
                "do {{\n{body}{}}} while ({cond});",
                indent_str(level)
            ));
            Ok((out, effects))
        }
        Stmt::For(s) => gen_for(ctx, s, level),
        Stmt::Switch(s) => gen_switch(ctx, s, level),
        Stmt::Critical(s) => {
            let (body, mut effects) = gen_block(ctx, &s.body, level + 1)?;
            effects.push(Effect::Isr);
            let pad = indent_str(level);
            let inner = indent_str(level + 1);
            Ok((
                format!(
                    "{{\n{inner}uint32_t cnx_primask = __get_PRIMASK();\n{inner}__disable_irq();\n{body}{inner}__set_PRIMASK(cnx_primask);\n{pad}}}"
                ),
                effects,
            ))
        }
        Stmt::Return(r) => match &r.value {
            Some(v) => {
                let (code, effects) = gen_expr(ctx, v)?;
                Ok((format!("return {code};"), effects))
            }
            None => Ok(("return;".to_string(), vec![])),
        },
        Stmt::Break(_) => Ok(("break;".to_string(), vec![])),
        Stmt::Continue(_) => Ok(("continue;".to_string(), vec![])),
        Stmt::Block(b) => {
            let (body, effects) = gen_block(ctx, b, level + 1)?;
            Ok((format!("{{\n{body}{}}}", indent_str(level)), effects))
        }
    }
}

/// Local declaration: validate the initializer, emit the C declaration,
/// and register the name for the following statements.
fn gen_var_decl(ctx: &mut EmitCtx, v: &VarDecl) -> Result<Emitted, GeneratorError> {
    let info = ctx.resolve_type_info(TypeInfo::of_decl(v));
    let mut effects = Vec::new();

    let init_code = match &v.init {
        Some(init) => {
            check_decl_init(ctx, &info, init)?;
            let (code, fx) = gen_expr(ctx, init)?;
            effects.extend(fx);
            Some(code)
        }
        None => None,
    };

    let code = render_decl(ctx, v, &info, init_code.as_deref(), &mut effects);

    effects.push(Effect::RegisterType {
        name: v.name.node.clone(),
        info: info.clone(),
    });
    effects.push(Effect::RegisterLocal {
        name: v.name.node.clone(),
        is_array: info.is_array,
    });

    Ok((code, effects))
}

pub fn check_decl_init(
    ctx: &EmitCtx,
    target: &TypeInfo,
    init: &Expr,
) -> Result<(), GeneratorError> {
    match &unparen(init).kind {
        ExprKind::IntLit(text) => {
            literal_fits(text, &target.name, false).map_err(|m| GeneratorError::new(m, init.span))
        }
        ExprKind::Unary { op: cnx_ast::UnaryOp::Neg, expr } => {
            if let ExprKind::IntLit(text) = &unparen(expr).kind {
                literal_fits(text, &target.name, true)
                    .map_err(|m| GeneratorError::new(m, init.span))
            } else {
                Ok(())
            }
        }
        ExprKind::StringLit(text) => {
            if let Some(cap) = target.string_capacity {
                if text.len() > cap as usize {
                    return Err(GeneratorError::new(
                        format!("string literal of {} byte(s) exceeds capacity {cap}", text.len()),
                        init.span,
                    ));
                }
            }
            Ok(())
        }
        _ => {
            // A literal chain folds to a constant; range-check the value
            // instead of treating it as a typed expression.
            if let Some(folded) = crate::expr::fold_constants(init) {
                let (digits, negated) = match folded.strip_prefix('-') {
                    Some(d) => (d, true),
                    None => (folded.as_str(), false),
                };
                return literal_fits(digits, &target.name, negated)
                    .map_err(|m| GeneratorError::new(m, init.span));
            }
            let Some(vty) = expr_type(ctx, init) else { return Ok(()) };
            if target.is_enum && vty.is_enum && target.name != vty.name {
                return Err(GeneratorError::new(
                    format!("cannot initialize '{}' from '{}'", target.name, vty.name),
                    init.span,
                ));
            }
            cnx_core::validate_conversion(&vty, target)
                .map_err(|m| GeneratorError::new(m, init.span))
        }
    }
}

/// The C text of a declaration, shared by locals, globals, and scope
/// variables (the caller prepends `static` where needed).
pub fn render_decl(
    ctx: &mut EmitCtx,
    v: &VarDecl,
    info: &TypeInfo,
    init: Option<&str>,
    effects: &mut Vec<Effect>,
) -> String {
    let mut out = String::new();
    if v.is_const {
        out.push_str("const ");
    }
    if v.is_atomic {
        out.push_str("_Atomic ");
        effects.push(Effect::Include("<stdatomic.h>".to_string()));
    }

    if info.is_string() {
        let cap = info.string_capacity.unwrap_or(0);
        out.push_str(&format!("char {}[{}]", v.name.node, cap + 1));
        match init {
            Some(code) => out.push_str(&format!(" = {code};")),
            None => out.push_str(" = \"\";"),
        }
        return out;
    }

    out.push_str(&ctx.c_type(&info.name));
    out.push(' ');
    out.push_str(&v.name.node);
    for d in &v.dims {
        out.push_str(&format!("[{d}]"));
    }
    match init {
        Some(code) => out.push_str(&format!(" = {code};")),
        None if info.is_struct || info.is_array => out.push_str(" = {0};"),
        // Bitmaps are read-modify-written; the backing integer starts at 0.
        None if info.is_bitmap => out.push_str(" = 0;"),
        None => out.push(';'),
    }
    out
}

fn gen_if(ctx: &mut EmitCtx, s: &IfStmt, level: usize) -> Result<Emitted, GeneratorError> {
    let (cond, mut effects) = gen_expr(ctx, &s.cond)?;
    let hoisted = ctx.take_pending_temps();
    let (then_body, fx) = gen_block(ctx, &s.then_block, level + 1)?;
    effects.extend(fx);

    let pad = indent_str(level);
    let mut out = String::new();
    for t in hoisted {
        out.push_str(&t);
        out.push('\n');
    }
    out.push_str(&format!("if ({cond}) {{\n{then_body}{pad}}}"));

    if let Some(arm) = &s.else_block {
        match arm.as_ref() {
            ElseArm::Else(b) => {
                let (else_body, fx) = gen_block(ctx, b, level + 1)?;
                effects.extend(fx);
                out.push_str(&format!(" else {{\n{else_body}{pad}}}"));
            }
            ElseArm::ElseIf(inner) => {
                let (else_code, fx) = gen_if(ctx, inner, level)?;
                effects.extend(fx);
                out.push_str(" else ");
                out.push_str(else_code.trim_start());
            }
        }
    }

    Ok((out, effects))
}

fn gen_for(ctx: &mut EmitCtx, s: &cnx_ast::ForStmt, level: usize) -> Result<Emitted, GeneratorError> {
    ctx.registry.push_scope();
    let mut effects = Vec::new();
    let mut hoisted = Vec::new();

    let init_code = match &s.init {
        Some(stmt) => {
            let (code, fx) = gen_stmt(ctx, stmt, level)?;
            for effect in fx {
                match effect {
                    Effect::RegisterType { name, info } => ctx.registry.declare(name, info),
                    other => effects.push(other),
                }
            }
            hoisted.extend(ctx.take_pending_temps());
            code.trim_end_matches(';').to_string()
        }
        None => String::new(),
    };

    let cond_code = match &s.cond {
        Some(cond) => {
            let (code, fx) = gen_expr(ctx, cond)?;
            effects.extend(fx);
            hoisted.extend(ctx.take_pending_temps());
            code
        }
        None => String::new(),
    };

    let update_code = match &s.update {
        Some(stmt) => {
            let (code, fx) = gen_stmt(ctx, stmt, level)?;
            effects.extend(fx);
            hoisted.extend(ctx.take_pending_temps());
            code.trim_end_matches(';').to_string()
        }
        None => String::new(),
    };

    let (body, fx) = gen_block(ctx, &s.body, level + 1)?;
    effects.extend(fx);
    ctx.registry.pop_scope();

    let mut out = String::new();
    for t in hoisted {
        out.push_str(&t);
        out.push('\n');
    }
    out.push_str(&format!(
        "for ({init_code}; {cond_code}; {update_code}) {{\n{body}{}}}",
        indent_str(level)
    ));
    Ok((out, effects))
}

fn gen_switch(ctx: &mut EmitCtx, s: &SwitchStmt, level: usize) -> Result<Emitted, GeneratorError> {
    let scrut_ty = expr_type(ctx, &s.scrutinee);
    let enum_info = scrut_ty
        .as_ref()
        .filter(|t| t.is_enum)
        .and_then(|t| ctx.collected.enums.get(&t.name).map(|e| (t.name.clone(), e.clone())));

    let (scrut, mut effects) = gen_expr(ctx, &s.scrutinee)?;
    let pad = indent_str(level);
    let case_pad = indent_str(level + 1);
    let mut out = format!("switch ({scrut}) {{\n");

    let mut covered = Vec::new();
    for case in &s.cases {
        let label = gen_case_label(ctx, &case.label, enum_info.as_ref(), &mut covered)?;
        let (body, fx) = gen_block(ctx, &case.body, level + 2)?;
        effects.extend(fx);
        out.push_str(&format!(
            "{case_pad}case {label}: {{\n{body}{case_pad}}} break;\n"
        ));
    }

    if let Some(d) = &s.default {
        let (body, fx) = gen_block(ctx, d, level + 2)?;
        effects.extend(fx);
        out.push_str(&format!(
            "{case_pad}default: {{\n{body}{case_pad}}} break;\n"
        ));
    } else if let Some((name, info)) = &enum_info {
        // Exhaustiveness against the scrutinee's enum type.
        let missing: Vec<&str> = info
            .members
            .iter()
            .map(|(m, _)| m.as_str())
            .filter(|m| !covered.iter().any(|c| c == m))
            .collect();
        if !missing.is_empty() {
            return Err(GeneratorError::new(
                format!(
                    "switch on '{name}' is missing case(s) {} and has no default",
                    missing.join(", ")
                ),
                s.span,
            ));
        }
    }

    out.push_str(&format!("{pad}}}"));
    Ok((out, effects))
}

fn gen_case_label(
    ctx: &mut EmitCtx,
    label: &Expr,
    enum_info: Option<&(String, cnx_symbols::EnumInfo)>,
    covered: &mut Vec<String>,
) -> Result<String, GeneratorError> {
    match &unparen(label).kind {
        // Unqualified member names resolve against the scrutinee's enum.
        ExprKind::Ident(name) => {
            if let Some((enum_name, info)) = enum_info {
                if info.has_member(&name.node) {
                    covered.push(name.node.clone());
                    return Ok(format!("{enum_name}_{}", name.node));
                }
                return Err(GeneratorError::new(
                    format!("'{}' is not a member of enum '{enum_name}'", name.node),
                    label.span,
                ));
            }
            // In a non-enum switch an enum member name is a mistake.
            for (ename, einfo) in &ctx.collected.enums {
                if einfo.has_member(&name.node) {
                    return Err(GeneratorError::new(
                        format!(
                            "unqualified enum member '{}'; did you mean '{ename}.{}'?",
                            name.node, name.node
                        ),
                        label.span,
                    ));
                }
            }
            let (code, _) = gen_expr(ctx, label)?;
            Ok(code)
        }
        ExprKind::Member { base, member } => {
            if let ExprKind::Ident(base_name) = &unparen(base).kind {
                if ctx.collected.enums.contains_key(&base_name.node) {
                    covered.push(member.node.clone());
                    return Ok(format!("{}_{}", base_name.node, member.node));
                }
            }
            let (code, _) = gen_expr(ctx, label)?;
            Ok(code)
        }
        ExprKind::IntLit(text) => Ok(transform_int_literal(text)),
        _ => {
            let (code, _) = gen_expr(ctx, label)?;
            Ok(code)
        }
    }
}

/// Signature text of a function, shared by definition and header
/// emission. Pass-by-reference and the auto-`const` inference decide the
/// parameter spellings.
pub fn render_signature(ctx: &EmitCtx, func: &cnx_ast::FunctionDef, unit_name: &str) -> String {
    let ret = ctx.c_type(&func.ret.name);
    let c_name = c_function_name(unit_name);

    if func.params.is_empty() {
        return format!("{ret} {c_name}(void)");
    }

    let mut parts = Vec::new();
    for p in &func.params {
        let info = ctx.resolve_type_info(TypeInfo::of_param(p));
        let cty = ctx.c_type(&info.name);
        if info.is_string() {
            parts.push(format!("char {}[]", p.name.node));
            continue;
        }
        if info.is_array {
            let dims: String = p.dims.iter().map(|d| format!("[{d}]")).collect();
            parts.push(format!("{cty} {}{dims}", p.name.node));
            continue;
        }
        if ctx.param_by_ref(&info) {
            let modified = ctx.param_modified(unit_name, &p.name.node);
            if modified {
                parts.push(format!("{cty} *{}", p.name.node));
            } else {
                parts.push(format!("const {cty} *{}", p.name.node));
            }
            continue;
        }
        parts.push(format!("{cty} {}", p.name.node));
    }
    format!("{ret} {c_name}({})", parts.join(", "))
}
