#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use cnx_ast::{is_float_type, BinOp, Expr, ExprKind, Item, ScopeDecl, Stmt};

use crate::error::{AnalyzerDiagnostic, CODE_FLOAT_MOD};
use crate::walk::{functions_of, stmt_exprs, unparen, walk_expr, walk_stmt};

use super::AnalyzerInput;

/// `%` is undefined for floats in C; the source language rejects it
/// outright whenever either operand is an `f32`/`f64` variable,
/// parameter, or literal.
pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    // File-level float declarations are visible from every function.
    let mut globals: BTreeMap<String, String> = BTreeMap::new();
    for item in &input.unit.items {
        match item {
            Item::Var(v) => {
                globals.insert(v.name.node.clone(), v.ty.name.clone());
            }
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Var(v) = &m.decl {
                        globals.insert(v.name.node.clone(), v.ty.name.clone());
                    }
                }
            }
            _ => {}
        }
    }

    for (_, func) in functions_of(input.unit) {
        let mut env = globals.clone();
        for p in &func.params {
            env.insert(p.name.node.clone(), p.ty.name.clone());
        }
        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                if let Stmt::Var(v) = s {
                    env.insert(v.name.node.clone(), v.ty.name.clone());
                }
            });
        }

        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                for e in stmt_exprs(s) {
                    walk_expr(e, &mut |sub| {
                        if let ExprKind::Binary { op: BinOp::Mod, left, right } = &sub.kind {
                            if let Some(name) =
                                float_operand(left, &env).or_else(|| float_operand(right, &env))
                            {
                                let (line, column) = input.index.span_line_col(sub.span);
                                diagnostics.push(AnalyzerDiagnostic {
                                    code: CODE_FLOAT_MOD,
                                    line,
                                    column,
                                    message: format!(
                                        "modulo on floating-point operand {name}"
                                    ),
                                });
                            }
                        }
                    });
                }
            });
        }
    }

    diagnostics
}

fn float_operand(expr: &Expr, env: &BTreeMap<String, String>) -> Option<String> {
    match &unparen(expr).kind {
        ExprKind::FloatLit(text) => Some(format!("'{text}'")),
        ExprKind::Ident(name) => {
            let ty = env.get(&name.node)?;
            if is_float_type(ty) {
                Some(format!("'{}'", name.node))
            } else {
                None
            }
        }
        _ => None,
    }
}
