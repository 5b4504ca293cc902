#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use cnx_ast::{AssignOp, BinOp, Expr, ExprKind, Item, ScopeDecl, Stmt};

use crate::error::{AnalyzerDiagnostic, CODE_DIV_ZERO, CODE_MOD_ZERO};
use crate::types::is_zero_literal;
use crate::walk::{functions_of, unparen, walk_stmt, walk_unit_exprs};

use super::AnalyzerInput;

/// Two passes: collect const identifiers bound to a literal zero, then
/// inspect the right operand of every `/` and `%`.
pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let const_zeros = collect_const_zeros(input);
    let mut diagnostics = Vec::new();

    walk_unit_exprs(input.unit, &mut |expr| {
        if let ExprKind::Binary { op, right, .. } = &expr.kind {
            let code = match op {
                BinOp::Div => CODE_DIV_ZERO,
                BinOp::Mod => CODE_MOD_ZERO,
                _ => return,
            };
            report_zero_operand(input, right, &const_zeros, code, &mut diagnostics);
        }
    });

    // Compound `/<-` and `%<-` divide too.
    for (_, func) in functions_of(input.unit) {
        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                if let Stmt::Assign(a) = s {
                    let code = match a.op {
                        AssignOp::Div => CODE_DIV_ZERO,
                        AssignOp::Mod => CODE_MOD_ZERO,
                        _ => return,
                    };
                    report_zero_operand(input, &a.value, &const_zeros, code, &mut diagnostics);
                }
            });
        }
    }

    diagnostics
}

/// Identifiers that are provably zero at every use: consts initialized
/// to a literal zero, plus plain variables initialized to a literal zero
/// and never written again anywhere in the unit.
fn collect_const_zeros(input: &AnalyzerInput) -> BTreeSet<String> {
    let mut reassigned = BTreeSet::new();
    for (_, func) in functions_of(input.unit) {
        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                if let Stmt::Assign(a) = s {
                    if let Some(root) = target_root(&a.target) {
                        reassigned.insert(root.to_string());
                    }
                }
                for e in crate::walk::stmt_exprs(s) {
                    crate::walk::walk_expr(e, &mut |sub| {
                        if let ExprKind::Call { callee, args } = &sub.kind {
                            let is_out = matches!(&unparen(callee).kind,
                                ExprKind::Ident(n) if n.node == "safe_div" || n.node == "safe_mod");
                            if is_out {
                                if let Some(ExprKind::Ident(n)) =
                                    args.first().map(|a| &unparen(a).kind)
                                {
                                    reassigned.insert(n.node.clone());
                                }
                            }
                        }
                    });
                }
            });
        }
    }

    let mut zeros = BTreeSet::new();
    let mut consider = |is_const: bool, name: &str, init: Option<&Expr>| {
        let Some(init) = init else { return };
        if !leaf_is_zero(init) {
            return;
        }
        if is_const || !reassigned.contains(name) {
            zeros.insert(name.to_string());
        }
    };

    for item in &input.unit.items {
        match item {
            Item::Var(v) => consider(v.is_const, &v.name.node, v.init.as_ref()),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Var(v) = &m.decl {
                        consider(v.is_const, &v.name.node, v.init.as_ref());
                    }
                }
            }
            _ => {}
        }
    }
    for (_, func) in functions_of(input.unit) {
        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                if let Stmt::Var(v) = s {
                    consider(v.is_const, &v.name.node, v.init.as_ref());
                }
            });
        }
    }

    zeros
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

/// Descend to the leaf literal: `(0)`, `0x0`, `0b0`, suffixed zeros.
fn leaf_is_zero(expr: &Expr) -> bool {
    match &unparen(expr).kind {
        ExprKind::IntLit(text) => is_zero_literal(text),
        ExprKind::Unary { op: cnx_ast::UnaryOp::Neg, expr } => leaf_is_zero(expr),
        _ => false,
    }
}

fn report_zero_operand(
    input: &AnalyzerInput,
    right: &Expr,
    const_zeros: &BTreeSet<String>,
    code: &'static str,
    diagnostics: &mut Vec<AnalyzerDiagnostic>,
) {
    let operand = unparen(right);
    let is_zero = match &operand.kind {
        ExprKind::Ident(name) => const_zeros.contains(&name.node),
        _ => leaf_is_zero(operand),
    };
    if is_zero {
        let (line, column) = input.index.span_line_col(operand.span);
        let what = if code == CODE_DIV_ZERO {
            "Division"
        } else {
            "Modulo"
        };
        diagnostics.push(AnalyzerDiagnostic {
            code,
            line,
            column,
            message: format!("{what} by zero"),
        });
    }
}
