#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use cnx_ast::{BinOp, ElseArm, Expr, ExprKind, Stmt, UnaryOp};

use crate::error::{AnalyzerDiagnostic, CODE_NULL_CHECK};
use crate::types::is_zero_literal;
use crate::walk::{functions_of, stmt_exprs, unparen, walk_expr};

use super::AnalyzerInput;

/// Documented C stdlib functions that return a pointer which may be NULL.
const POINTER_RETURNING: &[&str] = &[
    "malloc", "calloc", "realloc", "fopen", "getenv", "strstr", "strchr", "strrchr", "memchr",
    "localtime", "gmtime",
];

pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    for (_, func) in functions_of(input.unit) {
        let mut pending: BTreeMap<String, String> = BTreeMap::new();
        check_stmts(input, &func.body.stmts, &mut pending, &mut diagnostics);
    }

    diagnostics
}

fn check_stmts(
    input: &AnalyzerInput,
    stmts: &[Stmt],
    pending: &mut BTreeMap<String, String>,
    diagnostics: &mut Vec<AnalyzerDiagnostic>,
) {
    for stmt in stmts {
        match stmt {
            Stmt::Var(v) => {
                if let Some(init) = &v.init {
                    check_uses(input, init, pending, diagnostics);
                    if let Some(callee) = pointer_call(init) {
                        pending.insert(v.name.node.clone(), callee.to_string());
                    }
                }
            }
            Stmt::Assign(a) => {
                check_uses(input, &a.value, pending, diagnostics);
                if let (ExprKind::Ident(target), Some(callee)) =
                    (&a.target.kind, pointer_call(&a.value))
                {
                    pending.insert(target.node.clone(), callee.to_string());
                }
            }
            Stmt::If(s) => {
                // Only a direct null test of the pointer is its guard;
                // any other use in the condition is still a use.
                for name in guarded_names(&s.cond, pending) {
                    pending.remove(&name);
                }
                check_uses(input, &s.cond, pending, diagnostics);
                check_stmts(input, &s.then_block.stmts, pending, diagnostics);
                if let Some(arm) = &s.else_block {
                    match arm.as_ref() {
                        ElseArm::Else(b) => check_stmts(input, &b.stmts, pending, diagnostics),
                        ElseArm::ElseIf(i) => check_stmts(
                            input,
                            std::slice::from_ref(&Stmt::If(i.clone())),
                            pending,
                            diagnostics,
                        ),
                    }
                }
            }
            Stmt::While(s) => {
                check_uses(input, &s.cond, pending, diagnostics);
                check_stmts(input, &s.body.stmts, pending, diagnostics);
            }
            Stmt::DoWhile(s) => {
                check_stmts(input, &s.body.stmts, pending, diagnostics);
                check_uses(input, &s.cond, pending, diagnostics);
            }
            Stmt::For(s) => {
                if let Some(init) = &s.init {
                    check_stmts(input, std::slice::from_ref(init.as_ref()), pending, diagnostics);
                }
                if let Some(cond) = &s.cond {
                    check_uses(input, cond, pending, diagnostics);
                }
                check_stmts(input, &s.body.stmts, pending, diagnostics);
                if let Some(update) = &s.update {
                    check_stmts(input, std::slice::from_ref(update.as_ref()), pending, diagnostics);
                }
            }
            Stmt::Switch(s) => {
                check_uses(input, &s.scrutinee, pending, diagnostics);
                for c in &s.cases {
                    check_stmts(input, &c.body.stmts, pending, diagnostics);
                }
                if let Some(d) = &s.default {
                    check_stmts(input, &d.stmts, pending, diagnostics);
                }
            }
            Stmt::Critical(s) => check_stmts(input, &s.body.stmts, pending, diagnostics),
            Stmt::Block(b) => check_stmts(input, &b.stmts, pending, diagnostics),
            other => {
                for e in stmt_exprs(other) {
                    check_uses(input, e, pending, diagnostics);
                }
            }
        }
    }
}

fn pointer_call(expr: &Expr) -> Option<&str> {
    if let ExprKind::Call { callee, .. } = &unparen(expr).kind {
        if let ExprKind::Ident(name) = &unparen(callee).kind {
            if POINTER_RETURNING.contains(&name.node.as_str()) {
                return Some(&name.node);
            }
        }
    }
    None
}

/// Names the condition directly null-tests: a bare truthiness test,
/// `!p`, or a comparison against a literal zero, possibly joined with
/// `&&`/`||`. A pointer passed to a call is not guarded by it.
fn guarded_names(cond: &Expr, pending: &BTreeMap<String, String>) -> Vec<String> {
    let mut guarded = Vec::new();
    collect_guards(cond, pending, &mut guarded);
    guarded
}

fn collect_guards(cond: &Expr, pending: &BTreeMap<String, String>, guarded: &mut Vec<String>) {
    match &unparen(cond).kind {
        ExprKind::Ident(name) => {
            if pending.contains_key(&name.node) {
                guarded.push(name.node.clone());
            }
        }
        ExprKind::Unary {
            op: UnaryOp::Not,
            expr,
        } => collect_guards(expr, pending, guarded),
        ExprKind::Binary {
            left,
            op: BinOp::Eq | BinOp::Ne,
            right,
        } => {
            if let ExprKind::Ident(name) = &unparen(left).kind {
                if pending.contains_key(&name.node) && is_zero_operand(right) {
                    guarded.push(name.node.clone());
                }
            }
            if let ExprKind::Ident(name) = &unparen(right).kind {
                if pending.contains_key(&name.node) && is_zero_operand(left) {
                    guarded.push(name.node.clone());
                }
            }
        }
        ExprKind::Binary {
            left,
            op: BinOp::And | BinOp::Or,
            right,
        } => {
            collect_guards(left, pending, guarded);
            collect_guards(right, pending, guarded);
        }
        _ => {}
    }
}

fn is_zero_operand(expr: &Expr) -> bool {
    matches!(&unparen(expr).kind, ExprKind::IntLit(text) if is_zero_literal(text))
}

fn check_uses(
    input: &AnalyzerInput,
    expr: &Expr,
    pending: &BTreeMap<String, String>,
    diagnostics: &mut Vec<AnalyzerDiagnostic>,
) {
    walk_expr(expr, &mut |e| {
        if let ExprKind::Ident(name) = &e.kind {
            if let Some(callee) = pending.get(&name.node) {
                let (line, column) = input.index.span_line_col(name.span);
                diagnostics.push(AnalyzerDiagnostic {
                    code: CODE_NULL_CHECK,
                    line,
                    column,
                    message: format!(
                        "pointer '{}' returned by '{callee}' must be null-checked before use",
                        name.node
                    ),
                });
            }
        }
    });
}
