#![forbid(unsafe_code)]

use cnx_ast::{ElseArm, Expr, ExprKind, FunctionDef, Item, ScopeDecl, Stmt, StructDef, Unit, VarDecl};

/// Every function in the unit, paired with its owning scope (if any),
/// in textual order.
pub fn functions_of(unit: &Unit) -> Vec<(Option<&str>, &FunctionDef)> {
    let mut out = Vec::new();
    for item in &unit.items {
        match item {
            Item::Function(f) => out.push((None, f)),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Function(f) = &m.decl {
                        out.push((Some(s.name.node.as_str()), f));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

pub fn structs_of(unit: &Unit) -> Vec<&StructDef> {
    let mut out = Vec::new();
    for item in &unit.items {
        match item {
            Item::Struct(s) => out.push(s),
            Item::Scope(sc) => {
                for m in &sc.members {
                    if let ScopeDecl::Struct(s) = &m.decl {
                        out.push(s);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Every variable declaration in the unit: globals, scope members, and
/// function locals, in textual order.
pub fn var_decls_of(unit: &Unit) -> Vec<&VarDecl> {
    let mut out = Vec::new();
    for item in &unit.items {
        match item {
            Item::Var(v) => out.push(v),
            Item::Scope(s) => {
                for m in &s.members {
                    match &m.decl {
                        ScopeDecl::Var(v) => out.push(v),
                        ScopeDecl::Function(f) => collect_locals(&f.body.stmts, &mut out),
                        _ => {}
                    }
                }
            }
            Item::Function(f) => collect_locals(&f.body.stmts, &mut out),
            _ => {}
        }
    }
    out
}

fn collect_locals<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a VarDecl>) {
    for stmt in stmts {
        walk_stmt(stmt, &mut |s| {
            if let Stmt::Var(v) = s {
                out.push(v);
            }
        });
    }
}

/// Pre-order walk over a statement and everything nested in it.
pub fn walk_stmt<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Stmt)) {
    f(stmt);
    match stmt {
        Stmt::If(s) => {
            for st in &s.then_block.stmts {
                walk_stmt(st, f);
            }
            if let Some(arm) = &s.else_block {
                match arm.as_ref() {
                    ElseArm::Else(b) => {
                        for st in &b.stmts {
                            walk_stmt(st, f);
                        }
                    }
                    ElseArm::ElseIf(i) => {
                        walk_if_as_stmt(i, f);
                    }
                }
            }
        }
        Stmt::While(s) => {
            for st in &s.body.stmts {
                walk_stmt(st, f);
            }
        }
        Stmt::DoWhile(s) => {
            for st in &s.body.stmts {
                walk_stmt(st, f);
            }
        }
        Stmt::For(s) => {
            if let Some(init) = &s.init {
                walk_stmt(init, f);
            }
            if let Some(update) = &s.update {
                walk_stmt(update, f);
            }
            for st in &s.body.stmts {
                walk_stmt(st, f);
            }
        }
        Stmt::Switch(s) => {
            for c in &s.cases {
                for st in &c.body.stmts {
                    walk_stmt(st, f);
                }
            }
            if let Some(d) = &s.default {
                for st in &d.stmts {
                    walk_stmt(st, f);
                }
            }
        }
        Stmt::Critical(s) => {
            for st in &s.body.stmts {
                walk_stmt(st, f);
            }
        }
        Stmt::Block(b) => {
            for st in &b.stmts {
                walk_stmt(st, f);
            }
        }
        _ => {}
    }
}

fn walk_if_as_stmt<'a>(i: &'a cnx_ast::IfStmt, f: &mut impl FnMut(&'a Stmt)) {
    for st in &i.then_block.stmts {
        walk_stmt(st, f);
    }
    if let Some(arm) = &i.else_block {
        match arm.as_ref() {
            ElseArm::Else(b) => {
                for st in &b.stmts {
                    walk_stmt(st, f);
                }
            }
            ElseArm::ElseIf(inner) => walk_if_as_stmt(inner, f),
        }
    }
}

/// The expressions a statement holds directly (conditions, initializers,
/// values), not those of nested statements.
pub fn stmt_exprs<'a>(stmt: &'a Stmt) -> Vec<&'a Expr> {
    match stmt {
        Stmt::Var(v) => v.init.iter().collect(),
        Stmt::Assign(a) => vec![&a.target, &a.value],
        Stmt::Expr(e) => vec![e],
        // The whole chain's conditions; else-if arms are not separate
        // statements.
        Stmt::If(s) => {
            let mut out = vec![&s.cond];
            let mut cur = s;
            while let Some(arm) = &cur.else_block {
                match arm.as_ref() {
                    ElseArm::ElseIf(i) => {
                        out.push(&i.cond);
                        cur = i;
                    }
                    ElseArm::Else(_) => break,
                }
            }
            out
        }
        Stmt::While(s) => vec![&s.cond],
        Stmt::DoWhile(s) => vec![&s.cond],
        Stmt::For(s) => s.cond.iter().collect(),
        Stmt::Switch(s) => {
            let mut out = vec![&s.scrutinee];
            out.extend(s.cases.iter().map(|c| &c.label));
            out
        }
        Stmt::Return(r) => r.value.iter().collect(),
        _ => vec![],
    }
}

/// Pre-order walk over an expression tree.
pub fn walk_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Member { base, .. } => walk_expr(base, f),
        ExprKind::Index { base, args } => {
            walk_expr(base, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::Call { callee, args } => {
            walk_expr(callee, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::Unary { expr, .. } => walk_expr(expr, f),
        ExprKind::Binary { left, right, .. } | ExprKind::Checked { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::Paren(inner) => walk_expr(inner, f),
        _ => {}
    }
}

/// Every expression in the unit, including declaration initializers.
pub fn walk_unit_exprs<'a>(unit: &'a Unit, f: &mut impl FnMut(&'a Expr)) {
    for item in &unit.items {
        match item {
            Item::Var(v) => {
                if let Some(init) = &v.init {
                    walk_expr(init, f);
                }
            }
            Item::Function(func) => walk_fn_exprs(func, f),
            Item::Scope(s) => {
                for m in &s.members {
                    match &m.decl {
                        ScopeDecl::Var(v) => {
                            if let Some(init) = &v.init {
                                walk_expr(init, f);
                            }
                        }
                        ScopeDecl::Function(func) => walk_fn_exprs(func, f),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn walk_fn_exprs<'a>(func: &'a FunctionDef, f: &mut impl FnMut(&'a Expr)) {
    for stmt in &func.body.stmts {
        walk_stmt(stmt, &mut |s| {
            for e in stmt_exprs(s) {
                walk_expr(e, f);
            }
        });
    }
}

/// Peel parentheses.
pub fn unparen(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Paren(inner) => unparen(inner),
        _ => expr,
    }
}
