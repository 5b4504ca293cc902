#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use cnx_ast::{Expr, ExprKind, FunctionDef, Item, ScopeDecl, Span};
use cnx_symbols::SymbolKind;

use crate::error::{AnalyzerDiagnostic, CODE_CALL_BEFORE_DEF, CODE_RECURSION};
use crate::walk::{stmt_exprs, unparen, walk_expr, walk_stmt};

use super::AnalyzerInput;

/// Intrinsics the transpiler itself lowers.
const BUILTINS: &[&str] = &["safe_div", "safe_mod", "substring"];

/// Curated allow-list per C standard header. Anything else from C land
/// must come in through an included header's symbols.
const STDLIB_ALLOWED: &[&str] = &[
    // stdio.h
    "printf", "fprintf", "sprintf", "snprintf", "puts", "putchar", "getchar", "fgets", "fopen",
    "fclose", "fread", "fwrite", "fflush",
    // stdlib.h
    "malloc", "calloc", "realloc", "free", "abs", "labs", "atoi", "atol", "exit", "rand", "srand",
    // string.h
    "strlen", "strcmp", "strncmp", "strncpy", "strncat", "memcpy", "memset", "memmove", "memcmp",
    "strstr", "strchr", "strrchr", "memchr",
    // math.h
    "sqrt", "pow", "sin", "cos", "tan", "fabs", "floor", "ceil", "log", "exp",
    // ctype.h
    "isalpha", "isdigit", "isalnum", "isspace", "toupper", "tolower",
    // time.h
    "time", "clock", "difftime",
    // assert.h
    "assert",
];

struct CallChecker<'a> {
    input: &'a AnalyzerInput<'a>,
    scope_names: BTreeSet<String>,
    /// Scope -> functions already defined, in textual order.
    scope_defined: BTreeMap<String, BTreeSet<String>>,
    top_defined: BTreeSet<String>,
    diagnostics: Vec<AnalyzerDiagnostic>,
}

pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    // First pass: scope names, so `Scope.member` calls resolve.
    let mut scope_names = BTreeSet::new();
    for item in &input.unit.items {
        if let Item::Scope(s) = item {
            scope_names.insert(s.name.node.clone());
        }
    }

    let mut checker = CallChecker {
        input,
        scope_names,
        scope_defined: BTreeMap::new(),
        top_defined: BTreeSet::new(),
        diagnostics: Vec::new(),
    };

    for item in &input.unit.items {
        match item {
            Item::Function(f) => {
                checker.check_function(f, None);
                checker.top_defined.insert(f.name.node.clone());
            }
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Function(f) = &m.decl {
                        checker.check_function(f, Some(&s.name.node));
                        checker
                            .scope_defined
                            .entry(s.name.node.clone())
                            .or_default()
                            .insert(f.name.node.clone());
                    }
                }
            }
            _ => {}
        }
    }

    checker.diagnostics
}

impl<'a> CallChecker<'a> {
    fn check_function(&mut self, func: &FunctionDef, scope: Option<&str>) {
        let current = func.name.node.clone();
        let mut calls: Vec<(&Expr, &Expr)> = Vec::new();
        for stmt in &func.body.stmts {
            walk_stmt(stmt, &mut |s| {
                for e in stmt_exprs(s) {
                    walk_expr(e, &mut |sub| {
                        if let ExprKind::Call { callee, .. } = &sub.kind {
                            calls.push((sub, callee));
                        }
                    });
                }
            });
        }

        for (site, callee) in calls {
            self.check_call(site.span, callee, &current, scope);
        }
    }

    fn check_call(&mut self, span: Span, callee: &Expr, current: &str, scope: Option<&str>) {
        match &unparen(callee).kind {
            ExprKind::Ident(name) => {
                let name = name.node.as_str();
                if name == current {
                    self.push_recursion(span, name);
                    return;
                }
                if BUILTINS.contains(&name) || STDLIB_ALLOWED.contains(&name) {
                    return;
                }
                if self.top_defined.contains(name) {
                    return;
                }
                // Header-provided functions arrive via the symbol table.
                if self
                    .input
                    .table
                    .get_overloads(name)
                    .iter()
                    .any(|s| s.kind == SymbolKind::Function)
                {
                    return;
                }
                self.push_before_def(span, name);
            }
            ExprKind::Member { base, member } => match &unparen(base).kind {
                ExprKind::This(_) => {
                    if let Some(scope) = scope {
                        self.check_scope_call(span, scope, &member.node, current);
                    }
                }
                ExprKind::Ident(base_name) if self.scope_names.contains(&base_name.node) => {
                    self.check_scope_call(span, &base_name.node, &member.node, current);
                }
                // Method-style calls on C++ objects are the header's
                // business, not ours.
                _ => {}
            },
            _ => {}
        }
    }

    fn check_scope_call(&mut self, span: Span, scope: &str, member: &str, current: &str) {
        if member == current {
            self.push_recursion(span, member);
            return;
        }
        let defined = self
            .scope_defined
            .get(scope)
            .map(|d| d.contains(member))
            .unwrap_or(false);
        if !defined {
            self.push_before_def(span, member);
        }
    }

    fn push_recursion(&mut self, span: Span, name: &str) {
        let (line, column) = self.input.index.span_line_col(span);
        self.diagnostics.push(AnalyzerDiagnostic {
            code: CODE_RECURSION,
            line,
            column,
            message: format!("recursive call to '{name}' is forbidden (MISRA C:2012 Rule 17.2)"),
        });
    }

    fn push_before_def(&mut self, span: Span, name: &str) {
        let (line, column) = self.input.index.span_line_col(span);
        self.diagnostics.push(AnalyzerDiagnostic {
            code: CODE_CALL_BEFORE_DEF,
            line,
            column,
            message: format!("call to '{name}' before its definition"),
        });
    }
}
