#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use cnx_ast::{ElseArm, Expr, ExprKind, Stmt};
use cnx_symbols::{SourceLanguage, SymbolKind};

use crate::error::{AnalyzerDiagnostic, CODE_UNINITIALIZED};
use crate::walk::{functions_of, unparen};

use super::AnalyzerInput;

/// Flow-sensitive use-before-init checker.
///
/// A stack of scopes maps each declared local to its initialization flag.
/// Branch points snapshot the state; merges intersect the flags, so a
/// variable is initialized after a branch only if every branch
/// initializes it.
struct InitState {
    scopes: Vec<BTreeMap<String, bool>>,
}

impl InitState {
    fn new() -> Self {
        Self {
            scopes: vec![BTreeMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, initialized: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), initialized);
        }
    }

    /// Flip the flag in the innermost scope where the name is bound.
    fn mark(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(flag) = scope.get_mut(name) {
                *flag = true;
                return;
            }
        }
    }

    /// `None` means the name is not a tracked local (a scope member,
    /// global, enum value, or C symbol).
    fn lookup(&self, name: &str) -> Option<bool> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn clone_state(&self) -> Vec<BTreeMap<String, bool>> {
        self.scopes.clone()
    }

    /// Intersect two branch exits over the bindings that existed at the
    /// branch point.
    fn merge(&mut self, a: Vec<BTreeMap<String, bool>>, b: Vec<BTreeMap<String, bool>>) {
        for (level, scope) in self.scopes.iter_mut().enumerate() {
            for (name, flag) in scope.iter_mut() {
                let in_a = a.get(level).and_then(|s| s.get(name)).copied().unwrap_or(*flag);
                let in_b = b.get(level).and_then(|s| s.get(name)).copied().unwrap_or(*flag);
                *flag = in_a && in_b;
            }
        }
    }

    fn adopt(&mut self, exit: Vec<BTreeMap<String, bool>>) {
        for (level, scope) in self.scopes.iter_mut().enumerate() {
            for (name, flag) in scope.iter_mut() {
                if let Some(v) = exit.get(level).and_then(|s| s.get(name)) {
                    *flag = *v;
                }
            }
        }
    }
}

struct InitChecker<'a> {
    input: &'a AnalyzerInput<'a>,
    state: InitState,
    diagnostics: Vec<AnalyzerDiagnostic>,
}

pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    for (_, func) in functions_of(input.unit) {
        let mut checker = InitChecker {
            input,
            state: InitState::new(),
            diagnostics: Vec::new(),
        };
        // Parameters arrive initialized, external C parameters included.
        for param in &func.params {
            checker.state.declare(&param.name.node, true);
        }
        checker.check_stmts(&func.body.stmts);
        diagnostics.append(&mut checker.diagnostics);
    }

    diagnostics
}

impl<'a> InitChecker<'a> {
    fn check_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_block_scoped(&mut self, stmts: &[Stmt]) {
        self.state.push();
        self.check_stmts(stmts);
        self.state.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var(v) => {
                if let Some(init) = &v.init {
                    self.check_reads(init);
                }
                self.state
                    .declare(&v.name.node, v.init.is_some() || self.default_initialized(v));
            }
            Stmt::Assign(a) => {
                self.check_reads(&a.value);
                // Subscripts on the target are reads even in a plain store.
                self.check_target_subscript_reads(&a.target);
                if a.op.is_compound() {
                    self.check_reads(&a.target);
                }
                if let Some(root) = target_root(&a.target) {
                    self.state.mark(root);
                }
            }
            Stmt::Expr(e) => self.check_reads(e),
            Stmt::If(s) => self.check_if(s),
            Stmt::While(s) => {
                self.check_reads(&s.cond);
                let before = self.state.clone_state();
                self.check_block_scoped(&s.body.stmts);
                // The body may not run; nothing it initialized survives.
                self.state.adopt(before);
            }
            Stmt::DoWhile(s) => {
                // The body runs at least once, so its effects persist.
                self.check_block_scoped(&s.body.stmts);
                self.check_reads(&s.cond);
            }
            Stmt::For(s) => {
                self.state.push();
                if let Some(init) = &s.init {
                    self.check_stmt(init);
                }
                if let Some(cond) = &s.cond {
                    self.check_reads(cond);
                }
                let before = self.state.clone_state();
                self.check_block_scoped(&s.body.stmts);
                if let Some(update) = &s.update {
                    self.check_stmt(update);
                }
                self.state.adopt(before);
                self.state.pop();
            }
            Stmt::Switch(s) => {
                self.check_reads(&s.scrutinee);
                let before = self.state.clone_state();
                let mut exits = Vec::new();
                for case in &s.cases {
                    self.check_block_scoped(&case.body.stmts);
                    exits.push(self.state.clone_state());
                    self.state.adopt(before.clone());
                }
                match &s.default {
                    Some(d) => {
                        self.check_block_scoped(&d.stmts);
                        exits.push(self.state.clone_state());
                        self.state.adopt(before.clone());
                    }
                    // Without a default, falling through keeps the
                    // pre-switch state.
                    None => exits.push(before.clone()),
                }
                for exit in exits {
                    let current = self.state.clone_state();
                    self.state.merge(current, exit);
                }
            }
            Stmt::Critical(s) => self.check_block_scoped(&s.body.stmts),
            Stmt::Return(r) => {
                if let Some(v) = &r.value {
                    self.check_reads(v);
                }
            }
            Stmt::Block(b) => self.check_block_scoped(&b.stmts),
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn check_if(&mut self, s: &cnx_ast::IfStmt) {
        self.check_reads(&s.cond);
        let before = self.state.clone_state();

        self.check_block_scoped(&s.then_block.stmts);
        let then_exit = self.state.clone_state();
        self.state.adopt(before.clone());

        let else_exit = match &s.else_block {
            Some(arm) => {
                match arm.as_ref() {
                    ElseArm::Else(b) => self.check_block_scoped(&b.stmts),
                    ElseArm::ElseIf(i) => self.check_if(i),
                }
                let exit = self.state.clone_state();
                self.state.adopt(before.clone());
                exit
            }
            // No else arm: the fall-through path keeps the prior state.
            None => before,
        };

        self.state.merge(then_exit, else_exit);
    }

    /// A declaration without an initializer still counts as initialized
    /// for bounded strings (zeroed buffer) and C++ classes with a default
    /// constructor.
    fn default_initialized(&self, v: &cnx_ast::VarDecl) -> bool {
        if v.ty.is_string() {
            return true;
        }
        self.input.table.get_overloads(&v.ty.name).iter().any(|s| {
            s.kind == SymbolKind::Struct && s.language == SourceLanguage::Cpp
        })
    }

    fn check_reads(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.report_if_uninitialized(name),
            ExprKind::Member { base, .. } => match &base.kind {
                // `this.x` / `global.x` are zero-initialized storage.
                ExprKind::This(_) | ExprKind::Global(_) => {}
                _ => self.check_reads(base),
            },
            ExprKind::Index { base, args } => {
                self.check_reads(base);
                for a in args {
                    self.check_reads(a);
                }
            }
            ExprKind::Call { callee, args } => {
                // A callee name is a function, not a local read.
                if is_out_param_builtin(callee) {
                    // `safe_div(out, n, d, dflt)` writes its first argument.
                    if let Some(ExprKind::Ident(name)) = args.first().map(|a| &unparen(a).kind) {
                        self.state.mark(&name.node);
                    }
                    for a in args.iter().skip(1) {
                        self.check_reads(a);
                    }
                } else {
                    for a in args {
                        self.check_reads(a);
                    }
                }
            }
            ExprKind::Unary { expr, .. } => self.check_reads(expr),
            ExprKind::Binary { left, right, .. } | ExprKind::Checked { left, right, .. } => {
                self.check_reads(left);
                self.check_reads(right);
            }
            ExprKind::Paren(inner) => self.check_reads(inner),
            _ => {}
        }
    }

    fn check_target_subscript_reads(&mut self, target: &Expr) {
        if let ExprKind::Index { base, args } = &target.kind {
            self.check_target_subscript_reads(base);
            for a in args {
                self.check_reads(a);
            }
        } else if let ExprKind::Member { base, .. } = &target.kind {
            self.check_target_subscript_reads(base);
        }
    }

    fn report_if_uninitialized(&mut self, name: &cnx_ast::Ident) {
        if self.state.lookup(&name.node) == Some(false) {
            let (line, column) = self.input.index.span_line_col(name.span);
            self.diagnostics.push(AnalyzerDiagnostic {
                code: CODE_UNINITIALIZED,
                line,
                column,
                message: format!("variable '{}' may be used uninitialized", name.node),
            });
        }
    }
}

fn is_out_param_builtin(callee: &Expr) -> bool {
    matches!(&unparen(callee).kind, ExprKind::Ident(name) if name.node == "safe_div" || name.node == "safe_mod")
}

/// The identifier at the root of an assignment target path.
fn target_root(target: &Expr) -> Option<&str> {
    match &target.kind {
        ExprKind::Ident(name) => Some(&name.node),
        ExprKind::Member { base, member } => match &base.kind {
            ExprKind::This(_) | ExprKind::Global(_) => None,
            _ => target_root(base).or(Some(&member.node)),
        },
        ExprKind::Index { base, .. } => target_root(base),
        _ => None,
    }
}
