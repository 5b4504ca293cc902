#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use cnx_ast::{
    builtin_bit_width, Access, BitmapDef, EnumDef, Expr, ExprKind, FunctionDef, Item, LineIndex,
    RegisterDef, ScopeDecl, ScopeDef, Span, Stmt, StructDef, Unit, VarDecl, Visibility,
};
use miette::Diagnostic;
use thiserror::Error;

use crate::symbol::{
    MemberAccess, ParamInfo, SourceLanguage, StructFieldInfo, Symbol, SymbolKind,
};

#[derive(Clone, Debug, Error, Diagnostic)]
#[error("symbol error: {message}")]
#[diagnostic(code(cnx::symbols))]
pub struct CollectError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitFieldInfo {
    pub name: String,
    pub offset: u32,
    pub width: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitmapInfo {
    pub width: u32,
    pub fields: Vec<BitFieldInfo>,
}

impl BitmapInfo {
    pub fn field(&self, name: &str) -> Option<&BitFieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterMemberInfo {
    pub name: String,
    pub access: Access,
    pub ty: String,
    pub bits: u32,
    pub offset: u64,
    pub bitmap: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterInfo {
    pub address: u64,
    pub members: Vec<RegisterMemberInfo>,
}

impl RegisterInfo {
    pub fn member(&self, name: &str) -> Option<&RegisterMemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumInfo {
    /// Explicit backing width for typed enums.
    pub bits: Option<u32>,
    pub members: Vec<(String, i64)>,
}

impl EnumInfo {
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|(m, _)| m == name)
    }
}

/// Per-scope facts the declaration generators need.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeInfo {
    pub functions: Vec<String>,
    pub public_members: BTreeSet<String>,
    /// Scope variable -> functions that reference it via `this.`.
    /// A variable with exactly one user is emitted as that function's
    /// `static` local.
    pub var_users: BTreeMap<String, BTreeSet<String>>,
    /// Private const scalars with literal initializers, recorded for
    /// inlining at use sites; they get no storage.
    pub const_inlines: BTreeMap<String, String>,
    pub variables: Vec<VarDecl>,
}

impl ScopeInfo {
    pub fn sole_user(&self, var: &str) -> Option<&str> {
        let users = self.var_users.get(var)?;
        if users.len() == 1 {
            users.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}

/// Everything the source symbol collector extracts from one unit.
#[derive(Clone, Debug, Default)]
pub struct CollectedUnit {
    pub path: String,
    pub symbols: Vec<Symbol>,
    pub bitmaps: BTreeMap<String, BitmapInfo>,
    pub registers: BTreeMap<String, RegisterInfo>,
    pub enums: BTreeMap<String, EnumInfo>,
    pub structs: BTreeMap<String, Vec<StructFieldInfo>>,
    pub scopes: BTreeMap<String, ScopeInfo>,
    /// Which scope owns a register, for `Scope.REG.MEMBER` resolution.
    pub register_scopes: BTreeMap<String, String>,
    pub errors: Vec<CollectError>,
}

/// Two-pass walk: bitmaps first (registers reference them), then structs
/// inside scopes (later declarations reference them), then everything else.
pub fn collect_unit(path: &str, unit: &Unit, index: &LineIndex) -> CollectedUnit {
    let mut out = CollectedUnit {
        path: path.to_string(),
        ..CollectedUnit::default()
    };

    // Pass 1: bitmaps anywhere, then scope-level structs.
    for item in &unit.items {
        match item {
            Item::Bitmap(b) => collect_bitmap(path, b, index, &mut out),
            Item::Scope(s) => {
                for m in &s.members {
                    if let ScopeDecl::Bitmap(b) = &m.decl {
                        collect_bitmap(path, b, index, &mut out);
                    }
                }
            }
            _ => {}
        }
    }
    for item in &unit.items {
        if let Item::Scope(s) = item {
            for m in &s.members {
                if let ScopeDecl::Struct(st) = &m.decl {
                    collect_struct(path, st, index, &mut out);
                }
            }
        }
    }

    // Pass 2: scopes, top-level structs, enums, registers, functions, globals.
    for item in &unit.items {
        match item {
            Item::Include(_) | Item::Bitmap(_) => {}
            Item::Scope(s) => collect_scope(path, s, index, &mut out),
            Item::Struct(st) => collect_struct(path, st, index, &mut out),
            Item::Enum(e) => collect_enum(path, e, index, &mut out),
            Item::Register(r) => collect_register(path, r, None, index, &mut out),
            Item::Function(f) => {
                let sym = function_symbol(path, f, index, true);
                out.symbols.push(sym);
            }
            Item::Var(v) => {
                let (line, column) = index.span_line_col(v.span);
                out.symbols.push(
                    Symbol::new(&v.name.node, SymbolKind::Variable, SourceLanguage::CNext, path)
                        .with_type(&v.ty.name)
                        .at(line, column)
                        .exported(true),
                );
            }
        }
    }

    out
}

fn collect_bitmap(path: &str, b: &BitmapDef, index: &LineIndex, out: &mut CollectedUnit) {
    let mut fields = Vec::new();
    let mut offset = 0u32;
    for f in &b.fields {
        fields.push(BitFieldInfo {
            name: f.name.node.clone(),
            offset,
            width: f.width,
        });
        offset += f.width;
    }

    if offset != b.width {
        out.errors.push(CollectError {
            message: format!(
                "bitmap '{}' declares {offset} bits but its backing type holds {}",
                b.name.node, b.width
            ),
            span: b.span,
        });
        return;
    }

    let (line, column) = index.span_line_col(b.span);
    out.symbols.push(
        Symbol::new(&b.name.node, SymbolKind::Bitmap, SourceLanguage::CNext, path)
            .with_type(format!("u{}", storage_bits(b.width)))
            .at(line, column)
            .exported(true),
    );
    out.bitmaps.insert(
        b.name.node.clone(),
        BitmapInfo {
            width: b.width,
            fields,
        },
    );
}

/// Narrowest standard storage type that holds a bitmap width; a 24-bit
/// bitmap is backed by a 32-bit integer.
pub fn storage_bits(width: u32) -> u32 {
    match width {
        8 => 8,
        16 => 16,
        24 | 32 => 32,
        _ => 64,
    }
}

fn collect_struct(path: &str, st: &StructDef, index: &LineIndex, out: &mut CollectedUnit) {
    if out.structs.contains_key(&st.name.node) {
        return;
    }

    let mut fields = Vec::new();
    for f in &st.fields {
        let mut dims = f.dims.clone();
        // Bounded string fields reserve the NUL byte in their rightmost
        // dimension.
        if let Some(cap) = f.ty.string_capacity {
            dims.push(cap + 1);
        }
        fields.push(StructFieldInfo {
            name: f.name.node.clone(),
            ty: f.ty.name.clone(),
            dims,
        });
    }

    let (line, column) = index.span_line_col(st.span);
    out.symbols.push(
        Symbol::new(&st.name.node, SymbolKind::Struct, SourceLanguage::CNext, path)
            .with_type(&st.name.node)
            .at(line, column)
            .exported(true),
    );
    out.structs.insert(st.name.node.clone(), fields);
}

fn collect_enum(path: &str, e: &EnumDef, index: &LineIndex, out: &mut CollectedUnit) {
    let mut members = Vec::new();
    let mut next = 0i64;
    for m in &e.members {
        let value = match &m.value {
            Some(v) => {
                if v.node < 0 {
                    out.errors.push(CollectError {
                        message: format!(
                            "enum member '{}' has negative value {}",
                            m.name.node, v.node
                        ),
                        span: v.span,
                    });
                    return;
                }
                v.node
            }
            None => next,
        };
        members.push((m.name.node.clone(), value));
        next = value + 1;
    }

    let bits = e.backing.as_ref().and_then(|t| builtin_bit_width(&t.name));
    let (line, column) = index.span_line_col(e.span);
    out.symbols.push(
        Symbol::new(&e.name.node, SymbolKind::Enum, SourceLanguage::CNext, path)
            .with_type(&e.name.node)
            .at(line, column)
            .exported(true),
    );
    out.enums.insert(e.name.node.clone(), EnumInfo { bits, members });
}

fn collect_register(
    path: &str,
    r: &RegisterDef,
    scope: Option<&str>,
    index: &LineIndex,
    out: &mut CollectedUnit,
) {
    let mut members = Vec::new();
    for m in &r.members {
        let bits = builtin_bit_width(&m.ty.name).unwrap_or(32);
        members.push(RegisterMemberInfo {
            name: m.name.node.clone(),
            access: m.access,
            ty: m.ty.name.clone(),
            bits,
            offset: m.offset,
            bitmap: m.bitmap.as_ref().map(|b| b.node.clone()),
        });
    }

    let (line, column) = index.span_line_col(r.span);
    out.symbols.push(
        Symbol::new(&r.name.node, SymbolKind::Register, SourceLanguage::CNext, path)
            .with_type(format!("0x{:08X}", r.address))
            .at(line, column)
            .exported(true),
    );
    if let Some(scope) = scope {
        out.register_scopes
            .insert(r.name.node.clone(), scope.to_string());
    }
    out.registers.insert(
        r.name.node.clone(),
        RegisterInfo {
            address: r.address,
            members,
        },
    );
}

fn function_symbol(path: &str, f: &FunctionDef, index: &LineIndex, exported: bool) -> Symbol {
    let params = f
        .params
        .iter()
        .map(|p| ParamInfo {
            name: p.name.node.clone(),
            ty: p.ty.name.clone(),
            dims: p.dims.clone(),
        })
        .collect();
    let (line, column) = index.span_line_col(f.span);
    Symbol::new(&f.name.node, SymbolKind::Function, SourceLanguage::CNext, path)
        .with_type(&f.ret.name)
        .at(line, column)
        .exported(exported)
        .with_params(params)
}

fn collect_scope(path: &str, s: &ScopeDef, index: &LineIndex, out: &mut CollectedUnit) {
    let mut info = ScopeInfo::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let (line, column) = index.span_line_col(s.span);

    out.symbols.push(
        Symbol::new(&s.name.node, SymbolKind::Scope, SourceLanguage::CNext, path)
            .with_type("")
            .at(line, column)
            .exported(true),
    );

    for m in &s.members {
        let (name, span) = member_name(&m.decl);
        if !seen.insert(name.clone()) {
            out.errors.push(CollectError {
                message: format!("duplicate member '{name}' in scope '{}'", s.name.node),
                span,
            });
            continue;
        }
        if m.visibility == Visibility::Public {
            info.public_members.insert(name.clone());
        }

        let access = match m.visibility {
            Visibility::Public => MemberAccess::Public,
            Visibility::Private => MemberAccess::Private,
        };
        let qualified = format!("{}.{}", s.name.node, name);
        let (mline, mcol) = index.span_line_col(span);
        out.symbols.push(
            Symbol::new(&qualified, SymbolKind::ScopeMember, SourceLanguage::CNext, path)
                .at(mline, mcol)
                .exported(m.visibility == Visibility::Public)
                .with_access(access),
        );

        match &m.decl {
            ScopeDecl::Var(v) => {
                if m.visibility == Visibility::Private && v.is_const {
                    if let Some(text) = literal_text(v.init.as_ref()) {
                        info.const_inlines.insert(v.name.node.clone(), text);
                    }
                }
                info.variables.push(v.clone());
            }
            ScopeDecl::Function(f) => {
                info.functions.push(f.name.node.clone());
                let mut sym =
                    function_symbol(path, f, index, m.visibility == Visibility::Public);
                sym.name = qualified.clone();
                out.symbols.push(sym);
                let used = scope_vars_used(&f.body.stmts);
                for var in used {
                    info.var_users
                        .entry(var)
                        .or_default()
                        .insert(f.name.node.clone());
                }
            }
            ScopeDecl::Enum(e) => collect_enum(path, e, index, out),
            ScopeDecl::Register(r) => {
                collect_register(path, r, Some(&s.name.node), index, out)
            }
            // Bitmaps and structs were taken in pass 1.
            ScopeDecl::Bitmap(_) | ScopeDecl::Struct(_) => {}
        }
    }

    out.scopes.insert(s.name.node.clone(), info);
}

fn member_name(decl: &ScopeDecl) -> (String, Span) {
    match decl {
        ScopeDecl::Var(v) => (v.name.node.clone(), v.span),
        ScopeDecl::Function(f) => (f.name.node.clone(), f.span),
        ScopeDecl::Struct(s) => (s.name.node.clone(), s.span),
        ScopeDecl::Enum(e) => (e.name.node.clone(), e.span),
        ScopeDecl::Bitmap(b) => (b.name.node.clone(), b.span),
        ScopeDecl::Register(r) => (r.name.node.clone(), r.span),
    }
}

fn literal_text(init: Option<&Expr>) -> Option<String> {
    match init.map(|e| &e.kind) {
        Some(ExprKind::IntLit(text)) => Some(text.clone()),
        Some(ExprKind::FloatLit(text)) => Some(text.clone()),
        Some(ExprKind::BoolLit(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// Names referenced through `this.` anywhere in a statement list.
fn scope_vars_used(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    for stmt in stmts {
        scope_vars_in_stmt(stmt, &mut used);
    }
    used
}

fn scope_vars_in_stmt(stmt: &Stmt, used: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Var(v) => {
            if let Some(init) = &v.init {
                scope_vars_in_expr(init, used);
            }
        }
        Stmt::Assign(a) => {
            scope_vars_in_expr(&a.target, used);
            scope_vars_in_expr(&a.value, used);
        }
        Stmt::Expr(e) => scope_vars_in_expr(e, used),
        Stmt::If(s) => {
            scope_vars_in_expr(&s.cond, used);
            for st in &s.then_block.stmts {
                scope_vars_in_stmt(st, used);
            }
            if let Some(arm) = &s.else_block {
                match arm.as_ref() {
                    cnx_ast::ElseArm::Else(b) => {
                        for st in &b.stmts {
                            scope_vars_in_stmt(st, used);
                        }
                    }
                    cnx_ast::ElseArm::ElseIf(i) => {
                        scope_vars_in_stmt(&Stmt::If(i.clone()), used)
                    }
                }
            }
        }
        Stmt::While(s) => {
            scope_vars_in_expr(&s.cond, used);
            for st in &s.body.stmts {
                scope_vars_in_stmt(st, used);
            }
        }
        Stmt::DoWhile(s) => {
            scope_vars_in_expr(&s.cond, used);
            for st in &s.body.stmts {
                scope_vars_in_stmt(st, used);
            }
        }
        Stmt::For(s) => {
            if let Some(init) = &s.init {
                scope_vars_in_stmt(init, used);
            }
            if let Some(cond) = &s.cond {
                scope_vars_in_expr(cond, used);
            }
            if let Some(update) = &s.update {
                scope_vars_in_stmt(update, used);
            }
            for st in &s.body.stmts {
                scope_vars_in_stmt(st, used);
            }
        }
        Stmt::Switch(s) => {
            scope_vars_in_expr(&s.scrutinee, used);
            for c in &s.cases {
                scope_vars_in_expr(&c.label, used);
                for st in &c.body.stmts {
                    scope_vars_in_stmt(st, used);
                }
            }
            if let Some(d) = &s.default {
                for st in &d.stmts {
                    scope_vars_in_stmt(st, used);
                }
            }
        }
        Stmt::Critical(s) => {
            for st in &s.body.stmts {
                scope_vars_in_stmt(st, used);
            }
        }
        Stmt::Return(r) => {
            if let Some(v) = &r.value {
                scope_vars_in_expr(v, used);
            }
        }
        Stmt::Block(b) => {
            for st in &b.stmts {
                scope_vars_in_stmt(st, used);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn scope_vars_in_expr(expr: &Expr, used: &mut BTreeSet<String>) {
    match &expr.kind {
        ExprKind::Member { base, member } => {
            if matches!(base.kind, ExprKind::This(_)) {
                used.insert(member.node.clone());
            } else {
                scope_vars_in_expr(base, used);
            }
        }
        ExprKind::Index { base, args } => {
            scope_vars_in_expr(base, used);
            for a in args {
                scope_vars_in_expr(a, used);
            }
        }
        ExprKind::Call { callee, args } => {
            scope_vars_in_expr(callee, used);
            for a in args {
                scope_vars_in_expr(a, used);
            }
        }
        ExprKind::Unary { expr, .. } => scope_vars_in_expr(expr, used),
        ExprKind::Binary { left, right, .. } | ExprKind::Checked { left, right, .. } => {
            scope_vars_in_expr(left, used);
            scope_vars_in_expr(right, used);
        }
        ExprKind::Paren(inner) => scope_vars_in_expr(inner, used),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnx_parse::parse_source;

    fn collect(src: &str) -> CollectedUnit {
        let unit = parse_source(src).expect("parse");
        let index = LineIndex::new(src);
        collect_unit("test.cnx", &unit, &index)
    }

    #[test]
    fn bitmap_fields_get_cumulative_offsets() {
        let got = collect("bitmap8 F { a, b[3], c[4] }");
        assert!(got.errors.is_empty());
        let f = &got.bitmaps["F"];
        assert_eq!(f.field("a").map(|x| (x.offset, x.width)), Some((0, 1)));
        assert_eq!(f.field("b").map(|x| (x.offset, x.width)), Some((1, 3)));
        assert_eq!(f.field("c").map(|x| (x.offset, x.width)), Some((4, 4)));
    }

    #[test]
    fn bitmap_width_mismatch_is_error() {
        let got = collect("bitmap8 F { a, b[3] }");
        assert_eq!(got.errors.len(), 1);
        assert!(got.errors[0].message.contains("4 bits"));
    }

    #[test]
    fn negative_enum_value_is_error() {
        let got = collect("enum E { A <- -1 }");
        assert_eq!(got.errors.len(), 1);
        assert!(got.errors[0].message.contains("negative"));
    }

    #[test]
    fn enum_values_auto_increment() {
        let got = collect("enum E : u16 { A, B <- 5, C }");
        let e = &got.enums["E"];
        assert_eq!(e.bits, Some(16));
        assert_eq!(e.members, vec![
            ("A".to_string(), 0),
            ("B".to_string(), 5),
            ("C".to_string(), 6),
        ]);
    }

    #[test]
    fn duplicate_scope_member_is_error() {
        let got = collect("scope M { u32 x; fn x() -> void { } }");
        assert_eq!(got.errors.len(), 1);
        assert!(got.errors[0].message.contains("duplicate member 'x'"));
    }

    #[test]
    fn scope_usage_map_tracks_this_references() {
        let src = "scope M { private u32 counter; private u32 shared; \
                   public fn inc() -> void { this.counter <- this.counter + 1; this.shared <- 0; } \
                   public fn get() -> u32 { return this.shared; } }";
        let got = collect(src);
        let m = &got.scopes["M"];
        assert_eq!(m.sole_user("counter"), Some("inc"));
        assert_eq!(m.sole_user("shared"), None);
    }

    #[test]
    fn private_const_literal_is_recorded_for_inlining() {
        let got = collect("scope M { private const u32 LIMIT <- 42; public fn f() -> u32 { return this.LIMIT; } }");
        let m = &got.scopes["M"];
        assert_eq!(m.const_inlines.get("LIMIT").map(String::as_str), Some("42"));
    }

    #[test]
    fn string_struct_field_reserves_nul_byte() {
        let got = collect("struct Person { string<31> name; u8 age; }");
        let fields = &got.structs["Person"];
        assert_eq!(fields[0].dims, vec![32]);
    }

    #[test]
    fn scope_register_is_attributed_to_scope() {
        let got = collect(
            "scope Hal { public register UART @ 0x4000_0000 { DR: rw u32 @ 0x0; } }",
        );
        assert_eq!(got.register_scopes.get("UART").map(String::as_str), Some("Hal"));
        assert_eq!(got.registers["UART"].address, 0x4000_0000);
    }
}
