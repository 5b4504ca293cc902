#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub type Ident = Spanned<String>;

/// Byte-offset to line/column translation for one source text.
///
/// Lines and columns are 1-based, matching the diagnostic format
/// `error[<code>]: <message> at line:column`.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(n) => n,
            Err(n) => n - 1,
        };
        let col = offset - self.line_starts[line];
        (line as u32 + 1, col as u32 + 1)
    }

    pub fn span_line_col(&self, span: Span) -> (u32, u32) {
        self.line_col(span.offset())
    }
}

/// One parsed source unit (a single `.cnx` file).
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub items: Vec<Item>,
}

/// Bit width of a builtin scalar type name.
pub fn builtin_bit_width(name: &str) -> Option<u32> {
    match name {
        "u8" | "i8" | "bool" => Some(8),
        "u16" | "i16" => Some(16),
        "u32" | "i32" | "f32" => Some(32),
        "u64" | "i64" | "f64" => Some(64),
        _ => None,
    }
}

pub fn is_builtin_type(name: &str) -> bool {
    builtin_bit_width(name).is_some() || name == "void" || name == "string"
}

pub fn is_unsigned_type(name: &str) -> bool {
    matches!(name, "u8" | "u16" | "u32" | "u64")
}

pub fn is_signed_type(name: &str) -> bool {
    matches!(name, "i8" | "i16" | "i32" | "i64")
}

pub fn is_float_type(name: &str) -> bool {
    matches!(name, "f32" | "f64")
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Include(Include),
    Scope(ScopeDef),
    Struct(StructDef),
    Enum(EnumDef),
    Bitmap(BitmapDef),
    Register(RegisterDef),
    Function(FunctionDef),
    Var(VarDecl),
}

/// `#include "header.h"` or `#include <header.h>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Include {
    pub span: Span,
    pub path: String,
    pub system: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScopeDef {
    pub span: Span,
    pub name: Ident,
    pub members: Vec<ScopeMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScopeMember {
    pub span: Span,
    pub visibility: Visibility,
    pub decl: ScopeDecl,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScopeDecl {
    Var(VarDecl),
    Function(FunctionDef),
    Struct(StructDef),
    Enum(EnumDef),
    Bitmap(BitmapDef),
    Register(RegisterDef),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub span: Span,
    pub name: Ident,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub span: Span,
    pub ty: TypeRef,
    pub name: Ident,
    pub dims: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub span: Span,
    pub name: Ident,
    /// Backing type for `enum E : u16` style declarations.
    pub backing: Option<TypeRef>,
    pub members: Vec<EnumMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumMember {
    pub span: Span,
    pub name: Ident,
    /// Explicit value; members without one auto-increment from the previous.
    pub value: Option<Spanned<i64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitmapDef {
    pub span: Span,
    pub name: Ident,
    /// Backing width in bits: 8, 16, 24, 32, or 64.
    pub width: u32,
    pub fields: Vec<BitmapField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BitmapField {
    pub span: Span,
    pub name: Ident,
    /// Declared width; a bare field name is one bit wide.
    pub width: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    Write1Clear,
    Write1Set,
}

impl Access {
    pub fn keyword(self) -> &'static str {
        match self {
            Access::ReadOnly => "ro",
            Access::WriteOnly => "wo",
            Access::ReadWrite => "rw",
            Access::Write1Clear => "w1c",
            Access::Write1Set => "w1s",
        }
    }

    /// Writing a literal zero through these modes is always a mistake.
    pub fn forbids_zero_write(self) -> bool {
        matches!(
            self,
            Access::WriteOnly | Access::Write1Clear | Access::Write1Set
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterDef {
    pub span: Span,
    pub name: Ident,
    pub address: u64,
    pub members: Vec<RegisterMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterMember {
    pub span: Span,
    pub name: Ident,
    pub access: Access,
    pub ty: TypeRef,
    pub offset: u64,
    pub bitmap: Option<Ident>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub ty: TypeRef,
    pub name: Ident,
    pub dims: Vec<u32>,
}

/// Integer overflow behavior for a declared variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    Clamp,
    Wrap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub is_const: bool,
    pub is_atomic: bool,
    pub overflow: Option<Overflow>,
    pub ty: TypeRef,
    pub name: Ident,
    pub dims: Vec<u32>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    /// Base type name: a builtin (`u8` .. `f64`, `bool`, `void`, `string`)
    /// or a user/C type name.
    pub name: String,
    /// Capacity for `string<N>`; the emitted buffer reserves N + 1 bytes.
    pub string_capacity: Option<u32>,
}

impl TypeRef {
    pub fn named(span: Span, name: impl Into<String>) -> Self {
        Self {
            span,
            name: name.into(),
            string_capacity: None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.name == "void"
    }

    pub fn is_string(&self) -> bool {
        self.name == "string"
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Var(VarDecl),
    Assign(AssignStmt),
    Expr(Expr),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    For(ForStmt),
    Switch(SwitchStmt),
    Critical(CriticalStmt),
    Return(ReturnStmt),
    Break(Span),
    Continue(Span),
    Block(Block),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var(v) => v.span,
            Stmt::Assign(a) => a.span,
            Stmt::Expr(e) => e.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::DoWhile(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Switch(s) => s.span,
            Stmt::Critical(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(sp) | Stmt::Continue(sp) => *sp,
            Stmt::Block(b) => b.span,
        }
    }
}

/// Assignment operators, source form and C form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignOp {
    pub fn source_str(self) -> &'static str {
        match self {
            AssignOp::Set => "<-",
            AssignOp::Add => "+<-",
            AssignOp::Sub => "-<-",
            AssignOp::Mul => "*<-",
            AssignOp::Div => "/<-",
            AssignOp::Mod => "%<-",
            AssignOp::BitAnd => "&<-",
            AssignOp::BitOr => "|<-",
            AssignOp::BitXor => "^<-",
        }
    }

    pub fn c_str(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
        }
    }

    /// Binary operator a compound assignment expands to, if any.
    pub fn binary_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
            AssignOp::BitAnd => Some(BinOp::BitAnd),
            AssignOp::BitOr => Some(BinOp::BitOr),
            AssignOp::BitXor => Some(BinOp::BitXor),
        }
    }

    pub fn is_compound(self) -> bool {
        self != AssignOp::Set
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    /// The target L-value as an expression tree; the assignment classifier
    /// deconstructs it into an `AssignmentContext`.
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Box<ElseArm>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElseArm {
    Else(Block),
    ElseIf(IfStmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoWhileStmt {
    pub span: Span,
    pub body: Block,
    pub cond: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub span: Span,
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub update: Option<Box<Stmt>>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchStmt {
    pub span: Span,
    pub scrutinee: Expr,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub span: Span,
    pub label: Expr,
    pub body: Block,
}

/// `critical { ... }` wraps the block in interrupt-mask save/restore.
#[derive(Clone, Debug, PartialEq)]
pub struct CriticalStmt {
    pub span: Span,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Integer literal with its original spelling (`0x1F`, `0b101`, `42u64`).
    IntLit(String),
    /// Float literal with its original spelling (`1.5`, `2.0f32`).
    FloatLit(String),
    BoolLit(bool),
    StringLit(String),
    CharLit(char),
    Ident(Ident),
    /// `this` scope-member prefix.
    This(Span),
    /// `global` file-level prefix, used inside scopes.
    Global(Span),
    Member {
        base: Box<Expr>,
        member: Ident,
    },
    /// `base[i]` (element or single bit) or `base[off, width]` (bit range).
    Index {
        base: Box<Expr>,
        args: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Overflow-aware arithmetic (`a +<- b`); lowers to a clamp/panic helper.
    Checked {
        left: Box<Expr>,
        op: CheckedOp,
        right: Box<Expr>,
    },
    Paren(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn c_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn c_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckedOp {
    Add,
    Sub,
    Mul,
}

impl CheckedOp {
    pub fn name(self) -> &'static str {
        match self {
            CheckedOp::Add => "add",
            CheckedOp::Sub => "sub",
            CheckedOp::Mul => "mul",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets() {
        let idx = LineIndex::new("ab\ncd\nef");
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(1), (1, 2));
        assert_eq!(idx.line_col(3), (2, 1));
        assert_eq!(idx.line_col(7), (3, 2));
    }

    #[test]
    fn assign_ops_round_trip_c_forms() {
        assert_eq!(AssignOp::Set.c_str(), "=");
        assert_eq!(AssignOp::Add.source_str(), "+<-");
        assert_eq!(AssignOp::Add.c_str(), "+=");
        assert!(AssignOp::Add.is_compound());
        assert!(!AssignOp::Set.is_compound());
    }

    #[test]
    fn access_mode_zero_write_rule() {
        assert!(Access::WriteOnly.forbids_zero_write());
        assert!(Access::Write1Clear.forbids_zero_write());
        assert!(!Access::ReadWrite.forbids_zero_write());
    }
}
