#![forbid(unsafe_code)]

use cnx_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwFn,
    KwScope,
    KwStruct,
    KwEnum,
    KwRegister,
    KwPublic,
    KwPrivate,
    KwConst,
    KwAtomic,
    KwWrap,
    KwThis,
    KwGlobal,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwSwitch,
    KwCase,
    KwDefault,
    KwCritical,
    KwReturn,
    KwBreak,
    KwContinue,
    KwTrue,
    KwFalse,

    /// `bitmap8` .. `bitmap64`; the payload is the backing width in bits.
    Bitmap(u32),

    /// `#include "path"` or `#include <path>`, lexed as one directive.
    Include { path: String, system: bool },

    // Assignment operators
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,

    Arrow,

    // Comparison (source equality is a single `=`)
    Eq,
    Neq,
    Le,
    Ge,
    Lt,
    Gt,

    AndAnd,
    OrOr,
    Bang,
    Tilde,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,

    Dot,
    Comma,
    Semi,
    Colon,
    At,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Ident(String),
    /// Integer literal, original spelling preserved (prefix + suffix intact).
    Int(String),
    /// Float literal, original spelling preserved.
    Float(String),
    Str(String),
    Char(char),

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            TokenKind::Int(s) => format!("integer '{s}'"),
            TokenKind::Float(s) => format!("float '{s}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Char(_) => "character literal".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{other:?}"),
        }
    }
}
