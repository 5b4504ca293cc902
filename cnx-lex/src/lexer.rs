#![forbid(unsafe_code)]

use cnx_ast::{span_between, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(cnx::lex))]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum RawToken {
    #[token("fn")]
    KwFn,
    #[token("scope")]
    KwScope,
    #[token("struct")]
    KwStruct,
    #[token("enum")]
    KwEnum,
    #[token("register")]
    KwRegister,
    #[token("public")]
    KwPublic,
    #[token("private")]
    KwPrivate,
    #[token("const")]
    KwConst,
    #[token("atomic")]
    KwAtomic,
    #[token("wrap")]
    KwWrap,
    #[token("this")]
    KwThis,
    #[token("global")]
    KwGlobal,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("while")]
    KwWhile,
    #[token("do")]
    KwDo,
    #[token("for")]
    KwFor,
    #[token("switch")]
    KwSwitch,
    #[token("case")]
    KwCase,
    #[token("default")]
    KwDefault,
    #[token("critical")]
    KwCritical,
    #[token("return")]
    KwReturn,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,

    #[regex(r"bitmap(8|16|24|32|64)", |lex| lex.slice()[6..].parse::<u32>().ok(), priority = 10)]
    Bitmap(Option<u32>),

    #[regex(r#"#include[ \t]+("[^"\n]*"|<[^>\n]*>)"#, parse_include)]
    Include(Option<(String, bool)>),

    #[token("+<-")]
    AddAssign,
    #[token("-<-")]
    SubAssign,
    #[token("*<-")]
    MulAssign,
    #[token("/<-")]
    DivAssign,
    #[token("%<-")]
    ModAssign,
    #[token("&<-")]
    AndAssign,
    #[token("|<-")]
    OrAssign,
    #[token("^<-")]
    XorAssign,
    #[token("<-")]
    Assign,

    #[token("->")]
    Arrow,

    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,

    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("@")]
    At,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // Literal spellings are preserved: the type resolver owns suffix and
    // radix handling, and the code generator folds on the original text.
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*(f32|f64)?", |lex| lex.slice().to_string())]
    Float(String),

    #[regex(r"0b[01_]+([ui](8|16|32|64))?", |lex| lex.slice().to_string())]
    #[regex(r"0x[0-9a-fA-F_]+([ui](8|16|32|64))?", |lex| lex.slice().to_string())]
    #[regex(r"[0-9][0-9_]*([ui](8|16|32|64))?", |lex| lex.slice().to_string())]
    Int(String),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    Str(Option<String>),

    #[regex(r"'([^'\\\n]|\\.)'", parse_char)]
    Char(Option<char>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_include(lex: &mut logos::Lexer<RawToken>) -> Option<(String, bool)> {
    let s = lex.slice();
    let arg = s["#include".len()..].trim_start();
    let system = arg.starts_with('<');
    let inner = arg.get(1..arg.len().saturating_sub(1))?;
    Some((inner.to_string(), system))
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }

    Some(out)
}

fn parse_char(lex: &mut logos::Lexer<RawToken>) -> Option<char> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut chars = inner.chars();
    let first = chars.next()?;
    if first != '\\' {
        return Some(first);
    }
    match chars.next()? {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\'' => Some('\''),
        '\\' => Some('\\'),
        _ => None,
    }
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);

            let kind = match raw {
                Ok(RawToken::KwFn) => TokenKind::KwFn,
                Ok(RawToken::KwScope) => TokenKind::KwScope,
                Ok(RawToken::KwStruct) => TokenKind::KwStruct,
                Ok(RawToken::KwEnum) => TokenKind::KwEnum,
                Ok(RawToken::KwRegister) => TokenKind::KwRegister,
                Ok(RawToken::KwPublic) => TokenKind::KwPublic,
                Ok(RawToken::KwPrivate) => TokenKind::KwPrivate,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwAtomic) => TokenKind::KwAtomic,
                Ok(RawToken::KwWrap) => TokenKind::KwWrap,
                Ok(RawToken::KwThis) => TokenKind::KwThis,
                Ok(RawToken::KwGlobal) => TokenKind::KwGlobal,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwDo) => TokenKind::KwDo,
                Ok(RawToken::KwFor) => TokenKind::KwFor,
                Ok(RawToken::KwSwitch) => TokenKind::KwSwitch,
                Ok(RawToken::KwCase) => TokenKind::KwCase,
                Ok(RawToken::KwDefault) => TokenKind::KwDefault,
                Ok(RawToken::KwCritical) => TokenKind::KwCritical,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwBreak) => TokenKind::KwBreak,
                Ok(RawToken::KwContinue) => TokenKind::KwContinue,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,

                Ok(RawToken::Bitmap(Some(w))) => TokenKind::Bitmap(w),
                Ok(RawToken::Bitmap(None)) => {
                    return Err(LexError {
                        message: "invalid bitmap width".to_string(),
                        span,
                    });
                }

                Ok(RawToken::Include(Some((path, system)))) => {
                    TokenKind::Include { path, system }
                }
                Ok(RawToken::Include(None)) => {
                    return Err(LexError {
                        message: "malformed #include directive".to_string(),
                        span,
                    });
                }

                Ok(RawToken::Assign) => TokenKind::Assign,
                Ok(RawToken::AddAssign) => TokenKind::AddAssign,
                Ok(RawToken::SubAssign) => TokenKind::SubAssign,
                Ok(RawToken::MulAssign) => TokenKind::MulAssign,
                Ok(RawToken::DivAssign) => TokenKind::DivAssign,
                Ok(RawToken::ModAssign) => TokenKind::ModAssign,
                Ok(RawToken::AndAssign) => TokenKind::AndAssign,
                Ok(RawToken::OrAssign) => TokenKind::OrAssign,
                Ok(RawToken::XorAssign) => TokenKind::XorAssign,

                Ok(RawToken::Arrow) => TokenKind::Arrow,

                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Gt) => TokenKind::Gt,
                Ok(RawToken::Shl) => TokenKind::Shl,
                Ok(RawToken::Shr) => TokenKind::Shr,

                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::Tilde) => TokenKind::Tilde,

                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Caret) => TokenKind::Caret,

                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::At) => TokenKind::At,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::Int(s)) => TokenKind::Int(s),
                Ok(RawToken::Float(s)) => TokenKind::Float(s),
                Ok(RawToken::Str(Some(s))) => TokenKind::Str(s),
                Ok(RawToken::Str(None)) => {
                    return Err(LexError {
                        message: "invalid string literal escape".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Char(Some(c))) => TokenKind::Char(c),
                Ok(RawToken::Char(None)) => {
                    return Err(LexError {
                        message: "invalid character literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),

                Err(_) => {
                    return Err(LexError {
                        message: "unexpected token".to_string(),
                        span,
                    });
                }
            };

            tokens.push(Token { kind, span });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
        });

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .expect("lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration_with_arrow_assign() {
        let k = kinds("u32 a <- 10;");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("u32".to_string()),
                TokenKind::Ident("a".to_string()),
                TokenKind::Assign,
                TokenKind::Int("10".to_string()),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_assign_wins_over_plus() {
        let k = kinds("x +<- 1;");
        assert_eq!(k[1], TokenKind::AddAssign);
    }

    #[test]
    fn preserves_literal_spelling() {
        let k = kinds("0x1F_u8 0b1010 42u64 1.5f32");
        assert_eq!(
            k[..4],
            [
                TokenKind::Int("0x1F_u8".to_string()),
                TokenKind::Int("0b1010".to_string()),
                TokenKind::Int("42u64".to_string()),
                TokenKind::Float("1.5f32".to_string()),
            ]
        );
    }

    #[test]
    fn include_directive_is_one_token() {
        let k = kinds("#include \"board.h\"\n#include <stdio.h>");
        assert_eq!(
            k[0],
            TokenKind::Include {
                path: "board.h".to_string(),
                system: false
            }
        );
        assert_eq!(
            k[1],
            TokenKind::Include {
                path: "stdio.h".to_string(),
                system: true
            }
        );
    }

    #[test]
    fn comments_are_skipped() {
        let k = kinds("// line\nu8 x; /* block */ u8 y;");
        assert_eq!(k.len(), 7);
        assert_eq!(k[0], TokenKind::Ident("u8".to_string()));
    }

    #[test]
    fn bitmap_keyword_carries_width() {
        let k = kinds("bitmap8 F bitmap64 G");
        assert_eq!(k[0], TokenKind::Bitmap(8));
        assert_eq!(k[2], TokenKind::Bitmap(64));
    }
}
