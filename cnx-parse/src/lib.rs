#![forbid(unsafe_code)]

mod error;
mod parser;

pub use error::ParseError;
pub use parser::{parse_plain_int, Parser};

use cnx_ast::Unit;
use cnx_lex::Lexer;

/// Lex and parse one source unit.
pub fn parse_source(src: &str) -> Result<Unit, ParseError> {
    let tokens = Lexer::new(src).lex().map_err(|e| ParseError {
        message: e.message,
        span: e.span,
    })?;
    Parser::new(&tokens).parse_unit()
}
