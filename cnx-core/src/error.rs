#![forbid(unsafe_code)]

use cnx_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

/// One analyzer finding. Codes are stable per rule so downstream tooling
/// can match on them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerDiagnostic {
    pub code: &'static str,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl AnalyzerDiagnostic {
    pub fn render(&self) -> String {
        format!(
            "error[{}]: {} at {}:{}",
            self.code, self.message, self.line, self.column
        )
    }
}

/// Reserved identifier patterns.
pub const CODE_PARAM_NAMING: &str = "E0100";
/// Struct fields may not be named `length`.
pub const CODE_STRUCT_FIELD: &str = "E0101";
/// Read of a possibly-uninitialized variable.
pub const CODE_UNINITIALIZED: &str = "E0200";
/// Unchecked pointer from a C stdlib function.
pub const CODE_NULL_CHECK: &str = "E0210";
/// Call before definition.
pub const CODE_CALL_BEFORE_DEF: &str = "E0422";
/// Direct recursion.
pub const CODE_RECURSION: &str = "E0423";
/// Division by zero.
pub const CODE_DIV_ZERO: &str = "E0800";
/// Modulo by zero.
pub const CODE_MOD_ZERO: &str = "E0802";
/// `%` with a floating operand.
pub const CODE_FLOAT_MOD: &str = "E0804";
/// Nested comment markers.
pub const CODE_COMMENT_NESTED: &str = "MISRA-3.1";
/// Line-splice backslash ending a line comment.
pub const CODE_COMMENT_SPLICE: &str = "MISRA-3.2";

#[derive(Debug, Error, Diagnostic)]
#[error("type error: {message}")]
#[diagnostic(code(cnx::types))]
pub struct TypeError {
    pub message: String,
    #[label]
    pub span: Span,
}
