#![forbid(unsafe_code)]

mod calls;
mod div_zero;
mod float_mod;
mod init;
mod null_check;
mod param_naming;
mod struct_fields;

use cnx_ast::{LineIndex, Unit};
use cnx_symbols::SymbolTable;

use crate::comments::{extract_comments, validate_comments};
use crate::error::AnalyzerDiagnostic;

pub struct AnalyzerInput<'a> {
    pub unit: &'a Unit,
    pub src: &'a str,
    pub index: &'a LineIndex,
    pub table: &'a SymbolTable,
}

/// Run the analyzer suite in its fixed order.
///
/// The unit is aborted at the first analyzer that reports anything; the
/// order is part of the contract because later analyzers assume the
/// invariants earlier ones establish. Each analyzer enumerates all of its
/// own findings.
pub fn analyze_unit(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let passes: [fn(&AnalyzerInput) -> Vec<AnalyzerDiagnostic>; 8] = [
        param_naming::check,
        struct_fields::check,
        init::check,
        calls::check,
        null_check::check,
        div_zero::check,
        float_mod::check,
        comment_pass,
    ];

    for pass in passes {
        let diagnostics = pass(input);
        if !diagnostics.is_empty() {
            return diagnostics;
        }
    }

    Vec::new()
}

fn comment_pass(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    validate_comments(&extract_comments(input.src))
}
