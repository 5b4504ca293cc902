#![forbid(unsafe_code)]

use crate::error::{AnalyzerDiagnostic, CODE_STRUCT_FIELD};
use crate::walk::structs_of;

use super::AnalyzerInput;

pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    for def in structs_of(input.unit) {
        for field in &def.fields {
            if field.name.node == "length" {
                let (line, column) = input.index.span_line_col(field.name.span);
                diagnostics.push(AnalyzerDiagnostic {
                    code: CODE_STRUCT_FIELD,
                    line,
                    column,
                    message: format!(
                        "field 'length' in struct '{}' is reserved for bounded containers",
                        def.name.node
                    ),
                });
            }
        }
    }

    diagnostics
}
