#![forbid(unsafe_code)]

use crate::error::{AnalyzerDiagnostic, CODE_PARAM_NAMING};
use crate::walk::functions_of;

use super::AnalyzerInput;

/// The `cnx_` prefix and leading double underscores belong to the
/// transpiler and the C implementation respectively.
fn is_reserved(name: &str) -> bool {
    name.starts_with("cnx_") || name.starts_with("__")
}

pub fn check(input: &AnalyzerInput) -> Vec<AnalyzerDiagnostic> {
    let mut diagnostics = Vec::new();

    for (_, func) in functions_of(input.unit) {
        for param in &func.params {
            if is_reserved(&param.name.node) {
                let (line, column) = input.index.span_line_col(param.name.span);
                diagnostics.push(AnalyzerDiagnostic {
                    code: CODE_PARAM_NAMING,
                    line,
                    column,
                    message: format!(
                        "parameter '{}' uses a reserved identifier pattern",
                        param.name.node
                    ),
                });
            }
        }
    }

    diagnostics
}
