#![forbid(unsafe_code)]

mod analyze;
mod comments;
mod error;
mod types;
mod walk;

pub use analyze::{analyze_unit, AnalyzerInput};
pub use comments::{extract_comments, validate_comments, Comment, CommentKind};
pub use error::{
    AnalyzerDiagnostic, TypeError, CODE_CALL_BEFORE_DEF, CODE_COMMENT_NESTED, CODE_COMMENT_SPLICE,
    CODE_DIV_ZERO, CODE_FLOAT_MOD, CODE_MOD_ZERO, CODE_NULL_CHECK, CODE_PARAM_NAMING,
    CODE_RECURSION, CODE_STRUCT_FIELD, CODE_UNINITIALIZED,
};
pub use types::{
    is_narrowing, is_sign_conversion, is_zero_literal, literal_fits, literal_info, literal_type,
    type_limits, validate_conversion, LiteralInfo, OverflowBehavior, TypeInfo, TypeRegistry,
};
pub use walk::{
    functions_of, stmt_exprs, structs_of, unparen, var_decls_of, walk_expr, walk_stmt,
    walk_unit_exprs,
};
