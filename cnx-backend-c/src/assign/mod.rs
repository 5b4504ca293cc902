#![forbid(unsafe_code)]

mod classify;
mod handlers;
mod lvalue;

pub use classify::{classify, AssignmentContext, AssignmentKind};
pub use lvalue::{gen_lvalue, LValue};

use cnx_ast::AssignStmt;

use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::Emitted;

/// Generate one assignment statement: build the context once, classify
/// it, and dispatch to the handler for its kind.
pub fn gen_assign(ctx: &mut EmitCtx, stmt: &AssignStmt) -> Result<Emitted, GeneratorError> {
    let acx = AssignmentContext::build(ctx, stmt);
    let kind = classify(ctx, &acx);
    handlers::dispatch(ctx, &acx, kind)
}
