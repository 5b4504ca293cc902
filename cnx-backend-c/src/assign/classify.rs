#![forbid(unsafe_code)]

use cnx_ast::{AssignOp, AssignStmt, BinOp, Expr, ExprKind, Span};
use cnx_core::{unparen, OverflowBehavior};

use crate::ctx::EmitCtx;
use crate::expr::{expr_type, register_path};

/// Facts about one assignment, computed once from the target L-value and
/// the R-value and immutable afterward.
#[derive(Clone, Debug)]
pub struct AssignmentContext {
    pub span: Span,
    pub target: Expr,
    pub value: Expr,
    pub op: AssignOp,
    /// Identifiers along the target path, outermost first (`this` and
    /// `global` excluded).
    pub idents: Vec<String>,
    /// Subscript argument counts along the path, innermost last.
    pub subscript_arity: Vec<usize>,
    pub has_this: bool,
    pub has_global: bool,
    pub has_member_access: bool,
    pub has_array_access: bool,
    pub is_compound: bool,
    pub is_simple_identifier: bool,
}

impl AssignmentContext {
    pub fn build(_ctx: &EmitCtx, stmt: &AssignStmt) -> Self {
        let mut idents = Vec::new();
        let mut subscript_arity = Vec::new();
        let mut has_this = false;
        let mut has_global = false;
        let mut has_member_access = false;
        let mut has_array_access = false;

        fn walk(
            expr: &Expr,
            idents: &mut Vec<String>,
            arity: &mut Vec<usize>,
            has_this: &mut bool,
            has_global: &mut bool,
            has_member: &mut bool,
            has_array: &mut bool,
        ) {
            match &expr.kind {
                ExprKind::Ident(name) => idents.push(name.node.clone()),
                ExprKind::This(_) => *has_this = true,
                ExprKind::Global(_) => *has_global = true,
                ExprKind::Member { base, member } => {
                    *has_member = true;
                    walk(base, idents, arity, has_this, has_global, has_member, has_array);
                    idents.push(member.node.clone());
                }
                ExprKind::Index { base, args } => {
                    *has_array = true;
                    arity.push(args.len());
                    walk(base, idents, arity, has_this, has_global, has_member, has_array);
                }
                ExprKind::Paren(inner) => {
                    walk(inner, idents, arity, has_this, has_global, has_member, has_array)
                }
                _ => {}
            }
        }

        walk(
            &stmt.target,
            &mut idents,
            &mut subscript_arity,
            &mut has_this,
            &mut has_global,
            &mut has_member_access,
            &mut has_array_access,
        );

        let is_simple_identifier =
            !has_this && !has_global && !has_member_access && !has_array_access && idents.len() == 1;

        Self {
            span: stmt.span,
            target: stmt.target.clone(),
            value: stmt.value.clone(),
            op: stmt.op,
            idents,
            subscript_arity,
            has_this,
            has_global,
            has_member_access,
            has_array_access,
            is_compound: stmt.op.is_compound(),
            is_simple_identifier,
        }
    }
}

/// The finite set of L-value-plus-operator shapes; one handler per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    // Bitmap field writes, by backing storage and field width.
    BitmapFieldBool,
    BitmapFieldWide,
    StructBitmapFieldBool,
    StructBitmapFieldWide,
    RegisterBitmapFieldBool,
    RegisterBitmapFieldWide,
    ScopedRegisterBitmapFieldBool,
    ScopedRegisterBitmapFieldWide,
    BitmapArrayElementField,

    // Member access with subscripts.
    MultiDimArrayElement,
    RegisterMemberBit,
    RegisterMemberBitRange,

    // Prefixed targets.
    GlobalSimple,
    GlobalMember,
    GlobalBitRange,
    ThisMember,
    ThisMemberBit,
    ThisMemberBitRange,

    // Simple array / bit access.
    ArrayElement,
    ArraySlice,
    ScalarBit,
    ScalarBitRange,

    // Compound with special overflow semantics.
    AtomicCompound,
    ClampCompound,

    // Strings.
    StringCopy,
    StringConcat,
    StringSubstring,

    // Registers without subscripts.
    RegisterMember,
    ScopedRegisterMember,

    // Fallbacks.
    MemberChain,
    Simple,
}

/// Priority-ordered classification; the first matching rule wins.
pub fn classify(ctx: &EmitCtx, acx: &AssignmentContext) -> AssignmentKind {
    let target = unparen(&acx.target);

    // 1. Bitmap field writes.
    if let ExprKind::Member { base, member } = &target.kind {
        if let Some(kind) = classify_bitmap_field(ctx, base, &member.node) {
            return kind;
        }
    }

    // 2. Member access with subscripts.
    if let ExprKind::Index { base, args } = &target.kind {
        let inner = unparen(base);
        if matches!(inner.kind, ExprKind::Index { .. }) {
            return AssignmentKind::MultiDimArrayElement;
        }
        if register_path(ctx, inner).is_some() {
            return if args.len() == 1 {
                AssignmentKind::RegisterMemberBit
            } else {
                AssignmentKind::RegisterMemberBitRange
            };
        }
    }

    // 3. Prefix patterns. Bounded-string targets keep their own kinds
    // even behind a prefix.
    let target_is_string = expr_type(ctx, target).map(|t| t.is_string()).unwrap_or(false);
    if acx.has_global && !target_is_string {
        if let ExprKind::Index { args, .. } = &target.kind {
            if args.len() == 2 {
                return AssignmentKind::GlobalBitRange;
            }
        }
        if acx.idents.len() == 1 && !acx.has_array_access {
            return AssignmentKind::GlobalSimple;
        }
        if !acx.has_array_access {
            return AssignmentKind::GlobalMember;
        }
    }
    if acx.has_this && !target_is_string {
        if register_target_kind(ctx, target).is_some() {
            // `this.REG.MEMBER` falls through to the register rules below.
        } else if let ExprKind::Index { base, args } = &target.kind {
            if scalar_base(ctx, base) {
                return if args.len() == 1 {
                    AssignmentKind::ThisMemberBit
                } else {
                    AssignmentKind::ThisMemberBitRange
                };
            }
        } else if !acx.has_array_access && acx.idents.len() == 1 {
            return AssignmentKind::ThisMember;
        }
    }

    // Registers without subscripts (plain or scope-prefixed).
    if let Some(kind) = register_target_kind(ctx, target) {
        return kind;
    }

    // 4. Simple array / bit access.
    if let ExprKind::Index { base, args } = &target.kind {
        if scalar_base(ctx, base) {
            return if args.len() == 1 {
                AssignmentKind::ScalarBit
            } else {
                AssignmentKind::ScalarBitRange
            };
        }
        return if args.len() == 1 {
            AssignmentKind::ArrayElement
        } else {
            AssignmentKind::ArraySlice
        };
    }

    // 5. Atomic / overflow compound.
    if acx.is_compound {
        let ty = expr_type(ctx, target);
        if let Some(ty) = &ty {
            if ty.is_atomic {
                return AssignmentKind::AtomicCompound;
            }
            let clamping = matches!(acx.op, AssignOp::Add | AssignOp::Sub | AssignOp::Mul);
            if clamping && ty.is_integer() && ty.overflow == OverflowBehavior::Clamp {
                return AssignmentKind::ClampCompound;
            }
        }
    }

    // 6. String assignments.
    if expr_type(ctx, target).map(|t| t.is_string()).unwrap_or(false) {
        let value = unparen(&acx.value);
        if let ExprKind::Binary { op: BinOp::Add, .. } = &value.kind {
            return AssignmentKind::StringConcat;
        }
        if let ExprKind::Call { callee, .. } = &value.kind {
            if matches!(&unparen(callee).kind, ExprKind::Ident(n) if n.node == "substring") {
                return AssignmentKind::StringSubstring;
            }
        }
        return AssignmentKind::StringCopy;
    }

    // 7. Member chain fallback.
    if acx.has_member_access || acx.has_this || acx.has_global {
        return AssignmentKind::MemberChain;
    }

    // 8. Simple identifier.
    AssignmentKind::Simple
}

/// Target is `var.field` / `struct.member.field` / `REG.MEMBER.field` /
/// `arr[i].field` where the base carries a bitmap type.
fn classify_bitmap_field(ctx: &EmitCtx, base: &Expr, field: &str) -> Option<AssignmentKind> {
    let inner = unparen(base);

    // Register member with a bitmap binding.
    if let Some((reg, member)) = register_path(ctx, inner) {
        let m = ctx.collected.registers.get(&reg)?.member(&member)?.clone();
        let bm = ctx.collected.bitmaps.get(m.bitmap.as_ref()?)?;
        let f = bm.field(field)?;
        let scoped = ctx.collected.register_scopes.contains_key(&reg);
        return Some(match (scoped, f.width) {
            (false, 1) => AssignmentKind::RegisterBitmapFieldBool,
            (false, _) => AssignmentKind::RegisterBitmapFieldWide,
            (true, 1) => AssignmentKind::ScopedRegisterBitmapFieldBool,
            (true, _) => AssignmentKind::ScopedRegisterBitmapFieldWide,
        });
    }

    let base_ty = expr_type(ctx, inner)?;
    let bm = ctx.collected.bitmaps.get(&base_ty.name)?;
    let f = bm.field(field)?;
    let wide = f.width > 1;

    Some(match &inner.kind {
        ExprKind::Ident(_) => {
            if wide {
                AssignmentKind::BitmapFieldWide
            } else {
                AssignmentKind::BitmapFieldBool
            }
        }
        ExprKind::Index { .. } => AssignmentKind::BitmapArrayElementField,
        // `this.flags.f` counts as a plain bitmap write; a struct member
        // carrying a bitmap gets its own kinds.
        ExprKind::Member { base: prefix, .. }
            if matches!(unparen(prefix).kind, ExprKind::This(_) | ExprKind::Global(_)) =>
        {
            if wide {
                AssignmentKind::BitmapFieldWide
            } else {
                AssignmentKind::BitmapFieldBool
            }
        }
        ExprKind::Member { .. } => {
            if wide {
                AssignmentKind::StructBitmapFieldWide
            } else {
                AssignmentKind::StructBitmapFieldBool
            }
        }
        _ => AssignmentKind::BitmapFieldWide,
    })
}

fn register_target_kind(ctx: &EmitCtx, target: &Expr) -> Option<AssignmentKind> {
    let (reg, _member) = register_path(ctx, target)?;
    Some(if ctx.collected.register_scopes.contains_key(&reg) {
        AssignmentKind::ScopedRegisterMember
    } else {
        AssignmentKind::RegisterMember
    })
}

/// Subscripting a scalar integer (bit access) rather than an array.
fn scalar_base(ctx: &EmitCtx, base: &Expr) -> bool {
    expr_type(ctx, unparen(base))
        .map(|t| !t.is_array && !t.is_string() && (t.is_integer() || t.is_bitmap))
        .unwrap_or(false)
}
