#![forbid(unsafe_code)]

use cnx_ast::{Access, AssignOp, Expr, ExprKind};
use cnx_core::{literal_info, unparen, validate_conversion, OverflowBehavior, TypeInfo};

use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::{Effect, Emitted};
use crate::expr::{const_index, expr_type, gen_expr, mask_literal};

use super::classify::{AssignmentContext, AssignmentKind};
use super::lvalue::{gen_lvalue, LValue};

pub fn dispatch(
    ctx: &mut EmitCtx,
    acx: &AssignmentContext,
    kind: AssignmentKind,
) -> Result<Emitted, GeneratorError> {
    use AssignmentKind::*;
    match kind {
        BitmapFieldBool | BitmapFieldWide | StructBitmapFieldBool | StructBitmapFieldWide
        | BitmapArrayElementField => bitmap_field(ctx, acx),
        RegisterBitmapFieldBool | RegisterBitmapFieldWide | ScopedRegisterBitmapFieldBool
        | ScopedRegisterBitmapFieldWide => bitmap_field(ctx, acx),
        MultiDimArrayElement | ArrayElement => array_element(ctx, acx),
        RegisterMemberBit | ScalarBit | ThisMemberBit => bit_write(ctx, acx),
        RegisterMemberBitRange | ScalarBitRange | ThisMemberBitRange | GlobalBitRange => {
            bit_range_write(ctx, acx)
        }
        GlobalSimple | GlobalMember | ThisMember | MemberChain | Simple | ClampCompound => {
            simple(ctx, acx)
        }
        AtomicCompound => atomic_compound(ctx, acx),
        ArraySlice => array_slice(ctx, acx),
        StringCopy => string_copy(ctx, acx),
        StringConcat => string_concat(ctx, acx),
        StringSubstring => string_substring(ctx, acx),
        RegisterMember | ScopedRegisterMember => register_member(ctx, acx),
    }
}

/// The shared read-modify-write template.
fn rmw(storage: &str, off: &str, mask: &str, value: &str) -> String {
    format!("{storage} = ({storage} & ~({mask} << {off})) | ((({value}) & {mask}) << {off});")
}

/// The write-only template: no read-back of the storage.
fn write_only(storage: &str, off: &str, mask: &str, value: &str) -> String {
    format!("{storage} = ((({value}) & {mask}) << {off});")
}

fn is_zero_value(value: &Expr) -> bool {
    match &unparen(value).kind {
        ExprKind::IntLit(text) => literal_info(text).value == Some(0),
        ExprKind::BoolLit(false) => true,
        _ => false,
    }
}

fn forbid_zero_write(
    access: Option<Access>,
    value: &Expr,
    acx: &AssignmentContext,
) -> Result<(), GeneratorError> {
    if let Some(access) = access {
        if access.forbids_zero_write() && is_zero_value(value) {
            return Err(GeneratorError::new(
                format!(
                    "writing 0 through a '{}' register member has no effect",
                    access.keyword()
                ),
                acx.span,
            ));
        }
    }
    Ok(())
}

/// Conversion legality for a plain store.
fn check_assign_types(
    ctx: &EmitCtx,
    target_ty: Option<&TypeInfo>,
    value: &Expr,
) -> Result<(), GeneratorError> {
    let Some(tty) = target_ty else { return Ok(()) };

    if let ExprKind::IntLit(text) = &unparen(value).kind {
        return cnx_core::literal_fits(text, &tty.name, false)
            .map_err(|m| GeneratorError::new(m, value.span));
    }
    if let ExprKind::Unary { op: cnx_ast::UnaryOp::Neg, expr } = &unparen(value).kind {
        if let ExprKind::IntLit(text) = &unparen(expr).kind {
            return cnx_core::literal_fits(text, &tty.name, true)
                .map_err(|m| GeneratorError::new(m, value.span));
        }
    }

    if let Some(folded) = crate::expr::fold_constants(value) {
        let (digits, negated) = match folded.strip_prefix('-') {
            Some(d) => (d, true),
            None => (folded.as_str(), false),
        };
        return cnx_core::literal_fits(digits, &tty.name, negated)
            .map_err(|m| GeneratorError::new(m, value.span));
    }

    let Some(vty) = expr_type(ctx, value) else { return Ok(()) };
    if tty.is_enum && vty.is_enum && tty.name != vty.name {
        return Err(GeneratorError::new(
            format!("cannot assign '{}' value to '{}'", vty.name, tty.name),
            value.span,
        ));
    }
    validate_conversion(&vty, tty).map_err(|m| GeneratorError::new(m, value.span))
}

/// Plain and compound stores; compound on a clamping integer becomes the
/// overflow-safe helper, per the declared overflow behavior.
fn simple(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    let (value, mut effects) = gen_expr(ctx, &acx.value)?;
    effects.extend(lv.effects.iter().cloned());

    if acx.op == AssignOp::Set {
        check_assign_types(ctx, lv.ty.as_ref(), &acx.value)?;
        return Ok((format!("{} = {value};", lv.code), effects));
    }

    if let Some(ty) = &lv.ty {
        let clamping = matches!(acx.op, AssignOp::Add | AssignOp::Sub | AssignOp::Mul);
        if clamping && ty.is_integer() && ty.overflow == OverflowBehavior::Clamp {
            let op = match acx.op {
                AssignOp::Add => cnx_ast::CheckedOp::Add,
                AssignOp::Sub => cnx_ast::CheckedOp::Sub,
                _ => cnx_ast::CheckedOp::Mul,
            };
            effects.push(Effect::Helper {
                op,
                ty: ty.name.clone(),
            });
            return Ok((
                format!(
                    "{} = cnx_clamp_{}_{}({}, {value});",
                    lv.code,
                    op.name(),
                    ty.name,
                    lv.code
                ),
                effects,
            ));
        }
    }

    Ok((format!("{} {} {value};", lv.code, acx.op.c_str()), effects))
}

fn atomic_compound(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    let (value, mut effects) = gen_expr(ctx, &acx.value)?;
    effects.extend(lv.effects.iter().cloned());

    let builtin = match acx.op {
        AssignOp::Add => "__atomic_fetch_add",
        AssignOp::Sub => "__atomic_fetch_sub",
        AssignOp::BitAnd => "__atomic_fetch_and",
        AssignOp::BitOr => "__atomic_fetch_or",
        AssignOp::BitXor => "__atomic_fetch_xor",
        other => {
            return Err(GeneratorError::new(
                format!("'{}' is not supported on atomic variables", other.source_str()),
                acx.span,
            ));
        }
    };
    Ok((
        format!("{builtin}(&{}, {value}, __ATOMIC_SEQ_CST);", lv.code),
        effects,
    ))
}

/// `b.f <- v` in every storage shape: read the backing integer once,
/// write it once.
fn bitmap_field(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let ExprKind::Member { base, member } = &unparen(&acx.target).kind else {
        return Err(GeneratorError::new("expected a bitmap field target", acx.span));
    };

    let lv = gen_lvalue(ctx, base)?;
    let ty = lv
        .ty
        .as_ref()
        .ok_or_else(|| GeneratorError::new("cannot resolve bitmap storage type", acx.span))?;

    // Register members bind a bitmap by name; variables carry one as
    // their type.
    let bm_name = if let Some((reg, rmember)) = crate::expr::register_path(ctx, unparen(base)) {
        ctx.collected.registers[&reg]
            .member(&rmember)
            .and_then(|m| m.bitmap.clone())
            .ok_or_else(|| {
                GeneratorError::new(format!("'{reg}.{rmember}' has no bitmap binding"), acx.span)
            })?
    } else {
        ty.name.clone()
    };

    let bm = ctx
        .collected
        .bitmaps
        .get(&bm_name)
        .cloned()
        .ok_or_else(|| GeneratorError::new(format!("unknown bitmap '{bm_name}'"), acx.span))?;
    let field = bm.field(&member.node).cloned().ok_or_else(|| {
        GeneratorError::new(
            format!("bitmap '{bm_name}' has no field '{}'", member.node),
            member.span,
        )
    })?;

    let (value, mut effects) = gen_expr(ctx, &acx.value)?;
    effects.extend(lv.effects.iter().cloned());

    let backing = cnx_symbols::storage_bits(bm.width);
    let mask = mask_literal(field.width, backing);
    let off = field.offset.to_string();

    // Width checks for literal values.
    if let Some(v) = const_index(&acx.value) {
        if field.width < 64 && v >= (1u128 << field.width) {
            return Err(GeneratorError::new(
                format!(
                    "value {v} does not fit bitmap field '{}' ({} bit(s))",
                    member.node, field.width
                ),
                acx.value.span,
            ));
        }
    }

    let value = if acx.is_compound {
        let read = format!("(({} >> {off}) & {mask})", lv.code);
        let cop = acx
            .op
            .binary_op()
            .map(|b| b.c_str())
            .unwrap_or("+");
        format!("{read} {cop} ({value})")
    } else {
        value
    };

    if let Some(access) = lv.access {
        if access.forbids_zero_write() {
            forbid_zero_write(Some(access), &acx.value, acx)?;
            return Ok((write_only(&lv.code, &off, &mask, &value), effects));
        }
    }

    Ok((rmw(&lv.code, &off, &mask, &value), effects))
}

fn array_element(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    // Compile-time bounds check on literal indices.
    if let ExprKind::Index { base, args } = &unparen(&acx.target).kind {
        if let (Some(bty), Some(n), 1) = (expr_type(ctx, base), args.first().and_then(const_index), args.len())
        {
            if let Some(dim) = bty.dims.first() {
                if n >= u128::from(*dim) {
                    return Err(GeneratorError::new(
                        format!("index {n} out of bounds for array of {dim}"),
                        acx.span,
                    ));
                }
            }
        }
    }
    simple(ctx, acx)
}

/// `x[i] <- v` on a scalar: single-bit read-modify-write.
fn bit_write(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let ExprKind::Index { base, args } = &unparen(&acx.target).kind else {
        return Err(GeneratorError::new("expected a bit target", acx.span));
    };
    let lv = gen_lvalue(ctx, base)?;
    let bits = lv.ty.as_ref().map(|t| t.bits).unwrap_or(32);

    let (bit, mut effects) = gen_expr(ctx, &args[0])?;
    if let Some(n) = const_index(&args[0]) {
        if bits > 0 && n >= u128::from(bits) {
            return Err(GeneratorError::new(
                format!("bit {n} out of range for a {bits}-bit value"),
                acx.span,
            ));
        }
    }
    let (value, fx) = gen_expr(ctx, &acx.value)?;
    effects.extend(fx);
    effects.extend(lv.effects.iter().cloned());

    if let Some(access) = lv.access {
        if access.forbids_zero_write() {
            forbid_zero_write(Some(access), &acx.value, acx)?;
            return Ok((write_only(&lv.code, &bit, "0x1u", &value), effects));
        }
    }
    Ok((rmw(&lv.code, &bit, "0x1u", &value), effects))
}

/// `x[off, w] <- v`: bit-range read-modify-write.
fn bit_range_write(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let ExprKind::Index { base, args } = &unparen(&acx.target).kind else {
        return Err(GeneratorError::new("expected a bit-range target", acx.span));
    };
    if args.len() != 2 {
        return Err(GeneratorError::new("bit range takes [offset, width]", acx.span));
    }
    let lv = gen_lvalue(ctx, base)?;
    let bits = lv.ty.as_ref().map(|t| t.bits).unwrap_or(32);

    let Some(width) = const_index(&args[1]) else {
        return Err(GeneratorError::new("bit-range width must be a constant", args[1].span));
    };
    let (off, mut effects) = gen_expr(ctx, &args[0])?;
    if let Some(s) = const_index(&args[0]) {
        if s + width > u128::from(bits) {
            return Err(GeneratorError::new(
                format!("bit range [{s}, {width}] exceeds a {bits}-bit value"),
                acx.span,
            ));
        }
    }
    let (value, fx) = gen_expr(ctx, &acx.value)?;
    effects.extend(fx);
    effects.extend(lv.effects.iter().cloned());

    let mask = mask_literal(width as u32, bits);
    if let Some(access) = lv.access {
        if access.forbids_zero_write() {
            forbid_zero_write(Some(access), &acx.value, acx)?;
            return Ok((write_only(&lv.code, &off, &mask, &value), effects));
        }
    }
    Ok((rmw(&lv.code, &off, &mask, &value), effects))
}

fn array_slice(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let ExprKind::Index { base, args } = &unparen(&acx.target).kind else {
        return Err(GeneratorError::new("expected a slice target", acx.span));
    };
    let lv = gen_lvalue(ctx, base)?;
    let (off, mut effects) = gen_expr(ctx, &args[0])?;
    let (len, fx1) = gen_expr(ctx, &args[1])?;
    effects.extend(fx1);
    let (src, fx2) = gen_expr(ctx, &acx.value)?;
    effects.extend(fx2);
    effects.extend(lv.effects.iter().cloned());
    effects.push(Effect::NeedsString);

    Ok((
        format!(
            "memcpy(&{}[{off}], {src}, ({len}) * sizeof({}[0]));",
            lv.code, lv.code
        ),
        effects,
    ))
}

fn register_member(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    forbid_zero_write(lv.access, &acx.value, acx)?;

    if acx.is_compound {
        let readable = matches!(lv.access, Some(Access::ReadWrite) | None);
        if !readable {
            return Err(GeneratorError::new(
                "compound assignment needs a readable register member",
                acx.span,
            ));
        }
    }
    check_assign_types(ctx, lv.ty.as_ref(), &acx.value)?;

    let (value, mut effects) = gen_expr(ctx, &acx.value)?;
    effects.extend(lv.effects.iter().cloned());
    Ok((format!("{} {} {value};", lv.code, acx.op.c_str()), effects))
}

fn string_capacity(lv: &LValue) -> Option<u32> {
    let ty = lv.ty.as_ref()?;
    if let Some(cap) = ty.string_capacity {
        return Some(cap);
    }
    // Struct string fields store capacity + 1 as their last dimension.
    if ty.is_string() {
        if let Some(last) = ty.dims.last() {
            return Some(last.saturating_sub(1));
        }
    }
    None
}

fn string_copy(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    let Some(cap) = string_capacity(&lv) else {
        return Err(GeneratorError::new("cannot determine string capacity", acx.span));
    };

    if let ExprKind::StringLit(text) = &unparen(&acx.value).kind {
        if text.len() > cap as usize {
            return Err(GeneratorError::new(
                format!(
                    "string literal of {} byte(s) exceeds capacity {cap}",
                    text.len()
                ),
                acx.value.span,
            ));
        }
    }

    let (src, mut effects) = gen_expr(ctx, &acx.value)?;
    effects.extend(lv.effects.iter().cloned());
    effects.push(Effect::NeedsString);

    Ok((
        format!(
            "strncpy({dst}, {src}, {cap}u);\n{dst}[{cap}u] = '\\0';",
            dst = lv.code
        ),
        effects,
    ))
}

fn string_concat(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    let Some(cap) = string_capacity(&lv) else {
        return Err(GeneratorError::new("cannot determine string capacity", acx.span));
    };

    // Flatten the `+` chain left-to-right.
    let mut parts = Vec::new();
    flatten_concat(&acx.value, &mut parts);

    let mut effects = lv.effects.clone();
    effects.push(Effect::NeedsString);
    let mut out = String::new();
    let dst = &lv.code;
    for (i, part) in parts.iter().enumerate() {
        let (src, fx) = gen_expr(ctx, part)?;
        effects.extend(fx);
        if i == 0 {
            out.push_str(&format!("strncpy({dst}, {src}, {cap}u);\n"));
            out.push_str(&format!("{dst}[{cap}u] = '\\0';\n"));
        } else {
            out.push_str(&format!(
                "strncat({dst}, {src}, {cap}u - strlen({dst}));\n"
            ));
        }
    }
    let out = out.trim_end().to_string();
    Ok((out, effects))
}

fn flatten_concat<'a>(expr: &'a Expr, parts: &mut Vec<&'a Expr>) {
    match &unparen(expr).kind {
        ExprKind::Binary {
            left,
            op: cnx_ast::BinOp::Add,
            right,
        } => {
            flatten_concat(left, parts);
            flatten_concat(right, parts);
        }
        _ => parts.push(expr),
    }
}

fn string_substring(ctx: &mut EmitCtx, acx: &AssignmentContext) -> Result<Emitted, GeneratorError> {
    let lv = gen_lvalue(ctx, &acx.target)?;
    let Some(cap) = string_capacity(&lv) else {
        return Err(GeneratorError::new("cannot determine string capacity", acx.span));
    };

    let ExprKind::Call { args, .. } = &unparen(&acx.value).kind else {
        return Err(GeneratorError::new("expected a substring call", acx.span));
    };
    if args.len() != 3 {
        return Err(GeneratorError::new(
            "'substring' takes (source, start, length)",
            acx.span,
        ));
    }

    let (src, mut effects) = gen_expr(ctx, &args[0])?;
    let (start, fx1) = gen_expr(ctx, &args[1])?;
    effects.extend(fx1);
    let (len, fx2) = gen_expr(ctx, &args[2])?;
    effects.extend(fx2);
    effects.extend(lv.effects.iter().cloned());
    effects.push(Effect::NeedsString);

    let n = ctx.fresh_temp();
    let dst = &lv.code;
    Ok((
        format!(
            "size_t {n} = ({len});\nif ({n} > {cap}u) {{ {n} = {cap}u; }}\nstrncpy({dst}, &({src})[{start}], {n});\n{dst}[{n}] = '\\0';"
        ),
        effects,
    ))
}
