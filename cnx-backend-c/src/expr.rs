#![forbid(unsafe_code)]

use cnx_ast::{BinOp, CheckedOp, Expr, ExprKind, Span, UnaryOp};
use cnx_core::{literal_info, unparen, TypeInfo};
use cnx_symbols::SymbolKind;

use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::{Effect, Emitted, SafeDivOp};

/// Bit mask literal for a field width, suffixed for the backing width.
pub fn mask_literal(width: u32, backing_bits: u32) -> String {
    let mask: u64 = if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    if backing_bits == 64 {
        format!("0x{mask:X}ULL")
    } else {
        format!("0x{mask:X}u")
    }
}

/// Literal suffix transform: `u64 -> ULL`, `i64 -> LL`, narrow suffixes
/// stripped. C has no binary literals, so `0b...` re-spells as hex.
pub fn transform_int_literal(text: &str) -> String {
    let stripped = text.replace('_', "");
    let (digits, c_suffix) = split_int_suffix(&stripped);

    let body = if let Some(bin) = digits.strip_prefix("0b") {
        match u128::from_str_radix(bin, 2) {
            Ok(v) => format!("0x{v:X}"),
            Err(_) => digits.to_string(),
        }
    } else {
        digits.to_string()
    };

    format!("{body}{c_suffix}")
}

fn split_int_suffix(text: &str) -> (&str, &'static str) {
    for (suffix, c) in [
        ("u64", "ULL"),
        ("i64", "LL"),
        ("u32", "u"),
        ("u16", ""),
        ("u8", ""),
        ("i32", ""),
        ("i16", ""),
        ("i8", ""),
    ] {
        if let Some(rest) = text.strip_suffix(suffix) {
            if !rest.is_empty() {
                return (rest, c);
            }
        }
    }
    (text, "")
}

pub fn transform_float_literal(text: &str) -> String {
    let stripped = text.replace('_', "");
    if let Some(rest) = stripped.strip_suffix("f32") {
        format!("{rest}f")
    } else if let Some(rest) = stripped.strip_suffix("f64") {
        rest.to_string()
    } else {
        stripped
    }
}

pub fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out
}

/// Fold additive/multiplicative chains whose leaves are all integer
/// literals. Division by zero aborts the fold; the analyzer has already
/// rejected reachable cases, so emitted code keeps the original shape.
pub fn fold_constants(expr: &Expr) -> Option<String> {
    fn eval(expr: &Expr) -> Option<i128> {
        match &unparen(expr).kind {
            ExprKind::IntLit(text) => {
                let info = literal_info(text);
                info.value.map(|v| v as i128)
            }
            ExprKind::Unary {
                op: UnaryOp::Neg,
                expr,
            } => eval(expr).map(|v| -v),
            ExprKind::Binary { left, op, right } => {
                let l = eval(left)?;
                let r = eval(right)?;
                match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            None
                        } else {
                            l.checked_div(r)
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // Folding a lone literal would lose its suffix; only fold real chains.
    if !matches!(&unparen(expr).kind, ExprKind::Binary { .. }) {
        return None;
    }
    eval(expr).map(|v| v.to_string())
}

/// Inferred type of an expression, when one is known.
pub fn expr_type(ctx: &EmitCtx, expr: &Expr) -> Option<TypeInfo> {
    match &expr.kind {
        ExprKind::IntLit(text) => {
            let info = literal_info(text);
            Some(TypeInfo::scalar(info.suffix.unwrap_or_else(|| "i32".to_string())))
        }
        ExprKind::FloatLit(text) => {
            if text.ends_with("f32") {
                Some(TypeInfo::scalar("f32"))
            } else {
                Some(TypeInfo::scalar("f64"))
            }
        }
        ExprKind::BoolLit(_) => Some(TypeInfo::scalar("bool")),
        ExprKind::StringLit(_) => Some(TypeInfo::scalar("string")),
        ExprKind::CharLit(_) => Some(TypeInfo::scalar("u8")),
        ExprKind::Ident(name) => ctx.lookup(&name.node).cloned(),
        ExprKind::Member { base, member } => member_type(ctx, base, &member.node),
        ExprKind::Index { base, args } => {
            let base_ty = expr_type(ctx, base)?;
            if base_ty.is_array || base_ty.is_string() {
                let mut elem = base_ty.clone();
                if base_ty.is_string() {
                    return Some(TypeInfo::scalar("u8"));
                }
                elem.is_array = false;
                elem.dims.clear();
                Some(elem)
            } else if args.len() == 1 {
                Some(TypeInfo::scalar("bool"))
            } else {
                // A bit slice yields the narrowest unsigned type that
                // holds the requested width; this is the sanctioned
                // narrowing escape hatch.
                let width = const_index(&args[1]).unwrap_or(u128::from(base_ty.bits));
                Some(TypeInfo::scalar(match width {
                    0..=8 => "u8",
                    9..=16 => "u16",
                    17..=32 => "u32",
                    _ => "u64",
                }))
            }
        }
        ExprKind::Call { callee, .. } => call_return_type(ctx, callee),
        ExprKind::Unary { op, expr } => match op {
            UnaryOp::Not => Some(TypeInfo::scalar("bool")),
            _ => expr_type(ctx, expr),
        },
        ExprKind::Binary { left, op, right } => {
            if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
                Some(TypeInfo::scalar("bool"))
            } else {
                expr_type(ctx, left).or_else(|| expr_type(ctx, right))
            }
        }
        ExprKind::Checked { left, right, .. } => {
            expr_type(ctx, left).or_else(|| expr_type(ctx, right))
        }
        ExprKind::Paren(inner) => expr_type(ctx, inner),
        ExprKind::This(_) | ExprKind::Global(_) => None,
    }
}

/// Register named by a member-access base: `REG`, `this.REG`, or
/// `Scope.REG`.
fn register_base(ctx: &EmitCtx, base: &Expr) -> Option<String> {
    match &unparen(base).kind {
        ExprKind::Ident(n) if ctx.collected.registers.contains_key(&n.node) => {
            Some(n.node.clone())
        }
        ExprKind::Member { base: inner, member } => {
            let scope_ok = match &unparen(inner).kind {
                ExprKind::This(_) => true,
                ExprKind::Ident(s) => ctx.collected.scopes.contains_key(&s.node),
                _ => false,
            };
            if scope_ok && ctx.collected.registers.contains_key(&member.node) {
                Some(member.node.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn member_type(ctx: &EmitCtx, base: &Expr, member: &str) -> Option<TypeInfo> {
    if let Some(reg) = register_base(ctx, base) {
        let m = ctx.collected.registers.get(&reg)?.member(member)?;
        let mut info = TypeInfo::scalar(&m.ty);
        info.is_bitmap = m.bitmap.is_some();
        return Some(info);
    }

    match &unparen(base).kind {
        ExprKind::This(_) => {
            let scope = ctx.current_scope.as_deref()?;
            ctx.scope_var_type(scope, member)
        }
        ExprKind::Global(_) => ctx.lookup(member).cloned(),
        ExprKind::Ident(name) => {
            let name = name.node.as_str();
            // Enum value: Mode.Idle
            if let Some(e) = ctx.collected.enums.get(name) {
                if e.has_member(member) {
                    let mut info = TypeInfo::scalar(name);
                    info.is_enum = true;
                    info.bits = e.bits.unwrap_or(32);
                    return Some(info);
                }
            }
            // Scope member: Scope.var
            if ctx.collected.scopes.contains_key(name) {
                return ctx.scope_var_type(name, member);
            }
            let base_ty = ctx.lookup(name)?;
            field_type(ctx, base_ty, member)
        }
        _ => {
            let base_ty = expr_type(ctx, base)?;
            field_type(ctx, &base_ty, member)
        }
    }
}

fn field_type(ctx: &EmitCtx, base_ty: &TypeInfo, member: &str) -> Option<TypeInfo> {
    if base_ty.is_string() && member == "length" {
        return Some(TypeInfo::scalar("u32"));
    }
    // Bitmap field read.
    if let Some(bm) = ctx.collected.bitmaps.get(&base_ty.name) {
        let f = bm.field(member)?;
        return Some(if f.width == 1 {
            TypeInfo::scalar("bool")
        } else {
            TypeInfo::scalar(format!("u{}", cnx_symbols::storage_bits(bm.width)))
        });
    }
    // Struct field.
    let fields = ctx
        .collected
        .structs
        .get(&base_ty.name)
        .map(|f| f.as_slice())
        .or_else(|| ctx.table.struct_fields(&base_ty.name))?;
    let f = fields.iter().find(|f| f.name == member)?;
    let mut info = TypeInfo::scalar(&f.ty);
    info.is_array = !f.dims.is_empty();
    info.dims = f.dims.clone();
    Some(info)
}

fn call_return_type(ctx: &EmitCtx, callee: &Expr) -> Option<TypeInfo> {
    let name = callee_unit_name(ctx, callee)?;
    if name == "safe_div" || name == "safe_mod" {
        return Some(TypeInfo::scalar("bool"));
    }
    let sym = ctx.unit_function(&name).or_else(|| {
        ctx.table
            .get_overloads(&name)
            .iter()
            .find(|s| s.kind == SymbolKind::Function)
    })?;
    Some(TypeInfo::scalar(&sym.declared_type))
}

/// Resolve a callee expression to the unit-level function name
/// (`f` or `Scope.f`).
pub fn callee_unit_name(ctx: &EmitCtx, callee: &Expr) -> Option<String> {
    match &unparen(callee).kind {
        ExprKind::Ident(name) => Some(name.node.clone()),
        ExprKind::Member { base, member } => match &unparen(base).kind {
            ExprKind::This(_) => ctx
                .current_scope
                .as_ref()
                .map(|s| format!("{s}.{}", member.node)),
            ExprKind::Ident(scope) if ctx.collected.scopes.contains_key(&scope.node) => {
                Some(format!("{}.{}", scope.node, member.node))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Emitted C name of a unit function.
pub fn c_function_name(name: &str) -> String {
    name.replace('.', "_")
}

pub fn gen_expr(ctx: &mut EmitCtx, expr: &Expr) -> Result<Emitted, GeneratorError> {
    if let Some(folded) = fold_constants(expr) {
        return Ok((folded, vec![]));
    }

    match &expr.kind {
        ExprKind::IntLit(text) => Ok((transform_int_literal(text), vec![])),
        ExprKind::FloatLit(text) => Ok((transform_float_literal(text), vec![])),
        ExprKind::BoolLit(b) => Ok((
            if *b { "true" } else { "false" }.to_string(),
            vec![Effect::Include("<stdbool.h>".to_string())],
        )),
        ExprKind::StringLit(s) => Ok((format!("\"{}\"", escape_c_string(s)), vec![])),
        ExprKind::CharLit(c) => {
            let esc = match c {
                '\n' => "\\n".to_string(),
                '\t' => "\\t".to_string(),
                '\r' => "\\r".to_string(),
                '\0' => "\\0".to_string(),
                '\'' => "\\'".to_string(),
                '\\' => "\\\\".to_string(),
                other => other.to_string(),
            };
            Ok((format!("'{esc}'"), vec![]))
        }
        ExprKind::Ident(name) => gen_ident(ctx, &name.node, expr.span),
        ExprKind::This(span) | ExprKind::Global(span) => Err(GeneratorError::new(
            "prefix must qualify a member",
            *span,
        )),
        ExprKind::Member { base, member } => gen_member(ctx, base, &member.node, expr.span),
        ExprKind::Index { base, args } => gen_index(ctx, base, args, expr.span),
        ExprKind::Call { callee, args } => gen_call(ctx, callee, args, expr.span),
        ExprKind::Unary { op, expr: inner } => {
            let (code, effects) = gen_expr(ctx, inner)?;
            Ok((format!("{}({code})", op.c_str()), effects))
        }
        ExprKind::Binary { left, op, right } => gen_binary(ctx, left, *op, right, expr.span),
        ExprKind::Checked { left, op, right } => gen_checked(ctx, left, *op, right, expr.span),
        ExprKind::Paren(inner) => {
            let (code, effects) = gen_expr(ctx, inner)?;
            Ok((format!("({code})"), effects))
        }
    }
}

fn gen_ident(ctx: &mut EmitCtx, name: &str, span: Span) -> Result<Emitted, GeneratorError> {
    if let Some(info) = ctx.lookup(name) {
        if info.is_ref_param {
            return Ok((format!("(*{name})"), vec![]));
        }
        return Ok((name.to_string(), vec![]));
    }

    // Unit globals and header symbols pass through under their own name.
    let known = ctx
        .collected
        .symbols
        .iter()
        .any(|s| s.name == name && s.kind != SymbolKind::ScopeMember)
        || !ctx.table.get_overloads(name).is_empty();
    if known {
        return Ok((name.to_string(), vec![]));
    }

    Err(GeneratorError::new(format!("unknown identifier '{name}'"), span))
}

fn gen_member(
    ctx: &mut EmitCtx,
    base: &Expr,
    member: &str,
    span: Span,
) -> Result<Emitted, GeneratorError> {
    // Register member reads resolve to the volatile macro in every
    // prefix form.
    if let Some(reg) = register_base(ctx, base) {
        let Some(m) = ctx.collected.registers[&reg].member(member) else {
            return Err(GeneratorError::new(
                format!("register '{reg}' has no member '{member}'"),
                span,
            ));
        };
        if m.access == cnx_ast::Access::WriteOnly {
            return Err(GeneratorError::new(
                format!("register member '{reg}.{member}' is write-only"),
                span,
            ));
        }
        return Ok((ctx.register_macro(&reg, member), vec![]));
    }

    match &unparen(base).kind {
        ExprKind::This(_) => {
            let Some(scope) = ctx.current_scope.clone() else {
                return Err(GeneratorError::new("'this' outside a scope", span));
            };
            // Private const scalars inline their literal.
            if let Some(info) = ctx.collected.scopes.get(&scope) {
                if let Some(text) = info.const_inlines.get(member) {
                    return Ok((transform_int_literal(text), vec![]));
                }
            }
            // A register owned by this scope.
            if ctx.collected.register_scopes.get(member) == Some(&scope) {
                return Err(GeneratorError::new(
                    format!("register '{member}' must be accessed through a member"),
                    span,
                ));
            }
            // Demoted to a function-local static?
            let key = format!("{scope}.{member}");
            if ctx.demoted.get(&key).map(String::as_str) == ctx.current_function.as_deref() {
                return Ok((member.to_string(), vec![]));
            }
            Ok((format!("{scope}_{member}"), vec![]))
        }
        ExprKind::Global(_) => Ok((member.to_string(), vec![])),
        ExprKind::Ident(name) => {
            let base_name = name.node.as_str();

            if let Some(e) = ctx.collected.enums.get(base_name) {
                if !e.has_member(member) {
                    return Err(GeneratorError::new(
                        format!("enum '{base_name}' has no member '{member}'"),
                        span,
                    ));
                }
                return Ok((format!("{base_name}_{member}"), vec![]));
            }

            if ctx.collected.scopes.contains_key(base_name) {
                let info = &ctx.collected.scopes[base_name];
                let same_scope = ctx.current_scope.as_deref() == Some(base_name);
                if !same_scope && !info.public_members.contains(member) {
                    return Err(GeneratorError::new(
                        format!("'{base_name}.{member}' is private"),
                        span,
                    ));
                }
                if let Some(text) = info.const_inlines.get(member) {
                    return Ok((transform_int_literal(text), vec![]));
                }
                return Ok((format!("{base_name}_{member}"), vec![]));
            }

            gen_value_member(ctx, base, member, span)
        }
        _ => gen_value_member(ctx, base, member, span),
    }
}

/// Member access on a value: struct field, bitmap field read, `.length`.
fn gen_value_member(
    ctx: &mut EmitCtx,
    base: &Expr,
    member: &str,
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let base_ty = expr_type(ctx, base);
    let (base_code, mut effects) = gen_expr(ctx, base)?;

    if let Some(ty) = &base_ty {
        if ty.is_string() && member == "length" {
            effects.push(Effect::NeedsString);
            return Ok((format!("(uint32_t)strlen({base_code})"), effects));
        }
        if let Some(bm) = ctx.collected.bitmaps.get(&ty.name) {
            let Some(f) = bm.field(member) else {
                return Err(GeneratorError::new(
                    format!("bitmap '{}' has no field '{member}'", ty.name),
                    span,
                ));
            };
            let mask = mask_literal(f.width, cnx_symbols::storage_bits(bm.width));
            return Ok((
                format!("(({base_code} >> {}) & {mask})", f.offset),
                effects,
            ));
        }
        // Register member carrying a bitmap: REG.MEMBER.field
        if ty.is_bitmap && !ctx.collected.bitmaps.contains_key(&ty.name) {
            // base already rendered as the volatile macro; resolve the
            // bitmap binding through the register path.
            if let Some((reg, reg_member)) = register_path(ctx, base) {
                let m = ctx.collected.registers[&reg].member(&reg_member).cloned();
                if let Some(m) = m {
                    if let Some(bm_name) = &m.bitmap {
                        if let Some(bm) = ctx.collected.bitmaps.get(bm_name) {
                            let Some(f) = bm.field(member) else {
                                return Err(GeneratorError::new(
                                    format!("bitmap '{bm_name}' has no field '{member}'"),
                                    span,
                                ));
                            };
                            let mask = mask_literal(f.width, cnx_symbols::storage_bits(bm.width));
                            return Ok((
                                format!("(({base_code} >> {}) & {mask})", f.offset),
                                effects,
                            ));
                        }
                    }
                }
            }
        }
    }

    Ok((format!("{base_code}.{member}"), effects))
}

/// `(register, member)` when the expression is `REG.MEMBER` (possibly
/// behind a scope prefix).
pub fn register_path(ctx: &EmitCtx, expr: &Expr) -> Option<(String, String)> {
    if let ExprKind::Member { base, member } = &unparen(expr).kind {
        match &unparen(base).kind {
            ExprKind::Ident(name) if ctx.collected.registers.contains_key(&name.node) => {
                return Some((name.node.clone(), member.node.clone()));
            }
            ExprKind::Member { base: inner, member: reg } => {
                let scope_ok = match &unparen(inner).kind {
                    ExprKind::This(_) => true,
                    ExprKind::Ident(s) => ctx.collected.scopes.contains_key(&s.node),
                    _ => false,
                };
                if scope_ok && ctx.collected.registers.contains_key(&reg.node) {
                    return Some((reg.node.clone(), member.node.clone()));
                }
            }
            _ => {}
        }
    }
    None
}

fn gen_index(
    ctx: &mut EmitCtx,
    base: &Expr,
    args: &[Expr],
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let base_ty = expr_type(ctx, base);
    let (base_code, mut effects) = gen_expr(ctx, base)?;

    let is_storage = base_ty
        .as_ref()
        .map(|t| t.is_array || t.is_string())
        .unwrap_or(true);

    if is_storage {
        if args.len() != 1 {
            return Err(GeneratorError::new("array slice is only valid as an assignment target", span));
        }
        let (idx, fx) = gen_expr(ctx, &args[0])?;
        effects.extend(fx);
        if let (Some(ty), Some(n)) = (base_ty.as_ref(), const_index(&args[0])) {
            if let Some(dim) = ty.dims.first() {
                if n >= u128::from(*dim) {
                    return Err(GeneratorError::new(
                        format!("index {n} out of bounds for array of {dim}"),
                        span,
                    ));
                }
            }
        }
        return Ok((format!("{base_code}[{idx}]"), effects));
    }

    // Scalar bit / bit-range reads.
    let bits = base_ty.as_ref().map(|t| t.bits).unwrap_or(32);
    match args {
        [bit] => {
            let (bit_code, fx) = gen_expr(ctx, bit)?;
            effects.extend(fx);
            if let Some(n) = const_index(bit) {
                if n >= u128::from(bits) {
                    return Err(GeneratorError::new(
                        format!("bit {n} out of range for a {bits}-bit value"),
                        span,
                    ));
                }
            }
            Ok((format!("(({base_code} >> {bit_code}) & 0x1u)"), effects))
        }
        [start, width] => {
            let (start_code, fx1) = gen_expr(ctx, start)?;
            effects.extend(fx1);
            let Some(w) = const_index(width) else {
                return Err(GeneratorError::new("bit-range width must be a constant", span));
            };
            if let Some(s) = const_index(start) {
                if s + w > u128::from(bits) {
                    return Err(GeneratorError::new(
                        format!("bit range [{s}, {w}] exceeds a {bits}-bit value"),
                        span,
                    ));
                }
            }
            let mask = mask_literal(w as u32, bits);
            Ok((
                format!("(({base_code} >> {start_code}) & {mask})"),
                effects,
            ))
        }
        _ => Err(GeneratorError::new("too many subscript arguments", span)),
    }
}

pub fn const_index(expr: &Expr) -> Option<u128> {
    match &unparen(expr).kind {
        ExprKind::IntLit(text) => literal_info(text).value,
        _ => None,
    }
}

fn gen_binary(
    ctx: &mut EmitCtx,
    left: &Expr,
    op: BinOp,
    right: &Expr,
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let left_ty = expr_type(ctx, left);
    let right_ty = expr_type(ctx, right);

    // Source `=` is equality; bounded strings compare via strcmp.
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let l_str = left_ty.as_ref().map(|t| t.is_string()).unwrap_or(false);
        let r_str = right_ty.as_ref().map(|t| t.is_string()).unwrap_or(false)
            || matches!(unparen(right).kind, ExprKind::StringLit(_));
        if l_str || r_str {
            let (l, mut effects) = gen_expr(ctx, left)?;
            let (r, fx) = gen_expr(ctx, right)?;
            effects.extend(fx);
            effects.push(Effect::NeedsString);
            let cmp = if op == BinOp::Eq { "==" } else { "!=" };
            return Ok((format!("(strcmp({l}, {r}) {cmp} 0)"), effects));
        }

        if let (Some(lt), Some(rt)) = (&left_ty, &right_ty) {
            if lt.is_enum && rt.is_enum && lt.name != rt.name {
                return Err(GeneratorError::new(
                    format!(
                        "comparison of values from different enums '{}' and '{}'",
                        lt.name, rt.name
                    ),
                    span,
                ));
            }
        }
    }

    // Literal shift amounts validate against the operand width.
    if matches!(op, BinOp::Shl | BinOp::Shr) {
        if let (Some(lt), Some(n)) = (&left_ty, const_index(right)) {
            if lt.bits > 0 && n >= u128::from(lt.bits) {
                return Err(GeneratorError::new(
                    format!("shift by {n} exceeds the {}-bit operand", lt.bits),
                    span,
                ));
            }
        }
    }

    let (l, mut effects) = gen_expr(ctx, left)?;
    let (r, fx) = gen_expr(ctx, right)?;
    effects.extend(fx);
    Ok((format!("({l}) {} ({r})", op.c_str()), effects))
}

fn gen_checked(
    ctx: &mut EmitCtx,
    left: &Expr,
    op: CheckedOp,
    right: &Expr,
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let ty = expr_type(ctx, left)
        .or_else(|| expr_type(ctx, right))
        .ok_or_else(|| GeneratorError::new("cannot infer operand type for checked arithmetic", span))?;
    if !ty.is_integer() && !ty.is_small_primitive() {
        return Err(GeneratorError::new(
            format!("checked arithmetic needs an integer operand, got '{}'", ty.name),
            span,
        ));
    }

    let (l, mut effects) = gen_expr(ctx, left)?;
    let (r, fx) = gen_expr(ctx, right)?;
    effects.extend(fx);
    effects.push(Effect::Helper {
        op,
        ty: ty.name.clone(),
    });
    Ok((
        format!("cnx_clamp_{}_{}({l}, {r})", op.name(), ty.name),
        effects,
    ))
}

fn gen_call(
    ctx: &mut EmitCtx,
    callee: &Expr,
    args: &[Expr],
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let Some(name) = callee_unit_name(ctx, callee) else {
        return Err(GeneratorError::new("unsupported call target", span));
    };

    // safe_div / safe_mod rewrite to the typed helper with an out pointer.
    if name == "safe_div" || name == "safe_mod" {
        return gen_safe_div(ctx, &name, args, span);
    }
    if name == "substring" {
        return Err(GeneratorError::new(
            "'substring' is only valid in a string assignment",
            span,
        ));
    }

    if let Some(func) = ctx.unit_function(&name).cloned() {
        return gen_unit_call(ctx, &name, &func, args, span);
    }

    // Header-provided or allow-listed C function: plain call.
    let mut effects = Vec::new();
    let mut parts = Vec::new();
    for arg in args {
        let (code, fx) = gen_expr(ctx, arg)?;
        effects.extend(fx);
        parts.push(code);
    }
    Ok((format!("{}({})", c_function_name(&name), parts.join(", ")), effects))
}

fn gen_safe_div(
    ctx: &mut EmitCtx,
    name: &str,
    args: &[Expr],
    span: Span,
) -> Result<Emitted, GeneratorError> {
    if args.len() != 4 {
        return Err(GeneratorError::new(
            format!("'{name}' takes (out, numerator, divisor, default)"),
            span,
        ));
    }
    let out_ty = expr_type(ctx, &args[0])
        .filter(|t| t.is_integer())
        .ok_or_else(|| GeneratorError::new("out argument must be an integer variable", args[0].span))?;

    let op = if name == "safe_div" {
        SafeDivOp::Div
    } else {
        SafeDivOp::Mod
    };

    let (out_code, mut effects) = gen_expr(ctx, &args[0])?;
    let mut parts = vec![format!("&({out_code})")];
    for arg in &args[1..] {
        let (code, fx) = gen_expr(ctx, arg)?;
        effects.extend(fx);
        parts.push(code);
    }
    effects.push(Effect::SafeDiv {
        op,
        ty: out_ty.name.clone(),
    });
    Ok((
        format!("cnx_safe_{}_{}({})", op.name(), out_ty.name, parts.join(", ")),
        effects,
    ))
}

fn gen_unit_call(
    ctx: &mut EmitCtx,
    name: &str,
    func: &cnx_symbols::Symbol,
    args: &[Expr],
    span: Span,
) -> Result<Emitted, GeneratorError> {
    let params = func.params.clone().unwrap_or_default();
    if args.len() != params.len() {
        return Err(GeneratorError::new(
            format!(
                "'{name}' expects {} argument(s), got {}",
                params.len(),
                args.len()
            ),
            span,
        ));
    }

    let mut effects = Vec::new();
    let mut parts = Vec::new();
    for (arg, param) in args.iter().zip(&params) {
        let mut pty = TypeInfo::scalar(&param.ty);
        pty.is_array = !param.dims.is_empty();
        pty.is_enum = ctx.collected.enums.contains_key(&param.ty)
            || ctx.table.enum_bit_width(&param.ty).is_some();

        let (code, fx) = gen_expr(ctx, arg)?;
        effects.extend(fx);

        if !ctx.param_by_ref(&pty) {
            parts.push(code);
            continue;
        }

        if is_lvalue_expr(arg) {
            parts.push(format!("&({code})"));
        } else if ctx.cpp_mode {
            // C++ rejects compound literals; materialize a temp first.
            let tmp = ctx.fresh_temp();
            let cty = ctx.c_type(&pty.name);
            ctx.pending_temps.push(format!("{cty} {tmp} = {code};"));
            parts.push(format!("&{tmp}"));
        } else {
            let cty = ctx.c_type(&pty.name);
            parts.push(format!("&({cty}){{{code}}}"));
        }
    }

    Ok((
        format!("{}({})", c_function_name(name), parts.join(", ")),
        effects,
    ))
}

fn is_lvalue_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Member { base, .. } => match &base.kind {
            ExprKind::This(_) | ExprKind::Global(_) => true,
            _ => is_lvalue_expr(base),
        },
        ExprKind::Index { base, .. } => is_lvalue_expr(base),
        ExprKind::Paren(inner) => is_lvalue_expr(inner),
        _ => false,
    }
}
