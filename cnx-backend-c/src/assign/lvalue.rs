#![forbid(unsafe_code)]

use cnx_ast::{Access, Expr, ExprKind, Span};
use cnx_core::{unparen, TypeInfo};

use crate::ctx::{EmitCtx, GeneratorError};
use crate::effects::Effect;
use crate::expr::{expr_type, gen_expr, register_path};

/// A resolved assignment target: the storage expression in C, its type
/// when known, and the register access mode when the storage is a
/// memory-mapped member.
pub struct LValue {
    pub code: String,
    pub ty: Option<TypeInfo>,
    pub access: Option<Access>,
    pub effects: Vec<Effect>,
}

/// Render the storage location an assignment writes through. Unlike the
/// expression generator this never masks bitmap reads; handlers compose
/// their own read-modify-write around it.
pub fn gen_lvalue(ctx: &mut EmitCtx, target: &Expr) -> Result<LValue, GeneratorError> {
    let target = unparen(target);
    match &target.kind {
        ExprKind::Ident(name) => {
            let Some(info) = ctx.lookup(&name.node).cloned() else {
                // Unit global outside the registry.
                return Ok(LValue {
                    code: name.node.clone(),
                    ty: None,
                    access: None,
                    effects: vec![],
                });
            };
            if info.is_const {
                return Err(GeneratorError::new(
                    format!("cannot assign to const '{}'", name.node),
                    target.span,
                ));
            }
            let code = if info.is_ref_param {
                format!("(*{})", name.node)
            } else {
                name.node.clone()
            };
            Ok(LValue {
                code,
                ty: Some(info),
                access: None,
                effects: vec![],
            })
        }
        ExprKind::Member { base, member } => gen_member_lvalue(ctx, base, &member.node, target.span),
        ExprKind::Index { base, args } => {
            let inner = gen_lvalue(ctx, base)?;
            if args.len() != 1 {
                return Err(GeneratorError::new(
                    "bit-range targets are handled by their own assignment kind",
                    target.span,
                ));
            }
            let (idx, fx) = gen_expr(ctx, &args[0])?;
            let mut effects = inner.effects;
            effects.extend(fx);
            let elem_ty = inner.ty.as_ref().map(|t| {
                let mut e = t.clone();
                e.is_array = false;
                e.dims = t.dims.iter().skip(1).copied().collect();
                e
            });
            Ok(LValue {
                code: format!("{}[{idx}]", inner.code),
                ty: elem_ty,
                access: inner.access,
                effects,
            })
        }
        _ => Err(GeneratorError::new("invalid assignment target", target.span)),
    }
}

fn gen_member_lvalue(
    ctx: &mut EmitCtx,
    base: &Expr,
    member: &str,
    span: Span,
) -> Result<LValue, GeneratorError> {
    // REG.MEMBER in any prefix form resolves to the volatile macro.
    let whole = Expr {
        span,
        kind: ExprKind::Member {
            base: Box::new(base.clone()),
            member: cnx_ast::Spanned::new(span, member.to_string()),
        },
    };
    if let Some((reg, member_name)) = register_path(ctx, &whole) {
        let m = ctx
            .collected
            .registers
            .get(&reg)
            .and_then(|r| r.member(&member_name))
            .cloned()
            .ok_or_else(|| {
                GeneratorError::new(format!("register '{reg}' has no member '{member_name}'"), span)
            })?;
        if m.access == Access::ReadOnly {
            return Err(GeneratorError::new(
                format!("register member '{reg}.{member_name}' is read-only"),
                span,
            ));
        }
        let mut ty = TypeInfo::scalar(&m.ty);
        ty.is_bitmap = m.bitmap.is_some();
        return Ok(LValue {
            code: ctx.register_macro(&reg, &member_name),
            ty: Some(ty),
            access: Some(m.access),
            effects: vec![],
        });
    }

    match &unparen(base).kind {
        ExprKind::This(_) => {
            let Some(scope) = ctx.current_scope.clone() else {
                return Err(GeneratorError::new("'this' outside a scope", span));
            };
            if let Some(info) = ctx.collected.scopes.get(&scope) {
                if info.const_inlines.contains_key(member) {
                    return Err(GeneratorError::new(
                        format!("cannot assign to const '{member}'"),
                        span,
                    ));
                }
            }
            let key = format!("{scope}.{member}");
            let code = if ctx.demoted.get(&key).map(String::as_str)
                == ctx.current_function.as_deref()
            {
                member.to_string()
            } else {
                format!("{scope}_{member}")
            };
            Ok(LValue {
                code,
                ty: ctx.scope_var_type(&scope, member),
                access: None,
                effects: vec![],
            })
        }
        ExprKind::Global(_) => Ok(LValue {
            code: member.to_string(),
            ty: ctx.lookup(member).cloned(),
            access: None,
            effects: vec![],
        }),
        ExprKind::Ident(name) if ctx.collected.scopes.contains_key(&name.node) => {
            let scope = name.node.clone();
            let info = &ctx.collected.scopes[&scope];
            let same_scope = ctx.current_scope.as_deref() == Some(scope.as_str());
            if !same_scope && !info.public_members.contains(member) {
                return Err(GeneratorError::new(
                    format!("'{scope}.{member}' is private"),
                    span,
                ));
            }
            Ok(LValue {
                code: format!("{scope}_{member}"),
                ty: ctx.scope_var_type(&scope, member),
                access: None,
                effects: vec![],
            })
        }
        _ => {
            // Struct field chain.
            let inner = gen_lvalue(ctx, base)?;
            let ty = inner
                .ty
                .as_ref()
                .and_then(|t| struct_field_type(ctx, t, member))
                .or_else(|| expr_type(ctx, &whole));
            Ok(LValue {
                code: format!("{}.{member}", inner.code),
                ty,
                access: inner.access,
                effects: inner.effects,
            })
        }
    }
}

fn struct_field_type(ctx: &EmitCtx, base_ty: &TypeInfo, member: &str) -> Option<TypeInfo> {
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
    info.is_bitmap = ctx.collected.bitmaps.contains_key(&f.ty);
    if f.ty == "string" || ctx.collected.structs.contains_key(&f.ty) {
        info.is_struct = ctx.collected.structs.contains_key(&f.ty);
    }
    Some(info)
}
