#![forbid(unsafe_code)]

use cnx_ast::{
    span_between, Access, AssignOp, AssignStmt, BinOp, BitmapDef, BitmapField, Block, CheckedOp,
    CriticalStmt, DoWhileStmt, ElseArm, EnumDef, EnumMember, Expr, ExprKind, ForStmt, FunctionDef,
    Ident, IfStmt, Include, Item, Overflow, Param, RegisterDef, RegisterMember, ReturnStmt,
    ScopeDecl, ScopeDef, ScopeMember, Span, Spanned, Stmt, StructDef, StructField, SwitchCase,
    SwitchStmt, TypeRef, Unit, VarDecl, Visibility, WhileStmt,
};
use cnx_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let i = (self.idx + ahead).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            message: format!("expected {what}, found {}", tok.kind.describe()),
            span: tok.span,
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Ident, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let tok = self.advance();
                Ok(Spanned::new(tok.span, name))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_int(&mut self, what: &str) -> Result<(u64, Span), ParseError> {
        match &self.peek().kind {
            TokenKind::Int(text) => {
                let text = text.clone();
                let tok = self.advance();
                match parse_plain_int(&text) {
                    Some(v) => Ok((v, tok.span)),
                    None => Err(ParseError {
                        message: format!("invalid integer literal '{text}'"),
                        span: tok.span,
                    }),
                }
            }
            _ => Err(self.unexpected(what)),
        }
    }

    pub fn parse_unit(&mut self) -> Result<Unit, ParseError> {
        let mut items = Vec::new();
        while !self.at(&TokenKind::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(Unit { items })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        match &self.peek().kind {
            TokenKind::Include { path, system } => {
                let path = path.clone();
                let system = *system;
                let tok = self.advance();
                Ok(Item::Include(Include {
                    span: tok.span,
                    path,
                    system,
                }))
            }
            TokenKind::KwScope => Ok(Item::Scope(self.parse_scope()?)),
            TokenKind::KwStruct => Ok(Item::Struct(self.parse_struct()?)),
            TokenKind::KwEnum => Ok(Item::Enum(self.parse_enum()?)),
            TokenKind::Bitmap(_) => Ok(Item::Bitmap(self.parse_bitmap()?)),
            TokenKind::KwRegister => Ok(Item::Register(self.parse_register()?)),
            TokenKind::KwFn => Ok(Item::Function(self.parse_function()?)),
            _ => Ok(Item::Var(self.parse_var_decl()?)),
        }
    }

    fn parse_scope(&mut self) -> Result<ScopeDef, ParseError> {
        let start = self.expect(&TokenKind::KwScope, "'scope'")?.span;
        let name = self.expect_ident("scope name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let member_start = self.peek().span;
            let visibility = if self.eat(&TokenKind::KwPublic) {
                Visibility::Public
            } else {
                // `private` is the default and may be written explicitly.
                self.eat(&TokenKind::KwPrivate);
                Visibility::Private
            };

            let decl = match &self.peek().kind {
                TokenKind::KwFn => ScopeDecl::Function(self.parse_function()?),
                TokenKind::KwStruct => ScopeDecl::Struct(self.parse_struct()?),
                TokenKind::KwEnum => ScopeDecl::Enum(self.parse_enum()?),
                TokenKind::Bitmap(_) => ScopeDecl::Bitmap(self.parse_bitmap()?),
                TokenKind::KwRegister => ScopeDecl::Register(self.parse_register()?),
                _ => ScopeDecl::Var(self.parse_var_decl()?),
            };

            let end = self.tokens[self.idx.saturating_sub(1)].span;
            members.push(ScopeMember {
                span: join(member_start, end),
                visibility,
                decl,
            });
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(ScopeDef {
            span: join(start, end),
            name,
            members,
        })
    }

    fn parse_struct(&mut self) -> Result<StructDef, ParseError> {
        let start = self.expect(&TokenKind::KwStruct, "'struct'")?.span;
        let name = self.expect_ident("struct name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let field_start = self.peek().span;
            let ty = self.parse_type_ref()?;
            let fname = self.expect_ident("field name")?;
            let dims = self.parse_dims()?;
            let end = self.expect(&TokenKind::Semi, "';'")?.span;
            fields.push(StructField {
                span: join(field_start, end),
                ty,
                name: fname,
                dims,
            });
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(StructDef {
            span: join(start, end),
            name,
            fields,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDef, ParseError> {
        let start = self.expect(&TokenKind::KwEnum, "'enum'")?.span;
        let name = self.expect_ident("enum name")?;

        let backing = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_ref()?)
        } else {
            None
        };

        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        loop {
            if self.at(&TokenKind::RBrace) {
                break;
            }
            let mname = self.expect_ident("enum member")?;
            let value = if self.eat(&TokenKind::Assign) {
                let negative = self.eat(&TokenKind::Minus);
                let (v, vspan) = self.expect_int("enum value")?;
                let v = v as i64;
                Some(Spanned::new(vspan, if negative { -v } else { v }))
            } else {
                None
            };
            members.push(EnumMember {
                span: mname.span,
                name: mname,
                value,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;

        Ok(EnumDef {
            span: join(start, end),
            name,
            backing,
            members,
        })
    }

    fn parse_bitmap(&mut self) -> Result<BitmapDef, ParseError> {
        let (width, start) = match &self.peek().kind {
            TokenKind::Bitmap(w) => {
                let w = *w;
                let tok = self.advance();
                (w, tok.span)
            }
            _ => return Err(self.unexpected("'bitmapN'")),
        };
        let name = self.expect_ident("bitmap name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        loop {
            if self.at(&TokenKind::RBrace) {
                break;
            }
            let fname = self.expect_ident("bitmap field")?;
            let fwidth = if self.eat(&TokenKind::LBracket) {
                let (w, _) = self.expect_int("field width")?;
                self.expect(&TokenKind::RBracket, "']'")?;
                w as u32
            } else {
                1
            };
            fields.push(BitmapField {
                span: fname.span,
                name: fname,
                width: fwidth,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;

        Ok(BitmapDef {
            span: join(start, end),
            name,
            width,
            fields,
        })
    }

    fn parse_register(&mut self) -> Result<RegisterDef, ParseError> {
        let start = self.expect(&TokenKind::KwRegister, "'register'")?.span;
        let name = self.expect_ident("register name")?;
        self.expect(&TokenKind::At, "'@'")?;
        let (address, _) = self.expect_int("register address")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let mstart = self.peek().span;
            let mname = self.expect_ident("register member")?;
            self.expect(&TokenKind::Colon, "':'")?;
            let access = self.parse_access()?;
            let ty = self.parse_type_ref()?;
            self.expect(&TokenKind::At, "'@'")?;
            let (offset, _) = self.expect_int("member offset")?;

            let bitmap = if matches!(&self.peek().kind, TokenKind::Ident(w) if w == "bitmap") {
                self.advance();
                Some(self.expect_ident("bitmap name")?)
            } else {
                None
            };

            let end = self.expect(&TokenKind::Semi, "';'")?.span;
            members.push(RegisterMember {
                span: join(mstart, end),
                name: mname,
                access,
                ty,
                offset,
                bitmap,
            });
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(RegisterDef {
            span: join(start, end),
            name,
            address,
            members,
        })
    }

    fn parse_access(&mut self) -> Result<Access, ParseError> {
        let ident = self.expect_ident("access mode (ro, wo, rw, w1c, w1s)")?;
        match ident.node.as_str() {
            "ro" => Ok(Access::ReadOnly),
            "wo" => Ok(Access::WriteOnly),
            "rw" => Ok(Access::ReadWrite),
            "w1c" => Ok(Access::Write1Clear),
            "w1s" => Ok(Access::Write1Set),
            other => Err(ParseError {
                message: format!("unknown access mode '{other}'"),
                span: ident.span,
            }),
        }
    }

    fn parse_function(&mut self) -> Result<FunctionDef, ParseError> {
        let start = self.expect(&TokenKind::KwFn, "'fn'")?.span;
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let pstart = self.peek().span;
                let ty = self.parse_type_ref()?;
                let pname = self.expect_ident("parameter name")?;
                let dims = self.parse_dims()?;
                params.push(Param {
                    span: join(pstart, pname.span),
                    ty,
                    name: pname,
                    dims,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::Arrow, "'->'")?;
        let ret = self.parse_type_ref()?;
        let body = self.parse_block()?;

        Ok(FunctionDef {
            span: join(start, body.span),
            name,
            params,
            ret,
            body,
        })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let name = self.expect_ident("type name")?;

        if name.node == "string" {
            self.expect(&TokenKind::Lt, "'<' after 'string'")?;
            let (cap, _) = self.expect_int("string capacity")?;
            let end = self.expect(&TokenKind::Gt, "'>'")?.span;
            return Ok(TypeRef {
                span: join(name.span, end),
                name: name.node,
                string_capacity: Some(cap as u32),
            });
        }

        Ok(TypeRef {
            span: name.span,
            name: name.node,
            string_capacity: None,
        })
    }

    fn parse_dims(&mut self) -> Result<Vec<u32>, ParseError> {
        let mut dims = Vec::new();
        while self.eat(&TokenKind::LBracket) {
            let (n, _) = self.expect_int("array dimension")?;
            self.expect(&TokenKind::RBracket, "']'")?;
            dims.push(n as u32);
        }
        Ok(dims)
    }

    fn at_var_decl_start(&self) -> bool {
        match &self.peek().kind {
            TokenKind::KwConst | TokenKind::KwAtomic | TokenKind::KwWrap => true,
            // `string<N> name` or `TypeName name`
            TokenKind::Ident(name) if name == "string" => {
                matches!(self.peek_at(1).kind, TokenKind::Lt)
            }
            TokenKind::Ident(_) => matches!(self.peek_at(1).kind, TokenKind::Ident(_)),
            _ => false,
        }
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let decl = self.parse_var_decl_no_semi()?;
        self.expect(&TokenKind::Semi, "';'")?;
        Ok(decl)
    }

    fn parse_var_decl_no_semi(&mut self) -> Result<VarDecl, ParseError> {
        let start = self.peek().span;
        let mut is_const = false;
        let mut is_atomic = false;
        let mut overflow = None;

        loop {
            match &self.peek().kind {
                TokenKind::KwConst => {
                    self.advance();
                    is_const = true;
                }
                TokenKind::KwAtomic => {
                    self.advance();
                    is_atomic = true;
                }
                TokenKind::KwWrap => {
                    self.advance();
                    overflow = Some(Overflow::Wrap);
                }
                _ => break,
            }
        }

        let ty = self.parse_type_ref()?;
        let name = self.expect_ident("variable name")?;
        let dims = self.parse_dims()?;

        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let end = self.tokens[self.idx.saturating_sub(1)].span;
        Ok(VarDecl {
            span: join(start, end),
            is_const,
            is_atomic,
            overflow,
            ty,
            name,
            dims,
            init,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(&TokenKind::LBrace, "'{'")?.span;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(Block {
            span: join(start, end),
            stmts,
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match &self.peek().kind {
            TokenKind::KwIf => Ok(Stmt::If(self.parse_if()?)),
            TokenKind::KwWhile => {
                let start = self.advance().span;
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = self.parse_block()?;
                Ok(Stmt::While(WhileStmt {
                    span: join(start, body.span),
                    cond,
                    body,
                }))
            }
            TokenKind::KwDo => {
                let start = self.advance().span;
                let body = self.parse_block()?;
                self.expect(&TokenKind::KwWhile, "'while'")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let end = self.expect(&TokenKind::Semi, "';'")?.span;
                Ok(Stmt::DoWhile(DoWhileStmt {
                    span: join(start, end),
                    body,
                    cond,
                }))
            }
            TokenKind::KwFor => Ok(Stmt::For(self.parse_for()?)),
            TokenKind::KwSwitch => Ok(Stmt::Switch(self.parse_switch()?)),
            TokenKind::KwCritical => {
                let start = self.advance().span;
                let body = self.parse_block()?;
                Ok(Stmt::Critical(CriticalStmt {
                    span: join(start, body.span),
                    body,
                }))
            }
            TokenKind::KwReturn => {
                let start = self.advance().span;
                let value = if self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect(&TokenKind::Semi, "';'")?.span;
                Ok(Stmt::Return(ReturnStmt {
                    span: join(start, end),
                    value,
                }))
            }
            TokenKind::KwBreak => {
                let start = self.advance().span;
                let end = self.expect(&TokenKind::Semi, "';'")?.span;
                Ok(Stmt::Break(join(start, end)))
            }
            TokenKind::KwContinue => {
                let start = self.advance().span;
                let end = self.expect(&TokenKind::Semi, "';'")?.span;
                Ok(Stmt::Continue(join(start, end)))
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ if self.at_var_decl_start() => Ok(Stmt::Var(self.parse_var_decl()?)),
            _ => {
                let stmt = self.parse_assign_or_expr()?;
                self.expect(&TokenKind::Semi, "';'")?;
                Ok(stmt)
            }
        }
    }

    /// Assignment or expression statement, without the trailing semicolon.
    /// The target prefix is parsed first; an assignment operator decides
    /// which it is, otherwise the prefix folds into a full expression.
    fn parse_assign_or_expr(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().span;
        let prefix = self.parse_unary()?;

        if let Some(op) = assign_op_of(&self.peek().kind) {
            if !is_lvalue(&prefix) {
                return Err(ParseError {
                    message: "assignment target is not an l-value".to_string(),
                    span: prefix.span,
                });
            }
            self.advance();
            let value = self.parse_expr()?;
            let end = self.tokens[self.idx.saturating_sub(1)].span;
            return Ok(Stmt::Assign(AssignStmt {
                span: join(start, end),
                target: prefix,
                op,
                value,
            }));
        }

        let expr = self.parse_binary_rhs(0, prefix)?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        let start = self.expect(&TokenKind::KwIf, "'if'")?.span;
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let then_block = self.parse_block()?;

        let else_block = if self.eat(&TokenKind::KwElse) {
            if self.at(&TokenKind::KwIf) {
                Some(Box::new(ElseArm::ElseIf(self.parse_if()?)))
            } else {
                Some(Box::new(ElseArm::Else(self.parse_block()?)))
            }
        } else {
            None
        };

        let end = match &else_block {
            Some(arm) => match arm.as_ref() {
                ElseArm::Else(b) => b.span,
                ElseArm::ElseIf(i) => i.span,
            },
            None => then_block.span,
        };

        Ok(IfStmt {
            span: join(start, end),
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<ForStmt, ParseError> {
        let start = self.expect(&TokenKind::KwFor, "'for'")?.span;
        self.expect(&TokenKind::LParen, "'('")?;

        let init = if self.at(&TokenKind::Semi) {
            None
        } else if self.at_var_decl_start() {
            Some(Box::new(Stmt::Var(self.parse_var_decl_no_semi()?)))
        } else {
            Some(Box::new(self.parse_assign_or_expr()?))
        };
        self.expect(&TokenKind::Semi, "';'")?;

        let cond = if self.at(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semi, "';'")?;

        let update = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_assign_or_expr()?))
        };
        self.expect(&TokenKind::RParen, "')'")?;

        let body = self.parse_block()?;
        Ok(ForStmt {
            span: join(start, body.span),
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<SwitchStmt, ParseError> {
        let start = self.expect(&TokenKind::KwSwitch, "'switch'")?.span;
        self.expect(&TokenKind::LParen, "'('")?;
        let scrutinee = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::KwDefault) {
                let body = self.parse_block()?;
                if default.is_some() {
                    return Err(ParseError {
                        message: "duplicate default case".to_string(),
                        span: body.span,
                    });
                }
                default = Some(body);
                continue;
            }
            let cstart = self.expect(&TokenKind::KwCase, "'case' or 'default'")?.span;
            let label = self.parse_expr()?;
            let body = self.parse_block()?;
            cases.push(SwitchCase {
                span: join(cstart, body.span),
                label,
                body,
            });
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;

        Ok(SwitchStmt {
            span: join(start, end),
            scrutinee,
            cases,
            default,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(0, lhs)
    }

    fn parse_binary_rhs(&mut self, min_prec: u8, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            let Some((op, prec)) = binary_op_of(&self.peek().kind) else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.advance();

            let mut rhs = self.parse_unary()?;
            loop {
                let Some((_, next_prec)) = binary_op_of(&self.peek().kind) else {
                    break;
                };
                if next_prec <= prec {
                    break;
                }
                rhs = self.parse_binary_rhs(next_prec, rhs)?;
            }

            let span = join(lhs.span, rhs.span);
            lhs = match op {
                BinaryLike::Plain(op) => Expr {
                    span,
                    kind: ExprKind::Binary {
                        left: Box::new(lhs),
                        op,
                        right: Box::new(rhs),
                    },
                },
                BinaryLike::Checked(op) => Expr {
                    span,
                    kind: ExprKind::Checked {
                        left: Box::new(lhs),
                        op,
                        right: Box::new(rhs),
                    },
                },
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        let op = match tok.kind {
            TokenKind::Bang => Some(cnx_ast::UnaryOp::Not),
            TokenKind::Minus => Some(cnx_ast::UnaryOp::Neg),
            TokenKind::Tilde => Some(cnx_ast::UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            let span = join(tok.span, expr.span);
            return Ok(Expr {
                span,
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match &self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_ident("member name")?;
                    let span = join(expr.span, member.span);
                    expr = Expr {
                        span,
                        kind: ExprKind::Member {
                            base: Box::new(expr),
                            member,
                        },
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let first = self.parse_expr()?;
                    let mut args = vec![first];
                    if self.eat(&TokenKind::Comma) {
                        args.push(self.parse_expr()?);
                    }
                    let end = self.expect(&TokenKind::RBracket, "']'")?.span;
                    let span = join(expr.span, end);
                    expr = Expr {
                        span,
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            args,
                        },
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.expect(&TokenKind::RParen, "')'")?.span;
                    let span = join(expr.span, end);
                    expr = Expr {
                        span,
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        let kind = match tok.kind {
            TokenKind::Int(text) => {
                self.advance();
                ExprKind::IntLit(text)
            }
            TokenKind::Float(text) => {
                self.advance();
                ExprKind::FloatLit(text)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::StringLit(s)
            }
            TokenKind::Char(c) => {
                self.advance();
                ExprKind::CharLit(c)
            }
            TokenKind::KwTrue => {
                self.advance();
                ExprKind::BoolLit(true)
            }
            TokenKind::KwFalse => {
                self.advance();
                ExprKind::BoolLit(false)
            }
            TokenKind::KwThis => {
                self.advance();
                ExprKind::This(tok.span)
            }
            TokenKind::KwGlobal => {
                self.advance();
                ExprKind::Global(tok.span)
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Ident(Spanned::new(tok.span, name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end = self.expect(&TokenKind::RParen, "')'")?.span;
                return Ok(Expr {
                    span: join(tok.span, end),
                    kind: ExprKind::Paren(Box::new(inner)),
                });
            }
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expr {
            span: tok.span,
            kind,
        })
    }
}

enum BinaryLike {
    Plain(BinOp),
    Checked(CheckedOp),
}

fn binary_op_of(kind: &TokenKind) -> Option<(BinaryLike, u8)> {
    use BinaryLike::*;
    let entry = match kind {
        TokenKind::OrOr => (Plain(BinOp::Or), 1),
        TokenKind::AndAnd => (Plain(BinOp::And), 2),
        TokenKind::Pipe => (Plain(BinOp::BitOr), 3),
        TokenKind::Caret => (Plain(BinOp::BitXor), 4),
        TokenKind::Amp => (Plain(BinOp::BitAnd), 5),
        TokenKind::Eq => (Plain(BinOp::Eq), 6),
        TokenKind::Neq => (Plain(BinOp::Ne), 6),
        TokenKind::Lt => (Plain(BinOp::Lt), 7),
        TokenKind::Gt => (Plain(BinOp::Gt), 7),
        TokenKind::Le => (Plain(BinOp::Le), 7),
        TokenKind::Ge => (Plain(BinOp::Ge), 7),
        TokenKind::Shl => (Plain(BinOp::Shl), 8),
        TokenKind::Shr => (Plain(BinOp::Shr), 8),
        TokenKind::Plus => (Plain(BinOp::Add), 9),
        TokenKind::Minus => (Plain(BinOp::Sub), 9),
        TokenKind::AddAssign => (Checked(CheckedOp::Add), 9),
        TokenKind::SubAssign => (Checked(CheckedOp::Sub), 9),
        TokenKind::Star => (Plain(BinOp::Mul), 10),
        TokenKind::Slash => (Plain(BinOp::Div), 10),
        TokenKind::Percent => (Plain(BinOp::Mod), 10),
        TokenKind::MulAssign => (Checked(CheckedOp::Mul), 10),
        _ => return None,
    };
    Some(entry)
}

fn assign_op_of(kind: &TokenKind) -> Option<AssignOp> {
    match kind {
        TokenKind::Assign => Some(AssignOp::Set),
        TokenKind::AddAssign => Some(AssignOp::Add),
        TokenKind::SubAssign => Some(AssignOp::Sub),
        TokenKind::MulAssign => Some(AssignOp::Mul),
        TokenKind::DivAssign => Some(AssignOp::Div),
        TokenKind::ModAssign => Some(AssignOp::Mod),
        TokenKind::AndAssign => Some(AssignOp::BitAnd),
        TokenKind::OrAssign => Some(AssignOp::BitOr),
        TokenKind::XorAssign => Some(AssignOp::BitXor),
        _ => None,
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::This(_) | ExprKind::Global(_) => true,
        ExprKind::Member { base, .. } => is_lvalue(base),
        ExprKind::Index { base, .. } => is_lvalue(base),
        _ => false,
    }
}

fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

pub fn parse_plain_int(text: &str) -> Option<u64> {
    let stripped = text.replace('_', "");
    let stripped = stripped
        .trim_end_matches("u8")
        .trim_end_matches("u16")
        .trim_end_matches("u32")
        .trim_end_matches("u64")
        .trim_end_matches("i8")
        .trim_end_matches("i16")
        .trim_end_matches("i32")
        .trim_end_matches("i64");
    if let Some(hex) = stripped.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = stripped.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()
    } else {
        stripped.parse::<u64>().ok()
    }
}
