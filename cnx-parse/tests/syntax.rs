use cnx_ast::{AssignOp, ExprKind, Item, ScopeDecl, Stmt, Visibility};
use cnx_parse::parse_source;

#[test]
fn parses_function_with_declarations() {
    let src = "fn main() -> i32 { u32 a <- 10; u32 b <- 0; return a / b; }";
    let unit = parse_source(src).expect("parse");
    assert_eq!(unit.items.len(), 1);
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    assert_eq!(f.name.node, "main");
    assert_eq!(f.ret.name, "i32");
    assert_eq!(f.body.stmts.len(), 3);
}

#[test]
fn parses_scope_with_visibility_and_this() {
    let src = "scope M { private u32 counter; public fn inc() -> void { this.counter <- this.counter + 1; } }";
    let unit = parse_source(src).expect("parse");
    let Item::Scope(s) = &unit.items[0] else {
        panic!("expected scope");
    };
    assert_eq!(s.name.node, "M");
    assert_eq!(s.members.len(), 2);
    assert_eq!(s.members[0].visibility, Visibility::Private);
    assert_eq!(s.members[1].visibility, Visibility::Public);
    let ScopeDecl::Function(f) = &s.members[1].decl else {
        panic!("expected function member");
    };
    let Stmt::Assign(a) = &f.body.stmts[0] else {
        panic!("expected assignment");
    };
    assert!(matches!(&a.target.kind, ExprKind::Member { .. }));
}

#[test]
fn parses_bitmap_with_field_widths() {
    let src = "bitmap8 F { a, b[3], c[4] }";
    let unit = parse_source(src).expect("parse");
    let Item::Bitmap(b) = &unit.items[0] else {
        panic!("expected bitmap");
    };
    assert_eq!(b.width, 8);
    assert_eq!(b.fields.len(), 3);
    assert_eq!(b.fields[0].width, 1);
    assert_eq!(b.fields[1].width, 3);
    assert_eq!(b.fields[2].width, 4);
}

#[test]
fn parses_register_with_access_modes() {
    let src = "register UART @ 0x4000_0000 { DR: rw u32 @ 0x00; SR: ro u32 @ 0x04 bitmap Status; }";
    let unit = parse_source(src).expect("parse");
    let Item::Register(r) = &unit.items[0] else {
        panic!("expected register");
    };
    assert_eq!(r.address, 0x4000_0000);
    assert_eq!(r.members.len(), 2);
    assert_eq!(r.members[1].bitmap.as_ref().map(|i| i.node.as_str()), Some("Status"));
}

#[test]
fn parses_typed_enum_with_values() {
    let src = "enum Mode : u16 { Idle, Run <- 5, Stop }";
    let unit = parse_source(src).expect("parse");
    let Item::Enum(e) = &unit.items[0] else {
        panic!("expected enum");
    };
    assert_eq!(e.backing.as_ref().map(|t| t.name.as_str()), Some("u16"));
    assert_eq!(e.members[1].value.as_ref().map(|v| v.node), Some(5));
    assert!(e.members[2].value.is_none());
}

#[test]
fn compound_assignment_statement() {
    let src = "fn f() -> void { u8 x <- 0; x +<- 1; }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::Assign(a) = &f.body.stmts[1] else {
        panic!("expected compound assignment");
    };
    assert_eq!(a.op, AssignOp::Add);
    assert!(a.op.is_compound());
}

#[test]
fn checked_op_in_expression_position() {
    let src = "fn f() -> void { u8 x <- 255; u8 y <- x +<- 1; }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::Var(v) = &f.body.stmts[1] else {
        panic!("expected declaration");
    };
    let init = v.init.as_ref().expect("initializer");
    assert!(matches!(init.kind, ExprKind::Checked { .. }));
}

#[test]
fn bit_range_subscript_takes_two_args() {
    let src = "fn f() -> void { u32 v <- 0; u32 w <- v[0, 4]; }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::Var(v) = &f.body.stmts[1] else {
        panic!("expected declaration");
    };
    let init = v.init.as_ref().expect("initializer");
    let ExprKind::Index { args, .. } = &init.kind else {
        panic!("expected index expression");
    };
    assert_eq!(args.len(), 2);
}

#[test]
fn bounded_string_declaration() {
    let src = "string<31> name <- \"hello\";";
    let unit = parse_source(src).expect("parse");
    let Item::Var(v) = &unit.items[0] else {
        panic!("expected variable");
    };
    assert_eq!(v.ty.string_capacity, Some(31));
}

#[test]
fn source_equality_is_single_equals() {
    let src = "fn f(u8 a, u8 b) -> bool { return a = b; }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::Return(r) = &f.body.stmts[0] else {
        panic!("expected return");
    };
    let value = r.value.as_ref().expect("return value");
    let ExprKind::Binary { op, .. } = &value.kind else {
        panic!("expected binary expression");
    };
    assert_eq!(*op, cnx_ast::BinOp::Eq);
}

#[test]
fn rejects_non_lvalue_assignment_target() {
    let src = "fn f() -> void { 1 <- 2; }";
    let err = parse_source(src).expect_err("expected parse error");
    assert!(err.message.contains("l-value"), "unexpected error: {}", err.message);
}

#[test]
fn parses_switch_with_cases_and_default() {
    let src = "fn f(u8 m) -> void { switch (m) { case 1 { } case 2 { } default { } } }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::Switch(s) = &f.body.stmts[0] else {
        panic!("expected switch");
    };
    assert_eq!(s.cases.len(), 2);
    assert!(s.default.is_some());
}

#[test]
fn parses_critical_block() {
    let src = "fn f() -> void { critical { u8 x <- 1; } }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    assert!(matches!(f.body.stmts[0], Stmt::Critical(_)));
}

#[test]
fn parses_for_loop_with_compound_update() {
    let src = "fn f() -> void { for (u8 i <- 0; i < 10; i +<- 1) { } }";
    let unit = parse_source(src).expect("parse");
    let Item::Function(f) = &unit.items[0] else {
        panic!("expected function");
    };
    let Stmt::For(fs) = &f.body.stmts[0] else {
        panic!("expected for");
    };
    assert!(fs.init.is_some());
    assert!(fs.cond.is_some());
    assert!(matches!(fs.update.as_deref(), Some(Stmt::Assign(_))));
}
