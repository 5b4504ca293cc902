use cnx_ast::{LineIndex, Stmt};
use cnx_backend_c::{classify, AssignmentContext, AssignmentKind, EmitCtx};
use cnx_core::TypeInfo;
use cnx_parse::parse_source;
use cnx_symbols::{collect_unit, CollectedUnit, SymbolTable};

const PRELUDE: &str = "\
bitmap8 Flags { ready, mode[3], level[4] }
bitmap32 Ctrl { en, speed[3], rest[28] }
register UART @ 0x4000_0000 { DR: rw u32 @ 0x00; CR: rw u32 @ 0x04 bitmap Ctrl; ICR: w1c u32 @ 0x08; }
struct Packet { Flags flags; u8 len; }
scope Hal {
    private u32 ticks;
    public register TIM @ 0x4100_0000 { CNT: rw u32 @ 0x00; }
    public fn touch() -> void { this.ticks <- this.ticks + 1; }
}
";

struct Fixture {
    collected: CollectedUnit,
    table: SymbolTable,
    unit: cnx_ast::Unit,
}

/// Parse the prelude plus one function wrapping the statement under test.
fn fixture(body: &str) -> Fixture {
    let src = format!("{PRELUDE}\nfn probe() -> void {{\n{body}\n}}\n");
    let unit = parse_source(&src).expect("parse");
    let index = LineIndex::new(&src);
    let collected = collect_unit("probe.cnx", &unit, &index);
    assert!(collected.errors.is_empty(), "collect errors: {:?}", collected.errors);
    let mut table = SymbolTable::new();
    table.add_symbols(collected.symbols.clone());
    Fixture {
        collected,
        table,
        unit,
    }
}

fn classify_last(fixture: &Fixture, declares: &[(&str, &str)]) -> AssignmentKind {
    let mut ctx = EmitCtx::new(&fixture.table, &fixture.collected);
    for (name, ty) in declares {
        let info = ctx.resolve_type_info(TypeInfo::scalar(*ty));
        ctx.registry.declare(name.to_string(), info);
    }

    let func = fixture
        .unit
        .items
        .iter()
        .find_map(|i| match i {
            cnx_ast::Item::Function(f) if f.name.node == "probe" => Some(f),
            _ => None,
        })
        .expect("probe function");

    // Feed the leading declarations through the registry, then classify
    // the final assignment.
    for stmt in &func.body.stmts {
        if let Stmt::Var(v) = stmt {
            let info = ctx.resolve_type_info(cnx_core::TypeInfo::of_decl(v));
            ctx.registry.declare(v.name.node.clone(), info);
        }
    }
    let assign = func
        .body
        .stmts
        .iter()
        .rev()
        .find_map(|s| match s {
            Stmt::Assign(a) => Some(a),
            _ => None,
        })
        .expect("assignment statement");

    let acx = AssignmentContext::build(&ctx, assign);
    classify(&ctx, &acx)
}

fn kind_of(body: &str) -> AssignmentKind {
    kind_with(body, &[])
}

fn kind_with(body: &str, declares: &[(&str, &str)]) -> AssignmentKind {
    let f = fixture(body);
    classify_last(&f, declares)
}

#[test]
fn bitmap_field_bool_and_wide() {
    assert_eq!(kind_of("Flags f; f.ready <- true;"), AssignmentKind::BitmapFieldBool);
    assert_eq!(kind_of("Flags f; f.mode <- 5;"), AssignmentKind::BitmapFieldWide);
}

#[test]
fn struct_member_bitmap_field() {
    assert_eq!(
        kind_of("Packet p; p.flags.ready <- true;"),
        AssignmentKind::StructBitmapFieldBool
    );
    assert_eq!(
        kind_of("Packet p; p.flags.mode <- 3;"),
        AssignmentKind::StructBitmapFieldWide
    );
}

#[test]
fn register_bitmap_field_plain_and_scoped() {
    assert_eq!(
        kind_of("UART.CR.en <- true;"),
        AssignmentKind::RegisterBitmapFieldBool
    );
    assert_eq!(
        kind_of("UART.CR.speed <- 5;"),
        AssignmentKind::RegisterBitmapFieldWide
    );
}

#[test]
fn bitmap_array_element_field() {
    assert_eq!(
        kind_of("Flags fs[4]; fs[1].ready <- true;"),
        AssignmentKind::BitmapArrayElementField
    );
}

#[test]
fn register_member_and_subscripts() {
    assert_eq!(kind_of("UART.DR <- 65;"), AssignmentKind::RegisterMember);
    assert_eq!(kind_of("UART.DR[3] <- true;"), AssignmentKind::RegisterMemberBit);
    assert_eq!(
        kind_of("UART.DR[0, 4] <- 7;"),
        AssignmentKind::RegisterMemberBitRange
    );
}

#[test]
fn scoped_register_member() {
    assert_eq!(
        kind_of("Hal.TIM.CNT <- 0x10;"),
        AssignmentKind::ScopedRegisterMember
    );
}

#[test]
fn multi_dim_array_element() {
    assert_eq!(
        kind_of("u8 grid[4][4]; grid[1][2] <- 9;"),
        AssignmentKind::MultiDimArrayElement
    );
}

#[test]
fn simple_array_and_slice() {
    assert_eq!(kind_of("u8 buf[8]; buf[3] <- 1;"), AssignmentKind::ArrayElement);
    assert_eq!(
        kind_of("u8 buf[8]; u8 src[4]; buf[2, 4] <- src;"),
        AssignmentKind::ArraySlice
    );
}

#[test]
fn scalar_bit_and_bit_range() {
    assert_eq!(kind_of("u32 v <- 0; v[3] <- true;"), AssignmentKind::ScalarBit);
    assert_eq!(kind_of("u32 v <- 0; v[0, 4] <- 7;"), AssignmentKind::ScalarBitRange);
}

#[test]
fn clamp_compound_and_wrap_fallthrough() {
    assert_eq!(kind_of("u8 x <- 0; x +<- 1;"), AssignmentKind::ClampCompound);
    assert_eq!(kind_of("wrap u8 x <- 0; x +<- 1;"), AssignmentKind::Simple);
}

#[test]
fn atomic_compound_takes_priority_over_clamp() {
    assert_eq!(
        kind_of("atomic u32 n <- 0; n +<- 1;"),
        AssignmentKind::AtomicCompound
    );
}

#[test]
fn string_kinds() {
    assert_eq!(
        kind_of("string<15> s; s <- \"hi\";"),
        AssignmentKind::StringCopy
    );
    assert_eq!(
        kind_of("string<15> s; string<7> a; a <- \"x\"; s <- a + \"y\";"),
        AssignmentKind::StringConcat
    );
    assert_eq!(
        kind_of("string<15> s; string<15> src; src <- \"abcdef\"; s <- substring(src, 1, 3);"),
        AssignmentKind::StringSubstring
    );
}

#[test]
fn simple_identifier_last() {
    assert_eq!(kind_of("u32 x <- 0; x <- 1;"), AssignmentKind::Simple);
}

#[test]
fn classification_context_flags() {
    let f = fixture("u8 buf[8]; buf[3] <- 1;");
    let func = f
        .unit
        .items
        .iter()
        .find_map(|i| match i {
            cnx_ast::Item::Function(fun) if fun.name.node == "probe" => Some(fun),
            _ => None,
        })
        .expect("probe");
    let assign = func
        .body
        .stmts
        .iter()
        .find_map(|s| match s {
            Stmt::Assign(a) => Some(a),
            _ => None,
        })
        .expect("assign");
    let ctx = EmitCtx::new(&f.table, &f.collected);
    let acx = AssignmentContext::build(&ctx, assign);
    assert!(acx.has_array_access);
    assert!(!acx.has_member_access);
    assert!(!acx.is_compound);
    assert!(!acx.is_simple_identifier);
    assert_eq!(acx.idents, vec!["buf".to_string()]);
    assert_eq!(acx.subscript_arity, vec![1]);
}
