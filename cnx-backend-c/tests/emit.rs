use cnx_ast::LineIndex;
use cnx_backend_c::{emit_unit, CUnit, EmitOptions, GeneratorError};
use cnx_parse::parse_source;
use cnx_symbols::{collect_unit, SymbolTable};

fn emit_with(src: &str, options: EmitOptions) -> Result<CUnit, GeneratorError> {
    let unit = parse_source(src).expect("parse");
    let index = LineIndex::new(src);
    let collected = collect_unit("test.cnx", &unit, &index);
    assert!(collected.errors.is_empty(), "collect errors: {:?}", collected.errors);

    let mut table = SymbolTable::new();
    table.add_symbols(collected.symbols.clone());
    for (name, fields) in &collected.structs {
        table.add_struct_fields(name, fields.clone());
    }
    for (name, info) in &collected.enums {
        if let Some(bits) = info.bits {
            table.add_enum_bit_width(name, bits);
        }
    }

    emit_unit(&table, &collected, &unit, &options)
}

fn emit(src: &str) -> String {
    emit_with(src, EmitOptions::default()).expect("emit").code
}

#[test]
fn emits_banner_sentinel_and_base_includes() {
    let code = emit("fn main() -> i32 { return 0; }");
    assert!(code.starts_with("// Generated by C-Next Transpiler"));
    assert!(code.contains("#include <stdint.h>"));
    assert!(code.contains("#include <stdbool.h>"));
    assert!(code.contains("int main(void) {"));
    assert!(code.contains("return 0;"));
}

#[test]
fn emission_is_deterministic() {
    let src = "bitmap8 F { a, b[3], c[4] }\nfn main() -> i32 { F f; f.a <- true; f.b <- 5; return 0; }";
    assert_eq!(emit(src), emit(src));
}

#[test]
fn bitmap_write_is_read_modify_write() {
    let src = "bitmap8 F { a, b[3], c[4] }\nfn main() -> i32 { F f; f.a <- true; f.b <- 5; return 0; }";
    let code = emit(src);
    assert!(code.contains("typedef uint8_t F;"));
    // One read, one write of the backing integer, masks 0x1<<0 and 0x7<<1.
    assert!(code.contains("f = (f & ~(0x1u << 0)) | (((true) & 0x1u) << 0);"));
    assert!(code.contains("f = (f & ~(0x7u << 1)) | (((5) & 0x7u) << 1);"));
}

#[test]
fn bitmap_field_overflow_literal_is_rejected() {
    let src = "bitmap8 F { a, b[3], c[4] }\nfn main() -> i32 { F f; f.b <- 9; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("does not fit"), "{}", err.message);
}

#[test]
fn scope_counter_demotes_to_function_static() {
    let src = "scope M { private u32 counter; public fn inc() -> void { this.counter <- this.counter + 1; } }";
    let code = emit(src);
    assert!(code.contains("void M_inc(void) {"));
    assert!(code.contains("static uint32_t counter = 0;"));
    assert!(code.contains("counter = (counter) + (1);"));
    // The demoted variable gets no file-scope storage.
    assert!(!code.contains("static uint32_t M_counter"));
}

#[test]
fn shared_scope_variable_stays_file_static() {
    let src = "scope M { private u32 shared; \
               public fn set() -> void { this.shared <- 1; } \
               public fn get() -> u32 { return this.shared; } }";
    let code = emit(src);
    assert!(code.contains("static uint32_t M_shared = 0;"));
    assert!(code.contains("M_shared = 1;"));
}

#[test]
fn private_const_literal_is_inlined_not_stored() {
    let src = "scope M { private const u32 LIMIT <- 42; public fn f() -> u32 { return this.LIMIT; } }";
    let code = emit(src);
    assert!(code.contains("return 42;"));
    assert!(!code.contains("M_LIMIT"));
}

#[test]
fn clamp_compound_uses_overflow_helper() {
    let src = "fn main() -> i32 { u8 x <- 255; u8 y <- x +<- 1; x -<- 1; return 0; }";
    let code = emit(src);
    assert!(code.contains("uint8_t y = cnx_clamp_add_u8(x, 1);"));
    assert!(code.contains("x = cnx_clamp_sub_u8(x, 1);"));
    // Helpers arrive once, alphabetically, clamping at the type limits.
    let add_at = code.find("static inline uint8_t cnx_clamp_add_u8").expect("add helper");
    let sub_at = code.find("static inline uint8_t cnx_clamp_sub_u8").expect("sub helper");
    assert!(add_at < sub_at);
    assert!(code.contains("return UINT8_MAX;"));
}

#[test]
fn wrap_variable_uses_native_compound() {
    let src = "fn main() -> i32 { wrap u8 x <- 0; x +<- 1; return 0; }";
    let code = emit(src);
    assert!(code.contains("x += 1;"));
    assert!(!code.contains("cnx_clamp_add_u8"));
}

#[test]
fn literal_out_of_range_is_rejected() {
    let err = emit_with("fn main() -> i32 { u8 x <- 300; return 0; }", EmitOptions::default())
        .expect_err("expected error");
    assert!(err.message.contains("out of range"), "{}", err.message);
}

#[test]
fn narrowing_assignment_suggests_bit_slice() {
    let src = "fn main() -> i32 { u32 a <- 10; u8 b <- a; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("narrowing"));
    assert!(err.message.contains("v[0, 8]"));
}

#[test]
fn bit_slice_read_emits_shift_and_mask() {
    let src = "fn main() -> i32 { u32 v <- 0xFF; u8 b <- v[0, 8]; return 0; }";
    let code = emit(src);
    assert!(code.contains("((v >> 0) & 0xFFu)"));
}

#[test]
fn register_members_become_volatile_macros() {
    let src = "register UART @ 0x4000_0000 { DR: rw u32 @ 0x00; SR: ro u32 @ 0x04; }\n\
               fn main() -> i32 { UART.DR <- 65; return 0; }";
    let code = emit(src);
    assert!(code.contains("#define UART_DR (*(volatile uint32_t *)(0x40000000UL + 0x00UL))"));
    assert!(code.contains("#define UART_SR (*(volatile uint32_t *)(0x40000000UL + 0x04UL))"));
    assert!(code.contains("UART_DR = 65;"));
}

#[test]
fn read_only_register_member_rejects_writes() {
    let src = "register UART @ 0x4000_0000 { SR: ro u32 @ 0x04; }\n\
               fn main() -> i32 { UART.SR <- 1; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("read-only"));
}

#[test]
fn write_one_to_clear_member_rejects_zero() {
    let src = "register UART @ 0x4000_0000 { ICR: w1c u32 @ 0x08; }\n\
               fn main() -> i32 { UART.ICR <- 0; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("w1c"));
}

#[test]
fn register_bitmap_field_write_is_rmw_on_the_macro() {
    let src = "bitmap32 Ctrl { en, speed[3], rest[28] }\n\
               register UART @ 0x4000_0000 { CR: rw u32 @ 0x00 bitmap Ctrl; }\n\
               fn main() -> i32 { UART.CR.speed <- 5; return 0; }";
    let code = emit(src);
    assert!(code.contains("UART_CR = (UART_CR & ~(0x7u << 1)) | (((5) & 0x7u) << 1);"));
}

#[test]
fn safe_div_rewrites_to_typed_helper() {
    let src = "fn main() -> i32 { u32 q <- 0; safe_div(q, 10, 3, 0); return 0; }";
    let code = emit(src);
    assert!(code.contains("cnx_safe_div_u32(&(q), 10, 3, 0);"));
    assert!(code.contains("static inline bool cnx_safe_div_u32(uint32_t *out"));
}

#[test]
fn string_assignment_is_bounded_copy() {
    let src = "fn main() -> i32 { string<15> name; name <- \"hello\"; return 0; }";
    let code = emit(src);
    assert!(code.contains("char name[16] = \"\";"));
    assert!(code.contains("strncpy(name, \"hello\", 15u);"));
    assert!(code.contains("name[15u] = '\\0';"));
    assert!(code.contains("#include <string.h>"));
}

#[test]
fn oversized_string_literal_is_rejected() {
    let src = "fn main() -> i32 { string<3> s; s <- \"toolong\"; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("exceeds capacity"));
}

#[test]
fn string_equality_lowers_to_strcmp() {
    let src = "fn check(string<15> a) -> bool { return a = \"on\"; }";
    let code = emit(src);
    assert!(code.contains("strcmp(a, \"on\") == 0"));
}

#[test]
fn string_concat_lowers_to_strncpy_then_strncat() {
    let src = "fn main() -> i32 { string<31> out; string<15> a; a <- \"x\"; out <- a + \"y\"; return 0; }";
    let code = emit(src);
    assert!(code.contains("strncpy(out, a, 31u);"));
    assert!(code.contains("strncat(out, \"y\", 31u - strlen(out));"));
}

#[test]
fn pass_by_reference_with_rvalue_materialization() {
    let src = "fn bump(u32 n) -> void { n <- n + 1; }\nfn main() -> i32 { u32 v <- 1; bump(v); bump(7); return 0; }";
    let code = emit(src);
    // Modified u32 parameter passes by pointer, derefs inside the body.
    assert!(code.contains("void bump(uint32_t *n) {"));
    assert!(code.contains("(*n) = ((*n)) + (1);"));
    assert!(code.contains("bump(&(v));"));
    // An rvalue argument becomes a compound literal in C mode.
    assert!(code.contains("bump(&(uint32_t){7});"));
}

#[test]
fn unmodified_pointer_parameter_gets_const() {
    let src = "fn peek(u32 n) -> u32 { return n; }\nfn main() -> i32 { u32 v <- 1; u32 w <- peek(v); return 0; }";
    let code = emit(src);
    assert!(code.contains("uint32_t peek(const uint32_t *n) {"));
}

#[test]
fn modification_propagates_through_call_chain() {
    let src = "fn inner(u32 n) -> void { n <- 0; }\n\
               fn outer(u32 m) -> void { inner(m); }\n\
               fn main() -> i32 { return 0; }";
    let code = emit(src);
    // `m` is modified only by being passed to a modified callee param.
    assert!(code.contains("void outer(uint32_t *m) {"));
}

#[test]
fn small_primitives_pass_by_value() {
    let src = "fn tick(u8 n) -> void { n <- 0; }\nfn main() -> i32 { tick(1); return 0; }";
    let code = emit(src);
    assert!(code.contains("void tick(uint8_t n) {"));
    assert!(code.contains("tick(1);"));
}

#[test]
fn cpp_mode_materializes_temp_instead_of_compound_literal() {
    let src = "fn bump(u32 n) -> void { n <- n + 1; }\nfn main() -> i32 { bump(7); return 0; }";
    let options = EmitOptions {
        cpp_mode: true,
        ..EmitOptions::default()
    };
    let code = emit_with(src, options).expect("emit").code;
    assert!(code.contains("uint32_t cnx_tmp_0 = 7;"));
    assert!(code.contains("bump(&cnx_tmp_0);"));
    assert!(!code.contains("&(uint32_t){7}"));
}

#[test]
fn typed_enum_preserves_declared_width() {
    let src = "enum Mode : u16 { Idle, Run <- 5 }\nfn main() -> i32 { Mode m <- Mode.Idle; m <- Mode.Run; return 0; }";
    let code = emit(src);
    assert!(code.contains("typedef uint16_t Mode;"));
    assert!(code.contains("#define Mode_Idle ((Mode)0u)"));
    assert!(code.contains("#define Mode_Run ((Mode)5u)"));
    assert!(code.contains("Mode m = Mode_Idle;"));
}

#[test]
fn switch_on_enum_requires_exhaustive_cases() {
    let src = "enum Mode : u8 { Idle, Run }\n\
               fn f(Mode m) -> void { switch (m) { case Idle { } } }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("missing case(s) Run"));
}

#[test]
fn switch_resolves_unqualified_labels_against_scrutinee_enum() {
    let src = "enum Mode : u8 { Idle, Run }\n\
               fn f(Mode m) -> void { switch (m) { case Idle { } case Run { } } }";
    let code = emit(src);
    assert!(code.contains("case Mode_Idle:"));
    assert!(code.contains("case Mode_Run:"));
}

#[test]
fn unqualified_enum_label_in_non_enum_switch_suggests_qualification() {
    let src = "enum Mode : u8 { Idle, Run }\n\
               fn f(u8 m) -> void { switch (m) { case Idle { } default { } } }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("did you mean 'Mode.Idle'"));
}

#[test]
fn constant_folding_collapses_literal_chains() {
    let src = "fn main() -> i32 { u32 x <- 2 + 3 * 4; return 0; }";
    let code = emit(src);
    assert!(code.contains("uint32_t x = 14;"));
}

#[test]
fn literal_suffix_transform() {
    let src = "fn main() -> i32 { u64 a <- 5u64; i64 b <- 7i64; u8 c <- 9u8; f32 d <- 1.5f32; return 0; }";
    let code = emit(src);
    assert!(code.contains("uint64_t a = 5ULL;"));
    assert!(code.contains("int64_t b = 7LL;"));
    assert!(code.contains("uint8_t c = 9;"));
    assert!(code.contains("float d = 1.5f;"));
}

#[test]
fn binary_literals_respell_as_hex() {
    let src = "fn main() -> i32 { u8 m <- 0b1010; return 0; }";
    let code = emit(src);
    assert!(code.contains("uint8_t m = 0xA;"));
}

#[test]
fn critical_block_saves_and_restores_interrupt_mask() {
    let src = "fn main() -> i32 { critical { u8 x <- 1; } return 0; }";
    let code = emit(src);
    assert!(code.contains("uint32_t cnx_primask = __get_PRIMASK();"));
    assert!(code.contains("__disable_irq();"));
    assert!(code.contains("__set_PRIMASK(cnx_primask);"));
    assert!(code.contains("#include \"cmsis_compiler.h\""));
}

#[test]
fn do_while_requires_boolean_condition() {
    let src = "fn main() -> i32 { u32 n <- 1; do { n <- n - 1; } while (n); return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("boolean"));
}

#[test]
fn shift_wider_than_type_is_rejected() {
    let src = "fn main() -> i32 { u8 x <- 1; u8 y <- x << 9; return 0; }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("shift"));
}

#[test]
fn cnx_include_rewrites_to_header() {
    let src = "#include \"util.cnx\"\n#include <stdio.h>\nfn main() -> i32 { return 0; }";
    let code = emit(src);
    assert!(code.contains("#include \"util.h\""));
    assert!(code.contains("#include <stdio.h>"));
}

#[test]
fn header_companion_lists_exported_declarations() {
    let src = "scope M { public fn ping() -> void { } private fn hidden() -> void { } }\n\
               fn main() -> i32 { return 0; }";
    let options = EmitOptions {
        emit_header: true,
        unit_stem: "drivers/main".to_string(),
        ..EmitOptions::default()
    };
    let out = emit_with(src, options).expect("emit");
    let header = out.header.expect("header");
    assert!(header.contains("#ifndef CNX_DRIVERS_MAIN_H"));
    assert!(header.contains("void M_ping(void);"));
    assert!(!header.contains("M_hidden"));
    assert!(!header.contains("int main"));
    assert!(header.contains("// Generated by C-Next Transpiler"));
}

#[test]
fn private_scope_function_is_static() {
    let src = "scope M { private fn helper() -> void { } public fn run() -> void { this.helper(); } }";
    let code = emit(src);
    assert!(code.contains("static void M_helper(void) {"));
    assert!(code.contains("void M_run(void) {"));
    assert!(code.contains("M_helper();"));
}

#[test]
fn cross_scope_private_access_is_rejected() {
    let src = "scope A { private u32 secret; }\n\
               scope B { public fn peek() -> u32 { return A.secret; } }";
    let err = emit_with(src, EmitOptions::default()).expect_err("expected error");
    assert!(err.message.contains("private"));
}
