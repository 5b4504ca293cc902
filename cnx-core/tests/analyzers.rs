use cnx_ast::LineIndex;
use cnx_core::{analyze_unit, AnalyzerDiagnostic, AnalyzerInput};
use cnx_parse::parse_source;
use cnx_symbols::SymbolTable;

fn analyze(src: &str) -> Vec<AnalyzerDiagnostic> {
    analyze_with_table(src, SymbolTable::new())
}

fn analyze_with_table(src: &str, table: SymbolTable) -> Vec<AnalyzerDiagnostic> {
    let unit = parse_source(src).expect("parse");
    let index = LineIndex::new(src);
    let input = AnalyzerInput {
        unit: &unit,
        src,
        index: &index,
        table: &table,
    };
    analyze_unit(&input)
}

#[test]
fn clean_unit_passes_all_analyzers() {
    let src = "fn main() -> i32 { u32 a <- 10; u32 b <- 2; return a / b; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn division_by_literal_zero_is_e0800() {
    let src = "fn main() -> i32 { u32 a <- 10; u32 b <- 0; return a / 0; }";
    let diags = analyze(src);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, "E0800");
    assert_eq!(diags[0].message, "Division by zero");
}

#[test]
fn division_by_zero_initialized_variable_is_e0800() {
    let src = "fn main() -> i32 { u32 a <- 10; u32 b <- 0; return a / b; }";
    let diags = analyze(src);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, "E0800");
    assert_eq!(diags[0].message, "Division by zero");
}

#[test]
fn reassigned_zero_variable_is_not_flagged() {
    let src = "fn main() -> i32 { u32 a <- 10; u32 b <- 0; b <- 2; return a / b; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn division_by_const_zero_identifier_is_e0800() {
    let src = "fn main() -> i32 { const u32 Z <- 0; u32 a <- 10; return a / Z; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0800");
}

#[test]
fn modulo_by_zero_is_e0802() {
    let src = "fn main() -> i32 { u32 a <- 10; return a % 0x0; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0802");
}

#[test]
fn direct_recursion_is_e0423_with_misra_reference() {
    let src = "fn g() -> void { g(); }";
    let diags = analyze(src);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, "E0423");
    assert_eq!(
        diags[0].message,
        "recursive call to 'g' is forbidden (MISRA C:2012 Rule 17.2)"
    );
}

#[test]
fn call_before_definition_is_e0422() {
    let src = "fn caller() -> void { late(); }\nfn late() -> void { }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0422");
    assert!(diags[0].message.contains("'late'"));
}

#[test]
fn call_after_definition_is_accepted() {
    let src = "fn early() -> void { }\nfn caller() -> void { early(); }";
    assert!(analyze(src).is_empty());
}

#[test]
fn stdlib_allow_list_accepts_printf() {
    let src = "fn main() -> i32 { printf(\"hi\"); return 0; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn header_function_is_accepted_via_symbol_table() {
    use cnx_symbols::{SourceLanguage, Symbol, SymbolKind};
    let mut table = SymbolTable::new();
    table.add_symbols(vec![Symbol::new(
        "uart_send",
        SymbolKind::Function,
        SourceLanguage::C,
        "uart.h",
    )]);
    let src = "fn main() -> i32 { uart_send(1); return 0; }";
    assert!(analyze_with_table(src, table).is_empty());
}

#[test]
fn float_modulo_is_e0804() {
    let src = "fn main() -> i32 { f32 x <- 1.5; u32 y <- 0; y <- x % 2; return 0; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0804");
    assert!(diags[0].message.contains("'x'"));
}

#[test]
fn float_literal_modulo_is_e0804() {
    let src = "fn main() -> i32 { u32 y <- 0; y <- 1.5 % 2; return 0; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0804");
}

#[test]
fn use_of_uninitialized_variable_is_e0200() {
    let src = "fn main() -> i32 { u32 x; return x; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0200");
    assert!(diags[0].message.contains("'x'"));
}

#[test]
fn branch_initializing_only_one_path_is_e0200() {
    let src = "fn f(bool c) -> u32 { u32 x; if (c) { x <- 1; } return x; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0200");
}

#[test]
fn branch_initializing_both_paths_is_accepted() {
    let src = "fn f(bool c) -> u32 { u32 x; if (c) { x <- 1; } else { x <- 2; } return x; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn while_body_initialization_does_not_survive_the_loop() {
    let src = "fn f(bool c) -> u32 { u32 x; while (c) { x <- 1; } return x; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0200");
}

#[test]
fn do_while_body_initialization_survives() {
    let src = "fn f(bool c) -> u32 { u32 x; do { x <- 1; } while (c); return x; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn parameters_count_as_initialized() {
    let src = "fn f(u32 n) -> u32 { return n; }";
    assert!(analyze(src).is_empty());
}

#[test]
fn compound_assignment_reads_its_target() {
    let src = "fn f() -> u32 { u32 x; x +<- 1; return x; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0200");
}

#[test]
fn reserved_parameter_name_is_e0100() {
    let src = "fn f(u32 cnx_state) -> void { }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0100");
}

#[test]
fn struct_field_named_length_is_e0101() {
    let src = "struct Buffer { u8 data[16]; u32 length; }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0101");
    assert!(diags[0].message.contains("Buffer"));
}

#[test]
fn unchecked_malloc_pointer_is_e0210() {
    let src = "fn f() -> void { u32 p <- malloc(16); free(p); }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "E0210");
    assert!(diags[0].message.contains("malloc"));
}

#[test]
fn null_guarded_malloc_pointer_is_accepted() {
    let src = "fn f() -> void { u32 p <- malloc(16); if (p != 0) { free(p); } }";
    assert!(analyze(src).is_empty());
}

#[test]
fn pointer_as_call_argument_is_not_a_guard() {
    // `isalpha(p)` uses the pointer; it does not null-check it.
    let src = "fn f() -> void { u32 p <- malloc(16); if (isalpha(p)) { free(p); } }";
    let diags = analyze(src);
    assert!(!diags.is_empty());
    assert!(diags.iter().all(|d| d.code == "E0210"));
    assert!(diags[0].message.contains("malloc"));
}

#[test]
fn bare_truthiness_and_negation_count_as_guards() {
    let src = "fn f() -> void { u32 p <- malloc(16); if (p) { free(p); } }";
    assert!(analyze(src).is_empty());

    let src = "fn g() -> void { u32 p <- malloc(16); if (!p) { return; } free(p); }";
    assert!(analyze(src).is_empty());
}

#[test]
fn nested_comment_is_misra_3_1() {
    let src = "// outer /* inner\nfn f() -> void { }";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "MISRA-3.1");
}

#[test]
fn comment_splice_is_misra_3_2() {
    let src = "fn f() -> void { } // trailing \\\n";
    let diags = analyze(src);
    assert_eq!(diags[0].code, "MISRA-3.2");
}

#[test]
fn first_failing_analyzer_wins() {
    // Uninitialized read (analyzer 3) and recursion (analyzer 4): only the
    // earlier analyzer's findings surface.
    let src = "fn f() -> u32 { u32 x; f(); return x; }";
    let diags = analyze(src);
    assert!(diags.iter().all(|d| d.code == "E0200"));
}

#[test]
fn diagnostic_render_format() {
    let src = "fn g() -> void { g(); }";
    let diags = analyze(src);
    let rendered = diags[0].render();
    assert!(rendered.starts_with("error[E0423]:"));
    assert!(rendered.contains(" at 1:"));
}
