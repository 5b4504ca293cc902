use std::fs;
use std::path::Path;

use cnx::pipeline::{run_build, BuildOptions, BuildReport};

fn build(dir: &Path) -> BuildReport {
    build_with(dir, false)
}

fn build_with(dir: &Path, headers: bool) -> BuildReport {
    run_build(&BuildOptions {
        inputs: vec![dir.join("src")],
        include_dirs: vec![dir.join("include")],
        out_dir: dir.join("build"),
        project_root: dir.to_path_buf(),
        emit_headers: headers,
        debug: false,
    })
}

fn setup(sources: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("src")).expect("mkdir src");
    fs::create_dir_all(dir.path().join("include")).expect("mkdir include");
    for (name, text) in sources {
        fs::write(dir.path().join("src").join(name), text).expect("write source");
    }
    dir
}

#[test]
fn division_by_zero_rejects_the_unit() {
    let dir = setup(&[(
        "main.cnx",
        "fn main() -> i32 { u32 a <- 10; u32 b <- 0; return a / b; }",
    )]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors[0].contains("error[E0800]: Division by zero"));
    assert!(report.emitted.is_empty());
}

#[test]
fn reassigned_divisor_is_accepted() {
    let dir = setup(&[(
        "main.cnx",
        "fn main() -> i32 { u32 a <- 10; u32 b <- 0; b <- 2; return a / b; }",
    )]);
    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
}

#[test]
fn bitmap_unit_emits_typedef_and_rmw() {
    let dir = setup(&[(
        "main.cnx",
        "bitmap8 F { a, b[3], c[4] }\nfn main() -> i32 { F f; f.a <- true; f.b <- 5; return 0; }",
    )]);
    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);

    let code = fs::read_to_string(dir.path().join("build/main.c")).expect("output");
    assert!(code.contains("typedef uint8_t F;"));
    assert!(code.contains("f = (f & ~(0x1u << 0)) | (((true) & 0x1u) << 0);"));
    assert!(code.contains("f = (f & ~(0x7u << 1)) | (((5) & 0x7u) << 1);"));
}

#[test]
fn direct_recursion_rejects_with_e0423() {
    let dir = setup(&[("main.cnx", "fn g() -> void { g(); }")]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors[0]
        .contains("error[E0423]: recursive call to 'g' is forbidden (MISRA C:2012 Rule 17.2)"));
}

#[test]
fn scope_counter_emits_static_storage() {
    let dir = setup(&[(
        "main.cnx",
        "scope M { private u32 counter; public fn inc() -> void { this.counter <- this.counter + 1; } }",
    )]);
    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);

    let code = fs::read_to_string(dir.path().join("build/main.c")).expect("output");
    assert!(code.contains("void M_inc(void) {"));
    // `counter` has a single user, so it lives as that function's static.
    assert!(code.contains("static uint32_t counter = 0;"));
}

#[test]
fn parse_error_unit_does_not_suppress_its_siblings() {
    let dir = setup(&[
        ("bad.cnx", "fn broken( { }"),
        ("good.cnx", "fn fine() -> void { }"),
    ]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors.iter().any(|e| e.contains("bad.cnx")));
    assert_eq!(report.emitted.len(), 1);
    assert!(dir.path().join("build/good.c").exists());
    assert!(!dir.path().join("build/bad.c").exists());
}

#[test]
fn collect_error_unit_aborts_only_itself() {
    let dir = setup(&[
        ("bad.cnx", "bitmap8 F { a, b[3] }"),
        ("good.cnx", "fn fine() -> void { }"),
    ]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors.iter().any(|e| e.contains("bad.cnx")));
    assert_eq!(report.emitted.len(), 1);
    assert!(dir.path().join("build/good.c").exists());
    assert!(!dir.path().join("build/bad.c").exists());
}

#[test]
fn cross_unit_conflict_fails_the_build_and_suppresses_output() {
    let dir = setup(&[
        ("a.cnx", "fn helper() -> void { }"),
        ("b.cnx", "fn helper() -> void { }"),
    ]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors[0].contains("'helper'"));
    assert!(report.emitted.is_empty());
    assert!(!dir.path().join("build/a.c").exists());
    assert!(!dir.path().join("build/b.c").exists());
}

#[test]
fn out_of_range_literal_rejects_the_unit() {
    let dir = setup(&[("main.cnx", "fn main() -> i32 { u8 x <- 300; return 0; }")]);
    let report = build(dir.path());
    assert!(!report.success());
    assert!(report.errors[0].contains("out of range"));
}

#[test]
fn rebuild_produces_byte_identical_output() {
    let src = "bitmap8 F { a, b[3], c[4] }\nfn main() -> i32 { F f; f.b <- 5; u8 y <- 2 + 3; return y; }";
    let dir = setup(&[("main.cnx", src)]);

    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    let first = fs::read_to_string(dir.path().join("build/main.c")).expect("first");

    let report = build(dir.path());
    assert!(report.success());
    let second = fs::read_to_string(dir.path().join("build/main.c")).expect("second");
    assert_eq!(first, second);
}

#[test]
fn warm_cache_matches_cold_cache_output() {
    let dir = setup(&[(
        "main.cnx",
        "#include \"board.h\"\nfn main() -> i32 { u32 r <- board_init(9600); return 0; }",
    )]);
    fs::write(
        dir.path().join("src/board.h"),
        "uint32_t board_init(uint32_t baud);\n",
    )
    .expect("write header");

    // Cold cache.
    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    let cold = fs::read_to_string(dir.path().join("build/main.c")).expect("cold");
    assert!(dir.path().join(".cnx/cache/symbols.json").exists());

    // Warm cache: restored symbols replace re-parsing, same output.
    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    let warm = fs::read_to_string(dir.path().join("build/main.c")).expect("warm");
    assert_eq!(cold, warm);
}

#[test]
fn generated_files_are_skipped_not_reingested() {
    let dir = setup(&[(
        "main.cnx",
        "fn main() -> i32 { return 0; }",
    )]);
    fs::write(
        dir.path().join("src/old.cnx"),
        "// Generated by C-Next Transpiler\nfn ghost() -> void { }\n",
    )
    .expect("write generated");

    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.contains("old.cnx")));
    assert_eq!(report.emitted.len(), 1);
}

#[test]
fn cpp_header_switches_output_extension() {
    let dir = setup(&[(
        "main.cnx",
        "#include \"driver.h\"\nfn main() -> i32 { drv_init(); return 0; }",
    )]);
    fs::write(
        dir.path().join("src/driver.h"),
        "namespace hal {\nvoid drv_init();\n}\nvoid drv_init();\n",
    )
    .expect("write header");

    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(dir.path().join("build/main.cpp").exists());
    assert!(!dir.path().join("build/main.c").exists());
}

#[test]
fn header_symbols_satisfy_call_analysis() {
    let dir = setup(&[(
        "main.cnx",
        "#include \"uart.h\"\nfn main() -> i32 { uart_send(65); return 0; }",
    )]);
    fs::write(
        dir.path().join("src/uart.h"),
        "void uart_send(int c);\n",
    )
    .expect("write header");

    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    let code = fs::read_to_string(dir.path().join("build/main.c")).expect("output");
    assert!(code.contains("uart_send(65);"));
    assert!(code.contains("#include \"uart.h\""));
}

#[test]
fn companion_headers_are_emitted_on_request() {
    let dir = setup(&[(
        "util.cnx",
        "scope Util { public fn ping() -> void { } }",
    )]);
    let report = build_with(dir.path(), true);
    assert!(report.success(), "errors: {:?}", report.errors);

    let header = fs::read_to_string(dir.path().join("build/util.h")).expect("header");
    assert!(header.contains("#ifndef CNX_UTIL_H"));
    assert!(header.contains("void Util_ping(void);"));
}

#[test]
fn preserved_directory_structure_in_output() {
    let dir = setup(&[]);
    fs::create_dir_all(dir.path().join("src/drivers")).expect("mkdir");
    fs::write(
        dir.path().join("src/drivers/uart.cnx"),
        "fn uart_tick() -> void { }",
    )
    .expect("write");

    let report = build(dir.path());
    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(dir.path().join("build/drivers/uart.c").exists());
}
