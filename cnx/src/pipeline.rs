#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use cnx_ast::LineIndex;
use cnx_backend_c::{emit_unit, EmitOptions};
use cnx_core::{analyze_unit, AnalyzerInput};
use cnx_symbols::{
    collect_header, collect_unit, detect_cpp, SourceLanguage, SymbolCache, SymbolTable,
};

use crate::discover::{discover_units, is_generated, UnitPath};

pub const TRANSPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub inputs: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub project_root: PathBuf,
    pub emit_headers: bool,
    pub debug: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BuildReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub emitted: Vec<PathBuf>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

struct ParsedUnit {
    unit_path: UnitPath,
    src: String,
    unit: cnx_ast::Unit,
    collected: cnx_symbols::CollectedUnit,
    /// Collection reported errors; the unit is skipped past this point
    /// but its siblings still build.
    failed: bool,
}

/// The pipeline: discovery, header symbols (cache-first), the C++
/// pre-pass, source symbols, conflict check, analyzers in fixed order,
/// then emission. A failing unit aborts only itself; every discovered
/// unit is attempted.
pub fn run_build(options: &BuildOptions) -> BuildReport {
    let mut report = BuildReport::default();

    let units = match discover_units(&options.inputs) {
        Ok(units) => units,
        Err(e) => {
            report.errors.push(format!("error: discovery failed: {e}"));
            return report;
        }
    };

    let mut cache = SymbolCache::open(&options.project_root, TRANSPILER_VERSION);
    for w in cache.take_warnings() {
        report.warnings.push(format!("warning: {w}"));
    }

    // Parse and collect every unit first; header collection needs the
    // full include set and the C++ pre-pass must finish before any
    // emission decision.
    let mut parsed = Vec::new();
    let mut table = SymbolTable::new();
    let mut header_queue: Vec<PathBuf> = Vec::new();

    for unit_path in units {
        let src = match fs::read_to_string(&unit_path.path) {
            Ok(s) => s,
            Err(e) => {
                report
                    .errors
                    .push(format!("{}: error: {e}", unit_path.path.display()));
                continue;
            }
        };
        if is_generated(&src) {
            report.warnings.push(format!(
                "warning: skipping generated file {}",
                unit_path.path.display()
            ));
            continue;
        }

        let index = LineIndex::new(&src);
        let unit = match cnx_parse::parse_source(&src) {
            Ok(u) => u,
            Err(e) => {
                let (line, col) = index.span_line_col(e.span);
                report.errors.push(format!(
                    "{}: error: {} at {line}:{col}",
                    unit_path.path.display(),
                    e.message
                ));
                continue;
            }
        };

        for item in &unit.items {
            if let cnx_ast::Item::Include(inc) = item {
                if !inc.system && !inc.path.ends_with(".cnx") && !inc.path.ends_with(".cnext") {
                    if let Some(resolved) =
                        resolve_include(&inc.path, &unit_path.path, &options.include_dirs)
                    {
                        header_queue.push(resolved);
                    } else {
                        report.warnings.push(format!(
                            "{}: warning: include '{}' not found",
                            unit_path.path.display(),
                            inc.path
                        ));
                    }
                }
            }
        }

        let path_str = unit_path.path.to_string_lossy().into_owned();
        let collected = collect_unit(&path_str, &unit, &index);
        for err in &collected.errors {
            let (line, col) = index.span_line_col(err.span);
            report.errors.push(format!(
                "{}: error: {} at {line}:{col}",
                unit_path.path.display(),
                err.message
            ));
        }

        let failed = !collected.errors.is_empty();
        parsed.push(ParsedUnit {
            unit_path,
            src,
            unit,
            collected,
            failed,
        });
    }

    // Header collection, transitively, cache-first. The sniff always
    // runs on the raw text: cpp detection is decided here, before any
    // output extension is chosen, and never flips mid-emission.
    let mut cpp_detected = false;
    let mut seen_headers: BTreeSet<PathBuf> = BTreeSet::new();
    while let Some(header) = header_queue.pop() {
        if !seen_headers.insert(header.clone()) {
            continue;
        }
        let text = match fs::read_to_string(&header) {
            Ok(t) => t,
            Err(e) => {
                report
                    .warnings
                    .push(format!("warning: cannot read {}: {e}", header.display()));
                continue;
            }
        };
        if is_generated(&text) {
            continue;
        }

        let is_cpp = detect_cpp(&text);
        cpp_detected |= is_cpp;

        for nested in quoted_includes(&text) {
            if let Some(resolved) = resolve_include(&nested, &header, &options.include_dirs) {
                header_queue.push(resolved);
            }
        }

        if cache.is_valid(&header) {
            if let Some(entry) = cache.get(&header) {
                table.restore_from_cache(entry);
                continue;
            }
        }

        let language = if is_cpp {
            SourceLanguage::Cpp
        } else {
            SourceLanguage::C
        };
        let got = collect_header(&header.to_string_lossy(), &text, language);
        for w in &got.warnings {
            report
                .warnings
                .push(format!("{}: warning: {w}", header.display()));
        }

        table.add_symbols(got.symbols.clone());
        for (name, fields) in &got.struct_fields {
            table.add_struct_fields(name, fields.clone());
        }
        for name in &got.needs_struct_keyword {
            table.mark_needs_struct_keyword(name);
        }
        for (name, bits) in &got.enum_bit_widths {
            table.add_enum_bit_width(name, *bits);
        }

        if let Err(e) = cache.put(
            &header,
            got.symbols,
            got.struct_fields,
            got.needs_struct_keyword,
            got.enum_bit_widths,
        ) {
            report
                .warnings
                .push(format!("warning: cache update failed for {}: {e}", header.display()));
        }
    }

    // Source symbols enter the table after headers so conflicts report
    // with the header view complete.
    for p in &parsed {
        table.add_symbols(p.collected.symbols.clone());
        for (name, fields) in &p.collected.structs {
            table.add_struct_fields(name, fields.clone());
        }
        for (name, info) in &p.collected.enums {
            if let Some(bits) = info.bits {
                table.add_enum_bit_width(name, bits);
            }
        }
    }

    // A cross-unit conflict fails the whole build; nothing is emitted.
    let conflicts = table.get_conflicts();
    if !conflicts.is_empty() {
        for c in conflicts {
            report.errors.push(format!(
                "error: symbol '{}' is defined in both {} and {}",
                c.name, c.first_file, c.second_file
            ));
        }
        let _ = cache.flush();
        return report;
    }

    for p in &parsed {
        if p.failed {
            continue;
        }
        let index = LineIndex::new(&p.src);
        let input = AnalyzerInput {
            unit: &p.unit,
            src: &p.src,
            index: &index,
            table: &table,
        };
        let diagnostics = analyze_unit(&input);
        if !diagnostics.is_empty() {
            for d in diagnostics {
                report
                    .errors
                    .push(format!("{}: {}", p.unit_path.path.display(), d.render()));
            }
            continue;
        }

        let stem = p
            .unit_path
            .relative
            .with_extension("")
            .to_string_lossy()
            .into_owned();
        let emit_options = EmitOptions {
            cpp_mode: cpp_detected,
            debug_mode: options.debug,
            emit_header: options.emit_headers,
            unit_stem: stem,
        };

        let out = match emit_unit(&table, &p.collected, &p.unit, &emit_options) {
            Ok(out) => out,
            Err(e) => {
                let (line, col) = index.span_line_col(e.span);
                report.errors.push(format!(
                    "{}: error: {} at {line}:{col}",
                    p.unit_path.path.display(),
                    e.message
                ));
                continue;
            }
        };

        let extension = if cpp_detected { "cpp" } else { "c" };
        let out_path = options
            .out_dir
            .join(p.unit_path.relative.with_extension(extension));
        if let Err(e) = write_output(&out_path, &out.code) {
            report
                .errors
                .push(format!("error: cannot write {}: {e}", out_path.display()));
            continue;
        }
        report.emitted.push(out_path);

        if let Some(header) = out.header {
            let h_path = options.out_dir.join(p.unit_path.relative.with_extension("h"));
            if let Err(e) = write_output(&h_path, &header) {
                report
                    .errors
                    .push(format!("error: cannot write {}: {e}", h_path.display()));
                continue;
            }
            report.emitted.push(h_path);
        }
    }

    if let Err(e) = cache.flush() {
        report.warnings.push(format!("warning: cache flush failed: {e}"));
    }
    report
}

fn write_output(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn resolve_include(name: &str, from: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(dir) = from.parent() {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for dir in include_dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Quoted includes of a header, for transitive collection.
fn quoted_includes(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("#include") else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(inner) = rest.strip_prefix('"') {
            if let Some(end) = inner.find('"') {
                out.push(inner[..end].to_string());
            }
        }
    }
    out
}
