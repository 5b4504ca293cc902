#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::symbol::{ParamInfo, SourceLanguage, StructFieldInfo, Symbol, SymbolKind};

/// Everything extracted from one parsed header.
#[derive(Clone, Debug, Default)]
pub struct HeaderSymbols {
    pub symbols: Vec<Symbol>,
    pub struct_fields: BTreeMap<String, Vec<StructFieldInfo>>,
    pub needs_struct_keyword: Vec<String>,
    pub enum_bit_widths: BTreeMap<String, u32>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
struct Tok {
    text: String,
    line: u32,
}

/// Declaration scanner for C and C++ headers.
///
/// This is deliberately not a full parser: it recognizes the declaration
/// shapes the transpiler needs (typedefs, structs with fields, enums with
/// widths, prototypes, extern globals) and swallows everything else.
/// Malformed regions produce warnings, never hard errors; symbols
/// collected before a bad region remain valid.
pub fn collect_header(path: &str, src: &str, language: SourceLanguage) -> HeaderSymbols {
    let mut out = HeaderSymbols::default();
    let toks = tokenize(&strip_noise(src));
    let mut i = 0usize;

    while i < toks.len() {
        match toks[i].text.as_str() {
            // extern "C" { ... }  — contents are ordinary C declarations.
            "extern" if toks.get(i + 1).map(|t| t.text.starts_with('"')).unwrap_or(false) => {
                i += 2;
                if toks.get(i).map(|t| t.text == "{").unwrap_or(false) {
                    i += 1;
                }
            }
            "}" => i += 1,
            "typedef" => i = scan_typedef(path, &toks, i, language, &mut out),
            "struct" | "class" | "union" => {
                i = scan_aggregate(path, &toks, i, language, &mut out)
            }
            "enum" => i = scan_enum(path, &toks, i, language, &mut out),
            _ => i = scan_declaration(path, &toks, i, language, &mut out),
        }
    }

    out
}

/// Replace comments and preprocessor lines with spaces, preserving line
/// numbers for symbol locations.
fn strip_noise(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut at_line_start = true;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if at_line_start && c == '#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                // A continuation backslash extends the directive.
                if bytes[i] == b'\\' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    out.push(' ');
                    out.push('\n');
                    i += 2;
                    continue;
                }
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if c == '/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            while i < bytes.len() && bytes[i] != b'\n' {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if c == '/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            out.push_str("  ");
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                out.push(if bytes[i] == b'\n' { '\n' } else { ' ' });
                i += 1;
            }
            out.push_str("  ");
            i = (i + 2).min(bytes.len());
            continue;
        }
        out.push(c);
        at_line_start = c == '\n';
        i += 1;
    }

    out
}

fn tokenize(src: &str) -> Vec<Tok> {
    let mut toks = Vec::new();
    let mut line = 1u32;
    let mut chars = src.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c == '\n' {
            line += 1;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(j, cc)) = chars.peek() {
                if cc.is_ascii_alphanumeric() || cc == '_' {
                    end = j + cc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            toks.push(Tok {
                text: src[start..end].to_string(),
                line,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let mut end = start + 1;
            while let Some(&(j, cc)) = chars.peek() {
                if cc.is_ascii_alphanumeric() || cc == '.' || cc == '_' {
                    end = j + cc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            toks.push(Tok {
                text: src[start..end].to_string(),
                line,
            });
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::from(c);
            while let Some((_, cc)) = chars.next() {
                text.push(cc);
                if cc == '\\' {
                    if let Some((_, esc)) = chars.next() {
                        text.push(esc);
                    }
                    continue;
                }
                if cc == quote {
                    break;
                }
                if cc == '\n' {
                    line += 1;
                    break;
                }
            }
            toks.push(Tok { text, line });
            continue;
        }
        toks.push(Tok {
            text: c.to_string(),
            line,
        });
    }

    toks
}

fn skip_balanced(toks: &[Tok], mut i: usize, open: &str, close: &str) -> usize {
    debug_assert_eq!(toks.get(i).map(|t| t.text.as_str()), Some(open));
    let mut depth = 0usize;
    while i < toks.len() {
        if toks[i].text == open {
            depth += 1;
        } else if toks[i].text == close {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        i += 1;
    }
    toks.len()
}

fn find_semi(toks: &[Tok], mut i: usize) -> usize {
    while i < toks.len() && toks[i].text != ";" {
        if toks[i].text == "{" {
            i = skip_balanced(toks, i, "{", "}");
            continue;
        }
        i += 1;
    }
    i.min(toks.len())
}

fn is_ident(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bit width of a C integer type name, when known.
pub fn c_type_bit_width(name: &str) -> Option<u32> {
    match name {
        "char" | "int8_t" | "uint8_t" | "u8" | "i8" | "bool" => Some(8),
        "short" | "int16_t" | "uint16_t" | "u16" | "i16" => Some(16),
        "int" | "unsigned" | "long" | "int32_t" | "uint32_t" | "u32" | "i32" | "float" => Some(32),
        "int64_t" | "uint64_t" | "u64" | "i64" | "double" => Some(64),
        _ => None,
    }
}

fn scan_typedef(
    path: &str,
    toks: &[Tok],
    start: usize,
    language: SourceLanguage,
    out: &mut HeaderSymbols,
) -> usize {
    let mut i = start + 1;
    let line = toks[start].line;

    match toks.get(i).map(|t| t.text.as_str()) {
        Some("struct") | Some("union") => {
            let keyword = toks[i].text.clone();
            i += 1;
            let tag = toks
                .get(i)
                .filter(|t| is_ident(&t.text))
                .map(|t| t.text.clone());
            if tag.is_some() {
                i += 1;
            }

            let mut fields = Vec::new();
            if toks.get(i).map(|t| t.text == "{").unwrap_or(false) {
                let body_end = skip_balanced(toks, i, "{", "}");
                if keyword == "struct" {
                    fields = scan_struct_fields(&toks[i + 1..body_end.saturating_sub(1)], out);
                }
                i = body_end;
            }

            let Some(alias) = toks.get(i).filter(|t| is_ident(&t.text)).map(|t| t.text.clone())
            else {
                out.warnings
                    .push(format!("{path}:{line}: unreadable typedef, skipped"));
                return find_semi(toks, i) + 1;
            };
            i += 1;

            out.symbols.push(
                Symbol::new(&alias, SymbolKind::Struct, language, path)
                    .with_type(&alias)
                    .at(line, 1)
                    .exported(true),
            );
            if keyword == "struct" && !fields.is_empty() {
                out.struct_fields.insert(alias.clone(), fields.clone());
                if let Some(tag) = &tag {
                    out.struct_fields.insert(tag.clone(), fields);
                }
            }
            // A typedef'd struct never needs the keyword at use sites.
            if let Some(tag) = tag {
                out.needs_struct_keyword.retain(|n| n != &tag);
            }
            find_semi(toks, i) + 1
        }
        Some("enum") => {
            i += 1;
            if toks.get(i).map(|t| is_ident(&t.text)).unwrap_or(false) {
                i += 1;
            }
            let mut members = Vec::new();
            if toks.get(i).map(|t| t.text == "{").unwrap_or(false) {
                let body_end = skip_balanced(toks, i, "{", "}");
                members = scan_enum_members(&toks[i + 1..body_end.saturating_sub(1)]);
                i = body_end;
            }
            let Some(alias) = toks.get(i).filter(|t| is_ident(&t.text)).map(|t| t.text.clone())
            else {
                out.warnings
                    .push(format!("{path}:{line}: unreadable enum typedef, skipped"));
                return find_semi(toks, i) + 1;
            };
            push_enum(path, language, line, &alias, None, &members, out);
            find_semi(toks, i) + 1
        }
        _ => {
            // typedef <type tokens> Alias;
            let semi = find_semi(toks, i);
            if semi > i + 1 {
                let alias = &toks[semi - 1];
                if is_ident(&alias.text) {
                    let ty: Vec<&str> = toks[i..semi - 1].iter().map(|t| t.text.as_str()).collect();
                    out.symbols.push(
                        Symbol::new(&alias.text, SymbolKind::Typedef, language, path)
                            .with_type(ty.join(" "))
                            .at(alias.line, 1)
                            .exported(true),
                    );
                    // typedef struct Tag Alias; removes the keyword burden.
                    if ty.first() == Some(&"struct") {
                        if let Some(tag) = ty.get(1) {
                            out.needs_struct_keyword.retain(|n| n != tag);
                        }
                    }
                }
            }
            semi + 1
        }
    }
}

fn scan_aggregate(
    path: &str,
    toks: &[Tok],
    start: usize,
    language: SourceLanguage,
    out: &mut HeaderSymbols,
) -> usize {
    let keyword = toks[start].text.clone();
    let line = toks[start].line;
    let mut i = start + 1;

    let Some(tag) = toks.get(i).filter(|t| is_ident(&t.text)).map(|t| t.text.clone()) else {
        return find_semi(toks, i) + 1;
    };
    i += 1;

    // C++ base clause: class X : public Y { ... }
    if toks.get(i).map(|t| t.text == ":").unwrap_or(false) {
        while i < toks.len() && toks[i].text != "{" && toks[i].text != ";" {
            i += 1;
        }
    }

    if toks.get(i).map(|t| t.text == ";").unwrap_or(false) {
        // Forward declaration only.
        return i + 1;
    }
    if !toks.get(i).map(|t| t.text == "{").unwrap_or(false) {
        // `struct Tag var;` style use, not a definition.
        return find_semi(toks, i) + 1;
    }

    let body_end = skip_balanced(toks, i, "{", "}");
    if keyword == "struct" {
        let fields = scan_struct_fields(&toks[i + 1..body_end.saturating_sub(1)], out);
        if !fields.is_empty() {
            out.struct_fields.insert(tag.clone(), fields);
        }
        // Bare C struct definitions need the keyword until a typedef
        // aliases them.
        if language == SourceLanguage::C && !out.needs_struct_keyword.contains(&tag) {
            out.needs_struct_keyword.push(tag.clone());
        }
    }

    out.symbols.push(
        Symbol::new(&tag, SymbolKind::Struct, language, path)
            .with_type(&tag)
            .at(line, 1)
            .exported(true),
    );

    find_semi(toks, body_end) + 1
}

fn scan_enum(
    path: &str,
    toks: &[Tok],
    start: usize,
    language: SourceLanguage,
    out: &mut HeaderSymbols,
) -> usize {
    let line = toks[start].line;
    let mut i = start + 1;

    if toks.get(i).map(|t| t.text == "class").unwrap_or(false) {
        i += 1;
    }
    let Some(tag) = toks.get(i).filter(|t| is_ident(&t.text)).map(|t| t.text.clone()) else {
        return find_semi(toks, i) + 1;
    };
    i += 1;

    // C++ typed enum: enum Tag : uint16_t { ... }
    let mut bits = None;
    if toks.get(i).map(|t| t.text == ":").unwrap_or(false) {
        i += 1;
        let mut backing = String::new();
        while let Some(t) = toks.get(i) {
            if t.text == "{" || t.text == ";" {
                break;
            }
            if !backing.is_empty() {
                backing.push(' ');
            }
            backing.push_str(&t.text);
            i += 1;
        }
        bits = backing
            .split_whitespace()
            .rev()
            .find_map(c_type_bit_width);
    }

    if !toks.get(i).map(|t| t.text == "{").unwrap_or(false) {
        return find_semi(toks, i) + 1;
    }
    let body_end = skip_balanced(toks, i, "{", "}");
    let members = scan_enum_members(&toks[i + 1..body_end.saturating_sub(1)]);
    push_enum(path, language, line, &tag, bits, &members, out);
    find_semi(toks, body_end) + 1
}

fn push_enum(
    path: &str,
    language: SourceLanguage,
    line: u32,
    name: &str,
    bits: Option<u32>,
    members: &[String],
    out: &mut HeaderSymbols,
) {
    out.symbols.push(
        Symbol::new(name, SymbolKind::Enum, language, path)
            .with_type(name)
            .at(line, 1)
            .exported(true),
    );
    if let Some(bits) = bits {
        out.enum_bit_widths.insert(name.to_string(), bits);
    }
    for m in members {
        out.symbols.push(
            Symbol::new(m, SymbolKind::Variable, language, path)
                .with_type(name)
                .at(line, 1)
                .exported(true),
        );
    }
}

fn scan_enum_members(body: &[Tok]) -> Vec<String> {
    let mut members = Vec::new();
    let mut expect_name = true;
    for t in body {
        if t.text == "," {
            expect_name = true;
            continue;
        }
        if expect_name && is_ident(&t.text) {
            members.push(t.text.clone());
            expect_name = false;
        }
    }
    members
}

fn scan_struct_fields(body: &[Tok], out: &mut HeaderSymbols) -> Vec<StructFieldInfo> {
    let mut fields = Vec::new();
    let mut i = 0usize;

    while i < body.len() {
        // Nested aggregates and bitfield bodies are skipped wholesale.
        if body[i].text == "{" {
            i = skip_balanced(body, i, "{", "}");
            continue;
        }
        let semi = find_semi(body, i);
        if semi <= i {
            break;
        }
        let decl = &body[i..semi];
        if let Some(field) = field_of_declaration(decl) {
            fields.push(field);
        } else if !decl.is_empty() {
            out.warnings
                .push(format!("line {}: unreadable struct field, skipped", decl[0].line));
        }
        i = semi + 1;
    }

    fields
}

/// `uint8_t name`, `char buf[16]`, `const struct X *p` and friends.
fn field_of_declaration(decl: &[Tok]) -> Option<StructFieldInfo> {
    if decl.is_empty() {
        return None;
    }

    // Bitfields: `unsigned flag : 1` — keep the name, drop the width.
    let decl: Vec<&Tok> = match decl.iter().position(|t| t.text == ":") {
        Some(colon) => decl[..colon].iter().collect(),
        None => decl.iter().collect(),
    };

    let mut dims = Vec::new();
    let mut end = decl.len();
    while end >= 3 && decl[end - 1].text == "]" {
        let dim = decl[end - 2].text.parse::<u32>().ok()?;
        if decl[end - 3].text != "[" {
            return None;
        }
        dims.insert(0, dim);
        end -= 3;
    }

    let name = decl.get(end.checked_sub(1)?)?;
    if !is_ident(&name.text) {
        return None;
    }
    let ty: Vec<&str> = decl[..end - 1]
        .iter()
        .map(|t| t.text.as_str())
        .filter(|t| *t != "const" && *t != "volatile")
        .collect();
    if ty.is_empty() {
        return None;
    }

    Some(StructFieldInfo {
        name: name.text.clone(),
        ty: ty.join(" "),
        dims,
    })
}

/// Prototype or global at file scope.
fn scan_declaration(
    path: &str,
    toks: &[Tok],
    start: usize,
    language: SourceLanguage,
    out: &mut HeaderSymbols,
) -> usize {
    let mut i = start;

    // Find the end of this declaration: `;` or a function body.
    let mut paren: Option<(usize, usize)> = None;
    let mut j = i;
    while j < toks.len() && toks[j].text != ";" {
        if toks[j].text == "(" {
            let close = skip_balanced(toks, j, "(", ")");
            paren = Some((j, close - 1));
            j = close;
            // `) {` — inline definition; the body ends the declaration.
            if toks.get(j).map(|t| t.text == "{").unwrap_or(false) {
                let end = skip_balanced(toks, j, "{", "}");
                emit_function(path, toks, i, paren, language, out);
                return end;
            }
            continue;
        }
        if toks[j].text == "{" {
            // Unrecognized brace region; skip it whole.
            return skip_balanced(toks, j, "{", "}");
        }
        j += 1;
    }

    if let Some(_p) = paren {
        emit_function(path, toks, i, paren, language, out);
        return j + 1;
    }

    // Global: extern <type> name; or <type> name;
    if toks.get(i).map(|t| t.text == "extern").unwrap_or(false) {
        i += 1;
    }
    if j > i + 1 {
        let name = &toks[j - 1];
        if is_ident(&name.text) {
            let ty: Vec<&str> = toks[i..j - 1].iter().map(|t| t.text.as_str()).collect();
            if ty.iter().all(|t| is_ident(t) || *t == "*") && !ty.is_empty() {
                out.symbols.push(
                    Symbol::new(&name.text, SymbolKind::Variable, language, path)
                        .with_type(ty.join(" "))
                        .at(name.line, 1)
                        .exported(true),
                );
            }
        }
    }
    j + 1
}

fn emit_function(
    path: &str,
    toks: &[Tok],
    start: usize,
    paren: Option<(usize, usize)>,
    language: SourceLanguage,
    out: &mut HeaderSymbols,
) {
    let Some((open, close)) = paren else { return };
    if open == 0 || open <= start {
        return;
    }

    let name = &toks[open - 1];
    if !is_ident(&name.text) {
        return;
    }

    let ret: Vec<&str> = toks[start..open - 1]
        .iter()
        .map(|t| t.text.as_str())
        .filter(|t| !matches!(*t, "extern" | "static" | "inline"))
        .collect();
    if ret.is_empty() || !ret.iter().all(|t| is_ident(t) || *t == "*") {
        return;
    }

    let mut params = Vec::new();
    let body = &toks[open + 1..close];
    if !(body.len() == 1 && body[0].text == "void") && !body.is_empty() {
        for group in split_params(body) {
            if group.is_empty() {
                continue;
            }
            let last = group[group.len() - 1];
            let (pname, ty_toks): (String, &[&Tok]) = if group.len() > 1 && is_ident(&last.text) {
                (last.text.clone(), &group[..group.len() - 1])
            } else {
                (String::new(), &group[..])
            };
            let ty: Vec<&str> = ty_toks.iter().map(|t| t.text.as_str()).collect();
            params.push(ParamInfo {
                name: pname,
                ty: ty.join(" "),
                dims: vec![],
            });
        }
    }

    out.symbols.push(
        Symbol::new(&name.text, SymbolKind::Function, language, path)
            .with_type(ret.join(" "))
            .at(name.line, 1)
            .exported(true)
            .with_params(params),
    );
}

fn split_params(body: &[Tok]) -> Vec<Vec<&Tok>> {
    let mut groups = vec![Vec::new()];
    let mut depth = 0usize;
    for t in body {
        match t.text.as_str() {
            "(" | "[" | "<" => depth += 1,
            ")" | "]" | ">" => depth = depth.saturating_sub(1),
            "," if depth == 0 => {
                groups.push(Vec::new());
                continue;
            }
            _ => {}
        }
        groups.last_mut().expect("group").push(t);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_typedef_struct_with_fields() {
        let src = "typedef struct { uint32_t baud; char name[16]; } uart_cfg;";
        let got = collect_header("uart.h", src, SourceLanguage::C);
        assert_eq!(got.symbols.len(), 1);
        assert_eq!(got.symbols[0].kind, SymbolKind::Struct);
        let fields = &got.struct_fields["uart_cfg"];
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "name");
        assert_eq!(fields[1].dims, vec![16]);
        assert!(got.needs_struct_keyword.is_empty());
    }

    #[test]
    fn bare_struct_needs_keyword_until_typedefd() {
        let src = "struct device { int id; };";
        let got = collect_header("dev.h", src, SourceLanguage::C);
        assert_eq!(got.needs_struct_keyword, vec!["device".to_string()]);

        let src2 = "struct device { int id; };\ntypedef struct device device_t;";
        let got2 = collect_header("dev.h", src2, SourceLanguage::C);
        assert!(!got2.needs_struct_keyword.contains(&"device".to_string()));
    }

    #[test]
    fn collects_prototype_with_params() {
        let src = "int uart_send(uint8_t c, const char *msg);";
        let got = collect_header("uart.h", src, SourceLanguage::C);
        let f = &got.symbols[0];
        assert_eq!(f.kind, SymbolKind::Function);
        assert_eq!(f.declared_type, "int");
        let params = f.params.as_ref().expect("params");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].ty, "uint8_t");
        assert_eq!(params[1].name, "msg");
    }

    #[test]
    fn typed_enum_records_bit_width() {
        let src = "enum Mode : uint16_t { IDLE, RUN, STOP };";
        let got = collect_header("mode.h", src, SourceLanguage::Cpp);
        assert_eq!(got.enum_bit_widths.get("Mode"), Some(&16));
        // Enum + three members.
        assert_eq!(got.symbols.len(), 4);
    }

    #[test]
    fn extern_global_is_collected() {
        let src = "extern volatile uint32_t tick_count;";
        let got = collect_header("clock.h", src, SourceLanguage::C);
        assert_eq!(got.symbols[0].kind, SymbolKind::Variable);
        assert_eq!(got.symbols[0].name, "tick_count");
    }

    #[test]
    fn preprocessor_and_comments_are_invisible() {
        let src = "#ifndef X_H\n#define X_H\n/* doc */\n// note\nvoid f(void);\n#endif\n";
        let got = collect_header("x.h", src, SourceLanguage::C);
        assert_eq!(got.symbols.len(), 1);
        assert_eq!(got.symbols[0].name, "f");
        assert_eq!(got.symbols[0].line, 5);
    }

    #[test]
    fn malformed_region_warns_but_keeps_earlier_symbols() {
        let src = "void ok(void);\ntypedef struct { int a; } ;\n";
        let got = collect_header("bad.h", src, SourceLanguage::C);
        assert_eq!(got.symbols.len(), 1);
        assert_eq!(got.symbols[0].name, "ok");
        assert!(!got.warnings.is_empty());
    }

    #[test]
    fn extern_c_block_is_transparent() {
        let src = "extern \"C\" {\nint add(int a, int b);\n}\n";
        let got = collect_header("lib.h", src, SourceLanguage::C);
        assert_eq!(got.symbols.len(), 1);
        assert_eq!(got.symbols[0].name, "add");
    }
}
