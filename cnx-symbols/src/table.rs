#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::CachedFileEntry;
use crate::symbol::{StructFieldInfo, Symbol, SymbolKind};

/// Two declarations of the same name in the same source language.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolConflict {
    pub name: String,
    pub first_file: String,
    pub second_file: String,
}

/// In-memory index of every symbol from every source unit and header.
///
/// Written only during symbol collection; read-only during analysis and
/// code generation. All iteration orders are deterministic so that the
/// same inputs always produce the same conflict list and the same output.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    by_name: BTreeMap<String, Vec<Symbol>>,
    struct_fields: BTreeMap<String, Vec<StructFieldInfo>>,
    enum_bit_widths: BTreeMap<String, u32>,
    needs_struct_keyword: BTreeSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbols(&mut self, symbols: Vec<Symbol>) {
        for sym in symbols {
            self.by_name.entry(sym.name.clone()).or_default().push(sym);
        }
    }

    pub fn add_struct_fields(&mut self, name: impl Into<String>, fields: Vec<StructFieldInfo>) {
        self.struct_fields.insert(name.into(), fields);
    }

    pub fn add_enum_bit_width(&mut self, name: impl Into<String>, bits: u32) {
        self.enum_bit_widths.insert(name.into(), bits);
    }

    pub fn mark_needs_struct_keyword(&mut self, name: impl Into<String>) {
        self.needs_struct_keyword.insert(name.into());
    }

    pub fn clear_needs_struct_keyword(&mut self, name: &str) {
        self.needs_struct_keyword.remove(name);
    }

    /// All symbols sharing a name, across source languages.
    pub fn get_overloads(&self, name: &str) -> &[Symbol] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get_by_file(&self, path: &str) -> Vec<&Symbol> {
        let mut out = Vec::new();
        for syms in self.by_name.values() {
            for s in syms {
                if s.source_file == path {
                    out.push(s);
                }
            }
        }
        out
    }

    pub fn get_by_kind(&self, kind: SymbolKind) -> Vec<&Symbol> {
        let mut out = Vec::new();
        for syms in self.by_name.values() {
            for s in syms {
                if s.kind == kind {
                    out.push(s);
                }
            }
        }
        out
    }

    pub fn struct_fields(&self, name: &str) -> Option<&[StructFieldInfo]> {
        self.struct_fields.get(name).map(Vec::as_slice)
    }

    pub fn struct_field(&self, struct_name: &str, field: &str) -> Option<&StructFieldInfo> {
        self.struct_fields
            .get(struct_name)?
            .iter()
            .find(|f| f.name == field)
    }

    pub fn enum_bit_width(&self, name: &str) -> Option<u32> {
        self.enum_bit_widths.get(name).copied()
    }

    pub fn needs_struct_keyword(&self, name: &str) -> bool {
        self.needs_struct_keyword.contains(name)
    }

    /// Name collisions within one source language. Computed lazily from
    /// the stored vectors; insertion order makes the result deterministic.
    pub fn get_conflicts(&self) -> Vec<SymbolConflict> {
        let mut conflicts = Vec::new();
        for (name, syms) in &self.by_name {
            for (i, a) in syms.iter().enumerate() {
                for b in &syms[i + 1..] {
                    if a.language == b.language && a.source_file != b.source_file {
                        conflicts.push(SymbolConflict {
                            name: name.clone(),
                            first_file: a.source_file.clone(),
                            second_file: b.source_file.clone(),
                        });
                    }
                }
            }
        }
        conflicts
    }

    /// Re-populate the table from a cache hit, skipping the parse.
    pub fn restore_from_cache(&mut self, entry: &CachedFileEntry) {
        self.add_symbols(entry.symbols.clone());
        for (name, fields) in &entry.struct_fields {
            self.struct_fields.insert(name.clone(), fields.clone());
        }
        for name in &entry.needs_struct_keyword {
            self.needs_struct_keyword.insert(name.clone());
        }
        for (name, bits) in &entry.enum_bit_widths {
            self.enum_bit_widths.insert(name.clone(), *bits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SourceLanguage;

    fn sym(name: &str, lang: SourceLanguage, file: &str) -> Symbol {
        Symbol::new(name, SymbolKind::Function, lang, file)
    }

    #[test]
    fn overloads_span_languages_without_conflict() {
        let mut table = SymbolTable::new();
        table.add_symbols(vec![
            sym("send", SourceLanguage::CNext, "a.cnx"),
            sym("send", SourceLanguage::C, "uart.h"),
        ]);
        assert_eq!(table.get_overloads("send").len(), 2);
        assert!(table.get_conflicts().is_empty());
    }

    #[test]
    fn same_language_cross_file_is_conflict() {
        let mut table = SymbolTable::new();
        table.add_symbols(vec![
            sym("helper", SourceLanguage::CNext, "a.cnx"),
            sym("helper", SourceLanguage::CNext, "b.cnx"),
        ]);
        let conflicts = table.get_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "helper");
        assert_eq!(conflicts[0].first_file, "a.cnx");
        assert_eq!(conflicts[0].second_file, "b.cnx");
    }

    #[test]
    fn conflicts_are_deterministic() {
        let build = || {
            let mut t = SymbolTable::new();
            t.add_symbols(vec![
                sym("f", SourceLanguage::CNext, "a.cnx"),
                sym("f", SourceLanguage::CNext, "b.cnx"),
                sym("g", SourceLanguage::CNext, "a.cnx"),
                sym("g", SourceLanguage::CNext, "c.cnx"),
            ]);
            t.get_conflicts()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn struct_field_lookup() {
        let mut table = SymbolTable::new();
        table.add_struct_fields(
            "Point",
            vec![
                StructFieldInfo {
                    name: "x".to_string(),
                    ty: "u32".to_string(),
                    dims: vec![],
                },
                StructFieldInfo {
                    name: "y".to_string(),
                    ty: "u32".to_string(),
                    dims: vec![],
                },
            ],
        );
        assert_eq!(table.struct_field("Point", "y").map(|f| f.ty.as_str()), Some("u32"));
        assert!(table.struct_field("Point", "z").is_none());
    }
}
