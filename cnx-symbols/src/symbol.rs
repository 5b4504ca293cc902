#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Which front end produced a symbol. Symbols sharing a name across
/// languages form an overload set; a collision within one language is a
/// hard error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLanguage {
    CNext,
    C,
    Cpp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Variable,
    Struct,
    Enum,
    Bitmap,
    Register,
    Scope,
    ScopeMember,
    Typedef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberAccess {
    Public,
    Private,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dims: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub language: SourceLanguage,
    pub source_file: String,
    pub declared_type: String,
    pub line: u32,
    pub column: u32,
    pub is_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ParamInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<MemberAccess>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        language: SourceLanguage,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            language,
            source_file: source_file.into(),
            declared_type: String::new(),
            line: 0,
            column: 0,
            is_exported: false,
            params: None,
            access: None,
        }
    }

    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.declared_type = ty.into();
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.is_exported = exported;
        self
    }

    pub fn with_params(mut self, params: Vec<ParamInfo>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_access(mut self, access: MemberAccess) -> Self {
        self.access = Some(access);
        self
    }
}

/// One struct field as recorded in the symbol table and the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructFieldInfo {
    pub name: String,
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dims: Vec<u32>,
}
