#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::symbol::{StructFieldInfo, Symbol};

pub const CACHE_FORMAT_VERSION: u32 = 2;

/// `<project-root>/.cnx/config.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub version: u32,
    pub created: String,
    #[serde(rename = "transpilerVersion")]
    pub transpiler_version: String,
}

/// One header's worth of cached symbol data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CachedFileEntry {
    pub path: String,
    /// `hash:<sha256>` for entries written by this version; `mtime:<ms>`
    /// entries from older caches still validate by modification time.
    pub key: String,
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub struct_fields: BTreeMap<String, Vec<StructFieldInfo>>,
    #[serde(default)]
    pub needs_struct_keyword: Vec<String>,
    #[serde(default)]
    pub enum_bit_widths: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    entries: Vec<CachedFileEntry>,
}

/// Persistent symbol cache under `<project-root>/.cnx/`.
///
/// Writes are buffered in memory until `flush`, which serializes the
/// current map atomically (write to temp, rename). Corruption is never
/// fatal: a damaged document is treated as an empty cache and rebuilt.
pub struct SymbolCache {
    dir: PathBuf,
    transpiler_version: String,
    entries: BTreeMap<String, CachedFileEntry>,
    warnings: Vec<String>,
    dirty: bool,
}

impl SymbolCache {
    pub fn open(project_root: &Path, transpiler_version: &str) -> Self {
        let dir = project_root.join(".cnx");
        let mut cache = Self {
            dir,
            transpiler_version: transpiler_version.to_string(),
            entries: BTreeMap::new(),
            warnings: Vec::new(),
            dirty: false,
        };
        cache.load();
        cache
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    fn symbols_path(&self) -> PathBuf {
        self.dir.join("cache").join("symbols.json")
    }

    fn load(&mut self) {
        let config_text = match fs::read_to_string(self.config_path()) {
            Ok(t) => t,
            Err(_) => return,
        };

        let config: CacheConfig = match serde_json::from_str(&config_text) {
            Ok(c) => c,
            Err(e) => {
                self.warnings.push(format!("symbol cache config unreadable, rebuilding: {e}"));
                return;
            }
        };

        // A format or compiler version bump invalidates everything at once.
        if config.version != CACHE_FORMAT_VERSION
            || config.transpiler_version != self.transpiler_version
        {
            self.dirty = true;
            return;
        }

        let doc_text = match fs::read_to_string(self.symbols_path()) {
            Ok(t) => t,
            Err(_) => return,
        };
        let doc: CacheDocument = match serde_json::from_str(&doc_text) {
            Ok(d) => d,
            Err(e) => {
                self.warnings.push(format!("symbol cache unreadable, rebuilding: {e}"));
                return;
            }
        };

        for entry in doc.entries {
            self.entries.insert(entry.path.clone(), entry);
        }
    }

    /// Content-hash key for the file's current bytes.
    pub fn compute_key(path: &Path) -> io::Result<String> {
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("hash:{}", hex::encode(hasher.finalize())))
    }

    fn mtime_ms(path: &Path) -> io::Result<u128> {
        let meta = fs::metadata(path)?;
        let mtime = meta.modified()?;
        Ok(mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0))
    }

    /// True iff an entry exists for `path` and its key still matches the
    /// file on disk.
    pub fn is_valid(&self, path: &Path) -> bool {
        let Some(entry) = self.entries.get(&path_key(path)) else {
            return false;
        };
        if let Some(rest) = entry.key.strip_prefix("hash:") {
            match Self::compute_key(path) {
                Ok(current) => current.strip_prefix("hash:") == Some(rest),
                Err(_) => false,
            }
        } else if let Some(ms) = entry.key.strip_prefix("mtime:") {
            match Self::mtime_ms(path) {
                Ok(current) => ms.parse::<u128>().map(|v| v == current).unwrap_or(false),
                Err(_) => false,
            }
        } else {
            false
        }
    }

    pub fn get(&self, path: &Path) -> Option<&CachedFileEntry> {
        self.entries.get(&path_key(path))
    }

    pub fn put(
        &mut self,
        path: &Path,
        symbols: Vec<Symbol>,
        struct_fields: BTreeMap<String, Vec<StructFieldInfo>>,
        needs_struct_keyword: Vec<String>,
        enum_bit_widths: BTreeMap<String, u32>,
    ) -> io::Result<()> {
        let key = Self::compute_key(path)?;
        let entry = CachedFileEntry {
            path: path_key(path),
            key,
            symbols,
            struct_fields,
            needs_struct_keyword,
            enum_bit_widths,
        };
        self.entries.insert(entry.path.clone(), entry);
        self.dirty = true;
        Ok(())
    }

    pub fn invalidate(&mut self, path: &Path) {
        if self.entries.remove(&path_key(path)).is_some() {
            self.dirty = true;
        }
    }

    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            self.dirty = true;
        }
        self.entries.clear();
    }

    /// Serialize the current map. Write-to-temp plus rename keeps a
    /// concurrent reader from ever observing a half-written document.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }

        fs::create_dir_all(self.dir.join("cache"))?;

        let config = CacheConfig {
            version: CACHE_FORMAT_VERSION,
            created: now_ms().to_string(),
            transpiler_version: self.transpiler_version.clone(),
        };
        write_atomic(&self.config_path(), &serde_json::to_string_pretty(&config)?)?;

        let doc = CacheDocument {
            entries: self.entries.values().cloned().collect(),
        };
        write_atomic(&self.symbols_path(), &serde_json::to_string_pretty(&doc)?)?;

        self.dirty = false;
        Ok(())
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SourceLanguage, Symbol, SymbolKind};

    fn entry_symbols() -> Vec<Symbol> {
        vec![Symbol::new("uart_send", SymbolKind::Function, SourceLanguage::C, "uart.h")]
    }

    #[test]
    fn put_flush_reopen_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = dir.path().join("uart.h");
        fs::write(&header, "void uart_send(int c);").expect("write header");

        let mut cache = SymbolCache::open(dir.path(), "0.3.0");
        cache
            .put(&header, entry_symbols(), BTreeMap::new(), vec![], BTreeMap::new())
            .expect("put");
        cache.flush().expect("flush");

        let reopened = SymbolCache::open(dir.path(), "0.3.0");
        assert!(reopened.is_valid(&header));
        let entry = reopened.get(&header).expect("entry");
        assert_eq!(entry.symbols[0].name, "uart_send");
    }

    #[test]
    fn content_change_invalidates_hash_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = dir.path().join("uart.h");
        fs::write(&header, "void uart_send(int c);").expect("write header");

        let mut cache = SymbolCache::open(dir.path(), "0.3.0");
        cache
            .put(&header, entry_symbols(), BTreeMap::new(), vec![], BTreeMap::new())
            .expect("put");
        assert!(cache.is_valid(&header));

        fs::write(&header, "void uart_send(int c, int baud);").expect("rewrite");
        assert!(!cache.is_valid(&header));
    }

    #[test]
    fn transpiler_version_bump_invalidates_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = dir.path().join("uart.h");
        fs::write(&header, "void uart_send(int c);").expect("write header");

        let mut cache = SymbolCache::open(dir.path(), "0.3.0");
        cache
            .put(&header, entry_symbols(), BTreeMap::new(), vec![], BTreeMap::new())
            .expect("put");
        cache.flush().expect("flush");

        let reopened = SymbolCache::open(dir.path(), "0.4.0");
        assert!(reopened.is_empty());
        assert!(!reopened.is_valid(&header));
    }

    #[test]
    fn corrupted_document_is_treated_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = SymbolCache::open(dir.path(), "0.3.0");
        let header = dir.path().join("uart.h");
        fs::write(&header, "void uart_send(int c);").expect("write header");
        cache
            .put(&header, entry_symbols(), BTreeMap::new(), vec![], BTreeMap::new())
            .expect("put");
        cache.flush().expect("flush");

        fs::write(dir.path().join(".cnx/cache/symbols.json"), "{not json").expect("corrupt");

        let mut reopened = SymbolCache::open(dir.path(), "0.3.0");
        assert!(reopened.is_empty());
        assert_eq!(reopened.take_warnings().len(), 1);
    }

    #[test]
    fn legacy_mtime_entries_still_validate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = dir.path().join("uart.h");
        fs::write(&header, "void uart_send(int c);").expect("write header");

        let mut cache = SymbolCache::open(dir.path(), "0.3.0");
        let ms = SymbolCache::mtime_ms(&header).expect("mtime");
        cache.entries.insert(
            header.to_string_lossy().into_owned(),
            CachedFileEntry {
                path: header.to_string_lossy().into_owned(),
                key: format!("mtime:{ms}"),
                symbols: entry_symbols(),
                struct_fields: BTreeMap::new(),
                needs_struct_keyword: vec![],
                enum_bit_widths: BTreeMap::new(),
            },
        );
        assert!(cache.is_valid(&header));
    }
}
