#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cnx_backend_c::GENERATED_SENTINEL;

/// One source unit: where it lives and where its output lands relative
/// to the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitPath {
    pub path: PathBuf,
    pub relative: PathBuf,
}

fn is_unit(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("cnx") | Some("cnext")
    )
}

/// Resolve explicit files and walk directories for `.cnx`/`.cnext`
/// units. The result is sorted so discovery order never depends on the
/// filesystem.
pub fn discover_units(inputs: &[PathBuf]) -> io::Result<Vec<UnitPath>> {
    let mut units = Vec::new();

    for input in inputs {
        let meta = fs::metadata(input)?;
        if meta.is_file() {
            if is_unit(input) {
                let relative = PathBuf::from(input.file_name().unwrap_or_default());
                units.push(UnitPath {
                    path: input.clone(),
                    relative,
                });
            }
            continue;
        }
        walk(input, input, &mut units)?;
    }

    units.sort_by(|a, b| a.path.cmp(&b.path));
    units.dedup();
    Ok(units)
}

fn walk(root: &Path, dir: &Path, units: &mut Vec<UnitPath>) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            walk(root, &entry, units)?;
        } else if is_unit(&entry) {
            let relative = entry.strip_prefix(root).unwrap_or(&entry).to_path_buf();
            units.push(UnitPath {
                path: entry,
                relative,
            });
        }
    }
    Ok(())
}

/// Emitted artifacts carry the banner sentinel; feeding one back in is
/// skipped rather than re-ingested.
pub fn is_generated(text: &str) -> bool {
    text.lines().take(3).any(|l| l.contains(GENERATED_SENTINEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_is_sorted_and_recursive() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("drivers")).expect("mkdir");
        fs::write(dir.path().join("b.cnx"), "").expect("write");
        fs::write(dir.path().join("a.cnx"), "").expect("write");
        fs::write(dir.path().join("drivers/uart.cnx"), "").expect("write");
        fs::write(dir.path().join("notes.txt"), "").expect("write");

        let units = discover_units(&[dir.path().to_path_buf()]).expect("discover");
        let rels: Vec<_> = units.iter().map(|u| u.relative.clone()).collect();
        assert_eq!(
            rels,
            vec![
                PathBuf::from("a.cnx"),
                PathBuf::from("b.cnx"),
                PathBuf::from("drivers/uart.cnx"),
            ]
        );
    }

    #[test]
    fn generated_sentinel_is_detected() {
        assert!(is_generated("// Generated by C-Next Transpiler\nint main(void) {}\n"));
        assert!(!is_generated("// hand-written\nint main(void) {}\n"));
    }
}
