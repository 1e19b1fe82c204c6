//! Reverse-dependency scanning (§4.9 expansion): walks standard system
//! directories for ELF binaries/libraries and reports any whose `DT_NEEDED`
//! entries don't resolve anywhere searchable.

use std::path::{Path, PathBuf};

use goblin::elf::Elf;
use walkdir::WalkDir;

const STANDARD_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/usr/lib", "/usr/local/lib"];

const SCAN_CAP: usize = 5000;

/// One binary found to reference a shared library that cannot be resolved
/// against its rpath/runpath or the standard library directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenBinary {
    pub path: PathBuf,
    pub missing: Vec<String>,
}

fn candidate_files(roots: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    'outer: for root in roots {
        if !Path::new(root).is_dir() {
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.into_path());
                if files.len() >= SCAN_CAP {
                    tracing::warn!(
                        "revdep scan hit the {SCAN_CAP}-file cap; scan is partial"
                    );
                    break 'outer;
                }
            }
        }
    }
    files
}

fn search_paths(elf: &Elf, dynamic_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for rpath in elf.rpaths.iter().chain(elf.runpaths.iter()) {
        for entry in rpath.split(':') {
            let entry = entry.replace("$ORIGIN", &dynamic_dir.to_string_lossy());
            paths.push(PathBuf::from(entry));
        }
    }
    for dir in STANDARD_DIRS {
        paths.push(PathBuf::from(dir));
    }
    paths
}

fn resolves(name: &str, search: &[PathBuf]) -> bool {
    search.iter().any(|dir| dir.join(name).is_file())
}

/// Scans `/usr/bin`, `/usr/local/bin`, `/usr/lib`, `/usr/local/lib` (capped
/// at [`SCAN_CAP`] files) for ELF files whose `DT_NEEDED` libraries don't
/// resolve. Non-ELF files are skipped silently.
pub fn scan() -> Vec<BrokenBinary> {
    let mut broken = Vec::new();

    for path in candidate_files(STANDARD_DIRS) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let Ok(elf) = Elf::parse(&bytes) else {
            continue;
        };
        if elf.libraries.is_empty() {
            continue;
        }

        let dir = path.parent().unwrap_or(Path::new("/"));
        let search = search_paths(&elf, dir);

        let missing: Vec<String> = elf
            .libraries
            .iter()
            .copied()
            .filter(|lib| !resolves(lib, &search))
            .map(|lib| lib.to_string())
            .collect();

        if !missing.is_empty() {
            broken.push(BrokenBinary {
                path,
                missing,
            });
        }
    }

    broken
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_finds_a_library_in_a_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libfoo.so"), b"\0").unwrap();
        let search = vec![dir.path().to_path_buf()];
        assert!(resolves("libfoo.so", &search));
        assert!(!resolves("libbar.so", &search));
    }

    #[test]
    fn candidate_files_respects_the_scan_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("f{i}")), b"x").unwrap();
        }
        let dir_str = dir.path().to_string_lossy().into_owned();
        let files = candidate_files(&[dir_str.as_str()]);
        assert_eq!(files.len(), 10);
    }
}
