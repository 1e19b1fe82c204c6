//! Flat-file installed-package database for the Anvil package manager (§4.8).
//!
//! Every installed `(name, version)` pair is represented by two files in a
//! single flat directory: a `<name>-<version>.manifest` listing the absolute
//! paths that were written to the live root, and a `<name>-<version>.installed`
//! flag file holding the install timestamp. No locking is attempted; the
//! database is assumed to be touched by one invocation at a time.

pub mod error;
pub mod version;

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub use error::{Error, Result};

const MANIFEST_SUFFIX: &str = ".manifest";
const INSTALLED_SUFFIX: &str = ".installed";

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Handle to the flat-file package database rooted at `DBDIR`.
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
}

/// Appends paths to a manifest as they are installed (§4.6 step 4: "append
/// each installed absolute path to the manifest as it is written").
pub struct ManifestWriter {
    file: File,
}

impl ManifestWriter {
    pub fn append(&mut self, installed_path: &str) -> Result<()> {
        writeln!(self.file, "{installed_path}").map_err(|e| Error::Io {
            path: PathBuf::new(),
            source: e,
        })
    }
}

impl Database {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Database { root: root.into() }
    }

    fn stem(name: &str, version: &str) -> String {
        format!("{name}-{version}")
    }

    fn manifest_path(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}{MANIFEST_SUFFIX}", Self::stem(name, version)))
    }

    fn flag_path(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}{INSTALLED_SUFFIX}", Self::stem(name, version)))
    }

    /// Every `(name, version)` with an installed flag present, sorted by name
    /// then naturally by version.
    pub fn list_installed(&self) -> Result<Vec<(String, String)>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))? {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(INSTALLED_SUFFIX) else {
                continue;
            };
            let Some((name, version)) = stem.rsplit_once('-') else {
                continue;
            };
            found.push((name.to_string(), version.to_string()));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| version::natural_cmp(&a.1, &b.1)));
        Ok(found)
    }

    /// Every version of `name` with an installed flag, sorted by natural
    /// version order.
    pub fn installed_versions(&self, name: &str) -> Result<Vec<String>> {
        let mut versions: Vec<String> = self
            .list_installed()?
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .collect();
        version::sort_versions(&mut versions);
        Ok(versions)
    }

    pub fn is_installed(&self, name: &str, version: &str) -> bool {
        self.flag_path(name, version).is_file()
    }

    /// The ordered list of paths recorded in `name@version`'s manifest.
    pub fn manifest(&self, name: &str, version: &str) -> Result<Vec<String>> {
        let path = self.manifest_path(name, version);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| io_err(&path, e))?;
        BufReader::new(file)
            .lines()
            .map(|line| line.map_err(|e| io_err(&path, e)))
            .collect()
    }

    /// Opens (creating if absent) the manifest for incremental appends during
    /// installation.
    pub fn manifest_writer(&self, name: &str, version: &str) -> Result<ManifestWriter> {
        fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        let path = self.manifest_path(name, version);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        Ok(ManifestWriter { file })
    }

    /// Writes the installed flag with the current timestamp, marking
    /// installation complete (§4.6 step 5).
    pub fn mark_installed(&self, name: &str, version: &str) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        let path = self.flag_path(name, version);
        fs::write(&path, chrono::Utc::now().to_rfc3339()).map_err(|e| io_err(&path, e))
    }

    /// Deletes the manifest and installed flag for `name@version`. Absent
    /// files are not an error (§4.6 `uninstall` step 3).
    pub fn remove(&self, name: &str, version: &str) -> Result<()> {
        let manifest = self.manifest_path(name, version);
        if manifest.is_file() {
            fs::remove_file(&manifest).map_err(|e| io_err(&manifest, e))?;
        }
        let flag = self.flag_path(name, version);
        if flag.is_file() {
            fs::remove_file(&flag).map_err(|e| io_err(&flag, e))?;
        }
        Ok(())
    }
}
