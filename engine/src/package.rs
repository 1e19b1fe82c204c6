//! Packager (C4.5): packs a staging tree into `PKGDIR/<name>-<version>-<release>.tar.zst`,
//! rooted at `.`, with numeric-owner tar headers and high-ratio zstd.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use anvil_recipe::Recipe;

use crate::config::Config;
use crate::error::{io_err, Error, Result};

const ZSTD_LEVEL: i32 = 19;

/// Hex-encoded SHA-256 of the file at `path`, streamed in fixed-size chunks
/// so packaging large artifacts doesn't load them into memory whole.
fn sha256sum(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| io_err(path.to_path_buf(), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Packs `staging_dir` (the recipe's DESTDIR) into a `.tar.zst` archive under
/// `PKGDIR`, returning the archive path.
pub fn pack(config: &Config, recipe: &Recipe, staging_dir: &Path) -> Result<PathBuf> {
    let archive_path = config.package_path(&recipe.name, &recipe.version, &recipe.release);
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent.to_path_buf(), e))?;
    }

    let file = File::create(&archive_path).map_err(|e| io_err(archive_path.clone(), e))?;
    let encoder = zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)
        .map_err(|e| Error::Unpack(archive_path.display().to_string(), e.to_string()))?;

    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    if staging_dir.is_dir() {
        builder
            .append_dir_all(".", staging_dir)
            .map_err(|e| Error::Unpack(archive_path.display().to_string(), e.to_string()))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Unpack(archive_path.display().to_string(), e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::Unpack(archive_path.display().to_string(), e.to_string()))?;

    let sha256 = sha256sum(&archive_path)?;
    let filename = archive_path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
    let sha256_path = archive_path.with_file_name(format!("{filename}.sha256"));
    std::fs::write(&sha256_path, format!("{sha256}  {filename}\n"))
        .map_err(|e| io_err(sha256_path.clone(), e))?;

    Ok(archive_path)
}
