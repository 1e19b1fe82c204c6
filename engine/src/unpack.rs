//! Unpacker/Patcher (C4.3): extracts cached archives into the build
//! workspace by format, then applies ordered patches.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anvil_recipe::Recipe;

use crate::error::{io_err, Error, Result};
use crate::tools::ToolCache;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum SourceKind {
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
    Zip,
    SingleGz,
    SingleBz2,
    SingleXz,
    SingleZst,
}

fn detect(filename: &str) -> Option<SourceKind> {
    let lower = filename.to_ascii_lowercase();
    let kind = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        SourceKind::TarGz
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
        SourceKind::TarBz2
    } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
        SourceKind::TarXz
    } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
        SourceKind::TarZst
    } else if lower.ends_with(".zip") {
        SourceKind::Zip
    } else if lower.ends_with(".gz") {
        SourceKind::SingleGz
    } else if lower.ends_with(".bz2") {
        SourceKind::SingleBz2
    } else if lower.ends_with(".xz") {
        SourceKind::SingleXz
    } else if lower.ends_with(".zst") {
        SourceKind::SingleZst
    } else {
        return None;
    };
    Some(kind)
}

/// Extracts `archive` into `dest`, dispatching on filename suffix. An
/// unrecognized suffix is fatal (§4.3).
pub fn extract_one(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    let kind = detect(&filename).ok_or_else(|| {
        Error::Unpack(filename.clone(), "unrecognized archive suffix".to_string())
    })?;

    std::fs::create_dir_all(dest).map_err(|e| io_err(dest.to_path_buf(), e))?;

    let open = |p: &Path| File::open(p).map_err(|e| io_err(p.to_path_buf(), e));

    match kind {
        SourceKind::TarGz => {
            let file = open(archive)?;
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| Error::Unpack(filename, e.to_string()))?;
        }
        SourceKind::TarBz2 => {
            let file = open(archive)?;
            let decoder = bzip2::read::BzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| Error::Unpack(filename, e.to_string()))?;
        }
        SourceKind::TarXz => {
            let file = open(archive)?;
            let decoder = xz2::read::XzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| Error::Unpack(filename, e.to_string()))?;
        }
        SourceKind::TarZst => {
            let file = open(archive)?;
            let decoder = zstd::stream::read::Decoder::new(file)
                .map_err(|e| Error::Unpack(filename.clone(), e.to_string()))?;
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| Error::Unpack(filename, e.to_string()))?;
        }
        SourceKind::Zip => {
            let file = open(archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| Error::Unpack(filename.clone(), e.to_string()))?;
            zip.extract(dest)
                .map_err(|e| Error::Unpack(filename, e.to_string()))?;
        }
        SourceKind::SingleGz | SourceKind::SingleBz2 | SourceKind::SingleXz | SourceKind::SingleZst => {
            let stripped = strip_single_suffix(&filename);
            let out_path = dest.join(stripped);
            let mut file = open(archive)?;
            let mut out = File::create(&out_path).map_err(|e| io_err(out_path.clone(), e))?;
            match kind {
                SourceKind::SingleGz => {
                    std::io::copy(&mut flate2::read::GzDecoder::new(file), &mut out)
                }
                SourceKind::SingleBz2 => {
                    std::io::copy(&mut bzip2::read::BzDecoder::new(file), &mut out)
                }
                SourceKind::SingleXz => {
                    std::io::copy(&mut xz2::read::XzDecoder::new(file), &mut out)
                }
                SourceKind::SingleZst => {
                    let mut decoder = zstd::stream::read::Decoder::new(&mut file)
                        .map_err(|e| Error::Unpack(filename.clone(), e.to_string()))?;
                    std::io::copy(&mut decoder, &mut out)
                }
                _ => unreachable!(),
            }
            .map_err(|e| io_err(out_path, e))?;
        }
    }

    Ok(())
}

fn strip_single_suffix(filename: &str) -> &str {
    for suffix in [".gz", ".bz2", ".xz", ".zst"] {
        if let Some(stripped) = filename.strip_suffix(suffix) {
            return stripped;
        }
    }
    filename
}

/// The directory the build driver should treat as the effective source root:
/// the sole top-level directory if the workspace contains exactly one,
/// otherwise the workspace root itself (§4.3).
pub fn effective_source_root(workspace: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(workspace).map_err(|e| io_err(workspace.to_path_buf(), e))? {
        let entry = entry.map_err(|e| io_err(workspace.to_path_buf(), e))?;
        if entry.path().is_dir() {
            entries.push(entry.path());
        }
    }

    let total_entries = std::fs::read_dir(workspace)
        .map_err(|e| io_err(workspace.to_path_buf(), e))?
        .count();

    if entries.len() == 1 && total_entries == 1 {
        Ok(entries.into_iter().next().unwrap())
    } else {
        Ok(workspace.to_path_buf())
    }
}

/// Applies every `*.patch` file under `patches_dir`, in lexicographic order,
/// with strip level `patch_strip`, against `working_dir`. A patch failure is
/// fatal (§4.3).
pub fn apply_patches(
    tools: &ToolCache,
    patches_dir: &Path,
    working_dir: &Path,
    patch_strip: u32,
) -> Result<()> {
    if !patches_dir.is_dir() {
        return Ok(());
    }

    let patch_bin = tools.resolve("patch")?;

    let mut patches: Vec<PathBuf> = std::fs::read_dir(patches_dir)
        .map_err(|e| io_err(patches_dir.to_path_buf(), e))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "patch").unwrap_or(false))
        .collect();
    patches.sort();

    for patch in patches {
        tracing::debug!("applying patch {}", patch.display());
        let mut file = File::open(&patch).map_err(|e| io_err(patch.clone(), e))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| io_err(patch.clone(), e))?;

        let mut child = Command::new(&patch_bin)
            .arg(format!("-p{patch_strip}"))
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| io_err(working_dir.to_path_buf(), e))?;

        use std::io::Write;
        child
            .stdin
            .take()
            .unwrap()
            .write_all(contents.as_bytes())
            .map_err(|e| io_err(patch.clone(), e))?;

        let status = child.wait().map_err(|e| io_err(patch.clone(), e))?;
        if !status.success() {
            return Err(Error::Unpack(
                patch.display().to_string(),
                format!("patch exited with {status}"),
            ));
        }
    }

    Ok(())
}

/// Clears and recreates the build workspace, extracts every cached source
/// into it, and returns the effective source root.
pub fn prepare_workspace(
    tools: &ToolCache,
    recipe: &Recipe,
    cached_sources: &[PathBuf],
    workspace: &Path,
) -> Result<PathBuf> {
    if workspace.is_dir() {
        std::fs::remove_dir_all(workspace).map_err(|e| io_err(workspace.to_path_buf(), e))?;
    }
    std::fs::create_dir_all(workspace).map_err(|e| io_err(workspace.to_path_buf(), e))?;

    for source in cached_sources {
        if source.is_dir() {
            // A git checkout: already a directory tree, not an archive to extract.
            continue;
        }
        extract_one(source, workspace)?;
    }

    let root = effective_source_root(workspace)?;

    let patches_dir = recipe.recipe_dir.join("patches");
    apply_patches(tools, &patches_dir, &root, recipe.patch_strip)?;

    Ok(root)
}
