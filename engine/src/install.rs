//! Installer (C4.6): extracts the package archive into the live root via a
//! [`PrivilegedExecutor`], recording a per-file manifest; removes by
//! manifest in reverse order.

use std::path::{Path, PathBuf};
use std::process::Command;

use anvil_db::Database;
use anvil_recipe::Recipe;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{io_err, Error, Result};
use crate::unpack::extract_one;

/// All live-root mutation is funneled through this trait so `install`/`uninstall`
/// never care whether they're running as root directly or shelling out to
/// `sudo` (§4.6 expansion, per §9).
pub trait PrivilegedExecutor {
    fn mkdir_p(&self, path: &Path) -> Result<()>;
    fn install_file(&self, src: &Path, dest: &Path) -> Result<()>;
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn rm(&self, path: &Path) -> Result<()>;
    fn rmdir(&self, path: &Path) -> Result<()>;
}

/// Chooses the executor by `SUDO`/`FAKEROOT` environment inspection once, at
/// orchestrator start, rather than per call (§4.6 expansion).
pub fn select_executor(config: &Config) -> Box<dyn PrivilegedExecutor> {
    if config.fakeroot || nix::unistd::Uid::effective().is_root() {
        Box::new(DirectExecutor)
    } else {
        Box::new(SudoExecutor {
            sudo: config.sudo.clone(),
        })
    }
}

pub struct DirectExecutor;

impl PrivilegedExecutor for DirectExecutor {
    fn mkdir_p(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| io_err(path.to_path_buf(), e))
    }

    fn install_file(&self, src: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent.to_path_buf(), e))?;
        }
        std::fs::copy(src, dest).map_err(|e| io_err(dest.to_path_buf(), e))?;

        for mode in [0o755u32, 0o644] {
            use std::os::unix::fs::PermissionsExt;
            if std::fs::set_permissions(dest, std::fs::Permissions::from_mode(mode)).is_ok() {
                return Ok(());
            }
        }
        // Preserving copy already happened above; mode is best-effort only.
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent.to_path_buf(), e))?;
        }
        let _ = std::fs::remove_file(link);
        std::os::unix::fs::symlink(target, link).map_err(|e| io_err(link.to_path_buf(), e))
    }

    fn rm(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(io_err(path.to_path_buf(), e)),
        }
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        // Non-empty directories are left in place (§4.6 step 2).
        let _ = std::fs::remove_dir(path);
        Ok(())
    }
}

pub struct SudoExecutor {
    sudo: String,
}

impl SudoExecutor {
    fn run(&self, args: &[&str]) -> Result<()> {
        let status = Command::new(&self.sudo)
            .args(args)
            .status()
            .map_err(|e| io_err(PathBuf::from(args.last().copied().unwrap_or("")), e))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Io {
                path: PathBuf::from(args.last().copied().unwrap_or("")),
                source: std::io::Error::other(format!("{} exited with {status}", args.join(" "))),
            })
        }
    }
}

impl PrivilegedExecutor for SudoExecutor {
    fn mkdir_p(&self, path: &Path) -> Result<()> {
        self.run(&["mkdir", "-p", &path.to_string_lossy()])
    }

    fn install_file(&self, src: &Path, dest: &Path) -> Result<()> {
        let src = src.to_string_lossy().into_owned();
        let dest_s = dest.to_string_lossy().into_owned();
        for mode in ["0755", "0644"] {
            if self
                .run(&["install", "-D", "-m", mode, &src, &dest_s])
                .is_ok()
            {
                return Ok(());
            }
        }
        self.run(&["cp", "--preserve=mode", &src, &dest_s])
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        if let Some(parent) = link.parent() {
            self.mkdir_p(parent)?;
        }
        self.run(&[
            "ln",
            "-sfn",
            &target.to_string_lossy(),
            &link.to_string_lossy(),
        ])
    }

    fn rm(&self, path: &Path) -> Result<()> {
        self.run(&["rm", "-f", &path.to_string_lossy()])
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        let _ = self.run(&["rmdir", &path.to_string_lossy()]);
        Ok(())
    }
}

/// Extracts the package archive into a cleared scratch root, then copies
/// every path into `live_root` via `executor`, appending to the manifest as
/// it goes and writing the installed flag last (§4.6). Callers outside tests
/// pass `Path::new("/")`.
pub fn install(
    executor: &dyn PrivilegedExecutor,
    db: &Database,
    config: &Config,
    recipe: &Recipe,
    archive_path: &Path,
    live_root: &Path,
) -> Result<()> {
    let install_root = config.install_root();
    if install_root.is_dir() {
        std::fs::remove_dir_all(&install_root).map_err(|e| io_err(install_root.clone(), e))?;
    }
    std::fs::create_dir_all(&install_root).map_err(|e| io_err(install_root.clone(), e))?;

    extract_one(archive_path, &install_root)?;

    let mut writer = db.manifest_writer(&recipe.name, &recipe.version)?;

    for entry in WalkDir::new(&install_root).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(|e| {
            io_err(
                install_root.clone(),
                std::io::Error::other(e.to_string()),
            )
        })?;
        let relative = entry
            .path()
            .strip_prefix(&install_root)
            .expect("walkdir entries are under install_root");
        let dest = live_root.join(relative);

        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| io_err(entry.path().to_path_buf(), e))?;
            executor.symlink(&target, &dest)?;
        } else if entry.file_type().is_dir() {
            executor.mkdir_p(&dest)?;
        } else {
            executor.install_file(entry.path(), &dest)?;
        }

        writer.append(&dest.display().to_string())?;
    }

    db.mark_installed(&recipe.name, &recipe.version)?;
    Ok(())
}

/// Reverses `install` using the recorded manifest; a missing manifest is a
/// no-op success (§4.6 `uninstall` step 1).
pub fn uninstall(executor: &dyn PrivilegedExecutor, db: &Database, name: &str, version: &str) -> Result<()> {
    let manifest = db.manifest(name, version)?;
    if manifest.is_empty() {
        tracing::info!("no manifest for {name}@{version}; nothing to uninstall");
        return Ok(());
    }

    for recorded in manifest.iter().rev() {
        let path = Path::new(recorded);
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {
                let _ = executor.rmdir(path);
            }
            _ => {
                let _ = executor.rm(path);
            }
        }
    }

    db.remove(name, version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn uninstall_of_unmanifested_package_is_a_no_op() {
        let root = tempdir().unwrap();
        let db = Database::new(root.path());
        uninstall(&DirectExecutor, &db, "never-installed", "1.0").unwrap();
    }

    #[test]
    fn install_then_uninstall_round_trips_via_direct_executor() {
        let root = tempdir().unwrap();
        let live_root = tempdir().unwrap();

        let config = Config {
            repo: root.path().join("repo"),
            builddir: root.path().join("build"),
            srcdir: root.path().join("sources"),
            pkgdir: root.path().join("packages"),
            dbdir: root.path().join("db"),
            logdir: root.path().join("logs"),
            hooksd: root.path().join("hooks.d"),
            jobs: 1,
            sudo: "sudo".to_string(),
            fakeroot: true,
            fetch_retries: 1,
            force: false,
        };
        let db = Database::new(&config.dbdir);

        // Build a staging tree and pack it, to exercise install() against a
        // real .tar.zst the way the orchestrator would.
        let staging = root.path().join("staging");
        std::fs::create_dir_all(staging.join("opt/hello/bin")).unwrap();
        std::fs::write(staging.join("opt/hello/bin/hello"), b"hi").unwrap();

        let recipe = Recipe {
            name: "hello".to_string(),
            version: "1.0".to_string(),
            release: "1".to_string(),
            source_urls: vec![],
            git_url: None,
            depends: vec![],
            description: String::new(),
            license: String::new(),
            meson_opts: String::new(),
            cmake_opts: String::new(),
            configure_opts: String::new(),
            make_opts: "-j1".to_string(),
            build_subdir: None,
            patch_strip: 1,
            destdir: None,
            build_fn: None,
            recipe_dir: root.path().join("recipe"),
            variables: vec![],
        };

        let archive_path = crate::package::pack(&config, &recipe, &staging).unwrap();

        assert!(!db.is_installed("hello", "1.0"));
        install(&DirectExecutor, &db, &config, &recipe, &archive_path, live_root.path()).unwrap();
        assert!(db.is_installed("hello", "1.0"));

        let manifest = db.manifest("hello", "1.0").unwrap();
        assert!(manifest.iter().any(|p| p.ends_with("opt/hello/bin/hello")));

        uninstall(&DirectExecutor, &db, "hello", "1.0").unwrap();
        assert!(!db.is_installed("hello", "1.0"));
    }
}
