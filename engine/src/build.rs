//! Build Driver (C4.4): detects the recipe's build system and runs
//! configure -> build -> stage-install into DESTDIR.

use std::path::{Path, PathBuf};
use std::process::Command;

use anvil_recipe::Recipe;

use crate::config::Config;
use crate::error::{io_err, Result};
use crate::process::run_logged;
use crate::tools::ToolCache;

/// The build system variant a recipe's source tree is driven through
/// (§9 Design Notes: "tagged variants" rather than chained presence tests).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BuildSystem {
    Meson,
    CMake,
    Autoconf,
    Make,
    RecipeProvided,
    None,
}

/// Selects the build system in priority order (§4.4 step 4).
pub fn detect(source_root: &Path, recipe: &Recipe) -> BuildSystem {
    if source_root.join("meson.build").is_file() || !recipe.meson_opts.is_empty() {
        BuildSystem::Meson
    } else if source_root.join("CMakeLists.txt").is_file() || !recipe.cmake_opts.is_empty() {
        BuildSystem::CMake
    } else if source_root.join("configure").is_file() {
        BuildSystem::Autoconf
    } else if source_root.join("Makefile").is_file() {
        BuildSystem::Make
    } else if recipe.build_fn.is_some() {
        BuildSystem::RecipeProvided
    } else {
        BuildSystem::None
    }
}

/// Runs the detected build system against `source_root`, staging the
/// install into `destdir`. Every step's combined output appends to
/// `log_path`; a non-zero exit is fatal for the package (§4.4).
pub fn run(
    tools: &ToolCache,
    config: &Config,
    recipe: &Recipe,
    source_root: &Path,
    destdir: &Path,
    log_path: &Path,
) -> Result<BuildSystem> {
    if destdir.is_dir() {
        std::fs::remove_dir_all(destdir).map_err(|e| io_err(destdir.to_path_buf(), e))?;
    }
    std::fs::create_dir_all(destdir).map_err(|e| io_err(destdir.to_path_buf(), e))?;

    let package = recipe.node_id();
    let system = detect(source_root, recipe);

    match system {
        BuildSystem::Meson => {
            let meson = tools.resolve("meson")?;
            let ninja = tools.resolve("ninja")?;
            let build_dir = source_root.join("build");

            let mut setup = Command::new(&meson);
            setup.arg("setup").arg(&build_dir);
            setup.args(recipe.meson_opts.split_whitespace());
            setup.current_dir(source_root);
            run_logged(setup, log_path, &package, "meson setup")?;

            let mut compile = Command::new(&ninja);
            compile.arg("-C").arg(&build_dir);
            compile.args(recipe.make_opts.split_whitespace());
            compile.current_dir(source_root);
            run_logged(compile, log_path, &package, "ninja build")?;

            let mut install = Command::new(&ninja);
            install
                .arg("-C")
                .arg(&build_dir)
                .env("DESTDIR", destdir)
                .arg("install");
            install.current_dir(source_root);
            run_logged(install, log_path, &package, "ninja install")?;
        }
        BuildSystem::CMake => {
            let cmake = tools.resolve("cmake")?;
            let make = tools.resolve("make")?;
            let build_dir = source_root.join("build");
            std::fs::create_dir_all(&build_dir).map_err(|e| io_err(build_dir.clone(), e))?;

            let mut configure = Command::new(&cmake);
            configure.arg("..");
            configure.args(recipe.cmake_opts.split_whitespace());
            configure.current_dir(&build_dir);
            run_logged(configure, log_path, &package, "cmake configure")?;

            let mut compile = Command::new(&make);
            compile.args(recipe.make_opts.split_whitespace());
            compile.current_dir(&build_dir);
            run_logged(compile, log_path, &package, "make")?;

            let mut install = Command::new(&make);
            install.env("DESTDIR", destdir).arg("install");
            install.current_dir(&build_dir);
            run_logged(install, log_path, &package, "make install")?;
        }
        BuildSystem::Autoconf => {
            let make = tools.resolve("make")?;

            let mut configure = Command::new(source_root.join("configure"));
            configure.args(recipe.configure_opts.split_whitespace());
            configure.current_dir(source_root);
            run_logged(configure, log_path, &package, "configure")?;

            let mut compile = Command::new(&make);
            compile.args(recipe.make_opts.split_whitespace());
            compile.current_dir(source_root);
            run_logged(compile, log_path, &package, "make")?;

            let mut install = Command::new(&make);
            install.env("DESTDIR", destdir).arg("install");
            install.current_dir(source_root);
            run_logged(install, log_path, &package, "make install")?;
        }
        BuildSystem::Make => {
            let make = tools.resolve("make")?;

            let mut compile = Command::new(&make);
            compile.args(recipe.make_opts.split_whitespace());
            compile.current_dir(source_root);
            run_logged(compile, log_path, &package, "make")?;

            let mut install = Command::new(&make);
            install.env("DESTDIR", destdir).arg("install");
            install.current_dir(source_root);
            run_logged(install, log_path, &package, "make install")?;
        }
        BuildSystem::RecipeProvided => {
            let sh = tools.resolve("sh")?;
            let build_fn = recipe.build_fn.clone().unwrap_or_default();

            let mut run_fn = Command::new(&sh);
            run_fn.arg("-c").arg(&build_fn);
            run_fn.env("DESTDIR", destdir);
            run_fn.current_dir(source_root);
            for (key, value) in &recipe.variables {
                run_fn.env(key, value);
            }
            run_logged(run_fn, log_path, &package, "PKG_BUILD_FN")?;
        }
        BuildSystem::None => {
            tracing::warn!("no build system detected for {package}; nothing to build");
        }
    }

    Ok(system)
}

pub fn destdir_for(config: &Config, recipe: &Recipe) -> PathBuf {
    recipe
        .destdir
        .clone()
        .unwrap_or_else(|| config.build_workspace(&recipe.name, &recipe.version).join("destdir"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_recipe(recipe_dir: PathBuf) -> Recipe {
        Recipe {
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
            recipe_dir,
            variables: vec![],
        }
    }

    #[test]
    fn detects_autoconf_from_configure_script() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("configure"), "#!/bin/sh\n").unwrap();
        let recipe = make_recipe(dir.path().to_path_buf());
        assert_eq!(detect(dir.path(), &recipe), BuildSystem::Autoconf);
    }

    #[test]
    fn meson_opts_alone_selects_meson_even_without_meson_build() {
        let dir = tempdir().unwrap();
        let mut recipe = make_recipe(dir.path().to_path_buf());
        recipe.meson_opts = "-Dfoo=bar".to_string();
        assert_eq!(detect(dir.path(), &recipe), BuildSystem::Meson);
    }

    #[test]
    fn falls_back_to_recipe_provided_build_fn() {
        let dir = tempdir().unwrap();
        let mut recipe = make_recipe(dir.path().to_path_buf());
        recipe.build_fn = Some("echo hi".to_string());
        assert_eq!(detect(dir.path(), &recipe), BuildSystem::RecipeProvided);
    }

    #[test]
    fn no_recognized_markers_yields_none() {
        let dir = tempdir().unwrap();
        let recipe = make_recipe(dir.path().to_path_buf());
        assert_eq!(detect(dir.path(), &recipe), BuildSystem::None);
    }

    #[test]
    fn runs_recipe_provided_build_fn_end_to_end() {
        let dir = tempdir().unwrap();
        let source_root = dir.path().join("src");
        std::fs::create_dir_all(&source_root).unwrap();

        let mut recipe = make_recipe(source_root.clone());
        recipe.build_fn = Some("touch \"$DESTDIR/marker\"".to_string());

        let tools = ToolCache::new();
        let config = Config {
            repo: dir.path().join("repo"),
            builddir: dir.path().join("build"),
            srcdir: dir.path().join("sources"),
            pkgdir: dir.path().join("packages"),
            dbdir: dir.path().join("db"),
            logdir: dir.path().join("logs"),
            hooksd: dir.path().join("hooks.d"),
            jobs: 1,
            sudo: "sudo".to_string(),
            fakeroot: false,
            fetch_retries: 1,
            force: false,
        };
        let destdir = dir.path().join("destdir");
        let log_path = config.log_path(&recipe.name, &recipe.version);

        let system = run(&tools, &config, &recipe, &source_root, &destdir, &log_path).unwrap();
        assert_eq!(system, BuildSystem::RecipeProvided);
        assert!(destdir.join("marker").is_file());
    }
}
