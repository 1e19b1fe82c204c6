//! Hook Runner (C10): invokes `HOOKSD/<phase>-*.sh` entries in lexicographic
//! order with package context. Hook failures are warnings, never fatal
//! (error kind 8, §7).

use std::path::Path;
use std::process::Command;

use anvil_recipe::Recipe;

use crate::config::Config;

/// Runs every `HOOKSD/<phase>-*.sh` script in lexicographic order, passing
/// `(package_name, package_version, recipe_dir)` as arguments and the
/// recipe's declared variables as environment. Non-zero exit is logged as a
/// warning and does not stop the remaining hooks or the caller's pipeline.
pub fn run_phase(config: &Config, phase: &str, recipe: &Recipe) {
    if !config.hooksd.is_dir() {
        return;
    }

    let prefix = format!("{phase}-");
    let mut scripts: Vec<_> = match std::fs::read_dir(&config.hooksd) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".sh"))
                    .unwrap_or(false)
            })
            .collect(),
        Err(e) => {
            tracing::warn!("could not read hooks directory {}: {e}", config.hooksd.display());
            return;
        }
    };
    scripts.sort();

    for script in scripts {
        run_one(&script, recipe);
    }
}

fn run_one(script: &Path, recipe: &Recipe) {
    tracing::debug!("running hook {}", script.display());

    let mut command = Command::new(script);
    command
        .arg(&recipe.name)
        .arg(&recipe.version)
        .arg(&recipe.recipe_dir);

    for (key, value) in &recipe.variables {
        command.env(key, value);
    }

    match command.status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!("hook {} exited with {status}", script.display());
        }
        Err(e) => {
            tracing::warn!("failed to run hook {}: {e}", script.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn make_recipe(recipe_dir: std::path::PathBuf) -> Recipe {
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
            variables: vec![("PKG_NAME".to_string(), "hello".to_string())],
        }
    }

    fn test_config(hooksd: std::path::PathBuf) -> Config {
        Config {
            repo: hooksd.join("repo"),
            builddir: hooksd.join("build"),
            srcdir: hooksd.join("sources"),
            pkgdir: hooksd.join("packages"),
            dbdir: hooksd.join("db"),
            logdir: hooksd.join("logs"),
            hooksd,
            jobs: 1,
            sudo: "sudo".to_string(),
            fakeroot: false,
            fetch_retries: 1,
            force: false,
        }
    }

    #[test]
    fn runs_matching_phase_scripts_in_order() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");

        let script_path = dir.path().join("10-pre-build.sh");
        std::fs::write(
            &script_path,
            format!("#!/bin/sh\necho \"$1 $2\" >> {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = test_config(dir.path().to_path_buf());
        let recipe = make_recipe(dir.path().join("recipe"));
        run_phase(&config, "pre-build", &recipe);

        let contents = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(contents.trim(), "hello 1.0");
    }

    #[test]
    fn missing_hooksd_is_a_silent_no_op() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("does-not-exist"));
        let recipe = make_recipe(dir.path().join("recipe"));
        run_phase(&config, "pre-build", &recipe);
    }
}
