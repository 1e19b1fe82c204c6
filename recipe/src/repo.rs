use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Walks `REPO/<category>/<pkg>/<version>/` looking for a `recipe` file in
/// each leaf directory. Category names are treated as opaque by the core.
pub fn find_recipe_dirs(repo_root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = repo_root.join("*/*/*/recipe");
    let pattern_str = pattern.to_string_lossy();

    let mut dirs = Vec::new();
    for entry in glob::glob(&pattern_str)? {
        match entry {
            Ok(recipe_file) => {
                if let Some(dir) = recipe_file.parent() {
                    dirs.push(dir.to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!("error walking repository tree: {e}");
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Finds the first recipe directory (in repository walk order) whose leaf
/// directory name equals `pkg`, tolerating multiple versions of the same
/// package by picking the first match — version disambiguation for
/// dependency edges is explicitly out of scope (§4.7).
pub fn find_by_name(repo_root: &Path, pkg: &str) -> Result<Option<PathBuf>> {
    for dir in find_recipe_dirs(repo_root)? {
        if dir.parent().and_then(|p| p.file_name()) == Some(std::ffi::OsStr::new(pkg)) {
            return Ok(Some(dir));
        }
    }
    Ok(None)
}

/// Resolves a CLI target string to exactly one recipe directory.
///
/// A target is one of:
/// - an absolute path to a recipe directory,
/// - a repository-relative path (`base/gcc/gcc-12.2.0`),
/// - a bare fragment matched uniquely against the trailing path components of
///   every recipe directory under `repo_root`.
pub fn resolve_target(repo_root: &Path, target: &str) -> Result<PathBuf> {
    let as_path = Path::new(target);
    if as_path.is_absolute() && as_path.join("recipe").is_file() {
        return Ok(as_path.to_path_buf());
    }

    let relative = repo_root.join(target);
    if relative.join("recipe").is_file() {
        return Ok(relative);
    }

    let all = find_recipe_dirs(repo_root)?;
    let matches: Vec<PathBuf> = all
        .into_iter()
        .filter(|dir| dir.ends_with(target) || dir.to_string_lossy().contains(target))
        .collect();

    match matches.len() {
        0 => Err(Error::TargetNotFound(target.to_string())),
        1 => Ok(matches.into_iter().next().unwrap()),
        n => Err(Error::AmbiguousTarget(target.to_string(), n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_recipe(root: &Path, category: &str, pkg: &str, version: &str) {
        let dir = root.join(category).join(pkg).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("recipe"),
            format!("PKG_NAME={pkg}\nPKG_VERSION={version}\n"),
        )
        .unwrap();
    }

    #[test]
    fn finds_all_recipe_dirs() {
        let root = tempdir().unwrap();
        make_recipe(root.path(), "base", "gcc", "12.2.0");
        make_recipe(root.path(), "x11", "mesa", "23.0");

        let dirs = find_recipe_dirs(root.path()).unwrap();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn resolves_repo_relative_target() {
        let root = tempdir().unwrap();
        make_recipe(root.path(), "base", "gcc", "12.2.0");

        let resolved = resolve_target(root.path(), "base/gcc/12.2.0").unwrap();
        assert_eq!(resolved, root.path().join("base/gcc/12.2.0"));
    }

    #[test]
    fn unique_fragment_resolves() {
        let root = tempdir().unwrap();
        make_recipe(root.path(), "base", "gcc", "12.2.0");
        make_recipe(root.path(), "x11", "mesa", "23.0");

        let resolved = resolve_target(root.path(), "mesa").unwrap();
        assert!(resolved.ends_with("x11/mesa/23.0"));
    }

    #[test]
    fn ambiguous_fragment_errors() {
        let root = tempdir().unwrap();
        make_recipe(root.path(), "base", "gcc", "12.2.0");
        make_recipe(root.path(), "base", "gcc", "13.0.0");

        let err = resolve_target(root.path(), "gcc").unwrap_err();
        assert!(matches!(err, Error::AmbiguousTarget(_, 2)));
    }

    #[test]
    fn missing_target_errors() {
        let root = tempdir().unwrap();
        let err = resolve_target(root.path(), "nope").unwrap_err();
        assert!(matches!(err, Error::TargetNotFound(_)));
    }

    #[test]
    fn find_by_name_picks_first_match() {
        let root = tempdir().unwrap();
        make_recipe(root.path(), "base", "libfoo", "1");

        let found = find_by_name(root.path(), "libfoo").unwrap();
        assert!(found.is_some());
        assert!(found.unwrap().ends_with("base/libfoo/1"));
    }
}
