use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::types::{LoaderDefaults, Recipe};

const RECOGNIZED_KEYS: &[&str] = &[
    "PKG_NAME",
    "PKG_VERSION",
    "PKG_RELEASE",
    "PKG_SOURCE_URLS",
    "PKG_GIT_URL",
    "PKG_DEPENDS",
    "PKG_DESC",
    "PKG_LICENSE",
    "PKG_MESON_OPTS",
    "PKG_CMAKE_OPTS",
    "PKG_CONFIGURE_OPTS",
    "PKG_MAKE_OPTS",
    "PKG_DESTDIR",
    "PKG_BUILD_SUBDIR",
    "PKG_PATCH_STRIP",
    "PKG_BUILD_FN",
];

/// Parses one `KEY=VALUE` assignment file, resolving `${OTHER_KEY}` references
/// against keys assigned earlier in the same file. No external interpreter is
/// invoked; only the restricted subset documented in the recipe file schema is
/// understood.
fn parse_assignments(content: &str) -> Result<IndexMap<String, String>> {
    let mut vars: IndexMap<String, String> = IndexMap::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, raw_value)) = line.split_once('=') else {
            return Err(Error::MalformedLine {
                line: idx + 1,
                text: raw_line.to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::MalformedLine {
                line: idx + 1,
                text: raw_line.to_string(),
            });
        }

        let value = strip_quotes(raw_value.trim());
        let substituted = substitute(&value, &vars);
        vars.insert(key.to_string(), substituted);
    }

    Ok(vars)
}

fn strip_quotes(value: &str) -> String {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Textually substitutes `${KEY}` references against keys already assigned.
/// Unknown references are left untouched rather than erroring, matching a
/// permissive shell-assignment style.
fn substitute(value: &str, vars: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '$' && value[i..].starts_with("${") {
            if let Some(end) = value[i..].find('}') {
                let key = &value[i + 2..i + end];
                if let Some(v) = vars.get(key) {
                    out.push_str(v);
                } else {
                    out.push_str(&value[i..i + end + 1]);
                }
                for _ in 0..end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }

    out
}

fn split_whitespace_list(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loads a single recipe directory into a fresh, immutable `Recipe` record.
///
/// The loader resets all fields to documented defaults before evaluating the
/// new recipe file, so repeated calls never bleed state between recipes.
pub fn load_recipe(recipe_dir: &Path, defaults: &LoaderDefaults) -> Result<Recipe> {
    let recipe_file = recipe_dir.join("recipe");
    let content = std::fs::read_to_string(&recipe_file).map_err(|source| Error::Io {
        path: recipe_file.clone(),
        source,
    })?;

    let vars = parse_assignments(&content)?;
    let get = |k: &str| vars.get(k).cloned().unwrap_or_default();

    let name = get("PKG_NAME");
    if name.trim().is_empty() {
        return Err(Error::MissingName(recipe_dir.to_path_buf()));
    }

    let version = get("PKG_VERSION");
    if version.trim().is_empty() {
        return Err(Error::MissingVersion(recipe_dir.to_path_buf()));
    }

    let release = {
        let r = get("PKG_RELEASE");
        if r.is_empty() {
            "1".to_string()
        } else {
            r
        }
    };

    let make_opts = {
        let m = get("PKG_MAKE_OPTS");
        if m.is_empty() {
            defaults.make_opts.clone()
        } else {
            m
        }
    };

    let patch_strip = vars
        .get("PKG_PATCH_STRIP")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(defaults.patch_strip);

    let variables = RECOGNIZED_KEYS
        .iter()
        .filter_map(|k| vars.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();

    Ok(Recipe {
        name,
        version,
        release,
        source_urls: split_whitespace_list(&get("PKG_SOURCE_URLS")),
        git_url: vars.get("PKG_GIT_URL").filter(|v| !v.is_empty()).cloned(),
        depends: split_whitespace_list(&get("PKG_DEPENDS")),
        description: get("PKG_DESC"),
        license: get("PKG_LICENSE"),
        meson_opts: get("PKG_MESON_OPTS"),
        cmake_opts: get("PKG_CMAKE_OPTS"),
        configure_opts: get("PKG_CONFIGURE_OPTS"),
        make_opts,
        build_subdir: vars
            .get("PKG_BUILD_SUBDIR")
            .filter(|v| !v.is_empty())
            .cloned(),
        patch_strip,
        destdir: vars.get("PKG_DESTDIR").filter(|v| !v.is_empty()).map(PathBuf::from),
        build_fn: vars.get("PKG_BUILD_FN").filter(|v| !v.is_empty()).cloned(),
        recipe_dir: recipe_dir.to_path_buf(),
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_recipe(dir: &Path, content: &str) {
        std::fs::write(dir.join("recipe"), content).unwrap();
    }

    #[test]
    fn loads_minimal_recipe() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "PKG_NAME=hello\nPKG_VERSION=1.0\nPKG_SOURCE_URLS=https://ex/hello-1.0.tar.gz\n",
        );

        let recipe = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap();
        assert_eq!(recipe.name, "hello");
        assert_eq!(recipe.version, "1.0");
        assert_eq!(recipe.release, "1");
        assert_eq!(recipe.source_urls, vec!["https://ex/hello-1.0.tar.gz"]);
        assert!(recipe.depends.is_empty());
    }

    #[test]
    fn substitutes_prior_keys() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "PKG_NAME=hello\nPKG_VERSION=1.0\nPKG_SOURCE_URLS=https://ex/${PKG_NAME}-${PKG_VERSION}.tar.gz\n",
        );

        let recipe = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap();
        assert_eq!(recipe.source_urls, vec!["https://ex/hello-1.0.tar.gz"]);
    }

    #[test]
    fn missing_name_is_fatal() {
        let dir = tempdir().unwrap();
        write_recipe(dir.path(), "PKG_VERSION=1.0\n");
        let err = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::MissingName(_)));
    }

    #[test]
    fn loading_twice_yields_identical_output() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "PKG_NAME=hello\nPKG_VERSION=1.0\nPKG_DEPENDS=a b c\n",
        );

        let defaults = LoaderDefaults::default();
        let first = load_recipe(dir.path(), &defaults).unwrap();
        let second = load_recipe(dir.path(), &defaults).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn depends_list_is_whitespace_split() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "PKG_NAME=app\nPKG_VERSION=3\nPKG_DEPENDS=libfoo   bar\n",
        );
        let recipe = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap();
        assert_eq!(recipe.depends, vec!["libfoo", "bar"]);
    }

    #[test]
    fn patch_strip_overridable_per_recipe() {
        let dir = tempdir().unwrap();
        write_recipe(
            dir.path(),
            "PKG_NAME=x\nPKG_VERSION=1\nPKG_PATCH_STRIP=0\n",
        );
        let recipe = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap();
        assert_eq!(recipe.patch_strip, 0);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let dir = tempdir().unwrap();
        write_recipe(dir.path(), "PKG_NAME=hello\nnot an assignment\n");
        let err = load_recipe(dir.path(), &LoaderDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedLine { .. }));
    }
}
