use std::path::PathBuf;

/// Defaults sourced from the environment once at process start (§9: environment
/// overrides apply to the default-providing configuration, never to a loaded
/// recipe mid-evaluation).
#[derive(Debug, Clone)]
pub struct LoaderDefaults {
    pub make_opts: String,
    pub patch_strip: u32,
}

impl LoaderDefaults {
    /// Builds defaults from the process environment, falling back to the
    /// documented defaults (detected CPU count for `make_opts`, strip level 1).
    pub fn from_env() -> Self {
        let jobs = std::env::var("JOBS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(default_cpu_count);

        let patch_strip = std::env::var("PKG_PATCH_STRIP")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        LoaderDefaults {
            make_opts: format!("-j{jobs}"),
            patch_strip,
        }
    }
}

impl Default for LoaderDefaults {
    fn default() -> Self {
        LoaderDefaults {
            make_opts: format!("-j{}", default_cpu_count()),
            patch_strip: 1,
        }
    }
}

fn default_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// The evaluated contents of one recipe directory, identified by `(name, version)`.
///
/// Immutable once constructed: the loader never mutates a `Recipe` after
/// returning it, and never shares state across loads of different recipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub release: String,
    pub source_urls: Vec<String>,
    pub git_url: Option<String>,
    pub depends: Vec<String>,
    pub description: String,
    pub license: String,
    pub meson_opts: String,
    pub cmake_opts: String,
    pub configure_opts: String,
    pub make_opts: String,
    pub build_subdir: Option<String>,
    pub patch_strip: u32,
    pub destdir: Option<PathBuf>,
    pub build_fn: Option<String>,
    /// The directory the recipe was loaded from.
    pub recipe_dir: PathBuf,
    /// Every recognized `PKG_*` key and its final (substituted) value, exposed
    /// verbatim to hook invocations as environment variables.
    pub variables: Vec<(String, String)>,
}

impl Recipe {
    pub fn node_id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn archive_stem(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn archive_name(&self) -> String {
        format!("{}-{}-{}.tar.zst", self.name, self.version, self.release)
    }
}
