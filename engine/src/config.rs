//! Environment-controlled configuration (§6), read once at process start.

use std::path::PathBuf;

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("1") | Ok("true"))
}

/// Every path and knob the engine honors from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub repo: PathBuf,
    pub builddir: PathBuf,
    pub srcdir: PathBuf,
    pub pkgdir: PathBuf,
    pub dbdir: PathBuf,
    pub logdir: PathBuf,
    pub hooksd: PathBuf,
    pub jobs: u32,
    pub sudo: String,
    pub fakeroot: bool,
    pub fetch_retries: u32,
    pub force: bool,
}

impl Config {
    /// Builds configuration from the process environment, falling back to
    /// the documented defaults relative to the current directory.
    pub fn from_env() -> Self {
        let jobs = env_u32(
            "JOBS",
            std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1),
        );

        Config {
            repo: env_path("REPO", "repo"),
            builddir: env_path("BUILDDIR", "build"),
            srcdir: env_path("SRCDIR", "sources"),
            pkgdir: env_path("PKGDIR", "packages"),
            dbdir: env_path("DBDIR", "db"),
            logdir: env_path("LOGDIR", "logs"),
            hooksd: env_path("HOOKSD", "hooks.d"),
            jobs,
            sudo: env_string("SUDO", "sudo"),
            fakeroot: env_bool("FAKEROOT"),
            fetch_retries: env_u32("FETCH_RETRIES", 3),
            force: env_bool("FORCE"),
        }
    }

    pub fn make_opts(&self) -> String {
        format!("-j{}", self.jobs)
    }

    pub fn source_cache_dir(&self, name: &str, version: &str) -> PathBuf {
        self.srcdir.join(format!("{name}-{version}"))
    }

    pub fn build_workspace(&self, name: &str, version: &str) -> PathBuf {
        self.builddir.join(format!("{name}-{version}"))
    }

    pub fn install_root(&self) -> PathBuf {
        self.builddir.join("install-root")
    }

    pub fn package_path(&self, name: &str, version: &str, release: &str) -> PathBuf {
        self.pkgdir.join(format!("{name}-{version}-{release}.tar.zst"))
    }

    pub fn log_path(&self, name: &str, version: &str) -> PathBuf {
        self.logdir.join(format!("{name}-{version}.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_opts_reflects_jobs() {
        let mut config = Config::from_env();
        config.jobs = 4;
        assert_eq!(config.make_opts(), "-j4");
    }

    #[test]
    fn derived_paths_are_namespaced_by_name_and_version() {
        let config = Config::from_env();
        assert_eq!(
            config.source_cache_dir("hello", "1.0"),
            config.srcdir.join("hello-1.0")
        );
        assert_eq!(
            config.package_path("hello", "1.0", "1"),
            config.pkgdir.join("hello-1.0-1.tar.zst")
        );
    }
}
