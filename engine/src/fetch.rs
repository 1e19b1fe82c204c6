//! Source Fetcher (C4.2): retrieves `source_urls` over HTTP and `git_url`
//! repositories into the source cache, idempotently.

use std::path::{Path, PathBuf};
use std::process::Command;

use anvil_recipe::Recipe;

use crate::config::Config;
use crate::error::{io_err, Error, Result};
use crate::tools::ToolCache;

pub struct Fetcher<'a> {
    config: &'a Config,
    tools: &'a ToolCache,
    client: reqwest::Client,
}

impl<'a> Fetcher<'a> {
    pub fn new(config: &'a Config, tools: &'a ToolCache) -> Self {
        Fetcher {
            config,
            tools,
            client: reqwest::Client::new(),
        }
    }

    /// Fetches every `source_urls` entry and, if set, `git_url`, into the
    /// recipe's source cache directory. Already-cached entries are never
    /// re-fetched (§4.2, §8 boundary: "performs no network I/O").
    pub async fn fetch(&self, recipe: &Recipe) -> Result<Vec<PathBuf>> {
        let cache_dir = self.config.source_cache_dir(&recipe.name, &recipe.version);
        std::fs::create_dir_all(&cache_dir).map_err(|e| io_err(cache_dir.clone(), e))?;

        let mut fetched = Vec::new();
        for url in &recipe.source_urls {
            fetched.push(self.fetch_http(url, &cache_dir).await?);
        }

        if let Some(git_url) = &recipe.git_url {
            fetched.push(self.fetch_git(git_url, &cache_dir)?);
        }

        Ok(fetched)
    }

    async fn fetch_http(&self, url: &str, cache_dir: &Path) -> Result<PathBuf> {
        let basename = url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("download");
        let dest = cache_dir.join(basename);

        if dest.is_file() {
            tracing::debug!("{url} already cached at {}", dest.display());
            return Ok(dest);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.config.fetch_retries {
            match self.download_once(url, &dest).await {
                Ok(()) => return Ok(dest),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!("fetch attempt {attempt}/{} for {url} failed: {last_error}", self.config.fetch_retries);
                }
            }
        }

        Err(Error::Fetch {
            url: url.to_string(),
            attempts: self.config.fetch_retries,
            reason: last_error,
        })
    }

    async fn download_once(&self, url: &str, dest: &Path) -> std::result::Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;

        let tmp = dest.with_extension("part");
        std::fs::write(&tmp, &bytes).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp, dest).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn fetch_git(&self, git_url: &str, cache_dir: &Path) -> Result<PathBuf> {
        let git = self.tools.resolve("git")?;
        let basename = git_url
            .rsplit('/')
            .next()
            .unwrap_or("repo")
            .trim_end_matches(".git");
        let clone_dir = cache_dir.join(basename);

        if clone_dir.is_dir() {
            tracing::debug!("pulling {} in {}", git_url, clone_dir.display());
            let status = Command::new(&git)
                .args(["pull", "--ff-only"])
                .current_dir(&clone_dir)
                .status()
                .map_err(|e| io_err(clone_dir.clone(), e))?;
            if !status.success() {
                return Err(Error::Fetch {
                    url: git_url.to_string(),
                    attempts: 1,
                    reason: format!("git pull exited with {status}"),
                });
            }
        } else {
            tracing::debug!("cloning {} into {}", git_url, clone_dir.display());
            let status = Command::new(&git)
                .args(["clone", git_url])
                .arg(&clone_dir)
                .status()
                .map_err(|e| io_err(cache_dir.to_path_buf(), e))?;
            if !status.success() {
                return Err(Error::Fetch {
                    url: git_url.to_string(),
                    attempts: 1,
                    reason: format!("git clone exited with {status}"),
                });
            }
        }

        Ok(clone_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> Config {
        Config {
            repo: root.join("repo"),
            builddir: root.join("build"),
            srcdir: root.join("sources"),
            pkgdir: root.join("packages"),
            dbdir: root.join("db"),
            logdir: root.join("logs"),
            hooksd: root.join("hooks.d"),
            jobs: 1,
            sudo: "sudo".to_string(),
            fakeroot: false,
            fetch_retries: 2,
            force: false,
        }
    }

    #[tokio::test]
    async fn already_cached_file_is_not_refetched() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        let tools = ToolCache::new();
        let fetcher = Fetcher::new(&config, &tools);

        let cache_dir = config.source_cache_dir("hello", "1.0");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("hello-1.0.tar.gz"), b"already here").unwrap();

        let recipe = Recipe {
            name: "hello".to_string(),
            version: "1.0".to_string(),
            release: "1".to_string(),
            source_urls: vec!["https://example.invalid/hello-1.0.tar.gz".to_string()],
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
            recipe_dir: root.path().join("repo/base/hello/1.0"),
            variables: vec![],
        };

        let fetched = fetcher.fetch(&recipe).await.unwrap();
        assert_eq!(fetched, vec![cache_dir.join("hello-1.0.tar.gz")]);
    }
}
