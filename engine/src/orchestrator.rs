//! High-level Orchestrator (C4.9): composes the rest of the engine into the
//! CLI-facing operations `install`, `install-deps`, `world`, `upgrade`,
//! `orphans`, `revdep`.

use std::collections::HashSet;
use std::path::Path;

use anvil_db::{version as db_version, Database};
use anvil_depgraph::{self as depgraph, DepNode};
use anvil_recipe::{self as recipe, LoaderDefaults, Recipe};

use crate::build;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::hooks;
use crate::install;
use crate::package;
use crate::revdep::{self, BrokenBinary};
use crate::tools::ToolCache;
use crate::unpack;

pub struct Orchestrator {
    config: Config,
    tools: ToolCache,
    db: Database,
    loader_defaults: LoaderDefaults,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let db = Database::new(config.dbdir.clone());
        let loader_defaults = LoaderDefaults::from_env();
        Orchestrator {
            config,
            tools: ToolCache::new(),
            db,
            loader_defaults,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn load(&self, recipe_dir: &Path) -> Result<Recipe> {
        Ok(recipe::load_recipe(recipe_dir, &self.loader_defaults)?)
    }

    fn all_recipes(&self) -> Result<Vec<Recipe>> {
        let dirs = recipe::find_recipe_dirs(&self.config.repo)?;
        dirs.iter().map(|d| self.load(d)).collect()
    }

    /// Runs the full single-package pipeline: fetch, unpack/patch, build,
    /// package, install. Brackets the build step with the `pre-build`/
    /// `post-build` hooks (§4.4 steps 1 and 5).
    pub async fn build_and_install(&self, recipe: &Recipe) -> Result<()> {
        let package = recipe.node_id();
        tracing::info!("building {package}");

        hooks::run_phase(&self.config, "pre-build", recipe);

        let fetcher = Fetcher::new(&self.config, &self.tools);
        let cached = fetcher.fetch(recipe).await?;

        let workspace = self.config.build_workspace(&recipe.name, &recipe.version);
        let source_root = unpack::prepare_workspace(&self.tools, recipe, &cached, &workspace)?;

        let destdir = build::destdir_for(&self.config, recipe);
        let log_path = self.config.log_path(&recipe.name, &recipe.version);
        build::run(&self.tools, &self.config, recipe, &source_root, &destdir, &log_path)?;

        hooks::run_phase(&self.config, "post-build", recipe);

        let archive = package::pack(&self.config, recipe, &destdir)?;

        let executor = install::select_executor(&self.config);
        install::install(
            executor.as_ref(),
            &self.db,
            &self.config,
            recipe,
            &archive,
            Path::new("/"),
        )?;

        tracing::info!("installed {package}");
        Ok(())
    }

    /// `install <targets>`: build then install each target, no dependency
    /// expansion.
    pub async fn install(&self, targets: &[String]) -> Result<()> {
        for target in targets {
            let dir = recipe::resolve_target(&self.config.repo, target)?;
            let recipe = self.load(&dir)?;
            self.build_and_install(&recipe).await?;
        }
        Ok(())
    }

    /// Resolves `target` and loads its recipe; used by the single-stage CLI
    /// subcommands (`info`, `fetch`, `unpack`, `build`, `package`).
    pub fn load_target(&self, target: &str) -> Result<Recipe> {
        let dir = recipe::resolve_target(&self.config.repo, target)?;
        self.load(&dir)
    }

    /// `fetch <targets>`: C2 only.
    pub async fn fetch(&self, target: &str) -> Result<Vec<std::path::PathBuf>> {
        let recipe = self.load_target(target)?;
        let fetcher = Fetcher::new(&self.config, &self.tools);
        fetcher.fetch(&recipe).await
    }

    /// `unpack <targets>`: C2 then C3, returns the effective source root.
    pub async fn unpack(&self, target: &str) -> Result<std::path::PathBuf> {
        let recipe = self.load_target(target)?;
        let cached = self.fetch(target).await?;
        let workspace = self.config.build_workspace(&recipe.name, &recipe.version);
        unpack::prepare_workspace(&self.tools, &recipe, &cached, &workspace)
    }

    /// `build <targets>`: C2-C4 without packaging or installing, returns the
    /// staging directory.
    pub async fn build(&self, target: &str) -> Result<std::path::PathBuf> {
        let recipe = self.load_target(target)?;
        let source_root = self.unpack(target).await?;

        hooks::run_phase(&self.config, "pre-build", &recipe);
        let destdir = build::destdir_for(&self.config, &recipe);
        let log_path = self.config.log_path(&recipe.name, &recipe.version);
        build::run(&self.tools, &self.config, &recipe, &source_root, &destdir, &log_path)?;
        hooks::run_phase(&self.config, "post-build", &recipe);

        Ok(destdir)
    }

    /// `package <targets>`: C2-C5, returns the archive path without
    /// installing.
    pub async fn package(&self, target: &str) -> Result<std::path::PathBuf> {
        let recipe = self.load_target(target)?;
        let destdir = self.build(target).await?;
        package::pack(&self.config, &recipe, &destdir)
    }

    /// `sync`: fast-forward pulls the repository checkout.
    pub fn sync(&self) -> Result<()> {
        let git = self.tools.resolve("git")?;
        let status = std::process::Command::new(&git)
            .args(["pull", "--ff-only"])
            .current_dir(&self.config.repo)
            .status()
            .map_err(|e| crate::error::io_err(self.config.repo.clone(), e))?;
        if !status.success() {
            return Err(crate::error::Error::Configuration(format!(
                "git pull in {} exited with {status}",
                self.config.repo.display()
            )));
        }
        Ok(())
    }

    /// `search <pattern>`: every recipe whose name or description matches.
    pub fn search(&self, pattern: &regex::Regex) -> Result<Vec<Recipe>> {
        Ok(self
            .all_recipes()?
            .into_iter()
            .filter(|r| pattern.is_match(&r.name) || pattern.is_match(&r.description))
            .collect())
    }

    fn recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        match recipe::find_by_name(&self.config.repo, name)? {
            Some(dir) => Ok(Some(self.load(&dir)?)),
            None => Ok(None),
        }
    }

    /// Expands `targets` into the full transitive dependency closure
    /// available under the repository, then orders and builds via C7.
    async fn install_closure(&self, targets: &[String]) -> Result<()> {
        let mut by_name: Vec<Recipe> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = Vec::new();

        for target in targets {
            let dir = recipe::resolve_target(&self.config.repo, target)?;
            let recipe = self.load(&dir)?;
            if seen.insert(recipe.name.clone()) {
                queue.push(recipe.name.clone());
                by_name.push(recipe);
            }
        }

        let mut i = 0;
        while i < queue.len() {
            let name = queue[i].clone();
            i += 1;
            let current = by_name.iter().find(|r| r.name == name).cloned();
            let Some(current) = current else { continue };
            for dep in &current.depends {
                if seen.contains(dep) {
                    continue;
                }
                if let Some(dep_recipe) = self.recipe_by_name(dep)? {
                    seen.insert(dep_recipe.name.clone());
                    queue.push(dep_recipe.name.clone());
                    by_name.push(dep_recipe);
                } else {
                    tracing::warn!("dependency {dep:?} has no matching recipe under the repository");
                }
            }
        }

        let nodes: Vec<DepNode> = by_name
            .iter()
            .map(|r| DepNode {
                name: r.name.clone(),
                version: r.version.clone(),
                depends: r.depends.clone(),
            })
            .collect();
        let ordering = depgraph::order(&nodes);

        for node_id in &ordering.order {
            let Some(r) = by_name.iter().find(|r| &r.node_id() == node_id) else {
                continue;
            };
            if self.db.is_installed(&r.name, &r.version) && !self.config.force {
                tracing::info!("{} already installed, skipping", r.node_id());
                continue;
            }
            self.build_and_install(r).await?;
        }

        Ok(())
    }

    /// `install-deps <targets>`.
    pub async fn install_deps(&self, targets: &[String]) -> Result<()> {
        self.install_closure(targets).await
    }

    /// `world`: build/install every recipe under the repository in
    /// dependency order.
    pub async fn world(&self) -> Result<()> {
        let recipes = self.all_recipes()?;
        let names: Vec<String> = recipes.iter().map(|r| r.name.clone()).collect();
        self.install_closure(&names).await
    }

    /// `upgrade`: for each installed package, builds the highest available
    /// version if it differs from the installed one (or always, under
    /// `FORCE`).
    pub async fn upgrade(&self) -> Result<()> {
        let recipes = self.all_recipes()?;

        for (name, installed_version) in self.db.list_installed()? {
            let versions: Vec<String> = recipes
                .iter()
                .filter(|r| r.name == name)
                .map(|r| r.version.clone())
                .collect();
            let Some(highest) = db_version::max_version(&versions) else {
                continue;
            };

            if highest != &installed_version || self.config.force {
                tracing::info!("upgrading {name}: {installed_version} -> {highest}");
                self.install_closure(&[name.clone()]).await?;
            }
        }

        Ok(())
    }

    /// `orphans`: installed packages whose name is not in any recipe's
    /// `depends`.
    pub fn orphans(&self) -> Result<Vec<String>> {
        let recipes = self.all_recipes()?;
        let depended_on: HashSet<&str> = recipes
            .iter()
            .flat_map(|r| r.depends.iter().map(|d| d.as_str()))
            .collect();

        let orphans = self
            .db
            .list_installed()?
            .into_iter()
            .filter(|(name, _)| !depended_on.contains(name.as_str()))
            .map(|(name, version)| format!("{name}@{version}"))
            .collect();
        Ok(orphans)
    }

    /// `revdep`: scans for binaries with unresolved `DT_NEEDED` entries.
    pub fn revdep(&self) -> Vec<BrokenBinary> {
        revdep::scan()
    }

    /// `remove <name> <version>`.
    pub fn remove(&self, name: &str, version: &str) -> Result<()> {
        let executor = install::select_executor(&self.config);
        install::uninstall(executor.as_ref(), &self.db, name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_recipe(repo: &Path, category: &str, pkg: &str, version: &str, depends: &str) {
        let dir = repo.join(category).join(pkg).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("recipe"),
            format!("PKG_NAME={pkg}\nPKG_VERSION={version}\nPKG_DEPENDS={depends}\n"),
        )
        .unwrap();
    }

    #[test]
    fn orphans_excludes_packages_still_depended_on() {
        let root = tempdir().unwrap();
        let repo = root.path().join("repo");
        write_recipe(&repo, "base", "util", "1", "");
        write_recipe(&repo, "base", "app", "1", "util");

        let config = Config {
            repo,
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
        let orch = Orchestrator::new(config);
        orch.db.manifest_writer("util", "1").unwrap();
        orch.db.mark_installed("util", "1").unwrap();

        // `app`'s recipe was later removed from the repository tree.
        std::fs::remove_dir_all(orch.config.repo.join("base/app")).unwrap();
        orch.db.manifest_writer("app", "1").unwrap();
        orch.db.mark_installed("app", "1").unwrap();

        let orphans = orch.orphans().unwrap();
        assert_eq!(orphans, vec!["app@1".to_string()]);
    }
}
