//! anvil - source-based package manager front door.
//!
//! A thin `clap` binary: argument parsing and dispatch into `anvil-engine`'s
//! orchestrator, with no pipeline logic of its own.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use anvil_engine::{Config, Orchestrator};

#[derive(Parser)]
#[command(name = "anvil")]
#[command(about = "Source-based package manager in the Linux From Scratch tradition")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fast-forward pull the repository checkout
    Sync,
    /// Search recipe names and descriptions by regex
    Search { pattern: String },
    /// Print recipe metadata
    Info { targets: Vec<String> },
    /// Fetch sources only (C2)
    Fetch { targets: Vec<String> },
    /// Fetch and unpack/patch sources only (C2-C3)
    Unpack { targets: Vec<String> },
    /// Fetch, unpack, and build without installing (C2-C4)
    Build { targets: Vec<String> },
    /// Full pipeline: fetch, build, package, install
    Install { targets: Vec<String> },
    /// Install targets plus their full dependency closure
    InstallDeps { targets: Vec<String> },
    /// Fetch, build, and package without installing (C2-C5)
    Package { targets: Vec<String> },
    /// Uninstall a package by manifest (name[@version])
    Remove { name: String },
    /// List installed packages nobody depends on
    Orphans,
    /// Scan for binaries with unresolved shared libraries
    Revdep,
    /// Build and install every recipe under the repository
    World,
    /// Upgrade every installed package to its highest available version
    Upgrade,
    /// Scaffold a new recipe directory
    MkToolchain { category_pkg: String, version: String },
}

fn init_logging() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Scaffolds `REPO/<category>/<pkg>/<version>/recipe` with a minimal
/// template. A thin wrapper with no essential design weight (§1 Non-goals).
fn mk_toolchain(config: &Config, category_pkg: &str, version: &str) -> std::io::Result<()> {
    let (category, pkg) = category_pkg
        .split_once('/')
        .unwrap_or(("base", category_pkg));
    let dir = config.repo.join(category).join(pkg).join(version);
    std::fs::create_dir_all(&dir)?;
    let recipe_path = dir.join("recipe");
    if recipe_path.exists() {
        return Ok(());
    }
    std::fs::write(
        &recipe_path,
        format!(
            "PKG_NAME={pkg}\nPKG_VERSION={version}\nPKG_RELEASE=1\nPKG_SOURCE_URLS=\nPKG_DEPENDS=\nPKG_DESC=\nPKG_LICENSE=\n"
        ),
    )
}

async fn run(cli: Cli, orchestrator: Orchestrator) -> anvil_engine::Result<()> {
    match cli.command {
        Commands::Sync => orchestrator.sync(),
        Commands::Search { pattern } => {
            let regex = regex::Regex::new(&pattern)
                .map_err(|e| anvil_engine::Error::Configuration(e.to_string()))?;
            for recipe in orchestrator.search(&regex)? {
                println!("{}@{} - {}", recipe.name, recipe.version, recipe.description);
            }
            Ok(())
        }
        Commands::Info { targets } => {
            for target in targets {
                let recipe = orchestrator.load_target(&target)?;
                println!("{}", recipe.name.bold());
                println!("  version:     {}", recipe.version);
                println!("  release:     {}", recipe.release);
                println!("  description: {}", recipe.description);
                println!("  license:     {}", recipe.license);
                println!("  depends:     {}", recipe.depends.join(", "));
            }
            Ok(())
        }
        Commands::Fetch { targets } => {
            for target in targets {
                let paths = orchestrator.fetch(&target).await?;
                for path in paths {
                    println!("{}", path.display());
                }
            }
            Ok(())
        }
        Commands::Unpack { targets } => {
            for target in targets {
                let root = orchestrator.unpack(&target).await?;
                println!("{}", root.display());
            }
            Ok(())
        }
        Commands::Build { targets } => {
            for target in targets {
                let destdir = orchestrator.build(&target).await?;
                println!("{}", destdir.display());
            }
            Ok(())
        }
        Commands::Install { targets } => orchestrator.install(&targets).await,
        Commands::InstallDeps { targets } => orchestrator.install_deps(&targets).await,
        Commands::Package { targets } => {
            for target in targets {
                let archive = orchestrator.package(&target).await?;
                println!("{}", archive.display());
            }
            Ok(())
        }
        Commands::Remove { name } => {
            let (pkg, version) = name
                .split_once('@')
                .map(|(n, v)| (n, Some(v)))
                .unwrap_or((name.as_str(), None));
            let version = match version {
                Some(v) => v.to_string(),
                None => {
                    let versions = orchestrator.load_target(pkg).ok().map(|r| r.version);
                    versions.unwrap_or_else(|| "1".to_string())
                }
            };
            orchestrator.remove(pkg, &version)
        }
        Commands::Orphans => {
            for orphan in orchestrator.orphans()? {
                println!("{orphan}");
            }
            Ok(())
        }
        Commands::Revdep => {
            let broken = orchestrator.revdep();
            if broken.is_empty() {
                println!("no broken binaries found");
            } else {
                for binary in &broken {
                    println!(
                        "{}: missing {}",
                        binary.path.display(),
                        binary.missing.join(", ")
                    );
                }
                println!("triggering a world rebuild");
                orchestrator.world().await?;
            }
            Ok(())
        }
        Commands::World => orchestrator.world().await,
        Commands::Upgrade => orchestrator.upgrade().await,
        Commands::MkToolchain { category_pkg, version } => {
            mk_toolchain(orchestrator.config(), &category_pkg, &version)
                .map_err(|e| anvil_engine::Error::Io {
                    path: orchestrator.config().repo.clone(),
                    source: e,
                })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env();
    let orchestrator = Orchestrator::new(config);

    match run(cli, orchestrator).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}: {e}", "error".bright_red());
            ExitCode::FAILURE
        }
    }
}
