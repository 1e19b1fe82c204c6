//! Fetch, unpack, build, package, install, and orchestration engine for the
//! Anvil package manager (C2-C6, C9, C10).

pub mod build;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hooks;
pub mod install;
pub mod orchestrator;
pub mod package;
pub mod process;
pub mod revdep;
pub mod tools;
pub mod unpack;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
