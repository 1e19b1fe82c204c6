//! Recipe parsing and repository layout for the Anvil package manager.
//!
//! A recipe is a `KEY=VALUE` file at `REPO/<category>/<pkg>/<version>/recipe`,
//! evaluated into an immutable [`Recipe`] record by [`load_recipe`].

pub mod error;
pub mod parser;
pub mod repo;
pub mod types;

pub use error::{Error, Result};
pub use parser::load_recipe;
pub use repo::{find_by_name, find_recipe_dirs, resolve_target};
pub use types::{LoaderDefaults, Recipe};
