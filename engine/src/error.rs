use std::path::PathBuf;

use thiserror::Error;

/// Engine-wide error type, covering kinds 1-6 and 8 from the error handling
/// design (kind 7, dependency issues, are logged as warnings by
/// `anvil-depgraph` and never constructed here).
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required external tool {0:?} is not installed")]
    ToolUnavailable(String),

    #[error("fetch of {url} failed after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("unpack/patch error for {0}: {1}")]
    Unpack(String, String),

    #[error("build step {step:?} exited with status {status} for {package}")]
    Build {
        package: String,
        step: String,
        status: i32,
    },

    #[error("filesystem/install error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recipe error: {0}")]
    Recipe(#[from] anvil_recipe::Error),

    #[error("database error: {0}")]
    Db(#[from] anvil_db::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}
