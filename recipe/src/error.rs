use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("recipe at {0} is missing a non-empty PKG_NAME")]
    MissingName(PathBuf),

    #[error("recipe at {0} is missing a non-empty PKG_VERSION")]
    MissingVersion(PathBuf),

    #[error("malformed assignment on line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },

    #[error("target {0:?} did not resolve to any recipe under the repository")]
    TargetNotFound(String),

    #[error("target {0:?} is ambiguous; matched {1} recipe directories")]
    AmbiguousTarget(String, usize),

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;
