//! External tool discovery (§4.2 expansion): locate binaries with `which` at
//! first use, caching the resolved path so later steps don't re-probe `PATH`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Default)]
pub struct ToolCache {
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl ToolCache {
    pub fn new() -> Self {
        ToolCache::default()
    }

    /// Resolves `name` via `which`, caching the result. A missing tool is a
    /// `ToolUnavailable` error, never a panic.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut cache = self.resolved.lock().unwrap();
        if let Some(path) = cache.get(name) {
            return Ok(path.clone());
        }

        let path = which::which(name).map_err(|_| Error::ToolUnavailable(name.to_string()))?;
        cache.insert(name.to_string(), path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_a_real_tool_succeeds_and_caches() {
        let cache = ToolCache::new();
        let first = cache.resolve("sh").unwrap();
        let second = cache.resolve("sh").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolving_a_nonexistent_tool_is_a_clean_error() {
        let cache = ToolCache::new();
        let err = cache.resolve("definitely-not-a-real-binary-xyz").unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable(_)));
    }
}
