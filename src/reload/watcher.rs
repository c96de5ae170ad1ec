//! Change detection for a glob of fragment files.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::ReloadError;

/// Polls a glob pattern and reports when the matched set or any file's
/// modification time changed since the previous scan.
#[derive(Debug)]
pub struct GlobWatcher {
    pattern: String,
    files: BTreeMap<PathBuf, SystemTime>,
    scanned: bool,
}

impl GlobWatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            files: BTreeMap::new(),
            scanned: false,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the sorted matches when something changed, `None` otherwise.
    ///
    /// The first scan always reports, even when nothing matches.
    pub fn scan(&mut self) -> Result<Option<Vec<PathBuf>>, ReloadError> {
        let entries = glob::glob(&self.pattern).map_err(|source| ReloadError::Glob {
            pattern: self.pattern.clone(),
            source,
        })?;

        let mut current = BTreeMap::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(error = %err, "cannot read glob match");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => {
                    current.insert(path, modified);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "cannot stat config fragment"),
            }
        }

        let changed = !self.scanned || current != self.files;
        self.scanned = true;

        if !changed {
            return Ok(None);
        }

        debug!(pattern = %self.pattern, files = current.len(), "config fragments changed");
        let paths = current.keys().cloned().collect();
        self.files = current;
        Ok(Some(paths))
    }
}
