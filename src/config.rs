//! Store configuration.

use std::path::{Path, PathBuf};

/// Environment variable overriding the working directory.
pub const WORK_DIR_ENV: &str = "CORPUSSTORE_WORK_DIR";

const DEFAULT_WORK_DIR: &str = "work";

/// Where annotation files are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Root of the annotation tree.
    pub work_dir: PathBuf,
}

impl StoreConfig {
    /// Defaults, with the working directory taken from
    /// `CORPUSSTORE_WORK_DIR` when it is set and non-empty.
    pub fn from_env() -> Self {
        match std::env::var_os(WORK_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::default().with_work_dir(dir),
            _ => Self::default(),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl AsRef<Path>) -> Self {
        self.work_dir = work_dir.as_ref().to_path_buf();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
        }
    }
}
