//! Build unit models
//!
//! A build unit is one Go package with tests, identified by import path and
//! directory.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A package that has a test variant
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BuildUnit {
    pub import_path: String,
    pub dir: PathBuf,
}

impl BuildUnit {
    pub fn new(import_path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            import_path: import_path.into(),
            dir: dir.into(),
        }
    }

    /// File name of the unit's test executable; unique per import path.
    pub fn executable_name(&self) -> String {
        self.import_path.replace('/', "~")
    }

    /// `<import path>.<case>`, the identity used in progress lines
    pub fn case_id(&self, case: &str) -> String {
        format!("{}.{}", self.import_path, case)
    }
}

impl fmt::Display for BuildUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.import_path)
    }
}

/// A unit whose tests have been compiled into the run's scratch directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledUnit {
    pub unit: BuildUnit,
    pub executable: PathBuf,
}

impl CompiledUnit {
    pub fn new(unit: BuildUnit, executable: impl Into<PathBuf>) -> Self {
        Self {
            unit,
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}
