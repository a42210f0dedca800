//! Engine errors
//!
//! Every failure the orchestration engine can report to its caller.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::toolchain::ParseError;
use crate::utils::format_duration;

/// Errors surfaced by discovery, filtering, compilation and execution
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("listing packages failed: {status}")]
    Discovery { status: String },

    #[error("listing tests in {} failed: {status}", .dir.display())]
    Enumeration { dir: PathBuf, status: String },

    #[error("unexpected toolchain output: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid pattern {pattern:?}: {source}")]
    Filter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("compiling {import_path} failed: {status}")]
    Compile { import_path: String, status: String },

    #[error("timed out after {}", format_duration(*.elapsed))]
    TimeoutAbort { elapsed: Duration },

    #[error("at least one failure occurred")]
    RunFailed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
