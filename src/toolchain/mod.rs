//! External toolchain access
//!
//! Subprocess plumbing, the `go` command driver and the parsers for its
//! line-oriented output.

mod go;
mod parse;
mod process;

#[cfg(test)]
pub mod fake;

pub use go::GoToolchain;
pub use parse::ParseError;
pub use process::{Invocation, ProcessOutput, ProcessRunner, SystemProcess};
