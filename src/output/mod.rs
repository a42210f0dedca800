//! Output for test runs
//!
//! Progress lines, listings and toolchain diagnostics.

mod reporter;

pub use reporter::Reporter;

#[cfg(test)]
pub use reporter::{capture, SharedBuffer};
