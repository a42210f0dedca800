//! Test execution engine
//!
//! Provides sequential, retrying test execution under a global timeout.

mod engine;
mod runner;
mod watchdog;

pub use engine::TestEngine;
pub use runner::CaseRunner;
pub use watchdog::Watchdog;
