//! Data models for test orchestration
//!
//! This module contains all data structures used throughout the application.

mod unit;
mod verdict;

pub use unit::{BuildUnit, CompiledUnit};
pub use verdict::{CaseStatus, CaseVerdict, RunAttempt, RunVerdict, UnitVerdict};
