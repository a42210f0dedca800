//! Verdict models
//!
//! Case, unit and run outcomes accumulated by the engine.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::BuildUnit;
use crate::error::{EngineError, EngineResult};

/// Lifecycle of one case: `Pending -> Running -> {Ok | Retrying -> Running | Fail}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Running,
    Retrying,
    Ok,
    Fail,
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Ok | CaseStatus::Fail)
    }

    /// State after an attempt finished.
    ///
    /// Terminal states never change.
    pub fn after_attempt(self, success: bool, attempts_left: bool) -> Self {
        match self {
            CaseStatus::Ok | CaseStatus::Fail => self,
            _ if success => CaseStatus::Ok,
            _ if attempts_left => CaseStatus::Retrying,
            _ => CaseStatus::Fail,
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Pending => write!(f, "PENDING"),
            CaseStatus::Running => write!(f, "RUNNING"),
            CaseStatus::Retrying => write!(f, "RETRY"),
            CaseStatus::Ok => write!(f, "ok"),
            CaseStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// One execution of a case
#[derive(Clone, Debug, Serialize)]
pub struct RunAttempt {
    /// 1-based attempt number
    pub index: u32,
    pub success: bool,
    /// `exit status N`, `signal: N` or the spawn error
    pub status: String,
    /// Combined output of the attempt
    pub output: String,
    pub duration: Duration,
}

/// Final outcome of one case
#[derive(Clone, Debug, Serialize)]
pub struct CaseVerdict {
    pub name: String,
    pub status: CaseStatus,
    pub attempts: Vec<RunAttempt>,
}

impl CaseVerdict {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Pending,
            attempts: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CaseStatus::Ok
    }

    pub fn attempts_used(&self) -> usize {
        self.attempts.len()
    }

    pub fn last_attempt(&self) -> Option<&RunAttempt> {
        self.attempts.last()
    }
}

/// Outcome of one build unit
#[derive(Clone, Debug, Serialize)]
pub struct UnitVerdict {
    pub unit: BuildUnit,
    pub elapsed: Duration,
    pub cases: Vec<CaseVerdict>,
    /// Set when the unit failed to compile under continue-on-error
    pub compile_error: Option<String>,
}

impl UnitVerdict {
    pub fn new(unit: BuildUnit) -> Self {
        Self {
            unit,
            elapsed: Duration::ZERO,
            cases: Vec::new(),
            compile_error: None,
        }
    }

    pub fn compile_failed(unit: BuildUnit, status: impl Into<String>) -> Self {
        Self {
            compile_error: Some(status.into()),
            ..Self::new(unit)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.compile_error.is_none() && self.cases.iter().all(CaseVerdict::is_ok)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseVerdict> {
        self.cases.iter().filter(|c| !c.is_ok())
    }
}

/// Outcome of the whole run
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunVerdict {
    pub units: Vec<UnitVerdict>,
    pub elapsed: Duration,
}

impl RunVerdict {
    pub fn push(&mut self, unit: UnitVerdict) {
        self.units.push(unit);
    }

    pub fn is_ok(&self) -> bool {
        self.units.iter().all(UnitVerdict::is_ok)
    }

    pub fn total_cases(&self) -> usize {
        self.units.iter().map(|u| u.cases.len()).sum()
    }

    pub fn failed_cases(&self) -> usize {
        self.units.iter().map(|u| u.failed_cases().count()).sum()
    }

    /// The generic run-level error when anything failed
    pub fn ensure_ok(&self) -> EngineResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(EngineError::RunFailed)
        }
    }
}
