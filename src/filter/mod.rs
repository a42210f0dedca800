//! Case selection
//!
//! Applies the `-skip` and `-run` pattern sets to a unit's case names.
//! Exclusion runs first, so a case matching both sets is dropped.

use regex::Regex;
use tracing::debug;

use crate::config::FilterConfig;
use crate::error::{EngineError, EngineResult};

/// Compiled include/exclude patterns
#[derive(Clone, Debug, Default)]
pub struct CaseFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl CaseFilter {
    /// Compile every pattern up front; the first invalid one is an error.
    pub fn new(config: &FilterConfig) -> EngineResult<Self> {
        let compile = |patterns: &[String]| -> EngineResult<Vec<Regex>> {
            patterns
                .iter()
                .map(|pattern| compile_pattern(pattern, config.case_insensitive))
                .collect()
        };

        if !config.exclude.is_empty() {
            debug!("skip {:?}", config.exclude);
        }
        if !config.include.is_empty() {
            debug!("run {:?}", config.include);
        }

        Ok(Self {
            exclude: compile(&config.exclude)?,
            include: compile(&config.include)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, case: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(case)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(case))
    }

    /// Selected cases, in their original order
    pub fn select(&self, cases: Vec<String>) -> Vec<String> {
        if self.is_empty() {
            return cases;
        }
        cases.into_iter().filter(|case| self.matches(case)).collect()
    }
}

fn compile_pattern(pattern: &str, case_insensitive: bool) -> EngineResult<Regex> {
    let source = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&source).map_err(|source| EngineError::Filter {
        pattern: pattern.to_string(),
        source,
    })
}
