//! Configuration module
//!
//! The immutable run configuration built once by the CLI layer and passed by
//! reference into every engine component.

use serde::Serialize;
use std::time::Duration;

/// Case selection patterns
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterConfig {
    /// Keep cases matching any of these (`-run`)
    pub include: Vec<String>,

    /// Drop cases matching any of these (`-skip`)
    pub exclude: Vec<String>,

    /// Match all patterns case-insensitively (`-i`)
    pub case_insensitive: bool,
}

impl FilterConfig {
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

/// Knobs forwarded to the toolchain and the compiled test executable
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestBinaryOptions {
    /// `-test.timeout` for every case run
    pub timeout: Option<Duration>,

    /// `-test.count`
    pub count: u32,

    /// `-test.v`, also makes the build verbose
    pub verbose: bool,

    /// Build with the race detector
    pub race: bool,
}

impl Default for TestBinaryOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            count: 1,
            verbose: false,
            race: false,
        }
    }
}

/// Run configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    /// Print retries and captured output of failed attempts
    pub verbose: bool,

    /// Case selection
    pub filter: FilterConfig,

    /// Extra attempts after a failed one
    pub retry: u32,

    /// Wall-clock budget of the whole run
    pub timeout: Option<Duration>,

    /// Keep going after a unit fails to compile
    pub continue_on_error: bool,

    /// Toolchain passthrough
    pub test: TestBinaryOptions,
}

impl RunConfig {
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Total number of attempts a case gets
    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }

    /// Timeout handed to each case run: the smaller of the global and
    /// per-test timeouts when both are set, otherwise whichever is set.
    pub fn effective_test_timeout(&self) -> Option<Duration> {
        let global = self.timeout.filter(|d| !d.is_zero());
        let per_test = self.test.timeout.filter(|d| !d.is_zero());
        match (global, per_test) {
            (Some(global), Some(per_test)) => Some(global.min(per_test)),
            (global, per_test) => global.or(per_test),
        }
    }

    /// JSON rendering for the debug log
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
