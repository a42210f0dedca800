//! Progress reporting
//!
//! The run's progress feed: command echoes and one tab-separated line per
//! case and unit outcome, written synchronously as execution proceeds.
//! Toolchain diagnostics go to the error stream.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use crate::models::BuildUnit;
use crate::toolchain::Invocation;
use crate::utils::format_duration;

/// Writes progress lines to stdout and diagnostics to stderr
pub struct Reporter {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    verbose: bool,
    echo_commands: bool,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>, verbose: bool) -> Self {
        Self {
            out,
            err,
            verbose,
            echo_commands: true,
        }
    }

    pub fn stdio(verbose: bool) -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()), verbose)
    }

    /// Whether invocations are echoed before they run
    pub fn echo_commands(mut self, echo: bool) -> Self {
        self.echo_commands = echo;
        self
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = writeln!(self.out, "{args}");
        let _ = self.out.flush();
    }

    pub fn command(&mut self, invocation: &Invocation) {
        if self.echo_commands {
            self.line(format_args!("{invocation}"));
        }
    }

    /// Raw toolchain output, verbatim
    pub fn diagnostic(&mut self, text: &str) {
        let _ = writeln!(self.err, "{}", text.trim_end());
        let _ = self.err.flush();
    }

    pub fn case_ok(&mut self, unit: &BuildUnit, case: &str) {
        self.line(format_args!("ok\t{}", unit.case_id(case)));
    }

    pub fn case_retry(&mut self, unit: &BuildUnit, case: &str, status: &str) {
        if self.verbose {
            self.line(format_args!("RETRY\t{}\t[test error: {status}]", unit.case_id(case)));
        }
    }

    pub fn case_fail(&mut self, unit: &BuildUnit, case: &str, status: &str) {
        self.line(format_args!("FAIL\t{}\t[test error: {status}]", unit.case_id(case)));
    }

    /// Captured output of a failed attempt, shown in verbose mode
    pub fn attempt_output(&mut self, output: &str) {
        if self.verbose {
            self.line(format_args!("{output}"));
        }
    }

    pub fn unit_ok(&mut self, unit: &BuildUnit, elapsed: Duration) {
        self.line(format_args!("ok\t{unit}\t{}", format_duration(elapsed)));
    }

    pub fn compile_failed(&mut self, unit: &BuildUnit, status: &str) {
        self.line(format_args!("FAIL\t{unit}\t[compile error: {status}]"));
    }

    pub fn total(&mut self, elapsed: Duration) {
        self.line(format_args!("total: {}", format_duration(elapsed)));
    }

    pub fn timed_out(&mut self, elapsed: Duration) {
        self.line(format_args!("FAIL: timed out after {}", format_duration(elapsed)));
    }

    /// A unit and its selected cases, for `list`
    pub fn listing(&mut self, unit: &BuildUnit, cases: &[String]) {
        self.line(format_args!("{unit}"));
        for case in cases {
            self.line(format_args!("  {case}"));
        }
    }
}

/// In-memory sink for capturing reporter output in tests
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reporter writing into two buffers, returned alongside it
#[cfg(test)]
pub fn capture(verbose: bool) -> (Reporter, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    let reporter = Reporter::new(Box::new(out.clone()), Box::new(err.clone()), verbose);
    (reporter, out, err)
}
