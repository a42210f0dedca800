//! Case execution runner
//!
//! Runs one case of a compiled unit with the configured retry budget.

use crate::config::RunConfig;
use crate::models::{CaseStatus, CaseVerdict, CompiledUnit, RunAttempt};
use crate::output::Reporter;
use crate::toolchain::{Invocation, ProcessRunner};
use crate::utils::{go_flag_duration, Timer};

/// Runs single cases of a compiled test executable
pub struct CaseRunner<'a> {
    process: &'a dyn ProcessRunner,
    config: &'a RunConfig,
}

impl<'a> CaseRunner<'a> {
    pub fn new(process: &'a dyn ProcessRunner, config: &'a RunConfig) -> Self {
        Self { process, config }
    }

    /// Command line selecting exactly `case` in the unit's executable
    pub fn invocation(&self, compiled: &CompiledUnit, case: &str) -> Invocation {
        let options = &self.config.test;
        let mut invocation =
            Invocation::new(compiled.executable()).arg(format!("-test.count={}", options.count));
        if let Some(timeout) = self.config.effective_test_timeout() {
            invocation = invocation.arg(format!("-test.timeout={}", go_flag_duration(timeout)));
        }
        if options.verbose {
            invocation = invocation.arg("-test.v");
        }
        invocation
            .arg("-test.run")
            .arg(format!("^{}$", regex::escape(case)))
            .current_dir(&compiled.unit.dir)
    }

    /// Run `case` until it passes or the retry budget is spent.
    pub async fn run_case(
        &self,
        compiled: &CompiledUnit,
        case: &str,
        reporter: &mut Reporter,
    ) -> CaseVerdict {
        let unit = &compiled.unit;
        let invocation = self.invocation(compiled, case);
        let max_attempts = self.config.max_attempts();
        let mut verdict = CaseVerdict::new(case);

        for index in 1..=max_attempts {
            verdict.status = CaseStatus::Running;
            reporter.command(&invocation);

            let timer = Timer::start(unit.case_id(case));
            let (success, status, output) = match self.process.run(&invocation).await {
                Ok(output) => (output.success, output.status.clone(), output.combined()),
                Err(e) => (false, e.to_string(), String::new()),
            };
            let duration = timer.stop();

            verdict.status = verdict.status.after_attempt(success, index < max_attempts);
            match verdict.status {
                CaseStatus::Ok => reporter.case_ok(unit, case),
                CaseStatus::Retrying => {
                    reporter.case_retry(unit, case, &status);
                    reporter.attempt_output(&output);
                }
                CaseStatus::Fail => {
                    reporter.case_fail(unit, case, &status);
                    reporter.attempt_output(&output);
                }
                CaseStatus::Pending | CaseStatus::Running => {}
            }

            verdict.attempts.push(RunAttempt {
                index,
                success,
                status,
                output,
                duration,
            });
            if verdict.status.is_terminal() {
                break;
            }
        }

        verdict
    }
}
