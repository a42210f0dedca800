//! Test orchestration engine
//!
//! Discovery, case selection, compilation and retrying execution of every
//! selected case, one subprocess at a time, in discovery order.

use tracing::{debug, info};

use super::{CaseRunner, Watchdog};
use crate::config::RunConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::CaseFilter;
use crate::models::{BuildUnit, RunVerdict, UnitVerdict};
use crate::output::Reporter;
use crate::toolchain::GoToolchain;
use crate::utils::Timer;

/// Prefix of the run-scoped scratch directory
const SCRATCH_PREFIX: &str = "testman";

/// Drives `list` and `test` for one invocation of the tool
pub struct TestEngine<'a> {
    config: &'a RunConfig,
    toolchain: GoToolchain,
    reporter: Reporter,
}

impl<'a> TestEngine<'a> {
    pub fn new(config: &'a RunConfig, toolchain: GoToolchain, reporter: Reporter) -> Self {
        Self {
            config,
            toolchain,
            reporter,
        }
    }

    async fn selected_cases(
        &mut self,
        filter: &CaseFilter,
        unit: &BuildUnit,
    ) -> EngineResult<Vec<String>> {
        let cases = self.toolchain.list_cases(&unit.dir, &mut self.reporter).await?;
        let selected = filter.select(cases);
        debug!("{}: {} tests selected", unit, selected.len());
        Ok(selected)
    }

    /// Print every unit with at least one selected case, and its cases.
    pub async fn list(&mut self, patterns: &[String]) -> EngineResult<Vec<(BuildUnit, Vec<String>)>> {
        let filter = CaseFilter::new(&self.config.filter)?;
        let units = self.toolchain.list_units(patterns, &mut self.reporter).await?;

        let mut listing = Vec::new();
        for unit in units {
            let cases = self.selected_cases(&filter, &unit).await?;
            if cases.is_empty() {
                continue;
            }
            self.reporter.listing(&unit, &cases);
            listing.push((unit, cases));
        }

        Ok(listing)
    }

    /// Run every selected case under the global timeout.
    ///
    /// Case failures are part of the returned verdict; see
    /// [`RunVerdict::ensure_ok`] for the run-level error.
    pub async fn run(&mut self, patterns: &[String]) -> EngineResult<RunVerdict> {
        let watchdog = Watchdog::start(self.config.timeout);
        if let Some(budget) = watchdog.budget() {
            debug!("run budget {:?}", budget);
        }
        let result = watchdog.guard(self.run_units(patterns)).await;

        if let Err(EngineError::TimeoutAbort { elapsed }) = &result {
            self.reporter.timed_out(*elapsed);
        }
        result
    }

    async fn run_units(&mut self, patterns: &[String]) -> EngineResult<RunVerdict> {
        let timer = Timer::start("run");
        debug!("run config: {} patterns: {:?}", self.config.to_json(), patterns);

        let filter = CaseFilter::new(&self.config.filter)?;
        let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        debug!("scratch directory {}", scratch.path().display());

        let units = self.toolchain.list_units(patterns, &mut self.reporter).await?;
        let mut verdict = RunVerdict::default();

        for unit in units {
            // `go test -list` builds the tests first, so broken test code fails here
            let cases = match self.selected_cases(&filter, &unit).await {
                Ok(cases) => cases,
                Err(EngineError::Enumeration { status, .. }) if self.config.continue_on_error => {
                    self.reporter.compile_failed(&unit, &status);
                    verdict.push(UnitVerdict::compile_failed(unit, status));
                    continue;
                }
                Err(e) => return Err(e),
            };
            if cases.is_empty() {
                continue;
            }

            let unit_timer = Timer::start(unit.import_path.clone());
            let compiled = self
                .toolchain
                .compile(&unit, scratch.path(), &self.config.test, &mut self.reporter)
                .await;
            let compiled = match compiled {
                Ok(compiled) => compiled,
                Err(EngineError::Compile { import_path, status }) => {
                    self.reporter.compile_failed(&unit, &status);
                    if !self.config.continue_on_error {
                        return Err(EngineError::Compile { import_path, status });
                    }
                    verdict.push(UnitVerdict::compile_failed(unit, status));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let runner = CaseRunner::new(self.toolchain.process(), self.config);
            let mut unit_verdict = UnitVerdict::new(unit);
            for case in &cases {
                let case_verdict = runner.run_case(&compiled, case, &mut self.reporter).await;
                unit_verdict.cases.push(case_verdict);
            }
            unit_verdict.elapsed = unit_timer.stop();

            if unit_verdict.is_ok() {
                self.reporter.unit_ok(&unit_verdict.unit, unit_verdict.elapsed);
            }
            verdict.push(unit_verdict);
        }

        verdict.elapsed = timer.stop();
        self.reporter.total(verdict.elapsed);
        info!(
            "{} packages, {} tests, {} failed",
            verdict.units.len(),
            verdict.total_cases(),
            verdict.failed_cases()
        );
        debug!("run verdict: {}", serde_json::to_string(&verdict).unwrap_or_default());

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::models::CaseStatus;
    use crate::output::{capture, SharedBuffer};
    use crate::toolchain::fake::{case_run, go_compile, go_list, go_test_list, FakeProcess};
    use crate::toolchain::ProcessOutput;
    use std::sync::Arc;
    use std::time::Duration;

    const TESTPKG_CASES: &str = "TestStableAlwaysSucceed\nTestUnstableMaySucceed\nTestBrokenAlwaysFailing\nExampleAlwaysSucceed\nok  \texample.com/testpkg\t0.003s\n";

    fn failure() -> ProcessOutput {
        ProcessOutput::failure(1, "--- FAIL\nFAIL")
    }

    /// One unit holding a stable, a flaky (fails once) and a broken test
    fn testpkg() -> FakeProcess {
        FakeProcess::new()
            .on(
                go_list(),
                vec![ProcessOutput::success(
                    "example.com/testpkg /src/testpkg\nexample.com/testpkg.test /src/testpkg\n",
                )],
            )
            .on(go_test_list("/src/testpkg"), vec![ProcessOutput::success(TESTPKG_CASES)])
            .on(go_compile("/src/testpkg"), vec![ProcessOutput::success("")])
            .on(case_run("TestStableAlwaysSucceed"), vec![ProcessOutput::success("PASS")])
            .on(
                case_run("TestUnstableMaySucceed"),
                vec![failure(), ProcessOutput::success("PASS")],
            )
            .on(case_run("TestBrokenAlwaysFailing"), vec![failure()])
            .on(case_run("ExampleAlwaysSucceed"), vec![ProcessOutput::success("PASS")])
    }

    fn setup<'a>(
        config: &'a RunConfig,
        fake: &Arc<FakeProcess>,
    ) -> (TestEngine<'a>, SharedBuffer, SharedBuffer) {
        let (reporter, out, err) = capture(config.verbose);
        let engine = TestEngine::new(config, GoToolchain::new(fake.clone()), reporter);
        (engine, out, err)
    }

    fn patterns() -> Vec<String> {
        vec!["./...".to_string()]
    }

    fn count_prefix(out: &SharedBuffer, prefix: &str) -> usize {
        out.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }

    #[tokio::test]
    async fn test_unfiltered_run_reports_failures() {
        let config = RunConfig::default();
        let fake = Arc::new(testpkg());
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        let lines = out.lines();
        assert!(lines.contains(&"ok\texample.com/testpkg.TestStableAlwaysSucceed".to_string()));
        assert!(lines.contains(
            &"FAIL\texample.com/testpkg.TestBrokenAlwaysFailing\t[test error: exit status 1]"
                .to_string()
        ));
        // no retries: the flaky test fails on its only attempt
        assert!(lines.contains(
            &"FAIL\texample.com/testpkg.TestUnstableMaySucceed\t[test error: exit status 1]"
                .to_string()
        ));
        assert!(lines.contains(&"ok\texample.com/testpkg.ExampleAlwaysSucceed".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("ok\texample.com/testpkg\t")));
        assert!(lines.last().unwrap().starts_with("total: "));

        assert!(!verdict.is_ok());
        assert_eq!(verdict.failed_cases(), 2);
        assert!(matches!(verdict.ensure_ok(), Err(EngineError::RunFailed)));
    }

    #[tokio::test]
    async fn test_cases_run_in_listed_order_with_one_compile() {
        let config = RunConfig::default();
        let fake = Arc::new(testpkg());
        let (mut engine, _, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        let names: Vec<_> = verdict.units[0].cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "TestStableAlwaysSucceed",
                "TestUnstableMaySucceed",
                "TestBrokenAlwaysFailing",
                "ExampleAlwaysSucceed"
            ]
        );
        assert_eq!(fake.count(|inv| inv.has_arg("-c")), 1);
        let calls = fake.calls();
        assert!(calls[0].has_arg("list"));
        assert!(calls[1].has_arg("-list"));
        assert!(calls[2].has_arg("-c"));
    }

    #[tokio::test]
    async fn test_retry_rescues_flaky_case() {
        let config = RunConfig::default().with_retry(2);
        let fake = Arc::new(testpkg());
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        let unit = &verdict.units[0];
        let flaky = &unit.cases[1];
        assert_eq!(flaky.status, CaseStatus::Ok);
        assert_eq!(flaky.attempts_used(), 2);
        let broken = &unit.cases[2];
        assert_eq!(broken.status, CaseStatus::Fail);
        assert_eq!(broken.attempts_used(), 3);

        assert_eq!(count_prefix(&out, "RETRY\t"), 0);
        assert_eq!(count_prefix(&out, "FAIL\t"), 1);
        assert_eq!(fake.count(case_run("TestBrokenAlwaysFailing")), 3);
    }

    #[tokio::test]
    async fn test_verbose_retry_lines() {
        let config = RunConfig::default().with_retry(2).verbose();
        let fake = Arc::new(testpkg());
        let (mut engine, out, _) = setup(&config, &fake);

        engine.run(&patterns()).await.unwrap();

        let retries: Vec<_> = out
            .lines()
            .into_iter()
            .filter(|l| l.starts_with("RETRY\t"))
            .collect();
        assert_eq!(
            retries,
            vec![
                "RETRY\texample.com/testpkg.TestUnstableMaySucceed\t[test error: exit status 1]",
                "RETRY\texample.com/testpkg.TestBrokenAlwaysFailing\t[test error: exit status 1]",
                "RETRY\texample.com/testpkg.TestBrokenAlwaysFailing\t[test error: exit status 1]",
            ]
        );
    }

    #[tokio::test]
    async fn test_skip_broken_case() {
        let config = RunConfig::default()
            .with_retry(1)
            .with_filter(FilterConfig::default().exclude("BrokenAlwaysFailing"));
        let fake = Arc::new(testpkg());
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        assert_eq!(fake.count(case_run("TestBrokenAlwaysFailing")), 0);
        assert_eq!(count_prefix(&out, "FAIL\t"), 0);
        assert!(verdict.is_ok());
        assert!(out
            .lines()
            .iter()
            .any(|l| l.starts_with("ok\texample.com/testpkg\t")));
    }

    #[tokio::test]
    async fn test_case_insensitive_run_filter() {
        let config = RunConfig::default()
            .with_filter(FilterConfig::default().include("^teststable").case_insensitive());
        let fake = Arc::new(testpkg());
        let (mut engine, _, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        let names: Vec<_> = verdict.units[0].cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["TestStableAlwaysSucceed"]);
        assert!(verdict.ensure_ok().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_pattern_spawns_nothing() {
        let config = RunConfig::default().with_filter(FilterConfig::default().include("("));
        let fake = Arc::new(testpkg());
        let (mut engine, out, _) = setup(&config, &fake);

        let result = engine.run(&patterns()).await;

        assert!(matches!(result, Err(EngineError::Filter { .. })));
        assert!(fake.calls().is_empty());
        assert!(out.contents().is_empty());

        let result = engine.list(&patterns()).await;
        assert!(matches!(result, Err(EngineError::Filter { .. })));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_global_timeout_aborts_hung_case() {
        let config = RunConfig::default().with_timeout(Duration::from_millis(200));
        let fake = Arc::new(
            FakeProcess::new()
                .on_delayed(
                    case_run("TestStableAlwaysSucceed"),
                    Duration::from_secs(30),
                    ProcessOutput::success("PASS"),
                )
                .on(go_list(), vec![ProcessOutput::success("example.com/testpkg.test /src/testpkg\n")])
                .on(go_test_list("/src/testpkg"), vec![ProcessOutput::success(TESTPKG_CASES)])
                .on(go_compile("/src/testpkg"), vec![ProcessOutput::success("")]),
        );
        let (mut engine, out, _) = setup(&config, &fake);

        let result = engine.run(&patterns()).await;

        assert!(matches!(result, Err(EngineError::TimeoutAbort { .. })));
        let lines = out.lines();
        assert!(lines.last().unwrap().starts_with("FAIL: timed out after "));
        assert!(!lines.iter().any(|l| l.starts_with("total: ")));
        assert_eq!(fake.count(case_run("TestUnstableMaySucceed")), 0);
    }

    #[tokio::test]
    async fn test_per_case_timeout_derived_from_global() {
        let config = RunConfig::default().with_timeout(Duration::from_secs(300));
        let fake = Arc::new(testpkg());
        let (mut engine, _, _) = setup(&config, &fake);

        engine.run(&patterns()).await.unwrap();

        let runs: Vec<_> = fake
            .calls()
            .into_iter()
            .filter(|inv| inv.has_arg("-test.run"))
            .collect();
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|inv| inv.has_arg("-test.timeout=300s")));
    }

    fn two_units(first_compiles: bool) -> FakeProcess {
        let compile_a = if first_compiles {
            ProcessOutput::success("")
        } else {
            ProcessOutput::failure(1, "./a_test.go:4:2: undefined: nope")
        };
        FakeProcess::new()
            .on(
                go_list(),
                vec![ProcessOutput::success(
                    "example.com/a.test /src/a\nexample.com/empty.test /src/empty\nexample.com/b.test /src/b\n",
                )],
            )
            .on(go_test_list("/src/a"), vec![ProcessOutput::success("TestA\nok  \texample.com/a\t0.1s\n")])
            .on(go_test_list("/src/empty"), vec![ProcessOutput::success("ok  \texample.com/empty\t0.1s\n")])
            .on(go_test_list("/src/b"), vec![ProcessOutput::success("TestB\nok  \texample.com/b\t0.1s\n")])
            .on(go_compile("/src/a"), vec![compile_a])
            .on(go_compile("/src/b"), vec![ProcessOutput::success("")])
            .on(case_run("TestA"), vec![ProcessOutput::success("PASS")])
            .on(case_run("TestB"), vec![ProcessOutput::success("PASS")])
    }

    #[tokio::test]
    async fn test_unit_without_cases_is_skipped_silently() {
        let config = RunConfig::default();
        let fake = Arc::new(two_units(true));
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        assert_eq!(fake.count(go_compile("/src/empty")), 0);
        assert!(!out.contents().contains("example.com/empty"));
        assert_eq!(verdict.units.len(), 2);
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn test_unit_filtered_to_nothing_is_not_compiled() {
        let config = RunConfig::default().with_filter(FilterConfig::default().include("TestB"));
        let fake = Arc::new(two_units(true));
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        assert_eq!(fake.count(go_compile("/src/a")), 0);
        assert!(!out.contents().contains("example.com/a"));
        assert_eq!(verdict.units.len(), 1);
        assert_eq!(verdict.units[0].unit.import_path, "example.com/b");
    }

    #[tokio::test]
    async fn test_compile_failure_aborts_run() {
        let config = RunConfig::default();
        let fake = Arc::new(two_units(false));
        let (mut engine, out, err) = setup(&config, &fake);

        let result = engine.run(&patterns()).await;

        match result {
            Err(EngineError::Compile { import_path, .. }) => assert_eq!(import_path, "example.com/a"),
            other => panic!("expected compile error, got {other:?}"),
        }
        assert!(out
            .lines()
            .contains(&"FAIL\texample.com/a\t[compile error: exit status 1]".to_string()));
        assert!(err.contents().contains("undefined: nope"));
        assert_eq!(fake.count(go_test_list("/src/b")), 0);
        assert!(!out.contents().contains("total: "));
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_remaining_units() {
        let config = RunConfig::default().continue_on_error();
        let fake = Arc::new(two_units(false));
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        assert_eq!(fake.count(case_run("TestB")), 1);
        assert!(out.lines().iter().any(|l| l.starts_with("ok\texample.com/b\t")));
        assert!(out.lines().last().unwrap().starts_with("total: "));
        assert_eq!(verdict.units[0].compile_error.as_deref(), Some("exit status 1"));
        assert!(matches!(verdict.ensure_ok(), Err(EngineError::RunFailed)));
    }

    fn two_units_with_broken_listing() -> FakeProcess {
        FakeProcess::new()
            .on(
                go_list(),
                vec![ProcessOutput::success("example.com/a.test /src/a\nexample.com/b.test /src/b\n")],
            )
            .on(
                go_test_list("/src/a"),
                vec![ProcessOutput::failure(
                    1,
                    "# example.com/a [example.com/a.test]\n./a_test.go:4:2: undefined: nope\nFAIL\texample.com/a [build failed]",
                )],
            )
            .on(go_test_list("/src/b"), vec![ProcessOutput::success("TestB\nok  \texample.com/b\t0.1s\n")])
            .on(go_compile("/src/b"), vec![ProcessOutput::success("")])
            .on(case_run("TestB"), vec![ProcessOutput::success("PASS")])
    }

    #[tokio::test]
    async fn test_broken_test_code_aborts_at_listing() {
        let config = RunConfig::default();
        let fake = Arc::new(two_units_with_broken_listing());
        let (mut engine, out, err) = setup(&config, &fake);

        let result = engine.run(&patterns()).await;

        assert!(matches!(result, Err(EngineError::Enumeration { .. })));
        assert!(err.contents().contains("undefined: nope"));
        assert_eq!(fake.count(case_run("TestB")), 0);
        assert!(!out.contents().contains("total: "));
    }

    #[tokio::test]
    async fn test_continue_on_error_survives_broken_test_code() {
        let config = RunConfig::default().continue_on_error();
        let fake = Arc::new(two_units_with_broken_listing());
        let (mut engine, out, _) = setup(&config, &fake);

        let verdict = engine.run(&patterns()).await.unwrap();

        let lines = out.lines();
        assert!(lines.contains(&"FAIL\texample.com/a\t[compile error: exit status 1]".to_string()));
        assert_eq!(fake.count(go_compile("/src/a")), 0);
        assert_eq!(fake.count(case_run("TestB")), 1);
        assert!(lines.iter().any(|l| l.starts_with("ok\texample.com/b\t")));
        assert!(lines.last().unwrap().starts_with("total: "));
        assert_eq!(verdict.units[0].compile_error.as_deref(), Some("exit status 1"));
        assert!(matches!(verdict.ensure_ok(), Err(EngineError::RunFailed)));
    }

    #[tokio::test]
    async fn test_discovery_failure() {
        let config = RunConfig::default();
        let fake = Arc::new(
            FakeProcess::new().on(go_list(), vec![ProcessOutput::failure(1, "no Go files")]),
        );
        let (mut engine, _, err) = setup(&config, &fake);

        let result = engine.run(&patterns()).await;

        assert!(matches!(result, Err(EngineError::Discovery { .. })));
        assert!(err.contents().contains("no Go files"));
    }

    #[tokio::test]
    async fn test_list_prints_selected_cases() {
        let config = RunConfig::default().with_filter(FilterConfig::default().exclude("^TestStable"));
        let fake = Arc::new(testpkg());
        let (reporter, out, _) = capture(false);
        let mut engine = TestEngine::new(&config, GoToolchain::new(fake.clone()), reporter.echo_commands(false));

        engine.list(&patterns()).await.unwrap();

        assert_eq!(
            out.contents(),
            "example.com/testpkg\n  TestUnstableMaySucceed\n  TestBrokenAlwaysFailing\n  ExampleAlwaysSucceed\n"
        );
        assert_eq!(fake.count(|inv| inv.has_arg("-c")), 0);
        assert_eq!(fake.count(|inv| inv.has_arg("-test.run")), 0);
    }

    #[tokio::test]
    async fn test_list_skips_units_without_cases() {
        let config = RunConfig::default();
        let fake = Arc::new(two_units(true));
        let (reporter, out, _) = capture(false);
        let mut engine = TestEngine::new(&config, GoToolchain::new(fake.clone()), reporter.echo_commands(false));

        let listing = engine.list(&patterns()).await.unwrap();

        assert_eq!(listing.len(), 2);
        assert_eq!(out.contents(), "example.com/a\n  TestA\nexample.com/b\n  TestB\n");
    }

    #[tokio::test]
    async fn test_list_and_run_select_the_same_cases() {
        let filters = [
            FilterConfig::default(),
            FilterConfig::default().exclude("Broken"),
            FilterConfig::default().include("always").case_insensitive(),
        ];
        for filter in filters {
            let config = RunConfig::default().with_retry(1).with_filter(filter);

            let fake = Arc::new(testpkg());
            let (mut engine, _, _) = setup(&config, &fake);
            let listing = engine.list(&patterns()).await.unwrap();
            let listed: Vec<String> = listing.into_iter().flat_map(|(_, cases)| cases).collect();

            let fake = Arc::new(testpkg());
            let (mut engine, _, _) = setup(&config, &fake);
            let verdict = engine.run(&patterns()).await.unwrap();
            let ran: Vec<String> = verdict
                .units
                .iter()
                .flat_map(|u| u.cases.iter().map(|c| c.name.clone()))
                .collect();

            assert_eq!(listed, ran);
        }
    }
}
