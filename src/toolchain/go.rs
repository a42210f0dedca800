//! Go toolchain driver
//!
//! Wraps the three toolchain capabilities the engine relies on: listing
//! packages with tests, listing the cases of one package, and compiling a
//! package's tests into a standalone executable.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parse::{parse_case_listing, parse_unit_listing};
use super::{Invocation, ProcessRunner};
use crate::config::TestBinaryOptions;
use crate::error::{EngineError, EngineResult};
use crate::models::{BuildUnit, CompiledUnit};
use crate::output::Reporter;

/// Name of the toolchain binary, resolved through `PATH`
pub const GO_BINARY: &str = "go";

/// Template handed to `go list -f`
const LIST_FORMAT: &str = "{{.ImportPath}} {{.Dir}}";

/// Driver for the `go` command
pub struct GoToolchain {
    process: Arc<dyn ProcessRunner>,
}

impl GoToolchain {
    pub fn new(process: Arc<dyn ProcessRunner>) -> Self {
        Self { process }
    }

    /// Runner shared with the case runner
    pub fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }

    fn go() -> Invocation {
        Invocation::new(GO_BINARY)
    }

    /// Resolve patterns into the units that have tests, in listed order.
    pub async fn list_units(
        &self,
        patterns: &[String],
        reporter: &mut Reporter,
    ) -> EngineResult<Vec<BuildUnit>> {
        let invocation = Self::go()
            .args(["list", "-test", "-f", LIST_FORMAT])
            .args(patterns.iter().cloned());
        reporter.command(&invocation);

        let output = self.process.run(&invocation).await?;
        if !output.success {
            reporter.diagnostic(&output.combined());
            return Err(EngineError::Discovery {
                status: output.status,
            });
        }

        let units = parse_unit_listing(&output.stdout)?;
        debug!("found {} packages with tests", units.len());
        Ok(units)
    }

    /// Case names of the package in `dir`, unfiltered.
    pub async fn list_cases(&self, dir: &Path, reporter: &mut Reporter) -> EngineResult<Vec<String>> {
        let invocation = Self::go().args(["test", "-list", "."]).current_dir(dir);
        reporter.command(&invocation);

        let output = self.process.run(&invocation).await?;
        if !output.success {
            reporter.diagnostic(&output.combined());
            return Err(EngineError::Enumeration {
                dir: dir.to_path_buf(),
                status: output.status,
            });
        }

        Ok(parse_case_listing(&output.stdout)?)
    }

    /// Build the unit's test executable inside `scratch`.
    pub async fn compile(
        &self,
        unit: &BuildUnit,
        scratch: &Path,
        options: &TestBinaryOptions,
        reporter: &mut Reporter,
    ) -> EngineResult<CompiledUnit> {
        let executable = scratch.join(unit.executable_name());

        let mut invocation = Self::go().args(["test", "-c"]);
        if options.verbose {
            invocation = invocation.arg("-v");
        }
        if options.race {
            invocation = invocation.arg("-race");
        }
        let invocation = invocation
            .arg("-o")
            .arg(executable.to_string_lossy())
            .current_dir(&unit.dir);
        reporter.command(&invocation);

        let output = self.process.run(&invocation).await?;
        if !output.success {
            warn!("compiling {} failed: {}", unit, output.status);
            reporter.diagnostic(&output.combined());
            return Err(EngineError::Compile {
                import_path: unit.import_path.clone(),
                status: output.status,
            });
        }

        Ok(CompiledUnit::new(unit.clone(), executable))
    }
}
