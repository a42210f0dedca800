//! testman - Advanced testing workflows for Go projects
//!
//! Wraps the Go toolchain to run every test case of a project as its own
//! subprocess, with retries for flaky cases and a global timeout.
//!
//! ## Features
//!
//! - Per-case execution of precompiled test binaries
//! - Retry of failing cases (`-retry`)
//! - Include/exclude regex selection (`-run`, `-skip`, `-i`)
//! - Global wall-clock timeout (`-timeout`)
//! - Pass-through of `go test` flags (`-test.timeout`, `-test.count`, `-test.v`, `-test.race`)
//!
//! ## Usage
//!
//! ```bash
//! # Run every test, retrying flaky ones
//! testman test -retry=10 ./...
//!
//! # Skip broken tests and keep going after compile failures
//! testman test -skip ^TestBroken --continue-on-error ./...
//!
//! # List selected tests
//! testman list -run stable -i ./...
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::sync::Arc;

mod cli;
mod config;
mod error;
mod executor;
mod filter;
mod models;
mod output;
mod toolchain;
mod utils;

use cli::{Args, Command};
use executor::TestEngine;
use output::Reporter;
use toolchain::{GoToolchain, SystemProcess};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_from(cli::normalize_go_flags(std::env::args()));

    match args.command {
        Some(Command::Test(test_args)) => run_tests(test_args).await?,
        Some(Command::List(list_args)) => list_tests(list_args).await?,
        None => Args::command().print_help()?,
    }

    Ok(())
}

async fn run_tests(args: cli::TestArgs) -> Result<()> {
    if args.patterns.is_empty() {
        return print_subcommand_help("test");
    }

    let config = args.to_config();
    init_logger(LogLevel::for_verbosity(config.verbose));

    let toolchain = GoToolchain::new(Arc::new(SystemProcess));
    let mut engine = TestEngine::new(&config, toolchain, Reporter::stdio(config.verbose));

    let verdict = engine.run(&args.patterns).await?;
    verdict.ensure_ok()?;

    Ok(())
}

async fn list_tests(args: cli::ListArgs) -> Result<()> {
    if args.patterns.is_empty() {
        return print_subcommand_help("list");
    }

    let config = args.to_config();
    init_logger(LogLevel::for_verbosity(config.verbose));

    let toolchain = GoToolchain::new(Arc::new(SystemProcess));
    let reporter = Reporter::stdio(config.verbose).echo_commands(config.verbose);
    let mut engine = TestEngine::new(&config, toolchain, reporter);

    engine.list(&args.patterns).await?;

    Ok(())
}

fn print_subcommand_help(name: &str) -> Result<()> {
    let mut command = Args::command();
    command.build();
    if let Some(subcommand) = command.find_subcommand_mut(name) {
        subcommand.print_help()?;
    }
    Ok(())
}
