//! CLI argument parsing
//!
//! Defines command-line interface using clap. Flags follow Go's spelling
//! (`-run`, `-test.timeout=30s`); [`normalize_go_flags`] rewrites the
//! single-dash long forms so clap can parse them.

use clap::{ArgAction, Parser, Subcommand};
use std::time::Duration;

use crate::config::{FilterConfig, RunConfig, TestBinaryOptions};
use crate::utils::parse_go_duration;

/// Long flags that Go users write with a single dash
const GO_STYLE_FLAGS: &[&str] = &[
    "run",
    "skip",
    "retry",
    "timeout",
    "continue-on-error",
    "test.timeout",
    "test.count",
    "test.v",
    "test.race",
    "help",
];

/// The subset of [`GO_STYLE_FLAGS`] that consumes the following argument
const VALUE_FLAGS: &[&str] = &["run", "skip", "retry", "timeout", "test.timeout", "test.count"];

const TEST_EXAMPLES: &str = "\
EXAMPLES
   testman test ./...
   testman test -v ./...
   testman test -skip ^TestUnstable -timeout=300s -retry=50 ./...
   testman test -skip ^TestBroken -test.timeout=30s -retry=10 --continue-on-error ./...
   testman test -skip slow -run stable -i ./...
   testman test -run ^TestUnstable -timeout=300s -retry=50 ./...
   testman test -test.timeout=10s -test.v -test.count=2 -test.race ./...";

const LIST_EXAMPLES: &str = "\
EXAMPLES
   testman list ./...
   testman list -v ./...
   testman list -skip ^TestStable ./...
   testman list -run stable -i ./...
   testman list -run ^TestStable ./...";

/// Advanced testing workflows for Go projects
#[derive(Parser, Debug)]
#[command(name = "testman")]
#[command(version)]
#[command(about = "Advanced testing workflows for Go projects")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Advanced go test workflows
    #[command(after_help = TEST_EXAMPLES)]
    Test(TestArgs),

    /// List available tests
    #[command(after_help = LIST_EXAMPLES)]
    List(ListArgs),
}

/// Flags shared by `test` and `list`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Verbose output
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Regex to run tests and examples (can be specified multiple times)
    #[arg(long = "run", value_name = "REGEX")]
    pub run: Vec<String>,

    /// Regex to skip tests and examples (can be specified multiple times)
    #[arg(long = "skip", value_name = "REGEX")]
    pub skip: Vec<String>,

    /// Case insensitive regex matching
    #[arg(short = 'i')]
    pub case_insensitive: bool,
}

impl SelectionArgs {
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            include: self.run.clone(),
            exclude: self.skip.clone(),
            case_insensitive: self.case_insensitive,
        }
    }
}

/// Arguments for test command
#[derive(clap::Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Fail after N retries
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub retry: u32,

    /// Program max duration
    #[arg(long, value_parser = parse_duration_arg, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    /// Continue on error (but still fails at the end)
    #[arg(
        long = "continue-on-error",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub continue_on_error: bool,

    /// `go test -timeout=VAL`
    #[arg(long = "test.timeout", value_parser = parse_duration_arg, value_name = "DURATION")]
    pub test_timeout: Option<Duration>,

    /// `go test -count=VAL`
    #[arg(long = "test.count", default_value_t = 1, value_name = "N")]
    pub test_count: u32,

    /// `go test -v`
    #[arg(
        long = "test.v",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub test_v: bool,

    /// `go test -race`
    #[arg(
        long = "test.race",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub test_race: bool,

    /// Package patterns, e.g. `./...`
    #[arg(value_name = "PACKAGES")]
    pub patterns: Vec<String>,
}

impl TestArgs {
    pub fn to_config(&self) -> RunConfig {
        let mut config = RunConfig::default()
            .with_filter(self.selection.filter())
            .with_retry(self.retry);
        if self.selection.verbose {
            config = config.verbose();
        }
        if let Some(timeout) = self.timeout.filter(|d| !d.is_zero()) {
            config = config.with_timeout(timeout);
        }
        if self.continue_on_error {
            config = config.continue_on_error();
        }
        config.test = TestBinaryOptions {
            timeout: self.test_timeout.filter(|d| !d.is_zero()),
            count: self.test_count,
            verbose: self.test_v,
            race: self.test_race,
        };
        config
    }
}

/// Arguments for list command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Package patterns, e.g. `./...`
    #[arg(value_name = "PACKAGES")]
    pub patterns: Vec<String>,
}

impl ListArgs {
    pub fn to_config(&self) -> RunConfig {
        let config = RunConfig::default().with_filter(self.selection.filter());
        if self.selection.verbose {
            config.verbose()
        } else {
            config
        }
    }
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_go_duration(value)
}

/// Rewrite Go-style single-dash long flags (`-run`, `-test.v=true`) into
/// clap's double-dash form.
///
/// A value-taking flag is joined with the argument after it (`-skip -timeout`
/// becomes `--skip=-timeout`), so values are never read as flags. Arguments
/// after `--` are left alone.
pub fn normalize_go_flags<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut normalized = Vec::new();
    let mut passthrough = false;
    let mut awaiting_value: Option<String> = None;

    for (position, arg) in args.into_iter().enumerate() {
        let arg: String = arg.into();
        if let Some(flag) = awaiting_value.take() {
            normalized.push(format!("{flag}={arg}"));
            continue;
        }
        if position == 0 || passthrough {
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        if let Some((body, name, has_value)) = known_flag(&arg) {
            let flag = format!("--{body}");
            if !has_value && VALUE_FLAGS.contains(&name) {
                awaiting_value = Some(flag);
            } else {
                normalized.push(flag);
            }
            continue;
        }
        normalized.push(arg);
    }

    // a trailing value flag stays bare so clap reports the missing value
    normalized.extend(awaiting_value);
    normalized
}

/// Split `-name`, `--name` or `-name=value` into the text after the dashes,
/// the flag name and whether a value is attached.
fn known_flag(arg: &str) -> Option<(&str, &str, bool)> {
    let body = arg
        .strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))?;
    let (name, has_value) = match body.split_once('=') {
        Some((name, _)) => (name, true),
        None => (body, false),
    };
    GO_STYLE_FLAGS
        .contains(&name)
        .then_some((body, name, has_value))
}
