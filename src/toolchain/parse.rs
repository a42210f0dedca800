//! Toolchain output parsers
//!
//! `go list -test -f "{{.ImportPath}} {{.Dir}}"` prints one `<identity> <dir>`
//! pair per line; test variants have an identity ending in `.test`.
//!
//! `go test -list .` prints one case name per line, followed by a status line
//! starting with `ok ` (or `? ` when the package has no test files).

use thiserror::Error;

use crate::models::BuildUnit;

/// Suffix of the identity the toolchain gives a package's test main
pub const TEST_VARIANT_SUFFIX: &str = ".test";

/// Output that does not follow the expected line grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("package line {line:?} has no directory")]
    MissingDirectory { line: String },

    #[error("invalid test name {line:?}")]
    InvalidCaseName { line: String },

    #[error("test name {line:?} follows the status line")]
    CaseAfterStatus { line: String },
}

/// Extract the test-bearing units from a package listing, in listed order.
pub fn parse_unit_listing(output: &str) -> Result<Vec<BuildUnit>, ParseError> {
    let mut units = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let (identity, dir) = match line.split_once(' ') {
            Some((identity, dir)) if !dir.trim().is_empty() => (identity, dir.trim()),
            _ => {
                return Err(ParseError::MissingDirectory {
                    line: line.to_string(),
                })
            }
        };

        if let Some(import_path) = identity.strip_suffix(TEST_VARIANT_SUFFIX) {
            units.push(BuildUnit::new(import_path, dir));
        }
    }

    Ok(units)
}

/// Extract case names from a test listing, in listed order.
pub fn parse_case_listing(output: &str) -> Result<Vec<String>, ParseError> {
    let mut cases = Vec::new();
    let mut status_seen = false;

    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if is_status_line(line) {
            status_seen = true;
            continue;
        }
        if status_seen {
            return Err(ParseError::CaseAfterStatus {
                line: line.to_string(),
            });
        }
        if line.contains(char::is_whitespace) {
            return Err(ParseError::InvalidCaseName {
                line: line.to_string(),
            });
        }
        cases.push(line.to_string());
    }

    Ok(cases)
}

fn is_status_line(line: &str) -> bool {
    ["ok ", "ok\t", "? ", "?\t"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}
