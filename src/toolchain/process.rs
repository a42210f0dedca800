//! Subprocess execution
//!
//! Every external command the engine starts goes through [`ProcessRunner`].

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::debug;

/// A command line plus the directory it runs in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Whether the arguments contain `needle` as one element
    #[cfg(test)]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    /// `exit status N`, or `signal: N` when killed
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    /// Both streams, line by line in arrival order
    pub combined: String,
}

impl ProcessOutput {
    #[cfg(test)]
    pub fn success(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self {
            success: true,
            status: "exit status 0".to_string(),
            combined: stdout.clone(),
            stdout,
            stderr: String::new(),
        }
    }

    #[cfg(test)]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self {
            success: false,
            status: format!("exit status {code}"),
            stdout: String::new(),
            combined: stderr.clone(),
            stderr,
        }
    }

    /// Stdout and stderr interleaved the way the process wrote them
    pub fn combined(&self) -> String {
        self.combined.clone()
    }
}

/// Raw bytes of one run's output streams
#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
}

/// Drain both pipes concurrently, appending each complete line to the
/// combined buffer as soon as it arrives.
async fn capture_streams(stdout: ChildStdout, stderr: ChildStderr) -> io::Result<Captured> {
    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let mut out_line = Vec::new();
    let mut err_line = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut captured = Captured::default();

    while out_open || err_open {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_line), if out_open => {
                if read? == 0 {
                    out_open = false;
                }
                captured.stdout.extend_from_slice(&out_line);
                captured.combined.extend_from_slice(&out_line);
                out_line.clear();
            }
            read = err_reader.read_until(b'\n', &mut err_line), if err_open => {
                if read? == 0 {
                    err_open = false;
                }
                captured.stderr.extend_from_slice(&err_line);
                captured.combined.extend_from_slice(&err_line);
                err_line.clear();
            }
        }
    }

    Ok(captured)
}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal: {signal}");
        }
    }
    status.to_string()
}

/// Runs an invocation to completion and captures its output
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;
}

/// Real subprocesses via tokio.
///
/// Children are killed when the run future is dropped, so an aborted run
/// leaves nothing behind.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcess;

#[async_trait]
impl ProcessRunner for SystemProcess {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let captured = capture_streams(stdout, stderr).await?;
        let status = child.wait().await?;
        let output = ProcessOutput {
            success: status.success(),
            status: describe_status(&status),
            stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
            combined: String::from_utf8_lossy(&captured.combined).into_owned(),
        };
        debug!("{} finished: {}", invocation.program.display(), output.status);
        Ok(output)
    }
}
