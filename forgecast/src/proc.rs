//! A thin wrapper around [`std::process::Command`] that always captures
//! stdout/stderr and turns a non-zero exit into a typed error carrying the
//! captured tail.
//!
//! Every Builder, Packager, Hook and Signer invocation goes through
//! [`Cmd`] rather than touching `std::process::Command` directly, so that
//! "every external tool invocation must capture stdout/stderr ... never
//! both silently dropped" holds crate-wide instead of per call site.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::errors::{ForgecastError, Result};

/// The captured result of running a command that's allowed to fail
/// (callers decide how to turn a non-zero exit into an error).
#[derive(Debug, Clone)]
pub struct Output {
    /// Process exit code, `None` if killed by a signal.
    pub exit_code: Option<i32>,
    /// Full captured stdout.
    pub stdout: Vec<u8>,
    /// Full captured stderr.
    pub stderr: Vec<u8>,
    /// Wall-clock duration of the call.
    pub duration: Duration,
}

impl Output {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Lossy UTF-8 view of stdout.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Lossy UTF-8 view of stderr.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A command to run, with a name used purely for diagnostics/tracing.
pub struct Cmd {
    name: String,
    command: Command,
    stdin_payload: Option<Vec<u8>>,
}

impl Cmd {
    /// Start building a command. `name` is a short human label (not
    /// necessarily the binary name) used in tracing spans and errors.
    pub fn new(program: impl AsRef<std::ffi::OsStr>, name: impl Into<String>) -> Self {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Self {
            name: name.into(),
            command,
            stdin_payload: None,
        }
    }

    /// Write `payload` to the child's stdin once it's spawned, for
    /// protocols (like the plugin ABI) that pass a request body that
    /// way rather than through argv.
    pub fn stdin_payload(mut self, payload: Vec<u8>) -> Self {
        self.command.stdin(Stdio::piped());
        self.stdin_payload = Some(payload);
        self
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.command.arg(arg);
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.command.args(args);
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: &Utf8Path) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Extend the child's environment. The parent's environment is
    /// inherited and never mutated; this only affects the child.
    pub fn envs(mut self, envs: &BTreeMap<String, String>) -> Self {
        for (k, v) in envs {
            self.command.env(k, v);
        }
        self
    }

    /// Run the command to completion, always capturing output, regardless
    /// of exit status.
    pub fn output(mut self) -> Result<Output> {
        let started = Instant::now();
        debug!(command = %self.name, "spawning subprocess");
        let mut child = self
            .command
            .spawn()
            .map_err(|source| ForgecastError::io(self.name.clone(), source))?;
        if let Some(payload) = self.stdin_payload.take() {
            use std::io::Write;
            let mut stdin = child.stdin.take().expect("stdin was requested as piped");
            stdin.write_all(&payload).map_err(|source| ForgecastError::io(self.name.clone(), source))?;
        }
        let result = child
            .wait_with_output()
            .map_err(|source| ForgecastError::io(self.name.clone(), source))?;
        let duration = started.elapsed();
        if !result.status.success() {
            warn!(
                command = %self.name,
                exit_code = ?result.status.code(),
                "subprocess exited non-zero"
            );
        }
        Ok(Output {
            exit_code: result.status.code(),
            stdout: result.stdout,
            stderr: result.stderr,
            duration,
        })
    }

    /// Run the command and turn a non-zero exit into a [`ForgecastError::Build`].
    pub fn run_as_build(self, build_id: &str) -> Result<Output> {
        let out = self.output()?;
        if !out.success() {
            return Err(ForgecastError::Build {
                build_id: build_id.to_owned(),
                exit_code: out.exit_code,
                stderr_tail: ForgecastError::tail(&out.stderr),
            });
        }
        Ok(out)
    }

    /// Run the command and turn a non-zero exit into a [`ForgecastError::Package`].
    pub fn run_as_package(self, packager: &str) -> Result<Output> {
        let out = self.output()?;
        if !out.success() {
            return Err(ForgecastError::Package {
                packager: packager.to_owned(),
                exit_code: out.exit_code,
                stderr_tail: ForgecastError::tail(&out.stderr),
            });
        }
        Ok(out)
    }
}
