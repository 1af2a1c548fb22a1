//! # Command Runner
//!
//! This module is the only place in the crate that touches the operating
//! system through subprocesses. Every other component (dependency installs,
//! repository synchronization, the delegating launcher, host setup tasks)
//! funnels its process execution through here.
//!
//! ## Design
//!
//! An [`Invocation`] describes a parameterized process invocation. There are
//! two flavors:
//!
//! - **`Invocation::argv`**: an argument-vector invocation. Arguments are
//!   passed to the process verbatim with no shell interpretation. This is
//!   the default and the safe option.
//! - **`Invocation::shell`**: the raw-shell escape hatch, for the handful of
//!   call sites that genuinely need pipelines or redirection (installer
//!   scripts piped to `sh`, `chpasswd`, `ssh-keyscan >> known_hosts`). The
//!   script is passed to `sh -c` unescaped; the caller trusts its input.
//!
//! Instead of return-type polymorphism over `(capture, tolerate)`, there is
//! one internal result ([`Outcome`], `{ succeeded, code, stdout, stderr }`)
//! and four small
//! wrappers over it:
//!
//! | helper            | on failure                     | returns           |
//! |-------------------|--------------------------------|-------------------|
//! | [`run`]           | fatal `Error::Command`         | `()`              |
//! | [`run_ok`]        | tolerated                      | `bool`            |
//! | [`run_output`]    | fatal `Error::Command`         | `String`          |
//! | [`run_output_ok`] | tolerated                      | `Option<String>`  |
//!
//! Captured output has exactly one trailing newline stripped and no other
//! whitespace touched. Fatal failures log a diagnostic block containing the
//! failing command and both captured streams before the error propagates.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// A parameterized process invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    kind: Kind,
    cwd: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum Kind {
    /// Discrete arguments, no shell interpretation.
    Argv(Vec<String>),
    /// Raw script passed to `sh -c`. Trusts its input.
    Shell(String),
}

impl Invocation {
    /// Build an argument-vector invocation. The first element is the
    /// program; the rest are its arguments.
    pub fn argv<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: Kind::Argv(parts.into_iter().map(Into::into).collect()),
            cwd: None,
        }
    }

    /// Build a raw-shell invocation (`sh -c <script>`).
    ///
    /// The script is not escaped or validated. Reserve this for commands
    /// that need shell features; everything else should use [`Invocation::argv`].
    pub fn shell<S: Into<String>>(script: S) -> Self {
        Self {
            kind: Kind::Shell(script.into()),
            cwd: None,
        }
    }

    /// Set the working directory for the child process.
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Human-readable rendering of the invocation, for logs and errors.
    pub fn describe(&self) -> String {
        match &self.kind {
            Kind::Argv(parts) => parts.join(" "),
            Kind::Shell(script) => script.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = match &self.kind {
            Kind::Argv(parts) => {
                // An empty argv is a programming error; surface it as a
                // command that cannot spawn rather than panicking.
                let program = parts.first().map(String::as_str).unwrap_or("");
                let mut cmd = Command::new(program);
                cmd.args(&parts[1..]);
                cmd
            }
            Kind::Shell(script) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
        };
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// The single result type all run helpers are built on.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Whether the child exited with status 0.
    pub succeeded: bool,
    /// The child's exit code, or `None` if it was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout with one trailing newline stripped.
    pub stdout: String,
    /// Captured stderr, verbatim.
    pub stderr: String,
}

/// Execute an invocation, capturing both output streams.
///
/// Returns `Err` only when the child could not be spawned at all; a child
/// that ran and failed is an `Outcome` with `succeeded == false`.
pub fn execute(invocation: &Invocation) -> Result<Outcome> {
    let output = invocation
        .command()
        .output()
        .map_err(|source| Error::Spawn {
            command: invocation.describe(),
            source,
        })?;
    Ok(Outcome {
        succeeded: output.status.success(),
        code: output.status.code(),
        stdout: strip_trailing_newline(&String::from_utf8_lossy(&output.stdout)),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run an invocation, failing fast on a non-zero exit.
///
/// The failing command and both captured streams are logged as a diagnostic
/// block before the error is returned.
pub fn run(invocation: &Invocation) -> Result<()> {
    let outcome = execute(invocation)?;
    if outcome.succeeded {
        Ok(())
    } else {
        Err(fatal(invocation, outcome))
    }
}

/// Run an invocation, tolerating failure.
///
/// A child that cannot be spawned counts as a failure, matching the shell
/// behavior where an unknown command exits 127.
pub fn run_ok(invocation: &Invocation) -> bool {
    execute(invocation).map(|o| o.succeeded).unwrap_or(false)
}

/// Run an invocation and return its captured stdout, failing fast on a
/// non-zero exit. Exactly one trailing newline is stripped.
pub fn run_output(invocation: &Invocation) -> Result<String> {
    let outcome = execute(invocation)?;
    if outcome.succeeded {
        Ok(outcome.stdout)
    } else {
        Err(fatal(invocation, outcome))
    }
}

/// Run an invocation and return its captured stdout, or `None` on failure.
///
/// `None` is distinct from a command that succeeded with empty output,
/// which yields `Some("")`.
pub fn run_output_ok(invocation: &Invocation) -> Option<String> {
    match execute(invocation) {
        Ok(outcome) if outcome.succeeded => Some(outcome.stdout),
        _ => None,
    }
}

fn fatal(invocation: &Invocation, outcome: Outcome) -> Error {
    let command = invocation.describe();
    let divider = "-".repeat(80);
    let mut lines = vec![format!("error running {:?}", command)];
    if !outcome.stdout.is_empty() {
        lines.push(divider.clone());
        lines.push(format!("stdout {}", "-".repeat(73)));
        lines.push(outcome.stdout.clone());
    }
    if !outcome.stderr.is_empty() {
        lines.push(divider.clone());
        lines.push(format!("stderr {}", "-".repeat(73)));
        lines.push(outcome.stderr.clone());
    }
    if !outcome.stdout.is_empty() || !outcome.stderr.is_empty() {
        lines.push(divider);
    }
    log::error!("{}", lines.join("\n"));
    Error::Command {
        command,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
    }
}

fn strip_trailing_newline(text: &str) -> String {
    text.strip_suffix('\n').unwrap_or(text).to_string()
}
