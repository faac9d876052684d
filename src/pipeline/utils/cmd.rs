//! Narrow command-execution abstraction over external tools.
//!
//! Every stage that shells out (PyInstaller, codesign, spctl, hdiutil,
//! osascript, notarytool, stapler, ditto) goes through this module:
//! (program, arguments, working directory) in, (exit status, captured
//! output) out. Nonzero exit is surfaced as a typed error by
//! [`run_checked`] so the calling stage decides whether to escalate or
//! downgrade it.

use crate::pipeline::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

/// Captured result of an external command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status reported by the OS.
    pub status: ExitStatus,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The last few lines of stderr, for error messages and warnings.
    pub fn stderr_tail(&self) -> String {
        stderr_tail(&self.stderr)
    }
}

/// Returns the trailing lines of a stderr capture, capped for log hygiene.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 8;
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join("\n")
}

/// Runs an external command and captures its output.
///
/// A nonzero exit status is NOT an error here; callers that treat it as
/// fatal should use [`run_checked`].
pub async fn run<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    log::debug!("$ {}", program);

    let output = command.output().await.map_err(|error| Error::CommandFailed {
        command: program.to_string(),
        error,
    })?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs an external command, escalating a nonzero exit to [`Error::CommandStatus`].
pub async fn run_checked<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args, cwd).await?;
    if !output.success() {
        return Err(Error::CommandStatus {
            command: program.to_string(),
            code: output.status.code(),
            stderr: output.stderr_tail(),
        });
    }
    Ok(output)
}

/// Locates a tool on PATH, returning its resolved path if present.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            log::debug!("found {} at {}", name, path.display());
            Some(path)
        }
        Err(e) => {
            log::debug!("{} not found on PATH: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stderr_tail;

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let long: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&long);
        assert!(tail.starts_with("line 12"));
        assert!(tail.ends_with("line 19"));
    }

    #[test]
    fn stderr_tail_passes_short_output_through() {
        assert_eq!(stderr_tail("oops"), "oops");
    }
}
