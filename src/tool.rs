//! External tool invocation.
//!
//! Every stage drives native tools (cmake, codesign, notarytool, ...).
//! Commands are built as [`Command`] values so their arguments can be
//! checked in tests, then executed here.

use crate::error::{Error, Result};
use crate::workdir::InstallPrefix;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Fail early if any of `tools` is not on `PATH`.
pub fn require(tools: &[&str]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| which::which(tool).is_err())
        .map(|tool| tool.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ToolMissing { tools: missing })
    }
}

/// Arguments whose value is never shown.
const SECRET_FLAGS: &[&str] = &["--password"];

/// Human-readable command line for logs and errors.
pub fn display(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    let mut redact = false;
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if std::mem::replace(&mut redact, SECRET_FLAGS.contains(&&*arg)) {
            parts.push("****".to_string());
        } else if arg.is_empty() || arg.contains(char::is_whitespace) {
            parts.push(format!("'{}'", arg));
        } else {
            parts.push(arg.into_owned());
        }
    }
    parts.join(" ")
}

/// Run a command with inherited stdio, failing on a non-zero exit.
///
/// Used for long builds whose output the operator wants to watch.
pub fn run(cmd: &mut Command) -> Result<()> {
    let line = display(cmd);
    tracing::debug!(command = %line, "running");

    let status = cmd
        .stdin(Stdio::null())
        .status()
        .map_err(|e| Error::command_failed(&line, e.to_string()))?;

    if !status.success() {
        return Err(Error::command_failed(line, format!("exited with {}", status)));
    }
    Ok(())
}

/// Run a command and capture its output, failing on a non-zero exit.
///
/// The error carries stderr (or stdout when stderr is empty).
pub fn output(cmd: &mut Command) -> Result<Output> {
    let output = capture(cmd)?;
    if !output.status.success() {
        return Err(Error::command_failed(display(cmd), failure_message(&output)));
    }
    Ok(output)
}

/// Run a command and capture its output regardless of exit status.
pub fn capture(cmd: &mut Command) -> Result<Output> {
    let line = display(cmd);
    tracing::debug!(command = %line, "running");
    cmd.stdin(Stdio::null())
        .output()
        .map_err(|e| Error::command_failed(line, e.to_string()))
}

/// Trimmed stdout of a successful command.
pub fn stdout_of(cmd: &mut Command) -> Result<String> {
    let output = output(cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return format!("{}: {}", output.status, stderr);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    format!("{}: {}", output.status, stdout.trim())
}

/// Environment for dependency and application builds.
///
/// `PKG_CONFIG_PATH` points at the prefix and the prefix `bin` directory
/// is searched first, so tools installed by earlier dependencies win.
#[derive(Debug, Clone)]
pub struct BuildEnv {
    vars: Vec<(String, OsString)>,
}

impl BuildEnv {
    pub fn new(prefix: &InstallPrefix) -> Self {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![prefix.bin()];
        paths.extend(std::env::split_paths(&current));
        let path = std::env::join_paths(paths).unwrap_or(current);

        Self {
            vars: vec![
                ("PKG_CONFIG_PATH".into(), prefix.pkgconfig().into_os_string()),
                ("PATH".into(), path),
            ],
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// A command for `program` with this environment applied.
    pub fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> Command {
        let mut cmd = Command::new(program);
        self.apply(&mut cmd);
        cmd
    }

    /// Same as [`BuildEnv::command`], run from `dir`.
    pub fn command_in(&self, program: impl AsRef<std::ffi::OsStr>, dir: &Path) -> Command {
        let mut cmd = self.command(program);
        cmd.current_dir(dir);
        cmd
    }

    pub fn apply(&self, cmd: &mut Command) {
        for (key, value) in &self.vars {
            cmd.env(key, value);
        }
    }
}
