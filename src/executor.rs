//! Remote command execution.
//!
//! Command steps render a shell command line and hand it to a
//! [`RemoteExecutor`] together with the task's [`HostBinding`]. The executor
//! decides how the command reaches the host (ssh, local bash) and blocks until
//! it finishes. Timeouts belong here, not in the task engine: ssh is started
//! with `ConnectTimeout` from the binding.

use std::process::{Command, Stdio};
use std::sync::PoisonError;

use tracing::{debug, info};

use crate::error::{Error, ErrorKind};
use crate::host::HostBinding;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::shell;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited with code 0.
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            success: false,
        }
    }

    /// stdout followed by stderr, trimmed. What an operator would have seen.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }

    /// Turn a non-zero exit into an error of `kind`, carrying host, exit code and output.
    pub fn ensure_success(&self, kind: ErrorKind, host: &HostBinding) -> Result<(), Error> {
        if self.success {
            return Ok(());
        }
        Err(kind
            .error()
            .field("host", &host.host)
            .field("exit_code", self.exit_code.unwrap_or(-1))
            .field("output", self.combined()))
    }
}

/// The transport could not run the command at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Map into the catalog, keeping the host for display.
    pub fn into_error(self, host: &HostBinding) -> Error {
        ErrorKind::RemoteExecutionFailed
            .error()
            .field("host", &host.host)
            .field("reason", self)
    }
}

/// Executes a command line on a host and reports its output.
///
/// A non-zero exit is not an `Err`: the output comes back with `success = false`
/// and the calling step decides what that means. `Err` is reserved for
/// transport failures.
pub trait RemoteExecutor: Send + Sync {
    fn execute(&self, host: &HostBinding, command: &str) -> Result<CommandOutput, TransportError>;
}

/// Prefix `command` with `sudo` when the binding asks for it.
fn wrap_privileged(host: &HostBinding, command: &str) -> String {
    if host.sudo {
        format!("sudo bash -c {}", shell::quote(command))
    } else {
        command.to_string()
    }
}

/// Spawn, register with the child registry, and wait.
fn run_tracked(mut cmd: Command, program: &str) -> Result<CommandOutput, TransportError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();

    let child = cmd.spawn().map_err(|source| TransportError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let pid = child.id();
    ChildRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .register(pid);

    let output = child.wait_with_output();

    ChildRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .unregister(pid);

    let output = output.map_err(|source| TransportError::Wait {
        program: program.to_string(),
        source,
    })?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Runs commands through the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Arguments passed to `ssh`, ending with the remote command.
    pub fn ssh_args(host: &HostBinding, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", host.connect_timeout),
            "-p".to_string(),
            host.ssh_port.to_string(),
        ];
        if let Some(key) = &host.private_key_file {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        if host.forward_agent {
            args.push("-A".to_string());
        }
        args.push(host.destination());
        args.push("--".to_string());
        args.push(wrap_privileged(host, command));
        args
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, host: &HostBinding, command: &str) -> Result<CommandOutput, TransportError> {
        if host.local {
            return LocalExecutor.execute(host, command);
        }
        debug!(host = %host.host, command, "ssh exec");
        let mut cmd = Command::new("ssh");
        cmd.args(Self::ssh_args(host, command));
        let output = run_tracked(cmd, "ssh")?;
        if !output.success {
            info!(host = %host.host, exit_code = ?output.exit_code, "remote command failed");
        }
        Ok(output)
    }
}

/// Runs commands with local `bash -c`.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl RemoteExecutor for LocalExecutor {
    fn execute(&self, host: &HostBinding, command: &str) -> Result<CommandOutput, TransportError> {
        debug!(host = %host.host, command, "local exec");
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(wrap_privileged(host, command));
        run_tracked(cmd, "bash")
    }
}
