//! Shell command execution
//!
//! Commands are opaque shell lines (`<shell> -c <line>`), either run to
//! completion with captured output or started in the background with stdout
//! sent to a file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_label(&self) -> String {
        self.status
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

impl CommandRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        cmd
    }

    /// Runs `command` to completion.
    ///
    /// A non-zero exit is logged with the command and its stderr but still
    /// returned as `Ok`; the caller decides whether it matters. Only a
    /// failure to launch the shell is an error.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        info!(command = %command, "Executing");
        let output = self
            .shell_command(command)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn {} for: {}", self.shell, command))?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !result.success() {
            warn!(
                command = %command,
                status = %result.status_label(),
                stderr = %result.stderr.trim_end(),
                "Command failed"
            );
        }
        Ok(result)
    }

    /// Starts `command` in the background with stdout truncated into
    /// `stdout_path`. Stderr is inherited so the operator sees its errors.
    pub fn spawn_background(&self, command: &str, stdout_path: &Path) -> Result<BackgroundProcess> {
        let log = File::create(stdout_path)
            .with_context(|| format!("failed to create {}", stdout_path.display()))?;
        let child = self
            .shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {} for: {}", self.shell, command))?;
        info!(
            command = %command,
            pid = child.id(),
            stdout = %stdout_path.display(),
            "Started background process"
        );
        Ok(BackgroundProcess {
            command: command.to_string(),
            child: Some(child),
        })
    }
}

/// Handle to a background process. Stopped on drop.
#[derive(Debug)]
pub struct BackgroundProcess {
    command: String,
    child: Option<Child>,
}

impl BackgroundProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kills and reaps the process. Stopping a process that already exited,
    /// or stopping twice, is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(command = %self.command, %status, "Background process already exited");
                return Ok(());
            }
            Ok(None) => {}
            // Status unknown; kill anyway so the child is not leaked.
            Err(e) => warn!(command = %self.command, error = %e, "Failed to poll background process"),
        }
        match child.kill() {
            Ok(()) => {}
            // Exited between try_wait and kill.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to stop: {}", self.command))
            }
        }
        let status = child.wait()?;
        info!(command = %self.command, %status, "Stopped background process");
        Ok(())
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(command = %self.command, error = %e, "Failed to stop background process on drop");
        }
    }
}
