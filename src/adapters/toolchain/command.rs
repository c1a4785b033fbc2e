//! Shell-free command execution with placeholders and timeouts.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// How a command ended.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The process exited
    Finished {
        success: bool,
        code: Option<i32>,
        /// stdout followed by stderr
        output: String,
    },
    /// The process was killed after the timeout
    TimedOut,
    /// The process could not be started
    SpawnFailed(io::Error),
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Finished { success: true, .. })
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Finished { output, .. } => output,
            Self::TimedOut | Self::SpawnFailed(_) => "",
        }
    }
}

/// Replace `{name}` placeholders in every argument.
pub fn substitute(argv: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

/// Run `argv` in `cwd`, killing it after `timeout`.
pub async fn run_command(argv: &[String], cwd: &Path, timeout: Duration) -> CommandOutcome {
    let Some((program, args)) = argv.split_first() else {
        return CommandOutcome::SpawnFailed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty command",
        ));
    };

    tracing::debug!(program = %program, args = ?args, cwd = %cwd.display(), "Running command");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %program, error = %e, "Failed to spawn command");
            return CommandOutcome::SpawnFailed(e);
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }
            CommandOutcome::Finished {
                success: output.status.success(),
                code: output.status.code(),
                output: combined,
            }
        }
        Ok(Err(e)) => CommandOutcome::SpawnFailed(e),
        Err(_) => {
            tracing::warn!(program = %program, timeout_secs = timeout.as_secs(), "Command timed out");
            CommandOutcome::TimedOut
        }
    }
}
