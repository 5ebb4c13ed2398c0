//! External command execution
//!
//! Every interaction with the kernel or the container runtime goes through
//! a [`CommandRunner`], so callers can swap the real process spawner for a
//! recording one in tests.

use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", describe_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "signal".to_string(),
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs and reports their output.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        (**self).run(program, args).await
    }
}

/// Spawns real processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        debug!("Running: {}", command_line(program, args));
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                command: command_line(program, args),
                source,
            })?;

        Ok(CommandOutput {
            code: out.status.code(),
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit into [`ExecError::Failed`]
pub async fn run_checked<R: CommandRunner>(
    runner: &R,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ExecError> {
    let out = runner.run(program, args).await?;
    if out.success {
        Ok(out)
    } else {
        Err(ExecError::Failed {
            command: command_line(program, args),
            code: out.code,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

/// Run a command whose failure is tolerated; the outcome is only logged
pub async fn run_best_effort<R: CommandRunner>(runner: &R, program: &str, args: &[&str]) {
    match runner.run(program, args).await {
        Ok(out) if !out.success => debug!(
            "Ignoring failure of `{}`: {}",
            command_line(program, args),
            out.stderr.trim()
        ),
        Ok(_) => {}
        Err(e) => debug!("Ignoring error: {}", e),
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingRunner;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use super::{command_line, CommandOutput, CommandRunner, ExecError};
    use parking_lot::Mutex;

    /// In-memory runner that records command lines instead of executing them.
    ///
    /// Commands succeed with empty output unless a canned response or an
    /// injected failure matches a substring of the command line. The first
    /// registered match wins.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        responses: Mutex<Vec<(String, CommandOutput)>>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer commands containing `pattern` with `stdout`
        pub fn respond(&self, pattern: &str, stdout: &str) -> &Self {
            self.responses
                .lock()
                .push((pattern.to_string(), CommandOutput::ok(stdout)));
            self
        }

        /// Fail commands containing `pattern` with exit status 1
        pub fn fail(&self, pattern: &str, stderr: &str) -> &Self {
            self.responses
                .lock()
                .push((pattern.to_string(), CommandOutput::failed(1, stderr)));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn position(&self, needle: &str) -> Option<usize> {
            self.calls.lock().iter().position(|c| c.contains(needle))
        }

        pub fn count(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }
    }

    impl CommandRunner for RecordingRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
            let line = command_line(program, args);
            self.calls.lock().push(line.clone());
            let responses = self.responses.lock();
            let out = responses
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput::ok(""));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_checked_reports_stderr_and_code() {
        let runner = RecordingRunner::new();
        runner.fail("link add", "RTNETLINK answers: File exists\n");

        let err = run_checked(&runner, "ip", &["link", "add", "s1", "type", "bridge"])
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ip link add s1 type bridge"));
        assert!(msg.contains("status 1"));
        assert!(msg.ends_with("File exists"), "stderr should be trimmed: {}", msg);
    }

    #[tokio::test]
    async fn test_recording_runner_first_match_wins() {
        let runner = RecordingRunner::new();
        runner.respond("inspect", "4242\n").fail("docker", "boom");

        let out = runner.run("docker", &["inspect", "x"]).await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "4242");

        let out = runner.run("docker", &["rm", "-f", "x"]).await.unwrap();
        assert!(!out.success);
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.count("docker"), 2);
    }

    #[tokio::test]
    async fn test_system_runner_spawn_error() {
        let err = SystemRunner
            .run("definitely-not-a-real-binary-zzz", &["--flag"])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-binary-zzz --flag"));
    }

    #[test]
    fn test_command_line_joins_args() {
        assert_eq!(command_line("tc", &[]), "tc");
        assert_eq!(
            command_line("tc", &["qdisc", "del", "dev", "s1-eth2", "root"]),
            "tc qdisc del dev s1-eth2 root"
        );
    }
}
