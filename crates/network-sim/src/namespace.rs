//! Named handles on container network namespaces
//!
//! A Docker host keeps its network stack in the namespace of the container's
//! init process. Attaching a name to it under `/run/netns` lets the usual
//! `ip -n <name>` and `ip netns exec <name>` tooling reach that stack.

use thiserror::Error;
use tracing::debug;

use crate::exec::{run_best_effort, run_checked, CommandOutput, CommandRunner, ExecError};

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("failed to attach namespace {name} to pid {pid}: {source}")]
    Attach {
        name: String,
        pid: u32,
        #[source]
        source: ExecError,
    },

    #[error("command in namespace {name} failed: {source}")]
    Command {
        name: String,
        #[source]
        source: ExecError,
    },
}

/// A network namespace known to iproute2 by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    name: String,
}

impl Namespace {
    /// Handle for a namespace that is already attached (no side effects)
    pub fn from_existing(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name the network namespace of `pid`
    pub async fn attach<R: CommandRunner>(
        runner: &R,
        name: impl Into<String>,
        pid: u32,
    ) -> Result<Self, NamespaceError> {
        let name = name.into();
        // stale entry from an earlier run that was not torn down
        run_best_effort(runner, "ip", &["netns", "del", &name]).await;

        let pid_arg = pid.to_string();
        run_checked(runner, "ip", &["netns", "attach", &name, &pid_arg])
            .await
            .map_err(|source| NamespaceError::Attach {
                name: name.clone(),
                pid,
                source,
            })?;
        debug!("Attached namespace {} to pid {}", name, pid);
        Ok(Self { name })
    }

    /// Remove the name; the namespace itself lives on with its processes
    pub async fn detach<R: CommandRunner>(&self, runner: &R) {
        run_best_effort(runner, "ip", &["netns", "del", &self.name]).await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `ip -n <name> <args>`
    pub async fn ip<R: CommandRunner>(
        &self,
        runner: &R,
        args: &[&str],
    ) -> Result<CommandOutput, NamespaceError> {
        let mut full = vec!["-n", self.name.as_str()];
        full.extend_from_slice(args);
        run_checked(runner, "ip", &full)
            .await
            .map_err(|source| self.command_error(source))
    }

    /// Execute a command inside the namespace via `ip netns exec`
    pub async fn exec<R: CommandRunner>(
        &self,
        runner: &R,
        cmd: &str,
        args: &[&str],
    ) -> Result<CommandOutput, NamespaceError> {
        let mut full = vec!["netns", "exec", self.name.as_str(), cmd];
        full.extend_from_slice(args);
        run_checked(runner, "ip", &full)
            .await
            .map_err(|source| self.command_error(source))
    }

    fn command_error(&self, source: ExecError) -> NamespaceError {
        NamespaceError::Command {
            name: self.name.clone(),
            source,
        }
    }
}
