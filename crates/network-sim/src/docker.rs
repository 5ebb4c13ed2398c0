//! Docker CLI wrapper
//!
//! Thin typed layer over the `docker` command line used both for emulated
//! hosts and for the service containers bound to them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::exec::{run_checked, CommandOutput, CommandRunner, ExecError};

#[derive(Error, Debug)]
pub enum DockerError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("container {container} reported invalid pid {raw:?}")]
    InvalidPid { container: String, raw: String },
}

/// Network attachment of a new container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Loopback only; interfaces are added from outside
    None,
    /// Share the network stack of another container
    Container(String),
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::None => write!(f, "none"),
            NetworkMode::Container(name) => write!(f, "container:{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
    ReadWrite,
    ReadOnly,
}

impl VolumeMode {
    fn as_str(self) -> &'static str {
        match self {
            VolumeMode::ReadWrite => "rw",
            VolumeMode::ReadOnly => "ro",
        }
    }
}

/// Bind mount of a host directory into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub host: PathBuf,
    pub bind: String,
    pub mode: VolumeMode,
}

impl Volume {
    pub fn read_write(host: impl Into<PathBuf>, bind: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            bind: bind.into(),
            mode: VolumeMode::ReadWrite,
        }
    }

    fn to_arg(&self) -> String {
        format!("{}:{}:{}", self.host.display(), self.bind, self.mode.as_str())
    }
}

/// Arguments of a detached `docker run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    pub network: NetworkMode,
    pub volumes: Vec<Volume>,
    /// Keep stdin open with a tty so shell images do not exit immediately
    pub interactive_tty: bool,
    pub cap_add: Vec<String>,
    pub command: Vec<String>,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            hostname: None,
            network: NetworkMode::None,
            volumes: Vec::new(),
            interactive_tty: false,
            cap_add: Vec::new(),
            command: Vec::new(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        if self.interactive_tty {
            args.push("-i".into());
            args.push("-t".into());
        }
        args.push("--name".into());
        args.push(self.name.clone());
        if let Some(hostname) = &self.hostname {
            args.push("--hostname".into());
            args.push(hostname.clone());
        }
        args.push("--network".into());
        args.push(self.network.to_string());
        for cap in &self.cap_add {
            args.push("--cap-add".into());
            args.push(cap.clone());
        }
        for volume in &self.volumes {
            args.push("-v".into());
            args.push(volume.to_arg());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// `docker` command line client
pub struct DockerCli<R> {
    runner: R,
}

impl<R: CommandRunner> DockerCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn docker(&self, args: &[&str]) -> Result<CommandOutput, DockerError> {
        Ok(run_checked(&self.runner, "docker", args).await?)
    }

    /// Create and start a container in the background
    pub async fn run_detached(&self, spec: &RunSpec) -> Result<(), DockerError> {
        let args = spec.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.docker(&args).await?;
        debug!("Container {} created: {}", spec.name, out.stdout.trim());
        Ok(())
    }

    pub async fn start(&self, container: &str) -> Result<(), DockerError> {
        self.docker(&["start", container]).await?;
        Ok(())
    }

    /// `docker exec -d`: launch without waiting for the command
    pub async fn exec_detached(&self, container: &str, command: &[&str]) -> Result<(), DockerError> {
        let mut args = vec!["exec", "-d", container];
        args.extend_from_slice(command);
        self.docker(&args).await?;
        Ok(())
    }

    /// `docker exec`: run to completion
    pub async fn exec(&self, container: &str, command: &[&str]) -> Result<CommandOutput, DockerError> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.docker(&args).await
    }

    pub async fn remove_force(&self, container: &str) -> Result<(), DockerError> {
        self.docker(&["rm", "-f", container]).await?;
        Ok(())
    }

    /// PID of the container's init process, as seen from the host
    pub async fn inspect_pid(&self, container: &str) -> Result<u32, DockerError> {
        let out = self
            .docker(&["inspect", "--format", "{{.State.Pid}}", container])
            .await?;
        let raw = out.stdout.trim();
        match raw.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(DockerError::InvalidPid {
                container: container.to_string(),
                raw: raw.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RecordingRunner;

    #[test]
    fn test_run_spec_args_for_host_container() {
        let mut spec = RunSpec::new("mn.server", "video_streaming_server");
        spec.hostname = Some("server".into());
        spec.interactive_tty = true;
        spec.cap_add = vec!["NET_ADMIN".into()];

        assert_eq!(
            spec.args().join(" "),
            "run -d -i -t --name mn.server --hostname server --network none --cap-add NET_ADMIN video_streaming_server"
        );
    }

    #[test]
    fn test_run_spec_args_for_service_container() {
        let mut spec = RunSpec::new("streaming_client", "video_streaming_client");
        spec.network = NetworkMode::Container("mn.client".into());
        spec.volumes = vec![Volume::read_write("/srv/shared", "/home/shared/")];
        spec.command = vec!["sleep".into(), "infinity".into()];

        assert_eq!(
            spec.args().join(" "),
            "run -d --name streaming_client --network container:mn.client -v /srv/shared:/home/shared/:rw video_streaming_client sleep infinity"
        );
    }

    #[test]
    fn test_read_only_volume() {
        let v = Volume {
            host: "/data".into(),
            bind: "/mnt".into(),
            mode: VolumeMode::ReadOnly,
        };
        assert_eq!(v.to_arg(), "/data:/mnt:ro");
    }

    #[tokio::test]
    async fn test_inspect_pid() {
        let runner = RecordingRunner::new();
        runner
            .respond("mn.server", "31337\n")
            .respond("mn.stopped", "0\n");
        let docker = DockerCli::new(&runner);

        assert_eq!(docker.inspect_pid("mn.server").await.unwrap(), 31337);
        // a stopped container reports pid 0
        let err = docker.inspect_pid("mn.stopped").await.unwrap_err();
        assert!(matches!(err, DockerError::InvalidPid { .. }));
        assert_eq!(
            runner.calls()[0],
            "docker inspect --format {{.State.Pid}} mn.server"
        );
    }

    #[tokio::test]
    async fn test_exec_variants() {
        let runner = RecordingRunner::new();
        let docker = DockerCli::new(&runner);

        docker
            .exec_detached("streaming_server", &["/home/stream_video.sh"])
            .await
            .unwrap();
        docker
            .exec("streaming_server", &["pkill", "-f", "stream_video.sh"])
            .await
            .unwrap();
        docker.start("streaming_server").await.unwrap();
        docker.remove_force("streaming_server").await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "docker exec -d streaming_server /home/stream_video.sh",
                "docker exec streaming_server pkill -f stream_video.sh",
                "docker start streaming_server",
                "docker rm -f streaming_server",
            ]
        );
    }
}
