//! Service containers bound to emulated hosts
//!
//! A service container joins the network stack of the container backing its
//! host, so its traffic leaves through the host's emulated interface.

use network_sim::{CommandRunner, DockerCli, DockerError, Network, NetworkMode, RunSpec, Volume};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum VnfError {
    #[error("host {0} is not running in the emulated network")]
    UnknownHost(String),

    #[error(transparent)]
    Docker(#[from] DockerError),
}

pub struct VnfManager<R> {
    docker: DockerCli<R>,
    containers: Vec<String>,
}

impl<R: CommandRunner> VnfManager<R> {
    pub fn new(runner: R) -> Self {
        Self {
            docker: DockerCli::new(runner),
            containers: Vec::new(),
        }
    }

    /// Start `image` as container `name` on emulated host `host`
    pub async fn add_container<N: CommandRunner>(
        &mut self,
        net: &Network<N>,
        name: &str,
        host: &str,
        image: &str,
        command: &[String],
        volumes: Vec<Volume>,
    ) -> Result<(), VnfError> {
        let host_container = net
            .host_container(host)
            .ok_or_else(|| VnfError::UnknownHost(host.to_string()))?;

        let mut spec = RunSpec::new(name, image);
        spec.network = NetworkMode::Container(host_container.to_string());
        spec.volumes = volumes;
        spec.command = command.to_vec();
        self.docker.run_detached(&spec).await?;

        self.containers.push(name.to_string());
        debug!("Container {} bound to host {}", name, host);
        Ok(())
    }

    pub async fn remove_container(&mut self, name: &str) -> Result<(), VnfError> {
        self.docker.remove_force(name).await?;
        self.containers.retain(|c| c != name);
        Ok(())
    }

    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    /// Remove every container still tracked
    pub async fn stop(&mut self) {
        for name in std::mem::take(&mut self.containers) {
            if let Err(e) = self.docker.remove_force(&name).await {
                warn!("Failed to remove container {}: {}", name, e);
            }
        }
    }
}
