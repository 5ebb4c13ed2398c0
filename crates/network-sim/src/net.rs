//! Network lifecycle: realise a [`Topology`] on the host and tear it down
//!
//! Docker hosts become containers started with `--network none` whose
//! namespaces receive one end of a veth pair. Switches are Linux bridges in
//! the root namespace. Shaped links get a qdisc on both ends so the limits
//! hold in each direction.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::docker::{DockerCli, RunSpec};
use crate::exec::{run_best_effort, run_checked, CommandRunner};
use crate::namespace::Namespace;
use crate::qdisc::QdiscManager;
use crate::topology::{Endpoint, NodeKind, Topology};
use crate::types::RuntimeError;

/// Prefix of the containers backing emulated hosts
pub const HOST_CONTAINER_PREFIX: &str = "mn.";

/// Capability hosts need to manage their own interfaces
const HOST_CAPABILITY: &str = "NET_ADMIN";

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunningHost {
    container: String,
    namespace: Namespace,
}

pub struct Network<R> {
    topology: Topology,
    runner: R,
    hosts: HashMap<String, RunningHost>,
    bridges: Vec<String>,
    veths: Vec<(Option<Namespace>, String)>,
    containers: Vec<String>,
    started: bool,
}

impl<R: CommandRunner> Network<R> {
    pub fn new(topology: Topology, runner: R) -> Self {
        Self {
            topology,
            runner,
            hosts: HashMap::new(),
            bridges: Vec::new(),
            veths: Vec::new(),
            containers: Vec::new(),
            started: false,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Container backing a running Docker host
    pub fn host_container(&self, host: &str) -> Option<&str> {
        self.hosts.get(host).map(|h| h.container.as_str())
    }

    /// Bring up hosts, switches, and links, in that order
    pub async fn start(&mut self) -> Result<(), RuntimeError> {
        for controller in self.topology.controllers() {
            info!("Controller {}: switches run as learning bridges", controller.name);
        }
        if self.topology.controllers().is_empty() && !self.topology.switches().is_empty() {
            warn!("No controller configured; switches fall back to standalone learning");
        }

        info!("Starting {} hosts", self.topology.hosts().len());
        self.start_hosts().await?;

        info!("Starting {} switches", self.topology.switches().len());
        self.start_switches().await?;

        info!("Creating {} links", self.topology.links().len());
        self.start_links().await?;

        self.started = true;
        Ok(())
    }

    async fn start_hosts(&mut self) -> Result<(), RuntimeError> {
        let docker = DockerCli::new(&self.runner);
        for host in self.topology.hosts() {
            let container = format!("{}{}", HOST_CONTAINER_PREFIX, host.name);
            // leftovers from an interrupted run hold the name
            run_best_effort(&self.runner, "docker", &["rm", "-f", &container]).await;

            let mut spec = RunSpec::new(container.clone(), host.image.clone());
            spec.hostname = host.hostname.clone();
            spec.interactive_tty = true;
            spec.cap_add = vec![HOST_CAPABILITY.to_string()];
            docker.run_detached(&spec).await?;
            // removed on stop even if the rest of the setup fails
            self.containers.push(container.clone());

            let pid = docker.inspect_pid(&container).await?;
            let namespace = Namespace::attach(&self.runner, container.clone(), pid).await?;
            self.hosts.insert(
                host.name.clone(),
                RunningHost {
                    container: container.clone(),
                    namespace: namespace.clone(),
                },
            );
            namespace.ip(&self.runner, &["link", "set", "lo", "up"]).await?;
            debug!("Host {} running in {} (pid {})", host.name, container, pid);
        }
        Ok(())
    }

    async fn start_switches(&mut self) -> Result<(), RuntimeError> {
        for switch in self.topology.switches() {
            run_best_effort(&self.runner, "ip", &["link", "del", "dev", switch]).await;
            run_checked(&self.runner, "ip", &["link", "add", "name", switch, "type", "bridge"]).await?;
            self.bridges.push(switch.clone());
            run_checked(&self.runner, "ip", &["link", "set", "dev", switch, "up"]).await?;
        }
        Ok(())
    }

    async fn start_links(&mut self) -> Result<(), RuntimeError> {
        let qdisc = QdiscManager::new(&self.runner);
        for link in self.topology.links() {
            for end in [&link.a, &link.b] {
                run_best_effort(&self.runner, "ip", &["link", "del", "dev", &end.interface]).await;
            }
            run_checked(
                &self.runner,
                "ip",
                &[
                    "link", "add", &link.a.interface, "type", "veth", "peer", "name",
                    &link.b.interface,
                ],
            )
            .await?;
            self.veths.push((None, link.a.interface.clone()));

            for end in [&link.a, &link.b] {
                let namespace = self.attach_endpoint(end).await?;
                if end == &link.a {
                    // the pair is deleted through its first end, wherever it lives now
                    if let Some(last) = self.veths.last_mut() {
                        last.0 = namespace.clone();
                    }
                }
                qdisc
                    .configure_interface(
                        namespace.as_ref().map(Namespace::name),
                        &end.interface,
                        &link.params,
                    )
                    .await?;
            }
            info!(
                "Link {} <-> {} up",
                link.a.interface, link.b.interface
            );
        }
        Ok(())
    }

    /// Move an endpoint to its node and bring it up; returns the namespace
    /// it ended up in (None for the root namespace)
    async fn attach_endpoint(&self, end: &Endpoint) -> Result<Option<Namespace>, RuntimeError> {
        match end.kind {
            NodeKind::Switch => {
                run_checked(
                    &self.runner,
                    "ip",
                    &["link", "set", "dev", &end.interface, "master", &end.node],
                )
                .await?;
                run_checked(&self.runner, "ip", &["link", "set", "dev", &end.interface, "up"]).await?;
                Ok(None)
            }
            NodeKind::Host => {
                let running = self
                    .hosts
                    .get(&end.node)
                    .ok_or(RuntimeError::NotStarted)?;
                let spec = self
                    .topology
                    .host(&end.node)
                    .ok_or(RuntimeError::NotStarted)?;
                let ns = &running.namespace;
                run_checked(
                    &self.runner,
                    "ip",
                    &["link", "set", "dev", &end.interface, "netns", ns.name()],
                )
                .await?;
                ns.ip(&self.runner, &["addr", "add", &spec.cidr(), "dev", &end.interface])
                    .await?;
                ns.ip(&self.runner, &["link", "set", "dev", &end.interface, "up"])
                    .await?;
                Ok(Some(ns.clone()))
            }
        }
    }

    /// Tear everything down; safe to call on a partially started network
    pub async fn stop(&mut self) {
        info!("Stopping network");
        for (namespace, interface) in self.veths.drain(..) {
            match namespace {
                Some(ns) => {
                    run_best_effort(&self.runner, "ip", &["-n", ns.name(), "link", "del", "dev", &interface])
                        .await
                }
                None => run_best_effort(&self.runner, "ip", &["link", "del", "dev", &interface]).await,
            }
        }
        for bridge in self.bridges.drain(..) {
            run_best_effort(&self.runner, "ip", &["link", "del", "dev", &bridge]).await;
        }

        let docker = DockerCli::new(&self.runner);
        let mut hosts: Vec<(String, RunningHost)> = self.hosts.drain().collect();
        hosts.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, host) in hosts {
            host.namespace.detach(&self.runner).await;
        }
        for container in self.containers.drain(..) {
            if let Err(e) = docker.remove_force(&container).await {
                warn!("Failed to remove host container {}: {}", container, e);
            }
        }
        self.started = false;
    }
}
