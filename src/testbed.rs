//! End-to-end run of the streaming experiment
//!
//! The run is a fixed sequence: build and start the network, bring up the
//! two service containers, launch their scripts, wait for the operator, stop
//! the scripts, and tear everything down. Service steps are independent:
//! each logs its own failure and the run carries on. Only building or
//! starting the network aborts the run.

use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use network_sim::{CommandRunner, DockerCli, HostSpec, Network, Topology, Volume};
use tracing::{error, info, warn};

use crate::config::{LinkShaping, TestbedConfig};
use crate::prompt::StopReason;
use crate::vnf::VnfManager;

/// Outcome of one best-effort step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: String,
    pub error: Option<String>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Testbed<R> {
    config: TestbedConfig,
    link: LinkShaping,
    shared_dir: PathBuf,
    runner: R,
    reports: Vec<StepReport>,
    stop_reason: Option<StopReason>,
}

impl<R: CommandRunner> Testbed<R> {
    pub fn new(config: TestbedConfig, link: LinkShaping, shared_dir: PathBuf, runner: R) -> Self {
        Self {
            config,
            link,
            shared_dir,
            runner,
            reports: Vec::new(),
            stop_reason: None,
        }
    }

    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// How the operator ended the run, once it got that far
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn failed_steps(&self) -> usize {
        self.reports.iter().filter(|r| !r.succeeded()).count()
    }

    /// Controller, two Docker hosts, two switches, and the shaped middle link
    pub fn topology(&self) -> Result<Topology> {
        let cfg = &self.config;
        let mut topo = Topology::new();

        info!("*** Add controller");
        topo.add_controller(&cfg.controller)?;

        info!("*** Creating hosts");
        for endpoint in cfg.endpoints() {
            let mut host = HostSpec::new(&endpoint.host, &endpoint.host_image, endpoint.ip)
                .with_hostname(&endpoint.hostname);
            host.prefix_len = cfg.prefix_len;
            topo.add_docker_host(host)?;
        }

        info!("*** Adding switches and links");
        topo.add_switch(&cfg.server_switch)?;
        topo.add_switch(&cfg.client_switch)?;
        topo.add_link(&cfg.server_switch, &cfg.server.host, Default::default())?;
        topo.add_link(&cfg.server_switch, &cfg.client_switch, self.link.params())?;
        topo.add_link(&cfg.client_switch, &cfg.client.host, Default::default())?;
        Ok(topo)
    }

    /// Run the whole experiment; `stop` resolves when the operator wants out
    pub async fn run<F: Future<Output = StopReason>>(&mut self, stop: F) -> Result<()> {
        let topology = self.topology().context("building topology")?;
        let Self {
            config,
            link,
            shared_dir,
            runner,
            reports,
            stop_reason,
        } = self;
        let runner = &*runner;
        let mut net = Network::new(topology, runner);
        let mut mgr = VnfManager::new(runner);
        let docker = DockerCli::new(runner);

        info!(
            "*** Starting network (middle link: {} Mbit/s, {} ms)",
            link.bandwidth_mbit, link.delay_ms
        );
        if let Err(e) = net.start().await {
            net.stop().await;
            return Err(e).context("starting network");
        }

        info!("*** Adding Docker containers");
        for endpoint in config.endpoints() {
            let volumes = vec![Volume::read_write(shared_dir.clone(), config.shared_mount.clone())];
            let res = mgr
                .add_container(
                    &net,
                    &endpoint.container,
                    &endpoint.host,
                    &endpoint.container_image,
                    &[],
                    volumes,
                )
                .await;
            record(
                reports,
                res,
                format!("Added {} container", endpoint.container),
                format!("adding {} container", endpoint.container),
            );
        }

        info!("*** Starting Docker containers");
        for endpoint in config.endpoints() {
            let res = docker.start(&endpoint.container).await;
            record(
                reports,
                res,
                format!("Started {} container", endpoint.container),
                format!("starting {} container", endpoint.container),
            );
        }

        info!("*** Starting video streaming and packet capture");
        for endpoint in config.endpoints() {
            let res = docker
                .exec_detached(&endpoint.container, &[endpoint.script.as_str()])
                .await;
            record(
                reports,
                res,
                format!("Started {} on {}", endpoint.activity, endpoint.container),
                format!("starting {} on {}", endpoint.activity, endpoint.container),
            );
        }

        let reason = stop.await;
        match reason {
            StopReason::Enter => info!("*** Stop requested"),
            StopReason::EndOfInput => info!("*** Input closed, stopping"),
            StopReason::Interrupted => info!("*** Interrupted, stopping"),
        }
        *stop_reason = Some(reason);

        info!("*** Stopping video streaming and packet capture");
        for endpoint in config.endpoints() {
            let res = docker
                .exec(&endpoint.container, &["pkill", "-f", endpoint.script_pattern()])
                .await;
            record(
                reports,
                res,
                format!("Stopped {} on {}", endpoint.activity, endpoint.container),
                format!("stopping {} on {}", endpoint.activity, endpoint.container),
            );
        }

        info!("*** Stopping Docker containers and network");
        for endpoint in config.endpoints() {
            let res = mgr.remove_container(&endpoint.container).await;
            record(
                reports,
                res,
                format!("Removed {} container", endpoint.container),
                format!("removing {} container", endpoint.container),
            );
        }

        net.stop().await;
        mgr.stop().await;
        info!("*** Network stopped");

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        if failed > 0 {
            warn!("{} of {} service steps failed", failed, reports.len());
        }
        Ok(())
    }
}

fn record<T, E: Display>(reports: &mut Vec<StepReport>, res: Result<T, E>, done: String, doing: String) {
    match res {
        Ok(_) => {
            info!("*** {}", done);
            reports.push(StepReport {
                step: done,
                error: None,
            });
        }
        Err(e) => {
            error!("Error {}: {}", doing, e);
            reports.push(StepReport {
                step: doing,
                error: Some(e.to_string()),
            });
        }
    }
}
