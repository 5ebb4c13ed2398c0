//! Command line interface and the top-level run

use anyhow::{bail, Context, Result};
use clap::Parser;
use network_sim::SystemRunner;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::{LinkShaping, TestbedConfig, DEFAULT_BANDWIDTH_MBIT, DEFAULT_DELAY_MS};
use crate::prompt;
use crate::shared;
use crate::testbed::Testbed;

#[derive(Parser, Debug)]
#[command(author, version, about = "Script for running the video streaming app.", long_about = None)]
pub struct Cli {
    /// Initial bandwidth of the link connecting the two switches in the topology (Mbit/s)
    #[arg(long = "link-bw", value_name = "LINK_BW", default_value_t = DEFAULT_BANDWIDTH_MBIT, allow_negative_numbers = true)]
    pub link_bw: f64,

    /// Initial delay of the link connecting the two switches in the topology (ms)
    #[arg(long = "link-delay", value_name = "LINK_DELAY", default_value_t = DEFAULT_DELAY_MS, allow_negative_numbers = true)]
    pub link_delay: f64,

    /// Directory shared with both containers [default: `shared` next to the executable]
    #[arg(long, value_name = "DIR")]
    pub shared_dir: Option<PathBuf>,

    /// JSON file overriding host, container, and image names
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn link(&self) -> LinkShaping {
        LinkShaping::clamped(self.link_bw, self.link_delay)
    }

    fn shared_dir(&self) -> Result<PathBuf> {
        match &self.shared_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let argv0 = std::env::args_os().next().unwrap_or_default();
                let cwd = std::env::current_dir().context("reading current directory")?;
                Ok(shared::default_shared_dir(&argv0, &cwd))
            }
        }
    }
}

/// Everything after argument parsing; errors here end the process with status 1
pub async fn run(cli: Cli) -> Result<()> {
    let link = cli.link();
    debug!("Link shaping after clamping: {:?}", link);

    let requested = cli.shared_dir()?;
    let shared_dir = shared::ensure_shared_dir(&requested)
        .with_context(|| format!("creating shared directory {}", requested.display()))?;

    let config = match &cli.config {
        Some(path) => TestbedConfig::from_file(path).await?,
        None => TestbedConfig::default(),
    };

    if !nix::unistd::Uid::effective().is_root() {
        bail!("the emulated network must be run as root");
    }

    info!("Shared directory: {}", shared_dir.display());
    let mut testbed = Testbed::new(config, link, shared_dir, SystemRunner);
    testbed.run(prompt::stop_requested()).await
}
