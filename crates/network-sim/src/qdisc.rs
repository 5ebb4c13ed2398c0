//! Qdisc management for traffic control

use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::exec::{run_best_effort, run_checked, CommandRunner, ExecError};
use crate::types::LinkParams;

#[derive(Error, Debug)]
pub enum QdiscError {
    #[error("failed to shape {interface}: {source}")]
    Apply {
        interface: String,
        #[source]
        source: ExecError,
    },
}

/// Token bucket latency used for the rate limiter
const TBF_LATENCY_MS: u32 = 50;
/// Smallest token bucket; tc rejects buckets below one MTU-sized burst
const MIN_BURST_BYTES: u64 = 32 * 1024;

/// Shaping stages for one interface, in the order they must be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapingPlan {
    pub stages: Vec<Vec<String>>,
}

impl ShapingPlan {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for ShapingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.stages.iter().map(|s| s.join(" ")).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Build the `tc` argument vectors for `params` on `interface`.
///
/// With a bandwidth, a tbf root rate-limits the link and netem hangs below it
/// for delay. Without one, netem is the root. Zero delay installs no netem.
pub fn plan(interface: &str, params: &LinkParams) -> ShapingPlan {
    let mut stages = Vec::new();

    let rate = params.rate_bits();
    if let Some(bits) = rate {
        // one-tenth of a second worth of bytes, floored
        let burst = (bits / 80).max(MIN_BURST_BYTES);
        let mut tbf = qdisc_add(interface, &["root", "handle", "1:", "tbf"]);
        tbf.extend([
            "rate".to_string(),
            format!("{}bit", bits),
            "burst".to_string(),
            format!("{}b", burst),
            "latency".to_string(),
            format!("{}ms", TBF_LATENCY_MS),
        ]);
        stages.push(tbf);
    }

    if let Some(us) = params.delay_us() {
        let mut netem = if rate.is_some() {
            qdisc_add(interface, &["parent", "1:1", "handle", "10:", "netem"])
        } else {
            qdisc_add(interface, &["root", "handle", "10:", "netem"])
        };
        netem.extend(["delay".to_string(), format!("{}us", us)]);
        stages.push(netem);
    }

    ShapingPlan { stages }
}

fn qdisc_add(interface: &str, rest: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = vec!["qdisc".into(), "add".into(), "dev".into(), interface.into()];
    args.extend(rest.iter().map(|s| s.to_string()));
    args
}

/// Manager for qdisc traffic control
pub struct QdiscManager<R> {
    runner: R,
}

impl<R: CommandRunner> QdiscManager<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Shape `interface`, optionally inside the named network namespace
    pub async fn configure_interface(
        &self,
        namespace: Option<&str>,
        interface: &str,
        params: &LinkParams,
    ) -> Result<(), QdiscError> {
        let plan = plan(interface, params);
        if plan.is_empty() {
            debug!("No shaping requested for {}", interface);
            return Ok(());
        }
        info!("Configuring interface {} with {}", interface, describe(params));

        self.clear_interface(namespace, interface).await;

        for stage in &plan.stages {
            let args: Vec<&str> = stage.iter().map(String::as_str).collect();
            self.tc(namespace, &args)
                .await
                .map_err(|source| QdiscError::Apply {
                    interface: interface.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Remove any root qdisc from the interface (best effort)
    pub async fn clear_interface(&self, namespace: Option<&str>, interface: &str) {
        let args = ["qdisc", "del", "dev", interface, "root"];
        match namespace {
            Some(ns) => {
                let mut full = vec!["netns", "exec", ns, "tc"];
                full.extend(args);
                run_best_effort(&self.runner, "ip", &full).await
            }
            None => run_best_effort(&self.runner, "tc", &args).await,
        }
    }

    async fn tc(&self, namespace: Option<&str>, args: &[&str]) -> Result<(), ExecError> {
        match namespace {
            Some(ns) => {
                let mut full = vec!["netns", "exec", ns, "tc"];
                full.extend_from_slice(args);
                run_checked(&self.runner, "ip", &full).await?;
            }
            None => {
                run_checked(&self.runner, "tc", args).await?;
            }
        }
        Ok(())
    }
}

fn describe(params: &LinkParams) -> String {
    let bw = params
        .bandwidth_mbit
        .map_or_else(|| "unlimited".to_string(), |b| format!("{} Mbit/s", b));
    let delay = params.delay_ms.unwrap_or(0.0);
    format!("{} bandwidth, {}ms delay", bw, delay)
}
