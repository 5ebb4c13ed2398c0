//! Type definitions for network simulation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    #[error("Qdisc error: {0}")]
    Qdisc(#[from] crate::qdisc::QdiscError),

    #[error("Topology error: {0}")]
    Topology(#[from] crate::topology::TopologyError),

    #[error("Docker error: {0}")]
    Docker(#[from] crate::docker::DockerError),

    #[error("Namespace error: {0}")]
    Namespace(#[from] crate::namespace::NamespaceError),

    #[error("Network not started")]
    NotStarted,
}

/// Shaping parameters of an emulated link
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkParams {
    /// Bandwidth in Mbit/s (None = unlimited)
    pub bandwidth_mbit: Option<f64>,
    /// One-way delay in milliseconds (None = no added delay)
    pub delay_ms: Option<f64>,
}

impl LinkParams {
    /// Unshaped link
    pub fn unshaped() -> Self {
        Self::default()
    }

    pub fn shaped(bandwidth_mbit: f64, delay_ms: f64) -> Self {
        Self {
            bandwidth_mbit: Some(bandwidth_mbit),
            delay_ms: Some(delay_ms),
        }
    }

    pub fn is_shaped(&self) -> bool {
        self.rate_bits().is_some() || self.delay_us().is_some()
    }

    /// Rate in bit/s, never below 1
    pub fn rate_bits(&self) -> Option<u64> {
        self.bandwidth_mbit
            .map(|mbit| (mbit * 1_000_000.0).round().max(1.0) as u64)
    }

    /// Delay in microseconds; zero delay means no netem stage
    pub fn delay_us(&self) -> Option<u64> {
        self.delay_ms
            .map(|ms| (ms * 1000.0).round().max(0.0) as u64)
            .filter(|us| *us > 0)
    }
}
