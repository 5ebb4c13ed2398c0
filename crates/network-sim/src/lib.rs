//! Network emulation on Linux
//!
//! This library builds small emulated topologies out of Docker-backed hosts,
//! Linux bridges acting as switches, and veth links shaped with tc qdiscs.
//! All system changes go through a [`CommandRunner`], which drives the
//! `ip`, `tc` and `docker` command line tools.

pub mod docker;
pub mod exec;
pub mod namespace;
pub mod net;
pub mod qdisc;
pub mod topology;
pub mod types;

pub use docker::{DockerCli, DockerError, NetworkMode, RunSpec, Volume, VolumeMode};
pub use exec::{CommandOutput, CommandRunner, ExecError, SystemRunner};
pub use namespace::{Namespace, NamespaceError};
pub use net::Network;
pub use qdisc::{QdiscError, QdiscManager};
pub use topology::{HostSpec, LinkId, Topology, TopologyError};
pub use types::{LinkParams, RuntimeError};

#[cfg(feature = "test-utils")]
pub use exec::RecordingRunner;
