//! Video streaming testbed
//!
//! Provisions a two-host emulated network (server and client behind two
//! switches joined by a shaped link), runs a streaming server and a capturing
//! client in containers on it, and tears it all down when the operator is
//! done.

pub mod cli;
pub mod config;
pub mod prompt;
pub mod shared;
pub mod testbed;
pub mod vnf;

pub use config::{LinkShaping, TestbedConfig};
pub use testbed::{StepReport, Testbed};
