//! Testbed configuration
//!
//! Link shaping comes from the command line; every fixed name, image and
//! address of the experiment lives in [`TestbedConfig`], whose defaults
//! describe the video streaming setup. A JSON file may override any subset.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use network_sim::topology::DEFAULT_PREFIX_LEN;
use network_sim::LinkParams;

/// Smallest bandwidth the middle link may be given, in Mbit/s
pub const MIN_BANDWIDTH_MBIT: f64 = 0.000001;
pub const DEFAULT_BANDWIDTH_MBIT: f64 = 10.0;
pub const DEFAULT_DELAY_MS: f64 = 10.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Shaping of the link between the two switches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkShaping {
    pub bandwidth_mbit: f64,
    pub delay_ms: f64,
}

impl LinkShaping {
    /// Clamp raw operator input: bandwidth stays strictly positive and delay
    /// non-negative. NaN falls to the floor.
    pub fn clamped(bandwidth_mbit: f64, delay_ms: f64) -> Self {
        Self {
            bandwidth_mbit: bandwidth_mbit.max(MIN_BANDWIDTH_MBIT),
            delay_ms: delay_ms.max(0.0),
        }
    }

    pub fn params(&self) -> LinkParams {
        LinkParams::shaped(self.bandwidth_mbit, self.delay_ms)
    }
}

impl Default for LinkShaping {
    fn default() -> Self {
        Self::clamped(DEFAULT_BANDWIDTH_MBIT, DEFAULT_DELAY_MS)
    }
}

/// One side of the experiment: an emulated host plus the service bound to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub host: String,
    pub host_image: String,
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub container: String,
    pub container_image: String,
    /// Script launched in the service container
    pub script: String,
    /// Human readable name of what the script does, used in log lines
    pub activity: String,
}

impl EndpointConfig {
    /// Process pattern matched by `pkill -f` to stop the script
    pub fn script_pattern(&self) -> &str {
        self.script.rsplit('/').next().unwrap_or(&self.script)
    }

    fn server() -> Self {
        Self {
            host: "server".into(),
            host_image: "video_streaming_server".into(),
            ip: Ipv4Addr::new(10, 0, 0, 1),
            hostname: "server".into(),
            container: "streaming_server".into(),
            container_image: "video_streaming_server".into(),
            script: "/home/stream_video.sh".into(),
            activity: "video streaming".into(),
        }
    }

    fn client() -> Self {
        Self {
            host: "client".into(),
            host_image: "video_streaming_client".into(),
            ip: Ipv4Addr::new(10, 0, 0, 2),
            hostname: "client".into(),
            container: "streaming_client".into(),
            container_image: "video_streaming_client".into(),
            script: "/home/get_video_stream.sh".into(),
            activity: "packet capture".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestbedConfig {
    pub controller: String,
    pub server_switch: String,
    pub client_switch: String,
    pub prefix_len: u8,
    pub server: EndpointConfig,
    pub client: EndpointConfig,
    /// Mount point of the shared directory inside both service containers
    pub shared_mount: String,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            controller: "c0".into(),
            server_switch: "s1".into(),
            client_switch: "s2".into(),
            prefix_len: DEFAULT_PREFIX_LEN,
            server: EndpointConfig::server(),
            client: EndpointConfig::client(),
            shared_mount: "/home/shared/".into(),
        }
    }
}

impl TestbedConfig {
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json, path)
    }

    /// Both endpoints, server first
    pub fn endpoints(&self) -> [&EndpointConfig; 2] {
        [&self.server, &self.client]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.container == self.client.container {
            return Err(ConfigError::Invalid(format!(
                "service containers share the name {}",
                self.server.container
            )));
        }
        for endpoint in self.endpoints() {
            if endpoint.container.is_empty() || endpoint.container_image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "service on host {} needs a container name and image",
                    endpoint.host
                )));
            }
            if endpoint.script_pattern().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "script of {} must name a file",
                    endpoint.container
                )));
            }
        }
        if !self.shared_mount.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "shared mount {} must be absolute",
                self.shared_mount
            )));
        }
        Ok(())
    }
}
