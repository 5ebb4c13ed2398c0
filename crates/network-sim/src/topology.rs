//! Declarative description of an emulated network
//!
//! A [`Topology`] only records nodes and links and derives interface names;
//! nothing touches the system until it is handed to [`crate::net::Network`].

use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::types::LinkParams;

/// Kernel limit on interface names (IFNAMSIZ minus the terminator)
pub const MAX_IFNAME_LEN: usize = 15;

/// Default prefix of the emulated address plan (10.0.0.0/8)
pub const DEFAULT_PREFIX_LEN: u8 = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    #[error("node name must not be empty")]
    EmptyName,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("link endpoint not found: {0}")]
    UnknownNode(String),

    #[error("link from {0} to itself")]
    SelfLink(String),

    #[error("interface name {0} exceeds {max} bytes", max = MAX_IFNAME_LEN)]
    InterfaceNameTooLong(String),

    #[error("invalid prefix length /{0}")]
    InvalidPrefix(u8),
}

/// Controller managing the switches' forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub name: String,
}

/// A host backed by a Docker container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
    pub image: String,
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
    pub hostname: Option<String>,
}

impl HostSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ip,
            prefix_len: DEFAULT_PREFIX_LEN,
            hostname: None,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn cidr(&self) -> String {
        format!("{}/{}", self.ip, self.prefix_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Host,
    Switch,
}

/// One side of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub node: String,
    pub kind: NodeKind,
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub a: Endpoint,
    pub b: Endpoint,
    pub params: LinkParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

#[derive(Debug, Default, Clone)]
pub struct Topology {
    controllers: Vec<Controller>,
    hosts: Vec<HostSpec>,
    switches: Vec<String>,
    links: Vec<LinkSpec>,
    kinds: HashMap<String, NodeKind>,
    next_port: HashMap<String, u32>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_controller(&mut self, name: &str) -> Result<&Controller, TopologyError> {
        check_name(name)?;
        if self.controllers.iter().any(|c| c.name == name) || self.kinds.contains_key(name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }
        self.controllers.push(Controller {
            name: name.to_string(),
        });
        Ok(&self.controllers[self.controllers.len() - 1])
    }

    pub fn add_docker_host(&mut self, spec: HostSpec) -> Result<&HostSpec, TopologyError> {
        if spec.prefix_len == 0 || spec.prefix_len > 32 {
            return Err(TopologyError::InvalidPrefix(spec.prefix_len));
        }
        self.register(&spec.name, NodeKind::Host, 0)?;
        self.hosts.push(spec);
        Ok(&self.hosts[self.hosts.len() - 1])
    }

    pub fn add_switch(&mut self, name: &str) -> Result<&str, TopologyError> {
        self.register(name, NodeKind::Switch, 1)?;
        self.switches.push(name.to_string());
        Ok(self.switches[self.switches.len() - 1].as_str())
    }

    /// Connect two nodes; interfaces are named `<node>-eth<port>`
    pub fn add_link(&mut self, a: &str, b: &str, params: LinkParams) -> Result<LinkId, TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLink(a.to_string()));
        }
        let kind_a = self.kind_of(a)?;
        let kind_b = self.kind_of(b)?;

        let if_a = interface_name(a, self.peek_port(a));
        let if_b = interface_name(b, self.peek_port(b));
        for name in [&if_a, &if_b] {
            if name.len() > MAX_IFNAME_LEN {
                return Err(TopologyError::InterfaceNameTooLong(name.clone()));
            }
        }
        self.bump_port(a);
        self.bump_port(b);

        self.links.push(LinkSpec {
            a: Endpoint {
                node: a.to_string(),
                kind: kind_a,
                interface: if_a,
            },
            b: Endpoint {
                node: b.to_string(),
                kind: kind_b,
                interface: if_b,
            },
            params,
        });
        Ok(LinkId(self.links.len() - 1))
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    pub fn host(&self, name: &str) -> Option<&HostSpec> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn switches(&self) -> &[String] {
        &self.switches
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&LinkSpec> {
        self.links.get(id.0)
    }

    fn register(&mut self, name: &str, kind: NodeKind, first_port: u32) -> Result<(), TopologyError> {
        check_name(name)?;
        if self.kinds.contains_key(name) || self.controllers.iter().any(|c| c.name == name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }
        self.kinds.insert(name.to_string(), kind);
        self.next_port.insert(name.to_string(), first_port);
        Ok(())
    }

    fn kind_of(&self, name: &str) -> Result<NodeKind, TopologyError> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))
    }

    fn peek_port(&self, name: &str) -> u32 {
        self.next_port.get(name).copied().unwrap_or(0)
    }

    fn bump_port(&mut self, name: &str) {
        if let Some(port) = self.next_port.get_mut(name) {
            *port += 1;
        }
    }
}

fn check_name(name: &str) -> Result<(), TopologyError> {
    if name.is_empty() {
        Err(TopologyError::EmptyName)
    } else {
        Ok(())
    }
}

fn interface_name(node: &str, port: u32) -> String {
    format!("{}-eth{}", node, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_hosts() -> Topology {
        let mut topo = Topology::new();
        topo.add_controller("c0").unwrap();
        topo.add_docker_host(HostSpec::new("server", "img_s", Ipv4Addr::new(10, 0, 0, 1)))
            .unwrap();
        topo.add_docker_host(HostSpec::new("client", "img_c", Ipv4Addr::new(10, 0, 0, 2)))
            .unwrap();
        topo.add_switch("s1").unwrap();
        topo.add_switch("s2").unwrap();
        topo
    }

    #[test]
    fn test_interface_numbering() {
        let mut topo = two_hosts();
        let l1 = topo.add_link("s1", "server", LinkParams::unshaped()).unwrap();
        let l2 = topo.add_link("s1", "s2", LinkParams::shaped(10.0, 10.0)).unwrap();
        let l3 = topo.add_link("s2", "client", LinkParams::unshaped()).unwrap();

        let l1 = topo.link(l1).unwrap();
        assert_eq!((l1.a.interface.as_str(), l1.b.interface.as_str()), ("s1-eth1", "server-eth0"));
        let l2 = topo.link(l2).unwrap();
        assert_eq!((l2.a.interface.as_str(), l2.b.interface.as_str()), ("s1-eth2", "s2-eth1"));
        assert_eq!(l2.params, LinkParams::shaped(10.0, 10.0));
        let l3 = topo.link(l3).unwrap();
        assert_eq!((l3.a.interface.as_str(), l3.b.interface.as_str()), ("s2-eth2", "client-eth0"));
        assert_eq!(l3.b.kind, NodeKind::Host);
    }

    #[test]
    fn test_rejects_bad_links() {
        let mut topo = two_hosts();
        assert_eq!(
            topo.add_link("s1", "nowhere", LinkParams::unshaped()),
            Err(TopologyError::UnknownNode("nowhere".into()))
        );
        assert_eq!(
            topo.add_link("s1", "s1", LinkParams::unshaped()),
            Err(TopologyError::SelfLink("s1".into()))
        );
        // controllers are not link endpoints
        assert!(topo.add_link("c0", "s1", LinkParams::unshaped()).is_err());
        assert!(topo.links().is_empty());
    }

    #[test]
    fn test_rejects_duplicates_and_empty_names() {
        let mut topo = two_hosts();
        assert_eq!(
            topo.add_switch("server").unwrap_err(),
            TopologyError::DuplicateNode("server".into())
        );
        assert_eq!(
            topo.add_switch("c0").unwrap_err(),
            TopologyError::DuplicateNode("c0".into())
        );
        assert_eq!(topo.add_switch("").unwrap_err(), TopologyError::EmptyName);
    }

    #[test]
    fn test_interface_name_length_limit() {
        let mut topo = Topology::new();
        topo.add_switch("s1").unwrap();
        topo.add_switch("a-very-long-sw").unwrap();
        let err = topo
            .add_link("s1", "a-very-long-sw", LinkParams::unshaped())
            .unwrap_err();
        assert_eq!(err, TopologyError::InterfaceNameTooLong("a-very-long-sw-eth1".into()));
        assert_eq!(err.to_string(), "interface name a-very-long-sw-eth1 exceeds 15 bytes");
        // ports are not consumed by a rejected link
        topo.add_switch("s2").unwrap();
        let id = topo.add_link("s1", "s2", LinkParams::unshaped()).unwrap();
        assert_eq!(topo.link(id).unwrap().a.interface, "s1-eth1");
    }

    #[test]
    fn test_host_cidr_and_prefix_validation() {
        let host = HostSpec::new("server", "img", Ipv4Addr::new(10, 0, 0, 1)).with_hostname("server");
        assert_eq!(host.cidr(), "10.0.0.1/8");
        assert_eq!(host.hostname.as_deref(), Some("server"));

        let mut bad = HostSpec::new("h", "img", Ipv4Addr::new(10, 0, 0, 3));
        bad.prefix_len = 33;
        assert_eq!(
            Topology::new().add_docker_host(bad).unwrap_err(),
            TopologyError::InvalidPrefix(33)
        );
    }
}
