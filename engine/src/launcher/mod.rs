//! Node bootstrap launchers
//!
//! Three actors chained through observables:
//!
//! - [`NodeInfoWorker`] publishes the local node identity.
//! - [`OverlayLauncher`] waits for the node, brings up the overlay network and
//!   publishes its status.
//! - [`ServiceLauncher`] follows `(node, overlay)` and (re)creates the cluster
//!   service whenever either changes.
//!
//! A launcher whose attempt fails resets its own observable, so everything
//! downstream sees "absent" instead of a stale success. Retrying is left to
//! the next upstream change.
//!
//! The overlay and service work itself is delegated to [`OverlayNetwork`] and
//! [`ServiceBackend`] implementations; the binary uses the dry-run backends.

pub mod node;
pub mod overlay;
pub mod service;

pub use node::{NodeInfoHandle, NodeInfoWorker};
pub use overlay::OverlayLauncher;
pub use service::ServiceLauncher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::actor::Mailbox;
use crate::observable::ObservableRef;

/// Grid the node belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInfo {
    pub name: String,
    pub subnet: Subnet,
    pub initial_size: u32,
}

/// Identity of the local node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    pub node_number: u32,
    pub overlay_ip: Ipv4Addr,
    pub grid: GridInfo,
    pub updated_at: DateTime<Utc>,
}

impl NodeInfo {
    /// Whether this node is one of the grid's initial cluster members
    pub fn initial_member(&self) -> bool {
        self.node_number >= 1 && self.node_number <= self.grid.initial_size
    }
}

/// Overlay network state published by [`OverlayLauncher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayStatus {
    pub interface: String,
    pub overlay_ip: Ipv4Addr,
    pub ready_at: DateTime<Utc>,
}

/// How the node takes part in the cluster service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Member,
    Proxy,
}

/// Everything a backend needs to create the cluster service for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub overlay_ip: Ipv4Addr,
    pub cluster_token: String,
    pub membership: Membership,
    pub initial_cluster: Vec<Ipv4Addr>,
}

impl ServiceSpec {
    pub fn for_node(node: &NodeInfo, overlay: &OverlayStatus) -> Result<Self, EngineError> {
        let membership = if node.initial_member() {
            Membership::Member
        } else {
            Membership::Proxy
        };

        Ok(Self {
            name: format!("node-{}", node.node_number),
            overlay_ip: overlay.overlay_ip,
            cluster_token: node.grid.name.clone(),
            membership,
            initial_cluster: initial_cluster(&node.grid.subnet, node.grid.initial_size)?,
        })
    }

    /// Service command line
    pub fn command(&self) -> Vec<String> {
        let client = format!("http://{}:2379", self.overlay_ip);
        let peer = format!("http://{}:2380", self.overlay_ip);
        let cluster = self
            .initial_cluster
            .iter()
            .enumerate()
            .map(|(i, ip)| format!("node-{}=http://{}:2380", i + 1, ip))
            .collect::<Vec<_>>()
            .join(",");

        let mut cmd = vec![
            "--name".to_string(),
            self.name.clone(),
            "--listen-client-urls".to_string(),
            format!("http://127.0.0.1:2379,{}", client),
            "--initial-cluster".to_string(),
            cluster,
        ];

        match self.membership {
            Membership::Member => cmd.extend([
                "--listen-peer-urls".to_string(),
                peer.clone(),
                "--advertise-client-urls".to_string(),
                client,
                "--initial-advertise-peer-urls".to_string(),
                peer,
                "--initial-cluster-token".to_string(),
                self.cluster_token.clone(),
            ]),
            Membership::Proxy => cmd.extend(["--proxy".to_string(), "on".to_string()]),
        }

        cmd
    }
}

/// Cluster service state published by [`ServiceLauncher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub running: bool,
    pub membership: Membership,
    pub started_at: DateTime<Utc>,
}

/// IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// 10.81.0.0/16
    pub const DEFAULT_GRID: Subnet = Subnet {
        network: Ipv4Addr::new(10, 81, 0, 0),
        prefix: 16,
    };

    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, EngineError> {
        if prefix > 32 {
            return Err(EngineError::Config(format!("invalid prefix length /{}", prefix)));
        }
        let mask = Self::mask(prefix);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(network) & mask),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Address of the `index`th host in the subnet
    pub fn host_at(&self, index: u32) -> Result<Ipv4Addr, EngineError> {
        let size = 1u64 << (32 - u32::from(self.prefix));
        if u64::from(index) >= size {
            return Err(EngineError::Config(format!(
                "host {} is outside subnet {}",
                index, self
            )));
        }
        Ok(Ipv4Addr::from(u32::from(self.network) + index))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask(self.prefix) == u32::from(self.network)
    }

    fn mask(prefix: u8) -> u32 {
        match prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::Config(format!("invalid subnet '{}'", s));
        let (network, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let network = network.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
        Self::new(network, prefix)
    }
}

impl Serialize for Subnet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Subnet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Addresses of the grid's initial cluster members: hosts 1..=size
pub fn initial_cluster(subnet: &Subnet, size: u32) -> Result<Vec<Ipv4Addr>, EngineError> {
    (1..=size).map(|i| subnet.host_at(i)).collect()
}

/// Brings up the overlay network for a node
#[async_trait]
pub trait OverlayNetwork: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure(&self, node: &NodeInfo) -> anyhow::Result<OverlayStatus>;
}

/// Creates or repairs the cluster service container
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure(&self, spec: &ServiceSpec) -> anyhow::Result<ServiceState>;
}

/// Overlay backend that only logs what it would do
#[derive(Debug, Default)]
pub struct DryRunOverlay;

#[async_trait]
impl OverlayNetwork for DryRunOverlay {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn ensure(&self, node: &NodeInfo) -> anyhow::Result<OverlayStatus> {
        if !node.grid.subnet.contains(node.overlay_ip) {
            anyhow::bail!(
                "overlay ip {} is outside grid subnet {}",
                node.overlay_ip,
                node.grid.subnet
            );
        }

        info!("[dry-run] attaching {} to overlay {}", node.name, node.grid.subnet);

        Ok(OverlayStatus {
            interface: "overlay0".to_string(),
            overlay_ip: node.overlay_ip,
            ready_at: Utc::now(),
        })
    }
}

/// Service backend that only logs what it would do
#[derive(Debug, Default)]
pub struct DryRunService;

#[async_trait]
impl ServiceBackend for DryRunService {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn ensure(&self, spec: &ServiceSpec) -> anyhow::Result<ServiceState> {
        info!("[dry-run] creating service {} ({:?})", spec.name, spec.membership);
        debug!("[dry-run] command: {}", spec.command().join(" "));

        Ok(ServiceState {
            name: spec.name.clone(),
            running: true,
            membership: spec.membership,
            started_at: Utc::now(),
        })
    }
}

/// Control message for launchers
#[derive(Debug)]
pub(crate) enum Control {
    Stop,
}

/// Handle to a running launcher
pub struct LauncherHandle<V> {
    name: Arc<str>,
    control: Mailbox<Control>,
    observable: ObservableRef<V>,
}

impl<V: Send + Sync + 'static> LauncherHandle<V> {
    pub(crate) fn new(name: &str, control: Mailbox<Control>, observable: ObservableRef<V>) -> Self {
        Self {
            name: Arc::from(name),
            control,
            observable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observable_ref(&self) -> ObservableRef<V> {
        self.observable.clone()
    }

    /// Ask the launcher to stop after its current step
    pub fn stop(&self) {
        if self.control.send(Control::Stop).is_err() {
            debug!("launcher {} already stopped", self.name);
        }
    }
}

impl<V> Clone for LauncherHandle<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            control: self.control.clone(),
            observable: self.observable.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node(number: u32) -> NodeInfo {
        NodeInfo {
            id: format!("node-id-{}", number),
            name: format!("node-{}", number),
            node_number: number,
            overlay_ip: Ipv4Addr::new(10, 81, 0, number as u8),
            grid: GridInfo {
                name: "test".to_string(),
                subnet: "10.81.0.0/16".parse().unwrap(),
                initial_size: 3,
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_subnet_parse_and_hosts() {
        let subnet: Subnet = "10.81.3.7/16".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 81, 0, 0));
        assert_eq!(subnet.to_string(), "10.81.0.0/16");
        assert_eq!(subnet.host_at(1).unwrap(), Ipv4Addr::new(10, 81, 0, 1));
        assert_eq!(subnet.host_at(256).unwrap(), Ipv4Addr::new(10, 81, 1, 0));
        assert!(subnet.contains(Ipv4Addr::new(10, 81, 200, 1)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 82, 0, 1)));
    }

    #[test]
    fn test_subnet_rejects_garbage() {
        assert!("10.81.0.0".parse::<Subnet>().is_err());
        assert!("10.81.0.0/33".parse::<Subnet>().is_err());
        assert!("nope/8".parse::<Subnet>().is_err());
    }

    #[test]
    fn test_initial_cluster() {
        let subnet: Subnet = "10.81.0.0/16".parse().unwrap();
        let members = initial_cluster(&subnet, 3).unwrap();
        assert_eq!(
            members,
            vec![
                Ipv4Addr::new(10, 81, 0, 1),
                Ipv4Addr::new(10, 81, 0, 2),
                Ipv4Addr::new(10, 81, 0, 3),
            ]
        );

        let tiny: Subnet = "192.168.0.0/30".parse().unwrap();
        assert!(initial_cluster(&tiny, 4).is_err());
    }

    #[test]
    fn test_service_spec_membership() {
        let overlay = OverlayStatus {
            interface: "overlay0".to_string(),
            overlay_ip: Ipv4Addr::new(10, 81, 0, 2),
            ready_at: Utc::now(),
        };

        let member = ServiceSpec::for_node(&node(2), &overlay).unwrap();
        assert_eq!(member.membership, Membership::Member);
        assert_eq!(member.name, "node-2");
        assert!(member.command().contains(&"--initial-cluster-token".to_string()));

        let proxy = ServiceSpec::for_node(&node(5), &overlay).unwrap();
        assert_eq!(proxy.membership, Membership::Proxy);
        assert!(proxy.command().ends_with(&["--proxy".to_string(), "on".to_string()]));
    }
}
