//! Domain types for a simulated network.
//!
//! All path fields use `PathBuf`. Every persisted type round-trips through
//! serde + serde_json field-for-field.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Implementation, NodeKind};

pub type NetworkId = u32;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a network or of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting,
    Started,
    Stopping,
    #[default]
    Stopped,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Starting => write!(f, "starting"),
            Status::Started => write!(f, "started"),
            Status::Stopping => write!(f, "stopping"),
            Status::Stopped => write!(f, "stopped"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// Automatic block production interval. Persisted as whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u64", try_from = "u64")]
pub enum AutoMineMode {
    #[default]
    Off,
    Every30s,
    Every1m,
    Every5m,
    Every10m,
}

impl AutoMineMode {
    pub fn seconds(self) -> u64 {
        match self {
            AutoMineMode::Off => 0,
            AutoMineMode::Every30s => 30,
            AutoMineMode::Every1m => 60,
            AutoMineMode::Every5m => 300,
            AutoMineMode::Every10m => 600,
        }
    }

    /// `None` when auto-mining is disabled.
    pub fn interval(self) -> Option<Duration> {
        match self.seconds() {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl From<AutoMineMode> for u64 {
    fn from(mode: AutoMineMode) -> Self {
        mode.seconds()
    }
}

impl TryFrom<u64> for AutoMineMode {
    type Error = String;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            0 => Ok(AutoMineMode::Off),
            30 => Ok(AutoMineMode::Every30s),
            60 => Ok(AutoMineMode::Every1m),
            300 => Ok(AutoMineMode::Every5m),
            600 => Ok(AutoMineMode::Every10m),
            other => Err(format!("unsupported auto-mine interval: {other}s")),
        }
    }
}

impl FromStr for AutoMineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(AutoMineMode::Off),
            "30s" => Ok(AutoMineMode::Every30s),
            "1m" => Ok(AutoMineMode::Every1m),
            "5m" => Ok(AutoMineMode::Every5m),
            "10m" => Ok(AutoMineMode::Every10m),
            other => Err(format!(
                "unknown auto-mine mode '{other}'; expected: off, 30s, 1m, 5m, 10m"
            )),
        }
    }
}

impl fmt::Display for AutoMineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoMineMode::Off => write!(f, "off"),
            AutoMineMode::Every30s => write!(f, "30s"),
            AutoMineMode::Every1m => write!(f, "1m"),
            AutoMineMode::Every5m => write!(f, "5m"),
            AutoMineMode::Every10m => write!(f, "10m"),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Container image and startup command. An empty `image` means the
/// implementation's managed image; an empty `command` means its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerRef {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: String,
}

/// Fields every node kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCommon {
    pub id: u32,
    pub network_id: NetworkId,
    pub name: String,
    pub implementation: Implementation,
    pub version: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub docker: DockerRef,
}

impl NodeCommon {
    /// Name of the docker container backing this node.
    pub fn container_name(&self) -> String {
        format!("simnet-n{}-{}", self.network_id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
}

impl Default for RpcCredentials {
    fn default() -> Self {
        Self {
            user: "polaruser".to_string(),
            password: "polarpass".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinPorts {
    pub rpc: u16,
    pub p2p: u16,
    pub zmq_block: u16,
    pub zmq_tx: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningPorts {
    pub rest: u16,
    pub grpc: u16,
    pub p2p: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPorts {
    pub rest: u16,
    pub grpc: u16,
}

/// TLS certificate and auth token locations inside the network directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsPaths {
    pub tls_cert: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macaroon: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    /// Names of other bitcoin nodes this node peers with.
    #[serde(default)]
    pub peers: Vec<String>,
    pub ports: BitcoinPorts,
    #[serde(default)]
    pub credentials: RpcCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    pub backend_name: String,
    pub ports: LightningPorts,
    pub paths: TlsPaths,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapNode {
    #[serde(flatten)]
    pub common: NodeCommon,
    /// The lightning node this asset daemon is attached to.
    pub lightning_name: String,
    pub backend_name: String,
    pub ports: TapPorts,
    pub paths: TlsPaths,
}

/// A node of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Bitcoin(BitcoinNode),
    Lightning(LightningNode),
    Tap(TapNode),
}

impl Node {
    pub fn common(&self) -> &NodeCommon {
        match self {
            Node::Bitcoin(n) => &n.common,
            Node::Lightning(n) => &n.common,
            Node::Tap(n) => &n.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut NodeCommon {
        match self {
            Node::Bitcoin(n) => &mut n.common,
            Node::Lightning(n) => &mut n.common,
            Node::Tap(n) => &mut n.common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Bitcoin(_) => NodeKind::Bitcoin,
            Node::Lightning(_) => NodeKind::Lightning,
            Node::Tap(_) => NodeKind::Tap,
        }
    }

    pub fn status(&self) -> Status {
        self.common().status
    }

    pub fn network_id(&self) -> NetworkId {
        self.common().network_id
    }

    /// The bitcoin node this node depends on, if any.
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            Node::Bitcoin(_) => None,
            Node::Lightning(n) => Some(&n.backend_name),
            Node::Tap(n) => Some(&n.backend_name),
        }
    }
}

impl From<BitcoinNode> for Node {
    fn from(n: BitcoinNode) -> Self {
        Node::Bitcoin(n)
    }
}

impl From<LightningNode> for Node {
    fn from(n: LightningNode) -> Self {
        Node::Lightning(n)
    }
}

impl From<TapNode> for Node {
    fn from(n: TapNode) -> Self {
        Node::Tap(n)
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Nodes grouped by kind, each in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkNodes {
    #[serde(default)]
    pub bitcoin: Vec<BitcoinNode>,
    #[serde(default)]
    pub lightning: Vec<LightningNode>,
    #[serde(default)]
    pub tap: Vec<TapNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    /// Working directory holding the compose file and node volumes.
    pub path: PathBuf,
    #[serde(default)]
    pub auto_mine_mode: AutoMineMode,
    #[serde(default)]
    pub nodes: NetworkNodes,
}

/// Current on-disk format of [`NetworksFile`].
pub const NETWORKS_FILE_VERSION: &str = "3.0.0";

/// Root of the persisted networks file.
///
/// Chart layouts are opaque to the core; they are stored and returned
/// exactly as the host application wrote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworksFile {
    pub version: String,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub charts: BTreeMap<NetworkId, serde_json::Value>,
}

impl Default for NetworksFile {
    fn default() -> Self {
        Self {
            version: NETWORKS_FILE_VERSION.to_string(),
            networks: vec![],
            charts: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mine_serializes_as_seconds() {
        let json = serde_json::to_string(&AutoMineMode::Every5m).expect("serialize");
        assert_eq!(json, "300");
        let back: AutoMineMode = serde_json::from_str("30").expect("deserialize");
        assert_eq!(back, AutoMineMode::Every30s);
        assert!(serde_json::from_str::<AutoMineMode>("45").is_err());
    }

    #[test]
    fn auto_mine_interval() {
        assert_eq!(AutoMineMode::Off.interval(), None);
        assert_eq!(
            AutoMineMode::Every1m.interval(),
            Some(Duration::from_secs(60))
        );
        assert_eq!("10m".parse::<AutoMineMode>().unwrap(), AutoMineMode::Every10m);
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::Started.to_string(), "started");
        assert_eq!(Status::default(), Status::Stopped);
    }

    #[test]
    fn empty_networks_file_has_current_version() {
        let file = NetworksFile::default();
        assert_eq!(file.version, NETWORKS_FILE_VERSION);
        assert!(file.networks.is_empty());
    }
}
