//! Topology queries and mutations on a [`Network`].
//!
//! The graph is small (tens of nodes), so every lookup is a linear scan over
//! the per-kind vectors. Insertion order is significant: the first bitcoin
//! node drives auto-mining and the first lightning node's backend confirms
//! asset mints.

use std::path::PathBuf;

use crate::catalog::{Implementation, NodeKind};
use crate::error::NetworkError;
use crate::types::{
    BitcoinNode, BitcoinPorts, DockerRef, LightningNode, LightningPorts, Network, NetworkId,
    NetworkNodes, Node, NodeCommon, RpcCredentials, Status, TapNode, TapPorts, TlsPaths,
};

const LIGHTNING_NAMES: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy",
    "mallory", "niaj", "oscar", "peggy", "rupert", "sybil", "trent", "victor", "walter",
];

const BITCOIN_RPC_PORT: u16 = 18443;
const BITCOIN_P2P_PORT: u16 = 19444;
const BITCOIN_ZMQ_BLOCK_PORT: u16 = 28334;
const BITCOIN_ZMQ_TX_PORT: u16 = 29335;
const LIGHTNING_REST_PORT: u16 = 8081;
const LIGHTNING_GRPC_PORT: u16 = 10001;
const LIGHTNING_P2P_PORT: u16 = 9735;
const TAP_REST_PORT: u16 = 8289;
const TAP_GRPC_PORT: u16 = 12029;

impl Network {
    pub fn new(id: NetworkId, name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            status: Status::Stopped,
            path,
            auto_mine_mode: Default::default(),
            nodes: NetworkNodes::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// All node names, in tier order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .bitcoin
            .iter()
            .map(|n| n.common.name.as_str())
            .chain(self.nodes.lightning.iter().map(|n| n.common.name.as_str()))
            .chain(self.nodes.tap.iter().map(|n| n.common.name.as_str()))
    }

    /// Statuses of every node, in tier order.
    pub fn node_statuses(&self) -> impl Iterator<Item = Status> + '_ {
        self.nodes
            .bitcoin
            .iter()
            .map(|n| n.common.status)
            .chain(self.nodes.lightning.iter().map(|n| n.common.status))
            .chain(self.nodes.tap.iter().map(|n| n.common.status))
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.node_names().any(|n| n == name)
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        if let Some(n) = self.bitcoin_node(name) {
            return Some(Node::Bitcoin(n.clone()));
        }
        if let Some(n) = self.lightning_node(name) {
            return Some(Node::Lightning(n.clone()));
        }
        self.tap_node(name).map(|n| Node::Tap(n.clone()))
    }

    pub fn bitcoin_node(&self, name: &str) -> Option<&BitcoinNode> {
        self.nodes.bitcoin.iter().find(|n| n.common.name == name)
    }

    pub fn lightning_node(&self, name: &str) -> Option<&LightningNode> {
        self.nodes.lightning.iter().find(|n| n.common.name == name)
    }

    pub fn tap_node(&self, name: &str) -> Option<&TapNode> {
        self.nodes.tap.iter().find(|n| n.common.name == name)
    }

    /// Nodes of one tier, cloned into [`Node`].
    pub fn tier(&self, kind: NodeKind) -> Vec<Node> {
        match kind {
            NodeKind::Bitcoin => self.nodes.bitcoin.iter().cloned().map(Node::from).collect(),
            NodeKind::Lightning => self.nodes.lightning.iter().cloned().map(Node::from).collect(),
            NodeKind::Tap => self.nodes.tap.iter().cloned().map(Node::from).collect(),
        }
    }

    /// The bitcoin backend a lightning or asset node declares.
    pub fn backend_of(&self, node: &Node) -> Option<&BitcoinNode> {
        node.backend_name().and_then(|b| self.bitcoin_node(b))
    }

    /// Backend of the first lightning node in the network.
    ///
    /// Asset mints are confirmed here regardless of which lightning node
    /// the minting asset node is attached to.
    pub fn first_lightning_backend(&self) -> Option<&BitcoinNode> {
        self.nodes
            .lightning
            .first()
            .and_then(|ln| self.bitcoin_node(&ln.backend_name))
    }

    /// Names of nodes whose backend or lightning peer is `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let lightning = self
            .nodes
            .lightning
            .iter()
            .filter(|n| n.backend_name == name)
            .map(|n| n.common.name.clone());
        let tap = self
            .nodes
            .tap
            .iter()
            .filter(|n| n.backend_name == name || n.lightning_name == name)
            .map(|n| n.common.name.clone());
        lightning.chain(tap).collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Checks name uniqueness and that every declared reference resolves.
    pub fn validate(&self) -> Result<(), NetworkError> {
        let mut seen = std::collections::HashSet::new();
        for name in self.node_names() {
            if !seen.insert(name) {
                return Err(NetworkError::DuplicateNodeName {
                    network: self.id,
                    node: name.to_string(),
                });
            }
        }
        for ln in &self.nodes.lightning {
            self.require_backend(&ln.common.name, &ln.backend_name)?;
        }
        for tap in &self.nodes.tap {
            self.require_backend(&tap.common.name, &tap.backend_name)?;
            if self.lightning_node(&tap.lightning_name).is_none() {
                return Err(NetworkError::MissingLightningPeer {
                    node: tap.common.name.clone(),
                    lightning: tap.lightning_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn require_backend(&self, node: &str, backend: &str) -> Result<(), NetworkError> {
        if self.bitcoin_node(backend).is_none() {
            return Err(NetworkError::MissingBackend {
                node: node.to_string(),
                backend: backend.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Sets the network status and the status of every node.
    pub fn set_all_status(&mut self, status: Status) {
        self.status = status;
        for n in &mut self.nodes.bitcoin {
            n.common.status = status;
        }
        for n in &mut self.nodes.lightning {
            n.common.status = status;
        }
        for n in &mut self.nodes.tap {
            n.common.status = status;
        }
    }

    /// Returns `false` if no node has that name.
    pub fn set_node_status(&mut self, name: &str, status: Status) -> bool {
        if let Some(common) = self.common_mut(name) {
            common.status = status;
            return true;
        }
        false
    }

    fn common_mut(&mut self, name: &str) -> Option<&mut NodeCommon> {
        if let Some(n) = self.nodes.bitcoin.iter_mut().find(|n| n.common.name == name) {
            return Some(&mut n.common);
        }
        if let Some(n) = self.nodes.lightning.iter_mut().find(|n| n.common.name == name) {
            return Some(&mut n.common);
        }
        self.nodes
            .tap
            .iter_mut()
            .find(|n| n.common.name == name)
            .map(|n| &mut n.common)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Removes a node, rejecting the removal if another node depends on it.
    pub fn remove_node(&mut self, name: &str) -> Result<Node, NetworkError> {
        let dependents = self.dependents_of(name);
        if !dependents.is_empty() {
            return Err(NetworkError::DanglingReference {
                node: name.to_string(),
                dependents,
            });
        }
        let node = self.node(name).ok_or_else(|| NetworkError::NodeNotFound {
            network: self.id,
            node: name.to_string(),
        })?;
        match node.kind() {
            NodeKind::Bitcoin => {
                self.nodes.bitcoin.retain(|n| n.common.name != name);
                for n in &mut self.nodes.bitcoin {
                    n.peers.retain(|p| p != name);
                }
            }
            NodeKind::Lightning => self.nodes.lightning.retain(|n| n.common.name != name),
            NodeKind::Tap => self.nodes.tap.retain(|n| n.common.name != name),
        }
        Ok(node)
    }

    /// Adds a bitcoin node peered with the previously added one.
    pub fn add_bitcoin_node(
        &mut self,
        implementation: Implementation,
        version: &str,
        docker: DockerRef,
    ) -> Result<&BitcoinNode, NetworkError> {
        self.require_kind(implementation, NodeKind::Bitcoin)?;
        let id = self.next_node_id(implementation)?;
        let ports = BitcoinPorts {
            rpc: node_port(implementation, BITCOIN_RPC_PORT, id)?,
            p2p: node_port(implementation, BITCOIN_P2P_PORT, id)?,
            zmq_block: node_port(implementation, BITCOIN_ZMQ_BLOCK_PORT, id)?,
            zmq_tx: node_port(implementation, BITCOIN_ZMQ_TX_PORT, id)?,
        };
        // Numbered past the highest existing backend so removals never
        // cause a suffixed duplicate.
        let index = self
            .nodes
            .bitcoin
            .iter()
            .filter_map(|n| n.common.name.strip_prefix("backend")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        let name = self.unique_name(&format!("backend{}", index + 1));
        let prev = self.nodes.bitcoin.last().map(|n| n.common.name.clone());
        if let Some(p) = self.nodes.bitcoin.last_mut() {
            p.peers.push(name.clone());
        }
        let common = self.common(id, name, implementation, version, docker);
        let idx = self.nodes.bitcoin.len();
        self.nodes.bitcoin.push(BitcoinNode {
            common,
            peers: prev.into_iter().collect(),
            ports,
            credentials: RpcCredentials::default(),
        });
        Ok(&self.nodes.bitcoin[idx])
    }

    /// Adds a lightning node backed by `backend`, or the first bitcoin node.
    pub fn add_lightning_node(
        &mut self,
        implementation: Implementation,
        version: &str,
        docker: DockerRef,
        backend: Option<&str>,
    ) -> Result<&LightningNode, NetworkError> {
        self.require_kind(implementation, NodeKind::Lightning)?;
        let backend_name = self.pick_backend(implementation, backend)?;
        let id = self.next_node_id(implementation)?;
        let ports = LightningPorts {
            rest: node_port(implementation, LIGHTNING_REST_PORT, id)?,
            grpc: node_port(implementation, LIGHTNING_GRPC_PORT, id)?,
            p2p: node_port(implementation, LIGHTNING_P2P_PORT, id)?,
        };
        let base = LIGHTNING_NAMES
            .get(self.nodes.lightning.len())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("node{}", self.nodes.lightning.len() + 1));
        let name = self.unique_name(&base);
        let volume = self
            .path
            .join("volumes")
            .join(implementation.repo_name())
            .join(&name);
        let paths = match implementation {
            Implementation::Lnd | Implementation::Litd => TlsPaths {
                tls_cert: volume.join("tls.cert"),
                macaroon: Some(
                    volume.join("data/chain/bitcoin/regtest/admin.macaroon"),
                ),
            },
            Implementation::CLightning => TlsPaths {
                tls_cert: volume.join("lightningd/regtest/ca.pem"),
                macaroon: None,
            },
            _ => TlsPaths {
                tls_cert: volume.join("tls.cert"),
                macaroon: None,
            },
        };
        let common = self.common(id, name, implementation, version, docker);
        let idx = self.nodes.lightning.len();
        self.nodes.lightning.push(LightningNode {
            common,
            backend_name,
            ports,
            paths,
        });
        Ok(&self.nodes.lightning[idx])
    }

    /// Adds an asset node attached to `lightning`, or the first LND-based
    /// lightning node. The backend is inherited from that lightning node.
    pub fn add_tap_node(
        &mut self,
        implementation: Implementation,
        version: &str,
        docker: DockerRef,
        lightning: Option<&str>,
    ) -> Result<&TapNode, NetworkError> {
        self.require_kind(implementation, NodeKind::Tap)?;
        let peer = match lightning {
            Some(name) => self.lightning_node(name),
            None => self.nodes.lightning.iter().find(|n| {
                matches!(
                    n.common.implementation,
                    Implementation::Lnd | Implementation::Litd
                )
            }),
        };
        let peer = peer.ok_or_else(|| NetworkError::InvalidNode {
            implementation,
            reason: "an LND lightning node is required".to_string(),
        })?;
        let lightning_name = peer.common.name.clone();
        let backend_name = peer.backend_name.clone();
        let id = self.next_node_id(implementation)?;
        let ports = TapPorts {
            rest: node_port(implementation, TAP_REST_PORT, id)?,
            grpc: node_port(implementation, TAP_GRPC_PORT, id)?,
        };
        let name = self.unique_name(&format!("{lightning_name}-tap"));
        let volume = self.path.join("volumes").join("tapd").join(&name);
        let common = self.common(id, name, implementation, version, docker);
        let idx = self.nodes.tap.len();
        self.nodes.tap.push(TapNode {
            common,
            lightning_name,
            backend_name,
            ports,
            paths: TlsPaths {
                tls_cert: volume.join("tls.cert"),
                macaroon: Some(volume.join("data/regtest/admin.macaroon")),
            },
        });
        Ok(&self.nodes.tap[idx])
    }

    fn pick_backend(
        &self,
        implementation: Implementation,
        backend: Option<&str>,
    ) -> Result<String, NetworkError> {
        match backend {
            Some(name) => {
                self.bitcoin_node(name)
                    .ok_or_else(|| NetworkError::MissingBackend {
                        node: implementation.id().to_string(),
                        backend: name.to_string(),
                    })?;
                Ok(name.to_string())
            }
            None => self
                .nodes
                .bitcoin
                .first()
                .map(|n| n.common.name.clone())
                .ok_or_else(|| NetworkError::InvalidNode {
                    implementation,
                    reason: "a bitcoin node is required".to_string(),
                }),
        }
    }

    fn require_kind(&self, implementation: Implementation, kind: NodeKind) -> Result<(), NetworkError> {
        if implementation.kind() != kind {
            return Err(NetworkError::InvalidNode {
                implementation,
                reason: format!("it is a {} implementation, not {kind}", implementation.kind()),
            });
        }
        Ok(())
    }

    fn common(
        &self,
        id: u32,
        name: String,
        implementation: Implementation,
        version: &str,
        docker: DockerRef,
    ) -> NodeCommon {
        NodeCommon {
            id,
            network_id: self.id,
            name,
            implementation,
            version: version.to_string(),
            status: Status::Stopped,
            docker,
        }
    }

    fn next_node_id(&self, implementation: Implementation) -> Result<u32, NetworkError> {
        let ids = self
            .nodes
            .bitcoin
            .iter()
            .map(|n| n.common.id)
            .chain(self.nodes.lightning.iter().map(|n| n.common.id))
            .chain(self.nodes.tap.iter().map(|n| n.common.id));
        match ids.max() {
            None => Ok(0),
            Some(id) => id.checked_add(1).ok_or_else(|| NetworkError::InvalidNode {
                implementation,
                reason: "node ids are exhausted".to_string(),
            }),
        }
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.contains_node(base) {
            return base.to_string();
        }
        let mut i = 2;
        loop {
            let candidate = format!("{base}-{i}");
            if !self.contains_node(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }
}

/// Host port for node `id`, offset from the implementation's base port.
fn node_port(implementation: Implementation, base: u16, id: u32) -> Result<u16, NetworkError> {
    u16::try_from(id)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| NetworkError::InvalidNode {
            implementation,
            reason: format!("no host port left above {base} for node id {id}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Network {
        let mut net = Network::new(1, "test", PathBuf::from("/tmp/simnet/1"));
        net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
            .unwrap();
        net.add_lightning_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default(), None)
            .unwrap();
        net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), None)
            .unwrap();
        net
    }

    #[test]
    fn builders_produce_valid_graph() {
        let net = sample();
        net.validate().expect("valid");
        assert_eq!(
            net.node_names().collect::<Vec<_>>(),
            vec!["backend1", "alice", "alice-tap"]
        );
        let tap = net.tap_node("alice-tap").unwrap();
        assert_eq!(tap.backend_name, "backend1");
        assert_eq!(tap.lightning_name, "alice");
    }

    #[test]
    fn node_ids_and_ports_are_unique() {
        let net = sample();
        let ln = net.lightning_node("alice").unwrap();
        assert_eq!(ln.common.id, 1);
        assert_eq!(ln.ports.grpc, LIGHTNING_GRPC_PORT + 1);
    }

    #[test]
    fn bitcoin_nodes_peer_with_previous() {
        let mut net = sample();
        net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
            .unwrap();
        assert_eq!(net.bitcoin_node("backend1").unwrap().peers, vec!["backend2"]);
        assert_eq!(net.bitcoin_node("backend2").unwrap().peers, vec!["backend1"]);
    }

    #[test]
    fn remove_referenced_backend_is_rejected() {
        let mut net = sample();
        let err = net.remove_node("backend1").unwrap_err();
        match err {
            NetworkError::DanglingReference { node, dependents } => {
                assert_eq!(node, "backend1");
                assert_eq!(dependents, vec!["alice", "alice-tap"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(net.contains_node("backend1"));
    }

    #[test]
    fn remove_leaf_node() {
        let mut net = sample();
        let removed = net.remove_node("alice-tap").unwrap();
        assert_eq!(removed.kind(), NodeKind::Tap);
        assert!(!net.contains_node("alice-tap"));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut net = sample();
        let err = net
            .add_bitcoin_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default())
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidNode { .. }));
    }

    #[test]
    fn validate_catches_missing_backend() {
        let mut net = sample();
        net.nodes.lightning[0].backend_name = "invalid".into();
        assert!(matches!(
            net.validate(),
            Err(NetworkError::MissingBackend { .. })
        ));
    }

    #[test]
    fn backend_names_continue_past_removed_nodes() {
        let mut net = Network::new(1, "test", PathBuf::from("/tmp/simnet/1"));
        for _ in 0..2 {
            net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
                .unwrap();
        }
        net.remove_node("backend1").unwrap();

        let name = net
            .add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
            .unwrap()
            .common
            .name
            .clone();
        assert_eq!(name, "backend3");
        assert_eq!(net.bitcoin_node("backend2").unwrap().peers, vec!["backend3"]);
    }

    #[test]
    fn port_overflow_is_rejected_without_changes() {
        let mut net = sample();
        net.nodes.tap[0].common.id = 60_000;

        let err = net
            .add_lightning_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default(), None)
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidNode { implementation: Implementation::Lnd, .. }));
        let err = net
            .add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidNode { .. }));
        assert_eq!(net.node_names().count(), 3);
        assert!(net.bitcoin_node("backend1").unwrap().peers.is_empty());
    }

    #[test]
    fn exhausted_node_ids_are_rejected() {
        let mut net = sample();
        net.nodes.lightning[0].common.id = u32::MAX;

        let err = net
            .add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), None)
            .unwrap_err();
        assert!(err.to_string().contains("node ids are exhausted"), "{err}");
    }
}
