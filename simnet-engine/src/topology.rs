//! Topology actions. Every successful change is written back through
//! [`ContainerRuntime::save_networks`](crate::services::ContainerRuntime::save_networks).

use serde::{Deserialize, Serialize};

use simnet_core::{
    networks, Implementation, Network, NetworkId, Node, NodeImages, NodeKind, Platform, Status,
};

use crate::error::EngineError;
use crate::lifecycle::{find_node, Orchestrator};

/// How many nodes of each kind a new network gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub bitcoin: usize,
    pub lightning: usize,
    pub tap: usize,
}

impl Default for NodeCounts {
    fn default() -> Self {
        Self {
            bitcoin: 1,
            lightning: 2,
            tap: 0,
        }
    }
}

/// A node to add to an existing network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub implementation: Implementation,
    /// Latest known version when `None`.
    pub version: Option<String>,
    /// Id of a registered custom image to run instead of the managed one.
    pub custom_image: Option<String>,
    /// Bitcoin backend (lightning nodes) or lightning peer (asset nodes).
    pub attach_to: Option<String>,
}

impl NodeSpec {
    pub fn new(implementation: Implementation) -> Self {
        Self {
            implementation,
            version: None,
            custom_image: None,
            attach_to: None,
        }
    }
}

impl Orchestrator {
    /// Creates a network of bitcoind, LND and tapd nodes on the latest
    /// versions.
    pub async fn create_network(
        &self,
        name: &str,
        description: &str,
        counts: NodeCounts,
        images: &NodeImages,
    ) -> Result<Network, EngineError> {
        let id = networks::next_network_id(&self.store.networks_file());
        let mut network = Network::new(id, name, self.config.networks_dir.join(id.to_string()));
        network.description = description.to_string();

        let platform = Platform::current();
        let defaults = [
            (Implementation::Bitcoind, counts.bitcoin),
            (Implementation::Lnd, counts.lightning),
            (Implementation::Tapd, counts.tap),
        ];
        for (implementation, count) in defaults {
            let version = implementation.latest_version();
            for _ in 0..count {
                let (implementation, docker) =
                    images.resolve(implementation, version, None, platform)?;
                match implementation.kind() {
                    NodeKind::Bitcoin => {
                        network.add_bitcoin_node(implementation, version, docker)?;
                    }
                    NodeKind::Lightning => {
                        network.add_lightning_node(implementation, version, docker, None)?;
                    }
                    NodeKind::Tap => {
                        network.add_tap_node(implementation, version, docker, None)?;
                    }
                }
            }
        }
        network.validate()?;

        self.runtime
            .save_compose_file(&network)
            .await
            .map_err(EngineError::Runtime)?;
        self.store.insert_network(network.clone());
        self.persist().await?;
        tracing::info!(network = id, name = %name, nodes = network.node_names().count(), "network created");
        Ok(network)
    }

    /// Adds a node. If the network is running the node is started too.
    pub async fn add_node(
        &self,
        id: NetworkId,
        spec: NodeSpec,
        images: &NodeImages,
    ) -> Result<Node, EngineError> {
        let version = spec
            .version
            .clone()
            .unwrap_or_else(|| spec.implementation.latest_version().to_string());
        let (implementation, docker) = images.resolve(
            spec.implementation,
            &version,
            spec.custom_image.as_deref(),
            Platform::current(),
        )?;
        let attach_to = spec.attach_to.as_deref();

        let node = self.store.update_network(id, |network| {
            let node: Node = match implementation.kind() {
                NodeKind::Bitcoin => network
                    .add_bitcoin_node(implementation, &version, docker)?
                    .clone()
                    .into(),
                NodeKind::Lightning => network
                    .add_lightning_node(implementation, &version, docker, attach_to)?
                    .clone()
                    .into(),
                NodeKind::Tap => network
                    .add_tap_node(implementation, &version, docker, attach_to)?
                    .clone()
                    .into(),
            };
            Ok::<_, EngineError>(node)
        })??;

        let network = self.store.network(id)?;
        self.runtime
            .save_compose_file(&network)
            .await
            .map_err(EngineError::Runtime)?;
        self.persist().await?;
        tracing::info!(network = id, node = %node.name(), implementation = %implementation, "node added");

        if network.status == Status::Started {
            self.start_node(id, node.name()).await?;
        }
        Ok(node)
    }

    /// Removes a node and its container. Rejected with `DanglingReference`
    /// before any container action when another node depends on it.
    pub async fn remove_node(&self, id: NetworkId, name: &str) -> Result<Node, EngineError> {
        let network = self.store.network(id)?;
        let dependents = network.dependents_of(name);
        if !dependents.is_empty() {
            return Err(EngineError::DanglingReference {
                node: name.to_string(),
                dependents,
            });
        }
        let node = find_node(&network, name)?;

        self.runtime
            .remove_node(&network, &node)
            .await
            .map_err(EngineError::Runtime)?;
        self.store.update_network(id, |n| n.remove_node(name))??;
        self.store.remove_node_state(id, name);

        let network = self.store.network(id)?;
        self.runtime
            .save_compose_file(&network)
            .await
            .map_err(EngineError::Runtime)?;
        self.persist().await?;
        tracing::info!(network = id, node = %name, "node removed");
        Ok(node)
    }

    /// Stops the network if needed, then forgets it along with its chart and
    /// node state.
    pub async fn delete_network(&self, id: NetworkId) -> Result<Network, EngineError> {
        let network = self.store.network(id)?;
        if network.status != Status::Stopped {
            let report = self.stop_network(id).await?;
            if !report.is_clean() {
                tracing::warn!(network = id, failures = report.failed.len(), "network stopped with failures before delete");
            }
        }
        let removed = self
            .store
            .remove_network(id)
            .ok_or(EngineError::Network(simnet_core::NetworkError::NetworkNotFound(id)))?;
        self.persist().await?;
        tracing::info!(network = id, name = %removed.name, "network deleted");
        Ok(removed)
    }

    pub async fn rename_network(
        &self,
        id: NetworkId,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), EngineError> {
        self.store.update_network(id, |n| {
            n.name = name.to_string();
            if let Some(description) = description {
                n.description = description.to_string();
            }
        })?;
        self.persist().await?;
        tracing::info!(network = id, name = %name, "network renamed");
        Ok(())
    }
}
