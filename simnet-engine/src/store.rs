//! State Store: the single in-memory source of truth for network topology
//! and for the last known state of every node.
//!
//! Reads are synchronous snapshots. Fetch actions call the node's service,
//! then commit the result on completion; the last commit wins. Concurrent
//! fetches of the same `(node, field)` are serialised through a per-key
//! async lock, so two refreshes never interleave their request and commit.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use simnet_core::{
    BitcoinNode, LightningNode, Network, NetworkError, NetworkId, NetworksFile, Node, Status,
    TapNode,
};

use crate::error::EngineError;
use crate::locator::ServiceLocator;
use crate::services::{
    ChainInfo, ContainerRuntime, DecodeAddressRequest, LightningNodeBalances,
    LightningNodeChannel, LightningNodeInfo, LightningNodePeer, TapAddress, TapAsset,
    TapAssetRoot, TapBalance, WalletInfo,
};

/// Identifies a node across networks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub network: NetworkId,
    pub name: String,
}

impl NodeKey {
    pub fn new(network: NetworkId, name: impl Into<String>) -> Self {
        Self {
            network,
            name: name.into(),
        }
    }

    pub fn of(node: &Node) -> Self {
        Self::new(node.network_id(), node.name())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.name)
    }
}

/// A cached piece of node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ChainInfo,
    WalletInfo,
    NodeInfo,
    Balances,
    Channels,
    Peers,
    Assets,
    AssetBalances,
    AssetRoots,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Field::ChainInfo => "chain info",
            Field::WalletInfo => "wallet info",
            Field::NodeInfo => "node info",
            Field::Balances => "balances",
            Field::Channels => "channels",
            Field::Peers => "peers",
            Field::Assets => "assets",
            Field::AssetBalances => "asset balances",
            Field::AssetRoots => "asset roots",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitcoinState {
    pub chain_info: Option<ChainInfo>,
    pub wallet_info: Option<WalletInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightningState {
    pub info: Option<LightningNodeInfo>,
    pub balances: Option<LightningNodeBalances>,
    pub channels: Option<Vec<LightningNodeChannel>>,
    pub peers: Option<Vec<LightningNodePeer>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapState {
    pub assets: Option<Vec<TapAsset>>,
    pub balances: Option<Vec<TapBalance>>,
    pub roots: Option<Vec<TapAssetRoot>>,
}

/// Outcome of [`StateStore::get_all_info`]. Successful fields are already
/// committed when this is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllInfoReport {
    pub node: String,
    pub succeeded: Vec<Field>,
    pub failed: Vec<(Field, String)>,
}

impl AllInfoReport {
    fn record<T>(&mut self, field: Field, result: Result<T, EngineError>) {
        match result {
            Ok(_) => self.succeeded.push(field),
            Err(err) => {
                tracing::warn!(node = %self.node, field = %field, error = %err, "fetch failed");
                self.failed.push((field, err.to_string()));
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialFetchFailure` when any field failed.
    pub fn into_result(self) -> Result<Vec<Field>, EngineError> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        Err(EngineError::PartialFetchFailure {
            node: self.node,
            succeeded: self.succeeded,
            failed: self.failed,
        })
    }
}

type FieldLock = Arc<tokio::sync::Mutex<()>>;

pub struct StateStore {
    locator: Arc<ServiceLocator>,
    networks: RwLock<Vec<Network>>,
    charts: RwLock<BTreeMap<NetworkId, serde_json::Value>>,
    bitcoin: RwLock<HashMap<NodeKey, BitcoinState>>,
    lightning: RwLock<HashMap<NodeKey, LightningState>>,
    tap: RwLock<HashMap<NodeKey, TapState>>,
    field_locks: Mutex<HashMap<(NodeKey, Field), FieldLock>>,
}

impl StateStore {
    pub fn new(locator: Arc<ServiceLocator>) -> Self {
        Self {
            locator,
            networks: RwLock::new(Vec::new()),
            charts: RwLock::new(BTreeMap::new()),
            bitcoin: RwLock::new(HashMap::new()),
            lightning: RwLock::new(HashMap::new()),
            tap: RwLock::new(HashMap::new()),
            field_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Loads persisted networks through the runtime. Containers are not
    /// tracked across restarts, so every status starts as `Stopped`.
    pub async fn init(
        locator: Arc<ServiceLocator>,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Self, EngineError> {
        let file = runtime.load_networks().await.map_err(EngineError::Runtime)?;
        let store = Self::new(locator);
        store.replace(file);
        Ok(store)
    }

    /// Replaces topology and charts wholesale and clears cached node state.
    pub fn replace(&self, file: NetworksFile) {
        let mut networks = file.networks;
        for network in &mut networks {
            network.set_all_status(Status::Stopped);
        }
        tracing::info!(networks = networks.len(), "loaded networks");
        *self.networks.write() = networks;
        *self.charts.write() = file.charts;
        self.bitcoin.write().clear();
        self.lightning.write().clear();
        self.tap.write().clear();
        self.field_locks.lock().clear();
    }

    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.locator
    }

    // -----------------------------------------------------------------------
    // Topology snapshots
    // -----------------------------------------------------------------------

    pub fn networks(&self) -> Vec<Network> {
        self.networks.read().clone()
    }

    pub fn network(&self, id: NetworkId) -> Result<Network, EngineError> {
        self.networks
            .read()
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or(EngineError::Network(NetworkError::NetworkNotFound(id)))
    }

    pub fn chart(&self, id: NetworkId) -> Option<serde_json::Value> {
        self.charts.read().get(&id).cloned()
    }

    /// Stores the host's chart layout for a network verbatim.
    pub fn set_chart(&self, id: NetworkId, chart: serde_json::Value) {
        self.charts.write().insert(id, chart);
    }

    /// Snapshot in persisted form.
    pub fn networks_file(&self) -> NetworksFile {
        NetworksFile {
            networks: self.networks(),
            charts: self.charts.read().clone(),
            ..NetworksFile::default()
        }
    }

    pub(crate) fn insert_network(&self, network: Network) {
        self.networks.write().push(network);
    }

    /// Removes a network with its chart and all node state.
    pub(crate) fn remove_network(&self, id: NetworkId) -> Option<Network> {
        let removed = {
            let mut networks = self.networks.write();
            let idx = networks.iter().position(|n| n.id == id)?;
            networks.remove(idx)
        };
        self.charts.write().remove(&id);
        self.remove_network_state(id);
        Some(removed)
    }

    /// Applies `f` to the network under the write lock.
    pub(crate) fn update_network<R>(
        &self,
        id: NetworkId,
        f: impl FnOnce(&mut Network) -> R,
    ) -> Result<R, EngineError> {
        let mut networks = self.networks.write();
        let network = networks
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(EngineError::Network(NetworkError::NetworkNotFound(id)))?;
        Ok(f(network))
    }

    pub(crate) fn set_network_status(&self, id: NetworkId, status: Status) {
        if self.update_network(id, |n| n.status = status).is_err() {
            tracing::debug!(network = id, "status update for removed network ignored");
        }
    }

    pub(crate) fn set_node_status(&self, id: NetworkId, name: &str, status: Status) {
        let found = self
            .update_network(id, |n| n.set_node_status(name, status))
            .unwrap_or(false);
        if !found {
            tracing::debug!(network = id, node = %name, "status update for removed node ignored");
        }
    }

    pub(crate) fn set_all_status(&self, id: NetworkId, status: Status) {
        if self.update_network(id, |n| n.set_all_status(status)).is_err() {
            tracing::debug!(network = id, "status update for removed network ignored");
        }
    }

    // -----------------------------------------------------------------------
    // Node state snapshots
    // -----------------------------------------------------------------------

    pub fn bitcoin_state(&self, network: NetworkId, name: &str) -> Option<BitcoinState> {
        self.bitcoin.read().get(&NodeKey::new(network, name)).cloned()
    }

    pub fn lightning_state(&self, network: NetworkId, name: &str) -> Option<LightningState> {
        self.lightning.read().get(&NodeKey::new(network, name)).cloned()
    }

    pub fn tap_state(&self, network: NetworkId, name: &str) -> Option<TapState> {
        self.tap.read().get(&NodeKey::new(network, name)).cloned()
    }

    pub fn remove_node_state(&self, network: NetworkId, name: &str) {
        let key = NodeKey::new(network, name);
        self.bitcoin.write().remove(&key);
        self.lightning.write().remove(&key);
        self.tap.write().remove(&key);
        self.field_locks.lock().retain(|(k, _), _| *k != key);
    }

    pub fn remove_network_state(&self, network: NetworkId) {
        self.bitcoin.write().retain(|k, _| k.network != network);
        self.lightning.write().retain(|k, _| k.network != network);
        self.tap.write().retain(|k, _| k.network != network);
        self.field_locks.lock().retain(|(k, _), _| k.network != network);
    }

    /// Writes a fetch result into the node's state, unless the node was
    /// removed while the fetch was in flight.
    fn commit<S: Default>(
        &self,
        states: &RwLock<HashMap<NodeKey, S>>,
        key: NodeKey,
        apply: impl FnOnce(&mut S),
    ) {
        // Held across the write so a concurrent removal either happens
        // before the check or clears the entry after it.
        let networks = self.networks.read();
        let exists = networks
            .iter()
            .any(|n| n.id == key.network && n.contains_node(&key.name));
        if !exists {
            tracing::debug!(node = %key, "fetch result for removed node dropped");
            return;
        }
        apply(states.write().entry(key).or_default());
    }

    fn field_lock(&self, key: &NodeKey, field: Field) -> FieldLock {
        let mut locks = self.field_locks.lock();
        Arc::clone(locks.entry((key.clone(), field)).or_default())
    }

    // -----------------------------------------------------------------------
    // Bitcoin fetches
    // -----------------------------------------------------------------------

    pub async fn get_blockchain_info(&self, node: &BitcoinNode) -> Result<ChainInfo, EngineError> {
        let service = self.locator.bitcoin(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::ChainInfo);
        let _guard = lock.lock().await;
        let info = service
            .get_blockchain_info(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.bitcoin, key, |state| state.chain_info = Some(info.clone()));
        Ok(info)
    }

    pub async fn get_wallet_info(&self, node: &BitcoinNode) -> Result<WalletInfo, EngineError> {
        let service = self.locator.bitcoin(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::WalletInfo);
        let _guard = lock.lock().await;
        let info = service
            .get_wallet_info(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.bitcoin, key, |state| state.wallet_info = Some(info.clone()));
        Ok(info)
    }

    // -----------------------------------------------------------------------
    // Lightning fetches
    // -----------------------------------------------------------------------

    pub async fn get_info(&self, node: &LightningNode) -> Result<LightningNodeInfo, EngineError> {
        let service = self.locator.lightning(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::NodeInfo);
        let _guard = lock.lock().await;
        let info = service
            .get_info(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.lightning, key, |state| state.info = Some(info.clone()));
        Ok(info)
    }

    pub async fn get_balances(
        &self,
        node: &LightningNode,
    ) -> Result<LightningNodeBalances, EngineError> {
        let service = self.locator.lightning(node)?;
        let backend = self
            .network(node.common.network_id)
            .ok()
            .and_then(|n| n.bitcoin_node(&node.backend_name).cloned());
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::Balances);
        let _guard = lock.lock().await;
        let balances = service
            .get_balances(node, backend.as_ref())
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.lightning, key, |state| state.balances = Some(balances.clone()));
        Ok(balances)
    }

    pub async fn get_channels(
        &self,
        node: &LightningNode,
    ) -> Result<Vec<LightningNodeChannel>, EngineError> {
        let service = self.locator.lightning(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::Channels);
        let _guard = lock.lock().await;
        let channels = service
            .get_channels(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.lightning, key, |state| state.channels = Some(channels.clone()));
        Ok(channels)
    }

    pub async fn get_peers(
        &self,
        node: &LightningNode,
    ) -> Result<Vec<LightningNodePeer>, EngineError> {
        let service = self.locator.lightning(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::Peers);
        let _guard = lock.lock().await;
        let peers = service
            .get_peers(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.lightning, key, |state| state.peers = Some(peers.clone()));
        Ok(peers)
    }

    // -----------------------------------------------------------------------
    // Asset fetches
    // -----------------------------------------------------------------------

    pub async fn get_assets(&self, node: &TapNode) -> Result<Vec<TapAsset>, EngineError> {
        let service = self.locator.tap(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::Assets);
        let _guard = lock.lock().await;
        let assets = service
            .list_assets(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.tap, key, |state| state.assets = Some(assets.clone()));
        Ok(assets)
    }

    pub async fn get_asset_balances(&self, node: &TapNode) -> Result<Vec<TapBalance>, EngineError> {
        let service = self.locator.tap(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::AssetBalances);
        let _guard = lock.lock().await;
        let balances = service
            .list_balances(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.tap, key, |state| state.balances = Some(balances.clone()));
        Ok(balances)
    }

    pub async fn get_asset_roots(&self, node: &TapNode) -> Result<Vec<TapAssetRoot>, EngineError> {
        let service = self.locator.tap(node)?;
        let key = NodeKey::new(node.common.network_id, &node.common.name);
        let lock = self.field_lock(&key, Field::AssetRoots);
        let _guard = lock.lock().await;
        let roots = service
            .asset_roots(node)
            .await
            .map_err(EngineError::service(&node.common.name))?;
        self.commit(&self.tap, key, |state| state.roots = Some(roots.clone()));
        Ok(roots)
    }

    /// Decodes an asset address on `node`. Nothing is cached.
    pub async fn decode_address(
        &self,
        node: &TapNode,
        address: &str,
    ) -> Result<TapAddress, EngineError> {
        let request = DecodeAddressRequest {
            address: address.to_string(),
        };
        self.locator
            .tap(node)?
            .decode_address(node, &request)
            .await
            .map_err(EngineError::service(&node.common.name))
    }

    // -----------------------------------------------------------------------
    // Aggregate
    // -----------------------------------------------------------------------

    /// Fetches every field of a node concurrently. Each success is committed
    /// independently, so one failing field never discards another's result.
    ///
    /// Fails early only when no service serves the node at all.
    pub async fn get_all_info(&self, node: &Node) -> Result<AllInfoReport, EngineError> {
        self.locator.resolve(node)?;
        let mut report = AllInfoReport {
            node: node.name().to_string(),
            ..AllInfoReport::default()
        };
        match node {
            Node::Bitcoin(n) => {
                let (chain, wallet) =
                    tokio::join!(self.get_blockchain_info(n), self.get_wallet_info(n));
                report.record(Field::ChainInfo, chain);
                report.record(Field::WalletInfo, wallet);
            }
            Node::Lightning(n) => {
                let (info, balances, channels) =
                    tokio::join!(self.get_info(n), self.get_balances(n), self.get_channels(n));
                report.record(Field::NodeInfo, info);
                report.record(Field::Balances, balances);
                report.record(Field::Channels, channels);
            }
            Node::Tap(n) => {
                let (assets, balances) =
                    tokio::join!(self.get_assets(n), self.get_asset_balances(n));
                report.record(Field::Assets, assets);
                report.record(Field::AssetBalances, balances);
            }
        }
        Ok(report)
    }
}
