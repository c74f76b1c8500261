//! Contracts the engine consumes from node RPC clients and the container
//! runtime, plus the data they exchange.
//!
//! Concrete clients live in the host application. Every method takes the
//! node it targets; implementations derive endpoints and credentials from
//! the node's ports and TLS paths.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use simnet_core::{BitcoinNode, LightningNode, Network, NetworksFile, Node, TapNode};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Bitcoin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    pub best_block_hash: String,
    pub verification_progress: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub wallet_name: String,
    /// Confirmed balance in BTC.
    pub balance: f64,
    pub immature_balance: f64,
    pub tx_count: u64,
}

#[async_trait]
pub trait BitcoinService: Send + Sync {
    async fn wait_until_online(&self, node: &BitcoinNode) -> ServiceResult<()>;
    async fn create_default_wallet(&self, node: &BitcoinNode) -> ServiceResult<()>;
    async fn get_blockchain_info(&self, node: &BitcoinNode) -> ServiceResult<ChainInfo>;
    async fn get_wallet_info(&self, node: &BitcoinNode) -> ServiceResult<WalletInfo>;
    async fn get_new_address(&self, node: &BitcoinNode) -> ServiceResult<String>;
    /// Connects to every node named in `node.peers`.
    async fn connect_peers(&self, node: &BitcoinNode) -> ServiceResult<()>;
    /// Returns the hashes of the mined blocks.
    async fn mine(&self, num_blocks: u32, node: &BitcoinNode) -> ServiceResult<Vec<String>>;
    /// Sends `amount` BTC to `address`, returning the txid.
    async fn send_funds(
        &self,
        node: &BitcoinNode,
        address: &str,
        amount: f64,
    ) -> ServiceResult<String>;
}

// ---------------------------------------------------------------------------
// Lightning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodeInfo {
    pub pubkey: String,
    pub alias: String,
    /// `pubkey@host:port`, the address other nodes connect to.
    pub rpc_url: String,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
    pub block_height: u64,
    pub num_active_channels: u32,
    pub num_pending_channels: u32,
    pub num_inactive_channels: u32,
}

/// Wallet balances in sats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodeBalances {
    pub total: u64,
    pub confirmed: u64,
    pub unconfirmed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodeChannel {
    pub pending: bool,
    pub unique_id: String,
    pub channel_point: String,
    pub pubkey: String,
    pub capacity: u64,
    pub local_balance: u64,
    pub remote_balance: u64,
    pub status: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodePeer {
    pub pubkey: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodeChannelPoint {
    pub txid: String,
    pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningNodePayReceipt {
    pub amount: u64,
    pub preimage: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelOptions {
    pub to_rpc_url: String,
    pub amount: u64,
    pub is_private: bool,
}

#[async_trait]
pub trait LightningService: Send + Sync {
    async fn wait_until_online(&self, node: &LightningNode) -> ServiceResult<()>;
    async fn get_info(&self, node: &LightningNode) -> ServiceResult<LightningNodeInfo>;
    /// `backend` is the node's bitcoin backend when it is known; some
    /// implementations read on-chain balances through it.
    async fn get_balances(
        &self,
        node: &LightningNode,
        backend: Option<&BitcoinNode>,
    ) -> ServiceResult<LightningNodeBalances>;
    async fn get_new_address(&self, node: &LightningNode) -> ServiceResult<String>;
    async fn get_channels(&self, node: &LightningNode) -> ServiceResult<Vec<LightningNodeChannel>>;
    async fn get_peers(&self, node: &LightningNode) -> ServiceResult<Vec<LightningNodePeer>>;
    async fn connect_peers(&self, node: &LightningNode, rpc_urls: &[String]) -> ServiceResult<()>;
    async fn open_channel(
        &self,
        from: &LightningNode,
        options: &OpenChannelOptions,
    ) -> ServiceResult<LightningNodeChannelPoint>;
    async fn close_channel(&self, node: &LightningNode, channel_point: &str) -> ServiceResult<()>;
    async fn create_invoice(
        &self,
        node: &LightningNode,
        amount: u64,
        memo: Option<&str>,
    ) -> ServiceResult<String>;
    async fn pay_invoice(
        &self,
        node: &LightningNode,
        invoice: &str,
        amount: Option<u64>,
    ) -> ServiceResult<LightningNodePayReceipt>;
}

// ---------------------------------------------------------------------------
// Taproot assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    #[default]
    Normal,
    Collectible,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapAsset {
    pub id: String,
    pub name: String,
    pub asset_type: AssetType,
    pub amount: u64,
    pub genesis_point: String,
    pub anchor_outpoint: String,
    pub group_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapBalance {
    pub id: String,
    pub name: String,
    pub asset_type: AssetType,
    pub balance: u64,
    pub genesis_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAssetRequest {
    pub asset_type: AssetType,
    pub name: String,
    pub amount: u64,
    pub enable_emission: bool,
}

/// A minted asset waiting in the node's pending batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAssetResponse {
    pub batch_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeBatchResponse {
    pub batch_key: String,
    pub batch_txid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapAddress {
    pub encoded: String,
    pub asset_id: String,
    pub asset_type: AssetType,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapSendAssetReceipt {
    pub transfer_txid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeAddressRequest {
    pub address: String,
}

/// Merkle-sum root of one asset in the node's universe tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapAssetRoot {
    pub id: String,
    pub name: String,
    pub root_sum: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncUniverseResponse {
    pub synced_universes: u32,
}

#[async_trait]
pub trait TapService: Send + Sync {
    async fn wait_until_online(&self, node: &TapNode) -> ServiceResult<()>;
    async fn list_assets(&self, node: &TapNode) -> ServiceResult<Vec<TapAsset>>;
    async fn list_balances(&self, node: &TapNode) -> ServiceResult<Vec<TapBalance>>;
    async fn mint_asset(
        &self,
        node: &TapNode,
        request: &MintAssetRequest,
    ) -> ServiceResult<MintAssetResponse>;
    async fn finalize_batch(&self, node: &TapNode) -> ServiceResult<FinalizeBatchResponse>;
    async fn new_address(
        &self,
        node: &TapNode,
        asset_id: &str,
        amount: u64,
    ) -> ServiceResult<TapAddress>;
    async fn send_asset(&self, node: &TapNode, address: &str)
        -> ServiceResult<TapSendAssetReceipt>;
    async fn decode_address(
        &self,
        node: &TapNode,
        request: &DecodeAddressRequest,
    ) -> ServiceResult<TapAddress>;
    async fn asset_roots(&self, node: &TapNode) -> ServiceResult<Vec<TapAssetRoot>>;
    /// Syncs asset roots from the universe server at `host` (`name:port`).
    async fn sync_universe(&self, node: &TapNode, host: &str)
        -> ServiceResult<SyncUniverseResponse>;
}

// ---------------------------------------------------------------------------
// Container runtime
// ---------------------------------------------------------------------------

/// Container lifecycle plus persistence of the networks file.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Writes the network's container definitions into `network.path`.
    async fn save_compose_file(&self, network: &Network) -> ServiceResult<()>;
    async fn start(&self, network: &Network) -> ServiceResult<()>;
    async fn stop(&self, network: &Network) -> ServiceResult<()>;
    async fn start_node(&self, network: &Network, node: &Node) -> ServiceResult<()>;
    async fn stop_node(&self, network: &Network, node: &Node) -> ServiceResult<()>;
    /// Stops and deletes the node's container.
    async fn remove_node(&self, network: &Network, node: &Node) -> ServiceResult<()>;
    async fn save_networks(&self, file: &NetworksFile) -> ServiceResult<()>;
    async fn load_networks(&self) -> ServiceResult<NetworksFile>;
}
