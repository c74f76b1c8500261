//! Recording mocks shared by the engine integration tests.
//!
//! Every mock call is appended to one [`Recorder`] as `method:target[:extra]`
//! so tests can assert on cross-service ordering.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use simnet_core::{
    BitcoinNode, DockerRef, Implementation, LightningNode, Network, NetworksFile, Node, TapNode,
};
use simnet_engine::services::{
    AssetType, BitcoinService, ChainInfo, ContainerRuntime, DecodeAddressRequest,
    FinalizeBatchResponse,
    LightningNodeBalances, LightningNodeChannel, LightningNodeChannelPoint, LightningNodeInfo,
    LightningNodePayReceipt, LightningNodePeer, LightningService, MintAssetRequest,
    MintAssetResponse, OpenChannelOptions, ServiceError, ServiceResult, SyncUniverseResponse,
    TapAddress, TapAsset, TapAssetRoot, TapBalance, TapSendAssetReceipt, TapService, WalletInfo,
};
use simnet_engine::{
    CompositeEngine, EngineConfig, Orchestrator, RetryPolicy, ServiceLocator, StateStore,
    VersionSupport,
};

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    /// `method` or `method:target` entries that fail every time.
    failures: Mutex<HashSet<String>>,
    /// `method:target` → remaining failures before success.
    flaky: Mutex<HashMap<String, u32>>,
    /// `method:target` entries that never complete.
    hangs: Mutex<HashSet<String>>,
    pub hang_started: Notify,
    /// `method` → artificial latency.
    delays: Mutex<HashMap<String, Duration>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    /// Lightning node → confirmed wallet balance in sats.
    balances: Mutex<HashMap<String, u64>>,
}

impl Recorder {
    pub fn fail(&self, key: &str) {
        self.failures.lock().insert(key.to_string());
    }

    pub fn fail_times(&self, key: &str, times: u32) {
        self.flaky.lock().insert(key.to_string(), times);
    }

    pub fn hang(&self, key: &str) {
        self.hangs.lock().insert(key.to_string());
    }

    pub fn delay(&self, method: &str, delay: Duration) {
        self.delays.lock().insert(method.to_string(), delay);
    }

    pub fn set_balance(&self, node: &str, sats: u64) {
        self.balances.lock().insert(node.to_string(), sats);
    }

    pub fn balance(&self, node: &str) -> u64 {
        self.balances.lock().get(node).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls that start with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.matching(prefix).len()
    }

    /// Index of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    pub fn max_in_flight(&self, key: &str) -> usize {
        self.max_in_flight.lock().get(key).copied().unwrap_or(0)
    }

    pub async fn invoke(&self, method: &str, target: &str, extra: Option<String>) -> ServiceResult<()> {
        let key = format!("{method}:{target}");
        let call = match extra {
            Some(extra) => format!("{key}:{extra}"),
            None => key.clone(),
        };
        self.calls.lock().push(call);

        if self.hangs.lock().contains(&key) {
            self.hang_started.notify_one();
            std::future::pending::<()>().await;
        }

        let delay = self.delays.lock().get(method).copied();
        if let Some(delay) = delay {
            {
                let mut in_flight = self.in_flight.lock();
                let current = in_flight.entry(key.clone()).or_default();
                *current += 1;
                let mut max = self.max_in_flight.lock();
                let peak = max.entry(key.clone()).or_default();
                *peak = (*peak).max(*current);
            }
            tokio::time::sleep(delay).await;
            if let Some(current) = self.in_flight.lock().get_mut(&key) {
                *current -= 1;
            }
        }

        if let Some(remaining) = self.flaky.lock().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::new(format!("{key} not ready")));
            }
        }
        let failures = self.failures.lock();
        if failures.contains(method) || failures.contains(&key) {
            return Err(ServiceError::new(format!("{key} failed")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node services
// ---------------------------------------------------------------------------

pub struct MockBitcoin(pub Arc<Recorder>);

#[async_trait]
impl BitcoinService for MockBitcoin {
    async fn wait_until_online(&self, node: &BitcoinNode) -> ServiceResult<()> {
        self.0.invoke("online", &node.common.name, None).await
    }

    async fn create_default_wallet(&self, node: &BitcoinNode) -> ServiceResult<()> {
        self.0.invoke("create_wallet", &node.common.name, None).await
    }

    async fn get_blockchain_info(&self, node: &BitcoinNode) -> ServiceResult<ChainInfo> {
        self.0.invoke("get_blockchain_info", &node.common.name, None).await?;
        Ok(ChainInfo {
            chain: "regtest".into(),
            blocks: 101,
            ..ChainInfo::default()
        })
    }

    async fn get_wallet_info(&self, node: &BitcoinNode) -> ServiceResult<WalletInfo> {
        self.0.invoke("get_wallet_info", &node.common.name, None).await?;
        Ok(WalletInfo {
            wallet_name: String::new(),
            balance: 50.0,
            ..WalletInfo::default()
        })
    }

    async fn get_new_address(&self, node: &BitcoinNode) -> ServiceResult<String> {
        self.0.invoke("btc_new_address", &node.common.name, None).await?;
        Ok(format!("bcrt1q{}", node.common.name))
    }

    async fn connect_peers(&self, node: &BitcoinNode) -> ServiceResult<()> {
        self.0.invoke("btc_connect_peers", &node.common.name, None).await
    }

    async fn mine(&self, num_blocks: u32, node: &BitcoinNode) -> ServiceResult<Vec<String>> {
        self.0
            .invoke("mine", &node.common.name, Some(num_blocks.to_string()))
            .await?;
        Ok((0..num_blocks).map(|i| format!("block{i}")).collect())
    }

    async fn send_funds(
        &self,
        node: &BitcoinNode,
        address: &str,
        amount: f64,
    ) -> ServiceResult<String> {
        self.0
            .invoke("send_funds", &node.common.name, Some(format!("{address}:{amount}")))
            .await?;
        Ok("txid-deposit".into())
    }
}

pub struct MockLightning(pub Arc<Recorder>);

pub fn rpc_url(name: &str) -> String {
    format!("{name}pubkey@{name}:9735")
}

#[async_trait]
impl LightningService for MockLightning {
    async fn wait_until_online(&self, node: &LightningNode) -> ServiceResult<()> {
        self.0.invoke("online", &node.common.name, None).await
    }

    async fn get_info(&self, node: &LightningNode) -> ServiceResult<LightningNodeInfo> {
        self.0.invoke("get_info", &node.common.name, None).await?;
        Ok(LightningNodeInfo {
            pubkey: format!("{}pubkey", node.common.name),
            alias: node.common.name.clone(),
            rpc_url: rpc_url(&node.common.name),
            synced_to_chain: true,
            ..LightningNodeInfo::default()
        })
    }

    async fn get_balances(
        &self,
        node: &LightningNode,
        backend: Option<&BitcoinNode>,
    ) -> ServiceResult<LightningNodeBalances> {
        let backend = backend.map(|b| b.common.name.clone()).unwrap_or_default();
        self.0
            .invoke("get_balances", &node.common.name, Some(backend))
            .await?;
        let confirmed = self.0.balance(&node.common.name);
        Ok(LightningNodeBalances {
            total: confirmed,
            confirmed,
            unconfirmed: 0,
        })
    }

    async fn get_new_address(&self, node: &LightningNode) -> ServiceResult<String> {
        self.0.invoke("ln_new_address", &node.common.name, None).await?;
        Ok(format!("bcrt1q{}", node.common.name))
    }

    async fn get_channels(&self, node: &LightningNode) -> ServiceResult<Vec<LightningNodeChannel>> {
        self.0.invoke("get_channels", &node.common.name, None).await?;
        Ok(vec![])
    }

    async fn get_peers(&self, node: &LightningNode) -> ServiceResult<Vec<LightningNodePeer>> {
        self.0.invoke("get_peers", &node.common.name, None).await?;
        Ok(vec![])
    }

    async fn connect_peers(&self, node: &LightningNode, rpc_urls: &[String]) -> ServiceResult<()> {
        self.0
            .invoke("ln_connect_peers", &node.common.name, Some(rpc_urls.join(",")))
            .await
    }

    async fn open_channel(
        &self,
        from: &LightningNode,
        options: &OpenChannelOptions,
    ) -> ServiceResult<LightningNodeChannelPoint> {
        self.0
            .invoke(
                "open_channel",
                &from.common.name,
                Some(format!("{}:{}", options.to_rpc_url, options.amount)),
            )
            .await?;
        Ok(LightningNodeChannelPoint {
            txid: "txid-channel".into(),
            index: 0,
        })
    }

    async fn close_channel(&self, node: &LightningNode, channel_point: &str) -> ServiceResult<()> {
        self.0
            .invoke("close_channel", &node.common.name, Some(channel_point.to_string()))
            .await
    }

    async fn create_invoice(
        &self,
        node: &LightningNode,
        amount: u64,
        _memo: Option<&str>,
    ) -> ServiceResult<String> {
        self.0
            .invoke("create_invoice", &node.common.name, Some(amount.to_string()))
            .await?;
        Ok(format!("lnbcrt{amount}{}", node.common.name))
    }

    async fn pay_invoice(
        &self,
        node: &LightningNode,
        invoice: &str,
        _amount: Option<u64>,
    ) -> ServiceResult<LightningNodePayReceipt> {
        self.0
            .invoke("pay_invoice", &node.common.name, Some(invoice.to_string()))
            .await?;
        Ok(LightningNodePayReceipt {
            amount: 0,
            preimage: "preimage".into(),
            destination: String::new(),
        })
    }
}

pub struct MockTap(pub Arc<Recorder>);

#[async_trait]
impl TapService for MockTap {
    async fn wait_until_online(&self, node: &TapNode) -> ServiceResult<()> {
        self.0.invoke("online", &node.common.name, None).await
    }

    async fn list_assets(&self, node: &TapNode) -> ServiceResult<Vec<TapAsset>> {
        self.0.invoke("list_assets", &node.common.name, None).await?;
        Ok(vec![TapAsset {
            id: "asset1".into(),
            name: "LUSD".into(),
            asset_type: AssetType::Normal,
            amount: 1_000,
            ..TapAsset::default()
        }])
    }

    async fn list_balances(&self, node: &TapNode) -> ServiceResult<Vec<TapBalance>> {
        self.0.invoke("list_balances", &node.common.name, None).await?;
        Ok(vec![])
    }

    async fn mint_asset(
        &self,
        node: &TapNode,
        request: &MintAssetRequest,
    ) -> ServiceResult<MintAssetResponse> {
        self.0
            .invoke(
                "mint_asset",
                &node.common.name,
                Some(format!("{}:{}", request.name, request.amount)),
            )
            .await?;
        Ok(MintAssetResponse {
            batch_key: format!("batch-{}", node.common.name),
        })
    }

    async fn finalize_batch(&self, node: &TapNode) -> ServiceResult<FinalizeBatchResponse> {
        self.0.invoke("finalize_batch", &node.common.name, None).await?;
        Ok(FinalizeBatchResponse {
            batch_key: format!("batch-{}", node.common.name),
            batch_txid: "txid-batch".into(),
        })
    }

    async fn new_address(
        &self,
        node: &TapNode,
        asset_id: &str,
        amount: u64,
    ) -> ServiceResult<TapAddress> {
        self.0
            .invoke("tap_new_address", &node.common.name, Some(format!("{asset_id}:{amount}")))
            .await?;
        Ok(TapAddress {
            encoded: format!("taprt1{}", node.common.name),
            asset_id: asset_id.to_string(),
            asset_type: AssetType::Normal,
            amount,
        })
    }

    async fn send_asset(&self, node: &TapNode, address: &str) -> ServiceResult<TapSendAssetReceipt> {
        self.0
            .invoke("send_asset", &node.common.name, Some(address.to_string()))
            .await?;
        Ok(TapSendAssetReceipt {
            transfer_txid: "txid-transfer".into(),
        })
    }

    async fn decode_address(
        &self,
        node: &TapNode,
        request: &DecodeAddressRequest,
    ) -> ServiceResult<TapAddress> {
        self.0
            .invoke("decode_address", &node.common.name, Some(request.address.clone()))
            .await?;
        Ok(TapAddress {
            encoded: request.address.clone(),
            asset_id: "asset1".into(),
            asset_type: AssetType::Normal,
            amount: 100,
        })
    }

    async fn asset_roots(&self, node: &TapNode) -> ServiceResult<Vec<TapAssetRoot>> {
        self.0.invoke("asset_roots", &node.common.name, None).await?;
        Ok(vec![TapAssetRoot {
            id: "asset1".into(),
            name: "LUSD".into(),
            root_sum: 1_000,
        }])
    }

    async fn sync_universe(&self, node: &TapNode, host: &str) -> ServiceResult<SyncUniverseResponse> {
        self.0
            .invoke("sync_universe", &node.common.name, Some(host.to_string()))
            .await?;
        Ok(SyncUniverseResponse { synced_universes: 1 })
    }
}

// ---------------------------------------------------------------------------
// Container runtime
// ---------------------------------------------------------------------------

pub struct MockRuntime {
    rec: Arc<Recorder>,
    stored: Mutex<NetworksFile>,
}

impl MockRuntime {
    pub fn new(rec: Arc<Recorder>, stored: NetworksFile) -> Self {
        Self {
            rec,
            stored: Mutex::new(stored),
        }
    }

    /// Last file written through `save_networks`.
    pub fn stored(&self) -> NetworksFile {
        self.stored.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn save_compose_file(&self, network: &Network) -> ServiceResult<()> {
        self.rec.invoke("save_compose", &network.id.to_string(), None).await
    }

    async fn start(&self, network: &Network) -> ServiceResult<()> {
        self.rec.invoke("runtime_start", &network.id.to_string(), None).await
    }

    async fn stop(&self, network: &Network) -> ServiceResult<()> {
        self.rec.invoke("runtime_stop", &network.id.to_string(), None).await
    }

    async fn start_node(&self, _network: &Network, node: &Node) -> ServiceResult<()> {
        self.rec.invoke("start_node", node.name(), None).await
    }

    async fn stop_node(&self, _network: &Network, node: &Node) -> ServiceResult<()> {
        self.rec.invoke("stop_node", node.name(), None).await
    }

    async fn remove_node(&self, _network: &Network, node: &Node) -> ServiceResult<()> {
        self.rec.invoke("remove_node", node.name(), None).await
    }

    async fn save_networks(&self, file: &NetworksFile) -> ServiceResult<()> {
        self.rec.invoke("save_networks", "all", None).await?;
        *self.stored.lock() = file.clone();
        Ok(())
    }

    async fn load_networks(&self) -> ServiceResult<NetworksFile> {
        self.rec.invoke("load_networks", "all", None).await?;
        Ok(self.stored())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Harness {
    pub rec: Arc<Recorder>,
    pub runtime: Arc<MockRuntime>,
    pub store: Arc<StateStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub engine: CompositeEngine,
}

pub fn locator(rec: &Arc<Recorder>) -> ServiceLocator {
    ServiceLocator::new()
        .with_bitcoin(
            Implementation::Bitcoind,
            VersionSupport::Any,
            Arc::new(MockBitcoin(Arc::clone(rec))),
        )
        .with_lightning(
            Implementation::Lnd,
            VersionSupport::Any,
            Arc::new(MockLightning(Arc::clone(rec))),
        )
        .with_tap(
            Implementation::Tapd,
            VersionSupport::Any,
            Arc::new(MockTap(Arc::clone(rec))),
        )
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        readiness: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2,
        },
        networks_dir: PathBuf::from("/tmp/simnet-tests/networks"),
        ..EngineConfig::default()
    }
}

pub fn harness(networks: Vec<Network>) -> Harness {
    let rec = Arc::new(Recorder::default());
    let file = NetworksFile {
        networks,
        ..NetworksFile::default()
    };
    let runtime = Arc::new(MockRuntime::new(Arc::clone(&rec), file.clone()));
    let store = Arc::new(StateStore::new(Arc::new(locator(&rec))));
    store.replace(file);
    let config = test_config();
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        runtime.clone(),
        config.clone(),
    ));
    let engine = CompositeEngine::new(Arc::clone(&store), config);
    Harness {
        rec,
        runtime,
        store,
        orchestrator,
        engine,
    }
}

/// `bitcoin` bitcoind nodes, `lightning` LND nodes on the first backend and
/// `tap` tapd nodes on the first LND node.
pub fn network(id: u32, bitcoin: usize, lightning: usize, tap: usize) -> Network {
    let mut net = Network::new(id, format!("net{id}"), PathBuf::from(format!("/tmp/simnet/{id}")));
    for _ in 0..bitcoin {
        net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
            .expect("bitcoin node");
    }
    for _ in 0..lightning {
        net.add_lightning_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default(), None)
            .expect("lightning node");
    }
    for _ in 0..tap {
        net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), None)
            .expect("tap node");
    }
    net
}
