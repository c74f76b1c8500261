//! Composite Operation Engine: multi-step actions that span nodes.
//!
//! Steps run strictly in order. A failing step stops the operation and is
//! reported as [`EngineError::OperationStepFailure`] together with the steps
//! that already completed. Completed steps are never rolled back: funds
//! sent or blocks mined stay sent and mined.

use std::future::Future;
use std::sync::Arc;

use simnet_core::{BitcoinNode, LightningNode, Network, NetworkError, TapNode};

use crate::config::EngineConfig;
use crate::error::{EngineError, OperationStep};
use crate::services::{
    AssetType, FinalizeBatchResponse, LightningNodeBalances, LightningNodeChannelPoint,
    LightningNodePayReceipt, MintAssetRequest, MintAssetResponse, OpenChannelOptions,
    SyncUniverseResponse, TapAsset, TapSendAssetReceipt,
};
use crate::store::StateStore;

/// Port tapd serves gRPC on inside its container.
const TAPD_INTERNAL_GRPC_PORT: u16 = 10029;

const SATS_PER_BTC: f64 = 100_000_000.0;

// ---------------------------------------------------------------------------
// Step tracking
// ---------------------------------------------------------------------------

struct StepLog {
    operation: &'static str,
    committed: Vec<OperationStep>,
}

impl StepLog {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            committed: Vec::new(),
        }
    }

    async fn run<T, F>(&mut self, step: OperationStep, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        tracing::debug!(operation = self.operation, step = %step, "step started");
        match fut.await {
            Ok(value) => {
                self.committed.push(step);
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(operation = self.operation, step = %step, error = %err, "step failed");
                Err(EngineError::OperationStepFailure {
                    operation: self.operation,
                    step,
                    committed: self.committed.clone(),
                    source: Box::new(err),
                })
            }
        }
    }
}

fn backend_named(network: &Network, node: &str, backend: &str) -> Result<BitcoinNode, EngineError> {
    network.bitcoin_node(backend).cloned().ok_or_else(|| {
        EngineError::Network(NetworkError::MissingBackend {
            node: node.to_string(),
            backend: backend.to_string(),
        })
    })
}

// ---------------------------------------------------------------------------
// Payloads and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAssetPayload {
    pub node: TapNode,
    pub asset_type: AssetType,
    pub name: String,
    /// Ignored for collectibles, which always mint exactly one unit.
    pub amount: u64,
    pub enable_emission: bool,
    pub finalize: bool,
    pub auto_fund: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    pub batch: MintAssetResponse,
    pub finalized: Option<FinalizeBatchResponse>,
    /// Bitcoin node the confirmation blocks were mined on.
    pub confirmed_on: Option<String>,
    pub assets: Vec<TapAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOutcome {
    pub txid: String,
    pub balances: LightningNodeBalances,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelPayload {
    pub from: LightningNode,
    pub to: LightningNode,
    pub sats: u64,
    pub is_private: bool,
    pub auto_fund: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAssetPayload {
    pub from: TapNode,
    pub to: TapNode,
    pub asset_id: String,
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct CompositeEngine {
    store: Arc<StateStore>,
    config: EngineConfig,
}

impl CompositeEngine {
    pub fn new(store: Arc<StateStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Mints an asset on a tap node.
    ///
    /// With `finalize`, the pending batch is finalized and the confirmation
    /// blocks are mined on the backend of the network's *first* lightning
    /// node, whichever lightning node the tap node is paired with.
    pub async fn mint_asset(&self, payload: MintAssetPayload) -> Result<MintOutcome, EngineError> {
        let mut log = StepLog::new("mint_asset");
        let node = &payload.node;

        let (tap, backend, lightning) = log
            .run(OperationStep::Resolve, async {
                let tap = self.store.locator().tap(node)?;
                let network = self.store.network(node.common.network_id)?;
                let backend = network.first_lightning_backend().cloned().ok_or_else(|| {
                    let first = network
                        .nodes
                        .lightning
                        .first()
                        .map(|ln| ln.backend_name.clone())
                        .unwrap_or_default();
                    EngineError::Network(NetworkError::MissingBackend {
                        node: node.common.name.clone(),
                        backend: first,
                    })
                })?;
                let lightning = network.lightning_node(&node.lightning_name).cloned().ok_or_else(|| {
                    EngineError::Network(NetworkError::MissingLightningPeer {
                        node: node.common.name.clone(),
                        lightning: node.lightning_name.clone(),
                    })
                })?;
                Ok::<_, EngineError>((tap, backend, lightning))
            })
            .await?;

        if payload.auto_fund {
            log.run(OperationStep::AutoFund, self.ensure_funds(&lightning))
                .await?;
        }

        let request = MintAssetRequest {
            asset_type: payload.asset_type,
            name: payload.name.clone(),
            amount: match payload.asset_type {
                AssetType::Collectible => 1,
                AssetType::Normal => payload.amount,
            },
            enable_emission: payload.enable_emission,
        };
        let batch = log
            .run(OperationStep::Mint, async {
                tap.mint_asset(node, &request)
                    .await
                    .map_err(EngineError::service(&node.common.name))
            })
            .await?;
        tracing::info!(node = %node.common.name, asset = %payload.name, batch = %batch.batch_key, "asset minted");

        let mut finalized = None;
        let mut confirmed_on = None;
        if payload.finalize {
            let response = log
                .run(OperationStep::FinalizeBatch, async {
                    tap.finalize_batch(node)
                        .await
                        .map_err(EngineError::service(&node.common.name))
                })
                .await?;
            finalized = Some(response);
            log.run(OperationStep::MineConfirmations, self.mine(&backend))
                .await?;
            confirmed_on = Some(backend.common.name.clone());
        }

        // The mint is already submitted; a failed refresh leaves the last
        // known assets in place instead of failing the operation.
        let assets = match self.store.get_assets(node).await {
            Ok(assets) => assets,
            Err(err) => {
                tracing::warn!(node = %node.common.name, error = %err, "asset refresh after mint failed");
                self.store
                    .tap_state(node.common.network_id, &node.common.name)
                    .and_then(|state| state.assets)
                    .unwrap_or_default()
            }
        };
        Ok(MintOutcome {
            batch,
            finalized,
            confirmed_on,
            assets,
        })
    }

    /// Deposits into a lightning node's wallet from its own backend.
    pub async fn deposit_funds(
        &self,
        node: &LightningNode,
        sats: u64,
    ) -> Result<DepositOutcome, EngineError> {
        let mut log = StepLog::new("deposit_funds");
        let (lightning, bitcoin, backend) = log
            .run(OperationStep::Resolve, async {
                let lightning = self.store.locator().lightning(node)?;
                let network = self.store.network(node.common.network_id)?;
                let backend = backend_named(&network, &node.common.name, &node.backend_name)?;
                let bitcoin = self.store.locator().bitcoin(&backend)?;
                Ok::<_, EngineError>((lightning, bitcoin, backend))
            })
            .await?;

        let address = log
            .run(OperationStep::CreateAddress, async {
                lightning
                    .get_new_address(node)
                    .await
                    .map_err(EngineError::service(&node.common.name))
            })
            .await?;
        let amount = sats as f64 / SATS_PER_BTC;
        let txid = log
            .run(OperationStep::SendFunds, async {
                bitcoin
                    .send_funds(&backend, &address, amount)
                    .await
                    .map_err(EngineError::service(&backend.common.name))
            })
            .await?;
        log.run(OperationStep::MineConfirmations, self.mine(&backend))
            .await?;
        let balances = log
            .run(OperationStep::Refresh, self.store.get_balances(node))
            .await?;
        tracing::info!(node = %node.common.name, sats, txid = %txid, "funds deposited");
        Ok(DepositOutcome { txid, balances })
    }

    pub async fn open_channel(
        &self,
        payload: OpenChannelPayload,
    ) -> Result<LightningNodeChannelPoint, EngineError> {
        let mut log = StepLog::new("open_channel");
        let from = &payload.from;
        let to = &payload.to;
        let (lightning, backend) = log
            .run(OperationStep::Resolve, async {
                let lightning = self.store.locator().lightning(from)?;
                let network = self.store.network(from.common.network_id)?;
                let backend = backend_named(&network, &from.common.name, &from.backend_name)?;
                Ok::<_, EngineError>((lightning, backend))
            })
            .await?;

        if payload.auto_fund {
            log.run(OperationStep::AutoFund, async {
                let balances = self.store.get_balances(from).await?;
                if balances.confirmed < payload.sats {
                    self.deposit_funds(from, payload.sats + self.config.auto_fund_sats)
                        .await?;
                }
                Ok::<_, EngineError>(())
            })
            .await?;
        }

        let to_info = log
            .run(OperationStep::FetchPeerInfo, self.store.get_info(to))
            .await?;
        log.run(OperationStep::ConnectPeer, async {
            lightning
                .connect_peers(from, std::slice::from_ref(&to_info.rpc_url))
                .await
                .map_err(EngineError::service(&from.common.name))
        })
        .await?;
        let options = OpenChannelOptions {
            to_rpc_url: to_info.rpc_url.clone(),
            amount: payload.sats,
            is_private: payload.is_private,
        };
        let point = log
            .run(OperationStep::OpenChannel, async {
                lightning
                    .open_channel(from, &options)
                    .await
                    .map_err(EngineError::service(&from.common.name))
            })
            .await?;
        log.run(OperationStep::MineConfirmations, self.mine(&backend))
            .await?;
        log.run(OperationStep::Refresh, async {
            let (a, b) = tokio::join!(self.store.get_channels(from), self.store.get_channels(to));
            a.and(b).map(|_| ())
        })
        .await?;
        tracing::info!(from = %from.common.name, to = %to.common.name, sats = payload.sats, txid = %point.txid, "channel opened");
        Ok(point)
    }

    pub async fn close_channel(
        &self,
        node: &LightningNode,
        channel_point: &str,
    ) -> Result<(), EngineError> {
        let mut log = StepLog::new("close_channel");
        let (lightning, backend) = log
            .run(OperationStep::Resolve, async {
                let lightning = self.store.locator().lightning(node)?;
                let network = self.store.network(node.common.network_id)?;
                let backend = backend_named(&network, &node.common.name, &node.backend_name)?;
                Ok::<_, EngineError>((lightning, backend))
            })
            .await?;
        log.run(OperationStep::CloseChannel, async {
            lightning
                .close_channel(node, channel_point)
                .await
                .map_err(EngineError::service(&node.common.name))
        })
        .await?;
        log.run(OperationStep::MineConfirmations, self.mine(&backend))
            .await?;
        log.run(OperationStep::Refresh, self.store.get_channels(node))
            .await?;
        tracing::info!(node = %node.common.name, channel = %channel_point, "channel closed");
        Ok(())
    }

    pub async fn pay_invoice(
        &self,
        from: &LightningNode,
        to: &LightningNode,
        sats: u64,
        memo: Option<&str>,
    ) -> Result<LightningNodePayReceipt, EngineError> {
        let mut log = StepLog::new("pay_invoice");
        let (payer, payee) = log
            .run(OperationStep::Resolve, async {
                Ok::<_, EngineError>((
                    self.store.locator().lightning(from)?,
                    self.store.locator().lightning(to)?,
                ))
            })
            .await?;
        let invoice = log
            .run(OperationStep::CreateInvoice, async {
                payee
                    .create_invoice(to, sats, memo)
                    .await
                    .map_err(EngineError::service(&to.common.name))
            })
            .await?;
        let receipt = log
            .run(OperationStep::PayInvoice, async {
                payer
                    .pay_invoice(from, &invoice, None)
                    .await
                    .map_err(EngineError::service(&from.common.name))
            })
            .await?;
        log.run(OperationStep::Refresh, async {
            let (a, b) = tokio::join!(self.store.get_channels(from), self.store.get_channels(to));
            a.and(b).map(|_| ())
        })
        .await?;
        tracing::info!(from = %from.common.name, to = %to.common.name, sats, "invoice paid");
        Ok(receipt)
    }

    pub async fn send_asset(
        &self,
        payload: SendAssetPayload,
    ) -> Result<TapSendAssetReceipt, EngineError> {
        let mut log = StepLog::new("send_asset");
        let from = &payload.from;
        let to = &payload.to;
        let (sender, receiver, backend) = log
            .run(OperationStep::Resolve, async {
                let sender = self.store.locator().tap(from)?;
                let receiver = self.store.locator().tap(to)?;
                let network = self.store.network(from.common.network_id)?;
                let backend = backend_named(&network, &from.common.name, &from.backend_name)?;
                Ok::<_, EngineError>((sender, receiver, backend))
            })
            .await?;
        let address = log
            .run(OperationStep::CreateAddress, async {
                receiver
                    .new_address(to, &payload.asset_id, payload.amount)
                    .await
                    .map_err(EngineError::service(&to.common.name))
            })
            .await?;
        let receipt = log
            .run(OperationStep::SendAsset, async {
                sender
                    .send_asset(from, &address.encoded)
                    .await
                    .map_err(EngineError::service(&from.common.name))
            })
            .await?;
        log.run(OperationStep::MineConfirmations, self.mine(&backend))
            .await?;
        log.run(OperationStep::Refresh, async {
            let (a, b) = tokio::join!(self.store.get_assets(from), self.store.get_assets(to));
            a.and(b).map(|_| ())
        })
        .await?;
        tracing::info!(from = %from.common.name, to = %to.common.name, asset = %payload.asset_id, amount = payload.amount, "asset sent");
        Ok(receipt)
    }

    /// Syncs asset roots from another tap node acting as universe server.
    pub async fn sync_universe(
        &self,
        node: &TapNode,
        universe: &TapNode,
    ) -> Result<SyncUniverseResponse, EngineError> {
        let mut log = StepLog::new("sync_universe");
        let tap = log
            .run(OperationStep::Resolve, async {
                self.store.locator().tap(node)
            })
            .await?;
        let host = format!(
            "{}:{}",
            universe.common.container_name(),
            TAPD_INTERNAL_GRPC_PORT
        );
        let response = log
            .run(OperationStep::SyncUniverse, async {
                tap.sync_universe(node, &host)
                    .await
                    .map_err(EngineError::service(&node.common.name))
            })
            .await?;
        log.run(OperationStep::Refresh, self.store.get_assets(node))
            .await?;
        tracing::info!(node = %node.common.name, universe = %host, synced = response.synced_universes, "universe synced");
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn mine(&self, backend: &BitcoinNode) -> Result<Vec<String>, EngineError> {
        let bitcoin = self.store.locator().bitcoin(backend)?;
        bitcoin
            .mine(self.config.confirmation_blocks, backend)
            .await
            .map_err(EngineError::service(&backend.common.name))
    }

    /// Tops up a lightning wallet whose confirmed balance is below the
    /// configured minimum.
    async fn ensure_funds(&self, node: &LightningNode) -> Result<(), EngineError> {
        let balances = self.store.get_balances(node).await?;
        if balances.confirmed >= self.config.min_mint_balance_sats {
            return Ok(());
        }
        tracing::info!(node = %node.common.name, confirmed = balances.confirmed, "auto-funding");
        self.deposit_funds(node, self.config.auto_fund_sats).await?;
        Ok(())
    }
}
