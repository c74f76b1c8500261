//! Lifecycle Orchestrator: tiered network start/stop, single-node control,
//! readiness polling, cancellation, and auto-mining.
//!
//! # Start
//!
//! ```text
//! save_compose_file → runtime.start
//!   → bitcoin tier   (start_node + readiness + default wallet, in parallel)
//!   → connect bitcoin peers
//!   → lightning tier (start_node + readiness, in parallel)
//!   → tap tier       (start_node + readiness, in parallel)
//! ```
//!
//! A tier starts only after every node of the previous tier is online. The
//! first failing tier aborts the start: the network goes to `Error` and
//! containers already running are left as they are.
//!
//! # Stop
//!
//! Tiers in reverse order. Per-node failures are logged and reported; the
//! stop carries on and always completes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use simnet_core::{AutoMineMode, Network, NetworkError, NetworkId, Node, NodeKind, Status};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::locator::{ServiceHandle, ServiceLocator};
use crate::services::ContainerRuntime;
use crate::store::StateStore;

/// Per-node failures collected while stopping a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub network: NetworkId,
    pub failed: Vec<(String, String)>,
    /// Error from the network-level `runtime.stop`, if any.
    pub runtime_error: Option<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.runtime_error.is_none()
    }
}

/// Result of [`Orchestrator::connect_all_peers`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerReport {
    pub connected: Vec<String>,
    pub failed: Vec<(String, String)>,
}

struct AutoMiner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Orchestrator {
    pub(crate) store: Arc<StateStore>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) config: EngineConfig,
    starts: Mutex<HashMap<NetworkId, CancellationToken>>,
    miners: Mutex<HashMap<NetworkId, AutoMiner>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
            starts: Mutex::new(HashMap::new()),
            miners: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn locator(&self) -> &ServiceLocator {
        self.store.locator()
    }

    /// Writes the store's networks and charts through the runtime.
    pub(crate) async fn persist(&self) -> Result<(), EngineError> {
        self.runtime
            .save_networks(&self.store.networks_file())
            .await
            .map_err(EngineError::Runtime)
    }

    // -----------------------------------------------------------------------
    // Network start
    // -----------------------------------------------------------------------

    /// Starts every node tier by tier.
    ///
    /// Returns `Cancelled` if [`stop_network`](Self::stop_network) is called
    /// while the start is in flight; the abandoned start then writes no
    /// further status.
    pub async fn start_network(&self, id: NetworkId) -> Result<(), EngineError> {
        let network = self.store.network(id)?;
        if matches!(
            network.status,
            Status::Starting | Status::Started | Status::Stopping
        ) {
            return Err(EngineError::InvalidState {
                network: id,
                status: network.status,
            });
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.starts.lock().insert(id, token.clone()) {
            previous.cancel();
        }
        self.store.set_all_status(id, Status::Starting);
        tracing::info!(network = id, name = %network.name, "starting network");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::Cancelled { network: id }),
            res = self.run_start(&network) => res,
        };

        // stop_network cancels under this lock, so a stop that lands after
        // run_start returned still wins over the commit below.
        let mut starts = self.starts.lock();
        if token.is_cancelled() {
            tracing::info!(network = id, "start abandoned");
            return Err(EngineError::Cancelled { network: id });
        }
        starts.remove(&id);

        match result {
            Ok(()) => {
                self.store.set_network_status(id, Status::Started);
                tracing::info!(network = id, "network started");
                if let Ok(started) = self.store.network(id) {
                    self.spawn_auto_mine(&started);
                }
                Ok(())
            }
            Err(err) => {
                self.store.set_network_status(id, Status::Error);
                // Tiers after the failing one were never launched.
                if let Ok(current) = self.store.network(id) {
                    for node in NodeKind::TIERS.into_iter().flat_map(|k| current.tier(k)) {
                        if node.status() == Status::Starting {
                            self.store.set_node_status(id, node.name(), Status::Stopped);
                        }
                    }
                }
                tracing::error!(network = id, error = %err, "network failed to start");
                Err(err)
            }
        }
    }

    async fn run_start(&self, network: &Network) -> Result<(), EngineError> {
        self.runtime
            .save_compose_file(network)
            .await
            .map_err(EngineError::Runtime)?;
        self.runtime
            .start(network)
            .await
            .map_err(EngineError::Runtime)?;

        for kind in NodeKind::TIERS {
            let nodes = network.tier(kind);
            if nodes.is_empty() {
                continue;
            }
            tracing::info!(network = network.id, tier = %kind, nodes = nodes.len(), "starting tier");
            let results = join_all(nodes.iter().map(|n| self.launch_node(network, n))).await;
            if let Some(err) = results.into_iter().find_map(Result::err) {
                return Err(err);
            }
            if kind == NodeKind::Bitcoin {
                self.connect_bitcoin_peers(network).await?;
            }
        }
        Ok(())
    }

    /// Starts one container and waits for it to come online, recording the
    /// node's status either way.
    async fn launch_node(&self, network: &Network, node: &Node) -> Result<(), EngineError> {
        let name = node.name();
        self.store.set_node_status(network.id, name, Status::Starting);
        match self.bring_online(network, node).await {
            Ok(()) => {
                self.store.set_node_status(network.id, name, Status::Started);
                tracing::info!(network = network.id, node = %name, "node online");
                Ok(())
            }
            Err(err) => {
                self.store.set_node_status(network.id, name, Status::Error);
                tracing::error!(network = network.id, node = %name, error = %err, "node failed to start");
                Err(err)
            }
        }
    }

    async fn bring_online(&self, network: &Network, node: &Node) -> Result<(), EngineError> {
        let handle = self.locator().resolve(node)?;
        self.runtime
            .start_node(network, node)
            .await
            .map_err(EngineError::Runtime)?;
        self.wait_until_online(&handle, node).await?;
        if let (ServiceHandle::Bitcoin(service), Node::Bitcoin(n)) = (&handle, node) {
            service
                .create_default_wallet(n)
                .await
                .map_err(EngineError::service(node.name()))?;
        }
        Ok(())
    }

    /// Polls readiness with exponential backoff until the node answers or
    /// the attempt budget runs out.
    async fn wait_until_online(
        &self,
        handle: &ServiceHandle,
        node: &Node,
    ) -> Result<(), EngineError> {
        let policy = self.config.readiness;
        let attempts = policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match handle.wait_until_online(node).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => {
                    return Err(EngineError::NodeUnreachable {
                        node: node.name().to_string(),
                        attempts: attempt,
                        last_error: err.message,
                    });
                }
                Err(err) => {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        node = %node.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "node not ready yet"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect_bitcoin_peers(&self, network: &Network) -> Result<(), EngineError> {
        let results = join_all(network.nodes.bitcoin.iter().map(|n| async move {
            let service = self.locator().bitcoin(n)?;
            service
                .connect_peers(n)
                .await
                .map_err(EngineError::service(&n.common.name))
        }))
        .await;
        for (node, result) in network.nodes.bitcoin.iter().zip(&results) {
            if let Err(err) = result {
                self.store
                    .set_node_status(network.id, &node.common.name, Status::Error);
                tracing::error!(network = network.id, node = %node.common.name, error = %err, "bitcoin peering failed");
            }
        }
        results.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Network stop
    // -----------------------------------------------------------------------

    /// Stops every node in reverse tier order. Abandons an in-flight start
    /// and cancels the auto-mine timer first.
    pub async fn stop_network(&self, id: NetworkId) -> Result<StopReport, EngineError> {
        let network = self.store.network(id)?;
        {
            let mut starts = self.starts.lock();
            if let Some(token) = starts.remove(&id) {
                tracing::info!(network = id, "cancelling in-flight start");
                token.cancel();
            }
        }
        self.stop_auto_mine(id);
        self.store.set_all_status(id, Status::Stopping);
        tracing::info!(network = id, name = %network.name, "stopping network");

        let mut report = StopReport {
            network: id,
            ..StopReport::default()
        };
        for kind in NodeKind::TIERS.into_iter().rev() {
            let nodes = network.tier(kind);
            let results = join_all(nodes.iter().map(|n| self.runtime.stop_node(&network, n))).await;
            for (node, result) in nodes.iter().zip(results) {
                match result {
                    Ok(()) => self.store.set_node_status(id, node.name(), Status::Stopped),
                    Err(err) => {
                        tracing::warn!(network = id, node = %node.name(), error = %err, "failed to stop node");
                        self.store.set_node_status(id, node.name(), Status::Error);
                        report.failed.push((node.name().to_string(), err.message));
                    }
                }
            }
        }
        if let Err(err) = self.runtime.stop(&network).await {
            tracing::warn!(network = id, error = %err, "failed to stop network containers");
            report.runtime_error = Some(err.message);
        }

        self.store.set_network_status(id, Status::Stopped);
        tracing::info!(network = id, failures = report.failed.len(), "network stopped");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Single nodes
    // -----------------------------------------------------------------------

    pub async fn start_node(&self, id: NetworkId, name: &str) -> Result<(), EngineError> {
        let network = self.store.network(id)?;
        let node = find_node(&network, name)?;
        self.launch_node(&network, &node).await?;
        if let Node::Bitcoin(n) = &node {
            let service = self.locator().bitcoin(n)?;
            service
                .connect_peers(n)
                .await
                .map_err(EngineError::service(name))?;
        }
        Ok(())
    }

    pub async fn stop_node(&self, id: NetworkId, name: &str) -> Result<(), EngineError> {
        let network = self.store.network(id)?;
        let node = find_node(&network, name)?;
        self.store.set_node_status(id, name, Status::Stopping);
        match self.runtime.stop_node(&network, &node).await {
            Ok(()) => {
                self.store.set_node_status(id, name, Status::Stopped);
                tracing::info!(network = id, node = %name, "node stopped");
                Ok(())
            }
            Err(err) => {
                self.store.set_node_status(id, name, Status::Error);
                Err(EngineError::Runtime(err))
            }
        }
    }

    /// Connects every lightning node to every other one. Best-effort: nodes
    /// whose info cannot be fetched, or whose connect call fails, are
    /// reported and skipped.
    pub async fn connect_all_peers(&self, id: NetworkId) -> Result<PeerReport, EngineError> {
        let network = self.store.network(id)?;
        let lightning = &network.nodes.lightning;
        let infos = join_all(lightning.iter().map(|n| self.store.get_info(n))).await;

        let mut report = PeerReport::default();
        let mut urls = Vec::new();
        for (node, info) in lightning.iter().zip(infos) {
            match info {
                Ok(info) => urls.push((node, info.rpc_url)),
                Err(err) => {
                    tracing::warn!(network = id, node = %node.common.name, error = %err, "cannot fetch node info");
                    report.failed.push((node.common.name.clone(), err.to_string()));
                }
            }
        }

        let connects = join_all(urls.iter().map(|(node, own_url)| {
            let others: Vec<String> = urls
                .iter()
                .map(|(_, url)| url.clone())
                .filter(|url| url != own_url)
                .collect();
            async move {
                let service = self.locator().lightning(node)?;
                service
                    .connect_peers(node, &others)
                    .await
                    .map_err(EngineError::service(&node.common.name))
            }
        }))
        .await;
        for ((node, _), result) in urls.iter().zip(connects) {
            match result {
                Ok(()) => report.connected.push(node.common.name.clone()),
                Err(err) => {
                    tracing::warn!(network = id, node = %node.common.name, error = %err, "peer connection failed");
                    report.failed.push((node.common.name.clone(), err.to_string()));
                }
            }
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Auto-mine
    // -----------------------------------------------------------------------

    /// Persists the mode and (re)arms the timer if the network is running.
    pub async fn set_auto_mine(&self, id: NetworkId, mode: AutoMineMode) -> Result<(), EngineError> {
        self.store.update_network(id, |n| n.auto_mine_mode = mode)?;
        self.stop_auto_mine(id);
        let network = self.store.network(id)?;
        if network.status == Status::Started {
            self.spawn_auto_mine(&network);
        }
        tracing::info!(network = id, mode = %mode, "auto-mine mode set");
        self.persist().await
    }

    pub fn is_auto_mining(&self, id: NetworkId) -> bool {
        self.miners.lock().contains_key(&id)
    }

    /// Mines one block on the first bitcoin node every interval. Tick
    /// failures are logged and the timer keeps running.
    fn spawn_auto_mine(&self, network: &Network) {
        let Some(period) = network.auto_mine_mode.interval() else {
            return;
        };
        let Some(miner) = network.nodes.bitcoin.first().cloned() else {
            tracing::warn!(network = network.id, "auto-mine enabled without a bitcoin node");
            return;
        };
        let service = match self.locator().bitcoin(&miner) {
            Ok(service) => service,
            Err(err) => {
                tracing::warn!(network = network.id, error = %err, "auto-mine disabled");
                return;
            }
        };

        let id = network.id;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    res = service.mine(1, &miner) => match res {
                        Ok(hashes) => tracing::debug!(network = id, blocks = hashes.len(), "auto-mined"),
                        Err(err) => tracing::error!(network = id, error = %err, "auto-mine tick failed"),
                    },
                }
            }
        });
        tracing::info!(network = id, period_secs = period.as_secs(), "auto-mine armed");
        if let Some(previous) = self.miners.lock().insert(id, AutoMiner { token, handle }) {
            previous.token.cancel();
        }
    }

    fn stop_auto_mine(&self, id: NetworkId) {
        if let Some(miner) = self.miners.lock().remove(&id) {
            miner.token.cancel();
            tracing::debug!(network = id, "auto-mine cancelled");
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Cancels every in-flight start and auto-mine timer and waits for the
    /// timers to exit. Containers are left untouched.
    pub async fn teardown(&self) {
        for (id, token) in self.starts.lock().drain() {
            tracing::debug!(network = id, "cancelling start on teardown");
            token.cancel();
        }
        let miners: Vec<(NetworkId, AutoMiner)> = self.miners.lock().drain().collect();
        for (_, miner) in &miners {
            miner.token.cancel();
        }
        for (id, miner) in miners {
            if let Err(err) = miner.handle.await {
                tracing::warn!(network = id, error = %err, "auto-mine task ended abnormally");
            }
        }
    }
}

pub(crate) fn find_node(network: &Network, name: &str) -> Result<Node, EngineError> {
    network.node(name).ok_or_else(|| {
        EngineError::Network(NetworkError::NodeNotFound {
            network: network.id,
            node: name.to_string(),
        })
    })
}
