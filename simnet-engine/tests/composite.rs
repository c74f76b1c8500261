mod support;

use simnet_core::{DockerRef, Implementation, Network};
use simnet_engine::services::AssetType;
use simnet_engine::{
    EngineError, MintAssetPayload, OpenChannelPayload, OperationStep, SendAssetPayload,
};

use support::{harness, network, rpc_url};

/// Two backends; alice on backend1, bob on backend2, and bob's asset node.
fn split_backends() -> Network {
    let mut net = network(1, 2, 1, 0);
    net.add_lightning_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default(), Some("backend2"))
        .unwrap();
    net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), Some("bob"))
        .unwrap();
    net
}

fn mint(node: simnet_core::TapNode, finalize: bool) -> MintAssetPayload {
    MintAssetPayload {
        node,
        asset_type: AssetType::Normal,
        name: "LUSD".into(),
        amount: 1_000,
        enable_emission: false,
        finalize,
        auto_fund: false,
    }
}

fn step_failure(err: EngineError) -> (OperationStep, Vec<OperationStep>) {
    match err {
        EngineError::OperationStepFailure {
            step, committed, ..
        } => (step, committed),
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// mint_asset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finalized_mint_confirms_on_first_lightning_backend() {
    let mut net = split_backends();
    // A broken reference on a later lightning node must not matter.
    net.nodes.lightning[1].backend_name = "invalid".into();
    let tap = net.tap_node("bob-tap").unwrap().clone();
    assert_eq!(tap.backend_name, "backend2");
    let h = harness(vec![net]);

    let outcome = h.engine.mint_asset(mint(tap, true)).await.expect("mint");

    assert_eq!(h.rec.count("finalize_batch:bob-tap"), 1);
    assert_eq!(h.rec.matching("mine:"), vec!["mine:backend1:6"]);
    assert_eq!(outcome.confirmed_on.as_deref(), Some("backend1"));
    assert_eq!(outcome.finalized.unwrap().batch_txid, "txid-batch");
    assert_eq!(outcome.assets.len(), 1);
    assert!(h.store.tap_state(1, "bob-tap").unwrap().assets.is_some());
}

#[tokio::test]
async fn unfinalized_mint_neither_finalizes_nor_mines() {
    let net = split_backends();
    let tap = net.tap_node("bob-tap").unwrap().clone();
    let h = harness(vec![net]);

    let outcome = h.engine.mint_asset(mint(tap, false)).await.expect("mint");

    assert_eq!(h.rec.count("finalize_batch"), 0);
    assert_eq!(h.rec.count("mine:"), 0);
    assert!(outcome.finalized.is_none());
    assert!(outcome.confirmed_on.is_none());
    assert_eq!(outcome.batch.batch_key, "batch-bob-tap");
}

#[tokio::test]
async fn finalize_failure_reports_committed_steps() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);
    h.rec.fail("finalize_batch");

    let err = h.engine.mint_asset(mint(tap, true)).await.unwrap_err();
    let (step, committed) = step_failure(err);
    assert_eq!(step, OperationStep::FinalizeBatch);
    assert_eq!(committed, vec![OperationStep::Resolve, OperationStep::Mint]);
    assert_eq!(h.rec.count("mint_asset:alice-tap"), 1, "mint is not rolled back");
    assert_eq!(h.rec.count("mine:"), 0);
}

#[tokio::test]
async fn pending_mint_succeeds_when_asset_refresh_fails() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);
    h.rec.fail("list_assets");

    let outcome = h.engine.mint_asset(mint(tap, false)).await.expect("mint");

    assert_eq!(
        h.rec.calls(),
        vec!["mint_asset:alice-tap:LUSD:1000", "list_assets:alice-tap"]
    );
    assert_eq!(outcome.batch.batch_key, "batch-alice-tap");
    assert!(outcome.finalized.is_none());
    assert!(outcome.assets.is_empty());
}

#[tokio::test]
async fn finalized_mint_keeps_cached_assets_when_refresh_fails() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);
    h.store.get_assets(&tap).await.expect("warm cache");
    h.rec.fail("list_assets");

    let outcome = h.engine.mint_asset(mint(tap, true)).await.expect("mint");

    assert_eq!(h.rec.matching("mine:"), vec!["mine:backend1:6"]);
    assert_eq!(outcome.assets.len(), 1);
    assert_eq!(outcome.assets[0].id, "asset1");
}

#[tokio::test]
async fn collectibles_mint_a_single_unit() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);

    let mut payload = mint(tap, false);
    payload.asset_type = AssetType::Collectible;
    payload.name = "card".into();
    h.engine.mint_asset(payload).await.expect("mint");

    assert_eq!(h.rec.matching("mint_asset:"), vec!["mint_asset:alice-tap:card:1"]);
}

#[tokio::test]
async fn auto_fund_deposits_when_wallet_is_low() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);
    h.rec.set_balance("alice", 500);

    let mut payload = mint(tap, false);
    payload.auto_fund = true;
    h.engine.mint_asset(payload).await.expect("mint");

    let calls = h.rec.calls();
    let send = calls
        .iter()
        .position(|c| c == "send_funds:backend1:bcrt1qalice:0.001")
        .expect("deposit sent");
    let minted = calls
        .iter()
        .position(|c| c.starts_with("mint_asset:alice-tap"))
        .expect("minted");
    assert!(send < minted);
}

#[tokio::test]
async fn auto_fund_skips_funded_wallet() {
    let net = network(1, 1, 1, 1);
    let tap = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);
    h.rec.set_balance("alice", 50_000);

    let mut payload = mint(tap, false);
    payload.auto_fund = true;
    h.engine.mint_asset(payload).await.expect("mint");

    assert_eq!(h.rec.count("send_funds"), 0);
    assert_eq!(h.rec.count("get_balances:alice"), 1);
}

// ---------------------------------------------------------------------------
// Funds and channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deposit_uses_the_nodes_own_backend() {
    let net = split_backends();
    let bob = net.lightning_node("bob").unwrap().clone();
    let h = harness(vec![net]);

    let outcome = h.engine.deposit_funds(&bob, 250_000).await.expect("deposit");
    assert_eq!(outcome.txid, "txid-deposit");

    let relevant: Vec<String> = h
        .rec
        .calls()
        .into_iter()
        .filter(|c| !c.starts_with("get_balances"))
        .collect();
    assert_eq!(
        relevant,
        vec![
            "ln_new_address:bob",
            "send_funds:backend2:bcrt1qbob:0.0025",
            "mine:backend2:6",
        ]
    );
    assert_eq!(h.rec.matching("get_balances:bob"), vec!["get_balances:bob:backend2"]);
}

#[tokio::test]
async fn open_channel_runs_steps_in_order() {
    let net = network(1, 1, 2, 0);
    let alice = net.lightning_node("alice").unwrap().clone();
    let bob = net.lightning_node("bob").unwrap().clone();
    let h = harness(vec![net]);

    let point = h
        .engine
        .open_channel(OpenChannelPayload {
            from: alice,
            to: bob,
            sats: 250_000,
            is_private: false,
            auto_fund: false,
        })
        .await
        .expect("open");
    assert_eq!(point.txid, "txid-channel");

    let calls = h.rec.calls();
    let expected = [
        "get_info:bob".to_string(),
        format!("ln_connect_peers:alice:{}", rpc_url("bob")),
        format!("open_channel:alice:{}:250000", rpc_url("bob")),
        "mine:backend1:6".to_string(),
    ];
    let positions: Vec<usize> = expected
        .iter()
        .map(|c| calls.iter().position(|x| x == c).expect(c))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{calls:?}");
    assert_eq!(h.rec.count("get_channels:alice"), 1);
    assert_eq!(h.rec.count("get_channels:bob"), 1);
}

#[tokio::test]
async fn open_channel_stops_at_failed_peer_connection() {
    let net = network(1, 1, 2, 0);
    let alice = net.lightning_node("alice").unwrap().clone();
    let bob = net.lightning_node("bob").unwrap().clone();
    let h = harness(vec![net]);
    h.rec.fail("ln_connect_peers");

    let err = h
        .engine
        .open_channel(OpenChannelPayload {
            from: alice,
            to: bob,
            sats: 250_000,
            is_private: true,
            auto_fund: false,
        })
        .await
        .unwrap_err();
    let (step, committed) = step_failure(err);
    assert_eq!(step, OperationStep::ConnectPeer);
    assert_eq!(committed, vec![OperationStep::Resolve, OperationStep::FetchPeerInfo]);
    assert_eq!(h.rec.count("open_channel"), 0);
}

#[tokio::test]
async fn close_channel_mines_and_refreshes() {
    let net = network(1, 1, 1, 0);
    let alice = net.lightning_node("alice").unwrap().clone();
    let h = harness(vec![net]);

    h.engine
        .close_channel(&alice, "txid-channel:0")
        .await
        .expect("close");
    assert_eq!(
        h.rec.calls(),
        vec![
            "close_channel:alice:txid-channel:0",
            "mine:backend1:6",
            "get_channels:alice",
        ]
    );
}

#[tokio::test]
async fn invoice_is_created_by_payee_before_payment() {
    let net = network(1, 1, 2, 0);
    let alice = net.lightning_node("alice").unwrap().clone();
    let bob = net.lightning_node("bob").unwrap().clone();
    let h = harness(vec![net]);

    h.engine
        .pay_invoice(&alice, &bob, 1_500, Some("coffee"))
        .await
        .expect("pay");
    let calls = h.rec.calls();
    assert_eq!(calls[0], "create_invoice:bob:1500");
    assert_eq!(calls[1], "pay_invoice:alice:lnbcrt1500bob");
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_asset_confirms_on_senders_backend() {
    let mut net = split_backends();
    net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), Some("alice"))
        .unwrap();
    let from = net.tap_node("bob-tap").unwrap().clone();
    let to = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);

    let receipt = h
        .engine
        .send_asset(SendAssetPayload {
            from,
            to,
            asset_id: "asset1".into(),
            amount: 100,
        })
        .await
        .expect("send");
    assert_eq!(receipt.transfer_txid, "txid-transfer");

    let calls = h.rec.calls();
    assert_eq!(calls[0], "tap_new_address:alice-tap:asset1:100");
    assert_eq!(calls[1], "send_asset:bob-tap:taprt1alice-tap");
    assert_eq!(calls[2], "mine:backend2:6");
    assert_eq!(h.rec.count("list_assets"), 2);
}

#[tokio::test]
async fn sync_universe_targets_universe_container() {
    let mut net = network(1, 1, 2, 1);
    net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), Some("bob"))
        .unwrap();
    let node = net.tap_node("bob-tap").unwrap().clone();
    let universe = net.tap_node("alice-tap").unwrap().clone();
    let h = harness(vec![net]);

    let response = h
        .engine
        .sync_universe(&node, &universe)
        .await
        .expect("sync");
    assert_eq!(response.synced_universes, 1);
    assert_eq!(
        h.rec.matching("sync_universe:"),
        vec!["sync_universe:bob-tap:simnet-n1-alice-tap:10029"]
    );
}

#[tokio::test]
async fn unknown_tap_implementation_fails_at_resolve() {
    let net = network(1, 1, 1, 1);
    let mut tap = net.tap_node("alice-tap").unwrap().clone();
    tap.common.implementation = Implementation::Litd;
    let h = harness(vec![net]);

    let err = h.engine.mint_asset(mint(tap, true)).await.unwrap_err();
    assert!(matches!(
        err.root_cause(),
        EngineError::UnsupportedImplementation { .. }
    ));
    let (step, committed) = step_failure(err);
    assert_eq!(step, OperationStep::Resolve);
    assert!(committed.is_empty());
    assert!(h.rec.calls().is_empty());
}
