//! Roundtrip tests for the persisted networks file.
//!
//! Each `#[case]` is isolated; no shared state.

use std::path::PathBuf;

use rstest::rstest;
use serde_json::json;
use simnet_core::types::{AutoMineMode, DockerRef, Network, NetworksFile, Status};
use simnet_core::{networks, Implementation};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn empty_file() -> NetworksFile {
    NetworksFile::default()
}

fn full_file() -> NetworksFile {
    let mut net = Network::new(1, "my network", PathBuf::from("/home/u/.simnet/networks/1"));
    net.description = "two lightning nodes and a mint".to_string();
    net.auto_mine_mode = AutoMineMode::Every1m;
    net.status = Status::Started;
    net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
        .unwrap();
    net.add_bitcoin_node(Implementation::Btcd, "0.24.2", DockerRef::default())
        .unwrap();
    net.add_lightning_node(Implementation::Lnd, "0.18.3-beta", DockerRef::default(), None)
        .unwrap();
    net.add_lightning_node(
        Implementation::CLightning,
        "24.08",
        DockerRef {
            image: "custom:image".to_string(),
            command: "test-command".to_string(),
        },
        Some("backend2"),
    )
    .unwrap();
    net.add_tap_node(Implementation::Tapd, "0.4.1-alpha", DockerRef::default(), None)
        .unwrap();

    let mut file = NetworksFile::default();
    file.networks.push(net);
    file.charts.insert(
        1,
        json!({
            "offset": { "x": 0, "y": 0 },
            "nodes": { "alice": { "position": { "x": 100.5, "y": 230 } } },
            "links": {},
            "selected": {},
            "hovered": {}
        }),
    );
    file
}

fn unicode_file() -> NetworksFile {
    let mut net = Network::new(7, "сеть-网络-🚀", PathBuf::from("/tmp/ユニコード"));
    net.description = "émojis & spéçïal chars: <>&\"'".to_string();
    net.add_bitcoin_node(Implementation::Bitcoind, "27.0", DockerRef::default())
        .unwrap();
    let mut file = NetworksFile::default();
    file.networks.push(net);
    file
}

fn chart_without_network() -> NetworksFile {
    let mut file = NetworksFile::default();
    file.charts.insert(42, json!({ "orphan": true }));
    file
}

// ---------------------------------------------------------------------------
// Parameterised roundtrip test
// ---------------------------------------------------------------------------

#[rstest]
#[case("empty", empty_file())]
#[case("all_fields", full_file())]
#[case("unicode_strings", unicode_file())]
#[case("orphan_chart", chart_without_network())]
fn networks_file_roundtrip(#[case] label: &str, #[case] file: NetworksFile) {
    let home = tempfile::TempDir::new().expect("tempdir");
    networks::save_at(home.path(), &file)
        .unwrap_or_else(|e| panic!("[{label}] save failed: {e}"));
    let back = networks::load_at(home.path())
        .unwrap_or_else(|e| panic!("[{label}] load failed: {e}"));
    assert_eq!(file, back, "[{label}] networks file must roundtrip field-for-field");
}

#[rstest]
#[case(AutoMineMode::Off)]
#[case(AutoMineMode::Every30s)]
#[case(AutoMineMode::Every1m)]
#[case(AutoMineMode::Every5m)]
#[case(AutoMineMode::Every10m)]
fn auto_mine_mode_roundtrip(#[case] mode: AutoMineMode) {
    let json = serde_json::to_string(&mode).expect("serialize");
    let back: AutoMineMode = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(mode, back);
}
