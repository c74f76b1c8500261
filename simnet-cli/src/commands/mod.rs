pub mod images;
pub mod network;
pub mod node;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use simnet_core::{networks, paths, NodeImages};
use simnet_engine::{EngineConfig, FileRuntime, Orchestrator, ServiceLocator, StateStore};

/// Custom images and managed command overrides, next to the networks dir.
pub const IMAGES_FILE: &str = "images.json";

pub fn home() -> Result<PathBuf> {
    networks::home().context("could not determine home directory")
}

/// Runs `fut` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}

/// An orchestrator with no node clients and no container backend: topology
/// changes persist, starting anything fails.
pub async fn offline_orchestrator(home: &Path) -> Result<Orchestrator> {
    let runtime = Arc::new(FileRuntime::new(home));
    let store = StateStore::init(Arc::new(ServiceLocator::new()), runtime.as_ref())
        .await
        .context("failed to load networks")?;
    Ok(Orchestrator::new(
        Arc::new(store),
        runtime,
        EngineConfig::at(home),
    ))
}

/// Reads `~/.simnet/images.json`. A missing file means no customizations.
pub fn load_images(home: &Path) -> Result<NodeImages> {
    let path = paths::simnet_root(home).join(IMAGES_FILE);
    if !path.exists() {
        return Ok(NodeImages::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
