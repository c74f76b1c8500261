//! A [`ContainerRuntime`] with no container backend.
//!
//! Persists the networks file under `<home>/.simnet/` and treats every
//! container as absent: stopping or removing succeeds trivially, starting
//! fails. Used for offline topology management.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use simnet_core::{networks, Network, NetworksFile, Node};

use crate::services::{ContainerRuntime, ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct FileRuntime {
    home: PathBuf,
}

impl FileRuntime {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

fn no_containers(action: &str) -> ServiceError {
    ServiceError::new(format!("cannot {action}: no container runtime is attached"))
}

#[async_trait]
impl ContainerRuntime for FileRuntime {
    async fn save_compose_file(&self, network: &Network) -> ServiceResult<()> {
        let home = self.home.clone();
        let id = network.id;
        tokio::task::spawn_blocking(move || networks::create_network_dir_at(&home, id))
            .await
            .map_err(|e| ServiceError::new(format!("network directory task failed: {e}")))?
            .map(|_| ())
            .map_err(|e| ServiceError::new(e.to_string()))
    }

    async fn start(&self, _network: &Network) -> ServiceResult<()> {
        Err(no_containers("start network"))
    }

    async fn stop(&self, _network: &Network) -> ServiceResult<()> {
        Ok(())
    }

    async fn start_node(&self, _network: &Network, node: &Node) -> ServiceResult<()> {
        Err(no_containers(&format!("start node '{}'", node.name())))
    }

    async fn stop_node(&self, _network: &Network, _node: &Node) -> ServiceResult<()> {
        Ok(())
    }

    async fn remove_node(&self, _network: &Network, _node: &Node) -> ServiceResult<()> {
        Ok(())
    }

    async fn save_networks(&self, file: &NetworksFile) -> ServiceResult<()> {
        let home = self.home.clone();
        let file = file.clone();
        tokio::task::spawn_blocking(move || networks::save_at(&home, &file))
            .await
            .map_err(|e| ServiceError::new(format!("save task failed: {e}")))?
            .map_err(|e| ServiceError::new(e.to_string()))
    }

    async fn load_networks(&self) -> ServiceResult<NetworksFile> {
        let home = self.home.clone();
        tokio::task::spawn_blocking(move || networks::load_at(&home))
            .await
            .map_err(|e| ServiceError::new(format!("load task failed: {e}")))?
            .map_err(|e| ServiceError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn saves_and_loads_through_networks_file() {
        let home = TempDir::new().expect("home");
        let runtime = FileRuntime::new(home.path());
        let mut file = NetworksFile::default();
        file.networks
            .push(Network::new(1, "regtest", home.path().join("1")));
        runtime.save_networks(&file).await.expect("save");
        let loaded = runtime.load_networks().await.expect("load");
        assert_eq!(loaded, file);
    }

    #[test]
    fn starting_is_refused() {
        let home = TempDir::new().expect("home");
        let runtime = FileRuntime::new(home.path());
        let net = Network::new(1, "regtest", home.path().join("1"));
        let err = tokio_test::block_on(runtime.start(&net)).unwrap_err();
        assert!(err.message.contains("no container runtime"));
        tokio_test::assert_ok!(tokio_test::block_on(runtime.stop(&net)));
    }

    #[tokio::test]
    async fn compose_step_creates_network_dir() {
        let home = TempDir::new().expect("home");
        let runtime = FileRuntime::new(home.path());
        let net = Network::new(7, "regtest", home.path().join("7"));
        runtime.save_compose_file(&net).await.expect("compose");
        assert!(simnet_core::paths::network_dir(home.path(), 7).is_dir());
    }
}
