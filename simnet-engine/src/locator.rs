//! Service Locator: maps a node's implementation and version to the client
//! that speaks its RPC dialect.
//!
//! Adapters are registered per implementation with a [`VersionSupport`]
//! rule. The first registered adapter whose rule accepts the node's version
//! wins. Resolution never touches the network.

use std::cmp::Ordering;
use std::sync::Arc;

use simnet_core::{BitcoinNode, Implementation, LightningNode, Node, NodeCommon, NodeKind, TapNode};

use crate::error::EngineError;
use crate::services::{BitcoinService, LightningService, ServiceResult, TapService};

/// Which versions of an implementation an adapter serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSupport {
    Any,
    Exact(Vec<String>),
    /// This version and everything newer, compared numerically.
    AtLeast(String),
}

impl VersionSupport {
    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionSupport::Any => true,
            VersionSupport::Exact(versions) => versions.iter().any(|v| v == version),
            VersionSupport::AtLeast(min) => compare_versions(version, min) != Ordering::Less,
        }
    }
}

/// Compares the leading numeric components of two version strings, so
/// `0.18.3-beta` sorts after `0.9.0` and before `0.18.10`.
fn compare_versions(a: &str, b: &str) -> Ordering {
    numeric_parts(a).cmp(&numeric_parts(b))
}

fn numeric_parts(version: &str) -> Vec<u64> {
    version
        .trim_start_matches('v')
        .split(['.', '-'])
        .map_while(|part| part.parse::<u64>().ok())
        .collect()
}

struct Adapter<S: ?Sized> {
    implementation: Implementation,
    versions: VersionSupport,
    service: Arc<S>,
}

impl<S: ?Sized> Adapter<S> {
    fn serves(&self, common: &NodeCommon) -> bool {
        self.implementation == common.implementation && self.versions.matches(&common.version)
    }
}

fn find<S: ?Sized>(adapters: &[Adapter<S>], common: &NodeCommon) -> Result<Arc<S>, EngineError> {
    adapters
        .iter()
        .find(|a| a.serves(common))
        .map(|a| Arc::clone(&a.service))
        .ok_or_else(|| EngineError::UnsupportedImplementation {
            kind: common.implementation.kind(),
            implementation: common.implementation,
            version: common.version.clone(),
        })
}

/// A resolved client for a node of any kind.
#[derive(Clone)]
pub enum ServiceHandle {
    Bitcoin(Arc<dyn BitcoinService>),
    Lightning(Arc<dyn LightningService>),
    Tap(Arc<dyn TapService>),
}

impl ServiceHandle {
    /// One readiness check. A node of a different kind than the handle is
    /// reported as not ready.
    pub async fn wait_until_online(&self, node: &Node) -> ServiceResult<()> {
        match (self, node) {
            (ServiceHandle::Bitcoin(s), Node::Bitcoin(n)) => s.wait_until_online(n).await,
            (ServiceHandle::Lightning(s), Node::Lightning(n)) => s.wait_until_online(n).await,
            (ServiceHandle::Tap(s), Node::Tap(n)) => s.wait_until_online(n).await,
            _ => Err(crate::services::ServiceError::new(format!(
                "service kind does not match {} node '{}'",
                node.kind(),
                node.name()
            ))),
        }
    }
}

#[derive(Default)]
pub struct ServiceLocator {
    bitcoin: Vec<Adapter<dyn BitcoinService>>,
    lightning: Vec<Adapter<dyn LightningService>>,
    tap: Vec<Adapter<dyn TapService>>,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bitcoin(
        mut self,
        implementation: Implementation,
        versions: VersionSupport,
        service: Arc<dyn BitcoinService>,
    ) -> Self {
        debug_assert_eq!(implementation.kind(), NodeKind::Bitcoin);
        self.bitcoin.push(Adapter {
            implementation,
            versions,
            service,
        });
        self
    }

    pub fn with_lightning(
        mut self,
        implementation: Implementation,
        versions: VersionSupport,
        service: Arc<dyn LightningService>,
    ) -> Self {
        debug_assert_eq!(implementation.kind(), NodeKind::Lightning);
        self.lightning.push(Adapter {
            implementation,
            versions,
            service,
        });
        self
    }

    pub fn with_tap(
        mut self,
        implementation: Implementation,
        versions: VersionSupport,
        service: Arc<dyn TapService>,
    ) -> Self {
        debug_assert_eq!(implementation.kind(), NodeKind::Tap);
        self.tap.push(Adapter {
            implementation,
            versions,
            service,
        });
        self
    }

    pub fn bitcoin(&self, node: &BitcoinNode) -> Result<Arc<dyn BitcoinService>, EngineError> {
        find(&self.bitcoin, &node.common)
    }

    pub fn lightning(&self, node: &LightningNode) -> Result<Arc<dyn LightningService>, EngineError> {
        find(&self.lightning, &node.common)
    }

    pub fn tap(&self, node: &TapNode) -> Result<Arc<dyn TapService>, EngineError> {
        find(&self.tap, &node.common)
    }

    pub fn resolve(&self, node: &Node) -> Result<ServiceHandle, EngineError> {
        match node {
            Node::Bitcoin(n) => self.bitcoin(n).map(ServiceHandle::Bitcoin),
            Node::Lightning(n) => self.lightning(n).map(ServiceHandle::Lightning),
            Node::Tap(n) => self.tap(n).map(ServiceHandle::Tap),
        }
    }
}
