//! Simnet core library: network topology model, node catalog, persistence.
//!
//! - [`types`]: networks, nodes, statuses, the persisted networks file
//! - [`catalog`]: node kinds, implementations, managed and custom images
//! - [`graph`]: topology queries and mutations on a [`Network`]
//! - [`networks`]: load / save of the networks file
//! - [`paths`]: on-disk layout under `~/.simnet/`
//! - [`error`]: [`NetworkError`]

pub mod catalog;
pub mod error;
pub mod graph;
pub mod networks;
pub mod paths;
pub mod types;

pub use catalog::{CustomImage, Implementation, ManagedImage, NodeImages, NodeKind, Platform};
pub use error::NetworkError;
pub use types::{
    AutoMineMode, BitcoinNode, DockerRef, LightningNode, Network, NetworkId, NetworkNodes,
    NetworksFile, Node, NodeCommon, Status, TapNode,
};
