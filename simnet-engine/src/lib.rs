//! Simnet engine: drives simulated networks through their lifecycle.
//!
//! - [`services`]: contracts for node RPC clients and the container runtime
//! - [`locator`]: implementation/version → client resolution
//! - [`store`]: topology and per-node state cache
//! - [`lifecycle`]: tiered start/stop, readiness, auto-mine
//! - [`topology`]: create/delete networks, add/remove nodes
//! - [`composite`]: multi-step operations (mint, deposit, channels, assets)
//! - [`file_runtime`]: offline runtime backed by the networks file

pub mod composite;
pub mod config;
pub mod error;
pub mod file_runtime;
pub mod lifecycle;
pub mod locator;
pub mod services;
pub mod store;
pub mod topology;

pub use composite::{
    CompositeEngine, DepositOutcome, MintAssetPayload, MintOutcome, OpenChannelPayload,
    SendAssetPayload,
};
pub use config::{EngineConfig, RetryPolicy};
pub use error::{EngineError, OperationStep};
pub use file_runtime::FileRuntime;
pub use lifecycle::{Orchestrator, PeerReport, StopReport};
pub use locator::{ServiceHandle, ServiceLocator, VersionSupport};
pub use services::{ServiceError, ServiceResult};
pub use store::{AllInfoReport, Field, NodeKey, StateStore};
pub use topology::{NodeCounts, NodeSpec};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the
/// default level. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
