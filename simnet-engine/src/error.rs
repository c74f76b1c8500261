use std::fmt;

use thiserror::Error;

use simnet_core::{Implementation, NetworkError, NetworkId, NodeKind, Status};

use crate::services::ServiceError;
use crate::store::Field;

/// Error surface for orchestration, state fetches, and composite operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No registered adapter serves this implementation/version pair.
    #[error("no {kind} service registered for {implementation} {version}")]
    UnsupportedImplementation {
        kind: NodeKind,
        implementation: Implementation,
        version: String,
    },

    /// A node never reported ready within the readiness retry budget.
    #[error("node '{node}' did not come online after {attempts} attempts: {last_error}")]
    NodeUnreachable {
        node: String,
        attempts: u32,
        last_error: String,
    },

    /// Removing the node would leave other nodes pointing at nothing.
    #[error("node '{node}' is still referenced by {}", .dependents.join(", "))]
    DanglingReference { node: String, dependents: Vec<String> },

    /// Some fields of an aggregate fetch failed. The successful fields were
    /// committed to the state store.
    #[error("failed to fetch {} for node '{node}'", fmt_fields(.failed))]
    PartialFetchFailure {
        node: String,
        succeeded: Vec<Field>,
        failed: Vec<(Field, String)>,
    },

    /// A composite operation stopped at `step`. `committed` lists the steps
    /// that completed and were not rolled back.
    #[error("{operation} failed at step '{step}' after [{}]: {source}", fmt_steps(.committed))]
    OperationStepFailure {
        operation: &'static str,
        step: OperationStep,
        committed: Vec<OperationStep>,
        source: Box<EngineError>,
    },

    /// A node RPC returned an error.
    #[error("node '{node}': {source}")]
    Service {
        node: String,
        #[source]
        source: ServiceError,
    },

    /// The container runtime returned an error.
    #[error("container runtime error: {0}")]
    Runtime(#[source] ServiceError),

    #[error("network error: {0}")]
    Network(NetworkError),

    #[error("network {network} is {status}")]
    InvalidState { network: NetworkId, status: Status },

    /// A start was abandoned because the network was stopped meanwhile.
    #[error("start of network {network} was cancelled")]
    Cancelled { network: NetworkId },
}

impl From<NetworkError> for EngineError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::DanglingReference { node, dependents } => {
                EngineError::DanglingReference { node, dependents }
            }
            other => EngineError::Network(other),
        }
    }
}

impl EngineError {
    /// Closure mapping a [`ServiceError`] onto the node that produced it.
    pub(crate) fn service(node: &str) -> impl FnOnce(ServiceError) -> EngineError + '_ {
        move |source| EngineError::Service {
            node: node.to_string(),
            source,
        }
    }

    /// The innermost error behind any nesting of step failures.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::OperationStepFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation steps
// ---------------------------------------------------------------------------

/// One externally visible step of a composite operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStep {
    Resolve,
    AutoFund,
    CreateAddress,
    SendFunds,
    Mint,
    FinalizeBatch,
    MineConfirmations,
    FetchPeerInfo,
    ConnectPeer,
    OpenChannel,
    CloseChannel,
    CreateInvoice,
    PayInvoice,
    SendAsset,
    SyncUniverse,
    Refresh,
}

impl fmt::Display for OperationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationStep::Resolve => "resolve",
            OperationStep::AutoFund => "auto-fund",
            OperationStep::CreateAddress => "create-address",
            OperationStep::SendFunds => "send-funds",
            OperationStep::Mint => "mint",
            OperationStep::FinalizeBatch => "finalize-batch",
            OperationStep::MineConfirmations => "mine-confirmations",
            OperationStep::FetchPeerInfo => "fetch-peer-info",
            OperationStep::ConnectPeer => "connect-peer",
            OperationStep::OpenChannel => "open-channel",
            OperationStep::CloseChannel => "close-channel",
            OperationStep::CreateInvoice => "create-invoice",
            OperationStep::PayInvoice => "pay-invoice",
            OperationStep::SendAsset => "send-asset",
            OperationStep::SyncUniverse => "sync-universe",
            OperationStep::Refresh => "refresh",
        };
        f.write_str(label)
    }
}

fn fmt_steps(steps: &[OperationStep]) -> String {
    steps
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_fields(failed: &[(Field, String)]) -> String {
    failed
        .iter()
        .map(|(field, err)| format!("{field} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}
