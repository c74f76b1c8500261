//! Error types for simnet-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{Implementation, Platform};
use crate::types::NetworkId;

/// All errors that can arise from topology and persistence operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The networks file exists but could not be parsed.
    #[error("failed to parse networks file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.simnet/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("network {0} not found")]
    NetworkNotFound(NetworkId),

    #[error("node '{node}' not found in network {network}")]
    NodeNotFound { network: NetworkId, node: String },

    #[error("node name '{node}' is already used in network {network}")]
    DuplicateNodeName { network: NetworkId, node: String },

    /// A lightning or asset node names a bitcoin backend that does not exist.
    #[error("node '{node}' references missing bitcoin backend '{backend}'")]
    MissingBackend { node: String, backend: String },

    /// An asset node names a lightning peer that does not exist.
    #[error("node '{node}' references missing lightning node '{lightning}'")]
    MissingLightningPeer { node: String, lightning: String },

    /// Removing the node would leave other nodes pointing at nothing.
    #[error("node '{node}' is still referenced by {}", .dependents.join(", "))]
    DanglingReference { node: String, dependents: Vec<String> },

    #[error("{implementation} is not supported on {platform}")]
    UnsupportedPlatform {
        implementation: Implementation,
        platform: Platform,
    },

    #[error("custom image '{0}' not found")]
    CustomImageNotFound(String),

    /// A node of the given implementation cannot be added to this network.
    #[error("cannot add {implementation} node: {reason}")]
    InvalidNode {
        implementation: Implementation,
        reason: String,
    },
}

/// Convenience constructor for [`NetworkError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> NetworkError {
    NetworkError::Io {
        path: path.into(),
        source,
    }
}
