//! Persisted networks file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.simnet/
//!   networks/
//!     networks.json      (all networks + chart layouts, mode 0600)
//!     <network_id>/      (per-network working directory)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use crate::error::{io_err, NetworkError};
use crate::paths::{network_dir, networks_dir, networks_file_path};
use crate::types::{NetworkId, NetworksFile};

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.simnet/networks/networks.json`.
///
/// A missing file is not an error: an empty [`NetworksFile`] is returned.
/// Malformed JSON yields `NetworkError::Parse` with the file path.
pub fn load_at(home: &Path) -> Result<NetworksFile, NetworkError> {
    let path = networks_file_path(home);
    if !path.exists() {
        return Ok(NetworksFile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|e| NetworkError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<NetworksFile, NetworkError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 2. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the networks file.
///
/// Write flow: serialize → `networks.json.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, file: &NetworksFile) -> Result<(), NetworkError> {
    let dir = networks_dir(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = networks_file_path(home);
    let tmp_path = path.with_file_name("networks.json.tmp");

    let json = serde_json::to_string_pretty(file)?;
    std::fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(file: &NetworksFile) -> Result<(), NetworkError> {
    save_at(&home()?, file)
}

// ---------------------------------------------------------------------------
// 3. Network ids and directories
// ---------------------------------------------------------------------------

/// Next unused network id (ids start at 1).
pub fn next_network_id(file: &NetworksFile) -> NetworkId {
    file.networks.iter().map(|n| n.id).max().unwrap_or(0) + 1
}

/// Creates the working directory for a network and returns it.
pub fn create_network_dir_at(home: &Path, id: NetworkId) -> Result<PathBuf, NetworkError> {
    let dir = network_dir(home, id);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// Removes a network's working directory. Missing directories are ignored.
pub fn remove_network_dir_at(home: &Path, id: NetworkId) -> Result<(), NetworkError> {
    let dir = network_dir(home, id);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&dir, e)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, NetworkError> {
    dirs::home_dir().ok_or(NetworkError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), NetworkError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), NetworkError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), NetworkError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), NetworkError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
