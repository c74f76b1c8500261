use std::path::{Path, PathBuf};

use crate::types::NetworkId;

pub const SIMNET_DIR: &str = ".simnet";
pub const NETWORKS_FILE: &str = "networks.json";

pub fn simnet_root(home: &Path) -> PathBuf {
    home.join(SIMNET_DIR)
}

pub fn networks_dir(home: &Path) -> PathBuf {
    simnet_root(home).join("networks")
}

pub fn networks_file_path(home: &Path) -> PathBuf {
    networks_dir(home).join(NETWORKS_FILE)
}

/// Working directory of one network (compose file, node volumes).
pub fn network_dir(home: &Path, id: NetworkId) -> PathBuf {
    networks_dir(home).join(id.to_string())
}
