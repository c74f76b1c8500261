//! Node registry catalog: which node kinds exist, which implementations
//! back each kind, and which docker images run them.
//!
//! Custom images are an implementation choice for an existing kind, never a
//! kind of their own. Platform support belongs to the implementation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::types::DockerRef;

// ---------------------------------------------------------------------------
// Kinds and platforms
// ---------------------------------------------------------------------------

/// The dependency tier a node belongs to. Ordering is startup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Bitcoin,
    Lightning,
    Tap,
}

impl NodeKind {
    /// Startup order; stop order is the reverse.
    pub const TIERS: [NodeKind; 3] = [NodeKind::Bitcoin, NodeKind::Lightning, NodeKind::Tap];
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Bitcoin => write!(f, "bitcoin"),
            NodeKind::Lightning => write!(f, "lightning"),
            NodeKind::Tap => write!(f, "tap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Mac => write!(f, "mac"),
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

const ALL_PLATFORMS: &[Platform] = &[Platform::Mac, Platform::Linux, Platform::Windows];
const UNIX_PLATFORMS: &[Platform] = &[Platform::Mac, Platform::Linux];

/// A concrete software build that can back a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Implementation {
    #[serde(rename = "bitcoind")]
    Bitcoind,
    #[serde(rename = "btcd")]
    Btcd,
    #[serde(rename = "LND")]
    Lnd,
    #[serde(rename = "c-lightning")]
    CLightning,
    #[serde(rename = "eclair")]
    Eclair,
    #[serde(rename = "litd")]
    Litd,
    #[serde(rename = "tapd")]
    Tapd,
}

impl Implementation {
    pub const ALL: [Implementation; 7] = [
        Implementation::Bitcoind,
        Implementation::Btcd,
        Implementation::Lnd,
        Implementation::CLightning,
        Implementation::Eclair,
        Implementation::Litd,
        Implementation::Tapd,
    ];

    pub fn kind(self) -> NodeKind {
        match self {
            Implementation::Bitcoind | Implementation::Btcd => NodeKind::Bitcoin,
            Implementation::Lnd
            | Implementation::CLightning
            | Implementation::Eclair
            | Implementation::Litd => NodeKind::Lightning,
            Implementation::Tapd => NodeKind::Tap,
        }
    }

    /// Serialized identifier, also accepted by [`FromStr`].
    pub fn id(self) -> &'static str {
        match self {
            Implementation::Bitcoind => "bitcoind",
            Implementation::Btcd => "btcd",
            Implementation::Lnd => "LND",
            Implementation::CLightning => "c-lightning",
            Implementation::Eclair => "eclair",
            Implementation::Litd => "litd",
            Implementation::Tapd => "tapd",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Implementation::Bitcoind => "Bitcoin Core",
            Implementation::Btcd => "btcd",
            Implementation::Lnd => "LND",
            Implementation::CLightning => "Core Lightning",
            Implementation::Eclair => "Eclair",
            Implementation::Litd => "Lightning Terminal",
            Implementation::Tapd => "Taproot Assets",
        }
    }

    /// Repository name under the managed `polarlightning/` docker namespace.
    pub fn repo_name(self) -> &'static str {
        match self {
            Implementation::Bitcoind => "bitcoind",
            Implementation::Btcd => "btcd",
            Implementation::Lnd => "lnd",
            Implementation::CLightning => "clightning",
            Implementation::Eclair => "eclair",
            Implementation::Litd => "litd",
            Implementation::Tapd => "tapd",
        }
    }

    pub fn latest_version(self) -> &'static str {
        match self {
            Implementation::Bitcoind => "27.0",
            Implementation::Btcd => "0.24.2",
            Implementation::Lnd => "0.18.3-beta",
            Implementation::CLightning => "24.08",
            Implementation::Eclair => "0.10.0",
            Implementation::Litd => "0.13.4-alpha",
            Implementation::Tapd => "0.4.1-alpha",
        }
    }

    pub fn platforms(self) -> &'static [Platform] {
        match self {
            Implementation::CLightning => UNIX_PLATFORMS,
            _ => ALL_PLATFORMS,
        }
    }

    pub fn supports(self, platform: Platform) -> bool {
        self.platforms().contains(&platform)
    }

    pub fn default_image(self, version: &str) -> String {
        format!("polarlightning/{}:{}", self.repo_name(), version)
    }

    pub fn default_command(self) -> &'static str {
        match self {
            Implementation::Bitcoind => {
                "bitcoind -server=1 -regtest=1 -rpcauth={{rpcUser}}:{{rpcAuth}} -debug=1 \
                 -zmqpubrawblock=tcp://0.0.0.0:28334 -zmqpubrawtx=tcp://0.0.0.0:28335 \
                 -txindex=1 -dnsseed=0 -upnp=0 -rpcbind=0.0.0.0 -rpcallowip=0.0.0.0/0 \
                 -rpcport=18443 -listen=1 -listenonion=0 -fallbackfee=0.0002"
            }
            Implementation::Btcd => {
                "btcd --regtest --rpcuser={{rpcUser}} --rpcpass={{rpcPass}} \
                 --rpclisten=0.0.0.0:18443 --txindex"
            }
            Implementation::Lnd => {
                "lnd --noseedbackup --trickledelay=5000 --alias={{name}} \
                 --externalip={{name}} --tlsextradomain={{name}} --listen=0.0.0.0:9735 \
                 --rpclisten=0.0.0.0:10009 --restlisten=0.0.0.0:8080 \
                 --bitcoin.active --bitcoin.regtest --bitcoin.node=bitcoind \
                 --bitcoind.rpchost={{backendName}} --bitcoind.rpcuser={{rpcUser}} \
                 --bitcoind.rpcpass={{rpcPass}}"
            }
            Implementation::CLightning => {
                "lightningd --alias={{name}} --addr={{name}} --network=regtest \
                 --bitcoin-rpcuser={{rpcUser}} --bitcoin-rpcpassword={{rpcPass}} \
                 --bitcoin-rpcconnect={{backendName}} --bitcoin-rpcport=18443"
            }
            Implementation::Eclair => {
                "polar-eclair --node-alias={{name}} --server.public-ips.0={{name}} \
                 --chain=regtest --bitcoind.host={{backendName}} \
                 --bitcoind.rpcuser={{rpcUser}} --bitcoind.rpcpassword={{rpcPass}}"
            }
            Implementation::Litd => {
                "litd --httpslisten=0.0.0.0:8443 --uipassword=polarpass \
                 --network=regtest --lnd-mode=integrated --lnd.alias={{name}} \
                 --lnd.bitcoind.rpchost={{backendName}}"
            }
            Implementation::Tapd => {
                "tapd --network=regtest --debuglevel=debug --tlsextradomain={{name}} \
                 --rpclisten=0.0.0.0:10029 --restlisten=0.0.0.0:8089 \
                 --lnd.host={{lndName}}:10009 --allow-public-uni-proof-courier"
            }
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Implementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Implementation::ALL
            .into_iter()
            .find(|imp| imp.id().eq_ignore_ascii_case(&lower))
            .ok_or_else(|| {
                let known: Vec<&str> = Implementation::ALL.iter().map(|i| i.id()).collect();
                format!("unknown implementation '{s}'; expected one of: {}", known.join(", "))
            })
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// A hard-coded image published under the managed docker namespace, with a
/// user-overridable startup command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedImage {
    pub implementation: Implementation,
    pub version: String,
    pub command: String,
}

/// A user-registered image that only exists in the local docker daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomImage {
    pub id: String,
    pub name: String,
    pub implementation: Implementation,
    pub docker_image: String,
    pub command: String,
}

impl CustomImage {
    pub fn is_supported_on(&self, platform: Platform) -> bool {
        self.implementation.supports(platform)
    }
}

/// The image customizations a host application has configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeImages {
    #[serde(default)]
    pub managed: Vec<ManagedImage>,
    #[serde(default)]
    pub custom: Vec<CustomImage>,
}

impl NodeImages {
    /// Docker reference for a managed implementation/version.
    ///
    /// An empty image means "use the managed image for this version"; the
    /// command falls back to the implementation default unless overridden.
    pub fn managed(&self, implementation: Implementation, version: &str) -> DockerRef {
        let command = self
            .managed
            .iter()
            .find(|m| m.implementation == implementation && m.version == version)
            .map(|m| m.command.clone())
            .unwrap_or_default();
        DockerRef {
            image: String::new(),
            command,
        }
    }

    pub fn custom(&self, id: &str) -> Result<&CustomImage, NetworkError> {
        self.custom
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| NetworkError::CustomImageNotFound(id.to_string()))
    }

    /// Checks platform support, then resolves the docker reference for a
    /// new node, preferring a custom image when `custom_id` is given.
    pub fn resolve(
        &self,
        implementation: Implementation,
        version: &str,
        custom_id: Option<&str>,
        platform: Platform,
    ) -> Result<(Implementation, DockerRef), NetworkError> {
        let (implementation, docker) = match custom_id {
            Some(id) => {
                let custom = self.custom(id)?;
                (
                    custom.implementation,
                    DockerRef {
                        image: custom.docker_image.clone(),
                        command: custom.command.clone(),
                    },
                )
            }
            None => (implementation, self.managed(implementation, version)),
        };
        if !implementation.supports(platform) {
            return Err(NetworkError::UnsupportedPlatform {
                implementation,
                platform,
            });
        }
        Ok((implementation, docker))
    }
}
