use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use simnet_core::{networks, paths};

/// Readiness polling schedule: up to `max_attempts` checks, sleeping
/// `initial_backoff_ms * multiplier^(n-1)` after the n-th failure, capped at
/// `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed check (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exp);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// At least one check is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Tunables shared by the orchestrator and the composite operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub readiness: RetryPolicy,
    /// Blocks mined after any on-chain step so it confirms.
    pub confirmation_blocks: u32,
    /// Deposit made when auto-funding a lightning wallet.
    pub auto_fund_sats: u64,
    /// Auto-funding triggers below this confirmed balance.
    pub min_mint_balance_sats: u64,
    /// Parent of every network's working directory.
    pub networks_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let networks_dir = networks::home()
            .map(|home| paths::networks_dir(&home))
            .unwrap_or_else(|_| PathBuf::from(paths::SIMNET_DIR).join("networks"));
        Self {
            readiness: RetryPolicy::default(),
            confirmation_blocks: 6,
            auto_fund_sats: 100_000,
            min_mint_balance_sats: 10_000,
            networks_dir,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at an explicit home directory.
    pub fn at(home: &std::path::Path) -> Self {
        Self {
            networks_dir: paths::networks_dir(home),
            ..Self::default()
        }
    }
}
