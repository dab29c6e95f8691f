use hrc_types::casino::{GameKind, XP_PER_PROFIT};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

/// Configuration for the [crate::Engine].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub achievements: AchievementConfig,
    #[serde(default)]
    pub jackpots: JackpotConfig,
    /// XP granted per chip of profit
    #[serde(default = "default_xp_per_profit")]
    pub xp_per_profit: i64,
    /// Capacity of the unlock broadcast channel
    #[serde(default = "default_unlock_backlog")]
    pub unlock_backlog: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            sessions: SessionConfig::default(),
            achievements: AchievementConfig::default(),
            jackpots: JackpotConfig::default(),
            xp_per_profit: default_xp_per_profit(),
            unlock_backlog: default_unlock_backlog(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_hot_ttl")]
    pub hot_ttl_secs: u64,
    /// Reads after which an entry is considered hot
    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: u64,
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_cache_sweep")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            hot_ttl_secs: default_hot_ttl(),
            hot_threshold: default_hot_threshold(),
            shards: default_shards(),
            sweep_interval_secs: default_cache_sweep(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn hot_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Per game kind session policy.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TableConfig {
    /// Idle lifetime of a session (kind default when unset)
    #[serde(default)]
    pub expiry_secs: Option<u64>,
    /// Fraction of the pre-game balance a wager must reach for the result to count toward
    /// wins and losses (0 always counts)
    #[serde(default)]
    pub min_wager_ratio: f64,
    /// Jackpot pool fed by wagers (kind default when unset)
    #[serde(default)]
    pub pool: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_sweep")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub tables: BTreeMap<GameKind, TableConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_session_sweep(),
            tables: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn expiry(&self, kind: GameKind) -> Duration {
        let secs = self
            .tables
            .get(&kind)
            .and_then(|table| table.expiry_secs)
            .unwrap_or_else(|| kind.default_expiry_secs());
        Duration::from_secs(secs)
    }

    pub fn min_wager_ratio(&self, kind: GameKind) -> f64 {
        self.tables
            .get(&kind)
            .map(|table| table.min_wager_ratio)
            .unwrap_or(0.0)
    }

    pub fn pool(&self, kind: GameKind) -> &str {
        self.tables
            .get(&kind)
            .and_then(|table| table.pool.as_deref())
            .unwrap_or_else(|| kind.default_pool())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AchievementConfig {
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
    #[serde(default = "default_prune")]
    pub prune_interval_secs: u64,
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce(),
            prune_interval_secs: default_prune(),
        }
    }
}

impl AchievementConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JackpotConfig {
    /// Pools below this amount cannot be won
    #[serde(default = "default_win_floor")]
    pub win_floor: u64,
    /// Seed for the draw RNG (entropy when unset)
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            win_floor: default_win_floor(),
            rng_seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_hot_ttl() -> u64 {
    30
}

fn default_hot_threshold() -> u64 {
    10
}

fn default_shards() -> usize {
    16
}

fn default_cache_sweep() -> u64 {
    60
}

fn default_session_sweep() -> u64 {
    90
}

fn default_debounce() -> u64 {
    30
}

fn default_prune() -> u64 {
    300
}

fn default_win_floor() -> u64 {
    hrc_types::casino::MINIMUM_JACKPOT_AMOUNT
}

fn default_xp_per_profit() -> i64 {
    XP_PER_PROFIT
}

fn default_unlock_backlog() -> usize {
    1_024
}
