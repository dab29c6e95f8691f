use hrc_execution::config::Config as EngineConfig;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;
use tracing::Level;

/// Configuration for the node process.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Document backing the store; in-memory when absent
    #[serde(default)]
    pub store_path: Option<String>,
    /// Seconds between metric snapshots in the log (0 disables them)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: usize },
    #[error("{field} must be within [0, 1] (got {value})")]
    InvalidRatio { field: &'static str, value: f64 },
    #[error("{kind} routes to unknown jackpot pool {pool}")]
    UnknownPool { kind: String, pool: String },
}

pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub worker_threads: usize,
    pub store_path: Option<PathBuf>,
    pub metrics_interval_secs: u64,
    pub engine: EngineConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            worker_threads: default_worker_threads(),
            store_path: None,
            metrics_interval_secs: default_metrics_interval(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "worker_threads",
                value: self.worker_threads,
            });
        }
        if self.engine.cache.shards == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "engine.cache.shards",
                value: self.engine.cache.shards,
            });
        }
        if self.engine.unlock_backlog == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "engine.unlock_backlog",
                value: self.engine.unlock_backlog,
            });
        }
        for (kind, table) in &self.engine.sessions.tables {
            if !(0.0..=1.0).contains(&table.min_wager_ratio) {
                return Err(ConfigError::InvalidRatio {
                    field: "engine.sessions.tables.min_wager_ratio",
                    value: table.min_wager_ratio,
                });
            }
            if let Some(pool) = &table.pool {
                if !hrc_types::casino::default_jackpots(0)
                    .iter()
                    .any(|record| &record.name == pool)
                {
                    return Err(ConfigError::UnknownPool {
                        kind: kind.to_string(),
                        pool: pool.clone(),
                    });
                }
            }
        }

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            worker_threads: self.worker_threads,
            store_path: self.store_path.map(PathBuf::from),
            metrics_interval_secs: self.metrics_interval_secs,
            engine: self.engine,
        })
    }
}

/// Install the global tracing subscriber.
pub fn init_telemetry(level: Level, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
