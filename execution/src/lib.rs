//! Economy and session concurrency engine.
//!
//! The engine owns four independently locked structures:
//! - [UserCache]: sharded TTL cache of user snapshots with hot/cold classification.
//! - [SessionRegistry]: one live session per (user, game kind), swept on expiry.
//! - [JackpotLedger]: progressive pools, one lock per pool.
//! - [AchievementEvaluator]: the catalog plus per-user debounce bookkeeping.
//!
//! [Engine] wires them to a [Store] and runs settlement, bonus claims and the background
//! sweeps. No lock ever spans more than one of these structures.

use hrc_types::casino::{AchievementId, BonusKind, GameKind, UserId};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod achievements;
pub mod cache;
pub mod config;
pub mod engine;
pub mod jackpot;
pub mod metrics;
pub mod session;
pub mod store;
pub mod tasks;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod integration_tests;

pub use achievements::{AchievementEvaluator, Unlocked};
pub use cache::UserCache;
pub use config::Config;
pub use engine::{BonusClaim, Engine, Notify, Settlement};
pub use jackpot::{JackpotDraw, JackpotLedger};
pub use metrics::Metrics;
pub use session::{GameState, Outcome, Session, SessionRegistry, SessionStats};
pub use store::{FileStore, Memory, Store, StoreError};
pub use tasks::{Spawner, Supervisor};

/// Error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("wager must be greater than zero")]
    InvalidWager,
    #[error("insufficient chips: have {have}, need {need}")]
    InsufficientFunds { have: i64, need: u64 },
    #[error("{kind} session already active for user {user}")]
    SessionExists { user: UserId, kind: GameKind },
    #[error("{kind} session for user {user} has expired")]
    SessionExpired { user: UserId, kind: GameKind },
    #[error("{kind} session for user {user} is already complete")]
    SessionComplete { user: UserId, kind: GameKind },
    #[error("unknown jackpot pool: {0}")]
    UnknownPool(String),
    #[error("unknown achievement: {0}")]
    UnknownAchievement(AchievementId),
    #[error("{kind} bonus available in {remaining_secs}s")]
    BonusNotReady {
        kind: BonusKind,
        remaining_secs: u64,
    },
    #[error("{kind} bonus claim already in progress for user {user}")]
    ClaimInProgress { user: UserId, kind: BonusKind },
    #[error("invalid setting: {0}")]
    InvalidSetting(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Wall clock in unix seconds (persisted timestamps).
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// Every structure guarded below is consistent between statements, so a panic in another
// holder leaves nothing half-written and the guard can be recovered.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::error!("recovering poisoned mutex");
        poisoned.into_inner()
    })
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!("recovering poisoned read lock");
        PoisonError::into_inner(poisoned)
    })
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!("recovering poisoned write lock");
        PoisonError::into_inner(poisoned)
    })
}
