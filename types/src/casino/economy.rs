use serde::{Deserialize, Serialize};

use super::{
    UserId, BPS_DENOMINATOR, GENERAL_CONTRIBUTION_BPS, GENERAL_POOL, GENERAL_SEED_JACKPOT,
    SLOTS_CONTRIBUTION_BPS, SLOTS_POOL, SLOTS_SEED_JACKPOT,
};

/// The most recent win of a progressive pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackpotWin {
    pub winner: UserId,
    pub amount: u64,
    pub at: u64,
}

/// Persisted state of a progressive jackpot pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackpotRecord {
    pub name: String,
    pub amount: u64,
    /// Floor the pool resets to after a win
    pub seed: u64,
    pub contribution_bps: u32,
    pub last_win: Option<JackpotWin>,
    pub updated_at: u64,
}

impl JackpotRecord {
    pub fn new(name: &str, seed: u64, contribution_bps: u32, now: u64) -> Self {
        Self {
            name: name.to_string(),
            amount: seed,
            seed,
            contribution_bps,
            last_win: None,
            updated_at: now,
        }
    }

    /// Chips a wager contributes, rounded down.
    pub fn contribution_for(&self, wager: u64) -> u64 {
        let contribution =
            wager as u128 * self.contribution_bps as u128 / BPS_DENOMINATOR as u128;
        contribution.min(u64::MAX as u128) as u64
    }
}

/// Pools created when the store has none.
pub fn default_jackpots(now: u64) -> Vec<JackpotRecord> {
    vec![
        JackpotRecord::new(SLOTS_POOL, SLOTS_SEED_JACKPOT, SLOTS_CONTRIBUTION_BPS, now),
        JackpotRecord::new(
            GENERAL_POOL,
            GENERAL_SEED_JACKPOT,
            GENERAL_CONTRIBUTION_BPS,
            now,
        ),
    ]
}

/// Aggregate view across every pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackpotStats {
    pub total_amount: u64,
    pub pools: usize,
    /// Pool name and details of the most recent win across all pools
    pub last_win: Option<(String, JackpotWin)>,
}
