//! Progressive jackpot pools.
//!
//! The set of pools is fixed once loaded, so the map itself is never locked. Each pool has its
//! own async mutex; no operation ever holds two pool locks.

use hrc_types::casino::{default_jackpots, JackpotRecord, JackpotStats, JackpotWin, UserId};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::BTreeMap, sync::Mutex};
use tokio::sync::Mutex as PoolLock;
use tracing::{info, warn};

use crate::{config::JackpotConfig, lock, metrics::Metrics, unix_now, Error, Result, Store};

/// Each chip of wager relative to the pool adds this much to the win probability.
const WAGER_INFLUENCE: f64 = 0.1;

/// Result of a draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JackpotDraw {
    pub pool: String,
    pub won: bool,
    /// Amount paid out (zero unless won)
    pub amount: u64,
}

pub struct JackpotLedger<S: Store> {
    store: S,
    pools: BTreeMap<String, PoolLock<JackpotRecord>>,
    win_floor: u64,
    rng: Mutex<StdRng>,
    metrics: Metrics,
}

impl<S: Store> JackpotLedger<S> {
    /// Load pools from the store, seeding any default pool it does not have.
    pub async fn load(store: S, config: &JackpotConfig, metrics: Metrics) -> Self {
        let mut records = match store.list_jackpots().await {
            Ok(records) => records,
            Err(e) => {
                warn!(?e, "failed to load jackpots, using defaults");
                Vec::new()
            }
        };
        let mut seeded = 0;
        for record in default_jackpots(unix_now()) {
            if records.iter().any(|stored| stored.name == record.name) {
                continue;
            }
            if let Err(e) = store.upsert_jackpot(&record).await {
                warn!(pool = %record.name, ?e, "failed to seed jackpot");
            }
            records.push(record);
            seeded += 1;
        }
        if seeded > 0 {
            info!(seeded, pools = records.len(), "seeded default jackpots");
        }

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            pools: records
                .into_iter()
                .map(|record| (record.name.clone(), PoolLock::new(record)))
                .collect(),
            win_floor: config.win_floor,
            rng: Mutex::new(rng),
            metrics,
        }
    }

    fn pool(&self, name: &str) -> Result<&PoolLock<JackpotRecord>> {
        self.pools
            .get(name)
            .ok_or_else(|| Error::UnknownPool(name.to_string()))
    }

    async fn persist(&self, record: &JackpotRecord, operation: &'static str) {
        if let Err(e) = self.store.upsert_jackpot(record).await {
            warn!(
                pool = %record.name,
                amount = record.amount,
                operation,
                ?e,
                "failed to persist jackpot"
            );
        }
    }

    /// Add a wager's contribution to `pool`, returning the chips added.
    ///
    /// The pool lock is released before the store write. A failed write is logged and not
    /// retried; the in-memory amount stays authoritative until the next successful write.
    pub async fn contribute(&self, pool: &str, wager: u64) -> Result<u64> {
        let (contribution, record) = {
            let mut record = self.pool(pool)?.lock().await;
            let contribution = record.contribution_for(wager);
            if contribution == 0 {
                return Ok(0);
            }
            record.amount = record.amount.saturating_add(contribution);
            record.updated_at = unix_now();
            (contribution, record.clone())
        };
        self.metrics.jackpot_contributions.inc_by(contribution);
        self.persist(&record, "contribute").await;
        Ok(contribution)
    }

    /// Draw for `pool` on behalf of `user`.
    ///
    /// Pools below the win floor never pay. Otherwise the chance is
    /// `base_probability * (1 + wager / amount * 0.1)`. A win pays the whole pool and resets it
    /// to its seed; the pool lock is held until the reset is persisted so no contribution can
    /// land in between.
    pub async fn try_win(
        &self,
        pool: &str,
        user: UserId,
        wager: u64,
        base_probability: f64,
    ) -> Result<JackpotDraw> {
        let mut record = self.pool(pool)?.lock().await;
        let miss = JackpotDraw {
            pool: pool.to_string(),
            won: false,
            amount: 0,
        };
        if record.amount < self.win_floor || record.amount == 0 {
            return Ok(miss);
        }

        let probability = base_probability
            * (1.0 + (wager as f64 / record.amount as f64) * WAGER_INFLUENCE);
        let probability = probability.clamp(0.0, 1.0);
        let sample: f64 = lock(&self.rng).gen();
        if sample >= probability {
            return Ok(miss);
        }

        let amount = record.amount;
        let now = unix_now();
        record.last_win = Some(JackpotWin {
            winner: user,
            amount,
            at: now,
        });
        record.amount = record.seed;
        record.updated_at = now;
        self.persist(&record, "win").await;
        self.metrics.jackpot_wins.inc();
        info!(pool, user, amount, "jackpot won");

        Ok(JackpotDraw {
            pool: pool.to_string(),
            won: true,
            amount,
        })
    }

    /// Add chips to a pool directly.
    pub async fn add_amount(&self, pool: &str, amount: u64) -> Result<u64> {
        let record = {
            let mut record = self.pool(pool)?.lock().await;
            record.amount = record.amount.saturating_add(amount);
            record.updated_at = unix_now();
            record.clone()
        };
        self.persist(&record, "add").await;
        info!(pool, amount, total = record.amount, "added to jackpot");
        Ok(record.amount)
    }

    /// Reset a pool to its seed and clear its win history.
    pub async fn reset(&self, pool: &str) -> Result<()> {
        let mut record = self.pool(pool)?.lock().await;
        record.amount = record.seed;
        record.last_win = None;
        record.updated_at = unix_now();
        self.persist(&record, "reset").await;
        info!(pool, seed = record.seed, "reset jackpot");
        Ok(())
    }

    pub async fn get(&self, pool: &str) -> Option<JackpotRecord> {
        let record = self.pools.get(pool)?;
        Some(record.lock().await.clone())
    }

    pub async fn all(&self) -> Vec<JackpotRecord> {
        let mut records = Vec::with_capacity(self.pools.len());
        for record in self.pools.values() {
            records.push(record.lock().await.clone());
        }
        records
    }

    pub fn pools(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    pub async fn stats(&self) -> JackpotStats {
        let mut stats = JackpotStats::default();
        for record in self.all().await {
            stats.pools += 1;
            stats.total_amount = stats.total_amount.saturating_add(record.amount);
            if let Some(win) = record.last_win {
                let newer = stats
                    .last_win
                    .as_ref()
                    .map_or(true, |(_, latest)| win.at > latest.at);
                if newer {
                    stats.last_win = Some((record.name, win));
                }
            }
        }
        stats
    }
}
