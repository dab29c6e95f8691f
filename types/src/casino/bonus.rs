use serde::{Deserialize, Serialize};
use std::fmt;

use super::{next_rank_xp, user_level, UserSnapshot};

/// Bonus rewards that can be claimed on a cooldown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    Hourly,
    Daily,
    Weekly,
    Vote,
    Server,
}

/// Bonus multiplier reached at max rank.
pub const MAX_RANK_MULTIPLIER: f64 = 1.3;
/// Multiplier added per prestige tier.
pub const PRESTIGE_MULTIPLIER: f64 = 0.08;
/// Cap on the prestige multiplier.
pub const MAX_PRESTIGE_MULTIPLIER: f64 = 1.75;

/// Static reward table entry of a bonus kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BonusTable {
    pub base: i64,
    pub per_prestige: i64,
    pub per_level: i64,
    pub xp: i64,
    pub cooldown_secs: u64,
}

impl BonusKind {
    pub const ALL: [BonusKind; 5] = [
        BonusKind::Hourly,
        BonusKind::Daily,
        BonusKind::Weekly,
        BonusKind::Vote,
        BonusKind::Server,
    ];

    pub fn table(&self) -> BonusTable {
        match self {
            BonusKind::Hourly => BonusTable {
                base: 25,
                per_prestige: 35,
                per_level: 10,
                xp: 50,
                cooldown_secs: 60 * 60,
            },
            BonusKind::Daily => BonusTable {
                base: 150,
                per_prestige: 250,
                per_level: 50,
                xp: 250,
                cooldown_secs: 24 * 60 * 60,
            },
            BonusKind::Weekly => BonusTable {
                base: 600,
                per_prestige: 1_100,
                per_level: 200,
                xp: 1_000,
                cooldown_secs: 7 * 24 * 60 * 60,
            },
            BonusKind::Vote => BonusTable {
                base: 250,
                per_prestige: 450,
                per_level: 85,
                xp: 500,
                cooldown_secs: 12 * 60 * 60,
            },
            BonusKind::Server => BonusTable {
                base: 500,
                per_prestige: 900,
                per_level: 175,
                xp: 750,
                cooldown_secs: 24 * 60 * 60,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BonusKind::Hourly => "hourly",
            BonusKind::Daily => "daily",
            BonusKind::Weekly => "weekly",
            BonusKind::Vote => "vote",
            BonusKind::Server => "server",
        }
    }
}

impl fmt::Display for BonusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computed reward for a bonus claim.
#[derive(Clone, Debug, PartialEq)]
pub struct BonusQuote {
    pub kind: BonusKind,
    pub base: i64,
    pub chips: i64,
    pub xp: i64,
    pub multiplier: f64,
}

/// Seconds until `kind` can be claimed again (zero when ready).
pub fn bonus_remaining(snapshot: &UserSnapshot, kind: BonusKind, now: u64) -> u64 {
    let Some(last) = snapshot.last_claim(kind) else {
        return 0;
    };
    let next = last.saturating_add(kind.table().cooldown_secs);
    next.saturating_sub(now)
}

/// Price a bonus claim for the given user.
pub fn quote_bonus(snapshot: &UserSnapshot, kind: BonusKind) -> BonusQuote {
    let table = kind.table();
    let level = user_level(snapshot.current_xp, snapshot.prestige) as i64;
    let amount =
        table.base + snapshot.prestige as i64 * table.per_prestige + level * table.per_level;

    // Rank progress scales toward the max-rank bonus
    let mut multiplier = 1.0;
    match next_rank_xp(snapshot.total_xp) {
        None => multiplier += MAX_RANK_MULTIPLIER - 1.0,
        Some(next) => {
            let progress = snapshot.total_xp as f64 / next as f64;
            multiplier += progress * (MAX_RANK_MULTIPLIER - 1.0);
        }
    }
    if snapshot.prestige > 0 {
        let prestige = (snapshot.prestige as f64 * PRESTIGE_MULTIPLIER)
            .min(MAX_PRESTIGE_MULTIPLIER - 1.0);
        multiplier += prestige;
    }

    BonusQuote {
        kind,
        base: table.base,
        chips: (amount as f64 * multiplier) as i64,
        xp: table.xp,
        multiplier,
    }
}
