use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{BonusKind, STARTING_CHIPS};

/// Opaque chat-platform user identity.
pub type UserId = u64;

/// A settings value attached to a user (opt-in display features).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Economic state of a user at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user: UserId,
    pub chips: i64,
    /// Lifetime XP (drives rank)
    pub total_xp: i64,
    /// Spendable XP (drives level within the current prestige tier)
    pub current_xp: i64,
    pub prestige: u32,
    pub wins: u64,
    pub losses: u64,
    pub daily_bonuses_claimed: u64,
    pub votes: u64,
    /// Unix seconds of the last claim, per bonus kind
    #[serde(default)]
    pub last_claims: BTreeMap<BonusKind, u64>,
    #[serde(default)]
    pub settings: BTreeMap<String, Scalar>,
    pub created_at: u64,
}

impl UserSnapshot {
    /// Snapshot of a user that has never been seen before.
    pub fn new(user: UserId, created_at: u64) -> Self {
        Self {
            user,
            chips: STARTING_CHIPS,
            total_xp: 0,
            current_xp: 0,
            prestige: 0,
            wins: 0,
            losses: 0,
            daily_bonuses_claimed: 0,
            votes: 0,
            last_claims: BTreeMap::new(),
            settings: BTreeMap::new(),
            created_at,
        }
    }

    pub fn games_played(&self) -> u64 {
        self.wins.saturating_add(self.losses)
    }

    pub fn can_afford(&self, amount: i64) -> bool {
        self.chips >= amount
    }

    /// Win rate as a percentage (0 when no counted games exist).
    pub fn win_rate(&self) -> f64 {
        let played = self.games_played();
        if played == 0 {
            return 0.0;
        }
        self.wins as f64 / played as f64 * 100.0
    }

    pub fn net_profit(&self) -> i64 {
        self.chips - STARTING_CHIPS
    }

    pub fn last_claim(&self, kind: BonusKind) -> Option<u64> {
        self.last_claims.get(&kind).copied()
    }
}

/// A conditional increment against a user record.
///
/// Counters are added to whatever the store currently holds (never a read-modify-write of a
/// cached copy); the optional fields are absolute assignments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDelta {
    pub chips: i64,
    pub total_xp: i64,
    pub current_xp: i64,
    pub wins: u64,
    pub losses: u64,
    pub daily_bonuses_claimed: u64,
    pub votes: u64,
    pub prestige: Option<u32>,
    pub claim: Option<(BonusKind, u64)>,
    pub setting: Option<(String, Scalar)>,
}

impl UserDelta {
    pub fn chips(chips: i64) -> Self {
        Self {
            chips,
            ..Self::default()
        }
    }

    /// Chip and XP reward (both XP pools), as granted by achievements and jackpots.
    pub fn reward(chips: i64, xp: i64) -> Self {
        Self {
            chips,
            total_xp: xp,
            current_xp: xp,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the delta to a record in place.
    ///
    /// Returns `true` if the chip balance had to be floored at zero.
    pub fn apply(&self, snapshot: &mut UserSnapshot) -> bool {
        let chips = snapshot.chips.saturating_add(self.chips);
        let clamped = chips < 0;
        snapshot.chips = chips.max(0);
        snapshot.total_xp = snapshot.total_xp.saturating_add(self.total_xp).max(0);
        snapshot.current_xp = snapshot.current_xp.saturating_add(self.current_xp).max(0);
        snapshot.wins = snapshot.wins.saturating_add(self.wins);
        snapshot.losses = snapshot.losses.saturating_add(self.losses);
        snapshot.daily_bonuses_claimed = snapshot
            .daily_bonuses_claimed
            .saturating_add(self.daily_bonuses_claimed);
        snapshot.votes = snapshot.votes.saturating_add(self.votes);
        if let Some(prestige) = self.prestige {
            snapshot.prestige = prestige;
        }
        if let Some((kind, at)) = self.claim {
            snapshot.last_claims.insert(kind, at);
        }
        if let Some((key, value)) = &self.setting {
            snapshot.settings.insert(key.clone(), value.clone());
        }
        clamped
    }
}
