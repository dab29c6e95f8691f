use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FAST_SESSION_EXPIRY_SECS, GENERAL_POOL, SESSION_EXPIRY_SECS, SLOTS_POOL};

/// Casino game kinds hosted by the engine.
///
/// The set is closed: every rule engine the platform runs has exactly one variant here, and
/// the engine keys sessions, expiry policy and jackpot routing off of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Baccarat,
    Blackjack,
    Craps,
    HigherOrLower,
    HorseRacing,
    Mines,
    Roulette,
    Slots,
    ThreeCardPoker,
}

impl GameKind {
    pub const ALL: [GameKind; 9] = [
        GameKind::Baccarat,
        GameKind::Blackjack,
        GameKind::Craps,
        GameKind::HigherOrLower,
        GameKind::HorseRacing,
        GameKind::Mines,
        GameKind::Roulette,
        GameKind::Slots,
        GameKind::ThreeCardPoker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GameKind::Baccarat => "baccarat",
            GameKind::Blackjack => "blackjack",
            GameKind::Craps => "craps",
            GameKind::HigherOrLower => "higher_or_lower",
            GameKind::HorseRacing => "horse_racing",
            GameKind::Mines => "mines",
            GameKind::Roulette => "roulette",
            GameKind::Slots => "slots",
            GameKind::ThreeCardPoker => "three_card_poker",
        }
    }

    /// Default lifetime of an idle session of this kind.
    pub fn default_expiry_secs(&self) -> u64 {
        match self {
            // Single-spin games resolve quickly; anything idle this long was abandoned.
            GameKind::Slots | GameKind::HorseRacing => FAST_SESSION_EXPIRY_SECS,
            _ => SESSION_EXPIRY_SECS,
        }
    }

    /// Progressive pool fed by wagers on this kind.
    pub fn default_pool(&self) -> &'static str {
        match self {
            GameKind::Slots => SLOTS_POOL,
            _ => GENERAL_POOL,
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
