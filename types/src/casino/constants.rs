/// Starting chips for new players
pub const STARTING_CHIPS: i64 = 1_000;

/// XP awarded per chip of positive profit
pub const XP_PER_PROFIT: i64 = 2;

/// Default session lifetime in seconds
pub const SESSION_EXPIRY_SECS: u64 = 120;

/// Session lifetime in seconds for fast games (slots, horse racing)
pub const FAST_SESSION_EXPIRY_SECS: u64 = 60;

/// Maximum length of a settings key
pub const MAX_SETTING_KEY_LENGTH: usize = 32;

/// Maximum length of a string settings value
pub const MAX_SETTING_VALUE_LENGTH: usize = 128;

// Progressive pools (chip-denominated; pools reset to their seed on a win).
pub const SLOTS_POOL: &str = "slots";
pub const GENERAL_POOL: &str = "general";
pub const SLOTS_SEED_JACKPOT: u64 = 100_000;
pub const GENERAL_SEED_JACKPOT: u64 = 50_000;
/// 1% of each slots wager feeds the slots pool
pub const SLOTS_CONTRIBUTION_BPS: u32 = 100;
/// 0.5% of every other wager feeds the general pool
pub const GENERAL_CONTRIBUTION_BPS: u32 = 50;
/// Pools below this amount cannot be won
pub const MINIMUM_JACKPOT_AMOUNT: u64 = 10_000;
/// Basis point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;
