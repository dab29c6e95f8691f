/// A rank tier unlocked by lifetime XP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rank {
    pub name: &'static str,
    pub xp_required: i64,
}

pub const RANKS: [Rank; 8] = [
    Rank { name: "Novice", xp_required: 0 },
    Rank { name: "Apprentice", xp_required: 10_000 },
    Rank { name: "Gambler", xp_required: 40_000 },
    Rank { name: "High Roller", xp_required: 125_000 },
    Rank { name: "Card Shark", xp_required: 350_000 },
    Rank { name: "Pit Boss", xp_required: 650_000 },
    Rank { name: "Legend", xp_required: 2_000_000 },
    Rank { name: "Casino Elite", xp_required: 4_500_000 },
];

/// Index into [RANKS] of the highest rank reached with `total_xp`.
pub fn rank_level(total_xp: i64) -> usize {
    RANKS
        .iter()
        .rposition(|rank| total_xp >= rank.xp_required)
        .unwrap_or(0)
}

pub fn rank_for(total_xp: i64) -> Rank {
    RANKS[rank_level(total_xp)]
}

/// XP needed for the next rank, or `None` at max rank.
pub fn next_rank_xp(total_xp: i64) -> Option<i64> {
    RANKS.get(rank_level(total_xp) + 1).map(|rank| rank.xp_required)
}

/// XP requirement of a level, compounded by 20% per prestige tier.
pub fn xp_for_level(level: usize, prestige: u32) -> i64 {
    let Some(rank) = RANKS.get(level) else {
        return 0;
    };
    let mut required = rank.xp_required as f64;
    for _ in 0..prestige {
        required *= 1.2;
    }
    required as i64
}

/// Highest level reached with `current_xp` at the given prestige tier.
pub fn user_level(current_xp: i64, prestige: u32) -> usize {
    let mut level = 0;
    for candidate in 0..RANKS.len() {
        if current_xp < xp_for_level(candidate, prestige) {
            break;
        }
        level = candidate;
    }
    level
}
