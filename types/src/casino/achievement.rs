use serde::{Deserialize, Serialize};

use super::UserSnapshot;

pub type AchievementId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FirstSteps,
    Wins,
    Wealth,
    Experience,
    Prestige,
    Gaming,
    Loyalty,
    Special,
}

/// Threshold an achievement checks against a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    Chips(i64),
    Wins(u64),
    TotalXp(i64),
    Prestige(u32),
    GamesPlayed(u64),
    DailyBonuses(u64),
    Votes(u64),
    /// Awarded explicitly by the engine, never by evaluation
    Special(i64),
}

impl Requirement {
    pub fn is_satisfied(&self, snapshot: &UserSnapshot) -> bool {
        match *self {
            Requirement::Chips(value) => snapshot.chips >= value,
            Requirement::Wins(value) => snapshot.wins >= value,
            Requirement::TotalXp(value) => snapshot.total_xp >= value,
            Requirement::Prestige(value) => snapshot.prestige >= value,
            Requirement::GamesPlayed(value) => snapshot.games_played() >= value,
            Requirement::DailyBonuses(value) => snapshot.daily_bonuses_claimed >= value,
            Requirement::Votes(value) => snapshot.votes >= value,
            Requirement::Special(_) => false,
        }
    }
}

/// Static catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: AchievementId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub requirement: Requirement,
    pub chips_reward: i64,
    pub xp_reward: i64,
    pub hidden: bool,
}

/// Record that a user earned an achievement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub user: super::UserId,
    pub achievement: AchievementId,
    pub earned_at: u64,
}

/// Id of the achievement granted to every newly seen user.
pub const WELCOME_ACHIEVEMENT: AchievementId = 1;
/// Won a game and finished holding exactly the requirement's value in chips.
pub const LUCKY_NUMBER_ACHIEVEMENT: AchievementId = 51;
/// Won a game with a wager of at least the requirement's value.
pub const HIGH_STAKES_ACHIEVEMENT: AchievementId = 52;

fn entry(
    id: AchievementId,
    name: &str,
    description: &str,
    category: Category,
    requirement: Requirement,
    chips_reward: i64,
    xp_reward: i64,
) -> AchievementDefinition {
    AchievementDefinition {
        id,
        name: name.to_string(),
        description: description.to_string(),
        category,
        requirement,
        chips_reward,
        xp_reward,
        hidden: matches!(category, Category::Special),
    }
}

/// Catalog used when the store has none (or cannot be reached).
pub fn default_catalog() -> Vec<AchievementDefinition> {
    use Category::*;
    use Requirement as R;

    vec![
        entry(1, "Welcome to the Casino", "Join the casino", FirstSteps, R::Special(0), 100, 50),
        entry(2, "First Win", "Win your first game", FirstSteps, R::Wins(1), 200, 100),
        entry(3, "Getting Started", "Play 5 games", FirstSteps, R::GamesPlayed(5), 300, 150),
        entry(4, "Daily Visitor", "Claim your first daily bonus", FirstSteps, R::DailyBonuses(1), 250, 100),
        entry(5, "Voter", "Vote for the casino", FirstSteps, R::Votes(1), 500, 200),
        entry(6, "Lucky Streak", "Win 10 games", Wins, R::Wins(10), 1_000, 500),
        entry(7, "Winner", "Win 25 games", Wins, R::Wins(25), 2_000, 1_000),
        entry(8, "Champion", "Win 50 games", Wins, R::Wins(50), 5_000, 2_500),
        entry(9, "Dominator", "Win 100 games", Wins, R::Wins(100), 10_000, 5_000),
        entry(10, "Unstoppable", "Win 250 games", Wins, R::Wins(250), 25_000, 12_500),
        entry(11, "First Thousand", "Hold 1,000 chips", Wealth, R::Chips(1_000), 500, 250),
        entry(12, "Five Grand", "Hold 5,000 chips", Wealth, R::Chips(5_000), 1_000, 500),
        entry(13, "Ten Thousand Club", "Hold 10,000 chips", Wealth, R::Chips(10_000), 2_000, 1_000),
        entry(14, "High Roller", "Hold 50,000 chips", Wealth, R::Chips(50_000), 10_000, 5_000),
        entry(15, "Millionaire", "Hold 1,000,000 chips", Wealth, R::Chips(1_000_000), 100_000, 50_000),
        entry(21, "Novice", "Reach 1,000 XP", Experience, R::TotalXp(1_000), 500, 0),
        entry(22, "Apprentice", "Reach 10,000 XP", Experience, R::TotalXp(10_000), 2_000, 0),
        entry(23, "Gambler", "Reach 40,000 XP", Experience, R::TotalXp(40_000), 5_000, 0),
        entry(24, "Card Shark", "Reach 350,000 XP", Experience, R::TotalXp(350_000), 50_000, 0),
        entry(25, "Legend", "Reach 2,000,000 XP", Experience, R::TotalXp(2_000_000), 200_000, 0),
        entry(26, "Reborn", "Prestige for the first time", Prestige, R::Prestige(1), 10_000, 0),
        entry(31, "Regular", "Claim 7 daily bonuses", Loyalty, R::DailyBonuses(7), 1_000, 500),
        entry(32, "Dedicated", "Claim 30 daily bonuses", Loyalty, R::DailyBonuses(30), 5_000, 2_500),
        entry(33, "Loyal Customer", "Claim 100 daily bonuses", Loyalty, R::DailyBonuses(100), 15_000, 7_500),
        entry(34, "Supporter", "Vote 10 times", Loyalty, R::Votes(10), 5_000, 2_500),
        entry(35, "True Fan", "Vote 50 times", Loyalty, R::Votes(50), 25_000, 12_500),
        entry(41, "Casual Player", "Play 50 games", Gaming, R::GamesPlayed(50), 2_500, 1_250),
        entry(42, "Active Gambler", "Play 200 games", Gaming, R::GamesPlayed(200), 7_500, 3_750),
        entry(43, "Veteran", "Play 500 games", Gaming, R::GamesPlayed(500), 20_000, 10_000),
        entry(44, "Addict", "Play 1,000 games", Gaming, R::GamesPlayed(1_000), 50_000, 25_000),
        entry(LUCKY_NUMBER_ACHIEVEMENT, "Lucky Number", "Win with exactly 777 chips", Special, R::Special(777), 7_777, 3_888),
        entry(HIGH_STAKES_ACHIEVEMENT, "High Stakes", "Win a bet of 100,000+ chips", Special, R::Special(100_000), 200_000, 100_000),
    ]
}
