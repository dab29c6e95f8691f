use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Engine metrics, shared by clones.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_entries: Gauge,
    pub active_sessions: Gauge,
    pub settlements: Counter,
    pub settlement_failures: Counter,
    pub forfeits: Counter,
    pub jackpot_contributions: Counter,
    pub jackpot_wins: Counter,
    pub achievement_unlocks: Counter,
    pub bonus_claims: Counter,
}

impl Metrics {
    /// Register every metric under `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register("cache_hits", "User cache hits", self.cache_hits.clone());
        registry.register("cache_misses", "User cache misses", self.cache_misses.clone());
        registry.register(
            "cache_entries",
            "Entries held by the user cache",
            self.cache_entries.clone(),
        );
        registry.register(
            "active_sessions",
            "Registered game sessions",
            self.active_sessions.clone(),
        );
        registry.register(
            "settlements",
            "Sessions settled",
            self.settlements.clone(),
        );
        registry.register(
            "settlement_failures",
            "Settlements that failed to reach the store",
            self.settlement_failures.clone(),
        );
        registry.register(
            "forfeits",
            "Expired sessions forfeited by the sweeper",
            self.forfeits.clone(),
        );
        registry.register(
            "jackpot_contributions",
            "Chips contributed to jackpot pools",
            self.jackpot_contributions.clone(),
        );
        registry.register("jackpot_wins", "Jackpots won", self.jackpot_wins.clone());
        registry.register(
            "achievement_unlocks",
            "Achievements unlocked",
            self.achievement_unlocks.clone(),
        );
        registry.register("bonus_claims", "Bonuses claimed", self.bonus_claims.clone());
    }
}
