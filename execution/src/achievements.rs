use hrc_types::casino::{
    default_catalog, AchievementDefinition, AchievementId, Requirement, UserId, UserSnapshot,
    HIGH_STAKES_ACHIEVEMENT, LUCKY_NUMBER_ACHIEVEMENT,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{config::AchievementConfig, lock, Store};

/// Broadcast when a user unlocks an achievement.
#[derive(Clone, Debug)]
pub struct Unlocked {
    pub user: UserId,
    pub achievement: Arc<AchievementDefinition>,
}

/// Achievement catalog plus per-user evaluation debounce.
///
/// Store access (reading unlocks, recording new ones, paying rewards) is driven by the engine;
/// this type only decides *whether* to evaluate and *what* is newly satisfied.
pub struct AchievementEvaluator {
    catalog: BTreeMap<AchievementId, Arc<AchievementDefinition>>,
    debounce: Duration,
    last_evaluated: Mutex<HashMap<UserId, Instant>>,
}

impl AchievementEvaluator {
    /// Load the catalog from the store, falling back to the built-in one.
    pub async fn load<S: Store>(store: &S, config: &AchievementConfig) -> Self {
        let catalog = match store.list_catalog().await {
            Ok(catalog) if !catalog.is_empty() => catalog,
            Ok(_) => default_catalog(),
            Err(e) => {
                warn!(?e, "failed to load achievement catalog, using defaults");
                default_catalog()
            }
        };
        Self::new(catalog, config.debounce())
    }

    pub fn new(catalog: Vec<AchievementDefinition>, debounce: Duration) -> Self {
        Self {
            catalog: catalog
                .into_iter()
                .map(|definition| (definition.id, Arc::new(definition)))
                .collect(),
            debounce,
            last_evaluated: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: AchievementId) -> Option<Arc<AchievementDefinition>> {
        self.catalog.get(&id).cloned()
    }

    pub fn catalog(&self) -> impl Iterator<Item = &Arc<AchievementDefinition>> {
        self.catalog.values()
    }

    /// Claim an evaluation slot for `user`.
    ///
    /// Returns `false` if the user was evaluated less than the debounce window ago.
    pub fn begin(&self, user: UserId, now: Instant) -> bool {
        let mut last_evaluated = lock(&self.last_evaluated);
        if let Some(last) = last_evaluated.get(&user) {
            if now.saturating_duration_since(*last) < self.debounce {
                debug!(user, "achievement evaluation debounced");
                return false;
            }
        }
        last_evaluated.insert(user, now);
        true
    }

    /// Catalog entries `snapshot` satisfies that are not in `unlocked`.
    pub fn pending(
        &self,
        snapshot: &UserSnapshot,
        unlocked: &HashSet<AchievementId>,
    ) -> Vec<Arc<AchievementDefinition>> {
        self.catalog
            .values()
            .filter(|definition| !unlocked.contains(&definition.id))
            .filter(|definition| definition.requirement.is_satisfied(snapshot))
            .cloned()
            .collect()
    }

    /// Special achievements earned by a winning settlement.
    pub fn triggered_by_win(&self, chips_after: i64, wager: u64) -> Vec<Arc<AchievementDefinition>> {
        let mut triggered = Vec::new();
        if let Some(lucky) = self.catalog.get(&LUCKY_NUMBER_ACHIEVEMENT) {
            if matches!(lucky.requirement, Requirement::Special(chips) if chips == chips_after) {
                triggered.push(lucky.clone());
            }
        }
        if let Some(high_stakes) = self.catalog.get(&HIGH_STAKES_ACHIEVEMENT) {
            if matches!(high_stakes.requirement, Requirement::Special(minimum) if minimum > 0 && wager >= minimum as u64)
            {
                triggered.push(high_stakes.clone());
            }
        }
        triggered
    }

    /// Forget users last evaluated more than two debounce windows ago.
    pub fn prune(&self, now: Instant) -> usize {
        let horizon = self.debounce * 2;
        let mut last_evaluated = lock(&self.last_evaluated);
        let before = last_evaluated.len();
        last_evaluated.retain(|_, last| now.saturating_duration_since(*last) <= horizon);
        before - last_evaluated.len()
    }

    /// Users with debounce bookkeeping.
    pub fn tracked(&self) -> usize {
        lock(&self.last_evaluated).len()
    }
}
