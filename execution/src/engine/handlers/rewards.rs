use super::super::*;
use crate::StoreError;
use hrc_types::casino::{AchievementId, WELCOME_ACHIEVEMENT};

impl<S: Store> Engine<S> {
    pub(crate) fn spawn_evaluation(
        &self,
        snapshot: UserSnapshot,
        triggered: Vec<Arc<AchievementDefinition>>,
    ) {
        let engine = self.clone();
        self.spawner.spawn(
            "achievements",
            Box::pin(async move {
                engine.evaluate_with(&snapshot, triggered).await;
            }),
        );
    }

    /// Grant `triggered` plus everything `snapshot` now satisfies.
    pub(crate) async fn evaluate_with(
        &self,
        snapshot: &UserSnapshot,
        triggered: Vec<Arc<AchievementDefinition>>,
    ) -> Vec<Arc<AchievementDefinition>> {
        let mut unlocked = Vec::new();
        for definition in triggered {
            match self.grant(snapshot.user, &definition).await {
                Ok(true) => unlocked.push(definition),
                Ok(false) => {}
                Err(e) => {
                    warn!(user = snapshot.user, achievement = definition.id, ?e, "failed to grant achievement")
                }
            }
        }
        unlocked.extend(self.evaluate_achievements(snapshot).await);
        unlocked
    }

    /// Unlock every catalog entry `snapshot` satisfies that the user does not have yet.
    ///
    /// Skipped if the user was evaluated within the debounce window. Store failures are
    /// logged and end the evaluation early.
    pub async fn evaluate_achievements(
        &self,
        snapshot: &UserSnapshot,
    ) -> Vec<Arc<AchievementDefinition>> {
        if !self.achievements.begin(snapshot.user, Instant::now()) {
            return Vec::new();
        }
        match self.unlock_satisfied(snapshot).await {
            Ok(unlocked) => unlocked,
            Err(e) => {
                warn!(user = snapshot.user, ?e, "achievement evaluation failed");
                Vec::new()
            }
        }
    }

    async fn unlock_satisfied(
        &self,
        snapshot: &UserSnapshot,
    ) -> std::result::Result<Vec<Arc<AchievementDefinition>>, StoreError> {
        let unlocked: HashSet<AchievementId> = self
            .store
            .list_unlocks(snapshot.user)
            .await?
            .into_iter()
            .map(|unlock| unlock.achievement)
            .collect();

        let mut granted = Vec::new();
        for definition in self.achievements.pending(snapshot, &unlocked) {
            if self.grant(snapshot.user, &definition).await? {
                granted.push(definition);
            }
        }
        Ok(granted)
    }

    /// Record the unlock and pay its reward in one store write. Returns `false` if the user
    /// already had it.
    async fn grant(
        &self,
        user: UserId,
        definition: &Arc<AchievementDefinition>,
    ) -> std::result::Result<bool, StoreError> {
        let reward = UserDelta::reward(definition.chips_reward, definition.xp_reward);
        let Some(snapshot) = self
            .store
            .upsert_unlock(user, definition.id, &reward)
            .await?
        else {
            return Ok(false);
        };
        self.cache.update(user, snapshot);

        self.metrics.achievement_unlocks.inc();
        info!(
            user,
            achievement = definition.id,
            name = %definition.name,
            chips = definition.chips_reward,
            "achievement unlocked"
        );
        // No subscribers is fine
        let _ = self.unlocks.send(Unlocked {
            user,
            achievement: definition.clone(),
        });
        Ok(true)
    }

    /// Explicitly award a catalog entry (how special achievements are earned).
    ///
    /// Returns `false` if the user already had it.
    pub async fn award_achievement(&self, user: UserId, id: AchievementId) -> Result<bool> {
        let definition = self
            .achievements
            .get(id)
            .ok_or(Error::UnknownAchievement(id))?;
        Ok(self.grant(user, &definition).await?)
    }

    /// Create the user's record if needed and grant the welcome achievement once.
    pub async fn welcome(&self, user: UserId) -> Result<bool> {
        self.load_user(user).await?;
        match self.achievements.get(WELCOME_ACHIEVEMENT) {
            Some(definition) => Ok(self.grant(user, &definition).await?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_deferred_engine, create_engine, test_config};
    use hrc_types::casino::{HIGH_STAKES_ACHIEVEMENT, LUCKY_NUMBER_ACHIEVEMENT, STARTING_CHIPS};

    #[tokio::test]
    async fn test_unlock_exactly_once() {
        let (store, engine) = create_engine(test_config()).await;
        let mut snapshot = UserSnapshot::new(1, 0);
        snapshot.wins = 1;

        let first = engine.evaluate_achievements(&snapshot).await;
        let second = engine.evaluate_achievements(&snapshot).await;
        assert!(first.iter().any(|a| a.id == 2));
        assert!(second.is_empty());

        // First Win (200) and First Thousand (500) paid once
        assert_eq!(store.user(1).unwrap().chips, STARTING_CHIPS + 700);
        assert_eq!(store.list_unlocks(1).await.unwrap().len(), first.len());
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_pay_once() {
        let (store, engine) = create_engine(test_config()).await;
        let mut snapshot = UserSnapshot::new(1, 0);
        snapshot.wins = 1;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let snapshot = snapshot.clone();
            handles.push(tokio::spawn(async move {
                engine.evaluate_achievements(&snapshot).await.len()
            }));
        }
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 2);
        assert_eq!(store.user(1).unwrap().chips, STARTING_CHIPS + 700);
    }

    #[tokio::test]
    async fn test_debounced_evaluation() {
        let mut config = test_config();
        config.achievements.debounce_secs = 30;
        let (store, engine) = create_engine(config).await;

        let snapshot = UserSnapshot::new(1, 0);
        assert_eq!(engine.evaluate_achievements(&snapshot).await.len(), 1);

        let mut later = snapshot.clone();
        later.wins = 1;
        assert!(engine.evaluate_achievements(&later).await.is_empty());
        assert_eq!(store.list_unlocks(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_award_special() {
        let (store, engine) = create_engine(test_config()).await;
        let mut unlocks = engine.subscribe_unlocks();

        assert!(engine.award_achievement(5, HIGH_STAKES_ACHIEVEMENT).await.unwrap());
        assert!(!engine.award_achievement(5, HIGH_STAKES_ACHIEVEMENT).await.unwrap());
        assert!(matches!(
            engine.award_achievement(5, 999).await,
            Err(Error::UnknownAchievement(999))
        ));

        let event = unlocks.recv().await.unwrap();
        assert_eq!(event.user, 5);
        assert_eq!(event.achievement.id, HIGH_STAKES_ACHIEVEMENT);
        assert_eq!(store.user(5).unwrap().chips, STARTING_CHIPS + 200_000);
    }

    #[tokio::test]
    async fn test_reward_survives_failed_user_writes() {
        let (store, _, engine) = create_deferred_engine(test_config()).await;

        // Reward is written with the unlock, not as a separate increment
        store.fail_increments(true);
        assert!(engine.award_achievement(1, HIGH_STAKES_ACHIEVEMENT).await.unwrap());
        assert_eq!(store.inner().user(1).unwrap().chips, STARTING_CHIPS + 200_000);
        assert_eq!(store.increments(), 0);
        store.fail_increments(false);

        // A failed grant records nothing, so the retry pays in full
        store.fail(true);
        assert!(matches!(
            engine.award_achievement(2, HIGH_STAKES_ACHIEVEMENT).await,
            Err(Error::Store(_))
        ));
        store.fail(false);
        assert!(store.list_unlocks(2).await.unwrap().is_empty());
        assert!(engine.award_achievement(2, HIGH_STAKES_ACHIEVEMENT).await.unwrap());
        assert!(!engine.award_achievement(2, HIGH_STAKES_ACHIEVEMENT).await.unwrap());

        let user = store.inner().user(2).unwrap();
        assert_eq!(user.chips, STARTING_CHIPS + 200_000);
        assert_eq!(user.total_xp, 100_000);
        assert_eq!(store.list_unlocks(2).await.unwrap().len(), 1);
        assert_eq!(engine.get_cached_user(2).unwrap().chips, user.chips);
    }

    #[tokio::test]
    async fn test_welcome_once() {
        let (store, engine) = create_engine(test_config()).await;
        assert!(engine.welcome(3).await.unwrap());
        assert!(!engine.welcome(3).await.unwrap());
        assert_eq!(store.user(3).unwrap().chips, STARTING_CHIPS + 100);
        assert_eq!(engine.get_cached_user(3).unwrap().chips, STARTING_CHIPS + 100);
    }

    #[tokio::test]
    async fn test_lucky_number_on_win() {
        let (store, spawner, engine) = create_deferred_engine(test_config()).await;
        store
            .inner()
            .increment_user(1, &UserDelta::chips(-300))
            .await
            .unwrap();
        let session = engine.open_session(1, GameKind::Slots, 100).await.unwrap();
        let settlement = engine.settle(&session, 77).await.unwrap();
        assert_eq!(settlement.snapshot.chips, 777);
        assert_eq!(spawner.queued(), vec!["achievements"]);

        spawner.wait_idle().await;
        let unlocked: Vec<_> = store
            .list_unlocks(1)
            .await
            .unwrap()
            .into_iter()
            .map(|unlock| unlock.achievement)
            .collect();
        assert!(unlocked.contains(&LUCKY_NUMBER_ACHIEVEMENT));
        assert!(unlocked.contains(&2));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let (store, _, engine) = create_deferred_engine(test_config()).await;
        store.fail(true);
        let mut snapshot = UserSnapshot::new(1, 0);
        snapshot.wins = 1;
        assert!(engine.evaluate_achievements(&snapshot).await.is_empty());
    }
}
