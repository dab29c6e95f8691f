use futures::future::BoxFuture;
use hrc_types::casino::{
    AchievementDefinition, BonusKind, GameKind, Scalar, UserDelta, UserId, UserSnapshot,
    MAX_SETTING_KEY_LENGTH, MAX_SETTING_VALUE_LENGTH,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    achievements::{AchievementEvaluator, Unlocked},
    cache::UserCache,
    jackpot::JackpotLedger,
    metrics::Metrics,
    session::{Outcome, Session, SessionRegistry},
    tasks::{Spawner, Supervisor},
    unix_now, Config, Error, Result, Store,
};

mod handlers;

pub use handlers::BonusClaim;

/// Where achievement evaluation runs after a settlement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Notify {
    /// Spawned in the background; the settlement reports no unlocks.
    #[default]
    Detached,
    /// Awaited before the settlement returns.
    Inline,
}

/// Economic result of a settled (or forfeited) session.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub user: UserId,
    pub kind: GameKind,
    pub wager: u64,
    pub profit: i64,
    pub xp_gained: i64,
    /// Whether the result counted toward wins and losses
    pub counted: bool,
    pub forfeited: bool,
    /// Chips the wager added to the kind's jackpot pool
    pub contribution: u64,
    /// Record as returned by the store write
    pub snapshot: UserSnapshot,
    /// Achievements unlocked by this settlement (inline evaluation only)
    pub unlocked: Vec<Arc<AchievementDefinition>>,
}

/// The economy and session engine.
///
/// Clones share all state.
#[derive(Clone)]
pub struct Engine<S: Store> {
    config: Arc<Config>,
    store: S,
    cache: Arc<UserCache>,
    sessions: Arc<SessionRegistry>,
    jackpots: Arc<JackpotLedger<S>>,
    achievements: Arc<AchievementEvaluator>,
    spawner: Arc<dyn Spawner>,
    unlocks: broadcast::Sender<Unlocked>,
    claims: Arc<Mutex<HashSet<(UserId, BonusKind)>>>,
    metrics: Metrics,
}

impl<S: Store> Engine<S> {
    /// Load jackpots and the achievement catalog from `store` and build the engine.
    ///
    /// Background sweeps do not run until [Engine::start].
    pub async fn init(store: S, config: Config, metrics: Metrics) -> Self {
        Self::init_with_spawner(store, config, metrics, Arc::new(Supervisor::new())).await
    }

    pub async fn init_with_spawner(
        store: S,
        config: Config,
        metrics: Metrics,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        let jackpots = JackpotLedger::load(store.clone(), &config.jackpots, metrics.clone()).await;
        let achievements = AchievementEvaluator::load(&store, &config.achievements).await;
        let (unlocks, _) = broadcast::channel(config.unlock_backlog.max(1));
        info!(
            pools = jackpots.pools().count(),
            achievements = achievements.catalog().count(),
            cache = config.cache.enabled,
            "engine initialized"
        );
        Self {
            cache: Arc::new(UserCache::new(&config.cache, metrics.clone())),
            sessions: Arc::new(SessionRegistry::new(metrics.clone())),
            jackpots: Arc::new(jackpots),
            achievements: Arc::new(achievements),
            config: Arc::new(config),
            store,
            spawner,
            unlocks,
            claims: Arc::new(Mutex::new(HashSet::new())),
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &UserCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn jackpots(&self) -> &JackpotLedger<S> {
        &self.jackpots
    }

    pub fn achievements(&self) -> &AchievementEvaluator {
        &self.achievements
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Receive every unlock from now on.
    pub fn subscribe_unlocks(&self) -> broadcast::Receiver<Unlocked> {
        self.unlocks.subscribe()
    }

    /// Resolve once all background work spawned so far has finished.
    pub fn wait_idle(&self) -> BoxFuture<'_, ()> {
        self.spawner.wait_idle()
    }

    /// Signal the sweeps to stop and wait for in-flight background work.
    pub async fn shutdown(&self) {
        self.spawner.stop();
        self.spawner.wait_idle().await;
        info!(sessions = self.sessions.len(), "engine stopped");
    }

    /// Cached record, else the store's. Store failures are returned.
    pub async fn load_user(&self, user: UserId) -> Result<UserSnapshot> {
        if let Some(snapshot) = self.cache.get(user) {
            return Ok(snapshot.as_ref().clone());
        }
        let snapshot = self.store.get_or_create_user(user).await?;
        self.cache.set(user, snapshot.clone());
        Ok(snapshot)
    }

    /// Like [Engine::load_user], but serves an uncached default record if the store is down.
    pub async fn get_user(&self, user: UserId) -> UserSnapshot {
        match self.load_user(user).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user, ?e, "store unavailable, serving ephemeral user");
                UserSnapshot::new(user, unix_now())
            }
        }
    }

    /// Read-only handle to the cached record, without touching the store.
    pub fn get_cached_user(&self, user: UserId) -> Option<Arc<UserSnapshot>> {
        self.cache.get(user)
    }

    /// Drop the cached record so the next read goes to the store.
    pub fn invalidate_user(&self, user: UserId) -> bool {
        self.cache.delete(user)
    }

    /// Check `user` can cover `amount`, returning the record used for the check.
    pub async fn validate_wager(&self, user: UserId, amount: u64) -> Result<UserSnapshot> {
        if amount == 0 {
            return Err(Error::InvalidWager);
        }
        let snapshot = self.load_user(user).await?;
        if (snapshot.chips.max(0) as u64) < amount {
            return Err(Error::InsufficientFunds {
                have: snapshot.chips,
                need: amount,
            });
        }
        Ok(snapshot)
    }

    /// Validate the wager and register a new session, capturing the pre-game balance.
    pub async fn open_session(
        &self,
        user: UserId,
        kind: GameKind,
        wager: u64,
    ) -> Result<Arc<Session>> {
        if self
            .sessions
            .get(kind, user)
            .is_some_and(|existing| !existing.is_terminal())
        {
            return Err(Error::SessionExists { user, kind });
        }
        let snapshot = self.validate_wager(user, wager).await?;
        let session = Arc::new(Session::new(
            user,
            kind,
            wager,
            snapshot.chips,
            self.config.sessions.min_wager_ratio(kind),
            self.config.sessions.expiry(kind),
        ));
        self.sessions.register(session.clone())?;
        debug!(user, %kind, wager, "opened session");
        Ok(session)
    }

    pub fn session(&self, kind: GameKind, user: UserId) -> Option<Arc<Session>> {
        self.sessions.get(kind, user)
    }

    /// End a session with no economic effect. Returns `false` if it already ended.
    pub async fn cancel_session(&self, session: &Arc<Session>) -> bool {
        let mut outcome = session.outcome.lock().await;
        if !matches!(*outcome, Outcome::Pending) {
            return false;
        }
        *outcome = Outcome::Cancelled;
        session.mark_terminal();
        drop(outcome);

        self.sessions.release(session);
        info!(user = session.user(), kind = %session.kind(), "cancelled session");
        true
    }

    /// Store a display preference for `user`.
    pub async fn set_setting(
        &self,
        user: UserId,
        key: &str,
        value: Scalar,
    ) -> Result<UserSnapshot> {
        if key.is_empty() || key.len() > MAX_SETTING_KEY_LENGTH {
            return Err(Error::InvalidSetting("key length"));
        }
        if matches!(&value, Scalar::Text(text) if text.len() > MAX_SETTING_VALUE_LENGTH) {
            return Err(Error::InvalidSetting("value length"));
        }
        if matches!(value, Scalar::Float(float) if !float.is_finite()) {
            return Err(Error::InvalidSetting("non-finite value"));
        }
        let delta = UserDelta {
            setting: Some((key.to_string(), value)),
            ..UserDelta::default()
        };
        let snapshot = self.store.increment_user(user, &delta).await?;
        self.cache.update(user, snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_engine, test_config, FlakyStore};
    use crate::Memory;
    use hrc_types::casino::STARTING_CHIPS;

    #[tokio::test]
    async fn test_get_user_populates_cache() {
        let (_, engine) = create_engine(test_config()).await;
        assert!(engine.get_cached_user(4).is_none());
        let user = engine.get_user(4).await;
        assert_eq!(user.chips, STARTING_CHIPS);
        assert_eq!(engine.get_cached_user(4).unwrap().as_ref(), &user);
    }

    #[tokio::test]
    async fn test_get_user_falls_back_when_store_down() {
        let store = FlakyStore::new(Memory::new());
        let engine = Engine::init(store.clone(), test_config(), Metrics::default()).await;
        store.fail(true);

        let user = engine.get_user(4).await;
        assert_eq!(user.chips, STARTING_CHIPS);
        assert!(engine.get_cached_user(4).is_none());
        assert!(matches!(
            engine.validate_wager(4, 10).await,
            Err(Error::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_wager() {
        let (_, engine) = create_engine(test_config()).await;
        assert!(matches!(
            engine.validate_wager(1, 0).await,
            Err(Error::InvalidWager)
        ));
        assert!(matches!(
            engine.validate_wager(1, 1_001).await,
            Err(Error::InsufficientFunds { have: 1_000, need: 1_001 })
        ));
        assert_eq!(engine.validate_wager(1, 1_000).await.unwrap().chips, 1_000);
    }

    #[tokio::test]
    async fn test_open_session_rejects_duplicates() {
        let (_, engine) = create_engine(test_config()).await;
        let session = engine.open_session(1, GameKind::Blackjack, 100).await.unwrap();
        assert_eq!(session.pre_game_chips(), STARTING_CHIPS);
        assert!(matches!(
            engine.open_session(1, GameKind::Blackjack, 100).await,
            Err(Error::SessionExists { .. })
        ));
        assert!(engine.open_session(1, GameKind::Roulette, 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_session() {
        let (store, engine) = create_engine(test_config()).await;
        let session = engine.open_session(1, GameKind::Craps, 100).await.unwrap();
        assert!(engine.cancel_session(&session).await);
        assert!(!engine.cancel_session(&session).await);
        assert!(engine.session(GameKind::Craps, 1).is_none());
        assert!(matches!(
            engine.settle(&session, 50).await,
            Err(Error::SessionComplete { .. })
        ));
        assert_eq!(store.user(1).unwrap().chips, STARTING_CHIPS);

        // The slot is free again
        assert!(engine.open_session(1, GameKind::Craps, 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_setting() {
        let (store, engine) = create_engine(test_config()).await;
        let snapshot = engine
            .set_setting(1, "show_level", Scalar::Bool(true))
            .await
            .unwrap();
        assert_eq!(snapshot.settings.get("show_level"), Some(&Scalar::Bool(true)));
        assert_eq!(store.user(1).unwrap().settings.len(), 1);
        assert!(matches!(
            engine.set_setting(1, "", Scalar::Int(1)).await,
            Err(Error::InvalidSetting(_))
        ));
        assert!(matches!(
            engine
                .set_setting(1, "title", Scalar::Text("x".repeat(200)))
                .await,
            Err(Error::InvalidSetting(_))
        ));
    }
}
