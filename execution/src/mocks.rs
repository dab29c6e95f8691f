use futures::future::BoxFuture;
use hrc_types::casino::{
    AchievementDefinition, AchievementId, AchievementUnlock, JackpotRecord, UserDelta, UserId,
    UserSnapshot,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::watch;

use crate::{lock, Config, Engine, Memory, Metrics, Spawner, Store, StoreError};

/// Store wrapper that counts user writes and fails on demand.
#[derive(Clone)]
pub struct FlakyStore<S: Store = Memory> {
    inner: S,
    failing: Arc<AtomicBool>,
    failing_increments: Arc<AtomicBool>,
    increments: Arc<AtomicUsize>,
    increment_delay_ms: Arc<AtomicU64>,
}

impl<S: Store> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            failing_increments: Arc::new(AtomicBool::new(false)),
            increments: Arc::new(AtomicUsize::new(0)),
            increment_delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `increment_user` fail (or succeed again).
    pub fn fail_increments(&self, failing: bool) {
        self.failing_increments.store(failing, Ordering::SeqCst);
    }

    /// Successful `increment_user` calls so far.
    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }

    /// Sleep before applying each increment.
    pub fn delay_increments(&self, delay: Duration) {
        self.increment_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl<S: Store> Store for FlakyStore<S> {
    async fn get_or_create_user(&self, user: UserId) -> Result<UserSnapshot, StoreError> {
        self.check()?;
        self.inner.get_or_create_user(user).await
    }

    async fn increment_user(
        &self,
        user: UserId,
        delta: &UserDelta,
    ) -> Result<UserSnapshot, StoreError> {
        let delay = self.increment_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check()?;
        if self.failing_increments.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected increment failure".to_string()));
        }
        let snapshot = self.inner.increment_user(user, delta).await?;
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(snapshot)
    }

    async fn upsert_unlock(
        &self,
        user: UserId,
        achievement: AchievementId,
        reward: &UserDelta,
    ) -> Result<Option<UserSnapshot>, StoreError> {
        self.check()?;
        self.inner.upsert_unlock(user, achievement, reward).await
    }

    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StoreError> {
        self.check()?;
        self.inner.list_unlocks(user).await
    }

    async fn upsert_jackpot(&self, record: &JackpotRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_jackpot(record).await
    }

    async fn list_jackpots(&self) -> Result<Vec<JackpotRecord>, StoreError> {
        self.check()?;
        self.inner.list_jackpots().await
    }

    async fn list_catalog(&self) -> Result<Vec<AchievementDefinition>, StoreError> {
        self.check()?;
        self.inner.list_catalog().await
    }
}

/// Spawner that queues tasks until [Spawner::wait_idle] runs them in order.
pub struct Deferred {
    queue: Mutex<Vec<(&'static str, BoxFuture<'static, ()>)>>,
    shutdown: watch::Sender<bool>,
}

impl Default for Deferred {
    fn default() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue: Mutex::new(Vec::new()),
            shutdown,
        }
    }
}

impl Deferred {
    /// Labels of queued tasks.
    pub fn queued(&self) -> Vec<&'static str> {
        lock(&self.queue).iter().map(|(label, _)| *label).collect()
    }
}

impl Spawner for Deferred {
    fn spawn(&self, label: &'static str, task: BoxFuture<'static, ()>) {
        lock(&self.queue).push((label, task));
    }

    fn stopped(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    fn wait_idle(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let tasks = std::mem::take(&mut *lock(&self.queue));
                if tasks.is_empty() {
                    return;
                }
                for (_, task) in tasks {
                    task.await;
                }
            }
        })
    }
}

/// Engine configuration with deterministic draws and no debounce.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.jackpots.rng_seed = Some(0);
    config.achievements.debounce_secs = 0;
    config
}

/// Engine over a fresh [Memory] store.
pub async fn create_engine(config: Config) -> (Memory, Engine<Memory>) {
    let store = Memory::new();
    let engine = Engine::init(store.clone(), config, Metrics::default()).await;
    (store, engine)
}

/// Engine over a [FlakyStore] whose background tasks only run on `wait_idle`.
pub async fn create_deferred_engine(
    config: Config,
) -> (FlakyStore, Arc<Deferred>, Engine<FlakyStore>) {
    let store = FlakyStore::new(Memory::new());
    let spawner = Arc::new(Deferred::default());
    let engine =
        Engine::init_with_spawner(store.clone(), config, Metrics::default(), spawner.clone())
            .await;
    (store, spawner, engine)
}
