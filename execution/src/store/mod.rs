//! Durable store behind the engine.
//!
//! Every mutation the engine issues is a conditional increment ([UserDelta]) or an
//! upsert; no caller ever writes back a full record it read earlier. That keeps concurrent
//! settlements of the same user from overwriting each other's counters.

use hrc_types::casino::{
    AchievementDefinition, AchievementId, AchievementUnlock, JackpotRecord, UserDelta, UserId,
    UserSnapshot,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::warn;

use crate::{lock, unix_now};

mod file;
pub use file::FileStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait Store: Clone + Send + Sync + 'static {
    /// Read a user record, creating it with the starting balance if absent.
    fn get_or_create_user(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<UserSnapshot, StoreError>> + Send;

    /// Apply `delta` to whatever the store currently holds and return the new record.
    ///
    /// Chips never go below zero.
    fn increment_user(
        &self,
        user: UserId,
        delta: &UserDelta,
    ) -> impl Future<Output = Result<UserSnapshot, StoreError>> + Send;

    /// Record an unlock and apply its `reward` in the same write.
    ///
    /// Returns the rewarded record, or `None` (and changes nothing) if the user already had
    /// the unlock.
    fn upsert_unlock(
        &self,
        user: UserId,
        achievement: AchievementId,
        reward: &UserDelta,
    ) -> impl Future<Output = Result<Option<UserSnapshot>, StoreError>> + Send;

    fn list_unlocks(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<AchievementUnlock>, StoreError>> + Send;

    fn upsert_jackpot(
        &self,
        record: &JackpotRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_jackpots(&self) -> impl Future<Output = Result<Vec<JackpotRecord>, StoreError>> + Send;

    /// Achievement catalog (empty if the store never had one seeded).
    fn list_catalog(
        &self,
    ) -> impl Future<Output = Result<Vec<AchievementDefinition>, StoreError>> + Send;
}

/// Every table the engine persists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    users: HashMap<UserId, UserSnapshot>,
    #[serde(default)]
    unlocks: HashMap<UserId, BTreeMap<AchievementId, AchievementUnlock>>,
    #[serde(default)]
    jackpots: BTreeMap<String, JackpotRecord>,
    #[serde(default)]
    catalog: Vec<AchievementDefinition>,
}

impl Tables {
    fn get_or_create_user(&mut self, user: UserId) -> UserSnapshot {
        self.users
            .entry(user)
            .or_insert_with(|| UserSnapshot::new(user, unix_now()))
            .clone()
    }

    fn increment_user(&mut self, user: UserId, delta: &UserDelta) -> UserSnapshot {
        let record = self
            .users
            .entry(user)
            .or_insert_with(|| UserSnapshot::new(user, unix_now()));
        if delta.apply(record) {
            warn!(
                user,
                chips = delta.chips,
                "chip balance would go negative, floored at zero"
            );
        }
        record.clone()
    }

    fn upsert_unlock(
        &mut self,
        user: UserId,
        achievement: AchievementId,
        reward: &UserDelta,
    ) -> Option<UserSnapshot> {
        let unlocked = self.unlocks.entry(user).or_default();
        if unlocked.contains_key(&achievement) {
            return None;
        }
        unlocked.insert(
            achievement,
            AchievementUnlock {
                user,
                achievement,
                earned_at: unix_now(),
            },
        );
        Some(self.increment_user(user, reward))
    }

    fn list_unlocks(&self, user: UserId) -> Vec<AchievementUnlock> {
        self.unlocks
            .get(&user)
            .map(|unlocked| unlocked.values().cloned().collect())
            .unwrap_or_default()
    }

    fn upsert_jackpot(&mut self, record: &JackpotRecord) {
        self.jackpots.insert(record.name.clone(), record.clone());
    }

    fn list_jackpots(&self) -> Vec<JackpotRecord> {
        self.jackpots.values().cloned().collect()
    }
}

/// In-memory store, shared by clones.
#[derive(Clone, Default)]
pub struct Memory {
    tables: Arc<Mutex<Tables>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an achievement catalog.
    pub fn with_catalog(catalog: Vec<AchievementDefinition>) -> Self {
        let store = Self::default();
        lock(&store.tables).catalog = catalog;
        store
    }

    /// Current record of a user without creating it.
    pub fn user(&self, user: UserId) -> Option<UserSnapshot> {
        lock(&self.tables).users.get(&user).cloned()
    }
}

impl Store for Memory {
    async fn get_or_create_user(&self, user: UserId) -> Result<UserSnapshot, StoreError> {
        Ok(lock(&self.tables).get_or_create_user(user))
    }

    async fn increment_user(
        &self,
        user: UserId,
        delta: &UserDelta,
    ) -> Result<UserSnapshot, StoreError> {
        Ok(lock(&self.tables).increment_user(user, delta))
    }

    async fn upsert_unlock(
        &self,
        user: UserId,
        achievement: AchievementId,
        reward: &UserDelta,
    ) -> Result<Option<UserSnapshot>, StoreError> {
        Ok(lock(&self.tables).upsert_unlock(user, achievement, reward))
    }

    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StoreError> {
        Ok(lock(&self.tables).list_unlocks(user))
    }

    async fn upsert_jackpot(&self, record: &JackpotRecord) -> Result<(), StoreError> {
        lock(&self.tables).upsert_jackpot(record);
        Ok(())
    }

    async fn list_jackpots(&self) -> Result<Vec<JackpotRecord>, StoreError> {
        Ok(lock(&self.tables).list_jackpots())
    }

    async fn list_catalog(&self) -> Result<Vec<AchievementDefinition>, StoreError> {
        Ok(lock(&self.tables).catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrc_types::casino::{default_jackpots, STARTING_CHIPS};

    #[tokio::test]
    async fn test_memory_creates_users() {
        let store = Memory::new();
        assert!(store.user(5).is_none());
        let user = store.get_or_create_user(5).await.unwrap();
        assert_eq!(user.chips, STARTING_CHIPS);
        assert_eq!(store.user(5), Some(user));
    }

    #[tokio::test]
    async fn test_memory_increment_is_additive() {
        let store = Memory::new();
        let clone = store.clone();
        store.increment_user(1, &UserDelta::chips(100)).await.unwrap();
        clone.increment_user(1, &UserDelta::chips(-50)).await.unwrap();
        assert_eq!(store.user(1).unwrap().chips, STARTING_CHIPS + 50);

        // Floored at zero
        let user = store
            .increment_user(1, &UserDelta::chips(-1_000_000))
            .await
            .unwrap();
        assert_eq!(user.chips, 0);
    }

    #[tokio::test]
    async fn test_memory_unlock_once() {
        let store = Memory::new();
        let reward = UserDelta::reward(200, 50);
        let rewarded = store.upsert_unlock(1, 2, &reward).await.unwrap().unwrap();
        assert_eq!(rewarded.chips, STARTING_CHIPS + 200);
        assert_eq!(rewarded.total_xp, 50);
        assert!(store.upsert_unlock(1, 2, &reward).await.unwrap().is_none());
        assert!(store.upsert_unlock(2, 2, &reward).await.unwrap().is_some());
        let unlocks = store.list_unlocks(1).await.unwrap();
        assert_eq!(unlocks.len(), 1);
        assert_eq!(unlocks[0].achievement, 2);

        // The reward rides on the unlock, so a repeat pays nothing
        assert_eq!(store.user(1).unwrap().chips, STARTING_CHIPS + 200);
    }

    #[tokio::test]
    async fn test_memory_jackpots() {
        let store = Memory::new();
        assert!(store.list_jackpots().await.unwrap().is_empty());
        for record in default_jackpots(0) {
            store.upsert_jackpot(&record).await.unwrap();
        }
        let mut slots = default_jackpots(0).remove(0);
        slots.amount += 10;
        store.upsert_jackpot(&slots).await.unwrap();

        let listed = store.list_jackpots().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&slots));
    }
}
