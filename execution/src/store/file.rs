use hrc_types::casino::{
    AchievementDefinition, AchievementId, AchievementUnlock, JackpotRecord, UserDelta, UserId,
    UserSnapshot,
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

use super::{Store, StoreError, Tables};
use crate::lock;

/// Store persisted as a single JSON document.
///
/// Writers are serialized. Each one applies its change to a copy of the tables, writes the copy
/// to a temporary file, renames it over the document and only then publishes it to readers, so a
/// failed write leaves both the file and the in-memory view untouched.
#[derive(Clone)]
pub struct FileStore {
    path: Arc<PathBuf>,
    tables: Arc<Mutex<Tables>>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl FileStore {
    /// Open the document at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let tables: Tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            users = tables.users.len(),
            jackpots = tables.jackpots.len(),
            "opened store"
        );
        Ok(Self {
            path: Arc::new(path),
            tables: Arc::new(Mutex::new(tables)),
            writer: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Replace the stored achievement catalog.
    pub async fn seed_catalog(&self, catalog: Vec<AchievementDefinition>) -> Result<(), StoreError> {
        self.commit(move |tables| tables.catalog = catalog).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn commit<R, F>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Tables) -> R + Send,
    {
        let _writer = self.writer.lock().await;
        let mut next = lock(&self.tables).clone();
        let result = change(&mut next);

        let encoded = serde_json::to_vec(&next)?;
        let temporary = self.path.with_extension("tmp");
        tokio::fs::write(&temporary, &encoded).await?;
        tokio::fs::rename(&temporary, self.path.as_ref()).await?;
        debug!(bytes = encoded.len(), "store committed");

        *lock(&self.tables) = next;
        Ok(result)
    }
}

impl Store for FileStore {
    async fn get_or_create_user(&self, user: UserId) -> Result<UserSnapshot, StoreError> {
        if let Some(snapshot) = lock(&self.tables).users.get(&user).cloned() {
            return Ok(snapshot);
        }
        self.commit(|tables| tables.get_or_create_user(user)).await
    }

    async fn increment_user(
        &self,
        user: UserId,
        delta: &UserDelta,
    ) -> Result<UserSnapshot, StoreError> {
        self.commit(|tables| tables.increment_user(user, delta))
            .await
    }

    async fn upsert_unlock(
        &self,
        user: UserId,
        achievement: AchievementId,
        reward: &UserDelta,
    ) -> Result<Option<UserSnapshot>, StoreError> {
        let present = lock(&self.tables)
            .unlocks
            .get(&user)
            .is_some_and(|unlocked| unlocked.contains_key(&achievement));
        if present {
            return Ok(None);
        }
        self.commit(|tables| tables.upsert_unlock(user, achievement, reward))
            .await
    }

    async fn list_unlocks(&self, user: UserId) -> Result<Vec<AchievementUnlock>, StoreError> {
        Ok(lock(&self.tables).list_unlocks(user))
    }

    async fn upsert_jackpot(&self, record: &JackpotRecord) -> Result<(), StoreError> {
        self.commit(|tables| tables.upsert_jackpot(record)).await
    }

    async fn list_jackpots(&self) -> Result<Vec<JackpotRecord>, StoreError> {
        Ok(lock(&self.tables).list_jackpots())
    }

    async fn list_catalog(&self) -> Result<Vec<AchievementDefinition>, StoreError> {
        Ok(lock(&self.tables).catalog.clone())
    }
}
