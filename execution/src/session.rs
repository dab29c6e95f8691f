//! Live game sessions.
//!
//! A [Session] is shared by the game module driving it, the registry and the expiry sweeper.
//! Its `outcome` mutex is the settlement guard: whoever holds it decides whether the session
//! settles, forfeits or is cancelled, and every later caller observes that decision.

use hrc_types::casino::{GameKind, UserId};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

use crate::{engine::Settlement, lock, metrics::Metrics, read, write, Error, Result};

/// Terminal state of a session (or `Pending` while it can still be settled).
#[derive(Clone, Debug)]
pub enum Outcome {
    Pending,
    Settled(Settlement),
    Forfeited(Settlement),
    Cancelled,
}

impl Outcome {
    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            Outcome::Settled(settlement) | Outcome::Forfeited(settlement) => Some(settlement),
            Outcome::Pending | Outcome::Cancelled => None,
        }
    }
}

/// Game-owned mutable state carried by a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameState {
    pub blob: Vec<u8>,
    pub moves: u32,
}

#[derive(Debug)]
pub struct Session {
    user: UserId,
    kind: GameKind,
    wager: u64,
    pre_game_chips: i64,
    min_wager_ratio: f64,
    created_at: Instant,
    deadline: Instant,
    terminal: AtomicBool,
    pub(crate) outcome: tokio::sync::Mutex<Outcome>,
    state: Mutex<GameState>,
}

impl Session {
    pub fn new(
        user: UserId,
        kind: GameKind,
        wager: u64,
        pre_game_chips: i64,
        min_wager_ratio: f64,
        expiry: Duration,
    ) -> Self {
        let created_at = Instant::now();
        Self {
            user,
            kind,
            wager,
            pre_game_chips,
            min_wager_ratio,
            created_at,
            deadline: created_at + expiry,
            terminal: AtomicBool::new(false),
            outcome: tokio::sync::Mutex::new(Outcome::Pending),
            state: Mutex::new(GameState::default()),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn kind(&self) -> GameKind {
        self.kind
    }

    pub fn wager(&self) -> u64 {
        self.wager
    }

    /// Balance captured when the session opened.
    pub fn pre_game_chips(&self) -> i64 {
        self.pre_game_chips
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminal(&self) {
        self.terminal.store(true, Ordering::Release);
    }

    /// Check a game action may proceed.
    pub fn check_active(&self, now: Instant) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::SessionComplete {
                user: self.user,
                kind: self.kind,
            });
        }
        if self.is_expired(now) {
            return Err(Error::SessionExpired {
                user: self.user,
                kind: self.kind,
            });
        }
        Ok(())
    }

    /// Whether the result of this session counts toward the user's wins and losses.
    ///
    /// Wagers below `ceil(pre_game_chips * ratio)` settle normally but are not counted.
    pub fn counts_toward_record(&self) -> bool {
        if self.min_wager_ratio <= 0.0 {
            return true;
        }
        let required = (self.pre_game_chips.max(0) as f64 * self.min_wager_ratio).ceil();
        self.wager as f64 >= required
    }

    /// Run `f` against the game state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Record a move, returning the new move count.
    pub fn record_move(&self, blob: Vec<u8>) -> u32 {
        self.with_state(|state| {
            state.blob = blob;
            state.moves += 1;
            state.moves
        })
    }

    /// Current outcome (waits for an in-flight settlement to finish).
    pub async fn outcome(&self) -> Outcome {
        self.outcome.lock().await.clone()
    }
}

/// Active session counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub unique_users: usize,
    pub per_kind: BTreeMap<GameKind, usize>,
}

#[derive(Default)]
struct Indices {
    by_kind: HashMap<GameKind, HashMap<UserId, Arc<Session>>>,
    by_user: HashMap<UserId, BTreeSet<GameKind>>,
}

impl Indices {
    fn remove(&mut self, kind: GameKind, user: UserId) -> Option<Arc<Session>> {
        let sessions = self.by_kind.get_mut(&kind)?;
        let removed = sessions.remove(&user)?;
        if sessions.is_empty() {
            self.by_kind.remove(&kind);
        }
        if let Some(kinds) = self.by_user.get_mut(&user) {
            kinds.remove(&kind);
            if kinds.is_empty() {
                self.by_user.remove(&user);
            }
        }
        Some(removed)
    }

    fn total(&self) -> usize {
        self.by_kind.values().map(HashMap::len).sum()
    }
}

/// Index of live sessions by (game kind, user) and by user.
pub struct SessionRegistry {
    indices: RwLock<Indices>,
    metrics: Metrics,
}

impl SessionRegistry {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            metrics,
        }
    }

    /// Register a session under its kind and user.
    ///
    /// Fails if a non-terminal session already holds the slot. A terminal session the sweeper
    /// has not reclaimed yet is replaced.
    pub fn register(&self, session: Arc<Session>) -> Result<()> {
        let (kind, user) = (session.kind(), session.user());
        let mut indices = write(&self.indices);
        let sessions = indices.by_kind.entry(kind).or_default();
        if let Some(existing) = sessions.get(&user) {
            if !existing.is_terminal() {
                return Err(Error::SessionExists { user, kind });
            }
            debug!(user, %kind, "replacing terminal session");
        }
        sessions.insert(user, session);
        indices.by_user.entry(user).or_default().insert(kind);
        self.metrics.active_sessions.set(indices.total() as i64);
        Ok(())
    }

    pub fn unregister(&self, kind: GameKind, user: UserId) -> Option<Arc<Session>> {
        let mut indices = write(&self.indices);
        let removed = indices.remove(kind, user);
        self.metrics.active_sessions.set(indices.total() as i64);
        removed
    }

    /// Unregister `session` only if it still holds its slot.
    pub(crate) fn release(&self, session: &Arc<Session>) -> bool {
        let mut indices = write(&self.indices);
        let current = indices
            .by_kind
            .get(&session.kind())
            .and_then(|sessions| sessions.get(&session.user()));
        if !current.is_some_and(|current| Arc::ptr_eq(current, session)) {
            return false;
        }
        indices.remove(session.kind(), session.user());
        self.metrics.active_sessions.set(indices.total() as i64);
        true
    }

    pub fn get(&self, kind: GameKind, user: UserId) -> Option<Arc<Session>> {
        read(&self.indices)
            .by_kind
            .get(&kind)
            .and_then(|sessions| sessions.get(&user))
            .cloned()
    }

    /// Game kinds in which `user` has a registered session.
    pub fn active_sessions_for(&self, user: UserId) -> Vec<GameKind> {
        read(&self.indices)
            .by_user
            .get(&user)
            .map(|kinds| kinds.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        read(&self.indices).total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SessionStats {
        let indices = read(&self.indices);
        SessionStats {
            total: indices.total(),
            unique_users: indices.by_user.len(),
            per_kind: indices
                .by_kind
                .iter()
                .map(|(kind, sessions)| (*kind, sessions.len()))
                .collect(),
        }
    }

    /// Unregister every session past its deadline (or already terminal) under one write lock.
    ///
    /// Returns the expired sessions that were not terminal; the caller forfeits them.
    pub fn take_expired(&self, now: Instant) -> Vec<Arc<Session>> {
        let mut indices = write(&self.indices);
        let stale: Vec<(GameKind, UserId)> = indices
            .by_kind
            .iter()
            .flat_map(|(kind, sessions)| {
                sessions
                    .iter()
                    .filter(|(_, session)| session.is_terminal() || session.is_expired(now))
                    .map(|(user, _)| (*kind, *user))
            })
            .collect();

        let mut expired = Vec::new();
        for (kind, user) in stale {
            if let Some(session) = indices.remove(kind, user) {
                if !session.is_terminal() {
                    expired.push(session);
                }
            }
        }
        self.metrics.active_sessions.set(indices.total() as i64);
        expired
    }

    /// Unregister every session of `user`, returning the non-terminal ones.
    pub fn force_cleanup_user(&self, user: UserId) -> Vec<Arc<Session>> {
        let mut indices = write(&self.indices);
        let kinds: Vec<GameKind> = indices
            .by_user
            .get(&user)
            .map(|kinds| kinds.iter().copied().collect())
            .unwrap_or_default();
        let removed = kinds
            .into_iter()
            .filter_map(|kind| indices.remove(kind, user))
            .filter(|session| !session.is_terminal())
            .collect();
        self.metrics.active_sessions.set(indices.total() as i64);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: UserId, kind: GameKind, secs: u64) -> Arc<Session> {
        Arc::new(Session::new(user, kind, 100, 1_000, 0.0, Duration::from_secs(secs)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_session_per_user_and_kind() {
        let registry = SessionRegistry::new(Metrics::default());
        registry.register(session(1, GameKind::Blackjack, 120)).unwrap();
        assert!(matches!(
            registry.register(session(1, GameKind::Blackjack, 120)),
            Err(Error::SessionExists { user: 1, kind: GameKind::Blackjack })
        ));
        // Other kinds and other users are independent
        registry.register(session(1, GameKind::Slots, 60)).unwrap();
        registry.register(session(2, GameKind::Blackjack, 120)).unwrap();

        assert_eq!(
            registry.active_sessions_for(1),
            vec![GameKind::Blackjack, GameKind::Slots]
        );
        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.per_kind.get(&GameKind::Blackjack), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_session_is_replaced() {
        let registry = SessionRegistry::new(Metrics::default());
        let first = session(1, GameKind::Mines, 120);
        registry.register(first.clone()).unwrap();
        first.mark_terminal();

        let second = session(1, GameKind::Mines, 120);
        registry.register(second.clone()).unwrap();

        // The stale handle no longer owns the slot
        assert!(!registry.release(&first));
        assert!(Arc::ptr_eq(&registry.get(GameKind::Mines, 1).unwrap(), &second));
        assert!(registry.release(&second));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_cleans_user_index() {
        let registry = SessionRegistry::new(Metrics::default());
        registry.register(session(1, GameKind::Craps, 120)).unwrap();
        assert!(registry.unregister(GameKind::Craps, 1).is_some());
        assert!(registry.unregister(GameKind::Craps, 1).is_none());
        assert!(registry.active_sessions_for(1).is_empty());
        assert_eq!(registry.stats(), SessionStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_expired() {
        let metrics = Metrics::default();
        let registry = SessionRegistry::new(metrics.clone());
        registry.register(session(1, GameKind::Slots, 60)).unwrap();
        registry.register(session(2, GameKind::Blackjack, 120)).unwrap();
        let done = session(3, GameKind::Roulette, 120);
        registry.register(done.clone()).unwrap();
        done.mark_terminal();

        tokio::time::advance(Duration::from_secs(60)).await;
        let expired = registry.take_expired(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user(), 1);

        // Terminal sessions are reclaimed without being returned
        assert!(registry.get(GameKind::Roulette, 3).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(metrics.active_sessions.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_active() {
        let active = session(1, GameKind::Slots, 60);
        assert!(active.check_active(Instant::now()).is_ok());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(matches!(
            active.check_active(Instant::now()),
            Err(Error::SessionExpired { .. })
        ));

        let done = session(1, GameKind::Slots, 60);
        done.mark_terminal();
        assert!(matches!(
            done.check_active(Instant::now()),
            Err(Error::SessionComplete { .. })
        ));
    }

    #[test]
    fn test_wager_ratio() {
        let expiry = Duration::from_secs(1);
        let low = Session::new(1, GameKind::Mines, 99, 1_000, 0.1, expiry);
        let high = Session::new(1, GameKind::Mines, 100, 1_000, 0.1, expiry);
        let rounding = Session::new(1, GameKind::Mines, 100, 1_001, 0.1, expiry);
        let any = Session::new(1, GameKind::Mines, 1, 1_000, 0.0, expiry);
        assert!(!low.counts_toward_record());
        assert!(high.counts_toward_record());
        assert!(!rounding.counts_toward_record());
        assert!(any.counts_toward_record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_cleanup_user() {
        let registry = SessionRegistry::new(Metrics::default());
        registry.register(session(1, GameKind::Slots, 60)).unwrap();
        registry.register(session(1, GameKind::Baccarat, 120)).unwrap();
        registry.register(session(2, GameKind::Slots, 60)).unwrap();

        let removed = registry.force_cleanup_user(1);
        assert_eq!(removed.len(), 2);
        assert!(registry.active_sessions_for(1).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_state() {
        let active = session(1, GameKind::HigherOrLower, 120);
        assert_eq!(active.record_move(vec![1, 2]), 1);
        assert_eq!(active.record_move(vec![3]), 2);
        active.with_state(|state| assert_eq!(state.blob, vec![3]));
    }
}
