use super::super::*;
use std::{future::Future, time::Duration};
use tokio::{sync::watch, time::MissedTickBehavior};

/// Run `work` every `period` until the stop signal flips.
async fn periodic<F, Fut>(mut stopped: watch::Receiver<bool>, period: Duration, mut work: F)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *stopped.borrow() {
            return;
        }
        tokio::select! {
            _ = ticker.tick() => work().await,
            changed = stopped.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

impl<S: Store> Engine<S> {
    /// Start the cache sweep, session sweep and debounce pruning loops.
    pub fn start(&self) {
        let engine = self.clone();
        self.spawner.spawn(
            "cache_sweep",
            Box::pin(periodic(
                self.spawner.stopped(),
                self.config.cache.sweep_interval(),
                move || {
                    let engine = engine.clone();
                    async move {
                        engine.cache.sweep();
                    }
                },
            )),
        );

        let engine = self.clone();
        self.spawner.spawn(
            "session_sweep",
            Box::pin(periodic(
                self.spawner.stopped(),
                self.config.sessions.sweep_interval(),
                move || {
                    let engine = engine.clone();
                    async move {
                        engine.sweep_sessions().await;
                    }
                },
            )),
        );

        let engine = self.clone();
        self.spawner.spawn(
            "debounce_prune",
            Box::pin(periodic(
                self.spawner.stopped(),
                self.config.achievements.prune_interval(),
                move || {
                    let engine = engine.clone();
                    async move {
                        let pruned = engine.achievements.prune(Instant::now());
                        if pruned > 0 {
                            debug!(pruned, "pruned achievement debounce entries");
                        }
                    }
                },
            )),
        );
        info!("engine sweeps started");
    }

    /// Forfeit every session past its deadline. Returns how many were forfeited.
    pub async fn sweep_sessions(&self) -> usize {
        let expired = self.sessions.take_expired(Instant::now());
        if expired.is_empty() {
            return 0;
        }
        let mut forfeited = 0;
        for session in expired {
            if self.forfeit(&session).await.is_some() {
                forfeited += 1;
            }
        }
        debug!(forfeited, "swept expired sessions");
        forfeited
    }

    /// Remove every session of `user`, forfeiting those still pending.
    pub async fn force_cleanup_user(&self, user: UserId) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        for session in self.sessions.force_cleanup_user(user) {
            if let Some(settlement) = self.forfeit(&session).await {
                settlements.push(settlement);
            }
        }
        if !settlements.is_empty() {
            info!(user, sessions = settlements.len(), "force cleaned user sessions");
        }
        settlements
    }
}
