use super::super::*;
use crate::jackpot::JackpotDraw;
use tracing::error;

impl<S: Store> Engine<S> {
    /// Settle `session` with the given net profit, evaluating achievements in the background.
    pub async fn settle(&self, session: &Arc<Session>, profit: i64) -> Result<Settlement> {
        self.settle_with(session, profit, Notify::Detached).await
    }

    /// Settle `session` with the given net profit.
    ///
    /// Only the first call has an economic effect; later calls return the recorded settlement
    /// without touching the store. If the store write fails the session stays pending and can
    /// be settled again. A pending session past its deadline is rejected and left for the
    /// sweeper to forfeit.
    pub async fn settle_with(
        &self,
        session: &Arc<Session>,
        profit: i64,
        notify: Notify,
    ) -> Result<Settlement> {
        let mut outcome = session.outcome.lock().await;
        match &*outcome {
            Outcome::Settled(prior) | Outcome::Forfeited(prior) => {
                debug!(
                    user = session.user(),
                    kind = %session.kind(),
                    "session already settled"
                );
                return Ok(prior.clone());
            }
            Outcome::Cancelled => {
                return Err(Error::SessionComplete {
                    user: session.user(),
                    kind: session.kind(),
                })
            }
            Outcome::Pending => session.check_active(Instant::now())?,
        }

        let settlement = self.apply_settlement(session, profit, false, notify).await?;
        *outcome = Outcome::Settled(settlement.clone());
        session.mark_terminal();
        drop(outcome);

        self.sessions.release(session);
        Ok(settlement)
    }

    /// Forfeit the wager of an abandoned session.
    ///
    /// Returns `None` if the session already reached a terminal state.
    pub async fn forfeit(&self, session: &Arc<Session>) -> Option<Settlement> {
        let mut outcome = session.outcome.lock().await;
        if !matches!(*outcome, Outcome::Pending) {
            return None;
        }

        let loss = -i64::try_from(session.wager()).unwrap_or(i64::MAX);
        match self
            .apply_settlement(session, loss, true, Notify::Detached)
            .await
        {
            Ok(settlement) => {
                *outcome = Outcome::Forfeited(settlement.clone());
                session.mark_terminal();
                drop(outcome);

                self.sessions.release(session);
                self.metrics.forfeits.inc();
                info!(
                    user = session.user(),
                    kind = %session.kind(),
                    wager = session.wager(),
                    "forfeited expired session"
                );
                Some(settlement)
            }
            Err(e) => {
                drop(outcome);
                // Keep it reachable so the next sweep retries
                if self.sessions.get(session.kind(), session.user()).is_none()
                    && self.sessions.register(session.clone()).is_ok()
                {
                    warn!(user = session.user(), kind = %session.kind(), ?e, "failed to forfeit session, will retry");
                } else {
                    error!(user = session.user(), kind = %session.kind(), wager = session.wager(), ?e, "failed to forfeit session");
                }
                None
            }
        }
    }

    async fn apply_settlement(
        &self,
        session: &Session,
        profit: i64,
        forfeited: bool,
        notify: Notify,
    ) -> Result<Settlement> {
        let (user, kind) = (session.user(), session.kind());
        let xp_gained = if profit > 0 {
            profit.saturating_mul(self.config.xp_per_profit)
        } else {
            0
        };
        let counted = session.counts_toward_record();
        let delta = UserDelta {
            chips: profit,
            total_xp: xp_gained,
            current_xp: xp_gained,
            wins: u64::from(counted && profit > 0),
            losses: u64::from(counted && profit < 0),
            ..UserDelta::default()
        };

        let snapshot = match self.store.increment_user(user, &delta).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.settlement_failures.inc();
                warn!(user, %kind, profit, ?e, "settlement failed");
                return Err(e.into());
            }
        };
        self.cache.update(user, snapshot.clone());

        let pool = self.config.sessions.pool(kind);
        let contribution = match self.jackpots.contribute(pool, session.wager()).await {
            Ok(contribution) => contribution,
            Err(e) => {
                warn!(user, %kind, pool, ?e, "failed to contribute to jackpot");
                0
            }
        };

        let triggered = if profit > 0 {
            self.achievements
                .triggered_by_win(snapshot.chips, session.wager())
        } else {
            Vec::new()
        };
        let unlocked = match notify {
            Notify::Inline => self.evaluate_with(&snapshot, triggered).await,
            Notify::Detached => {
                self.spawn_evaluation(snapshot.clone(), triggered);
                Vec::new()
            }
        };

        self.metrics.settlements.inc();
        info!(
            user,
            %kind,
            profit,
            xp = xp_gained,
            counted,
            chips = snapshot.chips,
            "settled session"
        );
        Ok(Settlement {
            user,
            kind,
            wager: session.wager(),
            profit,
            xp_gained,
            counted,
            forfeited,
            contribution,
            snapshot,
            unlocked,
        })
    }

    /// Draw for the jackpot of the session's game kind, crediting a win to the player.
    ///
    /// The pool is reset before the credit is written. If the credit fails the draw is
    /// returned as an error and logged with the amount owed.
    pub async fn try_jackpot(
        &self,
        session: &Session,
        base_probability: f64,
    ) -> Result<JackpotDraw> {
        session.check_active(Instant::now())?;
        let (user, kind) = (session.user(), session.kind());
        let pool = self.config.sessions.pool(kind);
        let draw = self
            .jackpots
            .try_win(pool, user, session.wager(), base_probability)
            .await?;
        if !draw.won {
            return Ok(draw);
        }

        let amount = i64::try_from(draw.amount).unwrap_or(i64::MAX);
        match self.store.increment_user(user, &UserDelta::chips(amount)).await {
            Ok(snapshot) => {
                self.cache.update(user, snapshot);
                Ok(draw)
            }
            Err(e) => {
                error!(user, %kind, pool, amount, ?e, "failed to credit jackpot win");
                Err(e.into())
            }
        }
    }
}
