use super::super::*;
use hrc_types::casino::{bonus_remaining, quote_bonus, BonusQuote};

/// A successful bonus claim.
#[derive(Clone, Debug)]
pub struct BonusClaim {
    pub quote: BonusQuote,
    pub snapshot: UserSnapshot,
    /// Unix seconds at which the same bonus can be claimed again
    pub next_claim_at: u64,
}

/// Marks a (user, kind) claim in flight until dropped.
struct InFlight<'a> {
    claims: &'a Mutex<HashSet<(UserId, BonusKind)>>,
    key: (UserId, BonusKind),
}

impl<'a> InFlight<'a> {
    fn acquire(claims: &'a Mutex<HashSet<(UserId, BonusKind)>>, key: (UserId, BonusKind)) -> Option<Self> {
        crate::lock(claims)
            .insert(key)
            .then_some(Self { claims, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        crate::lock(self.claims).remove(&self.key);
    }
}

impl<S: Store> Engine<S> {
    /// Claim a bonus for `user`.
    ///
    /// The cooldown is checked against the store's record, not the cache. A second claim of
    /// the same kind for the same user is rejected while the first is in flight.
    pub async fn claim_bonus(&self, user: UserId, kind: BonusKind) -> Result<BonusClaim> {
        let cooldown = kind.table().cooldown_secs;
        let Some(_in_flight) = InFlight::acquire(&self.claims, (user, kind)) else {
            return Err(Error::ClaimInProgress { user, kind });
        };

        let now = unix_now();
        let snapshot = self.store.get_or_create_user(user).await?;
        let remaining = bonus_remaining(&snapshot, kind, now);
        if remaining > 0 {
            return Err(Error::BonusNotReady {
                kind,
                remaining_secs: remaining,
            });
        }

        let quote = quote_bonus(&snapshot, kind);
        let delta = UserDelta {
            chips: quote.chips,
            total_xp: quote.xp,
            current_xp: quote.xp,
            daily_bonuses_claimed: u64::from(kind == BonusKind::Daily),
            votes: u64::from(kind == BonusKind::Vote),
            claim: Some((kind, now)),
            ..UserDelta::default()
        };
        let snapshot = self.store.increment_user(user, &delta).await?;
        self.cache.update(user, snapshot.clone());
        self.metrics.bonus_claims.inc();
        info!(
            user,
            %kind,
            chips = quote.chips,
            xp = quote.xp,
            multiplier = quote.multiplier,
            "claimed bonus"
        );
        self.spawn_evaluation(snapshot.clone(), Vec::new());

        Ok(BonusClaim {
            quote,
            snapshot,
            next_claim_at: now.saturating_add(cooldown),
        })
    }

    /// Seconds until each bonus kind can be claimed (zero when ready).
    pub async fn bonus_status(&self, user: UserId) -> Result<Vec<(BonusKind, u64)>> {
        let snapshot = self.load_user(user).await?;
        let now = unix_now();
        Ok(BonusKind::ALL
            .iter()
            .map(|kind| (*kind, bonus_remaining(&snapshot, *kind, now)))
            .collect())
    }
}
