use crate::{
    mocks::{create_engine, test_config},
    Engine, FileStore, Memory, Metrics, Notify, Store,
};
use hrc_types::casino::{
    default_jackpots, BonusKind, GameKind, GENERAL_POOL, GENERAL_SEED_JACKPOT,
    HIGH_STAKES_ACHIEVEMENT, SLOTS_POOL, SLOTS_SEED_JACKPOT, STARTING_CHIPS,
};
use std::{collections::HashSet, path::PathBuf};

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "hrc-engine-{}-{}.json",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[tokio::test]
async fn test_engine_state_survives_restart() {
    let path = scratch("restart");
    let store = FileStore::open(&path).await.unwrap();
    let engine = Engine::init(store.clone(), test_config(), Metrics::default()).await;

    assert!(engine.welcome(1).await.unwrap());
    let session = engine
        .open_session(1, GameKind::Slots, 500)
        .await
        .unwrap();
    let settlement = engine
        .settle_with(&session, -500, Notify::Inline)
        .await
        .unwrap();
    assert_eq!(settlement.contribution, 5);
    engine.shutdown().await;

    let user = store.get_or_create_user(1).await.unwrap();
    let slots = engine.jackpots().get(SLOTS_POOL).await.unwrap();
    assert_eq!(slots.amount, SLOTS_SEED_JACKPOT + 5);
    drop(engine);
    drop(store);

    let store = FileStore::open(&path).await.unwrap();
    let engine = Engine::init(store.clone(), test_config(), Metrics::default()).await;
    assert_eq!(engine.get_user(1).await, user);
    assert_eq!(engine.jackpots().get(SLOTS_POOL).await.unwrap(), slots);
    assert!(!engine.welcome(1).await.unwrap());
    assert_eq!(store.get_or_create_user(1).await.unwrap().chips, user.chips);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_partial_jackpot_table_gains_general_pool() {
    let store = Memory::new();
    for record in default_jackpots(0) {
        if record.name == SLOTS_POOL {
            store.upsert_jackpot(&record).await.unwrap();
        }
    }
    let engine = Engine::init(store.clone(), test_config(), Metrics::default()).await;

    let session = engine
        .open_session(1, GameKind::Blackjack, 1_000)
        .await
        .unwrap();
    let settlement = engine.settle(&session, -1_000).await.unwrap();
    assert_eq!(settlement.contribution, 5);
    engine.wait_idle().await;

    let general = store
        .list_jackpots()
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.name == GENERAL_POOL)
        .unwrap();
    assert_eq!(general.amount, GENERAL_SEED_JACKPOT + 5);
}

#[tokio::test]
async fn test_many_users_settle_concurrently() {
    let (store, engine) = create_engine(test_config()).await;
    let kinds = [GameKind::Blackjack, GameKind::Roulette, GameKind::Craps];

    let mut handles = Vec::new();
    for user in 0..50u64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut opened = Vec::new();
            for kind in kinds {
                opened.push(engine.open_session(user, kind, 10).await.unwrap());
            }
            for session in opened {
                engine.settle(&session, -10).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    engine.wait_idle().await;

    for user in 0..50u64 {
        let snapshot = store.user(user).unwrap();
        assert_eq!(snapshot.chips, STARTING_CHIPS - 30);
        assert_eq!(snapshot.losses, 3);
        assert_eq!(engine.get_cached_user(user).unwrap().as_ref(), &snapshot);
    }
    assert!(engine.sessions().is_empty());
    assert_eq!(engine.metrics().settlements.get(), 150);
    // Nothing in the catalog is satisfied by losses alone
    assert_eq!(engine.metrics().achievement_unlocks.get(), 0);
}

#[tokio::test]
async fn test_unlocks_are_broadcast() {
    let (_, engine) = create_engine(test_config()).await;
    let mut unlocks = engine.subscribe_unlocks();

    engine.claim_bonus(7, BonusKind::Daily).await.unwrap();
    engine.wait_idle().await;

    let mut ids = HashSet::new();
    while let Ok(event) = unlocks.try_recv() {
        assert_eq!(event.user, 7);
        ids.insert(event.achievement.id);
    }
    // Daily Visitor and First Thousand
    assert!(ids.contains(&4));
    assert!(ids.contains(&11));
}

#[tokio::test]
async fn test_jackpot_win_then_settle() {
    let (store, engine) = create_engine(test_config()).await;
    let session = engine.open_session(1, GameKind::Slots, 1_000).await.unwrap();

    let draw = engine.try_jackpot(&session, 1.0).await.unwrap();
    assert!(draw.won);
    assert_eq!(draw.amount, SLOTS_SEED_JACKPOT);

    let settlement = engine.settle(&session, -1_000).await.unwrap();
    assert_eq!(
        settlement.snapshot.chips,
        STARTING_CHIPS + SLOTS_SEED_JACKPOT as i64 - 1_000
    );
    assert_eq!(settlement.snapshot.losses, 1);
    engine.wait_idle().await;

    // The reset pool took the settlement's contribution
    let slots = engine.jackpots().get(SLOTS_POOL).await.unwrap();
    assert_eq!(slots.amount, SLOTS_SEED_JACKPOT + 10);
    assert_eq!(slots.last_win.as_ref().unwrap().winner, 1);
    assert_eq!(store.list_jackpots().await.unwrap().len(), 2);

    let stats = engine.jackpots().stats().await;
    let (pool, win) = stats.last_win.unwrap();
    assert_eq!(pool, SLOTS_POOL);
    assert_eq!(win.amount, SLOTS_SEED_JACKPOT);
    assert_eq!(engine.metrics().jackpot_wins.get(), 1);
}

#[tokio::test]
async fn test_high_stakes_win_unlocks_special() {
    let (store, engine) = create_engine(test_config()).await;
    store
        .increment_user(2, &hrc_types::casino::UserDelta::chips(200_000))
        .await
        .unwrap();

    let session = engine
        .open_session(2, GameKind::Baccarat, 100_000)
        .await
        .unwrap();
    let settlement = engine
        .settle_with(&session, 100_000, Notify::Inline)
        .await
        .unwrap();
    assert!(settlement
        .unlocked
        .iter()
        .any(|achievement| achievement.id == HIGH_STAKES_ACHIEVEMENT));

    let general = engine.jackpots().get(GENERAL_POOL).await.unwrap();
    assert!(general.amount > GENERAL_SEED_JACKPOT);
}

#[tokio::test]
async fn test_session_stats_across_kinds() {
    let (_, engine) = create_engine(test_config()).await;
    engine.open_session(1, GameKind::Slots, 10).await.unwrap();
    engine.open_session(1, GameKind::Blackjack, 10).await.unwrap();
    engine.open_session(2, GameKind::Slots, 10).await.unwrap();

    let stats = engine.sessions().stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.unique_users, 2);
    assert_eq!(stats.per_kind.get(&GameKind::Slots), Some(&2));
    assert_eq!(engine.metrics().active_sessions.get(), 3);

    let cleaned = engine.force_cleanup_user(1).await;
    assert_eq!(cleaned.len(), 2);
    assert_eq!(engine.sessions().active_sessions_for(1), Vec::new());
    assert_eq!(engine.metrics().active_sessions.get(), 1);
}
