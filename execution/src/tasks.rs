use futures::future::BoxFuture;
use std::sync::Mutex;
use tokio::{sync::watch, task::JoinSet};
use tracing::{debug, error};

use crate::lock;

/// Runs the engine's background work.
pub trait Spawner: Send + Sync + 'static {
    /// Run `task` in the background.
    fn spawn(&self, label: &'static str, task: BoxFuture<'static, ()>);

    /// Flips to `true` once [Spawner::stop] is called. Long-lived loops select on it.
    fn stopped(&self) -> watch::Receiver<bool>;

    fn stop(&self);

    /// Resolve once every spawned task has finished (including tasks spawned while waiting).
    fn wait_idle(&self) -> BoxFuture<'_, ()>;
}

/// [Spawner] backed by a tokio [JoinSet].
pub struct Supervisor {
    tasks: Mutex<JoinSet<()>>,
    shutdown: watch::Sender<bool>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: Mutex::new(JoinSet::new()),
            shutdown,
        }
    }

    /// Tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        lock(&self.tasks).len()
    }
}

impl Spawner for Supervisor {
    fn spawn(&self, label: &'static str, task: BoxFuture<'static, ()>) {
        let mut tasks = lock(&self.tasks);
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(?e, "background task failed");
            }
        }
        tasks.spawn(async move {
            task.await;
            debug!(label, "background task finished");
        });
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
                let mut tasks = std::mem::take(&mut *lock(&self.tasks));
                if tasks.is_empty() {
                    return;
                }
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(?e, "background task failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn test_wait_idle_covers_nested_spawns() {
        let supervisor = Arc::new(Supervisor::new());
        let count = Arc::new(AtomicUsize::new(0));

        let nested = supervisor.clone();
        let counter = count.clone();
        supervisor.spawn(
            "outer",
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let counter = counter.clone();
                nested.spawn(
                    "inner",
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        supervisor.wait_idle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(supervisor.pending(), 0);
    }

    #[tokio::test]
    async fn test_stop_releases_loops() {
        let supervisor = Supervisor::new();
        let mut stopped = supervisor.stopped();
        supervisor.spawn(
            "loop",
            Box::pin(async move {
                while !*stopped.borrow() {
                    if stopped.changed().await.is_err() {
                        break;
                    }
                }
            }),
        );
        supervisor.stop();
        supervisor.wait_idle().await;
        assert!(*supervisor.stopped().borrow());
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let supervisor = Supervisor::new();
        supervisor.spawn("panics", Box::pin(async { panic!("boom") }));
        supervisor.wait_idle().await;
        assert_eq!(supervisor.pending(), 0);
    }
}
