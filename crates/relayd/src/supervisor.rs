//! Owner of background continuations.
//!
//! Every continuation runs as its own task so a panic in one cannot reach
//! another. A thin monitor task per continuation, held in a `JoinSet`, reports
//! how it ended. Finished monitors are reaped whenever a new continuation is
//! spawned or the active count is read.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Default)]
pub struct Supervisor {
    tasks: Mutex<JoinSet<()>>,
    failures: Arc<AtomicUsize>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `work` in the background under supervision
    pub fn spawn<F>(&self, request_id: &str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let request_id = request_id.to_string();
        let failures = Arc::clone(&self.failures);

        let mut tasks = self.lock();
        reap(&mut tasks);
        tasks.spawn(async move {
            match tokio::spawn(work).await {
                Ok(()) => debug!("Continuation {} finished", request_id),
                Err(e) if e.is_panic() => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!("Continuation {} panicked: {}", request_id, e);
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Continuation {} cancelled: {}", request_id, e);
                }
            }
        });
    }

    /// Continuations not yet finished
    pub fn active(&self) -> usize {
        let mut tasks = self.lock();
        reap(&mut tasks);
        tasks.len()
    }

    /// Continuations that panicked or were cancelled since startup
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Wait until every continuation, including ones spawned meanwhile, is done
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return;
            }
            info!("Waiting for {} background continuation(s)", batch.len());
            while batch.join_next().await.is_some() {}
        }
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while tasks.try_join_next().is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_drain_waits_for_work() {
        let sup = Supervisor::new();
        let (tx, rx) = oneshot::channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);

        sup.spawn("r1", async move {
            let _ = rx.await;
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sup.active(), 1);

        tx.send(()).unwrap();
        sup.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(sup.active(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_counted() {
        let sup = Supervisor::new();
        let survivor = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&survivor);

        sup.spawn("bad", async { panic!("boom") });
        sup.spawn("good", async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        sup.drain().await;
        assert_eq!(sup.failures(), 1);
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_empty_returns() {
        Supervisor::new().drain().await;
    }
}
