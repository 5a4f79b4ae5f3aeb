//! Background work that must outlive the request that started it.
//!
//! Recording keeps running after the caller has its response. The host
//! hands every proxied request a [`Lifetime`] and calls
//! [`Lifetime::settle_within`] before shutting down so in-flight recordings
//! get a grace period instead of being cut off. A stream that never ends
//! is aborted once the grace period runs out.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Lifetime {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the host alive until `work` completes.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(done) = tasks.try_join_next() {
            report(done);
        }
        tasks.spawn(work);
    }

    /// Number of registered tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn take(&self) -> JoinSet<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tasks)
    }

    /// Wait for every registered task, including ones registered while
    /// settling.
    pub async fn settle(&self) {
        loop {
            let mut batch = self.take();
            if batch.is_empty() {
                return;
            }
            tracing::debug!("settling {} background task(s)", batch.len());
            while let Some(done) = batch.join_next().await {
                report(done);
            }
        }
    }

    /// Like [`settle`](Self::settle), but gives up after `grace`.
    ///
    /// Tasks still running at the deadline, and any registered after it,
    /// are aborted. Returns how many were aborted.
    pub async fn settle_within(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        loop {
            let mut batch = self.take();
            if batch.is_empty() {
                return 0;
            }
            tracing::debug!("settling {} background task(s)", batch.len());
            loop {
                match tokio::time::timeout_at(deadline, batch.join_next()).await {
                    Ok(Some(done)) => report(done),
                    Ok(None) => break,
                    Err(_) => {
                        let mut late = self.take();
                        let aborted = batch.len() + late.len();
                        batch.shutdown().await;
                        late.shutdown().await;
                        tracing::warn!(
                            aborted,
                            grace_ms = grace.as_millis() as u64,
                            "aborted background recordings at shutdown"
                        );
                        return aborted;
                    }
                }
            }
        }
    }
}

fn report(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        tracing::error!("background task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn settle_waits_for_all_tasks() {
        let lifetime = Lifetime::new();
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [5u64, 1, 10] {
            let done = done.clone();
            lifetime.wait_until(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        lifetime.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(lifetime.pending(), 0);
    }

    #[tokio::test]
    async fn tasks_registered_while_settling_are_awaited() {
        let lifetime = Lifetime::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner = lifetime.clone();
        let counter = done.clone();
        lifetime.wait_until(async move {
            let counter2 = counter.clone();
            inner.wait_until(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter2.fetch_add(1, Ordering::SeqCst);
            });
            counter.fetch_add(1, Ordering::SeqCst);
        });

        lifetime.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_task_does_not_poison_settle() {
        let lifetime = Lifetime::new();
        lifetime.wait_until(async { panic!("boom") });
        lifetime.settle().await;
        assert_eq!(lifetime.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_within_aborts_tasks_that_never_finish() {
        let lifetime = Lifetime::new();
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        lifetime.wait_until(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        lifetime.wait_until(std::future::pending());

        let aborted = lifetime.settle_within(Duration::from_secs(1)).await;
        assert_eq!(aborted, 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(lifetime.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_within_returns_zero_when_everything_finishes() {
        let lifetime = Lifetime::new();
        lifetime.wait_until(tokio::time::sleep(Duration::from_millis(5)));
        assert_eq!(lifetime.settle_within(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn settle_on_empty_returns() {
        Lifetime::new().settle().await;
    }
}
