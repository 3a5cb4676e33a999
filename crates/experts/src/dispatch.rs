//! Fire-and-forget background work.
//!
//! Contract: a spawned task runs once. There is no retry and no
//! backpressure, and a failure is logged at `error` and never reaches the
//! caller that spawned it. `drain` waits for everything outstanding, which
//! lets a short-lived process finish its background work before exiting.

use hivemind_core::AppResult;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default)]
pub struct BackgroundDispatcher {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `task` in the background. Must be called within a tokio runtime.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let mut tasks = self.tasks();
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Background task panicked");
            }
        }

        tasks.spawn(async move {
            match task.await {
                Ok(()) => tracing::debug!(task = name, "Background task finished"),
                Err(e) => tracing::error!(task = name, error = %e, "Background task failed"),
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Wait until every spawned task, including ones spawned while
    /// draining, has finished.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                return;
            }
            while let Some(finished) = batch.join_next().await {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Background task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_core::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let dispatcher = BackgroundDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            dispatcher.spawn("count", async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        dispatcher.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let dispatcher = BackgroundDispatcher::new();
        dispatcher.spawn("fail", async { Err(AppError::Llm("down".to_string())) });
        dispatcher.drain().await;
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_covers_tasks_spawned_during_drain() {
        let dispatcher = BackgroundDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = dispatcher.clone();
        let inner_counter = counter.clone();
        dispatcher.spawn("outer", async move {
            inner.spawn("inner", async move {
                inner_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        dispatcher.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
