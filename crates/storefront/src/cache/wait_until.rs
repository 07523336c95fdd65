//! Deferred execution hook.
//!
//! Background revalidations are handed to a [`WaitUntil`] so the response
//! path never waits on them while the host still gets a chance to finish
//! them (on shutdown, or at the end of a test).

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::warn;

/// Accepts work that must complete after the response is sent.
pub trait WaitUntil: Send + Sync {
    fn wait_until(&self, task: BoxFuture<'static, ()>);
}

/// [`WaitUntil`] that spawns onto the tokio runtime and remembers the handles.
///
/// Cloning shares the tracked set.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked tasks that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every tracked task, including tasks registered while draining.
    pub async fn drain(&self) {
        loop {
            let batch = {
                let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *handles)
            };

            if batch.is_empty() {
                return;
            }

            for handle in batch {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task did not complete");
                }
            }
        }
    }
}

impl WaitUntil for TaskTracker {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let tracker = TaskTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            tracker.wait_until(
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            );
        }

        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_picks_up_nested_tasks() {
        let tracker = TaskTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tracker = tracker.clone();
        let inner_done = Arc::clone(&done);
        tracker.wait_until(
            async move {
                inner_tracker.wait_until(
                    async move {
                        inner_done.fetch_add(1, Ordering::SeqCst);
                    }
                    .boxed(),
                );
            }
            .boxed(),
        );

        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
