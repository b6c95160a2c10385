//! Background task tracking.
//!
//! Fire-and-forget work (welcome mail, audit writes) is spawned through a
//! single tracker so the shutdown path can wait for all of it to finish.
//! A panic inside a task is recovered and logged; it never reaches a
//! request or terminates the process.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Notify;

/// Tracks outstanding background tasks. Cheap to clone; all clones share
/// one counter.
#[derive(Clone, Default)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    outstanding: AtomicUsize,
    drained: Notify,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task`, registering it before launch and deregistering it
    /// unconditionally on completion, panic included.
    pub fn run<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(error = %panic_message(&panic), "background task panicked");
            }
            if inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.drained.notify_waiters();
            }
        });
    }

    /// Number of tasks currently registered.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Resolve once every registered task has completed. Used by the
    /// shutdown path only.
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // register interest before re-checking the counter, otherwise a
            // task finishing between the check and the await is lost
            drained.as_mut().enable();
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Best-effort rendering of a panic payload for the log.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let tracker = TaskTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait())
            .await
            .expect("wait should not block with no tasks");
    }

    #[tokio::test]
    async fn wait_blocks_until_all_tasks_finish() {
        let tracker = TaskTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = done.clone();
            tracker.run(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        tracker.wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn panicking_tasks_are_recovered_and_deregistered() {
        let tracker = TaskTracker::new();

        tracker.run(async {
            panic!("task blew up");
        });
        tracker.run(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("panicked task must still deregister");
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn panic_payloads_render() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
