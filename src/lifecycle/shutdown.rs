//! Graceful shutdown coordination.
//!
//! The coordinator drives the serve future through a small state machine:
//! Idle until a termination signal, Draining while the listener finishes
//! in-flight requests within the deadline and background tasks complete,
//! then Drained or Failed. The terminal result is delivered exactly once,
//! as the output of [`ShutdownCoordinator::run`].

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Notify};

use crate::lifecycle::signals;
use crate::tasks::TaskTracker;

/// How long the listener may spend finishing in-flight requests once
/// draining starts.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Lifecycle of the serving process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting traffic, no signal seen.
    Idle,
    /// Signal received; listener closed to new connections, in-flight
    /// requests and background tasks still finishing.
    Draining,
    /// Listener and background tasks fully drained.
    Drained,
    /// Drain deadline exceeded or the listener reported an error.
    Failed,
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("server error: {0}")]
    Listener(#[from] io::Error),
    #[error("drain deadline of {0:?} exceeded with requests still in flight")]
    DeadlineExceeded(Duration),
}

/// Clonable handle that can start a drain without an OS signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    trigger: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }
}

pub struct ShutdownCoordinator {
    drain: Arc<Notify>,
    trigger: Arc<Notify>,
    deadline: Duration,
    tasks: TaskTracker,
    state: watch::Sender<ShutdownState>,
}

impl ShutdownCoordinator {
    pub fn new(tasks: TaskTracker) -> Self {
        Self::with_deadline(tasks, DRAIN_DEADLINE)
    }

    pub fn with_deadline(tasks: TaskTracker, deadline: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Idle);
        Self {
            drain: Arc::new(Notify::new()),
            trigger: Arc::new(Notify::new()),
            deadline,
            tasks,
            state,
        }
    }

    /// Future to hand to the server's graceful-shutdown hook. Resolves when
    /// draining begins.
    pub fn drain_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let drain = self.drain.clone();
        async move { drain.notified().await }
    }

    /// Handle for starting a drain programmatically (tests, embedding).
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            trigger: self.trigger.clone(),
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Drive `serve` to completion. Consumes the coordinator; the returned
    /// result is the single terminal outcome of the shutdown sequence.
    pub async fn run<S>(self, serve: S) -> Result<(), ShutdownError>
    where
        S: Future<Output = io::Result<()>>,
    {
        tokio::pin!(serve);

        // Idle: a serve error before any signal is fatal and skips the drain
        let signal = tokio::select! {
            result = &mut serve => {
                let state = if result.is_ok() { ShutdownState::Drained } else { ShutdownState::Failed };
                self.state.send_replace(state);
                return result.map_err(ShutdownError::Listener);
            }
            signal = wait_for_signal(&self.trigger) => signal,
        };

        tracing::info!(signal, "caught signal, shutting down server");
        self.state.send_replace(ShutdownState::Draining);
        // stop accepting; in-flight requests keep running
        self.drain.notify_one();

        match tokio::time::timeout(self.deadline, &mut serve).await {
            Err(_) => {
                self.state.send_replace(ShutdownState::Failed);
                return Err(ShutdownError::DeadlineExceeded(self.deadline));
            }
            Ok(Err(err)) => {
                self.state.send_replace(ShutdownState::Failed);
                return Err(ShutdownError::Listener(err));
            }
            Ok(Ok(())) => {}
        }

        tracing::info!(
            outstanding = self.tasks.outstanding(),
            "completing background tasks"
        );
        self.tasks.wait().await;
        self.state.send_replace(ShutdownState::Drained);
        Ok(())
    }
}

async fn wait_for_signal(trigger: &Notify) -> &'static str {
    tokio::select! {
        name = signals::terminate() => name,
        _ = trigger.notified() => "shutdown trigger",
    }
}
