//! Supervision scope for the background tasks of one connection.

use std::future::Future;

use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Owns every task an extension spawns for its connection.
///
/// Cancelling one connection's supervisor never touches another's. Child
/// supervisors let an extension recycle a transport without tearing down the
/// whole connection.
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that stops at its next await point once the supervisor is cancelled.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {},
                _ = task => {},
            }
        });
    }

    /// A supervisor cancelled together with this one, but shut down on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel all tasks and wait until every one of them has exited.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
