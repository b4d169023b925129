//! Bounded worker pool for per-commit stage work.
//!
//! Tasks run concurrently under a [`Semaphore`] and check the [`RunControl`]
//! after acquiring their permit, so no new unit of work starts once the run
//! is timed out or cancelled. Outcomes are returned in submission order
//! regardless of completion order; callers apply them after the barrier.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::control::{Interruption, RunControl};

/// What became of one submitted item.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<R> {
    Completed(R),
    /// The task never started because the run was interrupted.
    Interrupted(Interruption),
    /// The task panicked or was aborted.
    Failed(String),
}

impl<R> TaskOutcome<R> {
    pub fn completed(self) -> Option<R> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs `work` for every item with at most `limit` tasks in flight.
///
/// The returned vector is index-aligned with `items`.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    control: &RunControl,
    work: F,
) -> Vec<TaskOutcome<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
{
    let work = Arc::new(work);
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let work = Arc::clone(&work);
        let semaphore = Arc::clone(&semaphore);
        let control = control.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            if let Some(reason) = control.interruption() {
                return TaskOutcome::Interrupted(reason);
            }
            TaskOutcome::Completed(work(item).await)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!(task = index, error = %e, "pool task did not complete");
                outcomes.push(TaskOutcome::Failed(e.to_string()));
            }
        }
    }
    debug!(tasks = outcomes.len(), limit, "pool drained");
    outcomes
}
