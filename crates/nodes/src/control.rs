//! Run-level deadline and cooperative cancellation.
//!
//! A [`CancellationHandle`] is held by whoever may stop a run (the CLI's
//! Ctrl-C handler, a test). [`RunControl`] is the cheap, cloneable view the
//! executor and every pool task consult between units of work.

use std::sync::Arc;
use std::time::Duration;

use pipeline::DiagnosticKind;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a run stopped before finishing every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The run deadline elapsed.
    Timeout,
    /// The run was cancelled through a [`CancellationHandle`].
    Cancelled,
}

impl Interruption {
    /// The skip diagnostic recorded for every commit left unprocessed.
    pub fn diagnostic_kind(self) -> DiagnosticKind {
        match self {
            Self::Timeout => DiagnosticKind::IncompleteTimeout,
            Self::Cancelled => DiagnosticKind::IncompleteCancelled,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Timeout => "run deadline elapsed before the commit was analysed",
            Self::Cancelled => "run was cancelled before the commit was analysed",
        }
    }
}

/// Requests cancellation of a run. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline plus cancellation signal for one run.
#[derive(Debug, Clone)]
pub struct RunControl {
    deadline: Instant,
    cancel: watch::Receiver<bool>,
}

impl RunControl {
    /// Starts the run clock now.
    pub fn start(timeout: Duration, handle: &CancellationHandle) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: handle.subscribe(),
        }
    }

    /// Returns the reason the run must stop, if any. Cancellation wins over
    /// an elapsed deadline.
    pub fn interruption(&self) -> Option<Interruption> {
        if *self.cancel.borrow() {
            Some(Interruption::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(Interruption::Timeout)
        } else {
            None
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Resolves once the run is cancelled or its deadline passes.
    pub async fn interrupted(&self) -> Interruption {
        if let Some(reason) = self.interruption() {
            return reason;
        }
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            // A dropped handle can no longer cancel; only the deadline remains.
            let signalled = cancel.wait_for(|cancelled| *cancelled).await.is_ok();
            if !signalled {
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            () = cancelled => Interruption::Cancelled,
            () = tokio::time::sleep_until(self.deadline) => Interruption::Timeout,
        }
    }
}
