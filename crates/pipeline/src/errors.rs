//! Error taxonomy and retry-policy types for the release-notes pipeline.
//!
//! [`ReleaseNotesError`] covers the two fatal conditions that halt a run.
//! Every other failure is stage-local: [`DiffFetchError`] and
//! [`ModelInvocationError`] are absorbed into the diagnostics log by the stage
//! that produced them and never cross the orchestrator boundary.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::{ModelError, VcsError};
use crate::CommitSha;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by collaborator error types to let the Analysis stage decide
/// whether to re-invoke the model without degrading the entry.
///
/// - `Retryable` errors: timeouts, rate limits, overloaded backends,
///   malformed structured output.
/// - `NonRetryable` errors: authentication failures, invalid requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt (e.g. from `Retry-After`).
        /// `None` means apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Errors that halt a run before a document is produced.
///
/// These are the only errors that cross the orchestrator boundary; the CLI
/// maps each variant to a distinct non-zero exit code.
#[derive(Debug, Error)]
pub enum ReleaseNotesError {
    /// The repository or the requested commit range could not be resolved.
    ///
    /// Produced by: Commit Discovery (bad boundary, empty repository, path is
    /// not a repository).
    #[error("Repository access failed for '{target}': {source}")]
    RepositoryAccess {
        /// The path or reference that could not be resolved.
        target: String,
        #[source]
        source: VcsError,
    },

    /// The aggregated state is malformed and cannot be rendered.
    ///
    /// `diagnostics_dump` carries the serialised pipeline state so the problem
    /// can be investigated without re-running.
    #[error("Render failed: {reason}")]
    Render {
        reason: String,
        diagnostics_dump: String,
    },
}

impl ReleaseNotesError {
    /// Process exit code the CLI uses for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RepositoryAccess { .. } => 2,
            Self::Render { .. } => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage-local errors
// ---------------------------------------------------------------------------

/// The diff for one commit could not be turned into code context.
///
/// Non-fatal: the Code Context stage records a diagnostic and the commit is
/// analysed from its message alone.
#[derive(Debug, Error)]
pub enum DiffFetchError {
    #[error("diff for {commit} unavailable: {source}")]
    Unavailable {
        commit: CommitSha,
        #[source]
        source: VcsError,
    },

    #[error("diff for {commit} is {size} bytes, above the {limit}-byte limit")]
    TooLarge {
        commit: CommitSha,
        size: usize,
        limit: usize,
    },
}

/// The model could not analyse a commit group within the retry budget.
///
/// Non-fatal: the Analysis stage substitutes a degraded entry.
#[derive(Debug, Error)]
#[error("model invocation failed after {attempts} attempt(s): {source}")]
pub struct ModelInvocationError {
    pub attempts: u32,
    #[source]
    pub source: ModelError,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The run configuration is invalid. Produced at load time; a run never
/// starts with an invalid configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration error: {field} {message}")]
    Invalid { field: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_map_to_distinct_non_zero_exit_codes() {
        let repo = ReleaseNotesError::RepositoryAccess {
            target: "/nowhere".into(),
            source: VcsError::NotFound {
                reference: "/nowhere".into(),
            },
        };
        let render = ReleaseNotesError::Render {
            reason: "dangling commit".into(),
            diagnostics_dump: "{}".into(),
        };
        assert_eq!(repo.exit_code(), 2);
        assert_eq!(render.exit_code(), 3);
    }

    #[test]
    fn retry_policy_reports_retryability() {
        assert!(RetryPolicy::Retryable { after: None }.is_retryable());
        assert!(!RetryPolicy::NonRetryable.is_retryable());
    }
}
