//! Run configuration.
//!
//! [`RunConfig`] is plain data: it deserialises from the optional TOML file the
//! CLI loads (every field has a default) and is validated once before a run
//! starts. Loading the file is the CLI's job; this crate performs no I/O.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How Analysis Planning judges commit messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanningMode {
    /// Deterministic heuristics only. Never calls the model.
    #[default]
    Heuristic,
    /// Ask the model first; fall back to heuristics on any failure.
    ModelAssisted,
}

/// How commits are grouped into change entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// One change entry per commit.
    #[default]
    PerCommit,
    /// Commits with identical normalised subject lines share one entry.
    IdenticalSubject,
}

/// Bounded exponential back-off for model calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout; an attempt that exceeds it counts as transient.
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            attempt_timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Back-off to wait after the attempt numbered `attempt` (1-based) failed.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Policy knobs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker-pool size for Code Context and Analysis.
    pub concurrency: usize,
    /// Run-level deadline. When it elapses the document is rendered incomplete.
    pub run_timeout_secs: u64,
    /// Diffs above this size are skipped as too large.
    pub max_diff_bytes: usize,
    /// Upper bound on the diff excerpt attached to a commit.
    pub excerpt_chars: usize,
    pub planning: PlanningMode,
    pub grouping: GroupingStrategy,
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_timeout_secs: 600,
            max_diff_bytes: 1024 * 1024,
            excerpt_chars: 4_000,
            planning: PlanningMode::default(),
            grouping: GroupingStrategy::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Checks the invariants a run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.max_diff_bytes == 0 {
            return Err(invalid("max_diff_bytes", "must be at least 1"));
        }
        if self.excerpt_chars == 0 {
            return Err(invalid("excerpt_chars", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(invalid(
                "retry.max_backoff_ms",
                "must not be below retry.initial_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}
