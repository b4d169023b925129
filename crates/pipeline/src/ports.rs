//! Port traits for the two external collaborators.
//!
//! The pipeline never talks to Git or to a model backend directly. It sees
//! only [`VersionControl`] and [`LanguageModel`]; the `git` and `llm` crates
//! supply production implementations and [`crate::fakes`] supplies in-memory
//! ones for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CommitRecord, CommitSha, GitRef, RetryPolicy};

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// A commit range: everything reachable from `until` but not from `since`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRange {
    pub since: Option<GitRef>,
    pub until: GitRef,
}

impl CommitRange {
    pub fn new(since: Option<GitRef>, until: GitRef) -> Self {
        Self { since, until }
    }

    /// Git revision-range syntax (`since..until`, or just `until`).
    pub fn rev_spec(&self) -> String {
        match &self.since {
            Some(since) => format!("{since}..{}", self.until),
            None => self.until.to_string(),
        }
    }
}

impl std::fmt::Display for CommitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rev_spec())
    }
}

/// A tag name and the commit it points at (annotated tags are peeled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
    pub commit: CommitSha,
}

/// Failure reported by a [`VersionControl`] implementation.
///
/// `NotFound` and `Access` are distinguishable so callers can tell a bad
/// boundary from an unusable repository.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VcsError {
    /// A path, reference or commit does not exist.
    #[error("not found: {reference}")]
    NotFound { reference: String },

    /// The repository exists but cannot be read (permissions, not a repository,
    /// no commits yet).
    #[error("repository access failed: {message}")]
    Access { message: String },

    /// The backend itself failed (tool missing, unparseable output).
    #[error("version-control command failed: {message}")]
    Command { message: String },
}

/// Read-only access to a repository's history.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Lists the commits in `range`, oldest first.
    async fn list_commits(&self, range: &CommitRange) -> Result<Vec<CommitRecord>, VcsError>;

    /// Returns the unified diff introduced by `commit` (against its first
    /// parent, or the empty tree for a root commit).
    async fn diff(&self, commit: &CommitSha) -> Result<String, VcsError>;

    /// Lists all tags with the commits they point at.
    async fn list_tags(&self) -> Result<Vec<TagRef>, VcsError>;

    /// Resolves a revision expression to a commit.
    async fn resolve(&self, reference: &GitRef) -> Result<CommitSha, VcsError>;

    /// Human-readable project name derived from the repository location.
    fn project_name(&self) -> String;
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Which pipeline question a completion answers. Lets implementations (and
/// test doubles) route or meter requests per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTask {
    /// Model-assisted message quality assessment (planning).
    AssessMessage,
    /// Commit-group summarisation into a change entry (analysis).
    AnalyzeChange,
}

/// One structured-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    /// System-level instructions, including the required JSON shape.
    pub instructions: String,
    /// The user-level prompt.
    pub prompt: String,
    /// Structured context the prompt refers to.
    pub context: serde_json::Value,
}

/// A structured completion: the JSON object the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: serde_json::Value,
}

/// Failure reported by a [`LanguageModel`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Rate limit, overload, timeout, or connection failure. Worth retrying.
    #[error("transient model failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Authentication failure or rejected request. Retrying cannot help.
    #[error("permanent model failure: {message}")]
    Permanent { message: String },

    /// The model answered, but not with the required structure.
    #[error("malformed model output: {message}")]
    MalformedOutput { message: String },
}

impl ModelError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transient { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::MalformedOutput { .. } => RetryPolicy::Retryable { after: None },
            Self::Permanent { .. } => RetryPolicy::NonRetryable,
        }
    }
}

/// Structured completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError>;
}
