//! In-memory fakes for the port traits (testing only).
//!
//! [`MemoryRepository`] models a linear history with tags and per-commit diffs;
//! [`ScriptedModel`] answers completions from a closure and counts calls. Both
//! satisfy the trait contracts without any external dependency, so the whole
//! pipeline can be driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{
    CommitRange, CompletionRequest, CompletionResponse, CompletionTask, LanguageModel,
    ModelError, TagRef, VcsError, VersionControl,
};
use crate::{CommitRecord, CommitSha, GitRef};

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Linear commit history held in memory. `HEAD` is the last commit added.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    name: String,
    missing: bool,
    commits: Vec<CommitRecord>,
    tags: Vec<TagRef>,
    diffs: HashMap<CommitSha, Result<String, VcsError>>,
    diff_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A repository whose path does not exist: every call fails with
    /// [`VcsError::NotFound`].
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            missing: true,
            ..Self::default()
        }
    }

    /// Appends a commit on top of the current history.
    pub fn with_commit(mut self, commit: CommitRecord) -> Self {
        self.commits.push(commit);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, commit: &CommitSha) -> Self {
        self.tags.push(TagRef {
            name: name.into(),
            commit: commit.clone(),
        });
        self
    }

    pub fn with_diff(mut self, commit: &CommitSha, diff: impl Into<String>) -> Self {
        self.diffs.insert(commit.clone(), Ok(diff.into()));
        self
    }

    pub fn with_diff_error(mut self, commit: &CommitSha, error: VcsError) -> Self {
        self.diffs.insert(commit.clone(), Err(error));
        self
    }

    /// Number of `diff` calls served so far.
    pub fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_commits` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn ensure_present(&self) -> Result<(), VcsError> {
        if self.missing {
            Err(VcsError::NotFound {
                reference: self.name.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn position(&self, reference: &GitRef) -> Result<usize, VcsError> {
        let sha = self.resolve_sync(reference)?;
        self.commits
            .iter()
            .position(|c| c.sha == sha)
            .ok_or_else(|| VcsError::NotFound {
                reference: reference.to_string(),
            })
    }

    fn resolve_sync(&self, reference: &GitRef) -> Result<CommitSha, VcsError> {
        self.ensure_present()?;
        let name = reference.as_str();
        if name == "HEAD" {
            return self
                .commits
                .last()
                .map(|c| c.sha.clone())
                .ok_or_else(|| VcsError::Access {
                    message: "repository has no commits".into(),
                });
        }
        if let Some(tag) = self.tags.iter().find(|t| t.name == name) {
            return Ok(tag.commit.clone());
        }
        self.commits
            .iter()
            .find(|c| c.sha.as_str() == name || c.sha.as_str().starts_with(name))
            .map(|c| c.sha.clone())
            .ok_or_else(|| VcsError::NotFound {
                reference: name.to_string(),
            })
    }
}

#[async_trait]
impl VersionControl for MemoryRepository {
    async fn list_commits(&self, range: &CommitRange) -> Result<Vec<CommitRecord>, VcsError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let end = self.position(&range.until)?;
        let start = match &range.since {
            Some(since) => self.position(since)? + 1,
            None => 0,
        };
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.commits[start..=end].to_vec())
    }

    async fn diff(&self, commit: &CommitSha) -> Result<String, VcsError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_present()?;
        match self.diffs.get(commit) {
            Some(result) => result.clone(),
            None => Err(VcsError::NotFound {
                reference: commit.to_string(),
            }),
        }
    }

    async fn list_tags(&self) -> Result<Vec<TagRef>, VcsError> {
        self.ensure_present()?;
        Ok(self.tags.clone())
    }

    async fn resolve(&self, reference: &GitRef) -> Result<CommitSha, VcsError> {
        self.resolve_sync(reference)
    }

    fn project_name(&self) -> String {
        self.name.clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

type Responder =
    dyn Fn(&CompletionRequest) -> Result<CompletionResponse, ModelError> + Send + Sync;
type Latency = dyn Fn(&CompletionRequest) -> Duration + Send + Sync;

/// Language model whose answers come from a closure.
pub struct ScriptedModel {
    responder: Arc<Responder>,
    latency: Option<Arc<Latency>>,
    calls: Mutex<HashMap<CompletionTask, usize>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<CompletionResponse, ModelError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            latency: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// A model that fails every call with `error`.
    pub fn failing(error: ModelError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Sleeps for the returned duration before answering each request.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    /// Total calls across all tasks.
    pub fn calls(&self) -> usize {
        self.lock_calls().values().sum()
    }

    pub fn calls_for(&self, task: CompletionTask) -> usize {
        self.lock_calls().get(&task).copied().unwrap_or(0)
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, HashMap<CompletionTask, usize>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        *self.lock_calls().entry(request.task).or_insert(0) += 1;
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&request)).await;
        }
        (self.responder)(&request)
    }
}
