//! Code Context: diff-derived context for commits whose message needs help.

use std::sync::Arc;

use pipeline::{
    CodeContextRecord, CommitRecord, CommitSha, Diagnostic, DiagnosticKind, DiffFetchError,
    PipelineState, RunConfig, StageName, StateUpdate, VersionControl,
};
use tracing::{debug, info, warn};

use crate::control::{Interruption, RunControl};
use crate::pool::{run_bounded, TaskOutcome};
use crate::signals::{excerpt, extract_signals, hints, parse_diff};

/// Output of the Code Context stage.
#[derive(Debug, Clone, Default)]
pub struct ContextOutput {
    pub update: StateUpdate,
    /// Set when the run stopped before every flagged commit was visited.
    pub interrupted: Option<Interruption>,
}

/// Builds the context record for one diff.
pub fn build_context(
    commit: &CommitRecord,
    diff: &str,
    config: &RunConfig,
) -> Result<CodeContextRecord, DiffFetchError> {
    if diff.len() > config.max_diff_bytes {
        return Err(DiffFetchError::TooLarge {
            commit: commit.sha.clone(),
            size: diff.len(),
            limit: config.max_diff_bytes,
        });
    }

    let patches = parse_diff(diff);
    let mut files: Vec<String> = patches.iter().map(|p| p.path.clone()).collect();
    if files.is_empty() {
        files = commit.files_changed.clone();
    }
    let (languages, areas) = hints(&files);
    let (text, truncated) = excerpt(diff, config.excerpt_chars);

    Ok(CodeContextRecord {
        commit: commit.sha.clone(),
        excerpt: text,
        truncated,
        files,
        languages,
        areas,
        signals: extract_signals(&patches),
    })
}

async fn fetch_context(
    vcs: &dyn VersionControl,
    commit: &CommitRecord,
    config: &RunConfig,
) -> Result<CodeContextRecord, DiffFetchError> {
    let diff = vcs
        .diff(&commit.sha)
        .await
        .map_err(|source| DiffFetchError::Unavailable {
            commit: commit.sha.clone(),
            source,
        })?;
    build_context(commit, &diff, config)
}

fn diagnostic_for(error: &DiffFetchError, commit: CommitSha) -> Diagnostic {
    let kind = match error {
        DiffFetchError::Unavailable { .. } => DiagnosticKind::DiffUnavailable,
        DiffFetchError::TooLarge { .. } => DiagnosticKind::CommitTooLarge,
    };
    Diagnostic::for_commit(commit, StageName::Context, kind, error.to_string())
}

/// Fetches context for every commit flagged by planning.
#[tracing::instrument(skip_all, fields(stage = "context"))]
pub async fn gather(
    state: &PipelineState,
    vcs: &Arc<dyn VersionControl>,
    config: &RunConfig,
    control: &RunControl,
) -> ContextOutput {
    let flagged: Vec<CommitRecord> = state
        .commits_needing_context()
        .into_iter()
        .cloned()
        .collect();
    debug!(flagged = flagged.len(), "fetching diffs");

    let worker_vcs = Arc::clone(vcs);
    let worker_config = config.clone();
    let outcomes = run_bounded(flagged.clone(), config.concurrency, control, move |commit| {
        let vcs = Arc::clone(&worker_vcs);
        let config = worker_config.clone();
        async move { fetch_context(vcs.as_ref(), &commit, &config).await }
    })
    .await;

    let mut output = ContextOutput::default();
    for (commit, outcome) in flagged.iter().zip(outcomes) {
        match outcome {
            TaskOutcome::Completed(Ok(record)) => output.update.contexts.push(record),
            TaskOutcome::Completed(Err(e)) => {
                warn!(commit = %commit.sha.short(), error = %e, "no code context");
                output
                    .update
                    .diagnostics
                    .push(diagnostic_for(&e, commit.sha.clone()));
            }
            TaskOutcome::Failed(reason) => {
                output.update.diagnostics.push(Diagnostic::for_commit(
                    commit.sha.clone(),
                    StageName::Context,
                    DiagnosticKind::DiffUnavailable,
                    reason,
                ));
            }
            TaskOutcome::Interrupted(reason) => {
                output.interrupted.get_or_insert(reason);
            }
        }
    }

    info!(
        attached = output.update.contexts.len(),
        failed = output.update.diagnostics.len(),
        "code context gathered"
    );
    output
}
