//! Analysis: turn commit groups into categorised change entries.
//!
//! Each group is sent to the language model under the retry policy. When the
//! model cannot produce a usable answer the group still gets an entry, built
//! from the raw message alone and marked degraded, so no commit is lost.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline::{
    ChangeCategory, ChangeEntry, CodeContextRecord, CommitRecord, CompletionRequest,
    CompletionResponse, CompletionTask, Diagnostic, DiagnosticKind, GroupingStrategy,
    ImpactLevel, LanguageModel, ModelError, PipelineState, QualityAssessment, RetryConfig,
    RunConfig, StageName, StateUpdate,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::control::{Interruption, RunControl};
use crate::heuristics::{normalized_subject, parse_conventional};
use crate::pool::{run_bounded, TaskOutcome};
use crate::retry::retry_with_backoff;

const ANALYZE_INSTRUCTIONS: &str = "You write release notes for end users. Given one or more \
commits that make up a single change, reply with one JSON object: {\"category\": one of \
\"feature\", \"fix\", \"chore\", \"other\"; \"title\": short user-facing title; \
\"description\": one or two sentences on what changed and why it matters; \"impact\": one of \
\"low\", \"medium\", \"high\"; \"breaking\": boolean}. Use the code context when the commit \
message is vague. No prose outside the JSON.";

/// One commit and everything earlier stages learned about it.
#[derive(Debug, Clone)]
pub struct CommitInput {
    pub commit: CommitRecord,
    pub assessment: Option<QualityAssessment>,
    pub context: Option<CodeContextRecord>,
}

/// The commits that become a single change entry, in discovery order.
#[derive(Debug, Clone)]
pub struct CommitGroup {
    pub members: Vec<CommitInput>,
}

/// Output of the Analysis stage.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutput {
    pub update: StateUpdate,
    pub interrupted: Option<Interruption>,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Groups the commits in `state` that have no entry yet.
pub fn group_commits(state: &PipelineState, strategy: GroupingStrategy) -> Vec<CommitGroup> {
    let represented = state.represented_commits();
    let inputs = state
        .commits()
        .filter(|c| !represented.contains(&c.sha))
        .map(|c| CommitInput {
            commit: c.clone(),
            assessment: state.quality(&c.sha).cloned(),
            context: state.context(&c.sha).cloned(),
        });

    match strategy {
        GroupingStrategy::PerCommit => inputs
            .map(|input| CommitGroup {
                members: vec![input],
            })
            .collect(),
        GroupingStrategy::IdenticalSubject => {
            let mut groups: Vec<CommitGroup> = Vec::new();
            let mut by_subject: HashMap<String, usize> = HashMap::new();
            for input in inputs {
                let key = normalized_subject(input.commit.subject());
                // Empty subjects never merge.
                match by_subject.get(&key) {
                    Some(&index) if !key.is_empty() => groups[index].members.push(input),
                    _ => {
                        by_subject.insert(key, groups.len());
                        groups.push(CommitGroup {
                            members: vec![input],
                        });
                    }
                }
            }
            groups
        }
    }
}

// ---------------------------------------------------------------------------
// Model exchange
// ---------------------------------------------------------------------------

/// The fields the model must return for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeAnalysis {
    pub category: ChangeCategory,
    pub title: String,
    pub description: String,
    pub impact: ImpactLevel,
    pub breaking: bool,
}

fn member_context(input: &CommitInput) -> Value {
    json!({
        "sha": input.commit.sha,
        "author": input.commit.author,
        "date": input.commit.timestamp.date_string(),
        "message": input.commit.message,
        "files_changed": input.commit.files_changed,
        "quality": input.assessment.as_ref().map(|a| json!({
            "category": a.category.to_string(),
            "clarity": a.clarity.as_f64(),
            "breaking": a.breaking,
        })),
        "code_context": input.context.as_ref().map(|c| json!({
            "languages": c.languages,
            "areas": c.areas,
            "signals": c.signals,
            "excerpt": c.excerpt,
            "truncated": c.truncated,
        })),
    })
}

pub fn analysis_request(group: &CommitGroup) -> CompletionRequest {
    let mut prompt = String::from("Summarise this change for the release notes.\n");
    for input in &group.members {
        prompt.push_str(&format!(
            "\nCommit {}:\n{}\n",
            input.commit.sha.short(),
            if input.commit.message.is_empty() {
                "(empty message)"
            } else {
                input.commit.message.as_str()
            }
        ));
        if let Some(ctx) = &input.context {
            prompt.push_str(&format!("Diff excerpt:\n{}\n", ctx.excerpt));
        }
    }
    CompletionRequest {
        task: CompletionTask::AnalyzeChange,
        instructions: ANALYZE_INSTRUCTIONS.to_string(),
        prompt,
        context: json!({
            "commits": group.members.iter().map(member_context).collect::<Vec<_>>(),
        }),
    }
}

fn malformed(message: impl Into<String>) -> ModelError {
    ModelError::MalformedOutput {
        message: message.into(),
    }
}

fn required_str<'a>(content: &'a Value, field: &str) -> Result<&'a str, ModelError> {
    content
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| malformed(format!("missing string field `{field}`")))
}

/// Validates the model's answer. Any structural problem is
/// [`ModelError::MalformedOutput`], which the retry policy retries.
pub fn parse_analysis(response: &CompletionResponse) -> Result<ChangeAnalysis, ModelError> {
    let content = &response.content;
    if !content.is_object() {
        return Err(malformed("expected a JSON object"));
    }

    let category = required_str(content, "category")?;
    let category = ChangeCategory::parse(category)
        .ok_or_else(|| malformed(format!("unknown category `{category}`")))?;
    let impact = required_str(content, "impact")?;
    let impact = ImpactLevel::parse(impact)
        .ok_or_else(|| malformed(format!("unknown impact `{impact}`")))?;
    let title = required_str(content, "title")?;
    if title.is_empty() {
        return Err(malformed("empty title"));
    }
    let description = match required_str(content, "description")? {
        "" => title,
        d => d,
    };
    let breaking = match content.get("breaking") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => return Err(malformed(format!("`breaking` is not a boolean: {other}"))),
    };

    Ok(ChangeAnalysis {
        category,
        title: title.to_string(),
        description: description.to_string(),
        impact,
        breaking,
    })
}

fn shas(group: &CommitGroup) -> Vec<pipeline::CommitSha> {
    group.members.iter().map(|m| m.commit.sha.clone()).collect()
}

fn heuristics_say_breaking(group: &CommitGroup) -> bool {
    group.members.iter().any(|m| {
        m.assessment.as_ref().is_some_and(|a| a.breaking)
            || m.context
                .as_ref()
                .is_some_and(|c| c.signals.iter().any(|s| s.is_breaking()))
    })
}

pub fn entry_from_analysis(group: &CommitGroup, analysis: ChangeAnalysis) -> ChangeEntry {
    ChangeEntry {
        category: analysis.category,
        title: analysis.title,
        description: analysis.description,
        impact: analysis.impact,
        breaking: analysis.breaking || heuristics_say_breaking(group),
        commits: shas(group),
        degraded: false,
    }
}

/// Minimal entry built only from the raw message.
pub fn degraded_entry(group: &CommitGroup) -> ChangeEntry {
    let first = group.members.first().map(|m| &m.commit);
    let subject = first.map(|c| c.subject()).unwrap_or_default();
    let title = match first {
        Some(c) if subject.is_empty() => format!("Commit {}", c.sha.short()),
        _ => parse_conventional(subject)
            .map(|h| h.description)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| subject.to_string()),
    };
    let body = first.map(|c| c.body()).unwrap_or_default();
    let description = if body.is_empty() {
        title.clone()
    } else {
        body.split_whitespace().collect::<Vec<_>>().join(" ")
    };
    ChangeEntry {
        category: ChangeCategory::Other,
        title,
        description,
        impact: ImpactLevel::Low,
        breaking: false,
        commits: shas(group),
        degraded: true,
    }
}

fn degraded_diagnostics(group: &CommitGroup, reason: &str) -> Vec<Diagnostic> {
    group
        .members
        .iter()
        .map(|m| {
            Diagnostic::for_commit(
                m.commit.sha.clone(),
                StageName::Analysis,
                DiagnosticKind::AnalysisDegraded,
                reason,
            )
        })
        .collect()
}

/// Analyses one group, degrading instead of failing.
///
/// Returns the interruption instead when the run stopped while the group was
/// still waiting to retry, so the group is reported as unprocessed.
pub async fn analyze_group(
    model: &dyn LanguageModel,
    retry: &RetryConfig,
    control: &RunControl,
    group: &CommitGroup,
) -> Result<(ChangeEntry, Vec<Diagnostic>), Interruption> {
    let request = analysis_request(group);
    let result = retry_with_backoff(retry, control, "analyze_change", || {
        let request = request.clone();
        async move { parse_analysis(&model.complete(request).await?) }
    })
    .await;

    match result {
        Ok(analysis) => Ok((entry_from_analysis(group, analysis), Vec::new())),
        Err(e) => {
            if let Some(reason) = control.interruption() {
                warn!(
                    commits = group.members.len(),
                    attempts = e.attempts,
                    ?reason,
                    "analysis abandoned"
                );
                return Err(reason);
            }
            warn!(
                commits = group.members.len(),
                attempts = e.attempts,
                error = %e,
                "analysis degraded"
            );
            Ok((degraded_entry(group), degraded_diagnostics(group, &e.to_string())))
        }
    }
}

/// Analyses every commit without an entry.
#[tracing::instrument(skip_all, fields(stage = "analysis", grouping = ?config.grouping))]
pub async fn analyze(
    state: &PipelineState,
    model: &Arc<dyn LanguageModel>,
    config: &RunConfig,
    control: &RunControl,
) -> AnalysisOutput {
    let groups = group_commits(state, config.grouping);
    let worker_model = Arc::clone(model);
    let retry = config.retry.clone();
    let worker_control = control.clone();
    let outcomes = run_bounded(groups.clone(), config.concurrency, control, move |group| {
        let model = Arc::clone(&worker_model);
        let retry = retry.clone();
        let control = worker_control.clone();
        async move { analyze_group(model.as_ref(), &retry, &control, &group).await }
    })
    .await;

    let mut output = AnalysisOutput::default();
    for (group, outcome) in groups.iter().zip(outcomes) {
        match outcome {
            TaskOutcome::Completed(Ok((entry, diagnostics))) => {
                output.update.entries.push(entry);
                output.update.diagnostics.extend(diagnostics);
            }
            TaskOutcome::Completed(Err(reason)) => {
                output.interrupted.get_or_insert(reason);
            }
            TaskOutcome::Failed(reason) => {
                output.update.entries.push(degraded_entry(group));
                output
                    .update
                    .diagnostics
                    .extend(degraded_diagnostics(group, &reason));
            }
            TaskOutcome::Interrupted(reason) => {
                output.interrupted.get_or_insert(reason);
            }
        }
    }

    let degraded = output.update.entries.iter().filter(|e| e.degraded).count();
    info!(
        groups = groups.len(),
        entries = output.update.entries.len(),
        degraded,
        "analysis complete"
    );
    output
}
