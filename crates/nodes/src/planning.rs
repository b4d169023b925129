//! Analysis Planning: one [`QualityAssessment`] per commit.
//!
//! The heuristic path in [`crate::heuristics`] always runs. In
//! [`PlanningMode::ModelAssisted`] the model refines each assessment, but it
//! can only raise the need for code context, never lower it, and any model
//! failure falls back to the heuristic result.

use std::sync::Arc;

use pipeline::{
    AssessmentSource, ClarityScore, CommitRecord, CompletionRequest, CompletionResponse,
    CompletionTask, Diagnostic, DiagnosticKind, LanguageModel, ModelError, PipelineState,
    PlanningMode, QualityAssessment, QualityCategory, RunConfig, StageName, StateUpdate,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::control::RunControl;
use crate::heuristics::{assess_message, MessageAssessment};
use crate::pool::{run_bounded, TaskOutcome};
use crate::retry::retry_with_backoff;

const ASSESS_INSTRUCTIONS: &str = "You review git commit messages for a release-notes tool. \
Rate how clearly the message alone explains the change. Reply with a single JSON object: \
{\"message_clarity\": number between 0 and 1, \"needs_code_review\": boolean, \
\"is_breaking_change\": boolean, \"rationale\": string}. No prose outside the JSON.";

/// Heuristic assessment for one commit.
pub fn heuristic_assessment(commit: &CommitRecord) -> QualityAssessment {
    from_heuristics(commit, assess_message(commit))
}

fn from_heuristics(commit: &CommitRecord, h: MessageAssessment) -> QualityAssessment {
    QualityAssessment {
        commit: commit.sha.clone(),
        needs_code_context: h.needs_code_context(),
        category: h.category,
        clarity: h.clarity,
        breaking: h.breaking,
        rationale: h.rationale,
        source: AssessmentSource::Heuristic,
    }
}

#[derive(Debug, Deserialize)]
struct ModelVerdict {
    message_clarity: f64,
    needs_code_review: bool,
    #[serde(default)]
    is_breaking_change: bool,
    #[serde(default)]
    rationale: String,
}

fn parse_verdict(response: CompletionResponse) -> Result<ModelVerdict, ModelError> {
    let verdict: ModelVerdict =
        serde_json::from_value(response.content).map_err(|e| ModelError::MalformedOutput {
            message: format!("assessment: {e}"),
        })?;
    if ClarityScore::new(verdict.message_clarity).is_none() {
        return Err(ModelError::MalformedOutput {
            message: format!("message_clarity {} outside [0, 1]", verdict.message_clarity),
        });
    }
    Ok(verdict)
}

/// Merges a model verdict over the heuristic floor.
fn refine(floor: QualityAssessment, verdict: ModelVerdict) -> QualityAssessment {
    let needs_code_context = floor.needs_code_context || verdict.needs_code_review;
    let category = if needs_code_context {
        QualityCategory::Poor
    } else {
        floor.category
    };
    let rationale = if verdict.rationale.trim().is_empty() {
        floor.rationale
    } else {
        verdict.rationale.trim().to_string()
    };
    QualityAssessment {
        commit: floor.commit,
        category,
        clarity: ClarityScore::clamped(verdict.message_clarity),
        needs_code_context,
        breaking: floor.breaking || verdict.is_breaking_change,
        rationale,
        source: AssessmentSource::Model,
    }
}

fn assessment_request(commit: &CommitRecord) -> CompletionRequest {
    CompletionRequest {
        task: CompletionTask::AssessMessage,
        instructions: ASSESS_INSTRUCTIONS.to_string(),
        prompt: format!(
            "Commit {} by {}:\n\n{}",
            commit.sha.short(),
            commit.author,
            if commit.message.is_empty() {
                "(empty message)"
            } else {
                commit.message.as_str()
            }
        ),
        context: json!({
            "sha": commit.sha,
            "files_changed": commit.files_changed,
        }),
    }
}

/// Assesses every commit in `state`. Never fails.
#[tracing::instrument(skip_all, fields(stage = "planning", mode = ?config.planning))]
pub async fn plan(
    state: &PipelineState,
    model: &Arc<dyn LanguageModel>,
    config: &RunConfig,
    control: &RunControl,
) -> StateUpdate {
    let commits: Vec<CommitRecord> = state.commits().cloned().collect();
    let mut update = StateUpdate::default();

    match config.planning {
        PlanningMode::Heuristic => {
            update.assessments = commits.iter().map(heuristic_assessment).collect();
        }
        PlanningMode::ModelAssisted => {
            let model = Arc::clone(model);
            let retry = config.retry.clone();
            let worker_control = control.clone();
            let outcomes = run_bounded(commits.clone(), config.concurrency, control, move |commit| {
                let model = Arc::clone(&model);
                let retry = retry.clone();
                let control = worker_control.clone();
                async move {
                    let floor = heuristic_assessment(&commit);
                    let request = assessment_request(&commit);
                    let result = retry_with_backoff(&retry, &control, "assess_message", || {
                        let model = Arc::clone(&model);
                        let request = request.clone();
                        async move { parse_verdict(model.complete(request).await?) }
                    })
                    .await;
                    match result {
                        Ok(verdict) => Ok(refine(floor, verdict)),
                        Err(e) => Err((floor, e.to_string())),
                    }
                }
            })
            .await;

            for (commit, outcome) in commits.iter().zip(outcomes) {
                match outcome {
                    TaskOutcome::Completed(Ok(assessment)) => update.assessments.push(assessment),
                    TaskOutcome::Completed(Err((floor, reason))) => {
                        warn!(
                            commit = %commit.sha.short(),
                            %reason,
                            "model assessment failed, using heuristics"
                        );
                        update.diagnostics.push(Diagnostic::for_commit(
                            commit.sha.clone(),
                            StageName::Planning,
                            DiagnosticKind::PlanningFallback,
                            reason,
                        ));
                        update.assessments.push(floor);
                    }
                    TaskOutcome::Failed(reason) => {
                        update.diagnostics.push(Diagnostic::for_commit(
                            commit.sha.clone(),
                            StageName::Planning,
                            DiagnosticKind::PlanningFallback,
                            reason,
                        ));
                        update.assessments.push(heuristic_assessment(commit));
                    }
                    TaskOutcome::Interrupted(reason) => {
                        debug!(commit = %commit.sha.short(), ?reason, "skipping model assessment");
                        update.assessments.push(heuristic_assessment(commit));
                    }
                }
            }
        }
    }

    let flagged = update
        .assessments
        .iter()
        .filter(|a| a.needs_code_context)
        .count();
    info!(
        assessed = update.assessments.len(),
        needs_code_context = flagged,
        "planning complete"
    );
    update
}
