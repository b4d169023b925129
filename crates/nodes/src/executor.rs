//! The `PipelineExecutor` state machine.
//!
//! ```text
//! discovering ─▶ planning ─┬─▶ context ─▶ analyzing ─▶ rendering ─▶ done
//!      │                   └────────────▶ analyzing        │
//!      └──────────────▶ failed ◀───────────────────────────┘
//! ```
//!
//! The executor owns the [`PipelineState`] for the whole run. Stages read it
//! and hand back a [`StateUpdate`](pipeline::StateUpdate); the executor applies
//! it and asks [`next_phase`] where to go. When the deadline elapses or the
//! run is cancelled, every commit that has no entry yet is flagged and the run
//! jumps straight to rendering, so an interrupted run still yields a document.

use std::sync::Arc;

use pipeline::{
    Diagnostic, LanguageModel, PipelineRunId, PipelineState, ReleaseNotesDocument,
    ReleaseNotesError, RunConfig, StageName, Timestamp, VersionControl,
};
use serde::Serialize;
use tracing::{info, warn, Instrument};

use crate::analysis::analyze;
use crate::context::gather;
use crate::control::{CancellationHandle, Interruption, RunControl};
use crate::discovery::{discover, RunRequest};
use crate::planning::plan;
use crate::render::render;

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovering,
    Planning,
    Context,
    Analyzing,
    Rendering,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What a stage reports back to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    Completed,
    /// Planning flagged at least one commit for code inspection.
    CodeContextRequired,
    Interrupted(Interruption),
    /// A fatal error class was raised (discovery and render only).
    Fatal,
}

/// Pure transition function of the run state machine.
///
/// `Failed` is reachable only from `Discovering` and `Rendering`; stages with
/// no fatal error class that report `Fatal` proceed to rendering with what
/// they have. Terminal phases are absorbing.
pub fn next_phase(phase: Phase, signal: StageSignal) -> Phase {
    use Phase::*;
    use StageSignal::*;

    match (phase, signal) {
        (Done, _) => Done,
        (Failed, _) => Failed,
        (Discovering | Rendering, Fatal) => Failed,
        (Rendering, _) => Done,
        (_, Interrupted(_)) | (_, Fatal) => Rendering,
        (Discovering, _) => Planning,
        (Planning, CodeContextRequired) => Context,
        (Planning, Completed) => Analyzing,
        (Context, _) => Analyzing,
        (Analyzing, _) => Rendering,
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: PipelineRunId,
    /// Phases in the order they were entered, ending in `Done`.
    pub phases: Vec<Phase>,
    pub document: ReleaseNotesDocument,
    pub state: PipelineState,
}

impl RunReport {
    pub fn visited(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Drives one release-notes run against the two ports.
pub struct PipelineExecutor {
    vcs: Arc<dyn VersionControl>,
    model: Arc<dyn LanguageModel>,
    config: RunConfig,
}

impl PipelineExecutor {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        model: Arc<dyn LanguageModel>,
        config: RunConfig,
    ) -> Self {
        Self { vcs, model, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the pipeline to completion.
    ///
    /// Returns a document (possibly incomplete or with degraded entries), or
    /// one of the two fatal errors.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationHandle,
    ) -> Result<RunReport, ReleaseNotesError> {
        let run_id = PipelineRunId::generate();
        let span = tracing::info_span!("release_notes_run", run_id = %run_id);
        self.drive(run_id, request, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        run_id: PipelineRunId,
        request: RunRequest,
        cancel: &CancellationHandle,
    ) -> Result<RunReport, ReleaseNotesError> {
        let control = RunControl::start(self.config.run_timeout(), cancel);
        let mut state = PipelineState::new();
        let mut phase = Phase::Discovering;
        let mut phases = vec![phase];
        let mut interrupted: Option<Interruption> = None;
        let mut document = None;

        info!(
            until = %request.until,
            since = ?request.since.as_ref().map(|s| s.as_str()),
            concurrency = self.config.concurrency,
            "run started"
        );

        while !phase.is_terminal() {
            let signal = match phase {
                Phase::Discovering => match discover(self.vcs.as_ref(), &request).await {
                    Ok(output) => {
                        state.set_range(output.range);
                        state.apply(output.update);
                        checkpoint(&control)
                    }
                    Err(e) => {
                        warn!(error = %e, "discovery failed");
                        return Err(e);
                    }
                },
                Phase::Planning => {
                    let update = plan(&state, &self.model, &self.config, &control).await;
                    state.apply(update);
                    match checkpoint(&control) {
                        StageSignal::Completed if state.any_needs_code_context() => {
                            StageSignal::CodeContextRequired
                        }
                        other => other,
                    }
                }
                Phase::Context => {
                    let output = gather(&state, &self.vcs, &self.config, &control).await;
                    state.apply(output.update);
                    stage_signal(output.interrupted, &control)
                }
                Phase::Analyzing => {
                    let output = analyze(&state, &self.model, &self.config, &control).await;
                    state.apply(output.update);
                    state.sort_entries_by_discovery_order();
                    stage_signal(output.interrupted, &control)
                }
                Phase::Rendering => {
                    if let Some(reason) = interrupted {
                        flag_unprocessed(&mut state, reason);
                    }
                    let project = self.vcs.project_name();
                    match render(&state, &project, Timestamp::now()) {
                        Ok(doc) => {
                            document = Some(doc);
                            StageSignal::Completed
                        }
                        Err(e) => {
                            warn!(error = %e, "render failed");
                            return Err(e);
                        }
                    }
                }
                Phase::Done | Phase::Failed => break,
            };

            if let StageSignal::Interrupted(reason) = signal {
                warn!(?reason, phase = ?phase, "run interrupted, rendering partial results");
                interrupted.get_or_insert(reason);
            }
            phase = next_phase(phase, signal);
            phases.push(phase);
        }

        let Some(document) = document else {
            return Err(ReleaseNotesError::Render {
                reason: "run ended without rendering".into(),
                diagnostics_dump: serde_json::to_string_pretty(&state).unwrap_or_default(),
            });
        };

        info!(
            phases = ?phases,
            entries = document.total_changes,
            incomplete = document.incomplete,
            "run finished"
        );
        Ok(RunReport {
            run_id,
            phases,
            document,
            state,
        })
    }
}

fn checkpoint(control: &RunControl) -> StageSignal {
    match control.interruption() {
        Some(reason) => StageSignal::Interrupted(reason),
        None => StageSignal::Completed,
    }
}

fn stage_signal(interrupted: Option<Interruption>, control: &RunControl) -> StageSignal {
    match interrupted {
        Some(reason) => StageSignal::Interrupted(reason),
        None => checkpoint(control),
    }
}

/// Records a skip diagnostic for every commit without an entry. The state is
/// marked incomplete only when at least one commit was flagged.
fn flag_unprocessed(state: &mut PipelineState, reason: Interruption) {
    let pending: Vec<_> = state
        .unrepresented_commits()
        .into_iter()
        .cloned()
        .collect();
    for sha in &pending {
        state.record_diagnostic(Diagnostic::for_commit(
            sha.clone(),
            StageName::Orchestrator,
            reason.diagnostic_kind(),
            reason.describe(),
        ));
    }
    if !pending.is_empty() {
        state.mark_incomplete();
    }
    info!(flagged = pending.len(), ?reason, "unprocessed commits flagged");
}
