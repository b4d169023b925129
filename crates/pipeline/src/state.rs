//! The typed state record threaded through every pipeline stage.
//!
//! [`PipelineState`] is owned by the orchestrator for the duration of one run.
//! Stages read it through the accessors below and describe their changes as a
//! [`StateUpdate`]; the orchestrator applies updates once every worker of a
//! stage has finished. Entries are only ever added, never removed.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    ChangeEntry, CodeContextRecord, CommitRecord, CommitSha, Diagnostic, QualityAssessment,
    RangeResolution,
};

/// Changes produced by one stage, applied through the state accessors.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub commits: Vec<CommitRecord>,
    pub assessments: Vec<QualityAssessment>,
    pub contexts: Vec<CodeContextRecord>,
    pub entries: Vec<ChangeEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
            && self.assessments.is_empty()
            && self.contexts.is_empty()
            && self.entries.is_empty()
            && self.diagnostics.is_empty()
    }
}

/// Per-run record of commits, assessments, code context, change entries and
/// diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    range: Option<RangeResolution>,
    order: Vec<CommitSha>,
    commits: BTreeMap<CommitSha, CommitRecord>,
    quality: BTreeMap<CommitSha, QualityAssessment>,
    context: BTreeMap<CommitSha, CodeContextRecord>,
    entries: Vec<ChangeEntry>,
    diagnostics: Vec<Diagnostic>,
    incomplete: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Writers
    // -----------------------------------------------------------------------

    pub fn set_range(&mut self, range: RangeResolution) {
        self.range = Some(range);
    }

    /// Adds a discovered commit. Returns `false` (and keeps the first record)
    /// if the hash is already present.
    pub fn record_commit(&mut self, commit: CommitRecord) -> bool {
        if self.commits.contains_key(&commit.sha) {
            return false;
        }
        self.order.push(commit.sha.clone());
        self.commits.insert(commit.sha.clone(), commit);
        true
    }

    /// Stores the assessment for a known commit. Returns `false` if the commit
    /// is unknown or already assessed.
    pub fn record_quality(&mut self, assessment: QualityAssessment) -> bool {
        if !self.commits.contains_key(&assessment.commit)
            || self.quality.contains_key(&assessment.commit)
        {
            return false;
        }
        self.quality.insert(assessment.commit.clone(), assessment);
        true
    }

    /// Stores code context for a known commit. Returns `false` if the commit
    /// is unknown or already has context.
    pub fn record_context(&mut self, record: CodeContextRecord) -> bool {
        if !self.commits.contains_key(&record.commit) || self.context.contains_key(&record.commit)
        {
            return false;
        }
        self.context.insert(record.commit.clone(), record);
        true
    }

    pub fn append_change_entry(&mut self, entry: ChangeEntry) {
        self.entries.push(entry);
    }

    pub fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    /// Applies a stage's update through the individual writers.
    pub fn apply(&mut self, update: StateUpdate) {
        for commit in update.commits {
            if !self.record_commit(commit) {
                tracing::debug!("ignoring duplicate commit record");
            }
        }
        for assessment in update.assessments {
            self.record_quality(assessment);
        }
        for record in update.contexts {
            self.record_context(record);
        }
        for entry in update.entries {
            self.append_change_entry(entry);
        }
        for diagnostic in update.diagnostics {
            self.record_diagnostic(diagnostic);
        }
    }

    /// Re-sorts entries by the discovery index of their earliest source
    /// commit. The sort is stable, so ties keep their insertion order.
    pub fn sort_entries_by_discovery_order(&mut self) {
        let index: BTreeMap<&CommitSha, usize> =
            self.order.iter().enumerate().map(|(i, sha)| (sha, i)).collect();
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by_key(|entry| {
            entry
                .commits
                .iter()
                .filter_map(|sha| index.get(sha).copied())
                .min()
                .unwrap_or(usize::MAX)
        });
        self.entries = entries;
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    pub fn range(&self) -> Option<&RangeResolution> {
        self.range.as_ref()
    }

    /// Commits in discovery (chronological) order.
    pub fn commits(&self) -> impl Iterator<Item = &CommitRecord> + '_ {
        self.order.iter().filter_map(|sha| self.commits.get(sha))
    }

    pub fn commit_count(&self) -> usize {
        self.order.len()
    }

    pub fn commit(&self, sha: &CommitSha) -> Option<&CommitRecord> {
        self.commits.get(sha)
    }

    pub fn discovery_index(&self, sha: &CommitSha) -> Option<usize> {
        self.order.iter().position(|s| s == sha)
    }

    pub fn quality(&self, sha: &CommitSha) -> Option<&QualityAssessment> {
        self.quality.get(sha)
    }

    pub fn context(&self, sha: &CommitSha) -> Option<&CodeContextRecord> {
        self.context.get(sha)
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Routing predicate for the planning → context edge.
    pub fn any_needs_code_context(&self) -> bool {
        self.quality.values().any(|q| q.needs_code_context)
    }

    /// Commits flagged for code inspection, in discovery order.
    pub fn commits_needing_context(&self) -> Vec<&CommitRecord> {
        self.commits()
            .filter(|c| {
                self.quality
                    .get(&c.sha)
                    .map(|q| q.needs_code_context)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Commits referenced by at least one change entry.
    pub fn represented_commits(&self) -> HashSet<&CommitSha> {
        self.entries.iter().flat_map(|e| e.commits.iter()).collect()
    }

    /// Commits with a diagnostic that explains their absence from the entries.
    pub fn skipped_commits(&self) -> HashSet<&CommitSha> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_skip())
            .filter_map(|d| d.commit.as_ref())
            .collect()
    }

    /// Commits that are neither represented nor explicitly skipped, in
    /// discovery order. Empty at the end of every well-formed run.
    pub fn unrepresented_commits(&self) -> Vec<&CommitSha> {
        let represented = self.represented_commits();
        let skipped = self.skipped_commits();
        self.order
            .iter()
            .filter(|sha| !represented.contains(sha) && !skipped.contains(sha))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AssessmentSource, ChangeCategory, ClarityScore, DiagnosticKind, ImpactLevel,
        QualityCategory, StageName, Timestamp,
    };

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    fn commit(s: &str) -> CommitRecord {
        CommitRecord {
            sha: sha(s),
            author: "dev".into(),
            timestamp: Timestamp::now(),
            message: format!("Change {s}"),
            files_changed: vec![],
        }
    }

    fn entry(commits: &[&str]) -> ChangeEntry {
        ChangeEntry {
            category: ChangeCategory::Other,
            title: "t".into(),
            description: "d".into(),
            impact: ImpactLevel::Low,
            breaking: false,
            commits: commits.iter().map(|c| sha(c)).collect(),
            degraded: false,
        }
    }

    fn assessment(s: &str, needs: bool) -> QualityAssessment {
        QualityAssessment {
            commit: sha(s),
            category: if needs {
                QualityCategory::Poor
            } else {
                QualityCategory::Adequate
            },
            clarity: ClarityScore::zero(),
            needs_code_context: needs,
            breaking: false,
            rationale: String::new(),
            source: AssessmentSource::Heuristic,
        }
    }

    #[test]
    fn duplicate_commits_are_rejected_and_order_is_kept() {
        let mut state = PipelineState::new();
        assert!(state.record_commit(commit("aaa")));
        assert!(state.record_commit(commit("bbb")));
        assert!(!state.record_commit(commit("aaa")));

        let order: Vec<_> = state.commits().map(|c| c.sha.as_str().to_string()).collect();
        assert_eq!(order, vec!["aaa", "bbb"]);
        assert_eq!(state.discovery_index(&sha("bbb")), Some(1));
    }

    #[test]
    fn assessments_for_unknown_or_already_assessed_commits_are_ignored() {
        let mut state = PipelineState::new();
        state.record_commit(commit("aaa"));

        assert!(!state.record_quality(assessment("zzz", true)));
        assert!(state.record_quality(assessment("aaa", false)));
        assert!(!state.record_quality(assessment("aaa", true)));
        assert!(!state.quality(&sha("aaa")).unwrap().needs_code_context);
        assert!(!state.any_needs_code_context());
    }

    #[test]
    fn commits_needing_context_follow_discovery_order() {
        let mut state = PipelineState::new();
        for s in ["c1", "c2", "c3"] {
            state.record_commit(commit(s));
        }
        state.record_quality(assessment("c3", true));
        state.record_quality(assessment("c2", false));
        state.record_quality(assessment("c1", true));

        let flagged: Vec<_> = state
            .commits_needing_context()
            .iter()
            .map(|c| c.sha.as_str().to_string())
            .collect();
        assert_eq!(flagged, vec!["c1", "c3"]);
        assert!(state.any_needs_code_context());
    }

    #[test]
    fn unrepresented_commits_exclude_entries_and_skip_diagnostics() {
        let mut state = PipelineState::new();
        for s in ["c1", "c2", "c3"] {
            state.record_commit(commit(s));
        }
        state.append_change_entry(entry(&["c1"]));
        state.record_diagnostic(Diagnostic::for_commit(
            sha("c2"),
            StageName::Analysis,
            DiagnosticKind::IncompleteTimeout,
            "deadline elapsed",
        ));
        // Informational diagnostics do not count as a skip reason.
        state.record_diagnostic(Diagnostic::for_commit(
            sha("c3"),
            StageName::Context,
            DiagnosticKind::DiffUnavailable,
            "gone",
        ));

        assert_eq!(state.unrepresented_commits(), vec![&sha("c3")]);
    }

    #[test]
    fn entries_are_resorted_by_earliest_source_commit() {
        let mut state = PipelineState::new();
        for s in ["c1", "c2", "c3"] {
            state.record_commit(commit(s));
        }
        state.append_change_entry(entry(&["c3"]));
        state.append_change_entry(entry(&["c2", "c1"]));

        state.sort_entries_by_discovery_order();

        assert_eq!(state.entries()[0].commits[0], sha("c2"));
        assert_eq!(state.entries()[1].commits[0], sha("c3"));
    }

    #[test]
    fn apply_routes_update_through_writers() {
        let mut state = PipelineState::new();
        let update = StateUpdate {
            commits: vec![commit("c1"), commit("c1")],
            assessments: vec![assessment("c1", true), assessment("ghost", true)],
            ..StateUpdate::default()
        };
        state.apply(update);

        assert_eq!(state.commit_count(), 1);
        assert!(state.quality(&sha("c1")).is_some());
        assert!(state.quality(&sha("ghost")).is_none());
    }
}
