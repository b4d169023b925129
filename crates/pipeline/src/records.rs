//! Data-model records produced by the pipeline stages.
//!
//! Each record is created by exactly one stage and is immutable afterwards;
//! [`crate::PipelineState`] stores them keyed by [`CommitSha`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    ChangeCategory, ClarityScore, CommitSha, Diagnostic, GitRef, ImpactLevel, QualityCategory,
    Timestamp,
};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// One commit in the requested range, as reported by the version-control port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: CommitSha,
    pub author: String,
    pub timestamp: Timestamp,
    /// Full raw message (subject and body), trimmed.
    pub message: String,
    /// Paths touched by the commit, relative to the repository root.
    pub files_changed: Vec<String>,
}

impl CommitRecord {
    /// First line of the message, trimmed. Empty when the message is empty.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Everything after the subject line, trimmed.
    pub fn body(&self) -> &str {
        match self.message.split_once('\n') {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }
}

/// The commit range a run covers, after automatic boundary detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResolution {
    /// Exclusive lower boundary. `None` means "from the root commit".
    pub since: Option<GitRef>,
    /// Inclusive upper boundary.
    pub until: GitRef,
    /// Human-readable description ("unreleased changes since last tag", …).
    pub description: String,
    /// Label used in the document title and file name.
    pub version_label: String,
    /// Newest release tag in the repository, if any.
    pub latest_tag: Option<String>,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Whether an assessment came from the deterministic heuristics or the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    Heuristic,
    Model,
}

/// Judgement of how informative one commit's message is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub commit: CommitSha,
    pub category: QualityCategory,
    pub clarity: ClarityScore,
    /// Routing input: when `true` the Code Context stage fetches the diff.
    pub needs_code_context: bool,
    /// The message carries a breaking-change marker.
    pub breaking: bool,
    pub rationale: String,
    pub source: AssessmentSource,
}

// ---------------------------------------------------------------------------
// Code context
// ---------------------------------------------------------------------------

/// A technical fact extracted from a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeSignal {
    /// Function/type signatures added or removed in an API-facing file.
    ApiChange {
        path: String,
        removed: Vec<String>,
        added: Vec<String>,
        /// Any signature was removed.
        breaking: bool,
    },
    /// A dependency line added to a manifest file.
    DependencyUpdate {
        manifest: String,
        name: String,
        version: String,
    },
    /// A data model, schema or migration file changed.
    SchemaChange {
        entity: String,
        migration_required: bool,
        backward_compatible: bool,
    },
}

impl CodeSignal {
    pub fn is_breaking(&self) -> bool {
        match self {
            Self::ApiChange { breaking, .. } => *breaking,
            Self::DependencyUpdate { .. } => false,
            Self::SchemaChange {
                migration_required,
                backward_compatible,
                ..
            } => *migration_required && !*backward_compatible,
        }
    }
}

/// Diff-derived context for one commit whose message needed help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContextRecord {
    pub commit: CommitSha,
    /// Bounded excerpt of the unified diff.
    pub excerpt: String,
    /// The excerpt was cut short.
    pub truncated: bool,
    pub files: Vec<String>,
    /// Languages inferred from file extensions, sorted and de-duplicated.
    pub languages: Vec<String>,
    /// Areas inferred from paths (`api`, `schema`, `dependencies`, …), sorted.
    pub areas: Vec<String>,
    pub signals: Vec<CodeSignal>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// A user-facing unit of the release notes, derived from one or more commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub category: ChangeCategory,
    pub title: String,
    pub description: String,
    pub impact: ImpactLevel,
    pub breaking: bool,
    /// Source commits in discovery order. Never empty.
    pub commits: Vec<CommitSha>,
    /// Built from the raw message because the model could not be used.
    pub degraded: bool,
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// The terminal artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseNotesDocument {
    pub project_name: String,
    pub version: String,
    pub range_description: String,
    pub generated_at: Timestamp,
    pub total_changes: usize,
    /// Count per category; every category is present, zero counts included.
    pub category_counts: BTreeMap<ChangeCategory, usize>,
    pub overall_impact: ImpactLevel,
    pub breaking_changes: usize,
    pub degraded_entries: usize,
    /// The run stopped early (deadline or cancellation).
    pub incomplete: bool,
    pub entries: Vec<ChangeEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReleaseNotesDocument {
    pub fn count(&self, category: ChangeCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> CommitRecord {
        CommitRecord {
            sha: CommitSha::new("a1b2c3d4e5").unwrap(),
            author: "dev".into(),
            timestamp: Timestamp::now(),
            message: message.into(),
            files_changed: vec![],
        }
    }

    #[test]
    fn subject_and_body_split_on_first_newline() {
        let c = commit("Add parser\n\nHandles nested blocks.\nSee #12");
        assert_eq!(c.subject(), "Add parser");
        assert_eq!(c.body(), "Handles nested blocks.\nSee #12");
    }

    #[test]
    fn empty_message_has_empty_subject_and_body() {
        let c = commit("");
        assert_eq!(c.subject(), "");
        assert_eq!(c.body(), "");
    }

    #[test]
    fn schema_signal_is_breaking_only_when_migration_is_incompatible() {
        let compatible = CodeSignal::SchemaChange {
            entity: "user".into(),
            migration_required: true,
            backward_compatible: true,
        };
        let incompatible = CodeSignal::SchemaChange {
            entity: "user".into(),
            migration_required: true,
            backward_compatible: false,
        };
        assert!(!compatible.is_breaking());
        assert!(incompatible.is_breaking());
    }
}
