//! Shared value types for the release-notes domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. clarity scores are in `[0.0, 1.0]`,
//! impact levels are totally ordered) and participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CommitSha;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Coarse importance of a change entry.
///
/// Variants are declared in ascending order so the derived [`Ord`] gives
/// `High > Medium > Low`, which is what overall-impact aggregation relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    /// Parses `low` / `medium` / `high` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "major" | "critical" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Category of a change entry in the release notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Feature,
    Fix,
    Chore,
    Other,
}

impl ChangeCategory {
    /// All categories in document order.
    pub const ALL: [ChangeCategory; 4] = [Self::Feature, Self::Fix, Self::Chore, Self::Other];

    /// Maps a free-form category label onto the closed category set.
    ///
    /// Conventional-commit types are accepted as synonyms. Returns `None` for
    /// labels that match nothing, so callers can decide between rejecting the
    /// value and falling back to [`ChangeCategory::Other`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "feature" | "feat" | "features" | "added" | "enhancement" => Some(Self::Feature),
            "fix" | "bugfix" | "bug" | "fixed" | "security" | "hotfix" => Some(Self::Fix),
            "chore" | "docs" | "doc" | "documentation" | "refactor" | "style" | "test"
            | "tests" | "ci" | "build" | "perf" | "deps" | "dependencies" => Some(Self::Chore),
            "other" | "misc" | "changed" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Fix => "fix",
            Self::Chore => "chore",
            Self::Other => "other",
        }
    }

    /// Plural heading used in document summaries.
    pub fn plural_label(self) -> &'static str {
        match self {
            Self::Feature => "features",
            Self::Fix => "fixes",
            Self::Chore => "chores",
            Self::Other => "other changes",
        }
    }
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// How informative a commit's own message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    /// Routine change whose short message says everything there is to say
    /// (formatting, typo, version bump, merge).
    Trivial,
    /// The message describes the change well enough on its own.
    Adequate,
    /// The message is vague or missing; code inspection is needed.
    Poor,
}

impl std::fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Trivial => "trivial",
            Self::Adequate => "adequate",
            Self::Poor => "poor",
        })
    }
}

// ---------------------------------------------------------------------------
// Score types
// ---------------------------------------------------------------------------

/// A commit-message clarity score in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ClarityScore(f64);

impl ClarityScore {
    /// Creates a [`ClarityScore`], returning `None` if `value` is outside
    /// the valid range `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a score, clamping finite out-of-range values into `[0.0, 1.0]`.
    /// Non-finite input yields zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self(0.0)
        }
    }

    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the score as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for ClarityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// The pipeline stage a diagnostic (or a log span) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Discovery,
    Planning,
    Context,
    Analysis,
    Render,
    Orchestrator,
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::Planning => "planning",
            Self::Context => "context",
            Self::Analysis => "analysis",
            Self::Render => "render",
            Self::Orchestrator => "orchestrator",
        })
    }
}

// ---------------------------------------------------------------------------

/// What kind of per-commit problem a [`Diagnostic`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The model could not produce an analysis; a minimal entry stands in.
    AnalysisDegraded,
    /// The diff for the commit could not be fetched.
    DiffUnavailable,
    /// The diff exceeded the configured size limit.
    CommitTooLarge,
    /// Model-assisted planning failed; the heuristic assessment was used.
    PlanningFallback,
    /// The run deadline elapsed before the commit was analysed.
    IncompleteTimeout,
    /// The run was cancelled before the commit was analysed.
    IncompleteCancelled,
}

impl DiagnosticKind {
    /// Returns `true` if this kind explains why a commit has no change entry.
    pub fn is_skip_reason(self) -> bool {
        matches!(self, Self::IncompleteTimeout | Self::IncompleteCancelled)
    }

    /// Fixed human-readable label; the per-occurrence detail goes in
    /// [`Diagnostic::message`].
    pub fn label(self) -> &'static str {
        match self {
            Self::AnalysisDegraded => "analysis degraded",
            Self::DiffUnavailable => "diff unavailable",
            Self::CommitTooLarge => "commit too large",
            Self::PlanningFallback => "planning fell back to heuristics",
            Self::IncompleteTimeout => "incomplete — timeout",
            Self::IncompleteCancelled => "incomplete — cancelled",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------

/// A structured per-commit (or run-level) finding recorded during a run.
///
/// Diagnostics never halt the pipeline; they explain degraded or missing
/// output in the final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Commit the finding relates to. `None` for run-level findings.
    pub commit: Option<CommitSha>,

    /// Stage that recorded the finding.
    pub stage: StageName,

    pub kind: DiagnosticKind,

    /// Human-readable detail (usually the underlying error message).
    pub message: String,
}

impl Diagnostic {
    pub fn for_commit(
        commit: CommitSha,
        stage: StageName,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            commit: Some(commit),
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` if this diagnostic explains a missing change entry.
    pub fn is_skip(&self) -> bool {
        self.kind.is_skip_reason()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.commit {
            Some(sha) => write!(f, "[{}] {}: {} ({})", self.stage, sha.short(), self.kind, self.message),
            None => write!(f, "[{}] {} ({})", self.stage, self.kind, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Commit and generation times, always normalised to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Accepts `git log --format=%aI` output; any offset is converted to UTC.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        let parsed = DateTime::parse_from_rfc3339(value.trim()).ok()?;
        Some(Self(parsed.with_timezone(&Utc)))
    }

    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    /// `YYYY-MM-DD`, used in document headers and file names.
    pub fn date_string(self) -> String {
        self.0.date_naive().to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_levels_order_high_above_medium_above_low() {
        assert!(ImpactLevel::High > ImpactLevel::Medium);
        assert!(ImpactLevel::Medium > ImpactLevel::Low);
        let max = [ImpactLevel::Low, ImpactLevel::High, ImpactLevel::Medium]
            .into_iter()
            .max();
        assert_eq!(max, Some(ImpactLevel::High));
    }

    #[test]
    fn category_parse_accepts_conventional_synonyms() {
        assert_eq!(ChangeCategory::parse("feat"), Some(ChangeCategory::Feature));
        assert_eq!(ChangeCategory::parse(" Fix "), Some(ChangeCategory::Fix));
        assert_eq!(ChangeCategory::parse("docs"), Some(ChangeCategory::Chore));
        assert_eq!(ChangeCategory::parse("banana"), None);
    }

    #[test]
    fn impact_parse_rejects_unknown_levels() {
        assert_eq!(ImpactLevel::parse("HIGH"), Some(ImpactLevel::High));
        assert_eq!(ImpactLevel::parse("enormous"), None);
    }

    #[test]
    fn clarity_score_rejects_out_of_range_and_clamps_on_request() {
        assert!(ClarityScore::new(1.2).is_none());
        assert!(ClarityScore::new(f64::NAN).is_none());
        assert_eq!(ClarityScore::clamped(1.7).as_f64(), 1.0);
        assert_eq!(ClarityScore::clamped(-0.3).as_f64(), 0.0);
    }

    #[test]
    fn only_incomplete_kinds_are_skip_reasons() {
        assert!(DiagnosticKind::IncompleteTimeout.is_skip_reason());
        assert!(DiagnosticKind::IncompleteCancelled.is_skip_reason());
        assert!(!DiagnosticKind::AnalysisDegraded.is_skip_reason());
        assert!(!DiagnosticKind::DiffUnavailable.is_skip_reason());
    }

    #[test]
    fn timestamp_parses_git_iso_dates_with_offsets() {
        let ts = Timestamp::parse_rfc3339("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_string(), "2024-03-01T10:00:00+00:00");
        assert_eq!(ts.date_string(), "2024-03-01");
    }
}
