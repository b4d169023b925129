//! Deterministic commit-message quality heuristics.
//!
//! This is the non-LLM path of Analysis Planning: it always produces an
//! assessment, so planning never depends on the model being reachable.

use std::sync::LazyLock;

use pipeline::{ClarityScore, CommitRecord, QualityCategory};
use regex::Regex;

/// Scores below this are `poor` and need code context.
pub const POOR_THRESHOLD: f64 = 0.4;

/// `type(scope)!: description`
static CONVENTIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>[A-Za-z]+)(?:\((?P<scope>[^)]*)\))?(?P<bang>!)?:\s*(?P<description>.*)$")
        .expect("Invalid conventional-commit regex")
});

/// `#123`, `GH-42`, `ABC-1234`
static TICKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(\[])#\d+\b|\b[A-Z][A-Z0-9]+-\d+\b").expect("Invalid ticket regex")
});

const IMPERATIVE_VERBS: &[&str] = &[
    "add", "allow", "avoid", "bump", "change", "clean", "convert", "correct", "create",
    "deprecate", "disable", "document", "drop", "enable", "ensure", "expose", "extract", "fix",
    "handle", "implement", "improve", "introduce", "make", "merge", "migrate", "move",
    "optimize", "prevent", "reduce", "refactor", "remove", "rename", "replace", "restore",
    "revert", "rewrite", "simplify", "speed", "split", "support", "switch", "update", "upgrade",
    "use", "validate",
];

const VAGUE_SUBJECTS: &[&str] = &[
    "wip", "update", "updates", "fix", "fixes", "fixed", "change", "changes", "misc", "stuff",
    "minor", "tmp", "temp", "test", "cleanup", "save", "progress", "commit", "asdf", "more",
    "done", "tweak", "tweaks",
];

const TRIVIAL_KINDS: &[&str] = &["style", "ci", "build"];

const TRIVIAL_MARKERS: &[&str] = &[
    "typo",
    "formatting",
    "whitespace",
    "bump version",
    "version bump",
    "cargo fmt",
    "rustfmt",
    "prettier",
    "lint fixes",
];

const MERGE_PREFIXES: &[&str] = &["merge branch", "merge pull request", "merge remote", "merge tag"];

const BREAKING_MARKERS: &[&str] = &[
    "breaking change",
    "breaking-change",
    "breaks backward compatibility",
    "breaks backwards compatibility",
    "migration required",
];

// ---------------------------------------------------------------------------
// Conventional commits
// ---------------------------------------------------------------------------

/// The parsed header of a conventional-commit subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalHeader {
    pub kind: String,
    pub scope: Option<String>,
    pub breaking: bool,
    pub description: String,
}

/// Parses `type(scope)!: description`. Returns `None` for free-form subjects.
pub fn parse_conventional(subject: &str) -> Option<ConventionalHeader> {
    let caps = CONVENTIONAL_RE.captures(subject.trim())?;
    Some(ConventionalHeader {
        kind: caps.name("kind")?.as_str().to_ascii_lowercase(),
        scope: caps
            .name("scope")
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        breaking: caps.name("bang").is_some(),
        description: caps
            .name("description")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

pub fn has_ticket_reference(message: &str) -> bool {
    TICKET_RE.is_match(message)
}

/// `true` if the message carries any breaking-change indicator.
pub fn is_breaking(message: &str) -> bool {
    let first_line = message.lines().next().unwrap_or("");
    if parse_conventional(first_line).is_some_and(|h| h.breaking) {
        return true;
    }
    let lower = message.to_lowercase();
    BREAKING_MARKERS.iter().any(|m| lower.contains(m))
}

/// Lower-cased subject with collapsed whitespace and no trailing period.
/// Two commits are grouped together only when these are equal.
pub fn normalized_subject(subject: &str) -> String {
    let collapsed = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('.').to_lowercase()
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Result of scoring one commit message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAssessment {
    pub category: QualityCategory,
    pub clarity: ClarityScore,
    pub breaking: bool,
    pub rationale: String,
}

impl MessageAssessment {
    /// Empty messages always need code context, whatever their category.
    pub fn needs_code_context(&self) -> bool {
        self.category == QualityCategory::Poor
    }
}

/// Scores the commit message and classifies it.
pub fn assess_message(commit: &CommitRecord) -> MessageAssessment {
    let message = commit.message.trim();
    if message.is_empty() {
        return MessageAssessment {
            category: QualityCategory::Poor,
            clarity: ClarityScore::zero(),
            breaking: false,
            rationale: "empty commit message".into(),
        };
    }

    let subject = commit.subject();
    let header = parse_conventional(subject);
    let description = header
        .as_ref()
        .map(|h| h.description.as_str())
        .unwrap_or(subject);
    let breaking = is_breaking(message);

    let mut score = 0.0;
    let mut reasons = Vec::new();

    let words = description.split_whitespace().count();
    if words >= 3 {
        score += 0.2;
    } else {
        reasons.push("fewer than three words");
    }

    let length = description.chars().count();
    if (10..=100).contains(&length) {
        score += 0.2;
    } else if length > 100 {
        score += 0.1;
        reasons.push("overlong subject");
    } else {
        reasons.push("short subject");
    }

    if header.is_some() {
        score += 0.25;
        reasons.push("conventional prefix");
    } else if starts_with_imperative(description) {
        score += 0.25;
        reasons.push("imperative verb");
    }

    if has_ticket_reference(message) {
        score += 0.15;
        reasons.push("ticket reference");
    }

    if !commit.body().is_empty() {
        score += 0.2;
        reasons.push("has body");
    }

    let clarity = ClarityScore::clamped(score);

    if is_vague(description) {
        return MessageAssessment {
            category: QualityCategory::Poor,
            clarity: ClarityScore::clamped(score.min(0.1)),
            breaking,
            rationale: format!("vague subject \"{subject}\""),
        };
    }

    let category = if is_trivial(subject, header.as_ref()) {
        reasons.push("trivial change");
        QualityCategory::Trivial
    } else if clarity.as_f64() < POOR_THRESHOLD {
        QualityCategory::Poor
    } else {
        QualityCategory::Adequate
    };

    MessageAssessment {
        category,
        clarity,
        breaking,
        rationale: format!("score {clarity}: {}", reasons.join("; ")),
    }
}

fn starts_with_imperative(description: &str) -> bool {
    description
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .is_some_and(|w| IMPERATIVE_VERBS.contains(&w.as_str()))
}

fn is_vague(description: &str) -> bool {
    let normalized = normalized_subject(description);
    let stripped = normalized.trim_matches(|c: char| !c.is_alphanumeric());
    stripped.is_empty() || VAGUE_SUBJECTS.contains(&stripped)
}

fn is_trivial(subject: &str, header: Option<&ConventionalHeader>) -> bool {
    if header.is_some_and(|h| TRIVIAL_KINDS.contains(&h.kind.as_str())) {
        return true;
    }
    let lower = subject.to_lowercase();
    MERGE_PREFIXES.iter().any(|p| lower.starts_with(p))
        || TRIVIAL_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use pipeline::{CommitSha, Timestamp};

    use super::*;

    fn commit(message: &str) -> CommitRecord {
        CommitRecord {
            sha: CommitSha::new("abc123").unwrap(),
            author: "dev".into(),
            timestamp: Timestamp::now(),
            message: message.into(),
            files_changed: vec![],
        }
    }

    #[test]
    fn conventional_header_is_parsed_with_scope_and_bang() {
        let header = parse_conventional("feat(api)!: drop v1 endpoints").unwrap();
        assert_eq!(header.kind, "feat");
        assert_eq!(header.scope.as_deref(), Some("api"));
        assert!(header.breaking);
        assert_eq!(header.description, "drop v1 endpoints");
        assert!(parse_conventional("Add parser for nested blocks").is_none());
    }

    #[test]
    fn descriptive_messages_are_adequate() {
        let a = assess_message(&commit("fix: handle empty input in tokenizer"));
        assert_eq!(a.category, QualityCategory::Adequate);
        assert!(!a.needs_code_context());

        let b = assess_message(&commit("Add parser for nested blocks\n\nCloses #12"));
        assert_eq!(b.category, QualityCategory::Adequate);
        assert!(b.clarity.as_f64() > 0.8);
    }

    #[test]
    fn empty_and_vague_messages_are_poor() {
        let empty = assess_message(&commit("   "));
        assert_eq!(empty.category, QualityCategory::Poor);
        assert!(empty.needs_code_context());

        for message in ["wip", "Update", "fix.", "misc"] {
            let a = assess_message(&commit(message));
            assert_eq!(a.category, QualityCategory::Poor, "{message}");
            assert!(a.needs_code_context());
        }
    }

    #[test]
    fn short_unstructured_messages_fall_below_the_threshold() {
        let a = assess_message(&commit("tweaked things"));
        assert!(a.clarity.as_f64() < POOR_THRESHOLD);
        assert_eq!(a.category, QualityCategory::Poor);
    }

    #[test]
    fn routine_changes_are_trivial() {
        for message in [
            "style: reorder imports",
            "Fix typo in README",
            "Merge branch 'main' into feature/x",
            "ci: cache cargo registry",
        ] {
            let a = assess_message(&commit(message));
            assert_eq!(a.category, QualityCategory::Trivial, "{message}");
            assert!(!a.needs_code_context());
        }
    }

    #[test]
    fn breaking_markers_are_detected() {
        assert!(is_breaking("refactor!: rename config keys"));
        assert!(is_breaking("Rework storage\n\nBREAKING CHANGE: format changed"));
        assert!(is_breaking("Switch driver (migration required)"));
        assert!(!is_breaking("feat: add flag"));
    }

    #[test]
    fn ticket_references_are_recognised() {
        assert!(has_ticket_reference("Fix crash (#42)"));
        assert!(has_ticket_reference("PROJ-1234 add retry"));
        assert!(!has_ticket_reference("Support C# bindings"));
    }

    #[test]
    fn normalized_subjects_ignore_case_spacing_and_final_period() {
        assert_eq!(
            normalized_subject("  Bump   Dependencies."),
            normalized_subject("bump dependencies")
        );
    }
}
