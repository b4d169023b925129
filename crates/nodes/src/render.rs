//! Render: validate the aggregated state and build the release-notes document.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use pipeline::{
    ChangeCategory, ChangeEntry, CommitSha, ImpactLevel, PipelineState, ReleaseNotesDocument,
    ReleaseNotesError, Timestamp,
};
use tracing::info;

/// Maximum impact across entries; `Low` when there are none.
pub fn overall_impact(entries: &[ChangeEntry]) -> ImpactLevel {
    entries
        .iter()
        .map(|e| e.impact)
        .max()
        .unwrap_or(ImpactLevel::Low)
}

/// Per-category counts with every category present.
pub fn category_counts(entries: &[ChangeEntry]) -> BTreeMap<ChangeCategory, usize> {
    let mut counts: BTreeMap<ChangeCategory, usize> =
        ChangeCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for entry in entries {
        *counts.entry(entry.category).or_insert(0) += 1;
    }
    counts
}

/// Checks that every commit is represented exactly once or skipped.
pub fn validate(state: &PipelineState) -> Result<(), String> {
    let mut owners: HashMap<&CommitSha, usize> = HashMap::new();
    for (index, entry) in state.entries().iter().enumerate() {
        if entry.commits.is_empty() {
            return Err(format!("entry {index} (\"{}\") has no source commits", entry.title));
        }
        for sha in &entry.commits {
            if state.commit(sha).is_none() {
                return Err(format!("entry {index} references unknown commit {sha}"));
            }
            if let Some(previous) = owners.insert(sha, index) {
                return Err(format!("commit {sha} appears in entries {previous} and {index}"));
            }
        }
    }
    let missing = state.unrepresented_commits();
    if !missing.is_empty() {
        let list: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        return Err(format!(
            "{} commit(s) neither represented nor skipped: {}",
            missing.len(),
            list.join(", ")
        ));
    }
    Ok(())
}

/// Builds the document from the final state.
#[tracing::instrument(skip(state), fields(stage = "render"))]
pub fn render(
    state: &PipelineState,
    project_name: &str,
    generated_at: Timestamp,
) -> Result<ReleaseNotesDocument, ReleaseNotesError> {
    if let Err(reason) = validate(state) {
        let diagnostics_dump = serde_json::to_string_pretty(state)
            .unwrap_or_else(|e| format!("{{\"error\": \"state not serialisable: {e}\"}}"));
        return Err(ReleaseNotesError::Render {
            reason,
            diagnostics_dump,
        });
    }

    let entries = state.entries().to_vec();
    let (version, range_description) = match state.range() {
        Some(r) => (r.version_label.clone(), r.description.clone()),
        None => ("Unreleased".to_string(), String::new()),
    };

    let document = ReleaseNotesDocument {
        project_name: project_name.to_string(),
        version,
        range_description,
        generated_at,
        total_changes: entries.len(),
        category_counts: category_counts(&entries),
        overall_impact: overall_impact(&entries),
        breaking_changes: entries.iter().filter(|e| e.breaking).count(),
        degraded_entries: entries.iter().filter(|e| e.degraded).count(),
        incomplete: state.is_incomplete(),
        diagnostics: state.diagnostics().to_vec(),
        entries,
    };
    info!(
        total = document.total_changes,
        impact = %document.overall_impact,
        incomplete = document.incomplete,
        "document rendered"
    );
    Ok(document)
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn category_phrase(category: ChangeCategory, n: usize) -> String {
    if n == 1 {
        match category {
            ChangeCategory::Other => "1 other change".to_string(),
            c => format!("1 {c}"),
        }
    } else {
        format!("{n} {}", category.plural_label())
    }
}

fn summary(doc: &ReleaseNotesDocument) -> String {
    if doc.total_changes == 0 {
        return format!(
            "This release includes no changes. Overall impact: **{}**.",
            doc.overall_impact
        );
    }
    let breakdown: Vec<String> = ChangeCategory::ALL
        .iter()
        .filter(|c| doc.count(**c) > 0)
        .map(|c| category_phrase(*c, doc.count(*c)))
        .collect();
    let mut text = format!(
        "This release includes {} ({}). Overall impact: **{}**.",
        plural(doc.total_changes, "change", "changes"),
        breakdown.join(", "),
        doc.overall_impact
    );
    if doc.breaking_changes > 0 {
        let _ = write!(
            text,
            " It contains {}; review them before upgrading.",
            plural(doc.breaking_changes, "breaking change", "breaking changes")
        );
    }
    if doc.degraded_entries > 0 {
        let _ = write!(
            text,
            " {} could not be analysed and {} summarised from the raw commit message.",
            plural(doc.degraded_entries, "entry", "entries"),
            if doc.degraded_entries == 1 { "is" } else { "are" }
        );
    }
    text
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fixed Markdown rendering of a document.
pub fn to_markdown(doc: &ReleaseNotesDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} Release Notes {}", doc.project_name, doc.version);
    out.push('\n');
    let _ = writeln!(out, "Generated on: {}", doc.generated_at.date_string());
    if !doc.range_description.is_empty() {
        let _ = writeln!(out, "Range: {}", doc.range_description);
    }
    out.push('\n');

    if doc.incomplete {
        let skipped = doc.diagnostics.iter().filter(|d| d.is_skip()).count();
        let _ = writeln!(
            out,
            "> **Incomplete:** the run stopped early; {} not analysed.",
            plural(skipped, "commit was", "commits were")
        );
        out.push('\n');
    }

    out.push_str("## Summary\n\n");
    out.push_str(&summary(doc));
    out.push_str("\n\n");

    if !doc.entries.is_empty() {
        out.push_str("## Changes\n\n");
        for entry in &doc.entries {
            let marker = if entry.breaking { " (breaking)" } else { "" };
            let _ = writeln!(out, "- **{}**{marker}  ", one_line(&entry.title));
            let _ = writeln!(out, "  {}", one_line(&entry.description));
        }
        out.push('\n');
    }

    if !doc.diagnostics.is_empty() {
        out.push_str("## Diagnostics\n\n");
        for diagnostic in &doc.diagnostics {
            let _ = writeln!(out, "- {}", one_line(&diagnostic.to_string()));
        }
        out.push('\n');
    }

    out
}

/// `release-notes-<version-slug>-<YYYY-MM-DD>.md`
pub fn file_name(doc: &ReleaseNotesDocument) -> String {
    let mut slug = String::new();
    for c in doc.version.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "unreleased" } else { slug };
    format!("release-notes-{slug}-{}.md", doc.generated_at.date_string())
}

#[cfg(test)]
mod tests {
    use pipeline::{
        CommitRecord, Diagnostic, DiagnosticKind, GitRef, RangeResolution, StageName,
    };

    use super::*;

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    fn commit(s: &str) -> CommitRecord {
        CommitRecord {
            sha: sha(s),
            author: "dev".into(),
            timestamp: Timestamp::from_unix_seconds(1_700_000_000).unwrap(),
            message: format!("Change {s}"),
            files_changed: vec![],
        }
    }

    fn entry(commits: &[&str], category: ChangeCategory, impact: ImpactLevel) -> ChangeEntry {
        ChangeEntry {
            category,
            title: format!("Title {}", commits.join("+")),
            description: "Something\nchanged.".into(),
            impact,
            breaking: false,
            commits: commits.iter().map(|c| sha(c)).collect(),
            degraded: false,
        }
    }

    fn state_with(commits: &[&str]) -> PipelineState {
        let mut state = PipelineState::new();
        state.set_range(RangeResolution {
            since: None,
            until: GitRef::head(),
            description: "unreleased changes since v1.0.0".into(),
            version_label: "v1.1.0".into(),
            latest_tag: Some("v1.0.0".into()),
        });
        for c in commits {
            state.record_commit(commit(c));
        }
        state
    }

    fn at() -> Timestamp {
        Timestamp::parse_rfc3339("2024-05-06T10:00:00Z").unwrap()
    }

    #[test]
    fn overall_impact_is_the_maximum_or_low_when_empty() {
        assert_eq!(overall_impact(&[]), ImpactLevel::Low);
        let entries = vec![
            entry(&["a"], ChangeCategory::Fix, ImpactLevel::Medium),
            entry(&["b"], ChangeCategory::Chore, ImpactLevel::Low),
        ];
        assert_eq!(overall_impact(&entries), ImpactLevel::Medium);
    }

    #[test]
    fn empty_state_renders_an_empty_low_impact_document() {
        let doc = render(&state_with(&[]), "Demo", at()).unwrap();
        assert_eq!(doc.total_changes, 0);
        assert_eq!(doc.overall_impact, ImpactLevel::Low);
        assert!(doc.entries.is_empty());
        assert!(ChangeCategory::ALL.iter().all(|c| doc.count(*c) == 0));
        assert!(to_markdown(&doc).contains("This release includes no changes."));
    }

    #[test]
    fn counts_and_flags_are_aggregated() {
        let mut state = state_with(&["a", "b", "c"]);
        state.append_change_entry(entry(&["a"], ChangeCategory::Fix, ImpactLevel::Low));
        let mut breaking = entry(&["b"], ChangeCategory::Feature, ImpactLevel::High);
        breaking.breaking = true;
        state.append_change_entry(breaking);
        let mut degraded = entry(&["c"], ChangeCategory::Other, ImpactLevel::Low);
        degraded.degraded = true;
        state.append_change_entry(degraded);

        let doc = render(&state, "Demo", at()).unwrap();

        assert_eq!(doc.total_changes, 3);
        assert_eq!(doc.count(ChangeCategory::Fix), 1);
        assert_eq!(doc.count(ChangeCategory::Feature), 1);
        assert_eq!(doc.count(ChangeCategory::Chore), 0);
        assert_eq!(doc.breaking_changes, 1);
        assert_eq!(doc.degraded_entries, 1);
        assert_eq!(doc.overall_impact, ImpactLevel::High);
        assert_eq!(doc.version, "v1.1.0");
    }

    #[test]
    fn unrepresented_commit_is_a_render_error_with_dump() {
        let mut state = state_with(&["a", "b"]);
        state.append_change_entry(entry(&["a"], ChangeCategory::Fix, ImpactLevel::Low));

        let err = render(&state, "Demo", at()).unwrap_err();
        match err {
            ReleaseNotesError::Render {
                reason,
                diagnostics_dump,
            } => {
                assert!(reason.contains('b'));
                assert!(diagnostics_dump.contains("\"entries\""));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_and_dangling_references_are_rejected() {
        let mut dup = state_with(&["a"]);
        dup.append_change_entry(entry(&["a"], ChangeCategory::Fix, ImpactLevel::Low));
        dup.append_change_entry(entry(&["a"], ChangeCategory::Fix, ImpactLevel::Low));
        assert!(validate(&dup).unwrap_err().contains("appears in entries"));

        let mut dangling = state_with(&["a"]);
        dangling.append_change_entry(entry(
            &["a", "ghost"],
            ChangeCategory::Fix,
            ImpactLevel::Low,
        ));
        assert!(validate(&dangling).unwrap_err().contains("unknown commit"));

        let mut empty = state_with(&[]);
        empty.append_change_entry(entry(&[], ChangeCategory::Fix, ImpactLevel::Low));
        assert!(validate(&empty).unwrap_err().contains("no source commits"));
    }

    #[test]
    fn skipped_commits_satisfy_validation() {
        let mut state = state_with(&["a"]);
        state.record_diagnostic(Diagnostic::for_commit(
            sha("a"),
            StageName::Orchestrator,
            DiagnosticKind::IncompleteTimeout,
            "deadline",
        ));
        state.mark_incomplete();

        let doc = render(&state, "Demo", at()).unwrap();
        assert!(doc.incomplete);
        assert!(to_markdown(&doc)
            .contains("**Incomplete:** the run stopped early; 1 commit was not analysed."));
    }

    #[test]
    fn markdown_layout_is_fixed() {
        let mut state = state_with(&["a", "b"]);
        state.append_change_entry(entry(&["a"], ChangeCategory::Fix, ImpactLevel::Medium));
        state.append_change_entry(entry(&["b"], ChangeCategory::Chore, ImpactLevel::Low));
        let doc = render(&state, "Demo Project", at()).unwrap();

        let expected = concat!(
            "# Demo Project Release Notes v1.1.0\n",
            "\n",
            "Generated on: 2024-05-06\n",
            "Range: unreleased changes since v1.0.0\n",
            "\n",
            "## Summary\n",
            "\n",
            "This release includes 2 changes (1 fix, 1 chore). Overall impact: **medium**.\n",
            "\n",
            "## Changes\n",
            "\n",
            "- **Title a**  \n",
            "  Something changed.\n",
            "- **Title b**  \n",
            "  Something changed.\n",
            "\n",
        );
        assert_eq!(to_markdown(&doc), expected);
    }

    #[test]
    fn file_name_slugs_the_version_and_dates_the_run() {
        let mut doc = render(&state_with(&[]), "Demo", at()).unwrap();
        assert_eq!(file_name(&doc), "release-notes-v1.1.0-2024-05-06.md");
        doc.version = "Release 2 / Beta".into();
        assert_eq!(file_name(&doc), "release-notes-release-2-beta-2024-05-06.md");
    }
}
