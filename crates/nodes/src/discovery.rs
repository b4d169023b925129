//! Commit Discovery: resolve the requested range and list its commits.
//!
//! When no lower boundary is given the range is derived from release tags
//! (newest tag by version order, see [`resolve_range`]). Any failure here is
//! a [`ReleaseNotesError::RepositoryAccess`] and ends the run.

use std::cmp::Ordering;

use pipeline::{
    CommitRange, CommitSha, GitRef, RangeResolution, ReleaseNotesError, StateUpdate, TagRef,
    VcsError, VersionControl,
};
use tracing::{debug, info};

/// Caller-supplied range boundaries for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub since: Option<GitRef>,
    pub until: GitRef,
    /// Overrides the version label derived from tags.
    pub release_version: Option<String>,
}

impl RunRequest {
    pub fn head() -> Self {
        Self {
            since: None,
            until: GitRef::head(),
            release_version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutput {
    pub range: RangeResolution,
    /// Discovered hashes, oldest first.
    pub discovered: Vec<CommitSha>,
    pub update: StateUpdate,
}

fn access_error(target: impl Into<String>) -> impl FnOnce(VcsError) -> ReleaseNotesError {
    let target = target.into();
    move |source| ReleaseNotesError::RepositoryAccess { target, source }
}

/// Runs discovery against `vcs`.
#[tracing::instrument(skip(vcs), fields(stage = "discovery"))]
pub async fn discover(
    vcs: &dyn VersionControl,
    request: &RunRequest,
) -> Result<DiscoveryOutput, ReleaseNotesError> {
    let range = resolve_range(vcs, request).await?;
    let commit_range = CommitRange::new(range.since.clone(), range.until.clone());
    let commits = vcs
        .list_commits(&commit_range)
        .await
        .map_err(access_error(commit_range.rev_spec()))?;

    info!(
        range = %commit_range,
        commits = commits.len(),
        description = %range.description,
        "commits discovered"
    );

    Ok(DiscoveryOutput {
        discovered: commits.iter().map(|c| c.sha.clone()).collect(),
        range,
        update: StateUpdate {
            commits,
            ..StateUpdate::default()
        },
    })
}

/// Resolves both boundaries, detecting the lower one from tags if absent.
pub async fn resolve_range(
    vcs: &dyn VersionControl,
    request: &RunRequest,
) -> Result<RangeResolution, ReleaseNotesError> {
    let project = vcs.project_name();
    let until_sha = vcs
        .resolve(&request.until)
        .await
        .map_err(access_error(format!("{project}@{}", request.until)))?;

    let mut tags = vcs.list_tags().await.map_err(access_error(project.clone()))?;
    sort_tags_newest_first(&mut tags);
    let latest = tags.first();
    debug!(tags = tags.len(), latest = ?latest.map(|t| &t.name), "release tags");

    let (since, description) = match &request.since {
        Some(since) => {
            vcs.resolve(since)
                .await
                .map_err(access_error(format!("{project}@{since}")))?;
            (Some(since.clone()), format!("changes since {since}"))
        }
        None => match latest {
            None => (None, "initial release - all commits".to_string()),
            Some(newest) if newest.commit == until_sha => match tags
                .iter()
                .skip(1)
                .find(|t| t.commit != newest.commit)
            {
                Some(previous) => (
                    GitRef::new(previous.name.clone()),
                    format!("changes in last release ({}..{})", previous.name, newest.name),
                ),
                None => (None, format!("initial release up to {}", newest.name)),
            },
            Some(newest) => (
                GitRef::new(newest.name.clone()),
                format!("unreleased changes since {}", newest.name),
            ),
        },
    };

    let version_label = match &request.release_version {
        Some(label) if !label.trim().is_empty() => label.trim().to_string(),
        _ => match latest {
            Some(newest) if newest.commit == until_sha => newest.name.clone(),
            _ => "Unreleased".to_string(),
        },
    };

    Ok(RangeResolution {
        since,
        until: request.until.clone(),
        description,
        version_label,
        latest_tag: latest.map(|t| t.name.clone()),
    })
}

// ---------------------------------------------------------------------------
// Tag ordering
// ---------------------------------------------------------------------------

/// Numeric version parts of a tag name (`v1.2` → `[1, 2, 0]`), or `None` for
/// tags that are not plain dotted versions.
pub fn version_key(tag: &str) -> Option<Vec<u64>> {
    let trimmed = tag.trim().trim_start_matches(['v', 'V']);
    let mut parts = trimmed
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    while parts.len() < 3 {
        parts.push(0);
    }
    Some(parts)
}

/// Newest version first; non-version tags last, ordered by name.
pub fn sort_tags_newest_first(tags: &mut [TagRef]) {
    tags.sort_by(|a, b| match (version_key(&a.name), version_key(&b.name)) {
        (Some(ka), Some(kb)) => kb.cmp(&ka).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}

#[cfg(test)]
mod tests {
    use pipeline::fakes::MemoryRepository;
    use pipeline::{CommitRecord, Timestamp};

    use super::*;

    fn commit(sha: &str) -> CommitRecord {
        CommitRecord {
            sha: CommitSha::new(sha).unwrap(),
            author: "dev".into(),
            timestamp: Timestamp::now(),
            message: format!("Change {sha}"),
            files_changed: vec![],
        }
    }

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    fn repo() -> MemoryRepository {
        ["c1", "c2", "c3", "c4"]
            .into_iter()
            .fold(MemoryRepository::new("demo"), |r, s| r.with_commit(commit(s)))
    }

    #[test]
    fn tags_sort_by_numeric_version_then_non_versions() {
        let mut tags: Vec<TagRef> = ["v1.9.0", "nightly", "v1.10.0", "1.2", "v2"]
            .into_iter()
            .map(|n| TagRef {
                name: n.into(),
                commit: sha("c1"),
            })
            .collect();
        sort_tags_newest_first(&mut tags);
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["v2", "v1.10.0", "v1.9.0", "1.2", "nightly"]);
    }

    #[test]
    fn version_key_pads_and_rejects_suffixes() {
        assert_eq!(version_key("v1.2"), Some(vec![1, 2, 0]));
        assert_eq!(version_key("1.2.3.4"), Some(vec![1, 2, 3, 4]));
        assert_eq!(version_key("v1.0.0-rc1"), None);
    }

    #[tokio::test]
    async fn no_tags_means_all_history() {
        let range = resolve_range(&repo(), &RunRequest::head()).await.unwrap();
        assert_eq!(range.since, None);
        assert_eq!(range.version_label, "Unreleased");
        assert!(range.description.contains("initial release"));
    }

    #[tokio::test]
    async fn head_past_newest_tag_covers_unreleased_changes() {
        let repo = repo().with_tag("v1.0.0", &sha("c2"));
        let range = resolve_range(&repo, &RunRequest::head()).await.unwrap();
        assert_eq!(range.since, GitRef::new("v1.0.0"));
        assert_eq!(range.version_label, "Unreleased");
        assert_eq!(range.latest_tag.as_deref(), Some("v1.0.0"));
    }

    #[tokio::test]
    async fn head_on_newest_tag_covers_the_last_release() {
        let repo = repo()
            .with_tag("v1.0.0", &sha("c1"))
            .with_tag("v1.1.0", &sha("c4"));
        let range = resolve_range(&repo, &RunRequest::head()).await.unwrap();
        assert_eq!(range.since, GitRef::new("v1.0.0"));
        assert_eq!(range.version_label, "v1.1.0");
        assert!(range.description.contains("last release"));
    }

    #[tokio::test]
    async fn retagged_release_reaches_back_to_the_previous_commit() {
        let repo = repo()
            .with_tag("v1.0.0", &sha("c1"))
            .with_tag("1.1.0", &sha("c4"))
            .with_tag("v1.1.0", &sha("c4"));
        let output = discover(&repo, &RunRequest::head()).await.unwrap();
        assert_eq!(output.range.since, GitRef::new("v1.0.0"));
        assert_eq!(output.discovered.len(), 3);

        let only_aliases = self::repo()
            .with_tag("1.1.0", &sha("c4"))
            .with_tag("v1.1.0", &sha("c4"));
        let range = resolve_range(&only_aliases, &RunRequest::head()).await.unwrap();
        assert_eq!(range.since, None);
        assert!(range.description.contains("initial release"));
    }

    #[tokio::test]
    async fn explicit_release_version_wins() {
        let request = RunRequest {
            release_version: Some("2.0.0".into()),
            ..RunRequest::head()
        };
        let range = resolve_range(&repo().with_tag("v1.0.0", &sha("c4")), &request)
            .await
            .unwrap();
        assert_eq!(range.version_label, "2.0.0");
    }

    #[tokio::test]
    async fn discovery_lists_commits_oldest_first() {
        let repo = repo().with_tag("v1.0.0", &sha("c2"));
        let output = discover(&repo, &RunRequest::head()).await.unwrap();
        let shas: Vec<_> = output.discovered.iter().map(|s| s.as_str()).collect();
        assert_eq!(shas, vec!["c3", "c4"]);
        assert_eq!(output.update.commits.len(), 2);
    }

    #[tokio::test]
    async fn unknown_boundary_is_a_repository_access_error() {
        let request = RunRequest {
            since: GitRef::new("no-such-tag"),
            ..RunRequest::head()
        };
        let err = discover(&repo(), &request).await.unwrap_err();
        assert!(matches!(err, ReleaseNotesError::RepositoryAccess { .. }));
    }

    #[tokio::test]
    async fn missing_repository_fails_before_listing() {
        let repo = MemoryRepository::missing("/nowhere");
        let err = discover(&repo, &RunRequest::head()).await.unwrap_err();
        assert!(matches!(err, ReleaseNotesError::RepositoryAccess { .. }));
        assert_eq!(repo.list_calls(), 0);
    }
}
