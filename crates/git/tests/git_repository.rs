use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

use git::GitRepository;
use pipeline::{CommitRange, CommitSha, GitRef, VcsError, VersionControl};

fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(["-c", "user.name=test-user", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(args)
        .current_dir(repo_dir)
        .env("GIT_AUTHOR_DATE", "2024-04-01T09:00:00Z")
        .env("GIT_COMMITTER_DATE", "2024-04-01T09:00:00Z")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(repo_dir: &Path, file: &str, contents: &str, message: &str) -> String {
    let path = repo_dir.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    run_git(repo_dir, &["add", file]);
    run_git(repo_dir, &["commit", "-q", "-m", message]);
    run_git(repo_dir, &["rev-parse", "HEAD"])
}

/// Three commits: `v1.0.0` (annotated) on the first, `v1.1.0` (lightweight)
/// on the second.
fn make_git_repo() -> (tempfile::TempDir, [String; 3]) {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-q"]);
    let first = commit_file(dir.path(), "README.md", "hello\n", "docs: add readme");
    run_git(dir.path(), &["tag", "-a", "v1.0.0", "-m", "first release"]);
    let second = commit_file(
        dir.path(),
        "src/lib.rs",
        "pub fn answer() -> u32 { 42 }\n",
        "feat: add answer\n\nExposes the answer as a public function.",
    );
    run_git(dir.path(), &["tag", "v1.1.0"]);
    let third = commit_file(dir.path(), "src/lib.rs", "pub fn answer() -> u32 { 43 }\n", "fix: off by one");
    (dir, [first, second, third])
}

fn sha(s: &str) -> CommitSha {
    CommitSha::new(s).unwrap()
}

#[tokio::test]
async fn lists_commits_oldest_first_with_messages_and_files() {
    let (dir, shas) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let commits = repo
        .list_commits(&CommitRange::new(None, GitRef::head()))
        .await
        .unwrap();

    let listed: Vec<_> = commits.iter().map(|c| c.sha.as_str().to_string()).collect();
    assert_eq!(listed, shas.to_vec());
    assert_eq!(commits[0].author, "test-user");
    assert_eq!(commits[0].files_changed, vec!["README.md"]);
    assert_eq!(
        commits[1].message,
        "feat: add answer\n\nExposes the answer as a public function."
    );
    assert_eq!(commits[1].timestamp.date_string(), "2024-04-01");
}

#[tokio::test]
async fn range_excludes_commits_reachable_from_since() {
    let (dir, shas) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let commits = repo
        .list_commits(&CommitRange::new(GitRef::new("v1.0.0"), GitRef::head()))
        .await
        .unwrap();

    let listed: Vec<_> = commits.iter().map(|c| c.sha.as_str().to_string()).collect();
    assert_eq!(listed, shas[1..].to_vec());
}

#[tokio::test]
async fn tags_resolve_to_commits_whether_annotated_or_not() {
    let (dir, shas) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let mut tags = repo.list_tags().await.unwrap();
    tags.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name, "v1.0.0");
    assert_eq!(tags[0].commit, sha(&shas[0]));
    assert_eq!(tags[1].name, "v1.1.0");
    assert_eq!(tags[1].commit, sha(&shas[1]));
}

#[tokio::test]
async fn resolve_peels_annotated_tags() {
    let (dir, shas) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let resolved = repo.resolve(&GitRef::new("v1.0.0").unwrap()).await.unwrap();
    assert_eq!(resolved, sha(&shas[0]));
    let head = repo.resolve(&GitRef::head()).await.unwrap();
    assert_eq!(head, sha(&shas[2]));
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let (dir, _) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let err = repo.resolve(&GitRef::new("v9.9.9").unwrap()).await.unwrap_err();
    assert_eq!(
        err,
        VcsError::NotFound {
            reference: "v9.9.9".into()
        }
    );
}

#[tokio::test]
async fn diff_shows_the_patch_of_one_commit() {
    let (dir, shas) = make_git_repo();
    let repo = GitRepository::open(dir.path());

    let diff = repo.diff(&sha(&shas[2])).await.unwrap();
    assert!(diff.contains("diff --git a/src/lib.rs b/src/lib.rs"));
    assert!(diff.contains("-pub fn answer() -> u32 { 42 }"));
    assert!(diff.contains("+pub fn answer() -> u32 { 43 }"));

    let root = repo.diff(&sha(&shas[0])).await.unwrap();
    assert!(root.contains("+hello"));
}

#[tokio::test]
async fn missing_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let repo = GitRepository::open(&missing);

    let err = repo.resolve(&GitRef::head()).await.unwrap_err();
    assert!(matches!(err, VcsError::NotFound { .. }));
}

#[tokio::test]
async fn plain_directory_is_an_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let repo = GitRepository::open(dir.path());

    let err = repo
        .list_commits(&CommitRange::new(None, GitRef::head()))
        .await
        .unwrap_err();
    assert!(matches!(err, VcsError::Access { .. }), "{err:?}");
}

#[tokio::test]
async fn repository_without_commits_cannot_resolve_head() {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-q"]);
    let repo = GitRepository::open(dir.path());

    assert!(repo.resolve(&GitRef::head()).await.is_err());
}

#[test]
fn project_name_comes_from_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let named = dir.path().join("release-scribe");
    fs::create_dir(&named).unwrap();

    assert_eq!(GitRepository::open(&named).project_name(), "Release Scribe");
}
