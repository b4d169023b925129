use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{
    CommitRange, CommitRecord, CommitSha, GitRef, TagRef, Timestamp, VcsError, VersionControl,
};
use tokio::process::Command;
use tracing::{debug, instrument};

const FIELD: char = '\u{1f}';
const RECORD: char = '\u{1e}';

/// `git log` format: a record separator, then sha, author, author date and the
/// raw message, each followed by a field separator. `--name-only` appends the
/// touched paths after the last separator.
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%an%x1f%aI%x1f%B%x1f";

/// `for-each-ref` format: short name, object, and the peeled object for
/// annotated tags (empty for lightweight ones).
const TAG_FORMAT: &str = "--format=%(refname:short)%1f%(objectname)%1f%(*objectname)";

/// A local Git repository accessed through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    /// Points the adapter at `path`. Nothing is checked until the first call;
    /// a missing path surfaces as [`VcsError::NotFound`] from that call.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs one git subcommand and returns its stdout.
    ///
    /// `subject` names what the command is about (a ref or commit) so a
    /// failure can be reported against it.
    async fn git(&self, args: &[&str], subject: &str) -> Result<String, VcsError> {
        if tokio::fs::metadata(&self.path).await.is_err() {
            return Err(VcsError::NotFound {
                reference: self.path.display().to_string(),
            });
        }

        debug!(repo = %self.path.display(), ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VcsError::Command {
                message: format!("failed to run git: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, subject));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    #[instrument(skip(self, range), fields(repo = %self.path.display(), range = %range))]
    async fn list_commits(&self, range: &CommitRange) -> Result<Vec<CommitRecord>, VcsError> {
        let rev_spec = range.rev_spec();
        let stdout = self
            .git(
                &[
                    "log",
                    "--reverse",
                    "--name-only",
                    "--no-color",
                    LOG_FORMAT,
                    &rev_spec,
                    "--",
                ],
                &rev_spec,
            )
            .await?;
        let commits = parse_log(&stdout)?;
        debug!(count = commits.len(), "commits listed");
        Ok(commits)
    }

    #[instrument(skip(self, commit), fields(repo = %self.path.display(), commit = %commit))]
    async fn diff(&self, commit: &CommitSha) -> Result<String, VcsError> {
        // `-m --first-parent` gives merges a diff against their mainline parent.
        self.git(
            &[
                "show",
                "--format=",
                "--patch",
                "--no-color",
                "-m",
                "--first-parent",
                commit.as_str(),
                "--",
            ],
            commit.as_str(),
        )
        .await
    }

    #[instrument(skip(self), fields(repo = %self.path.display()))]
    async fn list_tags(&self) -> Result<Vec<TagRef>, VcsError> {
        let stdout = self
            .git(&["for-each-ref", "refs/tags", TAG_FORMAT], "refs/tags")
            .await?;
        parse_tags(&stdout)
    }

    #[instrument(skip(self, reference), fields(repo = %self.path.display(), reference = %reference))]
    async fn resolve(&self, reference: &GitRef) -> Result<CommitSha, VcsError> {
        let spec = format!("{reference}^{{commit}}");
        let stdout = self
            .git(&["rev-parse", "--verify", &spec], reference.as_str())
            .await?;
        CommitSha::new(stdout.trim()).ok_or_else(|| VcsError::Command {
            message: format!("rev-parse returned no commit for '{reference}'"),
        })
    }

    fn project_name(&self) -> String {
        let resolved = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        project_name_from_path(&resolved)
    }
}

/// Maps git's stderr onto the port's error classes.
fn classify_failure(stderr: &str, subject: &str) -> VcsError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if lower.contains("not a git repository")
        || lower.contains("does not have any commits")
        || lower.contains("permission denied")
        || lower.contains("dubious ownership")
    {
        VcsError::Access { message }
    } else if lower.contains("unknown revision")
        || lower.contains("bad revision")
        || lower.contains("needed a single revision")
        || lower.contains("bad object")
        || lower.contains("invalid object name")
    {
        VcsError::NotFound {
            reference: subject.to_string(),
        }
    } else {
        VcsError::Command { message }
    }
}

fn parse_log(stdout: &str) -> Result<Vec<CommitRecord>, VcsError> {
    stdout
        .split(RECORD)
        .filter(|record| !record.trim().is_empty())
        .map(parse_log_record)
        .collect()
}

fn parse_log_record(record: &str) -> Result<CommitRecord, VcsError> {
    let mut fields = record.splitn(5, FIELD);
    let (Some(sha), Some(author), Some(date), Some(message)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed("log record has too few fields", record));
    };
    let files = fields.next().unwrap_or("");

    let sha = CommitSha::new(sha.trim()).ok_or_else(|| malformed("log record has no sha", record))?;
    let timestamp = Timestamp::parse_rfc3339(date.trim())
        .ok_or_else(|| malformed("log record has an unparseable date", record))?;

    Ok(CommitRecord {
        sha,
        author: author.trim().to_string(),
        timestamp,
        message: message.trim().to_string(),
        files_changed: files
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

fn parse_tags(stdout: &str) -> Result<Vec<TagRef>, VcsError> {
    let mut tags = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.split(FIELD);
        let (Some(name), Some(object)) = (fields.next(), fields.next()) else {
            return Err(malformed("tag line has too few fields", line));
        };
        let peeled = fields.next().map(str::trim).filter(|p| !p.is_empty());
        let Some(commit) = CommitSha::new(peeled.unwrap_or(object).trim()) else {
            return Err(malformed("tag line has no object", line));
        };
        tags.push(TagRef {
            name: name.trim().to_string(),
            commit,
        });
    }
    Ok(tags)
}

fn malformed(what: &str, raw: &str) -> VcsError {
    let preview: String = raw.chars().take(80).collect();
    VcsError::Command {
        message: format!("{what}: {preview:?}"),
    }
}

/// Title-cased project name from a repository directory.
///
/// `release-scribe.git` becomes `Release Scribe`.
pub fn project_name_from_path(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = base.strip_suffix(".git").unwrap_or(&base);

    let words: Vec<String> = base
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();
    if words.is_empty() {
        "Project".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
