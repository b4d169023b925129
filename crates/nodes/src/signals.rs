//! Unified-diff parsing and code-signal extraction for the Code Context stage.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use pipeline::CodeSignal;
use regex::Regex;

/// One file's slice of a unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePatch {
    /// Post-image path (pre-image for deletions).
    pub path: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Splits a unified diff (as printed by `git show` / `git diff`) into files.
///
/// `---`/`+++` lines are file headers only between `diff --git` and the first
/// `@@`; inside a hunk they are ordinary removed or added lines.
pub fn parse_diff(diff: &str) -> Vec<FilePatch> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut in_hunk = false;
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.push(FilePatch {
                path: header_path(rest),
                ..FilePatch::default()
            });
            in_hunk = false;
            continue;
        }
        let Some(current) = files.last_mut() else {
            continue;
        };
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if !in_hunk {
            if let Some(path) = line.strip_prefix("+++ b/") {
                current.path = path.to_string();
            }
            continue;
        }
        if let Some(added) = line.strip_prefix('+') {
            current.added.push(added.to_string());
        } else if let Some(removed) = line.strip_prefix('-') {
            current.removed.push(removed.to_string());
        }
    }
    files
}

/// `a/src/x.rs b/src/x.rs` → `src/x.rs`
fn header_path(rest: &str) -> String {
    match rest.rsplit_once(" b/") {
        Some((_, b)) => b.to_string(),
        None => rest.trim_start_matches("a/").to_string(),
    }
}

// ---------------------------------------------------------------------------
// Hints
// ---------------------------------------------------------------------------

pub fn language_for(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
    Some(match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "php" => "php",
        "sql" => "sql",
        "sh" | "bash" => "shell",
        "md" | "rst" => "markdown",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "json" => "json",
        _ => return None,
    })
}

const MANIFESTS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "pyproject.toml",
];

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_api_path(lower: &str) -> bool {
    ["api", "controller", "service", "handler", "routes"]
        .iter()
        .any(|k| lower.contains(k))
}

fn is_schema_path(lower: &str) -> bool {
    ["model", "schema", "migration", "entity"]
        .iter()
        .any(|k| lower.contains(k))
        || lower.ends_with(".sql")
}

/// Area hints for one path, e.g. `api`, `schema`, `dependencies`.
pub fn areas_for(path: &str) -> Vec<&'static str> {
    let lower = path.to_lowercase();
    let name = file_name(path);
    let mut areas = Vec::new();
    if is_api_path(&lower) {
        areas.push("api");
    }
    if is_schema_path(&lower) {
        areas.push("schema");
    }
    if lower.contains("migration") {
        areas.push("migration");
    }
    if MANIFESTS.contains(&name) || name.ends_with(".lock") || name == "package-lock.json" {
        areas.push("dependencies");
    }
    if lower.contains("/tests/")
        || lower.starts_with("tests/")
        || lower.contains("_test.")
        || lower.contains(".spec.")
        || file_name(&lower).starts_with("test_")
    {
        areas.push("tests");
    }
    if lower.starts_with("docs/") || lower.ends_with(".md") || lower.ends_with(".rst") {
        areas.push("docs");
    }
    if lower.starts_with(".github/") || lower.contains(".gitlab-ci") || name == "Jenkinsfile" {
        areas.push("ci");
    }
    areas
}

/// Sorted, de-duplicated language and area hints across `paths`.
pub fn hints(paths: &[String]) -> (Vec<String>, Vec<String>) {
    let languages: BTreeSet<_> = paths.iter().filter_map(|p| language_for(p)).collect();
    let areas: BTreeSet<_> = paths.iter().flat_map(|p| areas_for(p)).collect();
    (
        languages.into_iter().map(String::from).collect(),
        areas.into_iter().map(String::from).collect(),
    )
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

static PY_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)\s*\(|^\s*class\s+(\w+)").expect("Invalid python regex")
});
static JS_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+(\w+)|^\s*(?:export\s+)?(?:const|let)\s+(\w+)\s*=|^\s*(?:export\s+)?class\s+(\w+)",
    )
    .expect("Invalid javascript regex")
});
static JAVA_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:public|private|protected)\s+[\w<>\[\],\s]*?(\w+)\s*\(")
        .expect("Invalid java regex")
});
static GO_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(").expect("Invalid go regex")
});
static RUST_API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*pub(?:\([^)]*\))?\s+(?:async\s+)?(?:fn|struct|enum|trait)\s+(\w+)")
        .expect("Invalid rust regex")
});

static CARGO_DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([A-Za-z0-9_-]+)\s*=\s*(?:\{[^}]*?version\s*=\s*)?"([^"]+)""#)
        .expect("Invalid Cargo.toml regex")
});
static NPM_DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*"([^"]+)"\s*:\s*"([\^~>=<]*\d[^"]*)""#).expect("Invalid package.json regex")
});
static PIP_DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-\[\]]+)\s*[=~><!]=\s*([^\s;#]+)")
        .expect("Invalid requirements.txt regex")
});
static GO_DEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:require\s+)?([\w.\-]+(?:/[\w.\-]+)+)\s+(v[\w.\-+]+)")
        .expect("Invalid go.mod regex")
});

/// Cargo.toml keys that look like `name = "value"` but are not dependencies.
const CARGO_METADATA_KEYS: &[&str] = &[
    "name", "version", "edition", "description", "license", "repository", "authors",
    "rust-version", "resolver", "homepage", "documentation", "readme", "path", "git", "branch",
    "tag", "rev",
];

fn api_pattern(path: &str) -> Option<&'static Regex> {
    let lang = language_for(path)?;
    Some(match lang {
        "python" => &*PY_API_RE,
        "javascript" | "typescript" => &*JS_API_RE,
        "java" | "kotlin" => &*JAVA_API_RE,
        "go" => &*GO_API_RE,
        "rust" => &*RUST_API_RE,
        _ => return None,
    })
}

fn signatures(re: &Regex, lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| re.is_match(l))
        .map(|l| l.trim().to_string())
        .collect()
}

fn api_signal(patch: &FilePatch) -> Option<CodeSignal> {
    if !is_api_path(&patch.path.to_lowercase()) {
        return None;
    }
    let re = api_pattern(&patch.path)?;
    let removed = signatures(re, &patch.removed);
    let added = signatures(re, &patch.added);
    if removed.is_empty() && added.is_empty() {
        return None;
    }
    Some(CodeSignal::ApiChange {
        path: patch.path.clone(),
        breaking: !removed.is_empty(),
        removed,
        added,
    })
}

fn dependency_signals(patch: &FilePatch) -> Vec<CodeSignal> {
    let name = file_name(&patch.path);
    let re: &Regex = match name {
        "Cargo.toml" => &*CARGO_DEP_RE,
        "package.json" => &*NPM_DEP_RE,
        "requirements.txt" => &*PIP_DEP_RE,
        "go.mod" => &*GO_DEP_RE,
        _ => return Vec::new(),
    };
    patch
        .added
        .iter()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .filter(|(dep, _)| name != "Cargo.toml" || !CARGO_METADATA_KEYS.contains(dep))
        .map(|(dep, version)| CodeSignal::DependencyUpdate {
            manifest: patch.path.clone(),
            name: dep.to_string(),
            version: version.to_string(),
        })
        .collect()
}

fn schema_signal(patch: &FilePatch) -> Option<CodeSignal> {
    let lower = patch.path.to_lowercase();
    if !is_schema_path(&lower) || (patch.added.is_empty() && patch.removed.is_empty()) {
        return None;
    }
    let destructive = patch
        .added
        .iter()
        .chain(&patch.removed)
        .map(|l| l.to_lowercase())
        .any(|l| ["drop", "delete", "remove"].iter().any(|k| l.contains(k)));
    let entity = file_name(&patch.path)
        .split('.')
        .next()
        .unwrap_or(&patch.path)
        .to_string();
    Some(CodeSignal::SchemaChange {
        entity,
        migration_required: lower.contains("migration"),
        backward_compatible: !destructive,
    })
}

/// All signals found in a parsed diff, in file order.
pub fn extract_signals(files: &[FilePatch]) -> Vec<CodeSignal> {
    let mut signals = Vec::new();
    for patch in files {
        signals.extend(api_signal(patch));
        signals.extend(dependency_signals(patch));
        signals.extend(schema_signal(patch));
    }
    signals
}

/// Cuts `diff` to at most `limit` characters on a line boundary. A single
/// first line longer than the limit is cut mid-line. Returns the excerpt and
/// whether anything was dropped.
pub fn excerpt(diff: &str, limit: usize) -> (String, bool) {
    if diff.chars().count() <= limit {
        return (diff.to_string(), false);
    }
    let mut out = String::new();
    let mut used = 0;
    for line in diff.split_inclusive('\n') {
        let len = line.chars().count();
        if used + len > limit {
            break;
        }
        out.push_str(line);
        used += len;
    }
    if out.is_empty() {
        out = diff.chars().take(limit).collect();
    }
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "\
diff --git a/src/api/users.py b/src/api/users.py
index 1..2 100644
--- a/src/api/users.py
+++ b/src/api/users.py
@@ -1,3 +1,3 @@
-def get_user(id):
+def fetch_user(user_id):
     pass
diff --git a/requirements.txt b/requirements.txt
--- a/requirements.txt
+++ b/requirements.txt
@@ -1 +1,2 @@
 flask==2.0.0
+requests==2.31.0
diff --git a/db/migrations/0003_drop_legacy.sql b/db/migrations/0003_drop_legacy.sql
new file mode 100644
--- /dev/null
+++ b/db/migrations/0003_drop_legacy.sql
@@ -0,0 +1 @@
+DROP TABLE legacy_users;
";

    #[test]
    fn parse_diff_splits_files_and_collects_changed_lines() {
        let files = parse_diff(DIFF);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, "src/api/users.py");
        assert_eq!(files[0].removed, vec!["def get_user(id):"]);
        assert_eq!(files[0].added, vec!["def fetch_user(user_id):"]);
        assert_eq!(files[1].added, vec!["requests==2.31.0"]);
        assert_eq!(files[2].path, "db/migrations/0003_drop_legacy.sql");
    }

    #[test]
    fn header_lookalikes_inside_a_hunk_are_content() {
        let diff = "\
diff --git a/db/m.sql b/db/m.sql
--- a/db/m.sql
+++ b/db/m.sql
@@ -1,2 +1,2 @@
--- legacy column
+++ b/other.rs
 CREATE TABLE t (id INT);
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1 +1 @@
-old
+new
";
        let files = parse_diff(diff);

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "db/m.sql");
        assert_eq!(files[0].removed, vec!["-- legacy column"]);
        assert_eq!(files[0].added, vec!["++ b/other.rs"]);
        assert_eq!(files[1].path, "src/lib.rs");
        assert_eq!(files[1].removed, vec!["old"]);
    }

    #[test]
    fn signals_cover_api_dependency_and_schema_changes() {
        let signals = extract_signals(&parse_diff(DIFF));

        assert!(signals.contains(&CodeSignal::ApiChange {
            path: "src/api/users.py".into(),
            removed: vec!["def get_user(id):".into()],
            added: vec!["def fetch_user(user_id):".into()],
            breaking: true,
        }));
        assert!(signals.contains(&CodeSignal::DependencyUpdate {
            manifest: "requirements.txt".into(),
            name: "requests".into(),
            version: "2.31.0".into(),
        }));
        assert!(signals.contains(&CodeSignal::SchemaChange {
            entity: "0003_drop_legacy".into(),
            migration_required: true,
            backward_compatible: false,
        }));
    }

    #[test]
    fn cargo_metadata_lines_are_not_dependencies() {
        let patch = FilePatch {
            path: "Cargo.toml".into(),
            added: vec![
                r#"version = "0.2.0""#.into(),
                r#"serde = { version = "1.0", features = ["derive"] }"#.into(),
                r#"regex = "1""#.into(),
            ],
            removed: vec![],
        };
        let names: Vec<_> = dependency_signals(&patch)
            .into_iter()
            .filter_map(|s| match s {
                CodeSignal::DependencyUpdate { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["serde", "regex"]);
    }

    #[test]
    fn non_api_paths_produce_no_api_signal() {
        let patch = FilePatch {
            path: "src/util/strings.py".into(),
            added: vec!["def pad(s):".into()],
            removed: vec![],
        };
        assert!(api_signal(&patch).is_none());
    }

    #[test]
    fn hints_are_sorted_and_deduplicated() {
        let (languages, areas) = hints(&[
            "src/api/users.py".to_string(),
            "src/api/groups.py".to_string(),
            "docs/guide.md".to_string(),
        ]);
        assert_eq!(languages, vec!["markdown", "python"]);
        assert_eq!(areas, vec!["api", "docs"]);
    }

    #[test]
    fn excerpt_cuts_on_line_boundaries() {
        let diff = "aaaa\nbbbb\ncccc\n";
        assert_eq!(excerpt(diff, 100), (diff.to_string(), false));
        assert_eq!(excerpt(diff, 12), ("aaaa\nbbbb\n".to_string(), true));
        assert_eq!(excerpt("abcdefgh", 3), ("abc".to_string(), true));
    }
}
