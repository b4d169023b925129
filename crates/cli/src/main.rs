//! ReleaseScribe CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: flags, the optional TOML file, and the
//!    credentials in the environment. Anything missing fails fast with exit 1.
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer and
//!    an OpenTelemetry OTLP exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: `GitRepository` and `AnthropicProvider`,
//!    injected into `PipelineExecutor`.
//! 4. **Run once** and write the Markdown document into the output directory.
//!    Ctrl-C cancels the run; the partial document is still written.
//!
//! Exit codes: 0 when a document was written (even an incomplete one), 1 for
//! configuration or credential problems, 2 when the repository or range cannot
//! be resolved, 3 when the collected results cannot be rendered.

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use git::GitRepository;
use llm::{AnthropicConfig, AnthropicProvider, DEFAULT_MODEL};
use nodes::{file_name, to_markdown, CancellationHandle, PipelineExecutor, RunRequest};
use pipeline::{GitRef, LanguageModel, ModelId, PlanningMode, ReleaseNotesError, VersionControl};
use tracing::{error, info, warn};

use crate::config::{load_config, Overrides};
use crate::telemetry::{init_tracing, OTLP_ENDPOINT_ENV};

const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Parser, Debug)]
#[command(name = "release-scribe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate release notes from a Git commit range", long_about = None)]
struct Cli {
    /// Path to the Git repository
    #[arg(long)]
    repo_path: PathBuf,

    /// Directory the Markdown document is written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Model identifier passed to the backend
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Lower bound of the range (exclusive). Defaults to the previous tag.
    #[arg(long)]
    since: Option<String>,

    /// Upper bound of the range (inclusive)
    #[arg(long, default_value = "HEAD")]
    until: String,

    /// Version label for the document title. Defaults to the tag at `--until`.
    #[arg(long)]
    release_version: Option<String>,

    /// Maximum concurrent diff fetches and model calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run deadline in seconds; an expired run renders an incomplete document
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// How commit-message quality is judged
    #[arg(long, value_enum)]
    planning: Option<PlanningArg>,

    /// TOML file with run settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the model API base URL
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlanningArg {
    Heuristic,
    ModelAssisted,
}

impl From<PlanningArg> for PlanningMode {
    fn from(arg: PlanningArg) -> Self {
        match arg {
            PlanningArg::Heuristic => PlanningMode::Heuristic,
            PlanningArg::ModelAssisted => PlanningMode::ModelAssisted,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            concurrency: self.concurrency,
            timeout_secs: self.timeout_secs,
            planning: self.planning.map(PlanningMode::from),
        }
    }

    fn request(&self) -> Result<RunRequest> {
        let Some(until) = GitRef::new(self.until.as_str()) else {
            bail!("--until must not be empty");
        };
        let since = match self.since.as_deref() {
            Some(raw) => match GitRef::new(raw) {
                Some(since) => Some(since),
                None => bail!("--since must not be empty"),
            },
            None => None,
        };
        Ok(RunRequest {
            since,
            until,
            release_version: self
                .release_version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let otlp_endpoint = std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty());
    let telemetry = match init_tracing(cli.verbose, cli.json, otlp_endpoint.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let code = match run(&cli).await {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<ReleaseNotesError>() {
            Some(fatal) => {
                error!(error = %fatal, exit_code = fatal.exit_code(), "run failed");
                if let ReleaseNotesError::Render {
                    diagnostics_dump, ..
                } = fatal
                {
                    eprintln!("{diagnostics_dump}");
                }
                eprintln!("Error: {fatal}");
                ExitCode::from(fatal.exit_code())
            }
            None => {
                eprintln!("Error: {e:#}");
                ExitCode::from(1)
            }
        },
    };

    telemetry.shutdown();
    code
}

/// Builds the executor, runs it, and writes the document. Returns its path.
async fn run(cli: &Cli) -> Result<PathBuf> {
    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{API_KEY_ENV} is not set"))?;
    let config = load_config(cli.config.as_deref(), &cli.overrides())?;
    let request = cli.request()?;
    let Some(model_id) = ModelId::new(cli.model.as_str()) else {
        bail!("--model must not be empty");
    };

    let mut model_config = AnthropicConfig::new(api_key, model_id.as_str());
    if let Some(base_url) = &cli.base_url {
        model_config = model_config.with_base_url(base_url.as_str());
    }
    let model: Arc<dyn LanguageModel> =
        Arc::new(AnthropicProvider::new(model_config).context("failed to set up the model client")?);
    let vcs: Arc<dyn VersionControl> = Arc::new(GitRepository::open(&cli.repo_path));

    info!(
        repo = %cli.repo_path.display(),
        model = %model_id,
        planning = ?config.planning,
        "starting release notes run"
    );

    let cancel = CancellationHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing with partial results");
            on_signal.cancel();
        }
    });

    let executor = PipelineExecutor::new(vcs, model, config);
    let report = executor.run(request, &cancel).await?;

    let path = write_document(&cli.output_dir, &report.document)?;
    info!(
        run_id = %report.run_id,
        path = %path.display(),
        entries = report.document.total_changes,
        degraded = report.document.degraded_entries,
        incomplete = report.document.incomplete,
        "release notes written"
    );
    Ok(path)
}

fn write_document(output_dir: &Path, document: &pipeline::ReleaseNotesDocument) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(file_name(document));
    std::fs::write(&path, to_markdown(document))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repo_path_is_required() {
        assert!(Cli::try_parse_from(["release-scribe"]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["release-scribe", "--repo-path", "/src/demo"]).unwrap();
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert_eq!(cli.model, DEFAULT_MODEL);
        assert_eq!(cli.until, "HEAD");
        assert!(!cli.verbose);

        let request = cli.request().unwrap();
        assert_eq!(request.since, None);
        assert_eq!(request.until, GitRef::head());
        assert_eq!(request.release_version, None);
    }

    #[test]
    fn range_and_overrides_are_parsed() {
        let cli = Cli::try_parse_from([
            "release-scribe",
            "--repo-path",
            "/src/demo",
            "--since",
            "v1.0.0",
            "--until",
            "v1.1.0",
            "--release-version",
            " 1.1.0 ",
            "--concurrency",
            "2",
            "--timeout-secs",
            "30",
            "--planning",
            "model-assisted",
            "-v",
        ])
        .unwrap();

        let request = cli.request().unwrap();
        assert_eq!(request.since, GitRef::new("v1.0.0"));
        assert_eq!(request.until, GitRef::new("v1.1.0").unwrap());
        assert_eq!(request.release_version.as_deref(), Some("1.1.0"));

        let overrides = cli.overrides();
        assert_eq!(overrides.concurrency, Some(2));
        assert_eq!(overrides.timeout_secs, Some(30));
        assert_eq!(overrides.planning, Some(PlanningMode::ModelAssisted));
        assert!(cli.verbose);
    }

    #[test]
    fn blank_range_bounds_are_rejected() {
        for (flag, value) in [("--since", " "), ("--until", "  ")] {
            let cli = Cli::try_parse_from(["release-scribe", "--repo-path", ".", flag, value]).unwrap();
            let err = cli.request().unwrap_err();
            assert!(err.to_string().contains(flag), "{flag}={value:?}: {err}");
        }
    }

    #[test]
    fn unknown_planning_mode_is_rejected() {
        assert!(Cli::try_parse_from([
            "release-scribe",
            "--repo-path",
            ".",
            "--planning",
            "psychic"
        ])
        .is_err());
    }

    #[test]
    fn document_lands_in_the_output_directory() {
        use pipeline::{PipelineState, Timestamp};

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("notes");
        let generated_at = Timestamp::parse_rfc3339("2024-04-01T09:00:00Z").unwrap();
        let document = nodes::render::render(&PipelineState::new(), "Demo", generated_at).unwrap();

        let path = write_document(&out, &document).unwrap();

        assert_eq!(path.parent(), Some(out.as_path()));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Demo Release Notes"));
        assert!(written.contains("Generated on: 2024-04-01"));
    }
}
