//! Core domain for ReleaseScribe.
//!
//! This crate contains every domain record, newtype identifier, shared value
//! type, configuration struct and error type used throughout the release-notes
//! pipeline, plus the port traits that infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `git` and `llm` crates define *how* to
//! supply it, and the `nodes` crate sequences the stages.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`CommitSha`, `GitRef`, `PipelineRunId`, …) |
//! | [`types`] | Value types (`ImpactLevel`, `ChangeCategory`, `Diagnostic`, `Timestamp`, …) |
//! | [`records`] | Records created by the stages (`CommitRecord` … `ReleaseNotesDocument`) |
//! | [`state`] | `PipelineState` and `StateUpdate` |
//! | [`ports`] | `VersionControl` and `LanguageModel` traits and their errors |
//! | [`config`] | `RunConfig`, `RetryConfig` and policy enums |
//! | [`errors`] | Fatal and stage-local error types, `RetryPolicy` |
//! | `fakes` | In-memory port implementations (feature `fakes`) |

pub mod config;
pub mod errors;
#[cfg(any(test, feature = "fakes"))]
pub mod fakes;
pub mod identifiers;
pub mod ports;
pub mod records;
pub mod state;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{GroupingStrategy, PlanningMode, RetryConfig, RunConfig};
pub use errors::{ConfigError, DiffFetchError, ModelInvocationError, ReleaseNotesError, RetryPolicy};
pub use identifiers::{CommitSha, GitRef, ModelId, PipelineRunId};
pub use ports::{
    CommitRange, CompletionRequest, CompletionResponse, CompletionTask, LanguageModel,
    ModelError, TagRef, VcsError, VersionControl,
};
pub use records::{
    AssessmentSource, ChangeEntry, CodeContextRecord, CodeSignal, CommitRecord,
    QualityAssessment, RangeResolution, ReleaseNotesDocument,
};
pub use state::{PipelineState, StateUpdate};
pub use types::{
    ChangeCategory, ClarityScore, Diagnostic, DiagnosticKind, ImpactLevel, QualityCategory,
    StageName, Timestamp,
};
