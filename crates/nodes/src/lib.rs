//! ReleaseScribe pipeline stages and the `PipelineExecutor`.
//!
//! This crate provides the five stage implementations (Discovery through
//! Render), the bounded worker pool and retry policy they share, and the
//! `PipelineExecutor` that drives the state machine to a document.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between the domain records
//! in the [`pipeline`] crate and the two port traits (version control and
//! language model). Adapters for those ports live in the `git` and `llm`
//! crates; nothing here performs I/O directly.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`discovery`] | Range resolution, tag ordering, commit listing |
//! | [`planning`] | Quality assessment (heuristic and model-assisted) |
//! | [`context`] | Diff fetching and code-context records |
//! | [`analysis`] | Grouping, model analysis, degraded entries |
//! | [`render`] | Validation, aggregation, Markdown output |
//! | [`executor`] | Phase table and the run loop |
//! | [`heuristics`], [`signals`] | Message scoring and diff parsing |
//! | [`control`], [`pool`], [`retry`] | Deadline/cancel, worker pool, backoff |

pub mod analysis;
pub mod context;
pub mod control;
pub mod discovery;
pub mod executor;
pub mod heuristics;
pub mod planning;
pub mod pool;
pub mod render;
pub mod retry;
pub mod signals;

pub use control::{CancellationHandle, Interruption, RunControl};
pub use discovery::RunRequest;
pub use executor::{next_phase, Phase, PipelineExecutor, RunReport, StageSignal};
pub use render::{file_name, to_markdown};
