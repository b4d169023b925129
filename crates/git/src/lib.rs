//! ReleaseScribe version-control adapter.
//!
//! Implements [`pipeline::VersionControl`] by shelling out to the `git`
//! executable. Every call runs `git -C <repo>` in a child process, so the
//! adapter needs no native bindings and sees exactly what a user would see on
//! the command line.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Output
//! formats, error classification and process handling live here; the
//! [`pipeline`] crate sees only [`pipeline::VersionControl`] and
//! [`pipeline::VcsError`].

mod repository;

pub use repository::{project_name_from_path, GitRepository};
