//! ReleaseScribe language-model adapter.
//!
//! Implements [`pipeline::LanguageModel`] for Anthropic's Messages API.
//! Additional backends are added as new types in this crate without any
//! changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, status-code
//! classification and JSON extraction from free text live here. Retry and
//! back-off do not: the adapter reports each failure once, tagged with a
//! [`pipeline::RetryPolicy`] through [`pipeline::ModelError`], and the
//! pipeline's retry wrapper decides what to do with it.

mod anthropic;

pub use anthropic::{
    extract_json_object, AnthropicConfig, AnthropicProvider, ProviderConfigError, API_VERSION,
    DEFAULT_BASE_URL, DEFAULT_MODEL,
};
