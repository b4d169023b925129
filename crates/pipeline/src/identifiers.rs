//! Identifier newtypes for Git names and the per-run id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a non-blank, trimmed string newtype.
macro_rules! text_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// `None` when `value` is blank; surrounding whitespace is dropped.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.len() == value.len() {
                    Some(Self(value))
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

/// Correlates every span and log line of one CLI invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

text_id! {
    /// A Git commit SHA (40-character lowercase hex string in practice).
    ///
    /// Every per-commit map in [`crate::PipelineState`] is keyed by this type.
    CommitSha
}

impl CommitSha {
    /// Returns the abbreviated (8-character) form used in logs and documents.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

text_id! {
    /// Any revision expression Git can resolve: a tag, a branch, `HEAD`, a SHA.
    GitRef
}

impl GitRef {
    pub fn head() -> Self {
        Self("HEAD".to_string())
    }
}

text_id! {
    /// Identifies a language-model backend model (e.g. `"claude-3-5-haiku-latest"`).
    ModelId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_identifiers_are_rejected() {
        assert!(CommitSha::new("").is_none());
        assert!(GitRef::new("   ").is_none());
        assert!(ModelId::new("m").is_some());
    }

    #[test]
    fn surrounding_whitespace_is_dropped() {
        assert_eq!(GitRef::new(" v1.2.0\n").unwrap().as_str(), "v1.2.0");
        assert_eq!(GitRef::new("HEAD"), Some(GitRef::head()));
    }

    #[test]
    fn run_ids_are_unique_hyphenated_uuids() {
        let first = PipelineRunId::generate();
        let second = PipelineRunId::generate();
        assert_ne!(first, second);
        let text = first.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
    }

    #[test]
    fn short_sha_truncates_to_eight_characters() {
        let sha = CommitSha::new("0123456789abcdef0123456789abcdef01234567").unwrap();
        assert_eq!(sha.short(), "01234567");

        let tiny = CommitSha::new("abc").unwrap();
        assert_eq!(tiny.short(), "abc");
    }
}
