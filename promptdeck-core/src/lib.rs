//! PROMPTDECK Core - Shared Data Types
//!
//! Pure data structures with no behavior. The cache crate and any future
//! client crates depend on this. This crate contains ONLY data types and
//! the error taxonomy - no caching logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{ConfigError, DeckError, DeckResult, PersistError, RefreshError};

// ============================================================================
// IDENTITY & TIME TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Convert a timestamp to float epoch seconds (the persisted wire format).
pub fn to_epoch_secs(ts: Timestamp) -> f64 {
    ts.timestamp_micros() as f64 / 1e6
}

/// Convert float epoch seconds back to a timestamp.
///
/// Out-of-range values collapse to the Unix epoch rather than panicking;
/// persisted files are untrusted input.
pub fn from_epoch_secs(secs: f64) -> Timestamp {
    if !secs.is_finite() {
        return DateTime::<Utc>::default();
    }
    DateTime::from_timestamp_micros((secs * 1e6) as i64).unwrap_or_default()
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A pinned, immutable-by-version prompt definition fetched from the hub.
///
/// Identified by `owner/repo:commit_hash`. Once a commit hash exists its
/// content never changes server-side, which is what makes client-side
/// caching safe: a cached commit can only ever be stale relative to the
/// moving `latest` alias, never wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptCommit {
    /// Owner (user or organization) of the prompt.
    pub owner: String,
    /// Prompt repository name.
    pub repo: String,
    /// Content-addressed commit hash of this version.
    pub commit_hash: String,
    /// The prompt manifest (template, model settings, input schema).
    pub manifest: serde_json::Value,
    /// Few-shot examples attached to this commit.
    pub examples: Vec<serde_json::Value>,
}

impl PromptCommit {
    /// The canonical cache key for this commit: `owner/repo:commit_hash`.
    pub fn identifier(&self) -> String {
        format!("{}/{}:{}", self.owner, self.repo, self.commit_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_secs_round_trip() {
        let now = Utc::now();
        let secs = to_epoch_secs(now);
        let back = from_epoch_secs(secs);
        // Round trip is microsecond-precise.
        assert_eq!(now.timestamp_micros(), back.timestamp_micros());
    }

    #[test]
    fn test_from_epoch_secs_rejects_garbage() {
        assert_eq!(from_epoch_secs(f64::NAN), DateTime::<Utc>::default());
        assert_eq!(from_epoch_secs(f64::INFINITY), DateTime::<Utc>::default());
    }

    #[test]
    fn test_prompt_commit_identifier() {
        let commit = PromptCommit {
            owner: "acme".to_string(),
            repo: "summarizer".to_string(),
            commit_hash: "abc123".to_string(),
            manifest: serde_json::json!({"template": "Summarize: {input}"}),
            examples: vec![],
        };
        assert_eq!(commit.identifier(), "acme/summarizer:abc123");
    }

    #[test]
    fn test_prompt_commit_serde_round_trip() {
        let commit = PromptCommit {
            owner: "acme".to_string(),
            repo: "summarizer".to_string(),
            commit_hash: "abc123".to_string(),
            manifest: serde_json::json!({"template": "hi", "model": "gpt-4o"}),
            examples: vec![serde_json::json!({"input": "a", "output": "b"})],
        };
        let json = serde_json::to_string(&commit).unwrap();
        let back: PromptCommit = serde_json::from_str(&json).unwrap();
        assert_eq!(commit, back);
    }
}
