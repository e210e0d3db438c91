//! Error types.
//!
//! Only [`ScanError`] aborts a scan. [`MalformedManifest`] and [`QueryError`] are
//! contained where they occur and recorded on the [`ScanResult`](crate::ScanResult).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::ManifestEntry;

/// A manifest that could not be read completely.
///
/// `partial` holds every entry recovered before or around the damage so the
/// scan can continue with it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed manifest{}: {reason}", line_suffix(.line))]
pub struct MalformedManifest {
    pub reason: String,
    /// First line that failed, for line-oriented formats.
    pub line: Option<usize>,
    /// Number of lines or entries that were dropped.
    pub skipped: usize,
    pub partial: Vec<ManifestEntry>,
}

impl MalformedManifest {
    /// The whole document failed to parse; nothing was recovered.
    pub fn syntax(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
            line: None,
            skipped: 1,
            partial: Vec::new(),
        }
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

/// Failures reported by a [`FileSource`](crate::source::FileSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("rate limited by file source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("io error: {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Failures of a single vulnerability database query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by vulnerability database")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Fatal scan errors, carried by the terminal ERROR progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("rate limited while fetching manifests")]
    RateLimited,

    #[error("could not read repository: {0}")]
    Source(String),
}

impl From<SourceError> for ScanError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::RepositoryNotFound(repo) => ScanError::RepositoryNotFound(repo),
            SourceError::RateLimited { .. } => ScanError::RateLimited,
            err @ SourceError::Io { .. } => ScanError::Source(err.to_string()),
        }
    }
}
