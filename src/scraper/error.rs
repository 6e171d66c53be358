//! Shared error type for discovery, fetching, and saving.

use std::path::PathBuf;
use thiserror::Error;

/// Error raised anywhere between resolving a table of contents and writing the output file.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "table of contents", "episode 5").
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Browser error while trying to {action}: {reason}")]
    Browser { action: String, reason: String },

    #[error("No episodes found at {url}.")]
    NoEpisodes { url: String },

    #[error("Cannot read list file {path}: {source}")]
    ListFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScraperError {
    pub(crate) fn browser(action: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ScraperError::Browser {
            action: action.into(),
            reason: reason.to_string(),
        }
    }
}
