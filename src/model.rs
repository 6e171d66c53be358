//! Data model for a downloaded novel: episodes in table-of-contents order and list-file targets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One chapter page of a work, as discovered on its table of contents.
///
/// Identity is `url`; two episodes with the same url are the same episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    /// Absolute chapter URL.
    pub url: String,
    /// Publication timestamp or `YYYY-MM-DD` date, when the source exposes one.
    #[serde(rename = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

impl Episode {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_at: None,
        }
    }

    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }
}

/// Drop every episode whose url was already seen, keeping the first occurrence in place.
pub fn dedup_by_url(episodes: Vec<Episode>) -> Vec<Episode> {
    let mut seen = HashSet::with_capacity(episodes.len());
    episodes
        .into_iter()
        .filter(|ep| seen.insert(ep.url.clone()))
        .collect()
}

/// Sort by publication timestamp when every episode has one; otherwise leave discovery order alone.
///
/// Timestamps are ISO-style strings, so lexicographic order is chronological order. The sort is
/// stable, so equal timestamps keep discovery order.
pub fn sort_by_published(episodes: &mut [Episode]) {
    if episodes.iter().all(|ep| ep.published_at.is_some()) {
        episodes.sort_by(|a, b| a.published_at.cmp(&b.published_at));
    }
}

/// One record of a list file: a work to download and where to save it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListEntry {
    pub title: String,
    pub file_name: Option<String>,
    pub url: Option<String>,
    /// Only episodes published on or after this date are downloaded.
    pub update: Option<String>,
}
