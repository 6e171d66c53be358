//! Kakuyomu access: HTTP client, browser automation, table-of-contents resolution, and episode
//! page parsing.

mod client;
mod error;

pub mod apollo;
pub mod browser;
pub mod episode;
pub mod index;

pub use browser::{Anchor, Browser, ChromeBrowser};
pub use client::{
    Fetch, PoliteClient, PoliteClientBuilder, DEFAULT_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use episode::{extract_body, find_body};
pub use error::ScraperError;
pub use index::{IndexResolver, ResolveEpisodes, ResolveOptions, StaticIndexResolver};

use reqwest::Url;

const WORKS_PREFIX: &str = "https://kakuyomu.jp/works/";

/// Check that `url_input` is a Kakuyomu work (table of contents) URL.
pub fn ensure_work_url(url_input: &str) -> Result<String, ScraperError> {
    let url = url_input.trim();
    Url::parse(url).map_err(|e| ScraperError::InvalidUrl {
        input: url_input.to_string(),
        reason: e.to_string(),
    })?;
    if !url.starts_with(WORKS_PREFIX) {
        return Err(ScraperError::InvalidUrl {
            input: url_input.to_string(),
            reason: format!("expected a work URL starting with {}", WORKS_PREFIX),
        });
    }
    if url.contains("/episodes/") {
        return Err(ScraperError::InvalidUrl {
            input: url_input.to_string(),
            reason: "this is an episode URL; use the work's table of contents".to_string(),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}
