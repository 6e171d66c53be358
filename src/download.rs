//! Download orchestration: resolve a work's episodes, fetch and convert each in order, and write
//! the accumulated Aozora Bunko text.

use crate::aozora::{convert, format_chapter};
use crate::model::Episode;
use crate::scraper::{find_body, Fetch, ResolveEpisodes, ScraperError};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::{Path, PathBuf};

/// Kakuyomu shows dates in JST.
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Per-run settings passed down from the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Resolve and fetch, but write nothing.
    pub dry_run: bool,
    /// Skip episodes published before this date. Episodes without a known date are kept.
    pub updated_since: Option<NaiveDate>,
}

/// One work to download and the file it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub output: PathBuf,
}

/// Result of downloading one work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub chapters: usize,
    pub text: String,
}

/// Resolve the episode list and convert every episode, in list order, into one text.
///
/// An empty episode list is an error and nothing is fetched. The first fetch error aborts the
/// download and the partial text is dropped.
pub fn download_novel(
    toc_url: &str,
    resolver: &mut dyn ResolveEpisodes,
    fetcher: &mut dyn Fetch,
    options: &DownloadOptions,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<Download, ScraperError> {
    let episodes = resolver.resolve(toc_url)?;
    if episodes.is_empty() {
        return Err(ScraperError::NoEpisodes {
            url: toc_url.to_string(),
        });
    }
    let found = episodes.len();
    let episodes = match options.updated_since {
        Some(since) => filter_updated_since(episodes, since),
        None => episodes,
    };
    tracing::info!(url = %toc_url, found, selected = episodes.len(), "downloading episodes");

    let total = episodes.len() as u32;
    if let Some(p) = progress {
        p(0, total);
    }
    let mut text = String::new();
    for (i, episode) in episodes.iter().enumerate() {
        let page = fetcher.fetch(&episode.url)?;
        text.push_str(&render_episode(episode, &page));
        text.push('\n');
        if let Some(p) = progress {
            p(i as u32 + 1, total);
        }
    }
    Ok(Download {
        chapters: episodes.len(),
        text,
    })
}

/// Body extraction, conversion, and chapter formatting for one fetched episode page.
fn render_episode(episode: &Episode, page_html: &str) -> String {
    let fragment = find_body(page_html).unwrap_or_else(|| {
        tracing::warn!(url = %episode.url, "episode body not found; writing an empty chapter");
        String::new()
    });
    format_chapter(&convert(&fragment), &episode.title)
}

/// Download one target and write it, unless this is a dry run.
pub fn run_target(
    target: &Target,
    resolver: &mut dyn ResolveEpisodes,
    fetcher: &mut dyn Fetch,
    options: &DownloadOptions,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<Download, ScraperError> {
    let download = download_novel(&target.url, resolver, fetcher, options, progress)?;
    if options.dry_run {
        tracing::info!(path = %target.output.display(), "dry run; not writing");
    } else {
        save_text(&target.output, &download.text)?;
    }
    Ok(download)
}

/// Write the full text to `path`, replacing any existing file.
pub fn save_text(path: &Path, text: &str) -> Result<(), ScraperError> {
    std::fs::write(path, text).map_err(|e| ScraperError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse an update cutoff given as `YY-MM-DD`, `YYYY-MM-DD`, or `YYYY/MM/DD`.
pub fn parse_update_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%y-%m-%d", "%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Calendar date (JST) of a publication timestamp or plain `YYYY-MM-DD` date.
fn published_on(published_at: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(published_at) {
        let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
        return Some(ts.with_timezone(&jst).date_naive());
    }
    published_at
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn filter_updated_since(episodes: Vec<Episode>, since: NaiveDate) -> Vec<Episode> {
    episodes
        .into_iter()
        .filter(|ep| {
            ep.published_at
                .as_deref()
                .and_then(published_on)
                .map_or(true, |date| date >= since)
        })
        .collect()
}
