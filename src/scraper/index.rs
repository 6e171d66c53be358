//! Table-of-contents resolution: turn a work URL into its ordered, deduplicated episode list.
//!
//! The embedded Apollo state is tried first. When it yields nothing, the page is driven like a
//! reader would: every range tab is opened, "つづきを表示" is clicked until it disappears, and
//! the episode links left on the page are collected.

use crate::model::{dedup_by_url, sort_by_published, Episode};
use crate::scraper::apollo::{episodes_from_next_data, next_data_from_html};
use crate::scraper::browser::{Anchor, Browser};
use crate::scraper::client::Fetch;
use crate::scraper::error::ScraperError;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

pub const KAKUYOMU_BASE: &str = "https://kakuyomu.jp";

const NEXT_DATA_SELECTOR: &str = "#__NEXT_DATA__";
const EPISODE_LINK_SELECTOR: &str = "a[href*='/episodes/']";
const LOAD_MORE_LABEL: &str = "つづきを表示";

const DEFAULT_LOAD_MORE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_LOAD_MORE_CLICKS: u32 = 200;

// Range tab labels such as "1〜30".
static SHARD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+〜\d+").expect("SHARD_LABEL: hardcoded regex is valid"));

static LISTED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[年/-](\d{1,2})[月/-](\d{1,2})")
        .expect("LISTED_DATE: hardcoded regex is valid")
});

/// Anything that can produce the episode list of a work.
pub trait ResolveEpisodes {
    /// Ordered, deduplicated episodes. An empty list means nothing could be found.
    fn resolve(&mut self, toc_url: &str) -> Result<Vec<Episode>, ScraperError>;
}

/// Tuning for the "load more" loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Pause after each click so revealed rows can render.
    pub load_more_delay: Duration,
    /// Upper bound on clicks per page, in case the button never goes away.
    pub max_load_more_clicks: u32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            load_more_delay: Duration::from_millis(DEFAULT_LOAD_MORE_DELAY_MS),
            max_load_more_clicks: DEFAULT_MAX_LOAD_MORE_CLICKS,
        }
    }
}

/// Resolver driving a live browser: Apollo state first, then range tabs and "load more".
pub struct IndexResolver<B: Browser> {
    browser: B,
    options: ResolveOptions,
}

impl<B: Browser> IndexResolver<B> {
    pub fn new(browser: B, options: ResolveOptions) -> Self {
        Self { browser, options }
    }

    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Navigate to the table of contents and read episodes from its Apollo state.
    fn from_state(&mut self, toc_url: &str) -> Result<Vec<Episode>, ScraperError> {
        self.browser.navigate(toc_url)?;
        match self.browser.text_of(NEXT_DATA_SELECTOR) {
            Ok(Some(json)) => Ok(episodes_from_next_data(&json, toc_url)),
            Ok(None) => {
                tracing::debug!(url = %toc_url, "no __NEXT_DATA__ on page");
                Ok(Vec::new())
            }
            Err(e) => {
                tracing::debug!(url = %toc_url, error = %e, "could not read __NEXT_DATA__");
                Ok(Vec::new())
            }
        }
    }

    /// Walk every range tab of the current page, expanding each before collecting its links.
    fn from_pages(&mut self, toc_url: &str) -> Result<Vec<Episode>, ScraperError> {
        let tabs = self.browser.anchors("a")?;
        let shards = shard_urls(toc_url, &tabs);
        tracing::debug!(count = shards.len(), "table of contents tabs");

        let mut episodes = Vec::new();
        for shard in &shards {
            self.browser.navigate(shard)?;
            let clicks = self.expand()?;
            let links = self.browser.anchors(EPISODE_LINK_SELECTOR)?;
            tracing::debug!(%shard, clicks, links = links.len(), "collected episode links");
            episodes.extend(episodes_from_anchors(shard, &links));
        }
        Ok(dedup_by_url(episodes))
    }

    /// Click "load more" until it is gone or the click cap is reached. Returns the click count.
    fn expand(&mut self) -> Result<u32, ScraperError> {
        let mut clicks = 0;
        while clicks < self.options.max_load_more_clicks {
            if !self.browser.click_button_labeled(LOAD_MORE_LABEL)? {
                return Ok(clicks);
            }
            clicks += 1;
            self.browser.wait(self.options.load_more_delay);
        }
        tracing::warn!(
            clicks,
            "\"{}\" still present after click limit; episode list may be incomplete",
            LOAD_MORE_LABEL
        );
        Ok(clicks)
    }
}

impl<B: Browser> ResolveEpisodes for IndexResolver<B> {
    fn resolve(&mut self, toc_url: &str) -> Result<Vec<Episode>, ScraperError> {
        let episodes = self.from_state(toc_url)?;
        if !episodes.is_empty() {
            tracing::info!(count = episodes.len(), "episodes from page state");
            return Ok(keep_valid(episodes));
        }
        let episodes = self.from_pages(toc_url)?;
        tracing::info!(count = episodes.len(), "episodes from table of contents pages");
        Ok(keep_valid(episodes))
    }
}

/// Resolver working from fetched HTML only: Apollo state, then episode links in the static page.
pub struct StaticIndexResolver<F: Fetch> {
    fetcher: F,
}

impl<F: Fetch> StaticIndexResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetch> ResolveEpisodes for StaticIndexResolver<F> {
    fn resolve(&mut self, toc_url: &str) -> Result<Vec<Episode>, ScraperError> {
        let html = self.fetcher.fetch(toc_url)?;
        let episodes = next_data_from_html(&html)
            .map(|json| episodes_from_next_data(&json, toc_url))
            .unwrap_or_default();
        if !episodes.is_empty() {
            tracing::info!(count = episodes.len(), "episodes from page state");
            return Ok(keep_valid(episodes));
        }
        let episodes = parse_static_index(&html);
        tracing::info!(count = episodes.len(), "episodes from static links");
        Ok(keep_valid(episodes))
    }
}

/// Resolve `href` against `base`; absolute hrefs come back unchanged.
fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Range tab URLs, starting with the table of contents itself. Duplicates are dropped.
pub fn shard_urls(toc_url: &str, anchors: &[Anchor]) -> Vec<String> {
    let mut urls = vec![toc_url.to_string()];
    for anchor in anchors {
        if !SHARD_LABEL.is_match(&anchor.text) {
            continue;
        }
        let Some(url) = anchor.href.as_deref().and_then(|h| resolve_href(toc_url, h)) else {
            continue;
        };
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Episode links on a page, as (trimmed text, absolute URL). Links without an href are skipped.
pub fn episodes_from_anchors(page_url: &str, anchors: &[Anchor]) -> Vec<Episode> {
    anchors
        .iter()
        .filter_map(|a| {
            let url = resolve_href(page_url, a.href.as_deref()?)?;
            Some(Episode::new(a.text.trim(), url))
        })
        .collect()
}

/// Episode links in a static table-of-contents page, with the date printed next to each link.
/// Sorted by that date when every link has one, otherwise left in page order.
pub fn parse_static_index(html: &str) -> Vec<Episode> {
    let Ok(selector) = Selector::parse(EPISODE_LINK_SELECTOR) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let episodes: Vec<Episode> = doc
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let url = resolve_href(KAKUYOMU_BASE, href)?;
            let title = el.text().collect::<String>().trim().to_string();
            let episode = Episode::new(title, url);
            Some(match listed_date(el) {
                Some(date) => episode.with_published_at(date),
                None => episode,
            })
        })
        .collect();
    let mut episodes = dedup_by_url(episodes);
    sort_by_published(&mut episodes);
    episodes
}

/// `YYYY-MM-DD` from the text of the link's parent element.
fn listed_date(link: ElementRef<'_>) -> Option<String> {
    let parent = link.parent().and_then(ElementRef::wrap)?;
    let text = parent.text().collect::<String>();
    let caps = LISTED_DATE.captures(&text)?;
    Some(format!("{}-{:0>2}-{:0>2}", &caps[1], &caps[2], &caps[3]))
}

/// Keep episodes with a title and an absolute http(s) URL, first occurrence of each URL only.
pub fn keep_valid(episodes: Vec<Episode>) -> Vec<Episode> {
    let valid: Vec<Episode> = episodes
        .into_iter()
        .filter(|ep| !ep.title.trim().is_empty() && is_http_url(&ep.url))
        .collect();
    dedup_by_url(valid)
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
