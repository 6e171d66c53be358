//! Episode page parsing: locate the chapter body container.

use scraper::{Html, Selector};

/// Class of the element wrapping the chapter text on every episode page.
const BODY_SELECTOR: &str = ".widget-episodeBody";

/// Inner HTML of the episode body container, or None if the page has no such container.
pub fn find_body(html: &str) -> Option<String> {
    let selector = Selector::parse(BODY_SELECTOR).ok()?;
    let doc = Html::parse_document(html);
    let body = doc.select(&selector).next().map(|el| el.inner_html());
    body
}

/// Inner HTML of the episode body container; empty when the container is missing.
pub fn extract_body(html: &str) -> String {
    find_body(html).unwrap_or_default()
}
