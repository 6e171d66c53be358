//! Browser automation used to expand table-of-contents pages that only reveal every episode
//! after clicking through them.

use crate::scraper::error::ScraperError;
use headless_chrome::{protocol::cdp::Runtime::RemoteObjectSubtype, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// An `<a>` element as seen in the live page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Anchor {
    /// Text content of the link.
    pub text: String,
    /// Raw `href` attribute, unresolved.
    pub href: Option<String>,
}

impl Anchor {
    pub fn new(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
        }
    }
}

/// The capabilities the index resolver needs from a browser, one page at a time.
pub trait Browser {
    /// Load `url` and wait for the document to be ready.
    fn navigate(&mut self, url: &str) -> Result<(), ScraperError>;

    /// Text content of the first element matching `selector`, if any.
    fn text_of(&mut self, selector: &str) -> Result<Option<String>, ScraperError>;

    /// Every `<a>` matching `selector`, in document order.
    fn anchors(&mut self, selector: &str) -> Result<Vec<Anchor>, ScraperError>;

    /// Click the first `<button>` whose text contains `label`. Returns false when there is none.
    fn click_button_labeled(&mut self, label: &str) -> Result<bool, ScraperError>;

    /// Let the page settle.
    fn wait(&mut self, delay: Duration);
}

/// Headless Chrome with a single tab, launched on construction.
pub struct ChromeBrowser {
    // Keeps the Chrome process alive for as long as the tab is used.
    _browser: headless_chrome::Browser,
    tab: Arc<Tab>,
}

impl ChromeBrowser {
    pub fn launch(headless: bool, user_agent: Option<&str>) -> Result<Self, ScraperError> {
        tracing::info!(headless, "launching Chrome");
        let options = launch_options(headless)?;
        let browser = headless_chrome::Browser::new(options)
            .map_err(|e| ScraperError::browser("launch Chrome", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ScraperError::browser("open a tab", e))?;
        if let Some(ua) = user_agent {
            tab.set_user_agent(ua, None, None)
                .map_err(|e| ScraperError::browser("set the User-Agent", e))?;
        }
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Evaluate a script that returns a JSON string and decode it.
    fn evaluate_json(&self, action: &str, script: &str) -> Result<Value, ScraperError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| ScraperError::browser(action, e))?;
        if let Some(RemoteObjectSubtype::Error) = result.subtype {
            return Err(ScraperError::browser(
                action,
                result
                    .description
                    .unwrap_or_else(|| "unknown script error".to_string()),
            ));
        }
        match result.value {
            Some(Value::String(s)) => {
                serde_json::from_str(&s).map_err(|e| ScraperError::browser(action, e))
            }
            Some(other) => Ok(other),
            None => Ok(Value::Null),
        }
    }
}

/// Chrome launch settings. The browser sits idle while a whole work is downloaded over HTTP,
/// so the idle timeout has to outlast the longest download, not a single page load.
fn launch_options(headless: bool) -> Result<LaunchOptions<'static>, ScraperError> {
    LaunchOptions::default_builder()
        .headless(headless)
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
        .build()
        .map_err(|e| ScraperError::browser("configure Chrome", e))
}

/// A Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

impl Browser for ChromeBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        tracing::debug!(%url, "navigate");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| ScraperError::browser(format!("navigate to {}", url), e))?;
        Ok(())
    }

    fn text_of(&mut self, selector: &str) -> Result<Option<String>, ScraperError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return JSON.stringify(el ? el.textContent : null); }})()",
            js_string(selector)
        );
        let value = self.evaluate_json("read page text", &script)?;
        Ok(value.as_str().map(String::from))
    }

    fn anchors(&mut self, selector: &str) -> Result<Vec<Anchor>, ScraperError> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(el => ({{ text: el.textContent || '', href: el.getAttribute('href') }})))",
            js_string(selector)
        );
        let value = self.evaluate_json("list links", &script)?;
        serde_json::from_value(value).map_err(|e| ScraperError::browser("list links", e))
    }

    fn click_button_labeled(&mut self, label: &str) -> Result<bool, ScraperError> {
        let script = format!(
            "(() => {{ const b = Array.from(document.querySelectorAll('button')).find(b => (b.textContent || '').includes({})); if (!b) return 'false'; b.click(); return 'true'; }})()",
            js_string(label)
        );
        let value = self.evaluate_json("click a button", &script)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn wait(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}
