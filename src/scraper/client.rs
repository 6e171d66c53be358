//! Blocking HTTP client with a fixed User-Agent and an optional delay between requests.

use crate::scraper::error::ScraperError;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; kakuyomu-dl/0.1; +https://github.com/kakuyomu-dl)";
/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Delay between requests used when none is configured.
pub const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Fetch a page body. Non-2xx responses are errors carrying the status and the URL.
pub trait Fetch {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError>;
}

/// Blocking HTTP client that enforces a delay between requests.
///
/// Clones share the connection pool and cookie jar but track their own delay.
#[derive(Debug, Clone)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Perform a GET request. Sleeps until the configured delay has passed since the last request.
    pub fn get(&mut self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.wait_delay();
        let response = self.inner.get(url).send();
        self.last_request = Some(Instant::now());
        response
    }

    fn wait_delay(&self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

impl Fetch for PoliteClient {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
        tracing::debug!(%url, "GET");
        let response = self.get(url).map_err(|e| ScraperError::Network {
            url: url.to_string(),
            source: e,
        })?;
        check_response(response, url)
    }
}

/// Check response status and read body as UTF-8.
fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
) -> Result<String, ScraperError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: None,
        });
    }
    response
        .text()
        .map_err(|e| ScraperError::BodyRead { source: e })
}

/// Builder for PoliteClient with optional User-Agent, delay, and timeout.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, the crate's identifying default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
        })
    }
}
