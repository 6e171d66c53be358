//! Optional config file loading. Search order: ./kakuyomu-dl.toml, then
//! $XDG_CONFIG_HOME/kakuyomu-dl/config.toml (or ~/.config/kakuyomu-dl/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory output files are written to when --savedir is not set.
    pub save_dir: Option<PathBuf>,
    /// HTTP User-Agent header, also used by the browser.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Pause after each "load more" click, in milliseconds (default 500).
    pub load_more_delay_ms: Option<u64>,
    /// Maximum "load more" clicks per table-of-contents page (default 200).
    pub max_load_more_clicks: Option<u32>,
    /// Run Chrome without a window (default true).
    pub headless: Option<bool>,
    /// Resolve tables of contents with Chrome (default true). False behaves like --no-browser.
    pub use_browser: Option<bool>,
}

/// Search order: (1) ./kakuyomu-dl.toml, (2) $XDG_CONFIG_HOME/kakuyomu-dl/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("kakuyomu-dl.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("kakuyomu-dl").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
