//! kakuyomu-dl: CLI downloader for Kakuyomu web novels, outputting Aozora Bunko formatted text.

pub mod aozora;
pub mod cli;
pub mod config;
pub mod download;
pub mod listfile;
pub mod model;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use aozora::{convert, format_chapter};
pub use download::{download_novel, run_target, save_text, Download, DownloadOptions, Target};
pub use model::{Episode, ListEntry};
pub use crate::scraper::{
    extract_body, Browser, ChromeBrowser, Fetch, IndexResolver, PoliteClient, PoliteClientBuilder,
    ResolveEpisodes, ResolveOptions, ScraperError, StaticIndexResolver,
};
