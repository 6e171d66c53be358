//! CLI parsing and orchestration. Parses args, resolves targets (single URL or list file),
//! downloads each as Aozora Bunko text. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::download::{parse_update_date, run_target, DownloadOptions, Target};
use crate::listfile::load_list;
use crate::model::ListEntry;
use crate::scraper::{
    ensure_work_url, ChromeBrowser, IndexResolver, PoliteClient, ResolveEpisodes, ResolveOptions,
    ScraperError, StaticIndexResolver, DEFAULT_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OUTPUT_NAME: &str = "output.txt";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Config(_) => 1,
            CliRunError::Scraper(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "kakuyomu-dl")]
#[command(about = "Download Kakuyomu web novels as Aozora Bunko formatted text")]
#[command(
    after_help = "Config file keys (save_dir, user_agent, request_delay_secs, timeout_secs, load_more_delay_ms, max_load_more_clicks, headless, use_browser) are read from ./kakuyomu-dl.toml or the user config directory. CLI flags override config."
)]
pub struct Args {
    /// Work (table of contents) URL, e.g. https://kakuyomu.jp/works/1177354054880000000
    pub url: Option<String>,

    /// List file of works to download (title / file_name / url / update records).
    #[arg(short = 'c', long)]
    pub chklist: Option<PathBuf>,

    /// Directory output files are written to. Default: current directory.
    #[arg(short = 's', long)]
    pub savedir: Option<PathBuf>,

    /// Output file for URL mode. Default: <savedir>/output.txt.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only download episodes published on or after this date (YY-MM-DD or YYYY-MM-DD).
    #[arg(short, long, value_parser = parse_update)]
    pub update: Option<NaiveDate>,

    /// Resolve and download, but do not write any file.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace). Also prints the error cause chain.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the error cause chain without raising the log level.
    #[arg(long)]
    pub verbose_errors: bool,

    /// Resolve tables of contents from fetched HTML only, without launching Chrome.
    #[arg(long)]
    pub no_browser: bool,

    /// Show the Chrome window instead of running headless.
    #[arg(long)]
    pub headed: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl Args {
    /// Whether a failure should be printed with its full cause chain.
    pub fn show_error_chain(&self) -> bool {
        self.verbose_errors || self.verbose > 0
    }
}

fn parse_update(s: &str) -> Result<NaiveDate, String> {
    parse_update_date(s).ok_or_else(|| {
        format!(
            "Invalid --update value: '{}'. Use YY-MM-DD or YYYY-MM-DD.",
            s
        )
    })
}

/// Install the tracing subscriber. RUST_LOG wins over -v.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "kakuyomu_dl=warn",
        1 => "kakuyomu_dl=info",
        2 => "kakuyomu_dl=debug",
        _ => "kakuyomu_dl=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Make a title usable as a file name: path separators and reserved characters become `_`.
fn sanitize_title(title: &str) -> String {
    let s: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let s = s.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if s.is_empty() {
        "novel".to_string()
    } else {
        s.to_string()
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

/// A list entry as a download target, with its own update cutoff. None when it has no URL.
fn list_target(
    entry: &ListEntry,
    save_dir: &Path,
    update_override: Option<NaiveDate>,
) -> Option<(Target, Option<NaiveDate>)> {
    let Some(raw_url) = entry.url.as_deref() else {
        tracing::warn!(title = %entry.title, "list entry has no url; skipped");
        return None;
    };
    let url = match ensure_work_url(raw_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(title = %entry.title, error = %e, "list entry url rejected; skipped");
            return None;
        }
    };
    let name = entry
        .file_name
        .as_deref()
        .map(sanitize_title)
        .unwrap_or_else(|| sanitize_title(&entry.title));
    let update = update_override.or_else(|| {
        let raw = entry.update.as_deref()?;
        let date = parse_update_date(raw);
        if date.is_none() {
            tracing::warn!(title = %entry.title, update = %raw, "unrecognized update date; ignored");
        }
        date
    });
    Some((
        Target {
            url,
            output: save_dir.join(format!("{}.txt", name)),
        },
        update,
    ))
}

/// Targets from the command line: every list entry, or the single URL.
fn collect_targets(
    args: &Args,
    save_dir: &Path,
) -> Result<Vec<(Target, Option<NaiveDate>)>, CliRunError> {
    if let Some(ref list_path) = args.chklist {
        let entries = load_list(list_path)?;
        tracing::info!(path = %list_path.display(), entries = entries.len(), "loaded list");
        return Ok(entries
            .iter()
            .filter_map(|e| list_target(e, save_dir, args.update))
            .collect());
    }
    if let Some(ref url) = args.url {
        let url = ensure_work_url(url).map_err(|e| {
            CliRunError::InvalidInput(format!(
                "Expected a work URL. Example: https://kakuyomu.jp/works/1177354054880000000 ({})",
                e
            ))
        })?;
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| save_dir.join(DEFAULT_OUTPUT_NAME));
        return Ok(vec![(Target { url, output }, args.update)]);
    }
    Err(CliRunError::InvalidInput(
        "Specify a work URL or --chklist <file>. See --help.".to_string(),
    ))
}

/// HTTP client settings after merging flags over config over client defaults.
#[derive(Debug, PartialEq, Eq)]
struct HttpSettings {
    delay_secs: u64,
    timeout_secs: u64,
    user_agent: Option<String>,
}

impl HttpSettings {
    fn merge(args: &Args, config: Option<&Config>) -> Self {
        Self {
            delay_secs: args
                .delay
                .or_else(|| config.and_then(|c| c.request_delay_secs))
                .unwrap_or(DEFAULT_DELAY_SECS),
            timeout_secs: args
                .timeout
                .or_else(|| config.and_then(|c| c.timeout_secs))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            user_agent: args
                .user_agent
                .clone()
                .or_else(|| config.and_then(|c| c.user_agent.clone())),
        }
    }
}

/// Table-of-contents resolver: headless Chrome unless disabled by flag or config.
fn build_resolver(
    args: &Args,
    config: Option<&Config>,
    client: &PoliteClient,
    user_agent: Option<&str>,
) -> Result<Box<dyn ResolveEpisodes>, CliRunError> {
    let use_browser = !args.no_browser && config.and_then(|c| c.use_browser).unwrap_or(true);
    if !use_browser {
        return Ok(Box::new(StaticIndexResolver::new(client.clone())));
    }
    let defaults = ResolveOptions::default();
    let options = ResolveOptions {
        load_more_delay: config
            .and_then(|c| c.load_more_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.load_more_delay),
        max_load_more_clicks: config
            .and_then(|c| c.max_load_more_clicks)
            .unwrap_or(defaults.max_load_more_clicks),
    };
    let headless = !args.headed && config.and_then(|c| c.headless).unwrap_or(true);
    let browser = ChromeBrowser::launch(headless, user_agent)?;
    Ok(Box::new(IndexResolver::new(browser, options)))
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::Config)?;

    let save_dir: PathBuf = args
        .savedir
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.save_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    let targets = collect_targets(args, &save_dir)?;
    if targets.is_empty() {
        return Err(CliRunError::InvalidInput(
            "The list file has no entries with a url.".to_string(),
        ));
    }
    if !args.dry_run {
        for (target, _) in &targets {
            validate_output_path(&target.output)?;
        }
    }

    let http = HttpSettings::merge(args, config.as_ref());
    let mut builder = PoliteClient::builder()
        .delay_secs(http.delay_secs)
        .timeout_secs(http.timeout_secs);
    if let Some(ref ua) = http.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let mut resolver =
        build_resolver(args, config.as_ref(), &client, http.user_agent.as_deref())?;

    for (target, updated_since) in targets {
        let options = DownloadOptions {
            dry_run: args.dry_run,
            updated_since,
        };

        let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
        let progress_cb = |n: u32, total: u32| {
            if total == 0 {
                return;
            }
            let mut state = progress_state.borrow_mut();
            let pb = state.get_or_insert_with(|| {
                let bar = indicatif::ProgressBar::new(total as u64);
                if let Ok(style) = indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                {
                    bar.set_style(
                        style
                            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                            .progress_chars("█▉▊▋▌▍▎▏ "),
                    );
                }
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });
            pb.set_position(n as u64);
            pb.set_message(format!("Episode {}/{}", n, total));
        };
        let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

        let result = run_target(&target, resolver.as_mut(), &mut client, &options, progress);

        if let Some(pb) = progress_state.borrow_mut().take() {
            pb.disable_steady_tick();
            pb.finish_and_clear();
        }
        let download = result?;

        if args.dry_run {
            eprintln!("Chapters: {}", download.chapters);
            eprintln!("Output: {}", target.output.display());
        } else if !args.quiet {
            eprintln!(
                "Wrote {} ({} chapters)",
                target.output.display(),
                download.chapters
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("kakuyomu-dl").chain(argv.iter().copied()))
    }

    #[test]
    fn sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "novel");
        assert_eq!(sanitize_title(" .. "), "novel");
    }

    #[test]
    fn sanitize_title_keeps_japanese() {
        assert_eq!(sanitize_title("転生したら剣でした"), "転生したら剣でした");
    }

    #[test]
    fn sanitize_title_replaces_reserved() {
        assert_eq!(sanitize_title("a/b:c?"), "a_b_c_");
        assert_eq!(sanitize_title("  題名  "), "題名");
    }

    #[test]
    fn parse_update_valid_and_invalid() {
        assert_eq!(parse_update("24-01-02").ok(), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert!(parse_update("tomorrow").is_err());
    }

    #[test]
    fn url_mode_defaults_to_output_txt_in_savedir() -> Result<(), CliRunError> {
        let a = args(&["https://kakuyomu.jp/works/1/", "-s", "out"]);
        let targets = collect_targets(&a, Path::new("out"))?;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0.url, "https://kakuyomu.jp/works/1");
        assert_eq!(targets[0].0.output, PathBuf::from("out/output.txt"));
        assert!(targets[0].1.is_none());
        Ok(())
    }

    #[test]
    fn url_mode_output_flag_wins() -> Result<(), CliRunError> {
        let a = args(&["https://kakuyomu.jp/works/1", "-o", "x.txt", "-u", "2024-02-03"]);
        let targets = collect_targets(&a, Path::new("."))?;
        assert_eq!(targets[0].0.output, PathBuf::from("x.txt"));
        assert_eq!(targets[0].1, NaiveDate::from_ymd_opt(2024, 2, 3));
        Ok(())
    }

    #[test]
    fn non_kakuyomu_url_is_invalid_input() {
        let a = args(&["https://example.com/works/1"]);
        let err = collect_targets(&a, Path::new(".")).err();
        assert!(matches!(err, Some(CliRunError::InvalidInput(_))));
    }

    #[test]
    fn no_url_and_no_list_is_invalid_input() {
        let a = args(&[]);
        match collect_targets(&a, Path::new(".")) {
            Err(e) => {
                assert_eq!(e.exit_code(), 1);
                assert!(e.to_string().contains("--chklist"));
            }
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn list_mode_builds_targets() -> Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join("kakuyomu_dl_cli_test.lst");
        std::fs::write(
            &path,
            "title = 作品A\nfile_name = \"a\"\nurl = https://kakuyomu.jp/works/1\nupdate = 24-01-01\n\ntitle = 作品B\nurl = https://kakuyomu.jp/works/2\n\ntitle = URLなし\n",
        )?;
        let a = args(&["-c", path.to_str().unwrap_or_default()]);
        let targets = collect_targets(&a, Path::new("novels"))?;
        std::fs::remove_file(&path).ok();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].0.output, PathBuf::from("novels/a.txt"));
        assert_eq!(targets[0].1, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(targets[1].0.output, PathBuf::from("novels/作品B.txt"));
        assert!(targets[1].1.is_none());
        Ok(())
    }

    #[test]
    fn update_flag_overrides_list_entry() {
        let entry = ListEntry {
            title: "T".to_string(),
            file_name: None,
            url: Some("https://kakuyomu.jp/works/1".to_string()),
            update: Some("20-01-01".to_string()),
        };
        let flag = NaiveDate::from_ymd_opt(2024, 5, 5);
        let (_, update) = list_target(&entry, Path::new("."), flag).unwrap_or_else(|| {
            panic!("entry with url must become a target");
        });
        assert_eq!(update, flag);
    }

    #[test]
    fn verbose_counts() {
        assert_eq!(args(&["-vv"]).verbose, 2);
        assert_eq!(args(&[]).verbose, 0);
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_kakuyomu_dl_xyz/output.txt");
        let result = validate_output_path(&path);
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("parent directory does not exist"));
        }
    }

    #[test]
    fn validate_output_path_parent_exists() {
        let path = std::env::temp_dir().join("kakuyomu_dl_cli_test_output.txt");
        assert!(validate_output_path(&path).is_ok());
    }

    #[test]
    fn list_entry_with_bad_url_is_skipped() {
        let entry = |url: &str| ListEntry {
            title: "T".to_string(),
            file_name: None,
            url: Some(url.to_string()),
            update: None,
        };
        assert!(list_target(&entry("not a url"), Path::new("."), None).is_none());
        assert!(list_target(&entry("https://example.com/works/1"), Path::new("."), None).is_none());
        assert!(list_target(
            &entry("https://kakuyomu.jp/works/1/episodes/2"),
            Path::new("."),
            None
        )
        .is_none());
        let work = entry(" https://kakuyomu.jp/works/1/ ");
        let (target, _) = list_target(&work, Path::new("."), None)
            .unwrap_or_else(|| panic!("a work url must become a target"));
        assert_eq!(target.url, "https://kakuyomu.jp/works/1");
    }

    #[test]
    fn http_settings_fall_back_to_client_defaults() {
        let settings = HttpSettings::merge(&args(&[]), None);
        assert_eq!(settings.delay_secs, DEFAULT_DELAY_SECS);
        assert_eq!(settings.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(settings.user_agent.is_none());
    }

    #[test]
    fn http_settings_flags_override_config() {
        let config = Config {
            request_delay_secs: Some(3),
            timeout_secs: Some(60),
            user_agent: Some("FromConfig/1.0".to_string()),
            ..Default::default()
        };
        let from_config = HttpSettings::merge(&args(&[]), Some(&config));
        assert_eq!(from_config.delay_secs, 3);
        assert_eq!(from_config.timeout_secs, 60);
        assert_eq!(from_config.user_agent.as_deref(), Some("FromConfig/1.0"));

        let a = args(&["--delay", "0", "--user-agent", "Flag/2.0"]);
        let merged = HttpSettings::merge(&a, Some(&config));
        assert_eq!(merged.delay_secs, 0);
        assert_eq!(merged.timeout_secs, 60);
        assert_eq!(merged.user_agent.as_deref(), Some("Flag/2.0"));
    }

    #[test]
    fn error_chain_shown_with_verbose_errors_or_verbose() {
        assert!(!args(&[]).show_error_chain());
        let a = args(&["--verbose-errors"]);
        assert!(a.verbose_errors);
        assert_eq!(a.verbose, 0);
        assert!(a.show_error_chain());
        assert!(args(&["-v"]).show_error_chain());
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(CliRunError::Config("bad toml".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Scraper(ScraperError::NoEpisodes { url: "u".into() }).exit_code(),
            2
        );
    }
}
