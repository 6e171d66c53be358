//! List file loading for batch downloads.
//!
//! Records are separated by blank lines. Each record is `key = value` lines with keys
//! `title`, `file_name`, `url`, and `update`; values may be wrapped in double quotes.
//!
//! ```text
//! title = "作品名"
//! file_name = sakuhin
//! url = https://kakuyomu.jp/works/1177354054880000000
//! update = 24-01-01
//! ```

use crate::model::ListEntry;
use crate::scraper::ScraperError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(title|file_name|url|update) *= *(.*)$").expect("FIELD: hardcoded regex is valid")
});

/// Read and parse a list file.
pub fn load_list(path: &Path) -> Result<Vec<ListEntry>, ScraperError> {
    let content = std::fs::read_to_string(path).map_err(|e| ScraperError::ListFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_list(&content))
}

/// Parse list file contents. Records without a title are dropped; unknown lines are ignored.
pub fn parse_list(content: &str) -> Vec<ListEntry> {
    let mut entries = Vec::new();
    let mut current = ListEntry::default();
    for line in content.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            let record = std::mem::take(&mut current);
            if !record.title.is_empty() {
                entries.push(record);
            }
            continue;
        }
        let Some(caps) = FIELD.captures(line) else {
            continue;
        };
        let value = unquote(&caps[2]);
        if value.is_empty() {
            continue;
        }
        match &caps[1] {
            "title" => current.title = value,
            "file_name" => current.file_name = Some(value),
            "url" => current.url = Some(value),
            "update" => current.update = Some(value),
            _ => {}
        }
    }
    entries
}

/// Strip one leading and one trailing double quote.
fn unquote(raw: &str) -> String {
    let s = raw.strip_prefix('"').unwrap_or(raw);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_separated_by_blank_lines() {
        let content = r#"title = "作品A"
file_name = "a"
url = "https://kakuyomu.jp/works/1"
update = 24-01-01

title=作品B
file_name = b
url = https://kakuyomu.jp/works/2


title = 作品C
"#;
        let entries = parse_list(content);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "作品A");
        assert_eq!(entries[0].file_name.as_deref(), Some("a"));
        assert_eq!(entries[0].url.as_deref(), Some("https://kakuyomu.jp/works/1"));
        assert_eq!(entries[0].update.as_deref(), Some("24-01-01"));
        assert_eq!(entries[1].title, "作品B");
        assert_eq!(entries[1].url.as_deref(), Some("https://kakuyomu.jp/works/2"));
        assert!(entries[1].update.is_none());
        assert_eq!(entries[2].title, "作品C");
        assert!(entries[2].url.is_none());
    }

    #[test]
    fn record_without_title_is_dropped() {
        let content = "file_name = x\nurl = https://kakuyomu.jp/works/9\n\ntitle = kept\n";
        let entries = parse_list(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "kept");
    }

    #[test]
    fn empty_and_quoted_empty_titles_do_not_count() {
        assert!(parse_list("title = \nurl = u\n").is_empty());
        assert!(parse_list("title = \"\"\nurl = u\n").is_empty());
    }

    #[test]
    fn crlf_and_unknown_keys() {
        let content = "title = \"T\"\r\nauthor = someone\r\nurl = u\r\n";
        let entries = parse_list(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "T");
        assert_eq!(entries[0].url.as_deref(), Some("u"));
    }

    #[test]
    fn load_list_missing_file_errors() {
        let path = std::env::temp_dir().join("kakuyomu_dl_no_such_list.lst");
        assert!(matches!(
            load_list(&path),
            Err(ScraperError::ListFile { .. })
        ));
    }

    #[test]
    fn load_list_reads_file() -> Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join("kakuyomu_dl_test_list.lst");
        std::fs::write(&path, "title = T\nurl = https://kakuyomu.jp/works/1\n")?;
        let entries = load_list(&path)?;
        std::fs::remove_file(&path).ok();
        assert_eq!(entries.len(), 1);
        Ok(())
    }
}
