//! Aozora Bunko text output: converts a chapter body fragment to annotated plain text and wraps
//! each chapter with page-break and heading instructions.

use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\b[^>]*>(?:\r?\n)?").expect("LINE_BREAK: hardcoded regex is valid")
});

// Matches `<ruby>base<rt>gloss</rt></ruby>`, also with optional `<rb>` around the base and `<rp>`
// fallback parentheses around the gloss.
static RUBY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<ruby>(?:<rb>)?(.+?)(?:</rb>)?(?:<rp>[^<]*</rp>)?<rt>(.+?)</rt>(?:<rp>[^<]*</rp>)?</ruby>",
    )
    .expect("RUBY: hardcoded regex is valid")
});

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<em\b[^>]*>(.+?)</em>").expect("EMPHASIS: hardcoded regex is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("TAG: hardcoded regex is valid"));

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\S\n]+$").expect("BLANK_LINE: hardcoded regex is valid")
});

/// Page break instruction.
pub const PAGE_BREAK: &str = "［＃改ページ］";
/// Decorative separator written before and after every chapter.
pub const SEPARATOR: &str = "▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼▲▼";
pub const HEADING_OPEN: &str = "［＃中見出し］";
pub const HEADING_CLOSE: &str = "［＃中見出し終わり］";
pub const EMPHASIS_OPEN: &str = "［＃傍点］";
pub const EMPHASIS_CLOSE: &str = "［＃傍点終わり］";

/// Full-width punctuation pairs rewritten to their half-width forms.
const PUNCTUATION: [(&str, &str); 2] = [("！！", "!!"), ("！？", "!?")];

/// Convert a chapter body fragment (inner HTML of the episode body) to Aozora Bunko text.
///
/// Steps run in a fixed order: line breaks, ruby, emphasis, then every remaining tag is removed.
/// Ruby and emphasis must be rewritten before tags are stripped, since stripping would lose the
/// base/gloss boundary.
pub fn convert(fragment: &str) -> String {
    let text = LINE_BREAK.replace_all(fragment, "\n");
    let text = RUBY.replace_all(&text, "｜${1}《${2}》");
    let emphasis = format!("{EMPHASIS_OPEN}${{1}}{EMPHASIS_CLOSE}");
    let text = EMPHASIS.replace_all(&text, emphasis.as_str());
    let text = TAG.replace_all(&text, "");
    let text = BLANK_LINE.replace_all(&text, "");
    let mut text = text.into_owned();
    for (from, to) in PUNCTUATION {
        text = text.replace(from, to);
    }
    text.trim().to_string()
}

/// Wrap one converted chapter: page break, separator, heading, body, separator.
///
/// An empty title still produces the heading line, with nothing between the instructions.
pub fn format_chapter(body: &str, title: &str) -> String {
    format!(
        "{PAGE_BREAK}\n{SEPARATOR}\n\n{HEADING_OPEN}{title}{HEADING_CLOSE}\n\n\n{body}\n\n{SEPARATOR}\n"
    )
}
