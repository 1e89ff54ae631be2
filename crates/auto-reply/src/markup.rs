//! Markdown ⇄ channel markup.
//!
//! The channel renders a small emphasis dialect: `*bold*`, `_italic_`,
//! `~strike~` and plain `• ` bullets. Code spans, fenced blocks, links and
//! bare URLs pass through untouched in both directions.
//!
//! Translation toward the channel never makes text longer, so a chunk that
//! fit the character budget before translating still fits afterwards.

use std::{ops::Range, sync::LazyLock};

use regex::{Captures, Regex};

use crate::extract;

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

// Private-use sentinels keep already translated emphasis out of later passes.
const PLACEHOLDER: char = '\u{E000}';
const BOLD: char = '\u{E001}';
const ITALIC: char = '\u{E002}';

static RESTORE: LazyLock<Regex> = LazyLock::new(|| compile("\u{E000}(\\d+)\u{E000}"));

static MD_BULLET: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^([ \t]*)[-*+][ \t]+"));
static MD_HEADING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+(.+?)[ \t]*#*[ \t]*$"));
static MD_BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| compile(r"\*\*([^*\n]+?)\*\*"));
static MD_BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| compile(r"__([^_\n]+?)__"));
static MD_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*"));
static MD_STRIKE: LazyLock<Regex> = LazyLock::new(|| compile(r"~~([^~\n]+?)~~"));

static CH_BULLET: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^([ \t]*)•[ \t]*"));
static CH_BOLD: LazyLock<Regex> = LazyLock::new(|| compile(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*"));
static CH_ITALIC: LazyLock<Regex> = LazyLock::new(|| compile(r"_([^_\s](?:[^_\n]*[^_\s])?)_"));
static CH_STRIKE: LazyLock<Regex> = LazyLock::new(|| compile(r"~([^~\s](?:[^~\n]*[^~\s])?)~"));

/// Translate authored markdown into channel markup.
#[must_use]
pub fn to_channel_markup(markdown: &str) -> String {
    let (masked, protected) = mask(markdown, strip_fence_language);

    let out = MD_BULLET.replace_all(&masked, "${1}• ");
    let out = MD_HEADING.replace_all(&out, |caps: &Captures<'_>| {
        let title = caps[1].replace("**", "").replace("__", "");
        format!("{BOLD}{title}{BOLD}")
    });
    let out = MD_BOLD_STARS.replace_all(&out, format!("{BOLD}$1{BOLD}").as_str());
    let out = MD_BOLD_UNDERSCORES.replace_all(&out, format!("{BOLD}$1{BOLD}").as_str());
    let out = MD_ITALIC.replace_all(&out, |caps: &Captures<'_>| {
        if is_emphasis(&caps[1]) {
            format!("_{}_", &caps[1])
        } else {
            caps[0].to_string()
        }
    });
    let out = MD_STRIKE.replace_all(&out, "~$1~");
    let out = out.replace(BOLD, "*");

    unmask(&out, &protected)
}

/// Translate channel markup back into markdown, for history and editing.
#[must_use]
pub fn to_authoring_markdown(markup: &str) -> String {
    let (masked, protected) = mask(markup, str::to_string);

    let bulleted = CH_BULLET.replace_all(&masked, "${1}- ");
    let out = CH_ITALIC.replace_all(&bulleted, |caps: &Captures<'_>| {
        // snake_case identifiers are not emphasis
        let standalone = caps
            .get(0)
            .is_some_and(|whole| on_word_boundary(&bulleted, whole.range()));
        if standalone {
            format!("{ITALIC}{}{ITALIC}", &caps[1])
        } else {
            caps[0].to_string()
        }
    });
    let out = CH_BOLD.replace_all(&out, |caps: &Captures<'_>| {
        if is_emphasis(&caps[1]) {
            format!("**{}**", &caps[1])
        } else {
            caps[0].to_string()
        }
    });
    let out = CH_STRIKE.replace_all(&out, "~~$1~~");
    let out = out.replace(ITALIC, "*");

    unmask(&out, &protected)
}

/// `2*3*4` is arithmetic, not emphasis: a starred span needs a letter, or a
/// masked link standing in for one.
fn is_emphasis(span: &str) -> bool {
    span.chars().any(|c| c.is_alphabetic() || c == PLACEHOLDER)
}

fn on_word_boundary(haystack: &str, range: Range<usize>) -> bool {
    let before = haystack[..range.start].chars().next_back();
    let after = haystack[range.end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

// ── Protected spans ─────────────────────────────────────────────────────────

/// Replace code and URL spans with numbered placeholders.
fn mask(text: &str, transform_fence: impl Fn(&str) -> String) -> (String, Vec<String>) {
    let fences = extract::fenced_blocks(text);
    let mut extra = extract::inline_code(text, &fences);
    extra.extend(extract::scan(text).into_iter().map(|m| m.range));

    let mut spans: Vec<(Range<usize>, bool)> = fences.into_iter().map(|r| (r, true)).collect();
    spans.extend(extra.into_iter().map(|r| (r, false)));
    spans.sort_by_key(|(r, _)| r.start);

    let mut masked = String::with_capacity(text.len());
    let mut protected = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for (range, fence) in spans {
        if range.start < cursor {
            continue;
        }
        masked.push_str(&text[cursor..range.start]);
        let original = &text[range.clone()];
        protected.push(if fence {
            transform_fence(original)
        } else {
            original.to_string()
        });
        masked.push(PLACEHOLDER);
        masked.push_str(&(protected.len() - 1).to_string());
        masked.push(PLACEHOLDER);
        cursor = range.end;
    }
    masked.push_str(&text[cursor..]);
    (masked, protected)
}

fn unmask(text: &str, protected: &[String]) -> String {
    RESTORE
        .replace_all(text, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| protected.get(idx))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Drop the info string after an opening fence: "```rust\n" becomes "```\n".
fn strip_fence_language(block: &str) -> String {
    let Some((first, rest)) = block.split_once('\n') else {
        return block.to_string();
    };
    let trimmed = first.trim_start();
    let indent = &first[..first.len() - trimmed.len()];
    let fence: String = trimmed
        .chars()
        .take_while(|c| *c == '`' || *c == '~')
        .collect();
    format!("{indent}{fence}\n{rest}")
}
