//! URL and media detection over reply text.
//!
//! Stateless: every function takes the source string and returns spans or
//! owned copies. The source is never rewritten in place.

use std::{ops::Range, sync::LazyLock};

use {courier_common::types::MediaKind, regex::Regex, url::Url};

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

static EMBED: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"!\[[^\]\n]*\]\(\s*<?(https?://[^\s)>]+)>?(?:\s+"[^"\n]*")?\s*\)"#)
});
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"\[[^\]\n]*\]\(\s*<?([^\s)>]+)>?(?:\s+"[^"\n]*")?\s*\)"#)
});
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| compile(r"\[(https?://[^\s\]]+)\]"));
static BARE: LazyLock<Regex> = LazyLock::new(|| compile(r#"https?://[^\s<>"'`\[\]]+"#));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`[^`\n]+`"));

/// Upper bound on how far a bracket construct may stretch before it is
/// treated as stray punctuation.
const MAX_CONSTRUCT_SPAN: usize = 2048;

// ── Classification ──────────────────────────────────────────────────────────

/// What a URL points at, judged by the extension of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlCategory {
    Media(MediaKind),
    Link,
}

/// How the URL appears in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlForm {
    /// A plain `https://...` token.
    Bare,
    /// `![label](url)`
    Embedded,
    /// `[label](url)` or `[url]`
    Linked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch {
    /// Byte span of the whole construct in the scanned text.
    pub range: Range<usize>,
    pub url: String,
    pub category: UrlCategory,
    pub form: UrlForm,
}

impl UrlMatch {
    /// Media shown bare or embedded is sent as its own part. A media URL
    /// inside an ordinary link keeps its label and stays in the text.
    #[must_use]
    pub fn is_extractable(&self) -> bool {
        matches!(self.category, UrlCategory::Media(_)) && self.form != UrlForm::Linked
    }
}

/// Classify a URL by its path extension. Query string and fragment are
/// ignored; anything without a recognised extension is a link.
#[must_use]
pub fn classify(raw: &str) -> UrlCategory {
    let Ok(url) = Url::parse(raw) else {
        return UrlCategory::Link;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return UrlCategory::Link;
    }
    let Some(segment) = url.path_segments().and_then(|mut segments| segments.next_back()) else {
        return UrlCategory::Link;
    };
    let Some((_, ext)) = segment.rsplit_once('.') else {
        return UrlCategory::Link;
    };
    media_kind_for_extension(&ext.to_ascii_lowercase()).map_or(UrlCategory::Link, UrlCategory::Media)
}

fn media_kind_for_extension(ext: &str) -> Option<MediaKind> {
    match ext {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" => Some(MediaKind::Image),
        "mp4" | "mov" | "avi" | "mkv" | "flv" => Some(MediaKind::Video),
        "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" => Some(MediaKind::Audio),
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "csv" | "zip" => {
            Some(MediaKind::File)
        },
        _ => None,
    }
}

/// An absolute `http`/`https` URL with a host.
#[must_use]
pub fn is_web_url(raw: &str) -> bool {
    Url::parse(raw)
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

// ── Scanning ────────────────────────────────────────────────────────────────

/// Find every URL in `text`, in order of appearance.
///
/// Markdown constructs take precedence over the bare URLs they contain; when
/// candidates overlap the leftmost, then widest, wins. URLs inside inline
/// code or fenced code blocks are quoted text and are not reported.
#[must_use]
pub fn scan(text: &str) -> Vec<UrlMatch> {
    let code = code_spans(text);
    let mut candidates: Vec<(Range<usize>, String, UrlForm)> = Vec::new();

    for (re, form) in [
        (&*EMBED, UrlForm::Embedded),
        (&*LINK, UrlForm::Linked),
        (&*BRACKETED, UrlForm::Linked),
    ] {
        for caps in re.captures_iter(text) {
            if let (Some(whole), Some(url)) = (caps.get(0), caps.get(1))
                && !overlaps_any(&code, &url.range())
            {
                candidates.push((whole.range(), url.as_str().to_string(), form));
            }
        }
    }
    for found in BARE.find_iter(text) {
        let url = trim_trailing_punctuation(found.as_str());
        let range = found.start()..found.start() + url.len();
        if url.len() > "https://".len() && !overlaps_any(&code, &range) {
            candidates.push((range, url.to_string(), UrlForm::Bare));
        }
    }

    candidates.sort_by(|a, b| a.0.start.cmp(&b.0.start).then(b.0.end.cmp(&a.0.end)));

    let mut matches: Vec<UrlMatch> = Vec::new();
    let mut cursor = 0;
    for (range, url, form) in candidates {
        if range.start < cursor {
            continue;
        }
        cursor = range.end;
        let category = classify(&url);
        matches.push(UrlMatch {
            range,
            url,
            category,
            form,
        });
    }
    matches
}

/// Strip sentence punctuation glued to the end of a bare URL, and a closing
/// parenthesis that has no opening partner inside the URL.
fn trim_trailing_punctuation(url: &str) -> &str {
    let mut url = url;
    loop {
        let Some(last) = url.chars().next_back() else {
            return url;
        };
        let unbalanced_paren =
            last == ')' && url.matches(')').count() > url.matches('(').count();
        if matches!(last, '.' | ',' | ';' | ':' | '!' | '?' | '*' | '_' | '~') || unbalanced_paren
        {
            url = &url[..url.len() - last.len_utf8()];
        } else {
            return url;
        }
    }
}

// ── Code spans ──────────────────────────────────────────────────────────────

/// Byte ranges of fenced code blocks, fences included. An unclosed fence
/// runs to the end of the text.
pub(crate) fn fenced_blocks(text: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_fence(line) {
            match open.take() {
                Some(start) => blocks.push(start..offset + line.trim_end_matches('\n').len()),
                None => open = Some(offset),
            }
        }
        offset += line.len();
    }
    if let Some(start) = open {
        blocks.push(start..text.len());
    }
    blocks
}

/// Inline code spans that do not start inside one of `fences`.
pub(crate) fn inline_code(text: &str, fences: &[Range<usize>]) -> Vec<Range<usize>> {
    INLINE_CODE
        .find_iter(text)
        .map(|m| m.range())
        .filter(|r| !fences.iter().any(|f| f.start <= r.start && r.start < f.end))
        .collect()
}

fn code_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = fenced_blocks(text);
    let inline = inline_code(text, &spans);
    spans.extend(inline);
    spans
}

fn overlaps_any(spans: &[Range<usize>], range: &Range<usize>) -> bool {
    spans
        .iter()
        .any(|s| s.start < range.end && range.start < s.end)
}

// ── Extraction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMatch {
    pub kind: MediaKind,
    pub url: String,
    /// Span of the first occurrence.
    pub range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted media, deduplicated by URL, first occurrence first.
    pub matches: Vec<MediaMatch>,
    /// The text with every extracted span removed.
    pub remaining: String,
}

/// A run of text or one media item, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Media { kind: MediaKind, url: String },
}

/// Extractable media spans; the flag marks the first occurrence of a URL.
fn media_spans(text: &str) -> Vec<(MediaMatch, bool)> {
    let mut seen: Vec<String> = Vec::new();
    scan(text)
        .into_iter()
        .filter(UrlMatch::is_extractable)
        .filter_map(|m| {
            let UrlCategory::Media(kind) = m.category else {
                return None;
            };
            let first = !seen.contains(&m.url);
            if first {
                seen.push(m.url.clone());
            }
            Some((
                MediaMatch {
                    kind,
                    url: m.url,
                    range: m.range,
                },
                first,
            ))
        })
        .collect()
}

/// Pull media URLs out of `text`.
///
/// Repeated occurrences of an already extracted URL are removed from the text
/// as well, so the same picture is never sent twice.
#[must_use]
pub fn extract(text: &str) -> Extraction {
    let mut remaining = String::with_capacity(text.len());
    let mut matches = Vec::new();
    let mut cursor = 0;
    for (media, first) in media_spans(text) {
        remaining.push_str(&text[cursor..media.range.start]);
        cursor = media.range.end;
        if first {
            matches.push(media);
        }
    }
    remaining.push_str(&text[cursor..]);
    Extraction { matches, remaining }
}

/// Split `text` into text runs and media items in their original order.
/// Whitespace-only runs are dropped.
#[must_use]
pub fn pieces(text: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut cursor = 0;
    let push_text = |out: &mut Vec<Piece>, run: &str| {
        if !run.trim().is_empty() {
            out.push(Piece::Text(run.to_string()));
        }
    };
    for (media, first) in media_spans(text) {
        push_text(&mut out, &text[cursor..media.range.start]);
        cursor = media.range.end;
        if first {
            out.push(Piece::Media {
                kind: media.kind,
                url: media.url,
            });
        }
    }
    push_text(&mut out, &text[cursor..]);
    out
}

// ── Block structure ─────────────────────────────────────────────────────────

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// `---`, `***`, `___` or `===` (three or more of the same char) alone on a line.
fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_' | '=') && trimmed.len() >= 3 && chars.all(|c| c == first)
}

/// ATX heading: up to three spaces, one to six `#`, then a space or end of line.
fn is_heading(line: &str) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let hashes = rest.len() - rest.trim_start_matches('#').len();
    (1..=6).contains(&hashes)
        && rest[hashes..]
            .chars()
            .next()
            .is_none_or(|c| c == ' ' || c == '\t' || c == '\n' || c == '\r')
}

/// Split markdown into sections at separator lines and headings.
///
/// Separator lines are dropped; a heading opens the section it titles.
/// Nothing inside a fenced code block is treated as a boundary. Blank
/// sections are omitted.
#[must_use]
pub fn split_sections<'a>(text: &'a str) -> Vec<&'a str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut in_fence = false;

    let close = move |sections: &mut Vec<&'a str>, from: usize, to: usize| {
        let section = &text[from..to];
        if !section.trim().is_empty() {
            sections.push(section);
        }
    };

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if is_separator(line) {
            close(&mut sections, start, line_start);
            start = offset;
        } else if is_heading(line) {
            close(&mut sections, start, line_start);
            start = line_start;
        }
    }
    close(&mut sections, start, text.len());
    sections
}

/// Byte spans that must never be cut: every URL construct found by [`scan`],
/// inline code spans, and `[...](...)` constructs tracked by bracket and
/// parenthesis balance, which also catches labels that wrap across lines.
#[must_use]
pub fn protected_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = scan(text).into_iter().map(|m| m.range).collect();
    ranges.extend(inline_code(text, &fenced_blocks(text)));
    ranges.extend(bracket_constructs(text));
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// Whether a cut at byte `pos` would land strictly inside a protected span.
#[must_use]
pub fn is_protected(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|r| r.start < pos && pos < r.end)
}

fn bracket_constructs(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        let end = matching(bytes, i, b'[', b']').and_then(|close| {
            (bytes.get(close + 1) == Some(&b'('))
                .then(|| matching(bytes, close + 1, b'(', b')'))
                .flatten()
        });
        match end {
            Some(end) => {
                let start = if i > 0 && bytes[i - 1] == b'!' {
                    i - 1
                } else {
                    i
                };
                out.push(start..end + 1);
                i = end + 1;
            },
            None => i += 1,
        }
    }
    out
}

fn matching(bytes: &[u8], open_at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let limit = bytes.len().min(open_at + MAX_CONSTRUCT_SPAN);
    for (idx, &b) in bytes.iter().enumerate().take(limit).skip(open_at) {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}
