//! Turn a markdown reply into an ordered delivery plan.
//!
//! A reply is cut at separator lines and headings first, media is pulled out
//! of each section in reading order, and remaining text is split greedily to
//! fit the channel's character budget. Split points are tried at the coarsest
//! boundary first: paragraph, line, sentence, word, and only then a hard cut.
//! Nothing is ever cut inside a link or a URL when another option exists.

use std::ops::Range;

use {
    courier_common::types::MessagePart,
    tracing::debug,
};

use crate::{
    extract::{self, Piece},
    reply::{LabelledPart, Reply},
};

/// Period-terminated tokens that do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "approx", "fig",
    "no", "inc", "ltd", "co", "dept", "min", "max",
];

// ── Delivery plan ───────────────────────────────────────────────────────────

/// Ordered, immutable list of parts to send for one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan {
    parts: Vec<MessagePart>,
}

impl DeliveryPlan {
    /// Build a plan, dropping blank text parts.
    #[must_use]
    pub fn new(parts: Vec<MessagePart>) -> Self {
        let parts = parts
            .into_iter()
            .filter(|part| match part {
                MessagePart::Text { content } => !content.trim().is_empty(),
                MessagePart::Media { url, .. } => !url.is_empty(),
            })
            .collect();
        Self { parts }
    }

    /// Plan for a generated reply. Labelled text parts are segmented like a
    /// markdown reply; labelled media parts are kept as they are unless their
    /// URL is unusable, in which case it is sent as text.
    #[must_use]
    pub fn from_reply(reply: &Reply, char_limit: usize) -> Self {
        match reply {
            Reply::Markdown(markdown) => segment(markdown, char_limit),
            Reply::Parts(labelled) => {
                let mut parts = Vec::new();
                for part in labelled {
                    match part {
                        LabelledPart::Text { content } => {
                            parts.extend(segment(content, char_limit).parts);
                        },
                        media => {
                            let Some((kind, url)) = media.media() else {
                                continue;
                            };
                            if extract::is_web_url(url) {
                                parts.push(MessagePart::media(kind, url));
                            } else {
                                debug!(url, "labelled media part has no usable URL, sending as text");
                                parts.extend(segment(url, char_limit).parts);
                            }
                        },
                    }
                }
                Self::new(parts)
            },
        }
    }

    /// Apply a markup translation to every text part.
    ///
    /// A part whose translation would exceed `char_limit` is sent untranslated.
    #[must_use]
    pub fn translate_text(self, char_limit: usize, translate: impl Fn(&str) -> String) -> Self {
        let limit = char_limit.max(1);
        let parts = self
            .parts
            .into_iter()
            .map(|part| match part {
                MessagePart::Text { content } => {
                    let translated = translate(&content);
                    if translated.chars().count() <= limit {
                        MessagePart::text(translated)
                    } else {
                        debug!(limit, "translated part exceeds limit, sending it untranslated");
                        MessagePart::text(content)
                    }
                },
                media => media,
            })
            .collect();
        Self::new(parts)
    }

    #[must_use]
    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessagePart> {
        self.parts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

// ── Segmentation ────────────────────────────────────────────────────────────

/// Segment a markdown reply into parts of at most `char_limit` characters.
///
/// A limit of zero is treated as one. Blank input yields an empty plan.
#[must_use]
pub fn segment(markdown: &str, char_limit: usize) -> DeliveryPlan {
    let limit = char_limit.max(1);
    let mut parts = Vec::new();
    for section in extract::split_sections(markdown) {
        for piece in extract::pieces(section) {
            match piece {
                Piece::Text(text) => {
                    parts.extend(split_text(&text, limit).into_iter().map(MessagePart::text));
                },
                Piece::Media { kind, url } => parts.push(MessagePart::media(kind, url)),
            }
        }
    }
    DeliveryPlan::new(parts)
}

/// Greedily split `text` into trimmed chunks of at most `limit` characters.
#[must_use]
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let protected = extract::protected_ranges(text);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let tail = &text[start..];
        start += tail.len() - tail.trim_start().len();
        let rest = text[start..].trim_end();
        if rest.is_empty() {
            break;
        }
        let Some((overflow, _)) = rest.char_indices().nth(limit) else {
            chunks.push(rest.to_string());
            break;
        };

        let cut = best_cut(text, start..start + overflow, &protected);
        let chunk = text[start..cut].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start = cut;
    }

    chunks
}

/// Pick the cut for a window. Returns a byte offset in `(window.start, window.end]`.
fn best_cut(text: &str, window: Range<usize>, protected: &[Range<usize>]) -> usize {
    let Range { start, end } = window;
    let usable = |cut: usize| {
        cut > start
            && cut <= end
            && !extract::is_protected(protected, cut)
            && !text[start..cut].trim().is_empty()
    };

    // Boundaries may sit exactly at `end`, so scan one char past the window.
    let scan_end = text[end..]
        .chars()
        .next()
        .map_or(end, |c| end + c.len_utf8());
    let slice = &text[start..scan_end];

    let levels: [fn(&str) -> Vec<usize>; 4] =
        [paragraph_breaks, line_breaks, sentence_breaks, word_breaks];
    for level in levels {
        if let Some(cut) = level(slice)
            .into_iter()
            .rev()
            .map(|offset| start + offset)
            .find(|&cut| usable(cut))
        {
            return cut;
        }
    }

    // Hard cut. Pull back to the start of a link the window would sever, as
    // long as something precedes it.
    if let Some(range) = protected.iter().find(|r| r.start < end && end < r.end)
        && range.start > start
        && !text[start..range.start].trim().is_empty()
    {
        return range.start;
    }
    end
}

/// Offsets of newlines followed by a blank line.
fn paragraph_breaks(s: &str) -> Vec<usize> {
    s.char_indices()
        .filter(|&(i, c)| {
            c == '\n' && s[i + 1..].trim_start_matches([' ', '\t']).starts_with('\n')
        })
        .map(|(i, _)| i)
        .collect()
}

fn line_breaks(s: &str) -> Vec<usize> {
    s.char_indices()
        .filter(|&(_, c)| c == '\n')
        .map(|(i, _)| i)
        .collect()
}

/// Offsets of the whitespace that follows a sentence terminator.
fn sentence_breaks(s: &str) -> Vec<usize> {
    s.char_indices()
        .filter(|&(i, c)| c.is_whitespace() && ends_sentence(&s[..i]))
        .map(|(i, _)| i)
        .collect()
}

fn word_breaks(s: &str) -> Vec<usize> {
    s.char_indices()
        .filter(|&(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .collect()
}

fn ends_sentence(before: &str) -> bool {
    let trimmed = before.trim_end_matches(['"', '\'', ')', '”', '’']);
    let Some(last) = trimmed.chars().next_back() else {
        return false;
    };
    match last {
        // "10:30" and "3.14" never get here: the next char is not whitespace.
        '!' | '?' | '…' | ';' | ':' => true,
        '.' => {
            let body = &trimmed[..trimmed.len() - 1];
            let token_start = body
                .rfind(char::is_whitespace)
                .map_or(0, |i| i + body[i..].chars().next().map_or(1, char::len_utf8));
            let token = body[token_start..].trim_start_matches(['(', '"', '\'']);
            !is_abbreviation(token) && !is_list_marker(body, token_start, token)
        },
        _ => false,
    }
}

fn is_abbreviation(token: &str) -> bool {
    let lower = token.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
        || (token.chars().count() == 1 && token.chars().all(char::is_alphabetic))
}

/// "1." at the start of a line enumerates, it does not end a sentence.
fn is_list_marker(body: &str, token_start: usize, token: &str) -> bool {
    let line_prefix = body[..token_start].rsplit('\n').next().unwrap_or_default();
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) && line_prefix.trim().is_empty()
}
