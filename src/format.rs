//! Channel-specific response formatting.
//!
//! Web clients render markdown, so web replies pass through untouched. SMS
//! needs plain text packed into 160-character segments: styling is stripped,
//! then whole sentences are greedily packed per segment, falling back to
//! word-level packing for any single sentence over the limit.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum characters per SMS segment.
pub const SMS_SEGMENT_CHARS: usize = 160;

/// A reply formatted for its delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedReply {
    /// Markdown pass-through for the web widget.
    Web(String),
    /// Ordered plain-text segments, each within [`SMS_SEGMENT_CHARS`].
    Sms(Vec<String>),
}

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("hardcoded pattern"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("hardcoded pattern"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("hardcoded pattern"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("hardcoded pattern"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("hardcoded pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("hardcoded pattern"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("hardcoded pattern"));

/// Strip markdown styling, links (keeping the link text), and code fences;
/// collapse excess blank lines.
pub fn strip_markdown(text: &str) -> String {
    let no_fences = CODE_FENCE.replace_all(text, "");
    let no_bold = BOLD.replace_all(&no_fences, "$1");
    let no_italic = ITALIC.replace_all(&no_bold, "$1");
    let no_headers = HEADER.replace_all(&no_italic, "");
    let no_links = LINK.replace_all(&no_headers, "$1");
    let no_inline = INLINE_CODE.replace_all(&no_links, "$1");
    BLANK_RUN.replace_all(&no_inline, "\n\n").trim().to_owned()
}

/// Split text into sentences at `.`, `!`, `?`, or newline boundaries.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            if !current.trim().is_empty() {
                sentences.push(current.trim().to_owned());
            }
            current.clear();
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if !current.trim().is_empty() {
                sentences.push(current.trim().to_owned());
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_owned());
    }
    sentences
}

/// Greedily pack whole words into segments of at most `limit` characters.
fn pack_words(sentence: &str, limit: usize, segments: &mut Vec<String>) {
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current
                .chars()
                .count()
                .saturating_add(1)
                .saturating_add(word.chars().count())
        };
        if candidate_len <= limit {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            if word.chars().count() > limit {
                // An unbreakable token (a long URL, say) is hard-split so no
                // segment ever exceeds the limit.
                let chars: Vec<char> = word.chars().collect();
                for chunk in chars.chunks(limit.max(1)) {
                    if chunk.len() == limit {
                        segments.push(chunk.iter().collect());
                    } else {
                        current = chunk.iter().collect();
                    }
                }
            } else {
                current = word.to_owned();
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
}

/// Segment plain text into SMS-sized chunks by greedily packing whole
/// sentences, falling back to word packing for any sentence over the limit.
pub fn segment_sms(text: &str) -> Vec<String> {
    let stripped = strip_markdown(text);
    if stripped.chars().count() <= SMS_SEGMENT_CHARS {
        return vec![stripped];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(&stripped) {
        let joined_len = if current.is_empty() {
            sentence.chars().count()
        } else {
            current
                .chars()
                .count()
                .saturating_add(1)
                .saturating_add(sentence.chars().count())
        };

        if joined_len <= SMS_SEGMENT_CHARS {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
        } else {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            if sentence.chars().count() > SMS_SEGMENT_CHARS {
                pack_words(&sentence, SMS_SEGMENT_CHARS, &mut segments);
            } else {
                current = sentence;
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Format a finished reply for its delivery channel.
pub fn format_for_channel(text: &str, channel: crate::store::Channel) -> FormattedReply {
    match channel {
        crate::store::Channel::Web => FormattedReply::Web(text.to_owned()),
        crate::store::Channel::Sms => FormattedReply::Sms(segment_sms(text)),
    }
}
