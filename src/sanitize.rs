//! Inbound text sanitisation.
//!
//! Pure, infallible, and idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
//! Strips markup (including script/style bodies), removes zero-width and
//! bidi-control characters that can hide content from review, collapses
//! pathological whitespace runs, and bounds the overall length.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum characters kept after sanitisation.
pub const MAX_INPUT_CHARS: usize = 2000;

/// Whitespace runs at or beyond this length are collapsed.
const WS_RUN_THRESHOLD: usize = 10;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("hardcoded pattern"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style>").expect("hardcoded pattern"));
static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("hardcoded pattern"));
static WS_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{10,}").expect("hardcoded pattern"));

/// Invisible characters stripped outright: zero-width spaces/joiners, bidi
/// embedding and isolate controls, BOM, word joiner.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'
            | '\u{2066}'..='\u{2069}'
            | '\u{061C}'
            | '\u{FEFF}'
    )
}

/// Sanitise raw inbound text.
///
/// Steps, in order: drop script/style tag bodies, strip remaining markup
/// tags, remove invisible/bidi-control characters, collapse runs of
/// [`WS_RUN_THRESHOLD`]+ whitespace characters to three spaces, trim, and
/// truncate to [`MAX_INPUT_CHARS`] characters. Never fails; empty input
/// yields an empty string.
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let no_scripts = SCRIPT_BLOCK.replace_all(raw, "");
    let no_styles = STYLE_BLOCK.replace_all(&no_scripts, "");
    let no_tags = MARKUP_TAG.replace_all(&no_styles, "");

    let visible: String = no_tags.chars().filter(|c| !is_invisible(*c)).collect();

    let collapsed = WS_RUN.replace_all(&visible, "   ");

    let trimmed = collapsed.trim();
    let bounded: String = trimmed.chars().take(MAX_INPUT_CHARS).collect();
    // Truncation may expose trailing whitespace; trim again so a second
    // pass is a no-op.
    bounded.trim_end().to_owned()
}
