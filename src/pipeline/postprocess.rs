//! Post-processing of raw model output.
//!
//! The only mandatory step is [`strip_markdown_fence`]: models sometimes wrap
//! their whole answer in a ```` ```markdown ```` fence despite the prompt. The
//! check is literal. The opening ```` ```markdown\n ```` and the closing
//! ```` \n``` ```` are removed independently, and anything else (another
//! language tag, surrounding whitespace) is left untouched.
//!
//! [`tidy`] is opt-in (`--tidy`) and only normalises whitespace and invisible
//! characters; it never rewrites content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal opening fence removed from model output.
pub const FENCE_PREFIX: &str = "```markdown\n";

/// Literal closing fence removed from model output.
pub const FENCE_SUFFIX: &str = "\n```";

/// Remove a leading ```` ```markdown\n ```` and a trailing ```` \n``` ````.
pub fn strip_markdown_fence(raw: &str) -> &str {
    let s = raw.strip_prefix(FENCE_PREFIX).unwrap_or(raw);
    s.strip_suffix(FENCE_SUFFIX).unwrap_or(s)
}

/// Whitespace and Unicode normalisation, in order:
/// 1. CRLF / CR → LF
/// 2. Trailing whitespace trimmed per line
/// 3. Invisible characters removed (zero-width space, BOM, soft hyphen, joiners)
/// 4. Runs of three or more blank lines collapsed to two
pub fn tidy(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    collapse_blank_lines(&s)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUNS.replace_all(input, "\n\n\n").into_owned()
}
