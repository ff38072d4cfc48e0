//! Text sanitation, tokenization and rendering.
//!
//! Everything in this module is a pure function: same input and same
//! configuration always produce the same output. No state, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
static MENTION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").unwrap());
static SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[.,!?;:]").unwrap());

/// Cleans raw chat text before tokenization.
///
/// # Behavior
/// - Removes URLs (`http://` / `https://` up to the next whitespace).
/// - Removes `@mentions`.
/// - Replaces control characters with spaces.
/// - Squeezes runs of 3 or more identical characters down to 2
///   (`"heyyyyy!!!"` becomes `"heyy!!"`).
/// - Collapses whitespace runs to a single space and trims the ends.
///
/// Idempotent: sanitizing already-sanitized text changes nothing.
pub fn sanitize(raw: &str) -> String {
	let text = URL_REGEX.replace_all(raw, " ");
	let text = MENTION_REGEX.replace_all(&text, " ");
	let text: String = text
		.chars()
		.map(|c| if c.is_control() { ' ' } else { c })
		.collect();
	let text = squeeze_repeats(&text);
	SPACE_REGEX.replace_all(&text, " ").trim().to_owned()
}

/// Compresses any run of 3+ identical characters down to 2.
///
/// The regex crate has no backreferences, so this is a plain char scan.
fn squeeze_repeats(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut last: Option<char> = None;
	let mut run = 0usize;

	for c in text.chars() {
		if last == Some(c) {
			run += 1;
		} else {
			last = Some(c);
			run = 1;
		}
		if run <= 2 {
			out.push(c);
		}
	}

	out
}

/// Splits text into word and punctuation tokens.
///
/// # Behavior
/// - Sanitizes the input first (see [`sanitize`]).
/// - A token is either a `\w+` word or a single mark from `. , ! ? ; :`.
///   Any other character is a separator and is dropped.
/// - Lowercases each token when `normalize_lower` is enabled.
///
/// # Returns
/// An ordered token sequence; empty when the input sanitizes to nothing
/// worth keeping (pure URL/emoji messages). Callers must treat an empty
/// sequence as "not ingestible" and "not seedable".
pub fn tokenize(raw: &str, normalize_lower: bool) -> Vec<String> {
	let clean = sanitize(raw);
	TOKEN_REGEX
		.find_iter(&clean)
		.map(|m| {
			if normalize_lower {
				m.as_str().to_lowercase()
			} else {
				m.as_str().to_owned()
			}
		})
		.collect()
}

/// Returns true for punctuation tokens that attach to the previous token
/// without a separating space when rendering.
pub(crate) fn joins_left(token: &str) -> bool {
	matches!(token, "." | "," | "!" | "?" | ";" | ":")
}

/// Length in characters of the rendered form of `tokens`, without
/// actually building the string.
pub(crate) fn rendered_len(tokens: &[String]) -> usize {
	let mut len = 0usize;
	for (index, token) in tokens.iter().enumerate() {
		if index > 0 && !joins_left(token) {
			len += 1;
		}
		len += token.chars().count();
	}
	len
}

/// Renders a token sequence back into a reply string.
///
/// # Behavior
/// - Tokens are joined with single spaces.
/// - Punctuation from `. , ! ? ; :` attaches to the previous token.
/// - The result is cut at `max_chars` characters (char boundary safe)
///   and right-trimmed.
pub fn detokenize(tokens: &[String], max_chars: usize) -> String {
	let mut text = String::new();
	for token in tokens {
		if !text.is_empty() && !joins_left(token) {
			text.push(' ');
		}
		text.push_str(token);
	}

	if text.chars().count() > max_chars {
		let cut: String = text.chars().take(max_chars).collect();
		return cut.trim_end().to_owned();
	}
	text
}
