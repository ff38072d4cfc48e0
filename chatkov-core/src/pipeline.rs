//! Ingestion pipeline: one message in, one recorded outcome out.
//!
//! Every message an upstream connector hands over passes through
//! [`ingest_message`], which sanitizes, gates and tokenizes the text
//! before handing it to the store. Rejections are ordinary outcomes
//! carrying a [`SkipReason`], not errors: callers log or surface them
//! and move on.

use serde::Serialize;

use crate::error::Result;
use crate::options::RuntimeOptions;
use crate::store::{ChatId, Store};
use crate::text;

/// Messages whose sanitized form is shorter than this are noise.
pub const MIN_TEXT_CHARS: usize = 3;
/// Messages whose sanitized form is longer than this are pasted walls
/// of text that would skew the model toward one-off content.
pub const MAX_TEXT_CHARS: usize = 500;

/// Why a message was kept out of the model.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
	/// Nothing left after sanitization.
	Empty,
	/// Sanitized text below [`MIN_TEXT_CHARS`].
	TooShort,
	/// Sanitized text above [`MAX_TEXT_CHARS`].
	TooLong,
	/// Fewer tokens than the configured `min_tokens_for_model`.
	BelowMinTokens,
}

/// Outcome of one pipeline pass.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
	/// The message was recorded; `tokens` is what entered the model.
	Ingested { tokens: Vec<String> },
	/// The message was rejected before reaching the store.
	Skipped { reason: SkipReason },
}

/// Runs one message through the full ingestion pipeline.
///
/// # Behavior
/// 1. Sanitize the raw text (URLs and mentions out, repeats squeezed,
///    whitespace collapsed).
/// 2. Gate on the sanitized form: empty, shorter than
///    [`MIN_TEXT_CHARS`], or longer than [`MAX_TEXT_CHARS`] skips.
/// 3. Tokenize and gate on `min_tokens_for_model`.
/// 4. Record the raw message and its transitions in one transaction.
///
/// # Returns
/// The outcome, including the token sequence that entered the model.
/// A skip is a normal outcome, not an error.
///
/// # Errors
/// Only storage failures propagate; a failed transaction leaves the
/// model untouched.
pub fn ingest_message(
	store: &Store,
	options: &RuntimeOptions,
	chat_id: ChatId,
	raw_text: &str,
) -> Result<IngestOutcome> {
	let clean = text::sanitize(raw_text);
	if clean.is_empty() {
		log::debug!("chat {chat_id}: skipping message, empty after sanitize");
		return Ok(IngestOutcome::Skipped {
			reason: SkipReason::Empty,
		});
	}

	let chars = clean.chars().count();
	if chars < MIN_TEXT_CHARS {
		log::debug!("chat {chat_id}: skipping message, {chars} chars is too short");
		return Ok(IngestOutcome::Skipped {
			reason: SkipReason::TooShort,
		});
	}
	if chars > MAX_TEXT_CHARS {
		log::debug!("chat {chat_id}: skipping message, {chars} chars is too long");
		return Ok(IngestOutcome::Skipped {
			reason: SkipReason::TooLong,
		});
	}

	let tokens = text::tokenize(&clean, options.normalize_lower);
	if tokens.len() < options.min_tokens_for_model {
		log::debug!(
			"chat {chat_id}: skipping message, {} tokens below the model minimum",
			tokens.len()
		);
		return Ok(IngestOutcome::Skipped {
			reason: SkipReason::BelowMinTokens,
		});
	}

	store.ingest(chat_id, raw_text, &tokens)?;
	Ok(IngestOutcome::Ingested { tokens })
}
