//! Error taxonomy for the reply engine.
//!
//! Three situations are deliberately *not* errors and never appear here:
//! - text that sanitizes to nothing or falls under the ingestion minimum
//!   (reported as a skipped [`IngestOutcome`](crate::pipeline::IngestOutcome)),
//! - a chat with no usable seed or candidates (reported as an absent reply),
//! - termination of a generation walk (a normal terminal condition).

use thiserror::Error;

/// Convenience alias used by every fallible API of this crate.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Failures surfaced by the model store and the configuration surface.
///
/// Storage failures are reported synchronously to the immediate caller and
/// are never retried inside this crate; a failed ingestion leaves no
/// partial counts behind (the write is one transaction).
#[derive(Debug, Error)]
pub enum ChainError {
	/// The underlying SQLite read or write failed.
	#[error("storage error: {0}")]
	Storage(#[from] rusqlite::Error),

	/// A model order outside 1..=3 was requested.
	#[error("unsupported model order: {0} (expected 1, 2 or 3)")]
	InvalidOrder(usize),

	/// A lookup context does not have `order - 1` tokens.
	#[error("context of length {got} cannot key an order-{order} table (expected {expected} tokens)")]
	ContextLength {
		order: usize,
		got: usize,
		expected: usize,
	},

	/// A runtime option or request parameter was rejected.
	#[error("invalid value for '{key}': {reason}")]
	InvalidOption { key: String, reason: String },
}

impl ChainError {
	/// Builds an `InvalidOption` error for the given key.
	pub(crate) fn invalid_option(key: &str, reason: impl Into<String>) -> Self {
		Self::InvalidOption {
			key: key.to_owned(),
			reason: reason.into(),
		}
	}
}
