//! Runtime configuration threaded explicitly through the engine.
//!
//! There is no ambient/global configuration anywhere in this crate: the
//! process builds one [`RuntimeOptions`] at startup, mutates it through
//! the validated [`RuntimeOptions::set`] surface, and passes it (or a
//! [`ReplyRequest`](crate::model::request::ReplyRequest) snapshot of it)
//! into every call that needs tuning.

use serde::Serialize;

use crate::error::{ChainError, Result};

/// Every option key accepted by [`RuntimeOptions::set`].
pub const KEYS: [&str; 11] = [
	"reply_probability",
	"min_cooldown_sec",
	"min_tokens_for_model",
	"max_reply_chars",
	"normalize_lower",
	"randomness_strength",
	"markov_order",
	"enable_backoff",
	"backoff_min_order",
	"typing_min_ms",
	"typing_max_ms",
];

/// Process-local tuning knobs.
///
/// ## Responsibilities
/// - Carry the knobs consumed by the tokenizer (`normalize_lower`), the
///   ingestion pipeline (`min_tokens_for_model`) and the generator
///   (`max_reply_chars`, `randomness_strength`, `markov_order`,
///   `enable_backoff`, `backoff_min_order`).
/// - Carry the upstream-only knobs (`reply_probability`,
///   `min_cooldown_sec`, `typing_min_ms`, `typing_max_ms`) so that the
///   trigger layer reads its policy from the same snapshot. The engine
///   itself never looks at them.
/// - Validate every mutation (see [`RuntimeOptions::set`]).
///
/// ## Invariants
/// - `backoff_min_order < markov_order`
/// - `typing_min_ms <= typing_max_ms`
/// - every field stays inside the range documented on [`RuntimeOptions::set`]
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RuntimeOptions {
	/// Probability that the upstream trigger answers an arbitrary message.
	pub reply_probability: f64,
	/// Upstream cooldown between unprompted replies, in seconds.
	pub min_cooldown_sec: u64,
	/// Minimum tokenized length for a message to be ingested.
	pub min_tokens_for_model: usize,
	/// Hard cap on the rendered reply, in characters.
	pub max_reply_chars: usize,
	/// Lowercase tokens during tokenization.
	pub normalize_lower: bool,
	/// Sampling interpolation knob: 0 = always the most frequent
	/// candidate, 1 = proportional to counts, above 1 flattens.
	pub randomness_strength: f64,
	/// Top n-gram order used by the generator (2 or 3).
	pub markov_order: usize,
	/// Whether the generator may fall back to lower orders per step.
	pub enable_backoff: bool,
	/// Lowest order the per-step backoff may reach (1 or 2).
	pub backoff_min_order: usize,
	/// Upstream typing-simulation delay, lower bound in milliseconds.
	pub typing_min_ms: u64,
	/// Upstream typing-simulation delay, upper bound in milliseconds.
	pub typing_max_ms: u64,
}

impl Default for RuntimeOptions {
	fn default() -> Self {
		Self {
			reply_probability: 0.08,
			min_cooldown_sec: 45,
			min_tokens_for_model: 1,
			max_reply_chars: 280,
			normalize_lower: false,
			randomness_strength: 1.0,
			markov_order: 3,
			enable_backoff: true,
			backoff_min_order: 1,
			typing_min_ms: 500,
			typing_max_ms: 2000,
		}
	}
}

impl RuntimeOptions {
	/// Applies one `key = value` update, parsing `value` from its string
	/// form and validating the result.
	///
	/// # Accepted keys and ranges
	/// - `reply_probability`: float in [0.0, 1.0]
	/// - `min_cooldown_sec`: non-negative integer
	/// - `min_tokens_for_model`: integer >= 1
	/// - `max_reply_chars`: integer in [20, 4000]
	/// - `normalize_lower`, `enable_backoff`: boolean
	///   (`1/0`, `true/false`, `yes/no`, `on/off`)
	/// - `randomness_strength`: float in [0.0, 3.0]
	/// - `markov_order`: 2 or 3, and above `backoff_min_order`
	/// - `backoff_min_order`: 1 or 2, and below `markov_order`
	/// - `typing_min_ms` / `typing_max_ms`: integers keeping min <= max
	///
	/// # Errors
	/// Returns an `InvalidOption` error for an unknown key, an unparsable
	/// value or a value outside its range. The options are unchanged on
	/// error.
	pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
		match key {
			"reply_probability" => {
				let v = parse_f64(key, value)?;
				if !(0.0..=1.0).contains(&v) {
					return Err(ChainError::invalid_option(key, "must be between 0.0 and 1.0"));
				}
				self.reply_probability = v;
			}
			"min_cooldown_sec" => {
				self.min_cooldown_sec = parse_u64(key, value)?;
			}
			"min_tokens_for_model" => {
				let v = parse_u64(key, value)? as usize;
				if v < 1 {
					return Err(ChainError::invalid_option(key, "must be at least 1"));
				}
				self.min_tokens_for_model = v;
			}
			"max_reply_chars" => {
				let v = parse_u64(key, value)? as usize;
				if !(20..=4000).contains(&v) {
					return Err(ChainError::invalid_option(key, "must be between 20 and 4000"));
				}
				self.max_reply_chars = v;
			}
			"normalize_lower" => {
				self.normalize_lower = parse_bool(key, value)?;
			}
			"randomness_strength" => {
				let v = parse_f64(key, value)?;
				if !(0.0..=3.0).contains(&v) {
					return Err(ChainError::invalid_option(key, "must be between 0.0 and 3.0"));
				}
				self.randomness_strength = v;
			}
			"markov_order" => {
				let v = parse_u64(key, value)? as usize;
				if !(2..=3).contains(&v) {
					return Err(ChainError::invalid_option(key, "must be 2 or 3"));
				}
				if v <= self.backoff_min_order {
					return Err(ChainError::invalid_option(key, "must stay above backoff_min_order"));
				}
				self.markov_order = v;
			}
			"enable_backoff" => {
				self.enable_backoff = parse_bool(key, value)?;
			}
			"backoff_min_order" => {
				let v = parse_u64(key, value)? as usize;
				if !(1..=2).contains(&v) {
					return Err(ChainError::invalid_option(key, "must be 1 or 2"));
				}
				if v >= self.markov_order {
					return Err(ChainError::invalid_option(key, "must stay below markov_order"));
				}
				self.backoff_min_order = v;
			}
			"typing_min_ms" => {
				let v = parse_u64(key, value)?;
				if v > self.typing_max_ms {
					return Err(ChainError::invalid_option(key, "must not exceed typing_max_ms"));
				}
				self.typing_min_ms = v;
			}
			"typing_max_ms" => {
				let v = parse_u64(key, value)?;
				if v < self.typing_min_ms {
					return Err(ChainError::invalid_option(key, "must not fall below typing_min_ms"));
				}
				self.typing_max_ms = v;
			}
			_ => {
				return Err(ChainError::invalid_option(
					key,
					format!("unknown option, known keys: {}", KEYS.join(", ")),
				));
			}
		}
		Ok(())
	}
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
	value
		.trim()
		.parse::<f64>()
		.map_err(|_| ChainError::invalid_option(key, format!("'{value}' is not a number")))
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
	value
		.trim()
		.parse::<u64>()
		.map_err(|_| ChainError::invalid_option(key, format!("'{value}' is not a non-negative integer")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ChainError::invalid_option(
			key,
			format!("'{value}' is not a boolean (use 1/0, true/false, yes/no, on/off)"),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_consistent() {
		let options = RuntimeOptions::default();
		assert_eq!(options.markov_order, 3);
		assert_eq!(options.backoff_min_order, 1);
		assert!(options.backoff_min_order < options.markov_order);
		assert!(options.typing_min_ms <= options.typing_max_ms);
		assert_eq!(options.max_reply_chars, 280);
	}

	#[test]
	fn set_accepts_values_in_range() {
		let mut options = RuntimeOptions::default();
		options.set("reply_probability", "0.5").unwrap();
		options.set("max_reply_chars", "120").unwrap();
		options.set("randomness_strength", "2.5").unwrap();
		options.set("backoff_min_order", "2").unwrap();
		options.set("markov_order", "3").unwrap();
		assert_eq!(options.reply_probability, 0.5);
		assert_eq!(options.max_reply_chars, 120);
		assert_eq!(options.randomness_strength, 2.5);
		assert_eq!(options.backoff_min_order, 2);
	}

	#[test]
	fn set_rejects_values_out_of_range() {
		let mut options = RuntimeOptions::default();
		assert!(options.set("reply_probability", "1.5").is_err());
		assert!(options.set("max_reply_chars", "10").is_err());
		assert!(options.set("max_reply_chars", "5000").is_err());
		assert!(options.set("randomness_strength", "-0.1").is_err());
		assert!(options.set("randomness_strength", "3.5").is_err());
		assert!(options.set("markov_order", "4").is_err());
		assert!(options.set("min_tokens_for_model", "0").is_err());
		// Nothing changed on the failed updates.
		assert_eq!(options, RuntimeOptions::default());
	}

	#[test]
	fn set_keeps_order_invariant() {
		let mut options = RuntimeOptions::default();
		options.set("markov_order", "2").unwrap();
		assert!(options.set("backoff_min_order", "2").is_err());
		options.set("markov_order", "3").unwrap();
		options.set("backoff_min_order", "2").unwrap();
		assert!(options.set("markov_order", "2").is_err());
	}

	#[test]
	fn set_parses_boolean_spellings() {
		let mut options = RuntimeOptions::default();
		for value in ["1", "true", "YES", "on"] {
			options.set("normalize_lower", value).unwrap();
			assert!(options.normalize_lower);
		}
		for value in ["0", "False", "no", "OFF"] {
			options.set("normalize_lower", value).unwrap();
			assert!(!options.normalize_lower);
		}
		assert!(options.set("normalize_lower", "maybe").is_err());
	}

	#[test]
	fn set_rejects_unknown_keys_and_bad_numbers() {
		let mut options = RuntimeOptions::default();
		let err = options.set("reply_chance", "0.5").unwrap_err();
		assert!(err.to_string().contains("unknown option"));
		assert!(options.set("max_reply_chars", "many").is_err());
		assert!(options.set("min_cooldown_sec", "-3").is_err());
	}

	#[test]
	fn typing_bounds_stay_ordered() {
		let mut options = RuntimeOptions::default();
		options.set("typing_max_ms", "3000").unwrap();
		options.set("typing_min_ms", "2500").unwrap();
		assert!(options.set("typing_min_ms", "3500").is_err());
		assert!(options.set("typing_max_ms", "2000").is_err());
	}
}
