use crate::error::{ChainError, Result};
use crate::options::RuntimeOptions;
use crate::text;

/// Default hard ceiling on generation steps.
///
/// Order <= 3 chains can cycle indefinitely in dense tables, so the walk
/// is always bounded regardless of the character cap.
pub const DEFAULT_MAX_STEPS: usize = 80;

/// Input parameters for generating one reply.
///
/// `ReplyRequest` contains both **freely tunable fields** (seed, caps,
/// diversity threshold, backoff switch) and **validated fields**
/// (randomness strength and the order pair) kept consistent through
/// setters.
///
/// # Responsibilities
/// - Carry the per-request generation knobs in one place
/// - Keep `backoff_min_order < markov_order` at all times
/// - Snapshot [`RuntimeOptions`] so a request never reads ambient state
///
/// # Invariants
/// - `markov_order` is 2 or 3
/// - `backoff_min_order` is 1 or 2, strictly below `markov_order`
/// - `randomness_strength` is within [0.0, 3.0]
#[derive(Clone, Debug)]
pub struct ReplyRequest {
	/// Optional seed context; the generator keeps its first
	/// `markov_order - 1` tokens. `None` draws from the start tables.
	pub seed_tokens: Option<Vec<String>>,

	/// Hard cap on the rendered reply, in characters.
	pub max_reply_chars: usize,

	/// Hard ceiling on generation steps.
	pub max_steps: usize,

	/// Minimum candidate diversity required before an entry is accepted
	/// without trying a lower order first. 1 means only empty entries
	/// trigger backoff.
	pub min_candidates: usize,

	/// Whether the per-step walk may fall back to lower orders.
	pub enable_backoff: bool,

	/// Sampling interpolation knob (0.0 = argmax, 1.0 = proportional).
	randomness_strength: f64,

	/// Top n-gram order for the walk.
	markov_order: usize,

	/// Lowest order the walk may back off to.
	backoff_min_order: usize,
}

impl ReplyRequest {
	/// Creates a request with the engine defaults.
	pub fn new() -> Self {
		Self {
			seed_tokens: None,
			max_reply_chars: 280,
			max_steps: DEFAULT_MAX_STEPS,
			min_candidates: 1,
			enable_backoff: true,
			randomness_strength: 1.0,
			markov_order: 3,
			backoff_min_order: 1,
		}
	}

	/// Snapshots the generator-facing fields of `options`.
	///
	/// The options object is already validated, so no checks are needed
	/// here.
	pub fn from_options(options: &RuntimeOptions) -> Self {
		Self {
			seed_tokens: None,
			max_reply_chars: options.max_reply_chars,
			max_steps: DEFAULT_MAX_STEPS,
			min_candidates: 1,
			enable_backoff: options.enable_backoff,
			randomness_strength: options.randomness_strength,
			markov_order: options.markov_order,
			backoff_min_order: options.backoff_min_order,
		}
	}

	/// Returns the current randomness strength.
	pub fn randomness_strength(&self) -> f64 {
		self.randomness_strength
	}

	/// Returns the top n-gram order.
	pub fn markov_order(&self) -> usize {
		self.markov_order
	}

	/// Returns the lowest order the walk may back off to.
	pub fn backoff_min_order(&self) -> usize {
		self.backoff_min_order
	}

	/// Sets the randomness strength (0.0..=3.0).
	///
	/// # Errors
	/// Returns an error if the value is outside the valid range.
	pub fn set_randomness_strength(&mut self, strength: f64) -> Result<()> {
		if !(0.0..=3.0).contains(&strength) {
			return Err(ChainError::invalid_option(
				"randomness_strength",
				"must be between 0.0 and 3.0",
			));
		}
		self.randomness_strength = strength;
		Ok(())
	}

	/// Sets the top n-gram order (2 or 3).
	///
	/// # Errors
	/// Returns an error if the value is out of range or does not stay
	/// above `backoff_min_order`.
	pub fn set_markov_order(&mut self, order: usize) -> Result<()> {
		if !(2..=3).contains(&order) {
			return Err(ChainError::invalid_option("markov_order", "must be 2 or 3"));
		}
		if order <= self.backoff_min_order {
			return Err(ChainError::invalid_option(
				"markov_order",
				"must stay above backoff_min_order",
			));
		}
		self.markov_order = order;
		Ok(())
	}

	/// Sets the lowest order reachable by backoff (1 or 2).
	///
	/// # Errors
	/// Returns an error if the value is out of range or does not stay
	/// below `markov_order`.
	pub fn set_backoff_min_order(&mut self, order: usize) -> Result<()> {
		if !(1..=2).contains(&order) {
			return Err(ChainError::invalid_option("backoff_min_order", "must be 1 or 2"));
		}
		if order >= self.markov_order {
			return Err(ChainError::invalid_option(
				"backoff_min_order",
				"must stay below markov_order",
			));
		}
		self.backoff_min_order = order;
		Ok(())
	}

	/// Seeds the request from free text.
	///
	/// The text goes through the same tokenizer as ingested messages;
	/// text that tokenizes to nothing leaves the request unseeded.
	pub fn set_seed_text(&mut self, seed: &str, normalize_lower: bool) {
		let tokens = text::tokenize(seed, normalize_lower);
		self.seed_tokens = if tokens.is_empty() { None } else { Some(tokens) };
	}
}

impl Default for ReplyRequest {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn setters_accept_valid_values() {
		let mut request = ReplyRequest::new();
		request.set_randomness_strength(0.0).unwrap();
		request.set_randomness_strength(3.0).unwrap();
		request.set_backoff_min_order(2).unwrap();
		request.set_markov_order(3).unwrap();
		assert_eq!(request.markov_order(), 3);
		assert_eq!(request.backoff_min_order(), 2);
	}

	#[test]
	fn setters_reject_invalid_values() {
		let mut request = ReplyRequest::new();
		assert!(request.set_randomness_strength(-0.5).is_err());
		assert!(request.set_randomness_strength(3.5).is_err());
		assert!(request.set_markov_order(1).is_err());
		assert!(request.set_markov_order(4).is_err());
		assert!(request.set_backoff_min_order(0).is_err());
		assert!(request.set_backoff_min_order(3).is_err());
	}

	#[test]
	fn order_pair_stays_consistent() {
		let mut request = ReplyRequest::new();
		request.set_markov_order(2).unwrap();
		assert!(request.set_backoff_min_order(2).is_err());
		request.set_markov_order(3).unwrap();
		request.set_backoff_min_order(2).unwrap();
		assert!(request.set_markov_order(2).is_err());
	}

	#[test]
	fn from_options_snapshots_generator_fields() {
		let mut options = RuntimeOptions::default();
		options.set("max_reply_chars", "140").unwrap();
		options.set("randomness_strength", "0.5").unwrap();
		options.set("enable_backoff", "off").unwrap();
		let request = ReplyRequest::from_options(&options);
		assert_eq!(request.max_reply_chars, 140);
		assert_eq!(request.randomness_strength(), 0.5);
		assert!(!request.enable_backoff);
		assert_eq!(request.markov_order(), 3);
		assert_eq!(request.max_steps, DEFAULT_MAX_STEPS);
	}

	#[test]
	fn seed_text_goes_through_the_tokenizer() {
		let mut request = ReplyRequest::new();
		request.set_seed_text("The Cat!", true);
		assert_eq!(
			request.seed_tokens,
			Some(vec!["the".to_owned(), "cat".to_owned(), "!".to_owned()])
		);
		request.set_seed_text("https://nothing.example/here", true);
		assert_eq!(request.seed_tokens, None);
	}
}
