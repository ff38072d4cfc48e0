use std::collections::VecDeque;

/// Rolling window of the most recent generated tokens.
///
/// A `Context` keeps at most `capacity` tokens (the top order minus one).
/// The generation loop pushes every sampled token and reads per-order
/// suffixes out of it, so backoff never mutates the window itself.
///
/// ## Invariants
/// - Never holds more than `capacity` tokens.
/// - Tokens are ordered oldest to newest.
#[derive(Clone, Debug)]
pub struct Context {
	tokens: VecDeque<String>,
	capacity: usize,
}

impl Context {
	/// Creates an empty window keeping at most `capacity` tokens.
	pub fn new(capacity: usize) -> Self {
		Self {
			tokens: VecDeque::with_capacity(capacity + 1),
			capacity,
		}
	}

	/// Creates a window pre-filled with `tokens`, keeping the newest
	/// `capacity` of them.
	pub fn from_tokens(tokens: &[String], capacity: usize) -> Self {
		let mut context = Self::new(capacity);
		for token in tokens {
			context.push(token.clone());
		}
		context
	}

	/// Appends a token, dropping the oldest one when the window is full.
	pub fn push(&mut self, token: String) {
		self.tokens.push_back(token);
		while self.tokens.len() > self.capacity {
			self.tokens.pop_front();
		}
	}

	/// The newest `len` tokens, oldest first.
	///
	/// Returns `None` when fewer than `len` tokens are available; callers
	/// treat an unformable context as an empty entry.
	pub fn suffix(&self, len: usize) -> Option<Vec<&str>> {
		if len > self.tokens.len() {
			return None;
		}
		Some(
			self.tokens
				.iter()
				.skip(self.tokens.len() - len)
				.map(String::as_str)
				.collect(),
		)
	}
}
