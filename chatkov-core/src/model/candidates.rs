use rand::Rng;

use crate::model::scoring::ScoreFn;

/// Frequency entry for one `(chat, order, context)` key.
///
/// Holds every observed next-token candidate with its occurrence count.
/// Conceptually this is a node in a Markov chain whose outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities
/// - Deterministic selection of the most frequent candidate (`argmax`)
/// - Weighted random sampling through a pluggable scoring policy
///
/// ## Invariants
/// - Each candidate occurrence count is strictly positive
/// - Candidates are unique (the store groups by next token)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidates {
	/// `(next_token, occurrences)` rows, in stable store order.
	entries: Vec<(String, u64)>,
}

impl Candidates {
	/// Creates an entry with no candidates.
	pub fn new() -> Self {
		Self { entries: Vec::new() }
	}

	/// Appends one candidate row.
	pub(crate) fn push(&mut self, token: String, count: u64) {
		self.entries.push((token, count));
	}

	/// Number of distinct candidates.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Occurrence count recorded for `token` (0 when absent).
	pub fn count(&self, token: &str) -> u64 {
		self.entries
			.iter()
			.find(|(candidate, _)| candidate == token)
			.map(|(_, count)| *count)
			.unwrap_or(0)
	}

	/// Sum of all occurrence counts.
	pub fn total(&self) -> u64 {
		self.entries.iter().map(|(_, count)| count).sum()
	}

	/// Iterates over `(token, count)` rows.
	pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
		self.entries.iter().map(|(token, count)| (token.as_str(), *count))
	}

	/// The candidate with the highest occurrence count.
	///
	/// Ties are broken deterministically: the lexicographically smallest
	/// token wins. Returns `None` when there are no candidates.
	pub fn argmax(&self) -> Option<&str> {
		let mut best: Option<(&str, u64)> = None;
		for (token, count) in &self.entries {
			let better = match best {
				None => true,
				Some((best_token, best_count)) => {
					*count > best_count || (*count == best_count && token.as_str() < best_token)
				}
			};
			if better {
				best = Some((token.as_str(), *count));
			}
		}
		best.map(|(token, _)| token)
	}

	/// Samples one candidate, weighted by
	/// `score(count, max_count, strength)`.
	///
	/// This method performs:
	/// - an O(n) scan computing the entry maximum and the total weight
	/// - a cumulative subtraction to select a bucket
	///
	/// Returns `None` if there are no candidates or the policy weights
	/// every candidate at zero. A non-finite total collapses the draw to
	/// the most frequent candidate.
	pub fn sample<R: Rng>(&self, strength: f64, score: ScoreFn, rng: &mut R) -> Option<&str> {
		if self.entries.is_empty() {
			return None;
		}

		let max_count = self
			.entries
			.iter()
			.map(|(_, count)| *count)
			.max()
			.unwrap_or(0);

		// Compute the total weight
		let total: f64 = self
			.entries
			.iter()
			.map(|(_, count)| score(*count, max_count, strength))
			.sum();
		if !total.is_finite() {
			return self.argmax();
		}
		if total <= 0.0 {
			return None;
		}

		// Randomly select a candidate
		let mut r = rng.random_range(0.0..total);

		let mut fallback: Option<&str> = None;
		for (token, count) in &self.entries {
			let weight = score(*count, max_count, strength);
			if r < weight {
				return Some(token.as_str());
			}
			r -= weight;
			fallback = Some(token.as_str());
		}

		// Fallback: floating point rounding can exhaust the scan.
		fallback
	}
}
