use rand::Rng;

use crate::error::Result;
use crate::model::candidates::Candidates;
use crate::model::context::Context;
use crate::model::request::ReplyRequest;
use crate::model::scoring::{self, ScoreFn};
use crate::store::{ChatId, Store};
use crate::text;

/// Replies rendering to fewer characters than this collapse to
/// "no output": one or two stray tokens make poor chat replies.
pub const MIN_REPLY_CHARS: usize = 5;

/// One generated reply: the raw token walk and its rendered form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
	/// The assembled token sequence, seed included.
	pub tokens: Vec<String>,
	/// The rendered text, capped at the request's character limit.
	pub text: String,
}

/// Reply generator walking the model store with per-step backoff.
///
/// # Responsibilities
/// - Seed the walk (explicit seed or proportional start draw)
/// - Run the step loop as an explicit (order, context) state machine
/// - Sample candidates through the pluggable scoring policy
/// - Enforce every termination rule (candidate exhaustion, character
///   cap, step ceiling)
///
/// The generator holds no model data: all reads go through the store,
/// so a reply always reflects the latest committed ingests.
#[derive(Debug)]
pub struct Generator {
	score: ScoreFn,
}

impl Generator {
	/// Creates a generator with the power-law scoring policy.
	pub fn new() -> Self {
		Self {
			score: scoring::power_law,
		}
	}

	/// Creates a generator with a custom scoring policy.
	pub fn with_score(score: ScoreFn) -> Self {
		Self { score }
	}

	/// Generates one reply using the process RNG.
	///
	/// See [`Generator::generate_with_rng`].
	pub fn generate(
		&self,
		store: &Store,
		chat_id: ChatId,
		request: &ReplyRequest,
	) -> Result<Option<Reply>> {
		self.generate_with_rng(store, chat_id, request, &mut rand::rng())
	}

	/// Generates one reply, drawing randomness from `rng`.
	///
	/// # Behavior
	/// 1. Seed: the request's seed tokens (first `markov_order - 1`
	///    kept), or a start context drawn at the top order, walking down
	///    the start tables regardless of the backoff switch.
	/// 2. Step loop: every step restarts at the top order and backs off
	///    through `backoff_min_order` while the current entry is too
	///    sparse, so the walk regains high-order specificity as soon as
	///    the path rejoins well-observed contexts.
	/// 3. Stop on candidate exhaustion, on reaching the character cap,
	///    or after `max_steps` steps.
	///
	/// # Returns
	/// - `Ok(Some(reply))` with the walk and its rendered text.
	/// - `Ok(None)` when no seed exists for this chat or the reply
	///   renders below [`MIN_REPLY_CHARS`]. This is a normal outcome for
	///   sparse or new chats, not an error.
	///
	/// # Errors
	/// Only storage failures propagate.
	pub fn generate_with_rng<R: Rng>(
		&self,
		store: &Store,
		chat_id: ChatId,
		request: &ReplyRequest,
		rng: &mut R,
	) -> Result<Option<Reply>> {
		let capacity = request.markov_order() - 1;

		let seed: Vec<String> = match &request.seed_tokens {
			Some(tokens) if !tokens.is_empty() => {
				tokens.iter().take(capacity).cloned().collect()
			}
			_ => match self.sample_any_start(store, chat_id, request.markov_order(), rng)? {
				Some(start) => start,
				// Nothing was ever ingested for this chat.
				None => return Ok(None),
			},
		};

		let mut output = seed;
		let mut context = Context::from_tokens(&output, capacity);
		let mut rendered = text::rendered_len(&output);

		let mut steps = 0usize;
		while rendered < request.max_reply_chars && steps < request.max_steps {
			let next = match self.next_token(store, chat_id, request, &context, rng)? {
				Some(token) => token,
				// Normal terminal condition: nothing follows this context.
				None => break,
			};
			context.push(next.clone());
			output.push(next);
			rendered = text::rendered_len(&output);
			steps += 1;
		}

		let rendered_text = text::detokenize(&output, request.max_reply_chars);
		if rendered_text.chars().count() < MIN_REPLY_CHARS {
			return Ok(None);
		}
		Ok(Some(Reply {
			tokens: output,
			text: rendered_text,
		}))
	}

	/// One step of the walk: find a usable entry, then sample from it.
	///
	/// The walk starts at the request's top order and drops one order at
	/// a time while the entry is below the diversity threshold; a context
	/// shorter than an order needs counts as an empty entry there. At the
	/// permitted floor a sparse but non-empty entry is still sampled.
	fn next_token<R: Rng>(
		&self,
		store: &Store,
		chat_id: ChatId,
		request: &ReplyRequest,
		context: &Context,
		rng: &mut R,
	) -> Result<Option<String>> {
		let mut order = request.markov_order();
		loop {
			let candidates = match context.suffix(order - 1) {
				Some(suffix) => store.lookup(chat_id, order, &suffix)?,
				None => Candidates::new(),
			};

			if candidates.len() >= request.min_candidates.max(1) {
				return Ok(self.pick(&candidates, request, rng).map(str::to_owned));
			}

			if request.enable_backoff && order > request.backoff_min_order() {
				order -= 1;
				continue;
			}

			if !candidates.is_empty() {
				return Ok(self.pick(&candidates, request, rng).map(str::to_owned));
			}

			return Ok(None);
		}
	}

	/// Selects a candidate: argmax at strength 0, weighted sampling
	/// through the scoring policy otherwise.
	fn pick<'a, R: Rng>(
		&self,
		candidates: &'a Candidates,
		request: &ReplyRequest,
		rng: &mut R,
	) -> Option<&'a str> {
		let strength = request.randomness_strength();
		if strength <= 0.0 {
			candidates.argmax()
		} else {
			candidates.sample(strength, self.score, rng)
		}
	}

	/// Draws a start context, walking down from `top_order` to order 1.
	///
	/// This fallback concerns the seed only and so applies regardless of
	/// the request's backoff switch.
	fn sample_any_start<R: Rng>(
		&self,
		store: &Store,
		chat_id: ChatId,
		top_order: usize,
		rng: &mut R,
	) -> Result<Option<Vec<String>>> {
		let mut order = top_order;
		loop {
			if let Some(start) = store.sample_start(chat_id, order, rng)? {
				return Ok(Some(start));
			}
			if order == 1 {
				return Ok(None);
			}
			order -= 1;
		}
	}
}

impl Default for Generator {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::text;

	const CHAT: ChatId = 1;

	fn ingest_lines(store: &Store, lines: &[&str]) {
		for line in lines {
			let tokens = text::tokenize(line, true);
			store.ingest(CHAT, line, &tokens).unwrap();
		}
	}

	fn seeded(parts: &[&str]) -> Option<Vec<String>> {
		Some(parts.iter().map(|s| (*s).to_owned()).collect())
	}

	fn deterministic_request() -> ReplyRequest {
		let mut request = ReplyRequest::new();
		request.set_randomness_strength(0.0).unwrap();
		request
	}

	#[test]
	fn scenario_picks_ran_by_lexicographic_tie_break() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["the cat sat", "the cat ran", "the dog sat"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["the", "cat"]);

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();

		assert_eq!(&reply.tokens[..3], &["the", "cat", "ran"]);
		assert!(reply.text.starts_with("the cat ran"));
	}

	#[test]
	fn backoff_reaches_the_bigram_table() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["alpha beta"]);

		// The trigram entry for ("zulu","alpha") is empty, the bigram
		// entry for ("alpha") is not.
		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["zulu", "alpha"]);

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		assert_eq!(reply.tokens[2], "beta");
	}

	#[test]
	fn disabled_backoff_terminates_on_the_first_step() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["alpha beta"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["zulu", "alpha"]);
		request.enable_backoff = false;

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		// No continuation at order 3 and no fallback: seed only.
		assert_eq!(reply.tokens, vec!["zulu".to_owned(), "alpha".to_owned()]);
	}

	#[test]
	fn backoff_floor_is_respected() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["alpha beta gamma delta"]);

		// Backoff may stop at order 2; the bigram entry for "unseen" is
		// empty and the unigram table must not be consulted.
		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["zulu", "unseen"]);
		request.set_backoff_min_order(2).unwrap();

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		assert_eq!(reply.tokens.len(), 2);

		// With the floor at 1 the unigram entry supplies a token.
		let mut floored = deterministic_request();
		floored.seed_tokens = seeded(&["zulu", "unseen"]);
		let replied = Generator::new()
			.generate_with_rng(&store, CHAT, &floored, &mut StdRng::seed_from_u64(0))
			.unwrap()
			.unwrap();
		assert!(replied.tokens.len() > 2);
	}

	#[test]
	fn step_ceiling_bounds_cyclic_chains() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["loop loop loop loop loop"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["loop", "loop"]);
		request.max_reply_chars = 4000;
		request.max_steps = 7;

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		// Seed plus exactly max_steps sampled tokens.
		assert_eq!(reply.tokens.len(), 2 + 7);
	}

	#[test]
	fn rendered_reply_never_exceeds_the_character_cap() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["loop loop loop loop loop"]);

		for cap in [20, 33, 50] {
			let mut request = deterministic_request();
			request.seed_tokens = seeded(&["loop", "loop"]);
			request.max_reply_chars = cap;

			let mut rng = StdRng::seed_from_u64(1);
			let reply = Generator::new()
				.generate_with_rng(&store, CHAT, &request, &mut rng)
				.unwrap()
				.unwrap();
			assert!(
				reply.text.chars().count() <= cap,
				"cap {cap}: {:?}",
				reply.text
			);
		}
	}

	#[test]
	fn unseeded_generation_draws_a_start_context() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["hello world again"]);

		let request = deterministic_request();
		let mut rng = StdRng::seed_from_u64(2);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		assert_eq!(&reply.tokens[..2], &["hello", "world"]);
		assert_eq!(reply.tokens[2], "again");
	}

	#[test]
	fn empty_chat_yields_no_output() {
		let store = Store::open_in_memory().unwrap();
		let request = deterministic_request();
		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap();
		assert_eq!(reply, None);
	}

	#[test]
	fn short_renders_collapse_to_no_output() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["a b"]);

		let mut request = deterministic_request();
		request.enable_backoff = false;

		// The start draw yields ("a","b"), nothing follows at order 3,
		// and "a b" is below the minimum rendered length.
		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap();
		assert_eq!(reply, None);
	}

	#[test]
	fn seed_is_truncated_to_the_context_width() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["one two buckle my shoe"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["one", "two", "three", "four"]);

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		// Only the first markov_order - 1 seed tokens are kept: the walk
		// resumes from ("one","two"), not from the discarded tail.
		assert_eq!(&reply.tokens[..3], &["one", "two", "buckle"]);
	}

	#[test]
	fn short_seed_backs_off_to_available_orders() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["solo follows here"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["solo"]);

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		// A one-token context cannot key the trigram table; the bigram
		// entry for ("solo") supplies the continuation.
		assert_eq!(&reply.tokens[..2], &["solo", "follows"]);
	}

	#[test]
	fn min_candidates_threshold_prefers_lower_orders() {
		let store = Store::open_in_memory().unwrap();
		// The trigram entry for ("pick","one") holds only "zebra"; the
		// bigram entry for ("one") holds {zebra:1, apple:2}.
		ingest_lines(&store, &["pick one zebra", "one apple", "one apple"]);

		let mut request = deterministic_request();
		request.seed_tokens = seeded(&["pick", "one"]);
		request.min_candidates = 2;

		let mut rng = StdRng::seed_from_u64(0);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		// The sparse trigram entry is skipped; argmax over the bigram
		// entry picks "apple" where a floor pick would give "zebra".
		assert_eq!(reply.tokens[2], "apple");
	}

	#[test]
	fn custom_scoring_policy_is_honored() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["hello hello hello world"]);

		// Weight only the count-1 candidate: sampling must always land
		// on "world" even though "hello" dominates the unigram entry.
		let generator = Generator::with_score(|count, _, _| if count == 1 { 1.0 } else { 0.0 });

		let mut request = ReplyRequest::new();
		request.seed_tokens = seeded(&["zz", "qq"]);
		request.set_randomness_strength(1.0).unwrap();
		request.max_steps = 3;

		let mut rng = StdRng::seed_from_u64(7);
		let reply = generator
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		assert_eq!(&reply.tokens[2..], &["world", "world", "world"]);
	}

	#[test]
	fn near_zero_strength_still_produces_a_reply() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["the cat sat", "the cat sat", "the cat ran"]);

		// The setter accepts 0.001; at exponent 1000 every weight but
		// the mode's underflows and "sat" wins each draw.
		let mut request = ReplyRequest::new();
		request.set_randomness_strength(0.001).unwrap();
		request.seed_tokens = seeded(&["the", "cat"]);
		request.enable_backoff = false;

		let mut rng = StdRng::seed_from_u64(5);
		let reply = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut rng)
			.unwrap()
			.unwrap();
		assert_eq!(
			reply.tokens,
			vec!["the".to_owned(), "cat".to_owned(), "sat".to_owned()]
		);
	}

	#[test]
	fn same_seed_state_is_deterministic() {
		let store = Store::open_in_memory().unwrap();
		ingest_lines(&store, &["the cat sat", "the cat ran", "the dog sat"]);

		let mut request = ReplyRequest::new();
		request.set_randomness_strength(1.0).unwrap();

		let first = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut StdRng::seed_from_u64(42))
			.unwrap();
		let second = Generator::new()
			.generate_with_rng(&store, CHAT, &request, &mut StdRng::seed_from_u64(42))
			.unwrap();
		assert_eq!(first, second);
	}
}
