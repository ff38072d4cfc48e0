//! Sampling weight policy.
//!
//! The stepping logic never computes weights itself: it goes through a
//! [`ScoreFn`] held by the generator, so the numeric policy can be
//! swapped (power law, softmax temperature, ...) without touching the
//! walk.

/// Maps an occurrence count and a randomness strength to a sampling
/// weight.
///
/// `max_count` is the highest count in the same entry, so a policy can
/// weight candidates relative to the local mode.
pub type ScoreFn = fn(count: u64, max_count: u64, strength: f64) -> f64;

/// Power-law interpolation between "most frequent wins" and uniform.
///
/// `weight = (count / max_count)^(1 / strength)`
///
/// Counts are taken relative to the entry's most frequent candidate,
/// which keeps every weight in `[0, 1]` at any accepted strength: the
/// shared `max_count` factor cancels out of a proportional draw, and a
/// huge exponent underflows every weight except the mode's to zero.
///
/// - strength 1 keeps the count ratios: sampling is proportional.
/// - strengths in (0, 1) raise the exponent and sharpen the
///   distribution toward the mode (0.5 squares the ratios).
/// - strengths above 1 lower the exponent below 1 and flatten the
///   distribution toward uniform.
///
/// # Invariants
/// - `strength` is strictly positive; strength 0 takes the argmax path
///   in the generator and never reaches a scorer.
/// - `count` never exceeds `max_count`; callers pass the entry's own
///   maximum.
pub fn power_law(count: u64, max_count: u64, strength: f64) -> f64 {
	let ratio = count as f64 / max_count.max(1) as f64;
	ratio.powf(1.0 / strength)
}
