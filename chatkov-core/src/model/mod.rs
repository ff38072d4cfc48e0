//! Top-level module for the variable-order reply model.
//!
//! This module groups everything the generation side needs:
//! - Ranked next-token entries (`Candidates`)
//! - The rolling context window (`Context`)
//! - Per-reply tuning parameters (`ReplyRequest`)
//! - Count-to-weight scoring policies (`ScoreFn`)
//! - The reply walk itself (`Generator`)

/// Ranked next-token candidates for one context.
///
/// Supports deterministic argmax selection and weighted random
/// sampling through a scoring policy.
pub mod candidates;

/// Rolling window over the most recent walk tokens.
///
/// Keeps at most `markov_order - 1` tokens and exposes the suffixes
/// used to key each order's transition table. Not exposed publicly.
mod context;

/// High-level interface for generating replies.
///
/// Seeds a walk from explicit tokens or a stored start context, then
/// extends it step by step with per-step order backoff until a
/// termination rule fires.
pub mod generator;

/// Per-reply generation parameters.
///
/// Carries seed tokens, sampling strength, order bounds and output
/// limits, with validated setters mirroring the runtime options.
pub mod request;

/// Count-to-weight scoring policies.
///
/// Maps raw transition counts to sampling weights under a given
/// randomness strength.
pub mod scoring;
