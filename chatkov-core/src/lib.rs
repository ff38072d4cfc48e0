//! Chat-trained Markov reply engine.
//!
//! This crate provides the full reply engine behind the HTTP service:
//! - Text sanitization and word-level tokenization
//! - A SQLite-backed variable-order transition store (orders 1 to 3)
//! - Ingestion with per-message gating and atomic count updates
//! - Reply generation with per-step order backoff and tunable
//!   randomness
//!
//! Upstream connectors (HTTP handlers, bots, batch importers) only need
//! [`store::Store`], [`pipeline::ingest_message`] and
//! [`model::generator::Generator`]; everything else supports those
//! three.

/// Error and result types shared across the crate.
pub mod error;

/// Reply model: candidates, scoring, requests and the generator.
pub mod model;

/// Validated runtime tuning knobs.
pub mod options;

/// The sanitize-gate-tokenize-record ingestion pipeline.
pub mod pipeline;

/// SQLite persistence for messages, transitions and start contexts.
pub mod store;

/// Sanitization, tokenization and rendering helpers.
pub mod text;
