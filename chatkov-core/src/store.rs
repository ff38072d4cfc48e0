//! SQLite-backed model store.
//!
//! One store holds every chat's model: three order-scoped transition
//! tables, three order-scoped start tables and the audit log of raw
//! ingested messages. Chats never share rows; an order-`o` table is
//! keyed by the `o - 1` preceding tokens.
//!
//! Per-chat write serialization is realized at the storage layer: every
//! ingest is a single SQLite transaction, so concurrent readers observe
//! either all of a message's increments or none of them. The connection
//! mutex is held per statement or transaction, never across calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::info;

use rand::Rng;

use rusqlite::{Connection, params};

use serde::Serialize;

use crate::error::{ChainError, Result};
use crate::model::candidates::Candidates;

/// Identity of one conversation. Models for different chats are fully
/// independent.
pub type ChatId = i64;

const SCHEMA: &str = "
	PRAGMA journal_mode=WAL;
	PRAGMA synchronous=NORMAL;
	CREATE TABLE IF NOT EXISTS messages(
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		chat_id INTEGER NOT NULL,
		text TEXT NOT NULL,
		created_at TEXT NOT NULL DEFAULT (datetime('now'))
	);
	CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);
	CREATE TABLE IF NOT EXISTS transitions_1(
		chat_id INTEGER NOT NULL,
		next TEXT NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id, next)
	);
	CREATE TABLE IF NOT EXISTS transitions_2(
		chat_id INTEGER NOT NULL,
		c1 TEXT NOT NULL,
		next TEXT NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id, c1, next)
	);
	CREATE TABLE IF NOT EXISTS transitions_3(
		chat_id INTEGER NOT NULL,
		c1 TEXT NOT NULL,
		c2 TEXT NOT NULL,
		next TEXT NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id, c1, c2, next)
	);
	CREATE TABLE IF NOT EXISTS starts_1(
		chat_id INTEGER NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id)
	);
	CREATE TABLE IF NOT EXISTS starts_2(
		chat_id INTEGER NOT NULL,
		c1 TEXT NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id, c1)
	);
	CREATE TABLE IF NOT EXISTS starts_3(
		chat_id INTEGER NOT NULL,
		c1 TEXT NOT NULL,
		c2 TEXT NOT NULL,
		cnt INTEGER NOT NULL,
		PRIMARY KEY (chat_id, c1, c2)
	);
";

/// Observability snapshot for one chat.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatStats {
	/// Rows in the audit log for this chat.
	pub message_count: u64,
	/// Total token observations (the order-1 volume).
	pub token_count: u64,
	/// Distinct contexts per order (index 0 holds order 1, whose only
	/// possible context is the empty one).
	pub contexts_per_order: [u64; 3],
	/// Sum of transition counts per order.
	pub observations_per_order: [u64; 3],
}

/// Relational gateway owning all frequency, start and audit data.
///
/// ## Responsibilities
/// - Apply each message's increments in one atomic transaction
/// - Serve point lookups and proportional start draws
/// - Clear one chat without touching the others
///
/// ## Invariants
/// - Counts are strictly positive and only grow, except on [`Store::clear`]
/// - The sum of counts for a context equals the number of times that
///   context was observed followed by any token
#[derive(Debug)]
pub struct Store {
	connection: Mutex<Connection>,
}

impl Store {
	/// Opens (and migrates if needed) the store at `path`.
	///
	/// # Errors
	/// Returns a storage error if the file cannot be opened or the
	/// schema cannot be created; callers should treat that as fatal.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let connection = Connection::open(path)?;
		Self::prepare(connection)
	}

	/// Opens a private in-memory store (used by tests and the example).
	pub fn open_in_memory() -> Result<Self> {
		let connection = Connection::open_in_memory()?;
		Self::prepare(connection)
	}

	fn prepare(connection: Connection) -> Result<Self> {
		connection.execute_batch(SCHEMA)?;
		info!("model store ready");
		Ok(Self {
			connection: Mutex::new(connection),
		})
	}

	fn connection(&self) -> MutexGuard<'_, Connection> {
		// A poisoned lock means a panic elsewhere mid-call; the guard is
		// still usable and transactions keep the data consistent.
		match self.connection.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	/// Records one message: audit row, start counts and every n-gram
	/// transition of orders 1..=3, all in a single transaction.
	///
	/// # Behavior
	/// - Order `o` contributes one increment per position `i >= o - 1`,
	///   with context `tokens[i-(o-1)..i]` and next token `tokens[i]`.
	/// - The start tables count the message's first 0/1/2 tokens when
	///   present.
	/// - Increments are aggregated per key before writing, so each
	///   distinct row is upserted once.
	///
	/// # Errors
	/// Any storage failure rolls the whole message back: no partial
	/// counts, no audit row. The store never retries.
	pub fn ingest(&self, chat_id: ChatId, raw_text: &str, tokens: &[String]) -> Result<()> {
		let mut connection = self.connection();
		let tx = connection.transaction()?;
		{
			tx.execute(
				"INSERT INTO messages(chat_id, text) VALUES (?1, ?2)",
				params![chat_id, raw_text],
			)?;

			if !tokens.is_empty() {
				tx.execute(
					"INSERT INTO starts_1(chat_id, cnt) VALUES (?1, 1)
					 ON CONFLICT(chat_id) DO UPDATE SET cnt = cnt + 1",
					params![chat_id],
				)?;
				tx.execute(
					"INSERT INTO starts_2(chat_id, c1, cnt) VALUES (?1, ?2, 1)
					 ON CONFLICT(chat_id, c1) DO UPDATE SET cnt = cnt + 1",
					params![chat_id, tokens[0]],
				)?;
				if tokens.len() >= 2 {
					tx.execute(
						"INSERT INTO starts_3(chat_id, c1, c2, cnt) VALUES (?1, ?2, ?3, 1)
						 ON CONFLICT(chat_id, c1, c2) DO UPDATE SET cnt = cnt + 1",
						params![chat_id, tokens[0], tokens[1]],
					)?;
				}
			}

			// Aggregate per key first: one upsert per distinct n-gram.
			let mut unigrams: HashMap<&str, i64> = HashMap::new();
			let mut bigrams: HashMap<(&str, &str), i64> = HashMap::new();
			let mut trigrams: HashMap<(&str, &str, &str), i64> = HashMap::new();
			for (i, next) in tokens.iter().enumerate() {
				let next = next.as_str();
				*unigrams.entry(next).or_insert(0) += 1;
				if i >= 1 {
					*bigrams.entry((tokens[i - 1].as_str(), next)).or_insert(0) += 1;
				}
				if i >= 2 {
					*trigrams
						.entry((tokens[i - 2].as_str(), tokens[i - 1].as_str(), next))
						.or_insert(0) += 1;
				}
			}

			{
				let mut stmt = tx.prepare(
					"INSERT INTO transitions_1(chat_id, next, cnt) VALUES (?1, ?2, ?3)
					 ON CONFLICT(chat_id, next) DO UPDATE SET cnt = cnt + excluded.cnt",
				)?;
				for (next, cnt) in &unigrams {
					stmt.execute(params![chat_id, *next, *cnt])?;
				}
			}
			{
				let mut stmt = tx.prepare(
					"INSERT INTO transitions_2(chat_id, c1, next, cnt) VALUES (?1, ?2, ?3, ?4)
					 ON CONFLICT(chat_id, c1, next) DO UPDATE SET cnt = cnt + excluded.cnt",
				)?;
				for ((c1, next), cnt) in &bigrams {
					stmt.execute(params![chat_id, *c1, *next, *cnt])?;
				}
			}
			{
				let mut stmt = tx.prepare(
					"INSERT INTO transitions_3(chat_id, c1, c2, next, cnt) VALUES (?1, ?2, ?3, ?4, ?5)
					 ON CONFLICT(chat_id, c1, c2, next) DO UPDATE SET cnt = cnt + excluded.cnt",
				)?;
				for ((c1, c2, next), cnt) in &trigrams {
					stmt.execute(params![chat_id, *c1, *c2, *next, *cnt])?;
				}
			}
		}
		tx.commit()?;
		Ok(())
	}

	/// Reads the frequency entry for one context at one order.
	///
	/// Read-only, no side effects. Rows come back in stable token order
	/// so repeated calls see identical entries.
	///
	/// # Errors
	/// - `InvalidOrder` if `order` is outside 1..=3.
	/// - `ContextLength` if `context` does not hold `order - 1` tokens.
	pub fn lookup(&self, chat_id: ChatId, order: usize, context: &[&str]) -> Result<Candidates> {
		let expected = match order {
			1..=3 => order - 1,
			_ => return Err(ChainError::InvalidOrder(order)),
		};
		if context.len() != expected {
			return Err(ChainError::ContextLength {
				order,
				got: context.len(),
				expected,
			});
		}

		let connection = self.connection();
		let rows: Vec<(String, i64)> = match order {
			1 => {
				let mut stmt = connection.prepare(
					"SELECT next, cnt FROM transitions_1 WHERE chat_id = ?1 ORDER BY next",
				)?;
				let mapped = stmt.query_map(params![chat_id], |row| {
					Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
				})?;
				mapped.collect::<rusqlite::Result<_>>()?
			}
			2 => {
				let mut stmt = connection.prepare(
					"SELECT next, cnt FROM transitions_2 WHERE chat_id = ?1 AND c1 = ?2 ORDER BY next",
				)?;
				let mapped = stmt.query_map(params![chat_id, context[0]], |row| {
					Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
				})?;
				mapped.collect::<rusqlite::Result<_>>()?
			}
			_ => {
				let mut stmt = connection.prepare(
					"SELECT next, cnt FROM transitions_3 WHERE chat_id = ?1 AND c1 = ?2 AND c2 = ?3 ORDER BY next",
				)?;
				let mapped = stmt.query_map(params![chat_id, context[0], context[1]], |row| {
					Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
				})?;
				mapped.collect::<rusqlite::Result<_>>()?
			}
		};

		let mut candidates = Candidates::new();
		for (next, cnt) in rows {
			candidates.push(next, cnt.max(0) as u64);
		}
		Ok(candidates)
	}

	/// Draws a start context at `order`, proportionally to how often each
	/// start was observed.
	///
	/// Returns `None` when the chat has no starts at that order. The
	/// order-1 start context is the empty sequence, so a chat with any
	/// ingested tokens yields `Some(vec![])` there.
	///
	/// # Errors
	/// `InvalidOrder` if `order` is outside 1..=3.
	pub fn sample_start<R: Rng>(
		&self,
		chat_id: ChatId,
		order: usize,
		rng: &mut R,
	) -> Result<Option<Vec<String>>> {
		let connection = self.connection();
		let rows: Vec<(Vec<String>, i64)> = match order {
			1 => {
				let mut stmt =
					connection.prepare("SELECT cnt FROM starts_1 WHERE chat_id = ?1")?;
				let mapped = stmt.query_map(params![chat_id], |row| row.get::<_, i64>(0))?;
				let counts: Vec<i64> = mapped.collect::<rusqlite::Result<_>>()?;
				counts.into_iter().map(|cnt| (Vec::new(), cnt)).collect()
			}
			2 => {
				let mut stmt = connection.prepare(
					"SELECT c1, cnt FROM starts_2 WHERE chat_id = ?1 ORDER BY c1",
				)?;
				let mapped = stmt.query_map(params![chat_id], |row| {
					Ok((vec![row.get::<_, String>(0)?], row.get::<_, i64>(1)?))
				})?;
				mapped.collect::<rusqlite::Result<_>>()?
			}
			3 => {
				let mut stmt = connection.prepare(
					"SELECT c1, c2, cnt FROM starts_3 WHERE chat_id = ?1 ORDER BY c1, c2",
				)?;
				let mapped = stmt.query_map(params![chat_id], |row| {
					Ok((
						vec![row.get::<_, String>(0)?, row.get::<_, String>(1)?],
						row.get::<_, i64>(2)?,
					))
				})?;
				mapped.collect::<rusqlite::Result<_>>()?
			}
			_ => return Err(ChainError::InvalidOrder(order)),
		};

		let total: i64 = rows.iter().map(|(_, cnt)| cnt).sum();
		if total <= 0 {
			return Ok(None);
		}

		// Cumulative subtraction over the weighted rows.
		let mut r = rng.random_range(0..total);
		let mut fallback: Option<Vec<String>> = None;
		for (tokens, cnt) in rows {
			if r < cnt {
				return Ok(Some(tokens));
			}
			r -= cnt;
			fallback = Some(tokens);
		}
		Ok(fallback)
	}

	/// Removes every row belonging to `chat_id` from all seven tables,
	/// atomically. Idempotent; other chats are untouched.
	pub fn clear(&self, chat_id: ChatId) -> Result<()> {
		let mut connection = self.connection();
		let tx = connection.transaction()?;
		for table in [
			"messages",
			"starts_1",
			"starts_2",
			"starts_3",
			"transitions_1",
			"transitions_2",
			"transitions_3",
		] {
			tx.execute(&format!("DELETE FROM {table} WHERE chat_id = ?1"), params![chat_id])?;
		}
		tx.commit()?;
		info!("cleared model data for chat {chat_id}");
		Ok(())
	}

	/// Observability counters for one chat.
	pub fn stats(&self, chat_id: ChatId) -> Result<ChatStats> {
		let connection = self.connection();
		let message_count =
			Self::scalar(&connection, "SELECT COUNT(*) FROM messages WHERE chat_id = ?1", chat_id)?;
		let observations_per_order = [
			Self::scalar(
				&connection,
				"SELECT COALESCE(SUM(cnt), 0) FROM transitions_1 WHERE chat_id = ?1",
				chat_id,
			)?,
			Self::scalar(
				&connection,
				"SELECT COALESCE(SUM(cnt), 0) FROM transitions_2 WHERE chat_id = ?1",
				chat_id,
			)?,
			Self::scalar(
				&connection,
				"SELECT COALESCE(SUM(cnt), 0) FROM transitions_3 WHERE chat_id = ?1",
				chat_id,
			)?,
		];
		let contexts_per_order = [
			Self::scalar(
				&connection,
				"SELECT EXISTS(SELECT 1 FROM transitions_1 WHERE chat_id = ?1)",
				chat_id,
			)?,
			Self::scalar(
				&connection,
				"SELECT COUNT(DISTINCT c1) FROM transitions_2 WHERE chat_id = ?1",
				chat_id,
			)?,
			Self::scalar(
				&connection,
				"SELECT COUNT(*) FROM (SELECT DISTINCT c1, c2 FROM transitions_3 WHERE chat_id = ?1)",
				chat_id,
			)?,
		];

		Ok(ChatStats {
			message_count,
			token_count: observations_per_order[0],
			contexts_per_order,
			observations_per_order,
		})
	}

	/// Audit-log membership probe backing the caller-side duplicate
	/// policy. The store itself never rejects duplicates.
	pub fn message_exists(&self, chat_id: ChatId, text: &str) -> Result<bool> {
		let connection = self.connection();
		let exists: i64 = connection.query_row(
			"SELECT EXISTS(SELECT 1 FROM messages WHERE chat_id = ?1 AND text = ?2)",
			params![chat_id, text],
			|row| row.get(0),
		)?;
		Ok(exists != 0)
	}

	fn scalar(connection: &Connection, sql: &str, chat_id: ChatId) -> Result<u64> {
		let value: i64 = connection.query_row(sql, params![chat_id], |row| row.get(0))?;
		Ok(value.max(0) as u64)
	}
}
