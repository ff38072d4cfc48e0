use std::sync::Mutex;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, delete, get, post, put, web};

use serde::{Deserialize, Serialize};

use chatkov_core::model::generator::Generator;
use chatkov_core::model::request::ReplyRequest;
use chatkov_core::options::{self, RuntimeOptions};
use chatkov_core::pipeline::{self, IngestOutcome, SkipReason};
use chatkov_core::store::{ChatId, Store};

/// Unseeded retries after a failed generation attempt. The seed, when
/// given, applies to the first attempt only.
const REPLY_ATTEMPTS: usize = 4;

/// Request body for the `/v1/chats/{chat_id}/messages` endpoint
#[derive(Deserialize)]
struct MessageBody {
	text: String,
}

/// Struct representing query parameters for the reply endpoint
#[derive(Deserialize)]
struct ReplyParams {
	seed: Option<String>,
	randomness_strength: Option<f64>,
	markov_order: Option<usize>,
	enable_backoff: Option<bool>,
	backoff_min_order: Option<usize>,
	max_reply_chars: Option<usize>,
}

/// Request body for the `/v1/config` update endpoint
#[derive(Deserialize)]
struct ConfigUpdate {
	key: String,
	value: String,
}

#[derive(Serialize)]
struct IngestResponse {
	outcome: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	tokens: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	reason: Option<SkipReason>,
}

#[derive(Serialize)]
struct ReplyResponse {
	reply: String,
}

struct SharedData {
	store: Store,
	options: Mutex<RuntimeOptions>,
	generator: Generator,
}

impl ReplyParams {
	/// Builds the reply request: the option snapshot plus query overrides.
	fn build_request(&self, options: &RuntimeOptions) -> Result<ReplyRequest, String> {
		let mut request = ReplyRequest::from_options(options);
		if let Some(strength) = self.randomness_strength {
			request
				.set_randomness_strength(strength)
				.map_err(|e| e.to_string())?;
		}
		if let Some(order) = self.markov_order {
			request.set_markov_order(order).map_err(|e| e.to_string())?;
		}
		if let Some(order) = self.backoff_min_order {
			request
				.set_backoff_min_order(order)
				.map_err(|e| e.to_string())?;
		}
		if let Some(enabled) = self.enable_backoff {
			request.enable_backoff = enabled;
		}
		if let Some(max_chars) = self.max_reply_chars {
			if !(20..=4000).contains(&max_chars) {
				return Err("max_reply_chars must be between 20 and 4000".into());
			}
			request.max_reply_chars = max_chars;
		}
		if let Some(seed) = &self.seed {
			request.set_seed_text(seed, options.normalize_lower);
		}
		Ok(request)
	}
}

/// HTTP POST endpoint `/v1/chats/{chat_id}/messages`
///
/// Runs one message through the ingestion pipeline for the given chat.
/// Returns the outcome: token count on ingestion, skip reason otherwise.
#[post("/v1/chats/{chat_id}/messages")]
async fn post_message(
	data: web::Data<SharedData>,
	path: web::Path<ChatId>,
	body: web::Json<MessageBody>,
) -> impl Responder {
	let chat_id = path.into_inner();
	let options = match data.options.lock() {
		Ok(o) => o.clone(),
		Err(_) => return HttpResponse::InternalServerError().body("Options lock failed"),
	};

	match pipeline::ingest_message(&data.store, &options, chat_id, &body.text) {
		Ok(IngestOutcome::Ingested { tokens }) => HttpResponse::Ok().json(IngestResponse {
			outcome: "ingested",
			tokens: Some(tokens.len()),
			reason: None,
		}),
		Ok(IngestOutcome::Skipped { reason }) => HttpResponse::Ok().json(IngestResponse {
			outcome: "skipped",
			tokens: None,
			reason: Some(reason),
		}),
		Err(e) => HttpResponse::InternalServerError().body(format!("Ingestion failed: {e}")),
	}
}

/// HTTP GET endpoint `/v1/chats/{chat_id}/reply`
///
/// Generates a reply from the chat's model, seeded from the `seed` query
/// parameter when given. Retries unseeded on failed attempts and answers
/// 204 when the model cannot produce anything.
#[get("/v1/chats/{chat_id}/reply")]
async fn get_reply(
	data: web::Data<SharedData>,
	path: web::Path<ChatId>,
	query: web::Query<ReplyParams>,
) -> impl Responder {
	let chat_id = path.into_inner();
	let options = match data.options.lock() {
		Ok(o) => o.clone(),
		Err(_) => return HttpResponse::InternalServerError().body("Options lock failed"),
	};

	let mut request = match query.build_request(&options) {
		Ok(r) => r,
		Err(e) => return HttpResponse::BadRequest().body(e),
	};

	for attempt in 0..REPLY_ATTEMPTS {
		if attempt > 0 {
			request.seed_tokens = None;
		}
		match data.generator.generate(&data.store, chat_id, &request) {
			Ok(Some(reply)) => {
				return HttpResponse::Ok().json(ReplyResponse { reply: reply.text });
			}
			Ok(None) => continue,
			Err(e) => {
				return HttpResponse::InternalServerError().body(format!("Generation failed: {e}"));
			}
		}
	}
	HttpResponse::NoContent().finish()
}

/// HTTP GET endpoint `/v1/chats/{chat_id}/stats`
///
/// Returns the chat's model statistics as JSON.
#[get("/v1/chats/{chat_id}/stats")]
async fn get_stats(data: web::Data<SharedData>, path: web::Path<ChatId>) -> impl Responder {
	match data.store.stats(path.into_inner()) {
		Ok(stats) => HttpResponse::Ok().json(stats),
		Err(e) => HttpResponse::InternalServerError().body(format!("Stats failed: {e}")),
	}
}

/// HTTP DELETE endpoint `/v1/chats/{chat_id}`
///
/// Forgets everything recorded for the chat. Idempotent.
#[delete("/v1/chats/{chat_id}")]
async fn delete_chat(data: web::Data<SharedData>, path: web::Path<ChatId>) -> impl Responder {
	match data.store.clear(path.into_inner()) {
		Ok(()) => HttpResponse::Ok().body("Chat cleared"),
		Err(e) => HttpResponse::InternalServerError().body(format!("Clear failed: {e}")),
	}
}

/// HTTP GET endpoint `/v1/config`
///
/// Returns the current runtime options as JSON.
#[get("/v1/config")]
async fn get_config(data: web::Data<SharedData>) -> impl Responder {
	let options = match data.options.lock() {
		Ok(o) => o,
		Err(_) => return HttpResponse::InternalServerError().body("Options lock failed"),
	};
	HttpResponse::Ok().json(&*options)
}

/// HTTP PUT endpoint `/v1/config`
///
/// Applies one validated `key = value` update and returns the resulting
/// options. Rejected updates leave the options unchanged.
#[put("/v1/config")]
async fn put_config(data: web::Data<SharedData>, body: web::Json<ConfigUpdate>) -> impl Responder {
	let mut options = match data.options.lock() {
		Ok(o) => o,
		Err(_) => return HttpResponse::InternalServerError().body("Options lock failed"),
	};
	match options.set(&body.key, &body.value) {
		Ok(()) => HttpResponse::Ok().json(&*options),
		Err(e) => HttpResponse::BadRequest().body(e.to_string()),
	}
}

struct Settings {
	db_path: String,
	addr: String,
	port: u16,
	options: RuntimeOptions,
}

/// Reads server settings from the environment.
///
/// `CHATKOV_DB`, `CHATKOV_ADDR` and `CHATKOV_PORT` configure the process;
/// every runtime option key is accepted as an initial override through
/// `CHATKOV_<KEY>` (for example `CHATKOV_MARKOV_ORDER=2`).
fn load_settings() -> Result<Settings, String> {
	let db_path = std::env::var("CHATKOV_DB").unwrap_or_else(|_| "chatkov.db".to_owned());
	let addr = std::env::var("CHATKOV_ADDR").unwrap_or_else(|_| "127.0.0.1".to_owned());
	let port = match std::env::var("CHATKOV_PORT") {
		Ok(raw) => raw
			.parse::<u16>()
			.map_err(|_| format!("CHATKOV_PORT: '{raw}' is not a port number"))?,
		Err(_) => 5000,
	};

	let mut options = RuntimeOptions::default();
	for key in options::KEYS {
		let env_key = format!("CHATKOV_{}", key.to_uppercase());
		if let Ok(value) = std::env::var(&env_key) {
			options
				.set(key, &value)
				.map_err(|e| format!("{env_key}: {e}"))?;
		}
	}

	Ok(Settings {
		db_path,
		addr,
		port,
		options,
	})
}

/// Main entry point for the server.
///
/// Opens (or creates) the model database, wraps the runtime options in a
/// `Mutex`, and starts an Actix-web HTTP server exposing the ingestion,
/// reply, stats and configuration endpoints.
///
/// # Notes
/// - The server binds to 127.0.0.1:5000 unless `CHATKOV_ADDR` /
///   `CHATKOV_PORT` say otherwise.
/// - Invalid environment settings abort startup.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

	let settings = load_settings().map_err(std::io::Error::other)?;
	let store = Store::open(&settings.db_path).map_err(std::io::Error::other)?;

	let shared_data = web::Data::new(SharedData {
		store,
		options: Mutex::new(settings.options),
		generator: Generator::new(),
	});

	log::info!(
		"chatkov-server serving {} on {}:{}",
		settings.db_path,
		settings.addr,
		settings.port
	);

	HttpServer::new(move || {
		App::new()
			.app_data(shared_data.clone())
			.wrap(Logger::default())
			.wrap(Cors::permissive())
			.service(post_message)
			.service(get_reply)
			.service(get_stats)
			.service(delete_chat)
			.service(get_config)
			.service(put_config)
	})
		.bind((settings.addr.as_str(), settings.port))?
		.run()
		.await
}
