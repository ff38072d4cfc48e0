use chatkov_core::model::generator::Generator;
use chatkov_core::model::request::ReplyRequest;
use chatkov_core::options::RuntimeOptions;
use chatkov_core::pipeline::{self, IngestOutcome};
use chatkov_core::store::Store;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Everything runs against an in-memory store; point Store::open at a
    // file path to keep the model between runs
    let store = Store::open_in_memory()?;
    let options = RuntimeOptions::default();
    let chat_id = 42;

    // Feed the model a small corpus. Each message passes through the full
    // pipeline: sanitize, gate, tokenize, record
    let corpus = [
        "the cat sat on the mat",
        "the cat ran over the mat",
        "the dog sat on the rug",
        "the dog barked at the cat",
        "a cat and a dog shared the rug",
    ];
    for message in corpus {
        match pipeline::ingest_message(&store, &options, chat_id, message)? {
            IngestOutcome::Ingested { tokens } => {
                println!("Ingested {} tokens: {:?}", tokens.len(), message)
            }
            IngestOutcome::Skipped { reason } => {
                println!("Skipped ({reason:?}): {message:?}")
            }
        }
    }

    // Links and mentions are stripped before anything reaches the model;
    // a message that is nothing but a link is skipped entirely
    match pipeline::ingest_message(&store, &options, chat_id, "https://example.com/cats")? {
        IngestOutcome::Ingested { .. } => println!("Should not happen"),
        IngestOutcome::Skipped { reason } => println!("Link-only message skipped: {reason:?}"),
    }

    // What the model now holds
    let stats = store.stats(chat_id)?;
    println!(
        "Model: {} messages, {} token observations",
        stats.message_count, stats.token_count
    );
    println!(
        "Distinct contexts by order: {:?}",
        stats.contexts_per_order
    );

    // Requests snapshot the options; every knob can then be tuned
    // per-request through the validated setters
    let mut request = ReplyRequest::from_options(&options);

    // Test invalid tuning values
    match request.set_randomness_strength(5.0) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Strength 5.0 rejected: {e}"),
    }
    match request.set_backoff_min_order(3) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Backoff floor 3 rejected: {e}"),
    }

    // Seed the reply from an incoming message, as a chat bot would
    request.set_seed_text("what did the cat do?", options.normalize_lower);

    let generator = Generator::new();

    // Strength 0 always follows the most frequent continuation; higher
    // strengths sample, approaching frequency-proportional at 1.0 and
    // flattening beyond it
    for strength in [0.0, 0.5, 1.0, 2.0] {
        request.set_randomness_strength(strength)?;
        match generator.generate(&store, chat_id, &request)? {
            Some(reply) => println!("Reply at strength {strength}: {}", reply.text),
            None => println!("No reply possible at strength {strength}"),
        }
    }

    // Forget the chat; the store is ready to learn from scratch
    store.clear(chat_id)?;
    let stats = store.stats(chat_id)?;
    println!("After clear: {} messages", stats.message_count);

    Ok(())
}
