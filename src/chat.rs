//! Interactive chat loop over stdin/stdout.

use anyhow::{bail, Result};
use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::dialogue::DialogueEngine;
use crate::index::{self, SqliteVectorStore};
use crate::migrate;
use crate::model::OpenAIChat;
use crate::record_store;
use crate::session::ConversationSession;

const QUIT_WORDS: &[&str] = &["salir", "exit", "quit", "adios", "adiós"];

fn is_quit(input: &str) -> bool {
    let lowered = input.trim().to_lowercase();
    QUIT_WORDS.contains(&lowered.as_str())
}

/// Run a single tutoring session until the user quits or stdin closes.
///
/// Startup synchronizes the knowledge index against the corpus, so an
/// unchanged corpus starts instantly and an edited one is re-indexed before
/// the first turn.
pub async fn run_chat(config: &Config) -> Result<()> {
    if !config.model.is_enabled() {
        bail!("Chat requires a model provider. Set [model] provider in config.");
    }

    let corpus = corpus::load_corpus(config)?;
    migrate::run_migrations(config).await?;
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteVectorStore::from_config(pool.clone(), config)?;

    let outcome = index::sync(config, &corpus, &store, false).await?;
    if outcome.reused {
        println!("Knowledge index up to date ({} files).", corpus.len());
    } else {
        println!(
            "Knowledge index rebuilt: {} chunks from {} files.",
            outcome.chunks,
            corpus.len()
        );
    }

    let model = OpenAIChat::new(&config.model)?;
    let records = record_store::create_store(&config.notion)?;
    let engine = DialogueEngine::new(&model, &store, records.as_ref(), config.retrieval.top_k);
    let mut session = ConversationSession::new();

    println!("Escribe 'salir' para terminar la sesión.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("tú> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // stdin closed
            println!();
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_quit(input) {
            println!("luna> ¡Hasta pronto! Sigue practicando.");
            break;
        }

        let reply = engine.handle_turn(&mut session, input).await;
        println!("luna> {}", reply.text);
        if let Some(candidate) = &reply.candidate_save {
            debug!(%candidate, "save candidate pending user confirmation");
        }
    }

    pool.close().await;
    Ok(())
}
