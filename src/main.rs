//! # Lingua Tutor CLI (`lingua`)
//!
//! The `lingua` binary manages the knowledge index and runs tutoring
//! sessions.
//!
//! ## Usage
//!
//! ```bash
//! lingua --config ./config/lingua.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lingua init` | Create the SQLite database and run schema migrations |
//! | `lingua sync` | Synchronize the knowledge index with the corpus |
//! | `lingua query "<term>"` | Show what retrieval returns for a term |
//! | `lingua chat` | Start an interactive tutoring session |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lingua_tutor::{chat, config, corpus, db, fingerprint, index, migrate};

/// Lingua Tutor CLI — a conversational vocabulary tutor over a local
/// knowledge corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lingua.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lingua",
    about = "Lingua Tutor — a conversational vocabulary tutor over a local knowledge corpus",
    version,
    long_about = "Lingua Tutor keeps a content-addressed semantic index of a directory of study \
    notes in SQLite, answers vocabulary questions from retrieved snippets with a tutor persona, \
    and registers vocabulary records through strict structured extraction."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lingua.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chunk and vector tables.
    /// This command is idempotent.
    Init,

    /// Synchronize the knowledge index with the corpus.
    ///
    /// Fingerprints the knowledge directory by content. When the fingerprint
    /// matches the persisted one the index is left untouched; otherwise the
    /// corpus is re-chunked, re-embedded, and swapped in atomically.
    Sync {
        /// Rebuild even when the fingerprint is unchanged.
        #[arg(long)]
        force: bool,

        /// Show what would happen without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what retrieval returns for a term.
    ///
    /// Embeds the term and prints the top-ranked snippets with their
    /// sources. Useful for inspecting index quality.
    Query {
        /// The term to look up.
        term: String,

        /// Maximum number of snippets to return.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Start an interactive tutoring session.
    ///
    /// Synchronizes the index, then reads user turns from stdin until
    /// `salir`, `exit`, or `quit`.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { force, dry_run } => {
            run_sync(&cfg, force, dry_run).await?;
        }
        Commands::Query { term, k } => {
            run_query(&cfg, &term, k).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_sync(cfg: &config::Config, force: bool, dry_run: bool) -> anyhow::Result<()> {
    let corpus = corpus::load_corpus(cfg)?;

    if dry_run {
        let current = fingerprint::fingerprint(&corpus);
        let unchanged = matches!(
            fingerprint::load(&cfg.fingerprint_path())?,
            Some(previous) if previous == current
        );
        if unchanged && !force {
            println!("Index up to date ({} files). Nothing to do.", corpus.len());
        } else {
            let chunks: usize = corpus
                .iter()
                .map(|doc| {
                    lingua_tutor::chunk::chunk_text(
                        &doc.name,
                        &doc.text,
                        cfg.chunking.max_chars,
                        cfg.chunking.overlap_chars,
                    )
                    .len()
                })
                .sum();
            println!(
                "Would rebuild: {} files, {} chunks. (dry run)",
                corpus.len(),
                chunks
            );
        }
        return Ok(());
    }

    migrate::run_migrations(cfg).await?;
    let pool = db::connect(&cfg.db.path).await?;
    let store = index::SqliteVectorStore::from_config(pool.clone(), cfg)?;
    let outcome = index::sync(cfg, &corpus, &store, force).await?;
    if outcome.reused {
        println!("Index up to date ({} files). Nothing to do.", corpus.len());
    } else {
        println!(
            "Index rebuilt: {} files, {} chunks, {} embedded.",
            corpus.len(),
            outcome.chunks,
            outcome.embedded
        );
    }
    pool.close().await;
    Ok(())
}

async fn run_query(cfg: &config::Config, term: &str, k: Option<usize>) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = index::SqliteVectorStore::from_config(pool.clone(), cfg)?;
    let k = k.unwrap_or(cfg.retrieval.top_k);

    let snippets = index::retrieve(&store, term, k).await?;
    if snippets.is_empty() {
        println!("No results.");
    } else {
        for (i, snippet) in snippets.iter().enumerate() {
            println!("{}. [{}]", i + 1, snippet.source);
            println!("   {}", snippet.text.replace('\n', "\n   "));
        }
    }
    pool.close().await;
    Ok(())
}
